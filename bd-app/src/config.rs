//! BoardPilot configuration loader.

use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
pub struct BoardPilotConfig {
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub webhooks: WebhooksConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    pub model: String,
    pub system_prompt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_server_enabled")]
    pub enabled: bool,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_server_enabled() -> bool {
    true
}

fn default_port() -> u16 {
    8320
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: default_server_enabled(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Sliding-window cap per user.
    #[serde(default = "default_user_max")]
    pub user_max_requests: usize,
    /// Sliding-window cap per organization.
    #[serde(default = "default_org_max")]
    pub org_max_requests: usize,
    #[serde(default = "default_window_seconds")]
    pub window_seconds: i64,
}

fn default_user_max() -> usize {
    20
}

fn default_org_max() -> usize {
    100
}

fn default_window_seconds() -> i64 {
    60
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            user_max_requests: default_user_max(),
            org_max_requests: default_org_max(),
            window_seconds: default_window_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_scheduler_enabled")]
    pub enabled: bool,
    #[serde(default = "default_tick_seconds")]
    pub tick_seconds: u64,
}

fn default_scheduler_enabled() -> bool {
    true
}

fn default_tick_seconds() -> u64 {
    60
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: default_scheduler_enabled(),
            tick_seconds: default_tick_seconds(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhooksConfig {
    #[serde(default = "default_max_payload_bytes")]
    pub max_payload_bytes: usize,
}

fn default_max_payload_bytes() -> usize {
    256 * 1024
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            max_payload_bytes: default_max_payload_bytes(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Path of the sqlite database; in-memory dev stores when absent.
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

impl BoardPilotConfig {
    pub async fn load(path: Option<PathBuf>) -> anyhow::Result<Self> {
        let path = path.unwrap_or_else(default_config_path);
        let contents = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| anyhow::anyhow!("read config {}: {e}", path.display()))?;

        let mut cfg: BoardPilotConfig = toml::from_str(&contents)
            .map_err(|e| anyhow::anyhow!("parse config {}: {e}", path.display()))?;

        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Defaults suitable for local development without a config file.
    pub fn dev_default() -> Self {
        Self {
            general: GeneralConfig {
                model: "scripted".to_string(),
                system_prompt: "You are BoardPilot, an assistant that manages the project board \
                                on behalf of your users."
                    .to_string(),
            },
            server: ServerConfig::default(),
            limits: LimitsConfig::default(),
            scheduler: SchedulerConfig::default(),
            webhooks: WebhooksConfig::default(),
            storage: StorageConfig::default(),
        }
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("BOARDPILOT_MODEL") {
            if !v.trim().is_empty() {
                self.general.model = v;
            }
        }
        if let Ok(v) = std::env::var("BOARDPILOT_PORT") {
            if let Ok(port) = v.trim().parse() {
                self.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("BOARDPILOT_SQLITE_PATH") {
            if !v.trim().is_empty() {
                self.storage.sqlite_path = Some(v);
            }
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.general.model.trim().is_empty() {
            return Err(anyhow::anyhow!("general.model is required"));
        }
        if self.server.enabled && self.server.port == 0 {
            return Err(anyhow::anyhow!("server.port must be > 0"));
        }
        if self.limits.user_max_requests == 0 || self.limits.org_max_requests == 0 {
            return Err(anyhow::anyhow!("limits caps must be > 0"));
        }
        if self.limits.window_seconds <= 0 {
            return Err(anyhow::anyhow!("limits.window_seconds must be > 0"));
        }
        if self.scheduler.enabled && self.scheduler.tick_seconds == 0 {
            return Err(anyhow::anyhow!("scheduler.tick_seconds must be > 0"));
        }
        if self.webhooks.max_payload_bytes == 0 {
            return Err(anyhow::anyhow!("webhooks.max_payload_bytes must be > 0"));
        }
        Ok(())
    }
}

pub fn default_config_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    Path::new(&home).join(".boardpilot").join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dev_default_passes_validation() {
        BoardPilotConfig::dev_default().validate().unwrap();
    }

    #[test]
    fn minimal_toml_fills_defaults() {
        let cfg: BoardPilotConfig = toml::from_str(
            r#"
[general]
model = "scripted"
system_prompt = "manage the board"
"#,
        )
        .unwrap();
        assert!(cfg.server.enabled);
        assert_eq!(cfg.limits.window_seconds, 60);
        assert_eq!(cfg.scheduler.tick_seconds, 60);
        cfg.validate().unwrap();
    }

    #[test]
    fn zero_caps_are_rejected() {
        let cfg: BoardPilotConfig = toml::from_str(
            r#"
[general]
model = "scripted"
system_prompt = "x"

[limits]
user_max_requests = 0
"#,
        )
        .unwrap();
        assert!(cfg.validate().is_err());
    }
}
