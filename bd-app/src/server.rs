//! Thin HTTP surface over the runtime.
//!
//! The routing layer stays deliberately small: it hosts the webhook
//! receiver (where the trigger gate's uniform rejection contract is
//! observable), the undo and activity endpoints, and schedule
//! management. Everything else is the components' behavior.

use crate::config::BoardPilotConfig;
use crate::dev_runtime::{build_runtime, AppRuntime};
use crate::routes;
use axum::Router;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AppRuntime>,
}

pub fn router(state: AppState) -> Router {
    routes::router(state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

pub async fn serve(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path).await?;
    let runtime = Arc::new(build_runtime(config)?);

    if runtime.config.scheduler.enabled {
        runtime
            .scheduler
            .clone()
            .start(std::time::Duration::from_secs(
                runtime.config.scheduler.tick_seconds,
            ))
            .await;
    }

    if !runtime.config.server.enabled {
        tracing::info!("server disabled; scheduler-only mode, waiting for ctrl-c");
        tokio::signal::ctrl_c().await?;
        runtime.scheduler.shutdown().await;
        return Ok(());
    }

    let state = AppState {
        runtime: runtime.clone(),
    };
    let app = router(state);
    let addr = format!("0.0.0.0:{}", runtime.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "boardpilot listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    runtime.scheduler.shutdown().await;
    runtime.ledger.flush().await;
    Ok(())
}

pub async fn doctor(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let config = load_config(config_path).await?;
    config.validate()?;
    println!("config: ok (model {})", config.general.model);

    let runtime = build_runtime(config)?;
    let schedules = runtime.scheduler.list(runtime.org_id).await?;
    println!(
        "storage: ok ({} schedule(s) visible)",
        schedules.len()
    );
    println!(
        "dev seed: org {} project {} user {}",
        runtime.org_id, runtime.project_id, runtime.dev_user
    );
    println!(
        "server: {} on port {}",
        if runtime.config.server.enabled {
            "enabled"
        } else {
            "disabled"
        },
        runtime.config.server.port
    );
    Ok(())
}

async fn load_config(config_path: Option<PathBuf>) -> anyhow::Result<BoardPilotConfig> {
    match config_path {
        Some(path) => BoardPilotConfig::load(Some(path)).await,
        None => {
            let default_path = crate::config::default_config_path();
            if tokio::fs::try_exists(&default_path).await.unwrap_or(false) {
                BoardPilotConfig::load(Some(default_path)).await
            } else {
                tracing::info!(
                    path = %default_path.display(),
                    "no config file found; using dev defaults"
                );
                Ok(BoardPilotConfig::dev_default())
            }
        }
    }
}
