//! Webhook trigger gate.
//!
//! Admission order matters: size bounds are enforced before any
//! signature work, and the three authentication-shaped rejections
//! (unknown endpoint, disabled endpoint, bad signature) all surface as
//! the same `SignatureInvalid` error so responses cannot be used to
//! enumerate endpoint ids.

use bd_core::secrets::SecretCipher;
use bd_core::webhook::{WebhookEndpoint, WebhookStore};
use bd_core::{Error, Result};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::Arc;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// A delivery that passed every admission check.
#[derive(Debug, Clone)]
pub struct AdmittedDelivery {
    pub endpoint: WebhookEndpoint,
    pub payload: serde_json::Value,
}

pub struct WebhookGate {
    store: Arc<dyn WebhookStore>,
    cipher: Arc<dyn SecretCipher>,
    max_payload_bytes: usize,
}

impl WebhookGate {
    pub fn new(
        store: Arc<dyn WebhookStore>,
        cipher: Arc<dyn SecretCipher>,
        max_payload_bytes: usize,
    ) -> Self {
        Self {
            store,
            cipher,
            max_payload_bytes,
        }
    }

    #[tracing::instrument(level = "info", skip_all, fields(webhook_id = %webhook_id))]
    pub async fn admit(
        &self,
        webhook_id: Uuid,
        declared_len: Option<usize>,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<AdmittedDelivery> {
        if declared_len.is_some_and(|len| len > self.max_payload_bytes)
            || body.len() > self.max_payload_bytes
        {
            return Err(Error::InvalidInput(format!(
                "payload exceeds {} byte limit",
                self.max_payload_bytes
            )));
        }

        let endpoint = match self.store.get(webhook_id).await? {
            Some(endpoint) if endpoint.enabled => endpoint,
            Some(_) => {
                tracing::info!("delivery for disabled webhook rejected");
                return Err(Error::SignatureInvalid);
            }
            None => {
                tracing::info!("delivery for unknown webhook rejected");
                return Err(Error::SignatureInvalid);
            }
        };

        let Some(signature) = signature else {
            return Err(Error::SignatureInvalid);
        };
        let secret = self
            .cipher
            .decrypt(&endpoint.secret_ciphertext)
            .map_err(|e| {
                tracing::error!(error = %e, "webhook secret decrypt failed");
                Error::SignatureInvalid
            })?;
        verify_signature(&secret, signature, body)?;

        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| Error::InvalidInput(format!("payload is not valid json: {e}")))?;

        Ok(AdmittedDelivery { endpoint, payload })
    }
}

/// Verifies an HMAC-SHA256 signature over the raw payload bytes.
///
/// Accepts raw hex or `sha256=<hex>`. `Mac::verify_slice` compares in
/// constant time.
pub fn verify_signature(secret: &str, signature_header: &str, body: &[u8]) -> Result<()> {
    let sig = signature_header.trim();
    let sig_hex = sig.strip_prefix("sha256=").unwrap_or(sig);
    let provided = hex::decode(sig_hex).map_err(|_| Error::SignatureInvalid)?;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| Error::SignatureInvalid)?;
    mac.update(body);
    mac.verify_slice(&provided)
        .map_err(|_| Error::SignatureInvalid)?;
    Ok(())
}

/// Computes the signature header value for `body`: `sha256=<hex>`.
pub fn sign_body(secret: &str, body: &[u8]) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac accepts any key length");
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bd_core::dev::DevWebhookStore;
    use bd_core::models::{OrgId, ProjectId, UserId};
    use bd_core::secrets::DevSecretCipher;
    use chrono::Utc;

    const SECRET: &str = "whsec_test";

    async fn gate_with_endpoint(enabled: bool) -> (WebhookGate, Uuid) {
        let store = Arc::new(DevWebhookStore::new());
        let endpoint = WebhookEndpoint {
            id: Uuid::new_v4(),
            org_id: OrgId(Uuid::nil()),
            project_id: ProjectId(Uuid::nil()),
            name: "ci".to_string(),
            secret_ciphertext: DevSecretCipher::encrypt(SECRET),
            instruction: "file a task for the failure".to_string(),
            enabled,
            created_by: UserId(Uuid::nil()),
            created_at: Utc::now(),
        };
        let id = endpoint.id;
        store.insert(&endpoint).await.unwrap();
        let gate = WebhookGate::new(store, Arc::new(DevSecretCipher), 1024);
        (gate, id)
    }

    #[tokio::test]
    async fn valid_signature_is_admitted() {
        let (gate, id) = gate_with_endpoint(true).await;
        let body = br#"{"event":"build_failed","build":41}"#;
        let signature = sign_body(SECRET, body);

        let admitted = gate
            .admit(id, Some(body.len()), Some(&signature), body)
            .await
            .unwrap();
        assert_eq!(
            admitted.payload.get("event").and_then(|v| v.as_str()),
            Some("build_failed")
        );
    }

    #[tokio::test]
    async fn tampered_byte_rejects() {
        let (gate, id) = gate_with_endpoint(true).await;
        let body = br#"{"event":"build_failed","build":41}"#;
        let signature = sign_body(SECRET, body);
        let tampered = br#"{"event":"build_failed","build":42}"#;

        let err = gate
            .admit(id, Some(tampered.len()), Some(&signature), tampered)
            .await
            .expect_err("tampered payload must reject");
        assert!(matches!(err, Error::SignatureInvalid));
    }

    #[tokio::test]
    async fn unknown_disabled_and_bad_signature_are_indistinguishable() {
        let (gate, id) = gate_with_endpoint(true).await;
        let (disabled_gate, disabled_id) = gate_with_endpoint(false).await;
        let body = br#"{}"#;

        let unknown = gate
            .admit(Uuid::new_v4(), None, Some("sha256=00"), body)
            .await
            .expect_err("unknown id rejects");
        let disabled = disabled_gate
            .admit(disabled_id, None, Some(&sign_body(SECRET, body)), body)
            .await
            .expect_err("disabled endpoint rejects");
        let bad_sig = gate
            .admit(id, None, Some(&sign_body("wrong secret", body)), body)
            .await
            .expect_err("bad signature rejects");

        assert_eq!(unknown.to_string(), disabled.to_string());
        assert_eq!(disabled.to_string(), bad_sig.to_string());
    }

    #[tokio::test]
    async fn oversized_payload_rejects_before_signature_work() {
        let (gate, _) = gate_with_endpoint(true).await;
        let body = vec![b'x'; 2048];

        // Unknown endpoint id: if signature/lookup ran first this would
        // be SignatureInvalid, so InvalidInput proves the size check
        // short-circuited.
        let err = gate
            .admit(Uuid::new_v4(), Some(body.len()), None, &body)
            .await
            .expect_err("oversized payload must reject");
        assert!(matches!(err, Error::InvalidInput(_)));

        // A truthful Content-Length alone is enough to reject.
        let err = gate
            .admit(Uuid::new_v4(), Some(4096), None, b"{}")
            .await
            .expect_err("oversized declared length must reject");
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn missing_signature_header_rejects() {
        let (gate, id) = gate_with_endpoint(true).await;
        let err = gate
            .admit(id, None, None, b"{}")
            .await
            .expect_err("missing signature must reject");
        assert!(matches!(err, Error::SignatureInvalid));
    }
}
