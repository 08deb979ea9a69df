use crate::{Error, Result};
use base64::Engine;

/// Decrypt-at-use interface for stored secrets (webhook signing keys,
/// bring-your-own API keys). Encryption at rest is a deployment concern;
/// this layer only ever asks for the plaintext at the moment of use and
/// never writes it back.
pub trait SecretCipher: Send + Sync {
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

/// Dev cipher: ciphertexts are base64 of the plaintext. Enough to keep
/// secrets out of config files verbatim while tests stay deterministic.
#[derive(Debug, Default, Clone, Copy)]
pub struct DevSecretCipher;

impl DevSecretCipher {
    pub fn encrypt(plaintext: &str) -> String {
        base64::engine::general_purpose::STANDARD.encode(plaintext.as_bytes())
    }
}

impl SecretCipher for DevSecretCipher {
    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(ciphertext.trim())
            .map_err(|e| Error::backend("secret decode", e))?;
        String::from_utf8(bytes).map_err(|e| Error::backend("secret utf8", e))
    }
}
