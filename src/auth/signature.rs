//! HMAC-SHA256 signing for bearer tokens.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::auth::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// Signs and verifies token signing input with one shared secret.
#[derive(Clone)]
pub struct SignatureEngine {
    mac: HmacSha256,
}

impl SignatureEngine {
    /// Key the engine. An empty secret is refused.
    pub fn new(secret: &[u8]) -> Result<Self, AuthError> {
        if secret.is_empty() {
            return Err(AuthError::Misconfigured(
                "signing secret must not be empty".to_string(),
            ));
        }

        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| AuthError::Misconfigured(format!("invalid HMAC key: {}", e)))?;

        Ok(Self { mac })
    }

    /// `base64url(HMAC-SHA256(secret, signing_input))` without padding.
    pub fn sign(&self, signing_input: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(signing_input.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }

    /// Recompute the MAC and compare it in constant time.
    pub fn verify(&self, signing_input: &str, signature: &str) -> bool {
        let Ok(provided) = URL_SAFE_NO_PAD.decode(signature) else {
            return false;
        };

        let mut mac = self.mac.clone();
        mac.update(signing_input.as_bytes());
        mac.verify_slice(&provided).is_ok()
    }
}

impl std::fmt::Debug for SignatureEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureEngine")
            .field("algorithm", &"HS256")
            .finish_non_exhaustive()
    }
}
