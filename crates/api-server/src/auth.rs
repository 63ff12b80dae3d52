//! Request token verification: `hex(HMAC-SHA256(secret, session_id))`.

use funnel_core::TokenVerifier;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

#[derive(Clone)]
pub struct HmacTokenVerifier {
    secret: Vec<u8>,
    enforce: bool,
}

impl HmacTokenVerifier {
    pub fn new(secret: impl AsRef<[u8]>, enforce: bool) -> Self {
        Self {
            secret: secret.as_ref().to_vec(),
            enforce,
        }
    }

    /// Token a page should embed for `session_id`.
    pub fn token_for(&self, session_id: &str) -> Option<String> {
        let mut mac = self.mac()?;
        mac.update(session_id.as_bytes());
        Some(hex::encode(mac.finalize().into_bytes()))
    }

    fn mac(&self) -> Option<HmacSha256> {
        HmacSha256::new_from_slice(&self.secret).ok()
    }
}

impl TokenVerifier for HmacTokenVerifier {
    fn verify(&self, session_id: &str, token: &str) -> bool {
        if !self.enforce {
            return true;
        }
        let Ok(signature) = hex::decode(token.trim()) else {
            debug!(session_id, "Request token is not hex");
            return false;
        };
        let Some(mut mac) = self.mac() else {
            return false;
        };
        mac.update(session_id.as_bytes());
        mac.verify_slice(&signature).is_ok()
    }
}

impl std::fmt::Debug for HmacTokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmacTokenVerifier")
            .field("enforce", &self.enforce)
            .finish()
    }
}
