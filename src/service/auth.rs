//! Config API credentials
//!
//! The expected key comes from `CONFIG_API_KEY`. When it is unset the
//! configuration API is disabled outright rather than left open.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Environment variable holding the config API secret
pub const CONFIG_API_KEY_ENV: &str = "CONFIG_API_KEY";

#[derive(Clone, Default)]
pub struct ApiCredentials {
    secret: Option<String>,
}

impl std::fmt::Debug for ApiCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiCredentials")
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl ApiCredentials {
    pub fn new(secret: impl Into<String>) -> Self {
        let secret = secret.into();
        Self {
            secret: Some(secret).filter(|s| !s.is_empty()),
        }
    }

    /// No secret: every credential-checked call fails with `ApiDisabled`
    pub fn disabled() -> Self {
        Self { secret: None }
    }

    pub fn from_env() -> Self {
        match std::env::var(CONFIG_API_KEY_ENV) {
            Ok(secret) => Self::new(secret),
            Err(_) => Self::disabled(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// Check a caller-supplied key.
    ///
    /// Both sides are reduced to HMAC-SHA256 tags keyed by the secret and
    /// compared with `verify_slice`, which runs in constant time.
    pub fn verify(&self, provided: Option<&str>) -> Result<(), ServiceError> {
        let secret = self.secret.as_deref().ok_or(ServiceError::ApiDisabled)?;
        let provided = provided.ok_or(ServiceError::Unauthorized)?;

        let expected = tag(secret, secret)?;
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| ServiceError::Unauthorized)?;
        mac.update(provided.as_bytes());
        mac.verify_slice(&expected).map_err(|_| ServiceError::Unauthorized)
    }
}

fn tag(key: &str, message: &str) -> Result<Vec<u8>, ServiceError> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes()).map_err(|_| ServiceError::Unauthorized)?;
    mac.update(message.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}
