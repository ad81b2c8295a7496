use crate::common::config::AdminConfig;
use crate::common::{VoteError, Result};
use crate::service::source::SourceOutcome;
use data_encoding::HEXLOWER_PERMISSIVE;
use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

pub type HmacSha256 = Hmac<Sha256>;

/// Gatekeeper for candidate management and other administrative actions.
pub trait AdminAuthenticator: Send + Sync {
    fn verify(&self, password: &str) -> SourceOutcome<bool>;
}

/// Compares HMAC-SHA256(key, password) with a configured digest.
pub struct HmacAdminAuthenticator {
    key: Vec<u8>,
    digest: Option<Vec<u8>>,
}

impl HmacAdminAuthenticator {
    pub fn from_config(config: &AdminConfig) -> Result<Self> {
        let digest = if config.password_digest.trim().is_empty() {
            None
        } else {
            let bytes = HEXLOWER_PERMISSIVE
                .decode(config.password_digest.trim().as_bytes())
                .map_err(|e| VoteError::Validation(format!("admin password digest is not hex: {}", e)))?;
            Some(bytes)
        };

        Ok(Self { key: config.key.as_bytes().to_vec(), digest })
    }

    pub fn is_configured(&self) -> bool {
        self.digest.is_some()
    }
}

impl AdminAuthenticator for HmacAdminAuthenticator {
    fn verify(&self, password: &str) -> SourceOutcome<bool> {
        let Some(expected) = &self.digest else {
            return SourceOutcome::Unavailable("no admin password configured".into());
        };

        let mut mac = match HmacSha256::new_from_slice(&self.key) {
            Ok(mac) => mac,
            Err(e) => return SourceOutcome::Unavailable(format!("invalid admin key: {}", e)),
        };
        mac.update(password.as_bytes());

        // Constant time comparison
        SourceOutcome::Ready(mac.verify_slice(expected).is_ok())
    }
}

/// Hex digest to put in `admin.password_digest`.
pub fn digest_password(key: &str, password: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key.as_bytes())
        .map_err(|e| VoteError::Validation(format!("invalid admin key: {}", e)))?;
    mac.update(password.as_bytes());
    Ok(HEXLOWER_PERMISSIVE.encode(&mac.finalize().into_bytes()))
}

/// Fresh random key for `admin.key`.
pub fn generate_key() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    HEXLOWER_PERMISSIVE.encode(&bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured(password: &str) -> HmacAdminAuthenticator {
        let key = generate_key();
        let config = AdminConfig {
            password_digest: digest_password(&key, password).unwrap(),
            key,
        };
        HmacAdminAuthenticator::from_config(&config).unwrap()
    }

    #[test]
    fn test_verify_password() {
        let auth = configured("hunter2");
        assert!(auth.is_configured());
        assert_eq!(auth.verify("hunter2"), SourceOutcome::Ready(true));
        assert_eq!(auth.verify("hunter3"), SourceOutcome::Ready(false));
    }

    #[test]
    fn test_unconfigured_is_unavailable() {
        let auth = HmacAdminAuthenticator::from_config(&AdminConfig::default()).unwrap();
        assert!(!auth.is_configured());
        assert!(matches!(auth.verify("anything"), SourceOutcome::Unavailable(_)));
    }

    #[test]
    fn test_bad_digest_rejected() {
        let config = AdminConfig { key: "k".into(), password_digest: "not-hex".into() };
        assert!(matches!(
            HmacAdminAuthenticator::from_config(&config),
            Err(VoteError::Validation(_))
        ));
    }

    #[test]
    fn test_generated_keys_differ() {
        let key = generate_key();
        assert_eq!(key.len(), 64);
        assert_ne!(key, generate_key());
    }
}
