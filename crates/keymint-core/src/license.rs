//! License Key Derivation
//!
//! Keys are a pure, deterministic function of (hardware id, user name,
//! secret): the desktop application re-derives the expected key from
//! the same inputs at activation time, so both sides must agree
//! byte-for-byte. SHA-256 is fixed by contract; a language-default hash
//! would not be stable across platforms or releases.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::config::LicenseConfig;
use crate::error::{CoreError, Result};

/// Length of a license key in hex characters (12 digest bytes)
const KEY_LEN: usize = 24;

/// A derived license key: 24 upper-case hex characters bound to
/// (hardware id, user name, secret).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LicenseKey(String);

impl LicenseKey {
    /// Wrap a user-supplied key, normalizing case and edge whitespace
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into().trim().to_uppercase())
    }

    /// Get the key as a string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic license key deriver.
///
/// Holds the configured secret; construction fails if the secret is
/// absent so that a misconfigured service aborts fulfillment before
/// touching any downstream step.
#[derive(Clone, Debug)]
pub struct KeyDeriver {
    secret: String,
}

impl KeyDeriver {
    /// Create a deriver from configuration.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Config` when the secret is empty.
    pub fn new(config: &LicenseConfig) -> Result<Self> {
        if config.secret.trim().is_empty() {
            return Err(CoreError::Config("license secret is not configured".into()));
        }
        Ok(Self {
            secret: config.secret.clone(),
        })
    }

    /// Derive the license key for a hardware id and user name.
    ///
    /// The name is trimmed and upper-cased, the hardware id only
    /// trimmed; the digest input is `hwid|NAME|secret`. Total for any
    /// non-empty inputs, never dependent on time, sale id, or amount.
    pub fn derive(&self, hardware_id: &str, user_name: &str) -> LicenseKey {
        let clean_name = user_name.trim().to_uppercase();
        let clean_hwid = hardware_id.trim();

        let raw = format!("{clean_hwid}|{clean_name}|{}", self.secret);
        let digest = Sha256::digest(raw.as_bytes());

        LicenseKey(hex::encode(digest)[..KEY_LEN].to_uppercase())
    }

    /// Check a user-supplied key against a fresh derivation.
    ///
    /// Tolerant of key casing and surrounding whitespace; hardware id
    /// and name receive only the trims specified for `derive`.
    pub fn verify(&self, key: &str, hardware_id: &str, user_name: &str) -> bool {
        LicenseKey::from_string(key) == self.derive(hardware_id, user_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deriver(secret: &str) -> KeyDeriver {
        KeyDeriver::new(&LicenseConfig {
            secret: secret.into(),
        })
        .unwrap()
    }

    #[test]
    fn test_known_vector() {
        let key = deriver("S3CR3T").derive("ABC-123", "Jane Doe");
        assert_eq!(key.as_str(), "FC1F02D5C55BD6C75B2B074F");
    }

    #[test]
    fn test_derive_is_deterministic() {
        let d = deriver("secret");
        assert_eq!(d.derive("HW-1", "Alice"), d.derive("HW-1", "Alice"));
    }

    #[test]
    fn test_key_shape() {
        let key = deriver("secret").derive("HW-1", "Alice");
        assert_eq!(key.as_str().len(), 24);
        assert!(key
            .as_str()
            .chars()
            .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
    }

    #[test]
    fn test_name_normalization_invariance() {
        let d = deriver("S3CR3T");
        let reference = d.derive("ABC-123", "Jane Doe");
        assert_eq!(d.derive("ABC-123", "JANE DOE"), reference);
        assert_eq!(d.derive("ABC-123", "  jane doe  "), reference);
    }

    #[test]
    fn test_hwid_edge_trim_but_inner_sensitivity() {
        let d = deriver("S3CR3T");
        let reference = d.derive("ABC-123", "Jane Doe");
        assert_eq!(d.derive("  ABC-123  ", "Jane Doe"), reference);
        assert_ne!(d.derive("ABC-124", "Jane Doe"), reference);
        assert_ne!(d.derive("abc-123", "Jane Doe"), reference);
    }

    #[test]
    fn test_secret_changes_key() {
        let a = deriver("secret-a").derive("HW-1", "Alice");
        let b = deriver("secret-b").derive("HW-1", "Alice");
        assert_ne!(a, b);
    }

    #[test]
    fn test_verify_round_trip() {
        let d = deriver("S3CR3T");
        let key = d.derive("ABC-123", "Jane Doe");
        assert!(d.verify(key.as_str(), "ABC-123", "Jane Doe"));
    }

    #[test]
    fn test_verify_tolerates_key_case_and_whitespace() {
        let d = deriver("S3CR3T");
        let key = d.derive("ABC-123", "Jane Doe");
        let sloppy = format!("  {}  ", key.as_str().to_lowercase());
        assert!(d.verify(&sloppy, "ABC-123", "Jane Doe"));
        assert!(!d.verify(key.as_str(), "XYZ-999", "Jane Doe"));
    }

    #[test]
    fn test_empty_secret_rejected() {
        let err = KeyDeriver::new(&LicenseConfig { secret: "  ".into() }).unwrap_err();
        assert!(matches!(err, CoreError::Config(_)));
    }
}
