//! Key material held in configuration
//!
//! The process key arrives as hex text from the TOML file or the
//! environment. It is wrapped in a `secrecy::Secret` so it is zeroized on
//! drop, redacted in `Debug` output and only reachable via `expose_secret()`.
//!
//! ```rust
//! use medvault::config::secret_string;
//! use secrecy::ExposeSecret;
//!
//! let key = secret_string("00".repeat(32));
//! assert!(key.expose_secret().is_hex_key(32));
//! println!("{:?}", key); // Secret([REDACTED ...])
//! ```

use secrecy::{CloneableSecret, DebugSecret, Secret, SerializableSecret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use zeroize::Zeroize;

/// Secret text; zeroized on drop
#[derive(Clone, Zeroize)]
#[zeroize(drop)]
pub struct SecretValue(String);

impl CloneableSecret for SecretValue {}
impl DebugSecret for SecretValue {}
impl SerializableSecret for SecretValue {}

impl std::fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretValue([REDACTED])")
    }
}

impl From<String> for SecretValue {
    fn from(s: String) -> Self {
        SecretValue(s)
    }
}

impl PartialEq<str> for SecretValue {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl AsRef<str> for SecretValue {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl SecretValue {
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }

    /// Whether the value is exactly `len_bytes` bytes of hex (surrounding whitespace ignored)
    pub fn is_hex_key(&self, len_bytes: usize) -> bool {
        let text = self.0.trim();
        text.len() == len_bytes * 2 && text.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl Serialize for SecretValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SecretValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        String::deserialize(deserializer).map(SecretValue)
    }
}

/// Secret string: zeroized on drop, redacted in `Debug`
pub type SecretString = Secret<SecretValue>;

/// Wrap a string as a [`SecretString`]
#[inline]
pub fn secret_string(value: String) -> SecretString {
    Secret::new(SecretValue::from(value))
}

/// Wrap an optional string as an optional [`SecretString`]
#[inline]
pub fn secret_string_opt(value: Option<String>) -> Option<SecretString> {
    value.map(secret_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn test_secret_string_creation() {
        let secret = secret_string("00aa11bb".to_string());
        assert_eq!(secret.expose_secret(), "00aa11bb");
    }

    #[test]
    fn test_secret_string_opt() {
        assert!(secret_string_opt(Some("00aa".to_string())).is_some());
        assert!(secret_string_opt(None).is_none());
    }

    #[test]
    fn test_is_hex_key() {
        assert!(secret_string("ab".repeat(32)).expose_secret().is_hex_key(32));
        assert!(secret_string(format!(" {} ", "AB".repeat(32)))
            .expose_secret()
            .is_hex_key(32));
        assert!(!secret_string("ab".repeat(31)).expose_secret().is_hex_key(32));
        assert!(!secret_string("xy".repeat(32)).expose_secret().is_hex_key(32));
    }

    #[test]
    fn test_secret_debug_redacted() {
        let secret = secret_string("deadbeefcafe".to_string());
        let debug_output = format!("{secret:?}");
        assert!(!debug_output.contains("deadbeefcafe"));
    }

    #[test]
    fn test_secret_serde() {
        #[derive(Serialize, Deserialize)]
        struct KeySection {
            key_hex: SecretString,
        }

        let section: KeySection = toml::from_str("key_hex = \"c0ffee\"").unwrap();
        assert_eq!(section.key_hex.expose_secret(), "c0ffee");
        assert!(toml::to_string(&section).unwrap().contains("c0ffee"));
    }
}
