//! Process key handle
//!
//! The single symmetric key used for tokenization, field encryption and the
//! fallback keystream. It is threaded explicitly (`Arc<KeyHandle>`) through
//! the protector and the verifier instead of living in global state.

use crate::config::SecretString;
use crate::domain::{Result, VaultError};
use crate::protection::checksum::sha256_hex;
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};

/// Length of the raw key in bytes
pub const KEY_LEN: usize = 32;

/// Length of the externally visible key hint in hex characters
pub const KEY_HINT_LEN: usize = 16;

/// Owned 32-byte key, zeroized on drop
pub struct KeyHandle {
    key: Secret<[u8; KEY_LEN]>,
}

impl KeyHandle {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self {
            key: Secret::new(bytes),
        }
    }

    /// Decode a 64-character hex key
    pub fn from_hex(key_hex: &str) -> Result<Self> {
        let decoded = hex::decode(key_hex.trim())
            .map_err(|e| VaultError::Key(format!("key is not valid hex: {e}")))?;
        let bytes: [u8; KEY_LEN] = decoded.try_into().map_err(|v: Vec<u8>| {
            VaultError::Key(format!("key must be {KEY_LEN} bytes, got {}", v.len()))
        })?;
        Ok(Self::from_bytes(bytes))
    }

    /// Decode a key held in a configuration secret
    pub fn from_secret(secret: &SecretString) -> Result<Self> {
        Self::from_hex(secret.expose_secret().as_ref())
    }

    /// Generate a fresh random key from the OS RNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    /// First 16 hex characters of SHA-256(key); safe to log and persist
    pub fn key_hint(&self) -> String {
        let mut hint = sha256_hex(self.key.expose_secret());
        hint.truncate(KEY_HINT_LEN);
        hint
    }

    pub(crate) fn bytes(&self) -> &[u8; KEY_LEN] {
        self.key.expose_secret()
    }

    /// Hex encoding of the raw key, for handing a generated key to an operator
    pub(crate) fn to_hex(&self) -> String {
        hex::encode(self.key.expose_secret())
    }
}

impl std::fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHandle")
            .field("key_hint", &self.key_hint())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::secret_string;

    const KEY_HEX: &str = "000102030405060708090a0b0c0d0e0f101112131415161718191a1b1c1d1e1f";

    #[test]
    fn test_from_hex_valid() {
        let key = KeyHandle::from_hex(KEY_HEX).unwrap();
        assert_eq!(key.bytes()[31], 0x1f);
    }

    #[test]
    fn test_from_hex_wrong_length() {
        let err = KeyHandle::from_hex("0011").unwrap_err();
        assert!(matches!(err, VaultError::Key(_)));
    }

    #[test]
    fn test_from_hex_not_hex() {
        assert!(KeyHandle::from_hex(&"zz".repeat(32)).is_err());
    }

    #[test]
    fn test_from_secret() {
        let secret = secret_string(KEY_HEX.to_string());
        let key = KeyHandle::from_secret(&secret).unwrap();
        assert_eq!(key.key_hint(), KeyHandle::from_hex(KEY_HEX).unwrap().key_hint());
    }

    #[test]
    fn test_key_hint_shape() {
        let key = KeyHandle::from_hex(KEY_HEX).unwrap();
        let hint = key.key_hint();
        assert_eq!(hint.len(), KEY_HINT_LEN);
        assert!(hint.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hint, &sha256_hex(key.bytes())[..KEY_HINT_LEN]);
    }

    #[test]
    fn test_debug_does_not_leak_key() {
        let key = KeyHandle::from_hex(KEY_HEX).unwrap();
        let debug = format!("{key:?}");
        assert!(!debug.contains("0001020304"));
        assert!(debug.contains(&key.key_hint()));
    }

    #[test]
    fn test_generate_distinct() {
        assert_ne!(KeyHandle::generate().key_hint(), KeyHandle::generate().key_hint());
    }
}
