//! SHA-256 helpers shared by protection, storage and verification
//!
//! Every hash that ends up in a manifest, the index or the CAS goes through
//! this module so the hex encoding is identical everywhere.

use crate::domain::Result;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Hex-encoded SHA-256 of raw bytes (64 lowercase characters)
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    format!("{result:x}")
}

/// Raw SHA-256 digest of raw bytes
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// Hex-encoded SHA-256 of a file, streamed in 1 MiB chunks
pub fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; 1 << 20];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

/// Serialize JSON with recursively sorted object keys and no whitespace
///
/// Used wherever a hash is computed over a JSON value that might be
/// re-serialized by another component (manifest chain links).
pub fn canonical_json(data: &Value) -> Result<String> {
    let normalized = normalize_json(data);
    Ok(serde_json::to_string(&normalized)?)
}

fn normalize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sorted: std::collections::BTreeMap<String, Value> =
                std::collections::BTreeMap::new();
            for (k, v) in map {
                sorted.insert(k.clone(), normalize_json(v));
            }
            Value::Object(sorted.into_iter().collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(normalize_json).collect()),
        _ => value.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_sha256_hex_known_value() {
        assert_eq!(
            sha256_hex(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_sha256_file_matches_bytes() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"Test data").unwrap();
        file.flush().unwrap();

        assert_eq!(sha256_file(file.path()).unwrap(), sha256_hex(b"Test data"));
    }

    #[test]
    fn test_sha256_file_missing() {
        assert!(sha256_file(Path::new("/nonexistent/file.bin")).is_err());
    }

    #[test]
    fn test_canonical_json_key_order_independence() {
        let a = json!({"a": 1, "b": {"y": 2, "x": 3}});
        let b = json!({"b": {"x": 3, "y": 2}, "a": 1});
        assert_eq!(canonical_json(&a).unwrap(), canonical_json(&b).unwrap());
        assert_eq!(canonical_json(&a).unwrap(), r#"{"a":1,"b":{"x":3,"y":2}}"#);
    }
}
