//! Content-addressable blob store
//!
//! Blobs live at `<cas>/<hash[0:2]>/<hash[2:]>`. Writes go to a temporary
//! file under `<cas>/.incoming/` first, are hashed from the bytes actually
//! written, and are then renamed into place. Existing destinations are left
//! untouched, so `put` is idempotent and racing writers of the same content
//! both succeed.

use crate::domain::{ContentHash, Result, VaultError};
use crate::protection::checksum::sha256_file;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

const INCOMING_DIR: &str = ".incoming";

/// Sharded content-addressable store rooted at a directory
#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
}

impl ContentStore {
    /// Open (and create) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join(INCOMING_DIR))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Location of a blob, whether or not it exists
    pub fn path_for(&self, hash: &ContentHash) -> PathBuf {
        hash.path_under(&self.root)
    }

    pub fn contains(&self, hash: &ContentHash) -> bool {
        self.path_for(hash).is_file()
    }

    /// Store bytes and return their hash
    pub fn put(&self, bytes: &[u8]) -> Result<ContentHash> {
        let hash = ContentHash::of_bytes(bytes);
        let dst = self.path_for(&hash);
        if dst.is_file() {
            return Ok(hash);
        }
        let tmp = self.incoming_path();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        self.commit(&tmp, &dst)?;
        Ok(hash)
    }

    /// Store a file's contents and return their hash
    ///
    /// The file is copied first and the hash computed over the copy, so the
    /// returned hash always describes the stored bytes.
    pub fn put_file(&self, src: &Path) -> Result<ContentHash> {
        let tmp = self.incoming_path();
        fs::copy(src, &tmp).map_err(|e| {
            VaultError::Storage(format!("failed to copy {} into store: {e}", src.display()))
        })?;
        let digest = match sha256_file(&tmp) {
            Ok(d) => d,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
        };
        let hash = ContentHash::new(digest).map_err(VaultError::Storage)?;
        let dst = self.path_for(&hash);
        if dst.is_file() {
            fs::remove_file(&tmp)?;
            return Ok(hash);
        }
        self.commit(&tmp, &dst)?;
        Ok(hash)
    }

    /// Read a blob
    pub fn read(&self, hash: &ContentHash) -> Result<Vec<u8>> {
        let path = self.path_for(hash);
        fs::read(&path).map_err(|e| {
            VaultError::Storage(format!("failed to read blob {hash}: {e}"))
        })
    }

    /// Every blob hash currently stored
    pub fn list(&self) -> Result<Vec<ContentHash>> {
        let mut hashes = Vec::new();
        for shard in fs::read_dir(&self.root)? {
            let shard = shard?;
            let shard_name = shard.file_name().to_string_lossy().into_owned();
            if shard_name == INCOMING_DIR || !shard.file_type()?.is_dir() {
                continue;
            }
            for blob in fs::read_dir(shard.path())? {
                let blob = blob?;
                let name = format!("{shard_name}{}", blob.file_name().to_string_lossy());
                if let Ok(hash) = ContentHash::new(name) {
                    hashes.push(hash);
                }
            }
        }
        hashes.sort();
        Ok(hashes)
    }

    fn incoming_path(&self) -> PathBuf {
        self.root
            .join(INCOMING_DIR)
            .join(uuid::Uuid::new_v4().simple().to_string())
    }

    fn commit(&self, tmp: &Path, dst: &Path) -> Result<()> {
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        // A concurrent writer may have committed the same content meanwhile;
        // the rename then replaces identical bytes.
        fs::rename(tmp, dst).map_err(|e| {
            let _ = fs::remove_file(tmp);
            VaultError::Storage(format!("failed to commit blob {}: {e}", dst.display()))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protection::checksum::sha256_hex;

    #[test]
    fn test_put_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentStore::open(dir.path()).unwrap();

        let a = cas.put(b"protected object").unwrap();
        let b = cas.put(b"protected object").unwrap();
        assert_eq!(a, b);
        assert_eq!(cas.list().unwrap(), vec![a.clone()]);
        assert_eq!(a.as_str(), sha256_hex(b"protected object"));
    }

    #[test]
    fn test_put_distinct_content() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentStore::open(dir.path()).unwrap();
        let a = cas.put(b"one").unwrap();
        let b = cas.put(b"two").unwrap();
        assert_ne!(a, b);
        assert_eq!(cas.list().unwrap().len(), 2);
    }

    #[test]
    fn test_sharded_layout() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentStore::open(dir.path()).unwrap();
        let hash = cas.put(b"abc").unwrap();
        let expected = dir.path().join(&hash.as_str()[..2]).join(&hash.as_str()[2..]);
        assert!(expected.is_file());
        assert_eq!(cas.read(&hash).unwrap(), b"abc");
    }

    #[test]
    fn test_put_file_hashes_stored_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentStore::open(dir.path().join("cas")).unwrap();
        let src = dir.path().join("object.json");
        std::fs::write(&src, b"{\"a\":1}").unwrap();

        let hash = cas.put_file(&src).unwrap();
        assert_eq!(hash.as_str(), sha256_hex(b"{\"a\":1}"));
        assert_eq!(cas.put_file(&src).unwrap(), hash);
        assert_eq!(cas.put(b"{\"a\":1}").unwrap(), hash);
        assert_eq!(cas.list().unwrap().len(), 1);
    }

    #[test]
    fn test_put_file_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentStore::open(dir.path()).unwrap();
        assert!(cas.put_file(&dir.path().join("missing")).is_err());
    }

    #[test]
    fn test_concurrent_puts_of_same_content() {
        let dir = tempfile::tempdir().unwrap();
        let cas = ContentStore::open(dir.path()).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cas = cas.clone();
                std::thread::spawn(move || cas.put(b"same bytes").unwrap())
            })
            .collect();
        let hashes: Vec<ContentHash> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(hashes.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(cas.list().unwrap().len(), 1);
    }
}
