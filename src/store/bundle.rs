//! Zip bundle archives
//!
//! A bundle holds one protected imaging object (`<patient>.dcm`), its
//! record bundle (`<patient>.json`) and, when present, the batch manifest
//! with its signature and public key, all deflate-compressed.

use crate::domain::{Result, VaultError};
use crate::protection::manifest::{MANIFEST_FILE, PUBLIC_KEY_FILE, SIGNATURE_FILE};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Upper bound on a single decompressed entry
const MAX_ENTRY_BYTES: u64 = 512 * 1024 * 1024;

/// Write named entries to a new archive at `dest`
pub fn write_bundle(dest: &Path, entries: &[(String, Vec<u8>)]) -> Result<()> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(dest)?;
    let mut zip = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for (name, bytes) in entries {
        zip.start_file(name.as_str(), options)?;
        zip.write_all(bytes)?;
    }
    zip.finish()?;
    Ok(())
}

/// Decompressed contents of a bundle archive, keyed by entry name
#[derive(Debug, Clone, Default)]
pub struct BundleContents {
    entries: BTreeMap<String, Vec<u8>>,
}

impl BundleContents {
    /// Read every file entry of the archive at `path`
    pub fn read(path: &Path) -> Result<Self> {
        let file = File::open(path)
            .map_err(|e| VaultError::Bundle(format!("cannot open {}: {e}", path.display())))?;
        let mut archive = ZipArchive::new(file)?;
        let mut entries = BTreeMap::new();

        for i in 0..archive.len() {
            let entry = archive.by_index(i)?;
            if entry.is_dir() {
                continue;
            }
            // Entry names are used as file names when extracting; reject anything
            // that is not a single plain component.
            let Some(name) = entry
                .enclosed_name()
                .filter(|p| p.components().count() == 1)
                .and_then(|p| p.to_str().map(str::to_string))
            else {
                return Err(VaultError::Bundle(format!(
                    "unsafe entry name in bundle: {}",
                    entry.name()
                )));
            };
            let mut bytes = Vec::new();
            entry.take(MAX_ENTRY_BYTES + 1).read_to_end(&mut bytes)?;
            if bytes.len() as u64 > MAX_ENTRY_BYTES {
                return Err(VaultError::Bundle(format!("entry {name} exceeds size limit")));
            }
            entries.insert(name, bytes);
        }
        Ok(Self { entries })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    /// First `.dcm` entry by name
    pub fn imaging_entry(&self) -> Option<(&str, &[u8])> {
        self.entries
            .iter()
            .find(|(name, _)| name.ends_with(".dcm"))
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
    }

    /// First `.json` entry by name that is not the batch manifest
    pub fn record_entry(&self) -> Option<(&str, &[u8])> {
        self.entries
            .iter()
            .find(|(name, _)| name.ends_with(".json") && name.as_str() != MANIFEST_FILE)
            .map(|(name, bytes)| (name.as_str(), bytes.as_slice()))
    }

    pub fn manifest(&self) -> Option<&[u8]> {
        self.get(MANIFEST_FILE)
    }

    pub fn signature(&self) -> Option<&[u8]> {
        self.get(SIGNATURE_FILE)
    }

    pub fn public_key(&self) -> Option<&[u8]> {
        self.get(PUBLIC_KEY_FILE)
    }
}
