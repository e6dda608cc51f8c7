//! Per-field protection: token + authenticated ciphertext + integrity hash

use crate::domain::Result;
use crate::protection::checksum::sha256_hex;
use crate::protection::cipher::{associated_data, field_nonce, linkage_nonce, FieldCipher};
use crate::protection::models::{cell_text, ProtectedField, TEXT_ONLY_SOP};
use crate::protection::tokenizer::{FieldKind, Tokenizer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Linkage domain shared by the imaging patient identifier and the tabular
/// patient identifier column
pub const PATIENT_LINKAGE_DOMAIN: &str = "patient_id";

/// Prefix of the associated-data tag for tabular columns
const TEXT_COLUMN_PREFIX: &str = "text_col:";

/// Description of one field to protect
#[derive(Debug, Clone, Copy)]
pub struct FieldRequest<'a> {
    /// Name recorded in the protection record
    pub name: &'a str,
    /// Tag bound into associated data and nonce for ordinary fields
    pub tag: &'a str,
    pub kind: FieldKind,
    /// Set for linkage keys; equal values in the same domain seal identically
    pub linkage_domain: Option<&'a str>,
}

/// Protected columns of one tabular row
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectedColumns {
    pub tokens: BTreeMap<String, String>,
    pub ciphers: BTreeMap<String, ProtectedField>,
}

/// Applies the tokenizer and field cipher to sensitive values
#[derive(Debug, Clone)]
pub struct FieldProtector {
    tokenizer: Tokenizer,
    cipher: FieldCipher,
}

impl FieldProtector {
    pub fn new(tokenizer: Tokenizer, cipher: FieldCipher) -> Self {
        Self { tokenizer, cipher }
    }

    pub fn tokenizer(&self) -> &Tokenizer {
        &self.tokenizer
    }

    pub fn cipher(&self) -> &FieldCipher {
        &self.cipher
    }

    /// Protect a single value owned by imaging object `imaging_id` in batch `assoc`
    pub fn protect_value(
        &self,
        request: FieldRequest<'_>,
        value: Option<&str>,
        imaging_id: &str,
        assoc: &str,
    ) -> Result<ProtectedField> {
        let is_linkage_key = request.linkage_domain.is_some();
        let value = match value {
            Some(v) if !v.trim().is_empty() => v,
            _ => return Ok(ProtectedField::empty(request.name, is_linkage_key)),
        };

        let (nonce, ad) = match request.linkage_domain {
            Some(domain) => (
                linkage_nonce(value, domain),
                associated_data(&format!("linkage:{domain}"), "", assoc),
            ),
            None => (
                field_nonce(imaging_id, request.tag),
                associated_data(request.tag, imaging_id, assoc),
            ),
        };

        let ciphertext = self.cipher.seal(&nonce, value.as_bytes(), &ad)?;

        Ok(ProtectedField {
            name: request.name.to_string(),
            token: self.tokenizer.tokenize(request.kind, value),
            ciphertext: Some(ciphertext),
            hash: Some(sha256_hex(value.as_bytes())),
            associated_data: Some(ad),
            nonce: Some(hex::encode(nonce)),
            is_linkage_key,
        })
    }

    /// Protect the configured columns of a tabular row
    ///
    /// Columns absent from the row are skipped; present but blank columns get
    /// an empty record. `linkage_column` is protected as a patient linkage key.
    pub fn protect_record(
        &self,
        row: &Map<String, Value>,
        columns: &[String],
        linkage_column: &str,
        assoc: &str,
    ) -> Result<ProtectedColumns> {
        let sop_hint = row
            .get(linkage_column)
            .and_then(cell_text)
            .unwrap_or_else(|| TEXT_ONLY_SOP.to_string());

        let mut out = ProtectedColumns::default();
        for column in columns {
            let Some(raw) = row.get(column) else {
                continue;
            };
            let value = cell_text(raw);
            let kind = value
                .as_deref()
                .map(FieldKind::infer_for_text)
                .unwrap_or(FieldKind::Alnum);
            let tag = format!("{TEXT_COLUMN_PREFIX}{column}");
            let request = FieldRequest {
                name: column,
                tag: &tag,
                kind,
                linkage_domain: (column == linkage_column).then_some(PATIENT_LINKAGE_DOMAIN),
            };

            let record = self.protect_value(request, value.as_deref(), &sop_hint, assoc)?;
            out.tokens.insert(column.clone(), record.token.clone());
            out.ciphers.insert(column.clone(), record);
        }
        Ok(out)
    }
}
