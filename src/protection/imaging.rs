//! Imaging object (DICOM) header protection
//!
//! Reads a source object, replaces every configured header element with its
//! token, embeds the full list of protection records as a private payload and
//! writes the result to a new file. The private payload lives under the
//! private creator `(0011,0010) = PROTECT-META` at `(0011,1010)`.

use crate::domain::{Result, VaultError};
use crate::protection::checksum::sha256_file;
use crate::protection::field::{FieldProtector, FieldRequest, PATIENT_LINKAGE_DOMAIN};
use crate::protection::models::{ImagingOutcome, PrivatePayload, ProtectedImagingResult};
use crate::protection::tokenizer::FieldKind;
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::tags;
use dicom_object::mem::InMemElement;
use dicom_object::DefaultDicomObject;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::path::Path;

/// Private creator element
pub const PRIVATE_CREATOR_TAG: Tag = Tag(0x0011, 0x0010);

/// Private payload element
pub const PRIVATE_PAYLOAD_TAG: Tag = Tag(0x0011, 0x1010);

/// Private creator value identifying the protection payload block
pub const PRIVATE_CREATOR: &str = "PROTECT-META";

/// One configured sensitive header element
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderField {
    /// Keyword recorded in protection records and reports
    pub name: String,

    /// Element tag, written as `"GGGG,EEEE"`
    #[serde(with = "tag_format")]
    pub tag: Tag,

    pub kind: FieldKind,

    /// Whether this element holds the patient linkage key
    #[serde(default)]
    pub linkage: bool,

    /// Minimum token length accepted by verification
    #[serde(default)]
    pub min_len: usize,
}

impl HeaderField {
    pub fn new(name: &str, tag: Tag, kind: FieldKind) -> Self {
        Self {
            name: name.to_string(),
            tag,
            kind,
            linkage: false,
            min_len: 0,
        }
    }

    pub fn with_linkage(mut self) -> Self {
        self.linkage = true;
        self
    }

    pub fn with_min_len(mut self, min_len: usize) -> Self {
        self.min_len = min_len;
        self
    }

    fn request(&self) -> FieldRequest<'_> {
        FieldRequest {
            name: &self.name,
            tag: &self.name,
            kind: self.kind,
            linkage_domain: self.linkage.then_some(PATIENT_LINKAGE_DOMAIN),
        }
    }

    /// Whether a header token has the shape this field's kind produces
    pub fn token_shape_ok(&self, token: &str) -> bool {
        if token.len() < self.min_len {
            return false;
        }
        match self.kind {
            FieldKind::Alnum => {
                !token.is_empty()
                    && token
                        .chars()
                        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
            }
            FieldKind::Digits => !token.is_empty() && token.chars().all(|c| c.is_ascii_digit()),
            FieldKind::None => true,
        }
    }
}

/// Header elements protected when none are configured
pub fn default_header_fields() -> Vec<HeaderField> {
    vec![
        HeaderField::new("PatientID", tags::PATIENT_ID, FieldKind::Alnum).with_linkage(),
        HeaderField::new("AccessionNumber", tags::ACCESSION_NUMBER, FieldKind::Alnum),
        HeaderField::new("StudyDate", tags::STUDY_DATE, FieldKind::Digits).with_min_len(6),
        HeaderField::new("InstitutionName", tags::INSTITUTION_NAME, FieldKind::Alnum),
    ]
}

/// Parse `"0010,0020"`, `"(0010,0020)"` or `"00100020"`
pub fn parse_tag(s: &str) -> Result<Tag> {
    let cleaned: String = s
        .chars()
        .filter(|c| !matches!(c, '(' | ')' | ' '))
        .collect();
    let (group, element) = match cleaned.split_once(',') {
        Some(parts) => parts,
        None if cleaned.len() == 8 => cleaned.split_at(4),
        None => return Err(VaultError::Validation(format!("invalid tag '{s}'"))),
    };
    let parse = |part: &str| {
        u16::from_str_radix(part, 16)
            .map_err(|_| VaultError::Validation(format!("invalid tag '{s}'")))
    };
    Ok(Tag(parse(group)?, parse(element)?))
}

mod tag_format {
    use super::*;

    pub fn serialize<S: Serializer>(tag: &Tag, s: S) -> std::result::Result<S::Ok, S::Error> {
        s.serialize_str(&format!("{:04X},{:04X}", tag.0, tag.1))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Tag, D::Error> {
        let s = String::deserialize(d)?;
        parse_tag(&s).map_err(serde::de::Error::custom)
    }
}

/// Open a DICOM Part 10 file
pub fn open_object(path: &Path) -> Result<DefaultDicomObject> {
    dicom_object::open_file(path)
        .map_err(|e| VaultError::Imaging(format!("{}: {e}", path.display())))
}

/// Text value of an element with DICOM padding removed; absent or blank is `None`
pub fn element_text(obj: &DefaultDicomObject, tag: Tag) -> Option<String> {
    obj.get(tag).and_then(element_string)
}

fn element_string(elem: &InMemElement) -> Option<String> {
    let text = if elem.vr() == VR::UN {
        String::from_utf8_lossy(&elem.to_bytes().ok()?).into_owned()
    } else {
        elem.to_str().ok()?.into_owned()
    };
    let trimmed = text.trim_matches(|c: char| c == ' ' || c == '\0');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// SOP Instance UID from the dataset, falling back to the file meta group
pub fn sop_instance_uid(obj: &DefaultDicomObject) -> String {
    element_text(obj, tags::SOP_INSTANCE_UID).unwrap_or_else(|| {
        obj.meta()
            .media_storage_sop_instance_uid
            .trim_end_matches(['\0', ' '])
            .to_string()
    })
}

/// Replace an existing element's value, keeping its VR; absent elements are left alone
pub fn replace_text(obj: &mut DefaultDicomObject, tag: Tag, text: &str) -> bool {
    let Some(vr) = obj.get(tag).map(|e| e.vr()) else {
        return false;
    };
    obj.put(DataElement::new(tag, vr, PrimitiveValue::from(text)));
    true
}

/// Write the protection payload into the private block
pub fn embed_payload(obj: &mut DefaultDicomObject, payload: &PrivatePayload) -> Result<()> {
    let json = serde_json::to_string(payload)?;
    obj.put(DataElement::new(
        PRIVATE_CREATOR_TAG,
        VR::LO,
        PrimitiveValue::from(PRIVATE_CREATOR),
    ));
    obj.put(DataElement::new(
        PRIVATE_PAYLOAD_TAG,
        VR::UT,
        PrimitiveValue::from(json),
    ));
    Ok(())
}

/// Read the protection payload back; `None` if absent or unparseable
pub fn load_payload(obj: &DefaultDicomObject) -> Option<PrivatePayload> {
    if element_text(obj, PRIVATE_CREATOR_TAG)?.as_str() != PRIVATE_CREATOR {
        return None;
    }
    let json = element_text(obj, PRIVATE_PAYLOAD_TAG)?;
    serde_json::from_str(&json).ok()
}

/// Protect one imaging object into `dst`
///
/// An unreadable source is an input error reported as
/// [`ImagingOutcome::Failed`]; failing to write `dst` is returned as `Err`.
pub fn protect_imaging(
    protector: &FieldProtector,
    fields: &[HeaderField],
    src: &Path,
    dst: &Path,
    assoc: &str,
) -> Result<ImagingOutcome> {
    // The source path is recorded separately and kept out of the message
    let mut obj = match dicom_object::open_file(src) {
        Ok(obj) => obj,
        Err(e) => {
            let source = src.display().to_string();
            return Ok(ImagingOutcome::Failed {
                error: format!("Invalid DICOM: {e}").replace(&source, "<source>"),
                dicom_path: Some(source),
            });
        }
    };

    let sop = sop_instance_uid(&obj);
    let sha256_before = sha256_file(src)?;

    let mut records = Vec::with_capacity(fields.len());
    for field in fields {
        let value = element_text(&obj, field.tag);
        let record = protector.protect_value(field.request(), value.as_deref(), &sop, assoc)?;
        if !record.token.is_empty() {
            replace_text(&mut obj, field.tag, &record.token);
        }
        records.push(record);
    }

    embed_payload(
        &mut obj,
        &PrivatePayload {
            assoc: assoc.to_string(),
            fields: records.clone(),
        },
    )?;

    if let Some(parent) = dst.parent() {
        std::fs::create_dir_all(parent)?;
    }
    obj.write_to_file(dst)
        .map_err(|e| VaultError::Imaging(format!("failed to write protected object: {e}")))?;
    let sha256_after = sha256_file(dst)?;

    Ok(ImagingOutcome::Protected(ProtectedImagingResult {
        dicom_in: src.display().to_string(),
        dicom_out: dst.display().to_string(),
        sop,
        sha256_before,
        sha256_after,
        fields: records,
    }))
}
