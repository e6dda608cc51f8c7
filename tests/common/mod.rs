//! Shared fixtures for integration tests

#![allow(dead_code)]

use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::tags;
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use medvault::config::ProtectionConfig;
use medvault::protection::models::DicomMetadata;
use medvault::protection::{KeyHandle, ManifestSigner, MatchEntry, MatchedPairs};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const EXPLICIT_VR_LE: &str = "1.2.840.10008.1.2.1";
const SECONDARY_CAPTURE: &str = "1.2.840.10008.5.1.4.1.1.7";

pub fn test_key() -> Arc<KeyHandle> {
    Arc::new(KeyHandle::from_bytes([7u8; 32]))
}

pub fn protection_config(signature: ManifestSigner) -> ProtectionConfig {
    ProtectionConfig {
        signature,
        workers: 2,
        ..Default::default()
    }
}

/// Write a minimal imaging object with identifying header elements
pub fn write_dicom(path: &Path, patient_id: &str, sop: &str) {
    let obj = InMemDicomObject::from_element_iter([
        DataElement::new(tags::SOP_CLASS_UID, VR::UI, PrimitiveValue::from(SECONDARY_CAPTURE)),
        DataElement::new(tags::SOP_INSTANCE_UID, VR::UI, PrimitiveValue::from(sop)),
        DataElement::new(tags::STUDY_DATE, VR::DA, PrimitiveValue::from("20230704")),
        DataElement::new(tags::ACCESSION_NUMBER, VR::SH, PrimitiveValue::from("A77-1932")),
        DataElement::new(tags::INSTITUTION_NAME, VR::LO, PrimitiveValue::from("St. Elsewhere")),
        DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from(patient_id)),
    ]);
    obj.with_meta(
        FileMetaTableBuilder::new()
            .transfer_syntax(EXPLICIT_VR_LE)
            .media_storage_sop_class_uid(SECONDARY_CAPTURE)
            .media_storage_sop_instance_uid(sop),
    )
    .unwrap()
    .write_to_file(path)
    .unwrap();
}

pub fn entry(patient_id: &str, dicom: Option<PathBuf>, matched: bool) -> MatchEntry {
    MatchEntry {
        matched,
        patient_id: Some(patient_id.to_string()),
        dicom_metadata: DicomMetadata {
            filepath: dicom,
            extra: Default::default(),
        },
        csv_data: json!({
            "patient_id": patient_id,
            "patient_sex": "M",
            "patient_age": 61,
        })
        .as_object()
        .cloned()
        .unwrap(),
    }
}

/// Matched pairs for `ids`, each with a source object written under `dir`
pub fn matched_pairs(dir: &Path, ids: &[&str]) -> MatchedPairs {
    let results = ids
        .iter()
        .enumerate()
        .map(|(i, id)| {
            let path = dir.join(format!("{id}.dcm"));
            write_dicom(&path, id, &format!("1.2.826.0.1.3680043.{}", i + 1));
            entry(id, Some(path), true)
        })
        .collect();
    MatchedPairs { results }
}
