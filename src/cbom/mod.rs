//! CycloneDX 1.6 cryptographic inventory documents
//!
//! The document model is intentionally partial: it covers the fields this
//! tool writes and reads, and deserialization tolerates foreign documents
//! with a richer shape (missing optional blocks become `None`). Anything
//! unknown is dropped on load, which matching never needs.

pub mod classify;

use crate::error::{Result, TracebomError};
use crate::rules::RuleSet;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use uuid::Uuid;

use crate::correlation::GroupedRecord;

pub const BOM_FORMAT: &str = "CycloneDX";
pub const SPEC_VERSION: &str = "1.6";
pub const ASSET_TYPE_ALGORITHM: &str = "algorithm";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Cbom {
    #[serde(rename = "bomFormat")]
    pub bom_format: String,
    #[serde(rename = "specVersion")]
    pub spec_version: String,
    #[serde(rename = "serialNumber", default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default = "default_document_version")]
    pub version: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
    #[serde(default)]
    pub components: Vec<Component>,
}

fn default_document_version() -> u32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Tools>,
}

/// CycloneDX 1.6 tools block. Emitted empty; retained on load so saved
/// documents round-trip.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Tools {
    #[serde(default)]
    pub components: Vec<serde_json::Value>,
    #[serde(default)]
    pub services: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Component {
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(rename = "bom-ref", default, skip_serializing_if = "Option::is_none")]
    pub bom_ref: Option<String>,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "cryptoProperties", default, skip_serializing_if = "Option::is_none")]
    pub crypto_properties: Option<CryptoProperties>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub properties: Vec<Property>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CryptoProperties {
    #[serde(rename = "assetType", default)]
    pub asset_type: String,
    #[serde(rename = "algorithmProperties", default, skip_serializing_if = "Option::is_none")]
    pub algorithm_properties: Option<AlgorithmProperties>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlgorithmProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primitive: Option<String>,
    // Serialized even when absent; readers distinguish "no key size
    // observed" (null) from a missing field.
    #[serde(rename = "parameterSetIdentifier", default)]
    pub parameter_set_identifier: Option<u64>,
    #[serde(rename = "cryptoFunctions", default, skip_serializing_if = "Vec::is_empty")]
    pub crypto_functions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub name: String,
    pub value: String,
}

impl Cbom {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| TracebomError::Io {
            source,
            context: format!("Failed to read CBOM document {}", path.display()),
        })?;
        serde_json::from_str(&text).map_err(|source| TracebomError::Json {
            source,
            context: format!("Failed to parse CBOM document {}", path.display()),
        })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut text = serde_json::to_string_pretty(self).map_err(|source| TracebomError::Json {
            source,
            context: "Failed to serialize CBOM document".to_string(),
        })?;
        text.push('\n');
        std::fs::write(path, text).map_err(|source| TracebomError::Io {
            source,
            context: format!("Failed to write CBOM document {}", path.display()),
        })
    }

    /// Components carrying algorithm crypto-properties. Matching only
    /// considers these; services, libraries and certificates are ignored.
    pub fn algorithm_components(&self) -> impl Iterator<Item = &Component> {
        self.components.iter().filter(|component| {
            component
                .crypto_properties
                .as_ref()
                .map(|props| props.asset_type == ASSET_TYPE_ALGORITHM)
                .unwrap_or(false)
        })
    }
}

/// Wraps classified assets into a CycloneDX document. Each run produces a
/// fresh serial number and timestamp; bom-refs are never reused.
pub struct Assembler<'a> {
    rules: &'a RuleSet,
}

impl<'a> Assembler<'a> {
    pub fn new(rules: &'a RuleSet) -> Self {
        Self { rules }
    }

    pub fn assemble(&self, records: &[GroupedRecord]) -> Cbom {
        let components: Vec<Component> = records
            .iter()
            .flat_map(|record| classify::classify_record(self.rules, record))
            .collect();
        tracing::info!(
            "Assembled CBOM with {} components from {} records",
            components.len(),
            records.len()
        );

        Cbom {
            bom_format: BOM_FORMAT.to_string(),
            spec_version: SPEC_VERSION.to_string(),
            serial_number: Some(format!("urn:uuid:{}", Uuid::new_v4())),
            version: 1,
            metadata: Some(Metadata {
                timestamp: Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)),
                tools: Some(Tools::default()),
            }),
            components,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> GroupedRecord {
        GroupedRecord {
            op: Some("AES-128-CBC".to_string()),
            funcs: vec!["encrypt".to_string(), "decrypt".to_string()],
            extra: "none".to_string(),
            count: 3,
        }
    }

    fn sample_rules() -> RuleSet {
        RuleSet::parse(
            r#"
rules:
  - id: aes
    expr: '"AES" in op'
    primitive: symmetric
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_assemble_document_envelope() {
        let rules = sample_rules();
        let cbom = Assembler::new(&rules).assemble(&[sample_record()]);

        assert_eq!(cbom.bom_format, "CycloneDX");
        assert_eq!(cbom.spec_version, "1.6");
        assert_eq!(cbom.version, 1);
        let serial = cbom.serial_number.as_deref().unwrap();
        assert!(serial.starts_with("urn:uuid:"));

        let metadata = cbom.metadata.as_ref().unwrap();
        let timestamp = metadata.timestamp.as_deref().unwrap();
        // Second precision, UTC designator.
        assert_eq!(timestamp.len(), "2026-01-01T00:00:00Z".len());
        assert!(timestamp.ends_with('Z'));
        let tools = metadata.tools.as_ref().unwrap();
        assert!(tools.components.is_empty());
        assert!(tools.services.is_empty());
    }

    #[test]
    fn test_serials_and_refs_are_fresh_per_run() {
        let rules = sample_rules();
        let assembler = Assembler::new(&rules);
        let first = assembler.assemble(&[sample_record()]);
        let second = assembler.assemble(&[sample_record()]);

        assert_ne!(first.serial_number, second.serial_number);
        assert_ne!(
            first.components[0].bom_ref,
            second.components[0].bom_ref
        );
    }

    #[test]
    fn test_algorithm_components_filter() {
        let cbom = Cbom {
            bom_format: BOM_FORMAT.to_string(),
            spec_version: SPEC_VERSION.to_string(),
            serial_number: None,
            version: 1,
            metadata: None,
            components: vec![
                Component {
                    component_type: "cryptographic-asset".to_string(),
                    bom_ref: None,
                    name: "AES".to_string(),
                    crypto_properties: Some(CryptoProperties {
                        asset_type: ASSET_TYPE_ALGORITHM.to_string(),
                        algorithm_properties: None,
                    }),
                    properties: Vec::new(),
                },
                Component {
                    component_type: "cryptographic-asset".to_string(),
                    bom_ref: None,
                    name: "some-cert".to_string(),
                    crypto_properties: Some(CryptoProperties {
                        asset_type: "certificate".to_string(),
                        algorithm_properties: None,
                    }),
                    properties: Vec::new(),
                },
                Component {
                    component_type: "library".to_string(),
                    bom_ref: None,
                    name: "openssl".to_string(),
                    crypto_properties: None,
                    properties: Vec::new(),
                },
            ],
        };

        let names: Vec<&str> = cbom.algorithm_components().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["AES"]);
    }

    #[test]
    fn test_parameter_set_identifier_serializes_as_null() {
        let props = AlgorithmProperties {
            primitive: Some("symmetric".to_string()),
            parameter_set_identifier: None,
            crypto_functions: vec!["encrypt".to_string()],
        };
        let json = serde_json::to_value(&props).unwrap();
        assert!(json.get("parameterSetIdentifier").unwrap().is_null());
    }

    #[test]
    fn test_foreign_document_tolerated_on_load() {
        let text = r#"{
            "bomFormat": "CycloneDX",
            "specVersion": "1.6",
            "components": [
                {"type": "cryptographic-asset", "name": "RSA",
                 "cryptoProperties": {"assetType": "algorithm"}}
            ]
        }"#;
        let cbom: Cbom = serde_json::from_str(text).unwrap();
        assert_eq!(cbom.version, 1);
        assert!(cbom.serial_number.is_none());
        assert_eq!(cbom.algorithm_components().count(), 1);
    }
}
