//! Rule evaluation against correlated records.

use crate::cbom::{
    AlgorithmProperties, Component, CryptoProperties, Property, ASSET_TYPE_ALGORITHM,
};
use crate::correlation::{GroupedRecord, NO_DATA_MARKER};
use crate::rules::{FieldSource, RuleSet, Value};
use std::collections::BTreeMap;
use uuid::Uuid;

pub const COMPONENT_TYPE: &str = "cryptographic-asset";

/// Field view over one correlated record.
///
/// Exposes `op`, `func`, `count`, parsed extra values via `extra.<key>`,
/// and the bare `extra` field as the list of present keys. Absent fields
/// resolve to null so rules can probe optional keys without failing.
pub struct RecordView<'a> {
    record: &'a GroupedRecord,
    extra: BTreeMap<String, String>,
}

impl<'a> RecordView<'a> {
    pub fn new(record: &'a GroupedRecord) -> Self {
        Self {
            extra: parse_extra(&record.extra),
            record,
        }
    }

    pub fn pkey_size(&self) -> Option<u64> {
        self.extra
            .get("pkey_size")
            .and_then(|value| value.trim().parse().ok())
    }
}

/// `key=value` pairs from the comma-joined extra text. Parts without `=`,
/// including the no-data marker, carry no keyed data and are skipped.
fn parse_extra(text: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for part in text.split(',') {
        if let Some((key, value)) = part.trim().split_once('=') {
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
    }
    map
}

impl FieldSource for RecordView<'_> {
    fn field(&self, name: &str) -> Value {
        match name {
            "op" => match &self.record.op {
                Some(op) => Value::Str(op.clone()),
                None => Value::Null,
            },
            "func" => Value::List(self.record.funcs.iter().cloned().map(Value::Str).collect()),
            "count" => Value::Int(self.record.count as i64),
            "extra" => Value::List(self.extra.keys().cloned().map(Value::Str).collect()),
            _ => match name.strip_prefix("extra.") {
                Some(key) => self
                    .extra
                    .get(key)
                    .map(|value| Value::Str(value.clone()))
                    .unwrap_or(Value::Null),
                None => Value::Null,
            },
        }
    }
}

/// Evaluate every rule against one record. Each matching rule emits one
/// asset; a record matching no rule falls back to the defaults, so an
/// observed operation never drops out of the inventory.
pub fn classify_record(rules: &RuleSet, record: &GroupedRecord) -> Vec<Component> {
    let view = RecordView::new(record);
    let mut components: Vec<Component> = rules
        .rules()
        .iter()
        .filter(|rule| rule.expr.matches(&view))
        .map(|rule| {
            build_component(
                record,
                &view,
                &rule.primitive,
                &rule.crypto_functions,
                &rule.extra,
            )
        })
        .collect();

    if components.is_empty() {
        let defaults = rules.defaults();
        tracing::debug!(
            "No rule matched operation {:?}, using default primitive '{}'",
            record.op,
            defaults.primitive
        );
        components.push(build_component(
            record,
            &view,
            &defaults.primitive,
            &defaults.crypto_functions,
            &BTreeMap::new(),
        ));
    }

    components
}

fn build_component(
    record: &GroupedRecord,
    view: &RecordView<'_>,
    primitive: &str,
    rule_functions: &[String],
    metadata: &BTreeMap<String, String>,
) -> Component {
    // The record's observed functions win; the rule's list only fills in
    // when normalization left nothing.
    let crypto_functions = if record.funcs.is_empty() {
        rule_functions.to_vec()
    } else {
        record.funcs.clone()
    };

    Component {
        component_type: COMPONENT_TYPE.to_string(),
        bom_ref: Some(Uuid::new_v4().to_string()),
        name: record
            .op
            .clone()
            .unwrap_or_else(|| NO_DATA_MARKER.to_string()),
        crypto_properties: Some(CryptoProperties {
            asset_type: ASSET_TYPE_ALGORITHM.to_string(),
            algorithm_properties: Some(AlgorithmProperties {
                primitive: Some(primitive.to_string()),
                // Sizes arrive in bytes from the tracer, CycloneDX wants bits.
                parameter_set_identifier: view.pkey_size().map(|bytes| bytes * 8),
                crypto_functions,
            }),
        }),
        properties: metadata
            .iter()
            .map(|(name, value)| Property {
                name: name.clone(),
                value: value.clone(),
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(op: Option<&str>, funcs: &[&str], extra: &str) -> GroupedRecord {
        GroupedRecord {
            op: op.map(str::to_string),
            funcs: funcs.iter().map(|f| f.to_string()).collect(),
            extra: extra.to_string(),
            count: 1,
        }
    }

    fn rules(text: &str) -> RuleSet {
        RuleSet::parse(text).unwrap()
    }

    fn primitive_of(component: &Component) -> &str {
        component
            .crypto_properties
            .as_ref()
            .unwrap()
            .algorithm_properties
            .as_ref()
            .unwrap()
            .primitive
            .as_deref()
            .unwrap()
    }

    #[test]
    fn test_every_matching_rule_emits_an_asset() {
        let rules = rules(
            r#"
rules:
  - id: aes
    priority: 10
    expr: '"AES" in op'
    primitive: symmetric
  - id: cbc-mode
    expr: '"CBC" in op'
    primitive: block-mode
"#,
        );
        let components =
            classify_record(&rules, &record(Some("AES-128-CBC"), &["encrypt"], "none"));
        assert_eq!(components.len(), 2);
        assert_eq!(primitive_of(&components[0]), "symmetric");
        assert_eq!(primitive_of(&components[1]), "block-mode");
    }

    #[test]
    fn test_unmatched_record_falls_back_to_defaults() {
        let rules = rules(
            r#"
defaults:
  primitive: other
rules:
  - id: aes
    expr: '"AES" in op'
    primitive: symmetric
"#,
        );
        let components =
            classify_record(&rules, &record(Some("ChaCha20"), &["encrypt"], "none"));
        assert_eq!(components.len(), 1);
        assert_eq!(primitive_of(&components[0]), "other");
        assert_eq!(components[0].name, "ChaCha20");
    }

    #[test]
    fn test_record_without_op_uses_no_data_marker() {
        let rules = rules("rules: []\n");
        let components = classify_record(&rules, &record(None, &[], "none"));
        assert_eq!(components[0].name, NO_DATA_MARKER);
    }

    #[test]
    fn test_key_size_converted_to_bits() {
        let rules = rules(
            r#"
rules:
  - id: rsa
    expr: '"RSA" in op'
    primitive: asymmetric
"#,
        );
        let components =
            classify_record(&rules, &record(Some("RSA"), &["encrypt"], "pkey_size=256"));
        let props = components[0]
            .crypto_properties
            .as_ref()
            .unwrap()
            .algorithm_properties
            .as_ref()
            .unwrap();
        assert_eq!(props.parameter_set_identifier, Some(2048));
    }

    #[test]
    fn test_rule_functions_fill_in_for_empty_record() {
        let rules = rules(
            r#"
rules:
  - id: sha
    expr: '"SHA" in op'
    primitive: hash
    cryptoFunctions: [digest]
"#,
        );
        let components = classify_record(&rules, &record(Some("SHA256"), &[], "none"));
        let props = components[0]
            .crypto_properties
            .as_ref()
            .unwrap()
            .algorithm_properties
            .as_ref()
            .unwrap();
        assert_eq!(props.crypto_functions, vec!["digest"]);
    }

    #[test]
    fn test_record_functions_win_over_rule_functions() {
        let rules = rules(
            r#"
rules:
  - id: aes
    expr: '"AES" in op'
    primitive: symmetric
    cryptoFunctions: [keygen]
"#,
        );
        let components = classify_record(
            &rules,
            &record(Some("AES-128-CBC"), &["encrypt", "decrypt"], "none"),
        );
        let props = components[0]
            .crypto_properties
            .as_ref()
            .unwrap()
            .algorithm_properties
            .as_ref()
            .unwrap();
        assert_eq!(props.crypto_functions, vec!["encrypt", "decrypt"]);
    }

    #[test]
    fn test_rules_can_probe_extra_keys() {
        let rules = rules(
            r#"
rules:
  - id: sized
    expr: '"pkey_size" in extra and extra.pkey_size >= 128'
    primitive: asymmetric
  - id: unsized
    expr: '"pkey_size" not in extra'
    primitive: other
"#,
        );
        let sized = classify_record(&rules, &record(Some("RSA"), &[], "pkey_size=256"));
        assert_eq!(sized.len(), 1);
        assert_eq!(primitive_of(&sized[0]), "asymmetric");

        let r#unsized = classify_record(&rules, &record(Some("RSA"), &[], "none"));
        assert_eq!(r#unsized.len(), 1);
        assert_eq!(primitive_of(&r#unsized[0]), "other");
    }

    #[test]
    fn test_rule_metadata_becomes_properties() {
        let rules = rules(
            r#"
rules:
  - id: aes
    expr: '"AES" in op'
    primitive: symmetric
    extra:
      nist: fips-197
      strength: high
"#,
        );
        let components =
            classify_record(&rules, &record(Some("AES-128-CBC"), &["encrypt"], "none"));
        let names: Vec<&str> = components[0]
            .properties
            .iter()
            .map(|p| p.name.as_str())
            .collect();
        // BTreeMap keys serialize sorted.
        assert_eq!(names, vec!["nist", "strength"]);
        assert_eq!(components[0].properties[0].value, "fips-197");
    }

    #[test]
    fn test_view_parses_multi_key_extra() {
        let rec = record(Some("RSA"), &[], "pkey_size=256,mode=oaep");
        let view = RecordView::new(&rec);
        assert_eq!(view.field("extra.mode"), Value::Str("oaep".to_string()));
        assert_eq!(view.pkey_size(), Some(256));
        assert_eq!(view.field("extra.missing"), Value::Null);
        assert_eq!(view.field("unknown"), Value::Null);
    }
}
