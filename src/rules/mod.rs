//! Classification rule configuration
//!
//! Rules are loaded from a YAML document once per run, compiled into
//! expression trees, and evaluated against every correlated record. A
//! record may match any number of rules; records matching none fall back
//! to the document's defaults.

pub mod expr;

pub use expr::{Expr, FieldSource, Value};

use crate::error::{Result, TracebomError};
use serde::Deserialize;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::Path;

/// Raw YAML document shape.
#[derive(Debug, Clone, Deserialize)]
struct RulesConfig {
    #[serde(default)]
    defaults: RuleDefaults,
    #[serde(default)]
    rules: Vec<RuleDef>,
}

/// Fallback classification applied when no rule matches a record, and the
/// crypto-function list used by rules that do not carry their own.
#[derive(Debug, Clone, Deserialize)]
pub struct RuleDefaults {
    #[serde(default = "default_primitive")]
    pub primitive: String,
    #[serde(default, rename = "cryptoFunctions")]
    pub crypto_functions: Vec<String>,
}

impl Default for RuleDefaults {
    fn default() -> Self {
        Self {
            primitive: default_primitive(),
            crypto_functions: Vec::new(),
        }
    }
}

fn default_primitive() -> String {
    "other".to_string()
}

/// One rule as written in the document. `expr` and `primitive` are
/// mandatory but modelled as options so their absence produces a named
/// error instead of a bare deserialization failure.
#[derive(Debug, Clone, Deserialize)]
struct RuleDef {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    priority: i64,
    #[serde(default)]
    expr: Option<String>,
    #[serde(default)]
    primitive: Option<String>,
    #[serde(default, rename = "cryptoFunctions")]
    crypto_functions: Option<Vec<String>>,
    #[serde(default)]
    extra: BTreeMap<String, String>,
}

/// A rule ready for evaluation. Immutable after load.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pub id: String,
    pub priority: i64,
    pub expr: Expr,
    pub primitive: String,
    pub crypto_functions: Vec<String>,
    pub extra: BTreeMap<String, String>,
}

/// The compiled rule list, sorted priority-descending with declaration
/// order preserved within equal priorities.
#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<CompiledRule>,
    defaults: RuleDefaults,
}

impl RuleSet {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| TracebomError::Io {
            source,
            context: format!("Failed to read rules file {}", path.display()),
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self> {
        let config: RulesConfig = serde_yaml::from_str(text)?;
        let mut rules = Vec::with_capacity(config.rules.len());

        for (index, def) in config.rules.into_iter().enumerate() {
            let label = def
                .id
                .clone()
                .unwrap_or_else(|| format!("#{}", index + 1));
            let expr_text = def.expr.ok_or_else(|| {
                TracebomError::RuleConfig(format!("Rule {label} is missing 'expr'"))
            })?;
            let primitive = def.primitive.ok_or_else(|| {
                TracebomError::RuleConfig(format!("Rule {label} is missing 'primitive'"))
            })?;
            let expr = Expr::parse(&expr_text).map_err(|err| {
                TracebomError::RuleConfig(format!("Rule {label}: {err}"))
            })?;
            let crypto_functions = def
                .crypto_functions
                .unwrap_or_else(|| config.defaults.crypto_functions.clone());

            rules.push(CompiledRule {
                id: def.id.unwrap_or_else(|| expr_text.clone()),
                priority: def.priority,
                expr,
                primitive,
                crypto_functions,
                extra: def.extra,
            });
        }

        // Stable sort keeps declaration order within equal priorities.
        rules.sort_by_key(|rule| Reverse(rule.priority));

        Ok(Self {
            rules,
            defaults: config.defaults,
        })
    }

    pub fn rules(&self) -> &[CompiledRule] {
        &self.rules
    }

    pub fn defaults(&self) -> &RuleDefaults {
        &self.defaults
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
defaults:
  primitive: other
  cryptoFunctions: []
rules:
  - id: aes-cipher
    priority: 10
    expr: 'op != null and "AES" in op'
    primitive: symmetric
    cryptoFunctions: [encrypt, decrypt]
  - id: rsa
    priority: 5
    expr: '"RSA" in op'
    primitive: asymmetric
    extra:
      nist: fips-186
  - expr: 'count > 0'
    primitive: other
"#;

    #[test]
    fn test_parse_and_sort_by_priority() {
        let set = RuleSet::parse(SAMPLE).unwrap();
        assert_eq!(set.len(), 3);
        let ids: Vec<&str> = set.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["aes-cipher", "rsa", "count > 0"]);
        assert_eq!(set.rules()[0].priority, 10);
        assert_eq!(set.defaults().primitive, "other");
    }

    #[test]
    fn test_anonymous_rule_uses_expr_as_id() {
        let set = RuleSet::parse(SAMPLE).unwrap();
        assert_eq!(set.rules()[2].id, "count > 0");
        assert_eq!(set.rules()[2].priority, 0);
    }

    #[test]
    fn test_rule_without_functions_inherits_defaults() {
        let text = r#"
defaults:
  cryptoFunctions: [digest]
rules:
  - id: sha
    expr: '"SHA" in op'
    primitive: hash
"#;
        let set = RuleSet::parse(text).unwrap();
        assert_eq!(set.rules()[0].crypto_functions, vec!["digest"]);
    }

    #[test]
    fn test_declaration_order_stable_within_priority() {
        let text = r#"
rules:
  - id: first
    expr: 'true'
    primitive: a
  - id: second
    expr: 'true'
    primitive: b
"#;
        let set = RuleSet::parse(text).unwrap();
        let ids: Vec<&str> = set.rules().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["first", "second"]);
    }

    #[test]
    fn test_missing_expr_is_fatal() {
        let text = r#"
rules:
  - id: broken
    primitive: hash
"#;
        let err = RuleSet::parse(text).unwrap_err();
        assert!(err.to_string().contains("broken"));
        assert!(err.to_string().contains("expr"));
    }

    #[test]
    fn test_missing_primitive_is_fatal() {
        let text = r#"
rules:
  - id: broken
    expr: 'true'
"#;
        assert!(RuleSet::parse(text).is_err());
    }

    #[test]
    fn test_unparsable_expr_names_the_rule() {
        let text = r#"
rules:
  - id: typo
    expr: 'op = "AES"'
    primitive: symmetric
"#;
        let err = RuleSet::parse(text).unwrap_err();
        assert!(err.to_string().contains("typo"));
    }

    #[test]
    fn test_empty_document_yields_empty_set() {
        let set = RuleSet::parse("rules: []\n").unwrap();
        assert!(set.is_empty());
        assert_eq!(set.defaults().primitive, "other");
    }

    #[test]
    fn test_rule_metadata_is_carried() {
        let set = RuleSet::parse(SAMPLE).unwrap();
        let rsa = &set.rules()[1];
        assert_eq!(rsa.extra.get("nist").map(String::as_str), Some("fips-186"));
    }
}
