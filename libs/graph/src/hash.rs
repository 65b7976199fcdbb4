//! Deterministic template hashing.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use sha2::{Digest, Sha256};

/// A template hash for detecting configuration drift.
///
/// Two syntheses of the same configuration must produce the same hash.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct TemplateHash(String);

impl TemplateHash {
    /// Compute a hash from canonical JSON.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let canonical = canonical_json(json);
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        let result = hasher.finalize();
        Self(format!("sha256:{}", hex::encode(&result[..16])))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemplateHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical JSON: object keys sorted at every depth, no whitespace.
///
/// Serialization is left to `serde_json`; only key order is normalized.
pub fn canonical_json(value: &serde_json::Value) -> String {
    sorted(value).to_string()
}

fn sorted(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::Object(map) => {
            let ordered: BTreeMap<&String, Value> =
                map.iter().map(|(key, child)| (key, sorted(child))).collect();
            Value::Object(
                ordered
                    .into_iter()
                    .map(|(key, child)| (key.clone(), child))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sorted).collect()),
        scalar => scalar.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_hash_ignores_key_order() {
        let a = json!({"b": 1, "a": {"y": [1, 2], "x": "s"}});
        let b = json!({"a": {"x": "s", "y": [1, 2]}, "b": 1});
        assert_eq!(TemplateHash::from_json(&a), TemplateHash::from_json(&b));
    }

    #[test]
    fn test_hash_detects_changes() {
        let a = json!({"Resources": {"Vpc": {"CidrBlock": "10.0.0.0/16"}}});
        let b = json!({"Resources": {"Vpc": {"CidrBlock": "10.1.0.0/16"}}});
        assert_ne!(TemplateHash::from_json(&a), TemplateHash::from_json(&b));
    }

    #[test]
    fn test_hash_format() {
        let hash = TemplateHash::from_json(&json!({}));
        assert!(hash.as_str().starts_with("sha256:"));
        assert_eq!(hash.as_str().len(), "sha256:".len() + 32);
    }

    #[test]
    fn test_canonical_json_escapes() {
        assert_eq!(
            canonical_json(&json!({"k": "a\"b\n"})),
            r#"{"k":"a\"b\n"}"#
        );
    }

    #[test]
    fn test_canonical_json_sorts_nested_keys() {
        let value = json!({
            "Resources": {
                "Vpc": {
                    "Type": "AWS::EC2::VPC",
                    "Properties": {"B": [{"z": 1, "a": null}], "A": true}
                }
            },
            "AWSTemplateFormatVersion": "2010-09-09"
        });
        assert_eq!(
            canonical_json(&value),
            concat!(
                r#"{"AWSTemplateFormatVersion":"2010-09-09","#,
                r#""Resources":{"Vpc":{"Properties":{"A":true,"B":[{"a":null,"z":1}]},"#,
                r#""Type":"AWS::EC2::VPC"}}}"#
            )
        );
    }
}
