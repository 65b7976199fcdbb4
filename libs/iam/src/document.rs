//! Policy documents.

use std::collections::BTreeSet;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::{IamError, PolicyStatement};

/// IAM policy language version.
pub const POLICY_VERSION: &str = "2012-10-17";

/// A validated, immutable set of statements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDocument {
    statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    /// Validates every statement and rejects duplicate Sids.
    pub fn new(statements: Vec<PolicyStatement>) -> Result<Self, IamError> {
        let mut sids = BTreeSet::new();
        for statement in &statements {
            statement.validate()?;
            if let Some(sid) = statement.sid() {
                if !sids.insert(sid) {
                    return Err(IamError::DuplicateSid(sid.to_string()));
                }
            }
        }
        Ok(Self { statements })
    }

    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    /// Looks up a statement by Sid.
    pub fn statement(&self, sid: &str) -> Option<&PolicyStatement> {
        self.statements.iter().find(|s| s.sid() == Some(sid))
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }
}

impl Serialize for PolicyDocument {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("Version", POLICY_VERSION)?;
        map.serialize_entry("Statement", &self.statements)?;
        map.end()
    }
}

/// Trust policy letting a service principal assume a role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustPolicy {
    service: String,
}

impl TrustPolicy {
    /// Trust `service` (e.g. `ecs-tasks.amazonaws.com`).
    pub fn service(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn principal(&self) -> &str {
        &self.service
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::json!({
            "Version": POLICY_VERSION,
            "Statement": [
                {
                    "Effect": "Allow",
                    "Principal": { "Service": self.service },
                    "Action": "sts:AssumeRole"
                }
            ]
        })
    }
}

impl Serialize for TrustPolicy {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.to_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_document_serialization() {
        let doc = PolicyDocument::new(vec![PolicyStatement::allow()
            .with_sid("Describe")
            .with_actions(["ecs:DescribeTasks"])
            .with_resources(["*"])])
        .unwrap();

        assert_eq!(
            serde_json::to_value(&doc).unwrap(),
            json!({
                "Version": "2012-10-17",
                "Statement": [{
                    "Sid": "Describe",
                    "Effect": "Allow",
                    "Action": ["ecs:DescribeTasks"],
                    "Resource": ["*"]
                }]
            })
        );
        assert!(doc.statement("Describe").is_some());
        assert!(doc.statement("Missing").is_none());
    }

    #[test]
    fn test_duplicate_sid_rejected() {
        let stmt = PolicyStatement::allow()
            .with_sid("Same")
            .with_actions(["ecs:DescribeTasks"])
            .with_resources(["*"]);
        let err = PolicyDocument::new(vec![stmt.clone(), stmt]).unwrap_err();
        assert_eq!(err, IamError::DuplicateSid("Same".to_string()));
    }

    #[test]
    fn test_document_propagates_scope_errors() {
        let err = PolicyDocument::new(vec![PolicyStatement::allow()
            .with_actions(["iam:PassRole"])
            .with_resources(["*"])])
        .unwrap_err();
        assert!(matches!(err, IamError::UnscopedAction { .. }));
    }

    #[test]
    fn test_trust_policy() {
        let trust = TrustPolicy::service("ecs-tasks.amazonaws.com");
        let value = serde_json::to_value(&trust).unwrap();
        assert_eq!(
            value["Statement"][0]["Principal"]["Service"],
            "ecs-tasks.amazonaws.com"
        );
        assert_eq!(value["Statement"][0]["Action"], "sts:AssumeRole");
    }
}
