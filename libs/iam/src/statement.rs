//! Policy statements.

use std::collections::BTreeMap;

use jecs_id::Expr;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::IamError;

/// Statement effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// A condition block entry, e.g. `ForAnyValue:ArnEquals` / `ecs:cluster`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub operator: String,
    pub key: String,
    pub values: Vec<Expr>,
}

impl Condition {
    pub fn new(operator: impl Into<String>, key: impl Into<String>, value: impl Into<Expr>) -> Self {
        Self {
            operator: operator.into(),
            key: key.into(),
            values: vec![value.into()],
        }
    }

    /// `ForAnyValue:ArnEquals` on a single ARN.
    pub fn arn_equals(key: impl Into<String>, arn: impl Into<Expr>) -> Self {
        Self::new("ForAnyValue:ArnEquals", key, arn)
    }
}

/// One statement of an IAM policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyStatement {
    sid: Option<String>,
    effect: Effect,
    actions: Vec<String>,
    resources: Vec<Expr>,
    conditions: Vec<Condition>,
}

impl PolicyStatement {
    /// An empty `Allow` statement.
    pub fn allow() -> Self {
        Self {
            sid: None,
            effect: Effect::Allow,
            actions: Vec::new(),
            resources: Vec::new(),
            conditions: Vec::new(),
        }
    }

    /// An empty `Deny` statement.
    pub fn deny() -> Self {
        Self {
            effect: Effect::Deny,
            ..Self::allow()
        }
    }

    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn with_actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for action in actions {
            let action = action.into();
            if !self.actions.contains(&action) {
                self.actions.push(action);
            }
        }
        self
    }

    pub fn with_resources<I, E>(mut self, resources: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        for resource in resources {
            let resource = resource.into();
            if !self.resources.contains(&resource) {
                self.resources.push(resource);
            }
        }
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn sid(&self) -> Option<&str> {
        self.sid.as_deref()
    }

    pub fn effect(&self) -> Effect {
        self.effect
    }

    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn resources(&self) -> &[Expr] {
        &self.resources
    }

    pub fn conditions(&self) -> &[Condition] {
        &self.conditions
    }

    /// Label used in error messages.
    pub(crate) fn label(&self) -> String {
        self.sid.clone().unwrap_or_else(|| "<unnamed>".to_string())
    }

    /// Structural checks plus the least-privilege scope rules.
    pub fn validate(&self) -> Result<(), IamError> {
        if let Some(sid) = &self.sid {
            if sid.is_empty() || !sid.chars().all(|c| c.is_ascii_alphanumeric()) {
                return Err(IamError::InvalidSid(sid.clone()));
            }
        }

        if self.actions.is_empty() {
            return Err(IamError::EmptyActions { sid: self.label() });
        }

        if let Some(action) = self.actions.iter().find(|a| !is_valid_action(a)) {
            return Err(IamError::InvalidAction {
                action: action.clone(),
            });
        }

        if self.resources.is_empty() {
            return Err(IamError::EmptyResources { sid: self.label() });
        }

        crate::scope::check_scope(self)
    }
}

/// `service:Name`, where the name may end in (or be) `*`.
fn is_valid_action(action: &str) -> bool {
    if action == "*" {
        return true;
    }
    let Some((service, name)) = action.split_once(':') else {
        return false;
    };
    !service.is_empty()
        && service
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
        && !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '*')
}

impl Serialize for PolicyStatement {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(None)?;
        if let Some(sid) = &self.sid {
            map.serialize_entry("Sid", sid)?;
        }
        map.serialize_entry("Effect", &self.effect)?;
        map.serialize_entry("Action", &self.actions)?;
        map.serialize_entry("Resource", &self.resources)?;
        if !self.conditions.is_empty() {
            map.serialize_entry("Condition", &ConditionBlock(&self.conditions))?;
        }
        map.end()
    }
}

/// `{operator: {key: value | [values]}}`, merging entries per operator.
struct ConditionBlock<'a>(&'a [Condition]);

impl Serialize for ConditionBlock<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut grouped: BTreeMap<&str, BTreeMap<&str, Vec<&Expr>>> = BTreeMap::new();
        for condition in self.0 {
            grouped
                .entry(condition.operator.as_str())
                .or_default()
                .entry(condition.key.as_str())
                .or_default()
                .extend(condition.values.iter());
        }

        let mut map = serializer.serialize_map(Some(grouped.len()))?;
        for (operator, keys) in &grouped {
            let inner: BTreeMap<&str, ConditionValue<'_>> = keys
                .iter()
                .map(|(k, v)| (*k, ConditionValue(v)))
                .collect();
            map.serialize_entry(operator, &inner)?;
        }
        map.end()
    }
}

struct ConditionValue<'a>(&'a [&'a Expr]);

impl Serialize for ConditionValue<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.0 {
            [single] => single.serialize(serializer),
            many => many.serialize(serializer),
        }
    }
}
