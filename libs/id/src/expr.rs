//! Values that may only be known once the provider applies the template.

use std::fmt;

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::LogicalId;

/// Provider pseudo parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Pseudo {
    AccountId,
    Region,
    Partition,
    UrlSuffix,
    StackName,
}

impl Pseudo {
    /// The intrinsic name, e.g. `AWS::AccountId`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccountId => "AWS::AccountId",
            Self::Region => "AWS::Region",
            Self::Partition => "AWS::Partition",
            Self::UrlSuffix => "AWS::URLSuffix",
            Self::StackName => "AWS::StackName",
        }
    }
}

/// A template value.
///
/// `Sub` strings use `${LogicalId}`, `${LogicalId.Attr}` and `${AWS::...}`
/// placeholders.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Expr {
    Literal(String),
    Ref(LogicalId),
    Pseudo(Pseudo),
    GetAtt(LogicalId, String),
    Sub(String),
    Join(String, Vec<Expr>),
    Select(u32, Box<Expr>),
    GetAzs,
}

impl Expr {
    pub fn literal(s: impl Into<String>) -> Self {
        Self::Literal(s.into())
    }

    pub fn sub(template: impl Into<String>) -> Self {
        Self::Sub(template.into())
    }

    pub fn join(separator: impl Into<String>, parts: Vec<Expr>) -> Self {
        Self::Join(separator.into(), parts)
    }

    /// The `index`th availability zone of the deployment region.
    pub fn availability_zone(index: u32) -> Self {
        Self::Select(index, Box::new(Self::GetAzs))
    }

    /// The literal `*`.
    pub fn wildcard() -> Self {
        Self::Literal("*".to_string())
    }

    /// Returns true for the literal `*`.
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Literal(s) if s == "*")
    }

    /// Returns the literal value, if this expression is one.
    pub fn as_literal(&self) -> Option<&str> {
        match self {
            Self::Literal(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Self::Literal(s.to_string())
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Self::Literal(s)
    }
}

impl From<Pseudo> for Expr {
    fn from(p: Pseudo) -> Self {
        Self::Pseudo(p)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(s) | Self::Sub(s) => f.write_str(s),
            Self::Ref(id) => write!(f, "${{{}}}", id),
            Self::Pseudo(p) => write!(f, "${{{}}}", p.as_str()),
            Self::GetAtt(id, attr) => write!(f, "${{{}.{}}}", id, attr),
            Self::Join(sep, parts) => {
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        f.write_str(sep)?;
                    }
                    write!(f, "{}", part)?;
                }
                Ok(())
            }
            Self::Select(index, inner) => write!(f, "Fn::Select[{}]({})", index, inner),
            Self::GetAzs => f.write_str("Fn::GetAZs"),
        }
    }
}

impl Serialize for Expr {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Self::Literal(s) => serializer.serialize_str(s),
            Self::Ref(id) => single_entry(serializer, "Ref", id.as_str()),
            Self::Pseudo(p) => single_entry(serializer, "Ref", p.as_str()),
            Self::GetAtt(id, attr) => {
                single_entry(serializer, "Fn::GetAtt", &(id.as_str(), attr.as_str()))
            }
            Self::Sub(template) => single_entry(serializer, "Fn::Sub", template),
            Self::Join(sep, parts) => single_entry(serializer, "Fn::Join", &(sep, parts)),
            Self::Select(index, inner) => {
                single_entry(serializer, "Fn::Select", &(index, inner.as_ref()))
            }
            Self::GetAzs => single_entry(serializer, "Fn::GetAZs", ""),
        }
    }
}

fn single_entry<S, V>(serializer: S, key: &str, value: &V) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    V: Serialize + ?Sized,
{
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(key, value)?;
    map.end()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(s: &str) -> LogicalId {
        LogicalId::parse(s).unwrap()
    }

    #[test]
    fn test_intrinsic_serialization() {
        assert_eq!(serde_json::to_value(Expr::literal("x")).unwrap(), json!("x"));
        assert_eq!(
            serde_json::to_value(Expr::Ref(id("NetworkVpc"))).unwrap(),
            json!({"Ref": "NetworkVpc"})
        );
        assert_eq!(
            serde_json::to_value(Expr::Pseudo(Pseudo::AccountId)).unwrap(),
            json!({"Ref": "AWS::AccountId"})
        );
        assert_eq!(
            serde_json::to_value(Expr::GetAtt(id("EcsCluster"), "Arn".into())).unwrap(),
            json!({"Fn::GetAtt": ["EcsCluster", "Arn"]})
        );
        assert_eq!(
            serde_json::to_value(Expr::availability_zone(1)).unwrap(),
            json!({"Fn::Select": [1, {"Fn::GetAZs": ""}]})
        );
    }

    #[test]
    fn test_join_serialization_and_display() {
        let joined = Expr::join(
            ",",
            vec![Expr::Ref(id("SubnetA")), Expr::Ref(id("SubnetB"))],
        );
        assert_eq!(
            serde_json::to_value(&joined).unwrap(),
            json!({"Fn::Join": [",", [{"Ref": "SubnetA"}, {"Ref": "SubnetB"}]]})
        );
        assert_eq!(joined.to_string(), "${SubnetA},${SubnetB}");
    }

    #[test]
    fn test_wildcard() {
        assert!(Expr::wildcard().is_wildcard());
        assert!(!Expr::literal("arn:aws:iam::*").is_wildcard());
        assert!(!Expr::Ref(id("Role")).is_wildcard());
    }
}
