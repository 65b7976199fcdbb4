//! Template-local resource names.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::IdError;

/// A CloudFormation logical ID (`[A-Za-z][A-Za-z0-9]*`, at most 255 chars).
///
/// Logical IDs are derived from the construct path of the owning component,
/// e.g. `Network` + `PublicSubnet1` → `NetworkPublicSubnet1`, so the same
/// configuration always yields the same names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LogicalId(String);

impl LogicalId {
    /// Provider limit on logical ID length.
    pub const MAX_LEN: usize = 255;

    /// Parses and validates a logical ID.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        let Some(first) = s.chars().next() else {
            return Err(IdError::Empty);
        };

        if s.len() > Self::MAX_LEN {
            return Err(IdError::TooLong {
                id: s.to_string(),
                len: s.len(),
                max: Self::MAX_LEN,
            });
        }

        if let Some(ch) = s.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(IdError::InvalidCharacter {
                id: s.to_string(),
                ch,
            });
        }

        if !first.is_ascii_alphabetic() {
            return Err(IdError::MustStartWithLetter(s.to_string()));
        }

        Ok(Self(s.to_string()))
    }

    /// Builds an ID from path segments, Pascal-casing each one.
    pub fn from_path<I, S>(parts: I) -> Result<Self, IdError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined: String = parts
            .into_iter()
            .map(|p| pascal_case(p.as_ref()))
            .collect();
        Self::parse(&joined)
    }

    /// Returns a child ID scoped under this one.
    pub fn child(&self, part: &str) -> Result<Self, IdError> {
        Self::parse(&format!("{}{}", self.0, pascal_case(part)))
    }

    /// Returns the ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LogicalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for LogicalId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for LogicalId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Serialize for LogicalId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for LogicalId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

/// Converts `postgres-12_agent` into `Postgres12Agent`.
///
/// Non-alphanumeric characters act as word separators and are dropped.
pub fn pascal_case(s: &str) -> String {
    s.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_parse_valid() {
        let id = LogicalId::parse("NetworkVpc").unwrap();
        assert_eq!(id.as_str(), "NetworkVpc");
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(LogicalId::parse("").unwrap_err().is_empty());
        assert!(matches!(
            LogicalId::parse("Network-Vpc").unwrap_err(),
            IdError::InvalidCharacter { ch: '-', .. }
        ));
        assert!(matches!(
            LogicalId::parse("1Vpc").unwrap_err(),
            IdError::MustStartWithLetter(_)
        ));
        assert!(matches!(
            LogicalId::parse(&"A".repeat(256)).unwrap_err(),
            IdError::TooLong { len: 256, .. }
        ));
    }

    #[test]
    fn test_from_path_and_child() {
        let agent = LogicalId::from_path(["agent", "postgres12"]).unwrap();
        assert_eq!(agent.as_str(), "AgentPostgres12");

        let repo = agent.child("jnlp-repository").unwrap();
        assert_eq!(repo.as_str(), "AgentPostgres12JnlpRepository");
    }

    #[test]
    fn test_pascal_case() {
        assert_eq!(pascal_case("java11"), "Java11");
        assert_eq!(pascal_case("postgres-12_agent"), "Postgres12Agent");
        assert_eq!(pascal_case("--"), "");
    }

    #[test]
    fn test_json_rejects_invalid() {
        let parsed: Result<LogicalId, _> = serde_json::from_str("\"bad id\"");
        assert!(parsed.is_err());
    }

    proptest! {
        #[test]
        fn prop_alphanumeric_ids_parse(s in "[A-Za-z][A-Za-z0-9]{0,64}") {
            let id = LogicalId::parse(&s).unwrap();
            prop_assert_eq!(id.as_str(), s.as_str());
        }
    }
}
