//! Template resources and reference extraction.

use std::collections::BTreeSet;

use jecs_id::LogicalId;
use serde::Serialize;
use serde_json::{Map, Value};

/// What the provider does with a resource when it leaves the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeletionPolicy {
    Delete,
    Retain,
    Snapshot,
}

impl DeletionPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delete => "Delete",
            Self::Retain => "Retain",
            Self::Snapshot => "Snapshot",
        }
    }
}

/// One resource declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    logical_id: LogicalId,
    resource_type: String,
    owner: String,
    properties: Value,
    depends_on: BTreeSet<LogicalId>,
    deletion_policy: Option<DeletionPolicy>,
    metadata: Option<Value>,
}

impl Resource {
    /// Creates a resource owned by `owner` (a component name).
    pub fn new(
        logical_id: LogicalId,
        resource_type: impl Into<String>,
        owner: impl Into<String>,
        properties: Value,
    ) -> Self {
        Self {
            logical_id,
            resource_type: resource_type.into(),
            owner: owner.into(),
            properties,
            depends_on: BTreeSet::new(),
            deletion_policy: None,
            metadata: None,
        }
    }

    /// Adds an explicit ordering edge not visible in the properties.
    #[must_use]
    pub fn with_depends_on(mut self, id: &LogicalId) -> Self {
        self.depends_on.insert(id.clone());
        self
    }

    /// Sets both the deletion and the update-replace policy.
    #[must_use]
    pub fn with_deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn logical_id(&self) -> &LogicalId {
        &self.logical_id
    }

    /// Provider type, e.g. `AWS::EC2::VPC`.
    pub fn resource_type(&self) -> &str {
        &self.resource_type
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn properties(&self) -> &Value {
        &self.properties
    }

    pub fn properties_mut(&mut self) -> &mut Value {
        &mut self.properties
    }

    pub fn depends_on(&self) -> &BTreeSet<LogicalId> {
        &self.depends_on
    }

    pub fn deletion_policy(&self) -> Option<DeletionPolicy> {
        self.deletion_policy
    }

    pub fn metadata(&self) -> Option<&Value> {
        self.metadata.as_ref()
    }

    /// Logical IDs this resource depends on: references in its properties
    /// plus explicit `DependsOn` entries.
    pub fn references(&self) -> BTreeSet<String> {
        let mut out = references_in(&self.properties);
        out.extend(self.depends_on.iter().map(|id| id.as_str().to_string()));
        out
    }

    /// The resource's entry under `Resources` in the template.
    pub(crate) fn to_template_entry(&self) -> Value {
        let mut entry = Map::new();
        entry.insert("Type".into(), Value::String(self.resource_type.clone()));
        if !self.properties.is_null() {
            entry.insert("Properties".into(), self.properties.clone());
        }
        if !self.depends_on.is_empty() {
            entry.insert(
                "DependsOn".into(),
                Value::Array(
                    self.depends_on
                        .iter()
                        .map(|id| Value::String(id.as_str().to_string()))
                        .collect(),
                ),
            );
        }
        if let Some(policy) = self.deletion_policy {
            entry.insert("DeletionPolicy".into(), policy.as_str().into());
            entry.insert("UpdateReplacePolicy".into(), policy.as_str().into());
        }
        if let Some(metadata) = &self.metadata {
            entry.insert("Metadata".into(), metadata.clone());
        }
        Value::Object(entry)
    }
}

/// Collects every logical ID referenced by intrinsics inside `value`.
///
/// Pseudo parameters (`AWS::...`) are not resources and are skipped.
pub fn references_in(value: &Value) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    collect(value, &mut out);
    out
}

fn collect(value: &Value, out: &mut BTreeSet<String>) {
    match value {
        Value::Object(map) => {
            if map.len() == 1 {
                if let Some(Value::String(target)) = map.get("Ref") {
                    if !target.starts_with("AWS::") {
                        out.insert(target.clone());
                    }
                    return;
                }
                if let Some(Value::Array(args)) = map.get("Fn::GetAtt") {
                    if let Some(Value::String(target)) = args.first() {
                        out.insert(target.clone());
                    }
                    return;
                }
                if let Some(Value::String(template)) = map.get("Fn::Sub") {
                    out.extend(sub_references(template));
                    return;
                }
            }
            for v in map.values() {
                collect(v, out);
            }
        }
        Value::Array(items) => {
            for v in items {
                collect(v, out);
            }
        }
        _ => {}
    }
}

/// Logical IDs named by `${Id}` / `${Id.Attr}` placeholders in an `Fn::Sub`
/// template. `${!Literal}` escapes and `${AWS::...}` are skipped.
pub fn sub_references(template: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    let mut rest = template;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let name = &after[..end];
        if !name.starts_with('!') && !name.starts_with("AWS::") && !name.is_empty() {
            let target = name.split_once('.').map_or(name, |(id, _)| id);
            out.insert(target.to_string());
        }
        rest = &after[end + 1..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn id(s: &str) -> LogicalId {
        LogicalId::parse(s).unwrap()
    }

    #[rstest]
    #[case("arn:aws:ecs:${AWS::Region}:${AWS::AccountId}:cluster/x", &[])]
    #[case("${EcsCluster.Arn}/task/*", &["EcsCluster"])]
    #[case("${A}-${B.Name}-${A}", &["A", "B"])]
    #[case("${!Literal} and ${Real}", &["Real"])]
    #[case("unterminated ${Oops", &[])]
    fn test_sub_references(#[case] template: &str, #[case] expected: &[&str]) {
        let got: Vec<String> = sub_references(template).into_iter().collect();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_references_walk_nested_values() {
        let properties = json!({
            "VpcId": {"Ref": "NetworkVpc"},
            "Region": {"Ref": "AWS::Region"},
            "Tags": [{"Key": "Name", "Value": {"Fn::Sub": "${AWS::StackName}-${Cluster}"}}],
            "Role": {"Fn::GetAtt": ["TaskRole", "Arn"]},
            "Zone": {"Fn::Select": [0, {"Fn::GetAZs": ""}]}
        });
        let resource = Resource::new(id("Subnet"), "AWS::EC2::Subnet", "network", properties)
            .with_depends_on(&id("Gateway"));

        let refs: Vec<String> = resource.references().into_iter().collect();
        assert_eq!(refs, ["Cluster", "Gateway", "NetworkVpc", "TaskRole"]);
    }

    #[test]
    fn test_template_entry() {
        let resource = Resource::new(
            id("FileSystem"),
            "AWS::EFS::FileSystem",
            "cluster",
            json!({"Encrypted": true}),
        )
        .with_deletion_policy(DeletionPolicy::Delete)
        .with_metadata(json!({"Note": "x"}));

        assert_eq!(
            resource.to_template_entry(),
            json!({
                "Type": "AWS::EFS::FileSystem",
                "Properties": {"Encrypted": true},
                "DeletionPolicy": "Delete",
                "UpdateReplacePolicy": "Delete",
                "Metadata": {"Note": "x"}
            })
        );
    }
}
