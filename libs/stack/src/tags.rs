//! Stack-wide resource tags.
//!
//! Tags are applied after every component has declared its resources.
//! Tags a component set itself (e.g. `Name`) win over stack tags with the
//! same key.

use std::collections::{BTreeMap, BTreeSet};

use jecs_graph::ResourceGraph;
use serde_json::{json, Value};
use tracing::debug;

/// How a resource type carries tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagFormat {
    /// `[{Key, Value}]` under the given property.
    List(&'static str),
    /// `[{Key, Value, PropagateAtLaunch}]` under `Tags`.
    Propagating,
}

/// Tag property of `resource_type`, or `None` if it cannot be tagged.
pub fn tag_format(resource_type: &str) -> Option<TagFormat> {
    match resource_type {
        "AWS::EFS::FileSystem" => Some(TagFormat::List("FileSystemTags")),
        "AWS::EFS::AccessPoint" => Some(TagFormat::List("AccessPointTags")),
        "AWS::AutoScaling::AutoScalingGroup" => Some(TagFormat::Propagating),
        "AWS::EC2::VPC"
        | "AWS::EC2::InternetGateway"
        | "AWS::EC2::Subnet"
        | "AWS::EC2::RouteTable"
        | "AWS::EC2::EIP"
        | "AWS::EC2::NatGateway"
        | "AWS::EC2::SecurityGroup"
        | "AWS::ECS::Cluster"
        | "AWS::ECS::CapacityProvider"
        | "AWS::ECS::TaskDefinition"
        | "AWS::ECS::Service"
        | "AWS::ECR::Repository"
        | "AWS::IAM::Role"
        | "AWS::Logs::LogGroup"
        | "AWS::CodeBuild::Project"
        | "AWS::ElasticLoadBalancingV2::LoadBalancer"
        | "AWS::ElasticLoadBalancingV2::TargetGroup"
        | "AWS::ServiceDiscovery::PrivateDnsNamespace"
        | "AWS::ServiceDiscovery::Service" => Some(TagFormat::List("Tags")),
        _ => None,
    }
}

/// Applies `tags` to every taggable resource and returns how many were
/// tagged.
pub fn apply_tags(graph: &mut ResourceGraph, tags: &BTreeMap<String, String>) -> usize {
    if tags.is_empty() {
        return 0;
    }

    let mut tagged = 0;
    for resource in graph.iter_mut() {
        let Some(format) = tag_format(resource.resource_type()) else {
            continue;
        };
        let (property, propagate) = match format {
            TagFormat::List(property) => (property, false),
            TagFormat::Propagating => ("Tags", true),
        };

        let Some(properties) = resource.properties_mut().as_object_mut() else {
            continue;
        };
        let list = properties
            .entry(property)
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(entries) = list {
            merge(entries, tags, propagate);
            tagged += 1;
        }
    }

    debug!(tagged, tags = tags.len(), "applied stack tags");
    tagged
}

fn merge(entries: &mut Vec<Value>, tags: &BTreeMap<String, String>, propagate: bool) {
    let existing: BTreeSet<String> = entries
        .iter()
        .filter_map(|e| e.get("Key").and_then(Value::as_str))
        .map(str::to_string)
        .collect();

    for (key, value) in tags {
        if existing.contains(key) {
            continue;
        }
        let entry = if propagate {
            json!({ "Key": key, "Value": value, "PropagateAtLaunch": true })
        } else {
            json!({ "Key": key, "Value": value })
        };
        entries.push(entry);
    }
}
