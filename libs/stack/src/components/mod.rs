//! Stack components.
//!
//! Each component reads the [`StackConfig`](crate::StackConfig) plus the
//! descriptors of its upstream components, declares its resources into the
//! shared graph and returns a descriptor of deferred references for its
//! dependents. Components are built through builders; building without a
//! required upstream descriptor fails with
//! [`SynthError::MissingDependency`].

pub mod agents;
pub mod cluster;
pub mod codebuild;
pub mod controller;
pub mod network;

use jecs_graph::{Output, Resource, ResourceGraph};
use jecs_id::{Expr, LogicalId};
use serde_json::{json, Value};
use tracing::debug;

use crate::SynthError;

/// Component names, in build order.
pub const NETWORK: &str = "network";
pub const CLUSTER: &str = "cluster";
pub const AGENTS: &str = "agents";
pub const CODEBUILD: &str = "codebuild";
pub const CONTROLLER: &str = "controller";

pub const COMPONENTS: [&str; 5] = [NETWORK, CLUSTER, AGENTS, CODEBUILD, CONTROLLER];

/// Declares resources on behalf of one component.
///
/// Logical IDs are prefixed with the Pascal-cased component name, and every
/// resource is owned by the component.
pub(crate) struct Scope<'a> {
    component: &'static str,
    graph: &'a mut ResourceGraph,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(component: &'static str, graph: &'a mut ResourceGraph) -> Self {
        Self { component, graph }
    }

    pub(crate) fn id(&self, name: &str) -> Result<LogicalId, SynthError> {
        Ok(LogicalId::from_path([self.component, name])?)
    }

    pub(crate) fn resource(
        &self,
        id: LogicalId,
        resource_type: &str,
        properties: Value,
    ) -> Resource {
        Resource::new(id, resource_type, self.component, properties)
    }

    pub(crate) fn add(&mut self, resource: Resource) -> Result<LogicalId, SynthError> {
        debug!(
            component = self.component,
            logical_id = %resource.logical_id(),
            resource_type = resource.resource_type(),
            "declared resource"
        );
        let id = resource.logical_id().clone();
        self.graph.insert(resource)?;
        Ok(id)
    }

    pub(crate) fn output(&mut self, output: Output) -> Result<(), SynthError> {
        self.graph.add_output(output)?;
        Ok(())
    }

    /// Declares a resource under `name` with no extra attributes.
    pub(crate) fn declare(
        &mut self,
        name: &str,
        resource_type: &str,
        properties: Value,
    ) -> Result<LogicalId, SynthError> {
        let id = self.id(name)?;
        let resource = self.resource(id, resource_type, properties);
        self.add(resource)
    }
}

/// Security group with all egress and no ingress.
pub(crate) fn security_group_properties(description: &str, vpc: &jecs_id::VpcId) -> Value {
    json!({
        "GroupDescription": description,
        "VpcId": vpc,
        "SecurityGroupEgress": [{
            "CidrIp": "0.0.0.0/0",
            "Description": "Allow all outbound traffic by default",
            "IpProtocol": "-1"
        }]
    })
}

/// A `{Key, Value}` tag list.
pub(crate) fn name_tag(name: impl Into<Expr>) -> Value {
    json!([{ "Key": "Name", "Value": name.into() }])
}

/// `awslogs` log configuration of a container.
pub(crate) fn awslogs(group: &jecs_id::LogGroupName, prefix: &str) -> Value {
    json!({
        "LogDriver": "awslogs",
        "Options": {
            "awslogs-group": group,
            "awslogs-stream-prefix": prefix,
            "awslogs-region": Expr::Pseudo(jecs_id::Pseudo::Region)
        }
    })
}

/// `[{Name, Value}]` container environment.
pub(crate) fn container_environment<'e, I>(entries: I) -> Value
where
    I: IntoIterator<Item = (&'e str, &'e Expr)>,
{
    Value::Array(
        entries
            .into_iter()
            .map(|(name, value)| json!({ "Name": name, "Value": value }))
            .collect(),
    )
}
