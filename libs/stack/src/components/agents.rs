//! Build agents: the shared agent pool and one entry per agent spec.
//!
//! The pool is a security group, an execution role limited to image pulls
//! and log writes, a task role shared by every agent for in-build AWS calls,
//! and a log group with one stream. Each [`AgentSpec`] adds ECR repositories
//! for its images and, for composite agents, a Fargate task definition.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Component, Path};

use jecs_graph::ResourceGraph;
use jecs_iam::arn::{aws_managed_policy, repository_name, task_family};
use jecs_iam::TrustPolicy;
use jecs_id::{
    Expr, LogGroupName, LogStreamName, RepositoryUri, RoleArn, SecurityGroupId,
    TaskDefinitionArn,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info_span};

use super::network::NetworkDescriptor;
use super::{awslogs, container_environment, security_group_properties, Scope, AGENTS, NETWORK};
use crate::config::is_valid_fargate_size;
use crate::{ConfigError, StackConfig, SynthError};

/// Description of the agent security group.
pub const AGENT_SECURITY_GROUP_DESCRIPTION: &str = "Jenkins Agent access to Jenkins Controller";

/// Days the agent log group keeps events.
pub const AGENT_LOG_RETENTION_DAYS: u32 = 1;

/// Metadata key recording where an image is built from.
pub const IMAGE_SOURCE_METADATA: &str = "jecs:image-source";

/// One container image built from a source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerSpec {
    name: String,
    source_dir: String,
    environment: BTreeMap<String, String>,
}

impl ContainerSpec {
    pub fn new(name: impl Into<String>, source_dir: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            source_dir: source_dir.into(),
            environment: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.environment.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source_dir(&self) -> &str {
        &self.source_dir
    }

    pub fn environment(&self) -> &BTreeMap<String, String> {
        &self.environment
    }
}

/// A multi-container Fargate task definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskSpec {
    family: String,
    cpu: u32,
    memory_mib: u32,
    stream_prefix: String,
    containers: Vec<ContainerSpec>,
}

impl TaskSpec {
    pub fn new(
        family: impl Into<String>,
        cpu: u32,
        memory_mib: u32,
        stream_prefix: impl Into<String>,
        containers: Vec<ContainerSpec>,
    ) -> Self {
        Self {
            family: family.into(),
            cpu,
            memory_mib,
            stream_prefix: stream_prefix.into(),
            containers,
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn containers(&self) -> &[ContainerSpec] {
        &self.containers
    }
}

/// How an agent is exposed to the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentShape {
    /// A single image; the controller launches it with its own task definition.
    Image { source_dir: String },
    /// A task definition declared here; the controller runs it by ARN.
    Task(TaskSpec),
}

/// One build agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentSpec {
    name: String,
    env_key: String,
    shape: AgentShape,
}

impl AgentSpec {
    pub fn image(
        name: impl Into<String>,
        env_key: impl Into<String>,
        source_dir: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            env_key: env_key.into(),
            shape: AgentShape::Image {
                source_dir: source_dir.into(),
            },
        }
    }

    pub fn task(name: impl Into<String>, env_key: impl Into<String>, task: TaskSpec) -> Self {
        Self {
            name: name.into(),
            env_key: env_key.into(),
            shape: AgentShape::Task(task),
        }
    }

    /// Minimal single-container agent.
    pub fn simple() -> Self {
        Self::image("simple", "simple_agent_image", "docker/agents/simple")
    }

    /// Agent with a Java 11 toolchain.
    pub fn java11() -> Self {
        Self::image("java11", "agent_image_java_11", "docker/agents/java11")
    }

    /// Build agent with a PostgreSQL 12 sidecar for integration tests.
    pub fn postgres12() -> Self {
        Self::task(
            "postgres12",
            "postgres12_task_def",
            TaskSpec::new(
                "complex-agent",
                2048,
                4096,
                "complex",
                vec![
                    ContainerSpec::new("jnlp", "docker/agents/postgres12/jnlp"),
                    ContainerSpec::new("postgres", "docker/agents/postgres12/postgres")
                        .with_env("POSTGRES_PASSWORD", "password"),
                ],
            ),
        )
    }

    pub fn defaults() -> Vec<Self> {
        vec![Self::simple(), Self::postgres12(), Self::java11()]
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Controller environment key carrying this agent's image or task ARN.
    pub fn env_key(&self) -> &str {
        &self.env_key
    }

    pub fn shape(&self) -> &AgentShape {
        &self.shape
    }

    /// `(repository suffix, source dir)` for every image of this agent.
    pub fn images(&self) -> Vec<(String, &str)> {
        match &self.shape {
            AgentShape::Image { source_dir } => vec![(self.name.clone(), source_dir.as_str())],
            AgentShape::Task(task) => task
                .containers
                .iter()
                .map(|c| (format!("{}-{}", self.name, c.name), c.source_dir.as_str()))
                .collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidAgent {
            name: self.name.clone(),
            reason,
        };

        if !is_lower_identifier(&self.name, '-') {
            return Err(invalid(
                "name must be lowercase letters, digits and hyphens".into(),
            ));
        }
        if !is_lower_identifier(&self.env_key, '_') {
            return Err(invalid(
                "environment key must be lowercase letters, digits and underscores".into(),
            ));
        }

        if let AgentShape::Task(task) = &self.shape {
            if task.containers.is_empty() {
                return Err(invalid("task has no containers".into()));
            }
            if !is_lower_identifier(&task.family, '-') {
                return Err(invalid(format!("invalid task family {:?}", task.family)));
            }
            if !is_valid_fargate_size(task.cpu, task.memory_mib) {
                return Err(invalid(format!(
                    "unsupported fargate sizing {} cpu / {} MiB",
                    task.cpu, task.memory_mib
                )));
            }
            let mut names = BTreeSet::new();
            for container in &task.containers {
                if !is_lower_identifier(&container.name, '-') {
                    return Err(invalid(format!(
                        "invalid container name {:?}",
                        container.name
                    )));
                }
                if !names.insert(container.name.as_str()) {
                    return Err(invalid(format!(
                        "duplicate container {:?}",
                        container.name
                    )));
                }
            }
        }

        for (_, source_dir) in self.images() {
            validate_source_dir(source_dir).map_err(|reason| invalid(reason.into()))?;
        }
        Ok(())
    }
}

fn is_lower_identifier(s: &str, separator: char) -> bool {
    s.chars().next().is_some_and(|c| c.is_ascii_lowercase())
        && s
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == separator)
}

/// Image source directories are non-empty relative paths that stay inside
/// the build context.
fn validate_source_dir(dir: &str) -> Result<(), &'static str> {
    if dir.trim().is_empty() {
        return Err("image source directory is required");
    }
    let path = Path::new(dir);
    if path.is_absolute() {
        return Err("image source directory must be relative");
    }
    if path.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err("image source directory must not contain `..`");
    }
    Ok(())
}

/// An ECR repository holding one agent image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Repository {
    name: String,
    uri: RepositoryUri,
    source_dir: String,
}

impl Repository {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uri(&self) -> &RepositoryUri {
        &self.uri
    }

    pub fn source_dir(&self) -> &str {
        &self.source_dir
    }
}

/// One declared agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentImage {
    name: String,
    env_key: String,
    value: Expr,
    repositories: Vec<Repository>,
    task_definition: Option<TaskDefinitionArn>,
}

impl AgentImage {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn env_key(&self) -> &str {
        &self.env_key
    }

    /// Image reference, or task definition ARN for composite agents.
    pub fn value(&self) -> &Expr {
        &self.value
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    pub fn task_definition(&self) -> Option<&TaskDefinitionArn> {
        self.task_definition.as_ref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentDescriptor {
    security_group_id: SecurityGroupId,
    execution_role_arn: RoleArn,
    task_role_arn: RoleArn,
    log_group: LogGroupName,
    log_stream: LogStreamName,
    images: Vec<AgentImage>,
}

impl AgentDescriptor {
    pub fn security_group_id(&self) -> &SecurityGroupId {
        &self.security_group_id
    }

    pub fn execution_role_arn(&self) -> &RoleArn {
        &self.execution_role_arn
    }

    pub fn task_role_arn(&self) -> &RoleArn {
        &self.task_role_arn
    }

    pub fn log_group(&self) -> &LogGroupName {
        &self.log_group
    }

    pub fn log_stream(&self) -> &LogStreamName {
        &self.log_stream
    }

    pub fn images(&self) -> &[AgentImage] {
        &self.images
    }

    pub fn image(&self, name: &str) -> Option<&AgentImage> {
        self.images.iter().find(|i| i.name == name)
    }

    /// Every repository, in declaration order.
    pub fn repositories(&self) -> impl Iterator<Item = &Repository> {
        self.images.iter().flat_map(|i| i.repositories.iter())
    }
}

pub struct AgentsBuilder<'c> {
    config: &'c StackConfig,
    network: Option<&'c NetworkDescriptor>,
}

impl<'c> AgentsBuilder<'c> {
    pub fn new(config: &'c StackConfig) -> Self {
        Self {
            config,
            network: None,
        }
    }

    #[must_use]
    pub fn network(mut self, network: &'c NetworkDescriptor) -> Self {
        self.network = Some(network);
        self
    }

    pub fn build(self, graph: &mut ResourceGraph) -> Result<AgentDescriptor, SynthError> {
        let network = self.network.ok_or(SynthError::missing(AGENTS, NETWORK))?;
        let _span = info_span!("component", name = AGENTS).entered();

        if self.config.agents().is_empty() {
            return Err(ConfigError::NoAgents.into());
        }

        let stack = self.config.stack_name();
        let mut scope = Scope::new(AGENTS, graph);

        let security_group = scope.declare(
            "SecurityGroup",
            "AWS::EC2::SecurityGroup",
            security_group_properties(AGENT_SECURITY_GROUP_DESCRIPTION, network.vpc_id()),
        )?;

        let execution_role = scope.declare(
            "ExecutionRole",
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": TrustPolicy::service("ecs-tasks.amazonaws.com"),
                "ManagedPolicyArns": [
                    aws_managed_policy("service-role/AmazonECSTaskExecutionRolePolicy")
                ]
            }),
        )?;
        let execution_role_arn = RoleArn::of(&execution_role);

        let task_role = scope.declare(
            "TaskRole",
            "AWS::IAM::Role",
            json!({
                "AssumeRolePolicyDocument": TrustPolicy::service("ecs-tasks.amazonaws.com")
            }),
        )?;
        let task_role_arn = RoleArn::of(&task_role);

        let log_group = scope.declare(
            "LogGroup",
            "AWS::Logs::LogGroup",
            json!({ "RetentionInDays": AGENT_LOG_RETENTION_DAYS }),
        )?;
        let log_group = LogGroupName::of(&log_group);
        let log_stream = scope.declare(
            "LogStream",
            "AWS::Logs::LogStream",
            json!({ "LogGroupName": log_group }),
        )?;

        let tag = &self.config.settings().image_tag;
        let mut images = Vec::with_capacity(self.config.agents().len());

        for spec in self.config.agents() {
            spec.validate()?;

            let mut repositories = Vec::new();
            for (suffix, source_dir) in spec.images() {
                let name = repository_name(stack, &suffix);
                let id = scope.id(&format!("{suffix}Repository"))?;
                let mut metadata = Map::new();
                metadata.insert(IMAGE_SOURCE_METADATA.to_string(), source_dir.into());
                let repository = scope
                    .resource(
                        id,
                        "AWS::ECR::Repository",
                        json!({
                            "RepositoryName": name,
                            "ImageScanningConfiguration": { "ScanOnPush": true },
                            "EmptyOnDelete": true
                        }),
                    )
                    .with_metadata(Value::Object(metadata));
                let repository = scope.add(repository)?;
                debug!(agent = spec.name(), repository = %name, source_dir, "agent image");

                repositories.push(Repository {
                    name,
                    uri: RepositoryUri::of(&repository),
                    source_dir: source_dir.to_string(),
                });
            }

            let (value, task_definition) = match spec.shape() {
                AgentShape::Image { .. } => (image_reference(&repositories[0].uri, tag), None),
                AgentShape::Task(task) => {
                    let containers: Vec<_> = task
                        .containers
                        .iter()
                        .zip(&repositories)
                        .map(|(container, repository)| {
                            let environment: Vec<(&str, Expr)> = container
                                .environment
                                .iter()
                                .map(|(k, v)| (k.as_str(), Expr::literal(v.clone())))
                                .collect();
                            json!({
                                "Name": container.name,
                                "Image": image_reference(&repository.uri, tag),
                                "Essential": true,
                                "Environment": container_environment(
                                    environment.iter().map(|(k, v)| (*k, v))
                                ),
                                "LogConfiguration": awslogs(&log_group, &task.stream_prefix)
                            })
                        })
                        .collect();

                    let task_definition = scope.declare(
                        &format!("{}TaskDefinition", spec.name()),
                        "AWS::ECS::TaskDefinition",
                        json!({
                            "Family": task_family(stack, &task.family),
                            "Cpu": task.cpu.to_string(),
                            "Memory": task.memory_mib.to_string(),
                            "NetworkMode": "awsvpc",
                            "RequiresCompatibilities": ["FARGATE"],
                            "ExecutionRoleArn": execution_role_arn,
                            "TaskRoleArn": task_role_arn,
                            "ContainerDefinitions": containers
                        }),
                    )?;
                    let arn = TaskDefinitionArn::of(&task_definition);
                    (arn.expr(), Some(arn))
                }
            };

            images.push(AgentImage {
                name: spec.name().to_string(),
                env_key: spec.env_key().to_string(),
                value,
                repositories,
                task_definition,
            });
        }

        Ok(AgentDescriptor {
            security_group_id: SecurityGroupId::of(&security_group),
            execution_role_arn,
            task_role_arn,
            log_group,
            log_stream: LogStreamName::of(&log_stream),
            images,
        })
    }
}

/// `<repository uri>:<tag>`.
fn image_reference(uri: &RepositoryUri, tag: &str) -> Expr {
    Expr::sub(format!("{uri}:{tag}"))
}
