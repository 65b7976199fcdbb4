//! Jenkins controller: a load-balanced Fargate service with EFS storage.
//!
//! The controller is the only component that reaches across every other
//! one. It opens its ports to the agent and pool security groups, opens the
//! shared filesystem to itself, and owns the least-privilege policy that
//! lets the Jenkins ECS plugin launch agent tasks.
//!
//! Cross-component ingress rules are declared here as standalone
//! `AWS::EC2::SecurityGroupIngress` resources so that edges always point
//! from the controller to its upstream components.

use jecs_graph::{Output, ResourceGraph};
use jecs_iam::arn::{
    aws_managed_policy, repository_name, task_definition_pattern, task_family, task_pattern,
};
use jecs_iam::{Condition, PolicyDocument, PolicyStatement, TrustPolicy};
use jecs_id::{
    AccessPointId, DiscoveryServiceArn, Expr, LoadBalancerDnsName, LogGroupName, LogicalId,
    RepositoryUri, RoleArn, SecurityGroupId, ServiceArn, TargetGroupArn, TaskDefinitionArn,
};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, info_span};

use super::agents::{AgentDescriptor, IMAGE_SOURCE_METADATA};
use super::cluster::ClusterDescriptor;
use super::codebuild::CodeBuildDescriptor;
use super::network::NetworkDescriptor;
use super::{
    awslogs, container_environment, security_group_properties, Scope, AGENTS, CLUSTER,
    CONTROLLER, NETWORK,
};
use crate::{StackConfig, SynthError};

/// Web UI port, fronted by the load balancer.
pub const HTTP_PORT: u16 = 8080;

/// Inbound agent (JNLP) port.
pub const AGENT_PORT: u16 = 50000;

/// Listener port of the load balancer.
pub const LISTENER_PORT: u16 = 80;

/// NFS port of the shared filesystem.
pub const NFS_PORT: u16 = 2049;

/// Name of the controller container and Cloud Map service.
pub const CONTROLLER_NAME: &str = "controller";

/// Build context of the controller image.
pub const CONTROLLER_SOURCE_DIR: &str = "docker/controller";

pub const JENKINS_HOME: &str = "/var/jenkins_home";
pub const ACCESS_POINT_PATH: &str = "/jenkins-home";
pub const HOME_VOLUME: &str = "jenkins-home";

/// POSIX owner of the access point.
pub const JENKINS_UID: &str = "1000";
pub const JENKINS_GID: &str = "1000";
pub const ACCESS_POINT_PERMISSIONS: &str = "750";

pub const HEALTH_CHECK_PATH: &str = "/login";

pub const CASC_CONFIG_PATH: &str = "/config-as-code.yaml";

pub const JAVA_OPTS: [&str; 4] = [
    "-Djenkins.install.runSetupWizard=false",
    "-Dhudson.slaves.NodeProvisioner.initialDelay=0",
    "-Dhudson.slaves.NodeProvisioner.MARGIN=50",
    "-Dhudson.slaves.NodeProvisioner.MARGIN0=0.85",
];

pub const CONTROLLER_LOG_RETENTION_DAYS: u32 = 30;

/// Environment keys set on the controller container regardless of the
/// agent set. Agent environment keys must not collide with these.
pub const CONTRACT_KEYS: [&str; 21] = [
    "JAVA_OPTS",
    "CASC_JENKINS_CONFIG",
    "TZ",
    "stack_name",
    "cluster_arn",
    "aws_region",
    "jenkins_url",
    "jenkins_public_url",
    "subnet_ids",
    "security_group_ids",
    "execution_role_arn",
    "task_role_arn",
    "agent_log_group",
    "agent_log_stream_prefix",
    "admin_username",
    "admin_password",
    "gh_credential_id",
    "gh_credential_app_id",
    "gh_credential_private_key",
    "gh_credential_owner",
    "codebuild_project_name",
];

/// Read-only ECS calls and task definition registration used by the ECS
/// plugin. These cannot be resource-scoped.
pub const AGENT_LIFECYCLE_ACTIONS: [&str; 9] = [
    "ecs:RegisterTaskDefinition",
    "ecs:DeregisterTaskDefinition",
    "ecs:ListClusters",
    "ecs:DescribeContainerInstances",
    "ecs:ListTaskDefinitions",
    "ecs:DescribeTaskDefinition",
    "ecs:DescribeTasks",
    "ecs:TagResource",
    "ecs:ListTagsForResource",
];

pub const CODEBUILD_ACTIONS: [&str; 6] = [
    "codebuild:List*",
    "codebuild:Describe*",
    "codebuild:Get*",
    "codebuild:StartBuild",
    "codebuild:StopBuild",
    "codebuild:BatchGet*",
];

/// Ordered `KEY → value` environment of the controller container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ControllerEnvironment(Vec<(String, Expr)>);

impl ControllerEnvironment {
    fn push(&mut self, key: impl Into<String>, value: impl Into<Expr>) {
        self.0.push((key.into(), value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&Expr> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Expr)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ControllerDescriptor {
    image: Expr,
    repository_uri: RepositoryUri,
    environment: ControllerEnvironment,
    security_group_id: SecurityGroupId,
    task_definition_arn: TaskDefinitionArn,
    service_arn: ServiceArn,
    task_role_arn: RoleArn,
    execution_role_arn: RoleArn,
    access_point_id: AccessPointId,
    target_group_arn: TargetGroupArn,
    load_balancer_dns: LoadBalancerDnsName,
    discovery_service_arn: DiscoveryServiceArn,
    policy: PolicyDocument,
}

impl ControllerDescriptor {
    pub fn image(&self) -> &Expr {
        &self.image
    }

    pub fn repository_uri(&self) -> &RepositoryUri {
        &self.repository_uri
    }

    /// Web UI and agent ports.
    pub fn ports(&self) -> [u16; 2] {
        [HTTP_PORT, AGENT_PORT]
    }

    pub fn environment(&self) -> &ControllerEnvironment {
        &self.environment
    }

    pub fn security_group_id(&self) -> &SecurityGroupId {
        &self.security_group_id
    }

    pub fn task_definition_arn(&self) -> &TaskDefinitionArn {
        &self.task_definition_arn
    }

    pub fn service_arn(&self) -> &ServiceArn {
        &self.service_arn
    }

    pub fn task_role_arn(&self) -> &RoleArn {
        &self.task_role_arn
    }

    pub fn execution_role_arn(&self) -> &RoleArn {
        &self.execution_role_arn
    }

    pub fn access_point_id(&self) -> &AccessPointId {
        &self.access_point_id
    }

    pub fn target_group_arn(&self) -> &TargetGroupArn {
        &self.target_group_arn
    }

    pub fn load_balancer_dns(&self) -> &LoadBalancerDnsName {
        &self.load_balancer_dns
    }

    pub fn discovery_service_arn(&self) -> &DiscoveryServiceArn {
        &self.discovery_service_arn
    }

    /// The task role policy as attached.
    pub fn policy(&self) -> &PolicyDocument {
        &self.policy
    }
}

pub struct ControllerBuilder<'c> {
    config: &'c StackConfig,
    network: Option<&'c NetworkDescriptor>,
    cluster: Option<&'c ClusterDescriptor>,
    agents: Option<&'c AgentDescriptor>,
    codebuild: Option<&'c CodeBuildDescriptor>,
}

impl<'c> ControllerBuilder<'c> {
    pub fn new(config: &'c StackConfig) -> Self {
        Self {
            config,
            network: None,
            cluster: None,
            agents: None,
            codebuild: None,
        }
    }

    #[must_use]
    pub fn network(mut self, network: &'c NetworkDescriptor) -> Self {
        self.network = Some(network);
        self
    }

    #[must_use]
    pub fn cluster(mut self, cluster: &'c ClusterDescriptor) -> Self {
        self.cluster = Some(cluster);
        self
    }

    #[must_use]
    pub fn agents(mut self, agents: &'c AgentDescriptor) -> Self {
        self.agents = Some(agents);
        self
    }

    /// Optional. Without it the controller gets no CodeBuild permissions.
    #[must_use]
    pub fn codebuild(mut self, codebuild: Option<&'c CodeBuildDescriptor>) -> Self {
        self.codebuild = codebuild;
        self
    }

    pub fn build(self, graph: &mut ResourceGraph) -> Result<ControllerDescriptor, SynthError> {
        let network = self
            .network
            .ok_or(SynthError::missing(CONTROLLER, NETWORK))?;
        let cluster = self
            .cluster
            .ok_or(SynthError::missing(CONTROLLER, CLUSTER))?;
        let agents = self.agents.ok_or(SynthError::missing(CONTROLLER, AGENTS))?;
        let _span = info_span!("component", name = CONTROLLER).entered();

        let settings = self.config.settings();
        let stack = self.config.stack_name();
        let mut scope = Scope::new(CONTROLLER, graph);

        let mut metadata = Map::new();
        metadata.insert(
            IMAGE_SOURCE_METADATA.to_string(),
            CONTROLLER_SOURCE_DIR.into(),
        );
        let repository_id = scope.id("Repository")?;
        let repository = scope
            .resource(
                repository_id,
                "AWS::ECR::Repository",
                json!({
                    "RepositoryName": repository_name(stack, CONTROLLER_NAME),
                    "ImageScanningConfiguration": { "ScanOnPush": true },
                    "EmptyOnDelete": true
                }),
            )
            .with_metadata(Value::Object(metadata));
        let repository = scope.add(repository)?;
        let repository_uri = RepositoryUri::of(&repository);
        let image = Expr::sub(format!("{repository_uri}:{}", settings.image_tag));

        // Security groups
        let security_group = scope.declare(
            "SecurityGroup",
            "AWS::EC2::SecurityGroup",
            security_group_properties(&format!("{stack} Jenkins controller"), network.vpc_id()),
        )?;
        let security_group = SecurityGroupId::of(&security_group);

        let mut lb_properties = security_group_properties(
            &format!("{stack} Jenkins controller load balancer"),
            network.vpc_id(),
        );
        lb_properties["SecurityGroupIngress"] = json!([{
            "CidrIp": "0.0.0.0/0",
            "Description": format!("Allow from anyone on port {LISTENER_PORT}"),
            "FromPort": LISTENER_PORT,
            "IpProtocol": "tcp",
            "ToPort": LISTENER_PORT
        }]);
        let lb_security_group =
            scope.declare("LoadBalancerSecurityGroup", "AWS::EC2::SecurityGroup", lb_properties)?;
        let lb_security_group = SecurityGroupId::of(&lb_security_group);

        declare_ingress(
            &mut scope,
            "IngressFromLoadBalancer",
            &security_group,
            &lb_security_group,
            Some(HTTP_PORT),
            "Load balancer to controller",
        )?;
        for port in [HTTP_PORT, AGENT_PORT] {
            declare_ingress(
                &mut scope,
                &format!("IngressFromAgents{port}"),
                &security_group,
                agents.security_group_id(),
                Some(port),
                &format!("Fargate agent to controller {port}"),
            )?;
            if let Some(pool) = cluster.pool_security_group() {
                declare_ingress(
                    &mut scope,
                    &format!("IngressFromPool{port}"),
                    &security_group,
                    pool,
                    Some(port),
                    &format!("EC2 agent to controller {port}"),
                )?;
            }
        }
        declare_ingress(
            &mut scope,
            "AgentIngressFromController",
            agents.security_group_id(),
            &security_group,
            None,
            "Controller to agent",
        )?;
        declare_ingress(
            &mut scope,
            "FileSystemIngress",
            cluster.filesystem_security_group(),
            &security_group,
            Some(NFS_PORT),
            "Controller to shared filesystem",
        )?;

        // Storage
        let access_point = scope.declare(
            "AccessPoint",
            "AWS::EFS::AccessPoint",
            json!({
                "FileSystemId": cluster.filesystem_id(),
                "PosixUser": { "Uid": JENKINS_UID, "Gid": JENKINS_GID },
                "RootDirectory": {
                    "Path": ACCESS_POINT_PATH,
                    "CreationInfo": {
                        "OwnerUid": JENKINS_UID,
                        "OwnerGid": JENKINS_GID,
                        "Permissions": ACCESS_POINT_PERMISSIONS
                    }
                }
            }),
        )?;
        let access_point_id = AccessPointId::of(&access_point);

        // Identity
        let log_group = scope.declare(
            "LogGroup",
            "AWS::Logs::LogGroup",
            json!({ "RetentionInDays": CONTROLLER_LOG_RETENTION_DAYS }),
        )?;
        let log_group = LogGroupName::of(&log_group);

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

        let policy = controller_policy(self.config, cluster, agents, self.codebuild)?;
        debug!(
            statements = policy.statements().len(),
            codebuild = self.codebuild.is_some(),
            "controller policy"
        );
        let task_policy = scope.declare(
            "TaskRolePolicy",
            "AWS::IAM::Policy",
            json!({
                "PolicyName": format!("{stack}-controller"),
                "PolicyDocument": policy,
                "Roles": [Expr::Ref(task_role)]
            }),
        )?;

        // Task
        let environment =
            controller_environment(self.config, network, cluster, agents, self.codebuild);
        let task_definition = scope.declare(
            "TaskDefinition",
            "AWS::ECS::TaskDefinition",
            json!({
                "Family": task_family(stack, CONTROLLER_NAME),
                "Cpu": settings.fargate_cpu.to_string(),
                "Memory": settings.fargate_memory_limit_mib.to_string(),
                "NetworkMode": "awsvpc",
                "RequiresCompatibilities": ["FARGATE"],
                "ExecutionRoleArn": execution_role_arn,
                "TaskRoleArn": task_role_arn,
                "ContainerDefinitions": [{
                    "Name": CONTROLLER_NAME,
                    "Image": image,
                    "Essential": true,
                    "PortMappings": [
                        { "ContainerPort": HTTP_PORT, "Protocol": "tcp" },
                        { "ContainerPort": AGENT_PORT, "HostPort": AGENT_PORT, "Protocol": "tcp" }
                    ],
                    "Environment": container_environment(environment.iter()),
                    "MountPoints": [{
                        "ContainerPath": JENKINS_HOME,
                        "SourceVolume": HOME_VOLUME,
                        "ReadOnly": false
                    }],
                    "LogConfiguration": awslogs(&log_group, CONTROLLER_NAME)
                }],
                "Volumes": [{
                    "Name": HOME_VOLUME,
                    "EFSVolumeConfiguration": {
                        "FilesystemId": cluster.filesystem_id(),
                        "TransitEncryption": "ENABLED",
                        "AuthorizationConfig": {
                            "AccessPointId": access_point_id,
                            "IAM": "ENABLED"
                        }
                    }
                }]
            }),
        )?;
        let task_definition_arn = TaskDefinitionArn::of(&task_definition);

        // Load balancing
        let load_balancer = scope.declare(
            "LoadBalancer",
            "AWS::ElasticLoadBalancingV2::LoadBalancer",
            json!({
                "Type": "application",
                "Scheme": "internet-facing",
                "Subnets": network.public_subnet_ids(),
                "SecurityGroups": [lb_security_group]
            }),
        )?;
        let target_group = scope.declare(
            "TargetGroup",
            "AWS::ElasticLoadBalancingV2::TargetGroup",
            json!({
                "Port": HTTP_PORT,
                "Protocol": "HTTP",
                "TargetType": "ip",
                "VpcId": network.vpc_id(),
                "HealthCheckPath": HEALTH_CHECK_PATH,
                "TargetGroupAttributes": [
                    { "Key": "deregistration_delay.timeout_seconds", "Value": "0" }
                ]
            }),
        )?;
        let target_group_arn = TargetGroupArn::of(&target_group);
        let listener = scope.declare(
            "Listener",
            "AWS::ElasticLoadBalancingV2::Listener",
            json!({
                "LoadBalancerArn": Expr::Ref(load_balancer.clone()),
                "Port": LISTENER_PORT,
                "Protocol": "HTTP",
                "DefaultActions": [{ "Type": "forward", "TargetGroupArn": target_group_arn }]
            }),
        )?;

        let discovery_service = scope.declare(
            "DiscoveryService",
            "AWS::ServiceDiscovery::Service",
            json!({
                "Name": CONTROLLER_NAME,
                "NamespaceId": cluster.namespace().id(),
                "DnsConfig": {
                    "DnsRecords": [{ "Type": "A", "TTL": 60 }],
                    "RoutingPolicy": "MULTIVALUE"
                },
                "HealthCheckCustomConfig": { "FailureThreshold": 1 }
            }),
        )?;
        let discovery_service_arn = DiscoveryServiceArn::of(&discovery_service);

        let service_id = scope.id("Service")?;
        let service = scope
            .resource(
                service_id,
                "AWS::ECS::Service",
                json!({
                    "Cluster": cluster.cluster_name(),
                    "LaunchType": "FARGATE",
                    "TaskDefinition": task_definition_arn,
                    "DesiredCount": 1,
                    "DeploymentConfiguration": {
                        "MinimumHealthyPercent": 0,
                        "MaximumPercent": 100
                    },
                    "EnableECSManagedTags": true,
                    "HealthCheckGracePeriodSeconds": 60,
                    "NetworkConfiguration": {
                        "AwsvpcConfiguration": {
                            "AssignPublicIp": "DISABLED",
                            "Subnets": network.private_subnet_ids(),
                            "SecurityGroups": [security_group]
                        }
                    },
                    "LoadBalancers": [{
                        "ContainerName": CONTROLLER_NAME,
                        "ContainerPort": HTTP_PORT,
                        "TargetGroupArn": target_group_arn
                    }],
                    "ServiceRegistries": [{ "RegistryArn": discovery_service_arn }]
                }),
            )
            .with_depends_on(&listener)
            .with_depends_on(&task_policy);
        let service = scope.add(service)?;

        let load_balancer_dns = LoadBalancerDnsName::of(&load_balancer);
        scope.output(
            Output::new(
                LogicalId::from_path([CONTROLLER_NAME, "Url"])?,
                Expr::sub(format!("http://{load_balancer_dns}")),
            )
            .with_description("Jenkins controller URL"),
        )?;

        Ok(ControllerDescriptor {
            image,
            repository_uri,
            environment,
            security_group_id: security_group,
            task_definition_arn,
            service_arn: ServiceArn::of(&service),
            task_role_arn,
            execution_role_arn,
            access_point_id,
            target_group_arn,
            load_balancer_dns,
            discovery_service_arn,
            policy,
        })
    }
}

/// A single-port (or all-traffic, when `port` is `None`) TCP ingress rule
/// on `group` from `source`.
fn declare_ingress(
    scope: &mut Scope<'_>,
    name: &str,
    group: &SecurityGroupId,
    source: &SecurityGroupId,
    port: Option<u16>,
    description: &str,
) -> Result<LogicalId, SynthError> {
    let mut properties = json!({
        "GroupId": group,
        "SourceSecurityGroupId": source,
        "Description": description,
        "IpProtocol": "-1"
    });
    if let Some(port) = port {
        properties["IpProtocol"] = json!("tcp");
        properties["FromPort"] = json!(port);
        properties["ToPort"] = json!(port);
    }
    scope.declare(name, "AWS::EC2::SecurityGroupIngress", properties)
}

/// The container environment the controller image renders its
/// configuration-as-code file from.
pub fn controller_environment(
    config: &StackConfig,
    network: &NetworkDescriptor,
    cluster: &ClusterDescriptor,
    agents: &AgentDescriptor,
    codebuild: Option<&CodeBuildDescriptor>,
) -> ControllerEnvironment {
    let settings = config.settings();
    let credentials = config.credentials();
    let mut env = ControllerEnvironment::default();

    env.push("JAVA_OPTS", JAVA_OPTS.join(" "));
    env.push("CASC_JENKINS_CONFIG", CASC_CONFIG_PATH);
    env.push("TZ", settings.timezone.as_str());
    env.push("stack_name", config.stack_name());
    env.push("cluster_arn", cluster.cluster_arn());
    env.push("aws_region", settings.region.as_str());
    env.push("jenkins_url", settings.jenkins_url.as_str());
    env.push("jenkins_public_url", credentials.jenkins_public_url.as_str());
    env.push("subnet_ids", Expr::join(",", network.private_subnet_ids()));
    env.push("security_group_ids", agents.security_group_id());
    env.push("execution_role_arn", agents.execution_role_arn());
    env.push("task_role_arn", agents.task_role_arn());
    env.push("agent_log_group", agents.log_group());
    env.push("agent_log_stream_prefix", agents.log_stream());
    env.push("admin_username", credentials.admin_username.as_str());
    env.push("admin_password", credentials.admin_password.as_str());
    for image in agents.images() {
        env.push(image.env_key(), image.value().clone());
    }
    let github = &credentials.github;
    env.push("gh_credential_id", github.credential_id.as_str());
    env.push("gh_credential_app_id", github.app_id.as_str());
    env.push("gh_credential_private_key", github.private_key.as_str());
    env.push("gh_credential_owner", github.owner.as_str());
    if let Some(codebuild) = codebuild {
        env.push("codebuild_project_name", codebuild.project_name());
    }
    env
}

/// The controller task role policy.
///
/// `iam:PassRole` is limited to the two agent roles, task launches to the
/// stack's own task definition families and task stops to the stack's
/// cluster. CodeBuild permissions are granted only when the project exists.
pub fn controller_policy(
    config: &StackConfig,
    cluster: &ClusterDescriptor,
    agents: &AgentDescriptor,
    codebuild: Option<&CodeBuildDescriptor>,
) -> Result<PolicyDocument, SynthError> {
    let scope = config.account_scope();
    let stack = config.stack_name();

    let mut statements = vec![
        PolicyStatement::allow()
            .with_sid("AgentLifecycle")
            .with_actions(AGENT_LIFECYCLE_ACTIONS)
            .with_resources([Expr::wildcard()]),
        PolicyStatement::allow()
            .with_sid("ClusterCapacity")
            .with_actions(["ecs:ListContainerInstances"])
            .with_resources([cluster.cluster_arn()]),
        PolicyStatement::allow()
            .with_sid("RunStackTasks")
            .with_actions(["ecs:RunTask"])
            .with_resources([task_definition_pattern(&scope, stack)]),
        PolicyStatement::allow()
            .with_sid("StopClusterTasks")
            .with_actions(["ecs:StopTask"])
            .with_resources([task_pattern(&scope)])
            .with_condition(Condition::arn_equals("ecs:cluster", cluster.cluster_arn())),
        PolicyStatement::allow()
            .with_sid("PassAgentRoles")
            .with_actions(["iam:PassRole"])
            .with_resources([agents.task_role_arn(), agents.execution_role_arn()]),
    ];
    if codebuild.is_some() {
        statements.push(
            PolicyStatement::allow()
                .with_sid("CodeBuild")
                .with_actions(CODEBUILD_ACTIONS)
                .with_resources([Expr::wildcard()]),
        );
    }

    Ok(PolicyDocument::new(statements)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::agents::AgentsBuilder;
    use crate::components::cluster::ClusterBuilder;
    use crate::components::codebuild::CodeBuildBuilder;
    use crate::components::network::NetworkBuilder;
    use crate::testing::{settings, stack_config, stack_config_with};

    struct Upstream {
        graph: ResourceGraph,
        network: NetworkDescriptor,
        cluster: ClusterDescriptor,
        agents: AgentDescriptor,
        codebuild: CodeBuildDescriptor,
    }

    fn upstream(config: &StackConfig) -> Upstream {
        let mut graph = ResourceGraph::new();
        let network = NetworkBuilder::new(config).build(&mut graph).unwrap();
        let cluster = ClusterBuilder::new(config)
            .network(&network)
            .build(&mut graph)
            .unwrap();
        let agents = AgentsBuilder::new(config)
            .network(&network)
            .build(&mut graph)
            .unwrap();
        let codebuild = CodeBuildBuilder::new(config)
            .agents(&agents)
            .build(&mut graph)
            .unwrap();
        Upstream {
            graph,
            network,
            cluster,
            agents,
            codebuild,
        }
    }

    fn id(s: &str) -> LogicalId {
        LogicalId::parse(s).unwrap()
    }

    #[test]
    fn test_requires_every_upstream() {
        let config = stack_config();
        let mut up = upstream(&config);

        let err = ControllerBuilder::new(&config)
            .cluster(&up.cluster)
            .agents(&up.agents)
            .build(&mut up.graph)
            .unwrap_err();
        assert!(matches!(err, SynthError::MissingDependency { dependency: "network", .. }));

        let err = ControllerBuilder::new(&config)
            .network(&up.network)
            .agents(&up.agents)
            .build(&mut up.graph)
            .unwrap_err();
        assert!(matches!(err, SynthError::MissingDependency { dependency: "cluster", .. }));

        let err = ControllerBuilder::new(&config)
            .network(&up.network)
            .cluster(&up.cluster)
            .build(&mut up.graph)
            .unwrap_err();
        assert!(matches!(err, SynthError::MissingDependency { dependency: "agents", .. }));
        assert!(up.graph.owned_by(CONTROLLER).next().is_none());
    }

    #[test]
    fn test_controller_service() {
        let config = stack_config();
        let mut up = upstream(&config);
        let controller = ControllerBuilder::new(&config)
            .network(&up.network)
            .cluster(&up.cluster)
            .agents(&up.agents)
            .codebuild(Some(&up.codebuild))
            .build(&mut up.graph)
            .unwrap();

        assert_eq!(controller.ports(), [8080, 50000]);
        assert_eq!(
            controller.image(),
            &Expr::sub("${ControllerRepository.RepositoryUri}:latest")
        );

        let task = up.graph.get(&id("ControllerTaskDefinition")).unwrap();
        let props = task.properties();
        assert_eq!(props["Family"], "jenkins_controller");
        assert_eq!(props["Cpu"], "1024");
        assert_eq!(props["Memory"], "2048");
        let container = &props["ContainerDefinitions"][0];
        assert_eq!(container["PortMappings"][1]["ContainerPort"], 50000);
        assert_eq!(container["MountPoints"][0]["ContainerPath"], "/var/jenkins_home");
        assert_eq!(
            props["Volumes"][0]["EFSVolumeConfiguration"]["AuthorizationConfig"]["IAM"],
            "ENABLED"
        );

        let service = up.graph.get(&id("ControllerService")).unwrap();
        assert_eq!(service.properties()["DesiredCount"], 1);
        assert_eq!(
            service.properties()["DeploymentConfiguration"]["MinimumHealthyPercent"],
            0
        );
        assert!(service.depends_on().contains(&id("ControllerListener")));
        assert!(service.depends_on().contains(&id("ControllerTaskRolePolicy")));

        let target_group = up.graph.get(&id("ControllerTargetGroup")).unwrap();
        assert_eq!(target_group.properties()["HealthCheckPath"], "/login");
        assert_eq!(
            target_group.properties()["TargetGroupAttributes"][0]["Value"],
            "0"
        );

        let access_point = up.graph.get(&id("ControllerAccessPoint")).unwrap();
        assert_eq!(
            access_point.properties()["RootDirectory"]["CreationInfo"]["Permissions"],
            "750"
        );

        assert_eq!(up.graph.outputs().count(), 1);
        up.graph.validate().unwrap();
        assert!(up.graph.component_depends_on(CONTROLLER, NETWORK));
        assert!(!up.graph.component_depends_on(AGENTS, CONTROLLER));
    }

    #[test]
    fn test_environment_order() {
        let config = stack_config();
        let mut up = upstream(&config);
        let controller = ControllerBuilder::new(&config)
            .network(&up.network)
            .cluster(&up.cluster)
            .agents(&up.agents)
            .codebuild(Some(&up.codebuild))
            .build(&mut up.graph)
            .unwrap();

        let keys: Vec<&str> = controller.environment().keys().collect();
        assert_eq!(
            keys,
            [
                "JAVA_OPTS",
                "CASC_JENKINS_CONFIG",
                "TZ",
                "stack_name",
                "cluster_arn",
                "aws_region",
                "jenkins_url",
                "jenkins_public_url",
                "subnet_ids",
                "security_group_ids",
                "execution_role_arn",
                "task_role_arn",
                "agent_log_group",
                "agent_log_stream_prefix",
                "admin_username",
                "admin_password",
                "simple_agent_image",
                "postgres12_task_def",
                "agent_image_java_11",
                "gh_credential_id",
                "gh_credential_app_id",
                "gh_credential_private_key",
                "gh_credential_owner",
                "codebuild_project_name",
            ]
        );

        let env = controller.environment();
        assert_eq!(env.get("TZ"), Some(&Expr::literal("America/Vancouver")));
        assert_eq!(env.get("CASC_JENKINS_CONFIG"), Some(&Expr::literal(CASC_CONFIG_PATH)));
        assert_eq!(
            env.get("subnet_ids").map(ToString::to_string).as_deref(),
            Some("${NetworkPrivateSubnet1},${NetworkPrivateSubnet2}")
        );
    }

    #[test]
    fn test_policy_without_codebuild() {
        let config = stack_config();
        let up = upstream(&config);
        let policy = controller_policy(&config, &up.cluster, &up.agents, None).unwrap();

        let sids: Vec<&str> = policy.statements().iter().filter_map(|s| s.sid()).collect();
        assert_eq!(
            sids,
            [
                "AgentLifecycle",
                "ClusterCapacity",
                "RunStackTasks",
                "StopClusterTasks",
                "PassAgentRoles"
            ]
        );
    }

    #[test]
    fn test_pass_role_is_exactly_agent_roles() {
        let config = stack_config();
        let up = upstream(&config);
        let policy =
            controller_policy(&config, &up.cluster, &up.agents, Some(&up.codebuild)).unwrap();

        let pass = policy.statement("PassAgentRoles").unwrap();
        assert_eq!(
            pass.resources(),
            [up.agents.task_role_arn().expr(), up.agents.execution_role_arn().expr()]
        );
        assert!(policy.statement("CodeBuild").is_some());

        let stop = policy.statement("StopClusterTasks").unwrap();
        assert_eq!(stop.conditions()[0].key, "ecs:cluster");
        assert_eq!(stop.conditions()[0].values, [up.cluster.cluster_arn().expr()]);
    }

    #[test]
    fn test_run_task_pattern_with_pinned_account() {
        let mut s = settings();
        s.stack_name = "ci".to_string();
        s.account = Some("123456789012".to_string());
        let config = stack_config_with(s);
        let up = upstream(&config);
        let policy = controller_policy(&config, &up.cluster, &up.agents, None).unwrap();

        assert_eq!(
            policy.statement("RunStackTasks").unwrap().resources()[0].as_literal(),
            Some("arn:aws:ecs:us-west-2:123456789012:task-definition/ci_*")
        );
    }

    #[test]
    fn test_ingress_without_pool() {
        let mut s = settings();
        s.ec2_capacity = false;
        let config = stack_config_with(s);
        let mut up = upstream(&config);
        ControllerBuilder::new(&config)
            .network(&up.network)
            .cluster(&up.cluster)
            .agents(&up.agents)
            .build(&mut up.graph)
            .unwrap();

        let ingress: Vec<String> = up
            .graph
            .of_type("AWS::EC2::SecurityGroupIngress")
            .map(|r| r.logical_id().to_string())
            .collect();
        assert_eq!(
            ingress,
            [
                "ControllerAgentIngressFromController",
                "ControllerFileSystemIngress",
                "ControllerIngressFromAgents50000",
                "ControllerIngressFromAgents8080",
                "ControllerIngressFromLoadBalancer",
            ]
        );

        let efs = up.graph.get(&id("ControllerFileSystemIngress")).unwrap();
        assert_eq!(efs.properties()["FromPort"], 2049);
        assert!(up.graph.get(&id("ControllerService")).unwrap().properties()
            ["NetworkConfiguration"]["AwsvpcConfiguration"]["SecurityGroups"]
            .is_array());
    }
}
