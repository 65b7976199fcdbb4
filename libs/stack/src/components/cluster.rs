//! ECS cluster, shared filesystem and the optional EC2 capacity pool.

use jecs_graph::{DeletionPolicy, ResourceGraph};
use jecs_iam::arn::aws_managed_policy;
use jecs_iam::TrustPolicy;
use jecs_id::{
    CapacityProviderName, ClusterArn, ClusterName, Expr, FileSystemId, LogGroupName, NamespaceId,
    SecurityGroupId,
};
use serde::Serialize;
use serde_json::json;
use tracing::{info_span, warn};

use super::network::NetworkDescriptor;
use super::{security_group_properties, Scope, CLUSTER, NETWORK};
use crate::config::RemovalPolicy;
use crate::{StackConfig, SynthError};

/// SSM parameter holding the current ECS-optimized Amazon Linux 2023 AMI.
pub const ECS_AMI_PARAMETER: &str =
    "/aws/service/ecs/optimized-ami/amazon-linux-2023/recommended/image_id";

/// Days the exec-command log group keeps events.
pub const EXEC_LOG_RETENTION_DAYS: u32 = 30;

/// Seconds a new pool instance is excluded from scaling metrics.
pub const INSTANCE_WARMUP_SECONDS: u32 = 60;

/// Private DNS namespace for service discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Namespace {
    name: String,
    id: NamespaceId,
}

impl Namespace {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> &NamespaceId {
        &self.id
    }
}

/// The EC2 capacity pool, when provisioned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CapacityPool {
    capacity_provider: CapacityProviderName,
    security_group: SecurityGroupId,
}

impl CapacityPool {
    pub fn capacity_provider(&self) -> &CapacityProviderName {
        &self.capacity_provider
    }

    pub fn security_group(&self) -> &SecurityGroupId {
        &self.security_group
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterDescriptor {
    cluster_arn: ClusterArn,
    cluster_name: ClusterName,
    filesystem_id: FileSystemId,
    filesystem_security_group: SecurityGroupId,
    filesystem_removal: RemovalPolicy,
    namespace: Namespace,
    exec_log_group: LogGroupName,
    pool: Option<CapacityPool>,
}

impl ClusterDescriptor {
    pub fn cluster_arn(&self) -> &ClusterArn {
        &self.cluster_arn
    }

    pub fn cluster_name(&self) -> &ClusterName {
        &self.cluster_name
    }

    pub fn filesystem_id(&self) -> &FileSystemId {
        &self.filesystem_id
    }

    pub fn filesystem_security_group(&self) -> &SecurityGroupId {
        &self.filesystem_security_group
    }

    pub fn filesystem_removal(&self) -> RemovalPolicy {
        self.filesystem_removal
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn exec_log_group(&self) -> &LogGroupName {
        &self.exec_log_group
    }

    pub fn pool(&self) -> Option<&CapacityPool> {
        self.pool.as_ref()
    }

    pub fn capacity_provider(&self) -> Option<&CapacityProviderName> {
        self.pool.as_ref().map(|p| &p.capacity_provider)
    }

    pub fn pool_security_group(&self) -> Option<&SecurityGroupId> {
        self.pool.as_ref().map(|p| &p.security_group)
    }
}

pub struct ClusterBuilder<'c> {
    config: &'c StackConfig,
    network: Option<&'c NetworkDescriptor>,
}

impl<'c> ClusterBuilder<'c> {
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

    pub fn build(self, graph: &mut ResourceGraph) -> Result<ClusterDescriptor, SynthError> {
        let network = self
            .network
            .ok_or(SynthError::missing(CLUSTER, NETWORK))?;
        let _span = info_span!("component", name = CLUSTER).entered();

        let settings = self.config.settings();
        let stack = self.config.stack_name();
        let mut scope = Scope::new(CLUSTER, graph);

        let exec_log_group = scope.declare(
            "ExecLogGroup",
            "AWS::Logs::LogGroup",
            json!({ "RetentionInDays": EXEC_LOG_RETENTION_DAYS }),
        )?;
        let exec_log_group = LogGroupName::of(&exec_log_group);

        let cluster = scope.declare(
            "Cluster",
            "AWS::ECS::Cluster",
            json!({
                "ClusterSettings": [{ "Name": "containerInsights", "Value": "enabled" }],
                "Configuration": {
                    "ExecuteCommandConfiguration": {
                        "Logging": "OVERRIDE",
                        "LogConfiguration": { "CloudWatchLogGroupName": exec_log_group }
                    }
                }
            }),
        )?;

        let namespace_name = settings.service_discovery_namespace.clone();
        let namespace = scope.declare(
            "Namespace",
            "AWS::ServiceDiscovery::PrivateDnsNamespace",
            json!({ "Name": namespace_name, "Vpc": network.vpc_id() }),
        )?;

        let filesystem_security_group = scope.declare(
            "FileSystemSecurityGroup",
            "AWS::EC2::SecurityGroup",
            security_group_properties(&format!("{stack} shared filesystem"), network.vpc_id()),
        )?;
        let filesystem_security_group = SecurityGroupId::of(&filesystem_security_group);

        let removal = settings.filesystem_removal_policy;
        let deletion_policy = match removal {
            RemovalPolicy::Destroy => {
                warn!(
                    stack,
                    "shared filesystem will be deleted with the stack; set filesystem_removal_policy = retain to keep it"
                );
                DeletionPolicy::Delete
            }
            RemovalPolicy::Retain => DeletionPolicy::Retain,
        };
        let filesystem_id = scope.id("FileSystem")?;
        let filesystem = scope
            .resource(
                filesystem_id,
                "AWS::EFS::FileSystem",
                json!({
                    "Encrypted": true,
                    "LifecyclePolicies": [{ "TransitionToIA": "AFTER_7_DAYS" }],
                    "PerformanceMode": "generalPurpose",
                    "ThroughputMode": "bursting"
                }),
            )
            .with_deletion_policy(deletion_policy);
        let filesystem = scope.add(filesystem)?;

        for subnet in network.private_subnets() {
            scope.declare(
                &format!("FileSystemMountTarget{}", subnet.az_index() + 1),
                "AWS::EFS::MountTarget",
                json!({
                    "FileSystemId": Expr::Ref(filesystem.clone()),
                    "SecurityGroups": [filesystem_security_group],
                    "SubnetId": subnet.id()
                }),
            )?;
        }

        let pool = if settings.ec2_capacity {
            Some(declare_pool(self.config, network, &mut scope, &cluster)?)
        } else {
            None
        };

        Ok(ClusterDescriptor {
            cluster_arn: ClusterArn::of(&cluster),
            cluster_name: ClusterName::of(&cluster),
            filesystem_id: FileSystemId::of(&filesystem),
            filesystem_security_group,
            filesystem_removal: removal,
            namespace: Namespace {
                name: namespace_name,
                id: NamespaceId::of(&namespace),
            },
            exec_log_group,
            pool,
        })
    }
}

fn declare_pool(
    config: &StackConfig,
    network: &NetworkDescriptor,
    scope: &mut Scope<'_>,
    cluster: &jecs_id::LogicalId,
) -> Result<CapacityPool, SynthError> {
    let settings = config.settings();
    let stack = config.stack_name();

    let instance_role = scope.declare(
        "InstanceRole",
        "AWS::IAM::Role",
        json!({
            "AssumeRolePolicyDocument": TrustPolicy::service("ec2.amazonaws.com"),
            "ManagedPolicyArns": [
                aws_managed_policy("service-role/AmazonEC2ContainerServiceforEC2Role"),
                aws_managed_policy("AmazonSSMManagedInstanceCore")
            ]
        }),
    )?;
    let instance_profile = scope.declare(
        "InstanceProfile",
        "AWS::IAM::InstanceProfile",
        json!({ "Roles": [Expr::Ref(instance_role)] }),
    )?;

    let pool_security_group = scope.declare(
        "PoolSecurityGroup",
        "AWS::EC2::SecurityGroup",
        security_group_properties(&format!("{stack} agent capacity pool"), network.vpc_id()),
    )?;
    let pool_security_group = SecurityGroupId::of(&pool_security_group);

    let user_data = Expr::sub(format!(
        "#!/bin/bash\necho ECS_CLUSTER=${{{cluster}}} >> /etc/ecs/ecs.config\n"
    ));
    let launch_template = scope.declare(
        "LaunchTemplate",
        "AWS::EC2::LaunchTemplate",
        json!({
            "LaunchTemplateData": {
                "ImageId": format!("{{{{resolve:ssm:{ECS_AMI_PARAMETER}}}}}"),
                "InstanceType": settings.ec2_instance_type,
                "IamInstanceProfile": { "Arn": Expr::GetAtt(instance_profile, "Arn".into()) },
                "SecurityGroupIds": [pool_security_group],
                "MetadataOptions": { "HttpTokens": "required" },
                "UserData": { "Fn::Base64": user_data }
            }
        }),
    )?;

    let asg = scope.declare(
        "AutoScalingGroup",
        "AWS::AutoScaling::AutoScalingGroup",
        json!({
            "MinSize": settings.ec2_min_capacity.to_string(),
            "MaxSize": settings.ec2_max_capacity.to_string(),
            "LaunchTemplate": {
                "LaunchTemplateId": Expr::Ref(launch_template.clone()),
                "Version": Expr::GetAtt(launch_template, "LatestVersionNumber".into())
            },
            "VPCZoneIdentifier": network.private_subnet_ids(),
            "NewInstancesProtectedFromScaleIn": false
        }),
    )?;

    let capacity_provider = scope.declare(
        "CapacityProvider",
        "AWS::ECS::CapacityProvider",
        json!({
            "AutoScalingGroupProvider": {
                "AutoScalingGroupArn": Expr::Ref(asg),
                "ManagedScaling": {
                    "Status": "ENABLED",
                    "TargetCapacity": 100,
                    "InstanceWarmupPeriod": INSTANCE_WARMUP_SECONDS
                },
                "ManagedTerminationProtection": "DISABLED",
                "ManagedDraining": "DISABLED"
            }
        }),
    )?;
    let capacity_provider = CapacityProviderName::of(&capacity_provider);

    scope.declare(
        "CapacityProviderAssociation",
        "AWS::ECS::ClusterCapacityProviderAssociations",
        json!({
            "Cluster": Expr::Ref(cluster.clone()),
            "CapacityProviders": [capacity_provider],
            "DefaultCapacityProviderStrategy": [{ "CapacityProvider": capacity_provider }]
        }),
    )?;

    Ok(CapacityPool {
        capacity_provider,
        security_group: pool_security_group,
    })
}
