//! Typed references for every resource kind a stack produces.
//!
//! Each reference names the attribute a dependent component reads.
//! `ref` means the value of `{"Ref": ...}`.

use crate::define_ref;

// =============================================================================
// Networking
// =============================================================================

define_ref!(VpcId, ref);
define_ref!(SubnetId, ref);
define_ref!(SecurityGroupId, "GroupId");

// =============================================================================
// Container orchestration
// =============================================================================

define_ref!(ClusterArn, "Arn");
define_ref!(ClusterName, ref);
define_ref!(TaskDefinitionArn, ref);
define_ref!(ServiceArn, ref);
define_ref!(CapacityProviderName, ref);
define_ref!(AutoScalingGroupName, ref);

// =============================================================================
// Storage
// =============================================================================

define_ref!(FileSystemId, ref);
define_ref!(AccessPointId, ref);

// =============================================================================
// Identity
// =============================================================================

define_ref!(RoleArn, "Arn");
define_ref!(RoleName, ref);
define_ref!(InstanceProfileName, ref);

// =============================================================================
// Logging
// =============================================================================

define_ref!(LogGroupName, ref);
define_ref!(LogGroupArn, "Arn");
define_ref!(LogStreamName, ref);

// =============================================================================
// Registry and build
// =============================================================================

define_ref!(RepositoryUri, "RepositoryUri");
define_ref!(ProjectName, ref);
define_ref!(ProjectArn, "Arn");

// =============================================================================
// Discovery and load balancing
// =============================================================================

define_ref!(NamespaceId, "Id");
define_ref!(DiscoveryServiceArn, "Arn");
define_ref!(LoadBalancerDnsName, "DNSName");
define_ref!(TargetGroupArn, ref);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Expr, LogicalId};

    fn id(s: &str) -> LogicalId {
        LogicalId::parse(s).unwrap()
    }

    #[test]
    fn test_ref_kind() {
        let vpc = VpcId::of(&id("NetworkVpc"));
        assert_eq!(vpc.expr(), Expr::Ref(id("NetworkVpc")));
        assert_eq!(vpc.to_string(), "${NetworkVpc}");
    }

    #[test]
    fn test_get_att_kind() {
        let arn = ClusterArn::of(&id("EcsCluster"));
        assert_eq!(
            arn.expr(),
            Expr::GetAtt(id("EcsCluster"), "Arn".to_string())
        );
        assert_eq!(arn.to_string(), "${EcsCluster.Arn}");
        assert_eq!(arn.resource().as_str(), "EcsCluster");
    }

    #[test]
    fn test_serializes_as_intrinsic() {
        let sg = SecurityGroupId::of(&id("AgentSecurityGroup"));
        let json = serde_json::to_value(&sg).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"Fn::GetAtt": ["AgentSecurityGroup", "GroupId"]})
        );
    }

    #[test]
    fn test_typed_refs_to_same_resource_differ_by_attribute() {
        let role = id("AgentTaskRole");
        let arn: Expr = RoleArn::of(&role).into();
        let name: Expr = RoleName::of(&role).into();
        assert_ne!(arn, name);
    }
}
