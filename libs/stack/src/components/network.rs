//! VPC with one public and one private subnet per availability zone.

use jecs_graph::ResourceGraph;
use jecs_id::{Expr, SubnetId, VpcId};
use jecs_networking::{Ipv4Cidr, SubnetKind, SubnetPlan};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info_span};

use super::{name_tag, Scope, NETWORK};
use crate::{StackConfig, SynthError};

/// Subnet tiers, in carving order.
const TIERS: [SubnetKind; 2] = [SubnetKind::Public, SubnetKind::Private];

/// One declared subnet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Subnet {
    kind: SubnetKind,
    az_index: u32,
    cidr: Ipv4Cidr,
    id: SubnetId,
}

impl Subnet {
    pub fn kind(&self) -> SubnetKind {
        self.kind
    }

    pub fn az_index(&self) -> u32 {
        self.az_index
    }

    pub fn cidr(&self) -> Ipv4Cidr {
        self.cidr
    }

    pub fn id(&self) -> &SubnetId {
        &self.id
    }
}

/// What downstream components know about the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkDescriptor {
    cidr: Ipv4Cidr,
    vpc_id: VpcId,
    subnets: Vec<Subnet>,
}

impl NetworkDescriptor {
    pub fn cidr(&self) -> Ipv4Cidr {
        self.cidr
    }

    pub fn vpc_id(&self) -> &VpcId {
        &self.vpc_id
    }

    pub fn subnets(&self) -> &[Subnet] {
        &self.subnets
    }

    pub fn public_subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.subnets.iter().filter(|s| s.kind == SubnetKind::Public)
    }

    pub fn private_subnets(&self) -> impl Iterator<Item = &Subnet> {
        self.subnets.iter().filter(|s| s.kind == SubnetKind::Private)
    }

    pub fn private_subnet_ids(&self) -> Vec<Expr> {
        self.private_subnets().map(|s| s.id.expr()).collect()
    }

    pub fn public_subnet_ids(&self) -> Vec<Expr> {
        self.public_subnets().map(|s| s.id.expr()).collect()
    }
}

/// Builds the network. It has no upstream dependencies.
pub struct NetworkBuilder<'c> {
    config: &'c StackConfig,
}

impl<'c> NetworkBuilder<'c> {
    pub fn new(config: &'c StackConfig) -> Self {
        Self { config }
    }

    pub fn build(self, graph: &mut ResourceGraph) -> Result<NetworkDescriptor, SynthError> {
        let _span = info_span!("component", name = NETWORK).entered();

        let stack = self.config.stack_name();
        let cidr = self.config.cidr();
        let plan = SubnetPlan::carve(cidr, u32::from(self.config.settings().max_azs), &TIERS)?;
        debug!(cidr = %cidr, subnets = plan.subnets().len(), "carved subnets");

        let mut scope = Scope::new(NETWORK, graph);

        let vpc = scope.declare(
            "Vpc",
            "AWS::EC2::VPC",
            json!({
                "CidrBlock": cidr,
                "EnableDnsHostnames": true,
                "EnableDnsSupport": true,
                "InstanceTenancy": "default",
                "Tags": name_tag(format!("{stack}/network"))
            }),
        )?;
        let vpc_id = VpcId::of(&vpc);

        let igw = scope.declare(
            "InternetGateway",
            "AWS::EC2::InternetGateway",
            json!({ "Tags": name_tag(format!("{stack}/network")) }),
        )?;
        let attachment = scope.declare(
            "VpcGatewayAttachment",
            "AWS::EC2::VPCGatewayAttachment",
            json!({ "VpcId": vpc_id, "InternetGatewayId": Expr::Ref(igw.clone()) }),
        )?;

        let mut subnets = Vec::with_capacity(plan.subnets().len());
        let mut nat_gateways = Vec::new();

        for allocation in plan.of_kind(SubnetKind::Public) {
            let n = allocation.az_index + 1;
            let name = format!("PublicSubnet{n}");

            let subnet = scope.declare(
                &name,
                "AWS::EC2::Subnet",
                json!({
                    "VpcId": vpc_id,
                    "CidrBlock": allocation.cidr,
                    "AvailabilityZone": Expr::availability_zone(allocation.az_index),
                    "MapPublicIpOnLaunch": true,
                    "Tags": name_tag(format!("{stack}/network/public-{n}"))
                }),
            )?;
            let route_table = declare_route_table(&mut scope, &name, &vpc_id, &subnet)?;

            let route_id = scope.id(&format!("{name}DefaultRoute"))?;
            let route = scope
                .resource(
                    route_id,
                    "AWS::EC2::Route",
                    json!({
                        "RouteTableId": Expr::Ref(route_table),
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "GatewayId": Expr::Ref(igw.clone())
                    }),
                )
                .with_depends_on(&attachment);
            let route = scope.add(route)?;

            let eip = scope.declare(
                &format!("{name}Eip"),
                "AWS::EC2::EIP",
                json!({
                    "Domain": "vpc",
                    "Tags": name_tag(format!("{stack}/network/public-{n}"))
                }),
            )?;
            let nat_id = scope.id(&format!("{name}NatGateway"))?;
            let nat = scope
                .resource(
                    nat_id,
                    "AWS::EC2::NatGateway",
                    json!({
                        "SubnetId": Expr::Ref(subnet.clone()),
                        "AllocationId": Expr::GetAtt(eip, "AllocationId".into()),
                        "Tags": name_tag(format!("{stack}/network/public-{n}"))
                    }),
                )
                .with_depends_on(&route);
            nat_gateways.push(scope.add(nat)?);

            subnets.push(Subnet {
                kind: SubnetKind::Public,
                az_index: allocation.az_index,
                cidr: allocation.cidr,
                id: SubnetId::of(&subnet),
            });
        }

        for (allocation, nat) in plan.of_kind(SubnetKind::Private).zip(&nat_gateways) {
            let n = allocation.az_index + 1;
            let name = format!("PrivateSubnet{n}");

            let subnet = scope.declare(
                &name,
                "AWS::EC2::Subnet",
                json!({
                    "VpcId": vpc_id,
                    "CidrBlock": allocation.cidr,
                    "AvailabilityZone": Expr::availability_zone(allocation.az_index),
                    "MapPublicIpOnLaunch": false,
                    "Tags": name_tag(format!("{stack}/network/private-{n}"))
                }),
            )?;
            let route_table = declare_route_table(&mut scope, &name, &vpc_id, &subnet)?;
            scope.declare(
                &format!("{name}DefaultRoute"),
                "AWS::EC2::Route",
                json!({
                    "RouteTableId": Expr::Ref(route_table),
                    "DestinationCidrBlock": "0.0.0.0/0",
                    "NatGatewayId": Expr::Ref(nat.clone())
                }),
            )?;

            subnets.push(Subnet {
                kind: SubnetKind::Private,
                az_index: allocation.az_index,
                cidr: allocation.cidr,
                id: SubnetId::of(&subnet),
            });
        }

        Ok(NetworkDescriptor {
            cidr,
            vpc_id,
            subnets,
        })
    }
}

fn declare_route_table(
    scope: &mut Scope<'_>,
    subnet_name: &str,
    vpc_id: &VpcId,
    subnet: &jecs_id::LogicalId,
) -> Result<jecs_id::LogicalId, SynthError> {
    let route_table = scope.declare(
        &format!("{subnet_name}RouteTable"),
        "AWS::EC2::RouteTable",
        json!({ "VpcId": vpc_id }),
    )?;
    scope.declare(
        &format!("{subnet_name}RouteTableAssociation"),
        "AWS::EC2::SubnetRouteTableAssociation",
        json!({
            "RouteTableId": Expr::Ref(route_table.clone()),
            "SubnetId": Expr::Ref(subnet.clone())
        }),
    )?;
    Ok(route_table)
}
