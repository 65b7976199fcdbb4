//! # jecs-id
//!
//! Logical identifiers and deferred references for synthesized stacks.
//!
//! ## Design Principles
//!
//! - A resource's logical ID is assigned once, by the component that owns it
//! - Physical identifiers (ARNs, subnet IDs, ...) do not exist until the
//!   provider applies the template, so descriptors carry *references* to
//!   them rather than values
//! - References are typed so a security group ID cannot be passed where a
//!   role ARN is expected
//!
//! ## Reference Format
//!
//! References serialize to CloudFormation intrinsics:
//!
//! - `VpcId` → `{"Ref": "NetworkVpc"}`
//! - `ClusterArn` → `{"Fn::GetAtt": ["EcsCluster", "Arn"]}`
//!
//! and display as `Fn::Sub` placeholders (`${NetworkVpc}`,
//! `${EcsCluster.Arn}`) so they can be spliced into ARN patterns.

mod error;
mod expr;
mod logical;
mod macros;
mod types;

pub use error::IdError;
pub use expr::{Expr, Pseudo};
pub use logical::{pascal_case, LogicalId};
pub use types::*;
