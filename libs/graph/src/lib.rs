//! Resource graph primitives.
//!
//! Components declare resources into a single [`ResourceGraph`]. Edges are
//! never declared by hand: they are read back out of each resource's
//! properties (`Ref`, `Fn::GetAtt`, `Fn::Sub` placeholders) plus any
//! explicit `DependsOn`. Key concepts:
//!
//! - **Resource**: one template entry owned by exactly one component.
//! - **Reference**: an intrinsic pointing at another resource's logical ID.
//! - **Component graph**: the resource graph collapsed onto owners.
//!
//! # Invariants
//!
//! - Logical IDs are unique within a graph
//! - Every reference resolves to a resource in the same graph
//! - The graph is acyclic
//! - Emission is deterministic: the same graph yields byte-identical JSON

mod error;
mod graph;
mod hash;
mod resource;

pub use error::GraphError;
pub use graph::{Output, ResourceGraph, TEMPLATE_FORMAT_VERSION};
pub use hash::{canonical_json, TemplateHash};
pub use resource::{references_in, sub_references, DeletionPolicy, Resource};
