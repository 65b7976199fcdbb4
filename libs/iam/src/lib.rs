//! IAM policy modelling for synthesized stacks.
//!
//! Policies are declarative: a component builds its full list of
//! [`PolicyStatement`]s once, wraps them in a [`PolicyDocument`] (which
//! validates them) and attaches the document as a single resource. Nothing
//! is appended after attachment.
//!
//! # Invariants
//!
//! - Every statement names at least one action and one resource
//! - `iam:PassRole` is only ever granted on an explicit allow-list of roles
//! - Task launch and stop permissions are never granted on a bare `*`

pub mod arn;
mod document;
mod error;
mod scope;
mod statement;

pub use document::{PolicyDocument, TrustPolicy, POLICY_VERSION};
pub use error::IamError;
pub use scope::{action_matches, check_scope, ScopeRequirement, ScopeRule, SCOPE_RULES};
pub use statement::{Condition, Effect, PolicyStatement};
