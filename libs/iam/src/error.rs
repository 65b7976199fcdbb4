//! Error types for policy validation.

use thiserror::Error;

/// Policy validation errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IamError {
    /// A statement grants nothing.
    #[error("statement {sid} has no actions")]
    EmptyActions { sid: String },

    /// An action is not of the form `service:Name`.
    #[error("invalid action '{action}' (expected service:Action)")]
    InvalidAction { action: String },

    /// A statement applies to nothing.
    #[error("statement {sid} has no resources")]
    EmptyResources { sid: String },

    /// Statement IDs must be alphanumeric.
    #[error("invalid statement id '{0}' (must be alphanumeric)")]
    InvalidSid(String),

    /// Two statements in one document share a Sid.
    #[error("duplicate statement id '{0}'")]
    DuplicateSid(String),

    /// A scoped action is granted on every resource.
    #[error("statement {sid} grants {action} on '*'")]
    UnscopedAction { sid: String, action: String },

    /// An allow-list action is granted on a wildcard pattern.
    #[error("statement {sid} grants {action} on a wildcard pattern; list resources explicitly")]
    WildcardInAllowList { sid: String, action: String },

    /// A patterned grant is missing its narrowing condition.
    #[error("statement {sid} grants {action} on a pattern without a condition")]
    MissingCondition { sid: String, action: String },
}
