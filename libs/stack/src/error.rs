//! Synthesis errors.

use jecs_graph::GraphError;
use jecs_iam::IamError;
use jecs_id::IdError;
use jecs_networking::NetworkError;
use thiserror::Error;

/// Settings and credential errors. Raised before any resource is declared.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid settings: {0}")]
    Invalid(#[from] validator::ValidationErrors),

    #[error("missing required environment variable {0}")]
    MissingEnv(&'static str),

    #[error("invalid stack name {name:?}: {reason}")]
    InvalidStackName { name: String, reason: &'static str },

    #[error("invalid account id {0:?}: expected 12 digits")]
    InvalidAccount(String),

    #[error("invalid cidr: {0}")]
    Cidr(#[from] NetworkError),

    #[error("unsupported fargate sizing: {cpu} cpu units with {memory_mib} MiB")]
    FargateSizing { cpu: u32, memory_mib: u32 },

    #[error("invalid capacity: min {min} must be at least 1 and at most max {max}")]
    Capacity { min: u32, max: u32 },

    #[error("at least one agent is required")]
    NoAgents,

    #[error("duplicate agent {0:?}")]
    DuplicateAgent(String),

    #[error("invalid agent {name:?}: {reason}")]
    InvalidAgent { name: String, reason: String },
}

/// Error categories reported to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Missing or invalid settings.
    Configuration,
    /// A component was built without an upstream descriptor.
    Dependency,
    /// The assembled graph or policy failed validation.
    Validation,
}

/// Synthesis errors. Any of these aborts synthesis; no partial graph is
/// returned.
#[derive(Debug, Error)]
pub enum SynthError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{component} requires the {dependency} descriptor")]
    MissingDependency {
        component: &'static str,
        dependency: &'static str,
    },

    #[error("invalid network: {0}")]
    Network(#[from] NetworkError),

    #[error("invalid logical id: {0}")]
    Id(#[from] IdError),

    #[error("invalid policy: {0}")]
    Policy(#[from] IamError),

    #[error("invalid resource graph: {0}")]
    Graph(#[from] GraphError),
}

impl SynthError {
    pub fn missing(component: &'static str, dependency: &'static str) -> Self {
        Self::MissingDependency {
            component,
            dependency,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Config(_) | Self::Network(_) => ErrorCategory::Configuration,
            Self::MissingDependency { .. } => ErrorCategory::Dependency,
            Self::Id(_) | Self::Policy(_) | Self::Graph(_) => ErrorCategory::Validation,
        }
    }
}
