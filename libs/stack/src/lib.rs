//! # jecs-stack
//!
//! Synthesizes the infrastructure of a Jenkins controller with
//! containerized build agents on ECS.
//!
//! ## Components
//!
//! Components are built leaf-first into a single
//! [`ResourceGraph`](jecs_graph::ResourceGraph):
//!
//! ```text
//! network ──► cluster ──┐
//!    │                  ├──► controller
//!    └──► agents ──► codebuild (optional)
//! ```
//!
//! Each component returns a descriptor of deferred references that its
//! dependents read. Building a component without one of its required
//! upstream descriptors fails with [`SynthError::MissingDependency`].
//!
//! ## Usage
//!
//! ```ignore
//! let config = StackConfig::load(Path::new("config.ini"))?;
//! let stack = synthesize(&config)?;
//! stack.write_artifacts(Path::new("cdk.out"))?;
//! ```

pub mod casc;
pub mod components;
pub mod config;
mod error;
pub mod stack;
pub mod tags;

pub use casc::{CascError, CascRenderer, CascVariables};
pub use config::{Credentials, GithubCredentials, RemovalPolicy, Settings, StackConfig};
pub use error::{ConfigError, ErrorCategory, SynthError};
pub use stack::{synthesize, Artifacts, Manifest, SynthesizedStack};
