//! Error handling and display for the CLI.

use std::path::PathBuf;

use colored::Colorize;
use jecs_stack::{CascError, ConfigError, ErrorCategory, SynthError};
use thiserror::Error;

/// CLI-specific errors.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Settings file not found: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("{0}")]
    Synth(#[from] SynthError),

    #[error("{0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Casc(#[from] CascError),
}

/// Print an error in a user-friendly format.
pub fn print_error(err: &anyhow::Error) {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    if let Some(hint) = err.downcast_ref::<CliError>().and_then(hint) {
        eprintln!("\n{}", format!("Hint: {hint}").yellow());
    }
}

fn hint(err: &CliError) -> Option<&'static str> {
    match err {
        CliError::ConfigNotFound(_) => Some("Pass the settings file with --config PATH."),
        CliError::Config(err) => config_hint(err),
        CliError::Synth(SynthError::Config(err)) => config_hint(err),
        CliError::Synth(err) => match err.category() {
            ErrorCategory::Configuration => {
                Some("Use a larger `cidr` or fewer `max_azs` so every subnet fits.")
            }
            ErrorCategory::Dependency | ErrorCategory::Validation => {
                Some("This is a bug in stack composition; rerun with --log-level debug and report it.")
            }
        },
        CliError::Casc(CascError::MissingVariable(_)) => {
            Some("Run inside the controller container, or drop --from-env to render placeholders.")
        }
        CliError::Casc(CascError::Render(_)) => {
            Some("Every variable the template uses must be in the controller environment.")
        }
        CliError::Casc(_) => None,
    }
}

fn config_hint(err: &ConfigError) -> Option<&'static str> {
    match err {
        ConfigError::MissingEnv(_) => Some(
            "Export ADMIN_USERNAME, ADMIN_PASSWORD, JENKINS_PUBLIC_URL and the GH_CREDENTIAL_* variables.",
        ),
        ConfigError::Load(_) => {
            Some("Settings belong in the [DEFAULT] section; JECS_<KEY> variables override them.")
        }
        ConfigError::FargateSizing { .. } => {
            Some("See the Fargate task size table for valid cpu/memory pairs.")
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_env_has_hint() {
        let err = CliError::from(ConfigError::MissingEnv("ADMIN_PASSWORD"));
        assert!(hint(&err).is_some_and(|h| h.contains("ADMIN_USERNAME")));

        let wrapped = CliError::from(SynthError::from(ConfigError::MissingEnv("ADMIN_PASSWORD")));
        assert_eq!(hint(&wrapped), hint(&err));
    }

    #[test]
    fn test_dependency_errors_are_bugs() {
        let err = CliError::from(SynthError::missing("controller", "cluster"));
        assert!(hint(&err).is_some_and(|h| h.contains("bug")));
    }
}
