//! CLI commands.

mod casc;
mod graph;
mod policy;
mod synth;
mod validate;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use jecs_stack::{synthesize, StackConfig, SynthesizedStack};
use tracing::debug;

use crate::error::CliError;
use crate::logging::LogFormat;
use crate::output::OutputFormat;

/// jecs - Synthesize a Jenkins controller and its ECS build agents.
#[derive(Debug, Parser)]
#[command(name = "jecs")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Settings file (INI with a [DEFAULT] section).
    #[arg(long, global = true, default_value = "config.ini")]
    config: PathBuf,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    /// Log format on stderr.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Log level when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Validate settings and credentials, then synthesize without writing.
    Validate(validate::ValidateCommand),

    /// Synthesize the stack and write the template and manifest.
    Synth(synth::SynthCommand),

    /// Show resources and component dependencies.
    Graph(graph::GraphCommand),

    /// Show the controller task role policy.
    Policy(policy::PolicyCommand),

    /// Render a configuration-as-code template.
    RenderCasc(casc::RenderCascCommand),
}

impl Cli {
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    pub fn log_level(&self) -> &str {
        &self.log_level
    }

    /// Run the CLI command.
    pub fn run(self) -> Result<()> {
        let ctx = CommandContext {
            config_path: self.config,
            format: self.format,
        };

        match self.command {
            Commands::Validate(cmd) => cmd.run(&ctx),
            Commands::Synth(cmd) => cmd.run(&ctx),
            Commands::Graph(cmd) => cmd.run(&ctx),
            Commands::Policy(cmd) => cmd.run(&ctx),
            Commands::RenderCasc(cmd) => cmd.run(&ctx),
        }
    }
}

/// Shared command context.
pub struct CommandContext {
    pub config_path: PathBuf,
    pub format: OutputFormat,
}

impl CommandContext {
    /// Load settings from the file and credentials from the environment.
    pub fn load_config(&self) -> Result<StackConfig> {
        if !self.config_path.is_file() {
            return Err(CliError::ConfigNotFound(self.config_path.clone()).into());
        }
        debug!(path = %self.config_path.display(), "loading settings");

        StackConfig::load(&self.config_path)
            .map_err(CliError::from)
            .with_context(|| format!("failed to load {}", self.config_path.display()))
    }

    /// Load the configuration and synthesize the stack.
    pub fn synthesize(&self) -> Result<SynthesizedStack> {
        let config = self.load_config()?;
        synthesize(&config)
            .map_err(CliError::from)
            .with_context(|| format!("failed to synthesize stack {}", config.stack_name()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::try_parse_from([
            "jecs",
            "synth",
            "--config",
            "stack.ini",
            "--format",
            "json",
            "--log-format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.config, PathBuf::from("stack.ini"));
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.log_format(), LogFormat::Json);
        assert!(matches!(cli.command, Commands::Synth(_)));
    }

    #[test]
    fn missing_settings_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = CommandContext {
            config_path: dir.path().join("missing.ini"),
            format: OutputFormat::Table,
        };
        let err = ctx.load_config().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::ConfigNotFound(_))
        ));
    }
}
