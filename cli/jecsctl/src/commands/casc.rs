//! Configuration-as-code rendering.
//!
//! Without `--from-env` the template is rendered from a synthesized stack;
//! values resolved at deploy time appear as `${LogicalId}` placeholders.
//! With `--from-env` the controller variables are read from the process
//! environment, as the controller container does at startup. No settings
//! file or credentials are needed in that mode.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use jecs_stack::{CascRenderer, CascVariables};
use serde::Serialize;
use tracing::info;

use crate::error::CliError;
use crate::output::{print_info, print_single, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct RenderCascCommand {
    /// Template to render.
    #[arg(long, value_name = "PATH")]
    template: PathBuf,

    /// Rendered file. Printed to stdout when omitted.
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Read variable values from the process environment.
    #[arg(long)]
    from_env: bool,
}

#[derive(Debug, Serialize)]
struct RenderReceipt {
    output: PathBuf,
    variables: usize,
    bytes: usize,
}

impl RenderCascCommand {
    pub fn run(self, ctx: &CommandContext) -> Result<()> {
        let variables = if self.from_env {
            CascVariables::from_process_environment(std::env::vars())
        } else {
            let stack = ctx.synthesize()?;
            CascVariables::from_controller(stack.controller().environment())
        };

        let rendered = CascRenderer::from_file(&self.template)
            .and_then(|renderer| renderer.render(&variables))
            .map_err(CliError::from)
            .with_context(|| format!("failed to render {}", self.template.display()))?;

        let Some(output) = self.output else {
            print!("{rendered}");
            return Ok(());
        };

        fs::write(&output, &rendered)
            .with_context(|| format!("failed to write {}", output.display()))?;
        info!(output = %output.display(), variables = variables.len(), "rendered template");

        match ctx.format {
            OutputFormat::Json => print_single(&RenderReceipt {
                variables: variables.len(),
                bytes: rendered.len(),
                output,
            }),
            OutputFormat::Table => {
                print_success(&format!("Rendered {}", output.display()));
                print_info(&format!("variables: {}", variables.len()));
            }
        }

        Ok(())
    }
}
