//! Template synthesis.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use tracing::info;

use crate::output::{print_info, print_single, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct SynthCommand {
    /// Directory receiving `<stack>.template.json` and `manifest.json`.
    #[arg(long, value_name = "DIR", default_value = "cdk.out")]
    out: PathBuf,

    /// Print the template to stdout instead of writing files.
    #[arg(long)]
    dry_run: bool,
}

#[derive(Debug, Serialize)]
struct SynthReceipt {
    stack_name: String,
    template_hash: String,
    resource_count: usize,
    template: PathBuf,
    manifest: PathBuf,
}

impl SynthCommand {
    pub fn run(self, ctx: &CommandContext) -> Result<()> {
        let stack = ctx.synthesize()?;

        if self.dry_run {
            println!("{}", stack.template_json());
            return Ok(());
        }

        let artifacts = stack
            .write_artifacts(&self.out)
            .with_context(|| format!("failed to write artifacts to {}", self.out.display()))?;
        info!(
            template = %artifacts.template.display(),
            manifest = %artifacts.manifest.display(),
            "wrote artifacts"
        );

        match ctx.format {
            OutputFormat::Json => print_single(&SynthReceipt {
                stack_name: stack.stack_name().to_string(),
                template_hash: stack.hash().to_string(),
                resource_count: stack.graph().len(),
                template: artifacts.template,
                manifest: artifacts.manifest,
            }),
            OutputFormat::Table => {
                print_success(&format!(
                    "Synthesized {} ({} resources)",
                    stack.stack_name(),
                    stack.graph().len()
                ));
                print_info(&format!("template: {}", artifacts.template.display()));
                print_info(&format!("manifest: {}", artifacts.manifest.display()));
                print_info(&format!("template_hash: {}", stack.hash()));
            }
        }

        Ok(())
    }
}
