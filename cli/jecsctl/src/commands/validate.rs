//! Offline validation of settings, credentials and the assembled graph.

use anyhow::Result;
use clap::Args;
use serde::Serialize;

use crate::output::{print_info, print_single, print_success, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct ValidateCommand {}

#[derive(Debug, Serialize)]
struct ValidationReport<'a> {
    valid: bool,
    stack_name: &'a str,
    resource_count: usize,
    template_hash: &'a str,
    codebuild: bool,
}

impl ValidateCommand {
    pub fn run(self, ctx: &CommandContext) -> Result<()> {
        let stack = ctx.synthesize()?;

        match ctx.format {
            OutputFormat::Json => print_single(&ValidationReport {
                valid: true,
                stack_name: stack.stack_name(),
                resource_count: stack.graph().len(),
                template_hash: stack.hash().as_str(),
                codebuild: stack.codebuild().is_some(),
            }),
            OutputFormat::Table => {
                print_success(&format!(
                    "Stack {} is valid ({} resources)",
                    stack.stack_name(),
                    stack.graph().len()
                ));
                print_info(&format!("template_hash: {}", stack.hash()));
            }
        }

        Ok(())
    }
}
