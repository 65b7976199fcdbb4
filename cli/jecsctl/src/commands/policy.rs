//! Controller task role policy inspection.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{display_list, print_output, print_single, OutputFormat};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct PolicyCommand {}

#[derive(Debug, Serialize, Tabled)]
struct StatementRow {
    #[tabled(rename = "Sid")]
    sid: String,

    #[tabled(rename = "Actions", display = "display_list")]
    actions: Vec<String>,

    #[tabled(rename = "Resources", display = "display_list")]
    resources: Vec<String>,

    #[tabled(rename = "Conditions", display = "display_list")]
    conditions: Vec<String>,
}

impl PolicyCommand {
    pub fn run(self, ctx: &CommandContext) -> Result<()> {
        let stack = ctx.synthesize()?;
        let policy = stack.controller().policy();

        if ctx.format == OutputFormat::Json {
            print_single(policy);
            return Ok(());
        }

        let rows: Vec<StatementRow> = policy
            .statements()
            .iter()
            .map(|statement| StatementRow {
                sid: statement.sid().unwrap_or("-").to_string(),
                actions: statement.actions().to_vec(),
                resources: statement.resources().iter().map(ToString::to_string).collect(),
                conditions: statement
                    .conditions()
                    .iter()
                    .map(|c| {
                        let values: Vec<String> = c.values.iter().map(ToString::to_string).collect();
                        format!("{} {} {}", c.operator, c.key, values.join("|"))
                    })
                    .collect(),
            })
            .collect();
        print_output(&rows, ctx.format);

        Ok(())
    }
}
