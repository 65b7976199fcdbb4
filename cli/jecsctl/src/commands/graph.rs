//! Resource graph inspection.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use crate::output::{display_list, print_output};

use super::CommandContext;

#[derive(Debug, Args)]
pub struct GraphCommand {
    /// Summarize dependencies between components instead of resources.
    #[arg(long)]
    components: bool,

    /// Only show resources owned by this component.
    #[arg(long, value_name = "NAME", conflicts_with = "components")]
    component: Option<String>,
}

/// Resources are listed in dependency order.
#[derive(Debug, Serialize, Tabled)]
struct ResourceRow {
    #[tabled(rename = "#")]
    position: usize,

    #[tabled(rename = "Logical ID")]
    logical_id: String,

    #[tabled(rename = "Type")]
    resource_type: String,

    #[tabled(rename = "Component")]
    component: String,

    #[tabled(rename = "Depends On", display = "display_list")]
    depends_on: Vec<String>,
}

#[derive(Debug, Serialize, Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    component: String,

    #[tabled(rename = "Resources")]
    resources: usize,

    #[tabled(rename = "Depends On", display = "display_list")]
    depends_on: Vec<String>,
}

impl GraphCommand {
    pub fn run(self, ctx: &CommandContext) -> Result<()> {
        let stack = ctx.synthesize()?;
        let graph = stack.graph();

        if self.components {
            let rows: Vec<ComponentRow> = graph
                .component_dependencies()
                .into_iter()
                .map(|(component, depends_on)| ComponentRow {
                    resources: graph.owned_by(&component).count(),
                    component,
                    depends_on: depends_on.into_iter().collect(),
                })
                .collect();
            print_output(&rows, ctx.format);
            return Ok(());
        }

        let rows: Vec<ResourceRow> = stack
            .order()
            .iter()
            .enumerate()
            .filter_map(|(position, id)| graph.get(id).map(|r| (position, r)))
            .filter(|(_, r)| self.component.as_deref().is_none_or(|c| r.owner() == c))
            .map(|(position, resource)| ResourceRow {
                position: position + 1,
                logical_id: resource.logical_id().to_string(),
                resource_type: resource.resource_type().to_string(),
                component: resource.owner().to_string(),
                depends_on: graph
                    .dependencies(resource.logical_id())
                    .iter()
                    .map(ToString::to_string)
                    .collect(),
            })
            .collect();
        print_output(&rows, ctx.format);

        Ok(())
    }
}
