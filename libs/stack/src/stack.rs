//! Composition root: builds every component into one graph.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use jecs_graph::{ResourceGraph, TemplateHash};
use jecs_id::LogicalId;
use serde::Serialize;
use serde_json::Value;
use tracing::{info, info_span};

use crate::components::agents::{AgentDescriptor, AgentsBuilder};
use crate::components::cluster::{ClusterBuilder, ClusterDescriptor};
use crate::components::codebuild::{CodeBuildBuilder, CodeBuildDescriptor};
use crate::components::controller::{ControllerBuilder, ControllerDescriptor};
use crate::components::network::{NetworkBuilder, NetworkDescriptor};
use crate::tags::apply_tags;
use crate::{StackConfig, SynthError};

/// File name of the manifest written next to the template.
pub const MANIFEST_FILE: &str = "manifest.json";

/// A fully built, validated stack.
#[derive(Debug, Clone)]
pub struct SynthesizedStack {
    stack_name: String,
    network: NetworkDescriptor,
    cluster: ClusterDescriptor,
    agents: AgentDescriptor,
    codebuild: Option<CodeBuildDescriptor>,
    controller: ControllerDescriptor,
    graph: ResourceGraph,
    order: Vec<LogicalId>,
    template: Value,
    hash: TemplateHash,
}

/// Summary written alongside the template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Manifest {
    pub stack_name: String,
    pub template_hash: TemplateHash,
    pub resource_count: usize,
    pub components: BTreeMap<String, BTreeSet<String>>,
    pub order: Vec<LogicalId>,
}

/// Paths written by [`SynthesizedStack::write_artifacts`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifacts {
    pub template: PathBuf,
    pub manifest: PathBuf,
}

/// Builds network, cluster, agents, the optional build project and the
/// controller, then tags, validates and emits the template.
///
/// Any failure aborts synthesis; no partially built graph is returned.
pub fn synthesize(config: &StackConfig) -> Result<SynthesizedStack, SynthError> {
    let stack_name = config.stack_name();
    let _span = info_span!("synthesize", stack = stack_name).entered();

    let mut graph = ResourceGraph::new();

    let network = NetworkBuilder::new(config).build(&mut graph)?;
    let cluster = ClusterBuilder::new(config)
        .network(&network)
        .build(&mut graph)?;
    let agents = AgentsBuilder::new(config)
        .network(&network)
        .build(&mut graph)?;
    let codebuild = if config.settings().codebuild {
        Some(CodeBuildBuilder::new(config).agents(&agents).build(&mut graph)?)
    } else {
        None
    };
    let controller = ControllerBuilder::new(config)
        .network(&network)
        .cluster(&cluster)
        .agents(&agents)
        .codebuild(codebuild.as_ref())
        .build(&mut graph)?;

    apply_tags(&mut graph, config.tags());

    graph.validate()?;
    let order = graph.topological_order()?;
    let template = graph.to_template(&template_description(stack_name));
    let hash = TemplateHash::from_json(&template);

    info!(
        resources = graph.len(),
        hash = %hash,
        codebuild = codebuild.is_some(),
        "synthesized stack"
    );

    Ok(SynthesizedStack {
        stack_name: stack_name.to_string(),
        network,
        cluster,
        agents,
        codebuild,
        controller,
        graph,
        order,
        template,
        hash,
    })
}

/// Template `Description`.
pub fn template_description(stack_name: &str) -> String {
    format!("Jenkins on ECS ({stack_name})")
}

impl SynthesizedStack {
    pub fn stack_name(&self) -> &str {
        &self.stack_name
    }

    pub fn network(&self) -> &NetworkDescriptor {
        &self.network
    }

    pub fn cluster(&self) -> &ClusterDescriptor {
        &self.cluster
    }

    pub fn agents(&self) -> &AgentDescriptor {
        &self.agents
    }

    pub fn codebuild(&self) -> Option<&CodeBuildDescriptor> {
        self.codebuild.as_ref()
    }

    pub fn controller(&self) -> &ControllerDescriptor {
        &self.controller
    }

    pub fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// Resources in dependency order.
    pub fn order(&self) -> &[LogicalId] {
        &self.order
    }

    pub fn template(&self) -> &Value {
        &self.template
    }

    pub fn hash(&self) -> &TemplateHash {
        &self.hash
    }

    /// Pretty-printed template JSON.
    pub fn template_json(&self) -> String {
        format!("{:#}", self.template)
    }

    pub fn template_file_name(&self) -> String {
        format!("{}.template.json", self.stack_name)
    }

    pub fn manifest(&self) -> Manifest {
        Manifest {
            stack_name: self.stack_name.clone(),
            template_hash: self.hash.clone(),
            resource_count: self.graph.len(),
            components: self.graph.component_dependencies(),
            order: self.order.clone(),
        }
    }

    /// Writes `<stack>.template.json` and `manifest.json` into `dir`,
    /// creating it if needed.
    pub fn write_artifacts(&self, dir: &Path) -> io::Result<Artifacts> {
        fs::create_dir_all(dir)?;

        let template = dir.join(self.template_file_name());
        fs::write(&template, self.template_json() + "\n")?;

        let manifest = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(&self.manifest()).map_err(io::Error::other)?;
        fs::write(&manifest, json + "\n")?;

        Ok(Artifacts { template, manifest })
    }
}
