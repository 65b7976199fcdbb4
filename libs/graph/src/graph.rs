//! The resource graph and template emission.

use std::collections::{BTreeMap, BTreeSet};

use jecs_id::{Expr, LogicalId};
use serde_json::{json, Map, Value};

use crate::resource::references_in;
use crate::{GraphError, Resource};

/// `AWSTemplateFormatVersion` of emitted templates.
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// A template output.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub logical_id: LogicalId,
    pub value: Expr,
    pub description: Option<String>,
}

impl Output {
    pub fn new(logical_id: LogicalId, value: impl Into<Expr>) -> Self {
        Self {
            logical_id,
            value: value.into(),
            description: None,
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// All resources of one stack, keyed by logical ID.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    resources: BTreeMap<LogicalId, Resource>,
    outputs: BTreeMap<LogicalId, Output>,
}

type Edges<'a> = BTreeMap<&'a LogicalId, BTreeSet<LogicalId>>;

impl ResourceGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a resource. Logical IDs must be unique.
    pub fn insert(&mut self, resource: Resource) -> Result<(), GraphError> {
        let id = resource.logical_id().clone();
        if self.resources.contains_key(&id) {
            return Err(GraphError::DuplicateResource(id));
        }
        self.resources.insert(id, resource);
        Ok(())
    }

    /// Adds a template output.
    pub fn add_output(&mut self, output: Output) -> Result<(), GraphError> {
        if self.outputs.contains_key(&output.logical_id) {
            return Err(GraphError::DuplicateResource(output.logical_id));
        }
        self.outputs.insert(output.logical_id.clone(), output);
        Ok(())
    }

    pub fn get(&self, id: &LogicalId) -> Option<&Resource> {
        self.resources.get(id)
    }

    pub fn contains(&self, id: &LogicalId) -> bool {
        self.resources.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Resources in logical ID order.
    pub fn iter(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.resources.values_mut()
    }

    /// Resources declared by one component.
    pub fn owned_by<'a>(&'a self, owner: &'a str) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources.values().filter(move |r| r.owner() == owner)
    }

    /// Resources of one provider type.
    pub fn of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a Resource> + 'a {
        self.resources
            .values()
            .filter(move |r| r.resource_type() == resource_type)
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Output> {
        self.outputs.values()
    }

    /// Direct dependencies of a resource that exist in the graph.
    pub fn dependencies(&self, id: &LogicalId) -> BTreeSet<LogicalId> {
        let Some(resource) = self.resources.get(id) else {
            return BTreeSet::new();
        };
        resource
            .references()
            .iter()
            .filter_map(|target| LogicalId::parse(target).ok())
            .filter(|target| self.resources.contains_key(target))
            .collect()
    }

    /// Checks that every reference resolves and that the graph is acyclic.
    pub fn validate(&self) -> Result<(), GraphError> {
        for output in self.outputs.values() {
            let value = serde_json::to_value(&output.value).map_err(|e| {
                GraphError::Serialization {
                    id: output.logical_id.clone(),
                    message: e.to_string(),
                }
            })?;
            for target in references_in(&value) {
                self.resolve(&output.logical_id, &target)?;
            }
        }
        self.topological_order().map(|_| ())
    }

    /// Resources ordered so each comes after everything it references.
    ///
    /// Ties are broken by logical ID, so the order is stable.
    pub fn topological_order(&self) -> Result<Vec<LogicalId>, GraphError> {
        let edges = self.edges()?;

        let mut remaining: BTreeMap<&LogicalId, usize> =
            edges.iter().map(|(id, deps)| (*id, deps.len())).collect();
        let mut dependents: BTreeMap<&LogicalId, Vec<&LogicalId>> = BTreeMap::new();
        for (id, deps) in &edges {
            for dep in deps {
                dependents.entry(dep).or_default().push(*id);
            }
        }

        let mut ready: BTreeSet<&LogicalId> = remaining
            .iter()
            .filter(|(_, n)| **n == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut order = Vec::with_capacity(edges.len());

        while let Some(id) = ready.pop_first() {
            order.push(id.clone());
            for dependent in dependents.get(id).into_iter().flatten() {
                if let Some(n) = remaining.get_mut(*dependent) {
                    *n -= 1;
                    if *n == 0 {
                        ready.insert(*dependent);
                    }
                }
            }
        }

        if order.len() < edges.len() {
            let stuck: BTreeSet<&LogicalId> = remaining
                .iter()
                .filter(|(_, n)| **n > 0)
                .map(|(id, _)| *id)
                .collect();
            return Err(GraphError::Cycle(find_cycle(&edges, &stuck)));
        }

        Ok(order)
    }

    /// Owner-level edges: `a -> b` when a resource of `a` references one of `b`.
    ///
    /// Every owner appears as a key, even without edges.
    pub fn component_dependencies(&self) -> BTreeMap<String, BTreeSet<String>> {
        let mut out: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for resource in self.resources.values() {
            let deps = out.entry(resource.owner().to_string()).or_default();
            for target in self.dependencies(resource.logical_id()) {
                if let Some(dep) = self.resources.get(&target) {
                    if dep.owner() != resource.owner() {
                        deps.insert(dep.owner().to_string());
                    }
                }
            }
        }
        out
    }

    /// Whether `component` depends on `other`, directly or transitively.
    pub fn component_depends_on(&self, component: &str, other: &str) -> bool {
        let graph = self.component_dependencies();
        let mut seen = BTreeSet::new();
        let mut stack = vec![component];
        while let Some(current) = stack.pop() {
            for dep in graph.get(current).into_iter().flatten() {
                if dep == other {
                    return true;
                }
                if seen.insert(dep.as_str()) {
                    stack.push(dep);
                }
            }
        }
        false
    }

    /// The full template document.
    pub fn to_template(&self, description: &str) -> Value {
        let resources: Map<String, Value> = self
            .resources
            .iter()
            .map(|(id, r)| (id.as_str().to_string(), r.to_template_entry()))
            .collect();

        let mut template = Map::new();
        template.insert(
            "AWSTemplateFormatVersion".into(),
            TEMPLATE_FORMAT_VERSION.into(),
        );
        template.insert("Description".into(), description.into());
        template.insert("Resources".into(), Value::Object(resources));

        if !self.outputs.is_empty() {
            let outputs: Map<String, Value> = self
                .outputs
                .iter()
                .map(|(id, o)| {
                    let mut entry = json!({ "Value": o.value });
                    if let Some(description) = &o.description {
                        entry["Description"] = description.as_str().into();
                    }
                    (id.as_str().to_string(), entry)
                })
                .collect();
            template.insert("Outputs".into(), Value::Object(outputs));
        }

        Value::Object(template)
    }

    fn resolve(&self, from: &LogicalId, target: &str) -> Result<LogicalId, GraphError> {
        match LogicalId::parse(target) {
            Ok(id) if self.resources.contains_key(&id) => Ok(id),
            _ => Err(GraphError::UnresolvedReference {
                from: from.clone(),
                to: target.to_string(),
            }),
        }
    }

    fn edges(&self) -> Result<Edges<'_>, GraphError> {
        let mut edges = BTreeMap::new();
        for (id, resource) in &self.resources {
            let mut deps = BTreeSet::new();
            for target in resource.references() {
                deps.insert(self.resolve(id, &target)?);
            }
            edges.insert(id, deps);
        }
        Ok(edges)
    }
}

/// Walks stuck nodes until one repeats. Every stuck node has a stuck
/// dependency, so the walk always closes a loop.
fn find_cycle(edges: &Edges<'_>, stuck: &BTreeSet<&LogicalId>) -> Vec<LogicalId> {
    let Some(&start) = stuck.iter().next() else {
        return Vec::new();
    };

    let mut path: Vec<&LogicalId> = vec![start];
    let mut position: BTreeMap<&LogicalId, usize> = BTreeMap::from([(start, 0)]);
    let mut current = start;

    while let Some(next) = edges
        .get(current)
        .and_then(|deps| deps.iter().find(|d| stuck.contains(d)))
    {
        if let Some(&pos) = position.get(next) {
            return path[pos..].iter().map(|id| (*id).clone()).collect();
        }
        position.insert(next, path.len());
        path.push(next);
        current = next;
    }

    path.into_iter().cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeletionPolicy;

    fn id(s: &str) -> LogicalId {
        LogicalId::parse(s).unwrap()
    }

    fn resource(name: &str, owner: &str, properties: Value) -> Resource {
        Resource::new(id(name), "AWS::Test::Thing", owner, properties)
    }

    fn sample() -> ResourceGraph {
        let mut graph = ResourceGraph::new();
        graph.insert(resource("Vpc", "network", json!({}))).unwrap();
        graph
            .insert(resource("Subnet", "network", json!({"VpcId": {"Ref": "Vpc"}})))
            .unwrap();
        graph
            .insert(resource(
                "Cluster",
                "cluster",
                json!({"Subnets": [{"Ref": "Subnet"}]}),
            ))
            .unwrap();
        graph
            .insert(resource(
                "Service",
                "controller",
                json!({"Cluster": {"Fn::GetAtt": ["Cluster", "Arn"]}}),
            ))
            .unwrap();
        graph
    }

    #[test]
    fn test_duplicate_logical_id_rejected() {
        let mut graph = sample();
        let err = graph.insert(resource("Vpc", "network", json!({}))).unwrap_err();
        assert_eq!(err, GraphError::DuplicateResource(id("Vpc")));
    }

    #[test]
    fn test_topological_order() {
        let order = sample().topological_order().unwrap();
        let names: Vec<&str> = order.iter().map(LogicalId::as_str).collect();
        assert_eq!(names, ["Vpc", "Subnet", "Cluster", "Service"]);
    }

    #[test]
    fn test_dangling_reference() {
        let mut graph = sample();
        graph
            .insert(resource("Orphan", "agents", json!({"Role": {"Ref": "Missing"}})))
            .unwrap();
        assert_eq!(
            graph.validate().unwrap_err(),
            GraphError::UnresolvedReference {
                from: id("Orphan"),
                to: "Missing".to_string()
            }
        );
    }

    #[test]
    fn test_dangling_output_reference() {
        let mut graph = sample();
        graph
            .add_output(Output::new(id("Url"), Expr::Ref(id("Nope"))))
            .unwrap();
        assert!(matches!(
            graph.validate(),
            Err(GraphError::UnresolvedReference { .. })
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = ResourceGraph::new();
        graph
            .insert(resource("A", "x", json!({"B": {"Ref": "B"}})))
            .unwrap();
        graph
            .insert(resource("B", "x", json!({"C": {"Fn::Sub": "${C.Arn}"}})))
            .unwrap();
        graph
            .insert(resource("C", "x", json!({"A": {"Ref": "A"}})))
            .unwrap();
        graph.insert(resource("D", "x", json!({}))).unwrap();

        match graph.validate().unwrap_err() {
            GraphError::Cycle(path) => {
                let names: Vec<&str> = path.iter().map(LogicalId::as_str).collect();
                assert_eq!(names, ["A", "B", "C"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_self_reference_is_a_cycle() {
        let mut graph = ResourceGraph::new();
        graph
            .insert(resource("Loop", "x", json!({"Me": {"Ref": "Loop"}})))
            .unwrap();
        assert_eq!(
            graph.validate().unwrap_err(),
            GraphError::Cycle(vec![id("Loop")])
        );
    }

    #[test]
    fn test_component_dependencies() {
        let graph = sample();
        let deps = graph.component_dependencies();
        assert!(deps["network"].is_empty());
        assert!(deps["cluster"].contains("network"));
        assert!(deps["controller"].contains("cluster"));

        assert!(graph.component_depends_on("controller", "network"));
        assert!(!graph.component_depends_on("network", "controller"));
    }

    #[test]
    fn test_template_shape() {
        let mut graph = sample();
        graph
            .insert(
                resource("Store", "cluster", json!({})).with_deletion_policy(DeletionPolicy::Retain),
            )
            .unwrap();
        graph
            .add_output(
                Output::new(id("ClusterArn"), Expr::GetAtt(id("Cluster"), "Arn".into()))
                    .with_description("cluster"),
            )
            .unwrap();

        let template = graph.to_template("test stack");
        assert_eq!(template["AWSTemplateFormatVersion"], "2010-09-09");
        assert_eq!(template["Description"], "test stack");
        assert_eq!(template["Resources"]["Store"]["DeletionPolicy"], "Retain");
        assert_eq!(
            template["Resources"]["Subnet"]["Properties"]["VpcId"],
            json!({"Ref": "Vpc"})
        );
        assert_eq!(
            template["Outputs"]["ClusterArn"],
            json!({"Value": {"Fn::GetAtt": ["Cluster", "Arn"]}, "Description": "cluster"})
        );
    }

    #[test]
    fn test_template_is_deterministic() {
        let a = serde_json::to_string(&sample().to_template("x")).unwrap();
        let b = serde_json::to_string(&sample().to_template("x")).unwrap();
        assert_eq!(a, b);
    }
}
