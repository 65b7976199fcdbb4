use jecs_id::LogicalId;
use thiserror::Error;

/// Resource graph errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    /// Two resources (or outputs) share a logical ID.
    #[error("duplicate logical id: {0}")]
    DuplicateResource(LogicalId),

    /// A reference points at a resource that is not in the graph.
    #[error("{from} references {to}, which is not defined")]
    UnresolvedReference { from: LogicalId, to: String },

    /// The graph contains a cycle.
    #[error("dependency cycle: {}", format_cycle(.0))]
    Cycle(Vec<LogicalId>),

    /// A resource's properties could not be serialized.
    #[error("failed to serialize {id}: {message}")]
    Serialization { id: LogicalId, message: String },
}

fn format_cycle(path: &[LogicalId]) -> String {
    let mut parts: Vec<&str> = path.iter().map(LogicalId::as_str).collect();
    if let Some(first) = path.first() {
        parts.push(first.as_str());
    }
    parts.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_message_closes_the_loop() {
        let err = GraphError::Cycle(vec![
            LogicalId::parse("A").unwrap(),
            LogicalId::parse("B").unwrap(),
        ]);
        assert_eq!(err.to_string(), "dependency cycle: A -> B -> A");
    }
}
