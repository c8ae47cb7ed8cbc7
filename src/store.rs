//! Mutation API: node and edge creation under invariant checks.

use crate::graph::DagState;
use crate::types::{Event, Node, NodeType, Status, ValidationError};
use eyre::Result;
use log::debug;
use std::collections::HashSet;

/// Errors raised by mutating and planning operations.
#[derive(Debug, Clone, PartialEq)]
pub enum DagError {
    /// A node with this id is already in the graph.
    AlreadyExists(String),
    /// Node not found.
    NodeNotFound(String),
    /// A declared dependency does not exist.
    DependencyNotFound { node: String, dependency: String },
    /// The edge is already present.
    DuplicateEdge { from: String, to: String },
    /// Adding this edge would create a cycle.
    CycleDetected { from: String, to: String },
    /// Claiming only applies to task nodes.
    NotATask { id: String, node_type: NodeType },
    /// Claiming requires a pending task.
    NotPending { id: String, status: Status },
    /// Claiming requires every dependency to be valid.
    UnsatisfiedDependency {
        task: String,
        dependency: String,
        status: Option<Status>,
    },
    /// Tasks become active only by being claimed.
    ClaimRequired(String),
    /// Field validation failed.
    Validation(ValidationError),
    /// A persisted node is filed under a key other than its id.
    KeyMismatch { key: String, id: String },
}

impl std::fmt::Display for DagError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DagError::AlreadyExists(id) => write!(f, "node already exists: {}", id),
            DagError::NodeNotFound(id) => write!(f, "node not found: {}", id),
            DagError::DependencyNotFound { node, dependency } => {
                write!(f, "dependency not found: {} (required by {})", dependency, node)
            }
            DagError::DuplicateEdge { from, to } => {
                write!(f, "dependency already exists: {} -> {}", from, to)
            }
            DagError::CycleDetected { from, to } => {
                write!(f, "adding dependency {} -> {} would create a cycle", from, to)
            }
            DagError::NotATask { id, node_type } => {
                write!(f, "{} is not a task (type {})", id, node_type)
            }
            DagError::NotPending { id, status } => {
                write!(f, "task {} is not pending (status {})", id, status)
            }
            DagError::UnsatisfiedDependency {
                task,
                dependency,
                status,
            } => match status {
                Some(status) => write!(
                    f,
                    "task {} has unsatisfied dependency {} (status {})",
                    task, dependency, status
                ),
                None => write!(
                    f,
                    "task {} has unsatisfied dependency {} (missing)",
                    task, dependency
                ),
            },
            DagError::ClaimRequired(id) => {
                write!(f, "task {} can only become active by being claimed", id)
            }
            DagError::Validation(e) => write!(f, "validation error: {}", e),
            DagError::KeyMismatch { key, id } => {
                write!(f, "node key '{}' does not match node id '{}'", key, id)
            }
        }
    }
}

impl std::error::Error for DagError {}

/// Description of a node to create.
///
/// # Example
///
/// ```
/// use lineage::{DagState, NewNode, NodeType};
///
/// let mut state = DagState::new();
/// state.add_node("param.mass", NodeType::Parameter, "Ship mass", &[]).unwrap();
/// state
///     .add_node_with(
///         NewNode::new("analysis.ep01", NodeType::Analysis, "Episode 1 transfer")
///             .depends_on(["param.mass"])
///             .tag("episode:01")
///             .notes("Brachistochrone estimate"),
///     )
///     .unwrap();
/// assert_eq!(state.get("analysis.ep01").unwrap().tags, vec!["episode:01"]);
/// ```
#[derive(Debug, Clone)]
pub struct NewNode {
    id: String,
    node_type: NodeType,
    title: String,
    depends_on: Vec<String>,
    tags: Vec<String>,
    notes: Option<String>,
}

impl NewNode {
    pub fn new(id: impl Into<String>, node_type: NodeType, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            title: title.into(),
            depends_on: Vec::new(),
            tags: Vec::new(),
            notes: None,
        }
    }

    /// Add dependencies.
    pub fn depends_on(mut self, ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.depends_on.extend(ids.into_iter().map(|d| d.into()));
        self
    }

    /// Add a tag.
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Add multiple tags.
    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.extend(tags.into_iter().map(|t| t.into()));
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }
}

impl DagState {
    /// Look up a node or fail with [`DagError::NodeNotFound`].
    pub(crate) fn require(&self, id: &str) -> Result<&Node> {
        self.get(id)
            .ok_or_else(|| eyre::eyre!(DagError::NodeNotFound(id.to_string())))
    }

    pub(crate) fn require_mut(&mut self, id: &str) -> Result<&mut Node> {
        self.node_mut(id)
            .ok_or_else(|| eyre::eyre!(DagError::NodeNotFound(id.to_string())))
    }

    /// Create a pending node at version 1.
    pub fn add_node(&mut self, id: &str, node_type: NodeType, title: &str, depends_on: &[&str]) -> Result<Event> {
        self.add_node_with(NewNode::new(id, node_type, title).depends_on(depends_on.iter().copied()))
    }

    /// Create a node with tags and notes.
    pub fn add_node_with(&mut self, request: NewNode) -> Result<Event> {
        let mut seen = HashSet::new();
        let depends_on: Vec<String> = request
            .depends_on
            .into_iter()
            .filter(|d| seen.insert(d.clone()))
            .collect();

        let mut tags: Vec<String> = Vec::with_capacity(request.tags.len());
        for tag in request.tags {
            if !tags.contains(&tag) {
                tags.push(tag);
            }
        }

        let node = Node {
            depends_on,
            tags,
            notes: request.notes,
            ..Node::new(request.id, request.node_type, request.title)
        };

        if self.contains(&node.id) {
            return Err(eyre::eyre!(DagError::AlreadyExists(node.id)));
        }

        node.validate().map_err(|e| eyre::eyre!(DagError::Validation(e)))?;

        if let Some(missing) = node.depends_on.iter().find(|d| !self.contains(d)) {
            return Err(eyre::eyre!(DagError::DependencyNotFound {
                node: node.id.clone(),
                dependency: missing.clone(),
            }));
        }

        debug!(
            "add_node {} ({}) depends_on={:?}",
            node.id, node.node_type, node.depends_on
        );
        let event = Event::node_added(&node.id);
        self.insert(node);

        Ok(event)
    }

    /// Record that `from_id` depends on `to_id`.
    pub fn add_dependency(&mut self, from_id: &str, to_id: &str) -> Result<Event> {
        let from = self.require(from_id)?;
        if !self.contains(to_id) {
            return Err(eyre::eyre!(DagError::DependencyNotFound {
                node: from_id.to_string(),
                dependency: to_id.to_string(),
            }));
        }

        if from.depends_on.iter().any(|d| d == to_id) {
            return Err(eyre::eyre!(DagError::DuplicateEdge {
                from: from_id.to_string(),
                to: to_id.to_string(),
            }));
        }

        if self.would_create_cycle(from_id, to_id) {
            return Err(eyre::eyre!(DagError::CycleDetected {
                from: from_id.to_string(),
                to: to_id.to_string(),
            }));
        }

        self.require_mut(from_id)?.depends_on.push(to_id.to_string());
        debug!("add_dependency {} -> {}", from_id, to_id);

        Ok(Event::dependency_added(from_id, to_id))
    }

    /// Drop the edge `from_id -> to_id` if present.
    ///
    /// Returns `None` when there was no such edge.
    pub fn remove_dependency(&mut self, from_id: &str, to_id: &str) -> Result<Option<Event>> {
        let from = self.require_mut(from_id)?;
        let before = from.depends_on.len();
        from.depends_on.retain(|d| d != to_id);

        if from.depends_on.len() == before {
            return Ok(None);
        }

        debug!("remove_dependency {} -> {}", from_id, to_id);
        Ok(Some(Event::dependency_removed(from_id, to_id)))
    }

    /// Replace a node's notes.
    pub fn set_notes(&mut self, id: &str, notes: Option<&str>) -> Result<()> {
        self.require_mut(id)?.notes = notes.map(String::from);
        Ok(())
    }

    /// Add a tag; returns false if the node already had it.
    pub fn add_tag(&mut self, id: &str, tag: &str) -> Result<bool> {
        let node = self.require_mut(id)?;
        if node.has_tag(tag) {
            return Ok(false);
        }
        node.tags.push(tag.to_string());
        Ok(true)
    }

    /// Check if adding `from_id -> to_id` would close a cycle.
    pub fn would_create_cycle(&self, from_id: &str, to_id: &str) -> bool {
        // DFS from 'to_id' through its dependencies looking for 'from_id'
        let mut visited = HashSet::new();
        let mut stack = vec![to_id];

        while let Some(current) = stack.pop() {
            if current == from_id {
                return true;
            }
            if visited.insert(current)
                && let Some(node) = self.get(current)
            {
                stack.extend(node.depends_on.iter().map(String::as_str));
            }
        }

        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dag_error(report: &eyre::Report) -> &DagError {
        report.downcast_ref::<DagError>().expect("expected a DagError")
    }

    #[test]
    fn test_add_node_defaults() {
        let mut state = DagState::new();
        let event = state.add_node("param.mass", NodeType::Parameter, "Mass", &[]).unwrap();

        assert_eq!(event.node_id, "param.mass");
        assert_eq!(event.action, crate::types::EventAction::NodeAdded);

        let node = state.get("param.mass").unwrap();
        assert_eq!(node.status, Status::Pending);
        assert_eq!(node.version, 1);
    }

    #[test]
    fn test_add_node_duplicate() {
        let mut state = DagState::new();
        state.add_node("a", NodeType::Parameter, "A", &[]).unwrap();
        let err = state.add_node("a", NodeType::Report, "A again", &[]).unwrap_err();

        assert!(err.to_string().contains("already exists"));
        assert_eq!(dag_error(&err), &DagError::AlreadyExists("a".to_string()));
        // Existing node is untouched
        assert_eq!(state.get("a").unwrap().node_type, NodeType::Parameter);
    }

    #[test]
    fn test_add_node_missing_dependency() {
        let mut state = DagState::new();
        let err = state.add_node("b", NodeType::Analysis, "B", &["a"]).unwrap_err();

        assert!(err.to_string().contains("not found"));
        assert!(!state.contains("b"));
    }

    #[test]
    fn test_add_node_collapses_repeated_dependencies() {
        let mut state = DagState::new();
        state.add_node("a", NodeType::Parameter, "A", &[]).unwrap();
        state.add_node("b", NodeType::Analysis, "B", &["a", "a"]).unwrap();
        assert_eq!(state.get("b").unwrap().depends_on, vec!["a"]);
    }

    #[test]
    fn test_add_node_invalid_fields() {
        let mut state = DagState::new();
        let err = state.add_node("a", NodeType::Parameter, "", &[]).unwrap_err();
        assert_eq!(dag_error(&err), &DagError::Validation(ValidationError::EmptyTitle));
    }

    #[test]
    fn test_add_dependency() {
        let mut state = DagState::new();
        state.add_node("a", NodeType::Parameter, "A", &[]).unwrap();
        state.add_node("b", NodeType::Analysis, "B", &[]).unwrap();

        let event = state.add_dependency("b", "a").unwrap();
        assert_eq!(event.dependency.as_deref(), Some("a"));
        assert_eq!(state.get("b").unwrap().depends_on, vec!["a"]);
    }

    #[test]
    fn test_add_dependency_duplicate() {
        let mut state = DagState::new();
        state.add_node("a", NodeType::Parameter, "A", &[]).unwrap();
        state.add_node("b", NodeType::Analysis, "B", &["a"]).unwrap();

        let err = state.add_dependency("b", "a").unwrap_err();
        assert!(err.to_string().contains("already exists"));
        assert_eq!(state.get("b").unwrap().depends_on.len(), 1);
    }

    #[test]
    fn test_add_dependency_self_is_cycle() {
        let mut state = DagState::new();
        state.add_node("a", NodeType::Analysis, "A", &[]).unwrap();

        let err = state.add_dependency("a", "a").unwrap_err();
        assert!(err.to_string().contains("cycle"));
    }

    #[test]
    fn test_add_dependency_cycle() {
        let mut state = DagState::new();
        state.add_node("a", NodeType::Parameter, "A", &[]).unwrap();
        state.add_node("b", NodeType::Analysis, "B", &["a"]).unwrap();
        state.add_node("c", NodeType::Report, "C", &["b"]).unwrap();

        let err = state.add_dependency("a", "c").unwrap_err();
        assert!(err.to_string().contains("cycle"));
        assert!(matches!(dag_error(&err), DagError::CycleDetected { .. }));
        assert!(state.get("a").unwrap().depends_on.is_empty());
    }

    #[test]
    fn test_add_dependency_unknown_endpoints() {
        let mut state = DagState::new();
        state.add_node("a", NodeType::Parameter, "A", &[]).unwrap();

        assert!(state.add_dependency("ghost", "a").unwrap_err().to_string().contains("not found"));
        assert!(state.add_dependency("a", "ghost").unwrap_err().to_string().contains("not found"));
    }

    #[test]
    fn test_remove_dependency() {
        let mut state = DagState::new();
        state.add_node("a", NodeType::Parameter, "A", &[]).unwrap();
        state.add_node("b", NodeType::Analysis, "B", &["a"]).unwrap();

        let event = state.remove_dependency("b", "a").unwrap();
        assert!(event.is_some());
        assert!(state.get("b").unwrap().depends_on.is_empty());

        // Removing again is a no-op
        assert!(state.remove_dependency("b", "a").unwrap().is_none());
    }

    #[test]
    fn test_remove_then_reverse_edge_allowed() {
        let mut state = DagState::new();
        state.add_node("a", NodeType::Analysis, "A", &[]).unwrap();
        state.add_node("b", NodeType::Analysis, "B", &["a"]).unwrap();

        state.remove_dependency("b", "a").unwrap();
        assert!(state.add_dependency("a", "b").is_ok());
    }

    #[test]
    fn test_metadata_edits() {
        let mut state = DagState::new();
        state.add_node("a", NodeType::Analysis, "A", &[]).unwrap();

        assert!(state.add_tag("a", "episode:01").unwrap());
        assert!(!state.add_tag("a", "episode:01").unwrap());
        state.set_notes("a", Some("checked by hand")).unwrap();

        let node = state.get("a").unwrap();
        assert_eq!(node.tags, vec!["episode:01"]);
        assert_eq!(node.notes.as_deref(), Some("checked by hand"));
        assert!(state.add_tag("ghost", "x").is_err());
    }
}
