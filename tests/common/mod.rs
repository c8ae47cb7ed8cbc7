//! Shared test infrastructure for lineage integration tests.
//!
//! Provides TestEnv helper wrapping a graph and the events it produced.

#![allow(dead_code)]

use lineage::{DagError, DagState, Event, Node, NodeType, Status};

/// Test environment: a graph plus every event returned so far.
pub struct TestEnv {
    pub dag: DagState,
    pub events: Vec<Event>,
}

impl TestEnv {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self {
            dag: DagState::new(),
            events: Vec::new(),
        }
    }

    /// The four-node graph used throughout: a parameter feeding two
    /// analyses feeding a report, all valid.
    pub fn episode_pipeline() -> Self {
        let mut env = Self::new();
        env.add("mass", NodeType::Parameter, &[]);
        env.add("ep01", NodeType::Analysis, &["mass"]);
        env.add("ep02", NodeType::Analysis, &["mass"]);
        env.add("summary", NodeType::Report, &["ep01", "ep02"]);
        for id in ["mass", "ep01", "ep02", "summary"] {
            env.validate_node(id);
        }
        env
    }

    /// Add a node titled after its id.
    pub fn add(&mut self, id: &str, node_type: NodeType, deps: &[&str]) -> Node {
        let event = self
            .dag
            .add_node(id, node_type, &format!("Node {}", id), deps)
            .expect("Failed to add node");
        self.events.push(event);
        self.node(id)
    }

    /// Add a task node.
    pub fn add_task(&mut self, id: &str, deps: &[&str]) -> Node {
        self.add(id, NodeType::Task, deps)
    }

    /// Add a dependency edge.
    pub fn depend(&mut self, from: &str, to: &str) {
        let event = self.dag.add_dependency(from, to).expect("Failed to add dependency");
        self.events.push(event);
    }

    /// Mark a node valid.
    pub fn validate_node(&mut self, id: &str) -> Node {
        let event = self.dag.set_status(id, Status::Valid).expect("Failed to set status");
        self.events.push(event);
        self.node(id)
    }

    /// Claim a task.
    pub fn claim(&mut self, id: &str) -> Node {
        let event = self.dag.claim_task(id).expect("Failed to claim task");
        self.events.push(event);
        self.node(id)
    }

    /// Invalidate and return the ids marked stale.
    pub fn invalidate(&mut self, id: &str) -> Vec<String> {
        let events = self.dag.invalidate(id).expect("Failed to invalidate");
        let ids = events.iter().map(|e| e.node_id.clone()).collect();
        self.events.extend(events);
        ids
    }

    /// Snapshot of a node.
    pub fn node(&self, id: &str) -> Node {
        self.dag.get(id).cloned().expect("Node not found")
    }

    pub fn status(&self, id: &str) -> Status {
        self.node(id).status
    }

    pub fn plannable_ids(&self) -> Vec<String> {
        self.dag.plannable().iter().map(|n| n.id.clone()).collect()
    }

    pub fn blocked_ids(&self) -> Vec<String> {
        self.dag.blocked().iter().map(|n| n.id.clone()).collect()
    }

    /// Assert that a task is plannable.
    pub fn assert_plannable(&self, id: &str) {
        let plannable = self.plannable_ids();
        assert!(
            plannable.iter().any(|p| p == id),
            "Expected {} to be plannable, but it wasn't. Plannable: {:?}",
            id,
            plannable
        );
    }

    /// Assert that a task is NOT plannable.
    pub fn assert_not_plannable(&self, id: &str) {
        assert!(
            !self.plannable_ids().iter().any(|p| p == id),
            "Expected {} to NOT be plannable, but it was",
            id
        );
    }

    /// Assert that a task is blocked.
    pub fn assert_blocked(&self, id: &str) {
        assert!(
            self.blocked_ids().iter().any(|b| b == id),
            "Expected {} to be blocked, but it wasn't",
            id
        );
    }

    /// Every dependency of every node names an existing node.
    pub fn assert_referential_integrity(&self) {
        for node in self.dag.nodes() {
            for dep in &node.depends_on {
                assert!(self.dag.contains(dep), "{} depends on missing node {}", node.id, dep);
            }
        }
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// The `DagError` inside a report.
pub fn dag_error(report: &eyre::Report) -> &DagError {
    report.downcast_ref::<DagError>().expect("expected a DagError")
}
