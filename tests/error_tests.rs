//! Integration tests for error handling.
//!
//! Tests that errors are properly returned for invalid operations and that a
//! failed operation leaves the graph untouched.

mod common;

use common::{TestEnv, dag_error};
use lineage::{DagError, NewNode, NodeType, Status, ValidationError};

// =============================================================================
// Node Not Found Tests
// =============================================================================

#[test]
fn test_get_nonexistent_node_returns_none() {
    let env = TestEnv::new();
    assert!(env.dag.get("ghost").is_none());
}

#[test]
fn test_set_status_nonexistent_fails() {
    let mut env = TestEnv::new();

    let err = env.dag.set_status("ghost", Status::Valid).unwrap_err();
    assert_eq!(dag_error(&err), &DagError::NodeNotFound("ghost".to_string()));
}

#[test]
fn test_invalidate_nonexistent_fails() {
    let mut env = TestEnv::new();
    assert!(env.dag.invalidate("ghost").unwrap_err().to_string().contains("not found"));
}

#[test]
fn test_claim_nonexistent_fails() {
    let mut env = TestEnv::new();
    assert!(env.dag.claim_task("task.404").unwrap_err().to_string().contains("not found"));
}

#[test]
fn test_add_dependency_from_nonexistent_fails() {
    let mut env = TestEnv::new();
    env.add("a", NodeType::Parameter, &[]);

    let err = env.dag.add_dependency("ghost", "a").unwrap_err();
    assert!(err.to_string().contains("not found"));
}

#[test]
fn test_add_dependency_to_nonexistent_fails() {
    let mut env = TestEnv::new();
    env.add("a", NodeType::Analysis, &[]);

    let err = env.dag.add_dependency("a", "ghost").unwrap_err();
    assert!(err.to_string().contains("not found"));
    assert!(env.node("a").depends_on.is_empty());
}

#[test]
fn test_add_node_with_missing_dependency_fails() {
    let mut env = TestEnv::new();
    env.add("a", NodeType::Parameter, &[]);

    let err = env.dag.add_node("b", NodeType::Analysis, "B", &["a", "ghost"]).unwrap_err();
    assert_eq!(
        dag_error(&err),
        &DagError::DependencyNotFound {
            node: "b".to_string(),
            dependency: "ghost".to_string(),
        }
    );
    assert!(!env.dag.contains("b"));
}

// =============================================================================
// Duplicate Tests
// =============================================================================

#[test]
fn test_add_duplicate_node_fails() {
    let mut env = TestEnv::new();
    env.add("a", NodeType::Parameter, &[]);
    env.validate_node("a");

    let err = env.dag.add_node("a", NodeType::Report, "Other", &[]).unwrap_err();
    assert!(err.to_string().contains("already exists"));

    // Existing node untouched
    let node = env.node("a");
    assert_eq!(node.node_type, NodeType::Parameter);
    assert_eq!(node.status, Status::Valid);
    assert_eq!(node.version, 2);
}

#[test]
fn test_add_duplicate_node_reports_duplicate_before_bad_fields() {
    let mut env = TestEnv::new();
    env.add("a", NodeType::Parameter, &[]);

    let err = env.dag.add_node("a", NodeType::Parameter, "", &[]).unwrap_err();
    assert_eq!(dag_error(&err), &DagError::AlreadyExists("a".to_string()));
    assert!(err.to_string().contains("already exists"));
    assert_eq!(env.node("a").title, "Node a");
}

#[test]
fn test_add_duplicate_edge_fails() {
    let mut env = TestEnv::new();
    env.add("a", NodeType::Parameter, &[]);
    env.add("b", NodeType::Analysis, &["a"]);

    let err = env.dag.add_dependency("b", "a").unwrap_err();
    assert!(matches!(dag_error(&err), DagError::DuplicateEdge { .. }));
    assert_eq!(env.node("b").depends_on, vec!["a"]);
}

// =============================================================================
// Cycle Tests
// =============================================================================

#[test]
fn test_self_dependency_fails() {
    let mut env = TestEnv::new();
    env.add("a", NodeType::Analysis, &[]);

    let err = env.dag.add_dependency("a", "a").unwrap_err();
    assert!(err.to_string().contains("cycle"));
}

#[test]
fn test_long_cycle_fails() {
    let mut env = TestEnv::new();
    env.add("n0", NodeType::DataSource, &[]);
    for i in 1..20 {
        let prev = format!("n{}", i - 1);
        env.add(&format!("n{}", i), NodeType::Analysis, &[prev.as_str()]);
    }

    let err = env.dag.add_dependency("n0", "n19").unwrap_err();
    assert!(err.to_string().contains("cycle"));
    assert!(env.dag.detect_cycle().is_none());
}

// =============================================================================
// Claim Tests
// =============================================================================

#[test]
fn test_claim_non_task_fails() {
    let mut env = TestEnv::new();
    env.add("analysis.ep01", NodeType::Analysis, &[]);

    let err = env.dag.claim_task("analysis.ep01").unwrap_err();
    assert!(err.to_string().contains("not a task"));
    assert_eq!(env.status("analysis.ep01"), Status::Pending);
}

#[test]
fn test_claim_twice_fails() {
    let mut env = TestEnv::new();
    env.add_task("task.001", &[]);
    env.claim("task.001");

    let err = env.dag.claim_task("task.001").unwrap_err();
    assert!(err.to_string().contains("not pending"));
}

#[test]
fn test_claim_valid_task_fails() {
    let mut env = TestEnv::new();
    env.add_task("task.001", &[]);
    env.validate_node("task.001");

    let err = env.dag.claim_task("task.001").unwrap_err();
    assert_eq!(
        dag_error(&err),
        &DagError::NotPending {
            id: "task.001".to_string(),
            status: Status::Valid,
        }
    );
}

#[test]
fn test_claim_with_stale_dependency_fails() {
    let mut env = TestEnv::episode_pipeline();
    env.add_task("task.010", &["summary"]);
    env.dag.set_status("summary", Status::Stale).unwrap();

    let err = env.dag.claim_task("task.010").unwrap_err();
    assert!(err.to_string().contains("unsatisfied dependency"));
    assert!(err.to_string().contains("stale"));
}

#[test]
fn test_set_status_active_on_task_requires_claim() {
    let mut env = TestEnv::new();
    env.add_task("task.001", &[]);

    let err = env.dag.set_status("task.001", Status::Active).unwrap_err();
    assert!(matches!(dag_error(&err), DagError::ClaimRequired(_)));

    // Non-task nodes may go active directly
    env.add("analysis.ep01", NodeType::Analysis, &[]);
    env.dag.set_status("analysis.ep01", Status::Active).unwrap();
}

// =============================================================================
// Validation Tests
// =============================================================================

#[test]
fn test_empty_id_fails() {
    let mut env = TestEnv::new();

    let err = env.dag.add_node("", NodeType::Analysis, "Empty", &[]).unwrap_err();
    assert_eq!(dag_error(&err), &DagError::Validation(ValidationError::EmptyId));
}

#[test]
fn test_empty_title_fails() {
    let mut env = TestEnv::new();

    let err = env.dag.add_node("a", NodeType::Analysis, "   ", &[]).unwrap_err();
    assert_eq!(dag_error(&err), &DagError::Validation(ValidationError::EmptyTitle));
}

#[test]
fn test_invalid_id_characters_fail() {
    let mut env = TestEnv::new();

    for id in ["has space", "slash/id", "emoji\u{1F680}"] {
        assert!(env.dag.add_node(id, NodeType::Analysis, "T", &[]).is_err(), "{} accepted", id);
    }
    assert!(env.dag.is_empty());
}

#[test]
fn test_builder_errors_match_positional_api() {
    let mut env = TestEnv::new();
    env.add("a", NodeType::Parameter, &[]);

    let err = env
        .dag
        .add_node_with(NewNode::new("b", NodeType::Analysis, "B").depends_on(["ghost"]))
        .unwrap_err();
    assert!(matches!(dag_error(&err), DagError::DependencyNotFound { .. }));
}
