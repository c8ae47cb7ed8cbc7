//! Lineage: a dependency graph of pipeline artifacts and development tasks.
//!
//! Lineage tracks data sources, parameters, analyses, reports and tasks as a
//! directed acyclic graph. It answers two questions for the tooling around
//! it: is this artifact still trustworthy, and what work can run right now.
//!
//! The library does no file I/O; callers load and store the JSON document.
//!
//! # Example
//!
//! ```
//! use lineage::{DagState, NodeType, Status};
//!
//! let mut dag = DagState::new();
//! dag.add_node("param.mass", NodeType::Parameter, "Ship mass", &[]).unwrap();
//! dag.add_node("analysis.ep01", NodeType::Analysis, "Episode 1", &["param.mass"]).unwrap();
//! dag.add_node("task.001", NodeType::Task, "Write report", &["analysis.ep01"]).unwrap();
//!
//! dag.set_status("param.mass", Status::Valid).unwrap();
//! dag.set_status("analysis.ep01", Status::Valid).unwrap();
//! assert_eq!(dag.plannable().len(), 1);
//!
//! // A parameter changed: everything derived from it is stale again
//! let events = dag.invalidate("param.mass").unwrap();
//! assert_eq!(events.len(), 3);
//! assert_eq!(dag.stale_nodes(), vec!["param.mass", "analysis.ep01", "task.001"]);
//! ```

mod graph;
mod plan;
mod query;
mod status;
mod store;
mod taskfile;
mod types;

// Re-export public API
pub use graph::{DagState, SCHEMA_VERSION};
pub use plan::WavePlan;
pub use query::ImpactReport;
pub use store::{DagError, NewNode};
pub use taskfile::{TaskFileStatus, TaskRecord, parse_task_file, task_file_status_to_node_status, task_node_id};
pub use types::{Event, EventAction, MAX_ID_LEN, MAX_TITLE_LEN, Node, NodeType, Status, ValidationError};
