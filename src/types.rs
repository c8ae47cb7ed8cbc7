//! Core data types for the lineage graph.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Maximum id length accepted by [`Node::validate`].
pub const MAX_ID_LEN: usize = 200;

/// Maximum title length accepted by [`Node::validate`].
pub const MAX_TITLE_LEN: usize = 500;

/// Kind of artifact a node tracks. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    DataSource,
    Parameter,
    Analysis,
    Report,
    Task,
}

impl NodeType {
    /// All types in layer order (producers first).
    pub const ALL: [NodeType; 5] = [
        NodeType::DataSource,
        NodeType::Parameter,
        NodeType::Analysis,
        NodeType::Report,
        NodeType::Task,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::DataSource => "data_source",
            NodeType::Parameter => "parameter",
            NodeType::Analysis => "analysis",
            NodeType::Report => "report",
            NodeType::Task => "task",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "data_source" => Some(NodeType::DataSource),
            "parameter" => Some(NodeType::Parameter),
            "analysis" => Some(NodeType::Analysis),
            "report" => Some(NodeType::Report),
            "task" => Some(NodeType::Task),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle state of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    Active,
    Valid,
    Stale,
}

impl Status {
    pub const ALL: [Status; 4] = [Status::Pending, Status::Active, Status::Valid, Status::Stale];

    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pending => "pending",
            Status::Active => "active",
            Status::Valid => "valid",
            Status::Stale => "stale",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Status::Pending),
            "active" => Some(Status::Active),
            "valid" => Some(Status::Valid),
            "stale" => Some(Status::Stale),
            _ => None,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked artifact or unit of work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    /// Stable identifier, e.g. "analysis.ep01" or "task.118"
    pub id: String,

    #[serde(rename = "type")]
    pub node_type: NodeType,

    /// Human-readable label
    pub title: String,

    pub status: Status,

    /// Starts at 1, bumped on every transition into `valid`
    pub version: u64,

    /// Ids this node requires, in declaration order
    #[serde(default)]
    pub depends_on: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_validated: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl Node {
    /// A fresh node: pending, version 1.
    pub fn new(id: impl Into<String>, node_type: NodeType, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            title: title.into(),
            status: Status::Pending,
            version: 1,
            depends_on: Vec::new(),
            last_validated: None,
            tags: Vec::new(),
            notes: None,
        }
    }

    pub fn is_task(&self) -> bool {
        self.node_type == NodeType::Task
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    /// Validate the node's own fields. Graph-level checks live in the query engine.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.is_empty() {
            return Err(ValidationError::EmptyId);
        }
        if self.id.len() > MAX_ID_LEN {
            return Err(ValidationError::IdTooLong);
        }
        if !self.id.chars().all(is_id_char) {
            return Err(ValidationError::InvalidId(self.id.clone()));
        }

        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        if self.title.len() > MAX_TITLE_LEN {
            return Err(ValidationError::TitleTooLong);
        }
        if self.title.chars().any(|c| c.is_control()) {
            return Err(ValidationError::InvalidCharacters);
        }

        if self.version == 0 {
            return Err(ValidationError::ZeroVersion);
        }

        Ok(())
    }
}

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | ':')
}

/// Field-level validation errors for nodes.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyId,
    IdTooLong,
    InvalidId(String),
    EmptyTitle,
    TitleTooLong,
    InvalidCharacters,
    ZeroVersion,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyId => write!(f, "id cannot be empty"),
            ValidationError::IdTooLong => write!(f, "id exceeds {} characters", MAX_ID_LEN),
            ValidationError::InvalidId(id) => write!(
                f,
                "invalid id '{}': must be ASCII alphanumeric with '.', '_', '-' or ':'",
                id
            ),
            ValidationError::EmptyTitle => write!(f, "title cannot be empty"),
            ValidationError::TitleTooLong => write!(f, "title exceeds {} characters", MAX_TITLE_LEN),
            ValidationError::InvalidCharacters => write!(f, "title contains control characters"),
            ValidationError::ZeroVersion => write!(f, "version must start at 1"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// What a mutation did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    NodeAdded,
    DependencyAdded,
    DependencyRemoved,
    StatusChanged,
}

impl EventAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventAction::NodeAdded => "node_added",
            EventAction::DependencyAdded => "dependency_added",
            EventAction::DependencyRemoved => "dependency_removed",
            EventAction::StatusChanged => "status_changed",
        }
    }
}

/// Record of a single change, returned by mutating operations.
///
/// The graph never stores these; callers append them to their own history log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub action: EventAction,

    pub node_id: String,

    pub timestamp: DateTime<Utc>,

    /// Other endpoint of an edge event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependency: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<Status>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<Status>,

    /// Node version after a status change
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
}

impl Event {
    fn bare(action: EventAction, node_id: &str) -> Self {
        Self {
            action,
            node_id: node_id.to_string(),
            timestamp: Utc::now(),
            dependency: None,
            from: None,
            to: None,
            version: None,
        }
    }

    pub fn node_added(node_id: &str) -> Self {
        Self::bare(EventAction::NodeAdded, node_id)
    }

    pub fn dependency_added(node_id: &str, dependency: &str) -> Self {
        Self {
            dependency: Some(dependency.to_string()),
            ..Self::bare(EventAction::DependencyAdded, node_id)
        }
    }

    pub fn dependency_removed(node_id: &str, dependency: &str) -> Self {
        Self {
            dependency: Some(dependency.to_string()),
            ..Self::bare(EventAction::DependencyRemoved, node_id)
        }
    }

    pub fn status_changed(node_id: &str, from: Status, to: Status, version: u64) -> Self {
        Self {
            from: Some(from),
            to: Some(to),
            version: Some(version),
            ..Self::bare(EventAction::StatusChanged, node_id)
        }
    }
}
