//! Markdown task files -> task nodes.
//!
//! A task file is named `NNN_slug.md` and looks like:
//!
//! ```text
//! # Task 118: Recompute episode 3 transfer
//!
//! ## Status: IN PROGRESS
//!
//! ## Dependencies
//! - Task 112 (ephemeris refresh)
//! - Task 115
//! ```

use crate::graph::DagState;
use crate::store::NewNode;
use crate::types::{Event, NodeType, Status};
use eyre::Result;
use log::{info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;

static FILENAME_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{3})_([a-z0-9_]+)\.md$").unwrap());

static HEADER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^#\s+Task\s+(\d+)\s*:\s*(.+?)\s*$").unwrap());

static STATUS_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?mi)^##\s*Status\s*:\s*(.+?)\s*$").unwrap());

static SECTION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^#{1,2}\s").unwrap());

static TASK_REF_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\btask\s+(\d{3})\b").unwrap());

static EPISODE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:episode|ep)\s*[-_.]?\s*0*(\d{1,2})\b").unwrap());

/// Status line values understood in task files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskFileStatus {
    Done,
    InProgress,
    Todo,
}

impl TaskFileStatus {
    /// Parse a `## Status:` value. Case-insensitive; trailing text is ignored.
    pub fn parse(s: &str) -> Option<Self> {
        let upper = s.trim().to_uppercase();
        if upper.starts_with("IN PROGRESS") || upper.starts_with("IN_PROGRESS") {
            Some(TaskFileStatus::InProgress)
        } else if upper.starts_with("DONE") {
            Some(TaskFileStatus::Done)
        } else if upper.starts_with("TODO") {
            Some(TaskFileStatus::Todo)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskFileStatus::Done => "DONE",
            TaskFileStatus::InProgress => "IN PROGRESS",
            TaskFileStatus::Todo => "TODO",
        }
    }
}

/// `DONE -> valid`, `IN PROGRESS -> active`, `TODO -> pending`.
pub fn task_file_status_to_node_status(status: TaskFileStatus) -> Status {
    match status {
        TaskFileStatus::Done => Status::Valid,
        TaskFileStatus::InProgress => Status::Active,
        TaskFileStatus::Todo => Status::Pending,
    }
}

/// Node id for a task number: `118 -> "task.118"`.
pub fn task_node_id(number: u32) -> String {
    format!("task.{:03}", number)
}

/// One parsed task file.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRecord {
    pub number: u32,
    pub filename: String,
    pub title: String,
    pub status: TaskFileStatus,
    /// e.g. "episode:03"
    pub tags: Vec<String>,
    /// Numbers of prerequisite tasks
    pub task_deps: Vec<u32>,
}

impl TaskRecord {
    pub fn node_id(&self) -> String {
        task_node_id(self.number)
    }
}

/// Parse a task file. `None` if the file name is not `NNN_slug.md`.
pub fn parse_task_file(content: &str, filename: &str) -> Option<TaskRecord> {
    let basename = Path::new(filename).file_name()?.to_str()?;
    let caps = FILENAME_PATTERN.captures(basename)?;
    let number: u32 = caps[1].parse().ok()?;
    let slug = &caps[2];

    let title = match HEADER_PATTERN.captures(content) {
        Some(header) => {
            if header[1].parse::<u32>().ok() != Some(number) {
                warn!(
                    "{}: header says task {} but file name says {:03}",
                    basename, &header[1], number
                );
            }
            header[2].to_string()
        }
        None => title_from_slug(slug),
    };

    let status = STATUS_PATTERN
        .captures(content)
        .and_then(|c| TaskFileStatus::parse(&c[1]))
        .unwrap_or_else(|| {
            warn!("{}: no recognised status line, assuming TODO", basename);
            TaskFileStatus::Todo
        });

    let mut task_deps = Vec::new();
    for dep in dependency_numbers(content) {
        if dep != number && !task_deps.contains(&dep) {
            task_deps.push(dep);
        }
    }

    let mut tags = Vec::new();
    for ep in EPISODE_PATTERN.captures_iter(content) {
        let Ok(n) = ep[1].parse::<u32>() else { continue };
        let tag = format!("episode:{:02}", n);
        if n > 0 && !tags.contains(&tag) {
            tags.push(tag);
        }
    }

    Some(TaskRecord {
        number,
        filename: basename.to_string(),
        title,
        status,
        tags,
        task_deps,
    })
}

/// Task numbers referenced from bullets under `## Dependencies`.
fn dependency_numbers(content: &str) -> Vec<u32> {
    let mut in_section = false;
    let mut numbers = Vec::new();

    for line in content.lines() {
        let trimmed = line.trim();
        if SECTION_PATTERN.is_match(trimmed) {
            in_section = trimmed.trim_start_matches('#').trim().eq_ignore_ascii_case("dependencies");
            continue;
        }
        if !in_section || !(trimmed.starts_with('-') || trimmed.starts_with('*')) {
            continue;
        }
        numbers.extend(
            TASK_REF_PATTERN
                .captures_iter(trimmed)
                .filter_map(|c| c[1].parse::<u32>().ok()),
        );
    }

    numbers
}

fn title_from_slug(slug: &str) -> String {
    let words: Vec<&str> = slug.split('_').filter(|w| !w.is_empty()).collect();
    let joined = words.join(" ");
    let mut chars = joined.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

impl DagState {
    /// Reconcile task nodes with parsed task files.
    ///
    /// Creates missing task nodes, adds missing `task.NNN -> task.MMM` edges
    /// and copies the file status onto the node when they differ. Running it
    /// twice in a row yields no events the second time.
    ///
    /// Later records repeating a task number are ignored, as are edges to
    /// missing prerequisites and edges that would close a cycle. On error the
    /// graph is left exactly as it was.
    pub fn sync_tasks(&mut self, tasks: &[TaskRecord]) -> Result<Vec<Event>> {
        let mut seen = HashSet::new();
        let tasks: Vec<&TaskRecord> = tasks
            .iter()
            .filter(|record| {
                let first = seen.insert(record.number);
                if !first {
                    warn!("{}: task {:03} is defined more than once; ignoring", record.filename, record.number);
                }
                first
            })
            .collect();

        let mut next = self.clone();
        let mut events = Vec::new();

        for record in &tasks {
            let id = record.node_id();
            if !next.contains(&id) {
                events.push(next.add_node_with(
                    NewNode::new(&id, NodeType::Task, &record.title).tags(record.tags.iter().cloned()),
                )?);
            }
        }

        for record in &tasks {
            let id = record.node_id();
            match next.get(&id) {
                Some(node) if node.is_task() => {}
                Some(node) => {
                    warn!("{}: {} exists as a {}, not a task; skipping", record.filename, id, node.node_type);
                    continue;
                }
                None => continue,
            }

            for dep in &record.task_deps {
                let dep_id = task_node_id(*dep);
                if !next.contains(&dep_id) {
                    warn!("{}: prerequisite {} is not in the graph; skipping edge", record.filename, dep_id);
                    continue;
                }
                if next.get(&id).is_some_and(|n| n.depends_on.contains(&dep_id)) {
                    continue;
                }
                if next.would_create_cycle(&id, &dep_id) {
                    warn!("{}: {} -> {} would create a cycle; skipping edge", record.filename, id, dep_id);
                    continue;
                }
                events.push(next.add_dependency(&id, &dep_id)?);
            }

            let desired = task_file_status_to_node_status(record.status);
            if next.get(&id).is_some_and(|n| n.status != desired) {
                events.push(next.apply_status(&id, desired)?);
            }
        }

        *self = next;
        info!("synced {} task file(s): {} change(s)", tasks.len(), events.len());
        Ok(events)
    }
}
