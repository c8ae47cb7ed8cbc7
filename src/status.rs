//! Status engine: lifecycle transitions and cascading invalidation.
//!
//! ```text
//! pending --claim_task--> active --set_status(valid)--> valid --invalidate--> stale
//!    \________________________ set_status(valid) ______/^           |
//!                                                       \__________/
//! ```

use crate::graph::DagState;
use crate::store::DagError;
use crate::types::{Event, Status};
use chrono::Utc;
use eyre::Result;
use log::{debug, info};
use std::collections::HashSet;

impl DagState {
    /// Set a node's status.
    ///
    /// Moving into `valid` bumps `version` and stamps `last_validated`; every
    /// other status leaves the version alone. Task nodes cannot be made
    /// `active` here: that transition belongs to [`DagState::claim_task`].
    pub fn set_status(&mut self, id: &str, status: Status) -> Result<Event> {
        let node = self.require(id)?;
        if status == Status::Active && node.is_task() && node.status != Status::Active {
            return Err(eyre::eyre!(DagError::ClaimRequired(id.to_string())));
        }
        self.apply_status(id, status)
    }

    /// Unguarded transition shared by `set_status`, `claim_task`, `invalidate`
    /// and the task-file sync.
    pub(crate) fn apply_status(&mut self, id: &str, status: Status) -> Result<Event> {
        let node = self.require_mut(id)?;
        let from = node.status;
        node.status = status;
        if status == Status::Valid {
            node.version += 1;
            node.last_validated = Some(Utc::now());
        }

        debug!("status {} {} -> {} (v{})", id, from, status, node.version);
        Ok(Event::status_changed(id, from, status, node.version))
    }

    /// Mark `id` and everything downstream of it stale.
    ///
    /// Nodes are visited producer-before-consumer. Nodes that are already
    /// stale are skipped, so repeating the call yields no events.
    pub fn invalidate(&mut self, id: &str) -> Result<Vec<Event>> {
        self.require(id)?;

        let mut closure: HashSet<String> = self.downstream(id).into_iter().map(String::from).collect();
        closure.insert(id.to_string());

        let order: Vec<String> = self
            .producers_first(|n| closure.contains(&n.id))
            .into_iter()
            .map(String::from)
            .collect();

        let mut events = Vec::new();
        for node_id in order {
            if self.get(&node_id).is_some_and(|n| n.status == Status::Stale) {
                continue;
            }
            events.push(self.apply_status(&node_id, Status::Stale)?);
        }

        info!(
            "invalidate {}: {} of {} node(s) marked stale",
            id,
            events.len(),
            closure.len()
        );
        Ok(events)
    }
}
