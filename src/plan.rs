//! Task planning: which tasks can run now, which are blocked, and claiming.

use crate::graph::DagState;
use crate::store::DagError;
use crate::types::{Event, Node, Status};
use eyre::Result;
use log::info;
use std::collections::HashSet;

/// Multi-wave lookahead produced by [`DagState::plan_waves`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WavePlan {
    /// Waves of task ids; tasks within a wave are independent of each other.
    pub waves: Vec<Vec<String>>,
    /// Pending tasks behind a dependency that is neither valid, active, nor
    /// scheduled in an earlier wave (including missing ones).
    pub unreachable: Vec<String>,
}

impl DagState {
    fn is_valid(&self, id: &str) -> bool {
        self.get(id).is_some_and(|n| n.status == Status::Valid)
    }

    fn dependencies_valid(&self, node: &Node) -> bool {
        node.depends_on.iter().all(|d| self.is_valid(d))
    }

    fn pending_tasks(&self) -> impl Iterator<Item = &Node> {
        self.nodes().filter(|n| n.is_task() && n.status == Status::Pending)
    }

    /// Pending tasks whose dependencies are all valid.
    pub fn plannable(&self) -> Vec<&Node> {
        self.pending_tasks().filter(|n| self.dependencies_valid(n)).collect()
    }

    /// Pending tasks with at least one dependency that is not valid.
    pub fn blocked(&self) -> Vec<&Node> {
        self.pending_tasks().filter(|n| !self.dependencies_valid(n)).collect()
    }

    /// Tasks currently claimed.
    pub fn active_tasks(&self) -> Vec<&Node> {
        self.nodes()
            .filter(|n| n.is_task() && n.status == Status::Active)
            .collect()
    }

    /// The immediately actionable frontier as a single wave.
    ///
    /// Dependents of these tasks only become plannable once their
    /// predecessors are valid, so callers re-invoke this after each wave.
    /// See [`DagState::plan_waves`] for a lookahead.
    pub fn parallel_groups(&self) -> Vec<Vec<&Node>> {
        let wave = self.plannable();
        if wave.is_empty() {
            return Vec::new();
        }
        vec![wave]
    }

    /// Lookahead scheduler: assume every wave (and every currently active
    /// task) ends up valid, and keep peeling off newly plannable tasks.
    pub fn plan_waves(&self) -> WavePlan {
        let mut settled: HashSet<&str> = self
            .nodes()
            .filter(|n| n.status == Status::Valid)
            .map(|n| n.id.as_str())
            .collect();
        let mut remaining: Vec<&Node> = self.pending_tasks().collect();
        let mut plan = WavePlan::default();

        let first: Vec<&Node> = remaining
            .iter()
            .copied()
            .filter(|n| n.depends_on.iter().all(|d| settled.contains(d.as_str())))
            .collect();

        // Active tasks complete alongside the first wave.
        settled.extend(self.active_tasks().into_iter().map(|n| n.id.as_str()));
        let mut wave = first;

        loop {
            if !wave.is_empty() {
                let ids: HashSet<&str> = wave.iter().map(|n| n.id.as_str()).collect();
                remaining.retain(|n| !ids.contains(n.id.as_str()));
                settled.extend(ids);
                plan.waves.push(wave.iter().map(|n| n.id.clone()).collect());
            }

            let next: Vec<&Node> = remaining
                .iter()
                .copied()
                .filter(|n| n.depends_on.iter().all(|d| settled.contains(d.as_str())))
                .collect();
            if next.is_empty() {
                break;
            }
            wave = next;
        }

        plan.unreachable = remaining.iter().map(|n| n.id.clone()).collect();
        plan
    }

    /// Take ownership of a task: `pending -> active`.
    ///
    /// The checks are optimistic; two callers working on separately loaded
    /// copies of the graph can both succeed, and the persistence layer has to
    /// reject the later write.
    pub fn claim_task(&mut self, id: &str) -> Result<Event> {
        let node = self.require(id)?;

        if !node.is_task() {
            return Err(eyre::eyre!(DagError::NotATask {
                id: id.to_string(),
                node_type: node.node_type,
            }));
        }

        if node.status != Status::Pending {
            return Err(eyre::eyre!(DagError::NotPending {
                id: id.to_string(),
                status: node.status,
            }));
        }

        if let Some(dep) = node.depends_on.iter().find(|d| !self.is_valid(d)) {
            return Err(eyre::eyre!(DagError::UnsatisfiedDependency {
                task: id.to_string(),
                dependency: dep.clone(),
                status: self.get(dep).map(|n| n.status),
            }));
        }

        let event = self.apply_status(id, Status::Active)?;
        info!("claimed {}", id);
        Ok(event)
    }
}
