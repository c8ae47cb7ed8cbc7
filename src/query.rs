//! Read-only queries: reachability, audits, ordering and graph analytics.

use crate::graph::{DagState, SCHEMA_VERSION};
use crate::types::{Node, NodeType, Status};
use log::warn;
use std::collections::{HashMap, HashSet, VecDeque};

/// What invalidating a node would touch.
#[derive(Debug, Clone, PartialEq)]
pub struct ImpactReport {
    pub source: String,
    /// Downstream closure, producers first. Excludes `source`.
    pub affected: Vec<String>,
    pub by_type: HashMap<NodeType, usize>,
}

impl ImpactReport {
    pub fn cascade_count(&self) -> usize {
        self.affected.len()
    }

    /// Affected nodes of one type.
    pub fn count(&self, node_type: NodeType) -> usize {
        self.by_type.get(&node_type).copied().unwrap_or(0)
    }
}

impl DagState {
    /// Every node that transitively depends on `id`. Unknown ids have none.
    pub fn downstream(&self, id: &str) -> Vec<&str> {
        let reverse = self.dependents_index();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut result = Vec::new();
        let mut queue: VecDeque<&str> = reverse.get(id).cloned().unwrap_or_default().into();

        while let Some(current) = queue.pop_front() {
            if current == id || !visited.insert(current) {
                continue;
            }
            result.push(current);
            if let Some(children) = reverse.get(current) {
                queue.extend(children.iter().copied());
            }
        }

        result
    }

    /// Every node `id` transitively depends on. Dangling references are skipped.
    pub fn upstream(&self, id: &str) -> Vec<&str> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut result = Vec::new();
        let mut stack: Vec<&str> = match self.get(id) {
            Some(node) => node.depends_on.iter().map(String::as_str).collect(),
            None => return result,
        };

        while let Some(current) = stack.pop() {
            if current == id || !visited.insert(current) {
                continue;
            }
            let Some(node) = self.get(current) else {
                continue;
            };
            result.push(node.id.as_str());
            stack.extend(node.depends_on.iter().map(String::as_str));
        }

        result
    }

    /// Find a dependency cycle, if any.
    ///
    /// Iterative DFS with an explicit recursion stack. The returned path starts
    /// and ends with the same id, e.g. `["a", "b", "a"]`.
    pub fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut done: HashSet<&str> = HashSet::new();

        for root in self.nodes() {
            if done.contains(root.id.as_str()) {
                continue;
            }

            // (node, index of next dependency to explore)
            let mut stack: Vec<(&Node, usize)> = vec![(root, 0)];
            let mut on_stack: HashSet<&str> = HashSet::from([root.id.as_str()]);

            while let Some(frame) = stack.last_mut() {
                let (node, next) = *frame;
                if next >= node.depends_on.len() {
                    on_stack.remove(node.id.as_str());
                    done.insert(node.id.as_str());
                    stack.pop();
                    continue;
                }

                frame.1 += 1;
                let dep_id = node.depends_on[next].as_str();

                if on_stack.contains(dep_id) {
                    let start = stack
                        .iter()
                        .position(|(n, _)| n.id == dep_id)
                        .unwrap_or(0);
                    let mut cycle: Vec<String> = stack[start..].iter().map(|(n, _)| n.id.clone()).collect();
                    cycle.push(dep_id.to_string());
                    return Some(cycle);
                }

                if done.contains(dep_id) {
                    continue;
                }
                if let Some(dep) = self.get(dep_id) {
                    on_stack.insert(dep.id.as_str());
                    stack.push((dep, 0));
                }
            }
        }

        None
    }

    /// Nodes with no dependencies and no dependents.
    pub fn find_orphans(&self) -> Vec<&str> {
        let reverse = self.dependents_index();
        self.nodes()
            .filter(|n| n.depends_on.is_empty() && !reverse.contains_key(n.id.as_str()))
            .map(|n| n.id.as_str())
            .collect()
    }

    /// Audit the whole graph without failing.
    ///
    /// Each entry is prefixed `ERROR:` (broken invariant) or `WARN:` (policy).
    pub fn validate(&self) -> Vec<String> {
        let mut report = Vec::new();

        if self.schema_version() > SCHEMA_VERSION {
            report.push(format!(
                "WARN: schema version {} is newer than supported version {}",
                self.schema_version(),
                SCHEMA_VERSION
            ));
        }

        for node in self.nodes() {
            if let Err(e) = node.validate() {
                report.push(format!("ERROR: node '{}': {}", node.id, e));
            }

            let mut seen = HashSet::new();
            for dep in &node.depends_on {
                if !seen.insert(dep.as_str()) {
                    report.push(format!(
                        "WARN: node '{}' lists dependency '{}' more than once",
                        node.id, dep
                    ));
                    continue;
                }
                match self.get(dep) {
                    None => report.push(format!(
                        "ERROR: node '{}' depends on unknown node '{}'",
                        node.id, dep
                    )),
                    Some(target) if node.status == Status::Valid && target.status != Status::Valid => {
                        report.push(format!(
                            "WARN: node '{}' is valid but depends on {} node '{}'",
                            node.id, target.status, dep
                        ))
                    }
                    Some(_) => {}
                }
            }

            if node.node_type == NodeType::DataSource && !node.depends_on.is_empty() {
                report.push(format!(
                    "WARN: data_source node '{}' declares dependencies (expected a leaf)",
                    node.id
                ));
            }
        }

        if let Some(cycle) = self.detect_cycle() {
            report.push(format!("ERROR: cycle detected: {}", cycle.join(" -> ")));
        }

        report
    }

    /// Stale ids, ordered so that every stale node comes after all of its
    /// stale (transitive) dependencies. A safe sequential revalidation order.
    pub fn stale_nodes(&self) -> Vec<&str> {
        self.producers_first(|n| n.status == Status::Stale)
    }

    /// Human-readable overview.
    pub fn summarize(&self) -> String {
        let mut out = format!("DAG: {} nodes, {} edges\n", self.node_count(), self.edge_count());

        for node_type in NodeType::ALL {
            let count = self.nodes_of_type(node_type).count();
            if count > 0 {
                out.push_str(&format!("  {}: {}\n", node_type, count));
            }
        }

        let statuses: Vec<String> = Status::ALL
            .iter()
            .map(|s| format!("{}={}", s, self.nodes().filter(|n| n.status == *s).count()))
            .collect();
        out.push_str(&format!("  status: {}\n", statuses.join(" ")));

        out
    }

    /// Kahn's algorithm over the whole graph. `None` when the graph is cyclic.
    ///
    /// Ties are broken by insertion order, so the result is deterministic.
    pub fn topological_order(&self) -> Option<Vec<&str>> {
        let (order, complete) = self.kahn();
        complete.then_some(order)
    }

    /// Ids matching `keep`, dependencies before dependents.
    ///
    /// Nodes caught in a cycle cannot be ordered; they are appended in
    /// insertion order after everything else.
    pub(crate) fn producers_first<F>(&self, keep: F) -> Vec<&str>
    where
        F: Fn(&Node) -> bool,
    {
        let (order, complete) = self.kahn();
        let mut result: Vec<&str> = order
            .iter()
            .copied()
            .filter(|id| self.get(id).is_some_and(&keep))
            .collect();

        if !complete {
            warn!("graph contains a cycle; ordering of cyclic nodes is arbitrary");
            let placed: HashSet<&str> = order.into_iter().collect();
            result.extend(
                self.nodes()
                    .filter(|n| !placed.contains(n.id.as_str()) && keep(n))
                    .map(|n| n.id.as_str()),
            );
        }

        result
    }

    /// Partial Kahn order plus whether it covers every node.
    fn kahn(&self) -> (Vec<&str>, bool) {
        let reverse = self.dependents_index();
        let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(self.node_count());
        for node in self.nodes() {
            let deps: HashSet<&str> = node
                .depends_on
                .iter()
                .map(String::as_str)
                .filter(|d| self.contains(d))
                .collect();
            in_degree.insert(node.id.as_str(), deps.len());
        }

        let mut queue: VecDeque<&str> = self
            .nodes()
            .map(|n| n.id.as_str())
            .filter(|id| in_degree[id] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.node_count());

        while let Some(current) = queue.pop_front() {
            order.push(current);
            for &child in reverse.get(current).map(Vec::as_slice).unwrap_or_default() {
                if let Some(degree) = in_degree.get_mut(child) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(child);
                    }
                }
            }
        }

        let complete = order.len() == self.node_count();
        (order, complete)
    }

    /// Longest-path distance from any root. Roots have depth 0.
    ///
    /// Empty for a cyclic graph.
    pub fn depths(&self) -> HashMap<&str, usize> {
        let Some(order) = self.topological_order() else {
            return HashMap::new();
        };

        let mut depth: HashMap<&str, usize> = HashMap::with_capacity(order.len());
        for id in order {
            let node_depth = self
                .get(id)
                .map(|n| {
                    n.depends_on
                        .iter()
                        .filter_map(|d| depth.get(d.as_str()))
                        .map(|d| d + 1)
                        .max()
                        .unwrap_or(0)
                })
                .unwrap_or(0);
            depth.insert(id, node_depth);
        }
        depth
    }

    /// Longest dependency chain, root first.
    pub fn critical_path(&self) -> Vec<&str> {
        let depths = self.depths();

        let mut deepest: Option<(&str, usize)> = None;
        for id in self.ids() {
            let Some(&d) = depths.get(id) else { continue };
            if deepest.is_none_or(|(_, best)| d > best) {
                deepest = Some((id, d));
            }
        }
        let Some((mut current, _)) = deepest else {
            return Vec::new();
        };

        let mut path = vec![current];
        while let Some(node) = self.get(current) {
            // First dependency with the highest depth
            let mut best: Option<(&str, usize)> = None;
            for dep in &node.depends_on {
                if let Some(&d) = depths.get(dep.as_str())
                    && best.is_none_or(|(_, b)| d > b)
                {
                    best = Some((dep.as_str(), d));
                }
            }
            match best {
                Some((dep, _)) => {
                    path.push(dep);
                    current = dep;
                }
                None => break,
            }
        }

        path.reverse();
        path
    }

    /// Simulate invalidating `id` without touching any status.
    pub fn impact_analysis(&self, id: &str) -> ImpactReport {
        let closure: HashSet<&str> = self.downstream(id).into_iter().collect();
        let affected: Vec<String> = self
            .producers_first(|n| closure.contains(n.id.as_str()))
            .into_iter()
            .map(String::from)
            .collect();

        let mut by_type = HashMap::new();
        for affected_id in &affected {
            if let Some(node) = self.get(affected_id) {
                *by_type.entry(node.node_type).or_insert(0) += 1;
            }
        }

        ImpactReport {
            source: id.to_string(),
            affected,
            by_type,
        }
    }

    /// Nodes matching `predicate`, plus neighbours up to `depth` hops away in
    /// both directions. Insertion order.
    pub fn subgraph<F>(&self, predicate: F, depth: usize) -> Vec<&str>
    where
        F: Fn(&Node) -> bool,
    {
        let reverse = self.dependents_index();
        let seeds: Vec<&str> = self.nodes().filter(|n| predicate(n)).map(|n| n.id.as_str()).collect();
        let mut included: HashSet<&str> = seeds.iter().copied().collect();

        for upstream in [true, false] {
            let mut frontier: VecDeque<(&str, usize)> = seeds.iter().map(|&s| (s, 0)).collect();
            let mut expanded: HashSet<&str> = HashSet::new();
            while let Some((id, d)) = frontier.pop_front() {
                if d >= depth || !expanded.insert(id) {
                    continue;
                }
                let neighbours: Vec<&str> = if upstream {
                    self.get(id)
                        .map(|n| {
                            n.depends_on
                                .iter()
                                .map(String::as_str)
                                .filter(|dep| self.contains(dep))
                                .collect()
                        })
                        .unwrap_or_default()
                } else {
                    reverse.get(id).cloned().unwrap_or_default()
                };
                for next in neighbours {
                    included.insert(next);
                    frontier.push_back((next, d + 1));
                }
            }
        }

        self.ids().filter(|id| included.contains(id)).collect()
    }

    /// Simple dependency paths from producer `source` to consumer `target`,
    /// shortest first. Stops after `max_paths` paths.
    pub fn find_paths(&self, source: &str, target: &str, max_paths: usize) -> Vec<Vec<&str>> {
        let mut result = Vec::new();
        let Some(start) = self.get(source) else {
            return result;
        };

        let reverse = self.dependents_index();
        let mut path = vec![start.id.as_str()];
        paths_dfs(&reverse, target, &mut path, &mut result, max_paths);
        result.sort_by_key(|p| p.len());
        result
    }
}

fn paths_dfs<'a>(
    reverse: &HashMap<&'a str, Vec<&'a str>>,
    target: &str,
    path: &mut Vec<&'a str>,
    result: &mut Vec<Vec<&'a str>>,
    max_paths: usize,
) {
    if result.len() >= max_paths {
        return;
    }
    let Some(&current) = path.last() else {
        return;
    };
    if current == target {
        result.push(path.clone());
        return;
    }
    for &next in reverse.get(current).map(Vec::as_slice).unwrap_or_default() {
        if !path.contains(&next) {
            path.push(next);
            paths_dfs(reverse, target, path, result, max_paths);
            path.pop();
        }
    }
}
