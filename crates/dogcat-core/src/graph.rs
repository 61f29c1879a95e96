//! Dependency graph analysis, operating purely on in-memory issues/deps.
//!
//! Unlike the beads-viewer shape this is built fresh from the store's
//! separate dependency records on each call, rather than cached on `Issue`.

use crate::dependency::{Dependency, DependencyType};
use crate::issue::Issue;
use petgraph::algo::is_cyclic_directed;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

/// A graph restricted to `blocks` edges among non-terminal issues, the
/// subgraph invariant 3 requires to stay acyclic.
pub struct BlocksGraph {
    graph: DiGraph<String, ()>,
    node_map: HashMap<String, NodeIndex>,
}

impl BlocksGraph {
    pub fn build(issues: &HashMap<String, Issue>, deps: &[Dependency]) -> Self {
        let mut graph = DiGraph::new();
        let mut node_map = HashMap::new();

        for (id, issue) in issues {
            if issue.status.is_open() {
                let idx = graph.add_node(id.clone());
                node_map.insert(id.clone(), idx);
            }
        }

        for dep in deps {
            if dep.dep_type != DependencyType::Blocks {
                continue;
            }
            if let (Some(&from), Some(&to)) = (node_map.get(&dep.issue_id), node_map.get(&dep.depends_on_id)) {
                graph.add_edge(from, to, ());
            }
        }

        Self { graph, node_map }
    }

    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.graph)
    }

    /// Whether adding `a -> b` (a depends on b, blocks) would close a cycle:
    /// true if `b` can already reach `a` through existing blocks edges, or
    /// if `a == b` (self-edge).
    pub fn would_create_cycle(&self, a: &str, b: &str) -> bool {
        if a == b {
            return true;
        }
        let Some(&start) = self.node_map.get(b) else {
            return false;
        };
        let Some(&target) = self.node_map.get(a) else {
            return false;
        };

        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(node) = queue.pop_front() {
            if node == target {
                return true;
            }
            if !seen.insert(node) {
                continue;
            }
            for next in self.graph.neighbors(node) {
                queue.push_back(next);
            }
        }
        false
    }
}

/// Open/in_progress issues with every `blocks` dependency satisfied
/// (blocker closed or tombstoned), sorted by `(priority asc, id asc)`.
pub fn get_ready_work(issues: &HashMap<String, Issue>, deps: &[Dependency]) -> Vec<&Issue> {
    let mut blockers: HashMap<&str, Vec<&str>> = HashMap::new();
    for dep in deps {
        if dep.dep_type == DependencyType::Blocks && !dep.is_removal() {
            blockers.entry(&dep.issue_id).or_default().push(&dep.depends_on_id);
        }
    }

    let mut ready: Vec<&Issue> = issues
        .values()
        .filter(|issue| {
            matches!(issue.status, crate::issue::Status::Open | crate::issue::Status::InProgress)
                && blockers
                    .get(issue.full_id().as_str())
                    .map(|blocked_by| {
                        blocked_by
                            .iter()
                            .all(|id| issues.get(*id).map(|b| b.status.is_terminal()).unwrap_or(true))
                    })
                    .unwrap_or(true)
        })
        .collect();

    ready.sort_by(|a, b| a.priority.cmp(&b.priority).then_with(|| a.full_id().cmp(&b.full_id())));
    ready
}

/// Every non-closed issue paired with its non-closed blockers.
pub fn get_blocked_issues<'a>(
    issues: &'a HashMap<String, Issue>,
    deps: &[Dependency],
) -> Vec<(&'a Issue, Vec<&'a Issue>)> {
    let mut blockers: HashMap<&str, Vec<&str>> = HashMap::new();
    for dep in deps {
        if dep.dep_type == DependencyType::Blocks && !dep.is_removal() {
            blockers.entry(&dep.issue_id).or_default().push(&dep.depends_on_id);
        }
    }

    issues
        .values()
        .filter(|issue| issue.status.is_open())
        .filter_map(|issue| {
            let open_blockers: Vec<&Issue> = blockers
                .get(issue.full_id().as_str())?
                .iter()
                .filter_map(|id| issues.get(*id))
                .filter(|b| b.status.is_open())
                .collect();
            if open_blockers.is_empty() {
                None
            } else {
                Some((issue, open_blockers))
            }
        })
        .collect()
}

/// Breadth-first traversal of `blocks` edges starting from `id`.
pub fn get_dependency_chain(issues: &HashMap<String, Issue>, deps: &[Dependency], id: &str) -> Vec<String> {
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();
    for dep in deps {
        if dep.dep_type == DependencyType::Blocks && !dep.is_removal() {
            adjacency.entry(&dep.issue_id).or_default().push(&dep.depends_on_id);
        }
    }

    let mut seen = HashSet::new();
    let mut order = Vec::new();
    let mut queue = VecDeque::from([id.to_string()]);
    seen.insert(id.to_string());

    while let Some(current) = queue.pop_front() {
        if let Some(next_ids) = adjacency.get(current.as_str()) {
            for next in next_ids {
                if seen.insert(next.to_string()) {
                    order.push(next.to_string());
                    queue.push_back(next.to_string());
                }
            }
        }
    }

    let _ = issues;
    order
}

/// Linear scan of issues whose `parent` equals `parent_id`.
pub fn get_children<'a>(issues: &'a HashMap<String, Issue>, parent_id: &str) -> Vec<&'a Issue> {
    issues
        .values()
        .filter(|issue| issue.parent.as_deref() == Some(parent_id))
        .collect()
}
