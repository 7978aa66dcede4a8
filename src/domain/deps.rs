//! Dependency graph analysis.
//!
//! Read-only view over a loaded document: blocking relationships,
//! cycle detection, critical path, and next-task selection. Cycles are
//! reported, never auto-resolved; the engine keeps functioning with a
//! cyclic graph present. Dangling references (ids with no matching
//! task) are reported and skipped during traversal.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::entities::{Task, TaskDocument, TaskStatus};
use crate::errors::{EngineError, EngineResult};

/// A dependency reference with no matching task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DanglingRef {
    #[serde(rename = "taskId")]
    pub task_id: u64,
    #[serde(rename = "depId")]
    pub dep_id: u64,
}

/// Combined dependency report for `getDependencyAnalysis`
#[derive(Debug, Clone, Serialize)]
pub struct DependencyAnalysis {
    /// Every distinct cycle, as an ordered id list
    pub cycles: Vec<Vec<u64>>,

    /// Dependency ids with no matching task
    pub dangling: Vec<DanglingRef>,

    /// Unmet dependency ids per non-done task
    pub blocking: BTreeMap<u64, Vec<u64>>,

    /// Longest chain of non-done tasks, in execution order
    #[serde(rename = "criticalPath")]
    pub critical_path: Vec<u64>,
}

/// Read-only dependency analyzer over a document
pub struct DependencyAnalyzer<'a> {
    doc: &'a TaskDocument,
}

impl<'a> DependencyAnalyzer<'a> {
    pub fn new(doc: &'a TaskDocument) -> Self {
        Self { doc }
    }

    /// Dependency ids of `task_id` that are not yet done. Dangling
    /// references count as blocking: an unresolvable prerequisite is
    /// not a met one.
    pub fn blocked_by(&self, task_id: u64) -> EngineResult<Vec<u64>> {
        let task = self.require(task_id)?;
        let done = self.doc.done_ids();
        Ok(task.unmet_deps(&done))
    }

    /// Ids of tasks listing `task_id` in their dependency set
    pub fn blocks(&self, task_id: u64) -> Vec<u64> {
        self.doc
            .tasks
            .iter()
            .filter(|t| t.depends_on.contains(&task_id))
            .map(|t| t.id)
            .collect()
    }

    /// True iff the task is `todo` with no unmet dependencies
    pub fn is_ready(&self, task_id: u64) -> EngineResult<bool> {
        let task = self.require(task_id)?;
        Ok(task.status == TaskStatus::Todo && self.blocked_by(task_id)?.is_empty())
    }

    /// Find every distinct cycle in the dependency digraph. Dangling
    /// ids are not traversed into, so the walk terminates even on
    /// malformed graphs.
    pub fn detect_cycles(&self) -> Vec<Vec<u64>> {
        let graph = self.graph();

        let mut cycles: Vec<Vec<u64>> = Vec::new();
        let mut seen: HashSet<Vec<u64>> = HashSet::new();
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();

        for task in &self.doc.tasks {
            if !visited.contains(&task.id) {
                let mut path = Vec::new();
                Self::dfs_cycle(
                    &graph,
                    task.id,
                    &mut visited,
                    &mut rec_stack,
                    &mut path,
                    &mut seen,
                    &mut cycles,
                );
            }
        }

        cycles
    }

    fn dfs_cycle(
        graph: &HashMap<u64, Vec<u64>>,
        node: u64,
        visited: &mut HashSet<u64>,
        rec_stack: &mut HashSet<u64>,
        path: &mut Vec<u64>,
        seen: &mut HashSet<Vec<u64>>,
        cycles: &mut Vec<Vec<u64>>,
    ) {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        if let Some(deps) = graph.get(&node) {
            for &dep in deps {
                if !graph.contains_key(&dep) {
                    // dangling reference, reported elsewhere
                    continue;
                }
                if !visited.contains(&dep) {
                    Self::dfs_cycle(graph, dep, visited, rec_stack, path, seen, cycles);
                } else if rec_stack.contains(&dep) {
                    // dep is on the stack, so it is somewhere in path
                    if let Some(start) = path.iter().position(|&n| n == dep) {
                        let cycle: Vec<u64> = path[start..].to_vec();
                        if seen.insert(normalize_cycle(&cycle)) {
                            cycles.push(cycle);
                        }
                    }
                }
            }
        }

        path.pop();
        rec_stack.remove(&node);
    }

    /// Dependency references that resolve to no task
    pub fn dangling_refs(&self) -> Vec<DanglingRef> {
        let ids: HashSet<u64> = self.doc.tasks.iter().map(|t| t.id).collect();
        let mut dangling = Vec::new();
        for task in &self.doc.tasks {
            for &dep in &task.depends_on {
                if !ids.contains(&dep) {
                    dangling.push(DanglingRef {
                        task_id: task.id,
                        dep_id: dep,
                    });
                }
            }
        }
        dangling
    }

    /// Longest chain of non-done tasks connected by dependency edges,
    /// in execution order (deepest prerequisite first). Ties prefer the
    /// chain with the lowest id at the divergence point.
    pub fn critical_path(&self) -> Vec<u64> {
        let graph = self.graph();
        let open: HashSet<u64> = self
            .doc
            .tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Done)
            .map(|t| t.id)
            .collect();

        let mut memo: HashMap<u64, Vec<u64>> = HashMap::new();
        let mut best: Vec<u64> = Vec::new();

        let mut ids: Vec<u64> = open.iter().copied().collect();
        ids.sort_unstable();
        for id in ids {
            let mut visiting = HashSet::new();
            let chain = Self::chain_ending_at(id, &graph, &open, &mut memo, &mut visiting);
            if prefer(&chain, &best) {
                best = chain;
            }
        }
        best
    }

    /// Longest open chain ending at `node` (node's prerequisites first).
    /// Nodes already on the current walk are skipped so cyclic graphs
    /// still terminate.
    fn chain_ending_at(
        node: u64,
        graph: &HashMap<u64, Vec<u64>>,
        open: &HashSet<u64>,
        memo: &mut HashMap<u64, Vec<u64>>,
        visiting: &mut HashSet<u64>,
    ) -> Vec<u64> {
        if let Some(chain) = memo.get(&node) {
            return chain.clone();
        }
        if !visiting.insert(node) {
            return Vec::new();
        }

        let mut best_prefix: Vec<u64> = Vec::new();
        if let Some(deps) = graph.get(&node) {
            for &dep in deps {
                if !open.contains(&dep) || !graph.contains_key(&dep) {
                    continue;
                }
                let prefix = Self::chain_ending_at(dep, graph, open, memo, visiting);
                if prefer(&prefix, &best_prefix) {
                    best_prefix = prefix;
                }
            }
        }

        visiting.remove(&node);
        let mut chain = best_prefix;
        chain.push(node);
        memo.insert(node, chain.clone());
        chain
    }

    /// Among ready `todo` tasks, the one with the highest priority;
    /// ties break toward the lowest id. `None` means no actionable
    /// task, a valid terminal result rather than a failure.
    pub fn next_task(&self) -> Option<&Task> {
        let done = self.doc.done_ids();
        self.doc
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Todo && t.unmet_deps(&done).is_empty())
            .min_by(|a, b| b.priority.cmp(&a.priority).then(a.id.cmp(&b.id)))
    }

    /// Full dependency report: cycles, dangling references, blocking
    /// map for open tasks, and the critical path
    pub fn analyze(&self) -> DependencyAnalysis {
        let done = self.doc.done_ids();
        let blocking: BTreeMap<u64, Vec<u64>> = self
            .doc
            .tasks
            .iter()
            .filter(|t| t.status != TaskStatus::Done)
            .map(|t| (t.id, t.unmet_deps(&done)))
            .filter(|(_, unmet)| !unmet.is_empty())
            .collect();

        DependencyAnalysis {
            cycles: self.detect_cycles(),
            dangling: self.dangling_refs(),
            blocking,
            critical_path: self.critical_path(),
        }
    }

    fn graph(&self) -> HashMap<u64, Vec<u64>> {
        self.doc
            .tasks
            .iter()
            .map(|t| (t.id, t.depends_on.clone()))
            .collect()
    }

    fn require(&self, task_id: u64) -> EngineResult<&Task> {
        self.doc
            .get_task(task_id)
            .ok_or_else(|| EngineError::TaskNotFound {
                id: task_id.to_string(),
            })
    }
}

/// Longer chains win; equal lengths prefer the lexicographically
/// smaller id sequence (lowest id at the first divergence point).
fn prefer(candidate: &[u64], current: &[u64]) -> bool {
    match candidate.len().cmp(&current.len()) {
        std::cmp::Ordering::Greater => true,
        std::cmp::Ordering::Less => false,
        std::cmp::Ordering::Equal => !candidate.is_empty() && candidate < current,
    }
}

/// Rotate a cycle so its smallest id comes first, giving every
/// traversal order of the same cycle one canonical form.
fn normalize_cycle(cycle: &[u64]) -> Vec<u64> {
    if cycle.is_empty() {
        return Vec::new();
    }
    let min_pos = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, &id)| id)
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut rotated = Vec::with_capacity(cycle.len());
    rotated.extend_from_slice(&cycle[min_pos..]);
    rotated.extend_from_slice(&cycle[..min_pos]);
    rotated
}
