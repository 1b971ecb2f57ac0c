//! Petgraph-based compilation of playbook definitions
//!
//! Turns the ordered action list into an explicit successor table, rejects
//! dangling branch targets and cycles, and precomputes fork/join plans for
//! parallel definitions. The execution engine only ever walks a
//! `CompiledWorkflow`, never the raw definition.

use crate::error::EngineError;
use crate::runtime::expression::Condition;
use crate::workflow::types::{branch_target, WorkflowAction, WorkflowDefinition};
use petgraph::algo::{is_cyclic_directed, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Where the walk goes after an action completes
#[derive(Debug, Clone, PartialEq)]
pub enum Successors {
    /// Terminal: the walk (or branch) ends here
    End,
    Single(String),
    /// Decided at runtime by the action's condition; `None` ends the walk
    Branch {
        on_true: Option<String>,
        on_false: Option<String>,
    },
    /// Concurrent sibling branches (parallel definitions only)
    Fork(Vec<String>),
}

/// Precomputed convergence data for a fork node
#[derive(Debug, Clone)]
pub struct ForkPlan {
    pub branches: Vec<String>,
    /// Earliest node every branch feeds into
    pub join: Option<String>,
    /// The join and everything reachable from it; branch walks stop here
    pub boundary: HashSet<String>,
}

/// Validated, execution-ready playbook
#[derive(Debug, Clone)]
pub struct CompiledWorkflow {
    pub definition: Arc<WorkflowDefinition>,
    entry: String,
    positions: HashMap<String, usize>,
    successors: HashMap<String, Successors>,
    forks: HashMap<String, ForkPlan>,
    /// Parsed branch conditions keyed by action id
    conditions: HashMap<String, Condition>,
    reachable: usize,
}

impl CompiledWorkflow {
    /// Validate a definition and build its successor table
    pub fn compile(definition: WorkflowDefinition) -> Result<Self, EngineError> {
        tracing::debug!("🏗️ Compiling workflow '{}' v{} ({} actions)",
            definition.id, definition.version, definition.actions.len());

        if definition.actions.is_empty() {
            return Err(invalid(&definition, "workflow has no actions"));
        }

        let mut positions = HashMap::new();
        for (pos, action) in definition.actions.iter().enumerate() {
            if positions.insert(action.action_id.clone(), pos).is_some() {
                return Err(invalid(&definition, format!("duplicate action id '{}'", action.action_id)));
            }
        }

        let entry = resolve_entry(&definition)?;

        let mut successors = HashMap::new();
        let mut conditions = HashMap::new();
        for (pos, action) in definition.actions.iter().enumerate() {
            if let Some(logic) = action.branching() {
                let condition = Condition::parse(&logic.condition).map_err(|e| invalid(&definition, format!(
                    "action '{}' has an unparseable condition: {}", action.action_id, e
                )))?;
                conditions.insert(action.action_id.clone(), condition);
            }
            let next = derive_successors(&definition, pos, action)?;
            for target in successor_ids(&next) {
                if !positions.contains_key(target) {
                    return Err(invalid(&definition, format!(
                        "action '{}' references unknown action '{}'", action.action_id, target
                    )));
                }
            }
            successors.insert(action.action_id.clone(), next);
        }

        // Build the petgraph DiGraph with every possible edge
        let mut graph: DiGraph<String, ()> = DiGraph::new();
        let mut node_index: HashMap<String, NodeIndex> = HashMap::new();
        for action in &definition.actions {
            node_index.insert(action.action_id.clone(), graph.add_node(action.action_id.clone()));
        }
        for (from, next) in &successors {
            for to in successor_ids(next) {
                graph.add_edge(node_index[from], node_index[to], ());
            }
        }

        if is_cyclic_directed(&graph) {
            tracing::error!("❌ Workflow '{}' contains a cycle", definition.id);
            return Err(invalid(&definition, "action graph contains a cycle"));
        }

        let reachable = reachable_from(&graph, node_index[&entry], &HashSet::new());
        if reachable.len() < definition.actions.len() {
            let unreachable: Vec<&str> = definition.actions.iter()
                .filter(|a| !reachable.contains(&node_index[&a.action_id]))
                .map(|a| a.action_id.as_str())
                .collect();
            tracing::warn!("⚠️ Workflow '{}' has unreachable actions: {:?}", definition.id, unreachable);
        }

        let topo = toposort(&graph, None)
            .map_err(|_| invalid(&definition, "action graph contains a cycle"))?;
        let topo_rank: HashMap<NodeIndex, usize> =
            topo.iter().enumerate().map(|(rank, idx)| (*idx, rank)).collect();

        let mut forks = HashMap::new();
        for (fork_id, next) in &successors {
            if let Successors::Fork(branches) = next {
                let plan = plan_fork(&definition, &graph, &node_index, &topo_rank, fork_id, branches)?;
                forks.insert(fork_id.clone(), plan);
            }
        }

        tracing::debug!("✅ Workflow '{}' compiled: entry '{}', {} reachable, {} forks",
            definition.id, entry, reachable.len(), forks.len());

        Ok(Self {
            definition: Arc::new(definition),
            entry,
            positions,
            successors,
            forks,
            conditions,
            reachable: reachable.len(),
        })
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn action(&self, action_id: &str) -> Option<&WorkflowAction> {
        self.positions.get(action_id).map(|pos| &self.definition.actions[*pos])
    }

    pub fn successors(&self, action_id: &str) -> &Successors {
        self.successors.get(action_id).unwrap_or(&Successors::End)
    }

    pub fn fork(&self, action_id: &str) -> Option<&ForkPlan> {
        self.forks.get(action_id)
    }

    pub fn condition(&self, action_id: &str) -> Option<&Condition> {
        self.conditions.get(action_id)
    }

    /// Number of actions reachable from the entry over any edge
    pub fn reachable_count(&self) -> usize {
        self.reachable
    }
}

fn invalid(definition: &WorkflowDefinition, reason: impl Into<String>) -> EngineError {
    EngineError::InvalidDefinition(format!("{}: {}", definition.id, reason.into()))
}

/// Explicit start marker first, then `order == 1`; exactly one candidate allowed
fn resolve_entry(definition: &WorkflowDefinition) -> Result<String, EngineError> {
    let marked: Vec<&WorkflowAction> = definition.actions.iter().filter(|a| a.start).collect();
    let candidates = if marked.is_empty() {
        definition.actions.iter().filter(|a| a.order == 1).collect()
    } else {
        marked
    };
    match candidates.as_slice() {
        [only] => Ok(only.action_id.clone()),
        [] => Err(invalid(definition, "no entry action (order 1 or start marker)")),
        _ => Err(invalid(definition, format!("{} competing entry actions", candidates.len()))),
    }
}

fn derive_successors(
    definition: &WorkflowDefinition,
    pos: usize,
    action: &WorkflowAction,
) -> Result<Successors, EngineError> {
    if let Some(logic) = action.branching() {
        return Ok(Successors::Branch {
            on_true: branch_target(&logic.on_true).map(str::to_string),
            on_false: branch_target(&logic.on_false).map(str::to_string),
        });
    }

    if !action.next.is_empty() {
        return match action.next.len() {
            1 => Ok(Successors::Single(action.next[0].clone())),
            _ if definition.parallel_execution => Ok(Successors::Fork(action.next.clone())),
            n => Err(invalid(definition, format!(
                "action '{}' lists {} successors but parallel execution is disabled",
                action.action_id, n
            ))),
        };
    }

    if definition.parallel_execution {
        let next_order = definition.actions.iter()
            .map(|a| a.order)
            .filter(|order| *order > action.order)
            .min();
        let Some(next_order) = next_order else {
            return Ok(Successors::End);
        };
        let group: Vec<String> = definition.actions.iter()
            .filter(|a| a.order == next_order)
            .map(|a| a.action_id.clone())
            .collect();
        return Ok(match group.len() {
            1 => Successors::Single(group[0].clone()),
            _ => Successors::Fork(group),
        });
    }

    // Sequential: next in (order, declaration position)
    let mut sequence: Vec<(u32, usize)> = definition.actions.iter()
        .enumerate()
        .map(|(p, a)| (a.order, p))
        .collect();
    sequence.sort_unstable();
    let here = sequence.iter().position(|&(_, p)| p == pos).unwrap_or(sequence.len());
    Ok(match sequence.get(here + 1) {
        Some(&(_, p)) => Successors::Single(definition.actions[p].action_id.clone()),
        None => Successors::End,
    })
}

fn successor_ids(next: &Successors) -> Vec<&str> {
    match next {
        Successors::End => Vec::new(),
        Successors::Single(id) => vec![id.as_str()],
        Successors::Branch { on_true, on_false } => {
            on_true.iter().chain(on_false.iter()).map(String::as_str).collect()
        }
        Successors::Fork(ids) => ids.iter().map(String::as_str).collect(),
    }
}

/// BFS over outgoing edges, never entering `stop`
fn reachable_from(
    graph: &DiGraph<String, ()>,
    start: NodeIndex,
    stop: &HashSet<NodeIndex>,
) -> HashSet<NodeIndex> {
    let mut reachable = HashSet::new();
    if stop.contains(&start) {
        return reachable;
    }
    let mut queue = VecDeque::new();
    reachable.insert(start);
    queue.push_back(start);

    while let Some(current) = queue.pop_front() {
        for target in graph.neighbors(current) {
            if !stop.contains(&target) && reachable.insert(target) {
                queue.push_back(target);
            }
        }
    }
    reachable
}

fn plan_fork(
    definition: &WorkflowDefinition,
    graph: &DiGraph<String, ()>,
    node_index: &HashMap<String, NodeIndex>,
    topo_rank: &HashMap<NodeIndex, usize>,
    fork_id: &str,
    branches: &[String],
) -> Result<ForkPlan, EngineError> {
    let no_stop = HashSet::new();
    let per_branch: Vec<HashSet<NodeIndex>> = branches.iter()
        .map(|b| reachable_from(graph, node_index[b], &no_stop))
        .collect();

    let mut common = per_branch[0].clone();
    for set in &per_branch[1..] {
        common.retain(|idx| set.contains(idx));
    }

    let join = common.iter().min_by_key(|idx| topo_rank[*idx]).copied();
    let boundary_idx = match join {
        Some(j) => reachable_from(graph, j, &no_stop),
        None => HashSet::new(),
    };

    if let Some(stray) = common.iter().find(|idx| !boundary_idx.contains(*idx)) {
        return Err(invalid(definition, format!(
            "branches of fork '{}' converge on '{}' outside their join",
            fork_id, graph[*stray]
        )));
    }

    // Suspension is only supported on the main walk
    for branch in branches {
        let region = reachable_from(graph, node_index[branch], &boundary_idx);
        for idx in region {
            let action_id = &graph[idx];
            if definition.action(action_id).is_some_and(|a| a.approval_required) {
                return Err(invalid(definition, format!(
                    "approval gate '{}' sits inside parallel branch of '{}'", action_id, fork_id
                )));
            }
        }
    }

    Ok(ForkPlan {
        branches: branches.to_vec(),
        join: join.map(|j| graph[j].clone()),
        boundary: boundary_idx.into_iter().map(|idx| graph[idx].clone()).collect(),
    })
}
