//! Reachability-based constraint resolution.
//!
//! Each round takes the edges every valid ordering must contain, closes them
//! with a [`MatrixGraph`], and looks for constraints one of whose sides
//! would close a cycle. The other side is then known to hold and its edges
//! move into the precedence graph. All checks of a round read the same frozen
//! closure; promotions are applied afterwards in constraint order.

use alloc::vec::Vec;
use core::hash::Hash;

use tracing::{debug, info};

use super::constraint::{SiConstraint, SiEdge};
use super::precedence::{EdgeKind, PrecedenceGraph};
use super::{AuditOptions, IsolationLevel};
use crate::graph::matrix::MatrixGraph;
use crate::history::TransactionId;

/// Outcome of the pruning loop.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct PruningReport {
    pub rounds: usize,
    pub resolved: usize,
    pub remaining: usize,
}

/// The known edges alone form a cycle; `a -> b` is one of its edges.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KnownCycle {
    pub a: TransactionId,
    pub b: TransactionId,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Promote {
    First,
    Second,
}

/// Node index pairs `(p, q)` of one constraint side: the side would close a
/// cycle iff the closure has `p -> q` for some pair.
type Probe = Vec<(usize, usize)>;

fn probe<Key>(
    edges: &[SiEdge<Key>],
    graph: &PrecedenceGraph<Key>,
    level: IsolationLevel,
) -> Probe {
    let nodes = graph.nodes();
    let mut pairs = Vec::new();
    for edge in edges {
        let (Some(from), Some(to)) = (nodes.index_of(&edge.from), nodes.index_of(&edge.to)) else {
            continue;
        };
        match (edge.kind, level) {
            (EdgeKind::ReadWrite, IsolationLevel::SnapshotIsolation) => {
                // the anti-dependency only orders `from`'s predecessors before `to`
                pairs.extend(
                    graph
                        .predecessors(&edge.from)
                        .filter_map(|p| nodes.index_of(p))
                        .map(|p| (to, p)),
                );
            }
            _ => pairs.push((to, from)),
        }
    }
    pairs
}

fn conflicts(closure: &MatrixGraph<TransactionId>, pairs: &Probe) -> bool {
    pairs.iter().any(|&(p, q)| closure.contains_index(p, q))
}

fn decide(closure: &MatrixGraph<TransactionId>, probes: &(Probe, Probe)) -> Option<Promote> {
    if conflicts(closure, &probes.0) {
        Some(Promote::Second)
    } else if conflicts(closure, &probes.1) {
        Some(Promote::First)
    } else {
        None
    }
}

#[cfg(feature = "parallel")]
fn decide_all(closure: &MatrixGraph<TransactionId>, probes: &[(Probe, Probe)]) -> Vec<Option<Promote>> {
    use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
    probes.par_iter().map(|p| decide(closure, p)).collect()
}

#[cfg(not(feature = "parallel"))]
fn decide_all(closure: &MatrixGraph<TransactionId>, probes: &[(Probe, Probe)]) -> Vec<Option<Promote>> {
    probes.iter().map(|p| decide(closure, p)).collect()
}

fn promote<Key>(graph: &mut PrecedenceGraph<Key>, edges: &[SiEdge<Key>])
where
    Key: Ord + Hash + Clone,
{
    for edge in edges {
        graph.add_edge(edge.from, edge.to, edge.label());
    }
}

/// One round: returns how many constraints were resolved.
fn prune_round<Key>(
    graph: &mut PrecedenceGraph<Key>,
    constraints: &mut Vec<SiConstraint<Key>>,
    options: &AuditOptions,
) -> Result<usize, KnownCycle>
where
    Key: Ord + Hash + Clone,
{
    let known = graph.known_graph(options.level, options.reachability);
    let reduced = known.reduce_by_session(TransactionId::position);
    let closure = reduced.reachability(options.reachability);

    if closure.has_cycle() {
        let (a, b) = known.cycle_edge(&closure).unwrap_or_else(|| {
            let node = closure.cyclic_nodes().next().unwrap_or_default();
            let id = *closure.nodes().node(node);
            (id, id)
        });
        return Err(KnownCycle { a, b });
    }

    let probes: Vec<(Probe, Probe)> = constraints
        .iter()
        .map(|c| {
            (
                probe(&c.edges1, graph, options.level),
                probe(&c.edges2, graph, options.level),
            )
        })
        .collect();
    let decisions = decide_all(&closure, &probes);

    let mut resolved = 0;
    for (constraint, decision) in constraints.iter().zip(&decisions) {
        match decision {
            Some(Promote::First) => promote(graph, &constraint.edges1),
            Some(Promote::Second) => promote(graph, &constraint.edges2),
            None => continue,
        }
        resolved += 1;
    }

    let mut decisions = decisions.into_iter();
    constraints.retain(|_| decisions.next().flatten().is_none());

    debug!(
        resolved,
        remaining = constraints.len(),
        known_edges = known.edge_count(),
        reduced_edges = reduced.edge_count(),
        "pruning round"
    );
    Ok(resolved)
}

/// Resolves constraints by reachability until a fixpoint or the round budget
/// of `options` is reached. Resolved constraints are removed from
/// `constraints` and their surviving side is added to `graph`.
///
/// # Errors
///
/// Returns [`KnownCycle`] as soon as the known edges form a cycle through a
/// non-session-order edge.
pub fn prune_constraints<Key>(
    graph: &mut PrecedenceGraph<Key>,
    constraints: &mut Vec<SiConstraint<Key>>,
    options: &AuditOptions,
) -> Result<PruningReport, KnownCycle>
where
    Key: Ord + Hash + Clone,
{
    let mut report = PruningReport::default();
    while report.rounds < options.max_pruning_rounds {
        report.rounds += 1;
        let resolved = prune_round(graph, constraints, options)?;
        report.resolved += resolved;
        if resolved == 0 {
            break;
        }
    }
    report.remaining = constraints.len();

    info!(
        rounds = report.rounds,
        resolved = report.resolved,
        remaining = report.remaining,
        graph_a = graph.edge_count_a(),
        graph_b = graph.edge_count_b(),
        "pruning finished"
    );
    Ok(report)
}
