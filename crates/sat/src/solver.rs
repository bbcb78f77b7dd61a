//! Boolean encoding of the open ordering choices.
//!
//! Every ordered pair of graph A and graph B gets one literal, passed to the
//! engine as an assumption. Every constraint gets an assumption literal `c`,
//! a direction literal `d`, and one literal per edge of each side:
//!
//! ```text
//! c -> (d and all(edges1) and none(edges2)) or (!d and all(edges2) and none(edges1))
//! ```
//!
//! Acyclicity of the final graph is added lazily. After each satisfying
//! assignment the final graph of the model is built (A edges, plus A-then-B
//! compositions under snapshot isolation or B edges under serializability);
//! if it has a cycle, a clause forbidding the conjunction of that cycle's
//! edge literals is added and the engine runs again.
//!
//! Forcing the unchosen side's edges off is sound: each of them closes a
//! cycle with the chosen side's write-write edge, so no acyclic model keeps
//! both.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Display;
use std::hash::Hash;
use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use polysi_core::consistency::{
    ConflictEdge, Conflicts, EdgeKind, IsolationLevel, PrecedenceGraph, SiConstraint, Witness,
};
use polysi_core::graph::{DiGraph, MatrixGraph, NodeSet};
use polysi_core::{AuditOptions, TransactionId};
use rustsat::solvers::{Solve, SolveIncremental, SolverResult};
use rustsat::types::{Lit, TernaryVal};
use rustsat_batsat::BasicSolver;
use tracing::{debug, info};

/// Failure of the satisfiability engine, already rendered.
pub type OracleResult<T> = Result<T, String>;

fn oracle<E: Display>(err: E) -> String {
    err.to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Graph {
    A,
    B,
}

#[derive(Debug, Clone, Copy)]
struct KnownEdge {
    graph: Graph,
    from: TransactionId,
    to: TransactionId,
}

/// Model edges with the literals making them true.
type Reasons = HashMap<(usize, usize), Vec<Lit>>;

/// Outgoing `(target, literal)` lists of the pairs true in the model.
type Active = Vec<Vec<(usize, Lit)>>;

pub struct SiSolver<'g, Key> {
    graph: &'g PrecedenceGraph<Key>,
    level: IsolationLevel,
    nodes: Arc<NodeSet<TransactionId>>,
    engine: BasicSolver,
    next_var: u32,
    edges_a: BTreeMap<(usize, usize), Vec<Lit>>,
    edges_b: BTreeMap<(usize, usize), Vec<Lit>>,
    known: BTreeMap<Lit, KnownEdge>,
    constraints: Vec<SiConstraint<Key>>,
    constraint_lits: BTreeMap<Lit, usize>,
    /// reduced known edges standing in for the whole known closure
    shortcuts: Vec<(usize, usize, Vec<Lit>)>,
    closure: MatrixGraph<TransactionId>,
    blocked: usize,
}

impl<'g, Key> SiSolver<'g, Key>
where
    Key: Ord + Hash + Clone,
{
    /// Encodes the known edges of `graph` and the open `constraints`.
    ///
    /// # Errors
    ///
    /// Fails if the engine rejects a clause.
    pub fn new(
        graph: &'g PrecedenceGraph<Key>,
        constraints: Vec<SiConstraint<Key>>,
        options: &AuditOptions,
    ) -> OracleResult<Self> {
        let known_graph = graph.known_graph(options.level, options.reachability);
        let reduced = known_graph.reduce_by_session(TransactionId::position);
        let closure = reduced.reachability(options.reachability);

        let mut solver = Self {
            graph,
            level: options.level,
            nodes: Arc::clone(graph.nodes()),
            engine: BasicSolver::default(),
            next_var: 0,
            edges_a: BTreeMap::new(),
            edges_b: BTreeMap::new(),
            known: BTreeMap::new(),
            constraints: Vec::new(),
            constraint_lits: BTreeMap::new(),
            shortcuts: Vec::new(),
            closure,
            blocked: 0,
        };

        let mut known_a: HashMap<(usize, usize), Lit> = HashMap::new();
        let mut known_b: HashMap<(usize, usize), Lit> = HashMap::new();
        let edges_a: Vec<_> = graph.known_a().map(|(from, to, _)| (from, to)).collect();
        let edges_b: Vec<_> = graph.known_b().map(|(from, to, _)| (from, to)).collect();
        for (side, from, to) in edges_a
            .into_iter()
            .map(|(from, to)| (Graph::A, from, to))
            .chain(edges_b.into_iter().map(|(from, to)| (Graph::B, from, to)))
        {
            let Some(pair) = solver.pair(from, to) else {
                continue;
            };
            let lit = solver.fresh();
            solver.known.insert(lit, KnownEdge { graph: side, from, to });
            let (edges, known) = match side {
                Graph::A => (&mut solver.edges_a, &mut known_a),
                Graph::B => (&mut solver.edges_b, &mut known_b),
            };
            edges.entry(pair).or_default().push(lit);
            known.insert(pair, lit);
        }

        let mut known_out: Vec<Vec<(usize, Lit)>> = vec![Vec::new(); solver.nodes.len()];
        for (&(from, to), &lit) in &known_a {
            known_out[from].push((to, lit));
        }
        let level = options.level;
        solver.shortcuts = reduced
            .edges()
            .filter_map(|(from, to, _)| {
                if let Some(&a) = known_a.get(&(from, to)) {
                    return Some((from, to, vec![a]));
                }
                match level {
                    IsolationLevel::Serializable => known_b.get(&(from, to)).map(|&b| (from, to, vec![b])),
                    IsolationLevel::SnapshotIsolation => known_out[from].iter().find_map(|&(middle, a)| {
                        known_b.get(&(middle, to)).map(|&b| (from, to, vec![a, b]))
                    }),
                }
            })
            .collect();

        for constraint in constraints {
            solver.add_constraint(constraint)?;
        }

        debug!(
            literals = solver.next_var,
            known = solver.known.len(),
            constraints = solver.constraints.len(),
            shortcuts = solver.shortcuts.len(),
            "encoded solver instance"
        );
        Ok(solver)
    }

    fn fresh(&mut self) -> Lit {
        let lit = Lit::positive(self.next_var);
        self.next_var += 1;
        lit
    }

    fn pair(&self, from: TransactionId, to: TransactionId) -> Option<(usize, usize)> {
        Some((self.nodes.index_of(&from)?, self.nodes.index_of(&to)?))
    }

    fn clause<I: IntoIterator<Item = Lit>>(&mut self, lits: I) -> OracleResult<()> {
        self.engine
            .add_clause(lits.into_iter().collect())
            .map_err(oracle)
    }

    fn add_constraint(&mut self, constraint: SiConstraint<Key>) -> OracleResult<()> {
        let active = self.fresh();
        let direction = self.fresh();

        for (edges, chosen) in [(&constraint.edges1, direction), (&constraint.edges2, !direction)] {
            for edge in edges {
                let Some(pair) = self.pair(edge.from, edge.to) else {
                    continue;
                };
                let lit = self.fresh();
                if edge.kind == EdgeKind::ReadWrite {
                    self.edges_b.entry(pair).or_default().push(lit);
                } else {
                    self.edges_a.entry(pair).or_default().push(lit);
                }
                // side chosen: edge present; side not chosen: edge absent
                self.clause([!active, !chosen, lit])?;
                self.clause([!active, chosen, !lit])?;
            }
        }

        self.constraint_lits.insert(active, self.constraints.len());
        self.constraints.push(constraint);
        Ok(())
    }

    fn is_true(&self, lit: Lit) -> OracleResult<bool> {
        Ok(matches!(
            self.engine.lit_val(lit).map_err(oracle)?,
            TernaryVal::True
        ))
    }

    fn active(&self, pairs: &BTreeMap<(usize, usize), Vec<Lit>>) -> OracleResult<Active> {
        let mut active = vec![Vec::new(); self.nodes.len()];
        for (&(from, to), lits) in pairs {
            for &lit in lits {
                if self.is_true(lit)? {
                    active[from].push((to, lit));
                    break;
                }
            }
        }
        Ok(active)
    }

    /// Final graph of the current model.
    ///
    /// With `shortcuts`, edges already implied by the known closure are
    /// replaced by the reduced known edges; cycles are preserved as long as
    /// every known literal is assumed.
    fn model_graph(&self, shortcuts: bool) -> OracleResult<(DiGraph<usize>, Reasons)> {
        let mut graph = DiGraph::default();
        let mut reasons = Reasons::new();
        for node in 0..self.nodes.len() {
            graph.add_vertex(node);
        }

        if shortcuts {
            for (from, to, lits) in &self.shortcuts {
                if graph.add_edge(*from, *to) {
                    reasons.insert((*from, *to), lits.clone());
                }
            }
        }
        let mut add = |from: usize, to: usize, lits: &[Lit]| {
            if shortcuts && from != to && self.closure.contains_index(from, to) {
                return;
            }
            if graph.add_edge(from, to) {
                reasons.insert((from, to), lits.to_vec());
            }
        };

        let active_a = self.active(&self.edges_a)?;
        let active_b = self.active(&self.edges_b)?;
        for (from, targets) in active_a.iter().enumerate() {
            for &(middle, a) in targets {
                add(from, middle, &[a]);
                if self.level == IsolationLevel::SnapshotIsolation {
                    for &(to, b) in &active_b[middle] {
                        add(from, to, &[a, b]);
                    }
                }
            }
        }
        if self.level == IsolationLevel::Serializable {
            for (from, targets) in active_b.iter().enumerate() {
                for &(to, b) in targets {
                    add(from, to, &[b]);
                }
            }
        }
        Ok((graph, reasons))
    }

    /// Solves under `assumptions`, refining with cycle clauses until the
    /// model graph is acyclic. Returns `None` when satisfiable, or the failed
    /// subset of `assumptions`.
    fn solve_under(&mut self, assumptions: &[Lit], shortcuts: bool) -> OracleResult<Option<Vec<Lit>>> {
        loop {
            match self.engine.solve_assumps(assumptions).map_err(oracle)? {
                SolverResult::Sat => {
                    let (graph, reasons) = self.model_graph(shortcuts)?;
                    let Some(cycle) = graph.find_cycle() else {
                        return Ok(None);
                    };
                    let mut blocking = BTreeSet::new();
                    for (i, &from) in cycle.iter().enumerate() {
                        let to = cycle[(i + 1) % cycle.len()];
                        if let Some(lits) = reasons.get(&(from, to)) {
                            blocking.extend(lits.iter().map(|&lit| !lit));
                        }
                    }
                    self.clause(blocking)?;
                    self.blocked += 1;
                }
                SolverResult::Unsat => {
                    let core: HashSet<Lit> = self.engine.core().map_err(oracle)?.into_iter().collect();
                    // the engine reports negated assumptions
                    let failed = assumptions
                        .iter()
                        .copied()
                        .filter(|&lit| core.contains(&lit) || core.contains(&!lit))
                        .collect();
                    return Ok(Some(failed));
                }
                SolverResult::Interrupted => return Err("solver interrupted".into()),
            }
        }
    }

    /// Drops assumptions from `core` one at a time while the rest stays
    /// unsatisfiable.
    fn minimize(&mut self, mut core: Vec<Lit>) -> OracleResult<Vec<Lit>> {
        let mut index = 0;
        while index < core.len() {
            let mut candidate = core.clone();
            candidate.remove(index);
            match self.solve_under(&candidate, false)? {
                Some(smaller) => core = smaller,
                None => index += 1,
            }
        }
        Ok(core)
    }

    fn conflicts(&self, core: &[Lit]) -> Conflicts<Key> {
        let mut conflicts = Conflicts::default();
        for lit in core {
            if let Some(edge) = self.known.get(lit) {
                let labels = match edge.graph {
                    Graph::A => self.graph.labels_a(edge.from, edge.to),
                    Graph::B => self.graph.labels_b(edge.from, edge.to),
                };
                conflicts.edges.push(ConflictEdge {
                    from: edge.from,
                    to: edge.to,
                    labels: labels.map(<[_]>::to_vec).unwrap_or_default(),
                });
            } else if let Some(&index) = self.constraint_lits.get(lit) {
                conflicts.constraints.push(self.constraints[index].clone());
            }
        }
        conflicts.edges.sort_by_key(|edge| (edge.from, edge.to));
        conflicts.constraints.sort();
        conflicts
    }

    /// Split commit order of the current (acyclic) model: each read phase
    /// goes right after the commit of the transaction's latest predecessor
    /// in graph A.
    fn witness(&self) -> OracleResult<Witness> {
        let (graph, _) = self.model_graph(false)?;
        let order = graph
            .topological_sort()
            .ok_or_else(|| String::from("acyclic model has a cyclic final graph"))?;
        let init = self.nodes.index_of(&TransactionId::init());
        let id = |node: usize| *self.nodes.node(node);

        if self.level == IsolationLevel::Serializable {
            return Ok(Witness::CommitOrder(
                order.into_iter().filter(|&n| Some(n) != init).map(id).collect(),
            ));
        }

        let mut position = vec![0; self.nodes.len()];
        for (i, &node) in order.iter().enumerate() {
            position[node] = i;
        }
        let mut latest: Vec<Option<usize>> = vec![None; self.nodes.len()];
        for (from, targets) in self.active(&self.edges_a)?.into_iter().enumerate() {
            if Some(from) == init {
                continue;
            }
            for (to, _) in targets {
                if latest[to].is_none_or(|p| position[p] < position[from]) {
                    latest[to] = Some(from);
                }
            }
        }

        let mut starts_after: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];
        let mut split = Vec::with_capacity(2 * order.len());
        for &node in &order {
            if Some(node) == init {
                continue;
            }
            match latest[node] {
                Some(pred) => starts_after[pred].push(node),
                None => split.push((id(node), false)),
            }
        }
        for &node in &order {
            if Some(node) == init {
                continue;
            }
            split.push((id(node), true));
            split.extend(starts_after[node].iter().map(|&t| (id(t), false)));
        }
        Ok(Witness::SplitCommitOrder(split))
    }

    /// Decides the instance: a witness when some choice of the constraints
    /// leaves the final graph acyclic, a minimal conflict otherwise.
    ///
    /// # Errors
    ///
    /// Fails only if the engine does.
    pub fn solve(mut self) -> OracleResult<Result<Witness, Conflicts<Key>>> {
        let assumptions: Vec<Lit> = self
            .known
            .keys()
            .chain(self.constraint_lits.keys())
            .copied()
            .collect();

        let outcome = self.solve_under(&assumptions, true)?;
        let result = match outcome {
            None => Ok(self.witness()?),
            Some(core) => {
                let core = self.minimize(core)?;
                Err(self.conflicts(&core))
            }
        };
        info!(
            accepted = result.is_ok(),
            cycle_clauses = self.blocked,
            literals = self.next_var,
            "solver finished"
        );
        Ok(result)
    }
}
