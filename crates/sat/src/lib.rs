//! SAT-backed auditing of transactional histories.
//!
//! [`audit`] runs the whole pipeline: validation, precedence graph,
//! constraint generation, pruning and finally a `rustsat-batsat` solve of
//! whatever pruning left open. Acceptance comes with a [`Witness`];
//! rejection with a cycle of known edges or a minimal unsatisfiable set of
//! edges and constraints.
//!
//! ```rust,ignore
//! use polysi_core::{AuditOptions, IsolationLevel};
//!
//! let options = AuditOptions::for_level(IsolationLevel::SnapshotIsolation);
//! match polysi_sat::audit(&history, &options) {
//!     Ok(witness) => assert!(witness.explains(&history)),
//!     Err(err) if err.is_violation() => eprintln!("{err}"),
//!     Err(err) => panic!("{err}"),
//! }
//! ```

use std::hash::Hash;

use polysi_core::consistency::KnownCycle;
use polysi_core::history::raw::types::Session;
use polysi_core::{
    generate_constraints, prune_constraints, AuditOptions, Error, History, IsolationLevel,
    PrecedenceGraph, PruningMode, Witness,
};
use tracing::{info, warn};

pub mod solver;

use solver::SiSolver;

/// Audits `history` against `options.level`.
///
/// # Errors
///
/// - [`Error::Malformed`] when the history is internally inconsistent.
/// - [`Error::Cycle`] when pruning finds a cycle among known edges.
/// - [`Error::Unsatisfiable`] when no resolution of the remaining
///   constraints is acyclic.
/// - [`Error::Oracle`] when the SAT engine fails.
pub fn audit<Key, Value>(
    history: &History<Key, Value>,
    options: &AuditOptions,
) -> Result<Witness, Error<Key, Value>>
where
    Key: Ord + Hash + Clone,
    Value: Eq + Hash + Clone,
{
    history.validate()?;

    let mut graph = PrecedenceGraph::new(history);
    let mut constraints = generate_constraints(history, &graph);
    info!(
        level = %options.level,
        transactions = history.transaction_count(),
        constraints = constraints.len(),
        "auditing history"
    );

    if options.pruning == PruningMode::Iterative {
        prune_constraints(&mut graph, &mut constraints, options).map_err(|KnownCycle { a, b }| {
            warn!(%a, %b, "known edges form a cycle");
            Error::Cycle {
                level: options.level,
                a,
                b,
            }
        })?;
    }

    let solver = SiSolver::new(&graph, constraints, options).map_err(Error::Oracle)?;
    match solver.solve().map_err(Error::Oracle)? {
        Ok(witness) => Ok(witness),
        Err(conflicts) => {
            warn!(
                edges = conflicts.edges.len(),
                constraints = conflicts.constraints.len(),
                "no acyclic resolution"
            );
            Err(Error::Unsatisfiable {
                level: options.level,
                conflicts,
            })
        }
    }
}

/// Builds a history from raw sessions and audits it with default options.
///
/// # Errors
///
/// As [`audit`], plus [`Error::History`] when the sessions do not form a
/// history.
pub fn check<Key, Value>(
    sessions: &[Session<Key, Value>],
    level: IsolationLevel,
) -> Result<Witness, Error<Key, Value>>
where
    Key: Ord + Hash + Clone,
    Value: Eq + Hash + Clone + Default,
{
    let history = History::try_from(sessions)?;
    audit(&history, &AuditOptions::for_level(level))
}
