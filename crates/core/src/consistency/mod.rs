//! Isolation checking on top of the precedence graph.
//!
//! The pipeline is: [`PrecedenceGraph::new`] builds graphs A and B from a
//! validated history, [`generate_constraints`] derives one ordering
//! constraint per pair of transactions writing a common key, and
//! [`prune_constraints`] resolves as many of them as reachability allows. The
//! boolean solver that decides what is left lives in `polysi_sat`.

use typed_builder::TypedBuilder;

pub mod constraint;
pub mod error;
pub mod precedence;
pub mod pruning;
pub mod witness;

pub use constraint::{generate_constraints, SiConstraint, SiEdge};
pub use error::{ConflictEdge, Conflicts, Error};
pub use precedence::{EdgeKind, EdgeLabel, PrecedenceGraph};
pub use pruning::{prune_constraints, KnownCycle, PruningReport};
pub use witness::Witness;

pub use crate::graph::matrix::Reachability;

/// Round budget of the pruning loop when none is configured.
pub const DEFAULT_PRUNING_ROUNDS: usize = 100;

/// Isolation level a history is audited against.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// Every transaction reads from a snapshot taken at its start and
    /// concurrent transactions write disjoint keys.
    #[default]
    SnapshotIsolation,
    /// The history is equivalent to some serial execution.
    Serializable,
}

impl core::fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Self::SnapshotIsolation => write!(f, "snapshot isolation"),
            Self::Serializable => write!(f, "serializability"),
        }
    }
}

/// When the reachability-based pruning runs.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PruningMode {
    /// Resolve constraints in rounds until a fixpoint, then solve the rest.
    #[default]
    Iterative,
    /// Skip the rounds; only the solver's closure preprocessing runs.
    PreprocessOnly,
}

/// Knobs of one audit. All combinations of pruning mode and reachability
/// strategy reach the same verdict.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, TypedBuilder)]
pub struct AuditOptions {
    #[builder(default)]
    pub level: IsolationLevel,
    #[builder(default)]
    pub pruning: PruningMode,
    #[builder(default)]
    pub reachability: Reachability,
    #[builder(default = DEFAULT_PRUNING_ROUNDS)]
    pub max_pruning_rounds: usize,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl AuditOptions {
    /// Default options at `level`.
    #[must_use]
    pub fn for_level(level: IsolationLevel) -> Self {
        Self::builder().level(level).build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = AuditOptions::default();
        assert_eq!(options.level, IsolationLevel::SnapshotIsolation);
        assert_eq!(options.pruning, PruningMode::Iterative);
        assert_eq!(options.reachability, Reachability::Dense);
        assert_eq!(options.max_pruning_rounds, DEFAULT_PRUNING_ROUNDS);

        let options = AuditOptions::builder()
            .level(IsolationLevel::Serializable)
            .reachability(Reachability::Sparse)
            .max_pruning_rounds(3)
            .build();
        assert_eq!(options.pruning, PruningMode::Iterative);
        assert_eq!(options.max_pruning_rounds, 3);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_options_json() {
        let options = AuditOptions::for_level(IsolationLevel::Serializable);
        let json = serde_json::to_string(&options).unwrap();
        assert_eq!(
            json,
            r#"{"level":"Serializable","pruning":"Iterative","reachability":"Dense","max_pruning_rounds":100}"#
        );
    }
}
