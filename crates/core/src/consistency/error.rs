use alloc::collections::BTreeSet;
use alloc::string::String;
use alloc::vec::Vec;
use core::fmt::{Debug, Display, Formatter, Result};

use derive_more::From;

use super::constraint::SiConstraint;
use super::precedence::EdgeLabel;
use super::IsolationLevel;
use crate::history::{HistoryError, MalformedHistory, TransactionId};

/// A known precedence edge taking part in an unsatisfiable core.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictEdge<Key> {
    pub from: TransactionId,
    pub to: TransactionId,
    pub labels: Vec<EdgeLabel<Key>>,
}

/// Minimal set of known edges and constraints that cannot hold together.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflicts<Key> {
    pub edges: Vec<ConflictEdge<Key>>,
    pub constraints: Vec<SiConstraint<Key>>,
}

impl<Key> Default for Conflicts<Key> {
    fn default() -> Self {
        Self {
            edges: Vec::new(),
            constraints: Vec::new(),
        }
    }
}

impl<Key> Conflicts<Key> {
    /// Transactions implicated by the conflicting edges and constraints.
    #[must_use]
    pub fn transactions(&self) -> BTreeSet<TransactionId> {
        let mut transactions: BTreeSet<_> = self
            .edges
            .iter()
            .flat_map(|edge| [edge.from, edge.to])
            .collect();
        for constraint in &self.constraints {
            transactions.extend(constraint.transactions());
        }
        transactions
    }
}

impl<Key: Debug> Display for Conflicts<Key> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        for edge in &self.edges {
            write!(f, "edge {} -> {} [", edge.from, edge.to)?;
            for (i, label) in edge.labels.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{label}")?;
            }
            writeln!(f, "]")?;
        }
        for constraint in &self.constraints {
            writeln!(f, "constraint {constraint}")?;
        }
        Ok(())
    }
}

/// Error returned when a history fails an audit, or the audit itself fails.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, From)]
pub enum Error<Key, Value> {
    /// Raw sessions could not be turned into a history.
    History(HistoryError<Key, Value>),
    /// The history is internally inconsistent.
    Malformed(MalformedHistory<Key, Value>),
    /// The known edges already form a cycle; `a -> b` lies on it.
    Cycle {
        level: IsolationLevel,
        a: TransactionId,
        b: TransactionId,
    },
    /// No choice of the open constraints yields an acyclic graph.
    Unsatisfiable {
        level: IsolationLevel,
        conflicts: Conflicts<Key>,
    },
    /// The satisfiability engine failed. Not a verdict.
    Oracle(String),
}

impl<Key, Value> Error<Key, Value> {
    /// `true` for the REJECT verdicts, `false` for a failed run.
    #[must_use]
    pub const fn is_violation(&self) -> bool {
        !matches!(self, Self::Oracle(_))
    }
}

impl<Key: Debug, Value: Debug> Display for Error<Key, Value> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::History(err) => write!(f, "invalid history: {err}"),
            Self::Malformed(err) => write!(f, "malformed history: {err}"),
            Self::Cycle { level, a, b } => {
                write!(f, "known edges violate {level}: cycle through {a} -> {b}")
            }
            Self::Unsatisfiable { level, conflicts } => {
                write!(
                    f,
                    "no ordering satisfies {level}: {} edges and {} constraints conflict",
                    conflicts.edges.len(),
                    conflicts.constraints.len()
                )
            }
            Self::Oracle(message) => write!(f, "solver failure: {message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistency::precedence::EdgeKind;
    use crate::consistency::SiEdge;

    #[test]
    fn test_conflict_transactions() {
        let t = |s, h| TransactionId::new(s, h);
        let conflicts = Conflicts {
            edges: vec![ConflictEdge {
                from: t(1, 0),
                to: t(2, 0),
                labels: vec![EdgeLabel::keyed(EdgeKind::WriteRead, "x")],
            }],
            constraints: vec![SiConstraint {
                write_transaction1: t(1, 0),
                write_transaction2: t(3, 0),
                edges1: vec![SiEdge {
                    from: t(4, 1),
                    to: t(3, 0),
                    kind: EdgeKind::ReadWrite,
                    key: "x",
                }],
                edges2: vec![],
            }],
        };
        assert_eq!(
            conflicts.transactions().into_iter().collect::<Vec<_>>(),
            vec![t(1, 0), t(2, 0), t(3, 0), t(4, 1)]
        );
        let text = conflicts.to_string();
        assert!(text.starts_with("edge T(1:0) -> T(2:0) [WR(\"x\")]\n"));
        assert!(text.contains("constraint T(1:0) / T(3:0)"));
    }

    #[test]
    fn test_violation_classes() {
        let cycle: Error<&str, u64> = Error::Cycle {
            level: IsolationLevel::Serializable,
            a: TransactionId::new(1, 0),
            b: TransactionId::new(2, 0),
        };
        assert!(cycle.is_violation());
        assert_eq!(
            cycle.to_string(),
            "known edges violate serializability: cycle through T(1:0) -> T(2:0)"
        );

        let malformed: Error<&str, u64> =
            MalformedHistory::UncommittedTransaction(TransactionId::new(1, 0)).into();
        assert!(malformed.is_violation());
        assert!(!Error::<&str, u64>::Oracle("boom".into()).is_violation());
    }
}
