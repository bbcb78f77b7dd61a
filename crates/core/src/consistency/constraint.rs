use alloc::collections::{BTreeMap, BTreeSet};
use alloc::vec::Vec;
use core::fmt::{Debug, Display, Formatter, Result};
use core::hash::Hash;

use tracing::debug;

use super::precedence::{EdgeKind, EdgeLabel, PrecedenceGraph};
use crate::history::{History, TransactionId};

/// A write-write or read-write edge implied by one side of a constraint.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SiEdge<Key> {
    pub from: TransactionId,
    pub to: TransactionId,
    pub kind: EdgeKind,
    pub key: Key,
}

impl<Key: Clone> SiEdge<Key> {
    #[must_use]
    pub fn label(&self) -> EdgeLabel<Key> {
        EdgeLabel::keyed(self.kind, self.key.clone())
    }
}

impl<Key: Debug> Display for SiEdge<Key> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "{} -{}({:?})-> {}", self.from, self.kind, self.key, self.to)
    }
}

/// Two transactions writing a common key are ordered one way or the other.
///
/// `edges1` holds if `write_transaction1` commits first, `edges2` otherwise.
/// Exactly one side is realized in any valid ordering.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SiConstraint<Key> {
    pub write_transaction1: TransactionId,
    pub write_transaction2: TransactionId,
    pub edges1: Vec<SiEdge<Key>>,
    pub edges2: Vec<SiEdge<Key>>,
}

impl<Key> SiConstraint<Key> {
    /// Every transaction mentioned by either side.
    #[must_use]
    pub fn transactions(&self) -> BTreeSet<TransactionId> {
        self.edges1
            .iter()
            .chain(&self.edges2)
            .flat_map(|edge| [edge.from, edge.to])
            .chain([self.write_transaction1, self.write_transaction2])
            .collect()
    }
}

impl<Key: Debug> Display for SiConstraint<Key> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        let side = |f: &mut Formatter, edges: &[SiEdge<Key>]| -> Result {
            for (i, edge) in edges.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{edge}")?;
            }
            Ok(())
        };
        write!(
            f,
            "{} / {}: [",
            self.write_transaction1, self.write_transaction2
        )?;
        side(f, &self.edges1)?;
        write!(f, "] or [")?;
        side(f, &self.edges2)?;
        write!(f, "]")
    }
}

/// One constraint per unordered pair of transactions writing a common key.
///
/// For a pair `{t1, t2}` (with `t1 < t2`) and every key `k` both write,
/// `edges1` gets `t1 -WW(k)-> t2` plus `r -RW(k)-> t2` for every reader `r`
/// of `t1`'s write of `k` other than `t2`; `edges2` is the mirror image.
/// Keys shared by the same pair coalesce into one constraint. The result is
/// sorted by pair and its edge lists are sorted, so it depends only on the
/// history.
#[must_use]
pub fn generate_constraints<Key, Value>(
    history: &History<Key, Value>,
    graph: &PrecedenceGraph<Key>,
) -> Vec<SiConstraint<Key>>
where
    Key: Ord + Hash + Clone,
    Value: Eq + Hash + Clone,
{
    let mut writers: BTreeMap<&Key, BTreeSet<TransactionId>> = BTreeMap::new();
    for transaction in history.transactions() {
        for event in transaction.writes() {
            writers.entry(&event.key).or_default().insert(transaction.id);
        }
    }

    let mut sides: BTreeMap<(TransactionId, TransactionId), BTreeSet<SiEdge<Key>>> =
        BTreeMap::new();
    for (&key, group) in &writers {
        for &first in group {
            for &second in group.range(first..).skip(1) {
                for (from, to) in [(first, second), (second, first)] {
                    sides.entry((from, to)).or_default().insert(SiEdge {
                        from,
                        to,
                        kind: EdgeKind::WriteWrite,
                        key: key.clone(),
                    });
                }
            }
        }

        for &writer in group {
            for &reader in graph.readers(key, &writer) {
                for &other in group {
                    if other == writer || other == reader {
                        continue;
                    }
                    sides.entry((writer, other)).or_default().insert(SiEdge {
                        from: reader,
                        to: other,
                        kind: EdgeKind::ReadWrite,
                        key: key.clone(),
                    });
                }
            }
        }
    }

    let constraints: Vec<_> = sides
        .iter()
        .filter(|((first, second), _)| first < second)
        .map(|(&(first, second), edges1)| SiConstraint {
            write_transaction1: first,
            write_transaction2: second,
            edges1: edges1.iter().cloned().collect(),
            edges2: sides
                .get(&(second, first))
                .map(|edges| edges.iter().cloned().collect())
                .unwrap_or_default(),
        })
        .collect();

    debug!(
        constraints = constraints.len(),
        edges = constraints
            .iter()
            .map(|c| c.edges1.len() + c.edges2.len())
            .sum::<usize>(),
        "generated constraints"
    );
    constraints
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::raw::types::{Event, Transaction};

    #[test]
    fn test_coalesced_constraint() {
        // init: x=0, y=0
        // session 1: [x:=1 y:=1]
        // session 2: [x:=2 y:=2]
        // session 3: [x==1]
        let sessions = vec![
            vec![Transaction::committed(vec![
                Event::write("x", 1),
                Event::write("y", 1),
            ])],
            vec![Transaction::committed(vec![
                Event::write("x", 2),
                Event::write("y", 2),
            ])],
            vec![Transaction::committed(vec![Event::read("x", 1)])],
        ];
        let history = History::try_from(sessions.as_slice()).unwrap();
        let graph = PrecedenceGraph::new(&history);
        let constraints = generate_constraints(&history, &graph);

        let t1 = TransactionId::new(1, 0);
        let t2 = TransactionId::new(2, 0);
        let t3 = TransactionId::new(3, 0);
        assert_eq!(constraints.len(), 1);
        let constraint = &constraints[0];
        assert_eq!(constraint.write_transaction1, t1);
        assert_eq!(constraint.write_transaction2, t2);

        let ww = |from, to, key| SiEdge {
            from,
            to,
            kind: EdgeKind::WriteWrite,
            key,
        };
        assert_eq!(
            constraint.edges1,
            vec![
                ww(t1, t2, "x"),
                ww(t1, t2, "y"),
                SiEdge {
                    from: t3,
                    to: t2,
                    kind: EdgeKind::ReadWrite,
                    key: "x"
                },
            ]
        );
        assert_eq!(constraint.edges2, vec![ww(t2, t1, "x"), ww(t2, t1, "y")]);
        assert_eq!(constraint.transactions().len(), 3);
    }

    #[test]
    fn test_init_writer_and_read_modify_write() {
        // init: x=0
        // session 1: [x==? x:=1]
        // session 2: [x==? x:=2]
        let sessions = vec![
            vec![Transaction::committed(vec![
                Event::read_initial("x"),
                Event::write("x", 1),
            ])],
            vec![Transaction::committed(vec![
                Event::read_initial("x"),
                Event::write("x", 2),
            ])],
        ];
        let history = History::try_from(sessions.as_slice()).unwrap();
        let graph = PrecedenceGraph::new(&history);
        let constraints = generate_constraints(&history, &graph);

        let init = TransactionId::init();
        let t1 = TransactionId::new(1, 0);
        let t2 = TransactionId::new(2, 0);
        let pairs: Vec<_> = constraints
            .iter()
            .map(|c| (c.write_transaction1, c.write_transaction2))
            .collect();
        assert_eq!(pairs, vec![(init, t1), (init, t2), (t1, t2)]);

        // init before t1: t2 read init's x, so t2 -RW-> t1
        let init_t1 = &constraints[0];
        assert!(init_t1.edges1.iter().any(|e| e.kind == EdgeKind::ReadWrite
            && e.from == t2
            && e.to == t1));
        // readers that are the other writer get no self edge
        assert!(init_t1.edges1.iter().all(|e| e.from != e.to));
        assert!(constraints[2].edges1.len() == 1 && constraints[2].edges2.len() == 1);
    }

    #[test]
    fn test_generation_is_deterministic() {
        let sessions: Vec<Vec<Transaction<u64, u64>>> = (0..6)
            .map(|s| {
                (0..4)
                    .map(|h| {
                        Transaction::committed(vec![
                            Event::read_initial(h % 3),
                            Event::write(h % 3, s * 10 + h + 1),
                            Event::write(s % 2 + 5, s * 10 + h + 1),
                        ])
                    })
                    .collect()
            })
            .collect();
        let history = History::try_from(sessions.as_slice()).unwrap();
        let graph = PrecedenceGraph::new(&history);
        let first = generate_constraints(&history, &graph);
        let second = generate_constraints(&history, &PrecedenceGraph::new(&history));
        assert!(!first.is_empty());
        assert_eq!(first, second);
        assert!(first.windows(2).all(|w| w[0] < w[1]));
    }
}
