//! Precedence graph over transactions.
//!
//! Graph A holds edges that are known to be in every valid ordering: session
//! order, write-read, and whatever write-write (or subsumed read-write) edges
//! pruning has decided. Graph B holds read-write anti-dependencies accepted by
//! pruning. Both are explicit maps from ordered transaction pairs to edge
//! labels; an ordered pair is never in both.

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt::{Debug, Display, Formatter, Result};
use core::hash::Hash;

use hashbrown::HashMap;
use tracing::debug;

use super::IsolationLevel;
use crate::graph::digraph::DiGraph;
use crate::graph::matrix::{MatrixGraph, NodeSet, Reachability};
use crate::history::{History, TransactionId};

/// Dependency kind of a precedence edge.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EdgeKind {
    SessionOrder,
    WriteRead,
    WriteWrite,
    ReadWrite,
}

impl Display for EdgeKind {
    fn fmt(&self, f: &mut Formatter) -> Result {
        let name = match self {
            Self::SessionOrder => "SO",
            Self::WriteRead => "WR",
            Self::WriteWrite => "WW",
            Self::ReadWrite => "RW",
        };
        write!(f, "{name}")
    }
}

/// Why an edge exists: its kind and, except for session order, its key.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EdgeLabel<Key> {
    pub kind: EdgeKind,
    pub key: Option<Key>,
}

impl<Key> EdgeLabel<Key> {
    #[must_use]
    pub const fn session_order() -> Self {
        Self {
            kind: EdgeKind::SessionOrder,
            key: None,
        }
    }

    #[must_use]
    pub const fn keyed(kind: EdgeKind, key: Key) -> Self {
        Self {
            kind,
            key: Some(key),
        }
    }

    /// Session order is the only trivial dependency.
    #[must_use]
    pub fn is_tagged(&self) -> bool {
        self.kind != EdgeKind::SessionOrder
    }
}

impl<Key: Debug> Display for EdgeLabel<Key> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match &self.key {
            Some(key) => write!(f, "{}({key:?})", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}

type EdgeMap<Key> = BTreeMap<(TransactionId, TransactionId), Vec<EdgeLabel<Key>>>;

fn merge_label<Key: PartialEq>(labels: &mut Vec<EdgeLabel<Key>>, label: EdgeLabel<Key>) {
    if !labels.contains(&label) {
        labels.push(label);
    }
}

/// Graphs A and B over every transaction of a history, init included.
#[derive(Debug, Clone)]
pub struct PrecedenceGraph<Key> {
    nodes: Arc<NodeSet<TransactionId>>,
    known_a: EdgeMap<Key>,
    known_b: EdgeMap<Key>,
    successors_a: DiGraph<TransactionId>,
    predecessors_a: DiGraph<TransactionId>,
    read_from: HashMap<Key, DiGraph<TransactionId>>,
}

impl<Key> PrecedenceGraph<Key>
where
    Key: Ord + Hash + Clone,
{
    /// Session-order and write-read edges of `history`.
    ///
    /// Reads whose value nobody wrote are skipped; [`History::validate`]
    /// rejects such histories before a graph is built.
    pub fn new<Value>(history: &History<Key, Value>) -> Self
    where
        Value: Eq + Hash + Clone,
    {
        let nodes = Arc::new(NodeSet::new(history.transactions().map(|t| t.id)));
        let mut graph = Self {
            nodes,
            known_a: BTreeMap::new(),
            known_b: BTreeMap::new(),
            successors_a: DiGraph::default(),
            predecessors_a: DiGraph::default(),
            read_from: HashMap::new(),
        };

        for session in history.sessions() {
            let mut previous = TransactionId::init();
            for transaction in &session.transactions {
                graph.add_edge(previous, transaction.id, EdgeLabel::session_order());
                previous = transaction.id;
            }
        }

        for transaction in history.transactions() {
            for event in transaction.reads() {
                let Some(write) = history.writer_of(&event.key, &event.value) else {
                    continue;
                };
                if write.transaction == transaction.id {
                    continue;
                }
                graph
                    .read_from
                    .entry(event.key.clone())
                    .or_default()
                    .add_edge(write.transaction, transaction.id);
                graph.add_edge(
                    write.transaction,
                    transaction.id,
                    EdgeLabel::keyed(EdgeKind::WriteRead, event.key.clone()),
                );
            }
        }

        debug!(
            transactions = graph.nodes.len(),
            edges = graph.known_a.len(),
            "built precedence graph"
        );
        graph
    }

    /// Adds a dependency edge.
    ///
    /// Read-write edges go to graph B unless graph A already orders the pair.
    /// Every other kind goes to graph A, absorbing any B edge on the same pair.
    pub fn add_edge(&mut self, from: TransactionId, to: TransactionId, label: EdgeLabel<Key>) {
        if label.kind == EdgeKind::ReadWrite {
            if let Some(labels) = self.known_a.get_mut(&(from, to)) {
                merge_label(labels, label);
            } else {
                merge_label(self.known_b.entry((from, to)).or_default(), label);
            }
            return;
        }

        let mut labels = self.known_b.remove(&(from, to)).unwrap_or_default();
        merge_label(&mut labels, label);
        let entry = self.known_a.entry((from, to)).or_default();
        for label in labels {
            merge_label(entry, label);
        }
        self.successors_a.add_edge(from, to);
        self.predecessors_a.add_edge(to, from);
    }

    /// Readers of `writer`'s write of `key`.
    pub fn readers<'a>(
        &'a self,
        key: &Key,
        writer: &'a TransactionId,
    ) -> impl Iterator<Item = &'a TransactionId> + 'a {
        self.read_from
            .get(key)
            .into_iter()
            .flat_map(move |graph| graph.successors(writer))
    }
}

impl<Key> PrecedenceGraph<Key> {
    #[must_use]
    pub const fn nodes(&self) -> &Arc<NodeSet<TransactionId>> {
        &self.nodes
    }

    /// Successors of `id` in graph A.
    pub fn successors(&self, id: &TransactionId) -> impl Iterator<Item = &TransactionId> {
        self.successors_a.successors(id)
    }

    /// Predecessors of `id` in graph A.
    pub fn predecessors(&self, id: &TransactionId) -> impl Iterator<Item = &TransactionId> {
        self.predecessors_a.successors(id)
    }

    pub fn known_a(&self) -> impl Iterator<Item = (TransactionId, TransactionId, &[EdgeLabel<Key>])> {
        self.known_a
            .iter()
            .map(|(&(from, to), labels)| (from, to, labels.as_slice()))
    }

    pub fn known_b(&self) -> impl Iterator<Item = (TransactionId, TransactionId, &[EdgeLabel<Key>])> {
        self.known_b
            .iter()
            .map(|(&(from, to), labels)| (from, to, labels.as_slice()))
    }

    #[must_use]
    pub fn labels_a(&self, from: TransactionId, to: TransactionId) -> Option<&[EdgeLabel<Key>]> {
        self.known_a.get(&(from, to)).map(Vec::as_slice)
    }

    #[must_use]
    pub fn labels_b(&self, from: TransactionId, to: TransactionId) -> Option<&[EdgeLabel<Key>]> {
        self.known_b.get(&(from, to)).map(Vec::as_slice)
    }

    #[must_use]
    pub fn edge_count_a(&self) -> usize {
        self.known_a.len()
    }

    #[must_use]
    pub fn edge_count_b(&self) -> usize {
        self.known_b.len()
    }

    /// Graph A as a matrix; every edge except pure session order is tagged.
    #[must_use]
    pub fn matrix_a(&self) -> MatrixGraph<TransactionId> {
        let mut matrix = MatrixGraph::new(Arc::clone(&self.nodes));
        for (from, to, labels) in self.known_a() {
            matrix.insert_edge(&from, &to, labels.iter().any(EdgeLabel::is_tagged));
        }
        matrix
    }

    /// Graph B as a matrix; every edge is tagged.
    #[must_use]
    pub fn matrix_b(&self) -> MatrixGraph<TransactionId> {
        let mut matrix = MatrixGraph::new(Arc::clone(&self.nodes));
        for (from, to, _) in self.known_b() {
            matrix.insert_edge(&from, &to, true);
        }
        matrix
    }

    /// Edges every valid ordering contains: `A ∪ (A ∘ B)` under snapshot
    /// isolation, `A ∪ B` under serializability.
    #[must_use]
    pub fn known_graph(&self, level: IsolationLevel, strategy: Reachability) -> MatrixGraph<TransactionId> {
        let a = self.matrix_a();
        let b = self.matrix_b();
        match level {
            IsolationLevel::SnapshotIsolation => a.union(&a.composition(&b, strategy)),
            IsolationLevel::Serializable => a.union(&b),
        }
    }
}
