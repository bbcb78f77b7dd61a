//! Bit-packed adjacency matrices with edge tagging.
//!
//! Every cell of a [`MatrixGraph`] carries two bits: *reachable* and
//! *tagged*. Tagged edges are the non-trivial ones (dependencies other than
//! session order). Composition and closure propagate tags along paths: a
//! composed or closed cell is tagged iff some edge on a witnessing path is.
//! A closure whose diagonal has a tagged cell therefore proves a cycle through
//! at least one non-trivial edge, while plain self-reachability (the reflexive
//! diagonal) means nothing.
//!
//! Rows are `u64` words so unions and row relaxations touch 64 cells at once.
//! Each operation comes in a dense and a sparse flavour; both produce
//! bit-identical results and differ only in speed.

use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::Hash;

use hashbrown::HashMap;

use super::digraph::DiGraph;

const WORD: usize = u64::BITS as usize;

/// Which algorithm computes compositions and closures.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reachability {
    /// Word-parallel relaxation over the whole matrix.
    #[default]
    Dense,
    /// Per-node searches over successor lists.
    Sparse,
}

/// Fixed, indexed set of nodes shared by the matrices built over it.
#[derive(Debug, Clone)]
pub struct NodeSet<T> {
    nodes: Vec<T>,
    index: HashMap<T, usize>,
}

impl<T> NodeSet<T>
where
    T: Hash + Eq + Clone,
{
    /// Indexes `nodes` in iteration order, ignoring repeats.
    pub fn new<I: IntoIterator<Item = T>>(nodes: I) -> Self {
        let mut set = Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        };
        for node in nodes {
            if !set.index.contains_key(&node) {
                set.index.insert(node.clone(), set.nodes.len());
                set.nodes.push(node);
            }
        }
        set
    }

    #[must_use]
    pub fn index_of(&self, node: &T) -> Option<usize> {
        self.index.get(node).copied()
    }
}

impl<T> NodeSet<T> {
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// # Panics
    ///
    /// Panics if `index` is out of bounds.
    #[must_use]
    pub fn node(&self, index: usize) -> &T {
        &self.nodes[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter()
    }
}

impl<T: PartialEq> PartialEq for NodeSet<T> {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes
    }
}

impl<T: Eq> Eq for NodeSet<T> {}

/// Indices of the set bits of a row, ascending.
fn ones(row: &[u64]) -> impl Iterator<Item = usize> + '_ {
    row.iter().enumerate().flat_map(|(position, &word)| {
        let mut word = word;
        core::iter::from_fn(move || {
            if word == 0 {
                return None;
            }
            let bit = word.trailing_zeros() as usize;
            word &= word - 1;
            Some(position * WORD + bit)
        })
    })
}

const fn test_bit(row: &[u64], column: usize) -> bool {
    row[column / WORD] & (1 << (column % WORD)) != 0
}

fn set_bit(row: &mut [u64], column: usize) {
    row[column / WORD] |= 1 << (column % WORD);
}

fn or_into(target: &mut [u64], source: &[u64]) {
    for (t, s) in target.iter_mut().zip(source) {
        *t |= *s;
    }
}

/// Reach and tag rows of one source node found by a search.
type SearchRow = (Vec<u64>, Vec<u64>);

/// Explores `(node, tagged-so-far)` states from `source`.
///
/// A node already reached through a tagged path is not revisited untagged:
/// everything the untagged visit would find is found tagged.
fn search(adjacency: &[Vec<(usize, bool)>], words: usize, source: usize) -> SearchRow {
    let mut plain = vec![0; words];
    let mut tagged = vec![0; words];
    set_bit(&mut plain, source);
    let mut stack = vec![(source, false)];
    while let Some((node, path_tagged)) = stack.pop() {
        for &(next, edge_tagged) in &adjacency[node] {
            if path_tagged || edge_tagged {
                if !test_bit(&tagged, next) {
                    set_bit(&mut tagged, next);
                    stack.push((next, true));
                }
            } else if !test_bit(&plain, next) && !test_bit(&tagged, next) {
                set_bit(&mut plain, next);
                stack.push((next, false));
            }
        }
    }
    or_into(&mut plain, &tagged);
    (plain, tagged)
}

#[cfg(feature = "parallel")]
fn search_all(adjacency: &[Vec<(usize, bool)>], words: usize) -> Vec<SearchRow> {
    use rayon::iter::{IntoParallelIterator, ParallelIterator};
    (0..adjacency.len())
        .into_par_iter()
        .map(|source| search(adjacency, words, source))
        .collect()
}

#[cfg(not(feature = "parallel"))]
fn search_all(adjacency: &[Vec<(usize, bool)>], words: usize) -> Vec<SearchRow> {
    (0..adjacency.len())
        .map(|source| search(adjacency, words, source))
        .collect()
}

/// Directed graph over a fixed [`NodeSet`] as a two-bit adjacency matrix.
#[derive(Debug)]
pub struct MatrixGraph<T> {
    nodes: Arc<NodeSet<T>>,
    words: usize,
    reach: Vec<u64>,
    tagged: Vec<u64>,
}

// No `T: Clone` bound: the node set is shared.
impl<T> Clone for MatrixGraph<T> {
    fn clone(&self) -> Self {
        Self {
            nodes: Arc::clone(&self.nodes),
            words: self.words,
            reach: self.reach.clone(),
            tagged: self.tagged.clone(),
        }
    }
}

impl<T: PartialEq> PartialEq for MatrixGraph<T> {
    fn eq(&self, other: &Self) -> bool {
        self.nodes == other.nodes && self.reach == other.reach && self.tagged == other.tagged
    }
}

impl<T: Eq> Eq for MatrixGraph<T> {}

impl<T> MatrixGraph<T> {
    /// A graph over `nodes` with no edges.
    #[must_use]
    pub fn new(nodes: Arc<NodeSet<T>>) -> Self {
        let words = nodes.len().div_ceil(WORD);
        let cells = nodes.len() * words;
        Self {
            nodes,
            words,
            reach: vec![0; cells],
            tagged: vec![0; cells],
        }
    }

    #[must_use]
    pub const fn nodes(&self) -> &Arc<NodeSet<T>> {
        &self.nodes
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn reach_row(&self, row: usize) -> &[u64] {
        &self.reach[row * self.words..(row + 1) * self.words]
    }

    fn tagged_row(&self, row: usize) -> &[u64] {
        &self.tagged[row * self.words..(row + 1) * self.words]
    }

    /// Adds the edge `from -> to` by index; an existing tag is never cleared.
    pub fn insert_index(&mut self, from: usize, to: usize, tagged: bool) {
        let range = from * self.words..(from + 1) * self.words;
        set_bit(&mut self.reach[range.clone()], to);
        if tagged {
            set_bit(&mut self.tagged[range], to);
        }
    }

    #[must_use]
    pub fn contains_index(&self, from: usize, to: usize) -> bool {
        test_bit(self.reach_row(from), to)
    }

    #[must_use]
    pub fn is_tagged_index(&self, from: usize, to: usize) -> bool {
        test_bit(self.tagged_row(from), to)
    }

    pub fn successors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        ones(self.reach_row(node))
    }

    pub fn predecessors(&self, node: usize) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(move |&row| self.contains_index(row, node))
    }

    /// All `(from, to, tagged)` cells, row by row.
    pub fn edges(&self) -> impl Iterator<Item = (usize, usize, bool)> + '_ {
        (0..self.len()).flat_map(move |from| {
            self.successors(from)
                .map(move |to| (from, to, self.is_tagged_index(from, to)))
        })
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.reach.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Nodes with a tagged self-reachability.
    ///
    /// On a closure these are exactly the nodes lying on a cycle through a
    /// non-trivial edge.
    pub fn cyclic_nodes(&self) -> impl Iterator<Item = usize> + '_ {
        (0..self.len()).filter(|&node| self.is_tagged_index(node, node))
    }

    #[must_use]
    pub fn has_cycle(&self) -> bool {
        self.cyclic_nodes().next().is_some()
    }

    fn adjacency(&self) -> Vec<Vec<(usize, bool)>> {
        (0..self.len())
            .map(|from| {
                self.successors(from)
                    .map(|to| (to, self.is_tagged_index(from, to)))
                    .collect()
            })
            .collect()
    }

    /// A topological order of node indices, or `None` if any cycle exists
    /// (self-loops included).
    #[must_use]
    pub fn topological_order(&self) -> Option<Vec<usize>> {
        let mut in_degree = vec![0usize; self.len()];
        for (_, to, _) in self.edges() {
            in_degree[to] += 1;
        }
        let mut queue: Vec<usize> = (0..self.len()).filter(|&n| in_degree[n] == 0).collect();
        let mut order = Vec::with_capacity(self.len());
        while let Some(node) = queue.pop() {
            order.push(node);
            for next in self.successors(node) {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    queue.push(next);
                }
            }
        }
        (order.len() == self.len()).then_some(order)
    }

    fn assert_same_nodes(&self, other: &Self)
    where
        T: PartialEq,
    {
        assert!(
            Arc::ptr_eq(&self.nodes, &other.nodes) || self.nodes == other.nodes,
            "matrix graphs over different node sets"
        );
    }

    /// Cell-wise OR of both graphs.
    ///
    /// # Panics
    ///
    /// Panics if the graphs are built over different node sets.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self
    where
        T: PartialEq,
    {
        self.assert_same_nodes(other);
        let mut result = self.clone();
        or_into(&mut result.reach, &other.reach);
        or_into(&mut result.tagged, &other.tagged);
        result
    }

    /// Graph product: `p -> r` iff `p -> q` in `self` and `q -> r` in `other`.
    ///
    /// # Panics
    ///
    /// Panics if the graphs are built over different node sets.
    #[must_use]
    pub fn composition(&self, other: &Self, strategy: Reachability) -> Self
    where
        T: PartialEq,
    {
        match strategy {
            Reachability::Dense => self.composition_dense(other),
            Reachability::Sparse => self.composition_sparse(other),
        }
    }

    /// Composition by OR-ing `other`'s rows into every row reaching them.
    ///
    /// # Panics
    ///
    /// Panics if the graphs are built over different node sets.
    #[must_use]
    pub fn composition_dense(&self, other: &Self) -> Self
    where
        T: PartialEq,
    {
        self.assert_same_nodes(other);
        let mut result = Self::new(Arc::clone(&self.nodes));
        let words = self.words;
        for row in 0..self.len() {
            let target = row * words..(row + 1) * words;
            for middle in self.successors(row) {
                or_into(&mut result.reach[target.clone()], other.reach_row(middle));
                or_into(&mut result.tagged[target.clone()], other.tagged_row(middle));
                if self.is_tagged_index(row, middle) {
                    or_into(&mut result.tagged[target.clone()], other.reach_row(middle));
                }
            }
        }
        result
    }

    /// Composition by joining predecessors and successors of each middle node.
    ///
    /// # Panics
    ///
    /// Panics if the graphs are built over different node sets.
    #[must_use]
    pub fn composition_sparse(&self, other: &Self) -> Self
    where
        T: PartialEq,
    {
        self.assert_same_nodes(other);
        let mut predecessors: Vec<Vec<(usize, bool)>> = vec![Vec::new(); self.len()];
        for (from, to, tagged) in self.edges() {
            predecessors[to].push((from, tagged));
        }
        let successors = other.adjacency();

        let mut result = Self::new(Arc::clone(&self.nodes));
        for (middle, incoming) in predecessors.iter().enumerate() {
            for &(from, first) in incoming {
                for &(to, second) in &successors[middle] {
                    result.insert_index(from, to, first || second);
                }
            }
        }
        result
    }

    /// Reflexive-transitive closure. The diagonal is reachable and untagged
    /// unless the node lies on a cycle through a tagged edge.
    #[must_use]
    pub fn reachability(&self, strategy: Reachability) -> Self {
        match strategy {
            Reachability::Dense => self.reachability_dense(),
            Reachability::Sparse => self.reachability_sparse(),
        }
    }

    /// Floyd-Warshall over bitset rows.
    #[must_use]
    pub fn reachability_dense(&self) -> Self {
        let mut result = self.clone();
        let words = self.words;
        for node in 0..self.len() {
            result.insert_index(node, node, false);
        }

        let mut pivot_reach = vec![0; words];
        let mut pivot_tagged = vec![0; words];
        for pivot in 0..self.len() {
            let pivot_range = pivot * words..(pivot + 1) * words;
            // paths through a tagged cycle at the pivot become tagged first
            if result.is_tagged_index(pivot, pivot) {
                pivot_reach.copy_from_slice(&result.reach[pivot_range.clone()]);
                or_into(&mut result.tagged[pivot_range.clone()], &pivot_reach);
            }
            pivot_reach.copy_from_slice(&result.reach[pivot_range.clone()]);
            pivot_tagged.copy_from_slice(&result.tagged[pivot_range]);

            for row in 0..self.len() {
                if row == pivot || !result.contains_index(row, pivot) {
                    continue;
                }
                let through_tag = result.is_tagged_index(row, pivot);
                let target = row * words..(row + 1) * words;
                or_into(&mut result.reach[target.clone()], &pivot_reach);
                or_into(&mut result.tagged[target.clone()], &pivot_tagged);
                if through_tag {
                    or_into(&mut result.tagged[target], &pivot_reach);
                }
            }
        }
        result
    }

    /// Dynamic programming over a topological order when the graph is
    /// acyclic, one search per source node otherwise.
    #[must_use]
    pub fn reachability_sparse(&self) -> Self {
        let mut result = Self::new(Arc::clone(&self.nodes));
        let words = self.words;

        if let Some(order) = self.topological_order() {
            for &node in order.iter().rev() {
                let target = node * words..(node + 1) * words;
                set_bit(&mut result.reach[target.clone()], node);
                for next in self.successors(node) {
                    let ((reach_to, reach_from), (tagged_to, tagged_from)) =
                        result.split_rows(node, next);
                    or_into(reach_to, reach_from);
                    or_into(tagged_to, tagged_from);
                    if self.is_tagged_index(node, next) {
                        or_into(tagged_to, reach_from);
                    }
                }
            }
            return result;
        }

        for (source, (reach, tagged)) in search_all(&self.adjacency(), words)
            .into_iter()
            .enumerate()
        {
            let target = source * words..(source + 1) * words;
            result.reach[target.clone()].copy_from_slice(&reach);
            result.tagged[target].copy_from_slice(&tagged);
        }
        result
    }

    /// Mutable rows of `target` next to shared rows of `source` (distinct).
    #[allow(clippy::type_complexity)]
    fn split_rows(
        &mut self,
        target: usize,
        source: usize,
    ) -> ((&mut [u64], &[u64]), (&mut [u64], &[u64])) {
        let words = self.words;
        let (reach_target, reach_source) = split_pair(&mut self.reach, words, target, source);
        let (tagged_target, tagged_source) = split_pair(&mut self.tagged, words, target, source);
        ((reach_target, reach_source), (tagged_target, tagged_source))
    }
}

fn split_pair(rows: &mut [u64], words: usize, target: usize, source: usize) -> (&mut [u64], &[u64]) {
    debug_assert_ne!(target, source);
    if target < source {
        let (low, high) = rows.split_at_mut(source * words);
        (&mut low[target * words..(target + 1) * words], &high[..words])
    } else {
        let (low, high) = rows.split_at_mut(target * words);
        (&mut high[..words], &low[source * words..(source + 1) * words])
    }
}

impl<T> MatrixGraph<T>
where
    T: Hash + Eq + Clone,
{
    /// Adds `from -> to`; returns `false` if either node is outside the node set.
    pub fn insert_edge(&mut self, from: &T, to: &T, tagged: bool) -> bool {
        match (self.nodes.index_of(from), self.nodes.index_of(to)) {
            (Some(from), Some(to)) => {
                self.insert_index(from, to, tagged);
                true
            }
            _ => false,
        }
    }

    #[must_use]
    pub fn has_edge(&self, from: &T, to: &T) -> bool {
        match (self.nodes.index_of(from), self.nodes.index_of(to)) {
            (Some(from), Some(to)) => self.contains_index(from, to),
            _ => false,
        }
    }

    #[must_use]
    pub fn has_tagged_edge(&self, from: &T, to: &T) -> bool {
        match (self.nodes.index_of(from), self.nodes.index_of(to)) {
            (Some(from), Some(to)) => self.is_tagged_index(from, to),
            _ => false,
        }
    }

    /// Matrix view of `graph`, every edge carrying the same tag.
    ///
    /// Edges touching nodes outside `nodes` are dropped.
    #[must_use]
    pub fn from_digraph(nodes: Arc<NodeSet<T>>, graph: &DiGraph<T>, tagged: bool) -> Self
    where
        T: Debug,
    {
        let mut result = Self::new(nodes);
        for (from, targets) in &graph.adj_map {
            for to in targets {
                result.insert_edge(from, to, tagged);
            }
        }
        result
    }

    /// Drops edges that session order already implies.
    ///
    /// `position` maps a node to `(session, height)`. For every node, only the
    /// session-earliest successor in each session is kept, plus the node's
    /// immediate successor in its own session. Reachability is preserved as
    /// long as the graph contains every immediate session-order edge; tags of
    /// dropped edges are not carried over.
    #[must_use]
    pub fn reduce_by_session<F>(&self, position: F) -> Self
    where
        F: Fn(&T) -> (u64, u64),
    {
        let mut result = Self::new(Arc::clone(&self.nodes));
        let mut earliest: HashMap<u64, (u64, usize)> = HashMap::new();
        for from in 0..self.len() {
            let (session, height) = position(self.nodes.node(from));
            earliest.clear();
            for to in self.successors(from) {
                let (to_session, to_height) = position(self.nodes.node(to));
                if to_session == session && to_height == height + 1 {
                    result.insert_index(from, to, self.is_tagged_index(from, to));
                }
                earliest
                    .entry(to_session)
                    .and_modify(|best| {
                        if to_height < best.0 {
                            *best = (to_height, to);
                        }
                    })
                    .or_insert((to_height, to));
            }
            for &(_, to) in earliest.values() {
                result.insert_index(from, to, self.is_tagged_index(from, to));
            }
        }
        result
    }

    /// An edge of `self` lying on a tagged cycle, given `closure`, the
    /// reachability of `self`.
    #[must_use]
    pub fn cycle_edge(&self, closure: &Self) -> Option<(T, T)> {
        self.edges()
            .find(|&(from, to, tagged)| {
                closure.contains_index(to, from) && (tagged || closure.is_tagged_index(to, from))
            })
            .map(|(from, to, _)| (self.nodes.node(from).clone(), self.nodes.node(to).clone()))
    }
}

#[cfg(test)]
mod tests {
    use rand::distr::{Distribution, Uniform};
    use rand::RngExt;

    use super::*;

    fn nodes(n: u32) -> Arc<NodeSet<u32>> {
        Arc::new(NodeSet::new(0..n))
    }

    fn graph(n: u32, edges: &[(u32, u32, bool)]) -> MatrixGraph<u32> {
        let mut graph = MatrixGraph::new(nodes(n));
        for &(from, to, tagged) in edges {
            assert!(graph.insert_edge(&from, &to, tagged));
        }
        graph
    }

    fn random_graph(n: u32, edges: usize, set: &Arc<NodeSet<u32>>) -> MatrixGraph<u32> {
        let mut rng = rand::rng();
        let range = Uniform::new(0, n).unwrap();
        let mut graph = MatrixGraph::new(Arc::clone(set));
        for _ in 0..edges {
            let from = range.sample(&mut rng);
            let to = range.sample(&mut rng);
            graph.insert_edge(&from, &to, rng.random::<bool>());
        }
        graph
    }

    #[test]
    fn test_node_set_dedup() {
        let set = NodeSet::new([3, 1, 3, 2]);
        assert_eq!(set.len(), 3);
        assert_eq!(set.index_of(&2), Some(2));
        assert_eq!(set.index_of(&7), None);
        assert_eq!(*set.node(0), 3);
    }

    #[test]
    fn test_closure_of_chain() {
        let chain = graph(4, &[(0, 1, false), (1, 2, true), (2, 3, false)]);
        for closure in [chain.reachability_dense(), chain.reachability_sparse()] {
            assert!(closure.has_edge(&0, &3));
            assert!(closure.has_tagged_edge(&0, &3));
            assert!(!closure.has_tagged_edge(&0, &1));
            assert!(closure.has_edge(&2, &2));
            assert!(!closure.has_edge(&3, &0));
            assert!(!closure.has_cycle());
        }
    }

    #[test]
    fn test_plain_cycle_is_not_tagged() {
        let plain = graph(3, &[(0, 1, false), (1, 2, false), (2, 0, false)]);
        let closure = plain.reachability_dense();
        assert!(closure.has_edge(&2, &1));
        assert!(!closure.has_cycle());
        assert_eq!(closure, plain.reachability_sparse());

        let tagged = graph(3, &[(0, 1, false), (1, 2, true), (2, 0, false)]);
        let closure = tagged.reachability_sparse();
        assert_eq!(closure.cyclic_nodes().count(), 3);
        assert_eq!(closure, tagged.reachability_dense());
        assert!(tagged.cycle_edge(&closure).is_some());
    }

    #[test]
    fn test_tagged_self_loop_taints_paths() {
        // 0 -> 1 (plain), 1 -> 1 (tagged), 1 -> 2 (plain)
        let looped = graph(3, &[(0, 1, false), (1, 1, true), (1, 2, false)]);
        let dense = looped.reachability_dense();
        assert!(dense.has_tagged_edge(&0, &2));
        assert!(dense.has_tagged_edge(&1, &1));
        assert_eq!(dense, looped.reachability_sparse());
    }

    #[test]
    fn test_composition() {
        let first = graph(4, &[(0, 1, false), (2, 3, true)]);
        let second = graph(4, &[(1, 2, true), (3, 0, false)]);
        for product in [
            first.composition_dense(&second),
            first.composition_sparse(&second),
        ] {
            assert_eq!(product.edge_count(), 2);
            assert!(product.has_tagged_edge(&0, &2));
            assert!(product.has_tagged_edge(&2, &0));
        }
    }

    #[test]
    fn test_union_and_digraph_view() {
        let set = nodes(3);
        let mut digraph = DiGraph::default();
        digraph.add_edge(0, 1);
        digraph.add_edge(9, 1);
        let first = MatrixGraph::from_digraph(Arc::clone(&set), &digraph, false);
        assert_eq!(first.edge_count(), 1);
        let mut second = MatrixGraph::new(set);
        second.insert_edge(&1, &2, true);
        let both = first.union(&second);
        assert!(both.has_edge(&0, &1));
        assert!(both.has_tagged_edge(&1, &2));
        assert_eq!(both.topological_order(), Some(vec![0, 1, 2]));
    }

    #[test]
    #[should_panic(expected = "different node sets")]
    fn test_union_requires_same_nodes() {
        let _ = graph(2, &[]).union(&graph(3, &[]));
    }

    #[test]
    fn test_session_reduction_keeps_reachability() {
        // nodes encode (session, height) as session * 10 + height
        let position = |node: &u32| (u64::from(node / 10), u64::from(node % 10));
        let set = Arc::new(NodeSet::new([0, 10, 11, 12, 20, 21]));
        let mut full = MatrixGraph::new(set);
        for (from, to, tagged) in [
            (0, 10, false),
            (0, 20, false),
            (10, 11, false),
            (11, 12, false),
            (20, 21, false),
            (20, 11, true),
            (20, 12, true),
            (0, 21, true),
            (10, 12, true),
        ] {
            full.insert_edge(&from, &to, tagged);
        }
        let reduced = full.reduce_by_session(position);
        assert!(!reduced.has_edge(&20, &12));
        assert!(!reduced.has_edge(&0, &21));
        assert!(!reduced.has_edge(&10, &12));
        assert!(reduced.has_edge(&20, &11));
        assert!(reduced.has_edge(&10, &11));
        assert_eq!(
            reduced.reachability_dense().edges().map(|(f, t, _)| (f, t)).collect::<Vec<_>>(),
            full.reachability_dense().edges().map(|(f, t, _)| (f, t)).collect::<Vec<_>>()
        );
    }

    #[test]
    fn test_random_dense_sparse_agree() {
        for round in 0..40 {
            let n = 1 + (round % 13) * 11;
            let set = nodes(n);
            let density = (n as usize) * (1 + round as usize % 4);
            let first = random_graph(n, density, &set);
            let second = random_graph(n, density, &set);

            assert_eq!(first.reachability_dense(), first.reachability_sparse());
            assert_eq!(
                first.composition_dense(&second),
                first.composition_sparse(&second)
            );

            // untagged reach bits agree with the adjacency-map closure
            let closure = first.reachability_dense();
            let mut digraph = DiGraph::default();
            for (from, to, _) in first.edges() {
                digraph.add_edge(from, to);
            }
            let reference = digraph.closure();
            for (from, targets) in &reference.adj_map {
                for to in targets {
                    assert!(closure.contains_index(*from, *to));
                }
            }
            let expected: usize = (0..n as usize)
                .map(|node| {
                    reference
                        .adj_map
                        .get(&node)
                        .map_or(1, |targets| targets.len() + usize::from(!targets.contains(&node)))
                })
                .sum();
            assert_eq!(closure.edge_count(), expected);
        }
    }

    #[test]
    fn test_random_dags_agree() {
        for n in [5u32, 40, 130] {
            let set = nodes(n);
            let mut rng = rand::rng();
            let range = Uniform::new(0, n).unwrap();
            let mut dag = MatrixGraph::new(Arc::clone(&set));
            for _ in 0..(n * 3) {
                let a = range.sample(&mut rng);
                let b = range.sample(&mut rng);
                if a < b {
                    dag.insert_edge(&a, &b, rng.random::<bool>());
                }
            }
            assert!(dag.topological_order().is_some());
            assert_eq!(dag.reachability_dense(), dag.reachability_sparse());
        }
    }
}
