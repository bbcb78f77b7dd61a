use alloc::vec::Vec;
use core::fmt::Debug;
use core::hash::Hash;

use hashbrown::{HashMap, HashSet};

/// Directed graph backed by an adjacency map.
///
/// Each vertex of type `T` maps to the set of its outgoing neighbors.
/// Vertices are added implicitly when they appear in an edge, or explicitly
/// via [`add_vertex`](Self::add_vertex). Self-loops are permitted.
///
/// Used for per-key write-read relations, for solver model graphs, and as the
/// edge source of [`MatrixGraph`](super::matrix::MatrixGraph) views.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Default, Debug, Clone, PartialEq, Eq)]
pub struct DiGraph<T>
where
    T: Hash + Eq + Clone + Debug,
{
    /// Maps each vertex to the set of vertices it has edges to.
    pub adj_map: HashMap<T, HashSet<T>>,
}

impl<T> DiGraph<T>
where
    T: Hash + Eq + Clone + Debug,
{
    /// Inserts a directed edge from `source` to `target`.
    ///
    /// Both vertices are added to the graph if not already present.
    /// Returns `true` if the edge is new.
    pub fn add_edge(&mut self, source: T, target: T) -> bool {
        self.adj_map.entry(target.clone()).or_default();
        self.adj_map.entry(source).or_default().insert(target)
    }

    /// Adds a vertex with no outgoing edges (if not already present).
    pub fn add_vertex(&mut self, source: T) {
        self.adj_map.entry(source).or_default();
    }

    /// Returns `true` if an edge from `source` to `target` exists.
    pub fn has_edge(&self, source: &T, target: &T) -> bool {
        self.adj_map
            .get(source)
            .is_some_and(|neighbor| neighbor.contains(target))
    }

    pub fn successors(&self, source: &T) -> impl Iterator<Item = &T> {
        self.adj_map.get(source).into_iter().flatten()
    }

    /// All edges as `(source, target)` pairs, in no particular order.
    pub fn edges(&self) -> impl Iterator<Item = (&T, &T)> {
        self.adj_map
            .iter()
            .flat_map(|(source, targets)| targets.iter().map(move |target| (source, target)))
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.adj_map.values().map(HashSet::len).sum()
    }

    /// Detects if the graph contains a cycle using Kahn's algorithm.
    /// Time complexity: O(V+E)
    #[must_use]
    pub fn has_cycle(&self) -> bool {
        self.topological_sort().is_none()
    }

    /// Returns a valid topological ordering of vertices if the graph is acyclic,
    /// or None if the graph contains a cycle.
    /// Uses Kahn's algorithm with time complexity O(V+E).
    #[must_use]
    pub fn topological_sort(&self) -> Option<Vec<T>> {
        let mut in_degree: HashMap<&T, usize> =
            self.adj_map.keys().map(|vertex| (vertex, 0)).collect();
        for (_, target) in self.edges() {
            *in_degree.entry(target).or_insert(0) += 1;
        }

        let mut queue: Vec<&T> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(&vertex, _)| vertex)
            .collect();

        let mut result = Vec::with_capacity(in_degree.len());
        while let Some(vertex) = queue.pop() {
            result.push(vertex.clone());
            for neighbor in self.successors(vertex) {
                if let Some(degree) = in_degree.get_mut(neighbor) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push(neighbor);
                    }
                }
            }
        }

        (result.len() == in_degree.len()).then_some(result)
    }

    /// Returns the vertices of some cycle `v0 -> v1 -> ... -> vk -> v0`, or
    /// `None` if the graph is acyclic. A self-loop yields a single vertex.
    ///
    /// Iterative depth-first search, O(V+E).
    #[must_use]
    pub fn find_cycle(&self) -> Option<Vec<T>> {
        // vertices on the current DFS path map to their position in `path`
        let mut on_path: HashMap<&T, usize> = HashMap::new();
        let mut done: HashSet<&T> = HashSet::new();

        for root in self.adj_map.keys() {
            if done.contains(root) {
                continue;
            }
            let mut path: Vec<&T> = Vec::new();
            let mut stack: Vec<(&T, Vec<&T>)> = Vec::new();
            on_path.insert(root, 0);
            path.push(root);
            stack.push((root, self.successors(root).collect()));

            while let Some((vertex, pending)) = stack.last_mut() {
                if let Some(next) = pending.pop() {
                    if let Some(&start) = on_path.get(next) {
                        return Some(path[start..].iter().map(|&v| v.clone()).collect());
                    }
                    if !done.contains(next) {
                        on_path.insert(next, path.len());
                        path.push(next);
                        let successors = self.successors(next).collect();
                        stack.push((next, successors));
                    }
                } else {
                    let vertex = *vertex;
                    on_path.remove(vertex);
                    done.insert(vertex);
                    path.pop();
                    stack.pop();
                }
            }
        }
        None
    }

    /// Mutates `reachable` to contain all vertices reachable from `source`.
    fn find_all_reachable_helper(&self, source: &T, mut reachable: HashSet<T>) -> HashSet<T> {
        let mut stack: Vec<&T> = self.successors(source).collect();
        while let Some(vertex) = stack.pop() {
            if reachable.insert(vertex.clone()) {
                stack.extend(self.successors(vertex));
            }
        }
        reachable
    }

    /// Computes the transitive closure of the graph.
    ///
    /// Returns a new graph where an edge `(u, v)` exists if and only if
    /// `v` is reachable from `u` in the original graph.
    #[must_use]
    pub fn closure(&self) -> Self {
        Self {
            adj_map: self
                .adj_map
                .keys()
                .map(|source| {
                    (
                        source.clone(),
                        self.find_all_reachable_helper(source, [].into()),
                    )
                })
                .collect(),
        }
    }
}
