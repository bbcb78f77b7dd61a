//! Graph representations: adjacency maps for sparse relations and bit-packed
//! matrices for closure-heavy pruning.

pub mod digraph;
pub mod matrix;

pub use digraph::DiGraph;
pub use matrix::{MatrixGraph, NodeSet, Reachability};
