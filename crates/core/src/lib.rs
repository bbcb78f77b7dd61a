//! Snapshot isolation and serializability auditing for transactional histories.
//!
//! `polysi_core` holds everything of the audit that does not need a SAT
//! engine:
//!
//! 1. **History model** ([`history`]) -- sessions, transactions and
//!    read/write events, with the unique-write invariant enforced on
//!    construction and [`History::validate`](history::History::validate)
//!    catching internally inconsistent histories.
//! 2. **Matrix graphs** ([`graph::matrix`]) -- bit-packed adjacency matrices
//!    with tagged edges, dense and sparse composition and closure.
//! 3. **Precedence graph** ([`consistency::precedence`]) -- known edges
//!    (graph A) and accepted anti-dependencies (graph B).
//! 4. **Constraints** ([`consistency::constraint`]) -- one either-or
//!    ordering choice per pair of transactions writing a common key.
//! 5. **Pruning** ([`consistency::pruning`]) -- resolves constraints whose
//!    one side would close a cycle.
//!
//! The `polysi_sat` crate decides the constraints pruning leaves open and
//! exposes the `audit` entry point.
//!
//! ```rust,ignore
//! use polysi_core::{generate_constraints, prune_constraints, AuditOptions, PrecedenceGraph};
//!
//! history.validate()?;
//! let mut graph = PrecedenceGraph::new(&history);
//! let mut constraints = generate_constraints(&history, &graph);
//! let report = prune_constraints(&mut graph, &mut constraints, &AuditOptions::default())?;
//! println!("{} constraints left for the solver", report.remaining);
//! ```
//!
//! # Crate features
//!
//! - **`serde`** -- `Serialize`/`Deserialize` on histories, options,
//!   witnesses and errors.
//! - **`schemars`** -- `JsonSchema` on raw history types.
//! - **`parallel`** -- sparse closures and pruning checks run on `rayon`.
//!
//! Without `schemars` and `parallel` this crate is `no_std` (requires
//! `alloc`). Parsers and loaders live in `polysi_parser`.

#![cfg_attr(not(any(test, feature = "schemars", feature = "parallel")), no_std)]
extern crate alloc;

pub mod consistency;
pub mod graph;
pub mod history;

pub use consistency::{
    generate_constraints, prune_constraints, AuditOptions, Error, IsolationLevel,
    PrecedenceGraph, PruningMode, PruningReport, Reachability, Witness,
};
pub use history::{History, HistoryLoader, TransactionId};
