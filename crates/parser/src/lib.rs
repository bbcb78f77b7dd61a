//! History loaders for `polysi`.
//!
//! - the compact text DSL ([`parser`], tokenized by [`lexer`]);
//! - DBCop binary logs ([`dbcop`]), readable and writable.
//!
//! Both produce raw sessions; [`loader`] turns them into a
//! [`History`](polysi_core::History) through
//! [`HistoryLoader`](polysi_core::HistoryLoader).

pub mod dbcop;
pub mod error;
pub mod lexer;
pub mod loader;
pub mod parser;

pub use dbcop::{parse_dbcop, write_dbcop, DbcopHeader, DbcopLog};
pub use error::LoadError;
pub use lexer::{tokenize, tokenize_with_text, Token, TokenKind};
pub use loader::{load_dbcop_file, load_text_file, DbcopLoader, TextLoader};
pub use parser::{parse_history, ParseError};
