use std::fmt::{Debug, Display, Formatter, Result};

use derive_more::From;
use polysi_core::history::HistoryError;

use crate::parser::ParseError;

/// Failure to load a history from disk or memory.
#[derive(Debug, From)]
pub enum LoadError<Key, Value> {
    Io(std::io::Error),
    /// The text DSL did not parse.
    Text(ParseError),
    /// A binary log is truncated, has trailing bytes or carries a bad value.
    Binary { offset: usize, message: String },
    /// A binary log header disagrees with its body.
    CountMismatch {
        what: &'static str,
        expected: u64,
        found: u64,
    },
    /// A binary log records a failed event.
    UnsuccessfulEvent {
        session: usize,
        transaction: usize,
        event: usize,
    },
    /// A binary log records an aborted transaction.
    UnsuccessfulTransaction { session: usize, transaction: usize },
    /// The sessions do not form a history.
    History(HistoryError<Key, Value>),
}

impl<Key: Debug, Value: Debug> Display for LoadError<Key, Value> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::Io(err) => write!(f, "{err}"),
            Self::Text(err) => write!(f, "{err}"),
            Self::Binary { offset, message } => {
                write!(f, "invalid binary log at byte {offset}: {message}")
            }
            Self::CountMismatch {
                what,
                expected,
                found,
            } => write!(f, "header announces {expected} {what}, log holds {found}"),
            Self::UnsuccessfulEvent {
                session,
                transaction,
                event,
            } => write!(
                f,
                "event {event} of transaction {transaction} in session {session} failed"
            ),
            Self::UnsuccessfulTransaction {
                session,
                transaction,
            } => write!(f, "transaction {transaction} in session {session} aborted"),
            Self::History(err) => write!(f, "invalid history: {err}"),
        }
    }
}

impl<Key: Debug, Value: Debug> std::error::Error for LoadError<Key, Value> {}
