use core::fmt::{Debug, Display, Formatter, Result};

use super::types::TransactionId;

/// Position of an event: its transaction and index within that transaction.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId {
    pub transaction: TransactionId,
    pub index: usize,
}

impl Display for EventId {
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "{}#{}", self.transaction, self.index)
    }
}

/// Error while building a [`History`](super::History).
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryError<Key, Value> {
    /// Two write events produced the same `(key, value)`.
    DuplicateWrite {
        key: Key,
        value: Value,
        ids: [EventId; 2],
    },
    UnknownSession(u64),
    UnknownTransaction(TransactionId),
    /// Events may only be appended to, and commits only happen on, ongoing transactions.
    AlreadyCommitted(TransactionId),
    /// The init transaction only writes initial values and never commits.
    InitTransaction,
}

/// Internal inconsistency found by [`History::validate`](super::History::validate).
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedHistory<Key, Value> {
    /// A non-init transaction never committed.
    UncommittedTransaction(TransactionId),
    /// A read observes a value nobody wrote.
    MissingWrite { id: EventId, key: Key, value: Value },
    /// A read observes a write that comes later in its own transaction.
    FutureRead {
        read: EventId,
        write: EventId,
        key: Key,
        value: Value,
    },
    /// A read after a local write of the same key misses that write.
    NotOwnWrite {
        read: EventId,
        local_write: EventId,
        key: Key,
        value: Value,
    },
    /// A read observes a write that its transaction overwrote later.
    IntermediateRead {
        read: EventId,
        write: EventId,
        key: Key,
        value: Value,
    },
}

impl<Key: Debug, Value: Debug> Display for HistoryError<Key, Value> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::DuplicateWrite { key, value, ids } => write!(
                f,
                "({key:?}, {value:?}) is written by both {} and {}",
                ids[0], ids[1]
            ),
            Self::UnknownSession(id) => write!(f, "unknown session {id}"),
            Self::UnknownTransaction(id) => write!(f, "unknown transaction {id}"),
            Self::AlreadyCommitted(id) => write!(f, "{id} is already committed"),
            Self::InitTransaction => {
                write!(f, "init transaction only accepts initial writes")
            }
        }
    }
}

impl<Key: Debug, Value: Debug> Display for MalformedHistory<Key, Value> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::UncommittedTransaction(id) => write!(f, "{id} did not commit"),
            Self::MissingWrite { id, key, value } => {
                write!(f, "{id} reads ({key:?}, {value:?}) which is never written")
            }
            Self::FutureRead {
                read,
                write,
                key,
                value,
            } => write!(
                f,
                "{read} reads ({key:?}, {value:?}) written later at {write}"
            ),
            Self::NotOwnWrite {
                read,
                local_write,
                key,
                value,
            } => write!(
                f,
                "{read} reads ({key:?}, {value:?}) after its own write at {local_write}"
            ),
            Self::IntermediateRead {
                read,
                write,
                key,
                value,
            } => write!(
                f,
                "{read} reads ({key:?}, {value:?}) from {write}, which is overwritten before commit"
            ),
        }
    }
}
