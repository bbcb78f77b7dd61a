use alloc::vec::Vec;
use core::fmt::{Display, Formatter, Result};

/// Unique identifier for a transaction within a history.
///
/// A transaction is identified by the session it belongs to (`session_id`)
/// and its position within that session (`session_height`). Ordering is
/// lexicographic: first by `session_id`, then by `session_height`.
///
/// The default value `(0, 0)` is the **init transaction**: the source of every
/// key's initial value. It forms session 0 on its own and precedes the first
/// transaction of every other session.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId {
    /// 1-based session index. Session 0 is reserved for the init transaction.
    pub session_id: u64,
    /// 0-based position of the transaction within its session.
    pub session_height: u64,
}

impl TransactionId {
    /// Returns the init transaction `(0, 0)`.
    #[must_use]
    pub const fn init() -> Self {
        Self {
            session_id: 0,
            session_height: 0,
        }
    }

    #[must_use]
    pub const fn new(session_id: u64, session_height: u64) -> Self {
        Self {
            session_id,
            session_height,
        }
    }

    #[must_use]
    pub const fn is_init(&self) -> bool {
        self.session_id == 0
    }

    /// `(session, height)` pair used by the session-order reduction.
    #[must_use]
    pub const fn position(&self) -> (u64, u64) {
        (self.session_id, self.session_height)
    }
}

impl Display for TransactionId {
    fn fmt(&self, f: &mut Formatter) -> Result {
        if self.is_init() {
            write!(f, "T(init)")
        } else {
            write!(f, "T({}:{})", self.session_id, self.session_height)
        }
    }
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EventKind {
    Read,
    Write,
}

/// A read or write of `key` with `value`, owned by `transaction`.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Event<Key, Value> {
    pub transaction: TransactionId,
    pub kind: EventKind,
    pub key: Key,
    pub value: Value,
}

impl<Key, Value> Event<Key, Value> {
    #[must_use]
    pub const fn is_read(&self) -> bool {
        matches!(self.kind, EventKind::Read)
    }

    #[must_use]
    pub const fn is_write(&self) -> bool {
        matches!(self.kind, EventKind::Write)
    }
}

impl<Key, Value> Display for Event<Key, Value>
where
    Key: Display,
    Value: Display,
{
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self.kind {
            EventKind::Read => write!(f, "r({}, {})", self.key, self.value),
            EventKind::Write => write!(f, "w({}, {})", self.key, self.value),
        }
    }
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    Ongoing,
    Commit,
}

/// Events of one transaction in program order.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction<Key, Value> {
    pub id: TransactionId,
    pub events: Vec<Event<Key, Value>>,
    pub status: TransactionStatus,
}

impl<Key, Value> Transaction<Key, Value> {
    pub(crate) const fn new(id: TransactionId) -> Self {
        Self {
            id,
            events: Vec::new(),
            status: TransactionStatus::Ongoing,
        }
    }

    #[must_use]
    pub const fn is_committed(&self) -> bool {
        matches!(self.status, TransactionStatus::Commit)
    }

    pub fn reads(&self) -> impl Iterator<Item = &Event<Key, Value>> {
        self.events.iter().filter(|event| event.is_read())
    }

    pub fn writes(&self) -> impl Iterator<Item = &Event<Key, Value>> {
        self.events.iter().filter(|event| event.is_write())
    }
}

impl<Key, Value> Display for Transaction<Key, Value>
where
    Key: Display,
    Value: Display,
{
    fn fmt(&self, f: &mut Formatter) -> Result {
        write!(f, "{} [", self.id)?;
        for (i, event) in self.events.iter().enumerate() {
            if i > 0 {
                write!(f, " ")?;
            }
            write!(f, "{event}")?;
        }
        write!(f, "]")?;
        if !self.is_committed() {
            write!(f, "!")?;
        }
        Ok(())
    }
}

/// A client's sequential run of transactions; their order is session order.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session<Key, Value> {
    pub id: u64,
    pub transactions: Vec<Transaction<Key, Value>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_ordering() {
        let init = TransactionId::init();
        assert!(init.is_init());
        assert!(init < TransactionId::new(1, 0));
        assert!(TransactionId::new(1, 5) < TransactionId::new(2, 0));
        assert_eq!(init, TransactionId::default());
    }

    #[test]
    fn test_transaction_display() {
        let mut transaction = Transaction::new(TransactionId::new(2, 1));
        transaction.events.push(Event {
            transaction: transaction.id,
            kind: EventKind::Read,
            key: "x",
            value: 1,
        });
        transaction.events.push(Event {
            transaction: transaction.id,
            kind: EventKind::Write,
            key: "y",
            value: 2,
        });
        assert_eq!(transaction.to_string(), "T(2:1) [r(x, 1) w(y, 2)]!");
        transaction.status = TransactionStatus::Commit;
        assert_eq!(transaction.to_string(), "T(2:1) [r(x, 1) w(y, 2)]");
        assert_eq!(transaction.reads().count(), 1);
        assert_eq!(transaction.writes().count(), 1);
    }
}
