//! Normalized transactional histories.
//!
//! A [`History`] owns sessions, their transactions and every read/write
//! event. Construction goes through [`History::add_session`],
//! [`History::add_transaction`], [`History::add_event`] and
//! [`History::commit`], which enforce that no `(key, value)` pair is written
//! twice. Raw sessions convert through `TryFrom` (see [`raw`]).
//!
//! Loaders produce a `History` through the [`HistoryLoader`] trait; the core
//! never looks at on-disk formats.

use alloc::vec::Vec;
use core::hash::Hash;

use hashbrown::HashMap;

pub mod error;
pub mod raw;
pub mod transform;
pub mod types;

pub use error::{EventId, HistoryError, MalformedHistory};
pub use types::{Event, EventKind, Session, Transaction, TransactionId, TransactionStatus};

/// Produces a fully formed [`History`] from some source.
pub trait HistoryLoader<Key, Value> {
    type Error;

    /// Load (or build) the history.
    ///
    /// # Errors
    ///
    /// Returns the loader's error when the source cannot be turned into a history.
    fn load_history(&mut self) -> Result<History<Key, Value>, Self::Error>;
}

/// Sessions, transactions and events of one recorded execution.
#[derive(Debug, Clone)]
pub struct History<Key, Value> {
    init: Transaction<Key, Value>,
    sessions: Vec<Session<Key, Value>>,
    writes: HashMap<Key, HashMap<Value, EventId>>,
}

impl<Key, Value> Default for History<Key, Value> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Key, Value> History<Key, Value> {
    /// An empty history holding only the (event-less) init transaction.
    #[must_use]
    pub fn new() -> Self {
        Self {
            init: Transaction::new(TransactionId::init()),
            sessions: Vec::new(),
            writes: HashMap::new(),
        }
    }

    #[must_use]
    pub const fn init(&self) -> &Transaction<Key, Value> {
        &self.init
    }

    #[must_use]
    pub fn sessions(&self) -> &[Session<Key, Value>] {
        &self.sessions
    }

    #[must_use]
    pub fn session(&self, id: u64) -> Option<&Session<Key, Value>> {
        let index = usize::try_from(id.checked_sub(1)?).ok()?;
        self.sessions.get(index)
    }

    /// The init transaction followed by every session's transactions in order.
    pub fn transactions(&self) -> impl Iterator<Item = &Transaction<Key, Value>> {
        core::iter::once(&self.init).chain(
            self.sessions
                .iter()
                .flat_map(|session| session.transactions.iter()),
        )
    }

    #[must_use]
    pub fn transaction(&self, id: TransactionId) -> Option<&Transaction<Key, Value>> {
        if id.is_init() {
            return (id.session_height == 0).then_some(&self.init);
        }
        let height = usize::try_from(id.session_height).ok()?;
        self.session(id.session_id)?.transactions.get(height)
    }

    fn transaction_mut(&mut self, id: TransactionId) -> Option<&mut Transaction<Key, Value>> {
        if id.is_init() {
            return (id.session_height == 0).then_some(&mut self.init);
        }
        let index = usize::try_from(id.session_id.checked_sub(1)?).ok()?;
        let height = usize::try_from(id.session_height).ok()?;
        self.sessions.get_mut(index)?.transactions.get_mut(height)
    }

    pub fn events(&self) -> impl Iterator<Item = &Event<Key, Value>> {
        self.transactions()
            .flat_map(|transaction| transaction.events.iter())
    }

    #[must_use]
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Number of transactions, the init transaction included.
    #[must_use]
    pub fn transaction_count(&self) -> usize {
        1 + self
            .sessions
            .iter()
            .map(|session| session.transactions.len())
            .sum::<usize>()
    }

    #[must_use]
    pub fn event_count(&self) -> usize {
        self.transactions()
            .map(|transaction| transaction.events.len())
            .sum()
    }

    /// Opens a new session and returns its id (1-based).
    pub fn add_session(&mut self) -> u64 {
        let id = self.sessions.len() as u64 + 1;
        self.sessions.push(Session {
            id,
            transactions: Vec::new(),
        });
        id
    }

    /// Starts a new ongoing transaction at the end of `session_id`.
    ///
    /// # Errors
    ///
    /// [`HistoryError::UnknownSession`] if the session does not exist.
    pub fn add_transaction(
        &mut self,
        session_id: u64,
    ) -> Result<TransactionId, HistoryError<Key, Value>> {
        let index = session_id
            .checked_sub(1)
            .and_then(|index| usize::try_from(index).ok())
            .ok_or(HistoryError::UnknownSession(session_id))?;
        let session = self
            .sessions
            .get_mut(index)
            .ok_or(HistoryError::UnknownSession(session_id))?;
        let id = TransactionId::new(session_id, session.transactions.len() as u64);
        session.transactions.push(Transaction::new(id));
        Ok(id)
    }

    /// Moves an ongoing transaction to the committed state.
    ///
    /// # Errors
    ///
    /// Fails for unknown or already committed transactions, and for the init
    /// transaction, which never commits.
    pub fn commit(&mut self, id: TransactionId) -> Result<(), HistoryError<Key, Value>> {
        if id.is_init() {
            return Err(HistoryError::InitTransaction);
        }
        let transaction = self
            .transaction_mut(id)
            .ok_or(HistoryError::UnknownTransaction(id))?;
        if transaction.is_committed() {
            return Err(HistoryError::AlreadyCommitted(id));
        }
        transaction.status = TransactionStatus::Commit;
        Ok(())
    }
}

impl<Key, Value> History<Key, Value>
where
    Key: Eq + Hash + Clone,
    Value: Eq + Hash + Clone,
{
    /// Appends an event to an ongoing transaction.
    ///
    /// # Errors
    ///
    /// - [`HistoryError::DuplicateWrite`] if `(key, value)` was already written;
    /// - [`HistoryError::AlreadyCommitted`] if the transaction is committed;
    /// - [`HistoryError::InitTransaction`] for reads on the init transaction;
    /// - [`HistoryError::UnknownTransaction`] if `id` does not exist.
    pub fn add_event(
        &mut self,
        id: TransactionId,
        kind: EventKind,
        key: Key,
        value: Value,
    ) -> Result<EventId, HistoryError<Key, Value>> {
        if id.is_init() && kind == EventKind::Read {
            return Err(HistoryError::InitTransaction);
        }
        let index = {
            let transaction = self
                .transaction_mut(id)
                .ok_or(HistoryError::UnknownTransaction(id))?;
            if transaction.is_committed() {
                return Err(HistoryError::AlreadyCommitted(id));
            }
            transaction.events.len()
        };
        let event_id = EventId {
            transaction: id,
            index,
        };

        if kind == EventKind::Write {
            if let Some(existing) = self.writer_of(&key, &value) {
                return Err(HistoryError::DuplicateWrite {
                    key,
                    value,
                    ids: [existing, event_id],
                });
            }
            self.writes
                .entry(key.clone())
                .or_default()
                .insert(value.clone(), event_id);
        }

        if let Some(transaction) = self.transaction_mut(id) {
            transaction.events.push(Event {
                transaction: id,
                kind,
                key,
                value,
            });
        }
        Ok(event_id)
    }

    /// Records an initial value produced by the init transaction.
    ///
    /// # Errors
    ///
    /// [`HistoryError::DuplicateWrite`] if `(key, value)` is already written.
    pub fn add_initial_write(
        &mut self,
        key: Key,
        value: Value,
    ) -> Result<EventId, HistoryError<Key, Value>> {
        self.add_event(TransactionId::init(), EventKind::Write, key, value)
    }

    /// The write event that produced `(key, value)`, if any.
    #[must_use]
    pub fn writer_of(&self, key: &Key, value: &Value) -> Option<EventId> {
        self.writes.get(key)?.get(value).copied()
    }

    /// Checks the internal consistency of a fully loaded history.
    ///
    /// # Errors
    ///
    /// Returns the first [`MalformedHistory`] found, scanning transactions in
    /// order: uncommitted transactions, reads with no matching write, reads of
    /// a later write of the same transaction, and reads that miss the
    /// transaction's own preceding write of the key.
    pub fn validate(&self) -> Result<(), MalformedHistory<Key, Value>> {
        for transaction in self.transactions() {
            let id = transaction.id;
            if !id.is_init() && !transaction.is_committed() {
                return Err(MalformedHistory::UncommittedTransaction(id));
            }

            let mut local_writes: HashMap<&Key, usize> = HashMap::new();
            for (index, event) in transaction.events.iter().enumerate() {
                let event_id = EventId {
                    transaction: id,
                    index,
                };
                if event.is_write() {
                    local_writes.insert(&event.key, index);
                    continue;
                }

                let write = self.writer_of(&event.key, &event.value).ok_or_else(|| {
                    MalformedHistory::MissingWrite {
                        id: event_id,
                        key: event.key.clone(),
                        value: event.value.clone(),
                    }
                })?;

                if write.transaction == id && write.index > index {
                    return Err(MalformedHistory::FutureRead {
                        read: event_id,
                        write,
                        key: event.key.clone(),
                        value: event.value.clone(),
                    });
                }

                if let Some(&local) = local_writes.get(&event.key) {
                    if write.transaction != id || write.index != local {
                        return Err(MalformedHistory::NotOwnWrite {
                            read: event_id,
                            local_write: EventId {
                                transaction: id,
                                index: local,
                            },
                            key: event.key.clone(),
                            value: event.value.clone(),
                        });
                    }
                }

                if write.transaction != id && self.overwritten(write, &event.key) {
                    return Err(MalformedHistory::IntermediateRead {
                        read: event_id,
                        write,
                        key: event.key.clone(),
                        value: event.value.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    fn overwritten(&self, write: EventId, key: &Key) -> bool {
        self.transaction(write.transaction).is_some_and(|writer| {
            writer.events[write.index + 1..]
                .iter()
                .any(|event| event.is_write() && event.key == *key)
        })
    }

    /// Flattens the history back into raw sessions.
    ///
    /// A non-empty init transaction becomes a committed transaction of its own
    /// leading session.
    #[must_use]
    pub fn to_raw(&self) -> Vec<raw::types::Session<Key, Value>> {
        let convert = |transaction: &Transaction<Key, Value>| raw::types::Transaction {
            events: transaction
                .events
                .iter()
                .map(|event| match event.kind {
                    EventKind::Read => {
                        raw::types::Event::read(event.key.clone(), event.value.clone())
                    }
                    EventKind::Write => {
                        raw::types::Event::write(event.key.clone(), event.value.clone())
                    }
                })
                .collect(),
            committed: transaction.id.is_init() || transaction.is_committed(),
        };

        let init = (!self.init.events.is_empty()).then(|| alloc::vec![convert(&self.init)]);
        init.into_iter()
            .chain(
                self.sessions
                    .iter()
                    .map(|session| session.transactions.iter().map(convert).collect()),
            )
            .collect()
    }
}
