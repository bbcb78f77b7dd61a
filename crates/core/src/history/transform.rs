//! Reduction of Snapshot Isolation checking to Serializability checking.
//!
//! Every non-init transaction `T` is split into a read half `T_r` and a write
//! half `T_w` placed back to back in `T`'s session. For every ordered pair of
//! transactions `(T, U)` writing a common key, a fresh conflict key `k(T, U)`
//! makes `T_r` write `k(T, U)`, `T_w` read it back, and `T_w` overwrite
//! `k(U, T)`. `U`'s halves cannot then interleave between `T_r` and `T_w`
//! in a serial order, which is exactly first-committer-wins.
//!
//! The input history is SI iff the output history is serializable.

use alloc::collections::{BTreeMap, BTreeSet};
use core::fmt::{Display, Formatter, Result};
use core::hash::Hash;

use hashbrown::{HashMap, HashSet};
use tracing::debug;

use super::{EventKind, History, HistoryError, TransactionId};

/// Key of a transformed history.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransformedKey<Key> {
    Original(Key),
    /// Synthetic key guarding one ordered pair of conflicting writers.
    Conflict(u64),
}

/// Value of a transformed history.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TransformedValue<Value> {
    Original(Value),
    /// Only ever stored under a [`TransformedKey::Conflict`] key.
    Generated(u64),
}

impl<Value: Default> Default for TransformedValue<Value> {
    fn default() -> Self {
        Self::Original(Value::default())
    }
}

impl<Key: Display> Display for TransformedKey<Key> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::Original(key) => write!(f, "{key}"),
            Self::Conflict(id) => write!(f, "_c{id}"),
        }
    }
}

impl<Value: Display> Display for TransformedValue<Value> {
    fn fmt(&self, f: &mut Formatter) -> Result {
        match self {
            Self::Original(value) => write!(f, "{value}"),
            Self::Generated(value) => write!(f, "{value}"),
        }
    }
}

type Transformed<Key, Value> = History<TransformedKey<Key>, TransformedValue<Value>>;

#[derive(Clone, Copy)]
struct ConflictSlot {
    key: u64,
    /// written by the read half of the pair's first transaction
    marker: u64,
    /// written by the write half of the pair's second transaction
    overwrite: u64,
}

#[derive(Default)]
struct SlotAllocator {
    slots: HashMap<(TransactionId, TransactionId), ConflictSlot>,
    next_key: u64,
    next_value: u64,
}

impl SlotAllocator {
    fn slot(&mut self, first: TransactionId, second: TransactionId) -> ConflictSlot {
        *self.slots.entry((first, second)).or_insert_with(|| {
            let slot = ConflictSlot {
                key: self.next_key,
                marker: self.next_value,
                overwrite: self.next_value + 1,
            };
            self.next_key += 1;
            self.next_value += 2;
            slot
        })
    }
}

/// Builds the serializability instance equivalent to checking `history` for SI.
///
/// # Errors
///
/// Propagates [`HistoryError`]s from building the new history; these only
/// occur if `history` itself breaks the unique-write invariant.
pub fn snapshot_isolation_to_serializable<Key, Value>(
    history: &History<Key, Value>,
) -> core::result::Result<Transformed<Key, Value>, HistoryError<TransformedKey<Key>, TransformedValue<Value>>>
where
    Key: Eq + Hash + Clone,
    Value: Eq + Hash + Clone,
{
    let mut writers: HashMap<&Key, BTreeSet<TransactionId>> = HashMap::new();
    for transaction in history.transactions().filter(|t| !t.id.is_init()) {
        for event in transaction.writes() {
            writers.entry(&event.key).or_default().insert(transaction.id);
        }
    }

    let mut partners: BTreeMap<TransactionId, BTreeSet<TransactionId>> = BTreeMap::new();
    for group in writers.values() {
        for &t in group {
            for &u in group {
                if t != u {
                    partners.entry(t).or_default().insert(u);
                }
            }
        }
    }

    let mut allocator = SlotAllocator::default();
    let mut transformed = History::new();

    for event in &history.init().events {
        transformed.add_initial_write(
            TransformedKey::Original(event.key.clone()),
            TransformedValue::Original(event.value.clone()),
        )?;
    }

    for session in history.sessions() {
        let session_id = transformed.add_session();
        for transaction in &session.transactions {
            let read_half = transformed.add_transaction(session_id)?;
            let write_half = transformed.add_transaction(session_id)?;

            let mut written: HashSet<&Key> = HashSet::new();
            for event in &transaction.events {
                let key = TransformedKey::Original(event.key.clone());
                let value = TransformedValue::Original(event.value.clone());
                match event.kind {
                    EventKind::Read if written.contains(&event.key) => {}
                    EventKind::Read => {
                        transformed.add_event(read_half, EventKind::Read, key, value)?;
                    }
                    EventKind::Write => {
                        written.insert(&event.key);
                        transformed.add_event(write_half, EventKind::Write, key, value)?;
                    }
                }
            }

            for &other in partners.get(&transaction.id).into_iter().flatten() {
                let own = allocator.slot(transaction.id, other);
                let theirs = allocator.slot(other, transaction.id);
                transformed.add_event(
                    read_half,
                    EventKind::Write,
                    TransformedKey::Conflict(own.key),
                    TransformedValue::Generated(own.marker),
                )?;
                transformed.add_event(
                    write_half,
                    EventKind::Read,
                    TransformedKey::Conflict(own.key),
                    TransformedValue::Generated(own.marker),
                )?;
                transformed.add_event(
                    write_half,
                    EventKind::Write,
                    TransformedKey::Conflict(theirs.key),
                    TransformedValue::Generated(theirs.overwrite),
                )?;
            }

            if transaction.is_committed() {
                transformed.commit(read_half)?;
                transformed.commit(write_half)?;
            }
        }
    }

    debug!(
        transactions = transformed.transaction_count(),
        conflict_keys = allocator.next_key,
        "transformed history for serializability"
    );
    Ok(transformed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::raw::types::{Event, Transaction};

    #[test]
    fn test_split_and_conflict_keys() {
        let sessions = vec![
            vec![Transaction::committed(vec![
                Event::read("x", 0),
                Event::write("x", 1),
                Event::read("x", 1),
            ])],
            vec![Transaction::committed(vec![Event::write("x", 2)])],
            vec![Transaction::committed(vec![Event::write("y", 1)])],
        ];
        let mut history = History::new();
        history.add_initial_write("x", 0).unwrap();
        let raw = History::try_from(sessions.as_slice()).unwrap();
        for session in raw.sessions() {
            let id = history.add_session();
            for transaction in &session.transactions {
                let t = history.add_transaction(id).unwrap();
                for event in &transaction.events {
                    history
                        .add_event(t, event.kind, event.key, event.value)
                        .unwrap();
                }
                history.commit(t).unwrap();
            }
        }
        assert!(history.validate().is_ok());

        let transformed = snapshot_isolation_to_serializable(&history).unwrap();
        assert!(transformed.validate().is_ok());
        // init + two halves for each of the three transactions
        assert_eq!(transformed.transaction_count(), 7);

        let first_read = transformed.transaction(TransactionId::new(1, 0)).unwrap();
        // the own-write read is dropped, the conflict marker is written
        assert_eq!(first_read.reads().count(), 1);
        assert_eq!(first_read.writes().count(), 1);

        let first_write = transformed.transaction(TransactionId::new(1, 1)).unwrap();
        assert_eq!(first_write.reads().count(), 1);
        assert_eq!(first_write.writes().count(), 2);

        // y has a single writer: no conflict keys for session 3
        let lonely = transformed.transaction(TransactionId::new(3, 1)).unwrap();
        assert_eq!(lonely.events.len(), 1);
        assert_eq!(transformed.init().events.len(), 1);
    }

    #[test]
    fn test_display() {
        assert_eq!(TransformedKey::Original("x").to_string(), "x");
        assert_eq!(TransformedKey::<&str>::Conflict(4).to_string(), "_c4");
        assert_eq!(TransformedValue::<u64>::Generated(9).to_string(), "9");
    }
}
