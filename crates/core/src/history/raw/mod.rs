//! Raw, loader-facing histories: `Vec<Session>` of plain transactions.
//!
//! Session `i` of a raw slice (0-based) becomes session `i + 1` of the
//! [`History`]. A read with no value (`x==?` in the text DSL) observes the
//! key's initial value, `Value::default()`, which the init transaction writes.

use core::hash::Hash;

use tracing::debug;

use self::types::{Event, Session};
use super::{EventKind, History, HistoryError, HistoryLoader};

pub mod display;
pub mod types;

impl<Key, Value> TryFrom<&[Session<Key, Value>]> for History<Key, Value>
where
    Key: Eq + Hash + Clone,
    Value: Eq + Hash + Clone + Default,
{
    type Error = HistoryError<Key, Value>;

    fn try_from(sessions: &[Session<Key, Value>]) -> Result<Self, Self::Error> {
        let mut history = Self::new();

        for session in sessions {
            let session_id = history.add_session();
            for transaction in session {
                let id = history.add_transaction(session_id)?;
                for event in &transaction.events {
                    match event {
                        Event::Write { key, value } => {
                            history.add_event(id, EventKind::Write, key.clone(), value.clone())?;
                        }
                        Event::Read {
                            key,
                            value: Some(value),
                        } => {
                            history.add_event(id, EventKind::Read, key.clone(), value.clone())?;
                        }
                        Event::Read { key, value: None } => {
                            let initial = Value::default();
                            if history.writer_of(key, &initial).is_none() {
                                history.add_initial_write(key.clone(), initial.clone())?;
                            }
                            history.add_event(id, EventKind::Read, key.clone(), initial)?;
                        }
                    }
                }
                if transaction.committed {
                    history.commit(id)?;
                }
            }
        }

        debug!(
            sessions = history.session_count(),
            transactions = history.transaction_count(),
            events = history.event_count(),
            "loaded raw history"
        );
        Ok(history)
    }
}

impl<Key, Value> HistoryLoader<Key, Value> for &[Session<Key, Value>]
where
    Key: Eq + Hash + Clone,
    Value: Eq + Hash + Clone + Default,
{
    type Error = HistoryError<Key, Value>;

    fn load_history(&mut self) -> Result<History<Key, Value>, Self::Error> {
        History::try_from(*self)
    }
}

#[cfg(test)]
mod tests {
    use super::types::Transaction;
    use super::*;
    use crate::history::{MalformedHistory, TransactionId};

    #[test]
    fn test_sessions_are_numbered_from_one() {
        let sessions = vec![
            vec![Transaction::committed(vec![Event::write("x", 1)])],
            vec![
                Transaction::committed(vec![Event::read("x", 1)]),
                Transaction::uncommitted(vec![Event::write("y", 1)]),
            ],
        ];
        let history = History::try_from(sessions.as_slice()).unwrap();
        assert_eq!(history.session_count(), 2);
        let second = history.transaction(TransactionId::new(2, 1)).unwrap();
        assert!(!second.is_committed());
        assert_eq!(
            history.validate(),
            Err(MalformedHistory::UncommittedTransaction(TransactionId::new(2, 1)))
        );
    }

    #[test]
    fn test_initial_reads_go_to_init() {
        let sessions = vec![
            vec![Transaction::committed(vec![Event::read_initial("x")])],
            vec![Transaction::committed(vec![Event::read_initial("x")])],
        ];
        let mut loader = sessions.as_slice();
        let history = loader.load_history().unwrap();
        assert_eq!(history.init().events.len(), 1);
        assert_eq!(
            history.writer_of(&"x", &0u64).unwrap().transaction,
            TransactionId::init()
        );
        assert!(history.validate().is_ok());
    }

    #[test]
    fn test_duplicate_write_in_raw_history() {
        let sessions = vec![
            vec![Transaction::committed(vec![Event::write("x", 1)])],
            vec![Transaction::committed(vec![Event::write("x", 1)])],
        ];
        assert!(matches!(
            History::try_from(sessions.as_slice()),
            Err(HistoryError::DuplicateWrite { .. })
        ));
    }
}
