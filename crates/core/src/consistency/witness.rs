use alloc::vec::Vec;
use core::hash::Hash;

use hashbrown::{HashMap, HashSet};

use crate::history::{EventKind, History, Transaction, TransactionId};

/// Evidence that a history satisfies an isolation level.
///
/// The init transaction is implicit: it commits before anything else and is
/// never listed.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Witness {
    /// Serial order of transactions. Returned for serializability.
    CommitOrder(Vec<TransactionId>),
    /// Split commit order for snapshot isolation.
    /// Each transaction appears twice: `(id, false)` takes its snapshot,
    /// `(id, true)` commits its writes.
    SplitCommitOrder(Vec<(TransactionId, bool)>),
}

/// Committed versions per key, in commit order.
struct VersionStore<'a, Key, Value> {
    versions: HashMap<&'a Key, Vec<(usize, &'a Value)>>,
}

impl<'a, Key, Value> VersionStore<'a, Key, Value>
where
    Key: Eq + Hash,
{
    fn new(init: &'a Transaction<Key, Value>) -> Self {
        let mut store = Self {
            versions: HashMap::new(),
        };
        store.install(init, 0);
        store
    }

    fn install(&mut self, transaction: &'a Transaction<Key, Value>, position: usize) {
        for event in transaction.writes() {
            let versions = self.versions.entry(&event.key).or_default();
            // a transaction overwriting its own key installs the last value
            if versions.last().is_some_and(|&(at, _)| at == position) {
                versions.pop();
            }
            versions.push((position, &event.value));
        }
    }

    /// Latest value of `key` committed strictly before `position`.
    fn read_at(&self, key: &Key, position: usize) -> Option<&'a Value> {
        let versions = self.versions.get(key)?;
        let visible = versions.partition_point(|&(at, _)| at < position);
        visible.checked_sub(1).map(|i| versions[i].1)
    }

    fn last_commit(&self, key: &Key) -> Option<usize> {
        self.versions.get(key)?.last().map(|&(at, _)| at)
    }
}

/// Replays `transaction` against a snapshot; own writes win over it.
fn reads_match<'v, Key, Value, F>(transaction: &'v Transaction<Key, Value>, snapshot: F) -> bool
where
    Key: Eq + Hash,
    Value: Eq,
    F: Fn(&Key) -> Option<&'v Value>,
{
    let mut local: HashMap<&Key, &'v Value> = HashMap::new();
    for event in &transaction.events {
        match event.kind {
            EventKind::Write => {
                local.insert(&event.key, &event.value);
            }
            EventKind::Read => {
                let seen = local.get(&event.key).copied().or_else(|| snapshot(&event.key));
                if seen != Some(&event.value) {
                    return false;
                }
            }
        }
    }
    true
}

/// Every non-init transaction exactly once per phase, sessions in order.
fn covers_sessions<Key, Value>(history: &History<Key, Value>, order: &[TransactionId]) -> bool {
    let mut next_height: HashMap<u64, u64> = HashMap::new();
    for id in order {
        let expected = next_height.entry(id.session_id).or_insert(0);
        if id.is_init() || id.session_height != *expected {
            return false;
        }
        *expected += 1;
    }
    history.sessions().iter().all(|session| {
        next_height.get(&session.id).copied().unwrap_or(0) == session.transactions.len() as u64
    })
}

impl Witness {
    /// Replays the witness against the events of `history` and checks that
    /// every read observes the value the witnessed order produces.
    ///
    /// `CommitOrder` is replayed serially. `SplitCommitOrder` gives each
    /// transaction the snapshot of everything committed before its read
    /// phase and enforces first-committer-wins. Both require session order.
    #[must_use]
    pub fn explains<Key, Value>(&self, history: &History<Key, Value>) -> bool
    where
        Key: Eq + Hash,
        Value: Eq,
    {
        match self {
            Self::CommitOrder(order) => {
                if !covers_sessions(history, order) {
                    return false;
                }
                let mut store = VersionStore::new(history.init());
                for (position, id) in order.iter().enumerate() {
                    let Some(transaction) = history.transaction(*id) else {
                        return false;
                    };
                    let position = position + 1;
                    if !reads_match(transaction, |key| store.read_at(key, position)) {
                        return false;
                    }
                    store.install(transaction, position);
                }
                true
            }
            Self::SplitCommitOrder(order) => Self::explains_split(history, order),
        }
    }

    fn explains_split<Key, Value>(history: &History<Key, Value>, order: &[(TransactionId, bool)]) -> bool
    where
        Key: Eq + Hash,
        Value: Eq,
    {
        let commits: Vec<TransactionId> = order
            .iter()
            .filter(|(_, commit)| *commit)
            .map(|&(id, _)| id)
            .collect();
        if !covers_sessions(history, &commits) {
            return false;
        }

        let mut store = VersionStore::new(history.init());
        let mut started: HashMap<TransactionId, usize> = HashMap::new();
        let mut committed: HashSet<TransactionId> = HashSet::new();
        let mut last_in_session: HashMap<u64, TransactionId> = HashMap::new();

        for (position, &(id, commit)) in order.iter().enumerate() {
            let position = position + 1;
            let Some(transaction) = history.transaction(id) else {
                return false;
            };

            if !commit {
                // the session predecessor must have committed
                let ready = id.session_height == 0
                    || last_in_session.get(&id.session_id)
                        == Some(&TransactionId::new(id.session_id, id.session_height - 1));
                if !ready || started.insert(id, position).is_some() {
                    return false;
                }
                continue;
            }

            let Some(&snapshot) = started.get(&id) else {
                return false;
            };
            if !committed.insert(id) {
                return false;
            }
            if !reads_match(transaction, |key| store.read_at(key, snapshot)) {
                return false;
            }
            // first committer wins
            if transaction
                .writes()
                .any(|event| store.last_commit(&event.key).is_some_and(|at| at > snapshot))
            {
                return false;
            }
            store.install(transaction, position);
            last_in_session.insert(id.session_id, id);
        }
        committed.len() == started.len()
    }

    /// Number of listed transactions.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::CommitOrder(order) => order.len(),
            Self::SplitCommitOrder(order) => order.iter().filter(|(_, commit)| *commit).count(),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::raw::types::{Event, Transaction as RawTransaction};

    fn write_skew() -> History<&'static str, u64> {
        // init x=0 y=0; s1: [x==? y==? x:=1]; s2: [x==? y==? y:=1]
        let sessions = vec![
            vec![RawTransaction::committed(vec![
                Event::read_initial("x"),
                Event::read_initial("y"),
                Event::write("x", 1),
            ])],
            vec![RawTransaction::committed(vec![
                Event::read_initial("x"),
                Event::read_initial("y"),
                Event::write("y", 1),
            ])],
        ];
        History::try_from(sessions.as_slice()).unwrap()
    }

    #[test]
    fn test_serial_replay() {
        let sessions = vec![
            vec![
                RawTransaction::committed(vec![Event::write("x", 1)]),
                RawTransaction::committed(vec![Event::read("x", 2), Event::write("x", 3)]),
            ],
            vec![RawTransaction::committed(vec![
                Event::read("x", 1),
                Event::write("x", 2),
                Event::read("x", 2),
            ])],
        ];
        let history = History::try_from(sessions.as_slice()).unwrap();
        let t = TransactionId::new;

        assert!(Witness::CommitOrder(vec![t(1, 0), t(2, 0), t(1, 1)]).explains(&history));
        assert!(!Witness::CommitOrder(vec![t(2, 0), t(1, 0), t(1, 1)]).explains(&history));
        // session order and completeness
        assert!(!Witness::CommitOrder(vec![t(1, 1), t(2, 0), t(1, 0)]).explains(&history));
        assert!(!Witness::CommitOrder(vec![t(1, 0), t(2, 0)]).explains(&history));
    }

    #[test]
    fn test_write_skew_is_split_but_not_serial() {
        let history = write_skew();
        let t = TransactionId::new;

        let split = Witness::SplitCommitOrder(vec![
            (t(1, 0), false),
            (t(2, 0), false),
            (t(1, 0), true),
            (t(2, 0), true),
        ]);
        assert!(split.explains(&history));
        assert_eq!(split.len(), 2);

        assert!(!Witness::CommitOrder(vec![t(1, 0), t(2, 0)]).explains(&history));
        assert!(!Witness::CommitOrder(vec![t(2, 0), t(1, 0)]).explains(&history));
    }

    #[test]
    fn test_first_committer_wins() {
        // init x=0; s1: [x==? x:=1]; s2: [x==? x:=2]
        let sessions = vec![
            vec![RawTransaction::committed(vec![
                Event::read_initial("x"),
                Event::write("x", 1),
            ])],
            vec![RawTransaction::committed(vec![
                Event::read_initial("x"),
                Event::write("x", 2),
            ])],
        ];
        let history = History::try_from(sessions.as_slice()).unwrap();
        let t = TransactionId::new;
        let concurrent = Witness::SplitCommitOrder(vec![
            (t(1, 0), false),
            (t(2, 0), false),
            (t(1, 0), true),
            (t(2, 0), true),
        ]);
        assert!(!concurrent.explains(&history));
    }

    #[test]
    fn test_split_requires_session_order() {
        let sessions = vec![vec![
            RawTransaction::committed(vec![Event::write("x", 1)]),
            RawTransaction::committed(vec![Event::read("x", 1)]),
        ]];
        let history = History::try_from(sessions.as_slice()).unwrap();
        let t = TransactionId::new;
        let early = Witness::SplitCommitOrder(vec![
            (t(1, 0), false),
            (t(1, 1), false),
            (t(1, 0), true),
            (t(1, 1), true),
        ]);
        assert!(!early.explains(&history));
        let ordered = Witness::SplitCommitOrder(vec![
            (t(1, 0), false),
            (t(1, 0), true),
            (t(1, 1), false),
            (t(1, 1), true),
        ]);
        assert!(ordered.explains(&history));
    }
}
