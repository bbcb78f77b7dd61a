//! DBCop binary history logs.
//!
//! All integers are little-endian `u64`, booleans are one byte, and every
//! sequence and string is prefixed by its `u64` length:
//!
//! ```text
//! log         = id n_node n_variable n_transaction n_event
//!               info start end            -- length-prefixed UTF-8
//!               [session]
//! session     = [transaction]
//! transaction = [event] success
//! event       = write key value success
//! ```
//!
//! The header counts are totals: `n_node` sessions, `n_transaction`
//! transactions and `n_event` events over the whole log.

use std::collections::BTreeSet;

use hashbrown::HashSet;
use polysi_core::history::raw::types::{Event, Session, Transaction};
use tracing::debug;
use winnow::binary::{le_u64, length_repeat, length_take, u8 as byte};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;

use crate::error::LoadError;

/// Header of a DBCop log.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DbcopHeader {
    pub id: u64,
    pub n_node: u64,
    pub n_variable: u64,
    pub n_transaction: u64,
    pub n_event: u64,
    pub info: String,
    pub start: String,
    pub end: String,
}

/// A decoded log: header plus committed sessions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbcopLog {
    pub header: DbcopHeader,
    pub sessions: Vec<Session<u64, u64>>,
}

impl DbcopLog {
    /// Wraps `sessions` with a header whose counts match them.
    #[must_use]
    pub fn from_sessions(sessions: Vec<Session<u64, u64>>, info: &str) -> Self {
        let keys: BTreeSet<u64> = sessions
            .iter()
            .flatten()
            .flat_map(|transaction| &transaction.events)
            .map(|event| *event.key())
            .collect();
        let transactions = sessions.iter().map(Vec::len).sum::<usize>();
        let events = sessions
            .iter()
            .flatten()
            .map(|transaction| transaction.events.len())
            .sum::<usize>();
        Self {
            header: DbcopHeader {
                n_node: sessions.len() as u64,
                n_variable: keys.len() as u64,
                n_transaction: transactions as u64,
                n_event: events as u64,
                info: info.to_owned(),
                ..DbcopHeader::default()
            },
            sessions,
        }
    }
}

struct RawEvent {
    write: bool,
    key: u64,
    value: u64,
    success: bool,
}

type RawTransaction = (Vec<RawEvent>, bool);

fn flag(input: &mut &[u8]) -> ModalResult<bool> {
    byte.verify_map(|value| match value {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    })
    .context(StrContext::Expected(StrContextValue::Description("a boolean byte")))
    .parse_next(input)
}

fn string(input: &mut &[u8]) -> ModalResult<String> {
    length_take(le_u64)
        .try_map(|bytes: &[u8]| String::from_utf8(bytes.to_vec()))
        .context(StrContext::Expected(StrContextValue::Description("a UTF-8 string")))
        .parse_next(input)
}

fn header(input: &mut &[u8]) -> ModalResult<DbcopHeader> {
    let (id, n_node, n_variable, n_transaction, n_event) =
        (le_u64, le_u64, le_u64, le_u64, le_u64).parse_next(input)?;
    let (info, start, end) = (string, string, string).parse_next(input)?;
    Ok(DbcopHeader {
        id,
        n_node,
        n_variable,
        n_transaction,
        n_event,
        info,
        start,
        end,
    })
}

fn event(input: &mut &[u8]) -> ModalResult<RawEvent> {
    let (write, key, value, success) = (flag, le_u64, le_u64, flag).parse_next(input)?;
    Ok(RawEvent {
        write,
        key,
        value,
        success,
    })
}

fn transaction(input: &mut &[u8]) -> ModalResult<RawTransaction> {
    (length_repeat(le_u64, event), flag).parse_next(input)
}

fn log(input: &mut &[u8]) -> ModalResult<(DbcopHeader, Vec<Vec<RawTransaction>>)> {
    let header = header.parse_next(input)?;
    let sessions = length_repeat(le_u64, length_repeat(le_u64, transaction)).parse_next(input)?;
    Ok((header, sessions))
}

fn check_count<K, V>(what: &'static str, expected: u64, found: usize) -> Result<(), LoadError<K, V>> {
    if expected == found as u64 {
        Ok(())
    } else {
        Err(LoadError::CountMismatch {
            what,
            expected,
            found: found as u64,
        })
    }
}

/// Decodes a DBCop log.
///
/// Reads of value `0` that no event writes observe the key's initial value.
///
/// # Errors
///
/// - [`LoadError::Binary`] for truncated or trailing input and bad bytes;
/// - [`LoadError::UnsuccessfulEvent`] / [`LoadError::UnsuccessfulTransaction`]
///   for failed entries;
/// - [`LoadError::CountMismatch`] when the header disagrees with the body.
pub fn parse_dbcop<K, V>(bytes: &[u8]) -> Result<DbcopLog, LoadError<K, V>> {
    let (header, raw) = log.parse(bytes).map_err(|err| LoadError::Binary {
        offset: err.offset(),
        message: err.inner().to_string(),
    })?;

    let written: HashSet<(u64, u64)> = raw
        .iter()
        .flatten()
        .flat_map(|(events, _)| events)
        .filter(|event| event.write)
        .map(|event| (event.key, event.value))
        .collect();

    let mut sessions = Vec::with_capacity(raw.len());
    let (mut transactions, mut events) = (0, 0);
    for (s, raw_session) in raw.into_iter().enumerate() {
        let mut session = Vec::with_capacity(raw_session.len());
        for (t, (raw_events, success)) in raw_session.into_iter().enumerate() {
            if !success {
                return Err(LoadError::UnsuccessfulTransaction {
                    session: s,
                    transaction: t,
                });
            }
            let mut converted = Vec::with_capacity(raw_events.len());
            for (e, event) in raw_events.into_iter().enumerate() {
                if !event.success {
                    return Err(LoadError::UnsuccessfulEvent {
                        session: s,
                        transaction: t,
                        event: e,
                    });
                }
                converted.push(match (event.write, event.value) {
                    (true, value) => Event::write(event.key, value),
                    (false, 0) if !written.contains(&(event.key, 0)) => {
                        Event::read_initial(event.key)
                    }
                    (false, value) => Event::read(event.key, value),
                });
            }
            events += converted.len();
            session.push(Transaction::committed(converted));
        }
        transactions += session.len();
        sessions.push(session);
    }

    check_count("sessions", header.n_node, sessions.len())?;
    check_count("transactions", header.n_transaction, transactions)?;
    check_count("events", header.n_event, events)?;

    debug!(
        id = header.id,
        sessions = sessions.len(),
        transactions,
        events,
        "decoded dbcop log"
    );
    Ok(DbcopLog { header, sessions })
}

fn put_u64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

fn put_len(out: &mut Vec<u8>, len: usize) {
    put_u64(out, len as u64);
}

fn put_str(out: &mut Vec<u8>, value: &str) {
    put_len(out, value.len());
    out.extend_from_slice(value.as_bytes());
}

/// Encodes `log`. Initial-value reads are written as reads of `0`, and
/// uncommitted transactions as unsuccessful ones.
#[must_use]
pub fn write_dbcop(log: &DbcopLog) -> Vec<u8> {
    let header = &log.header;
    let mut out = Vec::new();
    for value in [
        header.id,
        header.n_node,
        header.n_variable,
        header.n_transaction,
        header.n_event,
    ] {
        put_u64(&mut out, value);
    }
    for text in [&header.info, &header.start, &header.end] {
        put_str(&mut out, text);
    }

    put_len(&mut out, log.sessions.len());
    for session in &log.sessions {
        put_len(&mut out, session.len());
        for transaction in session {
            put_len(&mut out, transaction.events.len());
            for event in &transaction.events {
                let (write, key, value) = match event {
                    Event::Write { key, value } => (true, *key, *value),
                    Event::Read { key, value } => (false, *key, value.unwrap_or_default()),
                };
                out.push(u8::from(write));
                put_u64(&mut out, key);
                put_u64(&mut out, value);
                out.push(1);
            }
            out.push(u8::from(transaction.committed));
        }
    }
    out
}
