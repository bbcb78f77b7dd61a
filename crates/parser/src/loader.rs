//! [`HistoryLoader`] implementations over the supported formats.

use std::fs;
use std::path::Path;

use polysi_core::{History, HistoryLoader};

use crate::dbcop::parse_dbcop;
use crate::error::LoadError;
use crate::parser::parse_history;

/// Loads a history written in the text DSL.
#[derive(Debug, Clone, Copy)]
pub struct TextLoader<'a> {
    input: &'a str,
}

impl<'a> TextLoader<'a> {
    #[must_use]
    pub const fn new(input: &'a str) -> Self {
        Self { input }
    }
}

impl HistoryLoader<String, u64> for TextLoader<'_> {
    type Error = LoadError<String, u64>;

    fn load_history(&mut self) -> Result<History<String, u64>, Self::Error> {
        let sessions = parse_history(self.input)?;
        Ok(History::try_from(sessions.as_slice())?)
    }
}

/// Loads a DBCop binary log.
#[derive(Debug, Clone, Copy)]
pub struct DbcopLoader<'a> {
    bytes: &'a [u8],
}

impl<'a> DbcopLoader<'a> {
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }
}

impl HistoryLoader<u64, u64> for DbcopLoader<'_> {
    type Error = LoadError<u64, u64>;

    fn load_history(&mut self) -> Result<History<u64, u64>, Self::Error> {
        let log = parse_dbcop(self.bytes)?;
        Ok(History::try_from(log.sessions.as_slice())?)
    }
}

/// Reads and loads a text DSL file.
///
/// # Errors
///
/// I/O, parse and history construction errors.
pub fn load_text_file(path: &Path) -> Result<History<String, u64>, LoadError<String, u64>> {
    let input = fs::read_to_string(path)?;
    TextLoader::new(&input).load_history()
}

/// Reads and loads a DBCop binary log.
///
/// # Errors
///
/// I/O, decoding and history construction errors.
pub fn load_dbcop_file(path: &Path) -> Result<History<u64, u64>, LoadError<u64, u64>> {
    let bytes = fs::read(path)?;
    DbcopLoader::new(&bytes).load_history()
}

#[cfg(test)]
mod tests {
    use polysi_core::history::raw::types::{Event, Transaction};

    use super::*;
    use crate::dbcop::{write_dbcop, DbcopLog};

    #[test]
    fn test_text_loader() {
        let mut loader = TextLoader::new("[x:=1]\n---\n[x==1 y==?]\n");
        let history = loader.load_history().unwrap();
        assert_eq!(history.session_count(), 2);
        // two sessions plus init
        assert_eq!(history.transaction_count(), 3);
        // the initial read of y makes init write y=0
        assert!(history.writer_of(&"y".to_string(), &0).is_some());
        history.validate().unwrap();
    }

    #[test]
    fn test_text_loader_duplicate_write() {
        let mut loader = TextLoader::new("[x:=1]\n[x:=1]\n");
        assert!(matches!(loader.load_history(), Err(LoadError::History(_))));
    }

    #[test]
    fn test_text_loader_syntax_error() {
        let err = TextLoader::new("[x:=1\n").load_history().unwrap_err();
        assert!(matches!(err, LoadError::Text(_)));
        assert!(err.to_string().starts_with("parse error at line 1"));
    }

    #[test]
    fn test_dbcop_loader() {
        let sessions = vec![
            vec![Transaction::committed(vec![Event::write(1, 4)])],
            vec![Transaction::committed(vec![Event::read(1, 4), Event::read(2, 0)])],
        ];
        let bytes = write_dbcop(&DbcopLog::from_sessions(sessions, "test"));
        let history = DbcopLoader::new(&bytes).load_history().unwrap();
        assert_eq!(history.transaction_count(), 3);
        assert!(history.writer_of(&2, &0).is_some_and(|id| id.transaction.is_init()));
        history.validate().unwrap();
    }
}
