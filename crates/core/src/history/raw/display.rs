use alloc::string::String;
use core::fmt::{Display, Write};

use crate::history::raw::types::Session;

/// Format a complete history as the compact text DSL.
///
/// Sessions are separated by `---`. Each transaction is on its own line.
/// The output always ends with a trailing newline so that it round-trips
/// through `parse_history` without needing any external fixup.
#[must_use]
pub fn format_history<Key, Value>(sessions: &[Session<Key, Value>]) -> String
where
    Key: Display,
    Value: Display,
{
    let mut output = String::new();
    for (i, session) in sessions.iter().enumerate() {
        if i > 0 {
            output.push_str("---\n");
        }
        for transaction in session {
            let _ = writeln!(output, "{transaction}");
        }
    }
    output
}
