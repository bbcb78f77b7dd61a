//! Winnow parser for the history text DSL.
//!
//! The input is read line by line:
//!
//! ```text
//! history     = line*
//! line        = WS? (separator | comment | transactions)? WS? (NEWLINE | EOF)
//! separator   = "-"+                    -- closes the current session
//! comment     = "//" REST_OF_LINE
//! transactions= transaction (WS transaction)*
//! transaction = "[" event (WS event)* "]" "!"?
//! event       = key ":=" value          -- write
//!             | key "==?"               -- read of the initial value
//!             | key "==" value          -- read
//! key         = [A-Za-z0-9_]+
//! value       = DIGITS
//! ```
//!
//! There is always at least one session; blank and comment lines are
//! ignored.

use polysi_core::history::raw::types::{Event, Session, Transaction};
use winnow::ascii::{dec_uint, line_ending, till_line_ending};
use winnow::combinator::{alt, cut_err, eof, opt, preceded, separated, terminated};
use winnow::error::{StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::token::take_while;

use crate::lexer::first_unrecognized;

/// A parse failure with a 1-based position.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl core::fmt::Display for ParseError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "parse error at line {}, column {}: {}",
            self.line, self.column, self.message
        )
    }
}

impl std::error::Error for ParseError {}

/// Parses the text DSL into raw sessions.
///
/// # Errors
///
/// [`ParseError`] pointing at the first offending character.
pub fn parse_history(input: &str) -> Result<Vec<Session<String, u64>>, ParseError> {
    let lines = history.parse(input).map_err(|err| {
        let offset = err.offset();
        let (offset, message) = match first_unrecognized(input) {
            Some(span) if span.start <= offset => {
                (span.start, format!("unexpected `{}`", &input[span]))
            }
            _ => {
                let message = err.inner().to_string();
                if message.is_empty() {
                    (offset, String::from("unexpected input"))
                } else {
                    (offset, message)
                }
            }
        };
        let (line, column) = offset_to_line_col(input, offset);
        ParseError {
            message,
            line,
            column,
        }
    })?;

    let mut sessions: Vec<Session<String, u64>> = vec![Vec::new()];
    for line in lines {
        match line {
            Line::Blank => {}
            Line::Separator => sessions.push(Vec::new()),
            Line::Transactions(mut transactions) => {
                if let Some(session) = sessions.last_mut() {
                    session.append(&mut transactions);
                }
            }
        }
    }
    Ok(sessions)
}

/// 1-based `(line, column)` of a byte offset.
fn offset_to_line_col(input: &str, offset: usize) -> (usize, usize) {
    let prefix = &input[..offset.min(input.len())];
    let line = prefix.bytes().filter(|&b| b == b'\n').count() + 1;
    let column = prefix
        .rfind('\n')
        .map_or_else(|| prefix.chars().count() + 1, |pos| prefix[pos + 1..].chars().count() + 1);
    (line, column)
}

enum Line {
    Blank,
    Separator,
    Transactions(Vec<Transaction<String, u64>>),
}

fn inline_ws(input: &mut &str) -> ModalResult<()> {
    take_while(1.., [' ', '\t']).void().parse_next(input)
}

fn opt_inline_ws(input: &mut &str) -> ModalResult<()> {
    take_while(0.., [' ', '\t']).void().parse_next(input)
}

fn key(input: &mut &str) -> ModalResult<String> {
    take_while(1.., |c: char| c.is_alphanumeric() || c == '_')
        .map(str::to_owned)
        .context(StrContext::Label("key"))
        .parse_next(input)
}

fn value(input: &mut &str) -> ModalResult<u64> {
    dec_uint
        .context(StrContext::Expected(StrContextValue::Description("a value")))
        .parse_next(input)
}

fn event(input: &mut &str) -> ModalResult<Event<String, u64>> {
    let key = key.parse_next(input)?;
    let event = cut_err(alt((
        preceded(":=", value).map(|value| Event::write(key.clone(), value)),
        "==?".map(|_| Event::read_initial(key.clone())),
        preceded("==", value).map(|value| Event::read(key.clone(), value)),
    )))
    .context(StrContext::Expected(StrContextValue::StringLiteral(":=")))
    .context(StrContext::Expected(StrContextValue::StringLiteral("==")))
    .parse_next(input)?;
    Ok(event)
}

/// `[events]`, with a trailing `!` when uncommitted.
fn transaction(input: &mut &str) -> ModalResult<Transaction<String, u64>> {
    '['.parse_next(input)?;
    let events: Vec<Event<String, u64>> = cut_err(separated(1.., event, inline_ws))
        .context(StrContext::Label("transaction"))
        .parse_next(input)?;
    cut_err(']')
        .context(StrContext::Expected(StrContextValue::CharLiteral(']')))
        .parse_next(input)?;
    let uncommitted = opt('!').parse_next(input)?.is_some();
    Ok(if uncommitted {
        Transaction::uncommitted(events)
    } else {
        Transaction::committed(events)
    })
}

fn line_body(input: &mut &str) -> ModalResult<Line> {
    alt((
        take_while(1.., '-').map(|_| Line::Separator),
        ("//", till_line_ending).map(|_| Line::Blank),
        separated(1.., transaction, inline_ws).map(Line::Transactions),
    ))
    .parse_next(input)
}

fn line(input: &mut &str) -> ModalResult<Line> {
    let body = preceded(opt_inline_ws, opt(line_body)).parse_next(input)?;
    terminated(opt_inline_ws, alt((line_ending.void(), eof.void()))).parse_next(input)?;
    Ok(body.unwrap_or(Line::Blank))
}

fn history(input: &mut &str) -> ModalResult<Vec<Line>> {
    let mut lines = Vec::new();
    while !input.is_empty() {
        lines.push(line.parse_next(input)?);
    }
    Ok(lines)
}
