//! Logos tokenizer for the history text DSL.
//!
//! The parser does not need it to build sessions; it serves editors and
//! syntax highlighting, and pinpoints stray characters when parsing fails.
//!
//! ```text
//! // session 1
//! [x:=1 y:=1] [z==2 z:=3]
//! ---
//! [x==? y==1]!
//! ```

use std::ops::Range;

use logos::Logos;

/// Token kinds of the DSL.
#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// `//` up to the end of the line.
    #[regex(r"//[^\r\n]*", allow_greedy = true)]
    Comment,

    /// Session separator.
    #[regex(r"-+")]
    Dash,

    #[token("[")]
    BracketOpen,

    #[token("]")]
    BracketClose,

    /// Write operator `:=`.
    #[token(":=")]
    Assign,

    /// Read operator `==`.
    #[token("==")]
    Equals,

    /// Marks a read of the key's initial value.
    #[token("?")]
    Initial,

    /// Marks an uncommitted transaction.
    #[token("!")]
    Uncommitted,

    /// Keys: letters, digits and underscores. Purely numeric keys lex as
    /// [`TokenKind::Integer`].
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*")]
    Ident,

    #[regex(r"[0-9]+")]
    Integer,

    #[regex(r"\r?\n")]
    Newline,

    #[regex(r"[ \t]+")]
    Whitespace,
}

impl TokenKind {
    /// Tokens that carry no structure.
    #[must_use]
    pub const fn is_trivia(self) -> bool {
        matches!(self, Self::Comment | Self::Whitespace)
    }
}

#[cfg_attr(feature = "serde", derive(::serde::Serialize, ::serde::Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Byte range into the source.
    pub span: Range<usize>,
}

impl Token {
    #[must_use]
    pub const fn new(kind: TokenKind, span: Range<usize>) -> Self {
        Self { kind, span }
    }

    /// Source text of this token.
    #[must_use]
    pub fn text<'a>(&self, input: &'a str) -> &'a str {
        &input[self.span.clone()]
    }
}

/// Recognized tokens of `input`; unrecognized characters are skipped.
#[must_use]
pub fn tokenize(input: &str) -> Vec<Token> {
    TokenKind::lexer(input)
        .spanned()
        .filter_map(|(kind, span)| kind.ok().map(|kind| Token { kind, span }))
        .collect()
}

/// Like [`tokenize`], with each token's source text.
#[must_use]
pub fn tokenize_with_text(input: &str) -> Vec<(Token, &str)> {
    tokenize(input)
        .into_iter()
        .map(|token| {
            let text = &input[token.span.clone()];
            (token, text)
        })
        .collect()
}

/// Byte range of the first character sequence no token matches.
#[must_use]
pub fn first_unrecognized(input: &str) -> Option<Range<usize>> {
    TokenKind::lexer(input)
        .spanned()
        .find_map(|(kind, span)| kind.is_err().then_some(span))
}
