//! Token definitions for the mscript lexer.
//!
//! Punctuation characters each become a single-character token; the parser
//! recognizes two-character operators (`<=`, `++`, `+=`) as adjacent pairs.

use std::fmt;

use logos::Logos;
use serde::{Deserialize, Serialize};

use crate::span::Span;

/// Raw token classes recognized by logos. Payload decoding (number parsing,
/// string unescaping) happens in the lexer wrapper.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
pub enum RawToken {
    #[regex(r"[0-9]+\.[0-9]*")]
    Float,

    #[regex(r"[0-9]+")]
    Int,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Symbol,

    // No escape for '"': a string literal never contains a quote.
    #[regex(r#""[^"]*""#)]
    Str,

    #[regex(r"[()\[\]{}<>=+\-*/,!.;]")]
    Punct,
}

/// A decoded token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Tok {
    Int(i32),
    Float(f32),
    Symbol(String),
    Str(String),
    Punct(char),
    Eof,
}

impl Tok {
    pub fn is_punct(&self, c: char) -> bool {
        matches!(self, Tok::Punct(p) if *p == c)
    }

    pub fn is_symbol(&self, name: &str) -> bool {
        matches!(self, Tok::Symbol(s) if s == name)
    }

    /// Short description used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Tok::Int(v) => v.to_string(),
            Tok::Float(v) => v.to_string(),
            Tok::Symbol(s) => s.clone(),
            Tok::Str(s) => format!("\"{}\"", s),
            Tok::Punct(c) => c.to_string(),
            Tok::Eof => "end of file".to_string(),
        }
    }
}

impl fmt::Display for Tok {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// A token with its source span.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpannedToken {
    pub tok: Tok,
    pub span: Span,
}

impl SpannedToken {
    pub fn new(tok: Tok, span: Span) -> Self {
        Self { tok, span }
    }
}
