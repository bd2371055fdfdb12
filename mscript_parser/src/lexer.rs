//! Lexer for mscript source code.
//!
//! Wraps the logos-generated lexer, decoding number and string payloads and
//! attaching line/column spans from a [`SourceMap`].

use logos::Logos;

use crate::error::{ParseError, ParseResult};
use crate::span::{SourceMap, Span};
use crate::token::{RawToken, SpannedToken, Tok};

/// Tokenize a whole source buffer. The returned vector always ends with an
/// [`Tok::Eof`] token so the parser can peek past the last real token.
pub fn tokenize(source: &str) -> ParseResult<Vec<SpannedToken>> {
    let map = SourceMap::new(source);
    let mut tokens = Vec::new();

    let mut lexer = RawToken::lexer(source);
    while let Some(result) = lexer.next() {
        let range = lexer.span();
        let span = map.span(range.start, range.end);
        let slice = lexer.slice();

        let tok = match result {
            Ok(RawToken::Int) => Tok::Int(decode_int(slice)),
            Ok(RawToken::Float) => Tok::Float(slice.parse().unwrap_or(0.0)),
            Ok(RawToken::Symbol) => Tok::Symbol(slice.to_string()),
            Ok(RawToken::Str) => Tok::Str(unescape(&slice[1..slice.len() - 1], span)?),
            Ok(RawToken::Punct) => Tok::Punct(slice.chars().next().unwrap_or(' ')),
            Err(()) => {
                return Err(ParseError::UnknownCharacter {
                    ch: slice.chars().next().unwrap_or('\0'),
                    span,
                });
            }
        };
        tokens.push(SpannedToken::new(tok, span));
    }

    let end = source.len();
    tokens.push(SpannedToken::new(Tok::Eof, map.span(end, end)));
    Ok(tokens)
}

/// Decimal digits folded with wrapping arithmetic, matching two's-complement
/// overflow for out-of-range literals.
fn decode_int(digits: &str) -> i32 {
    digits.bytes().fold(0i32, |acc, b| {
        acc.wrapping_mul(10).wrapping_add((b - b'0') as i32)
    })
}

/// Resolve `\n` and `\t` escapes; any other `\x` is an error. A trailing
/// lone backslash is kept verbatim.
fn unescape(raw: &str, span: Span) -> ParseResult<String> {
    if memchr::memchr(b'\\', raw.as_bytes()).is_none() {
        return Ok(raw.to_string());
    }

    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => {
                return Err(ParseError::InvalidEscape {
                    sequence: format!("\\{}", other),
                    span,
                });
            }
            None => out.push('\\'),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn kinds(source: &str) -> Vec<Tok> {
        tokenize(source).unwrap().into_iter().map(|t| t.tok).collect()
    }

    #[test]
    fn test_basic_tokens() {
        assert_eq!(
            kinds("int add(int a) { return a + 1; }"),
            vec![
                Tok::Symbol("int".into()),
                Tok::Symbol("add".into()),
                Tok::Punct('('),
                Tok::Symbol("int".into()),
                Tok::Symbol("a".into()),
                Tok::Punct(')'),
                Tok::Punct('{'),
                Tok::Symbol("return".into()),
                Tok::Symbol("a".into()),
                Tok::Punct('+'),
                Tok::Int(1),
                Tok::Punct(';'),
                Tok::Punct('}'),
                Tok::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("12 3.25 7."),
            vec![Tok::Int(12), Tok::Float(3.25), Tok::Float(7.0), Tok::Eof]
        );
    }

    #[test]
    fn test_line_comment_skipped() {
        assert_eq!(
            kinds("1 // comment\n2"),
            vec![Tok::Int(1), Tok::Int(2), Tok::Eof]
        );
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\tb\nc""#),
            vec![Tok::Str("a\tb\nc".into()), Tok::Eof]
        );
    }

    #[test]
    fn test_invalid_escape() {
        let err = tokenize(r#""bad\q""#).unwrap_err();
        assert!(matches!(err, ParseError::InvalidEscape { ref sequence, .. } if sequence == "\\q"));
    }

    #[test]
    fn test_unknown_character() {
        let err = tokenize("int a = 1 @ 2;").unwrap_err();
        match err {
            ParseError::UnknownCharacter { ch, span } => {
                assert_eq!(ch, '@');
                assert_eq!(span.start_line, 1);
                assert_eq!(span.start_column, 11);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_spans_are_one_based() {
        let tokens = tokenize("a\n  bc").unwrap();
        assert_eq!(tokens[0].span.start_line, 1);
        assert_eq!(tokens[0].span.start_column, 1);
        assert_eq!(tokens[1].span.start_line, 2);
        assert_eq!(tokens[1].span.start_column, 3);
    }

    #[test]
    fn test_punct_is_single_char() {
        // '<' '=' stay separate tokens; the parser pairs them up.
        assert_eq!(
            kinds("a <= b"),
            vec![
                Tok::Symbol("a".into()),
                Tok::Punct('<'),
                Tok::Punct('='),
                Tok::Symbol("b".into()),
                Tok::Eof,
            ]
        );
    }
}
