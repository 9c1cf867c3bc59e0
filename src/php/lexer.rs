//! A `winnow`-based PHP lexer.
//!
//! The lexer is deliberately shallow: it only needs to be precise about the
//! boundaries of strings, comments and names, since those are the only
//! tokens the rewriter ever edits. Everything else is passed through as
//! single-character punctuation.

use thiserror::Error;
use winnow::{
    PResult, Parser,
    ascii::multispace1,
    combinator::{alt, opt},
    error::{ContextError, ErrMode},
    stream::Stream,
    token::{any, take_while},
};

use super::token::{Token, TokenKind};
use crate::span::Span;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at byte {offset}")]
pub struct LexError {
    pub offset: usize,
    pub message: &'static str,
}

/// Splits `source` into tokens.
///
/// Concatenating the text of every returned token reproduces `source`
/// exactly.
pub fn tokenize(source: &str) -> Result<Box<[Token]>, LexError> {
    let mut tokens = Vec::with_capacity(source.len() / 4);
    let mut input = source;
    let mut in_code = false;

    while !input.is_empty() {
        let start = source.len() - input.len();
        let rest = input;

        let kind = match in_code {
            true => code_token(&mut input).map_err(|_| LexError {
                offset: start,
                message: describe_failure(rest),
            })?,
            false => html_token(&mut input),
        };

        match kind {
            TokenKind::OpenTag => in_code = true,
            TokenKind::CloseTag => in_code = false,
            _ => (),
        }

        let end = source.len() - input.len();
        tokens.push(Span::new(start, end).with(kind));
    }

    Ok(tokens.into_boxed_slice())
}

fn describe_failure(rest: &str) -> &'static str {
    if rest.starts_with("/*") {
        "unterminated comment"
    } else if rest.starts_with("<<<") {
        "unterminated heredoc"
    } else if rest.starts_with('\'') {
        "unterminated single-quoted string"
    } else if rest.starts_with('"') {
        "unterminated double-quoted string"
    } else if rest.starts_with('`') {
        "unterminated backtick string"
    } else {
        "unexpected input"
    }
}

// INLINE HTML

fn html_token(input: &mut &str) -> TokenKind {
    if let Some(len) = open_tag_len(input) {
        input.next_slice(len);
        return TokenKind::OpenTag;
    }

    let end = input
        .match_indices("<?")
        .map(|(idx, _)| idx)
        .find(|&idx| open_tag_len(&input[idx..]).is_some())
        .unwrap_or(input.len());

    input.next_slice(end);
    TokenKind::InlineHtml
}

fn open_tag_len(s: &str) -> Option<usize> {
    if s.starts_with("<?=") {
        return Some(3);
    }

    let bytes = s.as_bytes();
    if bytes.len() >= 5 && bytes[..5].eq_ignore_ascii_case(b"<?php") {
        match bytes.get(5) {
            None => Some(5),
            Some(b) if b.is_ascii_whitespace() => Some(5),
            Some(_) => None,
        }
    } else {
        None
    }
}

// CODE

fn code_token(input: &mut &str) -> PResult<TokenKind> {
    alt((
        whitespace,
        close_tag,
        attribute_open,
        block_comment,
        line_comment,
        heredoc,
        single_quoted,
        double_quoted,
        backtick,
        variable,
        name,
        number,
        punct,
    ))
    .parse_next(input)
}

fn backtrack() -> ErrMode<ContextError> {
    ErrMode::Backtrack(ContextError::new())
}

fn cut() -> ErrMode<ContextError> {
    ErrMode::Cut(ContextError::new())
}

fn whitespace(input: &mut &str) -> PResult<TokenKind> {
    multispace1.value(TokenKind::Whitespace).parse_next(input)
}

fn close_tag(input: &mut &str) -> PResult<TokenKind> {
    ("?>", opt(alt(("\r\n", "\n"))))
        .value(TokenKind::CloseTag)
        .parse_next(input)
}

fn attribute_open(input: &mut &str) -> PResult<TokenKind> {
    "#[".value(TokenKind::AttributeOpen).parse_next(input)
}

fn block_comment(input: &mut &str) -> PResult<TokenKind> {
    if !input.starts_with("/*") {
        return Err(backtrack());
    }

    let end = input[2..].find("*/").ok_or_else(cut)?;
    let text = input.next_slice(2 + end + 2);

    // `/**/` is an empty block comment, not a doc comment
    match text.starts_with("/**") && text.len() > 4 {
        true => Ok(TokenKind::DocComment),
        false => Ok(TokenKind::Comment),
    }
}

fn line_comment(input: &mut &str) -> PResult<TokenKind> {
    let lead = if input.starts_with("//") {
        2
    } else if input.starts_with('#') {
        1
    } else {
        return Err(backtrack());
    };

    // single-line comments end at the newline or at a closing tag
    let rest = &input[lead..];
    let mut end = rest.find(['\n', '\r']).unwrap_or(rest.len());
    if let Some(tag) = rest[..end].find("?>") {
        end = tag;
    }

    input.next_slice(lead + end);
    Ok(TokenKind::Comment)
}

fn heredoc(input: &mut &str) -> PResult<TokenKind> {
    let text = *input;
    let Some(rest) = text.strip_prefix("<<<") else {
        return Err(backtrack());
    };

    let header = rest.trim_start_matches([' ', '\t']);
    let (quote, header) = match header.as_bytes().first() {
        Some(b'\'') => (Some('\''), &header[1..]),
        Some(b'"') => (Some('"'), &header[1..]),
        _ => (None, header),
    };

    // `<<<` without a label is a shift followed by a comparison
    let label_len = ident_len(header);
    if label_len == 0 {
        return Err(backtrack());
    }

    let label = &header[..label_len];
    let mut after = &header[label_len..];
    if let Some(quote) = quote {
        after = after.strip_prefix(quote).ok_or_else(backtrack)?;
    }

    let body = if let Some(body) = after.strip_prefix("\r\n") {
        body
    } else if let Some(body) = after.strip_prefix('\n') {
        body
    } else {
        return Err(backtrack());
    };

    // the closing label may be indented, and must not be followed by more
    // identifier characters
    let mut offset = 0;
    loop {
        let line = &body[offset..];
        let trimmed = line.trim_start_matches([' ', '\t']);

        if trimmed.starts_with(label)
            && !trimmed[label.len()..].starts_with(is_ident_char)
        {
            let indent = line.len() - trimmed.len();
            let consumed =
                (text.len() - body.len()) + offset + indent + label.len();
            input.next_slice(consumed);

            return match quote {
                Some('\'') => Ok(TokenKind::Nowdoc),
                _ => Ok(TokenKind::Heredoc),
            };
        }

        match line.find('\n') {
            Some(newline) => offset += newline + 1,
            None => return Err(cut()),
        }
    }
}

fn single_quoted(input: &mut &str) -> PResult<TokenKind> {
    if !input.starts_with('\'') {
        return Err(backtrack());
    }

    let end = scan_single_quoted(input.as_bytes()).ok_or_else(cut)?;
    input.next_slice(end);
    Ok(TokenKind::SingleQuoted)
}

fn double_quoted(input: &mut &str) -> PResult<TokenKind> {
    if !input.starts_with('"') {
        return Err(backtrack());
    }

    let end = scan_interpolated(input.as_bytes(), b'"').ok_or_else(cut)?;
    input.next_slice(end);
    Ok(TokenKind::DoubleQuoted)
}

fn backtick(input: &mut &str) -> PResult<TokenKind> {
    if !input.starts_with('`') {
        return Err(backtrack());
    }

    let end = scan_interpolated(input.as_bytes(), b'`').ok_or_else(cut)?;
    input.next_slice(end);
    Ok(TokenKind::Backtick)
}

/// Returns the index one past the closing quote of the single-quoted string
/// starting at `bytes[0]`.
fn scan_single_quoted(bytes: &[u8]) -> Option<usize> {
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b'\'' => return Some(i + 1),
            _ => i += 1,
        }
    }
    None
}

/// Returns the index one past the closing `quote` of the interpolating
/// string starting at `bytes[0]`, skipping over `{$...}` and `${...}`
/// interpolations (which may themselves contain strings).
fn scan_interpolated(bytes: &[u8], quote: u8) -> Option<usize> {
    let mut i = 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return Some(i + 1),
            b'{' if bytes.get(i + 1) == Some(&b'$') => {
                i += skip_braced(&bytes[i..])?
            }
            b'$' if bytes.get(i + 1) == Some(&b'{') => {
                i += 1 + skip_braced(&bytes[i + 1..])?
            }
            _ => i += 1,
        }
    }
    None
}

/// Given `bytes[0] == b'{'`, returns the index one past the matching `}`.
fn skip_braced(bytes: &[u8]) -> Option<usize> {
    let mut depth = 0usize;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'{' => {
                depth += 1;
                i += 1;
            }
            b'}' => {
                depth -= 1;
                i += 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            b'\'' => i += scan_single_quoted(&bytes[i..])?,
            b'"' => i += scan_interpolated(&bytes[i..], b'"')?,
            _ => i += 1,
        }
    }
    None
}

fn variable(input: &mut &str) -> PResult<TokenKind> {
    ("$", ident).value(TokenKind::Variable).parse_next(input)
}

fn ident<'s>(input: &mut &'s str) -> PResult<&'s str> {
    match ident_len(input) {
        0 => Err(backtrack()),
        len => Ok(input.next_slice(len)),
    }
}

/// Lexes `Foo`, `Foo\Bar`, `\Foo\Bar` and `namespace\Foo`.
fn name(input: &mut &str) -> PResult<TokenKind> {
    let text = *input;
    let mut len = 0;
    let mut qualified = false;

    if text.starts_with('\\') {
        len = 1;
        qualified = true;
    }

    let first = ident_len(&text[len..]);
    if first == 0 {
        return Err(backtrack());
    }
    len += first;

    // a trailing separator (as in the group import `Foo\{`) is not part of
    // the name
    while text[len..].starts_with('\\') {
        let segment = ident_len(&text[len + 1..]);
        if segment == 0 {
            break;
        }
        len += 1 + segment;
        qualified = true;
    }

    input.next_slice(len);
    match qualified {
        true => Ok(TokenKind::QualifiedName),
        false => Ok(TokenKind::Identifier),
    }
}

fn number(input: &mut &str) -> PResult<TokenKind> {
    let starts_number = match input.as_bytes() {
        [d, ..] if d.is_ascii_digit() => true,
        [b'.', d, ..] if d.is_ascii_digit() => true,
        _ => false,
    };

    if !starts_number {
        return Err(backtrack());
    }

    take_while(1.., |c: char| {
        c.is_ascii_alphanumeric() || c == '_' || c == '.'
    })
    .value(TokenKind::Number)
    .parse_next(input)
}

fn punct(input: &mut &str) -> PResult<TokenKind> {
    alt((
        "?->".void(),
        "::".void(),
        "->".void(),
        "=>".void(),
        "...".void(),
        any.void(),
    ))
    .value(TokenKind::Punct)
    .parse_next(input)
}

pub fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_ascii_alphabetic() || !c.is_ascii()
}

pub fn is_ident_char(c: char) -> bool {
    is_ident_start(c) || c.is_ascii_digit()
}

/// Returns the length in bytes of the identifier at the start of `s`, or 0.
pub fn ident_len(s: &str) -> usize {
    match s.chars().next() {
        Some(c) if is_ident_start(c) => s
            .find(|c: char| !is_ident_char(c))
            .unwrap_or(s.len()),
        _ => 0,
    }
}
