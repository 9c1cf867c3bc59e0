//! Types representing spans of source code.
//!
//! Spans are half-open byte ranges into a single file. Line numbers are only
//! computed on demand (for diagnostics), since the rewriter never needs them.

use std::ops::{Deref, DerefMut, Range};

/// A value of `T` together with its [`Span`] in the source.
///
/// This type implements [`Deref`] and [`DerefMut`] for `Target = T`, and so
/// methods on `&T` and `&mut T` can be called transparently on `&Spanned<T>`
/// and `&mut Spanned<T>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spanned<T> {
    pub item: T,
    pub span: Span,
}

impl<T> Deref for Spanned<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.item
    }
}

impl<T> DerefMut for Spanned<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.item
    }
}

/// A half-open byte span in the source code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Span {
    pub start: SpanIndex,
    pub end: SpanIndex,
}

/// The integer type used for span indices.
pub type SpanIndex = u32;

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        debug_assert!(start <= end);
        Self {
            start: start as SpanIndex,
            end: end as SpanIndex,
        }
    }

    /// Returns the length of the byte range represented by `self`. Note that
    /// this length is not necessarily the same as the number of characters in
    /// the byte range.
    pub fn length(&self) -> SpanIndex {
        self.end - self.start
    }

    pub fn range(&self) -> Range<usize> {
        self.start as usize..self.end as usize
    }

    /// Returns the text covered by `self` in `source`.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.range()]
    }

    pub fn with<T>(self, item: T) -> Spanned<T> {
        Spanned { item, span: self }
    }
}

impl std::fmt::Display for Span {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.start, self.end)
    }
}

/// Returns the 1-based line number of the byte `offset` in `source`.
pub fn line_of(source: &str, offset: usize) -> usize {
    let offset = offset.min(source.len());
    source.as_bytes()[..offset]
        .iter()
        .filter(|&&b| b == b'\n')
        .count()
        + 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_text_and_length() {
        let source = "<?php namespace Foo;";
        let span = Span::new(6, 15);
        assert_eq!(span.text(source), "namespace");
        assert_eq!(span.length(), 9);
        assert_eq!(span.to_string(), "6:15");
    }

    #[test]
    fn line_numbers_are_one_based() {
        let source = "a\nb\nc";
        assert_eq!(line_of(source, 0), 1);
        assert_eq!(line_of(source, 2), 2);
        assert_eq!(line_of(source, 4), 3);
        assert_eq!(line_of(source, 400), 3);
    }
}
