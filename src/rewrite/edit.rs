//! Text edits against a source file.

use crate::span::Span;

/// Replaces the text covered by `span` with `text`. An empty span is an
/// insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub span: Span,
    pub text: String,
}

impl Edit {
    pub fn replace(span: Span, text: impl Into<String>) -> Self {
        Self {
            span,
            text: text.into(),
        }
    }

    pub fn insert(offset: usize, text: impl Into<String>) -> Self {
        Self::replace(Span::new(offset, offset), text)
    }
}

/// Applies `edits` to `source`. Insertions at the same offset keep their
/// relative order; an edit overlapping an earlier one is dropped.
pub fn apply(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|edit| edit.span.start);

    let extra: usize = edits.iter().map(|edit| edit.text.len()).sum();
    let mut output = String::with_capacity(source.len() + extra);
    let mut cursor = 0;

    for edit in edits {
        let range = edit.span.range();
        if range.start < cursor {
            tracing::debug!(span = %edit.span, "dropping overlapping edit");
            continue;
        }

        output.push_str(&source[cursor..range.start]);
        output.push_str(&edit.text);
        cursor = range.end;
    }

    output.push_str(&source[cursor..]);
    output
}
