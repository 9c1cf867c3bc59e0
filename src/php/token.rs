//! PHP token kinds.

use crate::span::Spanned;

/// A lexed token. The token text is recovered by slicing the source with the
/// token's span.
pub type Token = Spanned<TokenKind>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Text outside of `<?php ... ?>`.
    InlineHtml,
    /// `<?php` or `<?=`.
    OpenTag,
    /// `?>`, including one trailing newline.
    CloseTag,
    Whitespace,
    /// `// ...`, `# ...` or `/* ... */`.
    Comment,
    /// `/** ... */`.
    DocComment,
    /// `$name`.
    Variable,
    /// An unqualified name, which may also be a keyword.
    Identifier,
    /// A name containing at least one namespace separator: `Foo\Bar`,
    /// `\Foo`, or `namespace\Foo`.
    QualifiedName,
    /// `'...'`.
    SingleQuoted,
    /// `"..."`, possibly with interpolation.
    DoubleQuoted,
    /// `` `...` ``.
    Backtick,
    /// `<<<ID ... ID` or `<<<"ID" ... ID`.
    Heredoc,
    /// `<<<'ID' ... ID`.
    Nowdoc,
    Number,
    /// `#[`.
    AttributeOpen,
    /// Any other punctuation. Multi-character operators that matter for
    /// name classification (`::`, `->`, `?->`, `=>`, `...`) are single
    /// tokens; everything else is one character per token.
    Punct,
}

impl TokenKind {
    /// Returns `true` for tokens that carry no syntactic meaning.
    pub fn is_trivia(self) -> bool {
        matches!(
            self,
            TokenKind::Whitespace | TokenKind::Comment | TokenKind::DocComment
        )
    }

    pub fn is_name(self) -> bool {
        matches!(self, TokenKind::Identifier | TokenKind::QualifiedName)
    }

    pub fn is_string(self) -> bool {
        matches!(self, TokenKind::SingleQuoted | TokenKind::DoubleQuoted)
    }
}
