//! A single-pass outline of a PHP file.
//!
//! The outline records everything the rewriter and the verifier need to know
//! about a file without building a syntax tree: where each namespace block
//! starts, which names are imported, which symbols are declared, and which
//! name tokens, string literals and doc comments may refer to a symbol.

use super::{
    lexer::{self, LexError},
    literal,
    name::{self, SymbolKind},
    scope::{Aliases, Scope},
    token::{Token, TokenKind},
};
use crate::span::Span;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClassLikeKind {
    Class,
    Interface,
    Trait,
    Enum,
}

impl ClassLikeKind {
    /// The name of the PHP function that checks whether a symbol of this
    /// kind exists without autoloading it.
    pub fn exists_function(self) -> &'static str {
        match self {
            ClassLikeKind::Class => "class_exists",
            ClassLikeKind::Interface => "interface_exists",
            ClassLikeKind::Trait => "trait_exists",
            ClassLikeKind::Enum => "enum_exists",
        }
    }
}

#[derive(Debug, Clone)]
pub struct NamespaceBlock {
    /// `None` for the global namespace.
    pub name: Option<String>,
    /// `None` for the implicit global block at the start of every file.
    pub declaration: Option<NamespaceDecl>,
    pub aliases: Aliases,
}

/// The `namespace` statement that opened a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NamespaceDecl {
    pub keyword: Span,
    pub name: Option<Span>,
    pub braced: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportRole {
    /// `use Foo\Bar;` or `use Foo\Bar as Baz;`.
    Single,
    /// The `Foo` in `use Foo\{Bar, Baz};`.
    GroupPrefix,
    /// The `Bar` in `use Foo\{Bar, Baz};`.
    GroupMember,
}

#[derive(Debug, Clone)]
pub struct Import {
    pub block: usize,
    pub kind: SymbolKind,
    /// The name token as written.
    pub span: Span,
    /// The fully-qualified imported name.
    pub name: String,
    pub role: ImportRole,
}

#[derive(Debug, Clone)]
pub struct Declaration {
    pub block: usize,
    pub kind: SymbolKind,
    pub class_kind: Option<ClassLikeKind>,
    /// The fully-qualified declared name.
    pub name: String,
    /// The name token, or the string literal for `define`.
    pub span: Span,
    pub via_define: bool,
}

#[derive(Debug, Clone)]
pub struct Reference {
    pub block: usize,
    pub kind: SymbolKind,
    pub span: Span,
    /// Whether `kind` follows from the syntax alone. Names in type positions
    /// are classified heuristically.
    pub certain: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StringContext {
    Plain,
    /// The first argument of `class_exists`, `function_exists`, `defined`
    /// and friends.
    SymbolCheck(SymbolKind),
    /// The first argument of `define`.
    Define,
}

#[derive(Debug, Clone)]
pub struct StringLiteral {
    pub block: usize,
    pub span: Span,
    pub context: StringContext,
}

#[derive(Debug, Clone)]
pub struct DocComment {
    pub block: usize,
    pub span: Span,
}

/// A heredoc or nowdoc, including its opening and closing labels.
#[derive(Debug, Clone)]
pub struct Heredoc {
    pub block: usize,
    pub span: Span,
    /// Nowdocs have no escape sequences.
    pub nowdoc: bool,
}

#[derive(Debug, Clone)]
pub struct Outline {
    pub tokens: Box<[Token]>,
    pub blocks: Vec<NamespaceBlock>,
    pub imports: Vec<Import>,
    pub declarations: Vec<Declaration>,
    pub references: Vec<Reference>,
    pub strings: Vec<StringLiteral>,
    pub doc_comments: Vec<DocComment>,
    pub heredocs: Vec<Heredoc>,
    /// The offset just past the first open tag and any `declare(...);`
    /// statements that follow it, where a `namespace` statement can be
    /// inserted. `None` if the file never enters PHP mode.
    pub prelude_end: Option<usize>,
}

impl Outline {
    pub fn parse(source: &str) -> Result<Self, LexError> {
        let tokens = lexer::tokenize(source)?;
        let walker = Walker::new(source, &tokens);
        let parts = walker.walk();

        Ok(Outline {
            tokens,
            blocks: parts.blocks,
            imports: parts.imports,
            declarations: parts.declarations,
            references: parts.references,
            strings: parts.strings,
            doc_comments: parts.doc_comments,
            heredocs: parts.heredocs,
            prelude_end: parts.prelude_end,
        })
    }

    pub fn scope(&self, block: usize) -> Scope<'_> {
        let block = &self.blocks[block];
        Scope::new(block.name.as_deref(), &block.aliases)
    }

    /// Returns the names of all named namespace blocks.
    pub fn namespaces(&self) -> impl Iterator<Item = &str> {
        self.blocks.iter().filter_map(|block| block.name.as_deref())
    }

    /// Returns `true` if the file declares a free function or a constant,
    /// neither of which can be autoloaded.
    pub fn declares_functions_or_constants(&self) -> bool {
        self.declarations
            .iter()
            .any(|decl| decl.kind != SymbolKind::ClassLike)
    }
}

// WALKER

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Namespace,
    ClassBody,
    FunctionBody,
    /// The `{ ... }` after a trait `use` in a class body.
    TraitRules,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    None,
    /// After `extends`, `implements` or `insteadof`: every name is a class.
    TypeList,
    /// Inside the parentheses of a `catch`, tracking their depth.
    Catch(u32),
    /// After a `use` in a class body.
    TraitUse,
    /// After `const`, with `true` for class constants.
    ConstDecl(bool),
}

/// Nesting inside one `#[ ... ]` attribute group.
#[derive(Debug, Clone, Copy, Default)]
struct AttributeDepth {
    brackets: u32,
    parens: u32,
}

#[derive(Debug, Default)]
struct Parts {
    blocks: Vec<NamespaceBlock>,
    imports: Vec<Import>,
    declarations: Vec<Declaration>,
    references: Vec<Reference>,
    strings: Vec<StringLiteral>,
    doc_comments: Vec<DocComment>,
    heredocs: Vec<Heredoc>,
    prelude_end: Option<usize>,
}

struct Walker<'s> {
    source: &'s str,
    tokens: &'s [Token],
    /// Indices of the non-trivia tokens.
    sig: Vec<usize>,
    parts: Parts,
    block: usize,
    /// Source offsets at which each block starts, in order.
    block_starts: Vec<(usize, usize)>,
    frames: Vec<Frame>,
    pending: Option<Frame>,
    mode: Mode,
    attributes: Vec<AttributeDepth>,
    seen_code: bool,
}

impl<'s> Walker<'s> {
    fn new(source: &'s str, tokens: &'s [Token]) -> Self {
        let sig = tokens
            .iter()
            .enumerate()
            .filter(|(_, token)| !token.item.is_trivia())
            .map(|(idx, _)| idx)
            .collect();

        let mut parts = Parts::default();
        parts.blocks.push(NamespaceBlock {
            name: None,
            declaration: None,
            aliases: Aliases::default(),
        });

        Self {
            source,
            tokens,
            sig,
            parts,
            block: 0,
            block_starts: vec![(0, 0)],
            frames: Vec::new(),
            pending: None,
            mode: Mode::None,
            attributes: Vec::new(),
            seen_code: false,
        }
    }

    fn walk(mut self) -> Parts {
        let mut i = 0;
        while i < self.sig.len() {
            i = self.step(i);
        }

        let tokens = self.tokens;
        for token in tokens.iter() {
            let block = self.block_at(token.span.start as usize);
            match token.item {
                TokenKind::DocComment => self.parts.doc_comments.push(DocComment {
                    block,
                    span: token.span,
                }),
                TokenKind::Heredoc | TokenKind::Nowdoc => self.parts.heredocs.push(Heredoc {
                    block,
                    span: token.span,
                    nowdoc: token.item == TokenKind::Nowdoc,
                }),
                _ => (),
            }
        }

        self.parts
    }

    fn block_at(&self, offset: usize) -> usize {
        self.block_starts
            .iter()
            .rev()
            .find(|(start, _)| *start <= offset)
            .map_or(0, |(_, block)| *block)
    }

    // TOKEN ACCESS

    fn kind(&self, i: usize) -> Option<TokenKind> {
        self.sig.get(i).map(|&idx| self.tokens[idx].item)
    }

    fn span(&self, i: usize) -> Span {
        self.tokens[self.sig[i]].span
    }

    fn text(&self, i: usize) -> &'s str {
        self.tokens[self.sig[i]].span.text(self.source)
    }

    fn is_punct(&self, i: usize, punct: &str) -> bool {
        self.kind(i) == Some(TokenKind::Punct) && self.text(i) == punct
    }

    /// Returns `true` if the token at `i` is the identifier `keyword`, in
    /// any case.
    fn is_keyword(&self, i: usize, keyword: &str) -> bool {
        self.kind(i) == Some(TokenKind::Identifier)
            && self.text(i).eq_ignore_ascii_case(keyword)
    }

    fn is_name(&self, i: usize) -> bool {
        self.kind(i).is_some_and(TokenKind::is_name)
    }

    fn prev_is_punct(&self, i: usize, punct: &str) -> bool {
        i.checked_sub(1).is_some_and(|p| self.is_punct(p, punct))
    }

    fn prev_is_keyword(&self, i: usize, keyword: &str) -> bool {
        i.checked_sub(1).is_some_and(|p| self.is_keyword(p, keyword))
    }

    fn top_frame(&self) -> Option<Frame> {
        self.frames.last().copied()
    }

    /// Returns `true` if the token at `i` begins a statement.
    fn at_statement_start(&self, i: usize) -> bool {
        match i.checked_sub(1) {
            None => true,
            Some(p) => {
                matches!(
                    self.kind(p),
                    Some(TokenKind::OpenTag | TokenKind::CloseTag)
                ) || self.is_punct(p, ";")
                    || self.is_punct(p, "{")
                    || self.is_punct(p, "}")
            }
        }
    }

    // RECORDING

    fn reference(&mut self, i: usize, kind: SymbolKind, certain: bool) {
        self.parts.references.push(Reference {
            block: self.block,
            kind,
            span: self.span(i),
            certain,
        });
    }

    fn declare(
        &mut self,
        i: usize,
        kind: SymbolKind,
        class_kind: Option<ClassLikeKind>,
    ) {
        let namespace = self.parts.blocks[self.block].name.as_deref();
        let name = name::join(namespace, self.text(i));
        self.parts.declarations.push(Declaration {
            block: self.block,
            kind,
            class_kind,
            name,
            span: self.span(i),
            via_define: false,
        });
    }

    fn import(
        &mut self,
        i: usize,
        kind: SymbolKind,
        name: String,
        alias: Option<&str>,
        role: ImportRole,
    ) {
        if let Some(alias) = alias {
            self.parts.blocks[self.block]
                .aliases
                .insert(kind, alias, name.clone());
        }

        self.parts.imports.push(Import {
            block: self.block,
            kind,
            span: self.span(i),
            name,
            role,
        });
    }

    fn open_block(&mut self, name: Option<String>, declaration: NamespaceDecl) {
        self.parts.blocks.push(NamespaceBlock {
            name,
            declaration: Some(declaration),
            aliases: Aliases::default(),
        });
        self.block = self.parts.blocks.len() - 1;
        self.block_starts
            .push((declaration.keyword.start as usize, self.block));
    }

    // STEPS

    /// Processes the token at `i` and returns the index of the next token
    /// to process.
    fn step(&mut self, i: usize) -> usize {
        let Some(kind) = self.kind(i) else {
            return i + 1;
        };

        if kind == TokenKind::OpenTag {
            if self.parts.prelude_end.is_none() {
                self.parts.prelude_end = Some(self.span(i).end as usize);
            }
            return i + 1;
        }

        if !self.seen_code && self.is_keyword(i, "declare") {
            if let Some(next) = self.leading_declare(i) {
                return next;
            }
        }

        self.seen_code = true;

        match kind {
            TokenKind::Punct => {
                self.punct(i);
                i + 1
            }
            TokenKind::CloseTag => {
                self.end_statement();
                i + 1
            }
            TokenKind::AttributeOpen => {
                self.attributes.push(AttributeDepth::default());
                i + 1
            }
            TokenKind::Identifier | TokenKind::QualifiedName => self.name(i),
            TokenKind::SingleQuoted | TokenKind::DoubleQuoted => {
                self.string(i);
                i + 1
            }
            _ => i + 1,
        }
    }

    /// Handles `declare(strict_types=1);` before any other statement, which
    /// must stay ahead of an inserted `namespace` statement.
    fn leading_declare(&mut self, i: usize) -> Option<usize> {
        if self.block != 0 || !self.is_punct(i + 1, "(") {
            return None;
        }

        let close = self.matching_paren(i + 1)?;
        if !self.is_punct(close + 1, ";") {
            return None;
        }

        self.parts.prelude_end = Some(self.span(close + 1).end as usize);
        Some(close + 2)
    }

    /// Given the index of a `(`, returns the index of the matching `)`.
    fn matching_paren(&self, open: usize) -> Option<usize> {
        let mut depth = 0u32;
        for j in open..self.sig.len() {
            if self.is_punct(j, "(") {
                depth += 1;
            } else if self.is_punct(j, ")") {
                depth -= 1;
                if depth == 0 {
                    return Some(j);
                }
            }
        }
        None
    }

    fn end_statement(&mut self) {
        self.pending = None;
        self.mode = Mode::None;
    }

    fn punct(&mut self, i: usize) {
        match self.text(i) {
            "{" => {
                let frame = match (self.pending.take(), self.mode) {
                    (Some(frame), _) => frame,
                    (None, Mode::TraitUse) => Frame::TraitRules,
                    (None, _) => Frame::Other,
                };

                if matches!(self.mode, Mode::TypeList | Mode::TraitUse) {
                    self.mode = Mode::None;
                }

                self.frames.push(frame);
            }
            "}" => {
                self.frames.pop();
            }
            ";" => self.end_statement(),
            "(" => {
                if let Mode::Catch(depth) = self.mode {
                    self.mode = Mode::Catch(depth + 1);
                }
                if let Some(attribute) = self.attributes.last_mut() {
                    attribute.parens += 1;
                }
            }
            ")" => {
                if let Mode::Catch(depth) = self.mode {
                    self.mode = match depth {
                        0 | 1 => Mode::None,
                        _ => Mode::Catch(depth - 1),
                    };
                }
                if let Some(attribute) = self.attributes.last_mut() {
                    attribute.parens = attribute.parens.saturating_sub(1);
                }
            }
            "[" => {
                if let Some(attribute) = self.attributes.last_mut() {
                    attribute.brackets += 1;
                }
            }
            "]" => {
                let closes =
                    self.attributes.last().is_some_and(|a| a.brackets == 0);
                if closes {
                    self.attributes.pop();
                } else if let Some(attribute) = self.attributes.last_mut() {
                    attribute.brackets -= 1;
                }
            }
            _ => (),
        }
    }

    fn string(&mut self, i: usize) {
        let context = self.string_context(i);

        if context == StringContext::Define {
            let text = self.text(i);
            if let Some(value) = literal::decode(text)
                .filter(|value| name::is_valid_qualified(value, false))
            {
                self.parts.declarations.push(Declaration {
                    block: self.block,
                    kind: SymbolKind::Constant,
                    class_kind: None,
                    name: name::strip_leading(&value).to_owned(),
                    span: self.span(i),
                    via_define: true,
                });
            }
        }

        self.parts.strings.push(StringLiteral {
            block: self.block,
            span: self.span(i),
            context,
        });
    }

    /// Returns the context of the string literal at `i`, which is a
    /// symbol-check context if the literal is the first argument of a call
    /// to one of the global functions that take a symbol name.
    fn string_context(&self, i: usize) -> StringContext {
        let Some(callee) = i.checked_sub(2) else {
            return StringContext::Plain;
        };

        if !self.prev_is_punct(i, "(") || !self.is_name(callee) {
            return StringContext::Plain;
        }

        // a method or a function declaration, not a call to the builtin
        if self.prev_is_punct(callee, "->")
            || self.prev_is_punct(callee, "?->")
            || self.prev_is_punct(callee, "::")
            || self.prev_is_keyword(callee, "function")
            || self.prev_is_keyword(callee, "new")
        {
            return StringContext::Plain;
        }

        let function = name::strip_leading(self.text(callee));
        if function.contains(name::SEPARATOR) {
            return StringContext::Plain;
        }

        match function.to_ascii_lowercase().as_str() {
            "class_exists" | "interface_exists" | "trait_exists"
            | "enum_exists" => StringContext::SymbolCheck(SymbolKind::ClassLike),
            "function_exists" => {
                StringContext::SymbolCheck(SymbolKind::Function)
            }
            "defined" | "constant" => {
                StringContext::SymbolCheck(SymbolKind::Constant)
            }
            "define" => StringContext::Define,
            _ => StringContext::Plain,
        }
    }

    // NAMES

    fn name(&mut self, i: usize) -> usize {
        // member names are never symbols
        if self.prev_is_punct(i, "->")
            || self.prev_is_punct(i, "?->")
            || self.prev_is_punct(i, "::")
        {
            return i + 1;
        }

        // named arguments
        if (self.prev_is_punct(i, "(") || self.prev_is_punct(i, ","))
            && self.is_punct(i + 1, ":")
        {
            return i + 1;
        }

        if self.kind(i) == Some(TokenKind::Identifier) {
            let lower = self.text(i).to_ascii_lowercase();

            if name::is_keyword(&lower) {
                return self.keyword(i, &lower);
            }

            if name::is_builtin_type(&lower) {
                return i + 1;
            }
        }

        self.classify(i);
        i + 1
    }

    fn keyword(&mut self, i: usize, keyword: &str) -> usize {
        match keyword {
            "namespace" => self.namespace(i),
            "use" => self.use_statement(i),
            "class" if self.prev_is_keyword(i, "new") => {
                self.pending = Some(Frame::ClassBody);
                i + 1
            }
            "class" | "interface" | "trait" => {
                self.pending = Some(Frame::ClassBody);
                if self.kind(i + 1) != Some(TokenKind::Identifier) {
                    return i + 1;
                }

                let class_kind = match keyword {
                    "class" => ClassLikeKind::Class,
                    "interface" => ClassLikeKind::Interface,
                    _ => ClassLikeKind::Trait,
                };
                self.declare(i + 1, SymbolKind::ClassLike, Some(class_kind));
                i + 2
            }
            "enum" => {
                let declares = self.kind(i + 1) == Some(TokenKind::Identifier)
                    && (self.is_punct(i + 2, "{")
                        || self.is_punct(i + 2, ":")
                        || self.is_keyword(i + 2, "implements"));

                match declares {
                    true => {
                        self.pending = Some(Frame::ClassBody);
                        self.declare(
                            i + 1,
                            SymbolKind::ClassLike,
                            Some(ClassLikeKind::Enum),
                        );
                        i + 2
                    }
                    // `enum` is only reserved in declarations
                    false => {
                        self.classify(i);
                        i + 1
                    }
                }
            }
            "function" => self.function(i),
            "const" => {
                let in_class = self.top_frame() == Some(Frame::ClassBody);
                self.mode = Mode::ConstDecl(in_class);
                i + 1
            }
            "extends" | "implements" | "insteadof" => {
                self.mode = Mode::TypeList;
                i + 1
            }
            "catch" => {
                self.mode = Mode::Catch(0);
                i + 1
            }
            "goto" if self.kind(i + 1) == Some(TokenKind::Identifier) => i + 2,
            _ => i + 1,
        }
    }

    fn namespace(&mut self, i: usize) -> usize {
        let keyword = self.span(i);

        if self.is_name(i + 1) {
            let name = name::strip_leading(self.text(i + 1)).to_owned();
            let braced = self.is_punct(i + 2, "{");
            if braced {
                self.pending = Some(Frame::Namespace);
            }

            self.open_block(
                Some(name),
                NamespaceDecl {
                    keyword,
                    name: Some(self.span(i + 1)),
                    braced,
                },
            );
            return i + 2;
        }

        if self.is_punct(i + 1, "{") {
            self.pending = Some(Frame::Namespace);
            self.open_block(
                None,
                NamespaceDecl {
                    keyword,
                    name: None,
                    braced: true,
                },
            );
        }

        i + 1
    }

    fn function(&mut self, i: usize) -> usize {
        self.pending = Some(Frame::FunctionBody);

        let name = match self.is_punct(i + 1, "&") {
            true => i + 2,
            false => i + 1,
        };

        // closures have no name
        if self.kind(name) != Some(TokenKind::Identifier) {
            return i + 1;
        }

        if self.top_frame() != Some(Frame::ClassBody) {
            self.declare(name, SymbolKind::Function, None);
        }

        name + 1
    }

    /// Parses a `use` statement, which is either a closure's capture list, a
    /// trait use inside a class body, or an import.
    fn use_statement(&mut self, i: usize) -> usize {
        if self.prev_is_punct(i, ")") {
            return i + 1;
        }

        if self.top_frame() == Some(Frame::ClassBody) {
            self.mode = Mode::TraitUse;
            return i + 1;
        }

        let mut j = i + 1;
        let kind = self.import_kind(&mut j).unwrap_or(SymbolKind::ClassLike);

        loop {
            if !self.is_name(j) {
                return j;
            }

            let clause = j;
            j += 1;

            if self.is_punct(j, "\\") && self.is_punct(j + 1, "{") {
                j = match self.group_import(clause, kind) {
                    Some(end) => end,
                    None => return j,
                };
            } else {
                let name = name::strip_leading(self.text(clause)).to_owned();
                let alias = self.import_alias(&mut j);
                self.import(clause, kind, name, alias, ImportRole::Single);
            }

            match self.is_punct(j, ",") {
                true => j += 1,
                false => break,
            }
        }

        match self.is_punct(j, ";") {
            true => j + 1,
            false => j,
        }
    }

    /// Parses the members of `use Prefix\{...}`, given the index of the
    /// prefix, and returns the index after the closing brace.
    fn group_import(&mut self, prefix: usize, kind: SymbolKind) -> Option<usize> {
        let prefix_name = name::strip_leading(self.text(prefix)).to_owned();
        self.import(
            prefix,
            SymbolKind::ClassLike,
            prefix_name.clone(),
            None,
            ImportRole::GroupPrefix,
        );

        let mut j = prefix + 3;
        loop {
            if self.is_punct(j, "}") {
                return Some(j + 1);
            }

            let member_kind = self.import_kind(&mut j).unwrap_or(kind);
            if !self.is_name(j) {
                return None;
            }

            let member = j;
            j += 1;

            let name = format!("{prefix_name}\\{}", self.text(member));
            let alias = self.import_alias(&mut j);
            self.import(member, member_kind, name, alias, ImportRole::GroupMember);

            if self.is_punct(j, ",") {
                j += 1;
            } else if !self.is_punct(j, "}") {
                return None;
            }
        }
    }

    fn import_kind(&self, j: &mut usize) -> Option<SymbolKind> {
        if self.is_keyword(*j, "function") {
            *j += 1;
            Some(SymbolKind::Function)
        } else if self.is_keyword(*j, "const") {
            *j += 1;
            Some(SymbolKind::Constant)
        } else {
            None
        }
    }

    fn import_alias(&self, j: &mut usize) -> Option<&'s str> {
        if self.is_keyword(*j, "as")
            && self.kind(*j + 1) == Some(TokenKind::Identifier)
        {
            *j += 2;
            return Some(self.text(*j - 1));
        }

        Some(name::last_segment(self.text(*j - 1)))
    }

    /// Classifies a name that is not a keyword as a class, function or
    /// constant reference, or skips it if it does not refer to a symbol.
    fn classify(&mut self, i: usize) {
        // goto labels
        if self.is_punct(i + 1, ":") && self.at_statement_start(i) {
            return;
        }

        // trait method aliases and enum cases
        if self.prev_is_keyword(i, "as")
            || (self.prev_is_keyword(i, "case")
                && self.top_frame() == Some(Frame::ClassBody))
        {
            return;
        }

        if let Mode::ConstDecl(in_class) = self.mode {
            let after_const = self.prev_is_keyword(i, "const");

            if (after_const || self.prev_is_punct(i, ","))
                && self.is_punct(i + 1, "=")
            {
                if !in_class {
                    self.declare(i, SymbolKind::Constant, None);
                }
                return;
            }

            // a typed class constant
            if after_const && self.is_name(i + 1) {
                self.reference(i, SymbolKind::ClassLike, false);
                return;
            }
        }

        if self.top_frame() == Some(Frame::TraitRules) {
            if self.is_punct(i + 1, "::")
                || self.mode == Mode::TypeList
                || self.prev_is_keyword(i, "insteadof")
            {
                self.reference(i, SymbolKind::ClassLike, true);
            }
            return;
        }

        let attribute_target = self
            .attributes
            .last()
            .is_some_and(|depth| depth.brackets == 0 && depth.parens == 0);

        let certain_class = attribute_target
            || self.prev_is_keyword(i, "new")
            || self.prev_is_keyword(i, "instanceof")
            || self.prev_is_keyword(i, "insteadof")
            || matches!(self.mode, Mode::TypeList | Mode::TraitUse)
            || matches!(self.mode, Mode::Catch(depth) if depth > 0)
            || self.is_punct(i + 1, "::");

        if certain_class {
            self.reference(i, SymbolKind::ClassLike, true);
        } else if self.is_punct(i + 1, "(") {
            self.reference(i, SymbolKind::Function, true);
        } else if self.in_type_position(i) {
            self.reference(i, SymbolKind::ClassLike, false);
        } else {
            self.reference(i, SymbolKind::Constant, false);
        }
    }

    /// Returns `true` if the name at `i` looks like part of a parameter,
    /// property or return type.
    fn in_type_position(&self, i: usize) -> bool {
        // forwards to the parameter or property variable
        let mut j = i + 1;
        let mut depth = 0u32;
        while let Some(kind) = self.kind(j) {
            match kind {
                TokenKind::Identifier | TokenKind::QualifiedName => (),
                TokenKind::Variable => return true,
                TokenKind::Punct => match self.text(j) {
                    "..." => return true,
                    "|" | "&" | "?" => (),
                    "(" => depth += 1,
                    ")" if depth > 0 => depth -= 1,
                    _ => break,
                },
                _ => break,
            }
            j += 1;
        }

        // backwards to the `:` of a return type
        let mut j = i;
        while let Some(p) = j.checked_sub(1) {
            match self.kind(p) {
                Some(TokenKind::Identifier | TokenKind::QualifiedName) => (),
                Some(TokenKind::Punct) => match self.text(p) {
                    "|" | "&" | "?" | "(" => (),
                    ":" => {
                        return p
                            .checked_sub(1)
                            .is_some_and(|close| self.closes_signature(close));
                    }
                    _ => return false,
                },
                _ => return false,
            }
            j = p;
        }

        false
    }

    /// Returns `true` if the token at `close` is the `)` ending the
    /// parameter list (or closure capture list) of a function.
    fn closes_signature(&self, close: usize) -> bool {
        if !self.is_punct(close, ")") {
            return false;
        }

        let mut depth = 0u32;
        let mut j = close;
        let open = loop {
            if self.is_punct(j, ")") {
                depth += 1;
            } else if self.is_punct(j, "(") {
                depth -= 1;
                if depth == 0 {
                    break j;
                }
            }

            match j.checked_sub(1) {
                Some(p) => j = p,
                None => return false,
            }
        };

        let Some(before) = open.checked_sub(1) else {
            return false;
        };

        if self.is_keyword(before, "function")
            || self.is_keyword(before, "fn")
            || self.is_keyword(before, "use")
        {
            return true;
        }

        // `function name(` or `function &name(`
        self.kind(before) == Some(TokenKind::Identifier)
            && (self.prev_is_keyword(before, "function")
                || (self.prev_is_punct(before, "&")
                    && before
                        .checked_sub(1)
                        .is_some_and(|amp| self.prev_is_keyword(amp, "function"))))
    }
}
