//! Moving every bundled symbol under the prefix.
//!
//! Rewriting happens in two phases. Phase 1 outlines every file and records
//! what it declares in a [`SymbolMapBuilder`]; phase 2 runs against the
//! frozen [`SymbolMap`] and edits every name whose meaning would otherwise
//! change. A name is edited when resolving it in the rewritten file (under
//! the prefixed namespace and imports) no longer yields the prefixed
//! counterpart of what it resolved to in the original file.

pub mod edit;

use std::{
    fs, io,
    ops::Range,
    path::{Path, PathBuf},
};

use rayon::{prelude::*, ThreadPool};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
    manifest::UnresolvedPolicy,
    package::{PackageDescriptor, PackageId},
    php::{
        lexer,
        literal,
        name::{self, SymbolKind, SEPARATOR},
        outline::{
            ClassLikeKind, DocComment, Heredoc, Import, ImportRole, Reference,
            StringContext, StringLiteral,
        },
        scope::{Aliases, Resolved, Scope},
        LexError, Outline,
    },
    source_file::SourceFile,
    span::{self, Span},
    symbol_map::{
        CollisionError, Origin, Resolution, SymbolMap, SymbolMapBuilder,
    },
};
use edit::Edit;

#[derive(Debug, Error)]
pub enum RewriteError {
    #[error("failed to lex `{}`: {source}", .path.display())]
    Lex { path: PathBuf, source: LexError },
    #[error("failed to write `{}`: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to start the worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
}

/// A reference to a namespaced symbol that no package declares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnresolvedSymbol {
    /// The file's path relative to the output root.
    pub path: String,
    pub line: usize,
    pub kind: SymbolKind,
    pub name: String,
}

impl std::fmt::Display for UnresolvedSymbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}:{}: {} `{}` is not declared by any bundled package",
            self.path, self.line, self.kind, self.name
        )
    }
}

#[derive(Debug, Error)]
#[error("{} unresolved symbol(s):{}", .0.len(), render_unresolved(.0))]
pub struct UnresolvedSymbolError(pub Vec<UnresolvedSymbol>);

fn render_unresolved(symbols: &[UnresolvedSymbol]) -> String {
    symbols.iter().map(|symbol| format!("\n  {symbol}")).collect()
}

/// Creates the worker pool; `jobs == 0` uses every core.
pub fn thread_pool(jobs: usize) -> Result<ThreadPool, RewriteError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .thread_name(|idx| format!("prefixer-{idx}"))
        .build()?;
    Ok(pool)
}

// PHASE 1

/// The symbols one file declares.
#[derive(Debug, Clone)]
pub struct FileSymbols {
    pub origin: Origin,
    pub namespaces: Vec<String>,
    pub declarations: Vec<DeclaredSymbol>,
    /// Whether the file declares a free function or a constant, which
    /// cannot be autoloaded.
    pub eager: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredSymbol {
    pub kind: SymbolKind,
    pub name: String,
    pub class_kind: Option<ClassLikeKind>,
}

pub fn scan_file(
    file: &SourceFile,
    origin: Origin,
) -> Result<FileSymbols, RewriteError> {
    let outline =
        Outline::parse(file.contents()).map_err(|source| RewriteError::Lex {
            path: file.path().to_path_buf(),
            source,
        })?;

    let mut namespaces: Vec<String> =
        outline.namespaces().map(str::to_owned).collect();
    namespaces.dedup();

    let declarations = outline
        .declarations
        .iter()
        .map(|decl| DeclaredSymbol {
            kind: decl.kind,
            name: decl.name.clone(),
            class_kind: decl.class_kind,
        })
        .collect();

    Ok(FileSymbols {
        origin,
        namespaces,
        declarations,
        eager: outline.declares_functions_or_constants(),
    })
}

/// Outlines every file of every package on `pool`. The result is ordered
/// by package and then by file, whatever order the workers finish in.
pub fn scan(
    packages: &[PackageDescriptor],
    pool: &ThreadPool,
) -> Result<Vec<FileSymbols>, RewriteError> {
    let units: Vec<(Origin, &SourceFile)> = packages
        .iter()
        .flat_map(|package| {
            package.files.iter().enumerate().map(move |(file, source)| {
                let origin = Origin {
                    package: package.id,
                    file,
                };
                (origin, source)
            })
        })
        .collect();

    let results: Vec<Result<FileSymbols, RewriteError>> = pool.install(|| {
        units
            .par_iter()
            .map(|(origin, file)| scan_file(file, *origin))
            .collect()
    });

    let scanned = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    info!(files = scanned.len(), "scanned package sources");
    Ok(scanned)
}

pub fn record_file(builder: &mut SymbolMapBuilder, symbols: &FileSymbols) {
    for namespace in &symbols.namespaces {
        builder.record_namespace(namespace);
    }

    for decl in &symbols.declarations {
        builder.record(decl.kind, &decl.name, decl.class_kind, symbols.origin);
    }
}

/// Records every package namespace and every scanned declaration, then
/// freezes the map.
pub fn build_map(
    mut builder: SymbolMapBuilder,
    packages: &[PackageDescriptor],
    scanned: &[FileSymbols],
) -> Result<SymbolMap, CollisionError> {
    for package in packages {
        for namespace in package.namespaces.iter() {
            builder.record_namespace(namespace);
        }
    }

    for symbols in scanned {
        record_file(&mut builder, symbols);
    }

    builder.freeze()
}

// PHASE 2

/// Something worth reporting about a rewritten file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    /// A certain reference, or an import, to a namespaced symbol that no
    /// package declares and that is not excluded.
    Unresolved {
        kind: SymbolKind,
        name: String,
        line: usize,
    },
    /// A string literal that looks like a class name but is not declared by
    /// any package.
    DynamicString { value: String, line: usize },
    /// A heredoc or nowdoc that mentions a bundled name. Its text is left
    /// as it is.
    EmbeddedName { value: String, line: usize },
    /// A group import whose members do not all move under the prefix.
    MixedGroup {
        prefix: String,
        member: String,
        line: usize,
    },
}

#[derive(Debug, Clone)]
pub struct Rewritten {
    pub text: String,
    pub findings: Vec<Finding>,
}

/// Rewrites one file against `map`.
pub fn rewrite_source(
    source: &str,
    map: &SymbolMap,
) -> Result<Rewritten, LexError> {
    let outline = Outline::parse(source)?;
    Ok(RewriteUnit::new(source, &outline, map).rewrite())
}

/// The name `name`, imported as a `kind`, has after prefixing. Namespace
/// imports resolve like any other owned name, apart from root namespaces,
/// which look global.
fn import_target(map: &SymbolMap, kind: SymbolKind, name: &str) -> String {
    match map.resolve(kind, name) {
        Resolution::Declared(declared) => declared.target.to_owned(),
        Resolution::Owned(target) => target,
        Resolution::Global if kind == SymbolKind::ClassLike => {
            map.map_namespace(name).into_owned()
        }
        _ => name::strip_leading(name).to_owned(),
    }
}

/// A file being rewritten, with the scope of each of its namespace blocks
/// after rewriting.
struct RewriteUnit<'a> {
    source: &'a str,
    outline: &'a Outline,
    map: &'a SymbolMap,
    namespaces: Vec<Option<String>>,
    aliases: Vec<Aliases>,
    /// Whether each block is a global block moved under the prefix.
    wrapped: Vec<bool>,
    edits: Vec<Edit>,
    findings: Vec<Finding>,
}

impl<'a> RewriteUnit<'a> {
    fn new(source: &'a str, outline: &'a Outline, map: &'a SymbolMap) -> Self {
        let wrapped: Vec<bool> = (0..outline.blocks.len())
            .map(|block| {
                outline.blocks[block].name.is_none()
                    && outline.declarations.iter().any(|decl| {
                        decl.block == block
                            && !decl.via_define
                            && matches!(
                                map.resolve(decl.kind, &decl.name),
                                Resolution::Declared(_)
                            )
                    })
            })
            .collect();

        let namespaces = outline
            .blocks
            .iter()
            .zip(&wrapped)
            .map(|(block, wrapped)| match (&block.name, wrapped) {
                (Some(namespace), _) => {
                    Some(map.map_namespace(namespace).into_owned())
                }
                (None, true) => Some(map.prefix().to_owned()),
                (None, false) => None,
            })
            .collect();

        let aliases = outline
            .blocks
            .iter()
            .map(|block| {
                block
                    .aliases
                    .map_targets(|kind, target| import_target(map, kind, target))
            })
            .collect();

        Self {
            source,
            outline,
            map,
            namespaces,
            aliases,
            wrapped,
            edits: Vec::new(),
            findings: Vec::new(),
        }
    }

    fn rewrite(mut self) -> Rewritten {
        let outline = self.outline;

        self.namespace_declarations();
        self.imports();
        for reference in &outline.references {
            self.reference(reference);
        }
        for literal in &outline.strings {
            self.string(literal);
        }
        for doc in &outline.doc_comments {
            self.doc_comment(doc);
        }
        for heredoc in &outline.heredocs {
            self.heredoc(heredoc);
        }

        Rewritten {
            text: edit::apply(self.source, self.edits),
            findings: self.findings,
        }
    }

    fn new_scope(&self, block: usize) -> Scope<'_> {
        Scope::new(self.namespaces[block].as_deref(), &self.aliases[block])
    }

    fn line(&self, at: Span) -> usize {
        span::line_of(self.source, at.start as usize)
    }

    fn namespace_declarations(&mut self) {
        let outline = self.outline;

        for (idx, block) in outline.blocks.iter().enumerate() {
            let Some(new) = self.namespaces[idx].clone() else {
                continue;
            };

            match block.declaration {
                // the implicit global block
                None if self.wrapped[idx] => {
                    if let Some(offset) = outline.prelude_end {
                        self.edits.push(Edit::insert(
                            offset,
                            format!("\nnamespace {new};\n"),
                        ));
                    }
                }
                None => (),
                Some(decl) => match decl.name {
                    Some(span) => {
                        let old = name::strip_leading(span.text(self.source));
                        if old != new {
                            self.edits.push(Edit::replace(span, new));
                        }
                    }
                    // `namespace { ... }`
                    None => {
                        let end = decl.keyword.end as usize;
                        self.edits.push(Edit::insert(end, format!(" {new}")));
                    }
                },
            }
        }
    }

    fn imports(&mut self) {
        let outline = self.outline;
        let map = self.map;

        // the current group's original and rewritten prefix
        let mut group: Option<(String, String)> = None;

        for import in &outline.imports {
            match import.role {
                ImportRole::GroupPrefix => {
                    let mapped = map.map_namespace(&import.name).into_owned();
                    if mapped != import.name {
                        self.edits.push(Edit::replace(import.span, mapped.clone()));
                    }
                    group = Some((import.name.clone(), mapped));
                }
                ImportRole::Single => {
                    let target = import_target(map, import.kind, &import.name);
                    if !import.kind.eq(&target, &import.name) {
                        self.edits.push(Edit::replace(import.span, target));
                    }
                    self.check_import(import);
                }
                ImportRole::GroupMember => {
                    let target = import_target(map, import.kind, &import.name);
                    if let Some((prefix, mapped)) = &group {
                        let member = import.span.text(self.source);
                        let actual = format!("{mapped}{SEPARATOR}{member}");
                        if !import.kind.eq(&actual, &target) {
                            self.findings.push(Finding::MixedGroup {
                                prefix: prefix.clone(),
                                member: import.name.clone(),
                                line: self.line(import.span),
                            });
                        }
                    }
                    self.check_import(import);
                }
            }
        }
    }

    fn check_import(&mut self, import: &Import) {
        let unresolved = match self.map.resolve(import.kind, &import.name) {
            Resolution::Owned(_) | Resolution::Foreign => {
                import.kind != SymbolKind::ClassLike
                    || !self.map.is_namespace(&import.name)
            }
            _ => false,
        };

        if unresolved {
            self.findings.push(Finding::Unresolved {
                kind: import.kind,
                name: import.name.clone(),
                line: self.line(import.span),
            });
        }
    }

    fn reference(&mut self, reference: &Reference) {
        let map = self.map;
        let kind = reference.kind;
        let text = reference.span.text(self.source);

        let original = match self.outline.scope(reference.block).resolve(kind, text) {
            Resolved::Exact(name) => name,
            // PHP only falls back to the global symbol if the namespaced one
            // does not exist
            Resolved::Fallback { namespaced, global } => {
                match map.lookup(kind, &namespaced) {
                    Some(_) => namespaced,
                    None => global,
                }
            }
        };

        let resolution = map.resolve(kind, &original);
        let target = match &resolution {
            Resolution::Declared(declared) => declared.target.to_owned(),
            Resolution::Owned(target) => target.clone(),
            _ => original.clone(),
        };

        let rewritten = match self.new_scope(reference.block).resolve(kind, text) {
            Resolved::Exact(name) => name,
            Resolved::Fallback { namespaced, global } => {
                match map.is_emitted(kind, &namespaced) {
                    true => namespaced,
                    false => global,
                }
            }
        };

        if !kind.eq(&rewritten, &target) {
            self.edits.push(Edit::replace(reference.span, format!("\\{target}")));
        }

        if reference.certain
            && matches!(resolution, Resolution::Owned(_) | Resolution::Foreign)
        {
            self.findings.push(Finding::Unresolved {
                kind,
                name: original,
                line: self.line(reference.span),
            });
        }
    }

    fn string(&mut self, literal: &StringLiteral) {
        let map = self.map;
        let text = literal.span.text(self.source);
        let Some(value) = literal::decode(text) else {
            return;
        };

        let bare = name::strip_leading(&value);
        if !name::is_valid_qualified(bare, false) {
            return;
        }

        let target = match literal.context {
            StringContext::Plain => {
                if !bare.contains(SEPARATOR) {
                    return;
                }

                let declared = [
                    SymbolKind::ClassLike,
                    SymbolKind::Function,
                    SymbolKind::Constant,
                ]
                .into_iter()
                .find_map(|kind| map.lookup(kind, bare));

                match (declared, map.resolve(SymbolKind::ClassLike, bare)) {
                    (Some(_), Resolution::Excluded) => return,
                    (Some(declared), _) => declared.target.to_owned(),
                    (None, Resolution::Owned(target)) => {
                        self.dynamic_string(bare, literal.span);
                        target
                    }
                    (None, Resolution::Foreign) => {
                        if name::looks_like_class(bare) {
                            self.dynamic_string(bare, literal.span);
                        }
                        return;
                    }
                    (None, _) => return,
                }
            }
            StringContext::SymbolCheck(kind) => match map.resolve(kind, bare) {
                Resolution::Declared(declared) => declared.target.to_owned(),
                Resolution::Owned(target) => target,
                _ => return,
            },
            StringContext::Define => {
                match map.resolve(SymbolKind::Constant, bare) {
                    Resolution::Declared(declared) => declared.target.to_owned(),
                    _ => return,
                }
            }
        };

        let new_value = match value.starts_with(SEPARATOR) {
            true => format!("\\{target}"),
            false => target,
        };

        if new_value != value {
            let encoded = literal::encode(&new_value, text);
            self.edits.push(Edit::replace(literal.span, encoded));
        }
    }

    fn dynamic_string(&mut self, value: &str, span: Span) {
        self.findings.push(Finding::DynamicString {
            value: value.to_owned(),
            line: self.line(span),
        });
    }

    fn doc_comment(&mut self, doc: &DocComment) {
        let map = self.map;
        let text = doc.span.text(self.source);
        let start = doc.span.start as usize;

        for (range, name) in doc_names(text) {
            let target = match map.resolve(SymbolKind::ClassLike, name) {
                Resolution::Declared(declared) => declared.target.to_owned(),
                Resolution::Owned(target) => target,
                _ => continue,
            };

            let span = Span::new(start + range.start, start + range.end);
            self.edits.push(Edit::replace(span, target));
        }
    }

    fn heredoc(&mut self, heredoc: &Heredoc) {
        let map = self.map;
        let text = heredoc.span.text(self.source);
        let start = heredoc.span.start as usize;

        for (offset, value) in embedded_names(text, !heredoc.nowdoc) {
            let bundled = matches!(
                map.resolve(SymbolKind::ClassLike, &value),
                Resolution::Declared(_) | Resolution::Owned(_)
            );

            if bundled {
                self.findings.push(Finding::EmbeddedName {
                    value,
                    line: span::line_of(self.source, start + offset),
                });
            }
        }
    }
}

/// Finds the fully-qualified names in a doc comment, returning the range of
/// each name without its leading separator.
pub(crate) fn doc_names(text: &str) -> Vec<(Range<usize>, &str)> {
    let mut names = Vec::new();
    let mut idx = 0;

    while let Some(offset) = text[idx..].find(SEPARATOR) {
        let at = idx + offset;
        let start = at + 1;
        idx = start;

        let inside_name = text[..at].chars().next_back().is_some_and(lexer::is_ident_char);
        if inside_name || !text[start..].starts_with(lexer::is_ident_start) {
            continue;
        }

        let mut end = start;
        loop {
            end += lexer::ident_len(&text[end..]);
            let rest = &text[end..];
            match rest.strip_prefix(SEPARATOR) {
                Some(after) if after.starts_with(lexer::is_ident_start) => {
                    end += 1
                }
                _ => break,
            }
        }

        names.push((start..end, &text[start..end]));
        idx = end;
    }

    names
}

/// Finds qualified names such as `Foo\Bar` in the body of a heredoc or
/// nowdoc, returning the offset of each and its value. In a heredoc `\\` is
/// an escaped separator, and `\n` and friends are escape sequences.
pub(crate) fn embedded_names(text: &str, escaped: bool) -> Vec<(usize, String)> {
    let mut names = Vec::new();
    let mut idx = 0;

    while let Some(c) = text[idx..].chars().next() {
        let after_word = text[..idx]
            .chars()
            .next_back()
            .is_some_and(|prev| prev == '$' || lexer::is_ident_char(prev));
        if after_word || !lexer::is_ident_start(c) {
            idx += c.len_utf8();
            continue;
        }

        let start = idx;
        let mut segments = Vec::new();
        loop {
            let len = lexer::ident_len(&text[idx..]);
            segments.push(&text[idx..idx + len]);
            idx += len;

            let rest = &text[idx..];
            let separator = if escaped && rest.starts_with("\\\\") {
                2
            } else if rest.starts_with(SEPARATOR) {
                1
            } else {
                0
            };

            let next = &text[idx + separator..];
            let is_escape = escaped
                && separator == 1
                && next.starts_with(['n', 't', 'r', 'v', 'e', 'f', 'x', 'u']);
            if separator == 0 || is_escape || !next.starts_with(lexer::is_ident_start) {
                break;
            }
            idx += separator;
        }

        if segments.len() > 1 {
            names.push((start, segments.join("\\")));
        }
    }

    names
}

/// The findings of one rewritten file.
#[derive(Debug, Clone)]
pub struct FileReport {
    pub package: PackageId,
    /// The file's path relative to the output root.
    pub path: String,
    pub findings: Vec<Finding>,
}

/// Rewrites every file of every package on `pool`, writing the results
/// under `out`.
pub fn rewrite_packages(
    packages: &[PackageDescriptor],
    map: &SymbolMap,
    out: &Path,
    pool: &ThreadPool,
) -> Result<Vec<FileReport>, RewriteError> {
    let units: Vec<(&PackageDescriptor, &SourceFile)> = packages
        .iter()
        .flat_map(|package| package.files.iter().map(move |file| (package, file)))
        .collect();

    let results: Vec<Result<FileReport, RewriteError>> = pool.install(|| {
        units
            .par_iter()
            .map(|(package, file)| rewrite_file(package, file, map, out))
            .collect()
    });

    let reports = results.into_iter().collect::<Result<Vec<_>, _>>()?;
    info!(files = reports.len(), "rewrote package sources");
    Ok(reports)
}

fn rewrite_file(
    package: &PackageDescriptor,
    file: &SourceFile,
    map: &SymbolMap,
    out: &Path,
) -> Result<FileReport, RewriteError> {
    let rewritten =
        rewrite_source(file.contents(), map).map_err(|source| {
            RewriteError::Lex {
                path: file.path().to_path_buf(),
                source,
            }
        })?;

    let path = out.join(package.output_dir()).join(file.relative());
    write_file(&path, &file.encoding().encode(&rewritten.text))?;
    debug!(path = %path.display(), "rewrote file");

    Ok(FileReport {
        package: package.id,
        path: package.output_path(file.relative()),
        findings: rewritten.findings,
    })
}

pub(crate) fn write_file(path: &Path, contents: &[u8]) -> Result<(), RewriteError> {
    let io_error = |source| RewriteError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_error)?;
    }
    fs::write(path, contents).map_err(io_error)
}

/// Logs every warning among `reports`, and fails if there are unresolved
/// symbols and `policy` says so.
pub fn check_findings(
    reports: &[FileReport],
    policy: UnresolvedPolicy,
) -> Result<(), UnresolvedSymbolError> {
    let mut unresolved = Vec::new();

    for report in reports {
        for finding in &report.findings {
            match finding {
                Finding::Unresolved { kind, name, line } => {
                    unresolved.push(UnresolvedSymbol {
                        path: report.path.clone(),
                        line: *line,
                        kind: *kind,
                        name: name.clone(),
                    });
                }
                Finding::DynamicString { value, line } => warn!(
                    file = %report.path,
                    line,
                    "string `{value}` looks like a class name, but no package declares it"
                ),
                Finding::EmbeddedName { value, line } => warn!(
                    file = %report.path,
                    line,
                    "heredoc mentions the bundled name `{value}`, which is not prefixed there"
                ),
                Finding::MixedGroup {
                    prefix,
                    member,
                    line,
                } => warn!(
                    file = %report.path,
                    line,
                    "group import `{prefix}\\{{...}}` mixes prefixed and excluded \
                     names: `{member}` will resolve incorrectly"
                ),
            }
        }
    }

    if unresolved.is_empty() {
        return Ok(());
    }

    match policy {
        UnresolvedPolicy::Error => Err(UnresolvedSymbolError(unresolved)),
        UnresolvedPolicy::Warn => {
            for symbol in &unresolved {
                warn!("{symbol}");
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use semver::Version;

    use super::*;
    use crate::{manifest::ExcludeSettings, symbol_map::Exclusions};

    const PREFIX: &str = "P";

    fn map_with(exclude: ExcludeSettings, files: &[(usize, &str)]) -> SymbolMap {
        let mut builder = SymbolMapBuilder::new(
            PREFIX,
            Exclusions::from(&exclude),
            vec!["a/a".into(), "b/b".into()],
        );

        for (idx, (package, source)) in files.iter().enumerate() {
            let file = crate::fake_file!(format!("f{idx}.php"), *source);
            let origin = Origin {
                package: PackageId(*package),
                file: idx,
            };
            record_file(&mut builder, &scan_file(&file, origin).unwrap());
        }

        builder.freeze().unwrap()
    }

    fn map(files: &[(usize, &str)]) -> SymbolMap {
        map_with(ExcludeSettings::default(), files)
    }

    fn excluding_psr() -> ExcludeSettings {
        ExcludeSettings {
            namespaces: vec!["Psr\\Http\\Message".into()],
            ..ExcludeSettings::default()
        }
    }

    const GUZZLE: &[(usize, &str)] = &[
        (0, "<?php namespace GuzzleHttp; interface ClientInterface {}"),
        (0, "<?php namespace GuzzleHttp; class Response {}"),
        (0, "<?php namespace GuzzleHttp; class Client {}"),
        (1, "<?php namespace GuzzleHttp\\Psr7; class Request {}"),
    ];

    #[test]
    fn namespaces_and_imports_move_under_the_prefix() {
        let source = r#"<?php
namespace GuzzleHttp;

use Psr\Http\Message\RequestInterface;
use GuzzleHttp\Psr7\Request;

class Client implements ClientInterface
{
    public function send(RequestInterface $request): Response
    {
        return new Response(\strlen('x'));
    }
}
"#;
        let map = map_with(excluding_psr(), GUZZLE);
        let rewritten = rewrite_source(source, &map).unwrap();

        let expected = source
            .replace("namespace GuzzleHttp;", "namespace P\\GuzzleHttp;")
            .replace("use GuzzleHttp\\Psr7", "use P\\GuzzleHttp\\Psr7");
        assert_eq!(rewritten.text, expected);
        assert!(rewritten.findings.is_empty());
    }

    #[test]
    fn cross_package_references() {
        let source = r#"<?php
namespace App;

$a = \App\Util\helper();
$b = Util\LIMIT;
$c = new \DateTime();
$d = strlen('x');
"#;
        let map = map(&[
            (0, source),
            (1, "<?php\nnamespace App\\Util;\n\nfunction helper() {}\nconst LIMIT = 10;\n"),
        ]);
        let rewritten = rewrite_source(source, &map).unwrap();

        let expected = source
            .replace("namespace App;", "namespace P\\App;")
            .replace("\\App\\Util\\helper", "\\P\\App\\Util\\helper");
        assert_eq!(rewritten.text, expected);
        assert!(rewritten.findings.is_empty());
    }

    #[test]
    fn global_files_are_wrapped() {
        let source = r#"<?php
declare(strict_types=1);

if (!function_exists('str_contains_any')) {
    function str_contains_any(string $haystack, array $needles): bool
    {
        throw new Exception(ACME_VERSION);
    }
}
define('ACME_VERSION', '1.0');
"#;
        let braced = "<?php\nnamespace {\n    function legacy_helper() {}\n}\n";
        let map = map(&[(0, source), (0, braced)]);

        let rewritten = rewrite_source(source, &map).unwrap();
        let expected = source
            .replace(
                "declare(strict_types=1);",
                "declare(strict_types=1);\nnamespace P;\n",
            )
            .replace("'str_contains_any'", "'P\\str_contains_any'")
            .replace("new Exception", "new \\Exception")
            .replace("'ACME_VERSION'", "'P\\ACME_VERSION'");
        assert_eq!(rewritten.text, expected);

        let rewritten = rewrite_source(braced, &map).unwrap();
        assert_eq!(rewritten.text, braced.replace("namespace {", "namespace P {"));
    }

    #[test]
    fn global_files_without_bundled_declarations_stay_global() {
        let source = "<?php\nfunction helper_for_app() {}\necho strlen('x');\n";
        let map = map_with(
            ExcludeSettings {
                functions: vec!["helper_for_app".into()],
                ..ExcludeSettings::default()
            },
            &[(0, source)],
        );

        let rewritten = rewrite_source(source, &map).unwrap();
        assert_eq!(rewritten.text, source);
    }

    #[test]
    fn strings_and_doc_comments() {
        let source = r#"<?php
namespace App;

/**
 * @param \GuzzleHttp\Client $client
 * @return \Foreign\Thing
 */
function make($client)
{
    $class = 'GuzzleHttp\\Client';
    $other = "\\GuzzleHttp\\Missing";
    $foreign = 'Vendor\\Unknown';
    return class_exists('GuzzleHttp\Client');
}
"#;
        let map = map(&[(0, GUZZLE[2].1), (0, source)]);
        let rewritten = rewrite_source(source, &map).unwrap();

        let expected = source
            .replace("namespace App;", "namespace P\\App;")
            .replace("@param \\GuzzleHttp", "@param \\P\\GuzzleHttp")
            .replace(r"'GuzzleHttp\\Client'", r"'P\\GuzzleHttp\\Client'")
            .replace(r#""\\GuzzleHttp\\Missing""#, r#""\\P\\GuzzleHttp\\Missing""#)
            .replace(r"'GuzzleHttp\Client'", r"'P\GuzzleHttp\Client'");
        assert_eq!(rewritten.text, expected);

        assert_eq!(
            rewritten.findings,
            [
                Finding::DynamicString {
                    value: "GuzzleHttp\\Missing".into(),
                    line: 11,
                },
                Finding::DynamicString {
                    value: "Vendor\\Unknown".into(),
                    line: 12,
                },
            ]
        );
    }

    #[test]
    fn unresolved_references_and_imports() {
        let source = r#"<?php
namespace App;

use GuzzleHttp\{Client, Psr7\Request};
use Psr\Http\Message\{MessageInterface, StreamInterface};
use GuzzleHttp\Missing;

new Client(new \GuzzleHttp\Nope(), new \Other\Thing());
"#;
        let mut files = GUZZLE.to_vec();
        files.push((0, source));
        let map = map_with(excluding_psr(), &files);
        let rewritten = rewrite_source(source, &map).unwrap();

        let expected = source
            .replace("namespace App;", "namespace P\\App;")
            .replace("use GuzzleHttp\\{", "use P\\GuzzleHttp\\{")
            .replace("use GuzzleHttp\\Missing", "use P\\GuzzleHttp\\Missing")
            .replace("\\GuzzleHttp\\Nope", "\\P\\GuzzleHttp\\Nope");
        assert_eq!(rewritten.text, expected);

        let unresolved: Vec<_> = rewritten
            .findings
            .iter()
            .filter_map(|finding| match finding {
                Finding::Unresolved { name, line, .. } => Some((name.as_str(), *line)),
                _ => None,
            })
            .collect();
        assert_eq!(
            unresolved,
            [
                ("GuzzleHttp\\Missing", 6),
                ("GuzzleHttp\\Nope", 8),
                ("Other\\Thing", 8),
            ]
        );
    }

    #[test]
    fn mixed_group_imports_are_reported() {
        let source = "<?php\nnamespace App;\nuse GuzzleHttp\\{Client, Psr7\\Request};\n";
        let mut files = GUZZLE.to_vec();
        files.push((0, source));
        let map = map_with(
            ExcludeSettings {
                classes: vec!["GuzzleHttp\\Client".into()],
                ..ExcludeSettings::default()
            },
            &files,
        );

        let rewritten = rewrite_source(source, &map).unwrap();
        assert_eq!(
            rewritten.findings,
            [Finding::MixedGroup {
                prefix: "GuzzleHttp".into(),
                member: "GuzzleHttp\\Client".into(),
                line: 3,
            }]
        );
    }

    #[test]
    fn prefixed_code_is_left_alone() {
        let source = "<?php namespace P\\GuzzleHttp; new \\P\\GuzzleHttp\\Client(); new Client();";
        let map = map(GUZZLE);
        let rewritten = rewrite_source(source, &map).unwrap();
        assert_eq!(rewritten.text, source);
        assert!(rewritten.findings.is_empty());
    }

    #[test]
    fn strings_with_empty_segments_are_not_names() {
        let source = r#"<?php
namespace App;

$a = 'GuzzleHttp\\\\Client';
$b = 'GuzzleHttp\\';
$c = "App\\\\Util";
"#;
        let mut files = GUZZLE.to_vec();
        files.push((0, source));
        let map = map(&files);

        let rewritten = rewrite_source(source, &map).unwrap();
        assert_eq!(rewritten.text, source.replace("namespace App;", "namespace P\\App;"));
        assert!(rewritten.findings.is_empty());
    }

    #[test]
    fn heredocs_are_reported_but_kept() {
        let source = r#"<?php
namespace App;

$a = <<<EOT
GuzzleHttp\Client and \Vendor\Unknown
EOT;
$b = <<<'TXT'
    new \GuzzleHttp\Psr7\Request()
    TXT;
$c = <<<EOT
GuzzleHttp\\Response {$x}
EOT;
"#;
        let mut files = GUZZLE.to_vec();
        files.push((0, source));
        let map = map(&files);

        let rewritten = rewrite_source(source, &map).unwrap();
        assert_eq!(rewritten.text, source.replace("namespace App;", "namespace P\\App;"));
        assert_eq!(
            rewritten.findings,
            [
                Finding::EmbeddedName {
                    value: "GuzzleHttp\\Client".into(),
                    line: 5,
                },
                Finding::EmbeddedName {
                    value: "GuzzleHttp\\Psr7\\Request".into(),
                    line: 8,
                },
                Finding::EmbeddedName {
                    value: "GuzzleHttp\\Response".into(),
                    line: 11,
                },
            ]
        );
    }

    #[test]
    fn embedded_name_escapes() {
        let names = |text, escaped| -> Vec<String> {
            embedded_names(text, escaped).into_iter().map(|(_, name)| name).collect()
        };

        assert_eq!(names(r"A\B $C\D x\nY", true), ["A\\B"]);
        assert_eq!(names(r"A\B $C\D x\nY", false), ["A\\B", "x\\nY"]);
        assert_eq!(names(r"A\\B", true), ["A\\B"]);
        assert_eq!(embedded_names("  Foo\\Bar", false)[0].0, 2);
    }

    #[test]
    fn doc_name_ranges() {
        let text = "/** @var \\Foo\\Bar|\\Baz $x Foo\\Qux \\ \\9 */";
        let names: Vec<_> = doc_names(text).into_iter().map(|(_, name)| name).collect();
        assert_eq!(names, ["Foo\\Bar", "Baz"]);

        let (range, _) = &doc_names(text)[0];
        assert_eq!(&text[range.clone()], "Foo\\Bar");
    }

    fn package(id: usize, name: &str, files: Vec<SourceFile>) -> PackageDescriptor {
        PackageDescriptor {
            id: PackageId(id),
            name: name.into(),
            version: Version::new(1, 0, 0),
            source_path: Path::new("/fake").into(),
            namespaces: Box::new([]),
            files: files.into(),
            always_loaded: Box::new([]),
            assets: Box::new([]),
            requires: BTreeMap::new(),
        }
    }

    #[test]
    fn packages_are_rewritten_into_the_output_root() {
        let packages = [
            package(
                0,
                "acme/http",
                vec![
                    crate::fake_file!("src/Client.php", "<?php namespace Acme\\Http; class Client extends \\Acme\\Uri\\Uri {}"),
                    crate::fake_file!("src/functions.php", "<?php namespace Acme\\Http; function get() {}"),
                ],
            ),
            package(
                1,
                "acme/uri",
                vec![crate::fake_file!("src/Uri.php", "<?php namespace Acme\\Uri; class Uri {}")],
            ),
        ];

        let pool = thread_pool(2).unwrap();
        let scanned = scan(&packages, &pool).unwrap();
        assert_eq!(scanned.len(), 3);
        assert!(!scanned[0].eager);
        assert!(scanned[1].eager);
        assert_eq!(scanned[2].origin, Origin { package: PackageId(1), file: 0 });

        let builder = SymbolMapBuilder::new(
            PREFIX,
            Exclusions::default(),
            vec!["acme/http".into(), "acme/uri".into()],
        );
        let map = build_map(builder, &packages, &scanned).unwrap();

        let out = tempfile::tempdir().unwrap();
        let reports = rewrite_packages(&packages, &map, out.path(), &pool).unwrap();
        assert_eq!(reports[0].path, "acme/http/src/Client.php");
        assert!(check_findings(&reports, UnresolvedPolicy::Error).is_ok());

        let client = fs::read_to_string(out.path().join("acme/http/src/Client.php")).unwrap();
        assert_eq!(
            client,
            "<?php namespace P\\Acme\\Http; class Client extends \\P\\Acme\\Uri\\Uri {}"
        );
    }

    #[test]
    fn unresolved_policy() {
        let reports = [FileReport {
            package: PackageId(0),
            path: "a/a/src/A.php".into(),
            findings: vec![Finding::Unresolved {
                kind: SymbolKind::ClassLike,
                name: "A\\Missing".into(),
                line: 3,
            }],
        }];

        let error = check_findings(&reports, UnresolvedPolicy::Error).unwrap_err();
        assert_eq!(
            error.to_string(),
            "1 unresolved symbol(s):\n  a/a/src/A.php:3: class `A\\Missing` is not \
             declared by any bundled package"
        );
        assert!(check_findings(&reports, UnresolvedPolicy::Warn).is_ok());
    }
}
