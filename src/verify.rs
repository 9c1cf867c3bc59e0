//! Verification of an emitted tree.
//!
//! The verifier only needs the tree itself, the prefix, and the exclusions,
//! so it can run in a fresh process long after the tree was written. The
//! namespaces the bundled packages originally used are recovered from the
//! prefixed namespace declarations in the tree: any name still pointing into
//! one of them is a leftover the rewriter missed.

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    io::{self, Write as _},
    path::{Path, PathBuf},
    process::Command,
};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use which::which;

use crate::{
    autoload::{self, CLASSMAP_FILE, ENTRY_FILE, FILES_FILE},
    codegen::{
        self,
        php::{Expr, File, Stmt},
    },
    manifest::PhpMode,
    package::PHP_FILE_EXTENSION,
    php::{
        LexError, Outline, SymbolKind, literal, name,
        outline::{ClassLikeKind, StringContext},
        scope::Resolved,
        token::TokenKind,
    },
    rewrite::doc_names,
    source_file,
    span::{self, Span},
    symbol_map::Exclusions,
};

/// One problem found in the tree, reported as what was found and what was
/// expected instead.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Violation {
    /// Relative to the output root.
    pub path: String,
    /// 1-based, or 0 for problems with a file as a whole.
    pub line: usize,
    pub found: String,
    pub expected: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.line {
            0 => writeln!(f, "- {}: {}", self.path, self.found)?,
            line => writeln!(f, "- {}:{line}: {}", self.path, self.found)?,
        }
        write!(f, "+ {}", self.expected)
    }
}

/// Every violation found in a tree, sorted by location.
#[derive(Debug, Clone, Error)]
#[error("{} verification violation(s):{}", .0.len(), render_violations(.0))]
pub struct VerificationFailure(pub Vec<Violation>);

fn render_violations(violations: &[Violation]) -> String {
    violations.iter().map(|v| format!("\n{v}")).collect()
}

#[derive(Debug, Error)]
pub enum VerifyError {
    #[error("failed to read `{}`: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
    #[error("failed to walk the output tree: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("{0}")]
    Failed(#[from] VerificationFailure),
}

/// What a successful verification looked at.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub files: usize,
    pub classes: usize,
    /// The `php` binary the tree was linted and smoke-tested with, if any.
    pub php: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct Verifier<'a> {
    prefix: &'a str,
    exclusions: &'a Exclusions,
    php: PhpMode,
    php_binary: &'a Path,
}

impl<'a> Verifier<'a> {
    pub fn new(prefix: &'a str, exclusions: &'a Exclusions, php: PhpMode) -> Self {
        Self {
            prefix,
            exclusions,
            php,
            php_binary: Path::new("php"),
        }
    }

    /// Lints with `binary` instead of the `php` on the `PATH`.
    pub fn with_php_binary(mut self, binary: &'a Path) -> Self {
        self.php_binary = binary;
        self
    }

    /// Verifies the tree at `root`, reporting every violation at once.
    pub fn verify(&self, root: &Path) -> Result<VerifyReport, VerifyError> {
        if !root.is_dir() {
            let missing = Violation {
                path: root.display().to_string(),
                line: 0,
                found: "no output tree".into(),
                expected: "an output tree written by `prefixer rewrite`".into(),
            };
            return Err(VerificationFailure(vec![missing]).into());
        }

        let tree = read_tree(root)?;
        let mut check = Check::new(self, &tree);

        for file in &tree {
            check.file(file);
        }
        let classmap = check.autoload();

        let php = self.php_binary(&mut check.violations);
        if let Some(php) = &php {
            check.violations.extend(lint(php, root, &tree)?);
            if !classmap.is_empty() {
                check.violations.extend(smoke(php, root, &classmap)?);
            }
        }

        let mut violations = check.violations;
        violations.sort();
        violations.dedup();

        if !violations.is_empty() {
            return Err(VerificationFailure(violations).into());
        }

        info!(
            files = tree.len(),
            classes = classmap.len(),
            php = php.is_some(),
            "verified output tree"
        );
        Ok(VerifyReport {
            files: tree.len(),
            classes: classmap.len(),
            php,
        })
    }

    fn php_binary(&self, violations: &mut Vec<Violation>) -> Option<PathBuf> {
        let binary = self.php_binary;
        match self.php {
            PhpMode::Never => None,
            PhpMode::Auto => match which(binary) {
                Ok(php) => Some(php),
                Err(_) => {
                    debug!(php = %binary.display(), "no php binary found, skipping lint and smoke test");
                    None
                }
            },
            PhpMode::Always => match which(binary) {
                Ok(php) => Some(php),
                Err(_) => {
                    violations.push(Violation {
                        path: ENTRY_FILE.into(),
                        line: 0,
                        found: format!("no `{}` binary", binary.display()),
                        expected: "a `php` binary to lint and smoke-test the tree with".into(),
                    });
                    None
                }
            },
        }
    }
}

// TREE

struct TreeFile {
    /// Relative to the output root, with `/` separators.
    path: String,
    contents: String,
    outline: Result<Outline, LexError>,
}

impl TreeFile {
    fn line(&self, offset: usize) -> usize {
        span::line_of(&self.contents, offset)
    }
}

fn read_tree(root: &Path) -> Result<Vec<TreeFile>, VerifyError> {
    let mut paths = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry?;
        let is_php = entry
            .path()
            .extension()
            .is_some_and(|ext| ext == PHP_FILE_EXTENSION);

        if entry.file_type().is_file() && is_php {
            paths.push(entry.into_path());
        }
    }

    paths
        .par_iter()
        .map(|path| {
            let (contents, _) = source_file::read(path).map_err(|source| VerifyError::Io {
                path: path.clone(),
                source,
            })?;

            let relative = path.strip_prefix(root).unwrap_or(path);
            let relative = relative
                .components()
                .map(|part| part.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            Ok(TreeFile {
                path: relative,
                outline: Outline::parse(&contents),
                contents,
            })
        })
        .collect()
}

// CHECKS

/// The classmap as read back from the tree: symbol, target path, and the
/// kind of the declaration found there.
type Classmap = Vec<(String, String, ClassLikeKind)>;

struct Check<'v, 't> {
    prefix: &'v str,
    exclusions: &'v Exclusions,
    tree: HashMap<&'t str, &'t TreeFile>,
    /// The pre-prefixing names of every prefixed namespace in the tree.
    originals: BTreeSet<String>,
    violations: Vec<Violation>,
}

impl<'v, 't> Check<'v, 't> {
    fn new(verifier: &'v Verifier<'_>, tree: &'t [TreeFile]) -> Self {
        let prefix = verifier.prefix;
        let originals = tree
            .iter()
            .filter_map(|file| file.outline.as_ref().ok())
            .flat_map(Outline::namespaces)
            .filter(|ns| name::is_within(ns, prefix) && ns.len() > prefix.len())
            .map(|ns| ns[prefix.len() + 1..].to_owned())
            .collect();

        Self {
            prefix,
            exclusions: verifier.exclusions,
            tree: tree.iter().map(|file| (file.path.as_str(), file)).collect(),
            originals,
            violations: Vec::new(),
        }
    }

    fn push(
        &mut self,
        file: &TreeFile,
        offset: usize,
        found: impl Into<String>,
        expected: impl Into<String>,
    ) {
        self.violations.push(Violation {
            path: file.path.clone(),
            line: file.line(offset),
            found: found.into(),
            expected: expected.into(),
        });
    }

    fn file(&mut self, file: &TreeFile) {
        let outline = match &file.outline {
            Ok(outline) => outline,
            Err(err) => {
                self.push(file, err.offset, err.message, "a file that lexes cleanly");
                return;
            }
        };

        self.braces(file, outline);

        for block in &outline.blocks {
            let (Some(ns), Some(decl)) = (&block.name, &block.declaration) else {
                continue;
            };

            if !name::is_within(ns, self.prefix) && !self.exclusions.excludes_namespace(ns) {
                self.push(
                    file,
                    decl.keyword.start as usize,
                    format!("namespace {ns}"),
                    format!("namespace {}\\{ns}", self.prefix),
                );
            }
        }

        for decl in &outline.declarations {
            let allowed = name::is_within(&decl.name, self.prefix)
                || self.exclusions.excludes(decl.kind, &decl.name);

            if !allowed {
                self.push(
                    file,
                    decl.span.start as usize,
                    format!("{} `{}` is declared unprefixed", decl.kind, decl.name),
                    format!("{} `{}\\{}`", decl.kind, self.prefix, decl.name),
                );
            }
        }

        for import in &outline.imports {
            self.check_name(file, import.span, "import of", import.kind, &import.name);
        }

        for reference in outline.references.iter().filter(|r| r.certain) {
            let text = reference.span.text(&file.contents);
            if let Resolved::Exact(target) = outline.scope(reference.block).resolve(reference.kind, text)
            {
                self.check_name(file, reference.span, "reference to", reference.kind, &target);
            }
        }

        for string in &outline.strings {
            let kind = match string.context {
                StringContext::Plain => SymbolKind::ClassLike,
                StringContext::SymbolCheck(kind) => kind,
                StringContext::Define => continue,
            };

            let Some(value) = literal::decode(string.span.text(&file.contents)) else {
                continue;
            };
            let value = name::strip_leading(&value);
            if value.contains(name::SEPARATOR) && name::is_valid_qualified(value, false) {
                self.check_name(file, string.span, "string naming", kind, value);
            }
        }

        for doc in &outline.doc_comments {
            let text = doc.span.text(&file.contents);
            for (range, found) in doc_names(text) {
                let span = Span::new(
                    doc.span.start as usize + range.start,
                    doc.span.start as usize + range.end,
                );
                self.check_name(file, span, "doc comment naming", SymbolKind::ClassLike, found);
            }
        }
    }

    /// Reports `fqn` if it still names something under one of the original
    /// namespaces.
    fn check_name(&mut self, file: &TreeFile, at: Span, what: &str, kind: SymbolKind, fqn: &str) {
        let fqn = name::strip_leading(fqn);

        let leftover = name::namespace_of(fqn).is_some()
            && !name::is_within(fqn, self.prefix)
            && !self.exclusions.excludes_namespace(fqn)
            && !self.exclusions.excludes(kind, fqn)
            && self.originals.iter().any(|ns| name::is_within(fqn, ns));

        if leftover {
            self.push(
                file,
                at.start as usize,
                format!("{what} `\\{fqn}`"),
                format!("{what} `\\{}\\{fqn}`", self.prefix),
            );
        }
    }

    fn braces(&mut self, file: &TreeFile, outline: &Outline) {
        let mut open = Vec::new();

        for token in outline.tokens.iter().filter(|tok| tok.item == TokenKind::Punct) {
            match token.span.text(&file.contents) {
                "{" => open.push(token.span.start as usize),
                "}" => {
                    if open.pop().is_none() {
                        self.push(file, token.span.start as usize, "unmatched `}`", "balanced braces");
                        return;
                    }
                }
                _ => {}
            }
        }

        if let Some(offset) = open.pop() {
            self.push(file, offset, "unclosed `{`", "balanced braces");
        }
    }

    /// Checks the generated autoload files, returning the classmap entries
    /// whose targets declare their symbol.
    fn autoload(&mut self) -> Classmap {
        for file in [ENTRY_FILE, FILES_FILE, CLASSMAP_FILE] {
            if !self.tree.contains_key(file) {
                self.violations.push(Violation {
                    path: file.into(),
                    line: 0,
                    found: "missing".into(),
                    expected: "a file generated by prefixer".into(),
                });
            }
        }

        if let Some(files) = self.tree.get(FILES_FILE).copied() {
            for entry in read_back(files) {
                if !self.tree.contains_key(entry.path.as_str()) {
                    self.violations.push(Violation {
                        path: FILES_FILE.into(),
                        line: entry.line,
                        found: format!("`{}` is always loaded but missing", entry.path),
                        expected: format!("`{}` exists", entry.path),
                    });
                }
            }
        }

        let Some(file) = self.tree.get(CLASSMAP_FILE).copied() else {
            return Vec::new();
        };
        let entries = read_back(file);

        let mut classmap = Vec::new();
        let mut seen = HashSet::new();
        for entry in &entries {
            let violation = |found: String, expected: String| Violation {
                path: CLASSMAP_FILE.into(),
                line: entry.line,
                found,
                expected,
            };

            if !seen.insert(entry.key.to_ascii_lowercase()) {
                self.violations.push(violation(
                    format!("`{}` is mapped more than once", entry.key),
                    format!("one entry for `{}`", entry.key),
                ));
                continue;
            }

            let Some(target) = self.tree.get(entry.path.as_str()) else {
                self.violations.push(violation(
                    format!("`{}` maps to missing `{}`", entry.key, entry.path),
                    format!("`{}` exists", entry.path),
                ));
                continue;
            };

            // A target that fails to lex is reported on its own.
            let Ok(outline) = &target.outline else {
                continue;
            };

            let declared = outline.declarations.iter().find_map(|decl| {
                let matches = decl.kind == SymbolKind::ClassLike
                    && decl.name.eq_ignore_ascii_case(&entry.key);
                matches.then_some(decl.class_kind).flatten()
            });

            match declared {
                Some(kind) => classmap.push((entry.key.clone(), entry.path.clone(), kind)),
                None => self.violations.push(violation(
                    format!("`{}` maps to `{}`", entry.key, entry.path),
                    format!("`{}` declares `{}`", entry.path, entry.key),
                )),
            }
        }

        let mut files: Vec<&TreeFile> = self.tree.values().copied().collect();
        files.sort_by(|a, b| a.path.cmp(&b.path));
        for file in files {
            let Ok(outline) = &file.outline else {
                continue;
            };

            for decl in &outline.declarations {
                let missing = decl.kind == SymbolKind::ClassLike
                    && name::is_within(&decl.name, self.prefix)
                    && !seen.contains(&decl.name.to_ascii_lowercase());

                if missing {
                    self.push(
                        file,
                        decl.span.start as usize,
                        format!("`{}` is not in the classmap", decl.name),
                        format!("{CLASSMAP_FILE} maps `{}` to `{}`", decl.name, file.path),
                    );
                }
            }
        }

        classmap
    }
}

fn read_back(file: &TreeFile) -> Vec<autoload::ReadEntry> {
    // A lex failure has already been reported by the per-file checks.
    autoload::read_entries(&file.contents).unwrap_or_default()
}

// PHP

fn run(php: &Path, command: &mut Command) -> Result<std::process::Output, VerifyError> {
    command.output().map_err(|source| VerifyError::Io {
        path: php.to_path_buf(),
        source,
    })
}

/// Runs `php -l` on every file.
fn lint(php: &Path, root: &Path, tree: &[TreeFile]) -> Result<Vec<Violation>, VerifyError> {
    let results: Vec<Result<Option<Violation>, VerifyError>> = tree
        .par_iter()
        .map(|file| {
            let output = run(php, Command::new(php).arg("-l").arg(root.join(&file.path)))?;
            if output.status.success() {
                return Ok(None);
            }

            let message = first_line(&output.stderr)
                .or_else(|| first_line(&output.stdout))
                .unwrap_or_else(|| "php -l failed".into());
            let line = message
                .rsplit_once("on line ")
                .and_then(|(_, line)| line.trim().parse().ok())
                .unwrap_or(0);

            Ok(Some(Violation {
                path: file.path.clone(),
                line,
                found: message,
                expected: "no syntax errors".into(),
            }))
        })
        .collect();

    let violations: Vec<Option<Violation>> = results.into_iter().collect::<Result<_, _>>()?;
    debug!(files = tree.len(), "linted output tree");
    Ok(violations.into_iter().flatten().collect())
}

/// Includes the entry point in a fresh `php` process and checks that every
/// classmap symbol loads.
fn smoke(php: &Path, root: &Path, classmap: &Classmap) -> Result<Vec<Violation>, VerifyError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| VerifyError::Io { path, source }
    };

    let root = std::path::absolute(root).map_err(io_error(root))?;
    let status = || Expr::var("status");

    let mut body = vec![
        Stmt::Expr(Expr::str(root.join(ENTRY_FILE).to_string_lossy()).require()),
        Stmt::Assign(status(), Expr::Int(0)),
    ];
    for (symbol, _, kind) in classmap {
        let loaded = Expr::Call(kind.exists_function().into(), vec![Expr::str(symbol)]);
        let report = Expr::Concat(
            Box::new(Expr::str(symbol)),
            Box::new(Expr::Const("PHP_EOL".into())),
        );

        body.push(Stmt::If {
            cond: loaded.not(),
            body: vec![
                Stmt::Expr(Expr::Call("print".into(), vec![report])),
                Stmt::Assign(status(), Expr::Int(1)),
            ],
        });
    }
    body.push(Stmt::Expr(Expr::Call("exit".into(), vec![status()])));

    let script = codegen::render(File {
        header: "prefixer smoke test".into(),
        body,
    });

    let mut file = tempfile::Builder::new()
        .prefix("prefixer-smoke-")
        .suffix(".php")
        .tempfile()
        .map_err(io_error(&root))?;
    file.write_all(script.as_bytes())
        .map_err(io_error(file.path()))?;

    let output = run(php, Command::new(php).arg(file.path()).current_dir(&root))?;
    if output.status.success() {
        debug!(classes = classmap.len(), "smoke test passed");
        return Ok(Vec::new());
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let unloaded: HashSet<&str> = stdout.lines().map(str::trim).collect();

    let mut violations: Vec<Violation> = classmap
        .iter()
        .filter(|(symbol, _, _)| unloaded.contains(symbol.as_str()))
        .map(|(symbol, path, _)| Violation {
            path: ENTRY_FILE.into(),
            line: 0,
            found: format!("`{symbol}` does not load"),
            expected: format!("`{symbol}` loads from `{path}`"),
        })
        .collect();

    if violations.is_empty() {
        let message = first_line(&output.stderr)
            .or_else(|| first_line(&output.stdout))
            .unwrap_or_else(|| format!("php exited with {}", output.status));
        warn!("smoke test failed: {message}");

        violations.push(Violation {
            path: ENTRY_FILE.into(),
            line: 0,
            found: format!("smoke test failed: {message}"),
            expected: "every classmap symbol loads".into(),
        });
    }

    Ok(violations)
}

fn first_line(output: &[u8]) -> Option<String> {
    String::from_utf8_lossy(output)
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_owned)
}
