//! The autoloader written at the root of the output tree.
//!
//! Three files are generated: a classmap from every prefixed class-like to
//! the file declaring it, the list of files that must be loaded on every
//! request, and an entry point that registers the classmap and loads those
//! files exactly once. Nothing is discovered at runtime; a class missing
//! from the classmap is never found.

use std::{
    collections::{BTreeMap, HashSet},
    fs, io,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, warn};

use crate::{
    codegen::{
        self,
        php::{Expr, File, Stmt},
    },
    package::PackageDescriptor,
    php::{LexError, lexer, literal, name, token::TokenKind},
    rewrite::FileSymbols,
    span,
    symbol_map::{Origin, SymbolMap},
};

pub const ENTRY_FILE: &str = "autoload.php";
pub const CLASSMAP_FILE: &str = "autoload_classmap.php";
pub const FILES_FILE: &str = "autoload_files.php";

const HEADER: &str = "@generated by prefixer. Do not edit.";

/// A class-like symbol and the file declaring it, relative to the output
/// root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct AutoloadEntry {
    pub symbol: String,
    pub path: String,
}

/// A file loaded on every request, keyed by `vendor/name:relative/path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlwaysLoaded {
    pub id: String,
    pub path: String,
}

#[derive(Debug, Error)]
pub enum AutoloadError {
    #[error("`{symbol}` is mapped to both `{first}` and `{second}`")]
    DuplicateSymbol {
        symbol: String,
        first: String,
        second: String,
    },
    #[error("failed to write `{}`: {source}", .path.display())]
    Io { path: PathBuf, source: io::Error },
}

#[derive(Debug, Clone)]
pub struct Autoload {
    slug: String,
    classmap: Vec<AutoloadEntry>,
    files: Vec<AlwaysLoaded>,
}

impl Autoload {
    /// Sorts `classmap` by symbol and rejects symbols mapped twice. The
    /// order of `files` is the order they are loaded in.
    pub fn new(
        prefix: &str,
        mut classmap: Vec<AutoloadEntry>,
        files: Vec<AlwaysLoaded>,
    ) -> Result<Self, AutoloadError> {
        classmap.sort_by(|a, b| {
            let a_key = (a.symbol.to_lowercase(), &a.path);
            let b_key = (b.symbol.to_lowercase(), &b.path);
            a_key.cmp(&b_key)
        });

        for pair in classmap.windows(2) {
            if pair[0].symbol.eq_ignore_ascii_case(&pair[1].symbol) {
                return Err(AutoloadError::DuplicateSymbol {
                    symbol: pair[1].symbol.clone(),
                    first: pair[0].path.clone(),
                    second: pair[1].path.clone(),
                });
            }
        }

        Ok(Self {
            slug: slug(prefix),
            classmap,
            files,
        })
    }

    /// Collects the classmap from every class-like in `map`, and the
    /// always-loaded files from the packages and from `scanned`: a file
    /// declaring a free function or a constant is loaded eagerly, since
    /// neither can be autoloaded.
    ///
    /// `packages` must be in dependency order, indexed by their id.
    pub fn generate(
        map: &SymbolMap,
        packages: &[PackageDescriptor],
        scanned: &[FileSymbols],
    ) -> Result<Self, AutoloadError> {
        let output_path = |origin: Origin| {
            let package = &packages[origin.package.0];
            package.output_path(package.files[origin.file].relative())
        };

        let classmap: Vec<AutoloadEntry> = map
            .class_likes()
            .map(|declared| AutoloadEntry {
                symbol: declared.target.to_owned(),
                path: output_path(declared.origin),
            })
            .collect();

        let mut per_file: BTreeMap<&str, usize> = BTreeMap::new();
        for entry in &classmap {
            *per_file.entry(&entry.path).or_default() += 1;
        }
        for (path, count) in per_file.into_iter().filter(|(_, n)| *n > 1) {
            warn!(file = path, count, "file declares more than one class-like");
        }

        let eager: HashSet<Origin> = scanned
            .iter()
            .filter(|symbols| symbols.eager)
            .map(|symbols| symbols.origin)
            .collect();

        let mut files = Vec::new();
        for package in packages {
            for (idx, file) in package.files.iter().enumerate() {
                let origin = Origin {
                    package: package.id,
                    file: idx,
                };

                if !package.is_always_loaded(file.relative()) && !eager.contains(&origin) {
                    continue;
                }

                let path = package.output_path(file.relative());
                let id = format!("{}:{}", package.name, &path[package.name.len() + 1..]);
                files.push(AlwaysLoaded { id, path });
            }
        }

        debug!(
            classes = classmap.len(),
            files = files.len(),
            "generated autoload entries"
        );
        Self::new(map.prefix(), classmap, files)
    }

    pub fn classmap(&self) -> &[AutoloadEntry] {
        &self.classmap
    }

    pub fn files(&self) -> &[AlwaysLoaded] {
        &self.files
    }

    pub fn render_classmap(&self) -> String {
        let entries = self
            .classmap
            .iter()
            .map(|entry| (Expr::str(&entry.symbol), Expr::dir_path(&entry.path)))
            .collect();

        codegen::render(File {
            header: HEADER.into(),
            body: vec![Stmt::Return(Expr::Array(entries))],
        })
    }

    pub fn render_files(&self) -> String {
        let entries = self
            .files
            .iter()
            .map(|file| (Expr::str(&file.id), Expr::dir_path(&file.path)))
            .collect();

        codegen::render(File {
            header: HEADER.into(),
            body: vec![Stmt::Return(Expr::Array(entries))],
        })
    }

    /// Renders the entry point. Every global it touches is named after the
    /// prefix, so several prefixed trees can be loaded side by side, and
    /// requiring it twice is harmless. A file can be both autoloaded and
    /// always loaded when it declares a class and a function, so both paths
    /// use `require_once`.
    pub fn render_entry(&self) -> String {
        let registered = Expr::global(format!("__{}_autoload_registered", self.slug));
        let loaded = Expr::global(format!("__{}_autoload_files", self.slug)).index(Expr::var("id"));

        let autoloader = Expr::Closure {
            params: vec!["class".into()],
            uses: vec!["classmap".into()],
            body: vec![Stmt::If {
                cond: Expr::var("classmap").index(Expr::var("class")).isset(),
                body: vec![Stmt::Expr(
                    Expr::var("classmap").index(Expr::var("class")).require_once(),
                )],
            }],
        };

        let register = Stmt::If {
            cond: registered.clone().isset().not(),
            body: vec![
                Stmt::Assign(registered, Expr::Bool(true)),
                Stmt::Assign(
                    Expr::var("classmap"),
                    Expr::dir_path(CLASSMAP_FILE).require(),
                ),
                Stmt::Expr(Expr::Call("spl_autoload_register".into(), vec![autoloader])),
            ],
        };

        let load_files = Stmt::Foreach {
            subject: Expr::var("files"),
            key: "id".into(),
            value: "file".into(),
            body: vec![Stmt::If {
                cond: loaded.clone().isset().not(),
                body: vec![
                    Stmt::Assign(loaded, Expr::Bool(true)),
                    Stmt::Expr(Expr::var("file").require_once()),
                ],
            }],
        };

        let main = Expr::Closure {
            params: Vec::new(),
            uses: Vec::new(),
            body: vec![
                register,
                Stmt::Assign(Expr::var("files"), Expr::dir_path(FILES_FILE).require()),
                load_files,
            ],
        };

        codegen::render(File {
            header: HEADER.into(),
            body: vec![Stmt::Expr(Expr::Invoke(Box::new(main)))],
        })
    }

    /// Writes the three autoload files into `root`.
    pub fn write(&self, root: &Path) -> Result<(), AutoloadError> {
        let outputs = [
            (CLASSMAP_FILE, self.render_classmap()),
            (FILES_FILE, self.render_files()),
            (ENTRY_FILE, self.render_entry()),
        ];

        for (file, contents) in outputs {
            let path = root.join(file);
            fs::write(&path, contents)
                .map_err(|source| AutoloadError::Io { path, source })?;
        }

        Ok(())
    }
}

/// Turns a prefix into something usable inside a PHP global name:
/// `Acme\Vendor` becomes `acme_vendor`.
pub fn slug(prefix: &str) -> String {
    prefix
        .chars()
        .map(|c| match c {
            name::SEPARATOR => '_',
            c => c.to_ascii_lowercase(),
        })
        .collect()
}

/// An entry read back from a generated array file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadEntry {
    pub key: String,
    /// The path relative to the output root.
    pub path: String,
    pub line: usize,
}

/// Reads every `'key' => __DIR__ . '/path'` entry from a generated array
/// file. Anything else in the file is ignored.
pub fn read_entries(source: &str) -> Result<Vec<ReadEntry>, LexError> {
    let tokens = lexer::tokenize(source)?;
    let significant: Vec<_> = tokens.iter().filter(|tok| !tok.is_trivia()).collect();

    let mut entries = Vec::new();
    for window in significant.windows(5) {
        let text = |idx: usize| window[idx].span.text(source);

        let shape = [
            TokenKind::SingleQuoted,
            TokenKind::Punct,
            TokenKind::Identifier,
            TokenKind::Punct,
            TokenKind::SingleQuoted,
        ];
        if window.iter().map(|tok| tok.item).ne(shape) {
            continue;
        }
        if text(1) != "=>" || text(2) != "__DIR__" || text(3) != "." {
            continue;
        }

        let (Some(key), Some(path)) = (literal::decode(text(0)), literal::decode(text(4)))
        else {
            continue;
        };

        entries.push(ReadEntry {
            key,
            path: path.trim_start_matches('/').to_owned(),
            line: span::line_of(source, window[0].span.start as usize),
        });
    }

    Ok(entries)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use semver::Version;

    use super::*;
    use crate::{
        fake_file,
        manifest::ExcludeSettings,
        package::PackageId,
        rewrite::{build_map, scan_file},
        source_file::SourceFile,
        symbol_map::{Exclusions, SymbolMapBuilder},
    };

    fn package(id: usize, name: &str, files: Vec<SourceFile>, always: &[&str]) -> PackageDescriptor {
        PackageDescriptor {
            id: PackageId(id),
            name: name.into(),
            version: Version::new(1, 0, 0),
            source_path: Path::new("/src").into(),
            namespaces: Box::new([]),
            files: files.into(),
            always_loaded: always.iter().map(PathBuf::from).collect(),
            assets: Box::new([]),
            requires: BTreeMap::new(),
        }
    }

    fn generate(packages: &[PackageDescriptor]) -> Autoload {
        let scanned: Vec<FileSymbols> = packages
            .iter()
            .flat_map(|package| {
                package.files.iter().enumerate().map(|(file, source)| {
                    let origin = Origin {
                        package: package.id,
                        file,
                    };
                    scan_file(source, origin).unwrap()
                })
            })
            .collect();

        let builder = SymbolMapBuilder::new(
            "Acme\\Vendor",
            Exclusions::from(&ExcludeSettings::default()),
            packages.iter().map(|p| p.name.to_string()).collect(),
        );
        let map = build_map(builder, packages, &scanned).unwrap();
        Autoload::generate(&map, packages, &scanned).unwrap()
    }

    fn fixture() -> Vec<PackageDescriptor> {
        vec![
            package(
                0,
                "acme/uri",
                vec![
                    fake_file!("src/Uri.php", "<?php namespace Acme\\Uri; class Uri {}"),
                    fake_file!(
                        "src/functions.php",
                        "<?php namespace Acme\\Uri; function parse($s) {}"
                    ),
                ],
                &[],
            ),
            package(
                1,
                "acme/http",
                vec![
                    fake_file!(
                        "bootstrap.php",
                        "<?php if (!defined('ACME')) { echo 1; }"
                    ),
                    fake_file!(
                        "src/Client.php",
                        "<?php namespace Acme\\Http; interface ClientInterface {} \
                         final class Client implements ClientInterface {}"
                    ),
                ],
                &["bootstrap.php"],
            ),
        ]
    }

    #[test]
    fn entries_are_sorted_and_files_keep_dependency_order() {
        let autoload = generate(&fixture());

        let symbols: Vec<_> = autoload.classmap().iter().map(|e| e.symbol.as_str()).collect();
        assert_eq!(
            symbols,
            [
                "Acme\\Vendor\\Acme\\Http\\Client",
                "Acme\\Vendor\\Acme\\Http\\ClientInterface",
                "Acme\\Vendor\\Acme\\Uri\\Uri",
            ]
        );
        assert_eq!(autoload.classmap()[0].path, "acme/http/src/Client.php");

        assert_eq!(
            autoload.files(),
            [
                AlwaysLoaded {
                    id: "acme/uri:src/functions.php".into(),
                    path: "acme/uri/src/functions.php".into(),
                },
                AlwaysLoaded {
                    id: "acme/http:bootstrap.php".into(),
                    path: "acme/http/bootstrap.php".into(),
                },
            ]
        );
    }

    #[test]
    fn files_with_classes_and_functions_load_once() {
        let packages = [package(
            0,
            "acme/uri",
            vec![fake_file!(
                "src/Uri.php",
                "<?php namespace Acme\\Uri; class Uri {} function uri() {}"
            )],
            &[],
        )];
        let autoload = generate(&packages);

        assert_eq!(autoload.classmap()[0].path, "acme/uri/src/Uri.php");
        assert_eq!(autoload.files()[0].path, "acme/uri/src/Uri.php");

        let entry = autoload.render_entry();
        assert_eq!(entry.matches("require_once ").count(), 2);
        assert!(!entry.contains("require $"));
    }

    #[test]
    fn classmap_rendering() {
        let autoload = generate(&fixture());

        assert_eq!(
            autoload.render_classmap(),
            "<?php\n\n// @generated by prefixer. Do not edit.\n\nreturn array(\n    \
             'Acme\\\\Vendor\\\\Acme\\\\Http\\\\Client' => __DIR__ . '/acme/http/src/Client.php',\n    \
             'Acme\\\\Vendor\\\\Acme\\\\Http\\\\ClientInterface' => __DIR__ . '/acme/http/src/Client.php',\n    \
             'Acme\\\\Vendor\\\\Acme\\\\Uri\\\\Uri' => __DIR__ . '/acme/uri/src/Uri.php',\n);\n"
        );

        let empty = Autoload::new("P", Vec::new(), Vec::new()).unwrap();
        assert!(empty.render_classmap().ends_with("return array();\n"));
        assert!(empty.render_files().ends_with("return array();\n"));
    }

    #[test]
    fn entry_point_is_guarded() {
        let autoload = Autoload::new("Acme\\Vendor", Vec::new(), Vec::new()).unwrap();

        assert_eq!(
            autoload.render_entry(),
            "<?php\n\n// @generated by prefixer. Do not edit.\n\n\
             (static function () {\n\
             \x20   if (!isset($GLOBALS['__acme_vendor_autoload_registered'])) {\n\
             \x20       $GLOBALS['__acme_vendor_autoload_registered'] = true;\n\
             \x20       $classmap = require __DIR__ . '/autoload_classmap.php';\n\
             \x20       spl_autoload_register(static function ($class) use ($classmap) {\n\
             \x20           if (isset($classmap[$class])) {\n\
             \x20               require_once $classmap[$class];\n\
             \x20           }\n\
             \x20       });\n\
             \x20   }\n\
             \x20   $files = require __DIR__ . '/autoload_files.php';\n\
             \x20   foreach ($files as $id => $file) {\n\
             \x20       if (!isset($GLOBALS['__acme_vendor_autoload_files'][$id])) {\n\
             \x20           $GLOBALS['__acme_vendor_autoload_files'][$id] = true;\n\
             \x20           require_once $file;\n\
             \x20       }\n\
             \x20   }\n\
             })();\n"
        );
    }

    #[test]
    fn duplicate_symbols_are_rejected() {
        let entry = |symbol: &str, path: &str| AutoloadEntry {
            symbol: symbol.into(),
            path: path.into(),
        };

        let err = Autoload::new(
            "P",
            vec![entry("P\\Foo", "a/Foo.php"), entry("P\\foo", "b/Foo.php")],
            Vec::new(),
        )
        .unwrap_err();

        assert!(matches!(err, AutoloadError::DuplicateSymbol { .. }));
    }

    #[test]
    fn entries_read_back() {
        let autoload = generate(&fixture());
        let entries = read_entries(&autoload.render_classmap()).unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[2].key, "Acme\\Vendor\\Acme\\Uri\\Uri");
        assert_eq!(entries[2].path, "acme/uri/src/Uri.php");
        assert_eq!(entries[2].line, 8);

        let files = read_entries(&autoload.render_files()).unwrap();
        assert_eq!(files[0].key, "acme/uri:src/functions.php");
    }

    #[test]
    fn files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        generate(&fixture()).write(dir.path()).unwrap();

        for file in [ENTRY_FILE, CLASSMAP_FILE, FILES_FILE] {
            let contents = fs::read_to_string(dir.path().join(file)).unwrap();
            assert!(contents.starts_with("<?php\n"));
        }
    }

    #[test]
    fn slugs() {
        assert_eq!(slug("Onepix\\FoodSpotVendor"), "onepix_foodspotvendor");
    }
}
