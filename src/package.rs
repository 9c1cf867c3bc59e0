//! Bundled packages.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use semver::Version;

use crate::source_file::SourceFile;
use constraint::Constraint;

pub mod composer;
pub mod constraint;
pub mod loader;
pub mod lock;

pub const COMPOSER_FILE: &str = "composer.json";
pub const PHP_FILE_EXTENSION: &str = "php";

/// Directory names that never contain bundled source. Hidden directories
/// are skipped as well.
pub const SKIPPED_DIRS: &[&str] = &[
    "tests", "test", "Tests", "Test", "fixtures", "Fixtures", "docs", "doc",
    "examples", "vendor",
];

/// File name prefixes of license files, which are always copied.
pub const LICENSE_PREFIXES: &[&str] = &["LICENSE", "LICENCE", "COPYING"];

/// The position of a package in dependency order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PackageId(pub usize);

impl std::fmt::Display for PackageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A located package: its identity, where it lives, and every file that
/// ends up in the output tree.
#[derive(Debug, Clone)]
pub struct PackageDescriptor {
    pub id: PackageId,
    pub name: Box<str>,
    pub version: Version,
    /// The absolute package root.
    pub source_path: Box<Path>,
    /// Namespaces declared by the package's `composer.json`.
    pub namespaces: Box<[String]>,
    /// PHP sources, sorted by relative path.
    pub files: Box<[SourceFile]>,
    /// Files that must be required on every request, relative to the
    /// package root.
    pub always_loaded: Box<[PathBuf]>,
    /// Non-PHP files copied verbatim.
    pub assets: Box<[Asset]>,
    pub requires: BTreeMap<String, Constraint>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub path: Box<Path>,
    pub relative: Box<Path>,
}

impl PackageDescriptor {
    /// The package's directory relative to the output root: `vendor/name`.
    pub fn output_dir(&self) -> PathBuf {
        self.name.split('/').collect()
    }

    /// The path of one of the package's files relative to the output root,
    /// with `/` separators as they appear in generated PHP.
    pub fn output_path(&self, relative: &Path) -> String {
        let mut path = self.name.to_string();
        for part in relative.components() {
            path.push('/');
            path.push_str(&part.as_os_str().to_string_lossy());
        }
        path
    }

    pub fn is_always_loaded(&self, relative: &Path) -> bool {
        self.always_loaded.iter().any(|path| path == relative)
    }
}
