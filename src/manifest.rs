//! The `prefixer.toml` manifest.

use std::{
    collections::BTreeMap,
    path::{Component, Path, PathBuf},
};

use semver::Version;
use serde::Deserialize;
use thiserror::Error;

use crate::{package::constraint::Constraint, php::name};

pub const MANIFEST_FILE: &str = "prefixer.toml";
pub const LOCK_FILE: &str = "prefixer.lock";

const DEFAULT_OUTPUT_DIR: &str = "vendor-prefixed";
const DEFAULT_PHP_BINARY: &str = "php";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    pub build: BuildSettings,
    #[serde(default)]
    pub exclude: ExcludeSettings,
    #[serde(default, rename = "package")]
    pub packages: Vec<PackageEntry>,
    /// The directory containing the manifest, against which every relative
    /// path in it is resolved.
    #[serde(skip)]
    pub root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct BuildSettings {
    /// The namespace every bundled symbol is moved under, without leading or
    /// trailing separators.
    pub prefix: String,
    #[serde(default = "default_output_dir")]
    pub output: PathBuf,
    /// The size of the worker pool; 0 uses every core.
    #[serde(default)]
    pub jobs: usize,
    #[serde(default)]
    pub on_unresolved: UnresolvedPolicy,
    #[serde(default)]
    pub php: PhpMode,
    /// The binary the verifier lints with: a bare name is looked up on the
    /// `PATH`, anything else is relative to the manifest.
    #[serde(default = "default_php_binary")]
    pub php_binary: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_php_binary() -> PathBuf {
    PathBuf::from(DEFAULT_PHP_BINARY)
}

/// What to do with references to namespaced symbols that no package
/// declares.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnresolvedPolicy {
    #[default]
    Error,
    Warn,
}

/// Whether the verifier runs the `php` binary.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PhpMode {
    /// Use `php` if it is on the `PATH`.
    #[default]
    Auto,
    /// Fail verification if `php` is not on the `PATH`.
    Always,
    Never,
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExcludeSettings {
    #[serde(default)]
    pub namespaces: Vec<String>,
    #[serde(default)]
    pub classes: Vec<String>,
    #[serde(default)]
    pub functions: Vec<String>,
    #[serde(default)]
    pub constants: Vec<String>,
}

/// A `[[package]]` entry.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackageEntry {
    /// A Composer-style `vendor/name`, which is also the package's directory
    /// in the output tree.
    pub name: String,
    /// Overrides the `version` in the package's `composer.json`.
    #[serde(default)]
    pub version: Option<Version>,
    /// The package root, relative to the manifest.
    pub source: PathBuf,
    #[serde(default)]
    pub requires: BTreeMap<String, Constraint>,
    /// Path prefixes, relative to the package root, that are not bundled.
    #[serde(default)]
    pub exclude: Vec<PathBuf>,
    /// Directories or files, relative to the package root, whose non-PHP
    /// files are copied verbatim.
    #[serde(default)]
    pub assets: Vec<PathBuf>,
    /// Extra files that must be loaded on every request.
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read the manifest: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse the manifest: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid prefix `{0}`: expected a namespace such as `Acme\\Vendor`")]
    InvalidPrefix(String),
    #[error("invalid package name `{0}`: expected `vendor/name`")]
    InvalidPackageName(String),
    #[error(
        "package `{package}`: `{}` must be a relative path inside the package",
        .path.display()
    )]
    InvalidPath { package: String, path: PathBuf },
    #[error("invalid excluded {kind} `{name}`")]
    InvalidExclusion { kind: &'static str, name: String },
    #[error("the manifest does not declare any packages")]
    NoPackages,
}

impl Manifest {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = std::path::absolute(path.as_ref())?;
        let contents = std::fs::read_to_string(&path)?;
        let root = path.parent().map_or_else(PathBuf::new, Path::to_path_buf);
        Self::parse(&contents, root)
    }

    /// Parses and validates manifest `contents`, resolving relative paths
    /// against `root`.
    pub fn parse(contents: &str, root: PathBuf) -> Result<Self, ManifestError> {
        let mut manifest: Manifest = toml::from_str(contents)?;
        manifest.root = root;
        manifest.validate()?;
        Ok(manifest)
    }

    fn validate(&mut self) -> Result<(), ManifestError> {
        let prefix = self.build.prefix.trim_matches(name::SEPARATOR);
        if !name::is_valid_qualified(prefix, false) {
            return Err(ManifestError::InvalidPrefix(self.build.prefix.clone()));
        }
        self.build.prefix = prefix.to_owned();

        self.exclude.validate()?;

        if self.packages.is_empty() {
            return Err(ManifestError::NoPackages);
        }

        for package in &self.packages {
            if !is_valid_package_name(&package.name) {
                return Err(ManifestError::InvalidPackageName(
                    package.name.clone(),
                ));
            }

            let paths = package
                .exclude
                .iter()
                .chain(&package.assets)
                .chain(&package.files);

            for path in paths {
                if !is_contained(path) {
                    return Err(ManifestError::InvalidPath {
                        package: package.name.clone(),
                        path: path.clone(),
                    });
                }
            }
        }

        Ok(())
    }

    pub fn prefix(&self) -> &str {
        &self.build.prefix
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.build.output)
    }

    pub fn php_binary(&self) -> PathBuf {
        let binary = &self.build.php_binary;
        match binary.components().count() {
            1 => binary.clone(),
            _ => self.root.join(binary),
        }
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    pub fn source_dir(&self, package: &PackageEntry) -> PathBuf {
        self.root.join(&package.source)
    }
}

impl ExcludeSettings {
    fn validate(&mut self) -> Result<(), ManifestError> {
        let lists = [
            ("namespace", &mut self.namespaces),
            ("class", &mut self.classes),
            ("function", &mut self.functions),
            ("constant", &mut self.constants),
        ];

        for (kind, names) in lists {
            for name in names.iter_mut() {
                let trimmed = name.trim_matches(name::SEPARATOR);
                if !name::is_valid_qualified(trimmed, false) {
                    return Err(ManifestError::InvalidExclusion {
                        kind,
                        name: name.clone(),
                    });
                }
                *name = trimmed.to_owned();
            }
        }

        Ok(())
    }
}

/// Returns `true` if `name` looks like `vendor/name`, using the characters
/// Composer allows in package names.
fn is_valid_package_name(name: &str) -> bool {
    let valid_part = |part: &str| {
        !part.is_empty()
            && part != "."
            && part != ".."
            && part.chars().all(|c| {
                c.is_ascii_lowercase()
                    || c.is_ascii_digit()
                    || matches!(c, '_' | '.' | '-')
            })
    };

    match name.split_once('/') {
        Some((vendor, package)) => valid_part(vendor) && valid_part(package),
        None => false,
    }
}

/// Returns `true` if `path` is relative and never climbs out of its base.
fn is_contained(path: &Path) -> bool {
    path.components()
        .all(|part| matches!(part, Component::Normal(_) | Component::CurDir))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Result<Manifest, ManifestError> {
        Manifest::parse(source, PathBuf::from("/project"))
    }

    #[test]
    fn manifest_from_toml() {
        let source = r#"
        [build]
        prefix = "\\Onepix\\FoodSpotVendor\\"
        output = "lib/vendor"
        jobs = 4
        on-unresolved = "warn"
        php = "never"
        php-binary = "tools/php"

        [exclude]
        namespaces = ["Psr\\Http\\Message"]
        functions = ["getallheaders"]

        [[package]]
        name = "guzzlehttp/guzzle"
        version = "7.8.1"
        source = "vendor/guzzlehttp/guzzle"
        requires = { "psr/http-message" = "^1.1 || ^2.0" }
        exclude = ["src/Testing"]

        [[package]]
        name = "psr/http-message"
        source = "vendor/psr/http-message"
        "#;

        let manifest = parse(source).unwrap();
        assert_eq!(manifest.prefix(), "Onepix\\FoodSpotVendor");
        assert_eq!(manifest.output_dir(), Path::new("/project/lib/vendor"));
        assert_eq!(manifest.build.jobs, 4);
        assert_eq!(manifest.build.on_unresolved, UnresolvedPolicy::Warn);
        assert_eq!(manifest.build.php, PhpMode::Never);
        assert_eq!(manifest.php_binary(), Path::new("/project/tools/php"));
        assert_eq!(manifest.exclude.namespaces, ["Psr\\Http\\Message"]);
        assert_eq!(manifest.lock_path(), Path::new("/project/prefixer.lock"));

        let guzzle = &manifest.packages[0];
        assert_eq!(guzzle.version, Some(Version::new(7, 8, 1)));
        let requirement = &guzzle.requires["psr/http-message"];
        assert!(requirement.matches(&Version::new(1, 1, 0)));
        assert!(requirement.matches(&Version::new(2, 0, 0)));
        assert!(!requirement.matches(&Version::new(3, 0, 0)));
        assert_eq!(
            manifest.source_dir(guzzle),
            Path::new("/project/vendor/guzzlehttp/guzzle")
        );
        assert_eq!(manifest.packages[1].version, None);
    }

    #[test]
    fn defaults() {
        let source = r#"
        [build]
        prefix = "Acme\\Deps"

        [[package]]
        name = "a/b"
        source = "b"
        "#;

        let manifest = parse(source).unwrap();
        assert_eq!(manifest.build.output, Path::new("vendor-prefixed"));
        assert_eq!(manifest.build.jobs, 0);
        assert_eq!(manifest.build.on_unresolved, UnresolvedPolicy::Error);
        assert_eq!(manifest.build.php, PhpMode::Auto);
        assert_eq!(manifest.php_binary(), Path::new("php"));
        assert!(manifest.exclude.classes.is_empty());
    }

    #[test]
    fn invalid_manifests() {
        let with_package = |build: &str, package: &str| {
            format!("[build]\n{build}\n[[package]]\n{package}\n")
        };

        let bad_prefix = with_package(
            "prefix = \"Acme\\\\9Deps\"",
            "name = \"a/b\"\nsource = \"b\"",
        );
        assert!(matches!(
            parse(&bad_prefix),
            Err(ManifestError::InvalidPrefix(_))
        ));

        let bad_name =
            with_package("prefix = \"P\"", "name = \"Foo\"\nsource = \"b\"");
        assert!(matches!(
            parse(&bad_name),
            Err(ManifestError::InvalidPackageName(_))
        ));

        let escaping = with_package(
            "prefix = \"P\"",
            "name = \"a/b\"\nsource = \"b\"\nassets = [\"../secrets\"]",
        );
        assert!(matches!(
            parse(&escaping),
            Err(ManifestError::InvalidPath { .. })
        ));

        let unknown_policy = with_package(
            "prefix = \"P\"\non-unresolved = \"ignore\"",
            "name = \"a/b\"\nsource = \"b\"",
        );
        assert!(matches!(
            parse(&unknown_policy),
            Err(ManifestError::Toml(_))
        ));

        assert!(matches!(
            parse("[build]\nprefix = \"P\"\n"),
            Err(ManifestError::NoPackages)
        ));
    }

    #[test]
    fn package_names() {
        assert!(is_valid_package_name("guzzlehttp/psr7"));
        assert!(is_valid_package_name("symfony/polyfill-php80"));
        assert!(!is_valid_package_name("guzzle"));
        assert!(!is_valid_package_name("a/b/c"));
        assert!(!is_valid_package_name("../b"));
        assert!(!is_valid_package_name("A/b"));
    }
}
