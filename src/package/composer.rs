//! The parts of `composer.json` that decide what gets bundled.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use semver::Version;
use serde::Deserialize;

use crate::php::name;

#[derive(Debug, Default, Clone, Deserialize)]
pub struct ComposerJson {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub autoload: Autoload,
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct Autoload {
    #[serde(default, rename = "psr-4")]
    pub psr4: BTreeMap<String, PathList>,
    #[serde(default, rename = "psr-0")]
    pub psr0: BTreeMap<String, PathList>,
    #[serde(default)]
    pub classmap: Vec<PathBuf>,
    #[serde(default)]
    pub files: Vec<PathBuf>,
    #[serde(default, rename = "exclude-from-classmap")]
    pub exclude_from_classmap: Vec<String>,
}

/// Composer accepts either a single path or a list of paths.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum PathList {
    One(PathBuf),
    Many(Vec<PathBuf>),
}

impl PathList {
    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        let paths = match self {
            PathList::One(path) => std::slice::from_ref(path),
            PathList::Many(paths) => paths.as_slice(),
        };
        paths.iter().map(PathBuf::as_path)
    }
}

impl ComposerJson {
    pub fn parse(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str(contents)
    }

    /// Returns the namespaces declared by the PSR-4 and PSR-0 mappings.
    /// PSR-0 prefixes in the old `Vendor_Package_` style are not namespaces
    /// and are skipped.
    pub fn namespaces(&self) -> Vec<String> {
        let psr4 = self.autoload.psr4.keys();
        let psr0 = self
            .autoload
            .psr0
            .keys()
            .filter(|prefix| prefix.contains(name::SEPARATOR));

        let mut namespaces: Vec<String> = psr4
            .chain(psr0)
            .map(|prefix| prefix.trim_matches(name::SEPARATOR))
            .filter(|prefix| name::is_valid_qualified(prefix, false))
            .map(str::to_owned)
            .collect();

        namespaces.sort();
        namespaces.dedup();
        namespaces
    }

    /// Returns every path the autoload section points at, relative to the
    /// package root. An empty result means the whole package is walked.
    pub fn autoload_roots(&self) -> Vec<PathBuf> {
        let autoload = &self.autoload;
        let mut roots: Vec<PathBuf> = autoload
            .psr4
            .values()
            .chain(autoload.psr0.values())
            .flat_map(PathList::iter)
            .map(normalize)
            .chain(autoload.classmap.iter().map(|path| normalize(path)))
            .chain(autoload.files.iter().map(|path| normalize(path)))
            .collect();

        roots.sort();
        roots.dedup();
        roots
    }

    /// Returns the literal path prefixes of `exclude-from-classmap`, up to
    /// the first wildcard.
    pub fn excluded_prefixes(&self) -> Vec<PathBuf> {
        self.autoload
            .exclude_from_classmap
            .iter()
            .map(|pattern| {
                let literal = pattern.split('*').next().unwrap_or_default();
                normalize(Path::new(literal.trim_start_matches('/')))
            })
            .filter(|prefix| !prefix.as_os_str().is_empty())
            .collect()
    }

    /// Parses the `version` field, accepting the `v1.2.3` and `1.2` forms
    /// Composer allows.
    pub fn parsed_version(&self) -> Option<Result<Version, String>> {
        let raw = self.version.as_deref()?;
        Some(parse_version(raw).ok_or_else(|| raw.to_owned()))
    }
}

pub fn parse_version(raw: &str) -> Option<Version> {
    let trimmed = raw.trim().trim_start_matches(['v', 'V']);
    if let Ok(version) = Version::parse(trimmed) {
        return Some(version);
    }

    let parts: Vec<&str> = trimmed.split('.').collect();
    match parts.as_slice() {
        [major] => Version::parse(&format!("{major}.0.0")).ok(),
        [major, minor] => Version::parse(&format!("{major}.{minor}.0")).ok(),
        _ => None,
    }
}

/// Drops `.` components and trailing separators, so `./src/` and `src` are
/// the same root.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|part| !matches!(part, std::path::Component::CurDir))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const GUZZLE: &str = r#"{
        "name": "guzzlehttp/guzzle",
        "version": "v7.8.1",
        "autoload": {
            "psr-4": { "GuzzleHttp\\": "src/" },
            "psr-0": { "Legacy_": "lib/", "Old\\Style\\": ["old/", "./older"] },
            "files": ["src/functions_include.php"],
            "exclude-from-classmap": ["/src/Testing/**"]
        },
        "require": { "php": "^7.2.5 || ^8.0" }
    }"#;

    #[test]
    fn composer_autoload_section() {
        let composer = ComposerJson::parse(GUZZLE).unwrap();
        assert_eq!(composer.name.as_deref(), Some("guzzlehttp/guzzle"));
        assert_eq!(composer.namespaces(), ["GuzzleHttp", "Old\\Style"]);
        assert_eq!(
            composer.autoload_roots(),
            [
                PathBuf::from("lib"),
                PathBuf::from("old"),
                PathBuf::from("older"),
                PathBuf::from("src"),
                PathBuf::from("src/functions_include.php"),
            ]
        );
        assert_eq!(composer.excluded_prefixes(), [PathBuf::from("src/Testing")]);
        assert_eq!(
            composer.parsed_version(),
            Some(Ok(Version::new(7, 8, 1)))
        );
    }

    #[test]
    fn missing_sections_default() {
        let composer = ComposerJson::parse(r#"{"name": "a/b"}"#).unwrap();
        assert!(composer.namespaces().is_empty());
        assert!(composer.autoload_roots().is_empty());
        assert_eq!(composer.parsed_version(), None);
    }

    #[test]
    fn loose_versions() {
        assert_eq!(parse_version("2.1"), Some(Version::new(2, 1, 0)));
        assert_eq!(parse_version("V3"), Some(Version::new(3, 0, 0)));
        assert_eq!(parse_version("1.0.0-beta.1").unwrap().pre.as_str(), "beta.1");
        assert_eq!(parse_version("dev-main"), None);
    }
}
