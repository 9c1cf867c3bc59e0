//! Locating packages on disk and enumerating their files.

use std::{
    collections::{BTreeSet, HashMap},
    fs,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use super::{
    Asset, COMPOSER_FILE, LICENSE_PREFIXES, PHP_FILE_EXTENSION, PackageDescriptor,
    PackageId, SKIPPED_DIRS, composer::ComposerJson,
};
use crate::{
    manifest::{Manifest, PackageEntry},
    source_file::SourceFile,
};

#[derive(Debug, Error)]
pub enum LocateError {
    #[error("package `{name}` not found: `{}` is not a directory", .path.display())]
    PackageNotFound { name: String, path: PathBuf },
    #[error("package `{name}` is declared twice, as {first} and as {second}")]
    AmbiguousVersion {
        name: String,
        first: String,
        second: String,
    },
    #[error(
        "package `{0}` has no version: set `version` in the manifest or in \
         its composer.json"
    )]
    MissingVersion(String),
    #[error("package `{name}` has an invalid version `{version}`")]
    InvalidVersion { name: String, version: String },
    #[error("package `{name}` has an invalid composer.json: {source}")]
    Composer {
        name: String,
        source: serde_json::Error,
    },
    #[error("package `{name}`: always-loaded file `{}` does not exist", .path.display())]
    MissingFile { name: String, path: PathBuf },
    #[error("package `{name}`: failed to read `{}`: {source}", .path.display())]
    Io {
        name: String,
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Locates every package in `manifest`, in manifest order.
///
/// Entries naming the same package are merged if they agree on the source
/// directory and version, and rejected otherwise. The returned packages all
/// carry `PackageId(0)`; ids are assigned once the packages are ordered.
pub fn locate_all(
    manifest: &Manifest,
) -> Result<Vec<PackageDescriptor>, LocateError> {
    let mut seen: HashMap<&str, &PackageEntry> = HashMap::new();
    let mut packages = Vec::with_capacity(manifest.packages.len());

    for entry in &manifest.packages {
        if let Some(first) = seen.get(entry.name.as_str()) {
            check_duplicate(manifest, first, entry)?;
            debug!(package = %entry.name, "ignoring duplicate manifest entry");
            continue;
        }

        seen.insert(&entry.name, entry);
        packages.push(locate(manifest, entry)?);
    }

    Ok(packages)
}

fn check_duplicate(
    manifest: &Manifest,
    first: &PackageEntry,
    second: &PackageEntry,
) -> Result<(), LocateError> {
    let describe = |entry: &PackageEntry| {
        let version = entry
            .version
            .as_ref()
            .map_or_else(|| "unversioned".to_owned(), ToString::to_string);
        format!("{version} from `{}`", entry.source.display())
    };

    let first_dir = canonical(&manifest.source_dir(first));
    let second_dir = canonical(&manifest.source_dir(second));

    match first_dir == second_dir && first.version == second.version {
        true => Ok(()),
        false => Err(LocateError::AmbiguousVersion {
            name: second.name.clone(),
            first: describe(first),
            second: describe(second),
        }),
    }
}

fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

/// Locates the package described by `entry` and reads its sources.
pub fn locate(
    manifest: &Manifest,
    entry: &PackageEntry,
) -> Result<PackageDescriptor, LocateError> {
    let name = entry.name.as_str();
    let root = manifest.source_dir(entry);

    if !root.is_dir() {
        return Err(LocateError::PackageNotFound {
            name: name.to_owned(),
            path: root,
        });
    }

    let root = canonical(&root);
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| LocateError::Io {
            name: name.to_owned(),
            path,
            source,
        }
    };

    let composer_path = root.join(COMPOSER_FILE);
    let composer = match composer_path.is_file() {
        true => {
            let contents = fs::read_to_string(&composer_path)
                .map_err(io_error(&composer_path))?;
            ComposerJson::parse(&contents).map_err(|source| {
                LocateError::Composer {
                    name: name.to_owned(),
                    source,
                }
            })?
        }
        false => ComposerJson::default(),
    };

    if let Some(declared) = composer.name.as_deref() {
        if declared != name {
            warn!(package = name, composer = declared, "package name mismatch");
        }
    }

    let version = match (&entry.version, composer.parsed_version()) {
        (Some(version), _) => version.clone(),
        (None, Some(Ok(version))) => version,
        (None, Some(Err(version))) => {
            return Err(LocateError::InvalidVersion {
                name: name.to_owned(),
                version,
            });
        }
        (None, None) => return Err(LocateError::MissingVersion(name.to_owned())),
    };

    let mut excluded = entry.exclude.clone();
    excluded.extend(composer.excluded_prefixes());

    let walk_roots = match composer.autoload_roots() {
        roots if roots.is_empty() => vec![PathBuf::new()],
        roots => roots,
    };

    let mut php_files = BTreeSet::new();
    for walk_root in &walk_roots {
        collect(&root, walk_root, &excluded, &mut php_files, |path| {
            has_extension(path, PHP_FILE_EXTENSION)
        })
        .map_err(|error| walk_error(name, &root, error))?;
    }

    let mut always_loaded: Vec<PathBuf> = composer
        .autoload
        .files
        .iter()
        .chain(&entry.files)
        .map(|path| path.components().collect())
        .collect();
    always_loaded.sort();
    always_loaded.dedup();

    for path in &always_loaded {
        if !root.join(path).is_file() {
            return Err(LocateError::MissingFile {
                name: name.to_owned(),
                path: path.clone(),
            });
        }
        php_files.insert(path.clone());
    }

    let mut asset_files = BTreeSet::new();
    for asset_root in &entry.assets {
        collect(&root, asset_root, &excluded, &mut asset_files, |path| {
            !has_extension(path, PHP_FILE_EXTENSION)
        })
        .map_err(|error| walk_error(name, &root, error))?;
    }
    asset_files.extend(license_files(&root).map_err(io_error(&root))?);

    let files = php_files
        .into_iter()
        .map(|relative| {
            let path = root.join(&relative);
            SourceFile::new(path.clone(), relative).map_err(io_error(&path))
        })
        .collect::<Result<Box<[_]>, _>>()?;

    let assets = asset_files
        .into_iter()
        .map(|relative: PathBuf| Asset {
            path: root.join(&relative).into_boxed_path(),
            relative: relative.into_boxed_path(),
        })
        .collect();

    debug!(
        package = name,
        %version,
        files = files.len(),
        "located package"
    );

    Ok(PackageDescriptor {
        id: PackageId(0),
        name: name.into(),
        version,
        source_path: root.into_boxed_path(),
        namespaces: composer.namespaces().into_boxed_slice(),
        files,
        always_loaded: always_loaded.into_boxed_slice(),
        assets,
        requires: entry.requires.clone(),
    })
}

fn walk_error(name: &str, root: &Path, error: walkdir::Error) -> LocateError {
    let path = error.path().unwrap_or(root).to_path_buf();
    let source = error
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));

    LocateError::Io {
        name: name.to_owned(),
        path,
        source,
    }
}

/// Walks `root/start`, adding the path relative to `root` of every file
/// accepted by `filter` to `out`. A missing `start` is skipped with a
/// warning, as Composer does.
fn collect(
    root: &Path,
    start: &Path,
    excluded: &[PathBuf],
    out: &mut BTreeSet<PathBuf>,
    filter: impl Fn(&Path) -> bool,
) -> Result<(), walkdir::Error> {
    let start_path = root.join(start);
    if !start_path.exists() {
        warn!(path = %start_path.display(), "autoload path does not exist");
        return Ok(());
    }

    let walker = WalkDir::new(&start_path)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_skipped(entry));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };

        if excluded.iter().any(|prefix| relative.starts_with(prefix)) {
            continue;
        }

        if filter(relative) {
            out.insert(relative.to_path_buf());
        }
    }

    Ok(())
}

fn is_skipped(entry: &DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }

    entry
        .file_name()
        .to_str()
        .is_some_and(|name| name.starts_with('.') || SKIPPED_DIRS.contains(&name))
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().and_then(std::ffi::OsStr::to_str) == Some(extension)
}

/// Returns the license files at the top level of `root`.
fn license_files(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut licenses = Vec::new();

    for entry in fs::read_dir(root)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }

        let file_name = entry.file_name();
        let is_license = file_name.to_str().is_some_and(|name| {
            let upper = name.to_ascii_uppercase();
            LICENSE_PREFIXES.iter().any(|prefix| upper.starts_with(prefix))
        });

        if is_license {
            licenses.push(PathBuf::from(file_name));
        }
    }

    Ok(licenses)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, relative: &str, contents: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn manifest(root: &Path, packages: &str) -> Manifest {
        let source = format!("[build]\nprefix = \"P\"\n{packages}");
        Manifest::parse(&source, root.to_path_buf()).unwrap()
    }

    fn relative_files(package: &PackageDescriptor) -> Vec<&Path> {
        package.files.iter().map(SourceFile::relative).collect()
    }

    #[test]
    fn locate_with_composer_autoload() {
        let dir = tempfile::tempdir().unwrap();
        let pkg = dir.path().join("vendor/acme/http");
        write(
            &pkg,
            "composer.json",
            r#"{"version": "2.1.0", "autoload": {
                "psr-4": {"Acme\\Http\\": "src/"},
                "files": ["src/functions.php"]
            }}"#,
        );
        write(&pkg, "src/Client.php", "<?php namespace Acme\\Http; class Client {}");
        write(&pkg, "src/functions.php", "<?php namespace Acme\\Http; function f() {}");
        write(&pkg, "src/Tests/ClientTest.php", "<?php");
        write(&pkg, "src/Internal/Fake.php", "<?php");
        write(&pkg, "src/.hidden/X.php", "<?php");
        write(&pkg, "bin/tool.php", "<?php");
        write(&pkg, "resources/ca.pem", "cert");
        write(&pkg, "resources/skip.php", "<?php");
        write(&pkg, "LICENSE", "MIT");

        let manifest = manifest(
            dir.path(),
            "[[package]]\nname = \"acme/http\"\nsource = \"vendor/acme/http\"\n\
             exclude = [\"src/Internal\"]\nassets = [\"resources\"]\n",
        );
        let packages = locate_all(&manifest).unwrap();
        let package = &packages[0];

        assert_eq!(package.version, semver::Version::new(2, 1, 0));
        assert_eq!(&*package.namespaces, ["Acme\\Http"]);
        assert_eq!(
            relative_files(package),
            [Path::new("src/Client.php"), Path::new("src/functions.php")]
        );
        assert_eq!(&*package.always_loaded, [PathBuf::from("src/functions.php")]);

        let assets: Vec<_> =
            package.assets.iter().map(|asset| &*asset.relative).collect();
        assert_eq!(assets, [Path::new("LICENSE"), Path::new("resources/ca.pem")]);
    }

    #[test]
    fn locate_without_composer_walks_everything() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "lib/a/A.php", "<?php class A {}");
        write(dir.path(), "lib/a/tests/ATest.php", "<?php");
        write(dir.path(), "lib/a/readme.md", "hi");

        let manifest = manifest(
            dir.path(),
            "[[package]]\nname = \"x/a\"\nversion = \"1.0.0\"\nsource = \"lib/a\"\n",
        );
        let packages = locate_all(&manifest).unwrap();
        assert_eq!(relative_files(&packages[0]), [Path::new("A.php")]);
        assert!(packages[0].namespaces.is_empty());
    }

    #[test]
    fn missing_source_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = manifest(
            dir.path(),
            "[[package]]\nname = \"x/a\"\nversion = \"1.0.0\"\nsource = \"nope\"\n",
        );
        assert!(matches!(
            locate_all(&manifest),
            Err(LocateError::PackageNotFound { .. })
        ));
    }

    #[test]
    fn missing_version() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/A.php", "<?php");
        let manifest = manifest(
            dir.path(),
            "[[package]]\nname = \"x/a\"\nsource = \"a\"\n",
        );
        assert!(matches!(
            locate_all(&manifest),
            Err(LocateError::MissingVersion(_))
        ));
    }

    #[test]
    fn duplicate_entries() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a1/A.php", "<?php");
        write(dir.path(), "a2/A.php", "<?php");

        let same = manifest(
            dir.path(),
            "[[package]]\nname = \"x/a\"\nversion = \"1.0.0\"\nsource = \"a1\"\n\
             [[package]]\nname = \"x/a\"\nversion = \"1.0.0\"\nsource = \"./a1\"\n",
        );
        assert_eq!(locate_all(&same).unwrap().len(), 1);

        let different = manifest(
            dir.path(),
            "[[package]]\nname = \"x/a\"\nversion = \"1.0.0\"\nsource = \"a1\"\n\
             [[package]]\nname = \"x/a\"\nversion = \"1.1.0\"\nsource = \"a2\"\n",
        );
        assert!(matches!(
            locate_all(&different),
            Err(LocateError::AmbiguousVersion { .. })
        ));
    }
}
