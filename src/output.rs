//! Staging and committing the output tree.
//!
//! Everything is written into a temporary directory next to the output, and
//! the live tree is only replaced once that directory has been verified. A
//! staging directory that is never committed is removed when dropped.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::package::PackageDescriptor;

const STAGING_PREFIX: &str = ".prefixer-";
const BACKUP_SUFFIX: &str = ".prefixer-old";

#[derive(Debug, Error)]
#[error("{action} `{}`: {source}", .path.display())]
pub struct OutputError {
    action: &'static str,
    path: PathBuf,
    source: io::Error,
}

fn io_error(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> OutputError {
    let path = path.to_path_buf();
    move |source| OutputError {
        action,
        path,
        source,
    }
}

/// A staging directory for an output tree at `target`.
#[derive(Debug)]
pub struct Staging {
    dir: TempDir,
    target: PathBuf,
}

impl Staging {
    /// Creates an empty staging directory in the parent of `target`, so
    /// committing it is a rename within one filesystem.
    pub fn new(target: &Path) -> Result<Self, OutputError> {
        let parent = match target.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent).map_err(io_error("failed to create", parent))?;

        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(parent)
            .map_err(io_error("failed to create a staging directory in", parent))?;

        debug!(staging = %dir.path().display(), "created staging directory");
        Ok(Self {
            dir,
            target: target.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Copies every package asset into its place in the staged tree,
    /// returning the number of files copied.
    pub fn copy_assets(&self, packages: &[PackageDescriptor]) -> Result<usize, OutputError> {
        let mut copied = 0;

        for package in packages {
            let root = self.path().join(package.output_dir());
            for asset in package.assets.iter() {
                let dest = root.join(&asset.relative);
                if let Some(parent) = dest.parent() {
                    fs::create_dir_all(parent).map_err(io_error("failed to create", parent))?;
                }
                fs::copy(&asset.path, &dest).map_err(io_error("failed to copy", &asset.path))?;
                copied += 1;
            }
        }

        debug!(assets = copied, "copied package assets");
        Ok(copied)
    }

    /// Replaces the tree at the target with the staged one. The previous
    /// tree is moved aside first and restored if the swap fails.
    pub fn commit(self) -> Result<(), OutputError> {
        let target = &self.target;
        let backup = backup_path(target);

        let had_previous = target.exists();
        if had_previous {
            if backup.exists() {
                fs::remove_dir_all(&backup).map_err(io_error("failed to remove", &backup))?;
            }
            fs::rename(target, &backup).map_err(io_error("failed to move aside", target))?;
        }

        if let Err(source) = fs::rename(self.dir.path(), target) {
            if had_previous {
                if let Err(err) = fs::rename(&backup, target) {
                    warn!(
                        backup = %backup.display(),
                        "failed to restore the previous output tree: {err}"
                    );
                }
            }
            return Err(io_error("failed to replace", target)(source));
        }

        if had_previous {
            if let Err(err) = fs::remove_dir_all(&backup) {
                warn!(backup = %backup.display(), "failed to remove the previous output tree: {err}");
            }
        }

        info!(output = %target.display(), "committed output tree");
        Ok(())
    }
}

/// `dir/.name.prefixer-old` for a target `dir/name`.
fn backup_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".{name}{BACKUP_SUFFIX}"))
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use semver::Version;

    use super::*;
    use crate::package::{Asset, PackageId};

    fn staged_file(staging: &Staging, rel: &str, contents: &str) {
        let path = staging.path().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn commit_creates_the_target() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("vendor-prefixed");

        let staging = Staging::new(&target).unwrap();
        assert!(staging.path().starts_with(root.path()));
        staged_file(&staging, "autoload.php", "<?php\n");
        staging.commit().unwrap();

        assert_eq!(fs::read_to_string(target.join("autoload.php")).unwrap(), "<?php\n");
        assert_eq!(entries(root.path()), ["vendor-prefixed"]);
    }

    #[test]
    fn commit_replaces_the_previous_tree() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("out");
        fs::create_dir_all(target.join("stale")).unwrap();
        fs::write(target.join("stale/old.php"), "<?php\n").unwrap();

        let staging = Staging::new(&target).unwrap();
        staged_file(&staging, "acme/uri/src/Uri.php", "<?php\n");
        staging.commit().unwrap();

        assert_eq!(entries(&target), ["acme"]);
        assert_eq!(entries(root.path()), ["out"]);
    }

    #[test]
    fn dropped_staging_leaves_the_target_alone() {
        let root = tempfile::tempdir().unwrap();
        let target = root.path().join("out");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("keep.php"), "<?php\n").unwrap();

        let staging = Staging::new(&target).unwrap();
        staged_file(&staging, "new.php", "<?php\n");
        drop(staging);

        assert_eq!(entries(&target), ["keep.php"]);
        assert_eq!(entries(root.path()), ["out"]);
    }

    #[test]
    fn assets_are_copied_under_their_package() {
        let source = tempfile::tempdir().unwrap();
        fs::create_dir_all(source.path().join("resources")).unwrap();
        fs::write(source.path().join("resources/fonts.json"), "{}").unwrap();
        fs::write(source.path().join("LICENSE"), "MIT").unwrap();

        let asset = |rel: &str| Asset {
            path: source.path().join(rel).into(),
            relative: Path::new(rel).into(),
        };
        let package = PackageDescriptor {
            id: PackageId(0),
            name: "acme/pdf".into(),
            version: Version::new(1, 0, 0),
            source_path: source.path().into(),
            namespaces: Box::new([]),
            files: Box::new([]),
            always_loaded: Box::new([]),
            assets: vec![asset("LICENSE"), asset("resources/fonts.json")].into(),
            requires: BTreeMap::new(),
        };

        let root = tempfile::tempdir().unwrap();
        let staging = Staging::new(&root.path().join("out")).unwrap();
        assert_eq!(staging.copy_assets(&[package]).unwrap(), 2);

        let copied = staging.path().join("acme/pdf/resources/fonts.json");
        assert_eq!(fs::read_to_string(copied).unwrap(), "{}");
        assert!(staging.path().join("acme/pdf/LICENSE").exists());
    }

    #[test]
    fn backup_paths_are_hidden_siblings() {
        assert_eq!(
            backup_path(Path::new("/a/vendor-prefixed")),
            Path::new("/a/.vendor-prefixed.prefixer-old")
        );
    }
}
