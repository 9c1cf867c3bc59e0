//! Requirement resolution and the `prefixer.lock` file.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
};

use petgraph::graph::DiGraph;
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{PackageDescriptor, PackageId, constraint::Constraint};

/// The lockfile format this build reads and writes.
pub const LOCK_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("package `{package}` requires `{dependency}`, which is not in the manifest")]
    UnknownDependency { package: String, dependency: String },
    #[error(
        "package `{package}` requires `{dependency} {requirement}`, but \
         version {found} is bundled"
    )]
    UnsatisfiedRequirement {
        package: String,
        dependency: String,
        requirement: Constraint,
        found: Version,
    },
    #[error("detected a dependency cycle: contains `{0}`")]
    DependencyCycle(String),
    #[error("the lockfile is out of date ({0}); run `prefixer lock`")]
    StaleLock(String),
}

#[derive(Debug, Error)]
pub enum LockError {
    #[error("failed to access the lockfile: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse the lockfile: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to write the lockfile: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("unsupported lockfile version {0}")]
    UnsupportedVersion(u32),
}

/// Checks every requirement and returns `packages` in dependency order,
/// with their ids set to their position in that order.
pub fn resolve(
    packages: Vec<PackageDescriptor>,
) -> Result<Vec<PackageDescriptor>, ResolveError> {
    let indices: HashMap<&str, usize> = packages
        .iter()
        .enumerate()
        .map(|(idx, package)| (&*package.name, idx))
        .collect();

    for package in &packages {
        for (dependency, requirement) in &package.requires {
            let Some(&idx) = indices.get(dependency.as_str()) else {
                return Err(ResolveError::UnknownDependency {
                    package: package.name.to_string(),
                    dependency: dependency.clone(),
                });
            };

            let found = &packages[idx].version;
            if !requirement.matches(found) {
                return Err(ResolveError::UnsatisfiedRequirement {
                    package: package.name.to_string(),
                    dependency: dependency.clone(),
                    requirement: requirement.clone(),
                    found: found.clone(),
                });
            }
        }
    }

    let order = toposort_dependencies(&packages, &indices)?;
    drop(indices);

    let mut slots: Vec<Option<PackageDescriptor>> =
        packages.into_iter().map(Some).collect();

    Ok(order
        .into_iter()
        .enumerate()
        .filter_map(|(position, idx)| {
            let mut package = slots[idx].take()?;
            package.id = PackageId(position);
            Some(package)
        })
        .collect())
}

/// Returns the indices of `packages` ordered so that every package comes
/// after the packages it requires.
fn toposort_dependencies(
    packages: &[PackageDescriptor],
    indices: &HashMap<&str, usize>,
) -> Result<Vec<usize>, ResolveError> {
    let mut dep_graph: DiGraph<usize, ()> = DiGraph::new();
    let nodes: Vec<_> = (0..packages.len())
        .map(|idx| dep_graph.add_node(idx))
        .collect();

    // edges point from a dependency to its dependents
    for (idx, package) in packages.iter().enumerate() {
        for dependency in package.requires.keys() {
            if let Some(&dep_idx) = indices.get(dependency.as_str()) {
                dep_graph.update_edge(nodes[dep_idx], nodes[idx], ());
            }
        }
    }

    match petgraph::algo::toposort(&dep_graph, None) {
        Ok(order) => Ok(order.into_iter().map(|node| dep_graph[node]).collect()),
        Err(cycle) => {
            let name = &packages[dep_graph[cycle.node_id()]].name;
            Err(ResolveError::DependencyCycle(name.to_string()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lockfile {
    pub version: u32,
    pub prefix: String,
    #[serde(default, rename = "package")]
    pub packages: Vec<LockedPackage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockedPackage {
    pub name: String,
    pub version: Version,
    /// The package root relative to the manifest directory.
    pub source: PathBuf,
    pub files: usize,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requires: BTreeMap<String, Constraint>,
}

impl Lockfile {
    /// Builds the lockfile for `packages`, which must already be ordered.
    pub fn new(
        prefix: &str,
        packages: &[PackageDescriptor],
        manifest_root: &Path,
    ) -> Self {
        let root = manifest_root
            .canonicalize()
            .unwrap_or_else(|_| manifest_root.to_path_buf());

        let packages = packages
            .iter()
            .map(|package| LockedPackage {
                name: package.name.to_string(),
                version: package.version.clone(),
                source: package
                    .source_path
                    .strip_prefix(&root)
                    .unwrap_or(&package.source_path)
                    .to_path_buf(),
                files: package.files.len(),
                requires: package.requires.clone(),
            })
            .collect();

        Self {
            version: LOCK_FORMAT_VERSION,
            prefix: prefix.to_owned(),
            packages,
        }
    }

    /// Loads the lockfile at `path`, returning `None` if there is none.
    pub fn load(path: &Path) -> Result<Option<Self>, LockError> {
        if !path.exists() {
            return Ok(None);
        }

        let contents = std::fs::read_to_string(path)?;
        let lockfile: Lockfile = toml::from_str(&contents)?;

        match lockfile.version {
            LOCK_FORMAT_VERSION => Ok(Some(lockfile)),
            other => Err(LockError::UnsupportedVersion(other)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), LockError> {
        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Checks that `fresh`, built from the current manifest, agrees with
    /// `self` on the prefix and on every package's version and source.
    pub fn check(&self, fresh: &Lockfile) -> Result<(), ResolveError> {
        if self.prefix != fresh.prefix {
            return Err(ResolveError::StaleLock(format!(
                "prefix changed from `{}` to `{}`",
                self.prefix, fresh.prefix
            )));
        }

        let locked: HashMap<&str, &LockedPackage> = self
            .packages
            .iter()
            .map(|package| (package.name.as_str(), package))
            .collect();

        for package in &fresh.packages {
            let Some(old) = locked.get(package.name.as_str()) else {
                return Err(ResolveError::StaleLock(format!(
                    "`{}` is not locked",
                    package.name
                )));
            };

            if old.version != package.version {
                return Err(ResolveError::StaleLock(format!(
                    "`{}` is locked at {} but {} is bundled",
                    package.name, old.version, package.version
                )));
            }

            if old.source != package.source {
                return Err(ResolveError::StaleLock(format!(
                    "`{}` moved from `{}` to `{}`",
                    package.name,
                    old.source.display(),
                    package.source.display()
                )));
            }
        }

        if let Some(removed) = self
            .packages
            .iter()
            .find(|old| !fresh.packages.iter().any(|new| new.name == old.name))
        {
            return Err(ResolveError::StaleLock(format!(
                "`{}` is no longer in the manifest",
                removed.name
            )));
        }

        Ok(())
    }
}
