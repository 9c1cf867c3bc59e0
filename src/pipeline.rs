//! The `lock`, `rewrite`, `verify` and `build` operations.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    autoload::{Autoload, AutoloadError},
    manifest::{Manifest, ManifestError},
    output::{OutputError, Staging},
    package::{
        PackageDescriptor,
        loader::{self, LocateError},
        lock::{self, LockError, Lockfile, ResolveError},
    },
    rewrite::{self, RewriteError, UnresolvedSymbolError},
    symbol_map::{CollisionError, Exclusions, SymbolMapBuilder},
    verify::{Verifier, VerifyError, VerifyReport},
};

/// The public result type of the [`pipeline`] module.
///
/// [`pipeline`]: self
pub type Result<T = ()> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    Manifest(#[from] ManifestError),
    #[error("{0}")]
    Locate(#[from] LocateError),
    #[error("{0}")]
    Resolve(#[from] ResolveError),
    #[error("{0}")]
    Lock(#[from] LockError),
    #[error("{0}")]
    Rewrite(#[from] RewriteError),
    #[error("{0}")]
    Collision(#[from] CollisionError),
    #[error("{0}")]
    Unresolved(#[from] UnresolvedSymbolError),
    #[error("{0}")]
    Autoload(#[from] AutoloadError),
    #[error("{0}")]
    Output(#[from] OutputError),
    #[error("{0}")]
    Verify(#[from] VerifyError),
}

impl Error {
    /// The process exit code for this error.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Locate(LocateError::PackageNotFound { .. }) => 2,
            Error::Locate(
                LocateError::AmbiguousVersion { .. }
                | LocateError::MissingVersion(_)
                | LocateError::InvalidVersion { .. },
            ) => 3,
            Error::Resolve(_) => 3,
            Error::Unresolved(_) => 4,
            Error::Collision(_) => 5,
            Error::Verify(VerifyError::Failed(_)) => 6,
            _ => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LockSummary {
    pub packages: usize,
    pub path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RewriteSummary {
    pub packages: usize,
    pub files: usize,
    pub symbols: usize,
    pub classes: usize,
    pub always_loaded: usize,
    pub assets: usize,
    /// Findings that were logged rather than treated as errors.
    pub warnings: usize,
    pub output: PathBuf,
}

/// A loaded manifest and the settings the command line overrides.
#[derive(Debug, Clone)]
pub struct Pipeline {
    manifest: Manifest,
    jobs: usize,
}

impl Pipeline {
    pub fn new(manifest: Manifest, jobs: Option<usize>) -> Self {
        let jobs = jobs.unwrap_or(manifest.build.jobs);
        Self { manifest, jobs }
    }

    pub fn load(path: &Path, jobs: Option<usize>) -> Result<Self> {
        let manifest = Manifest::load(path)?;
        debug!(
            manifest = %path.display(),
            packages = manifest.packages.len(),
            "loaded manifest"
        );
        Ok(Self::new(manifest, jobs))
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Locates every package and puts them in dependency order.
    fn packages(&self) -> Result<Vec<PackageDescriptor>> {
        let packages = loader::locate_all(&self.manifest)?;
        Ok(lock::resolve(packages)?)
    }

    fn lockfile(&self, packages: &[PackageDescriptor]) -> Lockfile {
        Lockfile::new(self.manifest.prefix(), packages, &self.manifest.root)
    }

    /// Resolves the manifest and writes the lockfile.
    pub fn lock(&self) -> Result<LockSummary> {
        let packages = self.packages()?;
        let path = self.manifest.lock_path();
        self.lockfile(&packages).save(&path)?;

        info!(packages = packages.len(), lockfile = %path.display(), "wrote lockfile");
        Ok(LockSummary {
            packages: packages.len(),
            path,
        })
    }

    /// Rewrites every package into a staging directory, generates the
    /// autoloader, verifies the result, and only then replaces the output
    /// tree.
    pub fn rewrite(&self) -> Result<RewriteSummary> {
        let manifest = &self.manifest;
        let packages = self.packages()?;

        match Lockfile::load(&manifest.lock_path())? {
            Some(locked) => locked.check(&self.lockfile(&packages))?,
            None => debug!("no lockfile, skipping the lock check"),
        }

        let pool = rewrite::thread_pool(self.jobs)?;
        let scanned = rewrite::scan(&packages, &pool)?;

        let builder = SymbolMapBuilder::new(
            manifest.prefix(),
            Exclusions::from(&manifest.exclude),
            packages.iter().map(|package| package.name.to_string()).collect(),
        );
        let map = rewrite::build_map(builder, &packages, &scanned)?;

        let staging = Staging::new(&manifest.output_dir())?;
        let reports = rewrite::rewrite_packages(&packages, &map, staging.path(), &pool)?;
        rewrite::check_findings(&reports, manifest.build.on_unresolved)?;
        let assets = staging.copy_assets(&packages)?;

        let autoload = Autoload::generate(&map, &packages, &scanned)?;
        autoload.write(staging.path())?;

        let php = manifest.php_binary();
        Verifier::new(manifest.prefix(), map.exclusions(), manifest.build.php)
            .with_php_binary(&php)
            .verify(staging.path())?;

        let output = staging.target().to_path_buf();
        staging.commit()?;

        Ok(RewriteSummary {
            packages: packages.len(),
            files: reports.len(),
            symbols: map.len(),
            classes: autoload.classmap().len(),
            always_loaded: autoload.files().len(),
            assets,
            warnings: reports.iter().map(|report| report.findings.len()).sum(),
            output,
        })
    }

    /// Verifies the existing output tree.
    pub fn verify(&self) -> Result<VerifyReport> {
        let manifest = &self.manifest;
        let exclusions = Exclusions::from(&manifest.exclude);
        let php = manifest.php_binary();
        let verifier = Verifier::new(manifest.prefix(), &exclusions, manifest.build.php)
            .with_php_binary(&php);
        Ok(verifier.verify(&manifest.output_dir())?)
    }

    /// Writes the lockfile, then rewrites against it.
    pub fn build(&self) -> Result<RewriteSummary> {
        self.lock()?;
        self.rewrite()
    }
}
