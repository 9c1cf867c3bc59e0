//! CLI definitions and plumbing.

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};
use prefixer::manifest::MANIFEST_FILE;

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// The manifest describing the packages to bundle
    #[arg(short = 'm', long, default_value = MANIFEST_FILE, global = true)]
    pub manifest: PathBuf,
    /// Log more; pass twice for everything
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,
    /// Size of the worker pool, overriding the manifest (0 uses every core)
    #[arg(short = 'j', long, global = true)]
    pub jobs: Option<usize>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Copy, Subcommand)]
pub enum Command {
    /// Locate the packages, resolve their requirements and write the lockfile
    Lock,
    /// Rewrite every package into the output tree
    Rewrite,
    /// Verify the existing output tree
    Verify,
    /// Lock, then rewrite
    Build,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = Cli::try_parse_from(["prefixer", "rewrite", "-vv", "--jobs", "4"]).unwrap();

        assert!(matches!(cli.command, Command::Rewrite));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.jobs, Some(4));
        assert_eq!(cli.manifest, PathBuf::from(MANIFEST_FILE));
    }
}
