//! Central plumbing between CLI commands and the pipeline.

use prefixer::pipeline::{self, Pipeline, RewriteSummary};

use crate::cli::{Cli, Command};

pub fn run(cli: &Cli) -> pipeline::Result {
    let pipeline = Pipeline::load(&cli.manifest, cli.jobs)?;

    match cli.command {
        Command::Lock => {
            let summary = pipeline.lock()?;
            println!(
                "locked {} package(s) in {}",
                summary.packages,
                summary.path.display()
            );
        }
        Command::Rewrite => report(&pipeline.rewrite()?),
        Command::Verify => {
            let report = pipeline.verify()?;
            let php = match &report.php {
                Some(php) => format!(", linted with {}", php.display()),
                None => String::new(),
            };
            println!(
                "verified {} file(s) and {} class-like(s){php}",
                report.files, report.classes
            );
        }
        Command::Build => report(&pipeline.build()?),
    }

    Ok(())
}

fn report(summary: &RewriteSummary) {
    println!(
        "rewrote {} file(s) from {} package(s) into {}",
        summary.files,
        summary.packages,
        summary.output.display()
    );
    println!(
        "  {} symbol(s), {} autoloaded class-like(s), {} always-loaded file(s), {} asset(s)",
        summary.symbols, summary.classes, summary.always_loaded, summary.assets
    );

    if summary.warnings > 0 {
        println!("  {} warning(s), see the log above", summary.warnings);
    }
}
