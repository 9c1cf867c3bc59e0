use std::process::ExitCode;

use clap::Parser;
use cli::Cli;
use prefixer::pipeline;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

// executable-specific modules
mod cli;
mod driver;

/// Logs go to stderr, leaving stdout for summaries. `RUST_LOG` wins unless
/// `-v` is given.
fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "prefixer=info",
        1 => "prefixer=debug",
        _ => "prefixer=trace",
    };

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)),
        _ => EnvFilter::new(level),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

pub fn interface(cli: Cli) -> pipeline::Result {
    init_tracing(cli.verbose);
    driver::run(&cli)
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return match error.use_stderr() {
                true => ExitCode::FAILURE,
                false => ExitCode::SUCCESS,
            };
        }
    };

    match interface(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::from(error.exit_code())
        }
    }
}
