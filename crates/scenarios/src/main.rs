use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

fn main() -> Result<()> {
    // Parse CLI arguments
    let parsed = cli::Cli::parse();

    match parsed.dispatch() {
        Ok(()) => Ok(()),
        Err(err) => {
            // A scenario that ran but did not succeed has already been reported
            // through the execution environment; only the exit code is left.
            if let Some(exit) = err.downcast_ref::<commands::ScenarioExitCode>() {
                std::process::exit(exit.0);
            }

            Err(err)
        }
    }
}
