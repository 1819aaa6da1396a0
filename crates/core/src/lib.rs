//! Core library for the scenario migration runner
//!
//! A scenario is a named, ordered bundle of reversible migration steps. This
//! crate resolves scenarios from a TOML manifest, runs their steps forward
//! (enable) or in reverse (uninstall), reports every outcome through an
//! execution environment and fires lifecycle events to registered listeners.

pub mod batch;
pub mod environment;
pub mod errors;
pub mod events;
pub mod handler;
pub mod logging;
pub mod manifest;
pub mod registry;
pub mod runner;
pub mod scenario;
pub mod shell;
pub mod state;

pub use handler::{MigrationReport, ResetOutcome, ScenarioOutcome, ScenariosHandler, StepOutcome};
pub use scenario::{Direction, MigrationCommand, RunContext, ScenarioInfo};

/// Get the version of the core library
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        let version = version();
        assert!(!version.is_empty());
        assert!(version.contains('.'));
    }
}
