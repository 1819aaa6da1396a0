//! Command implementations
//!
//! This module contains implementations for all CLI subcommands.

pub mod lifecycle;
pub mod list;
pub mod status;

use crate::cli::CliContext;
use anyhow::{Context, Result};
use scenarios_core::manifest::{ManifestLoader, ScenarioManifest};
use scenarios_core::state::StepStateStore;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Default state file, relative to the manifest directory
pub const DEFAULT_STATE_FILE: &str = ".scenarios/state.json";

/// Exit code carried out of `dispatch` when a scenario run did not succeed
#[derive(Debug)]
pub struct ScenarioExitCode(pub i32);

impl std::fmt::Display for ScenarioExitCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Exit with code {} due to failed migrations", self.0)
    }
}

impl std::error::Error for ScenarioExitCode {}

/// Locate and parse the manifest selected by the global options
pub(crate) fn load_manifest(context: &CliContext) -> Result<(PathBuf, ScenarioManifest)> {
    let cwd = std::env::current_dir().context("Failed to determine current directory")?;
    let path = ManifestLoader::resolve(context.manifest.as_deref(), &cwd)?;
    debug!("Using scenario manifest {}", path.display());
    let manifest = ManifestLoader::load_from_path(&path)?;
    Ok((path, manifest))
}

/// Step state store: `--state-file`, else the manifest's `[state] path`,
/// else `.scenarios/state.json` next to the manifest
pub(crate) fn state_store(context: &CliContext, manifest: &ScenarioManifest) -> StepStateStore {
    let path = context
        .state_file
        .clone()
        .or_else(|| manifest.state_path())
        .unwrap_or_else(|| manifest.resolve_path(Path::new(DEFAULT_STATE_FILE)));
    StepStateStore::new(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_store_precedence() {
        let manifest = ManifestLoader::parse_str(
            "[state]\npath = \"custom/state.json\"\n",
            "/work",
        )
        .unwrap();

        let mut context = CliContext::default();
        assert_eq!(
            state_store(&context, &manifest).path(),
            Path::new("/work/custom/state.json")
        );

        context.state_file = Some(PathBuf::from("/elsewhere/state.json"));
        assert_eq!(
            state_store(&context, &manifest).path(),
            Path::new("/elsewhere/state.json")
        );

        let bare = ManifestLoader::parse_str("", "/work").unwrap();
        assert_eq!(
            state_store(&CliContext::default(), &bare).path(),
            Path::new("/work/.scenarios/state.json")
        );
    }

    #[test]
    fn test_exit_code_display() {
        assert_eq!(
            ScenarioExitCode(1).to_string(),
            "Exit with code 1 due to failed migrations"
        );
    }
}
