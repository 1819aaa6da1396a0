//! Scenario manifest loading and discovery
//!
//! The manifest is a TOML document declaring scenarios, the migration steps
//! they chain together, cache targets, the step state file and lifecycle hooks.
//!
//! ```toml
//! [scenarios.demo]
//! label = "Demo content"
//! migrations = ["users", "articles"]
//!
//! [migrations.users]
//! import = "./import-users.sh"
//! rollback = "./rollback-users.sh"
//! ```
//!
//! Discovery order: explicit path, `SCENARIOS_MANIFEST`, `./scenarios.toml`,
//! `./.scenarios/scenarios.toml`.

use crate::errors::ManifestError;
use crate::events::LifecycleEvent;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Environment variable naming the manifest path
pub const MANIFEST_ENV_VAR: &str = "SCENARIOS_MANIFEST";

/// Default manifest file name
pub const MANIFEST_FILE_NAME: &str = "scenarios.toml";

type ManifestResult<T> = std::result::Result<T, ManifestError>;

/// A scenario as declared in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioDefinition {
    /// Human-readable label, defaults to the scenario id
    #[serde(default)]
    pub label: Option<String>,
    /// Migration step names in enable order
    #[serde(default)]
    pub migrations: Vec<String>,
}

/// A migration step as declared in the manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationDefinition {
    /// Human-readable label, defaults to the step name
    #[serde(default)]
    pub label: Option<String>,
    /// Shell command executed on import
    pub import: String,
    /// Shell command executed on rollback
    #[serde(default)]
    pub rollback: Option<String>,
    /// Working directory, relative paths resolve against the manifest directory
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
    /// Extra environment for both directions
    #[serde(default)]
    pub env: IndexMap<String, String>,
}

/// Cache targets invalidated after a scenario is enabled
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Directories whose contents are flushed
    #[serde(default)]
    pub paths: Vec<PathBuf>,
    /// Command run instead of flushing when an execution alias is active
    #[serde(default)]
    pub rebuild_command: Option<String>,
}

/// Step state persistence settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSettings {
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// A shell command bound to a lifecycle event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HookDefinition {
    /// Lifecycle event name, e.g. `scenario_post_enable`
    pub event: String,
    /// Only fire for this scenario (scenario events only)
    #[serde(default)]
    pub scenario: Option<String>,
    pub command: String,
    /// Queue the command as batch work instead of running it immediately
    #[serde(default)]
    pub deferred: bool,
}

/// Parsed scenario manifest
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScenarioManifest {
    #[serde(default)]
    pub scenarios: IndexMap<String, ScenarioDefinition>,
    #[serde(default)]
    pub migrations: IndexMap<String, MigrationDefinition>,
    #[serde(default)]
    pub cache: CacheSettings,
    #[serde(default)]
    pub state: StateSettings,
    #[serde(default)]
    pub hooks: Vec<HookDefinition>,
    /// Directory relative paths resolve against
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl ScenarioManifest {
    /// Resolve a manifest-relative path
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    /// Label for a migration step, falling back to its name
    pub fn migration_label(&self, name: &str) -> String {
        self.migrations
            .get(name)
            .and_then(|m| m.label.clone())
            .unwrap_or_else(|| name.to_string())
    }

    /// Cache directories resolved against the manifest directory
    pub fn cache_paths(&self) -> Vec<PathBuf> {
        self.cache
            .paths
            .iter()
            .map(|p| self.resolve_path(p))
            .collect()
    }

    /// Configured state file, resolved against the manifest directory
    pub fn state_path(&self) -> Option<PathBuf> {
        self.state.path.as_deref().map(|p| self.resolve_path(p))
    }

    fn validate(&self) -> ManifestResult<()> {
        for (id, scenario) in &self.scenarios {
            if scenario.migrations.is_empty() {
                return Err(ManifestError::Validation {
                    message: format!("scenario {} declares no migrations", id),
                });
            }
            if let Some(blank) = scenario.migrations.iter().find(|m| m.trim().is_empty()) {
                return Err(ManifestError::Validation {
                    message: format!("scenario {} has an invalid migration name '{}'", id, blank),
                });
            }
        }

        for (name, migration) in &self.migrations {
            if migration.import.trim().is_empty() {
                return Err(ManifestError::Validation {
                    message: format!("migration {} has an empty import command", name),
                });
            }
        }

        for hook in &self.hooks {
            if !LifecycleEvent::NAMES.contains(&hook.event.as_str()) {
                return Err(ManifestError::Validation {
                    message: format!(
                        "hook event '{}' is not one of: {}",
                        hook.event,
                        LifecycleEvent::NAMES.join(", ")
                    ),
                });
            }
        }

        Ok(())
    }
}

/// Manifest discovery and loading
pub struct ManifestLoader;

impl ManifestLoader {
    /// Locate a manifest in `dir` without consulting the environment
    pub fn discover(dir: &Path) -> Option<PathBuf> {
        let candidates = [
            dir.join(MANIFEST_FILE_NAME),
            dir.join(".scenarios").join(MANIFEST_FILE_NAME),
        ];
        candidates.into_iter().find(|candidate| {
            debug!("Checking manifest candidate: {}", candidate.display());
            candidate.is_file()
        })
    }

    /// Resolve the manifest path: explicit, then `SCENARIOS_MANIFEST`, then discovery in `dir`
    pub fn resolve(explicit: Option<&Path>, dir: &Path) -> ManifestResult<PathBuf> {
        if let Some(path) = explicit {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(MANIFEST_ENV_VAR) {
            debug!("Using manifest from {}", MANIFEST_ENV_VAR);
            return Ok(PathBuf::from(path));
        }
        Self::discover(dir).ok_or_else(|| ManifestError::NotFound {
            path: dir.join(MANIFEST_FILE_NAME).display().to_string(),
        })
    }

    /// Load and validate a manifest file
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load_from_path(path: &Path) -> ManifestResult<ScenarioManifest> {
        debug!("Loading scenario manifest from {}", path.display());

        if !path.exists() {
            return Err(ManifestError::NotFound {
                path: path.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(path)?;
        let base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        Self::parse_str(&content, base_dir)
    }

    /// Parse and validate manifest text
    pub fn parse_str(content: &str, base_dir: impl Into<PathBuf>) -> ManifestResult<ScenarioManifest> {
        let mut manifest: ScenarioManifest =
            toml::from_str(content).map_err(|e| ManifestError::Parsing {
                message: e.to_string(),
            })?;
        manifest.base_dir = base_dir.into();
        manifest.validate()?;

        debug!(
            scenarios = manifest.scenarios.len(),
            migrations = manifest.migrations.len(),
            hooks = manifest.hooks.len(),
            "Scenario manifest loaded"
        );

        Ok(manifest)
    }
}
