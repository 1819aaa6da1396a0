//! Migration step runner
//!
//! The runner owns step definitions and turns a step name into an executable
//! [`MigrationStep`]. [`ShellRunner`] backs steps with the shell commands
//! declared in the scenario manifest and runs them synchronously, one at a time.

use crate::errors::StepError;
use crate::manifest::{ManifestLoader, MigrationDefinition, ScenarioManifest};
use crate::scenario::Direction;
use crate::shell::{run_logged, shell_command};
use crate::state::{StepRecord, StepStateStore, StepStatus};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, error, instrument, warn};

type StepResult<T> = std::result::Result<T, StepError>;

/// One executable migration step
pub trait MigrationStep: Send {
    /// Step machine name
    fn name(&self) -> &str;

    /// Human-readable label used in notifications
    fn label(&self) -> String;

    /// Execute the step in the given direction
    fn run(&mut self, direction: Direction) -> StepResult<()>;
}

/// Resolves step names to executable steps
pub trait MigrationRunner: Send + Sync {
    /// Drop any cached step definitions so the next instantiate sees fresh ones
    fn clear_cached_definitions(&self);

    /// Build an executable step, `StepError::UnknownStep` if it is not declared
    fn instantiate(&self, name: &str) -> StepResult<Box<dyn MigrationStep>>;
}

enum DefinitionSource {
    File(PathBuf),
    Static(Arc<ScenarioManifest>),
}

/// Runner executing manifest-declared shell commands
pub struct ShellRunner {
    source: DefinitionSource,
    cached: Mutex<Option<Arc<ScenarioManifest>>>,
    state: Option<StepStateStore>,
}

impl ShellRunner {
    /// Runner that re-reads `manifest_path` whenever its cache is cleared
    pub fn from_path(manifest_path: impl Into<PathBuf>) -> Self {
        Self {
            source: DefinitionSource::File(manifest_path.into()),
            cached: Mutex::new(None),
            state: None,
        }
    }

    /// Runner over an already-loaded manifest
    pub fn from_manifest(manifest: ScenarioManifest) -> Self {
        Self {
            source: DefinitionSource::Static(Arc::new(manifest)),
            cached: Mutex::new(None),
            state: None,
        }
    }

    /// Record every step run in `store`
    pub fn with_state_store(mut self, store: StepStateStore) -> Self {
        self.state = Some(store);
        self
    }

    fn definitions(&self) -> StepResult<Arc<ScenarioManifest>> {
        let mut cached = self
            .cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if let Some(manifest) = cached.as_ref() {
            return Ok(Arc::clone(manifest));
        }

        let manifest = match &self.source {
            DefinitionSource::File(path) => {
                debug!("Loading migration definitions from {}", path.display());
                Arc::new(ManifestLoader::load_from_path(path)?)
            }
            DefinitionSource::Static(manifest) => Arc::clone(manifest),
        };
        *cached = Some(Arc::clone(&manifest));
        Ok(manifest)
    }
}

impl MigrationRunner for ShellRunner {
    fn clear_cached_definitions(&self) {
        let mut cached = self
            .cached
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if cached.take().is_some() {
            debug!("Cleared cached migration definitions");
        }
    }

    fn instantiate(&self, name: &str) -> StepResult<Box<dyn MigrationStep>> {
        let manifest = self.definitions()?;
        let definition = manifest
            .migrations
            .get(name)
            .cloned()
            .ok_or_else(|| StepError::UnknownStep {
                name: name.to_string(),
            })?;

        let working_dir = definition
            .working_dir
            .as_deref()
            .map(|dir| manifest.resolve_path(dir))
            .unwrap_or_else(|| manifest.base_dir.clone());

        Ok(Box::new(ShellStep {
            name: name.to_string(),
            definition,
            working_dir,
            state: self.state.clone(),
        }))
    }
}

/// A manifest step backed by shell commands
pub struct ShellStep {
    name: String,
    definition: MigrationDefinition,
    working_dir: PathBuf,
    state: Option<StepStateStore>,
}

impl ShellStep {
    fn command_for(&self, direction: Direction) -> StepResult<&str> {
        match direction {
            Direction::Forward => Ok(self.definition.import.as_str()),
            Direction::Backward => {
                self.definition
                    .rollback
                    .as_deref()
                    .ok_or_else(|| StepError::Unsupported {
                        name: self.name.clone(),
                        direction: direction.to_string(),
                    })
            }
        }
    }

    fn execute(&self, direction: Direction) -> StepResult<()> {
        let script = self.command_for(direction)?;

        let mut command = shell_command(script);
        if self.working_dir.as_os_str().is_empty() {
            debug!("No working directory resolved, using current directory");
        } else {
            command.current_dir(&self.working_dir);
        }
        for (key, value) in &self.definition.env {
            command.env(key, value);
        }
        command
            .env("SCENARIOS_STEP", &self.name)
            .env("SCENARIOS_DIRECTION", direction.as_str());

        let start_time = Instant::now();
        let output = run_logged(command, &self.name).map_err(|e| StepError::Spawn {
            name: self.name.clone(),
            message: e.to_string(),
        })?;

        let exit_code = output.status.code().unwrap_or(-1);
        debug!(
            "Step {} finished with exit code {} in {:?}",
            self.name,
            exit_code,
            start_time.elapsed()
        );

        if output.status.success() {
            Ok(())
        } else {
            error!(
                "Step {} failed ({}) with exit code {}",
                self.name, direction, exit_code
            );
            Err(StepError::ExitStatus {
                name: self.name.clone(),
                code: exit_code,
            })
        }
    }

    fn record(&self, direction: Direction, result: &StepResult<()>) {
        let Some(store) = &self.state else {
            return;
        };

        let command = match direction {
            Direction::Forward => "import",
            Direction::Backward => "rollback",
        };
        let record = match result {
            Ok(()) => {
                let status = match direction {
                    Direction::Forward => StepStatus::Imported,
                    Direction::Backward => StepStatus::RolledBack,
                };
                StepRecord::new(command, status).with_exit_code(Some(0))
            }
            Err(StepError::ExitStatus { code, .. }) => {
                StepRecord::new(command, StepStatus::Failed).with_exit_code(Some(*code))
            }
            Err(e) => StepRecord::new(command, StepStatus::Failed).with_message(e.to_string()),
        };

        if let Err(e) = store.record(&self.name, record) {
            warn!("Failed to record state for step {}: {}", self.name, e);
        }
    }
}

impl MigrationStep for ShellStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> String {
        self.definition
            .label
            .clone()
            .unwrap_or_else(|| self.name.clone())
    }

    #[instrument(skip(self), fields(step = %self.name))]
    fn run(&mut self, direction: Direction) -> StepResult<()> {
        let result = self.execute(direction);
        self.record(direction, &result);
        result
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn runner_for(content: &str, dir: &std::path::Path) -> ShellRunner {
        let manifest = ManifestLoader::parse_str(content, dir).unwrap();
        ShellRunner::from_manifest(manifest)
    }

    #[test]
    fn test_unknown_step() {
        let tmp = TempDir::new().unwrap();
        let runner = runner_for("", tmp.path());
        let err = runner.instantiate("ghost").err().unwrap();
        assert!(matches!(err, StepError::UnknownStep { ref name } if name == "ghost"));
    }

    #[test]
    fn test_forward_and_backward_commands() {
        let tmp = TempDir::new().unwrap();
        let runner = runner_for(
            r#"
[migrations.users]
label = "Users"
import = "echo imported > out.txt"
rollback = "rm out.txt"
"#,
            tmp.path(),
        );

        let mut step = runner.instantiate("users").unwrap();
        assert_eq!(step.label(), "Users");
        assert_eq!(step.name(), "users");

        step.run(Direction::Forward).unwrap();
        let written = std::fs::read_to_string(tmp.path().join("out.txt")).unwrap();
        assert_eq!(written.trim(), "imported");

        step.run(Direction::Backward).unwrap();
        assert!(!tmp.path().join("out.txt").exists());
    }

    #[test]
    fn test_failing_command_reports_exit_code() {
        let tmp = TempDir::new().unwrap();
        let runner = runner_for("[migrations.bad]\nimport = \"exit 3\"\n", tmp.path());
        let mut step = runner.instantiate("bad").unwrap();
        let err = step.run(Direction::Forward).unwrap_err();
        assert!(matches!(err, StepError::ExitStatus { code: 3, .. }));
    }

    #[test]
    fn test_missing_rollback_is_unsupported() {
        let tmp = TempDir::new().unwrap();
        let runner = runner_for("[migrations.once]\nimport = \"true\"\n", tmp.path());
        let mut step = runner.instantiate("once").unwrap();
        let err = step.run(Direction::Backward).unwrap_err();
        assert!(matches!(err, StepError::Unsupported { .. }));
    }

    #[test]
    fn test_step_environment() {
        let tmp = TempDir::new().unwrap();
        let runner = runner_for(
            r#"
[migrations.env]
import = "echo \"$SCENARIOS_STEP:$SCENARIOS_DIRECTION:$MODE\" > env.txt"
env = { MODE = "demo" }
"#,
            tmp.path(),
        );
        runner
            .instantiate("env")
            .unwrap()
            .run(Direction::Forward)
            .unwrap();
        let written = std::fs::read_to_string(tmp.path().join("env.txt")).unwrap();
        assert_eq!(written.trim(), "env:forward:demo");
    }

    #[test]
    fn test_state_is_recorded() {
        let tmp = TempDir::new().unwrap();
        let store = StepStateStore::new(tmp.path().join("state.json"));
        let manifest = ManifestLoader::parse_str(
            "[migrations.ok]\nimport = \"true\"\nrollback = \"true\"\n[migrations.bad]\nimport = \"exit 2\"\n",
            tmp.path(),
        )
        .unwrap();
        let runner = ShellRunner::from_manifest(manifest).with_state_store(store.clone());

        runner.instantiate("ok").unwrap().run(Direction::Forward).unwrap();
        let _ = runner.instantiate("bad").unwrap().run(Direction::Forward);

        assert_eq!(store.get("ok").unwrap().unwrap().status, StepStatus::Imported);
        let bad = store.get("bad").unwrap().unwrap();
        assert_eq!(bad.status, StepStatus::Failed);
        assert_eq!(bad.exit_code, Some(2));

        runner.instantiate("ok").unwrap().run(Direction::Backward).unwrap();
        assert_eq!(
            store.get("ok").unwrap().unwrap().status,
            StepStatus::RolledBack
        );
    }

    #[test]
    fn test_clear_cached_definitions_rereads_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("scenarios.toml");
        std::fs::write(&path, "[migrations.first]\nimport = \"true\"\n").unwrap();

        let runner = ShellRunner::from_path(&path);
        assert!(runner.instantiate("first").is_ok());

        std::fs::write(&path, "[migrations.second]\nimport = \"true\"\n").unwrap();
        assert!(runner.instantiate("second").is_err());

        runner.clear_cached_definitions();
        assert!(runner.instantiate("second").is_ok());
        assert!(runner.instantiate("first").is_err());
    }
}
