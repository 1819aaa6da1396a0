//! Step state persistence
//!
//! Records the last outcome of every migration step in a JSON file so the
//! `status` command can show what a scenario currently has imported. Writes go
//! through a temp file and a rename. A missing or corrupted file reads as empty.

use crate::errors::{Result, StateError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument, warn};

/// Last recorded status of a step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Imported,
    RolledBack,
    Failed,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Imported => "imported",
            StepStatus::RolledBack => "rolled_back",
            StepStatus::Failed => "failed",
        }
    }
}

/// One persisted step outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepRecord {
    /// Command that produced this record (`import` or `rollback`)
    pub command: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl StepRecord {
    pub fn new(command: impl Into<String>, status: StepStatus) -> Self {
        Self {
            command: command.into(),
            status,
            exit_code: None,
            message: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_exit_code(mut self, exit_code: Option<i32>) -> Self {
        self.exit_code = exit_code;
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Contents of the state file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StepStates {
    #[serde(default)]
    pub steps: BTreeMap<String, StepRecord>,
}

/// JSON-file backed store of step records
#[derive(Debug, Clone)]
pub struct StepStateStore {
    path: PathBuf,
}

impl StepStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read all records
    #[instrument(skip_all, fields(path = %self.path.display()))]
    pub fn load(&self) -> Result<StepStates> {
        if !self.path.exists() {
            debug!("Step state file does not exist yet");
            return Ok(StepStates::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|source| StateError::Io {
            path: self.path.display().to_string(),
            source,
        })?;

        match serde_json::from_str::<StepStates>(&content) {
            Ok(states) => Ok(states),
            Err(e) => {
                warn!(
                    "Failed to parse step state file {}: {}. Treating as empty.",
                    self.path.display(),
                    e
                );
                Ok(StepStates::default())
            }
        }
    }

    /// Record for a single step
    pub fn get(&self, step: &str) -> Result<Option<StepRecord>> {
        Ok(self.load()?.steps.remove(step))
    }

    /// Replace the record for `step`
    #[instrument(skip(self, record), fields(status = record.status.as_str()))]
    pub fn record(&self, step: &str, record: StepRecord) -> Result<()> {
        let mut states = self.load()?;
        states.steps.insert(step.to_string(), record);
        self.write(&states)
    }

    fn write(&self, states: &StepStates) -> Result<()> {
        let io_err = |source| StateError::Io {
            path: self.path.display().to_string(),
            source,
        };

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(io_err)?;
            }
        }

        let content = serde_json::to_string_pretty(states).map_err(StateError::Json)?;

        let temp_path = self.path.with_extension("tmp");
        std::fs::write(&temp_path, content).map_err(io_err)?;
        std::fs::rename(&temp_path, &self.path).map_err(io_err)?;

        debug!(
            "Wrote {} step records to {}",
            states.steps.len(),
            self.path.display()
        );
        Ok(())
    }
}
