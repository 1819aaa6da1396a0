//! Scenario data model
//!
//! A scenario is a named, ordered bundle of migration steps. Steps run in
//! declared order on enable and in exactly the reverse order on uninstall.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Resolved scenario metadata
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioInfo {
    /// Machine name
    pub id: String,
    /// Human-readable label
    pub label: String,
    /// Migration step names in enable order
    pub migrations: Vec<String>,
}

impl ScenarioInfo {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        migrations: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            migrations: migrations.into_iter().map(Into::into).collect(),
        }
    }

    /// Steps in enable order
    pub fn enable_order(&self) -> Vec<String> {
        self.migrations.clone()
    }

    /// Steps in uninstall order: the exact reverse of [`Self::enable_order`]
    pub fn uninstall_order(&self) -> Vec<String> {
        self.migrations.iter().rev().cloned().collect()
    }
}

/// Direction a migration step executes in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Import
    Forward,
    /// Rollback
    Backward,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Forward => "forward",
            Direction::Backward => "backward",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Command issued to every step of a run
///
/// Only `import` and `rollback` map to a direction. Any other value is carried
/// through as [`MigrationCommand::Unsupported`] and fails each step without
/// executing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MigrationCommand {
    Import,
    Rollback,
    Unsupported(String),
}

impl MigrationCommand {
    pub fn as_str(&self) -> &str {
        match self {
            MigrationCommand::Import => "import",
            MigrationCommand::Rollback => "rollback",
            MigrationCommand::Unsupported(raw) => raw,
        }
    }

    /// Direction for this command, `None` when unsupported
    pub fn direction(&self) -> Option<Direction> {
        match self {
            MigrationCommand::Import => Some(Direction::Forward),
            MigrationCommand::Rollback => Some(Direction::Backward),
            MigrationCommand::Unsupported(_) => None,
        }
    }
}

impl From<&str> for MigrationCommand {
    fn from(raw: &str) -> Self {
        match raw {
            "import" => MigrationCommand::Import,
            "rollback" => MigrationCommand::Rollback,
            other => MigrationCommand::Unsupported(other.to_string()),
        }
    }
}

impl fmt::Display for MigrationCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-invocation context for one `process_migrations` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunContext {
    pub command: MigrationCommand,
    pub steps: Vec<String>,
    /// Execution alias; `None` for interactive runs
    pub alias: Option<String>,
}

impl RunContext {
    pub fn new(command: MigrationCommand, steps: Vec<String>, alias: Option<String>) -> Self {
        Self {
            command,
            steps,
            alias,
        }
    }
}
