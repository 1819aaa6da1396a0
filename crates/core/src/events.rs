//! Lifecycle callback bus
//!
//! The orchestrator fires typed [`LifecycleEvent`]s at fixed points: after each
//! successful import step and after a scenario is enabled, uninstalled or reset.
//! Listeners are registered on an [`EventBus`] at startup and invoked in
//! registration order. Their outcomes are never inspected by the orchestrator.

use crate::batch::{BatchJob, BatchQueue};
use crate::manifest::HookDefinition;
use crate::shell::{run_logged, shell_command};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Reference to a migration step in an event payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRef {
    pub step: String,
    pub label: String,
}

/// Reference to a scenario in an event payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScenarioRef {
    pub scenario: String,
}

/// Events fired by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event")]
pub enum LifecycleEvent {
    /// A step finished importing successfully
    #[serde(rename = "scenario_migration_finished")]
    MigrationFinished(StepRef),
    #[serde(rename = "scenario_post_enable")]
    PostEnable(ScenarioRef),
    #[serde(rename = "scenario_post_uninstall")]
    PostUninstall(ScenarioRef),
    #[serde(rename = "scenario_post_reset")]
    PostReset(ScenarioRef),
}

impl LifecycleEvent {
    /// Every event name, in the order they are documented
    pub const NAMES: [&'static str; 4] = [
        "scenario_migration_finished",
        "scenario_post_enable",
        "scenario_post_uninstall",
        "scenario_post_reset",
    ];

    pub fn migration_finished(step: impl Into<String>, label: impl Into<String>) -> Self {
        LifecycleEvent::MigrationFinished(StepRef {
            step: step.into(),
            label: label.into(),
        })
    }

    pub fn post_enable(scenario: impl Into<String>) -> Self {
        LifecycleEvent::PostEnable(ScenarioRef {
            scenario: scenario.into(),
        })
    }

    pub fn post_uninstall(scenario: impl Into<String>) -> Self {
        LifecycleEvent::PostUninstall(ScenarioRef {
            scenario: scenario.into(),
        })
    }

    pub fn post_reset(scenario: impl Into<String>) -> Self {
        LifecycleEvent::PostReset(ScenarioRef {
            scenario: scenario.into(),
        })
    }

    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::MigrationFinished(_) => "scenario_migration_finished",
            LifecycleEvent::PostEnable(_) => "scenario_post_enable",
            LifecycleEvent::PostUninstall(_) => "scenario_post_uninstall",
            LifecycleEvent::PostReset(_) => "scenario_post_reset",
        }
    }

    /// Scenario id for scenario-level events
    pub fn scenario(&self) -> Option<&str> {
        match self {
            LifecycleEvent::MigrationFinished(_) => None,
            LifecycleEvent::PostEnable(r)
            | LifecycleEvent::PostUninstall(r)
            | LifecycleEvent::PostReset(r) => Some(&r.scenario),
        }
    }

    /// Step reference for step-level events
    pub fn step(&self) -> Option<&StepRef> {
        match self {
            LifecycleEvent::MigrationFinished(step) => Some(step),
            _ => None,
        }
    }
}

/// Observer of lifecycle events
pub trait LifecycleListener: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    /// Handle one event. Failures are the listener's to report.
    fn on_event(&self, event: &LifecycleEvent);
}

/// Ordered list of registered listeners
#[derive(Default)]
pub struct EventBus {
    listeners: Vec<Box<dyn LifecycleListener>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; listeners fire in registration order
    pub fn register(&mut self, listener: Box<dyn LifecycleListener>) {
        if self.listeners.iter().any(|l| l.name() == listener.name()) {
            warn!("Lifecycle listener '{}' already registered", listener.name());
        }
        self.listeners.push(listener);
    }

    pub fn with_listener(mut self, listener: Box<dyn LifecycleListener>) -> Self {
        self.register(listener);
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Deliver `event` to every listener
    pub fn fire_all(&self, event: &LifecycleEvent) {
        debug!(
            event = event.name(),
            listeners = self.listeners.len(),
            "Firing lifecycle event"
        );
        for listener in &self.listeners {
            listener.on_event(event);
        }
    }
}

#[derive(Serialize)]
struct EventRecord<'a> {
    timestamp: DateTime<Utc>,
    #[serde(flatten)]
    event: &'a LifecycleEvent,
}

/// Appends every event as one JSON line to a file
pub struct JsonLinesListener {
    writer: Mutex<BufWriter<File>>,
}

impl JsonLinesListener {
    /// Open (or create) `path` in append mode, creating parent directories
    pub fn new(path: &Path) -> std::io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn write(&self, event: &LifecycleEvent) -> anyhow::Result<()> {
        let line = serde_json::to_string(&EventRecord {
            timestamp: Utc::now(),
            event,
        })?;
        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        writeln!(writer, "{}", line)?;
        writer.flush()?;
        Ok(())
    }
}

impl LifecycleListener for JsonLinesListener {
    fn name(&self) -> &str {
        "json-lines"
    }

    fn on_event(&self, event: &LifecycleEvent) {
        if let Err(e) = self.write(event) {
            warn!("Failed to write lifecycle event {}: {}", event.name(), e);
        }
    }
}

/// Runs manifest-declared hook commands for matching events
///
/// Deferred hooks are queued as batch work and run at the next drain.
pub struct CommandHookListener {
    hooks: Vec<HookDefinition>,
    working_dir: PathBuf,
    queue: BatchQueue,
}

impl CommandHookListener {
    pub fn new(hooks: Vec<HookDefinition>, working_dir: impl Into<PathBuf>, queue: BatchQueue) -> Self {
        Self {
            hooks,
            working_dir: working_dir.into(),
            queue,
        }
    }

    fn matches(hook: &HookDefinition, event: &LifecycleEvent) -> bool {
        if hook.event != event.name() {
            return false;
        }
        // Scenario filters only apply to scenario-level events.
        match (&hook.scenario, event.scenario()) {
            (Some(wanted), Some(actual)) => wanted == actual,
            _ => true,
        }
    }

    fn run_hook(
        script: &str,
        working_dir: &Path,
        env: &[(&'static str, String)],
        tag: &str,
    ) -> anyhow::Result<()> {
        let mut command = shell_command(script);
        if !working_dir.as_os_str().is_empty() {
            command.current_dir(working_dir);
        }
        for (key, value) in env {
            command.env(key, value);
        }

        let output = run_logged(command, tag)?;
        if !output.status.success() {
            anyhow::bail!(
                "hook command exited with code {}",
                output.status.code().unwrap_or(-1)
            );
        }
        Ok(())
    }
}

fn hook_env(event: &LifecycleEvent) -> Vec<(&'static str, String)> {
    let mut env = vec![("SCENARIOS_EVENT", event.name().to_string())];
    if let Some(scenario) = event.scenario() {
        env.push(("SCENARIOS_SCENARIO", scenario.to_string()));
    }
    if let Some(step) = event.step() {
        env.push(("SCENARIOS_STEP", step.step.clone()));
    }
    env
}

impl LifecycleListener for CommandHookListener {
    fn name(&self) -> &str {
        "command-hooks"
    }

    fn on_event(&self, event: &LifecycleEvent) {
        for hook in self.hooks.iter().filter(|h| Self::matches(h, event)) {
            let env = hook_env(event);
            let tag = format!("hook:{}", event.name());

            if hook.deferred {
                let script = hook.command.clone();
                let working_dir = self.working_dir.clone();
                self.queue.enqueue(BatchJob::new(
                    format!("{} hook: {}", event.name(), hook.command),
                    move || Self::run_hook(&script, &working_dir, &env, &tag),
                ));
                continue;
            }

            info!("Running {} hook: {}", event.name(), hook.command);
            if let Err(e) = Self::run_hook(&hook.command, &self.working_dir, &env, &tag) {
                warn!("{} hook '{}' failed: {}", event.name(), hook.command, e);
            }
        }
    }
}
