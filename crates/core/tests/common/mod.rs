//! Shared test helpers for core integration tests.
//!
//! Every fake writes into one [`Journal`] so tests can assert the relative
//! order of runner calls, notifications, cache work and lifecycle events.
#![allow(dead_code)]

use scenarios_core::environment::ExecutionEnvironment;
use scenarios_core::errors::StepError;
use scenarios_core::events::{EventBus, LifecycleEvent, LifecycleListener};
use scenarios_core::registry::MigrationRegistry;
use scenarios_core::runner::{MigrationRunner, MigrationStep};
use scenarios_core::{Direction, ScenarioInfo, ScenariosHandler};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Ordered record of everything the fakes observed
#[derive(Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    /// Entries starting with `prefix`
    pub fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.starts_with(prefix))
            .collect()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.with_prefix(prefix).len()
    }

    /// Position of the first entry equal to `entry`
    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

pub struct FakeRegistry {
    scenarios: Vec<ScenarioInfo>,
}

impl FakeRegistry {
    pub fn new(scenarios: Vec<ScenarioInfo>) -> Self {
        Self { scenarios }
    }
}

impl MigrationRegistry for FakeRegistry {
    fn resolve(&self, scenario_id: &str) -> Option<ScenarioInfo> {
        self.scenarios.iter().find(|s| s.id == scenario_id).cloned()
    }

    fn scenarios(&self) -> Vec<ScenarioInfo> {
        self.scenarios.clone()
    }
}

/// Runner whose steps succeed unless listed in `failing`
#[derive(Clone)]
pub struct FakeRunner {
    journal: Journal,
    failing: HashSet<(String, Direction)>,
    unknown: HashSet<String>,
}

impl FakeRunner {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            failing: HashSet::new(),
            unknown: HashSet::new(),
        }
    }

    pub fn failing(mut self, step: &str, direction: Direction) -> Self {
        self.failing.insert((step.to_string(), direction));
        self
    }

    pub fn unknown(mut self, step: &str) -> Self {
        self.unknown.insert(step.to_string());
        self
    }
}

impl MigrationRunner for FakeRunner {
    fn clear_cached_definitions(&self) {
        self.journal.push("runner:clear");
    }

    fn instantiate(&self, name: &str) -> Result<Box<dyn MigrationStep>, StepError> {
        self.journal.push(format!("runner:instantiate:{}", name));
        if self.unknown.contains(name) {
            return Err(StepError::UnknownStep {
                name: name.to_string(),
            });
        }
        Ok(Box::new(FakeStep {
            name: name.to_string(),
            runner: self.clone(),
        }))
    }
}

struct FakeStep {
    name: String,
    runner: FakeRunner,
}

impl MigrationStep for FakeStep {
    fn name(&self) -> &str {
        &self.name
    }

    fn label(&self) -> String {
        format!("Label {}", self.name)
    }

    fn run(&mut self, direction: Direction) -> Result<(), StepError> {
        self.runner
            .journal
            .push(format!("run:{}:{}", direction, self.name));
        if self.runner.failing.contains(&(self.name.clone(), direction)) {
            return Err(StepError::ExitStatus {
                name: self.name.clone(),
                code: 1,
            });
        }
        Ok(())
    }
}

/// Environment recording notifications and backend calls
pub struct RecordingEnvironment {
    journal: Journal,
    alias: Option<String>,
}

impl RecordingEnvironment {
    pub fn new(journal: Journal, alias: Option<&str>) -> Self {
        Self {
            journal,
            alias: alias.map(str::to_string),
        }
    }
}

impl ExecutionEnvironment for RecordingEnvironment {
    fn resolve_alias(&self) -> Option<String> {
        self.alias.clone()
    }

    fn notify_status(&self, message: &str) {
        self.journal.push(format!("status:{}", message));
    }

    fn notify_error(&self, message: &str) {
        self.journal.push(format!("error:{}", message));
    }

    fn invalidate_cache(&self, alias: Option<&str>) {
        self.journal
            .push(format!("cache:{}", alias.unwrap_or("none")));
    }

    fn drain_pending_batch_work(&self, alias: Option<&str>) {
        self.journal
            .push(format!("drain:{}", alias.unwrap_or("none")));
    }
}

/// Listener recording `event:<name>:<payload>` entries
pub struct RecordingListener {
    journal: Journal,
}

impl RecordingListener {
    pub fn new(journal: Journal) -> Self {
        Self { journal }
    }
}

impl LifecycleListener for RecordingListener {
    fn name(&self) -> &str {
        "recording"
    }

    fn on_event(&self, event: &LifecycleEvent) {
        let payload = match (event.scenario(), event.step()) {
            (Some(scenario), _) => scenario.to_string(),
            (None, Some(step)) => step.step.clone(),
            (None, None) => String::new(),
        };
        self.journal
            .push(format!("event:{}:{}", event.name(), payload));
    }
}

/// Handler over fakes with a single `demo` scenario of steps a, b, c
pub fn demo_handler(journal: &Journal, runner: FakeRunner, alias: Option<&str>) -> ScenariosHandler {
    let registry = FakeRegistry::new(vec![ScenarioInfo::new(
        "demo",
        "Demo content",
        ["a", "b", "c"],
    )]);
    let events = EventBus::new().with_listener(Box::new(RecordingListener::new(journal.clone())));
    ScenariosHandler::new(
        Box::new(registry),
        Box::new(runner),
        Box::new(RecordingEnvironment::new(journal.clone(), alias)),
        events,
    )
}
