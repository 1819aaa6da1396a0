//! Scenario orchestrator
//!
//! [`ScenariosHandler`] enables, uninstalls and resets scenarios by running
//! their migration steps through a [`MigrationRunner`]. Every outcome becomes a
//! notification on the [`ExecutionEnvironment`]; nothing is returned as an
//! error. A failed step never stops the run and nothing is retried.
//!
//! Per call: Idle → Resolving → {NotFound | Resolved} → Running steps →
//! LifecycleCallback → Idle.
//!
//! ## Result semantics
//!
//! [`MigrationReport::succeeded`] reports the outcome of the last processed
//! step only, matching the behavior existing callers rely on: a run where only
//! an early step fails still reports success. [`MigrationReport::all_succeeded`]
//! and [`MigrationReport::failures`] give the per-step picture.

use crate::environment::ExecutionEnvironment;
use crate::events::{EventBus, LifecycleEvent};
use crate::registry::MigrationRegistry;
use crate::runner::MigrationRunner;
use crate::scenario::{MigrationCommand, RunContext, ScenarioInfo};
use tracing::{debug, instrument, warn};

/// Outcome of one step within a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepOutcome {
    pub step: String,
    pub label: String,
    pub success: bool,
    /// Failure detail for logs; not part of the user-facing message
    pub error: Option<String>,
}

impl StepOutcome {
    fn succeeded(step: &str, label: String) -> Self {
        Self {
            step: step.to_string(),
            label,
            success: true,
            error: None,
        }
    }

    fn failed(step: &str, label: String, error: String) -> Self {
        Self {
            step: step.to_string(),
            label,
            success: false,
            error: Some(error),
        }
    }
}

/// Ordered per-step outcomes of one `process_migrations` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationReport {
    pub command: MigrationCommand,
    pub steps: Vec<StepOutcome>,
}

impl MigrationReport {
    fn new(command: MigrationCommand) -> Self {
        Self {
            command,
            steps: Vec::new(),
        }
    }

    /// Outcome of the last processed step; `false` when no step ran
    pub fn succeeded(&self) -> bool {
        self.steps.last().map(|s| s.success).unwrap_or(false)
    }

    /// `true` when at least one step ran and none failed
    pub fn all_succeeded(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.success)
    }

    pub fn failures(&self) -> Vec<&StepOutcome> {
        self.steps.iter().filter(|s| !s.success).collect()
    }

    /// Step names in the order they were processed
    pub fn order(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.step.as_str()).collect()
    }
}

/// Outcome of `enable` or `uninstall`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScenarioOutcome {
    NotFound,
    Processed(MigrationReport),
}

impl ScenarioOutcome {
    pub fn succeeded(&self) -> bool {
        match self {
            ScenarioOutcome::NotFound => false,
            ScenarioOutcome::Processed(report) => report.succeeded(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        match self {
            ScenarioOutcome::NotFound => false,
            ScenarioOutcome::Processed(report) => report.all_succeeded(),
        }
    }

    pub fn report(&self) -> Option<&MigrationReport> {
        match self {
            ScenarioOutcome::NotFound => None,
            ScenarioOutcome::Processed(report) => Some(report),
        }
    }
}

/// Outcome of `reset`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResetOutcome {
    NotFound,
    Processed {
        uninstall: ScenarioOutcome,
        enable: ScenarioOutcome,
    },
}

impl ResetOutcome {
    /// Mirrors the enable half of the reset
    pub fn succeeded(&self) -> bool {
        match self {
            ResetOutcome::NotFound => false,
            ResetOutcome::Processed { enable, .. } => enable.succeeded(),
        }
    }

    pub fn all_succeeded(&self) -> bool {
        match self {
            ResetOutcome::NotFound => false,
            ResetOutcome::Processed { uninstall, enable } => {
                uninstall.all_succeeded() && enable.all_succeeded()
            }
        }
    }
}

/// Sequences scenario lifecycle transitions over injected collaborators
pub struct ScenariosHandler {
    registry: Box<dyn MigrationRegistry>,
    runner: Box<dyn MigrationRunner>,
    environment: Box<dyn ExecutionEnvironment>,
    events: EventBus,
}

impl ScenariosHandler {
    pub fn new(
        registry: Box<dyn MigrationRegistry>,
        runner: Box<dyn MigrationRunner>,
        environment: Box<dyn ExecutionEnvironment>,
        events: EventBus,
    ) -> Self {
        Self {
            registry,
            runner,
            environment,
            events,
        }
    }

    pub fn registry(&self) -> &dyn MigrationRegistry {
        self.registry.as_ref()
    }

    fn resolve(&self, scenario_id: &str) -> Option<ScenarioInfo> {
        debug!(scenario = scenario_id, "Resolving scenario");
        let info = self.registry.resolve(scenario_id);
        if info.is_none() {
            self.environment
                .notify_error(&format!("The scenario {} does not exist.", scenario_id));
        }
        info
    }

    /// Import every step of the scenario in declared order, then invalidate caches
    #[instrument(skip(self))]
    pub fn enable(&self, scenario_id: &str) -> ScenarioOutcome {
        let Some(info) = self.resolve(scenario_id) else {
            return ScenarioOutcome::NotFound;
        };

        self.environment
            .notify_status(&format!("Enabling the {} scenario.", info.label));

        let alias = self.environment.resolve_alias();
        let context = RunContext::new(MigrationCommand::Import, info.enable_order(), alias);
        let report = self.process_migrations(&context);

        self.environment.invalidate_cache(context.alias.as_deref());

        self.events.fire_all(&LifecycleEvent::post_enable(scenario_id));
        ScenarioOutcome::Processed(report)
    }

    /// Roll back every step of the scenario in reverse declared order
    ///
    /// Caches are not invalidated on uninstall.
    #[instrument(skip(self))]
    pub fn uninstall(&self, scenario_id: &str) -> ScenarioOutcome {
        let Some(info) = self.resolve(scenario_id) else {
            return ScenarioOutcome::NotFound;
        };

        self.environment
            .notify_status(&format!("Uninstalling the {} scenario.", info.label));

        let alias = self.environment.resolve_alias();
        let context = RunContext::new(MigrationCommand::Rollback, info.uninstall_order(), alias);
        let report = self.process_migrations(&context);

        self.events
            .fire_all(&LifecycleEvent::post_uninstall(scenario_id));
        ScenarioOutcome::Processed(report)
    }

    /// Full uninstall followed by a full enable, then the post-reset callback
    #[instrument(skip(self))]
    pub fn reset(&self, scenario_id: &str) -> ResetOutcome {
        let Some(info) = self.resolve(scenario_id) else {
            return ResetOutcome::NotFound;
        };

        self.environment
            .notify_status(&format!("Resetting the {} scenario.", info.label));

        let uninstall = self.uninstall(scenario_id);
        let enable = self.enable(scenario_id);

        self.events.fire_all(&LifecycleEvent::post_reset(scenario_id));
        ResetOutcome::Processed { uninstall, enable }
    }

    /// Run `context.steps` in the given order with `context.command`
    #[instrument(skip_all, fields(command = %context.command, steps = context.steps.len(), alias = ?context.alias))]
    pub fn process_migrations(&self, context: &RunContext) -> MigrationReport {
        self.runner.clear_cached_definitions();
        self.environment
            .drain_pending_batch_work(context.alias.as_deref());

        let mut report = MigrationReport::new(context.command.clone());

        for name in &context.steps {
            let outcome = self.process_step(&context.command, name);

            if outcome.success {
                self.environment.notify_status(&format!(
                    "Executed {} for \"{}\" migration.",
                    context.command, outcome.label
                ));
            } else {
                if let Some(error) = &outcome.error {
                    warn!(step = %name, "{}", error);
                }
                self.environment.notify_error(&format!(
                    "Migration \"{}\" failed to execute {}",
                    outcome.label, context.command
                ));
            }

            report.steps.push(outcome);
        }

        debug!(
            succeeded = report.succeeded(),
            failed = report.failures().len(),
            "Finished processing migrations"
        );
        report
    }

    fn process_step(&self, command: &MigrationCommand, name: &str) -> StepOutcome {
        let mut step = match self.runner.instantiate(name) {
            Ok(step) => step,
            Err(e) => return StepOutcome::failed(name, name.to_string(), e.to_string()),
        };
        let label = step.label();

        let Some(direction) = command.direction() else {
            return StepOutcome::failed(
                name,
                label,
                format!("unsupported migration command '{}'", command),
            );
        };

        match step.run(direction) {
            Ok(()) => {
                if *command == MigrationCommand::Import {
                    self.events
                        .fire_all(&LifecycleEvent::migration_finished(step.name(), &label));
                }
                StepOutcome::succeeded(name, label)
            }
            Err(e) => StepOutcome::failed(name, label, e.to_string()),
        }
    }
}
