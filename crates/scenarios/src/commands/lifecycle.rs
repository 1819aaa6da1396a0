//! Enable, uninstall and reset commands
//!
//! Builds a [`ScenariosHandler`] from the manifest and global options, runs
//! one lifecycle transition and maps the outcome to the process exit code.

use super::{load_manifest, state_store, ScenarioExitCode};
use crate::cli::CliContext;
use anyhow::{Context, Result};
use scenarios_core::batch::BatchQueue;
use scenarios_core::environment::{CacheTargets, ExecutionEnvironment, Interactive, Unattended};
use scenarios_core::events::{CommandHookListener, EventBus, JsonLinesListener};
use scenarios_core::runner::ShellRunner;
use scenarios_core::ScenariosHandler;
use std::io::IsTerminal;
use tracing::{debug, info, instrument, warn};

/// Lifecycle transition requested on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Enable,
    Uninstall,
    Reset,
}

impl LifecycleAction {
    fn as_str(&self) -> &'static str {
        match self {
            LifecycleAction::Enable => "enable",
            LifecycleAction::Uninstall => "uninstall",
            LifecycleAction::Reset => "reset",
        }
    }
}

/// Which execution environment a run uses
#[derive(Debug, Clone, PartialEq, Eq)]
enum EnvironmentChoice {
    Interactive,
    Unattended(Option<String>),
}

/// An alias or `--unattended` forces an unattended run; otherwise a terminal
/// on stdout means someone is watching.
fn choose_environment(context: &CliContext, stdout_is_tty: bool) -> EnvironmentChoice {
    if context.alias.is_some() || context.unattended || !stdout_is_tty {
        EnvironmentChoice::Unattended(context.alias.clone())
    } else {
        EnvironmentChoice::Interactive
    }
}

/// Execute one lifecycle transition for `scenario`
#[instrument(skip(context))]
pub fn execute(context: &CliContext, action: LifecycleAction, scenario: &str) -> Result<()> {
    let (manifest_path, manifest) = load_manifest(context)?;

    let queue = BatchQueue::new();
    let cache = CacheTargets::from_manifest(&manifest);
    let environment: Box<dyn ExecutionEnvironment> =
        match choose_environment(context, std::io::stdout().is_terminal()) {
            EnvironmentChoice::Interactive => {
                debug!("Using interactive execution environment");
                Box::new(Interactive::stdout(cache, queue.clone()))
            }
            EnvironmentChoice::Unattended(alias) => {
                let unattended = Unattended::new(alias, cache, queue.clone());
                debug!(
                    "Using unattended execution environment with alias {}",
                    unattended.alias()
                );
                Box::new(unattended)
            }
        };

    let mut events = EventBus::new();
    if !manifest.hooks.is_empty() {
        events.register(Box::new(CommandHookListener::new(
            manifest.hooks.clone(),
            manifest.base_dir.clone(),
            queue.clone(),
        )));
    }
    if let Some(path) = &context.events_file {
        let listener = JsonLinesListener::new(path)
            .with_context(|| format!("Failed to open events file {}", path.display()))?;
        events.register(Box::new(listener));
    }

    let runner =
        ShellRunner::from_path(manifest_path).with_state_store(state_store(context, &manifest));

    let handler = ScenariosHandler::new(Box::new(manifest), Box::new(runner), environment, events);

    let (succeeded, all_succeeded) = match action {
        LifecycleAction::Enable => {
            let outcome = handler.enable(scenario);
            (outcome.succeeded(), outcome.all_succeeded())
        }
        LifecycleAction::Uninstall => {
            let outcome = handler.uninstall(scenario);
            (outcome.succeeded(), outcome.all_succeeded())
        }
        LifecycleAction::Reset => {
            let outcome = handler.reset(scenario);
            (outcome.succeeded(), outcome.all_succeeded())
        }
    };

    // Deferred hooks queued by the final callback would otherwise be lost
    // when the process exits.
    if !queue.is_empty() {
        let summary = queue.drain(|label, result| {
            if let Err(e) = result {
                warn!("Batch job {} failed: {:#}", label, e);
            }
        });
        debug!(
            processed = summary.processed,
            failed = summary.failed,
            "Drained deferred hooks"
        );
    }

    let passed = if context.strict {
        all_succeeded
    } else {
        succeeded
    };
    info!(
        action = action.as_str(),
        scenario,
        succeeded,
        all_succeeded,
        "Scenario {} finished",
        action.as_str()
    );

    if passed {
        Ok(())
    } else {
        Err(ScenarioExitCode(1).into())
    }
}
