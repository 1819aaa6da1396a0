//! Status command implementation
//!
//! Shows the last recorded state of every step declared by a scenario.

use super::{load_manifest, state_store};
use crate::cli::CliContext;
use anyhow::Result;
use scenarios_core::registry::MigrationRegistry;
use scenarios_core::state::{StepRecord, StepStates};
use serde::Serialize;

/// One row of the status table
#[derive(Debug, Serialize)]
struct StepStatusRow {
    step: String,
    label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    record: Option<StepRecord>,
}

#[derive(Debug, Serialize)]
struct ScenarioStatus {
    scenario: String,
    label: String,
    steps: Vec<StepStatusRow>,
}

fn render_text(status: &ScenarioStatus) -> String {
    let mut out = format!("{} ({})\n", status.scenario, status.label);
    for row in &status.steps {
        let state = match &row.record {
            Some(record) => {
                let mut line = format!(
                    "{} via {} at {}",
                    record.status.as_str(),
                    record.command,
                    record.timestamp.format("%Y-%m-%d %H:%M:%S UTC")
                );
                if let Some(code) = record.exit_code {
                    line.push_str(&format!(" (exit {})", code));
                }
                line
            }
            None => "never run".to_string(),
        };
        out.push_str(&format!("  {:<24} {}\n", row.step, state));
    }
    out
}

fn build_status(
    scenario: &str,
    label: String,
    steps: &[String],
    labels: impl Fn(&str) -> String,
    mut states: StepStates,
) -> ScenarioStatus {
    ScenarioStatus {
        scenario: scenario.to_string(),
        label,
        steps: steps
            .iter()
            .map(|step| StepStatusRow {
                step: step.clone(),
                label: labels(step),
                record: states.steps.remove(step),
            })
            .collect(),
    }
}

/// Execute the status command
pub fn execute_status(context: &CliContext, scenario: &str, json: bool) -> Result<()> {
    let (_, manifest) = load_manifest(context)?;
    let Some(info) = manifest.resolve(scenario) else {
        anyhow::bail!("The scenario {} does not exist.", scenario);
    };

    let states = state_store(context, &manifest).load()?;
    let status = build_status(
        &info.id,
        info.label.clone(),
        &info.migrations,
        |step| manifest.migration_label(step),
        states,
    );

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        print!("{}", render_text(&status));
    }
    Ok(())
}
