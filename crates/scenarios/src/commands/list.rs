//! List command implementation
//!
//! Prints every scenario declared in the manifest with its label and steps.

use super::load_manifest;
use crate::cli::CliContext;
use anyhow::Result;
use scenarios_core::registry::MigrationRegistry;
use scenarios_core::ScenarioInfo;

fn render_text(scenarios: &[ScenarioInfo]) -> String {
    if scenarios.is_empty() {
        return "No scenarios declared.\n".to_string();
    }
    scenarios
        .iter()
        .map(|s| format!("{} ({}): {}\n", s.id, s.label, s.migrations.join(", ")))
        .collect()
}

/// Execute the list command
pub fn execute_list(context: &CliContext, json: bool) -> Result<()> {
    let (_, manifest) = load_manifest(context)?;
    let scenarios = manifest.scenarios();

    if json {
        println!("{}", serde_json::to_string_pretty(&scenarios)?);
    } else {
        print!("{}", render_text(&scenarios));
    }
    Ok(())
}
