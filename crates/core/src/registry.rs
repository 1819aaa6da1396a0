//! Scenario registry
//!
//! Resolves a scenario machine name to its label and ordered step list.

use crate::manifest::ScenarioManifest;
use crate::scenario::ScenarioInfo;

/// Source of scenario metadata
pub trait MigrationRegistry: Send + Sync {
    /// Look up a scenario, `None` when it is not declared
    fn resolve(&self, scenario_id: &str) -> Option<ScenarioInfo>;

    /// All scenarios in declaration order
    fn scenarios(&self) -> Vec<ScenarioInfo>;
}

impl MigrationRegistry for ScenarioManifest {
    fn resolve(&self, scenario_id: &str) -> Option<ScenarioInfo> {
        self.scenarios.get(scenario_id).map(|definition| {
            ScenarioInfo::new(
                scenario_id,
                definition
                    .label
                    .clone()
                    .unwrap_or_else(|| scenario_id.to_string()),
                definition.migrations.iter().cloned(),
            )
        })
    }

    fn scenarios(&self) -> Vec<ScenarioInfo> {
        self.scenarios
            .keys()
            .filter_map(|id| self.resolve(id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestLoader;

    #[test]
    fn test_resolve_from_manifest() {
        let manifest = ManifestLoader::parse_str(
            r#"
[scenarios.demo]
label = "Demo content"
migrations = ["users", "articles"]

[scenarios.bare]
migrations = ["users"]
"#,
            ".",
        )
        .unwrap();

        let info = manifest.resolve("demo").unwrap();
        assert_eq!(info.label, "Demo content");
        assert_eq!(info.migrations, vec!["users", "articles"]);

        assert_eq!(manifest.resolve("bare").unwrap().label, "bare");
        assert!(manifest.resolve("missing").is_none());

        let ids: Vec<String> = manifest.scenarios().into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["demo", "bare"]);
    }
}
