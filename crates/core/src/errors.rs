//! Error types and handling
//!
//! Domain errors are grouped per concern (manifest, steps, state) and wrapped
//! in the top-level [`ScenariosError`]. The orchestrator itself never returns
//! these to its caller: step failures are turned into notifications. They
//! surface from manifest loading, the shell runner and the state store.

use thiserror::Error;

/// Manifest (configuration) errors
#[derive(Error, Debug)]
pub enum ManifestError {
    /// Manifest file parsing error
    #[error("Failed to parse scenario manifest: {message}")]
    Parsing { message: String },

    /// Manifest validation error
    #[error("Scenario manifest validation error: {message}")]
    Validation { message: String },

    /// Manifest file I/O error
    #[error("Failed to read scenario manifest")]
    Io(#[from] std::io::Error),

    /// Manifest file not found
    #[error("Scenario manifest not found: {path}")]
    NotFound { path: String },
}

/// Migration step errors
#[derive(Error, Debug)]
pub enum StepError {
    /// The step name has no definition in the runner
    #[error("Unknown migration step: {name}")]
    UnknownStep { name: String },

    /// The step has no command for the requested direction
    #[error("Migration step {name} does not support {direction}")]
    Unsupported { name: String, direction: String },

    /// The step's process could not be spawned or awaited
    #[error("Failed to execute migration step {name}: {message}")]
    Spawn { name: String, message: String },

    /// The step ran and exited unsuccessfully
    #[error("Migration step {name} exited with code {code}")]
    ExitStatus { name: String, code: i32 },

    /// Step definitions could not be loaded
    #[error("Failed to load migration definitions: {0}")]
    Definitions(#[from] ManifestError),
}

/// Step state persistence errors
#[derive(Error, Debug)]
pub enum StateError {
    /// State file I/O error
    #[error("Failed to access step state file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// State serialization error
    #[error("Failed to serialize step state")]
    Json(#[from] serde_json::Error),
}

/// Main error enum wrapping all domain-specific errors
#[derive(Error, Debug)]
pub enum ScenariosError {
    /// Manifest-related errors
    #[error("Manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Migration step errors
    #[error("Step error: {0}")]
    Step(#[from] StepError),

    /// State persistence errors
    #[error("State error: {0}")]
    State(#[from] StateError),
}

/// Convenience type alias for Results with ScenariosError
pub type Result<T> = std::result::Result<T, ScenariosError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_manifest_error_display() {
        let error = ManifestError::Validation {
            message: "scenario demo has no migrations".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Scenario manifest validation error: scenario demo has no migrations"
        );

        let error = ManifestError::NotFound {
            path: "/tmp/scenarios.toml".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Scenario manifest not found: /tmp/scenarios.toml"
        );
    }

    #[test]
    fn test_step_error_display() {
        let error = StepError::UnknownStep {
            name: "users".to_string(),
        };
        assert_eq!(error.to_string(), "Unknown migration step: users");

        let error = StepError::ExitStatus {
            name: "users".to_string(),
            code: 3,
        };
        assert_eq!(error.to_string(), "Migration step users exited with code 3");
    }

    #[test]
    fn test_error_wrapping_keeps_source() {
        let error: ScenariosError = StepError::Definitions(ManifestError::Parsing {
            message: "bad toml".to_string(),
        })
        .into();

        assert!(error.to_string().starts_with("Step error:"));
        assert!(error.source().is_some());
    }

    #[test]
    fn test_every_umbrella_variant_wraps_a_domain_error() {
        let errors: Vec<ScenariosError> = vec![
            ManifestError::NotFound {
                path: "scenarios.toml".to_string(),
            }
            .into(),
            StepError::UnknownStep {
                name: "users".to_string(),
            }
            .into(),
            StateError::Json(serde_json::from_str::<u8>("x").unwrap_err()).into(),
        ];

        for error in errors {
            match error {
                ScenariosError::Manifest(_) | ScenariosError::Step(_) | ScenariosError::State(_) => {
                    assert!(error.source().is_some())
                }
            }
        }
    }
}
