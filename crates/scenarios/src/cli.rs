use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Log format options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format
    Text,
    /// JSON structured format
    Json,
}

/// Log level options
#[derive(Debug, Clone, ValueEnum)]
pub enum LogLevel {
    /// Error messages only
    Error,
    /// Warning and error messages
    Warn,
    /// Informational messages and above
    Info,
    /// Debug messages and above
    Debug,
    /// All messages including trace
    Trace,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Global options shared by every subcommand
#[derive(Debug, Clone, Default)]
pub struct CliContext {
    /// Explicit manifest path
    pub manifest: Option<PathBuf>,
    /// Step state file override
    pub state_file: Option<PathBuf>,
    /// Execution alias for unattended runs
    pub alias: Option<String>,
    /// Force the unattended environment
    pub unattended: bool,
    /// JSON-lines lifecycle event log
    pub events_file: Option<PathBuf>,
    /// Require every step to succeed for a zero exit code
    pub strict: bool,
}

/// Scenario CLI subcommands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Import every migration step of a scenario in declared order
    Enable {
        /// Scenario identifier
        scenario: String,
    },
    /// Roll back every migration step of a scenario in reverse order
    Uninstall {
        /// Scenario identifier
        scenario: String,
    },
    /// Uninstall and then enable a scenario
    Reset {
        /// Scenario identifier
        scenario: String,
    },
    /// List the scenarios declared in the manifest
    List {
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show the recorded state of each step of a scenario
    Status {
        /// Scenario identifier
        scenario: String,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
}

#[derive(Parser, Debug)]
#[command(
    name = env!("CARGO_PKG_NAME"),
    version,
    about = "Scenario migration runner",
    long_about = "Scenario migration runner\n\nEnables, uninstalls and resets scenarios: named, ordered bundles of reversible migration steps declared in a TOML manifest.",
    color = clap::ColorChoice::Auto
)]
pub struct Cli {
    /// Log format (text or json, defaults to text, can be set via SCENARIOS_LOG_FORMAT env var)
    #[arg(long, global = true, value_enum)]
    pub log_format: Option<LogFormat>,

    /// Log level
    #[arg(long, global = true, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Scenario manifest path (defaults to SCENARIOS_MANIFEST or ./scenarios.toml)
    #[arg(long, global = true, value_name = "PATH")]
    pub manifest: Option<PathBuf>,

    /// Step state file (defaults to the manifest's [state] path)
    #[arg(long, global = true, value_name = "PATH")]
    pub state_file: Option<PathBuf>,

    /// Execution alias; implies an unattended run (can be set via SCENARIOS_ALIAS env var)
    #[arg(long, global = true, value_name = "NAME")]
    pub alias: Option<String>,

    /// Run unattended even when stdout is a terminal
    #[arg(long, global = true)]
    pub unattended: bool,

    /// Append lifecycle events as JSON lines to this file
    #[arg(long, global = true, value_name = "PATH")]
    pub events_file: Option<PathBuf>,

    /// Fail when any step fails, not only the last one
    #[arg(long, global = true)]
    pub strict: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Environment variable naming the execution alias
pub const ALIAS_ENV_VAR: &str = "SCENARIOS_ALIAS";

impl Cli {
    /// Build a CliContext from the parsed global options
    pub fn context(&self) -> CliContext {
        let alias = self
            .alias
            .clone()
            .or_else(|| std::env::var(ALIAS_ENV_VAR).ok())
            .filter(|a| !a.trim().is_empty());
        CliContext {
            manifest: self.manifest.clone(),
            state_file: self.state_file.clone(),
            alias,
            unattended: self.unattended,
            events_file: self.events_file.clone(),
            strict: self.strict,
        }
    }

    /// Initialize logging and run the selected subcommand
    pub fn dispatch(self) -> Result<()> {
        let log_format = match self.log_format {
            Some(LogFormat::Text) => Some("text"),
            Some(LogFormat::Json) => Some("json"),
            None => None, // Let logging module check environment variable
        };
        let log_level = self.log_level.as_str();

        // Set environment variable for log level before initializing logging
        if std::env::var_os("SCENARIOS_LOG").is_none() && std::env::var_os("RUST_LOG").is_none() {
            std::env::set_var(
                "RUST_LOG",
                format!("scenarios={},scenarios_core={}", log_level, log_level),
            );
        }
        scenarios_core::logging::init(log_format)?;

        tracing::debug!("CLI initialized with log level: {}", log_level);

        let context = self.context();

        match self.command {
            Some(Commands::Enable { scenario }) => {
                use crate::commands::lifecycle::{execute, LifecycleAction};
                execute(&context, LifecycleAction::Enable, &scenario)
            }
            Some(Commands::Uninstall { scenario }) => {
                use crate::commands::lifecycle::{execute, LifecycleAction};
                execute(&context, LifecycleAction::Uninstall, &scenario)
            }
            Some(Commands::Reset { scenario }) => {
                use crate::commands::lifecycle::{execute, LifecycleAction};
                execute(&context, LifecycleAction::Reset, &scenario)
            }
            Some(Commands::List { json }) => crate::commands::list::execute_list(&context, json),
            Some(Commands::Status { scenario, json }) => {
                crate::commands::status::execute_status(&context, &scenario, json)
            }
            None => {
                // No subcommand provided - show help-like message
                println!("Scenario migration runner");
                println!("Run 'scenarios --help' to see available commands.");
                Ok(())
            }
        }
    }
}
