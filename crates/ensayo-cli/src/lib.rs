//! Ensayo CLI Library
//!
//! Command-line interface for running and validating Ensayo scenarios.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

mod commands;
mod config;
mod error;
mod output;
mod runner;

pub use commands::{
    Cli, ColorArg, Commands, ConfigArgs, FormatArg, OverrideArgs, RunArgs, ValidateArgs,
};
pub use config::{
    load_engine_config, load_engine_config_with, CliConfig, ColorChoice, EngineOverrides,
    Verbosity, DEFAULT_CONFIG_FILE,
};
pub use error::{CliError, CliResult};
pub use output::{render_report, OutputFormat, ProgressReporter};
pub use runner::{load_scenario, outcome, ScenarioCommand};
