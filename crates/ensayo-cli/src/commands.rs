//! CLI command definitions using clap

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::{ColorChoice, EngineOverrides};
use crate::output::OutputFormat;

/// Ensayo: run declarative browser scenarios with scoped locators and polling waits
#[derive(Parser, Debug)]
#[command(name = "ensayo")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (suppress non-error output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Color output (auto, always, never)
    #[arg(long, default_value = "auto", global = true)]
    pub color: ColorArg,

    /// Emit process logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand to run
    #[command(subcommand)]
    pub command: Commands,
}

/// CLI subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a scenario against a browser
    Run(RunArgs),

    /// Parse and validate a scenario without a browser
    Validate(ValidateArgs),

    /// Print the effective configuration as YAML
    Config(ConfigArgs),
}

/// Options layered over the configuration file and environment
#[derive(Args, Debug, Clone, Default)]
pub struct OverrideArgs {
    /// Configuration file (defaults to ./ensayo.yaml when present)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Base URL relative navigation targets are joined onto
    #[arg(long)]
    pub base_url: Option<String>,

    /// Default wait deadline in milliseconds
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Show the browser window
    #[arg(long)]
    pub headed: bool,

    /// Directory for screenshots
    #[arg(long)]
    pub output_dir: Option<PathBuf>,
}

impl OverrideArgs {
    /// Flags as engine overrides
    #[must_use]
    pub fn overrides(&self) -> EngineOverrides {
        EngineOverrides {
            base_url: self.base_url.clone(),
            timeout_ms: self.timeout_ms,
            headed: self.headed,
            output_dir: self.output_dir.clone(),
        }
    }
}

/// Arguments for the run command
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Scenario YAML file
    pub scenario: PathBuf,

    /// Configuration overrides
    #[command(flatten)]
    pub overrides: OverrideArgs,

    /// Only log failures and scenario messages to the page overlay
    #[arg(long)]
    pub no_trace_steps: bool,

    /// Report format
    #[arg(short, long, default_value = "text")]
    pub format: FormatArg,
}

/// Arguments for the validate command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Scenario YAML file
    pub scenario: PathBuf,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    /// Configuration overrides
    #[command(flatten)]
    pub overrides: OverrideArgs,
}

/// Report format argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum FormatArg {
    /// Human-readable text
    #[default]
    Text,
    /// JSON report on stdout
    Json,
}

impl From<FormatArg> for OutputFormat {
    fn from(arg: FormatArg) -> Self {
        match arg {
            FormatArg::Text => Self::Text,
            FormatArg::Json => Self::Json,
        }
    }
}

/// Color choice argument
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum ColorArg {
    /// Detect terminal
    #[default]
    Auto,
    /// Always color
    Always,
    /// Never color
    Never,
}

impl From<ColorArg> for ColorChoice {
    fn from(arg: ColorArg) -> Self {
        match arg {
            ColorArg::Auto => Self::Auto,
            ColorArg::Always => Self::Always,
            ColorArg::Never => Self::Never,
        }
    }
}
