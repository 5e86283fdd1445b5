//! CLI configuration and engine configuration layering

use std::path::{Path, PathBuf};

use ensayo::EngineConfig;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

use crate::error::CliResult;

/// Configuration file picked up from the working directory
pub const DEFAULT_CONFIG_FILE: &str = "ensayo.yaml";

/// CLI verbosity level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Verbosity {
    /// Quiet - minimal output
    Quiet,
    /// Normal - default output
    #[default]
    Normal,
    /// Verbose - extra output
    Verbose,
    /// Debug - maximum output
    Debug,
}

impl Verbosity {
    /// Level from `-q` and the `-v` count
    #[must_use]
    pub const fn from_flags(quiet: bool, verbose: u8) -> Self {
        if quiet {
            return Self::Quiet;
        }
        match verbose {
            0 => Self::Normal,
            1 => Self::Verbose,
            _ => Self::Debug,
        }
    }

    /// Check if quiet mode
    #[must_use]
    pub const fn is_quiet(self) -> bool {
        matches!(self, Self::Quiet)
    }

    /// Check if verbose or higher
    #[must_use]
    pub const fn is_verbose(self) -> bool {
        matches!(self, Self::Verbose | Self::Debug)
    }

    /// Default `tracing` directive when `RUST_LOG` is unset
    #[must_use]
    pub const fn log_directive(self) -> &'static str {
        match self {
            Self::Quiet => "error",
            Self::Normal => "warn",
            Self::Verbose => "ensayo=info,ensayo_cli=info,warn",
            Self::Debug => "ensayo=debug,ensayo_cli=debug,info",
        }
    }
}

/// Color output choice
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ColorChoice {
    /// Always use colors
    Always,
    /// Use colors when output is a terminal
    #[default]
    Auto,
    /// Never use colors
    Never,
}

impl ColorChoice {
    /// Should use colors based on output detection
    #[must_use]
    pub fn should_color(self) -> bool {
        match self {
            Self::Always => true,
            Self::Never => false,
            Self::Auto => console::Term::stderr().features().colors_supported(),
        }
    }
}

/// CLI configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Verbosity level
    pub verbosity: Verbosity,
    /// Color output choice
    pub color: ColorChoice,
    /// Process logs as JSON lines
    pub log_json: bool,
}

impl CliConfig {
    /// Create new default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set verbosity
    #[must_use]
    pub const fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Set color choice
    #[must_use]
    pub const fn with_color(mut self, color: ColorChoice) -> Self {
        self.color = color;
        self
    }

    /// Set JSON log output
    #[must_use]
    pub const fn with_log_json(mut self, log_json: bool) -> Self {
        self.log_json = log_json;
        self
    }

    /// Install the process-wide `tracing` subscriber on stderr
    ///
    /// `RUST_LOG` wins over the verbosity flags. Calling twice is harmless.
    pub fn init_logging(&self) {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.verbosity.log_directive()));
        let builder = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(self.verbosity.is_verbose());
        let _ = if self.log_json {
            builder.json().try_init()
        } else {
            builder.with_ansi(self.color.should_color()).try_init()
        };
    }
}

/// Values from command-line flags, applied last
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineOverrides {
    /// `--base-url`
    pub base_url: Option<String>,
    /// `--timeout-ms`
    pub timeout_ms: Option<u64>,
    /// `--headed`
    pub headed: bool,
    /// `--output-dir`
    pub output_dir: Option<PathBuf>,
}

impl EngineOverrides {
    /// Apply onto `config`
    pub fn apply(&self, config: &mut EngineConfig) {
        if let Some(url) = &self.base_url {
            config.base_url = Some(url.clone());
        }
        if let Some(timeout) = self.timeout_ms {
            config.timeout_ms = timeout;
        }
        if self.headed {
            config.headless = false;
        }
        if let Some(dir) = &self.output_dir {
            config.output_dir.clone_from(dir);
        }
    }
}

/// Effective engine configuration: defaults, file, `ENSAYO_*` environment, flags
///
/// Without an explicit `path`, `ensayo.yaml` in the working directory is used
/// when it exists.
pub fn load_engine_config(
    path: Option<&Path>,
    overrides: &EngineOverrides,
) -> CliResult<EngineConfig> {
    load_engine_config_with(path, overrides, |key| std::env::var(key).ok())
}

/// As [`load_engine_config`], reading the environment through `lookup`
pub fn load_engine_config_with(
    path: Option<&Path>,
    overrides: &EngineOverrides,
    lookup: impl Fn(&str) -> Option<String>,
) -> CliResult<EngineConfig> {
    let default_file = Path::new(DEFAULT_CONFIG_FILE);
    let file = match path {
        Some(p) => Some(p),
        None if default_file.is_file() => Some(default_file),
        None => None,
    };

    let mut config = match file {
        Some(p) => {
            tracing::debug!(path = %p.display(), "loading configuration");
            EngineConfig::load(p)?
        }
        None => EngineConfig::default(),
    };
    config.apply_env_with(lookup)?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}
