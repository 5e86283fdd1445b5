//! Engine configuration.
//!
//! Layers, later wins: built-in defaults, a YAML file, `ENSAYO_*` environment
//! variables, then whatever the caller sets explicitly (CLI flags).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::overlay::DEFAULT_OVERLAY_ID;
use crate::result::{EnsayoError, EnsayoResult};
use crate::wait::{WaitOptions, DEFAULT_POLL_INTERVAL_MS, DEFAULT_WAIT_TIMEOUT_MS};

/// Environment variable overriding `base_url`
pub const ENV_BASE_URL: &str = "ENSAYO_BASE_URL";
/// Environment variable overriding `timeout_ms`
pub const ENV_TIMEOUT_MS: &str = "ENSAYO_TIMEOUT_MS";
/// Environment variable overriding `headless`
pub const ENV_HEADLESS: &str = "ENSAYO_HEADLESS";

/// When to capture a screenshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScreenshotMode {
    /// Never
    Off,
    /// Only when the scenario fails
    #[default]
    OnlyOnFailure,
    /// Always, at the end of the run
    On,
}

impl ScreenshotMode {
    /// Whether a run with this outcome should be captured
    #[must_use]
    pub const fn should_capture(self, failed: bool) -> bool {
        match self {
            Self::Off => false,
            Self::OnlyOnFailure => failed,
            Self::On => true,
        }
    }
}

/// Video recording policy, passed through to the harness
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VideoMode {
    /// No recording
    #[default]
    Off,
    /// Record every run
    On,
    /// Record, keep only failures
    RetainOnFailure,
}

/// Capture policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Screenshot policy
    pub screenshot: ScreenshotMode,
    /// Video policy
    pub video: VideoMode,
}

/// Browser viewport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    /// Width in CSS pixels
    pub width: u32,
    /// Height in CSS pixels
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
        }
    }
}

/// Everything the engine consumes from its environment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Root that relative navigation targets are joined onto
    pub base_url: Option<String>,
    /// Default deadline for explicit waits and `within` assertions
    pub timeout_ms: u64,
    /// Deadline for the actionability gate
    pub action_timeout_ms: u64,
    /// Polling interval for every wait
    pub poll_interval_ms: u64,
    /// Run the browser without a window
    pub headless: bool,
    /// Screenshot and video policy
    pub capture: CaptureConfig,
    /// Id of the diagnostic overlay container
    pub overlay_id: String,
    /// Browser viewport
    pub viewport: Viewport,
    /// Where captures are written
    pub output_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            action_timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            headless: true,
            capture: CaptureConfig::default(),
            overlay_id: DEFAULT_OVERLAY_ID.to_string(),
            viewport: Viewport::default(),
            output_dir: PathBuf::from("target/ensayo"),
        }
    }
}

impl EngineConfig {
    /// Create default configuration
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse YAML; missing keys keep their defaults
    pub fn from_yaml(yaml: &str) -> EnsayoResult<Self> {
        let config: Self = serde_yaml_ng::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a YAML file
    pub fn load(path: &Path) -> EnsayoResult<Self> {
        let yaml = std::fs::read_to_string(path).map_err(|e| {
            EnsayoError::config(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_yaml(&yaml)
    }

    /// Serialize as YAML
    pub fn to_yaml(&self) -> EnsayoResult<String> {
        Ok(serde_yaml_ng::to_string(self)?)
    }

    /// Apply `ENSAYO_*` variables from the process environment
    pub fn apply_env(&mut self) -> EnsayoResult<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Apply `ENSAYO_*` variables from an arbitrary lookup
    ///
    /// Only malformed values are rejected here. Call [`Self::validate`] once
    /// every layer, flags included, has been applied.
    pub fn apply_env_with(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> EnsayoResult<()> {
        if let Some(url) = lookup(ENV_BASE_URL).filter(|v| !v.is_empty()) {
            self.base_url = Some(url);
        }
        if let Some(raw) = lookup(ENV_TIMEOUT_MS) {
            self.timeout_ms = raw.trim().parse().map_err(|_| {
                EnsayoError::config(format!("{ENV_TIMEOUT_MS} must be an integer, got {raw:?}"))
            })?;
        }
        if let Some(raw) = lookup(ENV_HEADLESS) {
            self.headless = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(EnsayoError::config(format!(
                        "{ENV_HEADLESS} must be true or false, got {raw:?}"
                    )))
                }
            };
        }
        Ok(())
    }

    /// Set the base URL
    #[must_use]
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Set the wait deadline
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set the actionability deadline
    #[must_use]
    pub const fn with_action_timeout(mut self, timeout_ms: u64) -> Self {
        self.action_timeout_ms = timeout_ms;
        self
    }

    /// Set the polling interval
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Set headless mode
    #[must_use]
    pub const fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Reject settings no wait could honour
    pub fn validate(&self) -> EnsayoResult<()> {
        if self.timeout_ms == 0 || self.action_timeout_ms == 0 {
            return Err(EnsayoError::config("timeouts must be greater than zero"));
        }
        if self.poll_interval_ms == 0 {
            return Err(EnsayoError::config("poll_interval_ms must be greater than zero"));
        }
        if self.poll_interval_ms > self.timeout_ms {
            return Err(EnsayoError::config(format!(
                "poll_interval_ms ({}) exceeds timeout_ms ({})",
                self.poll_interval_ms, self.timeout_ms
            )));
        }
        if self.overlay_id.trim().is_empty() || self.overlay_id.contains(char::is_whitespace) {
            return Err(EnsayoError::config("overlay_id must be a single token"));
        }
        if let Some(base) = &self.base_url {
            parse_base(base)?;
        }
        Ok(())
    }

    /// Options for explicit waits
    #[must_use]
    pub const fn wait_options(&self) -> WaitOptions {
        WaitOptions {
            timeout_ms: self.timeout_ms,
            poll_interval_ms: self.poll_interval_ms,
        }
    }

    /// Options for the actionability gate
    #[must_use]
    pub const fn action_wait_options(&self) -> WaitOptions {
        WaitOptions {
            timeout_ms: self.action_timeout_ms,
            poll_interval_ms: self.poll_interval_ms,
        }
    }

    /// Join a navigation target onto `base_url`
    ///
    /// An empty target is the base itself, fragment included.
    pub fn resolve_url(&self, target: &str) -> EnsayoResult<String> {
        match Url::parse(target) {
            Ok(url) => return Ok(url.into()),
            Err(url::ParseError::RelativeUrlWithoutBase) => {}
            Err(err) => {
                return Err(EnsayoError::config(format!("invalid URL {target:?}: {err}")));
            }
        }
        let raw = self.base_url.as_deref().ok_or_else(|| {
            EnsayoError::config(format!("relative URL {target:?} needs a base_url"))
        })?;
        let base = parse_base(raw)?;
        if target.is_empty() {
            return Ok(base.into());
        }
        base.join(target).map(String::from).map_err(|err| {
            EnsayoError::config(format!("cannot join {target:?} onto {raw:?}: {err}"))
        })
    }
}

fn parse_base(raw: &str) -> EnsayoResult<Url> {
    Url::parse(raw).map_err(|err| {
        EnsayoError::config(format!("base_url must be absolute, got {raw:?}: {err}"))
    })
}
