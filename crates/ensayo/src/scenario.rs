//! Declarative scenarios: YAML in, ordered steps out, a report at the end.
//!
//! ```yaml
//! name: carrot-quantity
//! url: ""
//! locators:
//!   - name: carrot
//!     selector: '.product:has-text("Carrot")'
//!   - name: carrot_qty
//!     selector: input.quantity
//!     within: carrot
//! steps:
//!   - type: goto
//!   - type: fill
//!     locator: carrot_qty
//!     value: "5"
//!   - type: read
//!     locator: carrot_qty
//!     into: qty
//!   - type: expect_var
//!     var: qty
//!     equals: "5"
//!   - type: log
//!     message: "Carrot quantity is ${qty}"
//! ```
//!
//! Steps run strictly one after another. The first error stops the run; the
//! remaining steps are reported as skipped and everything logged so far stays
//! on the page.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

use crate::action::ActionOptions;
use crate::driver::PageDriver;
use crate::locator::Locator;
use crate::overlay::LogEntry;
use crate::page::Page;
use crate::result::{EnsayoError, EnsayoResult, ErrorKind};
use crate::wait::WaitCondition;

#[allow(clippy::expect_used)]
fn var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("variable pattern is valid")
    })
}

/// Names of the `${var}` references in `text`, in order of appearance
#[must_use]
pub fn referenced_vars(text: &str) -> Vec<String> {
    var_pattern()
        .captures_iter(text)
        .map(|c| c[1].to_string())
        .collect()
}

/// Replace `${var}` references; unknown names are left as written
#[must_use]
pub fn interpolate(text: &str, vars: &BTreeMap<String, String>) -> String {
    var_pattern()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            vars.get(&caps[1])
                .cloned()
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// A named locator definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocatorDef {
    /// Name steps refer to
    pub name: String,
    /// Selector expression
    pub selector: String,
    /// Locator this one searches inside
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub within: Option<String>,
}

/// Element state for `wait_for`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitState {
    Attached,
    Detached,
    Visible,
    Hidden,
}

impl From<WaitState> for WaitCondition {
    fn from(state: WaitState) -> Self {
        match state {
            WaitState::Attached => Self::Attached,
            WaitState::Detached => Self::Detached,
            WaitState::Visible => Self::Visible,
            WaitState::Hidden => Self::Hidden,
        }
    }
}

/// What `read` takes from the element
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadProperty {
    /// Form field value
    #[default]
    Value,
    /// Raw subtree text
    Text,
}

const fn one() -> u32 {
    1
}

/// One scenario step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Step {
    /// Navigate; empty means the scenario `url`
    Goto {
        #[serde(default)]
        url: String,
    },
    /// Wait for an element state
    WaitFor {
        locator: String,
        state: WaitState,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },
    /// Fixed delay
    Pause { ms: u64 },
    /// Replace a field's value
    Fill { locator: String, value: String },
    /// Click, optionally forced or repeated
    Click {
        locator: String,
        #[serde(default)]
        force: bool,
        #[serde(default = "one")]
        repeat: u32,
        #[serde(default)]
        delay_ms: u64,
    },
    /// Click a stepper control
    Increment {
        locator: String,
        #[serde(default = "one")]
        times: u32,
        #[serde(default)]
        delay_ms: u64,
    },
    /// Store a value or text in a variable; never asserted
    Read {
        locator: String,
        into: String,
        #[serde(default)]
        property: ReadProperty,
    },
    /// Assert against a locator; exactly one predicate
    Expect {
        locator: String,
        #[serde(default)]
        contains_text: Option<String>,
        #[serde(default)]
        equals: Option<String>,
        #[serde(default)]
        visible: Option<bool>,
        #[serde(default)]
        negate: bool,
        #[serde(default)]
        within_ms: Option<u64>,
    },
    /// Assert against a variable read earlier
    ExpectVar {
        var: String,
        equals: String,
        #[serde(default)]
        negate: bool,
    },
    /// Append to the diagnostic overlay
    Log { message: String },
}

impl Step {
    /// Short description used in reports and progress lines
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Goto { url } if url.is_empty() => "goto".to_string(),
            Self::Goto { url } => format!("goto {url}"),
            Self::WaitFor { locator, state, .. } => {
                format!("wait_for {locator} {}", WaitCondition::from(*state))
            }
            Self::Pause { ms } => format!("pause {ms}ms"),
            Self::Fill { locator, value } => format!("fill {locator} = {value:?}"),
            Self::Click {
                locator,
                force,
                repeat,
                ..
            } => {
                let mut s = format!("click {locator}");
                if *repeat > 1 {
                    s.push_str(&format!(" x{repeat}"));
                }
                if *force {
                    s.push_str(" (force)");
                }
                s
            }
            Self::Increment { locator, times, .. } => format!("increment {locator} x{times}"),
            Self::Read {
                locator,
                into,
                property,
            } => {
                let what = match property {
                    ReadProperty::Value => "value",
                    ReadProperty::Text => "text",
                };
                format!("read {what} of {locator} into {into}")
            }
            Self::Expect {
                locator, negate, ..
            } => {
                if *negate {
                    format!("expect not {locator}")
                } else {
                    format!("expect {locator}")
                }
            }
            Self::ExpectVar { var, equals, negate } => {
                let op = if *negate { "!=" } else { "==" };
                format!("expect_var {var} {op} {equals:?}")
            }
            Self::Log { message } => format!("log {message:?}"),
        }
    }

    fn locator_name(&self) -> Option<&str> {
        match self {
            Self::WaitFor { locator, .. }
            | Self::Fill { locator, .. }
            | Self::Click { locator, .. }
            | Self::Increment { locator, .. }
            | Self::Read { locator, .. }
            | Self::Expect { locator, .. } => Some(locator),
            Self::Goto { .. } | Self::Pause { .. } | Self::ExpectVar { .. } | Self::Log { .. } => {
                None
            }
        }
    }

    /// Text fields that may carry `${var}` references
    fn interpolated(&self) -> Vec<&str> {
        match self {
            Self::Fill { value, .. } => vec![value],
            Self::Log { message } => vec![message],
            Self::ExpectVar { equals, .. } => vec![equals],
            Self::Expect {
                contains_text,
                equals,
                ..
            } => contains_text
                .iter()
                .chain(equals.iter())
                .map(String::as_str)
                .collect(),
            _ => Vec::new(),
        }
    }
}

/// A parsed scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scenario {
    /// Scenario name
    pub name: String,
    /// Free-form description
    #[serde(default)]
    pub description: String,
    /// Start URL, joined onto the configured base URL
    #[serde(default)]
    pub url: String,
    /// Named locators; a `within` must name an earlier entry
    #[serde(default)]
    pub locators: Vec<LocatorDef>,
    /// Ordered steps
    pub steps: Vec<Step>,
}

impl Scenario {
    /// Parse and validate
    pub fn from_yaml(yaml: &str) -> EnsayoResult<Self> {
        let scenario: Self = serde_yaml_ng::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Read, parse, and validate a scenario file
    pub fn load(path: &std::path::Path) -> EnsayoResult<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml(&yaml)
    }

    /// Check structure without touching a page
    pub fn validate(&self) -> EnsayoResult<()> {
        if self.name.trim().is_empty() {
            return Err(EnsayoError::scenario("scenario name must not be empty"));
        }
        if self.steps.is_empty() {
            return Err(EnsayoError::scenario(format!(
                "scenario '{}' has no steps",
                self.name
            )));
        }
        let locators = self.locators()?;

        let mut read: BTreeSet<&str> = BTreeSet::new();
        for (index, step) in self.steps.iter().enumerate() {
            let at = |message: String| {
                let step_no = index + 1;
                EnsayoError::scenario(format!("step {step_no} ({}): {message}", step.describe()))
            };
            if let Some(name) = step.locator_name() {
                if !locators.contains_key(name) {
                    return Err(at(format!("unknown locator '{name}'")));
                }
            }
            for text in step.interpolated() {
                for var in referenced_vars(text) {
                    if !read.contains(var.as_str()) {
                        return Err(at(format!("variable '{var}' is used before it is read")));
                    }
                }
            }
            match step {
                Step::Expect {
                    contains_text,
                    equals,
                    visible,
                    ..
                } => {
                    let predicates = usize::from(contains_text.is_some())
                        + usize::from(equals.is_some())
                        + usize::from(visible.is_some());
                    if predicates != 1 {
                        let message = "expect needs exactly one of contains_text, equals, visible";
                        return Err(at(message.to_string()));
                    }
                }
                Step::ExpectVar { var, .. } if !read.contains(var.as_str()) => {
                    return Err(at(format!("variable '{var}' is used before it is read")));
                }
                Step::Click { repeat: 0, .. } => {
                    return Err(at("repeat must be at least 1".to_string()));
                }
                Step::Increment { times: 0, .. } => {
                    return Err(at("times must be at least 1".to_string()));
                }
                Step::Read { into, .. } => {
                    read.insert(into);
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Build every named locator, scopes included
    pub fn locators(&self) -> EnsayoResult<HashMap<String, Locator>> {
        let mut built: HashMap<String, Locator> = HashMap::new();
        for def in &self.locators {
            if built.contains_key(&def.name) {
                return Err(EnsayoError::scenario(format!(
                    "locator '{}' is defined twice",
                    def.name
                )));
            }
            let locator = match &def.within {
                None => Locator::new(&def.selector)?,
                Some(parent) => built
                    .get(parent)
                    .ok_or_else(|| {
                        EnsayoError::scenario(format!(
                            "locator '{}' is scoped within '{parent}', \
                             which is not defined before it",
                            def.name
                        ))
                    })?
                    .locator(&def.selector)?,
            };
            built.insert(def.name.clone(), locator);
        }
        Ok(built)
    }
}

/// Outcome of one step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Passed,
    Failed,
    /// Not run because an earlier step failed
    Skipped,
}

/// Report line for one step
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    /// 1-based position
    pub index: usize,
    /// Human-readable step
    pub description: String,
    /// Outcome
    pub status: StepStatus,
    /// Time spent in the step
    #[serde(with = "crate::wait::millis")]
    pub duration: Duration,
}

/// The error that stopped a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    /// 1-based step that raised it
    pub step: usize,
    /// Error family
    pub kind: ErrorKind,
    /// Rendered error
    pub message: String,
}

/// Serialisable result of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioReport {
    /// Unique run id
    pub run_id: Uuid,
    /// Scenario name
    pub scenario: String,
    /// Whether every step passed
    pub passed: bool,
    /// Wall-clock start
    pub started_at: DateTime<Utc>,
    /// Total run time
    #[serde(with = "crate::wait::millis")]
    pub duration: Duration,
    /// Per-step records in order
    pub steps: Vec<StepRecord>,
    /// First error, if any
    pub failure: Option<FailureRecord>,
    /// Values captured by `read` steps
    pub variables: BTreeMap<String, String>,
    /// Diagnostic overlay entries
    pub log: Vec<LogEntry>,
    /// Screenshot written on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<PathBuf>,
}

impl ScenarioReport {
    /// Steps with the given status
    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// Pretty JSON
    pub fn to_json(&self) -> EnsayoResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Runs scenarios against one page
#[derive(Debug)]
pub struct ScenarioRunner<'p, D: PageDriver> {
    page: &'p mut Page<D>,
    trace_steps: bool,
}

impl<'p, D: PageDriver> ScenarioRunner<'p, D> {
    /// Runner over `page`
    pub fn new(page: &'p mut Page<D>) -> Self {
        Self {
            page,
            trace_steps: true,
        }
    }

    /// Echo every completed step into the overlay (on by default)
    ///
    /// Failures are always logged; this only silences the `✓` lines.
    #[must_use]
    pub const fn with_step_trace(mut self, enabled: bool) -> Self {
        self.trace_steps = enabled;
        self
    }

    /// Execute `scenario` fail-fast and report
    pub async fn run(&mut self, scenario: &Scenario) -> ScenarioReport {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("scenario", name = %scenario.name, %run_id);
        self.run_steps(scenario, run_id).instrument(span).await
    }

    async fn run_steps(&mut self, scenario: &Scenario, run_id: Uuid) -> ScenarioReport {
        let started_at = Utc::now();
        let start = Instant::now();
        tracing::info!(steps = scenario.steps.len(), "scenario started");

        let mut vars = BTreeMap::new();
        let mut steps = Vec::with_capacity(scenario.steps.len());
        let mut failure = None;

        let locators = match scenario.locators() {
            Ok(locators) => locators,
            Err(err) => {
                failure = Some(FailureRecord {
                    step: 0,
                    kind: err.kind(),
                    message: err.to_string(),
                });
                HashMap::new()
            }
        };

        for (i, step) in scenario.steps.iter().enumerate() {
            let index = i + 1;
            let description = step.describe();
            if failure.is_some() {
                steps.push(StepRecord {
                    index,
                    description,
                    status: StepStatus::Skipped,
                    duration: Duration::ZERO,
                });
                continue;
            }
            let step_start = Instant::now();
            let result = self.execute(scenario, step, &locators, &mut vars).await;
            let duration = step_start.elapsed();
            match result {
                Ok(()) => {
                    tracing::info!(step = index, %description, ?duration, "step passed");
                    if self.trace_steps && !matches!(step, Step::Log { .. }) {
                        self.page.log(&format!("✓ {index}. {description}")).await;
                    }
                    steps.push(StepRecord {
                        index,
                        description,
                        status: StepStatus::Passed,
                        duration,
                    });
                }
                Err(err) => {
                    tracing::error!(
                        step = index,
                        %description,
                        kind = %err.kind(),
                        error = %err,
                        "step failed"
                    );
                    self.page
                        .log(&format!("✗ {index}. {description}: {err}"))
                        .await;
                    failure = Some(FailureRecord {
                        step: index,
                        kind: err.kind(),
                        message: err.to_string(),
                    });
                    steps.push(StepRecord {
                        index,
                        description,
                        status: StepStatus::Failed,
                        duration,
                    });
                }
            }
        }

        let passed = failure.is_none();
        let screenshot = self.capture(scenario, run_id, !passed).await;
        let duration = start.elapsed();
        if passed {
            tracing::info!(?duration, "scenario passed");
        } else {
            tracing::warn!(?duration, "scenario failed");
        }

        ScenarioReport {
            run_id,
            scenario: scenario.name.clone(),
            passed,
            started_at,
            duration,
            steps,
            failure,
            variables: vars,
            log: self.page.diagnostics().entries().to_vec(),
            screenshot,
        }
    }

    async fn execute(
        &mut self,
        scenario: &Scenario,
        step: &Step,
        locators: &HashMap<String, Locator>,
        vars: &mut BTreeMap<String, String>,
    ) -> EnsayoResult<()> {
        let lookup = |name: &str| {
            locators
                .get(name)
                .ok_or_else(|| EnsayoError::scenario(format!("unknown locator '{name}'")))
        };
        match step {
            Step::Goto { url } => {
                let target = if url.is_empty() { &scenario.url } else { url };
                self.page.goto(target).await
            }
            Step::WaitFor {
                locator,
                state,
                timeout_ms,
            } => {
                let loc = lookup(locator)?;
                let condition = WaitCondition::from(*state);
                match timeout_ms {
                    Some(ms) => {
                        self.page
                            .wait_for_within(loc, condition, Duration::from_millis(*ms))
                            .await?
                    }
                    None => self.page.wait_for(loc, condition).await?,
                };
                Ok(())
            }
            Step::Pause { ms } => {
                self.page.pause(Duration::from_millis(*ms)).await;
                Ok(())
            }
            Step::Fill { locator, value } => {
                let value = interpolate(value, vars);
                self.page.fill(lookup(locator)?, &value).await.map(drop)
            }
            Step::Click {
                locator,
                force,
                repeat,
                delay_ms,
            } => {
                let loc = lookup(locator)?;
                let options = ActionOptions::new()
                    .with_force(*force)
                    .with_delay_between(Duration::from_millis(*delay_ms));
                for i in 0..*repeat {
                    if i > 0 && !options.delay_between.is_zero() {
                        self.page.pause(options.delay_between).await;
                    }
                    self.page.click_with(loc, options).await?;
                }
                Ok(())
            }
            Step::Increment {
                locator,
                times,
                delay_ms,
            } => {
                let options =
                    ActionOptions::new().with_delay_between(Duration::from_millis(*delay_ms));
                self.page
                    .increment(lookup(locator)?, *times, options)
                    .await
                    .map(drop)
            }
            Step::Read {
                locator,
                into,
                property,
            } => {
                let loc = lookup(locator)?;
                let value = match property {
                    ReadProperty::Value => self.page.input_value(loc).await?,
                    ReadProperty::Text => self.page.text_content(loc).await?,
                };
                tracing::info!(var = %into, %value, "read");
                vars.insert(into.clone(), value);
                Ok(())
            }
            Step::Expect {
                locator,
                contains_text,
                equals,
                visible,
                negate,
                within_ms,
            } => {
                let mut expect = self.page.expect(lookup(locator)?);
                if *negate {
                    expect = expect.not();
                }
                if let Some(ms) = within_ms {
                    expect = expect.within(Duration::from_millis(*ms));
                }
                if let Some(text) = contains_text {
                    expect.to_contain_text(&interpolate(text, vars)).await
                } else if let Some(value) = equals {
                    expect.to_equal(&interpolate(value, vars)).await
                } else if let Some(want) = visible {
                    if *want {
                        expect.to_be_visible().await
                    } else {
                        expect.not().to_be_visible().await
                    }
                } else {
                    Err(EnsayoError::scenario("expect step has no predicate"))
                }
            }
            Step::ExpectVar { var, equals, negate } => {
                let value = vars.get(var).ok_or_else(|| {
                    EnsayoError::scenario(format!("variable '{var}' was never read"))
                })?;
                let expect = self.page.expect_value(var, value);
                let expect = if *negate { expect.not() } else { expect };
                expect.to_equal(&interpolate(equals, vars)).await
            }
            Step::Log { message } => {
                self.page.log(&interpolate(message, vars)).await;
                Ok(())
            }
        }
    }

    async fn capture(
        &self,
        scenario: &Scenario,
        run_id: Uuid,
        failed: bool,
    ) -> Option<PathBuf> {
        let config = self.page.config();
        if !config.capture.screenshot.should_capture(failed) {
            return None;
        }
        let file = format!("{}-{}.png", slug(&scenario.name), run_id.simple());
        let path = config.output_dir.join(file);
        let saved = match self.page.screenshot().await {
            Ok(shot) => shot.save(&path),
            Err(err) => Err(err),
        };
        match saved {
            Ok(()) => {
                tracing::info!(path = %path.display(), "screenshot saved");
                Some(path)
            }
            Err(err) => {
                tracing::warn!(error = %err, "screenshot capture failed");
                None
            }
        }
    }
}

fn slug(name: &str) -> String {
    let s: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect();
    s.trim_matches('-').to_string()
}
