//! Scenario execution for the `run` and `validate` commands

use std::path::Path;

use ensayo::{EngineConfig, Scenario, ScenarioReport};

use crate::error::{CliError, CliResult};
use crate::output::ProgressReporter;

/// Load and validate a scenario file
pub fn load_scenario(path: &Path) -> CliResult<Scenario> {
    if !path.is_file() {
        return Err(CliError::invalid_argument(format!(
            "scenario file not found: {}",
            path.display()
        )));
    }
    Ok(Scenario::load(path)?)
}

/// Runs one scenario in a fresh browser
#[derive(Debug)]
pub struct ScenarioCommand {
    config: EngineConfig,
    trace_steps: bool,
}

impl ScenarioCommand {
    /// Command over an effective configuration
    #[must_use]
    pub const fn new(config: EngineConfig) -> Self {
        Self {
            config,
            trace_steps: true,
        }
    }

    /// Echo completed steps into the overlay (on by default)
    #[must_use]
    pub const fn with_step_trace(mut self, enabled: bool) -> Self {
        self.trace_steps = enabled;
        self
    }

    /// Launch Chromium, run fail-fast, close the browser
    ///
    /// A failed step is reported, not returned as an error; the caller decides
    /// the exit code from [`ScenarioReport::passed`].
    #[cfg(feature = "browser")]
    pub async fn execute(
        &self,
        scenario: &Scenario,
        reporter: &mut ProgressReporter,
    ) -> CliResult<ScenarioReport> {
        use ensayo::{ChromiumDriver, Page, ScenarioRunner};

        reporter.start_spinner(&format!("Launching browser for '{}'", scenario.name));
        let driver = match ChromiumDriver::launch(&self.config).await {
            Ok(driver) => driver,
            Err(err) => {
                reporter.finish();
                return Err(err.into());
            }
        };
        let mut page = Page::new(driver, self.config.clone());

        reporter.finish();
        reporter.start_spinner(&format!("Running '{}'", scenario.name));
        let report = ScenarioRunner::new(&mut page)
            .with_step_trace(self.trace_steps)
            .run(scenario)
            .await;
        reporter.finish();

        if let Err(err) = page.close().await {
            tracing::warn!(error = %err, "closing the browser failed");
        }
        Ok(report)
    }

    /// Browser support is compiled out
    #[cfg(not(feature = "browser"))]
    pub async fn execute(
        &self,
        scenario: &Scenario,
        _reporter: &mut ProgressReporter,
    ) -> CliResult<ScenarioReport> {
        tracing::debug!(
            scenario = %scenario.name,
            headless = self.config.headless,
            trace_steps = self.trace_steps,
            "browser feature disabled"
        );
        Err(CliError::BrowserUnavailable)
    }
}

/// Turn a finished report into the process outcome
pub fn outcome(report: &ScenarioReport) -> CliResult<()> {
    match &report.failure {
        None => Ok(()),
        Some(failure) => Err(CliError::ScenarioFailed {
            scenario: report.scenario.clone(),
            step: failure.step,
            kind: failure.kind,
            message: failure.message.clone(),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::io::Write;

    const VALID: &str = r#"
name: quantity
locators:
  - name: carrot
    selector: '.product:has-text("Carrot")'
  - name: qty
    selector: input.quantity
    within: carrot
steps:
  - type: goto
    url: "https://shop.test/"
  - type: fill
    locator: qty
    value: "5"
"#;

    fn write(yaml: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    mod load_tests {
        use super::*;

        #[test]
        fn test_load_valid_scenario() {
            let file = write(VALID);
            let scenario = load_scenario(file.path()).unwrap();
            assert_eq!(scenario.name, "quantity");
            assert_eq!(scenario.steps.len(), 2);
        }

        #[test]
        fn test_missing_file() {
            let err = load_scenario(Path::new("/no/such/scenario.yaml")).unwrap_err();
            assert!(matches!(err, CliError::InvalidArgument { .. }));
        }

        #[test]
        fn test_bad_selector_is_reported() {
            let file = write(&VALID.replace("input.quantity", "input[quantity"));
            let err = load_scenario(file.path()).unwrap_err();
            assert!(matches!(err, CliError::Engine(_)));
        }
    }

    mod execute_tests {
        use super::*;

        #[cfg(not(feature = "browser"))]
        #[tokio::test]
        async fn test_without_browser_feature() {
            let scenario = Scenario::from_yaml(VALID).unwrap();
            let mut reporter = ProgressReporter::new(false, true);
            let err = ScenarioCommand::new(EngineConfig::default())
                .execute(&scenario, &mut reporter)
                .await
                .unwrap_err();
            assert!(matches!(err, CliError::BrowserUnavailable));
        }
    }
}
