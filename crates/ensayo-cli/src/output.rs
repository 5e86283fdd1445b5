//! Output formatting and progress reporting

use console::{style, Style, Term};
use ensayo::scenario::StepRecord;
use ensayo::{ScenarioReport, StepStatus};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::time::Duration;

use crate::error::CliResult;

/// Output format for scenario reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Progress reporter for scenario execution
#[derive(Debug)]
pub struct ProgressReporter {
    term: Term,
    spinner: Option<ProgressBar>,
    /// Whether to use colors
    pub use_color: bool,
    /// Quiet mode
    pub quiet: bool,
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(true, false)
    }
}

impl ProgressReporter {
    /// Create a new progress reporter
    #[must_use]
    pub fn new(use_color: bool, quiet: bool) -> Self {
        Self {
            term: Term::stderr(),
            spinner: None,
            use_color,
            quiet,
        }
    }

    /// Start a spinner while a scenario runs
    pub fn start_spinner(&mut self, message: &str) {
        if self.quiet {
            return;
        }

        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg} [{elapsed}]")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb.set_message(message.to_string());
        self.spinner = Some(pb);
    }

    /// Stop and clear the spinner
    pub fn finish(&mut self) {
        if let Some(pb) = self.spinner.take() {
            pb.finish_and_clear();
        }
    }

    /// Print a success message
    pub fn success(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("✓").green().bold().to_string()
        } else {
            "PASS".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a failure message
    pub fn failure(&self, message: &str) {
        // Failures print in quiet mode too
        let prefix = if self.use_color {
            style("✗").red().bold().to_string()
        } else {
            "FAIL".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print an info message
    pub fn info(&self, message: &str) {
        if self.quiet {
            return;
        }

        let prefix = if self.use_color {
            style("ℹ").blue().bold().to_string()
        } else {
            "INFO".to_string()
        };

        let _ = self.term.write_line(&format!("{prefix} {message}"));
    }

    /// Print a section header
    pub fn header(&self, title: &str) {
        if self.quiet {
            return;
        }

        let styled = if self.use_color {
            style(title).bold().underlined().to_string()
        } else {
            format!("=== {title} ===")
        };

        let _ = self.term.write_line("");
        let _ = self.term.write_line(&styled);
    }

    /// Print the step summary
    pub fn summary(&self, passed: usize, failed: usize, skipped: usize, duration: Duration) {
        if self.quiet && failed == 0 {
            return;
        }

        let _ = self.term.write_line("");

        let total = passed + failed + skipped;
        let duration_secs = duration.as_secs_f64();

        if self.use_color {
            let passed_style = Style::new().green().bold();
            let failed_style = Style::new().red().bold();
            let skipped_style = Style::new().yellow();

            let status = if failed > 0 {
                failed_style.apply_to("FAILED")
            } else {
                passed_style.apply_to("PASSED")
            };

            let _ = self.term.write_line(&format!(
                "{} {} steps in {:.2}s ({} passed, {} failed, {} skipped)",
                status,
                total,
                duration_secs,
                passed_style.apply_to(passed),
                if failed > 0 {
                    failed_style.apply_to(failed).to_string()
                } else {
                    failed.to_string()
                },
                skipped_style.apply_to(skipped)
            ));
        } else {
            let status = if failed > 0 { "FAILED" } else { "PASSED" };
            let _ = self.term.write_line(&format!(
                "{status} {total} steps in {duration_secs:.2}s \
                 ({passed} passed, {failed} failed, {skipped} skipped)"
            ));
        }
    }

    /// Print every step of a report, then the summary
    pub fn report(&self, report: &ScenarioReport) {
        self.header(&format!("Scenario: {}", report.scenario));
        for step in &report.steps {
            match step.status {
                StepStatus::Passed => self.success(&step_line(step)),
                StepStatus::Failed => self.failure(&step_line(step)),
                StepStatus::Skipped => {
                    if !self.quiet {
                        let _ = self.term.write_line(&format!("- {}", step_line(step)));
                    }
                }
            }
        }
        if let Some(failure) = &report.failure {
            self.failure(&format!("[{}] {}", failure.kind, failure.message));
        }
        if let Some(path) = &report.screenshot {
            self.info(&format!("Screenshot saved to {}", path.display()));
        }
        self.summary(
            report.count(StepStatus::Passed),
            report.count(StepStatus::Failed),
            report.count(StepStatus::Skipped),
            report.duration,
        );
    }
}

fn step_line(step: &StepRecord) -> String {
    format!(
        "{:>3}. {} ({} ms)",
        step.index,
        step.description,
        step.duration.as_millis()
    )
}

/// Render a report for stdout
pub fn render_report(report: &ScenarioReport, format: OutputFormat) -> CliResult<String> {
    match format {
        OutputFormat::Json => Ok(report.to_json()?),
        OutputFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(out, "run {}", report.run_id);
            for entry in &report.log {
                let _ = writeln!(out, "{}", entry.render());
            }
            if !report.variables.is_empty() {
                let _ = writeln!(out, "variables:");
                for (name, value) in &report.variables {
                    let _ = writeln!(out, "  {name} = {value:?}");
                }
            }
            Ok(out)
        }
    }
}
