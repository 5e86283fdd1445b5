//! Diagnostic overlay: a visible, in-page trace of scenario progress.
//!
//! Every message is kept in memory and, best effort, rendered into a fixed
//! container on the page. Driver failures never reach the caller; they are
//! reported through `tracing` and the run continues. The container is keyed
//! by a reserved id that the resolver hides from every locator.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::driver::PageDriver;

/// Reserved id of the overlay container
pub const DEFAULT_OVERLAY_ID: &str = "ensayo-test-log";

/// Inline style of the overlay container
pub const OVERLAY_STYLE: &str = "position: fixed; bottom: 10px; right: 10px; \
    background: rgba(0, 0, 0, 0.7); color: white; padding: 10px; z-index: 9999; \
    max-width: 300px; font: 14px sans-serif; border-radius: 5px; pointer-events: none; \
    overflow-y: auto; max-height: 90vh;";

/// One logged line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Creation order, starting at 0
    pub seq: u64,
    /// Offset from the start of the page lifetime
    #[serde(with = "crate::wait::millis")]
    pub elapsed: Duration,
    /// Wall-clock time
    pub timestamp: DateTime<Utc>,
    /// Message as given by the caller
    pub message: String,
}

impl LogEntry {
    /// Text rendered into the overlay
    #[must_use]
    pub fn render(&self) -> String {
        format!(
            "[{} +{:.1}s] {}",
            self.timestamp.format("%H:%M:%S"),
            self.elapsed.as_secs_f64(),
            self.message
        )
    }
}

/// Append-only diagnostic log scoped to one page
#[derive(Debug)]
pub struct DiagnosticLog {
    overlay_id: String,
    started: Instant,
    entries: Vec<LogEntry>,
    creations: usize,
    closed: bool,
}

impl Default for DiagnosticLog {
    fn default() -> Self {
        Self::new(DEFAULT_OVERLAY_ID)
    }
}

impl DiagnosticLog {
    /// New log rendering into the container with this id
    #[must_use]
    pub fn new(overlay_id: impl Into<String>) -> Self {
        Self {
            overlay_id: overlay_id.into(),
            started: Instant::now(),
            entries: Vec::new(),
            creations: 0,
            closed: false,
        }
    }

    /// Container id
    #[must_use]
    pub fn overlay_id(&self) -> &str {
        &self.overlay_id
    }

    /// Entries in creation order
    #[must_use]
    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Times the container had to be created (once per loaded document)
    #[must_use]
    pub const fn creations(&self) -> usize {
        self.creations
    }

    /// Whether the owning page was closed
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    /// Record a message and render it on the page. Never fails.
    pub async fn log<D: PageDriver + ?Sized>(&mut self, driver: &D, message: &str) {
        let entry = LogEntry {
            seq: self.entries.len() as u64,
            elapsed: self.started.elapsed(),
            timestamp: Utc::now(),
            message: message.to_string(),
        };
        tracing::info!(target: "ensayo::overlay", seq = entry.seq, "{}", entry.message);
        let line = entry.render();
        self.entries.push(entry);
        if self.closed {
            return;
        }
        if let Err(err) = self.render_line(driver, &line).await {
            tracing::warn!(overlay = %self.overlay_id, error = %err, "overlay update failed");
        }
    }

    async fn render_line<D: PageDriver + ?Sized>(
        &mut self,
        driver: &D,
        line: &str,
    ) -> crate::result::EnsayoResult<()> {
        if driver.ensure_overlay(&self.overlay_id).await? {
            self.creations += 1;
            tracing::debug!(overlay = %self.overlay_id, "overlay created");
        }
        driver.append_overlay_line(&self.overlay_id, line).await
    }

    /// Stop rendering; entries stay readable
    pub fn close(&mut self) {
        self.closed = true;
    }
}
