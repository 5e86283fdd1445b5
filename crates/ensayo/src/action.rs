//! Action execution behind the actionability gate.
//!
//! Before dispatching, the executor polls until the target resolves to
//! exactly one element that is visible, enabled, and not covered by another
//! element. `force` skips everything but attachment. When the gate does not
//! open in time the step fails with [`EnsayoError::Action`] naming the last
//! reason it was closed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::dom::ElementRef;
use crate::driver::PageDriver;
use crate::locator::{Locator, Resolver};
use crate::result::{EnsayoError, EnsayoResult};
use crate::wait::{Probe, Waiter};

/// What to do with the target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Replace the value
    Fill(String),
    /// Pointer activation
    Click,
    /// Click the control `times` times
    Increment {
        /// Number of clicks
        times: u32,
    },
}

impl ActionKind {
    /// Short name used in errors and logs
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Fill(_) => "fill",
            Self::Click => "click",
            Self::Increment { .. } => "increment",
        }
    }
}

/// Per-action options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActionOptions {
    /// Bypass visibility, enabled, and occlusion checks
    pub force: bool,
    /// Gate deadline; the executor default when `None`
    pub timeout_ms: Option<u64>,
    /// Pause between repeated clicks
    pub delay_between: Duration,
}

impl ActionOptions {
    /// Create default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bypass the actionability gate
    #[must_use]
    pub const fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    /// Override the gate deadline
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    /// Pause between repeated clicks
    #[must_use]
    pub const fn with_delay_between(mut self, delay: Duration) -> Self {
        self.delay_between = delay;
        self
    }
}

/// A typed action against a locator
#[derive(Debug, Clone)]
pub struct ActionRequest {
    /// Target
    pub target: Locator,
    /// Action
    pub kind: ActionKind,
    /// Options
    pub options: ActionOptions,
}

impl ActionRequest {
    /// Fill request
    #[must_use]
    pub fn fill(target: &Locator, value: impl Into<String>) -> Self {
        Self::new(target, ActionKind::Fill(value.into()))
    }

    /// Click request
    #[must_use]
    pub fn click(target: &Locator) -> Self {
        Self::new(target, ActionKind::Click)
    }

    /// Increment request
    #[must_use]
    pub fn increment(target: &Locator, times: u32) -> Self {
        Self::new(target, ActionKind::Increment { times })
    }

    fn new(target: &Locator, kind: ActionKind) -> Self {
        Self {
            target: target.clone(),
            kind,
            options: ActionOptions::default(),
        }
    }

    /// Replace the options
    #[must_use]
    pub const fn with_options(mut self, options: ActionOptions) -> Self {
        self.options = options;
        self
    }
}

/// What a completed action did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOutcome {
    /// Events dispatched (clicks or fills)
    pub dispatched: u32,
    /// Time from request to completion, gate included
    pub elapsed: Duration,
}

/// Runs [`ActionRequest`]s against a driver
#[derive(Debug)]
pub struct ActionExecutor<'a, D: PageDriver + ?Sized> {
    driver: &'a D,
    waiter: Waiter,
    exclude_id: Option<String>,
}

impl<'a, D: PageDriver + ?Sized> ActionExecutor<'a, D> {
    /// Executor using `waiter` for the gate
    #[must_use]
    pub fn new(driver: &'a D, waiter: Waiter) -> Self {
        Self {
            driver,
            waiter,
            exclude_id: None,
        }
    }

    /// Hide the subtree with this id from resolution
    #[must_use]
    pub fn excluding_id(mut self, html_id: impl Into<String>) -> Self {
        let id = html_id.into();
        self.waiter = self.waiter.excluding_id(id.clone());
        self.exclude_id = Some(id);
        self
    }

    /// Gate, then dispatch
    pub async fn perform(&self, request: &ActionRequest) -> EnsayoResult<ActionOutcome> {
        let start = Instant::now();
        let name = request.kind.name();
        let target = request.target.to_string();
        tracing::debug!(action = name, %target, force = request.options.force, "performing action");

        let dispatched = match &request.kind {
            ActionKind::Fill(value) => {
                let handle = self.gate(request, true).await?;
                self.driver
                    .fill(handle, value)
                    .await
                    .map_err(|e| dispatch_error(name, &target, e))?;
                1
            }
            ActionKind::Click => {
                let handle = self.gate(request, false).await?;
                self.driver
                    .click(handle)
                    .await
                    .map_err(|e| dispatch_error(name, &target, e))?;
                1
            }
            ActionKind::Increment { times } => {
                for i in 0..*times {
                    if i > 0 && !request.options.delay_between.is_zero() {
                        tokio::time::sleep(request.options.delay_between).await;
                    }
                    let handle = self.gate(request, false).await?;
                    self.driver
                        .click(handle)
                        .await
                        .map_err(|e| dispatch_error(name, &target, e))?;
                }
                *times
            }
        };

        Ok(ActionOutcome {
            dispatched,
            elapsed: start.elapsed(),
        })
    }

    /// Poll until the target is actionable and return its handle
    async fn gate(&self, request: &ActionRequest, editable: bool) -> EnsayoResult<ElementRef> {
        let waiter = match request.options.timeout_ms {
            Some(ms) => Waiter::new(self.waiter.options().with_timeout(ms)),
            None => self.waiter.clone(),
        };
        let check = Gate {
            action: request.kind.name(),
            target: request.target.to_string(),
            locator: &request.target,
            force: request.options.force,
            editable,
            exclude: self.exclude_id.as_deref(),
        };
        let (handle, _) = waiter
            .poll("actionable", &check.target, || check.probe(self.driver))
            .await?;
        Ok(handle)
    }
}

/// One actionability check
struct Gate<'a> {
    action: &'static str,
    target: String,
    locator: &'a Locator,
    force: bool,
    editable: bool,
    exclude: Option<&'a str>,
}

impl Gate<'_> {
    fn closed(&self, reason: &str) -> Probe<ElementRef> {
        Probe::Retry(EnsayoError::action(self.action, &self.target, reason))
    }

    async fn probe<D: PageDriver + ?Sized>(&self, driver: &D) -> EnsayoResult<Probe<ElementRef>> {
        let doc = driver.snapshot().await?;
        let mut resolver = Resolver::new(&doc);
        if let Some(id) = self.exclude {
            resolver = resolver.excluding_id(id);
        }
        let Some(node) = resolver.optional(self.locator)? else {
            return Ok(self.closed("element is not attached"));
        };
        let Some(el) = doc.element(node) else {
            return Ok(self.closed("element is not attached"));
        };
        if !self.force {
            if !doc.is_visible(node) {
                return Ok(self.closed("element is not visible"));
            }
            if !doc.is_enabled(node) {
                return Ok(self.closed("element is disabled"));
            }
            if el.obscured {
                return Ok(self.closed("element is obscured by another element"));
            }
            if self.editable && !el.is_editable() {
                return Ok(self.closed("element is not editable"));
            }
        }
        Ok(Probe::Ready(el.handle))
    }
}

fn dispatch_error(action: &str, target: &str, err: EnsayoError) -> EnsayoError {
    match err {
        EnsayoError::Driver { message } => EnsayoError::action(action, target, message),
        other => other,
    }
}
