//! Ensayo: scripted browser interaction with scoped locators, polling waits,
//! and an in-page diagnostic trace.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     ENSAYO Architecture                         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │   ┌────────────┐    ┌────────────┐    ┌────────────────────┐    │
//! │   │ Scenario   │    │ Page       │    │ PageDriver         │    │
//! │   │ (YAML or   │───►│ locators,  │───►│ VirtualPage  |     │    │
//! │   │  Rust)     │    │ waits,     │    │ ChromiumDriver     │    │
//! │   │            │    │ actions,   │    │ (feature browser)  │    │
//! │   │            │    │ asserts,   │    │                    │    │
//! │   │            │    │ overlay    │    │                    │    │
//! │   └────────────┘    └────────────┘    └────────────────────┘    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every step suspends until its effect is observable, and steps of one
//! scenario never overlap. Locators are re-resolved against a fresh snapshot
//! on every use.
//!
//! # Example
//!
//! ```no_run
//! use ensayo::{EngineConfig, Page, VirtualPage, WaitCondition};
//!
//! # async fn demo() -> ensayo::EnsayoResult<()> {
//! let mut page = Page::new(VirtualPage::new(), EngineConfig::default());
//! page.goto("https://rahulshettyacademy.com/seleniumPractise/#/").await?;
//! let search = page.locator(".search-keyword")?;
//! page.wait_for(&search, WaitCondition::Visible).await?;
//! page.fill(&search, "ro").await?;
//! page.log("Searched for ro").await;
//! # Ok(())
//! # }
//! ```

// Lints are configured in workspace Cargo.toml [workspace.lints.clippy]

mod action;
mod assertion;
#[cfg(feature = "browser")]
mod cdp;
mod config;
mod dom;
mod driver;
mod locator;
mod overlay;
mod page;
mod result;
pub mod scenario;
mod selector;
mod virtual_page;
mod wait;

pub use action::{ActionExecutor, ActionKind, ActionOptions, ActionOutcome, ActionRequest};
pub use assertion::{
    observed_value, Assertion, AssertionEngine, AssertionFailure, AssertionKind, AssertionTarget,
    Polarity, Predicate,
};
#[cfg(feature = "browser")]
pub use cdp::{ChromiumDriver, REF_ATTRIBUTE};
pub use config::{
    CaptureConfig, EngineConfig, ScreenshotMode, VideoMode, Viewport, ENV_BASE_URL, ENV_HEADLESS,
    ENV_TIMEOUT_MS,
};
pub use dom::{
    el, normalize_whitespace, BoundingBox, Document, Element, ElementBuilder, ElementRef, NodeId,
    SnapshotNode, Style,
};
pub use driver::{PageDriver, Screenshot};
pub use locator::{Locator, Resolver};
pub use overlay::{DiagnosticLog, LogEntry, DEFAULT_OVERLAY_ID, OVERLAY_STYLE};
pub use page::{Expect, Page};
pub use result::{EnsayoError, EnsayoResult, ErrorKind, MatchCount};
pub use scenario::{Scenario, ScenarioReport, ScenarioRunner, StepStatus};
pub use selector::Selector;
pub use virtual_page::{EventContext, Handler, PageSetup, Site, VirtualPage};
pub use wait::{
    pause, Probe, WaitCondition, WaitOptions, WaitResult, Waiter, DEFAULT_POLL_INTERVAL_MS,
    DEFAULT_WAIT_TIMEOUT_MS,
};

/// Common imports for scenario code
pub mod prelude {
    pub use super::{
        el, ActionOptions, Document, EngineConfig, EnsayoError, EnsayoResult, Locator, Page,
        PageDriver, Scenario, ScenarioRunner, VirtualPage, WaitCondition,
    };
}
