//! Page facade: one driver, one configuration, one diagnostic log.
//!
//! `Page` is what scenario code talks to. Every method is a suspension point
//! and steps are awaited one after another; nothing here is shared between
//! pages.
//!
//! # Example
//!
//! ```no_run
//! use ensayo::{EngineConfig, Page, VirtualPage, EnsayoResult};
//!
//! async fn add_carrot(page: &mut Page<VirtualPage>) -> EnsayoResult<()> {
//!     let card = page.locator(".product:has-text(\"Carrot\")")?;
//!     let qty = card.locator("input.quantity")?;
//!     page.fill(&qty, "5").await?;
//!     page.expect(&qty).to_equal("5").await?;
//!     page.log("Set Carrot quantity to 5").await;
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use crate::action::{ActionExecutor, ActionOptions, ActionOutcome, ActionRequest};
use crate::assertion::{
    observed_value, Assertion, AssertionEngine, AssertionTarget, Polarity, Predicate,
};
use crate::config::EngineConfig;
use crate::driver::{PageDriver, Screenshot};
use crate::locator::{Locator, Resolver};
use crate::overlay::DiagnosticLog;
use crate::result::{EnsayoError, EnsayoResult};
use crate::wait::{pause, Probe, WaitCondition, WaitResult, Waiter};

/// Scenario-facing page handle
#[derive(Debug)]
pub struct Page<D: PageDriver> {
    driver: D,
    config: EngineConfig,
    log: DiagnosticLog,
}

impl<D: PageDriver> Page<D> {
    /// Wrap a driver
    #[must_use]
    pub fn new(driver: D, config: EngineConfig) -> Self {
        let log = DiagnosticLog::new(config.overlay_id.clone());
        Self {
            driver,
            config,
            log,
        }
    }

    /// Underlying driver
    #[must_use]
    pub const fn driver(&self) -> &D {
        &self.driver
    }

    /// Effective configuration
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Diagnostic log
    #[must_use]
    pub const fn diagnostics(&self) -> &DiagnosticLog {
        &self.log
    }

    fn waiter(&self) -> Waiter {
        Waiter::new(self.config.wait_options()).excluding_id(self.config.overlay_id.clone())
    }

    fn executor(&self) -> ActionExecutor<'_, D> {
        ActionExecutor::new(&self.driver, Waiter::new(self.config.action_wait_options()))
            .excluding_id(self.config.overlay_id.clone())
    }

    fn assertions(&self) -> AssertionEngine<'_, D> {
        AssertionEngine::new(&self.driver).excluding_id(self.config.overlay_id.clone())
    }

    /// Root-level locator
    pub fn locator(&self, expression: &str) -> EnsayoResult<Locator> {
        Locator::new(expression)
    }

    /// Navigate; relative targets are joined onto `base_url`
    pub async fn goto(&self, target: &str) -> EnsayoResult<()> {
        let url = self.config.resolve_url(target)?;
        tracing::info!(%url, "navigating");
        self.driver.goto(&url).await.map_err(|err| match err {
            EnsayoError::Navigation { .. } => err,
            other => EnsayoError::Navigation {
                url: url.clone(),
                message: other.to_string(),
            },
        })
    }

    /// Current URL
    pub async fn url(&self) -> EnsayoResult<String> {
        self.driver.current_url().await
    }

    /// Wait with the configured deadline
    pub async fn wait_for(
        &self,
        locator: &Locator,
        condition: WaitCondition,
    ) -> EnsayoResult<WaitResult> {
        self.waiter().wait_for(&self.driver, locator, condition).await
    }

    /// Wait with an explicit deadline
    pub async fn wait_for_within(
        &self,
        locator: &Locator,
        condition: WaitCondition,
        timeout: Duration,
    ) -> EnsayoResult<WaitResult> {
        let waiter = Waiter::new(
            self.config
                .wait_options()
                .with_timeout(timeout.as_millis() as u64),
        )
        .excluding_id(self.config.overlay_id.clone());
        waiter.wait_for(&self.driver, locator, condition).await
    }

    /// Fixed delay; prefer [`Page::wait_for`] when a signal exists
    pub async fn pause(&self, duration: Duration) -> WaitResult {
        pause(duration).await
    }

    /// Run an action request
    pub async fn perform(&self, request: &ActionRequest) -> EnsayoResult<ActionOutcome> {
        self.executor().perform(request).await
    }

    /// Replace the value of a form field
    pub async fn fill(&self, locator: &Locator, value: &str) -> EnsayoResult<ActionOutcome> {
        self.perform(&ActionRequest::fill(locator, value)).await
    }

    /// Click once
    pub async fn click(&self, locator: &Locator) -> EnsayoResult<ActionOutcome> {
        self.perform(&ActionRequest::click(locator)).await
    }

    /// Click with options (force, timeout)
    pub async fn click_with(
        &self,
        locator: &Locator,
        options: ActionOptions,
    ) -> EnsayoResult<ActionOutcome> {
        self.perform(&ActionRequest::click(locator).with_options(options))
            .await
    }

    /// Click a stepper control `times` times
    pub async fn increment(
        &self,
        locator: &Locator,
        times: u32,
        options: ActionOptions,
    ) -> EnsayoResult<ActionOutcome> {
        self.perform(&ActionRequest::increment(locator, times).with_options(options))
            .await
    }

    /// Read a form field's current value once it is attached
    pub async fn input_value(&self, locator: &Locator) -> EnsayoResult<String> {
        self.read(locator, "input_value", true).await
    }

    /// Read the raw subtree text once the element is attached
    pub async fn text_content(&self, locator: &Locator) -> EnsayoResult<String> {
        self.read(locator, "text_content", false).await
    }

    async fn read(&self, locator: &Locator, what: &str, form_value: bool) -> EnsayoResult<String> {
        let target = locator.to_string();
        let overlay = self.config.overlay_id.as_str();
        let driver = &self.driver;
        let waiter = Waiter::new(self.config.action_wait_options());
        let (value, _) = waiter
            .poll("attached", &target, || async move {
                let doc = driver.snapshot().await?;
                let resolver = Resolver::new(&doc).excluding_id(overlay);
                let Some(node) = resolver.optional(locator)? else {
                    return Ok(Probe::Pending);
                };
                let Some(el) = doc.element(node) else {
                    return Ok(Probe::Pending);
                };
                if !form_value {
                    let text = doc.text_content_excluding(node, resolver.excluded());
                    return Ok(Probe::Ready(text));
                }
                let control = matches!(el.tag.as_str(), "input" | "textarea" | "select");
                if el.value.is_none() && !control {
                    return Err(EnsayoError::action(
                        what,
                        locator.to_string(),
                        "element is not a form control",
                    ));
                }
                Ok(Probe::Ready(observed_value(&doc, node, resolver.excluded())))
            })
            .await?;
        tracing::debug!(%target, what, %value, "read");
        Ok(value)
    }

    /// Fluent assertions on a locator
    #[must_use]
    pub fn expect(&self, locator: &Locator) -> Expect<'_, D> {
        Expect::new(self, AssertionTarget::Locator(locator.clone()))
    }

    /// Fluent assertions on a value read earlier
    #[must_use]
    pub fn expect_value(&self, label: &str, value: &str) -> Expect<'_, D> {
        Expect::new(
            self,
            AssertionTarget::Value {
                label: label.to_string(),
                value: value.to_string(),
            },
        )
    }

    /// Evaluate an assertion once
    pub async fn check(&self, assertion: &Assertion) -> EnsayoResult<()> {
        self.assertions().check(assertion).await
    }

    /// Append a line to the diagnostic overlay. Never fails.
    pub async fn log(&mut self, message: &str) {
        self.log.log(&self.driver, message).await;
    }

    /// Capture the viewport
    pub async fn screenshot(&self) -> EnsayoResult<Screenshot> {
        self.driver.screenshot().await
    }

    /// Close the page and tear the overlay state down
    pub async fn close(&mut self) -> EnsayoResult<()> {
        self.log.close();
        self.driver.close().await
    }
}

/// Fluent assertion builder
///
/// Evaluates once unless [`Expect::within`] asks for retries.
#[derive(Debug)]
pub struct Expect<'p, D: PageDriver> {
    page: &'p Page<D>,
    target: AssertionTarget,
    polarity: Polarity,
    within: Option<Duration>,
}

impl<'p, D: PageDriver> Expect<'p, D> {
    fn new(page: &'p Page<D>, target: AssertionTarget) -> Self {
        Self {
            page,
            target,
            polarity: Polarity::Positive,
            within: None,
        }
    }

    /// Negate the next predicate
    #[must_use]
    #[allow(clippy::should_implement_trait)]
    pub const fn not(mut self) -> Self {
        self.polarity = self.polarity.negate();
        self
    }

    /// Retry the predicate until it passes or `timeout` elapses
    #[must_use]
    pub const fn within(mut self, timeout: Duration) -> Self {
        self.within = Some(timeout);
        self
    }

    /// Subtree text contains `text`
    pub async fn to_contain_text(self, text: &str) -> EnsayoResult<()> {
        self.run(Predicate::ContainsText(text.to_string())).await
    }

    /// Value (form fields) or trimmed text equals `expected`
    pub async fn to_equal(self, expected: &str) -> EnsayoResult<()> {
        self.run(Predicate::EqualsExact(expected.to_string())).await
    }

    /// Alias of [`Expect::to_equal`] for form fields
    pub async fn to_have_value(self, expected: &str) -> EnsayoResult<()> {
        self.to_equal(expected).await
    }

    /// Visible at the instant of the check
    pub async fn to_be_visible(self) -> EnsayoResult<()> {
        self.run(Predicate::IsVisible).await
    }

    async fn run(self, predicate: Predicate) -> EnsayoResult<()> {
        let assertion = Assertion {
            target: self.target,
            predicate,
            polarity: self.polarity,
        };
        let engine = self.page.assertions();
        match self.within {
            None => engine.check(&assertion).await,
            Some(timeout) => {
                let waiter = Waiter::new(
                    self.page
                        .config
                        .wait_options()
                        .with_timeout(timeout.as_millis() as u64),
                );
                engine.check_within(&assertion, &waiter).await
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dom::el;
    use crate::virtual_page::VirtualPage;

    fn shop() -> Page<VirtualPage> {
        let driver = VirtualPage::from_fn(|url, page| {
            if url.contains("missing") {
                return Err(EnsayoError::Navigation {
                    url: url.to_string(),
                    message: "404".to_string(),
                });
            }
            let doc = page.doc_mut();
            let body = doc.body();
            doc.append(
                body,
                el("div")
                    .class("product")
                    .child(el("h4").class("product-name").text("Carrot - 1 Kg"))
                    .child(el("p").class("product-price").text(" 56 "))
                    .child(el("input").class("quantity").attr("type", "number").value("1")),
            );
            let toast = doc.append(body, el("div").class("toast").text("Saved").hidden());
            page.after(Duration::from_millis(300), move |doc| doc.set_displayed(toast, true));
            Ok(())
        });
        Page::new(
            driver,
            EngineConfig::default().with_base_url("https://shop.test/seleniumPractise/#/"),
        )
    }

    mod navigation_tests {
        use super::*;

        #[tokio::test]
        async fn test_goto_joins_base_url() {
            let page = shop();
            page.goto("").await.unwrap();
            assert_eq!(page.url().await.unwrap(), "https://shop.test/seleniumPractise/#/");
        }

        #[tokio::test]
        async fn test_goto_failure_is_navigation_error() {
            let page = shop();
            let err = page.goto("missing.html").await.unwrap_err();
            assert!(matches!(err, EnsayoError::Navigation { .. }));
        }
    }

    mod read_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_input_value_and_text_content() {
            let page = shop();
            page.goto("").await.unwrap();
            let qty = page.locator(".product input.quantity").unwrap();
            assert_eq!(page.input_value(&qty).await.unwrap(), "1");
            let price = page.locator(".product-price").unwrap();
            assert_eq!(page.text_content(&price).await.unwrap(), " 56 ");
        }

        #[tokio::test(start_paused = true)]
        async fn test_input_value_on_text_is_action_error() {
            let page = shop();
            page.goto("").await.unwrap();
            let price = page.locator(".product-price").unwrap();
            let err = page.input_value(&price).await.unwrap_err();
            assert!(matches!(err, EnsayoError::Action { .. }));
        }
    }

    mod expect_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_fill_then_equal_is_reflexive() {
            let page = shop();
            page.goto("").await.unwrap();
            let qty = page.locator(".product input.quantity").unwrap();
            page.fill(&qty, "5").await.unwrap();
            let value = page.input_value(&qty).await.unwrap();
            page.expect(&qty).to_equal(&value).await.unwrap();
            page.expect(&qty).to_have_value("5").await.unwrap();
            page.expect_value("qty", &value).to_equal("5").await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn test_visible_without_within_does_not_wait() {
            let page = shop();
            page.goto("").await.unwrap();
            let toast = page.locator(".toast").unwrap();
            assert!(page.expect(&toast).to_be_visible().await.is_err());
            page.expect(&toast).not().to_be_visible().await.unwrap();
        }

        #[tokio::test(start_paused = true)]
        async fn test_within_waits_for_visibility() {
            let page = shop();
            page.goto("").await.unwrap();
            let toast = page.locator(".toast").unwrap();
            let start = tokio::time::Instant::now();
            page.expect(&toast)
                .within(Duration::from_secs(1))
                .to_be_visible()
                .await
                .unwrap();
            assert!(start.elapsed() >= Duration::from_millis(300));
        }

        #[tokio::test(start_paused = true)]
        async fn test_not_contain_text() {
            let page = shop();
            page.goto("").await.unwrap();
            let card = page.locator(".product").unwrap();
            page.expect(&card).not().to_contain_text("Mushroom").await.unwrap();
            page.expect(&card).to_contain_text("Carrot").await.unwrap();
        }
    }

    mod lifecycle_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_overlay_text_is_invisible_to_body_queries() {
            let mut page = shop();
            page.goto("").await.unwrap();
            let body = page.locator("body").unwrap();
            page.expect(&body).not().to_contain_text("zzz-marker-zzz").await.unwrap();

            page.log("zzz-marker-zzz").await;
            page.expect(&body).not().to_contain_text("zzz-marker-zzz").await.unwrap();
            page.expect(&body).to_contain_text("Carrot - 1 Kg").await.unwrap();
            assert!(!page.text_content(&body).await.unwrap().contains("zzz-marker-zzz"));

            let marked = page.locator(r#"body:has-text("zzz-marker-zzz")"#).unwrap();
            assert!(page.wait_for(&marked, WaitCondition::Attached).await.is_err());
            let by_text = page.locator("text=zzz-marker-zzz").unwrap();
            assert!(page.wait_for(&by_text, WaitCondition::Attached).await.is_err());
        }

        #[tokio::test(start_paused = true)]
        async fn test_log_and_close() {
            let mut page = shop();
            page.goto("").await.unwrap();
            page.log("Navigated to GreenKart").await;
            page.log("Searched for ro").await;
            assert_eq!(page.diagnostics().entries().len(), 2);
            assert_eq!(page.diagnostics().creations(), 1);
            let overlay = page.locator("#ensayo-test-log").unwrap();
            assert!(page.wait_for(&overlay, WaitCondition::Attached).await.is_err());
            page.close().await.unwrap();
            assert!(page.diagnostics().is_closed());
            page.log("after close").await;
            assert!(page.goto("").await.is_err());
        }

        #[tokio::test(start_paused = true)]
        async fn test_wait_for_within_overrides_deadline() {
            let page = shop();
            page.goto("").await.unwrap();
            let toast = page.locator(".toast").unwrap();
            let err = page
                .wait_for_within(&toast, WaitCondition::Visible, Duration::from_millis(100))
                .await
                .unwrap_err();
            assert!(matches!(err, EnsayoError::Timeout { .. }));
        }
    }
}
