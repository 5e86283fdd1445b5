//! Wait coordination.
//!
//! Every wait is a polling loop on the tokio clock: take a fresh snapshot,
//! evaluate, and either finish or sleep until the next poll. The sleep is
//! clamped to the time left, so a condition that never holds fails at the
//! deadline, never later than one poll interval past it.
//!
//! Nothing is retried above this layer. A timeout is fatal to the step.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::driver::PageDriver;
use crate::locator::{Locator, Resolver};
use crate::result::{EnsayoError, EnsayoResult};

/// Default timeout for wait operations (5 seconds)
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 5_000;

/// Default polling interval (50ms)
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 50;

/// State a locator is awaited into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaitCondition {
    /// Present in the document, visible or not
    Attached,
    /// No longer present
    Detached,
    /// Present, rendered, non-zero extent
    Visible,
    /// Absent or not visible
    Hidden,
    /// Unconditional pause; prefer a state-based condition when one is observable
    FixedDelay(#[serde(with = "crate::wait::millis")] Duration),
}

impl std::fmt::Display for WaitCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Attached => f.write_str("attached"),
            Self::Detached => f.write_str("detached"),
            Self::Visible => f.write_str("visible"),
            Self::Hidden => f.write_str("hidden"),
            Self::FixedDelay(d) => write!(f, "paused for {}ms", d.as_millis()),
        }
    }
}

pub(crate) mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

/// Options for wait operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitOptions {
    /// Timeout in milliseconds
    pub timeout_ms: u64,
    /// Polling interval in milliseconds
    pub poll_interval_ms: u64,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_WAIT_TIMEOUT_MS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

impl WaitOptions {
    /// Create new wait options with defaults
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set timeout in milliseconds
    #[must_use]
    pub const fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Set polling interval in milliseconds
    #[must_use]
    pub const fn with_poll_interval(mut self, poll_interval_ms: u64) -> Self {
        self.poll_interval_ms = poll_interval_ms;
        self
    }

    /// Get timeout as Duration
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Get poll interval as Duration
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Result of a wait operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitResult {
    /// Time spent waiting
    pub elapsed: Duration,
    /// Description of what was waited for
    pub waited_for: String,
    /// Number of evaluations
    pub polls: u32,
}

/// Outcome of one evaluation inside a polling loop
#[derive(Debug)]
pub enum Probe<T> {
    /// Condition holds
    Ready(T),
    /// Not yet; poll again
    Pending,
    /// Not yet; if the deadline passes, fail with this error instead of a timeout
    Retry(EnsayoError),
}

/// Polling wait coordinator
#[derive(Debug, Clone, Default)]
pub struct Waiter {
    options: WaitOptions,
    exclude_id: Option<String>,
}

impl Waiter {
    /// Create a waiter
    #[must_use]
    pub fn new(options: WaitOptions) -> Self {
        Self {
            options,
            exclude_id: None,
        }
    }

    /// Hide the subtree with this id from resolution (the diagnostic overlay)
    #[must_use]
    pub fn excluding_id(mut self, html_id: impl Into<String>) -> Self {
        self.exclude_id = Some(html_id.into());
        self
    }

    /// Options in effect
    #[must_use]
    pub const fn options(&self) -> &WaitOptions {
        &self.options
    }

    /// Generic polling loop
    ///
    /// `probe` errors abort immediately. [`Probe::Retry`] errors are held and
    /// returned at the deadline in place of a timeout.
    pub async fn poll<T, F, Fut>(
        &self,
        condition: &str,
        target: &str,
        mut probe: F,
    ) -> EnsayoResult<(T, WaitResult)>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EnsayoResult<Probe<T>>>,
    {
        let start = Instant::now();
        let timeout = self.options.timeout();
        let deadline = start + timeout;
        let interval = self.options.poll_interval();
        let mut polls = 0u32;
        let mut last_failure = None;

        loop {
            polls += 1;
            match probe().await? {
                Probe::Ready(value) => {
                    let elapsed = start.elapsed();
                    tracing::debug!(condition, target, polls, ?elapsed, "wait satisfied");
                    return Ok((
                        value,
                        WaitResult {
                            elapsed,
                            waited_for: format!("{target} {condition}"),
                            polls,
                        },
                    ));
                }
                Probe::Pending => {}
                Probe::Retry(err) => last_failure = Some(err),
            }

            let now = Instant::now();
            if now >= deadline {
                let elapsed = now - start;
                tracing::debug!(condition, target, polls, ?elapsed, "wait timed out");
                return Err(last_failure.unwrap_or_else(|| EnsayoError::Timeout {
                    condition: condition.to_string(),
                    target: target.to_string(),
                    timeout,
                    elapsed,
                }));
            }
            tokio::time::sleep(interval.min(deadline - now)).await;
        }
    }

    /// Wait until `locator` reaches `condition`
    ///
    /// More than one match is a resolution error, raised immediately.
    pub async fn wait_for<D: PageDriver + ?Sized>(
        &self,
        driver: &D,
        locator: &Locator,
        condition: WaitCondition,
    ) -> EnsayoResult<WaitResult> {
        if let WaitCondition::FixedDelay(duration) = condition {
            return Ok(pause(duration).await);
        }
        let target = locator.to_string();
        let exclude = self.exclude_id.as_deref();
        let (_, result) = self
            .poll(&condition.to_string(), &target, || {
                check_condition(driver, locator, exclude, condition)
            })
            .await?;
        Ok(result)
    }
}

async fn check_condition<D: PageDriver + ?Sized>(
    driver: &D,
    locator: &Locator,
    exclude: Option<&str>,
    condition: WaitCondition,
) -> EnsayoResult<Probe<()>> {
    let doc = driver.snapshot().await?;
    let mut resolver = Resolver::new(&doc);
    if let Some(id) = exclude {
        resolver = resolver.excluding_id(id);
    }
    let found = resolver.optional(locator)?;
    let holds = match condition {
        WaitCondition::Attached => found.is_some(),
        WaitCondition::Detached => found.is_none(),
        WaitCondition::Visible => found.is_some_and(|n| doc.is_visible(n)),
        WaitCondition::Hidden => !found.is_some_and(|n| doc.is_visible(n)),
        WaitCondition::FixedDelay(_) => true,
    };
    Ok(if holds { Probe::Ready(()) } else { Probe::Pending })
}

/// Unconditional suspension
pub async fn pause(duration: Duration) -> WaitResult {
    tracing::warn!(
        ms = duration.as_millis() as u64,
        "fixed delay used; prefer waiting on an observable condition"
    );
    tokio::time::sleep(duration).await;
    WaitResult {
        elapsed: duration,
        waited_for: WaitCondition::FixedDelay(duration).to_string(),
        polls: 0,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::dom::el;
    use crate::virtual_page::VirtualPage;

    /// Banner appears after 300ms, spinner disappears after 200ms
    fn delayed_site() -> VirtualPage {
        VirtualPage::from_fn(|_url, page| {
            let doc = page.doc_mut();
            let body = doc.body();
            let banner = doc.append(body, el("div").class("banner").text("Ready").hidden());
            let spinner = doc.append(body, el("div").class("spinner").text("..."));
            page.after(Duration::from_millis(300), move |doc| {
                doc.set_displayed(banner, true);
            });
            page.after(Duration::from_millis(200), move |doc| doc.remove(spinner));
            Ok(())
        })
    }

    async fn loaded() -> VirtualPage {
        let page = delayed_site();
        page.goto("https://shop.test/").await.unwrap();
        page
    }

    mod options_tests {
        use super::*;

        #[test]
        fn test_defaults() {
            let opts = WaitOptions::new();
            assert_eq!(opts.timeout(), Duration::from_millis(5000));
            assert_eq!(opts.poll_interval(), Duration::from_millis(50));
        }

        #[test]
        fn test_builders() {
            let opts = WaitOptions::new().with_timeout(250).with_poll_interval(10);
            assert_eq!(opts.timeout_ms, 250);
            assert_eq!(opts.poll_interval_ms, 10);
        }

        #[test]
        fn test_condition_display_and_serde() {
            assert_eq!(WaitCondition::Visible.to_string(), "visible");
            assert_eq!(
                WaitCondition::FixedDelay(Duration::from_millis(500)).to_string(),
                "paused for 500ms"
            );
            let parsed: WaitCondition = serde_json::from_str("\"hidden\"").unwrap();
            assert_eq!(parsed, WaitCondition::Hidden);
        }
    }

    mod condition_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_attached_resolves_before_visible() {
            let page = loaded().await;
            let banner = Locator::new(".banner").unwrap();
            let waiter = Waiter::new(WaitOptions::new());
            let attached = waiter
                .wait_for(&page, &banner, WaitCondition::Attached)
                .await
                .unwrap();
            assert_eq!(attached.polls, 1);
            let visible = waiter
                .wait_for(&page, &banner, WaitCondition::Visible)
                .await
                .unwrap();
            assert!(visible.elapsed >= Duration::from_millis(300));
            assert!(visible.elapsed < Duration::from_millis(350));
        }

        #[tokio::test(start_paused = true)]
        async fn test_detached_after_removal() {
            let page = loaded().await;
            let spinner = Locator::new(".spinner").unwrap();
            let result = Waiter::default()
                .wait_for(&page, &spinner, WaitCondition::Detached)
                .await
                .unwrap();
            assert!(result.elapsed >= Duration::from_millis(200));
        }

        #[tokio::test(start_paused = true)]
        async fn test_hidden_passes_for_missing_element() {
            let page = loaded().await;
            let ghost = Locator::new(".does-not-exist").unwrap();
            let result = Waiter::default()
                .wait_for(&page, &ghost, WaitCondition::Hidden)
                .await
                .unwrap();
            assert_eq!(result.polls, 1);
        }

        #[tokio::test(start_paused = true)]
        async fn test_ambiguous_locator_fails_immediately() {
            let page = loaded().await;
            let any_div = Locator::new("div").unwrap();
            let start = Instant::now();
            let err = Waiter::default()
                .wait_for(&page, &any_div, WaitCondition::Visible)
                .await
                .unwrap_err();
            assert!(matches!(err, EnsayoError::Resolution { .. }));
            assert_eq!(start.elapsed(), Duration::ZERO);
        }

        #[tokio::test(start_paused = true)]
        async fn test_fixed_delay_sleeps() {
            let page = loaded().await;
            let banner = Locator::new(".banner").unwrap();
            let start = Instant::now();
            Waiter::default()
                .wait_for(
                    &page,
                    &banner,
                    WaitCondition::FixedDelay(Duration::from_millis(400)),
                )
                .await
                .unwrap();
            assert_eq!(start.elapsed(), Duration::from_millis(400));
        }
    }

    mod timeout_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_timeout_bounds() {
            let page = loaded().await;
            let missing = Locator::new(".cart-items").unwrap();
            for (timeout, poll) in [(1000, 50), (1000, 300), (120, 50), (5, 50)] {
                let waiter = Waiter::new(
                    WaitOptions::new()
                        .with_timeout(timeout)
                        .with_poll_interval(poll),
                );
                let start = Instant::now();
                let err = waiter
                    .wait_for(&page, &missing, WaitCondition::Visible)
                    .await
                    .unwrap_err();
                let spent = start.elapsed();
                assert!(spent >= Duration::from_millis(timeout));
                assert!(spent <= Duration::from_millis(timeout + poll));
                let EnsayoError::Timeout {
                    condition, elapsed, ..
                } = err
                else {
                    panic!("expected timeout, got {err}");
                };
                assert_eq!(condition, "visible");
                assert!(elapsed >= Duration::from_millis(timeout));
            }
        }

        #[tokio::test(start_paused = true)]
        async fn test_retry_error_replaces_timeout() {
            let waiter = Waiter::new(WaitOptions::new().with_timeout(100));
            let err = waiter
                .poll("equal", "value", || async {
                    Ok::<_, EnsayoError>(Probe::<()>::Retry(EnsayoError::scenario("last seen")))
                })
                .await
                .unwrap_err();
            assert!(err.to_string().contains("last seen"));
        }

        #[tokio::test(start_paused = true)]
        async fn test_probe_error_aborts() {
            let waiter = Waiter::default();
            let start = Instant::now();
            let err = waiter
                .poll("anything", "page", || async {
                    Err::<Probe<()>, _>(EnsayoError::driver("page is closed"))
                })
                .await
                .unwrap_err();
            assert!(matches!(err, EnsayoError::Driver { .. }));
            assert_eq!(start.elapsed(), Duration::ZERO);
        }
    }
}
