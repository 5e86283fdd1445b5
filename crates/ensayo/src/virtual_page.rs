//! In-memory page for deterministic tests.
//!
//! A [`VirtualPage`] owns a [`Document`] plus the behaviour a real app would
//! attach to it: click and input handlers that bubble from the target to the
//! root, and deferred mutations scheduled against `tokio::time::Instant`.
//! Deferred work is applied lazily whenever the page is observed, so tests
//! running on a paused clock see exactly the state a browser would show at
//! that instant.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::dom::{el, Document, ElementRef, NodeId};
use crate::driver::{PageDriver, Screenshot};
use crate::overlay::OVERLAY_STYLE;
use crate::result::{EnsayoError, EnsayoResult};

/// 1x1 transparent PNG
const BLANK_PNG: &[u8] = &[
    0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x48, 0x44,
    0x52, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00, 0x01, 0x08, 0x06, 0x00, 0x00, 0x00, 0x1F,
    0x15, 0xC4, 0x89, 0x00, 0x00, 0x00, 0x0D, 0x49, 0x44, 0x41, 0x54, 0x78, 0x9C, 0x63, 0x00,
    0x01, 0x00, 0x00, 0x05, 0x00, 0x01, 0x0D, 0x0A, 0x2D, 0xB4, 0x00, 0x00, 0x00, 0x00, 0x49,
    0x45, 0x4E, 0x44, 0xAE, 0x42, 0x60, 0x82,
];

/// Event handler attached to an element
pub type Handler = Arc<dyn Fn(&mut EventContext<'_>) + Send + Sync>;

type Mutation = Box<dyn FnOnce(&mut Document) + Send>;

struct Deferred {
    due: Instant,
    seq: u64,
    apply: Mutation,
}

/// Deferred mutations ordered by due time, then scheduling order
#[derive(Default)]
struct Timers {
    queue: Vec<Deferred>,
    next_seq: u64,
}

impl Timers {
    fn schedule(&mut self, due: Instant, apply: Mutation) {
        self.queue.push(Deferred {
            due,
            seq: self.next_seq,
            apply,
        });
        self.next_seq += 1;
    }

    fn run_due(&mut self, doc: &mut Document, now: Instant) {
        self.queue.sort_by_key(|d| (d.due, d.seq));
        let split = self.queue.partition_point(|d| d.due <= now);
        for deferred in self.queue.drain(..split).collect::<Vec<_>>() {
            (deferred.apply)(doc);
        }
    }
}

/// What a handler sees while an event propagates
pub struct EventContext<'a> {
    doc: &'a mut Document,
    timers: &'a mut Timers,
    target: NodeId,
    current: NodeId,
    now: Instant,
    stopped: bool,
}

impl std::fmt::Debug for EventContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventContext")
            .field("target", &self.target)
            .field("current", &self.current)
            .finish_non_exhaustive()
    }
}

impl EventContext<'_> {
    /// Element the event was dispatched to
    #[must_use]
    pub const fn target(&self) -> NodeId {
        self.target
    }

    /// Element whose handler is running
    #[must_use]
    pub const fn current_target(&self) -> NodeId {
        self.current
    }

    /// Read the document
    #[must_use]
    pub fn doc(&self) -> &Document {
        self.doc
    }

    /// Mutate the document now
    pub fn doc_mut(&mut self) -> &mut Document {
        self.doc
    }

    /// Stop bubbling after this handler
    pub fn stop_propagation(&mut self) {
        self.stopped = true;
    }

    /// Mutate the document after `delay`
    pub fn after(&mut self, delay: Duration, apply: impl FnOnce(&mut Document) + Send + 'static) {
        self.timers.schedule(self.now + delay, Box::new(apply));
    }
}

/// Mutable page state handed to a [`Site`] while it builds a page
pub struct PageSetup<'a> {
    state: &'a mut PageState,
    now: Instant,
}

impl std::fmt::Debug for PageSetup<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSetup").finish_non_exhaustive()
    }
}

impl PageSetup<'_> {
    /// Document being built
    pub fn doc_mut(&mut self) -> &mut Document {
        &mut self.state.doc
    }

    /// Attach a click handler
    pub fn on_click(
        &mut self,
        node: NodeId,
        handler: impl Fn(&mut EventContext<'_>) + Send + Sync + 'static,
    ) {
        self.state
            .click_handlers
            .entry(node)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Attach an input handler
    pub fn on_input(
        &mut self,
        node: NodeId,
        handler: impl Fn(&mut EventContext<'_>) + Send + Sync + 'static,
    ) {
        self.state
            .input_handlers
            .entry(node)
            .or_default()
            .push(Arc::new(handler));
    }

    /// Mutate the document after `delay` from load
    pub fn after(&mut self, delay: Duration, apply: impl FnOnce(&mut Document) + Send + 'static) {
        self.state.timers.schedule(self.now + delay, Box::new(apply));
    }
}

/// Content served by a [`VirtualPage`] on navigation
pub trait Site: Send + Sync {
    /// Populate a blank page for `url`
    fn load(&self, url: &str, page: &mut PageSetup<'_>) -> EnsayoResult<()>;
}

impl<F> Site for F
where
    F: Fn(&str, &mut PageSetup<'_>) -> EnsayoResult<()> + Send + Sync,
{
    fn load(&self, url: &str, page: &mut PageSetup<'_>) -> EnsayoResult<()> {
        self(url, page)
    }
}

struct PageState {
    doc: Document,
    url: String,
    click_handlers: HashMap<NodeId, Vec<Handler>>,
    input_handlers: HashMap<NodeId, Vec<Handler>>,
    timers: Timers,
    closed: bool,
}

impl PageState {
    fn blank() -> Self {
        Self {
            doc: Document::new(),
            url: "about:blank".to_string(),
            click_handlers: HashMap::new(),
            input_handlers: HashMap::new(),
            timers: Timers::default(),
            closed: false,
        }
    }

    fn pump(&mut self) -> EnsayoResult<()> {
        if self.closed {
            return Err(EnsayoError::driver("page is closed"));
        }
        self.timers.run_due(&mut self.doc, Instant::now());
        Ok(())
    }

    fn attached(&self, target: ElementRef) -> EnsayoResult<NodeId> {
        self.doc
            .find_by_ref(target)
            .filter(|n| self.doc.is_attached(*n))
            .ok_or_else(|| EnsayoError::driver(format!("{target} is not attached to the page")))
    }

    /// Run handlers from the target up to the root
    fn dispatch(&mut self, target: NodeId, input: bool) {
        let path: Vec<NodeId> = std::iter::once(target)
            .chain(self.doc.ancestors(target))
            .collect();
        let registry = if input {
            &self.input_handlers
        } else {
            &self.click_handlers
        };
        let handlers: Vec<(NodeId, Handler)> = path
            .iter()
            .flat_map(|node| {
                registry
                    .get(node)
                    .into_iter()
                    .flatten()
                    .map(move |h| (*node, Arc::clone(h)))
            })
            .collect();
        let now = Instant::now();
        let mut stopped_at: Option<NodeId> = None;
        for (node, handler) in handlers {
            if stopped_at.is_some_and(|s| s != node) {
                break;
            }
            let mut ctx = EventContext {
                doc: &mut self.doc,
                timers: &mut self.timers,
                target,
                current: node,
                now,
                stopped: false,
            };
            handler(&mut ctx);
            if ctx.stopped {
                stopped_at = Some(node);
            }
        }
    }
}

/// In-memory [`PageDriver`]
pub struct VirtualPage {
    site: Option<Arc<dyn Site>>,
    state: Mutex<PageState>,
}

impl std::fmt::Debug for VirtualPage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualPage")
            .field("has_site", &self.site.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for VirtualPage {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualPage {
    /// Blank page with nothing to navigate to
    #[must_use]
    pub fn new() -> Self {
        Self {
            site: None,
            state: Mutex::new(PageState::blank()),
        }
    }

    /// Page that serves `site` on every navigation
    #[must_use]
    pub fn with_site(site: impl Site + 'static) -> Self {
        Self {
            site: Some(Arc::new(site)),
            state: Mutex::new(PageState::blank()),
        }
    }

    /// Page served by a loader closure
    #[must_use]
    pub fn from_fn<F>(load: F) -> Self
    where
        F: Fn(&str, &mut PageSetup<'_>) -> EnsayoResult<()> + Send + Sync + 'static,
    {
        Self::with_site(load)
    }

    /// Run `f` against the live document after applying due timers
    pub async fn with_document<R>(&self, f: impl FnOnce(&mut Document) -> R) -> EnsayoResult<R> {
        let mut state = self.state.lock().await;
        state.pump()?;
        Ok(f(&mut state.doc))
    }

    /// Number of deferred mutations not yet applied
    pub async fn pending_mutations(&self) -> usize {
        self.state.lock().await.timers.queue.len()
    }

    /// Whether the page was closed
    pub async fn is_closed(&self) -> bool {
        self.state.lock().await.closed
    }
}

#[async_trait]
impl PageDriver for VirtualPage {
    async fn goto(&self, url: &str) -> EnsayoResult<()> {
        let mut state = self.state.lock().await;
        if state.closed {
            return Err(EnsayoError::driver("page is closed"));
        }
        let Some(site) = &self.site else {
            return Err(EnsayoError::Navigation {
                url: url.to_string(),
                message: "virtual page has no site to serve".to_string(),
            });
        };
        let mut fresh = PageState::blank();
        fresh.url = url.to_string();
        let mut setup = PageSetup {
            state: &mut fresh,
            now: Instant::now(),
        };
        site.load(url, &mut setup)?;
        *state = fresh;
        tracing::debug!(url, "virtual page loaded");
        Ok(())
    }

    async fn snapshot(&self) -> EnsayoResult<Document> {
        let mut state = self.state.lock().await;
        state.pump()?;
        Ok(state.doc.clone())
    }

    async fn click(&self, target: ElementRef) -> EnsayoResult<()> {
        let mut state = self.state.lock().await;
        state.pump()?;
        let node = state.attached(target)?;
        if !state.doc.is_enabled(node) {
            return Ok(());
        }
        state.dispatch(node, false);
        Ok(())
    }

    async fn fill(&self, target: ElementRef, value: &str) -> EnsayoResult<()> {
        let mut state = self.state.lock().await;
        state.pump()?;
        let node = state.attached(target)?;
        let editable = state.doc.element(node).is_some_and(|e| e.is_editable());
        if !editable {
            return Err(EnsayoError::driver(format!("{target} is not editable")));
        }
        state.doc.set_value(node, value);
        state.dispatch(node, true);
        Ok(())
    }

    async fn ensure_overlay(&self, id: &str) -> EnsayoResult<bool> {
        let mut state = self.state.lock().await;
        state.pump()?;
        if state.doc.find_by_id(id).is_some() {
            return Ok(false);
        }
        let body = state.doc.body();
        state
            .doc
            .append(body, el("div").id(id).attr("style", OVERLAY_STYLE));
        Ok(true)
    }

    async fn append_overlay_line(&self, id: &str, line: &str) -> EnsayoResult<()> {
        let mut state = self.state.lock().await;
        state.pump()?;
        let overlay = state
            .doc
            .find_by_id(id)
            .ok_or_else(|| EnsayoError::driver(format!("overlay #{id} does not exist")))?;
        let text = state.doc.create_text(line);
        state.doc.attach(overlay, text);
        let br = state.doc.create_element("br");
        state.doc.attach(overlay, br);
        Ok(())
    }

    async fn screenshot(&self) -> EnsayoResult<Screenshot> {
        let mut state = self.state.lock().await;
        state.pump()?;
        Ok(Screenshot::new(BLANK_PNG.to_vec(), 1, 1))
    }

    async fn current_url(&self) -> EnsayoResult<String> {
        let state = self.state.lock().await;
        Ok(state.url.clone())
    }

    async fn close(&self) -> EnsayoResult<()> {
        let mut state = self.state.lock().await;
        state.closed = true;
        state.timers.queue.clear();
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counter_site() -> VirtualPage {
        VirtualPage::from_fn(|_url, page| {
            let doc = page.doc_mut();
            let body = doc.body();
            let wrap = doc.append(
                body,
                el("div")
                    .class("wrap")
                    .child(el("button").class("inc").text("+"))
                    .child(el("span").class("count").text("0")),
            );
            let mut children = doc.element_children(wrap);
            let button = children.next().unwrap();
            let span = children.next().unwrap();
            drop(children);
            page.on_click(button, move |ctx| {
                let next: u32 = ctx.doc().text_content(span).parse::<u32>().unwrap() + 1;
                ctx.after(Duration::from_millis(100), move |doc| {
                    doc.set_text(span, &next.to_string());
                });
            });
            Ok(())
        })
    }

    async fn count_text(page: &VirtualPage) -> String {
        page.with_document(|doc| {
            let span = doc
                .descendants(doc.root())
                .into_iter()
                .find(|n| doc.element(*n).is_some_and(|e| e.has_class("count")))
                .unwrap();
            doc.text_content(span)
        })
        .await
        .unwrap()
    }

    async fn button_ref(page: &VirtualPage) -> ElementRef {
        page.with_document(|doc| {
            let node = doc
                .descendants(doc.root())
                .into_iter()
                .find(|n| doc.element(*n).is_some_and(|e| e.has_class("inc")))
                .unwrap();
            doc.element(node).unwrap().handle
        })
        .await
        .unwrap()
    }

    mod navigation_tests {
        use super::*;

        #[tokio::test]
        async fn test_blank_page_cannot_navigate() {
            let page = VirtualPage::new();
            let err = page.goto("https://example.test/").await.unwrap_err();
            assert!(matches!(err, EnsayoError::Navigation { .. }));
            assert_eq!(page.current_url().await.unwrap(), "about:blank");
        }

        #[tokio::test]
        async fn test_goto_loads_site_and_url() {
            let page = counter_site();
            page.goto("https://example.test/").await.unwrap();
            assert_eq!(page.current_url().await.unwrap(), "https://example.test/");
            assert_eq!(count_text(&page).await, "0");
        }

        #[tokio::test]
        async fn test_closed_page_rejects_calls() {
            let page = counter_site();
            page.goto("https://example.test/").await.unwrap();
            page.close().await.unwrap();
            assert!(page.is_closed().await);
            assert!(page.snapshot().await.is_err());
            assert!(page.goto("https://example.test/").await.is_err());
        }
    }

    mod event_tests {
        use super::*;

        #[tokio::test(start_paused = true)]
        async fn test_deferred_mutation_applies_after_delay() {
            let page = counter_site();
            page.goto("https://example.test/").await.unwrap();
            let button = button_ref(&page).await;
            page.click(button).await.unwrap();
            assert_eq!(count_text(&page).await, "0");
            assert_eq!(page.pending_mutations().await, 1);
            tokio::time::advance(Duration::from_millis(100)).await;
            assert_eq!(count_text(&page).await, "1");
            assert_eq!(page.pending_mutations().await, 0);
        }

        #[tokio::test]
        async fn test_click_bubbles_to_ancestors() {
            let hits = Arc::new(AtomicUsize::new(0));
            let seen = Arc::clone(&hits);
            let page = VirtualPage::from_fn(move |_url, page| {
                let doc = page.doc_mut();
                let body = doc.body();
                let list = doc.append(body, el("ul").child(el("li").child(el("a").text("x"))));
                let seen = Arc::clone(&seen);
                page.on_click(list, move |ctx| {
                    assert_ne!(ctx.target(), ctx.current_target());
                    seen.fetch_add(1, Ordering::SeqCst);
                });
                Ok(())
            });
            page.goto("https://example.test/").await.unwrap();
            let link = page
                .with_document(|doc| {
                    let a = doc
                        .descendants(doc.root())
                        .into_iter()
                        .find(|n| doc.element(*n).is_some_and(|e| e.tag == "a"))
                        .unwrap();
                    doc.element(a).unwrap().handle
                })
                .await
                .unwrap();
            page.click(link).await.unwrap();
            assert_eq!(hits.load(Ordering::SeqCst), 1);
        }

        #[tokio::test]
        async fn test_fill_requires_editable_element() {
            let page = counter_site();
            page.goto("https://example.test/").await.unwrap();
            let button = button_ref(&page).await;
            let err = page.fill(button, "5").await.unwrap_err();
            assert!(err.to_string().contains("not editable"));
        }

        #[tokio::test]
        async fn test_detached_element_is_driver_error() {
            let page = counter_site();
            page.goto("https://example.test/").await.unwrap();
            let button = button_ref(&page).await;
            page.with_document(|doc| {
                let node = doc.find_by_ref(button).unwrap();
                doc.remove(node);
            })
            .await
            .unwrap();
            assert!(page.click(button).await.is_err());
        }
    }

    mod overlay_tests {
        use super::*;

        #[tokio::test]
        async fn test_ensure_overlay_is_idempotent() {
            let page = counter_site();
            page.goto("https://example.test/").await.unwrap();
            assert!(page.ensure_overlay("ensayo-test-log").await.unwrap());
            assert!(!page.ensure_overlay("ensayo-test-log").await.unwrap());
            page.append_overlay_line("ensayo-test-log", "one").await.unwrap();
            page.append_overlay_line("ensayo-test-log", "two").await.unwrap();
            let doc = page.snapshot().await.unwrap();
            let overlays: Vec<_> = doc
                .descendants(doc.root())
                .into_iter()
                .filter(|n| doc.element(*n).and_then(|e| e.id()) == Some("ensayo-test-log"))
                .collect();
            assert_eq!(overlays.len(), 1);
            assert_eq!(doc.text_content(overlays[0]), "onetwo");
        }

        #[tokio::test]
        async fn test_append_without_overlay_fails() {
            let page = counter_site();
            page.goto("https://example.test/").await.unwrap();
            assert!(page.append_overlay_line("missing", "x").await.is_err());
        }

        #[tokio::test]
        async fn test_screenshot_is_png() {
            let page = VirtualPage::new();
            let shot = page.screenshot().await.unwrap();
            assert!(shot.is_valid());
            assert_eq!(&shot.data[1..4], b"PNG");
        }
    }
}
