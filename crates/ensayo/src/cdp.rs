//! Chromium driver over the DevTools protocol.
//!
//! Elements are tagged with a `data-ensayo-ref` attribute the first time a
//! snapshot sees them; clicks and fills address elements by that ref, so a
//! handle stays valid for as long as the element lives.

use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser as CdpBrowser, BrowserConfig as CdpConfig};
use chromiumoxide::cdp::browser_protocol::page::{
    CaptureScreenshotFormat, CaptureScreenshotParams,
};
use chromiumoxide::handler::viewport::Viewport as CdpViewport;
use chromiumoxide::page::Page as CdpPage;
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::config::{EngineConfig, Viewport};
use crate::dom::{Document, ElementRef, SnapshotNode};
use crate::driver::{PageDriver, Screenshot};
use crate::overlay::OVERLAY_STYLE;
use crate::result::{EnsayoError, EnsayoResult};

/// Attribute carrying the element handle
pub const REF_ATTRIBUTE: &str = "data-ensayo-ref";

const SNAPSHOT_JS: &str = r"
(() => {
    window.__ensayoNextRef = window.__ensayoNextRef || 1;
    const skip = ['SCRIPT', 'STYLE', 'NOSCRIPT', 'TEMPLATE'];
    const fields = ['INPUT', 'TEXTAREA', 'SELECT'];
    const walk = (node) => {
        if (node.nodeType === Node.TEXT_NODE) return { text: node.nodeValue };
        if (node.nodeType !== Node.ELEMENT_NODE) return null;
        let ref = node.getAttribute('data-ensayo-ref');
        if (!ref) {
            ref = String(window.__ensayoNextRef++);
            node.setAttribute('data-ensayo-ref', ref);
        }
        const attributes = {};
        for (const a of node.attributes) {
            if (a.name !== 'data-ensayo-ref') attributes[a.name] = a.value;
        }
        const style = getComputedStyle(node);
        const r = node.getBoundingClientRect();
        let obscured = false;
        if (r.width > 0 && r.height > 0) {
            const cx = r.left + r.width / 2;
            const cy = r.top + r.height / 2;
            if (cx >= 0 && cy >= 0 && cx <= innerWidth && cy <= innerHeight) {
                const hit = document.elementFromPoint(cx, cy);
                obscured = !!hit && hit !== node && !node.contains(hit) && !hit.contains(node);
            }
        }
        const children = [];
        if (!skip.includes(node.tagName)) {
            for (const c of node.childNodes) {
                const s = walk(c);
                if (s) children.push(s);
            }
        }
        return {
            tag: node.tagName.toLowerCase(),
            ref: Number(ref),
            attributes,
            value: fields.includes(node.tagName) ? String(node.value) : null,
            disabled: !!node.disabled,
            style: {
                display_none: style.display === 'none',
                visibility_hidden: style.visibility === 'hidden',
                transparent: parseFloat(style.opacity) === 0,
            },
            rect: { x: r.x, y: r.y, width: r.width, height: r.height },
            obscured,
            children,
        };
    };
    return walk(document.body);
})()
";

fn by_ref(target: ElementRef) -> String {
    format!("document.querySelector('[{REF_ATTRIBUTE}=\"{}\"]')", target.0)
}

fn click_js(target: ElementRef) -> String {
    format!(
        r"(() => {{
            const el = {};
            if (!el) return false;
            el.scrollIntoView({{ block: 'center', inline: 'center' }});
            el.click();
            return true;
        }})()",
        by_ref(target)
    )
}

fn fill_js(target: ElementRef, value: &str) -> EnsayoResult<String> {
    let value = serde_json::to_string(value)?;
    Ok(format!(
        r"(() => {{
            const el = {};
            if (!el) return 'missing';
            const proto = el instanceof HTMLTextAreaElement ? HTMLTextAreaElement.prototype
                : el instanceof HTMLSelectElement ? HTMLSelectElement.prototype
                : el instanceof HTMLInputElement ? HTMLInputElement.prototype
                : null;
            if (!proto) return 'not-editable';
            el.focus();
            Object.getOwnPropertyDescriptor(proto, 'value').set.call(el, {value});
            el.dispatchEvent(new Event('input', {{ bubbles: true }}));
            el.dispatchEvent(new Event('change', {{ bubbles: true }}));
            return 'ok';
        }})()",
        by_ref(target)
    ))
}

fn ensure_overlay_js(id: &str) -> EnsayoResult<String> {
    let id = serde_json::to_string(id)?;
    let style = serde_json::to_string(OVERLAY_STYLE)?;
    Ok(format!(
        r"(() => {{
            if (document.getElementById({id})) return false;
            const box = document.createElement('div');
            box.id = {id};
            box.setAttribute('style', {style});
            document.body.appendChild(box);
            return true;
        }})()"
    ))
}

fn append_overlay_js(id: &str, line: &str) -> EnsayoResult<String> {
    let id = serde_json::to_string(id)?;
    let line = serde_json::to_string(line)?;
    Ok(format!(
        r"(() => {{
            const box = document.getElementById({id});
            if (!box) return false;
            box.appendChild(document.createTextNode({line}));
            box.appendChild(document.createElement('br'));
            return true;
        }})()"
    ))
}

fn cdp_error(err: impl std::fmt::Display) -> EnsayoError {
    EnsayoError::driver(err.to_string())
}

/// [`PageDriver`] backed by a Chromium page
#[derive(Debug)]
pub struct ChromiumDriver {
    browser: Mutex<CdpBrowser>,
    page: CdpPage,
    viewport: Viewport,
    handle: tokio::task::JoinHandle<()>,
}

impl ChromiumDriver {
    /// Launch Chromium and open a blank page
    pub async fn launch(config: &EngineConfig) -> EnsayoResult<Self> {
        let mut builder = CdpConfig::builder();
        if !config.headless {
            builder = builder.with_head();
        }
        builder = builder
            .window_size(config.viewport.width, config.viewport.height)
            .viewport(CdpViewport {
                width: config.viewport.width,
                height: config.viewport.height,
                device_scale_factor: None,
                emulating_mobile: false,
                is_landscape: true,
                has_touch: false,
            })
            .arg("--disable-dev-shm-usage");

        let cdp_config = builder
            .build()
            .map_err(|message| EnsayoError::BrowserLaunch { message })?;

        let (browser, mut handler) =
            CdpBrowser::launch(cdp_config)
                .await
                .map_err(|e| EnsayoError::BrowserLaunch {
                    message: e.to_string(),
                })?;

        let handle = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if event.is_err() {
                    break;
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| EnsayoError::BrowserLaunch {
                message: e.to_string(),
            })?;
        tracing::info!(headless = config.headless, "chromium launched");

        Ok(Self {
            browser: Mutex::new(browser),
            page,
            viewport: config.viewport,
            handle,
        })
    }

    async fn eval<T: DeserializeOwned>(&self, js: &str) -> EnsayoResult<T> {
        self.page
            .evaluate(js)
            .await
            .map_err(cdp_error)?
            .into_value()
            .map_err(|e| EnsayoError::driver(format!("{e:?}")))
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn goto(&self, url: &str) -> EnsayoResult<()> {
        let navigation = |e: chromiumoxide::error::CdpError| EnsayoError::Navigation {
            url: url.to_string(),
            message: e.to_string(),
        };
        self.page.goto(url).await.map_err(navigation)?;
        self.page.wait_for_navigation().await.map_err(navigation)?;
        Ok(())
    }

    async fn snapshot(&self) -> EnsayoResult<Document> {
        let body: SnapshotNode = self.eval(SNAPSHOT_JS).await?;
        Ok(Document::from_snapshot(&body))
    }

    async fn click(&self, target: ElementRef) -> EnsayoResult<()> {
        let found: bool = self.eval(&click_js(target)).await?;
        if found {
            Ok(())
        } else {
            Err(EnsayoError::driver(format!("{target} is not attached to the page")))
        }
    }

    async fn fill(&self, target: ElementRef, value: &str) -> EnsayoResult<()> {
        let status: String = self.eval(&fill_js(target, value)?).await?;
        match status.as_str() {
            "ok" => Ok(()),
            "missing" => Err(EnsayoError::driver(format!(
                "{target} is not attached to the page"
            ))),
            _ => Err(EnsayoError::driver(format!("{target} is not editable"))),
        }
    }

    async fn ensure_overlay(&self, id: &str) -> EnsayoResult<bool> {
        self.eval(&ensure_overlay_js(id)?).await
    }

    async fn append_overlay_line(&self, id: &str, line: &str) -> EnsayoResult<()> {
        let appended: bool = self.eval(&append_overlay_js(id, line)?).await?;
        if appended {
            Ok(())
        } else {
            Err(EnsayoError::driver(format!("overlay #{id} does not exist")))
        }
    }

    async fn screenshot(&self) -> EnsayoResult<Screenshot> {
        let params = CaptureScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .build();
        let shot = self.page.execute(params).await.map_err(cdp_error)?;
        let data = base64::engine::general_purpose::STANDARD
            .decode(&shot.data)
            .map_err(cdp_error)?;
        Ok(Screenshot::new(data, self.viewport.width, self.viewport.height))
    }

    async fn current_url(&self) -> EnsayoResult<String> {
        Ok(self
            .page
            .url()
            .await
            .map_err(cdp_error)?
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn close(&self) -> EnsayoResult<()> {
        let mut browser = self.browser.lock().await;
        if let Err(err) = self.page.clone().close().await {
            tracing::debug!(error = %err, "page already closed");
        }
        browser.close().await.map_err(cdp_error)?;
        if let Err(err) = browser.wait().await {
            tracing::debug!(error = %err, "browser process wait failed");
        }
        self.handle.abort();
        Ok(())
    }
}
