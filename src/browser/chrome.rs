//! Headless Chromium behind [`SessionProvider`], driven over CDP.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use rand_core::{OsRng, RngCore};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{BrowserError, ElementHandle, PageSession, Selector, SessionProvider};

pub const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
];

const LAUNCH_ARGS: &[&str] = &[
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-gpu",
    "--disable-notifications",
    "--disable-blink-features=AutomationControlled",
    "--mute-audio",
    "--autoplay-policy=user-gesture-required",
];

pub fn random_user_agent() -> &'static str {
    let index = OsRng.next_u32() as usize % USER_AGENTS.len();
    USER_AGENTS[index]
}

/// Wraps a function body so the page returns its result as JSON text.
fn page_expression(body: &str) -> String {
    format!("JSON.stringify((() => {{ {body} }})() ?? null)")
}

/// Same for element scripts; the element is bound to `el`.
fn element_function(body: &str) -> String {
    format!(
        "function() {{ const el = this; return JSON.stringify((() => {{ {body} }})() ?? null); }}"
    )
}

/// Counts matches in the page without materializing element handles.
fn count_script(selector: &Selector) -> Result<String, BrowserError> {
    Ok(match selector {
        Selector::Css(css) => {
            let css = serde_json::to_string(css)?;
            format!("return document.querySelectorAll({css}).length;")
        }
        Selector::XPath(xpath) => {
            let xpath = serde_json::to_string(xpath)?;
            format!(
                "return document.evaluate({xpath}, document, null, \
                 XPathResult.ORDERED_NODE_SNAPSHOT_TYPE, null).snapshotLength;"
            )
        }
    })
}

fn decode(raw: Option<Value>) -> Result<Value, BrowserError> {
    match raw {
        Some(Value::String(text)) => Ok(serde_json::from_str(&text)?),
        Some(Value::Null) | None => Ok(Value::Null),
        Some(other) => Err(BrowserError::Script(format!(
            "expected JSON text, got {other}"
        ))),
    }
}

/// One tab of the shared browser.
pub struct ChromeSession {
    page: Page,
    elements: Vec<Element>,
}

impl ChromeSession {
    fn element(&self, handle: ElementHandle) -> Result<&Element, BrowserError> {
        self.elements
            .get(handle.index())
            .ok_or_else(|| BrowserError::Element(format!("stale handle {}", handle.index())))
    }
}

#[async_trait]
impl PageSession for ChromeSession {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError> {
        self.elements.clear();
        self.page
            .goto(url)
            .await
            .map_err(|err| BrowserError::Navigation {
                url: url.to_string(),
                reason: err.to_string(),
            })?;
        Ok(())
    }

    async fn current_url(&mut self) -> Result<String, BrowserError> {
        let url = self
            .page
            .url()
            .await
            .map_err(|err| BrowserError::Script(err.to_string()))?;
        Ok(url.unwrap_or_default())
    }

    async fn run_script(&mut self, script: &str) -> Result<Value, BrowserError> {
        let result = self
            .page
            .evaluate(page_expression(script))
            .await
            .map_err(|err| BrowserError::Script(err.to_string()))?;
        decode(result.value().cloned())
    }

    async fn run_script_on(
        &mut self,
        element: ElementHandle,
        script: &str,
    ) -> Result<Value, BrowserError> {
        let returns = self
            .element(element)?
            .call_js_fn(element_function(script), false)
            .await
            .map_err(|err| BrowserError::Script(err.to_string()))?;
        decode(returns.result.value)
    }

    async fn find(&mut self, selector: &Selector) -> Result<Vec<ElementHandle>, BrowserError> {
        let found = match selector {
            Selector::Css(css) => self.page.find_elements(*css).await,
            Selector::XPath(xpath) => self.page.find_xpaths(*xpath).await,
        };
        // No match surfaces as an error from CDP; treat it as an empty result.
        let found = match found {
            Ok(found) => found,
            Err(err) => {
                debug!(selector = selector.as_str(), error = %err, "no elements");
                Vec::new()
            }
        };
        let start = self.elements.len();
        self.elements.extend(found);
        Ok((start..self.elements.len()).map(ElementHandle::new).collect())
    }

    async fn count(&mut self, selector: &Selector) -> Result<usize, BrowserError> {
        let value = self.run_script(&count_script(selector)?).await?;
        value
            .as_u64()
            .map(|count| count as usize)
            .ok_or_else(|| BrowserError::Script(format!("expected a count, got {value}")))
    }

    async fn click(&mut self, element: ElementHandle) -> Result<(), BrowserError> {
        self.element(element)?
            .call_js_fn("function() { this.click(); }", false)
            .await
            .map_err(|err| BrowserError::Element(err.to_string()))?;
        Ok(())
    }

    async fn scroll_to_bottom(&mut self) -> Result<(), BrowserError> {
        self.page
            .evaluate("window.scrollTo(0, document.documentElement.scrollHeight)")
            .await
            .map_err(|err| BrowserError::Script(err.to_string()))?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), BrowserError> {
        self.elements.clear();
        self.page
            .clone()
            .close()
            .await
            .map_err(|err| BrowserError::Script(err.to_string()))
    }
}

/// A launched instance together with the task draining its CDP events.
struct Running<T> {
    instance: Arc<T>,
    handler: JoinHandle<()>,
}

/// Returns the cached instance while its handler task is alive. A finished
/// handler means the connection is gone, so the slot is cleared.
fn take_live<T>(slot: &mut Option<Running<T>>) -> Option<Arc<T>> {
    if slot.as_ref().is_some_and(|running| running.handler.is_finished()) {
        warn!("browser connection lost, relaunching");
        *slot = None;
    }
    slot.as_ref().map(|running| Arc::clone(&running.instance))
}

/// Launches Chromium on first use and keeps it while its connection lives.
/// Each acquired session is a fresh tab.
pub struct ChromeProvider {
    inner: Mutex<Option<Running<Browser>>>,
    executable: Option<PathBuf>,
}

impl ChromeProvider {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self {
            inner: Mutex::new(None),
            executable,
        }
    }

    async fn get_or_launch(&self) -> Result<Arc<Browser>, BrowserError> {
        let mut guard = self.inner.lock().await;
        if let Some(browser) = take_live(&mut *guard) {
            return Ok(browser);
        }

        let user_agent = random_user_agent();
        let mut builder = BrowserConfig::builder()
            .new_headless_mode()
            .arg(format!("--user-agent={user_agent}"));
        for arg in LAUNCH_ARGS {
            builder = builder.arg(*arg);
        }
        if let Some(path) = &self.executable {
            builder = builder.chrome_executable(path);
        }
        let config = builder
            .build()
            .map_err(|err| BrowserError::Launch(format!("browser config error: {err}")))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|err| BrowserError::Launch(err.to_string()))?;
        let handler = tokio::spawn(async move { while handler.next().await.is_some() {} });
        info!(user_agent, "browser launched");

        let shared = Arc::new(browser);
        *guard = Some(Running {
            instance: Arc::clone(&shared),
            handler,
        });
        Ok(shared)
    }

    /// Drops the cached browser if it is still `browser`, so the next
    /// acquire launches a fresh one.
    async fn invalidate(&self, browser: &Arc<Browser>) {
        let mut guard = self.inner.lock().await;
        if guard
            .as_ref()
            .is_some_and(|running| Arc::ptr_eq(&running.instance, browser))
        {
            *guard = None;
        }
    }
}

#[async_trait]
impl SessionProvider for ChromeProvider {
    async fn acquire(&self) -> Result<Box<dyn PageSession>, BrowserError> {
        let browser = self.get_or_launch().await?;
        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                self.invalidate(&browser).await;
                return Err(BrowserError::Launch(format!("failed to open tab: {err}")));
            }
        };
        Ok(Box::new(ChromeSession {
            page,
            elements: Vec::new(),
        }))
    }

    async fn shutdown(&self) {
        let mut guard = self.inner.lock().await;
        if let Some(running) = guard.take()
            && let Ok(mut browser) = Arc::try_unwrap(running.instance)
            && let Err(err) = browser.close().await
        {
            warn!(error = %err, "browser close error");
        }
    }
}
