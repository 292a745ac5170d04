//! Seam between the extraction core and the browser that renders the pages.
//!
//! The core only talks to [`PageSession`]; it never owns a browser process.
//! Sessions come from a [`SessionProvider`] which decides whether the browser
//! behind them is shared between requests or created per request.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::time::{Instant, sleep};

pub mod chrome;
#[cfg(test)]
pub mod fake;

/// True once the document finished loading and the app shell dropped its
/// loading marker.
pub const READY_SCRIPT: &str = r#"return document.readyState === "complete" && !document.querySelector("ytd-app")?.getAttribute("is-loading");"#;

#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("browser launch failed: {0}")]
    Launch(String),
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("script evaluation failed: {0}")]
    Script(String),
    #[error("element lookup failed: {0}")]
    Element(String),
    #[error("could not decode script result: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("browser session is closed")]
    Closed,
}

/// How to locate elements in the rendered document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selector {
    Css(&'static str),
    XPath(&'static str),
}

impl Selector {
    pub fn as_str(&self) -> &'static str {
        match self {
            Selector::Css(value) | Selector::XPath(value) => value,
        }
    }
}

/// Opaque reference to an element found through [`PageSession::find`]. Only
/// valid for the session that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementHandle(usize);

impl ElementHandle {
    pub(crate) fn new(index: usize) -> Self {
        Self(index)
    }

    pub(crate) fn index(self) -> usize {
        self.0
    }
}

/// One browser tab as seen by the extraction core.
///
/// Scripts are JavaScript function bodies that `return` a JSON-compatible
/// value. Element scripts see the element as `el`.
#[async_trait]
pub trait PageSession: Send {
    async fn navigate(&mut self, url: &str) -> Result<(), BrowserError>;

    async fn current_url(&mut self) -> Result<String, BrowserError>;

    async fn run_script(&mut self, script: &str) -> Result<Value, BrowserError>;

    async fn run_script_on(
        &mut self,
        element: ElementHandle,
        script: &str,
    ) -> Result<Value, BrowserError>;

    async fn find(&mut self, selector: &Selector) -> Result<Vec<ElementHandle>, BrowserError>;

    /// Number of current matches for `selector`. Unlike [`find`](Self::find)
    /// it hands out no handles, so polling loops should use it.
    async fn count(&mut self, selector: &Selector) -> Result<usize, BrowserError> {
        Ok(self.find(selector).await?.len())
    }

    async fn click(&mut self, element: ElementHandle) -> Result<(), BrowserError>;

    async fn scroll_to_bottom(&mut self) -> Result<(), BrowserError>;

    /// Polls [`READY_SCRIPT`] every `interval` until it reports true or
    /// `timeout` elapses. Script errors count as "not ready yet".
    async fn wait_until_ready(&mut self, timeout: Duration, interval: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            match self.run_script(READY_SCRIPT).await {
                Ok(Value::Bool(true)) => return true,
                Ok(_) => {}
                Err(err) => tracing::debug!(error = %err, "ready check failed"),
            }
            if Instant::now() >= deadline {
                return false;
            }
            sleep(interval).await;
        }
    }

    /// Releases browser-side resources. Called by the provider on release.
    async fn close(&mut self) -> Result<(), BrowserError> {
        Ok(())
    }
}

/// Hands out sessions. Every `acquire` must be paired with a `release`.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn acquire(&self) -> Result<Box<dyn PageSession>, BrowserError>;

    async fn release(&self, mut session: Box<dyn PageSession>) {
        if let Err(err) = session.close().await {
            tracing::debug!(error = %err, "session close failed");
        }
    }

    /// Tears down whatever the provider keeps alive between requests.
    async fn shutdown(&self) {}
}

/// Waits for `selector` to match at least one element, polling every
/// `interval`. Returns false on timeout.
pub async fn wait_for_element(
    session: &mut dyn PageSession,
    selector: &Selector,
    timeout: Duration,
    interval: Duration,
) -> bool {
    let deadline = Instant::now() + timeout;
    loop {
        match session.count(selector).await {
            Ok(count) if count > 0 => return true,
            Ok(_) => {}
            Err(err) => tracing::debug!(selector = selector.as_str(), error = %err, "lookup failed"),
        }
        if Instant::now() >= deadline {
            return false;
        }
        sleep(interval).await;
    }
}
