//! Page operation seam between the pipeline and the CDP engine.
//!
//! Every stage talks to the page through `PageDriver` only, so the whole
//! pipeline runs against a fake DOM in tests. The production implementation
//! wraps a `chromiumoxide::Page`; the quiescence heuristic is a
//! Playwright-style resource-count poll that needs no CDP Network events.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::Page;
use tracing::info;

/// The browser-engine capabilities the pipeline relies on.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load a URL. Errors here are protocol/process failures, not timeouts.
    async fn goto(&self, url: &str) -> Result<()>;

    /// Wait for network quiescence: the page's resource count must hold
    /// still for `quiet` with the document fully loaded. Returns `false`
    /// when `timeout` elapses first.
    async fn wait_until_idle(&self, quiet: Duration, timeout: Duration) -> Result<bool>;

    /// Click the first element matching a CSS selector.
    /// `Ok(false)` when nothing matches.
    async fn click(&self, selector: &str) -> Result<bool>;

    /// Evaluate a script in the page, returning its JSON value
    /// (`null` when the script yields `undefined`).
    async fn evaluate(&self, script: &str) -> Result<serde_json::Value>;

    /// Serialize the current fully rendered document markup.
    async fn content(&self) -> Result<String>;

    /// Capture a diagnostic screenshot to `path`.
    async fn screenshot(&self, path: &Path) -> Result<()>;
}

/// Production driver over a live CDP page.
#[derive(Clone)]
pub struct CdpPage {
    page: Page,
}

impl CdpPage {
    pub fn new(page: Page) -> Self {
        Self { page }
    }
}

#[async_trait]
impl PageDriver for CdpPage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .map_err(|e| anyhow!("navigation to {} failed: {}", url, e))?;
        Ok(())
    }

    async fn wait_until_idle(&self, quiet: Duration, timeout: Duration) -> Result<bool> {
        let poll = Duration::from_millis(250);
        let start = std::time::Instant::now();
        let mut last_count: u64 = 0;
        let mut stable_since = std::time::Instant::now();

        loop {
            if start.elapsed() >= timeout {
                return Ok(false);
            }

            let count: u64 = self
                .page
                .evaluate("performance.getEntriesByType('resource').length")
                .await
                .ok()
                .and_then(|v| v.into_value::<serde_json::Value>().ok())
                .and_then(|j| j.as_u64())
                .unwrap_or(0);

            let ready_complete: bool = self
                .page
                .evaluate("document.readyState")
                .await
                .ok()
                .and_then(|v| v.into_value::<serde_json::Value>().ok())
                .and_then(|j| j.as_str().map(|s| s == "complete"))
                .unwrap_or(false);

            if !ready_complete {
                // DOM still loading; "idle" must not trigger yet.
                stable_since = std::time::Instant::now();
                last_count = count;
            } else if count != last_count {
                last_count = count;
                stable_since = std::time::Instant::now();
            } else if stable_since.elapsed() >= quiet {
                info!(
                    "network idle after {}ms ({} resources)",
                    start.elapsed().as_millis(),
                    count
                );
                return Ok(true);
            }

            tokio::time::sleep(poll).await;
        }
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        match self.page.find_element(selector).await {
            Ok(element) => {
                element
                    .click()
                    .await
                    .map_err(|e| anyhow!("click on `{}` failed: {}", selector, e))?;
                Ok(true)
            }
            Err(_) => Ok(false),
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .map_err(|e| anyhow!("script evaluation failed: {}", e))?;
        Ok(result
            .into_value::<serde_json::Value>()
            .unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> Result<String> {
        self.page
            .content()
            .await
            .map_err(|e| anyhow!("failed to serialize page content: {}", e))
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        let bytes = self
            .page
            .screenshot(ScreenshotParams::builder().build())
            .await
            .map_err(|e| anyhow!("screenshot capture failed: {}", e))?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|e| anyhow!("screenshot write to {} failed: {}", path.display(), e))?;
        Ok(())
    }
}
