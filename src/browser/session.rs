//! Browser session lifecycle.
//!
//! One job owns exactly one browser process and one page. `CdpSession`
//! launches the process with automation-fingerprint suppression, hands the
//! pipeline a `PageDriver`, and guarantees teardown on every exit path:
//! `release` is idempotent, and `Drop` covers the crash path by spawning a
//! best-effort close.

use std::path::Path;

use async_trait::async_trait;
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Browser;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::browser::page::{CdpPage, PageDriver};
use crate::core::errors::PipelineError;

/// Fixed realistic client identity. The target profiles inconsistent
/// identities harder than old ones, so this stays constant per run rather
/// than rotating.
const CLIENT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

const VIEWPORT_WIDTH: u32 = 1920;
const VIEWPORT_HEIGHT: u32 = 1080;

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan — catches package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_browser_executable() -> Option<String> {
    if let Ok(p) = std::env::var("CHROME_EXECUTABLE") {
        if Path::new(&p).exists() {
            return Some(p);
        }
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let names = ["google-chrome", "chromium", "chromium-browser", "chrome"];
        for dir in std::env::split_paths(&path_var) {
            for exe in names {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    let well_known = [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];
    #[cfg(target_os = "linux")]
    let well_known = [
        "/usr/bin/google-chrome",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/usr/local/bin/chromium",
    ];
    #[cfg(target_os = "windows")]
    let well_known = [
        r"C:\Program Files\Google\Chrome\Application\chrome.exe",
        r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
    ];

    well_known
        .into_iter()
        .find(|c| Path::new(*c).exists())
        .map(|c| c.to_string())
}

/// Build the launch config with the evasion profile:
/// `--disable-blink-features=AutomationControlled` hides `navigator.webdriver`,
/// the sandbox flags keep the launch viable in CI/containers, and the UA is
/// the fixed identity above.
fn build_session_config(exe: &str) -> Result<BrowserConfig, String> {
    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width: VIEWPORT_WIDTH,
            height: VIEWPORT_HEIGHT,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(VIEWPORT_WIDTH, VIEWPORT_HEIGHT)
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-gpu")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={CLIENT_USER_AGENT}"))
        .build()
}

/// The session seam the orchestrator runs against. Production is
/// `CdpSession`; tests substitute a fake to observe release semantics.
#[async_trait]
pub trait SessionHandle: Send {
    fn page(&self) -> &dyn PageDriver;

    /// Tear down the browser process. Must be safe to call more than once;
    /// only the first call does work.
    async fn release(&mut self);
}

/// An exclusively-owned live browser process plus one page within it.
pub struct CdpSession {
    browser: Option<Browser>,
    handler: Option<JoinHandle<()>>,
    page: CdpPage,
}

impl CdpSession {
    /// Launch the browser and open the working tab. Launch failure is fatal
    /// for the job — there is no pipeline without a session.
    pub async fn acquire() -> Result<Self, PipelineError> {
        let exe = find_browser_executable().ok_or_else(|| {
            PipelineError::BrowserLaunch(
                "no Chromium-family browser found; set CHROME_EXECUTABLE".to_string(),
            )
        })?;

        let config = build_session_config(&exe)
            .map_err(|e| PipelineError::BrowserLaunch(format!("bad launch config: {e}")))?;

        info!("🚀 Launching browser session ({})", exe);
        let (mut browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| PipelineError::BrowserLaunch(format!("launch failed ({exe}): {e}")))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    warn!("CDP handler error: {}", e);
                }
            }
        });

        let page = match browser.new_page("about:blank").await {
            Ok(p) => p,
            Err(e) => {
                let _ = browser.close().await;
                handler_task.abort();
                return Err(PipelineError::BrowserLaunch(format!(
                    "failed to open tab: {e}"
                )));
            }
        };

        Ok(Self {
            browser: Some(browser),
            handler: Some(handler_task),
            page: CdpPage::new(page),
        })
    }
}

#[async_trait]
impl SessionHandle for CdpSession {
    fn page(&self) -> &dyn PageDriver {
        &self.page
    }

    async fn release(&mut self) {
        if let Some(mut browser) = self.browser.take() {
            if let Err(e) = browser.close().await {
                warn!("Browser close error (non-fatal): {}", e);
            } else {
                info!("🛑 Browser session released");
            }
        }
        if let Some(handle) = self.handler.take() {
            handle.abort();
        }
    }
}

impl Drop for CdpSession {
    fn drop(&mut self) {
        // Drop cannot await; if we're inside a tokio runtime, spawn a task
        // to close the browser to avoid zombie Chromium processes. The
        // handler must keep running until the close command goes out.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        if let Some(mut browser) = self.browser.take() {
            let handler = self.handler.take();
            runtime.spawn(async move {
                let _ = browser.close().await;
                if let Some(h) = handler {
                    h.abort();
                }
            });
        }
    }
}
