//! Essential stage: load the search results page.
//!
//! The page must reach network quiescence inside the navigation budget or
//! the whole job fails — every later stage needs a rendered document.

use std::time::Duration;

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use tracing::info;

use crate::browser::PageDriver;
use crate::core::config::SnapshotConfig;
use crate::core::errors::PipelineError;

const SEARCH_BASE_URL: &str = "https://www.google.com/search?q=";

/// Window the resource count must hold still for before the page counts
/// as idle.
const QUIET_WINDOW: Duration = Duration::from_millis(1_500);

pub fn search_url(query: &str) -> String {
    format!(
        "{SEARCH_BASE_URL}{}",
        utf8_percent_encode(query, NON_ALPHANUMERIC)
    )
}

pub async fn navigate(
    page: &dyn PageDriver,
    url: &str,
    cfg: &SnapshotConfig,
) -> Result<(), PipelineError> {
    info!("🌐 Navigating to {}", url);

    page.goto(url)
        .await
        .map_err(|e| PipelineError::NavigationTimeout(format!("initial load failed: {e}")))?;

    let timeout = cfg.navigation_timeout();
    let idle = page
        .wait_until_idle(QUIET_WINDOW, timeout)
        .await
        .map_err(|e| PipelineError::NavigationTimeout(format!("idle wait failed: {e}")))?;
    if !idle {
        return Err(PipelineError::NavigationTimeout(format!(
            "network never settled within {}ms",
            timeout.as_millis()
        )));
    }

    // Deferred scripts keep mutating the page after the network settles.
    let settle = cfg.post_load_settle();
    info!("⏳ Waiting {}s - initial page load", settle.as_secs());
    tokio::time::sleep(settle).await;

    Ok(())
}
