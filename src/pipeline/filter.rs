//! Best-effort stage: narrow results to the past 24 hours.
//!
//! The "Tools" control only exists on a fully rendered results page, so the
//! stage polls for it up to a bound, opens the menu, and matches entries on
//! both the stable `tbs=qdr:d` href attribute and a tolerant recency phrase
//! in the visible text. Any miss leaves the pipeline on unfiltered results.

use std::sync::OnceLock;
use std::time::Duration;

use anyhow::Result;
use regex::Regex;
use tracing::{info, warn};

use crate::browser::PageDriver;
use crate::core::config::SnapshotConfig;
use crate::core::types::StageOutcome;

const TOOLS_CONTROL: &str = "#hdtb-tls";
const TOOLS_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Visible texts of the recency menu entries, in DOM order. Matching
/// happens in Rust so the phrase tolerance lives in one testable place.
const MENU_ENTRY_TEXTS_JS: &str = r#"
(() => {
  const links = [...document.querySelectorAll("div[jsname='qRxief'] a[href*='tbs=qdr:d']")];
  return links.map(a => a.textContent || '');
})()
"#;

/// Phrase variance observed in the wild: spacing differs, casing differs.
fn recency_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)past\s*24\s*hours").expect("valid recency pattern"))
}

pub async fn apply_recency_filter(page: &dyn PageDriver, cfg: &SnapshotConfig) -> StageOutcome {
    info!("⏱️ Applying time filter...");
    match apply_inner(page, cfg).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("⚠️ Failed to apply time filter (non-fatal): {}", e);
            StageOutcome::FailedNonFatal(e.to_string())
        }
    }
}

async fn apply_inner(page: &dyn PageDriver, cfg: &SnapshotConfig) -> Result<StageOutcome> {
    if !wait_for_tools_control(page, cfg.tools_wait()).await? {
        info!("Tools control never appeared — leaving results unfiltered");
        return Ok(StageOutcome::SkippedNotPresent);
    }
    tokio::time::sleep(cfg.tools_menu_wait()).await;

    let texts: Vec<String> =
        serde_json::from_value(page.evaluate(MENU_ENTRY_TEXTS_JS).await?).unwrap_or_default();
    let Some(index) = texts.iter().position(|t| recency_pattern().is_match(t)) else {
        info!("No past-24-hours entry in the tools menu");
        return Ok(StageOutcome::SkippedNotPresent);
    };

    let click_entry = format!(
        r#"
(() => {{
  const links = [...document.querySelectorAll("div[jsname='qRxief'] a[href*='tbs=qdr:d']")];
  const a = links[{index}];
  if (a) {{ a.click(); return true; }}
  return false;
}})()
"#
    );
    let clicked = page.evaluate(&click_entry).await?.as_bool().unwrap_or(false);
    if !clicked {
        return Ok(StageOutcome::FailedNonFatal(
            "recency entry vanished before the click".to_string(),
        ));
    }

    let refresh = cfg.filter_refresh();
    info!("⏳ Waiting {}s - time filter refresh", refresh.as_secs());
    tokio::time::sleep(refresh).await;
    Ok(StageOutcome::Succeeded)
}

/// Poll-click the tools control until it lands or the bound elapses.
async fn wait_for_tools_control(page: &dyn PageDriver, bound: Duration) -> Result<bool> {
    let start = std::time::Instant::now();
    loop {
        if page.click(TOOLS_CONTROL).await? {
            return Ok(true);
        }
        if start.elapsed() >= bound {
            return Ok(false);
        }
        tokio::time::sleep(TOOLS_POLL_INTERVAL).await;
    }
}
