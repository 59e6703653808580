//! Best-effort stage: clear locale and cookie-consent interstitials.
//!
//! Two ordered sub-steps. First the interface language is normalized to
//! English (UK) so later label matching has a stable locale to aim at;
//! then the consent dialog is dismissed by trying a fixed priority list of
//! differently localized "accept all" affordances and stopping at the
//! first hit. The consent list carries its own locale variants, so it does
//! not depend on the language switch having worked.
//!
//! Nothing in here may abort the job: errors downgrade to
//! `FailedNonFatal`, and an absent control just ends its sub-step.

use anyhow::Result;
use tracing::{info, warn};

use crate::browser::PageDriver;
use crate::core::config::SnapshotConfig;
use crate::core::types::StageOutcome;

/// One try-find-and-act locator. The variants differ in how they find the
/// element; both click it and report whether anything matched.
#[derive(Debug, Clone, Copy)]
enum Locator {
    /// Plain CSS selector, clicked through the engine.
    Css(&'static str),
    /// Button-like element (`<button>` or `div[role=button]`) whose text
    /// contains the label, matched case-insensitively in the page.
    ButtonText(&'static str),
}

impl Locator {
    async fn try_click(&self, page: &dyn PageDriver) -> Result<bool> {
        match self {
            Locator::Css(selector) => page.click(selector).await,
            Locator::ButtonText(label) => {
                let script = format!(
                    r#"
(() => {{
  const want = '{label}'.toLowerCase();
  const nodes = [...document.querySelectorAll("button, div[role='button']")];
  const hit = nodes.find(n => (n.textContent || '').trim().toLowerCase().includes(want));
  if (hit) {{ hit.click(); return true; }}
  return false;
}})()
"#
                );
                Ok(page.evaluate(&script).await?.as_bool().unwrap_or(false))
            }
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Locator::Css(s) => s,
            Locator::ButtonText(t) => t,
        }
    }
}

/// Ways the language globe shows up, highest priority first.
const LANGUAGE_CONTROL_LOCATORS: &[Locator] = &[
    Locator::Css("div.QS5gu.ud1jmf"),
    Locator::Css(r#"div[aria-label*="language"]"#),
    Locator::Css(r#"div[aria-label*="język"]"#),
];

/// Target entry in the revealed language menu.
const LANGUAGE_OPTION_JS: &str = r#"
(() => {
  const items = [...document.querySelectorAll("li.Ge0Aub[role='menuitem']")];
  const hit = items.find(el => (el.getAttribute('aria-label') || '').includes('English (United Kingdom)'));
  if (hit) { hit.click(); return true; }
  return false;
})()
"#;

/// Consent affordances in priority order: the known class selector first,
/// then the localized label variants, then the aria-label fallback.
const CONSENT_LOCATORS: &[Locator] = &[
    Locator::Css("div.QS5gu.sy4vM"),
    Locator::ButtonText("Accept all"),
    Locator::ButtonText("Zaakceptuj wszystko"),
    Locator::ButtonText("I agree"),
    Locator::ButtonText("Akceptuję"),
    Locator::Css(r#"button[aria-label="Accept all"]"#),
];

pub async fn negotiate(page: &dyn PageDriver, cfg: &SnapshotConfig) -> StageOutcome {
    info!("🌍 Checking for language/cookie popups...");

    // Sub-step failure here must not keep the consent scan from running.
    if let Err(e) = normalize_language(page, cfg).await {
        warn!("⚠️ Language normalization failed (non-fatal): {}", e);
    }

    match dismiss_consent(page, cfg).await {
        Ok(true) => StageOutcome::Succeeded,
        Ok(false) => {
            info!("No consent interstitial found");
            StageOutcome::SkippedNotPresent
        }
        Err(e) => {
            warn!("⚠️ Consent handling failed (non-fatal): {}", e);
            StageOutcome::FailedNonFatal(e.to_string())
        }
    }
}

/// Switch the interface to English (UK) when the language globe is present.
/// Every absent control simply ends the sub-step.
async fn normalize_language(page: &dyn PageDriver, cfg: &SnapshotConfig) -> Result<()> {
    for locator in LANGUAGE_CONTROL_LOCATORS {
        if locator.try_click(page).await? {
            info!("🌐 Clicked language selector ({})", locator.describe());
            tokio::time::sleep(cfg.language_menu_wait()).await;

            let switched = page
                .evaluate(LANGUAGE_OPTION_JS)
                .await?
                .as_bool()
                .unwrap_or(false);
            if switched {
                info!("⏳ Language changed to English (UK)");
                tokio::time::sleep(cfg.language_settle()).await;
            }
            return Ok(());
        }
    }
    Ok(())
}

/// Click the first matching "accept all" affordance. `Ok(false)` when the
/// whole list is exhausted without a match.
async fn dismiss_consent(page: &dyn PageDriver, cfg: &SnapshotConfig) -> Result<bool> {
    for locator in CONSENT_LOCATORS {
        if locator.try_click(page).await? {
            info!(
                "🍪 Clicked \"Accept all\" consent button ({})",
                locator.describe()
            );
            tokio::time::sleep(cfg.consent_settle()).await;
            return Ok(true);
        }
    }
    Ok(false)
}
