//! Best-effort stage: resolve anti-automation challenges.
//!
//! Bounded-attempt loop around an external solving oracle. The policy:
//! stop on the first attempt that solves anything (plus a cooldown for the
//! post-solve page mutation), escalate with a longer cooldown between empty
//! attempts, and after exhaustion capture a diagnostic screenshot and let
//! the pipeline continue in degraded mode. Oracle transport errors count
//! as "0 solved" for that attempt.
//!
//! The stage is invoked twice per job (post-navigation and post-filter)
//! with an independent attempt counter each time.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use tracing::{info, warn};

use crate::browser::PageDriver;
use crate::core::config::SnapshotConfig;
use crate::core::types::StageOutcome;

/// Diagnostic artifact written when every attempt comes back empty.
pub const CHALLENGE_DIAGNOSTIC_PATH: &str = "captcha-failure.png";

/// The external solving service: one "attempt to solve all challenges on
/// the current page" operation returning a solved count.
#[async_trait]
pub trait ChallengeOracle: Send + Sync {
    async fn solve_all(&self, page: &dyn PageDriver) -> Result<u32>;
}

/// Run one bounded resolution pass. Never fails the job.
pub async fn resolve(
    page: &dyn PageDriver,
    oracle: &dyn ChallengeOracle,
    cfg: &SnapshotConfig,
) -> StageOutcome {
    let attempts = cfg.challenge_attempts();

    for attempt in 1..=attempts {
        info!("🔒 Attempting to solve CAPTCHAs (attempt {attempt}/{attempts})...");

        match oracle.solve_all(page).await {
            Ok(solved) if solved > 0 => {
                info!("✅ Solved {} CAPTCHA(s)", solved);
                let cooldown = cfg.post_solve_cooldown();
                info!("⏳ Waiting {}s - post-solve page mutation", cooldown.as_secs());
                tokio::time::sleep(cooldown).await;
                return StageOutcome::Succeeded;
            }
            Ok(_) => {}
            Err(e) => {
                // Transport/solver errors are indistinguishable from an
                // unsolved page for retry purposes.
                warn!("⚠️ Solve attempt errored (counts as unsolved): {}", e);
            }
        }

        if attempt < attempts {
            let cooldown = cfg.solve_retry_cooldown();
            info!("⏳ Waiting {}s before retry", cooldown.as_secs());
            tokio::time::sleep(cooldown).await;
        }
    }

    warn!("❌ Failed to solve CAPTCHAs after {attempts} attempts");
    if let Err(e) = page.screenshot(Path::new(CHALLENGE_DIAGNOSTIC_PATH)).await {
        warn!("Diagnostic screenshot failed (non-fatal): {}", e);
    }
    StageOutcome::FailedNonFatal(format!("no challenges solved after {attempts} attempts"))
}

// ── 2Captcha oracle ──────────────────────────────────────────────────────────

const SUBMIT_URL: &str = "https://2captcha.com/in.php";
const POLL_URL: &str = "https://2captcha.com/res.php";
const POLL_INTERVAL: Duration = Duration::from_secs(5);
const SOLVE_TIMEOUT: Duration = Duration::from_secs(120);

/// Collects every reCAPTCHA sitekey visible on the page: explicit
/// `data-sitekey` widgets plus anchor-iframe `k=` parameters.
const SITEKEY_SCAN_JS: &str = r#"
(() => {
  const keys = new Set();
  document.querySelectorAll('[data-sitekey]').forEach(el => {
    const k = el.getAttribute('data-sitekey');
    if (k) keys.add(k);
  });
  document.querySelectorAll("iframe[src*='recaptcha']").forEach(f => {
    try {
      const k = new URL(f.src).searchParams.get('k');
      if (k) keys.add(k);
    } catch (e) {}
  });
  return [...keys];
})()
"#;

/// Production oracle backed by the 2Captcha HTTP API: submit the sitekey,
/// poll for the answer token, inject it into the page's response textarea.
pub struct TwoCaptchaOracle {
    client: reqwest::Client,
    api_key: Option<String>,
}

impl TwoCaptchaOracle {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
        }
    }

    async fn request_token(&self, key: &str, sitekey: &str, page_url: &str) -> Result<String> {
        let submit: serde_json::Value = self
            .client
            .get(SUBMIT_URL)
            .query(&[
                ("key", key),
                ("method", "userrecaptcha"),
                ("googlekey", sitekey),
                ("pageurl", page_url),
                ("json", "1"),
            ])
            .send()
            .await?
            .json()
            .await?;

        if submit["status"].as_i64() != Some(1) {
            bail!("2captcha submit rejected: {}", submit["request"]);
        }
        let task_id = submit["request"].as_str().unwrap_or_default().to_string();

        let deadline = Instant::now() + SOLVE_TIMEOUT;
        loop {
            tokio::time::sleep(POLL_INTERVAL).await;

            let res: serde_json::Value = self
                .client
                .get(POLL_URL)
                .query(&[
                    ("key", key),
                    ("action", "get"),
                    ("id", task_id.as_str()),
                    ("json", "1"),
                ])
                .send()
                .await?
                .json()
                .await?;

            if res["status"].as_i64() == Some(1) {
                return res["request"]
                    .as_str()
                    .map(str::to_string)
                    .ok_or_else(|| anyhow!("2captcha returned an empty token"));
            }
            let code = res["request"].as_str().unwrap_or("");
            if code != "CAPCHA_NOT_READY" {
                bail!("2captcha error: {}", code);
            }
            if Instant::now() >= deadline {
                bail!("2captcha solve timed out after {}s", SOLVE_TIMEOUT.as_secs());
            }
        }
    }
}

#[async_trait]
impl ChallengeOracle for TwoCaptchaOracle {
    async fn solve_all(&self, page: &dyn PageDriver) -> Result<u32> {
        let key = self
            .api_key
            .as_deref()
            .ok_or_else(|| anyhow!("2captcha API key not configured"))?;

        let sitekeys: Vec<String> =
            serde_json::from_value(page.evaluate(SITEKEY_SCAN_JS).await?).unwrap_or_default();
        if sitekeys.is_empty() {
            return Ok(0);
        }

        let page_url = page
            .evaluate("window.location.href")
            .await?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow!("page URL unavailable"))?;

        let mut solved = 0u32;
        for sitekey in &sitekeys {
            match self.request_token(key, sitekey, &page_url).await {
                Ok(token) => {
                    let inject = format!(
                        r#"
(() => {{
  let injected = 0;
  document.querySelectorAll("textarea[name='g-recaptcha-response']").forEach(t => {{
    t.style.display = 'block';
    t.value = '{token}';
    injected++;
  }});
  return injected;
}})()
"#
                    );
                    page.evaluate(&inject).await?;
                    solved += 1;
                }
                Err(e) => warn!("⚠️ 2captcha solve failed for sitekey {}: {}", sitekey, e),
            }
        }
        Ok(solved)
    }
}
