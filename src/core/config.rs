//! File-based config loader (`serp-snapshot.json`) with env-var fallback.
//!
//! Loaded once at process start and passed explicitly into every stage —
//! nothing reads configuration ad hoc mid-pipeline. Every timed wait in the
//! pipeline is a named tunable here rather than an inlined magic number;
//! the defaults are the settling heuristics the target surface needs in
//! production, and tests shrink them to keep the suite fast.

use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "SERP_SNAPSHOT_CONFIG";
pub const ENV_TWO_CAPTCHA_API_KEY: &str = "TWO_CAPTCHA_API_KEY";
pub const ENV_OUTPUT_ROOT: &str = "SERP_SNAPSHOT_OUTPUT_ROOT";

// Stage defaults, in milliseconds unless noted.
const DEFAULT_NAVIGATION_TIMEOUT_MS: u64 = 180_000;
const DEFAULT_POST_LOAD_SETTLE_MS: u64 = 5_000;
const DEFAULT_CHALLENGE_ATTEMPTS: u32 = 3;
const DEFAULT_POST_SOLVE_COOLDOWN_MS: u64 = 10_000;
const DEFAULT_SOLVE_RETRY_COOLDOWN_MS: u64 = 15_000;
const DEFAULT_LANGUAGE_MENU_WAIT_MS: u64 = 3_000;
const DEFAULT_LANGUAGE_SETTLE_MS: u64 = 5_000;
const DEFAULT_CONSENT_SETTLE_MS: u64 = 3_000;
const DEFAULT_TOOLS_WAIT_MS: u64 = 10_000;
const DEFAULT_TOOLS_MENU_WAIT_MS: u64 = 2_000;
const DEFAULT_FILTER_REFRESH_MS: u64 = 8_000;
const DEFAULT_OUTPUT_ROOT: &str = "pages";

/// Top-level config loaded from `serp-snapshot.json`.
///
/// All fields are optional: a missing file or missing field falls back to
/// env vars and then to the stage defaults above. A missing oracle key is
/// deliberately not fatal — oracle attempts then fail as "0 solved", which
/// the degraded-mode policy already absorbs.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct SnapshotConfig {
    /// 2Captcha API key. Never logged.
    pub two_captcha_api_key: Option<String>,
    pub navigation_timeout_ms: Option<u64>,
    pub post_load_settle_ms: Option<u64>,
    pub challenge_attempts: Option<u32>,
    pub post_solve_cooldown_ms: Option<u64>,
    pub solve_retry_cooldown_ms: Option<u64>,
    pub language_menu_wait_ms: Option<u64>,
    pub language_settle_ms: Option<u64>,
    pub consent_settle_ms: Option<u64>,
    pub tools_wait_ms: Option<u64>,
    pub tools_menu_wait_ms: Option<u64>,
    pub filter_refresh_ms: Option<u64>,
    /// Directory that receives one timestamped artifact directory per run.
    pub output_root: Option<String>,
}

impl SnapshotConfig {
    /// Oracle credential: JSON field → `TWO_CAPTCHA_API_KEY` env var → `None`.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(k) = &self.two_captcha_api_key {
            let k = k.trim();
            if !k.is_empty() {
                return Some(k.to_string());
            }
        }
        std::env::var(ENV_TWO_CAPTCHA_API_KEY)
            .ok()
            .filter(|v| !v.trim().is_empty())
    }

    /// Hard ceiling for reaching network quiescence after the initial load.
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(
            self.navigation_timeout_ms
                .unwrap_or(DEFAULT_NAVIGATION_TIMEOUT_MS),
        )
    }

    /// Fixed settle after a successful load, letting deferred scripts run.
    pub fn post_load_settle(&self) -> Duration {
        Duration::from_millis(self.post_load_settle_ms.unwrap_or(DEFAULT_POST_LOAD_SETTLE_MS))
    }

    /// Bounded attempt count for each challenge-resolution pass.
    pub fn challenge_attempts(&self) -> u32 {
        self.challenge_attempts
            .unwrap_or(DEFAULT_CHALLENGE_ATTEMPTS)
            .max(1)
    }

    /// Cooldown after a successful solve, for post-solve page mutation.
    pub fn post_solve_cooldown(&self) -> Duration {
        Duration::from_millis(
            self.post_solve_cooldown_ms
                .unwrap_or(DEFAULT_POST_SOLVE_COOLDOWN_MS),
        )
    }

    /// Cooldown between unsuccessful solve attempts.
    pub fn solve_retry_cooldown(&self) -> Duration {
        Duration::from_millis(
            self.solve_retry_cooldown_ms
                .unwrap_or(DEFAULT_SOLVE_RETRY_COOLDOWN_MS),
        )
    }

    /// Wait after clicking the language globe before scanning the menu.
    pub fn language_menu_wait(&self) -> Duration {
        Duration::from_millis(
            self.language_menu_wait_ms
                .unwrap_or(DEFAULT_LANGUAGE_MENU_WAIT_MS),
        )
    }

    /// Settle after switching the interface language.
    pub fn language_settle(&self) -> Duration {
        Duration::from_millis(self.language_settle_ms.unwrap_or(DEFAULT_LANGUAGE_SETTLE_MS))
    }

    /// Settle after dismissing a consent interstitial.
    pub fn consent_settle(&self) -> Duration {
        Duration::from_millis(self.consent_settle_ms.unwrap_or(DEFAULT_CONSENT_SETTLE_MS))
    }

    /// Bounded wait for the results "Tools" control to appear.
    pub fn tools_wait(&self) -> Duration {
        Duration::from_millis(self.tools_wait_ms.unwrap_or(DEFAULT_TOOLS_WAIT_MS))
    }

    /// Wait for the tools menu to unfold after the click.
    pub fn tools_menu_wait(&self) -> Duration {
        Duration::from_millis(self.tools_menu_wait_ms.unwrap_or(DEFAULT_TOOLS_MENU_WAIT_MS))
    }

    /// Wait for the result list to refresh after applying the filter.
    pub fn filter_refresh(&self) -> Duration {
        Duration::from_millis(self.filter_refresh_ms.unwrap_or(DEFAULT_FILTER_REFRESH_MS))
    }

    /// Artifact root: JSON field → `SERP_SNAPSHOT_OUTPUT_ROOT` env var → `pages`.
    pub fn output_root(&self) -> String {
        if let Some(root) = &self.output_root {
            if !root.trim().is_empty() {
                return root.clone();
            }
        }
        std::env::var(ENV_OUTPUT_ROOT)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OUTPUT_ROOT.to_string())
    }
}

/// Load `serp-snapshot.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `SERP_SNAPSHOT_CONFIG` env var path
/// 2. `./serp-snapshot.json` (process cwd)
/// 3. `../serp-snapshot.json` (one level up)
///
/// Missing file → `SnapshotConfig::default()` (silent, env fallbacks apply).
/// Parse error → log a warning, return defaults.
pub fn load_config() -> SnapshotConfig {
    let candidates: Vec<std::path::PathBuf> = {
        let mut v = vec![
            std::path::PathBuf::from("serp-snapshot.json"),
            std::path::PathBuf::from("../serp-snapshot.json"),
        ];
        if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
            v.insert(0, std::path::PathBuf::from(env_path));
        }
        v
    };

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<SnapshotConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("serp-snapshot.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "serp-snapshot.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return SnapshotConfig::default();
                }
            },
            Err(_) => continue, // not found at this path — try next
        }
    }

    SnapshotConfig::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_stage_budgets() {
        let cfg = SnapshotConfig::default();
        assert_eq!(cfg.navigation_timeout(), Duration::from_secs(180));
        assert_eq!(cfg.post_load_settle(), Duration::from_secs(5));
        assert_eq!(cfg.challenge_attempts(), 3);
        assert_eq!(cfg.post_solve_cooldown(), Duration::from_secs(10));
        assert_eq!(cfg.solve_retry_cooldown(), Duration::from_secs(15));
        assert_eq!(cfg.tools_wait(), Duration::from_secs(10));
        assert_eq!(cfg.filter_refresh(), Duration::from_secs(8));
    }

    #[test]
    fn json_fields_override_defaults() {
        let cfg: SnapshotConfig = serde_json::from_str(
            r#"{
                "two_captcha_api_key": "abc123",
                "navigation_timeout_ms": 1000,
                "challenge_attempts": 5,
                "output_root": "/tmp/artifacts"
            }"#,
        )
        .unwrap();
        assert_eq!(cfg.resolve_api_key().as_deref(), Some("abc123"));
        assert_eq!(cfg.navigation_timeout(), Duration::from_secs(1));
        assert_eq!(cfg.challenge_attempts(), 5);
        assert_eq!(cfg.output_root(), "/tmp/artifacts");
    }

    #[test]
    fn challenge_attempts_never_zero() {
        let cfg = SnapshotConfig {
            challenge_attempts: Some(0),
            ..Default::default()
        };
        assert_eq!(cfg.challenge_attempts(), 1);
    }

    #[test]
    fn blank_api_key_field_is_treated_as_absent() {
        let cfg = SnapshotConfig {
            two_captcha_api_key: Some("   ".to_string()),
            ..Default::default()
        };
        // Falls through to the env var, which the test does not set here;
        // either way a blank field must not yield a blank key.
        if let Some(k) = cfg.resolve_api_key() {
            assert!(!k.trim().is_empty());
        }
    }
}
