//! Pipeline behavior tests against a fake DOM, session, and solving oracle.
//!
//! The fakes model the hostile surface deterministically: which controls
//! exist, whether the network ever settles, and what the oracle reports
//! per attempt. All settling waits are shrunk via config so the suite
//! stays fast.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::json;

use serp_snapshot::browser::{PageDriver, SessionHandle};
use serp_snapshot::core::config::SnapshotConfig;
use serp_snapshot::core::types::{Job, StageOutcome};
use serp_snapshot::pipeline::challenge::{self, ChallengeOracle};
use serp_snapshot::pipeline::{self, consent, filter, snapshot};

fn init_logger() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_test_writer()
        .try_init();
}

/// Config with every settling wait collapsed so tests run in milliseconds.
fn fast_cfg(output_root: &Path) -> SnapshotConfig {
    SnapshotConfig {
        navigation_timeout_ms: Some(50),
        post_load_settle_ms: Some(0),
        challenge_attempts: Some(3),
        post_solve_cooldown_ms: Some(0),
        solve_retry_cooldown_ms: Some(1),
        language_menu_wait_ms: Some(0),
        language_settle_ms: Some(0),
        consent_settle_ms: Some(0),
        tools_wait_ms: Some(20),
        tools_menu_wait_ms: Some(0),
        filter_refresh_ms: Some(0),
        output_root: Some(output_root.to_string_lossy().into_owned()),
        ..Default::default()
    }
}

// ── Fake DOM ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FakePage {
    /// CSS selectors that exist and can be clicked.
    selectors: HashSet<String>,
    /// Labels of button-like elements present on the page.
    button_labels: Vec<String>,
    /// Visible texts of the tools-menu recency entries.
    menu_texts: Vec<String>,
    /// Serialized document returned by `content()`.
    html: String,
    /// Whether navigation ever reaches network quiescence.
    idle: bool,
    goto_urls: Mutex<Vec<String>>,
    clicks: Mutex<Vec<String>>,
    evals: Mutex<Vec<String>>,
    screenshots: Mutex<Vec<PathBuf>>,
}

impl FakePage {
    fn loaded(html: &str) -> Self {
        Self {
            html: html.to_string(),
            idle: true,
            ..Default::default()
        }
    }

    fn clicks(&self) -> Vec<String> {
        self.clicks.lock().unwrap().clone()
    }

    fn screenshots(&self) -> Vec<PathBuf> {
        self.screenshots.lock().unwrap().clone()
    }
}

#[async_trait]
impl PageDriver for FakePage {
    async fn goto(&self, url: &str) -> Result<()> {
        self.goto_urls.lock().unwrap().push(url.to_string());
        Ok(())
    }

    async fn wait_until_idle(&self, _quiet: Duration, _timeout: Duration) -> Result<bool> {
        Ok(self.idle)
    }

    async fn click(&self, selector: &str) -> Result<bool> {
        if self.selectors.contains(selector) {
            self.clicks.lock().unwrap().push(selector.to_string());
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn evaluate(&self, script: &str) -> Result<serde_json::Value> {
        self.evals.lock().unwrap().push(script.to_string());

        // Button-text locator scripts: true only for labels this DOM has.
        for label in &self.button_labels {
            if script.contains(label.as_str()) {
                self.clicks.lock().unwrap().push(label.clone());
                return Ok(json!(true));
            }
        }
        if script.contains("div[role='button']") || script.contains("Ge0Aub") {
            return Ok(json!(false));
        }
        // Tools-menu scripts: a specific entry click, or the text listing.
        if script.contains("links[") {
            return Ok(json!(true));
        }
        if script.contains("jsname='qRxief'") {
            return Ok(json!(self.menu_texts));
        }
        if script.contains("location.href") {
            return Ok(json!("https://www.google.com/search?q=test"));
        }
        Ok(serde_json::Value::Null)
    }

    async fn content(&self) -> Result<String> {
        Ok(self.html.clone())
    }

    async fn screenshot(&self, path: &Path) -> Result<()> {
        self.screenshots.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }
}

// ── Fake session ─────────────────────────────────────────────────────────────

struct FakeSession {
    page: Arc<FakePage>,
    released: AtomicUsize,
}

impl FakeSession {
    fn new(page: Arc<FakePage>) -> Self {
        Self {
            page,
            released: AtomicUsize::new(0),
        }
    }

    fn release_count(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionHandle for FakeSession {
    fn page(&self) -> &dyn PageDriver {
        self.page.as_ref()
    }

    async fn release(&mut self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

// ── Fake oracle ──────────────────────────────────────────────────────────────

/// Scripted oracle: each attempt pops the next report (`None` models a
/// transport error). An exhausted script keeps reporting 0 solved.
struct FakeOracle {
    script: Mutex<VecDeque<Option<u32>>>,
    calls: AtomicUsize,
}

impl FakeOracle {
    fn scripted(reports: &[Option<u32>]) -> Self {
        Self {
            script: Mutex::new(reports.iter().copied().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    fn quiet() -> Self {
        Self::scripted(&[])
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChallengeOracle for FakeOracle {
    async fn solve_all(&self, _page: &dyn PageDriver) -> Result<u32> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(Some(count)) => Ok(count),
            Some(None) => Err(anyhow!("oracle unreachable")),
            None => Ok(0),
        }
    }
}

// ── Challenge policy ─────────────────────────────────────────────────────────

#[tokio::test]
async fn challenge_stops_on_first_attempt_reporting_a_solve() {
    init_logger();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = fast_cfg(tmp.path());
    let page = FakePage::loaded("<html></html>");
    let oracle = FakeOracle::scripted(&[Some(0), Some(0), Some(1), Some(9)]);

    let outcome = challenge::resolve(&page, &oracle, &cfg).await;

    assert_eq!(outcome, StageOutcome::Succeeded);
    assert_eq!(oracle.call_count(), 3, "must stop right after the solve");
}

#[tokio::test]
async fn challenge_exhaustion_degrades_and_captures_a_diagnostic() {
    init_logger();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = fast_cfg(tmp.path());
    let page = FakePage::loaded("<html></html>");
    let oracle = FakeOracle::scripted(&[Some(0), Some(0), Some(0)]);

    let outcome = challenge::resolve(&page, &oracle, &cfg).await;

    assert!(matches!(outcome, StageOutcome::FailedNonFatal(_)));
    assert_eq!(oracle.call_count(), 3);
    assert_eq!(
        page.screenshots(),
        vec![PathBuf::from(challenge::CHALLENGE_DIAGNOSTIC_PATH)]
    );
}

#[tokio::test]
async fn challenge_oracle_errors_count_as_unsolved_attempts() {
    init_logger();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = fast_cfg(tmp.path());
    let page = FakePage::loaded("<html></html>");
    let oracle = FakeOracle::scripted(&[None, None, Some(2)]);

    let outcome = challenge::resolve(&page, &oracle, &cfg).await;

    assert_eq!(outcome, StageOutcome::Succeeded);
    assert_eq!(oracle.call_count(), 3);
}

// ── Consent priority order ───────────────────────────────────────────────────

#[tokio::test]
async fn consent_clicks_only_the_first_matching_strategy() {
    init_logger();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = fast_cfg(tmp.path());

    // Only the third-priority affordance (Polish label) exists.
    let mut page = FakePage::loaded("<html></html>");
    page.button_labels = vec!["Zaakceptuj wszystko".to_string()];

    let outcome = consent::negotiate(&page, &cfg).await;

    assert_eq!(outcome, StageOutcome::Succeeded);
    assert_eq!(page.clicks(), vec!["Zaakceptuj wszystko".to_string()]);
}

#[tokio::test]
async fn consent_first_priority_short_circuits_the_rest() {
    init_logger();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = fast_cfg(tmp.path());

    let mut page = FakePage::loaded("<html></html>");
    page.selectors.insert("div.QS5gu.sy4vM".to_string());
    // A lower-priority label also exists but must never be reached.
    page.button_labels = vec!["Accept all".to_string()];

    let outcome = consent::negotiate(&page, &cfg).await;

    assert_eq!(outcome, StageOutcome::Succeeded);
    assert_eq!(page.clicks(), vec!["div.QS5gu.sy4vM".to_string()]);
}

#[tokio::test]
async fn consent_absence_is_skipped_not_failed() {
    init_logger();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = fast_cfg(tmp.path());
    let page = FakePage::loaded("<html></html>");

    assert_eq!(
        consent::negotiate(&page, &cfg).await,
        StageOutcome::SkippedNotPresent
    );
    assert!(page.clicks().is_empty());
}

// ── Recency filter ───────────────────────────────────────────────────────────

#[tokio::test]
async fn filter_clicks_the_recency_entry_by_text_match() {
    init_logger();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = fast_cfg(tmp.path());

    let mut page = FakePage::loaded("<html></html>");
    page.selectors.insert("#hdtb-tls".to_string());
    page.menu_texts = vec!["Past hour".to_string(), "Past 24 hours".to_string()];

    let outcome = filter::apply_recency_filter(&page, &cfg).await;

    assert_eq!(outcome, StageOutcome::Succeeded);
    assert!(page.clicks().contains(&"#hdtb-tls".to_string()));
    // The second entry (index 1) is the one matching the recency phrase.
    let evals = page.evals.lock().unwrap().clone();
    assert!(evals.iter().any(|s| s.contains("links[1]")));
}

#[tokio::test]
async fn filter_missing_tools_control_is_skipped() {
    init_logger();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = fast_cfg(tmp.path());
    let page = FakePage::loaded("<html></html>");

    assert_eq!(
        filter::apply_recency_filter(&page, &cfg).await,
        StageOutcome::SkippedNotPresent
    );
}

// ── Snapshot writer ──────────────────────────────────────────────────────────

#[tokio::test]
async fn snapshot_writes_distinct_nonempty_artifacts() {
    init_logger();
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("deep").join("pages");
    let cfg = fast_cfg(&root);
    let page = FakePage::loaded("<html><body>rendered</body></html>");

    let first = snapshot::write(&page, &cfg).await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    let second = snapshot::write(&page, &cfg).await.unwrap();

    assert_ne!(first.file, second.file, "millisecond disambiguator");
    for artifact in [&first, &second] {
        assert!(artifact.file.starts_with(&root), "parent created under root");
        let body = std::fs::read_to_string(&artifact.file).unwrap();
        assert_eq!(body, "<html><body>rendered</body></html>");
    }
}

// ── End to end ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn pipeline_succeeds_on_a_clean_page() {
    init_logger();
    let tmp = tempfile::tempdir().unwrap();
    let cfg = fast_cfg(tmp.path());
    let html = "<html><body>serp</body></html>";
    let page = Arc::new(FakePage::loaded(html));
    let mut session = FakeSession::new(page.clone());
    let oracle = FakeOracle::quiet();
    let job = Job {
        query: "weather today".to_string(),
    };

    let result = pipeline::run_with_session(&mut session, &oracle, &job, &cfg).await;

    assert!(result.success, "error: {:?}", result.error);
    assert_eq!(result.results.len(), 1);
    assert!(result.results[0].contains("google-results-"));
    assert_eq!(std::fs::read_to_string(&result.results[0]).unwrap(), html);
    assert_eq!(session.release_count(), 1);

    let visited = page.goto_urls.lock().unwrap().clone();
    assert_eq!(
        visited,
        vec!["https://www.google.com/search?q=weather%20today".to_string()]
    );
    // Both resolution passes ran their full bounded budget.
    assert_eq!(oracle.call_count(), 6);
}

#[tokio::test]
async fn pipeline_fails_fatally_when_navigation_never_settles() {
    init_logger();
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path().join("out");
    let cfg = fast_cfg(&root);
    let mut page = FakePage::loaded("<html></html>");
    page.idle = false;
    let page = Arc::new(page);
    let mut session = FakeSession::new(page.clone());
    let oracle = FakeOracle::quiet();
    let job = Job {
        query: "weather today".to_string(),
    };

    let result = pipeline::run_with_session(&mut session, &oracle, &job, &cfg).await;

    assert!(!result.success);
    assert!(result
        .error
        .as_deref()
        .unwrap()
        .starts_with("NavigationTimeoutError"));
    assert!(result.results.is_empty());
    assert_eq!(session.release_count(), 1, "release exactly once on failure");
    assert!(!root.exists(), "no artifact may be written");
    assert_eq!(oracle.call_count(), 0, "no stage runs after a fatal navigation");
    assert_eq!(
        page.screenshots(),
        vec![PathBuf::from(pipeline::FATAL_DIAGNOSTIC_PATH)]
    );
}
