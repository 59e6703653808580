//! The resilience pipeline.
//!
//! Stage order is load-bearing: navigation (fatal on failure) → challenge
//! resolution → consent negotiation → recency filter → a second defensive
//! challenge pass → snapshot (fatal on failure). The middle stages are
//! best-effort; their failures are logged and the run proceeds in degraded
//! mode. The session is released exactly once on every exit path.

pub mod challenge;
pub mod consent;
pub mod filter;
pub mod navigate;
pub mod snapshot;

use std::path::Path;

use tracing::{error, info, warn};

use crate::browser::{CdpSession, PageDriver, SessionHandle};
use crate::core::config::SnapshotConfig;
use crate::core::errors::PipelineError;
use crate::core::types::{Job, PipelineResult, StageOutcome};
use crate::pipeline::challenge::{ChallengeOracle, TwoCaptchaOracle};

/// Diagnostic artifact captured when an essential stage fails.
pub const FATAL_DIAGNOSTIC_PATH: &str = "error-screenshot.png";

/// Run one job end to end against a real browser session.
pub async fn run_job(job: &Job, cfg: &SnapshotConfig) -> PipelineResult {
    let mut session = match CdpSession::acquire().await {
        Ok(s) => s,
        Err(e) => {
            error!("❌ {}", e);
            return PipelineResult::failed(e.to_string());
        }
    };
    let oracle = TwoCaptchaOracle::new(cfg.resolve_api_key());
    run_with_session(&mut session, &oracle, job, cfg).await
}

/// Session-generic orchestration: drives the stages, converts the outcome
/// into the boundary result, and guarantees release happens once whether
/// the stages succeeded, degraded, or failed fatally.
pub async fn run_with_session(
    session: &mut dyn SessionHandle,
    oracle: &dyn ChallengeOracle,
    job: &Job,
    cfg: &SnapshotConfig,
) -> PipelineResult {
    let outcome = execute(session.page(), oracle, job, cfg).await;

    if outcome.is_err() {
        // Best-effort capture of whatever the page looked like at failure.
        if let Err(e) = session.page().screenshot(Path::new(FATAL_DIAGNOSTIC_PATH)).await {
            warn!("Fatal-path screenshot failed: {}", e);
        }
    }

    session.release().await;

    match outcome {
        Ok(results) => PipelineResult::ok(results),
        Err(e) => {
            error!("❌ Critical error during scraping: {}", e);
            PipelineResult::failed(e.to_string())
        }
    }
}

async fn execute(
    page: &dyn PageDriver,
    oracle: &dyn ChallengeOracle,
    job: &Job,
    cfg: &SnapshotConfig,
) -> Result<Vec<String>, PipelineError> {
    let url = navigate::search_url(&job.query);
    info!("🔍 Opening search URL for query: {:?}", job.query);

    navigate::navigate(page, &url, cfg).await?;

    log_stage("challenge", &challenge::resolve(page, oracle, cfg).await);
    log_stage("consent", &consent::negotiate(page, cfg).await);
    log_stage("filter", &filter::apply_recency_filter(page, cfg).await);
    // Defensive re-check: the filter navigation can surface a fresh
    // challenge. Independent attempt counter, same policy.
    info!("🔍 Final CAPTCHA check...");
    log_stage("challenge-recheck", &challenge::resolve(page, oracle, cfg).await);

    let artifact = snapshot::write(page, cfg).await?;
    Ok(vec![artifact.file.to_string_lossy().into_owned()])
}

fn log_stage(name: &str, outcome: &StageOutcome) {
    match outcome {
        StageOutcome::Succeeded => info!("Stage {name}: succeeded"),
        StageOutcome::SkippedNotPresent => info!("Stage {name}: nothing to do"),
        StageOutcome::FailedNonFatal(reason) => {
            warn!("Stage {name}: degraded — {reason}")
        }
    }
}
