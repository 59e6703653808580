use serde::{Deserialize, Serialize};

use crate::core::errors::PipelineError;

/// One unit of work: a single search query, read once from stdin.
#[derive(Debug, Clone, Deserialize)]
pub struct Job {
    pub query: String,
}

impl Job {
    /// Parse the line-delimited JSON payload the process boundary receives.
    ///
    /// Anything that is not `{"query": "..."}` is a malformed input and the
    /// process must exit non-zero without touching the browser.
    pub fn from_payload(payload: &str) -> Result<Self, PipelineError> {
        serde_json::from_str(payload)
            .map_err(|e| PipelineError::MalformedInput(format!("invalid job payload: {e}")))
    }
}

/// Result of a best-effort stage. Optional stages never hard-fail; they
/// report one of these and the pipeline moves on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Succeeded,
    /// The control the stage acts on was simply not on the page.
    SkippedNotPresent,
    /// The stage ran and failed; the reason is diagnostic-only.
    FailedNonFatal(String),
}

/// The single externally observable output, written as one JSON line
/// to stdout.
#[derive(Debug, Serialize)]
pub struct PipelineResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub results: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PipelineResult {
    pub fn ok(results: Vec<String>) -> Self {
        Self {
            success: true,
            results,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            results: Vec::new(),
            error: Some(error.into()),
        }
    }
}
