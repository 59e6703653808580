use thiserror::Error;

/// Fatal failure classes. Anything not listed here is a stage-local,
/// non-fatal condition reported through `StageOutcome` and never crosses
/// a stage boundary.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The browser process could not be found or refused to start.
    /// Nothing can run without a live session.
    #[error("BrowserLaunchError: {0}")]
    BrowserLaunch(String),

    /// The target page never reached network quiescence inside the
    /// navigation budget. There is nothing to extract.
    #[error("NavigationTimeoutError: {0}")]
    NavigationTimeout(String),

    /// The rendered document could not be serialized or persisted.
    /// The artifact is the sole deliverable, so this aborts the job.
    #[error("ArtifactWriteError: {0}")]
    ArtifactWrite(String),

    /// The stdin payload was not a valid job object.
    #[error("MalformedInputError: {0}")]
    MalformedInput(String),
}
