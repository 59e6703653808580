//! serp-snapshot — resilient SERP snapshotter.
//!
//! Drives a stealth CDP browser session against a bot-hostile search
//! surface, negotiates CAPTCHA challenges through an external solving
//! oracle, clears locale/consent interstitials, applies a past-24-hours
//! filter, and persists the rendered page as a timestamped HTML artifact.
//!
//! The process boundary is one JSON job on stdin and one JSON result line
//! on stdout; everything else is diagnostics on stderr.

pub mod browser;
pub mod core;
pub mod pipeline;

pub use crate::core::config::{load_config, SnapshotConfig};
pub use crate::core::errors::PipelineError;
pub use crate::core::types::{Job, PipelineResult, StageOutcome};
