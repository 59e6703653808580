//! Essential stage: persist the rendered document.
//!
//! One timestamped directory per run (second resolution, filesystem-safe),
//! one HTML file inside it named with a millisecond disambiguator so two
//! runs inside the same second cannot collide. Artifacts are never mutated
//! or deleted after the write.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::browser::PageDriver;
use crate::core::config::SnapshotConfig;
use crate::core::errors::PipelineError;

/// The persisted deliverable of a run.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub directory: PathBuf,
    pub file: PathBuf,
}

/// `2026-08-23T12-30-05` — ISO timestamp with colons flattened so the name
/// is safe on every filesystem.
fn timestamp_dir_name(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H-%M-%S").to_string()
}

fn artifact_file_name(now: DateTime<Utc>) -> String {
    format!("google-results-{}.html", now.timestamp_millis())
}

pub async fn write(
    page: &dyn PageDriver,
    cfg: &SnapshotConfig,
) -> Result<Artifact, PipelineError> {
    let html = page
        .content()
        .await
        .map_err(|e| PipelineError::ArtifactWrite(format!("document serialization failed: {e}")))?;

    let now = Utc::now();
    let directory = PathBuf::from(cfg.output_root()).join(timestamp_dir_name(now));
    tokio::fs::create_dir_all(&directory).await.map_err(|e| {
        PipelineError::ArtifactWrite(format!(
            "failed to create {}: {e}",
            directory.display()
        ))
    })?;

    let file = directory.join(artifact_file_name(now));
    tokio::fs::write(&file, &html).await.map_err(|e| {
        PipelineError::ArtifactWrite(format!("failed to write {}: {e}", file.display()))
    })?;

    info!("💾 Saved HTML to {} ({} chars)", file.display(), html.len());
    Ok(Artifact { directory, file })
}
