use std::io::Read;

use serp_snapshot::core::config;
use serp_snapshot::core::types::{Job, PipelineResult};
use serp_snapshot::pipeline;
use tracing::info;

/// Emit the single boundary JSON line and exit. Everything before this
/// point logs to stderr only — stdout carries exactly one object.
fn emit_and_exit(result: PipelineResult) -> ! {
    let line = serde_json::to_string(&result)
        .unwrap_or_else(|_| r#"{"success":false,"error":"result serialization failed"}"#.into());
    println!("{line}");
    std::process::exit(if result.success { 0 } else { 1 });
}

#[tokio::main]
async fn main() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let mut payload = String::new();
    if let Err(e) = std::io::stdin().read_to_string(&mut payload) {
        emit_and_exit(PipelineResult::failed(format!("failed to read stdin: {e}")));
    }

    let job = match Job::from_payload(&payload) {
        Ok(job) => job,
        Err(e) => emit_and_exit(PipelineResult::failed(e.to_string())),
    };

    let cfg = config::load_config();
    info!("Starting snapshot job");

    let result = pipeline::run_job(&job, &cfg).await;
    emit_and_exit(result);
}
