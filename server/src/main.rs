use std::sync::Arc;

use pipeflow_collab::CloudRecognizer;
use pipeflow_collab::Demuxer;
use pipeflow_collab::Enhancer;
use pipeflow_collab::FfmpegDemuxer;
use pipeflow_collab::LlmEnhancer;
use pipeflow_collab::LocalRecognizer;
use pipeflow_collab::MockDemuxer;
use pipeflow_collab::MockEnhancer;
use pipeflow_collab::MockRecognizer;
use pipeflow_collab::Recognizer;
use pipeflow_executor::Deps;
use pipeflow_executor::Executor;
use pipeflow_executor::ExecutorConfig;
use pipeflow_server::routes;
use pipeflow_server::state;
use pipeflow_store::ArtifactStore;
use pipeflow_store::JOB_TTL_DEFAULT;
use pipeflow_store::JobStateStore;
use pipeflow_store::WorkflowStateStore;
use tower_http::trace::TraceLayer;
use tracing::error;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Spawns the background `sweep()` loop from `spec.md` §4.C: every
/// `PIPEFLOW_SWEEP_INTERVAL_SECS` (default 1h), delete job records that
/// have sat in a terminal state past `PIPEFLOW_JOB_TTL_SECS` (default 24h).
fn spawn_job_sweeper(jobs: Arc<JobStateStore>) {
    let interval_secs = std::env::var("PIPEFLOW_SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3600u64);
    let ttl = std::env::var("PIPEFLOW_JOB_TTL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(std::time::Duration::from_secs)
        .unwrap_or(JOB_TTL_DEFAULT);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(std::time::Duration::from_secs(interval_secs));
        loop {
            ticker.tick().await;
            match jobs.purge_expired(ttl).await {
                Ok(purged) if purged > 0 => info!(purged, "swept expired job records"),
                Ok(_) => {}
                Err(err) => error!(error = %err, "job sweep failed"),
            }
        }
    });
}

/// Mock-by-default collaborator wiring: without an opt-in env var, the
/// server talks to deterministic mocks
/// instead of shelling out to `ffmpeg`/`whisper` or calling Azure/OpenAI.
fn build_collaborators() -> (Arc<dyn Demuxer>, Arc<dyn Recognizer>, Arc<dyn Recognizer>, Arc<dyn Enhancer>) {
    let use_real = std::env::var("PIPEFLOW_USE_REAL_COLLABORATORS")
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    if !use_real {
        info!("using mock collaborators (set PIPEFLOW_USE_REAL_COLLABORATORS=1 for real backends)");
        let demuxer: Arc<dyn Demuxer> = Arc::new(MockDemuxer);
        let local: Arc<dyn Recognizer> = Arc::new(MockRecognizer::new("mock-local"));
        let cloud: Arc<dyn Recognizer> = Arc::new(MockRecognizer::new("mock-cloud"));
        let enhancer: Arc<dyn Enhancer> = Arc::new(MockEnhancer);
        return (demuxer, local, cloud, enhancer);
    }

    let demuxer: Arc<dyn Demuxer> = Arc::new(FfmpegDemuxer::default());
    let local: Arc<dyn Recognizer> = Arc::new(LocalRecognizer::default());
    let azure_endpoint = std::env::var("PIPEFLOW_AZURE_ENDPOINT").unwrap_or_default();
    let azure_key = std::env::var("PIPEFLOW_AZURE_KEY").unwrap_or_default();
    let cloud: Arc<dyn Recognizer> = Arc::new(CloudRecognizer::new(azure_endpoint, azure_key));
    let openai_endpoint = std::env::var("PIPEFLOW_OPENAI_ENDPOINT")
        .unwrap_or_else(|_| "https://api.openai.com/v1/chat/completions".to_string());
    let openai_key = std::env::var("PIPEFLOW_OPENAI_KEY").unwrap_or_default();
    let openai_model = std::env::var("PIPEFLOW_OPENAI_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string());
    let enhancer: Arc<dyn Enhancer> = Arc::new(LlmEnhancer::new(openai_endpoint, openai_key, openai_model));
    (demuxer, local, cloud, enhancer)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let workflows = Arc::new(WorkflowStateStore::new());
    let jobs = Arc::new(JobStateStore::new());
    let artifacts = Arc::new(ArtifactStore::new());

    let swept_jobs = jobs.sweep_interrupted().await?;
    let mut swept_steps = 0usize;
    for workflow_id in workflows.list_ids().await? {
        swept_steps += workflows.sweep_interrupted(&workflow_id).await?;
    }
    info!(swept_jobs, swept_steps, "restart recovery swept in-flight work");

    spawn_job_sweeper(jobs.clone());

    let (demuxer, local_recognizer, cloud_recognizer, enhancer) = build_collaborators();
    let deps = Deps {
        workflows: workflows.clone(),
        jobs: jobs.clone(),
        artifacts,
        demuxer,
        local_recognizer,
        cloud_recognizer,
        enhancer,
        config: ExecutorConfig::default(),
    };
    let executor = Executor::new(deps);

    let state = state::AppState::new(workflows, jobs, executor);
    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let addr = std::env::var("PIPEFLOW_LISTEN_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(%addr, "pipeflow server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
