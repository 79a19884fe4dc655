pub mod analysis;
pub mod health;
pub mod jobs;
pub mod workflow;

use axum::Router;
use axum::routing::get;
use axum::routing::post;

use crate::state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health))
        .route("/workflow", post(workflow::create_workflow))
        .route("/workflow/{workflow_id}", get(workflow::get_workflow))
        .route("/upload-video", post(jobs::upload_video))
        .route("/extract-audio", post(jobs::extract_audio))
        .route("/transcribe-audio", post(jobs::transcribe_audio))
        .route("/enhance-transcription", post(jobs::enhance_transcription))
        .route("/summarize-content", post(analysis::summarize_content))
        .route("/extract-key-points", post(analysis::extract_key_points))
        .route("/analyze-sentiment", post(analysis::analyze_sentiment))
        .route("/identify-topics", post(analysis::identify_topics))
        .route("/jobs/{job_id}", get(jobs::get_job))
        .route("/jobs/{job_id}/cancel", post(jobs::cancel_job))
        .with_state(state)
}
