//! End-to-end coverage of the HTTP surface from `spec.md` §5/§8: a workflow
//! driven through its job-based steps and an immediate analysis endpoint,
//! plus the precondition/conflict edge cases the executor enforces.

use std::env;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::body::to_bytes;
use axum::http::Request;
use axum::http::StatusCode;
use pipeflow_collab::MockDemuxer;
use pipeflow_collab::MockEnhancer;
use pipeflow_collab::MockRecognizer;
use pipeflow_executor::Deps;
use pipeflow_executor::Executor;
use pipeflow_executor::ExecutorConfig;
use pipeflow_store::ArtifactStore;
use pipeflow_store::JobStateStore;
use pipeflow_store::WorkflowStateStore;
use serde_json::Value;
use serde_json::json;
use tower::ServiceExt;

struct DataDirGuard {
    prev: Option<String>,
}

impl DataDirGuard {
    fn set(dir: &Path) -> Self {
        let prev = env::var("PIPEFLOW_DATA_DIR").ok();
        unsafe {
            env::set_var("PIPEFLOW_DATA_DIR", dir);
        }
        Self { prev }
    }
}

impl Drop for DataDirGuard {
    fn drop(&mut self) {
        unsafe {
            match &self.prev {
                Some(value) => env::set_var("PIPEFLOW_DATA_DIR", value),
                None => env::remove_var("PIPEFLOW_DATA_DIR"),
            }
        }
    }
}

/// Builds a router wired to deterministic mock collaborators, mirroring the
/// wiring `main.rs` does for `PIPEFLOW_USE_REAL_COLLABORATORS=0`.
fn build_app() -> pipeflow_server::AppState {
    let workflows = Arc::new(WorkflowStateStore::new());
    let jobs = Arc::new(JobStateStore::new());
    let artifacts = Arc::new(ArtifactStore::new());
    let deps = Deps {
        workflows: workflows.clone(),
        jobs: jobs.clone(),
        artifacts,
        demuxer: Arc::new(MockDemuxer),
        local_recognizer: Arc::new(MockRecognizer::new("mock-local")),
        cloud_recognizer: Arc::new(MockRecognizer::new("mock-cloud")),
        enhancer: Arc::new(MockEnhancer),
        config: ExecutorConfig::default(),
    };
    let executor = Executor::new(deps);
    pipeflow_server::AppState::new(workflows, jobs, executor)
}

fn router() -> Router {
    pipeflow_server::router(build_app())
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("valid json body")
}

async fn post(app: &Router, uri: &str, body: Value) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .expect("build request"),
        )
        .await
        .expect("router is infallible")
}

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(
            Request::builder()
                .method("GET")
                .uri(uri)
                .body(Body::empty())
                .expect("build request"),
        )
        .await
        .expect("router is infallible")
}

/// Polls `GET /jobs/{job_id}` until it reaches a terminal status, per
/// `spec.md` §8's polling-loop scenario. The mocks never really block, so a
/// short bound is enough; a real deployment's client would poll much slower.
async fn poll_until_terminal(app: &Router, job_id: &str) -> Value {
    for _ in 0..200 {
        let body = json_body(get(app, &format!("/jobs/{job_id}")).await).await;
        let status = body["status"].as_str().expect("status field");
        if matches!(status, "completed" | "failed" | "cancelled") {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("job {job_id} never reached a terminal status");
}

async fn create_workflow(app: &Router) -> String {
    let response = post(app, "/workflow", json!({})).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    body["workflow_id"].as_str().expect("workflow_id").to_string()
}

#[tokio::test]
#[serial_test::serial]
async fn health_check_reports_ok() {
    let app = router();
    let response = get(&app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["service"], "pipeflow");
}

#[tokio::test]
#[serial_test::serial]
async fn happy_path_upload_through_summary() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let _guard = DataDirGuard::set(tmp.path());
    let app = router();

    let workflow_id = create_workflow(&app).await;

    let source = tmp.path().join("clip.mp4");
    tokio::fs::write(&source, b"not really a video, just bytes")
        .await
        .expect("write source file");

    let response = post(
        &app,
        "/upload-video",
        json!({ "source_url": source.to_string_lossy(), "workflow_id": workflow_id }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let job_id = json_body(response).await["job_id"]
        .as_str()
        .expect("job_id")
        .to_string();
    let job = poll_until_terminal(&app, &job_id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["result"]["kind"], "upload");

    let response = post(&app, "/extract-audio", json!({ "workflow_id": workflow_id })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let job_id = json_body(response).await["job_id"]
        .as_str()
        .expect("job_id")
        .to_string();
    let job = poll_until_terminal(&app, &job_id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["result"]["kind"], "extract_audio");

    let response = post(&app, "/transcribe-audio", json!({ "workflow_id": workflow_id })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let job_id = json_body(response).await["job_id"]
        .as_str()
        .expect("job_id")
        .to_string();
    let job = poll_until_terminal(&app, &job_id).await;
    assert_eq!(job["status"], "completed");
    assert_eq!(job["result"]["kind"], "transcribe");
    assert_eq!(job["result"]["service_used"], "mock-local");

    let response = post(&app, "/summarize-content", json!({ "workflow_id": workflow_id })).await;
    assert_eq!(response.status(), StatusCode::OK);
    let summary = json_body(response).await;
    assert!(!summary["summary"].as_str().expect("summary").is_empty());

    let response = get(&app, &format!("/workflow/{workflow_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let workflow = json_body(response).await;
    assert_eq!(workflow["steps"]["upload_video"]["status"], "completed");
    assert_eq!(workflow["steps"]["transcribe_audio"]["status"], "completed");
    assert_eq!(workflow["steps"]["summarize_content"]["status"], "completed");
}

#[tokio::test]
#[serial_test::serial]
async fn extract_audio_before_upload_is_rejected_with_step_precondition() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let _guard = DataDirGuard::set(tmp.path());
    let app = router();
    let workflow_id = create_workflow(&app).await;

    let response = post(&app, "/extract-audio", json!({ "workflow_id": workflow_id })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "STEP_PRECONDITION");
}

#[tokio::test]
#[serial_test::serial]
async fn resubmitting_a_completed_step_returns_conflict_without_a_new_job() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let _guard = DataDirGuard::set(tmp.path());
    let app = router();
    let workflow_id = create_workflow(&app).await;

    let source = tmp.path().join("clip.mp4");
    tokio::fs::write(&source, b"bytes").await.expect("write source file");

    let first = post(
        &app,
        "/upload-video",
        json!({ "source_url": source.to_string_lossy(), "workflow_id": workflow_id }),
    )
    .await;
    assert_eq!(first.status(), StatusCode::OK);
    let first_job_id = json_body(first).await["job_id"]
        .as_str()
        .expect("job_id")
        .to_string();
    poll_until_terminal(&app, &first_job_id).await;

    let second = post(
        &app,
        "/upload-video",
        json!({ "source_url": source.to_string_lossy(), "workflow_id": workflow_id }),
    )
    .await;
    assert_eq!(second.status(), StatusCode::CONFLICT);
    let body = json_body(second).await;
    assert_eq!(body["error"]["code"], "STEP_PRECONDITION");
}

#[tokio::test]
#[serial_test::serial]
async fn force_restart_reruns_a_completed_step_and_resets_downstream() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let _guard = DataDirGuard::set(tmp.path());
    let app = router();
    let workflow_id = create_workflow(&app).await;

    let source = tmp.path().join("clip.mp4");
    tokio::fs::write(&source, b"bytes").await.expect("write source file");

    let first_upload = post(
        &app,
        "/upload-video",
        json!({ "source_url": source.to_string_lossy(), "workflow_id": workflow_id }),
    )
    .await;
    assert_eq!(first_upload.status(), StatusCode::OK);
    let first_job_id = json_body(first_upload).await["job_id"]
        .as_str()
        .expect("job_id")
        .to_string();
    poll_until_terminal(&app, &first_job_id).await;

    let extract = post(&app, "/extract-audio", json!({ "workflow_id": workflow_id })).await;
    assert_eq!(extract.status(), StatusCode::OK);
    let extract_job_id = json_body(extract).await["job_id"]
        .as_str()
        .expect("job_id")
        .to_string();
    poll_until_terminal(&app, &extract_job_id).await;

    // Without `force_restart`, re-uploading the same step still 409s.
    let conflict = post(
        &app,
        "/upload-video",
        json!({ "source_url": source.to_string_lossy(), "workflow_id": workflow_id }),
    )
    .await;
    assert_eq!(conflict.status(), StatusCode::CONFLICT);

    let forced = post(
        &app,
        "/upload-video",
        json!({
            "source_url": source.to_string_lossy(),
            "workflow_id": workflow_id,
            "force_restart": true,
        }),
    )
    .await;
    assert_eq!(forced.status(), StatusCode::OK);
    let forced_job_id = json_body(forced).await["job_id"]
        .as_str()
        .expect("job_id")
        .to_string();
    let forced_job = poll_until_terminal(&app, &forced_job_id).await;
    assert_eq!(forced_job["status"], "completed");

    let response = get(&app, &format!("/workflow/{workflow_id}")).await;
    let workflow = json_body(response).await;
    assert_eq!(workflow["steps"]["upload_video"]["status"], "completed");
    assert_eq!(
        workflow["steps"]["extract_audio"]["status"], "pending",
        "extract_audio completed against the old upload and must be reset by the forced restart"
    );
}

#[tokio::test]
#[serial_test::serial]
async fn cancelling_an_already_terminal_job_returns_conflict_without_mutation() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let _guard = DataDirGuard::set(tmp.path());
    let app = router();
    let workflow_id = create_workflow(&app).await;

    let source = tmp.path().join("clip.mp4");
    tokio::fs::write(&source, b"bytes").await.expect("write source file");

    let response = post(
        &app,
        "/upload-video",
        json!({ "source_url": source.to_string_lossy(), "workflow_id": workflow_id }),
    )
    .await;
    let job_id = json_body(response).await["job_id"]
        .as_str()
        .expect("job_id")
        .to_string();
    poll_until_terminal(&app, &job_id).await;

    let cancel = post(&app, &format!("/jobs/{job_id}/cancel"), json!({})).await;
    assert_eq!(cancel.status(), StatusCode::CONFLICT);

    let job = json_body(get(&app, &format!("/jobs/{job_id}")).await).await;
    assert_eq!(job["status"], "completed");
}

#[tokio::test]
#[serial_test::serial]
async fn unknown_workflow_id_returns_not_found() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let _guard = DataDirGuard::set(tmp.path());
    let app = router();

    let response = get(&app, "/workflow/wf_does_not_exist").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "WORKFLOW_NOT_FOUND");
}

#[tokio::test]
#[serial_test::serial]
async fn empty_source_url_is_rejected_before_any_job_is_created() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let _guard = DataDirGuard::set(tmp.path());
    let app = router();
    let workflow_id = create_workflow(&app).await;

    let response = post(
        &app,
        "/upload-video",
        json!({ "source_url": "", "workflow_id": workflow_id }),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}
