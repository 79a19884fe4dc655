use axum::Json;
use axum::extract::Path;
use axum::extract::State;
use pipeflow_protocol::WorkflowId;
use pipeflow_protocol::responses::CreateWorkflowResponse;
use pipeflow_store::WorkflowRecord;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn create_workflow(
    State(state): State<AppState>,
) -> Result<Json<CreateWorkflowResponse>, ApiError> {
    let record = state
        .workflows()
        .create_workflow()
        .await
        .map_err(ApiError::from_store)?;
    Ok(Json(CreateWorkflowResponse {
        workflow_id: record.workflow_id,
    }))
}

pub async fn get_workflow(
    State(state): State<AppState>,
    Path(workflow_id): Path<String>,
) -> Result<Json<WorkflowRecord>, ApiError> {
    let workflow_id = WorkflowId::parse(&workflow_id).ok_or_else(|| {
        ApiError::bad_request(
            pipeflow_protocol::ErrorCode::ValidationError,
            "workflow_id must not be empty",
        )
    })?;
    let record = state
        .workflows()
        .get(&workflow_id)
        .await
        .map_err(ApiError::from_store)?;
    Ok(Json(record))
}
