use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use pipeflow_executor::HandlerError;
use pipeflow_protocol::ErrorCode;
use pipeflow_protocol::ErrorDetail;
use pipeflow_protocol::responses::ErrorResponse;
use pipeflow_protocol::requests::ValidationError;
use pipeflow_store::StoreError;

/// Every HTTP handler's error path funnels through here so the `4xx`/`5xx`
/// mapping in `spec.md` §6/§7 is decided in exactly one place.
pub struct ApiError {
    status: StatusCode,
    detail: ErrorDetail,
}

impl ApiError {
    pub fn validation(err: ValidationError) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: ErrorDetail::new(err.code(), err.message),
        }
    }

    pub fn conflict(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            detail: ErrorDetail::new(code, message),
        }
    }

    pub fn bad_request(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: ErrorDetail::new(code, message),
        }
    }

    pub fn from_store(err: StoreError) -> Self {
        Self::from_handler(HandlerError::from(err))
    }

    /// A second submit for a step already `running`/`completed` is a state
    /// conflict (`409`), overriding the `400` that `ErrorCode::StepPrecondition`
    /// normally maps to for a dependency that simply hasn't completed yet —
    /// [`HandlerError::conflict`] is how the handler layer tells these two
    /// `StepPrecondition` cases apart.
    pub fn from_handler(err: HandlerError) -> Self {
        if err.conflict {
            return Self::conflict(err.detail.code, err.detail.message.clone());
        }
        let status = StatusCode::from_u16(err.detail.code.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Self {
            status,
            detail: err.detail,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let next_action = match self.status {
            StatusCode::NOT_FOUND => "check_workflow_id_or_job_id",
            StatusCode::CONFLICT => "poll_job_or_inspect_workflow",
            StatusCode::BAD_REQUEST => "fix_request_and_retry",
            StatusCode::INTERNAL_SERVER_ERROR => "retry_or_contact_support",
            _ => "retry_or_contact_support",
        };
        (
            self.status,
            Json(ErrorResponse::new(self.detail, next_action)),
        )
            .into_response()
    }
}
