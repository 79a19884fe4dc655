use axum::Json;
use axum::extract::State;
use pipeflow_executor::handlers::immediate;
use pipeflow_protocol::requests::TextAnalysisRequest;
use pipeflow_protocol::responses::KeyPointsResponse;
use pipeflow_protocol::responses::SentimentResponse;
use pipeflow_protocol::responses::SummaryResponse;
use pipeflow_protocol::responses::TopicsResponse;

use crate::error::ApiError;
use crate::state::AppState;

pub async fn summarize_content(
    State(state): State<AppState>,
    Json(req): Json<TextAnalysisRequest>,
) -> Result<Json<SummaryResponse>, ApiError> {
    let workflow_id = req.validate().map_err(ApiError::validation)?;
    let summary = immediate::summarize(state.executor().deps(), &workflow_id, req.text.as_deref())
        .await
        .map_err(ApiError::from_handler)?;
    Ok(Json(SummaryResponse {
        summary,
        workflow_id,
    }))
}

pub async fn extract_key_points(
    State(state): State<AppState>,
    Json(req): Json<TextAnalysisRequest>,
) -> Result<Json<KeyPointsResponse>, ApiError> {
    let workflow_id = req.validate().map_err(ApiError::validation)?;
    let key_points =
        immediate::extract_key_points(state.executor().deps(), &workflow_id, req.text.as_deref())
            .await
            .map_err(ApiError::from_handler)?;
    Ok(Json(KeyPointsResponse {
        key_points,
        workflow_id,
    }))
}

pub async fn analyze_sentiment(
    State(state): State<AppState>,
    Json(req): Json<TextAnalysisRequest>,
) -> Result<Json<SentimentResponse>, ApiError> {
    let workflow_id = req.validate().map_err(ApiError::validation)?;
    let (sentiment, confidence) =
        immediate::analyze_sentiment(state.executor().deps(), &workflow_id, req.text.as_deref())
            .await
            .map_err(ApiError::from_handler)?;
    Ok(Json(SentimentResponse {
        sentiment,
        confidence,
        workflow_id,
    }))
}

pub async fn identify_topics(
    State(state): State<AppState>,
    Json(req): Json<TextAnalysisRequest>,
) -> Result<Json<TopicsResponse>, ApiError> {
    let workflow_id = req.validate().map_err(ApiError::validation)?;
    let topics =
        immediate::identify_topics(state.executor().deps(), &workflow_id, req.text.as_deref())
            .await
            .map_err(ApiError::from_handler)?;
    Ok(Json(TopicsResponse {
        topics,
        workflow_id,
    }))
}
