use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::json;
use std::sync::Arc;

use super::pages::current_session;
use crate::db::{get_submission, Role};
use crate::state::AppState;

pub async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "backend": state.store.backend_tag()
    }))
}

/// Grading status of one submission, for its owner or any trainer.
pub async fn submission_status(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(submission_id): Path<String>,
) -> impl IntoResponse {
    let Some((_, session)) = current_session(&state, &headers).await else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({
                "status": "unauthorized",
                "message": "Please log in first."
            })),
        )
            .into_response();
    };

    let submission = match get_submission(state.store.as_ref(), &submission_id).await {
        Ok(Some(s)) => s,
        Ok(None) => return not_found(),
        Err(e) => {
            tracing::error!("Failed to load submission {}: {}", submission_id, e);
            return (
                StatusCode::BAD_GATEWAY,
                Json(json!({
                    "status": "error",
                    "message": "Database error."
                })),
            )
                .into_response();
        }
    };

    // Trainees only see their own work; anything else looks like a miss.
    if session.user.role == Role::Trainee && submission.user_id != session.user.id {
        return not_found();
    }

    Json(json!({
        "status": submission.status.as_str(),
        "id": submission.id,
        "filename": submission.filename,
        "upload_date": submission.upload_date,
        "score": submission.score,
        "feedback": submission.feedback,
        "student_name": submission.student_name
    }))
    .into_response()
}

fn not_found() -> axum::response::Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "status": "not_found",
            "message": "Submission not found."
        })),
    )
        .into_response()
}
