// src/handlers/session.rs

use axum::{
    Json,
    extract::{Extension, Path, State},
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError, models::progress::SubmitResponseRequest, state::AppState, utils::jwt::Claims,
};

/// Lists every module of the assignment with its current status.
pub async fn list_modules(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(assignment_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let modules = state
        .attempts()
        .list_modules(assignment_id, claims.subject_id()?)
        .await?;

    Ok(Json(modules))
}

pub async fn module_state(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((assignment_id, group_member_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let module = state
        .attempts()
        .module_state(assignment_id, group_member_id, claims.subject_id()?)
        .await?;

    Ok(Json(module))
}

/// Starts the module. Repeated calls return the running module unchanged.
pub async fn start_module(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((assignment_id, group_member_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let module = state
        .attempts()
        .start_module(assignment_id, group_member_id, claims.subject_id()?)
        .await?;

    Ok(Json(module))
}

/// Creates or replaces the answer to one question.
pub async fn submit_response(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((assignment_id, group_member_id)): Path<(i64, i64)>,
    Json(payload): Json<SubmitResponseRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(e) = payload.validate() {
        return Err(AppError::BadRequest(e.to_string()));
    }

    let response = state
        .attempts()
        .submit_response(
            assignment_id,
            group_member_id,
            claims.subject_id()?,
            payload,
        )
        .await?;

    Ok(Json(response))
}

pub async fn complete_module(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((assignment_id, group_member_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let completion = state
        .attempts()
        .complete_module(assignment_id, group_member_id, claims.subject_id()?)
        .await?;

    let body = if completion.show_results_immediately {
        completion.response
    } else {
        completion.response.withheld()
    };

    Ok(Json(body))
}
