// src/handlers/admin.rs

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use validator::Validate;

use crate::{
    error::AppError,
    models::{
        assignment::CreateAssignmentRequest,
        group::CreateGroupRequest,
        module_version::{NewModuleVersion, PublishModuleRequest},
    },
    state::AppState,
};

/// Publishes the next immutable version of a module.
/// Admin only.
pub async fn publish_module_version(
    State(state): State<AppState>,
    Path(module_id): Path<i64>,
    Json(payload): Json<PublishModuleRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(e) = payload.validate() {
        return Err(AppError::BadRequest(e.to_string()));
    }

    let version = state
        .store
        .publish_module_version(NewModuleVersion {
            module_id,
            title: payload.title,
            passing_score_percentage: payload.passing_score_percentage,
            duration_in_minutes: payload.duration_in_minutes,
            questions: payload.questions,
            published_at: state.clock.now(),
        })
        .await
        .inspect_err(|e| tracing::error!("Failed to publish module {}: {:?}", module_id, e))?;

    tracing::info!(
        "Module {} published as version {}",
        module_id,
        version.version_number
    );

    Ok((StatusCode::CREATED, Json(version)))
}

/// Fetches one published version, answer keys included.
/// Admin only.
pub async fn get_module_version(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let version = state
        .store
        .module_version(id)
        .await?
        .ok_or_else(|| AppError::NotFound("Module version not found".to_string()))?;

    Ok(Json(version))
}

/// Creates a group; `module_ids` order becomes the member order.
/// Admin only.
pub async fn create_group(
    State(state): State<AppState>,
    Json(payload): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(e) = payload.validate() {
        return Err(AppError::BadRequest(e.to_string()));
    }

    for module_id in &payload.module_ids {
        if state.store.latest_module_version(*module_id).await?.is_none() {
            return Err(AppError::BadRequest(format!(
                "Module {} has no published version",
                module_id
            )));
        }
    }

    let (group, members) = state
        .store
        .create_group(payload.into())
        .await
        .inspect_err(|e| tracing::error!("Failed to create group: {:?}", e))?;

    Ok((
        StatusCode::CREATED,
        Json(serde_json::json!({
            "group": group,
            "members": members,
        })),
    ))
}

/// Admin only.
pub async fn create_assignment(
    State(state): State<AppState>,
    Json(payload): Json<CreateAssignmentRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Err(e) = payload.validate() {
        return Err(AppError::BadRequest(e.to_string()));
    }

    if state.store.group(payload.group_id).await?.is_none() {
        return Err(AppError::BadRequest(format!(
            "Group {} does not exist",
            payload.group_id
        )));
    }

    let assignment = state
        .store
        .create_assignment(payload.into())
        .await
        .inspect_err(|e| tracing::error!("Failed to create assignment: {:?}", e))?;

    Ok((StatusCode::CREATED, Json(assignment)))
}

/// Deletes an assignment together with every attempt under it.
/// Admin only.
pub async fn delete_assignment(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !state.store.delete_assignment(id).await? {
        return Err(AppError::NotFound("Assignment not found".to_string()));
    }

    tracing::info!("Assignment {} deleted", id);
    Ok(StatusCode::NO_CONTENT)
}

/// Full attempt of one exam taker: statuses, pinned questions, responses, scores.
/// Admin only.
pub async fn progress_report(
    State(state): State<AppState>,
    Path((assignment_id, exam_taker_id)): Path<(i64, i64)>,
) -> Result<impl IntoResponse, AppError> {
    let report = state
        .attempts()
        .progress_report(assignment_id, exam_taker_id)
        .await?;

    Ok(Json(report))
}
