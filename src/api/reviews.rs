use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use super::caller::Caller;
use super::error::ApiError;
use crate::db::{
    SubmitReviewRequest, SubmitReviewResponse, TeacherListQuery, TeacherListResponse, TeacherReviews,
};
use crate::AppState;

/// POST /api/reviews - review a completed lesson
pub async fn submit_review(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<SubmitReviewRequest>,
) -> Result<(StatusCode, Json<SubmitReviewResponse>), ApiError> {
    let review = state
        .scheduler
        .submit_review(
            &caller.user_id,
            &req.booking_id,
            &req.teacher_id,
            req.rating,
            req.comment.as_deref(),
            Utc::now(),
        )
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(SubmitReviewResponse {
            message: "Review submitted".to_string(),
            review,
        }),
    ))
}

/// GET /api/teachers/:id/reviews - public ratings of a teacher
pub async fn get_teacher_reviews(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Path(teacher_id): Path<String>,
) -> Result<Json<TeacherReviews>, ApiError> {
    Ok(Json(state.scheduler.teacher_reviews(&teacher_id).await?))
}

/// GET /api/teachers?field= - teacher directory with ratings
pub async fn list_teachers(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Query(query): Query<TeacherListQuery>,
) -> Result<Json<TeacherListResponse>, ApiError> {
    let teachers = state
        .scheduler
        .teachers_with_ratings(query.field.as_deref())
        .await?;
    let count = teachers.len();
    Ok(Json(TeacherListResponse { teachers, count }))
}
