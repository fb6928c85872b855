//! Teacher dashboard read models.

use axum::{extract::State, Json};
use chrono::Utc;
use std::sync::Arc;

use super::caller::Caller;
use super::error::ApiError;
use crate::db::{BookingListResponse, TeacherReviews};
use crate::scheduler::TeacherIncome;
use crate::AppState;

/// GET /api/teacher/bookings
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<BookingListResponse>, ApiError> {
    let bookings = state
        .scheduler
        .teacher_bookings(&caller.user_id, Utc::now())
        .await?;

    Ok(Json(BookingListResponse {
        count: bookings.len(),
        bookings,
    }))
}

/// GET /api/teacher/reviews
pub async fn get_reviews(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<TeacherReviews>, ApiError> {
    state
        .scheduler
        .require_teacher(&caller.user_id, "view their reviews")
        .await?;
    Ok(Json(state.scheduler.teacher_reviews(&caller.user_id).await?))
}

/// GET /api/teacher/income
pub async fn get_income(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<TeacherIncome>, ApiError> {
    Ok(Json(state.scheduler.teacher_income(&caller.user_id).await?))
}
