use axum::{extract::State, http::StatusCode, Json};
use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;

use super::caller::Caller;
use super::error::ApiError;
use crate::db::{
    BookingListResponse, CancelBookingRequest, CancelBookingResponse, CreateBookingRequest,
    LessonBooking,
};
use crate::AppState;

/// GET /api/bookings - the caller's lessons as a student
pub async fn list_bookings(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<BookingListResponse>, ApiError> {
    let bookings = state
        .scheduler
        .student_bookings(&caller.user_id, Utc::now())
        .await?;

    Ok(Json(BookingListResponse {
        count: bookings.len(),
        bookings,
    }))
}

/// POST /api/bookings - reserve a teacher's slot for one credit
pub async fn create_booking(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<CreateBookingRequest>,
) -> Result<(StatusCode, Json<LessonBooking>), ApiError> {
    let booking = state
        .scheduler
        .book_lesson(
            &caller.user_id,
            &req.teacher_id,
            req.start_time,
            req.end_time,
            req.notes.as_deref(),
            Utc::now(),
        )
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

/// POST /api/bookings/cancel - cancel a scheduled lesson and refund its credit
pub async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<CancelBookingRequest>,
) -> Result<Json<CancelBookingResponse>, ApiError> {
    let outcome = state
        .scheduler
        .cancel_lesson(&caller.user_id, &req.booking_id, Utc::now())
        .await?;

    let message = if outcome.refunded {
        "Lesson cancelled and credit refunded"
    } else {
        "Lesson cancelled, the credit refund is pending"
    };

    Ok(Json(CancelBookingResponse {
        message: message.to_string(),
        booking: outcome.booking,
        refunded: outcome.refunded,
    }))
}

#[derive(Debug, Serialize)]
pub struct SweepResponse {
    pub updated: u64,
}

/// POST /api/lessons/sweep - promote ended lessons to completed
pub async fn sweep_lessons(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
) -> Result<Json<SweepResponse>, ApiError> {
    let updated = state.scheduler.sweep_completed(Utc::now()).await?;
    Ok(Json(SweepResponse { updated }))
}
