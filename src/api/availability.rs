use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use std::sync::Arc;

use super::caller::Caller;
use super::error::ApiError;
use crate::db::{
    AvailabilityQuery, AvailabilityResponse, ProfileStatusResponse, UpsertAvailabilityRequest,
    UpsertAvailabilityResponse,
};
use crate::AppState;

/// GET /api/availability/profile-status - onboarding fields still to fill in
pub async fn profile_status(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<ProfileStatusResponse>, ApiError> {
    state
        .scheduler
        .require_teacher(&caller.user_id, "manage availability")
        .await?;
    let missing_fields = state.scheduler.missing_profile_fields(&caller.user_id).await?;

    Ok(Json(ProfileStatusResponse {
        complete: missing_fields.is_empty(),
        missing_fields,
    }))
}

/// GET /api/availability - the calling teacher's slots for one week
pub async fn get_own_availability(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    state
        .scheduler
        .require_teacher(&caller.user_id, "manage availability")
        .await?;
    week_of(&state, &caller.user_id, query).await
}

/// GET /api/teachers/:id/availability - a teacher's offered slots for one week
pub async fn get_teacher_availability(
    State(state): State<Arc<AppState>>,
    _caller: Caller,
    Path(teacher_id): Path<String>,
    Query(query): Query<AvailabilityQuery>,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    week_of(&state, &teacher_id, query).await
}

async fn week_of(
    state: &AppState,
    teacher_id: &str,
    query: AvailabilityQuery,
) -> Result<Json<AvailabilityResponse>, ApiError> {
    let week = query.week_start.unwrap_or_else(Utc::now);
    let (week_start_date, availability) =
        state.scheduler.availability_for_week(teacher_id, week).await?;

    Ok(Json(AvailabilityResponse {
        week_start_date,
        availability,
    }))
}

/// PUT /api/availability - replace the calling teacher's slots for one week
pub async fn put_availability(
    State(state): State<Arc<AppState>>,
    caller: Caller,
    Json(req): Json<UpsertAvailabilityRequest>,
) -> Result<Json<UpsertAvailabilityResponse>, ApiError> {
    let now = Utc::now();
    let update = state
        .scheduler
        .upsert_availability(
            &caller.user_id,
            req.week_start.unwrap_or(now),
            &req.slots,
            now,
        )
        .await?;

    let message = if update.dropped_past > 0 {
        format!(
            "Availability saved. {} past slot(s) were skipped",
            update.dropped_past
        )
    } else {
        "Availability saved".to_string()
    };

    Ok(Json(UpsertAvailabilityResponse {
        message,
        week_start_date: update.week_start_date,
        availability: update.slots,
        filtered: update.dropped_past > 0,
        filtered_count: update.dropped_past,
    }))
}
