use axum::{extract::State, Json};
use std::sync::Arc;

use super::caller::Caller;
use super::error::ApiError;
use crate::db::{CreditBalance, CreditTransactionsResponse};
use crate::AppState;

/// GET /api/credits - the caller's credit balance
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<CreditBalance>, ApiError> {
    Ok(Json(state.scheduler.credit_balance(&caller.user_id).await?))
}

/// GET /api/credits/transactions - the caller's credit journal, newest first
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    caller: Caller,
) -> Result<Json<CreditTransactionsResponse>, ApiError> {
    let transactions = state.scheduler.credit_transactions(&caller.user_id).await?;
    Ok(Json(CreditTransactionsResponse { transactions }))
}
