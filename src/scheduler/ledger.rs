//! Credit ledger.
//!
//! The free functions operate on an open connection so they compose inside
//! the booking and cancellation transactions. Every balance change appends a
//! row to the credit journal in the same transaction.

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use super::error::is_unique_violation;
use super::{with_retry, LessonScheduler, SchedulingError};
use crate::db::{format_timestamp, CreditBalance, CreditTransaction, CreditTransactionKind};

/// Spend `amount` credits. Returns false, leaving the balance untouched,
/// when fewer than `amount` are available or the user has no balance yet.
pub async fn try_debit(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
    booking_id: &str,
    now: &str,
) -> Result<bool, sqlx::Error> {
    if !CreditBalance::try_debit(&mut *conn, user_id, amount, now).await? {
        return Ok(false);
    }
    CreditTransaction::record(
        &mut *conn,
        user_id,
        CreditTransactionKind::Debit,
        amount,
        None,
        Some(booking_id),
        now,
    )
    .await?;
    Ok(true)
}

/// Return up to `amount` spent credits. `used_credits` is floored at zero,
/// `total_credits` never changes and the journal records only what was
/// restored. Returns false if the user has no balance row.
pub async fn refund(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
    booking_id: &str,
    now: &str,
) -> Result<bool, sqlx::Error> {
    let restored = match CreditBalance::refund(&mut *conn, user_id, amount, now).await? {
        Some(restored) => restored,
        None => return Ok(false),
    };
    if restored > 0 {
        CreditTransaction::record(
            &mut *conn,
            user_id,
            CreditTransactionKind::Refund,
            restored,
            None,
            Some(booking_id),
            now,
        )
        .await?;
    }
    Ok(true)
}

/// Apply a purchase. Returns false when `payment_id` was already applied;
/// the caller must then roll back.
pub async fn grant(
    conn: &mut SqliteConnection,
    user_id: &str,
    amount: i64,
    payment_id: &str,
    now: &str,
) -> Result<bool, sqlx::Error> {
    // The journal insert doubles as the idempotency check on payment_id
    match CreditTransaction::record(
        &mut *conn,
        user_id,
        CreditTransactionKind::Grant,
        amount,
        Some(payment_id),
        None,
        now,
    )
    .await
    {
        Ok(()) => {}
        Err(err) if is_unique_violation(&err) => return Ok(false),
        Err(err) => return Err(err),
    }

    CreditBalance::add(&mut *conn, user_id, amount, now).await?;
    Ok(true)
}

#[derive(Debug, Clone)]
pub struct GrantOutcome {
    /// True when the payment had been applied before
    pub duplicate: bool,
    pub balance: CreditBalance,
}

impl LessonScheduler {
    /// Current balance; all zero for users never granted credits
    pub async fn credit_balance(&self, user_id: &str) -> Result<CreditBalance, SchedulingError> {
        Ok(CreditBalance::find(&self.db, user_id)
            .await?
            .unwrap_or_else(|| CreditBalance::empty(user_id)))
    }

    pub async fn has_available_credits(&self, user_id: &str, amount: i64) -> Result<bool, SchedulingError> {
        let balance = self.credit_balance(user_id).await?;
        Ok(balance.available_credits >= amount)
    }

    /// Credit a successful payment exactly once per `payment_id`
    pub async fn grant_credits(
        &self,
        user_id: &str,
        credits: i64,
        payment_id: &str,
        now: DateTime<Utc>,
    ) -> Result<GrantOutcome, SchedulingError> {
        if user_id.trim().is_empty() {
            return Err(SchedulingError::Validation("user_id is required".to_string()));
        }
        if credits <= 0 {
            return Err(SchedulingError::Validation(
                "credits must be a positive number".to_string(),
            ));
        }
        if payment_id.trim().is_empty() {
            return Err(SchedulingError::Validation("payment_id is required".to_string()));
        }

        let stamp = format_timestamp(now);
        let stamp = stamp.as_str();

        let applied = with_retry(&self.retry, "grant_credits", move || async move {
            let mut tx = self.db.begin().await?;
            let applied = grant(&mut tx, user_id, credits, payment_id, stamp).await?;
            if applied {
                tx.commit().await?;
            } else {
                tx.rollback().await?;
            }
            Ok::<_, SchedulingError>(applied)
        })
        .await?;

        if applied {
            tracing::info!(
                user_id = %user_id,
                credits = credits,
                payment_id = %payment_id,
                "Credits granted"
            );
        } else {
            tracing::info!(
                user_id = %user_id,
                payment_id = %payment_id,
                "Duplicate payment ignored"
            );
        }

        Ok(GrantOutcome {
            duplicate: !applied,
            balance: self.credit_balance(user_id).await?,
        })
    }

    /// The user's credit journal, newest first
    pub async fn credit_transactions(&self, user_id: &str) -> Result<Vec<CreditTransaction>, SchedulingError> {
        Ok(CreditTransaction::list_for_user(&self.db, user_id).await?)
    }
}
