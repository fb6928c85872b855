//! Lesson credit balances and the credit journal.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool};

/// Per-user credit balance. `available_credits = total_credits - used_credits`
/// is enforced by a table CHECK constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct CreditBalance {
    pub user_id: String,
    pub total_credits: i64,
    pub used_credits: i64,
    pub available_credits: i64,
}

impl CreditBalance {
    /// Balance of a user who has never been granted credits
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_credits: 0,
            used_credits: 0,
            available_credits: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CreditTransactionKind {
    Grant,
    Debit,
    Refund,
}

impl CreditTransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CreditTransactionKind::Grant => "grant",
            CreditTransactionKind::Debit => "debit",
            CreditTransactionKind::Refund => "refund",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CreditTransaction {
    pub id: String,
    pub user_id: String,
    pub kind: String,
    pub amount: i64,
    pub payment_id: Option<String>,
    pub booking_id: Option<String>,
    pub created_at: String,
}

/// Grant event delivered by the payment gateway
#[derive(Debug, Clone, Deserialize)]
pub struct GrantCreditsRequest {
    #[serde(alias = "userId")]
    pub user_id: String,
    pub credits: i64,
    #[serde(alias = "paymentId")]
    pub payment_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GrantCreditsResponse {
    /// True when this payment id had already been applied
    pub duplicate: bool,
    pub balance: CreditBalance,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreditTransactionsResponse {
    pub transactions: Vec<CreditTransaction>,
}

impl CreditBalance {
    pub async fn find<'e, E>(executor: E, user_id: &str) -> Result<Option<CreditBalance>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(
            "SELECT user_id, total_credits, used_credits, available_credits FROM user_credits WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(executor)
        .await
    }

    /// Spend `amount` credits if enough are available. Returns false otherwise.
    pub async fn try_debit(
        conn: &mut SqliteConnection,
        user_id: &str,
        amount: i64,
        now: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE user_credits
            SET used_credits = used_credits + ?1,
                available_credits = available_credits - ?1,
                updated_at = ?2
            WHERE user_id = ?3 AND available_credits >= ?1
            "#,
        )
        .bind(amount)
        .bind(now)
        .bind(user_id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Give back up to `amount` spent credits, never dropping `used_credits`
    /// below zero. Returns the amount restored, or `None` if the user has no
    /// balance row.
    pub async fn refund(
        conn: &mut SqliteConnection,
        user_id: &str,
        amount: i64,
        now: &str,
    ) -> Result<Option<i64>, sqlx::Error> {
        let used: Option<i64> = sqlx::query_scalar("SELECT used_credits FROM user_credits WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(&mut *conn)
            .await?;
        let Some(used) = used else {
            return Ok(None);
        };

        let restored = amount.min(used).max(0);
        if restored > 0 {
            sqlx::query(
                r#"
                UPDATE user_credits
                SET used_credits = used_credits - ?1,
                    available_credits = available_credits + ?1,
                    updated_at = ?2
                WHERE user_id = ?3
                "#,
            )
            .bind(restored)
            .bind(now)
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        }
        Ok(Some(restored))
    }

    /// Add purchased credits, creating the balance row on first grant
    pub async fn add(
        conn: &mut SqliteConnection,
        user_id: &str,
        amount: i64,
        now: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_credits (user_id, total_credits, used_credits, available_credits, created_at, updated_at)
            VALUES (?1, ?2, 0, ?2, ?3, ?3)
            ON CONFLICT(user_id) DO UPDATE SET
                total_credits = total_credits + excluded.total_credits,
                available_credits = available_credits + excluded.total_credits,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(amount)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(())
    }
}

impl CreditTransaction {
    pub async fn record(
        conn: &mut SqliteConnection,
        user_id: &str,
        kind: CreditTransactionKind,
        amount: i64,
        payment_id: Option<&str>,
        booking_id: Option<&str>,
        now: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO credit_transactions (id, user_id, kind, amount, payment_id, booking_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(kind.as_str())
        .bind(amount)
        .bind(payment_id)
        .bind(booking_id)
        .bind(now)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn list_for_user(
        db: &SqlitePool,
        user_id: &str,
    ) -> Result<Vec<CreditTransaction>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, user_id, kind, amount, payment_id, booking_id, created_at
            FROM credit_transactions
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await
    }
}
