//! Teacher availability slots.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqliteConnection, SqlitePool};

/// A bookable 30-minute window declared by a teacher for one week
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct AvailabilitySlot {
    pub id: String,
    pub teacher_id: String,
    pub week_start_date: String,
    /// 0 = Sunday .. 6 = Saturday
    pub day_of_week: i64,
    pub start_time: String,
    pub end_time: String,
    pub created_at: String,
    pub updated_at: String,
}

/// One slot as submitted by the availability editor
#[derive(Debug, Clone, Deserialize)]
pub struct SlotInput {
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    /// Optional; when present it must agree with `start_time`
    #[serde(default)]
    pub day_of_week: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpsertAvailabilityRequest {
    /// Any instant inside the target week; defaults to the current week
    #[serde(default)]
    pub week_start: Option<DateTime<Utc>>,
    pub slots: Vec<SlotInput>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AvailabilityQuery {
    #[serde(default)]
    pub week_start: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AvailabilityResponse {
    pub week_start_date: String,
    pub availability: Vec<AvailabilitySlot>,
}

#[derive(Debug, Clone, Serialize)]
pub struct UpsertAvailabilityResponse {
    pub message: String,
    pub week_start_date: String,
    pub availability: Vec<AvailabilitySlot>,
    /// True when some submitted slots were already in the past
    pub filtered: bool,
    pub filtered_count: usize,
}

/// A validated slot ready to be persisted
#[derive(Debug, Clone)]
pub struct NewSlot {
    pub day_of_week: i64,
    pub start_time: String,
    pub end_time: String,
}

const SLOT_COLUMNS: &str =
    "id, teacher_id, week_start_date, day_of_week, start_time, end_time, created_at, updated_at";

impl AvailabilitySlot {
    /// All slots of a teacher for the given week, in time order
    pub async fn list_for_week(
        db: &SqlitePool,
        teacher_id: &str,
        week_start_date: &str,
    ) -> Result<Vec<AvailabilitySlot>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM teacher_availability WHERE teacher_id = ? AND week_start_date = ? ORDER BY start_time ASC",
            SLOT_COLUMNS
        ))
        .bind(teacher_id)
        .bind(week_start_date)
        .fetch_all(db)
        .await
    }

    /// Replace the teacher's whole week with `slots`
    pub async fn replace_week(
        conn: &mut SqliteConnection,
        teacher_id: &str,
        week_start_date: &str,
        slots: &[NewSlot],
        now: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM teacher_availability WHERE teacher_id = ? AND week_start_date = ?")
            .bind(teacher_id)
            .bind(week_start_date)
            .execute(&mut *conn)
            .await?;

        for slot in slots {
            sqlx::query(
                r#"
                INSERT INTO teacher_availability (id, teacher_id, week_start_date, day_of_week, start_time, end_time, created_at, updated_at)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(uuid::Uuid::new_v4().to_string())
            .bind(teacher_id)
            .bind(week_start_date)
            .bind(slot.day_of_week)
            .bind(&slot.start_time)
            .bind(&slot.end_time)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await?;
        }

        Ok(())
    }

    /// Whether the teacher currently offers exactly this slot
    pub async fn is_offered(
        conn: &mut SqliteConnection,
        teacher_id: &str,
        week_start_date: &str,
        start_time: &str,
        end_time: &str,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM teacher_availability
            WHERE teacher_id = ? AND week_start_date = ? AND start_time = ? AND end_time = ?
            "#,
        )
        .bind(teacher_id)
        .bind(week_start_date)
        .bind(start_time)
        .bind(end_time)
        .fetch_one(conn)
        .await?;
        Ok(count > 0)
    }
}
