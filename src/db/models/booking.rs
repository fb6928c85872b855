//! Lesson booking models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool};

/// Booking lifecycle. `Cancelled` and `Completed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Scheduled,
    Cancelled,
    Completed,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Scheduled => "scheduled",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Completed => "completed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BookingStatus::Scheduled)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(BookingStatus::Scheduled),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "completed" => Ok(BookingStatus::Completed),
            _ => Err(format!("Unknown booking status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LessonBooking {
    pub id: String,
    pub student_id: String,
    pub teacher_id: String,
    pub start_time: String,
    pub end_time: String,
    pub status: String,
    /// Teacher's meeting link as it was when the booking was made
    pub meet_link: Option<String>,
    pub notes: Option<String>,
    /// Set once the credit for a cancelled booking is back on the ledger
    pub refunded_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl LessonBooking {
    /// The schema restricts `status` to known values
    pub fn status(&self) -> BookingStatus {
        self.status.parse().unwrap_or(BookingStatus::Scheduled)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateBookingRequest {
    pub teacher_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CancelBookingRequest {
    pub booking_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CancelBookingResponse {
    pub message: String,
    pub booking: LessonBooking,
    /// False when the refund is left to the reconciler
    pub refunded: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct BookingListResponse {
    pub bookings: Vec<LessonBooking>,
    pub count: usize,
}

/// A booking about to be inserted
#[derive(Debug, Clone)]
pub struct NewBooking<'a> {
    pub id: &'a str,
    pub student_id: &'a str,
    pub teacher_id: &'a str,
    pub start_time: &'a str,
    pub end_time: &'a str,
    pub meet_link: Option<&'a str>,
    pub notes: Option<&'a str>,
    pub now: &'a str,
}

/// A cancellation still waiting for its refund
#[derive(Debug, Clone, FromRow)]
pub struct UnrefundedBooking {
    pub id: String,
    pub student_id: String,
    pub updated_at: String,
}

/// Position in the unrefunded queue; the default starts at the beginning
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnrefundedCursor {
    pub updated_at: String,
    pub id: String,
}

impl From<&UnrefundedBooking> for UnrefundedCursor {
    fn from(booking: &UnrefundedBooking) -> Self {
        Self {
            updated_at: booking.updated_at.clone(),
            id: booking.id.clone(),
        }
    }
}

const BOOKING_COLUMNS: &str = "id, student_id, teacher_id, start_time, end_time, status, meet_link, notes, refunded_at, created_at, updated_at";

impl LessonBooking {
    pub async fn find_by_id<'e, E>(executor: E, id: &str) -> Result<Option<LessonBooking>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        sqlx::query_as(&format!(
            "SELECT {} FROM lesson_bookings WHERE id = ?",
            BOOKING_COLUMNS
        ))
        .bind(id)
        .fetch_optional(executor)
        .await
    }

    pub async fn list_for_student(
        db: &SqlitePool,
        student_id: &str,
    ) -> Result<Vec<LessonBooking>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM lesson_bookings WHERE student_id = ? ORDER BY start_time DESC",
            BOOKING_COLUMNS
        ))
        .bind(student_id)
        .fetch_all(db)
        .await
    }

    pub async fn list_for_teacher(
        db: &SqlitePool,
        teacher_id: &str,
    ) -> Result<Vec<LessonBooking>, sqlx::Error> {
        sqlx::query_as(&format!(
            "SELECT {} FROM lesson_bookings WHERE teacher_id = ? ORDER BY start_time DESC",
            BOOKING_COLUMNS
        ))
        .bind(teacher_id)
        .fetch_all(db)
        .await
    }

    /// Whether a non-cancelled booking already holds this teacher slot
    pub async fn slot_is_taken(
        conn: &mut SqliteConnection,
        teacher_id: &str,
        start_time: &str,
    ) -> Result<bool, sqlx::Error> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM lesson_bookings WHERE teacher_id = ? AND start_time = ? AND status != 'cancelled'",
        )
        .bind(teacher_id)
        .bind(start_time)
        .fetch_one(conn)
        .await?;
        Ok(count > 0)
    }

    pub async fn insert(conn: &mut SqliteConnection, new: &NewBooking<'_>) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO lesson_bookings (id, student_id, teacher_id, start_time, end_time, status, meet_link, notes, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'scheduled', ?, ?, ?, ?)
            "#,
        )
        .bind(new.id)
        .bind(new.student_id)
        .bind(new.teacher_id)
        .bind(new.start_time)
        .bind(new.end_time)
        .bind(new.meet_link)
        .bind(new.notes)
        .bind(new.now)
        .bind(new.now)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Flip the student's scheduled booking to cancelled if it starts at or
    /// after `cutoff`. Returns false when any condition does not hold.
    pub async fn cancel_if_allowed(
        conn: &mut SqliteConnection,
        id: &str,
        student_id: &str,
        cutoff: &str,
        now: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE lesson_bookings SET status = 'cancelled', updated_at = ?1
            WHERE id = ?2 AND student_id = ?3 AND status = 'scheduled' AND start_time >= ?4
            "#,
        )
        .bind(now)
        .bind(id)
        .bind(student_id)
        .bind(cutoff)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Stamp a cancelled booking as refunded. Returns false if already stamped.
    pub async fn mark_refunded(
        conn: &mut SqliteConnection,
        id: &str,
        now: &str,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            UPDATE lesson_bookings SET refunded_at = ?, updated_at = ?
            WHERE id = ? AND status = 'cancelled' AND refunded_at IS NULL
            "#,
        )
        .bind(now)
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Promote every scheduled booking that ended before `now` to completed
    pub async fn complete_ended(db: &SqlitePool, now: &str) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE lesson_bookings SET status = 'completed', updated_at = ? WHERE status = 'scheduled' AND end_time < ?",
        )
        .bind(now)
        .bind(now)
        .execute(db)
        .await?;
        Ok(result.rows_affected())
    }

    /// Cancelled bookings whose credit has not been returned yet, ordered by
    /// `(updated_at, id)` and starting strictly after `after`
    pub async fn list_unrefunded(
        db: &SqlitePool,
        after: &UnrefundedCursor,
        limit: i64,
    ) -> Result<Vec<UnrefundedBooking>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, student_id, updated_at FROM lesson_bookings
            WHERE status = 'cancelled' AND refunded_at IS NULL
              AND (updated_at > ?1 OR (updated_at = ?1 AND id > ?2))
            ORDER BY updated_at ASC, id ASC
            LIMIT ?3
            "#,
        )
        .bind(&after.updated_at)
        .bind(&after.id)
        .bind(limit)
        .fetch_all(db)
        .await
    }

    /// Completed lesson counts for a teacher, keyed by `YYYY-MM` of the start time
    pub async fn completed_per_month(
        db: &SqlitePool,
        teacher_id: &str,
    ) -> Result<Vec<(String, i64)>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT substr(start_time, 1, 7) AS month, COUNT(*) AS lessons
            FROM lesson_bookings
            WHERE teacher_id = ? AND status = 'completed'
            GROUP BY month
            ORDER BY month ASC
            "#,
        )
        .bind(teacher_id)
        .fetch_all(db)
        .await
    }
}
