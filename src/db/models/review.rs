//! Lesson review models.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Sqlite, SqliteConnection, SqlitePool};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct LessonReview {
    pub id: String,
    pub booking_id: String,
    pub student_id: String,
    pub teacher_id: String,
    pub rating: i64,
    pub comment: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubmitReviewRequest {
    pub booking_id: String,
    pub teacher_id: String,
    pub rating: i64,
    #[serde(default)]
    pub comment: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitReviewResponse {
    pub message: String,
    pub review: LessonReview,
}

/// Aggregated ratings for one teacher
#[derive(Debug, Clone, Serialize)]
pub struct TeacherReviews {
    /// Unweighted mean over all reviews, 0.0 when there are none
    pub average_rating: f64,
    pub total_reviews: i64,
    pub reviews: Vec<LessonReview>,
}

/// A teacher in the public directory with their rating summary
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TeacherRating {
    pub teacher_id: String,
    pub field: Option<String>,
    pub price_range: Option<String>,
    pub meet_link: Option<String>,
    pub bio: Option<String>,
    pub average_rating: f64,
    pub total_reviews: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TeacherListQuery {
    #[serde(default)]
    pub field: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TeacherListResponse {
    pub teachers: Vec<TeacherRating>,
    pub count: usize,
}

impl TeacherRating {
    /// Every teacher with their review average, best rated first. `field`
    /// matches a case-insensitive substring of the profile field.
    pub async fn list(db: &SqlitePool, field: Option<&str>) -> Result<Vec<TeacherRating>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT r.user_id AS teacher_id, p.field, p.price_range, p.meet_link, p.bio,
                   COALESCE(AVG(lr.rating), 0.0) AS average_rating,
                   COUNT(lr.id) AS total_reviews
            FROM user_roles r
            LEFT JOIN teacher_profiles p ON p.teacher_id = r.user_id
            LEFT JOIN lesson_reviews lr ON lr.teacher_id = r.user_id
            WHERE r.is_teacher = 1
              AND (?1 IS NULL OR instr(lower(COALESCE(p.field, '')), lower(?1)) > 0)
            GROUP BY r.user_id, p.field, p.price_range, p.meet_link, p.bio
            ORDER BY average_rating DESC, total_reviews DESC, r.user_id ASC
            "#,
        )
        .bind(field)
        .fetch_all(db)
        .await
    }
}

impl LessonReview {
    pub async fn exists_for_booking<'e, E>(executor: E, booking_id: &str) -> Result<bool, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Sqlite>,
    {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM lesson_reviews WHERE booking_id = ?")
            .bind(booking_id)
            .fetch_one(executor)
            .await?;
        Ok(count > 0)
    }

    pub async fn insert(conn: &mut SqliteConnection, review: &LessonReview) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO lesson_reviews (id, booking_id, student_id, teacher_id, rating, comment, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&review.id)
        .bind(&review.booking_id)
        .bind(&review.student_id)
        .bind(&review.teacher_id)
        .bind(review.rating)
        .bind(&review.comment)
        .bind(&review.created_at)
        .execute(conn)
        .await?;
        Ok(())
    }

    pub async fn list_for_teacher(
        db: &SqlitePool,
        teacher_id: &str,
    ) -> Result<Vec<LessonReview>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT id, booking_id, student_id, teacher_id, rating, comment, created_at
            FROM lesson_reviews
            WHERE teacher_id = ?
            ORDER BY created_at DESC
            "#,
        )
        .bind(teacher_id)
        .fetch_all(db)
        .await
    }
}
