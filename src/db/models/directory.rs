//! Read models owned by the identity and profile services.
//!
//! This crate only reads these tables; the `upsert` helpers exist for the
//! services' sync jobs and for seeding local environments.

use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool};

use super::common::bool_to_int;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct UserRole {
    pub user_id: String,
    pub is_teacher: i64,
    pub is_approved_student: i64,
}

impl UserRole {
    pub async fn find(db: &SqlitePool, user_id: &str) -> Result<Option<UserRole>, sqlx::Error> {
        sqlx::query_as("SELECT user_id, is_teacher, is_approved_student FROM user_roles WHERE user_id = ?")
            .bind(user_id)
            .fetch_optional(db)
            .await
    }

    pub async fn upsert(
        db: &SqlitePool,
        user_id: &str,
        is_teacher: bool,
        is_approved_student: bool,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, is_teacher, is_approved_student)
            VALUES (?, ?, ?)
            ON CONFLICT(user_id) DO UPDATE SET
                is_teacher = excluded.is_teacher,
                is_approved_student = excluded.is_approved_student,
                updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
            "#,
        )
        .bind(user_id)
        .bind(bool_to_int(is_teacher))
        .bind(bool_to_int(is_approved_student))
        .execute(db)
        .await?;
        Ok(())
    }
}

/// The onboarding fields a teacher must fill before publishing availability
#[derive(Debug, Clone, Default, Serialize, Deserialize, FromRow)]
pub struct TeacherProfile {
    pub teacher_id: String,
    pub field: Option<String>,
    pub price_range: Option<String>,
    pub meet_link: Option<String>,
    pub bio: Option<String>,
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(str::trim).unwrap_or("").is_empty()
}

impl TeacherProfile {
    /// Names of the onboarding fields that are still empty
    pub fn missing_fields(&self) -> Vec<String> {
        [
            ("field", &self.field),
            ("price_range", &self.price_range),
            ("meet_link", &self.meet_link),
            ("bio", &self.bio),
        ]
        .into_iter()
        .filter(|(_, value)| is_blank(value))
        .map(|(name, _)| name.to_string())
        .collect()
    }

    pub async fn find(db: &SqlitePool, teacher_id: &str) -> Result<Option<TeacherProfile>, sqlx::Error> {
        sqlx::query_as(
            "SELECT teacher_id, field, price_range, meet_link, bio FROM teacher_profiles WHERE teacher_id = ?",
        )
        .bind(teacher_id)
        .fetch_optional(db)
        .await
    }

    pub async fn upsert(db: &SqlitePool, profile: &TeacherProfile) -> Result<(), sqlx::Error> {
        sqlx::query(
            r#"
            INSERT INTO teacher_profiles (teacher_id, field, price_range, meet_link, bio)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(teacher_id) DO UPDATE SET
                field = excluded.field,
                price_range = excluded.price_range,
                meet_link = excluded.meet_link,
                bio = excluded.bio,
                updated_at = strftime('%Y-%m-%dT%H:%M:%SZ', 'now')
            "#,
        )
        .bind(&profile.teacher_id)
        .bind(&profile.field)
        .bind(&profile.price_range)
        .bind(&profile.meet_link)
        .bind(&profile.bio)
        .execute(db)
        .await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ProfileStatusResponse {
    pub complete: bool,
    pub missing_fields: Vec<String>,
}
