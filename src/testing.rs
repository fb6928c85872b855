//! Shared fixtures for unit tests.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tempfile::TempDir;

use crate::config::{LessonConfig, StorageConfig};
use crate::db::{self, CreditBalance, SlotInput, TeacherProfile, UserRole};
use crate::directory::DbDirectory;
use crate::scheduler::{LessonPolicy, LessonScheduler, RetryPolicy, SLOT_MINUTES};
use crate::DbPool;

pub const MEET_LINK: &str = "https://meet.example.com/lesson-room";

/// A fresh on-disk database, removed when dropped
pub struct TestDb {
    pub pool: DbPool,
    _dir: TempDir,
}

impl TestDb {
    pub async fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let storage = StorageConfig {
            max_connections: 8,
            ..StorageConfig::default()
        };
        let pool = db::init(dir.path(), &storage).await.unwrap();
        Self { pool, _dir: dir }
    }

    pub fn scheduler(&self) -> LessonScheduler {
        let lessons = LessonConfig::default();
        let directory = Arc::new(DbDirectory::new(self.pool.clone()));
        LessonScheduler::new(
            self.pool.clone(),
            directory.clone(),
            directory,
            LessonPolicy {
                flat_rate_per_lesson: lessons.flat_rate_per_lesson,
                cancellation_window: chrono::Duration::hours(lessons.cancellation_window_hours),
            },
            RetryPolicy {
                max_attempts: 3,
                base_backoff: Duration::from_millis(1),
            },
        )
    }
}

pub fn at(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, minute, 0).unwrap()
}

/// One 30-minute slot starting at `start`
pub fn slot(start: DateTime<Utc>) -> SlotInput {
    SlotInput {
        start_time: start,
        end_time: start + chrono::Duration::minutes(SLOT_MINUTES),
        day_of_week: None,
    }
}

/// A teacher with a complete onboarding profile
pub async fn seed_teacher(pool: &DbPool, teacher_id: &str) {
    UserRole::upsert(pool, teacher_id, true, false).await.unwrap();
    TeacherProfile::upsert(
        pool,
        &TeacherProfile {
            teacher_id: teacher_id.to_string(),
            field: Some("Mathematics".to_string()),
            price_range: Some("40-60".to_string()),
            meet_link: Some(MEET_LINK.to_string()),
            bio: Some("Algebra and calculus tutor".to_string()),
        },
    )
    .await
    .unwrap();
}

/// An approved student holding `credits` unspent credits
pub async fn seed_student(pool: &DbPool, student_id: &str, credits: i64) {
    UserRole::upsert(pool, student_id, false, true).await.unwrap();
    if credits > 0 {
        let mut conn = pool.acquire().await.unwrap();
        CreditBalance::add(&mut conn, student_id, credits, "2030-01-01T00:00:00Z")
            .await
            .unwrap();
    }
}

pub async fn balance(pool: &DbPool, user_id: &str) -> CreditBalance {
    CreditBalance::find(pool, user_id)
        .await
        .unwrap()
        .unwrap_or_else(|| CreditBalance::empty(user_id))
}
