//! Private-lesson scheduling core.
//!
//! - availability: teacher-declared 30-minute slots, one week at a time
//! - ledger: prepaid lesson credits (grant / debit / refund)
//! - booking: reserve and cancel slots against the ledger
//! - sweeper: promote ended lessons to completed, reconcile pending refunds
//! - stats: reviews, ratings and income over completed lessons
//!
//! Every mutating operation is one SQLite transaction, retried as a whole on
//! lock contention. Operations take `now` explicitly.

mod availability;
mod booking;
mod error;
pub mod ledger;
mod retry;
mod stats;
mod sweeper;

pub use availability::*;
pub use booking::*;
pub use error::*;
pub use retry::*;
pub use stats::*;
pub use sweeper::*;

use std::sync::Arc;

use crate::config::Config;
use crate::directory::{IdentityProvider, ProfileProvider};
use crate::DbPool;

/// Length of every lesson and availability slot
pub const SLOT_MINUTES: i64 = 30;

#[derive(Debug, Clone)]
pub struct LessonPolicy {
    pub flat_rate_per_lesson: i64,
    pub cancellation_window: chrono::Duration,
}

impl LessonPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            flat_rate_per_lesson: config.lessons.flat_rate_per_lesson,
            cancellation_window: chrono::Duration::hours(config.lessons.cancellation_window_hours),
        }
    }
}

pub struct LessonScheduler {
    db: DbPool,
    identity: Arc<dyn IdentityProvider>,
    profiles: Arc<dyn ProfileProvider>,
    policy: LessonPolicy,
    retry: RetryPolicy,
}

impl LessonScheduler {
    pub fn new(
        db: DbPool,
        identity: Arc<dyn IdentityProvider>,
        profiles: Arc<dyn ProfileProvider>,
        policy: LessonPolicy,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            db,
            identity,
            profiles,
            policy,
            retry,
        }
    }

    pub fn db(&self) -> &DbPool {
        &self.db
    }

    pub fn policy(&self) -> &LessonPolicy {
        &self.policy
    }

    /// Fail with `Forbidden` unless the user is a teacher
    pub async fn require_teacher(&self, user_id: &str, action: &str) -> Result<(), SchedulingError> {
        let is_teacher = self
            .identity
            .is_teacher(user_id)
            .await
            .map_err(SchedulingError::Collaborator)?;
        if is_teacher {
            Ok(())
        } else {
            Err(SchedulingError::Forbidden(format!("Only teachers can {}", action)))
        }
    }

    /// Fail with `NotApprovedStudent` unless the user may take lessons
    pub async fn require_approved_student(&self, user_id: &str) -> Result<(), SchedulingError> {
        let approved = self
            .identity
            .is_approved_student(user_id)
            .await
            .map_err(SchedulingError::Collaborator)?;
        if approved {
            Ok(())
        } else {
            Err(SchedulingError::NotApprovedStudent)
        }
    }
}
