//! Seams to the identity and profile services.
//!
//! Who counts as a teacher or an approved student, and what a teacher's
//! onboarding profile contains, is decided outside this crate. Callers fail
//! closed: an unknown user is neither a teacher nor a student.

use anyhow::Result;
use async_trait::async_trait;

use crate::db::{TeacherProfile, UserRole};
use crate::DbPool;

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn is_approved_student(&self, user_id: &str) -> Result<bool>;

    async fn is_teacher(&self, user_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait ProfileProvider: Send + Sync {
    /// `None` when the teacher has never started onboarding
    async fn teacher_profile(&self, teacher_id: &str) -> Result<Option<TeacherProfile>>;
}

/// Reads the identity/profile read models replicated into the local database
#[derive(Clone)]
pub struct DbDirectory {
    db: DbPool,
}

impl DbDirectory {
    pub fn new(db: DbPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl IdentityProvider for DbDirectory {
    async fn is_approved_student(&self, user_id: &str) -> Result<bool> {
        let role = UserRole::find(&self.db, user_id).await?;
        Ok(role.map(|r| r.is_approved_student != 0).unwrap_or(false))
    }

    async fn is_teacher(&self, user_id: &str) -> Result<bool> {
        let role = UserRole::find(&self.db, user_id).await?;
        Ok(role.map(|r| r.is_teacher != 0).unwrap_or(false))
    }
}

#[async_trait]
impl ProfileProvider for DbDirectory {
    async fn teacher_profile(&self, teacher_id: &str) -> Result<Option<TeacherProfile>> {
        Ok(TeacherProfile::find(&self.db, teacher_id).await?)
    }
}
