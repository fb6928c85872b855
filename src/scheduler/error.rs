use thiserror::Error;

use crate::db::BookingStatus;

/// The caller-facing classes of scheduling failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Policy,
    Conflict,
    InsufficientCredits,
    Authorization,
    NotFound,
    /// Storage contention that outlasted the retry budget
    Transient,
    Internal,
}

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("Invalid time range: {0}")]
    InvalidTimeRange(String),

    #[error("Rating must be between 1 and 5, got {0}")]
    InvalidRating(i64),

    #[error("{0}")]
    Validation(String),

    #[error(
        "Complete your teacher profile before editing availability. Missing: {}",
        .missing.join(", ")
    )]
    ProfileIncomplete { missing: Vec<String> },

    #[error("Lessons can only be cancelled at least {hours} hours before the start time")]
    CancellationWindowClosed { hours: i64 },

    #[error("Only completed lessons can be reviewed")]
    LessonNotCompleted,

    #[error("This time slot is no longer available")]
    SlotUnavailable,

    #[error("This lesson has already been reviewed")]
    ReviewAlreadyExists,

    #[error("Booking is already {0}")]
    AlreadyTerminal(BookingStatus),

    #[error("Not enough lesson credits")]
    InsufficientCredits,

    #[error("Only approved students can book, cancel or review lessons")]
    NotApprovedStudent,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Storage is busy, gave up after {attempts} attempts")]
    Transient { attempts: u32 },

    #[error("Directory service error: {0:#}")]
    Collaborator(anyhow::Error),

    #[error(transparent)]
    Database(#[from] sqlx::Error),
}

impl SchedulingError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            SchedulingError::InvalidTimeRange(_)
            | SchedulingError::InvalidRating(_)
            | SchedulingError::Validation(_) => ErrorCategory::Validation,
            SchedulingError::ProfileIncomplete { .. }
            | SchedulingError::CancellationWindowClosed { .. }
            | SchedulingError::LessonNotCompleted => ErrorCategory::Policy,
            SchedulingError::SlotUnavailable
            | SchedulingError::ReviewAlreadyExists
            | SchedulingError::AlreadyTerminal(_) => ErrorCategory::Conflict,
            SchedulingError::InsufficientCredits => ErrorCategory::InsufficientCredits,
            SchedulingError::NotApprovedStudent | SchedulingError::Forbidden(_) => {
                ErrorCategory::Authorization
            }
            SchedulingError::NotFound(_) => ErrorCategory::NotFound,
            SchedulingError::Transient { .. } => ErrorCategory::Transient,
            SchedulingError::Database(err) if is_busy(err) => ErrorCategory::Transient,
            SchedulingError::Collaborator(_)
            | SchedulingError::Database(_) => ErrorCategory::Internal,
        }
    }

    /// Whether re-running the whole operation may succeed
    pub fn is_transient(&self) -> bool {
        self.category() == ErrorCategory::Transient
    }
}

/// SQLite BUSY (5) and LOCKED (6), including their extended codes
pub(crate) fn is_busy(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db_err) => db_err
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .map(|code| matches!(code & 0xff, 5 | 6))
            .unwrap_or(false),
        _ => false,
    }
}

pub(crate) fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.is_unique_violation(),
        _ => false,
    }
}
