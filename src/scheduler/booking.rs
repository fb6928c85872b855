use chrono::{DateTime, Duration, Timelike, Utc};

use super::error::is_unique_violation;
use super::{ledger, validate_slot_window, week_start_date, with_retry, LessonScheduler, SchedulingError};
use crate::db::{format_timestamp, AvailabilitySlot, LessonBooking, NewBooking};
use crate::telemetry;

/// Credits consumed by one lesson
pub const CREDITS_PER_LESSON: i64 = 1;

pub const MAX_NOTES_LEN: usize = 1000;

/// Smallest whole second at or after `at`. Stored timestamps have second
/// precision, so lower bounds derived from a sub-second `now` round up.
fn ceil_to_second(at: DateTime<Utc>) -> DateTime<Utc> {
    let nanos = at.nanosecond();
    if nanos == 0 {
        return at;
    }
    at - Duration::nanoseconds(i64::from(nanos)) + Duration::seconds(1)
}

#[derive(Debug, Clone)]
pub struct CancelOutcome {
    pub booking: LessonBooking,
    /// False when no ledger row existed; the reconciler retries later
    pub refunded: bool,
}

impl LessonScheduler {
    /// Reserve one slot for a student, debiting one credit in the same transaction
    pub async fn book_lesson(
        &self,
        student_id: &str,
        teacher_id: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        notes: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<LessonBooking, SchedulingError> {
        self.require_approved_student(student_id).await?;

        if student_id == teacher_id {
            return Err(SchedulingError::Validation(
                "You cannot book a lesson with yourself".to_string(),
            ));
        }

        validate_slot_window(start_time, end_time)?;
        if start_time <= now {
            return Err(SchedulingError::InvalidTimeRange(
                "lessons must be booked in the future".to_string(),
            ));
        }

        let notes = notes.map(str::trim).filter(|n| !n.is_empty());
        if notes.map(|n| n.chars().count() > MAX_NOTES_LEN).unwrap_or(false) {
            return Err(SchedulingError::Validation(format!(
                "notes must be at most {} characters",
                MAX_NOTES_LEN
            )));
        }

        let is_teacher = self
            .identity
            .is_teacher(teacher_id)
            .await
            .map_err(SchedulingError::Collaborator)?;
        if !is_teacher {
            return Err(SchedulingError::NotFound("Teacher not found".to_string()));
        }

        // Copied onto the booking so later profile edits do not change it
        let meet_link = self
            .profiles
            .teacher_profile(teacher_id)
            .await
            .map_err(SchedulingError::Collaborator)?
            .and_then(|p| p.meet_link)
            .filter(|link| !link.trim().is_empty());

        let booking_id = uuid::Uuid::new_v4().to_string();
        let start_key = format_timestamp(start_time);
        let end_key = format_timestamp(end_time);
        let week_key = format_timestamp(week_start_date(start_time));
        let now_key = format_timestamp(now);

        let new = NewBooking {
            id: &booking_id,
            student_id,
            teacher_id,
            start_time: &start_key,
            end_time: &end_key,
            meet_link: meet_link.as_deref(),
            notes,
            now: &now_key,
        };
        let new = &new;
        let week = week_key.as_str();

        let result = with_retry(&self.retry, "book_lesson", move || async move {
            let mut tx = self.db.begin().await?;

            // Write first so the transaction holds the write lock from here on
            let debited =
                ledger::try_debit(&mut tx, new.student_id, CREDITS_PER_LESSON, new.id, new.now)
                    .await?;

            if !AvailabilitySlot::is_offered(&mut tx, new.teacher_id, week, new.start_time, new.end_time)
                .await?
            {
                return Err(SchedulingError::SlotUnavailable);
            }
            if LessonBooking::slot_is_taken(&mut tx, new.teacher_id, new.start_time).await? {
                return Err(SchedulingError::SlotUnavailable);
            }
            if !debited {
                return Err(SchedulingError::InsufficientCredits);
            }

            match LessonBooking::insert(&mut tx, new).await {
                Ok(()) => {}
                Err(err) if is_unique_violation(&err) => return Err(SchedulingError::SlotUnavailable),
                Err(err) => return Err(err.into()),
            }

            tx.commit().await?;
            Ok::<_, SchedulingError>(())
        })
        .await;

        if let Err(err) = result {
            let outcome = match err {
                SchedulingError::SlotUnavailable => "slot_unavailable",
                SchedulingError::InsufficientCredits => "insufficient_credits",
                _ => "error",
            };
            telemetry::record_booking(outcome);
            tracing::debug!(
                student_id = %student_id,
                teacher_id = %teacher_id,
                start_time = %start_key,
                outcome = outcome,
                "Booking rejected"
            );
            return Err(err);
        }
        telemetry::record_booking("success");

        tracing::info!(
            booking_id = %booking_id,
            student_id = %student_id,
            teacher_id = %teacher_id,
            start_time = %start_key,
            "Lesson booked"
        );

        LessonBooking::find_by_id(&self.db, &booking_id)
            .await?
            .ok_or_else(|| SchedulingError::NotFound("Booking not found".to_string()))
    }

    /// Cancel a student's scheduled lesson and give the credit back
    pub async fn cancel_lesson(
        &self,
        student_id: &str,
        booking_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CancelOutcome, SchedulingError> {
        self.require_approved_student(student_id).await?;

        let now_key = format_timestamp(now);
        let cutoff_key = format_timestamp(ceil_to_second(now + self.policy.cancellation_window));
        let stamp = now_key.as_str();
        let cutoff = cutoff_key.as_str();
        let window_hours = self.policy.cancellation_window.num_hours();

        let refunded = with_retry(&self.retry, "cancel_lesson", move || async move {
            let mut tx = self.db.begin().await?;

            let cancelled =
                LessonBooking::cancel_if_allowed(&mut tx, booking_id, student_id, cutoff, stamp).await?;
            if !cancelled {
                let booking = LessonBooking::find_by_id(&mut *tx, booking_id).await?;
                return Err(match booking {
                    Some(b) if b.student_id == student_id => {
                        let status = b.status();
                        if status.is_terminal() {
                            SchedulingError::AlreadyTerminal(status)
                        } else {
                            SchedulingError::CancellationWindowClosed { hours: window_hours }
                        }
                    }
                    _ => SchedulingError::NotFound("Booking not found".to_string()),
                });
            }

            let refunded =
                ledger::refund(&mut tx, student_id, CREDITS_PER_LESSON, booking_id, stamp).await?;
            if refunded {
                LessonBooking::mark_refunded(&mut tx, booking_id, stamp).await?;
            }

            tx.commit().await?;
            Ok::<_, SchedulingError>(refunded)
        })
        .await?;

        telemetry::record_cancellation();
        if refunded {
            tracing::info!(booking_id = %booking_id, student_id = %student_id, "Lesson cancelled and credit refunded");
        } else {
            tracing::warn!(
                booking_id = %booking_id,
                student_id = %student_id,
                "Lesson cancelled but refund could not be applied, left for reconciliation"
            );
        }

        let booking = LessonBooking::find_by_id(&self.db, booking_id)
            .await?
            .ok_or_else(|| SchedulingError::NotFound("Booking not found".to_string()))?;

        Ok(CancelOutcome { booking, refunded })
    }

    /// The student's bookings, newest first, after promoting ended lessons
    pub async fn student_bookings(
        &self,
        student_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<LessonBooking>, SchedulingError> {
        self.sweep_completed(now).await?;
        Ok(LessonBooking::list_for_student(&self.db, student_id).await?)
    }

    /// The teacher's bookings, newest first, after promoting ended lessons
    pub async fn teacher_bookings(
        &self,
        teacher_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<LessonBooking>, SchedulingError> {
        self.require_teacher(teacher_id, "view teaching bookings").await?;
        self.sweep_completed(now).await?;
        Ok(LessonBooking::list_for_teacher(&self.db, teacher_id).await?)
    }
}
