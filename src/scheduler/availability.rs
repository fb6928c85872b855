use std::collections::HashSet;

use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Timelike, Utc};

use super::{with_retry, LessonScheduler, SchedulingError, SLOT_MINUTES};
use crate::db::{format_timestamp, AvailabilitySlot, NewSlot, SlotInput};

/// Monday 00:00 UTC of the ISO week containing `at`
pub fn week_start_date(at: DateTime<Utc>) -> DateTime<Utc> {
    let date = at.date_naive();
    let monday = date - Duration::days(i64::from(date.weekday().num_days_from_monday()));
    Utc.from_utc_datetime(&monday.and_time(NaiveTime::MIN))
}

/// 0 = Sunday .. 6 = Saturday
pub fn day_of_week(at: DateTime<Utc>) -> i64 {
    i64::from(at.weekday().num_days_from_sunday())
}

fn is_on_half_hour(at: DateTime<Utc>) -> bool {
    at.minute() % 30 == 0 && at.second() == 0 && at.nanosecond() == 0
}

/// A lesson window is exactly one aligned 30-minute slot
pub fn validate_slot_window(
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
) -> Result<(), SchedulingError> {
    if end_time - start_time != Duration::minutes(SLOT_MINUTES) {
        return Err(SchedulingError::InvalidTimeRange(format!(
            "slots must be exactly {} minutes long",
            SLOT_MINUTES
        )));
    }
    if !is_on_half_hour(start_time) || !is_on_half_hour(end_time) {
        return Err(SchedulingError::InvalidTimeRange(
            "slots must start and end on :00 or :30".to_string(),
        ));
    }
    Ok(())
}

/// Result of saving a teacher's week
#[derive(Debug, Clone)]
pub struct AvailabilityUpdate {
    pub week_start_date: String,
    pub slots: Vec<AvailabilitySlot>,
    /// Submitted slots dropped because they had already started
    pub dropped_past: usize,
}

impl LessonScheduler {
    /// Onboarding fields the teacher still has to fill in
    pub async fn missing_profile_fields(&self, teacher_id: &str) -> Result<Vec<String>, SchedulingError> {
        let profile = self
            .profiles
            .teacher_profile(teacher_id)
            .await
            .map_err(SchedulingError::Collaborator)?;

        Ok(match profile {
            Some(profile) => profile.missing_fields(),
            None => ["field", "price_range", "meet_link", "bio"]
                .iter()
                .map(|f| f.to_string())
                .collect(),
        })
    }

    /// Replace the teacher's availability for the week containing `week_of`.
    /// Slots that already started are dropped and counted, not rejected.
    pub async fn upsert_availability(
        &self,
        teacher_id: &str,
        week_of: DateTime<Utc>,
        slots: &[SlotInput],
        now: DateTime<Utc>,
    ) -> Result<AvailabilityUpdate, SchedulingError> {
        self.require_teacher(teacher_id, "update availability").await?;

        let missing = self.missing_profile_fields(teacher_id).await?;
        if !missing.is_empty() {
            return Err(SchedulingError::ProfileIncomplete { missing });
        }

        let week_start = week_start_date(week_of);
        if week_start < week_start_date(now) {
            return Err(SchedulingError::Validation(
                "Availability can only be edited for the current or a future week".to_string(),
            ));
        }
        let week_end = week_start + Duration::days(7);

        let mut seen = HashSet::new();
        let mut future_slots = Vec::with_capacity(slots.len());
        let mut dropped_past = 0;

        for slot in slots {
            validate_slot_window(slot.start_time, slot.end_time)?;

            if slot.start_time < week_start || slot.start_time >= week_end {
                return Err(SchedulingError::InvalidTimeRange(format!(
                    "slot {} is outside the week starting {}",
                    format_timestamp(slot.start_time),
                    format_timestamp(week_start)
                )));
            }

            let day = day_of_week(slot.start_time);
            if let Some(declared) = slot.day_of_week {
                if declared != day {
                    return Err(SchedulingError::Validation(format!(
                        "day_of_week {} does not match slot starting {}",
                        declared,
                        format_timestamp(slot.start_time)
                    )));
                }
            }

            if !seen.insert(slot.start_time) {
                return Err(SchedulingError::Validation(format!(
                    "duplicate slot starting {}",
                    format_timestamp(slot.start_time)
                )));
            }

            if slot.start_time < now {
                dropped_past += 1;
                continue;
            }

            future_slots.push(NewSlot {
                day_of_week: day,
                start_time: format_timestamp(slot.start_time),
                end_time: format_timestamp(slot.end_time),
            });
        }

        let week_key = format_timestamp(week_start);
        let now_key = format_timestamp(now);
        let future_slots = &future_slots;
        let week = week_key.as_str();
        let stamp = now_key.as_str();

        with_retry(&self.retry, "upsert_availability", move || async move {
            let mut tx = self.db.begin().await?;
            AvailabilitySlot::replace_week(&mut tx, teacher_id, week, future_slots, stamp).await?;
            tx.commit().await?;
            Ok::<_, SchedulingError>(())
        })
        .await?;

        let saved = AvailabilitySlot::list_for_week(&self.db, teacher_id, &week_key).await?;

        tracing::info!(
            teacher_id = %teacher_id,
            week_start = %week_key,
            saved = saved.len(),
            dropped_past = dropped_past,
            "Availability updated"
        );

        Ok(AvailabilityUpdate {
            week_start_date: week_key,
            slots: saved,
            dropped_past,
        })
    }

    /// Slots the teacher offers in the week containing `week_of`
    pub async fn availability_for_week(
        &self,
        teacher_id: &str,
        week_of: DateTime<Utc>,
    ) -> Result<(String, Vec<AvailabilitySlot>), SchedulingError> {
        let week_key = format_timestamp(week_start_date(week_of));
        let slots = AvailabilitySlot::list_for_week(&self.db, teacher_id, &week_key).await?;
        Ok((week_key, slots))
    }
}
