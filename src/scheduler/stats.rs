//! Ratings and income derived from completed lessons.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::error::is_unique_violation;
use super::{with_retry, LessonScheduler, SchedulingError};
use crate::db::{format_timestamp, BookingStatus, LessonBooking, LessonReview, TeacherRating, TeacherReviews};

pub const MAX_COMMENT_LEN: usize = 1000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MonthlyIncome {
    pub lessons: i64,
    pub income: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TeacherIncome {
    pub total_lessons: i64,
    pub total_income: i64,
    /// Keyed by `YYYY-MM` of the lesson start time
    pub monthly_income: BTreeMap<String, MonthlyIncome>,
}

/// Unweighted mean, 0.0 for no ratings
pub fn average_rating(ratings: &[i64]) -> f64 {
    if ratings.is_empty() {
        return 0.0;
    }
    ratings.iter().sum::<i64>() as f64 / ratings.len() as f64
}

fn normalize_comment(comment: Option<&str>) -> Result<Option<String>, SchedulingError> {
    let comment = comment.map(str::trim).filter(|c| !c.is_empty());
    match comment {
        Some(c) if c.chars().count() > MAX_COMMENT_LEN => Err(SchedulingError::Validation(format!(
            "comment must be at most {} characters",
            MAX_COMMENT_LEN
        ))),
        other => Ok(other.map(str::to_string)),
    }
}

impl LessonScheduler {
    /// Record the student's review of a completed lesson. One review per booking.
    pub async fn submit_review(
        &self,
        student_id: &str,
        booking_id: &str,
        teacher_id: &str,
        rating: i64,
        comment: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<LessonReview, SchedulingError> {
        self.require_approved_student(student_id).await?;

        if !(1..=5).contains(&rating) {
            return Err(SchedulingError::InvalidRating(rating));
        }
        let comment = normalize_comment(comment)?;

        let review = LessonReview {
            id: uuid::Uuid::new_v4().to_string(),
            booking_id: booking_id.to_string(),
            student_id: student_id.to_string(),
            teacher_id: teacher_id.to_string(),
            rating,
            comment,
            created_at: format_timestamp(now),
        };
        let review_ref = &review;

        with_retry(&self.retry, "submit_review", move || async move {
            let mut tx = self.db.begin().await?;

            let booking = LessonBooking::find_by_id(&mut *tx, booking_id)
                .await?
                .filter(|b| b.student_id == student_id)
                .ok_or_else(|| SchedulingError::NotFound("Booking not found".to_string()))?;
            if booking.teacher_id != teacher_id {
                return Err(SchedulingError::Validation(
                    "Booking does not belong to this teacher".to_string(),
                ));
            }
            if booking.status() != BookingStatus::Completed {
                return Err(SchedulingError::LessonNotCompleted);
            }
            if LessonReview::exists_for_booking(&mut *tx, booking_id).await? {
                return Err(SchedulingError::ReviewAlreadyExists);
            }

            match LessonReview::insert(&mut tx, review_ref).await {
                Ok(()) => {}
                Err(err) if is_unique_violation(&err) => return Err(SchedulingError::ReviewAlreadyExists),
                Err(err) => return Err(err.into()),
            }

            tx.commit().await?;
            Ok::<_, SchedulingError>(())
        })
        .await?;

        tracing::info!(
            booking_id = %booking_id,
            teacher_id = %teacher_id,
            rating = rating,
            "Review submitted"
        );
        Ok(review)
    }

    /// All reviews of a teacher, newest first, with the average rating
    pub async fn teacher_reviews(&self, teacher_id: &str) -> Result<TeacherReviews, SchedulingError> {
        let reviews = LessonReview::list_for_teacher(&self.db, teacher_id).await?;
        let ratings: Vec<i64> = reviews.iter().map(|r| r.rating).collect();

        Ok(TeacherReviews {
            average_rating: average_rating(&ratings),
            total_reviews: reviews.len() as i64,
            reviews,
        })
    }

    /// The teacher directory with ratings, optionally narrowed to a field.
    /// A blank filter or `all` lists every teacher.
    pub async fn teachers_with_ratings(&self, field: Option<&str>) -> Result<Vec<TeacherRating>, SchedulingError> {
        let field = field
            .map(str::trim)
            .filter(|f| !f.is_empty() && !f.eq_ignore_ascii_case("all"));

        let mut teachers = TeacherRating::list(&self.db, field).await?;
        for teacher in &mut teachers {
            teacher.average_rating = (teacher.average_rating * 10.0).round() / 10.0;
        }
        Ok(teachers)
    }

    /// Completed lessons folded into totals and per-month buckets at the flat rate
    pub async fn teacher_income(&self, teacher_id: &str) -> Result<TeacherIncome, SchedulingError> {
        self.require_teacher(teacher_id, "access income data").await?;

        let rate = self.policy.flat_rate_per_lesson;
        let per_month = LessonBooking::completed_per_month(&self.db, teacher_id).await?;

        let mut income = TeacherIncome::default();
        for (month, lessons) in per_month {
            income.total_lessons += lessons;
            income.monthly_income.insert(
                month,
                MonthlyIncome {
                    lessons,
                    income: lessons * rate,
                },
            );
        }
        income.total_income = income.total_lessons * rate;

        Ok(income)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::TeacherProfile;
    use crate::testing::{at, seed_student, seed_teacher, slot, TestDb};

    /// Books and completes lessons for `s1` with `t1` at the given starts
    async fn completed_lessons(test_db: &TestDb, starts: &[DateTime<Utc>]) -> (LessonScheduler, Vec<LessonBooking>) {
        seed_teacher(&test_db.pool, "t1").await;
        seed_student(&test_db.pool, "s1", starts.len() as i64).await;
        let scheduler = test_db.scheduler();
        let now = at(2030, 1, 1, 0, 0);

        let mut weeks: BTreeMap<String, Vec<_>> = BTreeMap::new();
        for start in starts {
            weeks
                .entry(format_timestamp(crate::scheduler::week_start_date(*start)))
                .or_default()
                .push(slot(*start));
        }
        for slots in weeks.values() {
            scheduler
                .upsert_availability("t1", slots[0].start_time, slots, now)
                .await
                .unwrap();
        }

        let mut bookings = Vec::new();
        for start in starts {
            let s = slot(*start);
            bookings.push(
                scheduler
                    .book_lesson("s1", "t1", s.start_time, s.end_time, None, now)
                    .await
                    .unwrap(),
            );
        }
        scheduler.sweep_completed(at(2030, 12, 31, 0, 0)).await.unwrap();
        (scheduler, bookings)
    }

    #[test]
    fn test_average_rating() {
        assert_eq!(average_rating(&[]), 0.0);
        assert_eq!(average_rating(&[5]), 5.0);
        assert!((average_rating(&[5, 4, 4]) - 4.333_333).abs() < 1e-5);
    }

    #[test]
    fn test_comment_normalization() {
        assert_eq!(normalize_comment(None).unwrap(), None);
        assert_eq!(normalize_comment(Some("   ")).unwrap(), None);
        assert_eq!(
            normalize_comment(Some("  great lesson ")).unwrap().as_deref(),
            Some("great lesson")
        );
        let long = "y".repeat(MAX_COMMENT_LEN + 1);
        assert!(matches!(
            normalize_comment(Some(&long)),
            Err(SchedulingError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_review_once_after_completion() {
        let test_db = TestDb::new().await;
        let (scheduler, bookings) = completed_lessons(&test_db, &[at(2030, 1, 9, 10, 0)]).await;
        let booking = &bookings[0];
        let now = at(2030, 1, 9, 12, 0);

        let review = scheduler
            .submit_review("s1", &booking.id, "t1", 5, Some(" Very clear "), now)
            .await
            .unwrap();
        assert_eq!(review.comment.as_deref(), Some("Very clear"));

        let err = scheduler
            .submit_review("s1", &booking.id, "t1", 4, None, now)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulingError::ReviewAlreadyExists));

        let summary = scheduler.teacher_reviews("t1").await.unwrap();
        assert_eq!(summary.total_reviews, 1);
        assert_eq!(summary.average_rating, 5.0);
    }

    #[tokio::test]
    async fn test_scheduled_lesson_cannot_be_reviewed() {
        let test_db = TestDb::new().await;
        seed_teacher(&test_db.pool, "t1").await;
        seed_student(&test_db.pool, "s1", 1).await;
        let scheduler = test_db.scheduler();
        let now = at(2030, 1, 7, 8, 0);
        scheduler
            .upsert_availability("t1", now, &[slot(at(2030, 1, 9, 10, 0))], now)
            .await
            .unwrap();
        let s = slot(at(2030, 1, 9, 10, 0));
        let booking = scheduler
            .book_lesson("s1", "t1", s.start_time, s.end_time, None, now)
            .await
            .unwrap();

        let err = scheduler
            .submit_review("s1", &booking.id, "t1", 5, None, now)
            .await
            .unwrap_err();
        assert!(matches!(err, SchedulingError::LessonNotCompleted));
    }

    #[tokio::test]
    async fn test_review_preconditions() {
        let test_db = TestDb::new().await;
        let (scheduler, bookings) = completed_lessons(&test_db, &[at(2030, 1, 9, 10, 0)]).await;
        let booking = &bookings[0];
        let now = at(2030, 1, 9, 12, 0);
        seed_student(&test_db.pool, "s2", 0).await;

        for rating in [0, 6, -1] {
            assert!(matches!(
                scheduler.submit_review("s1", &booking.id, "t1", rating, None, now).await,
                Err(SchedulingError::InvalidRating(r)) if r == rating
            ));
        }
        assert!(matches!(
            scheduler.submit_review("s2", &booking.id, "t1", 5, None, now).await,
            Err(SchedulingError::NotFound(_))
        ));
        assert!(matches!(
            scheduler.submit_review("s1", &booking.id, "t9", 5, None, now).await,
            Err(SchedulingError::Validation(_))
        ));
        assert!(matches!(
            scheduler.submit_review("outsider", &booking.id, "t1", 5, None, now).await,
            Err(SchedulingError::NotApprovedStudent)
        ));

        assert_eq!(scheduler.teacher_reviews("t1").await.unwrap().total_reviews, 0);
    }

    #[tokio::test]
    async fn test_average_over_all_reviews() {
        let test_db = TestDb::new().await;
        let (scheduler, bookings) = completed_lessons(
            &test_db,
            &[at(2030, 1, 9, 10, 0), at(2030, 1, 9, 10, 30), at(2030, 1, 10, 9, 0)],
        )
        .await;

        let ratings = [5, 4, 4];
        for (i, (booking, rating)) in bookings.iter().zip(ratings).enumerate() {
            scheduler
                .submit_review("s1", &booking.id, "t1", rating, None, at(2030, 1, 11, 0, i as u32))
                .await
                .unwrap();
        }

        let summary = scheduler.teacher_reviews("t1").await.unwrap();
        assert_eq!(summary.total_reviews, 3);
        assert!((summary.average_rating - 13.0 / 3.0).abs() < 1e-9);
        // Newest first
        assert_eq!(summary.reviews[0].rating, 4);
        assert_eq!(summary.reviews[0].booking_id, bookings[2].id);

        let empty = scheduler.teacher_reviews("nobody").await.unwrap();
        assert_eq!(empty.total_reviews, 0);
        assert_eq!(empty.average_rating, 0.0);
    }

    #[tokio::test]
    async fn test_income_buckets_by_start_month() {
        let test_db = TestDb::new().await;
        // The last lesson of January ends after midnight in February
        let (scheduler, bookings) = completed_lessons(
            &test_db,
            &[
                at(2030, 1, 9, 10, 0),
                at(2030, 1, 31, 23, 30),
                at(2030, 2, 5, 14, 0),
            ],
        )
        .await;
        assert_eq!(bookings.len(), 3);

        let income = scheduler.teacher_income("t1").await.unwrap();
        assert_eq!(income.total_lessons, 3);
        assert_eq!(income.total_income, 150);
        assert_eq!(
            income.monthly_income.get("2030-01"),
            Some(&MonthlyIncome { lessons: 2, income: 100 })
        );
        assert_eq!(
            income.monthly_income.get("2030-02"),
            Some(&MonthlyIncome { lessons: 1, income: 50 })
        );
    }

    #[tokio::test]
    async fn test_income_ignores_cancelled_and_scheduled() {
        let test_db = TestDb::new().await;
        seed_teacher(&test_db.pool, "t1").await;
        seed_student(&test_db.pool, "s1", 2).await;
        let scheduler = test_db.scheduler();
        let now = at(2030, 1, 7, 8, 0);
        scheduler
            .upsert_availability(
                "t1",
                now,
                &[slot(at(2030, 1, 9, 10, 0)), slot(at(2030, 1, 10, 10, 0))],
                now,
            )
            .await
            .unwrap();
        let a = slot(at(2030, 1, 9, 10, 0));
        let cancelled = scheduler
            .book_lesson("s1", "t1", a.start_time, a.end_time, None, now)
            .await
            .unwrap();
        let b = slot(at(2030, 1, 10, 10, 0));
        scheduler
            .book_lesson("s1", "t1", b.start_time, b.end_time, None, now)
            .await
            .unwrap();
        scheduler.cancel_lesson("s1", &cancelled.id, now).await.unwrap();

        let income = scheduler.teacher_income("t1").await.unwrap();
        assert_eq!(income, TeacherIncome::default());
    }

    #[tokio::test]
    async fn test_income_requires_teacher() {
        let test_db = TestDb::new().await;
        seed_student(&test_db.pool, "s1", 0).await;
        let scheduler = test_db.scheduler();

        assert!(matches!(
            scheduler.teacher_income("s1").await,
            Err(SchedulingError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_teacher_directory_filters_and_ranks() {
        let test_db = TestDb::new().await;
        let (scheduler, bookings) = completed_lessons(
            &test_db,
            &[at(2030, 1, 9, 10, 0), at(2030, 1, 9, 10, 30), at(2030, 1, 10, 9, 0)],
        )
        .await;
        for (booking, rating) in bookings.iter().zip([5, 4, 4]) {
            scheduler
                .submit_review("s1", &booking.id, "t1", rating, None, at(2030, 1, 11, 0, 0))
                .await
                .unwrap();
        }

        seed_teacher(&test_db.pool, "t2").await;
        let mut profile = TeacherProfile::find(&test_db.pool, "t2").await.unwrap().unwrap();
        profile.field = Some("Physics".to_string());
        TeacherProfile::upsert(&test_db.pool, &profile).await.unwrap();

        let all = scheduler.teachers_with_ratings(None).await.unwrap();
        let ids: Vec<_> = all.iter().map(|t| t.teacher_id.as_str()).collect();
        // Students are not listed; rated teachers come first
        assert_eq!(ids, vec!["t1", "t2"]);
        assert_eq!(all[0].average_rating, 4.3);
        assert_eq!(all[0].total_reviews, 3);
        assert_eq!(all[1].average_rating, 0.0);
        assert_eq!(all[1].total_reviews, 0);

        let physics = scheduler.teachers_with_ratings(Some("phys")).await.unwrap();
        assert_eq!(physics.len(), 1);
        assert_eq!(physics[0].teacher_id, "t2");

        let maths = scheduler.teachers_with_ratings(Some("MATHEMATICS")).await.unwrap();
        assert_eq!(maths.len(), 1);
        assert_eq!(maths[0].teacher_id, "t1");

        assert_eq!(scheduler.teachers_with_ratings(Some("All")).await.unwrap().len(), 2);
        assert_eq!(scheduler.teachers_with_ratings(Some("  ")).await.unwrap().len(), 2);
        assert!(scheduler.teachers_with_ratings(Some("chemistry")).await.unwrap().is_empty());
    }
}
