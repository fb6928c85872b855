//! Lesson activity counters.
//!
//! Recorded by the scheduler and the payment webhook. Without an installed
//! recorder every call is a no-op.

use metrics::{counter, describe_counter};

pub const LESSON_BOOKINGS_TOTAL: &str = "lesson_bookings_total";
pub const LESSON_CANCELLATIONS_TOTAL: &str = "lesson_cancellations_total";
pub const LESSONS_COMPLETED_TOTAL: &str = "lessons_completed_total";
pub const CREDIT_GRANTS_TOTAL: &str = "credit_grants_total";

pub fn describe_lesson_metrics() {
    describe_counter!(
        LESSON_BOOKINGS_TOTAL,
        "Booking attempts by outcome (success/slot_unavailable/insufficient_credits/error)"
    );
    describe_counter!(LESSON_CANCELLATIONS_TOTAL, "Lessons cancelled by students");
    describe_counter!(
        LESSONS_COMPLETED_TOTAL,
        "Lessons promoted to completed by the sweeper"
    );
    describe_counter!(
        CREDIT_GRANTS_TOTAL,
        "Payment webhooks by outcome (applied/duplicate/rejected)"
    );
}

pub fn record_booking(outcome: &'static str) {
    counter!(LESSON_BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
}

pub fn record_cancellation() {
    counter!(LESSON_CANCELLATIONS_TOTAL).increment(1);
}

pub fn record_lessons_completed(count: u64) {
    counter!(LESSONS_COMPLETED_TOTAL).increment(count);
}

pub fn record_credit_grant(outcome: &'static str) {
    counter!(CREDIT_GRANTS_TOTAL, "outcome" => outcome).increment(1);
}
