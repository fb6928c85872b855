//! Lifecycle sweeper and refund reconciler.
//!
//! Both are idempotent and safe to run concurrently with bookings, with
//! cancellations and with each other. Every UPDATE is guarded on the state
//! it transitions from.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::interval;

use super::booking::CREDITS_PER_LESSON;
use super::{ledger, with_retry, LessonScheduler, SchedulingError};
use crate::config::ReconcilerConfig;
use crate::db::{format_timestamp, LessonBooking, UnrefundedCursor};
use crate::telemetry;

/// Cancelled bookings loaded per page of a reconciliation pass
const RECONCILE_BATCH: i64 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub examined: usize,
    pub refunded: usize,
    /// Still unrefunded because the student has no ledger row
    pub pending: usize,
}

enum RefundAttempt {
    Refunded,
    AlreadyDone,
    NoLedger,
}

impl LessonScheduler {
    /// Promote every scheduled lesson that ended before `now` to completed.
    /// Returns the number of bookings promoted.
    pub async fn sweep_completed(&self, now: DateTime<Utc>) -> Result<u64, SchedulingError> {
        let stamp = format_timestamp(now);
        let stamp = stamp.as_str();

        let updated = with_retry(&self.retry, "sweep_completed", move || async move {
            Ok::<_, SchedulingError>(LessonBooking::complete_ended(&self.db, stamp).await?)
        })
        .await?;

        if updated > 0 {
            telemetry::record_lessons_completed(updated);
            tracing::info!(updated = updated, "Promoted ended lessons to completed");
        }
        Ok(updated)
    }

    /// Return the credit of every cancelled booking that has not been refunded yet
    pub async fn reconcile_refunds(&self, now: DateTime<Utc>) -> Result<ReconcileStats, SchedulingError> {
        self.reconcile_refunds_paged(now, RECONCILE_BATCH).await
    }

    /// One pass over the whole unrefunded queue, `batch` rows at a time.
    /// Bookings still pending stay behind the cursor, so they cannot hide
    /// later cancellations.
    async fn reconcile_refunds_paged(
        &self,
        now: DateTime<Utc>,
        batch: i64,
    ) -> Result<ReconcileStats, SchedulingError> {
        let stamp = format_timestamp(now);
        let stamp = stamp.as_str();
        let batch = batch.max(1);
        let mut stats = ReconcileStats::default();
        let mut cursor = UnrefundedCursor::default();

        loop {
            let page = LessonBooking::list_unrefunded(&self.db, &cursor, batch).await?;
            let Some(last) = page.last() else {
                break;
            };
            cursor = UnrefundedCursor::from(last);
            stats.examined += page.len();

            for candidate in &page {
                let booking_id = candidate.id.as_str();
                let student_id = candidate.student_id.as_str();

                let attempt = with_retry(&self.retry, "reconcile_refund", move || async move {
                    let mut tx = self.db.begin().await?;

                    // Claim the booking first; a concurrent pass that got here earlier wins
                    if !LessonBooking::mark_refunded(&mut tx, booking_id, stamp).await? {
                        return Ok(RefundAttempt::AlreadyDone);
                    }
                    if !ledger::refund(&mut tx, student_id, CREDITS_PER_LESSON, booking_id, stamp).await? {
                        tx.rollback().await?;
                        return Ok(RefundAttempt::NoLedger);
                    }

                    tx.commit().await?;
                    Ok::<_, SchedulingError>(RefundAttempt::Refunded)
                })
                .await?;

                match attempt {
                    RefundAttempt::Refunded => {
                        stats.refunded += 1;
                        tracing::info!(booking_id = %booking_id, student_id = %student_id, "Reconciled refund");
                    }
                    RefundAttempt::AlreadyDone => {}
                    RefundAttempt::NoLedger => {
                        stats.pending += 1;
                        tracing::warn!(
                            booking_id = %booking_id,
                            student_id = %student_id,
                            "Refund still pending, student has no credit balance"
                        );
                    }
                }
            }

            if (page.len() as i64) < batch {
                break;
            }
        }

        if stats.refunded > 0 || stats.pending > 0 {
            tracing::info!(
                examined = stats.examined,
                refunded = stats.refunded,
                pending = stats.pending,
                "Refund reconciliation finished"
            );
        }
        Ok(stats)
    }
}

/// Spawn the periodic sweep + refund reconciliation loop
pub fn spawn_reconciler(scheduler: Arc<LessonScheduler>, config: ReconcilerConfig) {
    if !config.enabled {
        tracing::info!("Refund reconciler is disabled");
        return;
    }

    let interval_secs = config.interval_seconds.max(1);
    tracing::info!(interval_secs = interval_secs, "Starting refund reconciler");

    tokio::spawn(async move {
        let mut tick = interval(Duration::from_secs(interval_secs));
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tick.tick().await;
            let now = Utc::now();
            if let Err(e) = scheduler.sweep_completed(now).await {
                tracing::error!(error = %e, "Lesson sweep failed");
            }
            if let Err(e) = scheduler.reconcile_refunds(now).await {
                tracing::error!(error = %e, "Refund reconciliation failed");
            }
        }
    });
}
