//! The notification subsystem seen from the planner.

use crate::error::SchedulingError;

use super::trigger::NotificationTrigger;

/// Result of scheduling a batch of triggers.
///
/// One rejected trigger never blocks the rest of the batch.
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub scheduled: Vec<i32>,
    pub failed: Vec<SchedulingError>,
}

/// A device notification scheduler.
///
/// Scheduling a trigger whose id is already pending replaces it.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    /// Whether the user allows notifications at all.
    async fn permission_granted(&self) -> bool;

    /// Every trigger currently scheduled.
    async fn pending(&self) -> Result<Vec<NotificationTrigger>, SchedulingError>;

    async fn schedule(&self, trigger: &NotificationTrigger) -> Result<(), SchedulingError>;

    async fn cancel(&self, ids: &[i32]) -> Result<(), SchedulingError>;

    /// Epoch for the next replan; strictly above every pending epoch.
    async fn next_epoch(&self) -> Result<u64, SchedulingError> {
        let pending = self.pending().await?;
        Ok(pending.iter().map(|t| t.epoch).max().unwrap_or(0) + 1)
    }

    async fn cancel_all(&self) -> Result<(), SchedulingError> {
        let ids: Vec<i32> = self.pending().await?.iter().map(|t| t.id).collect();
        if ids.is_empty() {
            return Ok(());
        }
        self.cancel(&ids).await
    }

    async fn schedule_batch(&self, triggers: &[NotificationTrigger]) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for trigger in triggers {
            match self.schedule(trigger).await {
                Ok(()) => outcome.scheduled.push(trigger.id),
                Err(e) => {
                    tracing::warn!(id = trigger.id, error = %e, "Failed to schedule notification");
                    outcome.failed.push(e);
                }
            }
        }
        outcome
    }
}
