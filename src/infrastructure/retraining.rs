use crate::domain::governance::{FeedbackLabel, FeedbackSample};
use crate::domain::ports::RetrainingHook;
use crate::error::DeliveryError;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

/// Retraining pipeline stand-in: records that a batch was handed over.
#[derive(Debug, Default)]
pub struct LoggingRetrainingHook {
    batches: AtomicU64,
}

impl LoggingRetrainingHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl RetrainingHook for LoggingRetrainingHook {
    async fn trigger(&self, batch: &[FeedbackSample]) -> Result<(), DeliveryError> {
        let labelled = batch
            .iter()
            .filter(|s| s.label != FeedbackLabel::Pending)
            .count();
        let positives = batch.iter().map(|s| u64::from(s.label.as_target())).sum::<u64>();
        let batch_no = self.batches.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(
            batch_no,
            samples = batch.len(),
            labelled,
            positives,
            "retraining batch handed to pipeline"
        );
        Ok(())
    }
}
