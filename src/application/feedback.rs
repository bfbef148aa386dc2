//! Feedback loop around the scorer: drift detection on incoming amounts and
//! the active-learning buffer that feeds retraining.

use crate::config::{ActiveLearningConfig, DriftConfig};
use crate::domain::governance::FeedbackSample;
use crate::domain::ports::RetrainingHookRef;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct DriftReport {
    pub baseline_mean: f64,
    pub window_mean: f64,
    pub relative_shift: f64,
    pub drifted: bool,
}

/// Mean-shift drift detector over a tumbling window of amounts.
#[derive(Debug)]
pub struct DriftMonitor {
    window_size: usize,
    baseline_cap: usize,
    threshold: f64,
    baseline: VecDeque<f64>,
    window: Vec<f64>,
    alerts: u64,
}

impl DriftMonitor {
    pub fn new(config: &DriftConfig) -> Self {
        Self {
            window_size: config.window_size.max(1),
            baseline_cap: config.baseline_cap.max(1),
            threshold: config.relative_shift,
            baseline: VecDeque::new(),
            window: Vec::with_capacity(config.window_size),
            alerts: 0,
        }
    }

    /// Records one amount. Returns a report each time the window fills and
    /// a baseline exists to compare it against.
    pub fn observe(&mut self, amount: f64) -> Option<DriftReport> {
        self.window.push(amount);
        if self.window.len() < self.window_size {
            return None;
        }

        let report = self.compare();
        if let Some(report) = &report
            && report.drifted
        {
            self.alerts += 1;
            tracing::warn!(
                baseline_mean = report.baseline_mean,
                window_mean = report.window_mean,
                relative_shift = report.relative_shift,
                "drift monitor: significant shift in transaction amounts"
            );
        }

        self.baseline.extend(self.window.drain(..));
        while self.baseline.len() > self.baseline_cap {
            self.baseline.pop_front();
        }
        report
    }

    fn compare(&self) -> Option<DriftReport> {
        if self.baseline.is_empty() {
            return None;
        }
        let baseline_mean = self.baseline.iter().sum::<f64>() / self.baseline.len() as f64;
        let window_mean = self.window.iter().sum::<f64>() / self.window.len() as f64;
        let relative_shift = if baseline_mean > 0.0 {
            (window_mean - baseline_mean).abs() / baseline_mean
        } else {
            0.0
        };
        Some(DriftReport {
            baseline_mean,
            window_mean,
            relative_shift,
            drifted: baseline_mean > 0.0 && relative_shift > self.threshold,
        })
    }

    pub fn alerts(&self) -> u64 {
        self.alerts
    }
}

/// Buffers reviewed pairs and hands full batches to the retraining hook.
///
/// Delivery is fire-and-forget: a failed or slow hook is logged and counted,
/// the batch is not retried.
pub struct ActiveLearner {
    buffer_size: usize,
    buffer: Mutex<Vec<FeedbackSample>>,
    hook: Option<RetrainingHookRef>,
    delivery_timeout: Duration,
    triggers: AtomicU64,
    delivery_failures: AtomicU64,
}

impl ActiveLearner {
    pub fn new(
        config: &ActiveLearningConfig,
        hook: Option<RetrainingHookRef>,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            buffer_size: config.buffer_size.max(1),
            buffer: Mutex::new(Vec::with_capacity(config.buffer_size)),
            hook,
            delivery_timeout,
            triggers: AtomicU64::new(0),
            delivery_failures: AtomicU64::new(0),
        }
    }

    pub async fn submit_feedback(&self, sample: FeedbackSample) {
        let batch = {
            let mut buffer = self.buffer.lock();
            buffer.push(sample);
            if buffer.len() < self.buffer_size {
                return;
            }
            std::mem::take(&mut *buffer)
        };

        self.triggers.fetch_add(1, Ordering::Relaxed);
        tracing::info!(
            samples = batch.len(),
            "active learner: feedback threshold reached, triggering retraining"
        );

        let Some(hook) = &self.hook else {
            return;
        };
        let failure = match tokio::time::timeout(self.delivery_timeout, hook.trigger(&batch)).await
        {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("timed out after {:?}", self.delivery_timeout)),
        };
        if let Some(reason) = failure {
            self.delivery_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                samples = batch.len(),
                reason,
                "active learner: retraining delivery failed, batch dropped"
            );
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn retraining_triggers(&self) -> u64 {
        self.triggers.load(Ordering::Relaxed)
    }

    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures.load(Ordering::Relaxed)
    }
}
