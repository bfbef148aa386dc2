use crate::domain::ports::{AuditEntry, AuditSinkRef};
use chrono::Utc;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Run-scoped handle onto the audit sink.
///
/// Recording never fails the caller: sink errors are logged and counted.
#[derive(Clone)]
pub struct AuditTrail {
    run_id: String,
    sink: AuditSinkRef,
    failures: Arc<AtomicU64>,
}

impl AuditTrail {
    pub fn new(sink: AuditSinkRef) -> Self {
        Self::with_run_id(sink, Uuid::new_v4().to_string())
    }

    pub fn with_run_id(sink: AuditSinkRef, run_id: String) -> Self {
        Self {
            run_id,
            sink,
            failures: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn record(&self, component: &str, action: &str, message: &str, metadata: serde_json::Value) {
        let entry = AuditEntry {
            timestamp: Utc::now(),
            run_id: self.run_id.clone(),
            component: component.to_string(),
            action: action.to_string(),
            message: message.to_string(),
            metadata,
        };
        if let Err(e) = self.sink.log_event(&entry) {
            self.failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                component,
                action,
                error = %e,
                "audit: delivery failed, entry dropped"
            );
        }
    }

    pub fn delivery_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }
}
