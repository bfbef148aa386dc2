use crate::domain::ports::{AuditEntry, AuditSink};
use crate::error::DeliveryError;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

/// Keeps every entry in memory. Used by tests and short CLI runs.
#[derive(Default, Clone)]
pub struct InMemoryAuditSink {
    entries: Arc<Mutex<Vec<AuditEntry>>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().clone()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn log_event(&self, entry: &AuditEntry) -> Result<(), DeliveryError> {
        self.entries.lock().push(entry.clone());
        Ok(())
    }
}

/// Appends one JSON object per line.
pub struct JsonlAuditSink {
    writer: Mutex<BufWriter<File>>,
}

impl JsonlAuditSink {
    pub fn create(path: &Path) -> Result<Self, DeliveryError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            writer: Mutex::new(BufWriter::new(file)),
        })
    }
}

impl AuditSink for JsonlAuditSink {
    fn log_event(&self, entry: &AuditEntry) -> Result<(), DeliveryError> {
        let line = serde_json::to_string(entry)?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

/// Emits entries as structured `tracing` events on the `audit` target.
#[derive(Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn log_event(&self, entry: &AuditEntry) -> Result<(), DeliveryError> {
        tracing::info!(
            target: "audit",
            run_id = %entry.run_id,
            component = %entry.component,
            action = %entry.action,
            metadata = %entry.metadata,
            "{}",
            entry.message
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::audit::AuditTrail;
    use serde_json::json;

    struct Unreachable;

    impl AuditSink for Unreachable {
        fn log_event(&self, _: &AuditEntry) -> Result<(), DeliveryError> {
            Err(DeliveryError::Unavailable("collector down".to_string()))
        }
    }

    #[test]
    fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let trail = AuditTrail::with_run_id(
            Arc::new(JsonlAuditSink::create(&path).unwrap()),
            "run-1".to_string(),
        );
        trail.record("GOVERNANCE", "APPROVE", "ticket approved", json!({ "ticket": 1 }));
        trail.record("GOVERNANCE", "SECURITY_BLOCK", "self approval", json!(null));

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["run_id"], "run-1");
        assert_eq!(lines[1]["action"], "SECURITY_BLOCK");
        assert_eq!(trail.delivery_failures(), 0);
    }

    #[test]
    fn test_failed_delivery_is_counted() {
        let trail = AuditTrail::new(Arc::new(Unreachable));
        trail.record("HYBRID_ENGINE", "MATCH", "m", json!({}));
        trail.record("HYBRID_ENGINE", "MATCH", "m", json!({}));
        assert_eq!(trail.delivery_failures(), 2);
    }

    #[test]
    fn test_in_memory_sink_is_shared_between_clones() {
        let sink = InMemoryAuditSink::new();
        let trail = AuditTrail::new(Arc::new(sink.clone()));
        trail.record("SLA_WATCHDOG", "ESCALATE", "near cutoff", json!({}));
        assert_eq!(sink.entries().len(), 1);
        assert_eq!(sink.entries()[0].run_id, trail.run_id());
    }
}
