// src/infrastructure/audit/mod.rs
// Audit trail sinks

use serde_json::Value;
use std::sync::Mutex;

use crate::domain::repository::{AuditEntry, AuditSink};

const SECRET_KEYS: [&str; 4] = ["signature", "apiKey", "api_key", "api_secret"];

/// Replace credential-bearing fields with `[REDACTED]`, recursively
pub fn redact(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| {
                    if SECRET_KEYS.contains(&k.as_str()) {
                        (k.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (k.clone(), redact(v))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact).collect()),
        other => other.clone(),
    }
}

/// Writes each entry as one JSON line under the `audit` log target
#[derive(Debug, Default)]
pub struct LogAuditSink;

impl AuditSink for LogAuditSink {
    fn record(&self, entry: AuditEntry) {
        let entry = AuditEntry {
            request: redact(&entry.request),
            ..entry
        };
        match serde_json::to_string(&entry) {
            Ok(line) if entry.is_error() => log::warn!(target: "audit", "{}", line),
            Ok(line) => log::info!(target: "audit", "{}", line),
            Err(e) => log::error!(target: "audit", "Failed to serialize audit entry: {}", e),
        }
    }
}

/// Keeps entries in memory; used to inspect the trail in tests and embeddings
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        match self.entries.lock() {
            Ok(entries) => entries.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, entry: AuditEntry) {
        let entry = AuditEntry {
            request: redact(&entry.request),
            ..entry
        };
        match self.entries.lock() {
            Ok(mut entries) => entries.push(entry),
            Err(poisoned) => poisoned.into_inner().push(entry),
        }
    }
}
