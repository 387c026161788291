//! Audit logging via tracing
//!
//! Every audit record is emitted as one JSON line on the `audit` tracing
//! target (routable to a file or SIEM by the subscriber) and then handed
//! to an optional persistent sink for read-back.

use crate::store::AuditSink;
use serde::Serialize;
use std::sync::Arc;
use tessera_core::error::Result;
use tessera_core::model::{AuditRecord, Severity};
use tracing::{info, warn};

/// Structured audit log entry
#[derive(Debug, Serialize)]
struct AuditLogEntry<'a> {
    timestamp: String,
    action: String,
    severity: String,
    principal: &'a str,
    details: &'a str,
}

impl<'a> AuditLogEntry<'a> {
    fn from_record(record: &'a AuditRecord) -> Self {
        Self {
            timestamp: record.timestamp.to_rfc3339(),
            action: record.action.to_string(),
            severity: record.severity.to_string(),
            principal: &record.principal,
            details: &record.details,
        }
    }
}

/// Render a record the way it appears on the `audit` target
pub fn audit_json(record: &AuditRecord) -> Option<String> {
    serde_json::to_string(&AuditLogEntry::from_record(record)).ok()
}

/// Audit sink that mirrors records to tracing
pub struct TracingAuditSink {
    inner: Option<Arc<dyn AuditSink>>,
}

impl TracingAuditSink {
    /// Emit to tracing only
    pub fn new() -> Self {
        Self { inner: None }
    }

    /// Emit to tracing, then persist through `inner`
    pub fn with_store(inner: Arc<dyn AuditSink>) -> Self {
        Self { inner: Some(inner) }
    }
}

impl Default for TracingAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for TracingAuditSink {
    fn log(&self, record: AuditRecord) {
        if let Some(json) = audit_json(&record) {
            match record.severity {
                Severity::Warning | Severity::Critical => warn!(target: "audit", "{}", json),
                Severity::Info | Severity::Success => info!(target: "audit", "{}", json),
            }
        }
        if let Some(inner) = &self.inner {
            inner.log(record);
        }
    }

    fn recent(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        match &self.inner {
            Some(inner) => inner.recent(limit),
            None => Ok(Vec::new()),
        }
    }
}
