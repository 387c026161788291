//! Shared engine dependencies
//!
//! Every engine component holds a clone of the same context; cloning only
//! bumps reference counts.

use crate::config::EngineConfig;
use std::sync::Arc;
use tessera_core::error::Result;
use tessera_core::model::{AuditAction, AuditRecord, Severity};
use tessera_metadata::{AuditSink, MetadataStore, PolicyStore, ProviderRegistry};
use tessera_storage::ShardTransport;

/// Principal recorded on audit events raised by the engine itself
pub const SYSTEM_PRINCIPAL: &str = "system";

/// Collaborators and configuration shared by every engine component
#[derive(Clone)]
pub struct EngineContext {
    pub transport: Arc<dyn ShardTransport>,
    pub files: Arc<dyn MetadataStore>,
    pub providers: Arc<dyn ProviderRegistry>,
    pub policies: Arc<dyn PolicyStore>,
    pub audit: Arc<dyn AuditSink>,
    pub config: EngineConfig,
}

impl EngineContext {
    /// Assemble a context, validating the configuration
    pub fn new(
        transport: Arc<dyn ShardTransport>,
        files: Arc<dyn MetadataStore>,
        providers: Arc<dyn ProviderRegistry>,
        policies: Arc<dyn PolicyStore>,
        audit: Arc<dyn AuditSink>,
        config: EngineConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            transport,
            files,
            providers,
            policies,
            audit,
            config,
        })
    }

    /// Shorthand for a fire-and-forget audit event
    pub fn audit(
        &self,
        action: AuditAction,
        principal: &str,
        details: impl Into<String>,
        severity: Severity,
    ) {
        self.audit
            .log(AuditRecord::new(action, principal, details, severity));
    }
}
