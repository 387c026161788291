//! Tessera Engine Library
//!
//! The durability engine on top of `tessera-core`, `tessera-storage` and
//! `tessera-metadata`. It provides:
//! - Geo-fenced shard placement across registered providers
//! - Upload and download (whole-buffer and streaming) with barrier fan-out
//! - Shard repair and failover to spare providers
//! - Provider management, health checks and storage analytics

pub mod analytics;
pub mod config;
pub mod context;
pub mod health;
pub mod metrics;
pub mod orchestrator;
pub mod placement;
pub mod policy;
pub mod providers;
pub mod repair;

// Re-export main types
pub use analytics::{StorageAnalytics, StorageReport};
pub use config::EngineConfig;
pub use context::{EngineContext, SYSTEM_PRINCIPAL};
pub use health::{HealthMonitor, ProviderStatus, SystemHealth};
pub use orchestrator::Orchestrator;
pub use placement::{Placement, PlacementPolicy};
pub use policy::PolicyService;
pub use providers::{BulkRegistration, NewProvider, ProviderManager, ProviderRegistration};
pub use repair::{BulkRepairReport, FileRepairOutcome, RepairEngine, RepairReport, Relocation};

use tessera_core::error::Result;
use tessera_core::model::AuditRecord;

/// Every engine service over one shared context
#[derive(Clone)]
pub struct Engine {
    pub files: Orchestrator,
    pub repair: RepairEngine,
    pub providers: ProviderManager,
    pub policies: PolicyService,
    pub health: HealthMonitor,
    pub analytics: StorageAnalytics,
    ctx: EngineContext,
}

impl Engine {
    pub fn new(ctx: EngineContext) -> Result<Self> {
        Ok(Self {
            files: Orchestrator::new(ctx.clone())?,
            repair: RepairEngine::new(ctx.clone())?,
            providers: ProviderManager::new(ctx.clone()),
            policies: PolicyService::new(ctx.clone()),
            health: HealthMonitor::new(ctx.clone()),
            analytics: StorageAnalytics::new(ctx.clone()),
            ctx,
        })
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    /// Most recent audit records, newest first
    pub fn audit_log(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        self.ctx.audit.recent(limit)
    }
}
