//! Geo-fencing policy administration

use crate::context::EngineContext;
use tessera_core::error::Result;
use tessera_core::model::{AuditAction, Policy, Principal, Severity};
use tracing::info;

#[derive(Clone)]
pub struct PolicyService {
    ctx: EngineContext,
}

impl PolicyService {
    pub fn new(ctx: EngineContext) -> Self {
        Self { ctx }
    }

    /// A principal's policy, created empty on first access
    pub async fn get(&self, principal_id: &str) -> Result<Policy> {
        self.ctx.policies.get_or_create(principal_id).await
    }

    /// Replace a principal's blocked regions
    ///
    /// Entries are trimmed and deduplicated by the store. This
    /// applies to later uploads and repairs only; shards already placed
    /// in a newly blocked region stay where they are.
    pub async fn set_blocked_regions(
        &self,
        actor: &Principal,
        principal_id: &str,
        regions: Vec<String>,
    ) -> Result<Policy> {
        let policy = self
            .ctx
            .policies
            .update_blocked_regions(principal_id, regions)
            .await?;

        let listed = if policy.blocked_regions.is_empty() {
            "none".to_string()
        } else {
            policy.blocked_regions.join(", ")
        };
        self.ctx.audit(
            AuditAction::PolicyUpdated,
            &actor.id,
            format!("Blocked regions for {}: {}", principal_id, listed),
            Severity::Info,
        );
        info!(principal = principal_id, regions = %listed, "Policy updated");
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use std::sync::Arc;
    use tessera_metadata::MemoryStore;
    use tessera_storage::MemoryTransport;

    #[tokio::test]
    async fn test_update_normalizes_and_audits() {
        let store = Arc::new(MemoryStore::new());
        let ctx = EngineContext::new(
            Arc::new(MemoryTransport::new()),
            store.clone(),
            store.clone(),
            store.clone(),
            store.clone(),
            EngineConfig::default(),
        )
        .unwrap();
        let service = PolicyService::new(ctx);

        assert!(service.get("alice").await.unwrap().blocked_regions.is_empty());

        let policy = service
            .set_blocked_regions(
                &Principal::admin("root"),
                "alice",
                vec![" cn-north-1 ".into(), "".into(), "cn-north-1".into()],
            )
            .await
            .unwrap();
        assert_eq!(policy.blocked_regions, vec!["cn-north-1".to_string()]);
        assert!(service.get("alice").await.unwrap().blocks("cn-north-1"));

        let audit = store.audit_records();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, AuditAction::PolicyUpdated);
        assert_eq!(audit[0].principal, "root");
    }
}
