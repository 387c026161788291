//! Shard placement and geo-fencing
//!
//! Placement is computed once per upload from a registry snapshot and the
//! uploader's policy. Shard `i` goes to `active[i % active.len()]`; the
//! provider actually chosen is persisted per shard and never re-derived.

use std::collections::HashSet;
use tessera_core::error::{Result, TesseraError};
use tessera_core::model::{FileRecord, Policy, Provider};
use uuid::Uuid;

/// Providers eligible for one upload
#[derive(Debug, Clone)]
pub struct Placement {
    active: Vec<Provider>,
    redirected: Vec<Provider>,
}

impl Placement {
    /// Stable round-robin assignment
    pub fn provider_for(&self, shard_index: u8) -> &Provider {
        &self.active[shard_index as usize % self.active.len()]
    }

    /// Providers shards may land on, in registration order
    pub fn active(&self) -> &[Provider] {
        &self.active
    }

    /// Enabled providers skipped because of the principal's blocked regions
    pub fn redirected(&self) -> &[Provider] {
        &self.redirected
    }
}

/// Geo-fence aware provider selection
pub struct PlacementPolicy;

impl PlacementPolicy {
    /// Filter the registry snapshot down to the providers allowed for `policy`
    ///
    /// Disabled providers are never eligible. Fails with `UploadBlocked`
    /// when nothing remains.
    pub fn compute(providers: &[Provider], policy: &Policy) -> Result<Placement> {
        let (active, redirected): (Vec<Provider>, Vec<Provider>) = providers
            .iter()
            .filter(|p| p.enabled)
            .cloned()
            .partition(|p| !policy.blocks(&p.region));

        if active.is_empty() {
            return Err(TesseraError::UploadBlocked {
                principal: policy.principal.clone(),
            });
        }

        Ok(Placement { active, redirected })
    }

    /// Relocation targets for a shard of `file`, in registration order
    ///
    /// A spare is enabled, outside the owner's blocked regions and holds
    /// no shard of the file.
    pub fn spares<'a>(
        providers: &'a [Provider],
        file: &FileRecord,
        owner_policy: &Policy,
    ) -> Vec<&'a Provider> {
        let holders: HashSet<Uuid> = file.shards.iter().map(|s| s.provider_id).collect();
        providers
            .iter()
            .filter(|p| p.enabled)
            .filter(|p| !owner_policy.blocks(&p.region))
            .filter(|p| !holders.contains(&p.id))
            .collect()
    }
}
