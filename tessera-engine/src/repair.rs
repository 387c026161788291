//! Shard repair and failover
//!
//! A repair pass walks a file's shards in index order. A shard whose
//! objects are all present is healthy. Otherwise the shard is re-derived
//! by decrypting the file, re-encrypting with the stored key and IV and
//! re-encoding each window. The result is written back to the recorded
//! provider when it still accepts writes, or to the first spare provider
//! that does. Metadata is only persisted when a shard moved.

use crate::context::{EngineContext, SYSTEM_PRINCIPAL};
use crate::metrics;
use crate::orchestrator::{index_providers, shard_holder, Orchestrator, ProviderIndex};
use crate::placement::PlacementPolicy;
use bytes::Bytes;
use futures::future::join_all;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tessera_core::crypto::encrypt;
use tessera_core::error::{Result, TesseraError};
use tessera_core::model::{AuditAction, FileRecord, Policy, Provider, Severity, ShardStatus};
use tessera_storage::ShardTransport;
use tokio::sync::Semaphore;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// A shard moved to a different provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Relocation {
    pub shard_index: u8,
    pub from: Uuid,
    pub to: Uuid,
}

/// Outcome of repairing one file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub file_id: Uuid,
    /// Shards found intact
    pub healthy: usize,
    /// Shards rewritten to their recorded provider
    pub restored: usize,
    /// Shards rewritten to a spare provider
    pub migrated: usize,
    pub relocations: Vec<Relocation>,
}

impl RepairReport {
    /// Shards rewritten anywhere
    pub fn shards_restored(&self) -> usize {
        self.restored + self.migrated
    }

    pub fn is_clean(&self) -> bool {
        self.shards_restored() == 0
    }
}

/// Result of repairing a single file during a bulk pass
#[derive(Debug)]
pub struct FileRepairOutcome {
    pub file_id: Uuid,
    pub filename: String,
    pub result: Result<RepairReport>,
}

/// Outcome of repairing every file
#[derive(Debug, Default)]
pub struct BulkRepairReport {
    pub outcomes: Vec<FileRepairOutcome>,
}

impl BulkRepairReport {
    /// Files where at least one shard was rewritten
    pub fn files_repaired(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(&o.result, Ok(r) if !r.is_clean()))
            .count()
    }

    pub fn shards_restored(&self) -> usize {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok())
            .map(RepairReport::shards_restored)
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &FileRepairOutcome> {
        self.outcomes.iter().filter(|o| o.result.is_err())
    }
}

/// Re-derives missing shards and migrates them off dead providers
#[derive(Clone)]
pub struct RepairEngine {
    ctx: EngineContext,
    orchestrator: Orchestrator,
}

/// Re-derived objects, indexed `[shard][window]`
type ShardObjects = Vec<Vec<Bytes>>;

impl RepairEngine {
    pub fn new(ctx: EngineContext) -> Result<Self> {
        let orchestrator = Orchestrator::new(ctx.clone())?;
        Ok(Self { ctx, orchestrator })
    }

    /// Repair a single file
    #[instrument(skip(self))]
    pub async fn repair(&self, file_id: Uuid) -> Result<RepairReport> {
        let record = self
            .ctx
            .files
            .find_by_id(file_id)
            .await?
            .ok_or_else(|| TesseraError::NotFound(format!("file {}", file_id)))?;
        self.ctx.audit(
            AuditAction::MaintenanceStart,
            SYSTEM_PRINCIPAL,
            format!("Repair of {} ({})", record.filename, record.id),
            Severity::Info,
        );
        self.repair_record(record).await
    }

    /// Repair every file with bounded concurrency
    ///
    /// A failure on one file is reported in its outcome and does not stop
    /// the pass.
    pub async fn repair_all(&self) -> Result<BulkRepairReport> {
        let files = self.ctx.files.find_all().await?;
        self.ctx.audit(
            AuditAction::MaintenanceStart,
            SYSTEM_PRINCIPAL,
            format!("Repair pass over {} files", files.len()),
            Severity::Info,
        );
        info!(
            files = files.len(),
            concurrency = self.ctx.config.repair_concurrency,
            "Starting repair pass"
        );

        let semaphore = Arc::new(Semaphore::new(self.ctx.config.repair_concurrency));
        let tasks = files.into_iter().map(|record| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                // The semaphore is never closed, so acquire cannot fail
                let _permit = semaphore.acquire().await;
                let file_id = record.id;
                let filename = record.filename.clone();
                let result = self.repair_record(record).await;
                if let Err(e) = &result {
                    error!(file_id = %file_id, error = %e, "Repair failed");
                }
                FileRepairOutcome {
                    file_id,
                    filename,
                    result,
                }
            }
        });

        let report = BulkRepairReport {
            outcomes: join_all(tasks).await,
        };
        info!(
            files_repaired = report.files_repaired(),
            shards_restored = report.shards_restored(),
            failures = report.failures().count(),
            "Repair pass complete"
        );
        Ok(report)
    }

    async fn repair_record(&self, mut record: FileRecord) -> Result<RepairReport> {
        let started = Instant::now();
        let providers = self.ctx.providers.list().await?;
        let owner_policy = self.ctx.policies.get_or_create(&record.owner).await?;

        let mut report = RepairReport {
            file_id: record.id,
            ..Default::default()
        };
        let healed = self
            .heal_shards(&mut record, &providers, &owner_policy, &mut report)
            .await;

        // Relocations that succeeded before a later failure are still kept
        if !report.relocations.is_empty() {
            self.ctx.files.save(&record).await?;
        }
        healed?;

        metrics::record_repair_duration(started.elapsed().as_secs_f64());
        if !report.is_clean() {
            info!(
                file_id = %record.id,
                restored = report.restored,
                migrated = report.migrated,
                "File repaired"
            );
        }
        Ok(report)
    }

    async fn heal_shards(
        &self,
        record: &mut FileRecord,
        providers: &[Provider],
        owner_policy: &Policy,
        report: &mut RepairReport,
    ) -> Result<()> {
        let index = index_providers(providers);
        let layout = *self.orchestrator.codec().layout();
        let expected_lens: Vec<u64> = record
            .encrypted_sizes
            .iter()
            .map(|size| layout.shard_len(*size as usize) as u64)
            .collect();
        let mut rederived: Option<ShardObjects> = None;

        for position in 0..record.shards.len() {
            let shard_index = record.shards[position].index;
            let from = record.shards[position].provider_id;
            let keys = record.object_keys(shard_index);
            let holder = shard_holder(&index, &record.shards[position]);
            let recorded = holder.as_ref();

            match recorded {
                Some(provider) => {
                    if self.is_present(provider, &keys, &expected_lens).await {
                        report.healthy += 1;
                        continue;
                    }
                    metrics::record_shard_missing(&provider.name);
                    warn!(file_id = %record.id, shard = shard_index, provider = %provider.name, "Shard missing");
                }
                None => {
                    warn!(file_id = %record.id, shard = shard_index, provider_id = %from, "Shard provider no longer registered");
                }
            }

            if rederived.is_none() {
                rederived = Some(self.rederive(record, &index).await?);
            }
            let objects = rederived
                .as_ref()
                .and_then(|all| all.get(shard_index as usize))
                .map(Vec::as_slice)
                .unwrap_or_default();

            if let Some(provider) = recorded {
                match write_objects(self.ctx.transport.as_ref(), provider, &keys, objects).await {
                    Ok(()) => {
                        report.restored += 1;
                        metrics::record_shard_restored();
                        self.ctx.audit(
                            AuditAction::ShardRestored,
                            SYSTEM_PRINCIPAL,
                            format!(
                                "Restored shard {} of {} on {}",
                                shard_index, record.id, provider.name
                            ),
                            Severity::Success,
                        );
                        continue;
                    }
                    Err(e) => {
                        warn!(file_id = %record.id, shard = shard_index, error = %e, "In-place restore failed, migrating");
                    }
                }
            }

            let target = self
                .migrate(record, shard_index, &keys, objects, providers, owner_policy)
                .await?;

            let shard = &mut record.shards[position];
            shard.provider_id = target.id;
            shard.bucket = target.bucket.clone();
            shard.status = ShardStatus::Migrated;

            report.migrated += 1;
            report.relocations.push(Relocation {
                shard_index,
                from,
                to: target.id,
            });
            metrics::record_shard_migrated();

            let from_name = recorded.map(|p| p.name.as_str()).unwrap_or("unregistered");
            self.ctx.audit(
                AuditAction::FailoverRepair,
                SYSTEM_PRINCIPAL,
                format!(
                    "Moved shard {} of {} from {} to {}",
                    shard_index, record.id, from_name, target.name
                ),
                Severity::Warning,
            );
        }
        Ok(())
    }

    /// Write a shard to the first spare that accepts it
    async fn migrate(
        &self,
        record: &FileRecord,
        shard_index: u8,
        keys: &[String],
        objects: &[Bytes],
        providers: &[Provider],
        owner_policy: &Policy,
    ) -> Result<Provider> {
        let spares = PlacementPolicy::spares(providers, record, owner_policy);
        if spares.is_empty() {
            error!(file_id = %record.id, shard = shard_index, "No spare provider for shard");
            return Err(TesseraError::CriticalCapacityExhausted {
                file_id: record.id,
                shard_index,
            });
        }

        let mut last_error = None;
        for spare in spares {
            match write_objects(self.ctx.transport.as_ref(), spare, keys, objects).await {
                Ok(()) => return Ok(spare.clone()),
                Err(e) => {
                    warn!(file_id = %record.id, shard = shard_index, spare = %spare.name, error = %e, "Spare rejected shard");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or(TesseraError::CriticalCapacityExhausted {
            file_id: record.id,
            shard_index,
        }))
    }

    /// Every window object exists with the length its window encodes to
    async fn is_present(
        &self,
        provider: &Provider,
        keys: &[String],
        expected_lens: &[u64],
    ) -> bool {
        let transport = self.ctx.transport.as_ref();
        keys.len() == expected_lens.len()
            && join_all(keys.iter().map(|key| transport.object_len(provider, key)))
                .await
                .into_iter()
                .zip(expected_lens)
                .all(|(len, expected)| len == Some(*expected))
    }

    /// Rebuild every shard of every window from the file's plaintext
    ///
    /// CBC chaining runs across window boundaries, so a window can only be
    /// reproduced by re-encrypting the file from the start.
    async fn rederive(&self, record: &FileRecord, providers: &ProviderIndex) -> Result<ShardObjects> {
        let mut plaintext = Vec::with_capacity(record.size as usize);
        self.orchestrator
            .reassemble(record, providers, &mut plaintext)
            .await?;

        let ciphertext = encrypt(&plaintext, &record.key()?, &record.init_vector()?)?;
        drop(plaintext);
        if ciphertext.len() as u64 != record.encrypted_size() {
            return Err(TesseraError::Internal(format!(
                "re-encrypted {} to {} bytes, expected {}",
                record.id,
                ciphertext.len(),
                record.encrypted_size()
            )));
        }

        let codec = self.orchestrator.codec();
        let mut objects: ShardObjects =
            vec![Vec::with_capacity(record.window_count()); codec.layout().total_shards()];
        let mut offset = 0;
        for size in &record.encrypted_sizes {
            let end = offset + *size as usize;
            for shard in codec.encode(&ciphertext[offset..end])? {
                objects[shard.index as usize].push(shard.data);
            }
            offset = end;
        }
        Ok(objects)
    }
}

async fn write_objects(
    transport: &dyn ShardTransport,
    provider: &Provider,
    keys: &[String],
    objects: &[Bytes],
) -> Result<()> {
    if keys.len() != objects.len() {
        return Err(TesseraError::Internal(format!(
            "{} object keys for {} objects",
            keys.len(),
            objects.len()
        )));
    }
    let puts = keys
        .iter()
        .zip(objects)
        .map(|(key, data)| transport.put(provider, key, data.clone()));
    join_all(puts).await.into_iter().collect()
}
