//! Upload, download, delete and list
//!
//! Each operation reads the provider registry and the caller's policy
//! once, fans shard I/O out as one future per shard, and joins all of
//! them before touching metadata. Metadata is written last.

use crate::context::EngineContext;
use crate::metrics;
use crate::placement::{Placement, PlacementPolicy};
use bytes::Bytes;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tessera_core::crypto::{encrypt, EncryptionKey, InitVector};
use tessera_core::erasure::{Codec, Shard};
use tessera_core::error::{Result, TesseraError};
use tessera_core::model::{
    object_key, AuditAction, FileHeader, FileRecord, Principal, Provider, Severity, ShardRecord,
};
use tessera_core::stream::{EncodedWindow, StreamingPipeline, WindowReassembler};
use tessera_storage::ShardTransport;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Registry snapshot indexed by provider id
pub(crate) type ProviderIndex = HashMap<Uuid, Provider>;

pub(crate) fn index_providers(providers: &[Provider]) -> ProviderIndex {
    providers.iter().map(|p| (p.id, p.clone())).collect()
}

/// The shard's registered provider, addressed at the bucket recorded for it
pub(crate) fn shard_holder(providers: &ProviderIndex, shard: &ShardRecord) -> Option<Provider> {
    providers.get(&shard.provider_id).map(|provider| Provider {
        bucket: shard.bucket.clone(),
        ..provider.clone()
    })
}

/// Per-file upload, download and delete
#[derive(Clone)]
pub struct Orchestrator {
    ctx: EngineContext,
    codec: Arc<Codec>,
}

impl Orchestrator {
    pub fn new(ctx: EngineContext) -> Result<Self> {
        let codec = Codec::new(ctx.config.erasure()?)?;
        Ok(Self {
            ctx,
            codec: Arc::new(codec),
        })
    }

    pub(crate) fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Upload a whole in-memory payload as a single window
    #[instrument(skip(self, principal, data), fields(principal = %principal.id, bytes = data.len()))]
    pub async fn upload(
        &self,
        principal: &Principal,
        filename: &str,
        data: Bytes,
    ) -> Result<FileRecord> {
        validate_filename(filename)?;
        let placement = self.plan(principal).await?;

        let key = EncryptionKey::generate();
        let iv = InitVector::generate();
        let mut record = self
            .ctx
            .files
            .create(FileHeader::new(filename, data.len() as u64, &key, &iv, &principal.id))
            .await?;

        let ciphertext = encrypt(&data, &key, &iv)?;
        let window = EncodedWindow {
            index: 0,
            encrypted_len: ciphertext.len(),
            is_last: true,
            shards: self.codec.encode(&ciphertext)?,
        };
        drop(ciphertext);

        let transport = self.ctx.transport.as_ref();
        if let Err(e) = write_window(transport, &placement, record.id, &window).await {
            self.abandon(&record, &e).await;
            return Err(e);
        }

        record.encrypted_sizes = vec![window.encrypted_len as u64];
        self.commit(principal, record, &placement).await
    }

    /// Upload from a reader in fixed-size windows with bounded memory
    #[instrument(skip(self, principal, reader), fields(principal = %principal.id))]
    pub async fn upload_stream<R>(
        &self,
        principal: &Principal,
        filename: &str,
        reader: R,
    ) -> Result<FileRecord>
    where
        R: AsyncRead + Unpin,
    {
        validate_filename(filename)?;
        let placement = self.plan(principal).await?;
        let pipeline =
            StreamingPipeline::new(*self.codec.layout(), self.ctx.config.stream_window_size)?;

        let key = EncryptionKey::generate();
        let iv = InitVector::generate();
        // Plaintext size is only known once the stream ends
        let mut record = self
            .ctx
            .files
            .create(FileHeader::new(filename, 0, &key, &iv, &principal.id))
            .await?;

        let transport = self.ctx.transport.as_ref();
        let placement_ref = &placement;
        let file_id = record.id;
        let streamed = pipeline
            .run(reader, &key, &iv, |window| async move {
                write_window(transport, placement_ref, file_id, &window).await
            })
            .await;

        let summary = match streamed {
            Ok(summary) => summary,
            Err(e) => {
                self.abandon(&record, &e).await;
                return Err(e);
            }
        };

        record.size = summary.plaintext_len;
        record.encrypted_sizes = summary.encrypted_sizes;
        self.commit(principal, record, &placement).await
    }

    /// Download and decrypt a whole file into memory
    pub async fn download(&self, principal: &Principal, file_id: Uuid) -> Result<Bytes> {
        let mut plaintext = Vec::new();
        self.download_to(principal, file_id, &mut plaintext).await?;
        Ok(Bytes::from(plaintext))
    }

    /// Download a file window by window into `writer`
    ///
    /// Each window tolerates up to `parity_shards` absent shards; fewer
    /// than `data_shards` retrievable fails with `CriticalDataLoss`.
    #[instrument(skip(self, principal, writer), fields(principal = %principal.id))]
    pub async fn download_to<W>(
        &self,
        principal: &Principal,
        file_id: Uuid,
        writer: &mut W,
    ) -> Result<FileRecord>
    where
        W: AsyncWrite + Unpin,
    {
        let record = self.load_authorized(principal, file_id).await?;
        let providers = index_providers(&self.ctx.providers.list().await?);

        self.reassemble(&record, &providers, writer).await?;
        writer.flush().await?;

        metrics::record_bytes_downloaded(record.size);
        info!(file_id = %record.id, bytes = record.size, "Download complete");
        Ok(record)
    }

    /// Delete a file's shards (best effort) and then its record
    #[instrument(skip(self, principal), fields(principal = %principal.id))]
    pub async fn delete(&self, principal: &Principal, file_id: Uuid) -> Result<()> {
        let record = self.load_authorized(principal, file_id).await?;
        let providers = index_providers(&self.ctx.providers.list().await?);
        let transport = self.ctx.transport.as_ref();

        let holders: Vec<(Provider, Vec<String>)> = record
            .shards
            .iter()
            .filter_map(|shard| {
                shard_holder(&providers, shard).map(|p| (p, record.object_keys(shard.index)))
            })
            .collect();
        let deletes = holders
            .iter()
            .flat_map(|(provider, keys)| keys.iter().map(move |key| (provider, key)))
            .map(|(provider, key)| async move { transport.delete(provider, key).await });
        join_all(deletes).await;

        self.ctx.files.delete(record.id).await?;
        self.ctx.audit(
            AuditAction::FileDelete,
            &principal.id,
            format!("Deleted {} ({})", record.filename, record.id),
            Severity::Info,
        );
        info!(file_id = %record.id, "File deleted");
        Ok(())
    }

    /// Files visible to the principal: all for administrators, own otherwise
    pub async fn list(&self, principal: &Principal) -> Result<Vec<FileRecord>> {
        if principal.is_admin() {
            self.ctx.files.find_all().await
        } else {
            self.ctx.files.find_by_owner(&principal.id).await
        }
    }

    /// A single file record, subject to the same access rule as download
    pub async fn describe(&self, principal: &Principal, file_id: Uuid) -> Result<FileRecord> {
        self.load_authorized(principal, file_id).await
    }

    /// Decode every window in order and write the plaintext
    pub(crate) async fn reassemble<W>(
        &self,
        record: &FileRecord,
        providers: &ProviderIndex,
        writer: &mut W,
    ) -> Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        if record.encrypted_sizes.is_empty() || record.shards.is_empty() {
            return Err(TesseraError::Internal(format!(
                "file {} has no stored shards",
                record.id
            )));
        }

        let mut reassembler = WindowReassembler::new(&record.key()?, &record.init_vector()?)?;
        for window in 0..record.window_count() {
            let ciphertext = self.read_window(record, providers, window).await?;
            writer.write_all(&reassembler.push(&ciphertext)).await?;
        }
        writer.write_all(&reassembler.finish()?).await?;
        Ok(())
    }

    /// Fetch one window's shards concurrently and decode its ciphertext
    async fn read_window(
        &self,
        record: &FileRecord,
        providers: &ProviderIndex,
        window: usize,
    ) -> Result<Vec<u8>> {
        let windows = record.window_count();
        let data_shards = self.codec.layout().data_shards;
        let transport = self.ctx.transport.as_ref();
        let encrypted_len = record.encrypted_sizes.get(window).copied().ok_or_else(|| {
            TesseraError::Internal(format!("file {} has no window {}", record.id, window))
        })? as usize;
        let shard_len = self.codec.layout().shard_len(encrypted_len);

        let fetches = record.shards.iter().map(|shard| {
            let holder = shard_holder(providers, shard);
            let key = object_key(record.id, window, windows, shard.index);
            async move {
                let data = match &holder {
                    Some(provider) => transport.get(provider, &key).await,
                    None => None,
                };
                (shard.index, holder, data)
            }
        });

        // Barrier: every fetch settles before decoding
        let mut available = Vec::with_capacity(record.shards.len());
        for (index, holder, data) in join_all(fetches).await {
            let name = holder
                .as_ref()
                .map(|p| p.name.as_str())
                .unwrap_or("unregistered");
            match data {
                Some(bytes) if bytes.len() == shard_len => {
                    available.push(Shard::new(index, bytes))
                }
                Some(bytes) => {
                    // A truncated or foreign object is a hole, not a decode failure
                    metrics::record_shard_missing(name);
                    debug!(
                        file_id = %record.id,
                        window,
                        shard = index,
                        provider = name,
                        len = bytes.len(),
                        expected = shard_len,
                        "Shard has the wrong length, treating as absent"
                    );
                }
                None => {
                    metrics::record_shard_missing(name);
                    debug!(file_id = %record.id, window, shard = index, provider = name, "Shard absent");
                }
            }
        }

        if available.len() < data_shards {
            warn!(
                file_id = %record.id,
                window,
                available = available.len(),
                required = data_shards,
                "Not enough shards to reconstruct"
            );
            return Err(TesseraError::CriticalDataLoss {
                file_id: record.id,
                available: available.len(),
                required: data_shards,
            });
        }

        Ok(self
            .codec
            .reconstruct(&available, encrypted_len)?
            .to_vec())
    }

    /// Snapshot the registry and policy, and compute placement
    async fn plan(&self, principal: &Principal) -> Result<Placement> {
        let providers = self.ctx.providers.list().await?;
        let policy = self.ctx.policies.get_or_create(&principal.id).await?;
        let placement = PlacementPolicy::compute(&providers, &policy)?;

        for skipped in placement.redirected() {
            self.ctx.audit(
                AuditAction::GeoFenceRedirect,
                &principal.id,
                format!(
                    "Skipped provider {} in blocked region {}",
                    skipped.name, skipped.region
                ),
                Severity::Warning,
            );
        }
        Ok(placement)
    }

    /// Attach the shard list and persist
    async fn commit(
        &self,
        principal: &Principal,
        mut record: FileRecord,
        placement: &Placement,
    ) -> Result<FileRecord> {
        let total = self.codec.layout().total_shards();
        record.shards = (0..total)
            .map(|i| ShardRecord::alive(i as u8, placement.provider_for(i as u8)))
            .collect();
        self.ctx.files.save(&record).await?;

        metrics::record_bytes_uploaded(record.size);
        self.ctx.audit(
            AuditAction::FileUpload,
            &principal.id,
            format!(
                "Uploaded {} ({} bytes, {} shards across {} providers)",
                record.filename,
                record.size,
                total,
                placement.active().len().min(total)
            ),
            Severity::Success,
        );
        info!(
            file_id = %record.id,
            bytes = record.size,
            windows = record.window_count(),
            "Upload complete"
        );
        Ok(record)
    }

    /// Drop the header of an upload whose shard writes failed
    ///
    /// Shards already written are left in place.
    async fn abandon(&self, record: &FileRecord, cause: &TesseraError) {
        warn!(file_id = %record.id, error = %cause, "Upload failed, discarding file header");
        if let Err(e) = self.ctx.files.delete(record.id).await {
            warn!(file_id = %record.id, error = %e, "Failed to discard file header");
        }
    }

    async fn load_authorized(&self, principal: &Principal, file_id: Uuid) -> Result<FileRecord> {
        let record = self
            .ctx
            .files
            .find_by_id(file_id)
            .await?
            .ok_or_else(|| TesseraError::NotFound(format!("file {}", file_id)))?;

        if !principal.can_access(&record) {
            return Err(TesseraError::AccessDenied {
                principal: principal.id.clone(),
                file_id,
            });
        }
        Ok(record)
    }
}

/// Write every shard of a window to its placed provider
///
/// All puts settle before the first failure, if any, is returned.
async fn write_window(
    transport: &dyn ShardTransport,
    placement: &Placement,
    file_id: Uuid,
    window: &EncodedWindow,
) -> Result<()> {
    let puts = window.shards.iter().map(|shard| {
        let provider = placement.provider_for(shard.index);
        let key = window.object_key(file_id, shard.index);
        let data = shard.data.clone();
        async move {
            transport.put(provider, &key, data).await?;
            metrics::record_shard_written(&provider.name);
            Ok::<(), TesseraError>(())
        }
    });

    join_all(puts).await.into_iter().collect()
}

fn validate_filename(filename: &str) -> Result<()> {
    if filename.trim().is_empty() {
        return Err(TesseraError::InvalidInput(
            "filename must not be empty".to_string(),
        ));
    }
    Ok(())
}
