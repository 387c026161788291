//! Tessera Metadata
//!
//! Persistence interfaces the durability engine depends on, and their
//! implementations:
//! - `MetadataStore` for file records with their shard placements
//! - `ProviderRegistry` for storage backends, in registration order
//! - `PolicyStore` for per-principal geo-fencing policies
//! - `AuditSink` for fire-and-forget audit events
//!
//! `MemoryStore` backs tests; `SledStore` persists to disk for the CLI.
//! `TracingAuditSink` mirrors audit events to the `audit` tracing target.

pub mod audit;
pub mod memory;
pub mod sled_store;
pub mod store;

pub use audit::TracingAuditSink;
pub use memory::MemoryStore;
pub use sled_store::SledStore;
pub use store::{AuditSink, MetadataStore, PolicyStore, ProviderRegistry};
