//! Tessera Shard Transport
//!
//! Provides per-provider object operations:
//! - `ShardTransport` trait addressed by provider and object key
//! - `S3Transport` for any S3-compatible backend
//! - `MemoryTransport` with fault injection for testing
//! - `GuardedTransport` bounding every call with a deadline

pub mod guarded;
pub mod memory;
pub mod s3;
pub mod transport;

pub use guarded::{GuardedTransport, TransportConfig};
pub use memory::MemoryTransport;
pub use s3::S3Transport;
pub use transport::{ProviderHealth, ShardTransport};
