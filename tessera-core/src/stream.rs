//! Bounded-memory ingestion for large files
//!
//! The plaintext is read through a live CBC encryptor and the resulting
//! ciphertext is cut into fixed-size windows. Each window is erasure coded
//! and handed to a caller-supplied sink while the next window is read, so
//! splitting and uploading overlap.
//!
//! Windows partition one continuous ciphertext. Only the final window may
//! be shorter than the window size.

use crate::crypto::{EncryptionKey, InitVector, StreamDecryptor, StreamEncryptor, BLOCK_SIZE};
use crate::erasure::{Codec, ErasureConfig, Shard};
use crate::error::{Result, TesseraError};
use crate::model::object_key;
use std::future::Future;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;
use uuid::Uuid;

/// Read buffer size for the source stream
const READ_CHUNK: usize = 64 * 1024;

/// One erasure-coded ciphertext window
#[derive(Debug, Clone)]
pub struct EncodedWindow {
    /// Position of the window in the stream
    pub index: usize,
    /// Ciphertext length before erasure padding
    pub encrypted_len: usize,
    /// Whether no window follows this one
    pub is_last: bool,
    /// `data_shards + parity_shards` shards in index order
    pub shards: Vec<Shard>,
}

impl EncodedWindow {
    /// Object key for one shard of this window
    ///
    /// A stream that turns out to be a single window uses the same keys as
    /// a whole-file upload.
    pub fn object_key(&self, file_id: Uuid, shard_index: u8) -> String {
        let window_count = if self.index == 0 && self.is_last {
            1
        } else {
            self.index + 2
        };
        object_key(file_id, self.index, window_count, shard_index)
    }
}

/// Result of a completed stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    /// Plaintext bytes consumed from the source
    pub plaintext_len: u64,
    /// Ciphertext length of every window, in order
    pub encrypted_sizes: Vec<u64>,
}

/// Cuts an encrypted stream into windows
struct WindowReader<R> {
    reader: R,
    encryptor: Option<StreamEncryptor>,
    pending: Vec<u8>,
    buf: Vec<u8>,
    window_size: usize,
    plaintext_len: u64,
}

impl<R: AsyncRead + Unpin> WindowReader<R> {
    fn new(reader: R, key: &EncryptionKey, iv: &InitVector, window_size: usize) -> Result<Self> {
        Ok(Self {
            reader,
            encryptor: Some(StreamEncryptor::new(key, iv)?),
            pending: Vec::with_capacity(window_size + READ_CHUNK),
            buf: vec![0u8; READ_CHUNK],
            window_size,
            plaintext_len: 0,
        })
    }

    /// Next ciphertext window and whether it is the last one
    async fn next_window(&mut self) -> Result<Option<(Vec<u8>, bool)>> {
        while self.pending.len() < self.window_size && self.encryptor.is_some() {
            let n = self.reader.read(&mut self.buf).await?;
            if n == 0 {
                if let Some(encryptor) = self.encryptor.take() {
                    encryptor.finish(&mut self.pending)?;
                }
            } else if let Some(encryptor) = self.encryptor.as_mut() {
                self.plaintext_len += n as u64;
                encryptor.update(&self.buf[..n], &mut self.pending);
            }
        }

        if self.pending.is_empty() {
            return Ok(None);
        }

        let take = self.pending.len().min(self.window_size);
        let rest = self.pending.split_off(take);
        let window = std::mem::replace(&mut self.pending, rest);

        // A live encryptor always emits at least one more padded block
        let is_last = self.encryptor.is_none() && self.pending.is_empty();
        Ok(Some((window, is_last)))
    }
}

/// Chunked encrypt, split and emit
pub struct StreamingPipeline {
    codec: Codec,
    window_size: usize,
}

impl StreamingPipeline {
    /// Create a pipeline
    ///
    /// `window_size` must be a positive multiple of the cipher block size
    /// so every full window holds whole blocks.
    pub fn new(config: ErasureConfig, window_size: usize) -> Result<Self> {
        if window_size == 0 || window_size % BLOCK_SIZE != 0 {
            return Err(TesseraError::Configuration(format!(
                "window size {} must be a positive multiple of {}",
                window_size, BLOCK_SIZE
            )));
        }
        Ok(Self {
            codec: Codec::new(config)?,
            window_size,
        })
    }

    /// Drive `reader` to completion, emitting each encoded window to `sink`
    ///
    /// The next window is read while the sink future for the current one
    /// is in flight. The first error from either side aborts the stream.
    pub async fn run<R, F, Fut>(
        &self,
        reader: R,
        key: &EncryptionKey,
        iv: &InitVector,
        mut sink: F,
    ) -> Result<StreamSummary>
    where
        R: AsyncRead + Unpin,
        F: FnMut(EncodedWindow) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let mut windows = WindowReader::new(reader, key, iv, self.window_size)?;
        let mut encrypted_sizes = Vec::new();
        let mut current = windows.next_window().await?;
        let mut index = 0;

        while let Some((ciphertext, is_last)) = current {
            let shards = self.codec.encode(&ciphertext)?;
            encrypted_sizes.push(ciphertext.len() as u64);
            debug!(window = index, bytes = ciphertext.len(), is_last, "Window encoded");

            let window = EncodedWindow {
                index,
                encrypted_len: ciphertext.len(),
                is_last,
                shards,
            };
            drop(ciphertext);

            let (next, ()) = tokio::try_join!(windows.next_window(), sink(window))?;
            current = next;
            index += 1;
        }

        Ok(StreamSummary {
            plaintext_len: windows.plaintext_len,
            encrypted_sizes,
        })
    }
}

/// Concatenates decoded windows back into plaintext
///
/// Windows must be pushed in order. Padding is removed once, in `finish`.
pub struct WindowReassembler {
    decryptor: StreamDecryptor,
    windows: usize,
}

impl WindowReassembler {
    pub fn new(key: &EncryptionKey, iv: &InitVector) -> Result<Self> {
        Ok(Self {
            decryptor: StreamDecryptor::new(key, iv)?,
            windows: 0,
        })
    }

    /// Feed the ciphertext of the next window, returning plaintext ready so far
    pub fn push(&mut self, ciphertext: &[u8]) -> Vec<u8> {
        let mut out = Vec::with_capacity(ciphertext.len());
        self.decryptor.update(ciphertext, &mut out);
        self.windows += 1;
        out
    }

    /// Number of windows pushed
    pub fn windows(&self) -> usize {
        self.windows
    }

    /// Remaining plaintext after padding removal
    pub fn finish(self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(BLOCK_SIZE);
        self.decryptor.finish(&mut out)?;
        Ok(out)
    }
}
