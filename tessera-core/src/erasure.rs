//! Systematic Reed-Solomon codec
//!
//! A buffer of length L is cut into k contiguous data shards of
//! `ceil(L / k)` bytes (the last one zero-padded) and m parity shards are
//! computed over GF(2^8). Any k distinct shards give back the buffer.
//! The default layout is k=4, m=2, so a file survives the loss of any two
//! providers at a 1.5x storage footprint.

use crate::error::{Result, TesseraError};
use crate::{DATA_SHARDS, PARITY_SHARDS};
use bytes::Bytes;
use rayon::prelude::*;
use reed_solomon_erasure::galois_8::ReedSolomon;
use serde::{Deserialize, Serialize};

/// Inputs at least this large are split across the rayon pool
const PARALLEL_SPLIT_THRESHOLD: usize = 1024 * 1024;

/// Shard layout: k data shards plus m parity shards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErasureConfig {
    pub data_shards: usize,
    pub parity_shards: usize,
}

impl Default for ErasureConfig {
    fn default() -> Self {
        Self {
            data_shards: DATA_SHARDS,
            parity_shards: PARITY_SHARDS,
        }
    }
}

impl ErasureConfig {
    /// Validated layout; GF(2^8) caps the total at 256 shards
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<Self> {
        let total = data_shards + parity_shards;
        let problem = if data_shards == 0 {
            Some("data_shards must be > 0".to_string())
        } else if parity_shards == 0 {
            Some("parity_shards must be > 0".to_string())
        } else if total > 256 {
            Some(format!("at most 256 total shards supported, got {}", total))
        } else {
            None
        };

        match problem {
            Some(message) => Err(TesseraError::Configuration(message)),
            None => Ok(Self {
                data_shards,
                parity_shards,
            }),
        }
    }

    pub fn total_shards(&self) -> usize {
        self.data_shards + self.parity_shards
    }

    /// Stored bytes per input byte, (k+m)/k
    pub fn expansion_factor(&self) -> f64 {
        self.total_shards() as f64 / self.data_shards as f64
    }

    /// Shards that may be lost without losing data
    pub fn max_failures(&self) -> usize {
        self.parity_shards
    }

    /// Length of every shard produced for an input of `input_len` bytes
    ///
    /// Never zero: an empty input still yields one-byte shards, which the
    /// recorded original length truncates away on decode.
    pub fn shard_len(&self, input_len: usize) -> usize {
        input_len.div_ceil(self.data_shards).max(1)
    }
}

/// One coded shard, tagged with its position in the layout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Shard {
    pub index: u8,
    pub data: Bytes,
}

impl Shard {
    pub fn new(index: u8, data: Bytes) -> Self {
        Self { index, data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_parity(&self, layout: &ErasureConfig) -> bool {
        self.index as usize >= layout.data_shards
    }
}

/// Encoder and decoder for one shard layout
pub struct Codec {
    layout: ErasureConfig,
    rs: ReedSolomon,
}

impl Codec {
    pub fn new(layout: ErasureConfig) -> Result<Self> {
        let rs = ReedSolomon::new(layout.data_shards, layout.parity_shards)?;
        Ok(Self { layout, rs })
    }

    pub fn layout(&self) -> &ErasureConfig {
        &self.layout
    }

    /// Split `input` into `k + m` shards, returned in index order
    pub fn encode(&self, input: &[u8]) -> Result<Vec<Shard>> {
        let shard_len = self.layout.shard_len(input.len());
        let k = self.layout.data_shards;

        let data: Vec<Vec<u8>> = if input.len() >= PARALLEL_SPLIT_THRESHOLD {
            (0..k)
                .into_par_iter()
                .map(|i| padded_slice(input, i, shard_len))
                .collect()
        } else {
            (0..k).map(|i| padded_slice(input, i, shard_len)).collect()
        };
        let mut parity = vec![vec![0u8; shard_len]; self.layout.parity_shards];
        self.rs.encode_sep(&data, &mut parity)?;

        Ok(data
            .into_iter()
            .chain(parity)
            .enumerate()
            .map(|(i, bytes)| Shard::new(i as u8, Bytes::from(bytes)))
            .collect())
    }

    /// Rebuild the first `original_len` bytes from any k distinct shards
    ///
    /// Shards may arrive in any order and are placed by their own index.
    pub fn reconstruct(&self, shards: &[Shard], original_len: usize) -> Result<Bytes> {
        let total = self.layout.total_shards();
        let k = self.layout.data_shards;
        let mut slots: Vec<Option<Vec<u8>>> = vec![None; total];
        let mut shard_len = None;

        for shard in shards {
            let index = shard.index as usize;
            if index >= total {
                return Err(TesseraError::InvalidShardIndex {
                    index,
                    max: total - 1,
                });
            }
            let expected = *shard_len.get_or_insert(shard.len());
            if shard.len() != expected {
                return Err(TesseraError::ShardSizeMismatch {
                    expected,
                    actual: shard.len(),
                });
            }
            slots[index] = Some(shard.data.to_vec());
        }

        let present = slots.iter().filter(|s| s.is_some()).count();
        if present < k {
            return Err(TesseraError::InsufficientShards {
                available: present,
                required: k,
            });
        }

        let shard_len = shard_len.unwrap_or_default();
        if original_len > shard_len * k {
            return Err(TesseraError::InvalidInput(format!(
                "original length {} exceeds the {} bytes held by the data shards",
                original_len,
                shard_len * k
            )));
        }

        // Parity shards are not needed to read the data back
        self.rs.reconstruct_data(&mut slots)?;

        let mut output = Vec::with_capacity(shard_len * k);
        for slot in slots.iter().take(k) {
            let bytes = slot.as_deref().ok_or_else(|| {
                TesseraError::Internal("data shard missing after reconstruction".to_string())
            })?;
            output.extend_from_slice(bytes);
        }
        output.truncate(original_len);
        Ok(Bytes::from(output))
    }

    /// Check parity against data for a complete set in index order
    pub fn verify(&self, shards: &[Shard]) -> Result<bool> {
        let Some(first) = shards.first() else {
            return Ok(false);
        };
        let complete = shards.len() == self.layout.total_shards()
            && shards
                .iter()
                .enumerate()
                .all(|(i, s)| s.index as usize == i && s.len() == first.len());
        if !complete {
            return Ok(false);
        }

        let slices: Vec<&[u8]> = shards.iter().map(|s| s.data.as_ref()).collect();
        Ok(self.rs.verify(&slices)?)
    }
}

/// The `index`-th `len`-byte slice of `input`, zero-filled past its end
fn padded_slice(input: &[u8], index: usize, len: usize) -> Vec<u8> {
    let start = (index * len).min(input.len());
    let end = (start + len).min(input.len());
    let mut slice = Vec::with_capacity(len);
    slice.extend_from_slice(&input[start..end]);
    slice.resize(len, 0);
    slice
}
