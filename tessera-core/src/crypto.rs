//! Per-file encryption for Tessera
//!
//! Provides:
//! - Random AES-256 keys and 16-byte IVs, one pair per file
//! - AES-256-CBC with PKCS#7 padding over whole buffers
//! - Incremental encryptor/decryptor for the streaming pipeline
//! - Base64 serialization of keys and IVs for metadata storage
//!
//! CBC is not authenticated. Tampering is not detected here; lost or
//! damaged shards are handled by erasure coding instead.

use crate::error::{Result, TesseraError};
use aes::cipher::block_padding::Pkcs7;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// AES-256 key size (32 bytes)
pub const KEY_SIZE: usize = 32;

/// CBC initialization vector size (16 bytes)
pub const IV_SIZE: usize = 16;

/// AES block size (16 bytes)
pub const BLOCK_SIZE: usize = 16;

/// AES-256 encryption key
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_SIZE]);

impl EncryptionKey {
    /// Generate a new random encryption key
    pub fn generate() -> Self {
        let mut key = [0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        Self(key)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (validates length)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != KEY_SIZE {
            return Err(TesseraError::InvalidKeyLength {
                expected: KEY_SIZE,
                actual: slice.len(),
            });
        }
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(slice);
        Ok(Self(key))
    }

    /// Parse the base64 form stored in file metadata
    pub fn from_base64(encoded: &str) -> Result<Self> {
        Self::from_slice(&B64.decode(encoded)?)
    }

    /// Base64 form for file metadata
    pub fn to_base64(&self) -> String {
        B64.encode(self.0)
    }

    /// Get the raw key bytes
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.0
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EncryptionKey([REDACTED])")
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        // Zeroize key on drop
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

/// CBC initialization vector
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct InitVector([u8; IV_SIZE]);

impl InitVector {
    /// Generate a new random IV
    pub fn generate() -> Self {
        let mut iv = [0u8; IV_SIZE];
        OsRng.fill_bytes(&mut iv);
        Self(iv)
    }

    /// Create from raw bytes
    pub fn from_bytes(bytes: [u8; IV_SIZE]) -> Self {
        Self(bytes)
    }

    /// Create from a slice (validates length)
    pub fn from_slice(slice: &[u8]) -> Result<Self> {
        if slice.len() != IV_SIZE {
            return Err(TesseraError::InvalidKeyLength {
                expected: IV_SIZE,
                actual: slice.len(),
            });
        }
        let mut iv = [0u8; IV_SIZE];
        iv.copy_from_slice(slice);
        Ok(Self(iv))
    }

    /// Parse the base64 form stored in file metadata
    pub fn from_base64(encoded: &str) -> Result<Self> {
        Self::from_slice(&B64.decode(encoded)?)
    }

    /// Base64 form for file metadata
    pub fn to_base64(&self) -> String {
        B64.encode(self.0)
    }

    /// Get the raw IV bytes
    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.0
    }
}

impl fmt::Debug for InitVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "InitVector({})", self.to_base64())
    }
}

fn encryptor(key: &EncryptionKey, iv: &InitVector) -> Result<Aes256CbcEnc> {
    Aes256CbcEnc::new_from_slices(key.as_bytes(), iv.as_bytes())
        .map_err(|e| TesseraError::Encryption(e.to_string()))
}

fn decryptor(key: &EncryptionKey, iv: &InitVector) -> Result<Aes256CbcDec> {
    Aes256CbcDec::new_from_slices(key.as_bytes(), iv.as_bytes())
        .map_err(|e| TesseraError::Decryption(e.to_string()))
}

/// Encrypt a whole buffer with AES-256-CBC and PKCS#7 padding
///
/// Output length is the input length rounded up to the next full block
/// (a full padding block is added when the input is already aligned).
pub fn encrypt(plaintext: &[u8], key: &EncryptionKey, iv: &InitVector) -> Result<Vec<u8>> {
    Ok(encryptor(key, iv)?.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypt a whole buffer and strip its PKCS#7 padding
pub fn decrypt(ciphertext: &[u8], key: &EncryptionKey, iv: &InitVector) -> Result<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(TesseraError::Decryption(format!(
            "ciphertext length {} is not a positive multiple of {}",
            ciphertext.len(),
            BLOCK_SIZE
        )));
    }
    decryptor(key, iv)?
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| TesseraError::Decryption("invalid padding".to_string()))
}

/// Incremental CBC encryptor
///
/// Produces exactly the bytes `encrypt` would for the concatenated input.
pub struct StreamEncryptor {
    cipher: Aes256CbcEnc,
    pending: Vec<u8>,
}

impl StreamEncryptor {
    pub fn new(key: &EncryptionKey, iv: &InitVector) -> Result<Self> {
        Ok(Self {
            cipher: encryptor(key, iv)?,
            pending: Vec::with_capacity(BLOCK_SIZE),
        })
    }

    /// Encrypt every complete block available and append it to `out`
    pub fn update(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.pending.extend_from_slice(input);
        let ready = self.pending.len() - self.pending.len() % BLOCK_SIZE;

        for block in self.pending[..ready].chunks_exact_mut(BLOCK_SIZE) {
            self.cipher
                .encrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        out.extend_from_slice(&self.pending[..ready]);
        self.pending.drain(..ready);
    }

    /// Pad and encrypt the trailing partial block
    pub fn finish(self, out: &mut Vec<u8>) -> Result<()> {
        let mut block = [0u8; BLOCK_SIZE];
        let remaining = self.pending.len();
        block[..remaining].copy_from_slice(&self.pending);

        let tail = self
            .cipher
            .encrypt_padded_mut::<Pkcs7>(&mut block, remaining)
            .map_err(|_| TesseraError::Encryption("padding failed".to_string()))?;
        out.extend_from_slice(tail);
        Ok(())
    }
}

/// Incremental CBC decryptor
///
/// Always holds back the last complete block so its padding can be
/// removed in `finish`.
pub struct StreamDecryptor {
    cipher: Aes256CbcDec,
    pending: Vec<u8>,
}

impl StreamDecryptor {
    pub fn new(key: &EncryptionKey, iv: &InitVector) -> Result<Self> {
        Ok(Self {
            cipher: decryptor(key, iv)?,
            pending: Vec::with_capacity(2 * BLOCK_SIZE),
        })
    }

    /// Decrypt everything except the final block seen so far
    pub fn update(&mut self, input: &[u8], out: &mut Vec<u8>) {
        self.pending.extend_from_slice(input);
        if self.pending.len() <= BLOCK_SIZE {
            return;
        }

        let mut ready = self.pending.len() - self.pending.len() % BLOCK_SIZE;
        if ready == self.pending.len() {
            ready -= BLOCK_SIZE;
        }

        for block in self.pending[..ready].chunks_exact_mut(BLOCK_SIZE) {
            self.cipher
                .decrypt_block_mut(GenericArray::from_mut_slice(block));
        }
        out.extend_from_slice(&self.pending[..ready]);
        self.pending.drain(..ready);
    }

    /// Decrypt the final block and strip its padding
    pub fn finish(self, out: &mut Vec<u8>) -> Result<()> {
        if self.pending.len() != BLOCK_SIZE {
            return Err(TesseraError::Decryption(format!(
                "truncated ciphertext: {} trailing bytes",
                self.pending.len()
            )));
        }

        let mut block = self.pending;
        let plain = self
            .cipher
            .decrypt_padded_mut::<Pkcs7>(&mut block)
            .map_err(|_| TesseraError::Decryption("invalid padding".to_string()))?;
        out.extend_from_slice(plain);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encryption_roundtrip() {
        let key = EncryptionKey::generate();
        let iv = InitVector::generate();
        let plaintext = b"secret message";

        let encrypted = encrypt(plaintext, &key, &iv).unwrap();
        let decrypted = decrypt(&encrypted, &key, &iv).unwrap();

        assert_eq!(plaintext.as_slice(), decrypted.as_slice());
    }

    #[test]
    fn test_padding_lengths() {
        let key = EncryptionKey::generate();
        let iv = InitVector::generate();

        assert_eq!(encrypt(&[], &key, &iv).unwrap().len(), 16);
        assert_eq!(encrypt(&[0u8; 15], &key, &iv).unwrap().len(), 16);
        // Aligned input gets a whole padding block
        assert_eq!(encrypt(&[0u8; 32], &key, &iv).unwrap().len(), 48);
    }

    #[test]
    fn test_deterministic_for_fixed_key_and_iv() {
        let key = EncryptionKey::generate();
        let iv = InitVector::generate();
        let data = vec![9u8; 1000];

        assert_eq!(
            encrypt(&data, &key, &iv).unwrap(),
            encrypt(&data, &key, &iv).unwrap()
        );
    }

    #[test]
    fn test_base64_roundtrip() {
        let key = EncryptionKey::generate();
        let iv = InitVector::generate();

        let key2 = EncryptionKey::from_base64(&key.to_base64()).unwrap();
        let iv2 = InitVector::from_base64(&iv.to_base64()).unwrap();

        assert_eq!(key, key2);
        assert_eq!(iv, iv2);
    }

    #[test]
    fn test_invalid_key_material() {
        assert!(matches!(
            EncryptionKey::from_slice(&[0u8; 16]),
            Err(TesseraError::InvalidKeyLength {
                expected: 32,
                actual: 16
            })
        ));
        assert!(InitVector::from_base64("not base64!").is_err());
    }

    #[test]
    fn test_wrong_key_does_not_return_plaintext() {
        let key1 = EncryptionKey::generate();
        let key2 = EncryptionKey::generate();
        let iv = InitVector::generate();
        let plaintext = b"secret that spans more than one block";

        let encrypted = encrypt(plaintext, &key1, &iv).unwrap();
        match decrypt(&encrypted, &key2, &iv) {
            Ok(garbage) => assert_ne!(garbage.as_slice(), plaintext.as_slice()),
            Err(e) => assert!(matches!(e, TesseraError::Decryption(_))),
        }
    }

    #[test]
    fn test_decrypt_rejects_unaligned_input() {
        let key = EncryptionKey::generate();
        let iv = InitVector::generate();
        assert!(decrypt(&[1u8; 17], &key, &iv).is_err());
        assert!(decrypt(&[], &key, &iv).is_err());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = EncryptionKey::generate();
        assert_eq!(format!("{:?}", key), "EncryptionKey([REDACTED])");
    }

    #[test]
    fn test_stream_matches_whole_buffer() {
        let key = EncryptionKey::generate();
        let iv = InitVector::generate();
        let data: Vec<u8> = (0..10_000).map(|i| (i % 253) as u8).collect();

        let mut enc = StreamEncryptor::new(&key, &iv).unwrap();
        let mut streamed = Vec::new();
        for piece in data.chunks(777) {
            enc.update(piece, &mut streamed);
        }
        enc.finish(&mut streamed).unwrap();
        assert_eq!(streamed, encrypt(&data, &key, &iv).unwrap());

        let mut dec = StreamDecryptor::new(&key, &iv).unwrap();
        let mut plain = Vec::new();
        for piece in streamed.chunks(1000) {
            dec.update(piece, &mut plain);
        }
        dec.finish(&mut plain).unwrap();
        assert_eq!(plain, data);
    }

    #[test]
    fn test_stream_decryptor_detects_truncation() {
        let key = EncryptionKey::generate();
        let iv = InitVector::generate();
        let encrypted = encrypt(&[5u8; 40], &key, &iv).unwrap();

        let mut dec = StreamDecryptor::new(&key, &iv).unwrap();
        let mut plain = Vec::new();
        dec.update(&encrypted[..encrypted.len() - 3], &mut plain);
        assert!(dec.finish(&mut plain).is_err());
    }

    proptest! {
        #[test]
        fn prop_decrypt_inverts_encrypt(
            data in proptest::collection::vec(any::<u8>(), 0..4096),
            key in any::<[u8; 32]>(),
            iv in any::<[u8; 16]>(),
        ) {
            let key = EncryptionKey::from_bytes(key);
            let iv = InitVector::from_bytes(iv);
            let encrypted = encrypt(&data, &key, &iv).unwrap();
            prop_assert_eq!(decrypt(&encrypted, &key, &iv).unwrap(), data);
        }
    }
}
