//! # Hashing Utilities
//!
//! SHA-256 based digests. Transaction IDs and signature digests use
//! `double_sha256`, the same construction UTXO ledgers use to rule out
//! length-extension on the hash.

use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of the input data.
///
/// # Example
///
/// ```
/// use feesponsor_protocol::crypto::sha256;
///
/// let hash = sha256(b"fee sponsorship");
/// assert_eq!(hash.len(), 32);
/// ```
pub fn sha256(data: &[u8]) -> Vec<u8> {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().to_vec()
}

/// `SHA-256(SHA-256(data))` as a heap vector.
pub fn double_sha256(data: &[u8]) -> Vec<u8> {
    double_sha256_array(data).to_vec()
}

/// `SHA-256(SHA-256(data))` as a fixed-size array, for callers that sign
/// or compare the digest directly.
pub fn double_sha256_array(data: &[u8]) -> [u8; 32] {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut output = [0u8; 32];
    output.copy_from_slice(&second);
    output
}
