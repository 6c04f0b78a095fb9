//! # Cryptographic Primitives
//!
//! Thin, type-safe wrappers around audited implementations. The exchange
//! protocol itself never touches key material; these helpers exist for the
//! in-process collaborators (the memory wallet and the simulated sponsor)
//! and for checking that a witness still verifies after the sponsor has
//! edited a transaction.
//!
//! - **Ed25519** for input witnesses.
//! - **SHA-256** (doubled) for transaction IDs and signing digests.

pub mod hash;
pub mod keys;

pub use hash::{double_sha256, double_sha256_array, sha256};
pub use keys::{KeyError, KeyPair, PublicKey, Signature};
