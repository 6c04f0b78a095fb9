//! # Transaction Module
//!
//! The customer-side view of a UTXO transaction while it is being
//! co-constructed with the sponsor.
//!
//! ```text
//! types.rs    — Asset, coins, inputs, outputs, opaque blobs
//! builder.rs  — PartialTransaction, CandidateBuilder, CandidateTransaction
//! sighash.rs  — Signature commitment policies and witness verification
//! ```
//!
//! ## Lifecycle
//!
//! 1. **Build** — the wallet adapter selects coins and uses
//!    [`CandidateBuilder`] to describe a zero-fee, replaceable, unsigned
//!    transaction.
//! 2. **Augment** — the sponsor appends its fee input and change output.
//! 3. **Sign** — the customer signs under a [`SighashPolicy`] chosen by the
//!    signing orchestrator.
//! 4. **Broadcast** — the sponsor finalizes and relays.
//!
//! Amounts are `u64` base units. No floating point past the wallet RPC
//! boundary.

pub mod builder;
pub mod sighash;
pub mod types;

pub use builder::{CandidateBuilder, CandidateTransaction, PartialTransaction};
pub use sighash::SighashPolicy;
pub use types::{
    Asset, Coin, InputWitness, OutPoint, TransactionBlob, TxInput, TxOutput, UnspentFilter,
};
