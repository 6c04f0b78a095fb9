// Copyright (c) 2026 Feesponsor Contributors. MIT License.
// See LICENSE for details.

//! # Feesponsor Protocol: Core Library
//!
//! A customer wants to move funds on a UTXO ledger without holding any coin
//! to pay the network fee. A sponsor pays it: the customer builds a
//! zero-fee transaction, the sponsor appends a fee-paying input and a change
//! output, and the two sides sign and broadcast. The customer never trusts
//! the sponsor's edits; every record the sponsor returns is re-fetched and
//! checked before the customer signs or reports success.
//!
//! Two flows:
//!
//! - **interactive**: submit unsigned, verify the sponsor's additions,
//!   sign with a full commitment, resubmit.
//! - **non-interactive**: pre-sign each input with a partial commitment
//!   that survives the sponsor's additions, submit once.
//!
//! ## Modules
//!
//! - **transaction**: Inputs, outputs, blobs, commitment policies.
//! - **wallet**: The customer's wallet collaborator and the adapter over it.
//! - **sponsor**: The sponsor collaborator and the exchange client.
//! - **verifier**: Tamper detection over re-fetched sponsor records.
//! - **signing**: Chooses the commitment for each protocol step.
//! - **runner**: Mode selection, flow sequencing, per-run state machine.
//! - **sandbox**: In-process wallet and sponsor for demos and tests.
//! - **config**: Endpoints, credentials, protocol constants.
//! - **crypto**: Ed25519 and SHA-256 helpers for the in-process collaborators.
//! - **error**: The single error type every operation returns.

pub mod config;
pub mod crypto;
pub mod error;
pub mod runner;
pub mod sandbox;
pub mod signing;
pub mod sponsor;
pub mod transaction;
pub mod verifier;
pub mod wallet;

pub use error::{ExchangeError, Result};
pub use runner::{Mode, ProtocolRunner, RunReport, RunRequest};
pub use sandbox::Sandbox;
pub use sponsor::{ExchangeClient, ExchangeRecord, ExchangeState, HttpSponsor, SimulatedSponsor};
pub use transaction::{Asset, SighashPolicy, TransactionBlob};
pub use wallet::{MemoryWallet, RpcWallet, TransactionAdapter};
