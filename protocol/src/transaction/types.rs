//! Core type definitions for sponsored transactions.
//!
//! These are the vocabulary shared by the wallet adapter, the sponsor
//! client and the verifier. Everything is plain data with serde derives so
//! it can cross either collaborator boundary unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::sighash::SighashPolicy;

// ---------------------------------------------------------------------------
// Asset
// ---------------------------------------------------------------------------

/// Ledger identifier an exchange is opened on (e.g. `BTC`, `tBTC`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Asset(String);

impl Asset {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self(ticker.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Coins
// ---------------------------------------------------------------------------

/// Reference to a previous transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OutPoint {
    /// Hex txid of the funding transaction.
    pub txid: String,
    /// Output index within it.
    pub vout: u32,
}

impl OutPoint {
    pub fn new(txid: impl Into<String>, vout: u32) -> Self {
        Self {
            txid: txid.into(),
            vout,
        }
    }
}

impl fmt::Display for OutPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.txid, self.vout)
    }
}

/// An unspent output as reported by the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub outpoint: OutPoint,
    pub address: String,
    /// Value in base units.
    pub amount: u64,
    pub confirmations: u32,
    /// Whether the wallet holds the key for it.
    pub spendable: bool,
}

/// Filter passed to the wallet's unspent listing.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UnspentFilter {
    /// Restrict to these addresses. Empty means any address.
    pub addresses: Vec<String>,
    pub min_confirmations: u32,
}

impl UnspentFilter {
    /// Filter for a single funding address, or any address when `None`.
    pub fn for_source(source: Option<&str>) -> Self {
        Self {
            addresses: source.map(|s| vec![s.to_string()]).unwrap_or_default(),
            min_confirmations: 1,
        }
    }

    /// Whether a coin passes this filter.
    pub fn matches(&self, coin: &Coin) -> bool {
        coin.confirmations >= self.min_confirmations
            && (self.addresses.is_empty() || self.addresses.contains(&coin.address))
    }
}

impl fmt::Display for UnspentFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.addresses.is_empty() {
            write!(f, "any address, minconf={}", self.min_confirmations)
        } else {
            write!(
                f,
                "addresses=[{}], minconf={}",
                self.addresses.join(","),
                self.min_confirmations
            )
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs / outputs
// ---------------------------------------------------------------------------

/// Signature data attached to an input once its owner has signed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputWitness {
    /// Commitment scope the signature was produced under.
    pub policy: SighashPolicy,
    /// Hex-encoded Ed25519 public key of the signer.
    pub public_key: String,
    /// Hex-encoded signature over the policy's signing digest.
    pub signature: String,
}

/// A transaction input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub previous_output: OutPoint,
    pub sequence: u32,
    /// Value of the spent coin. Committed to by every signing digest.
    pub amount: u64,
    /// `None` until the owner signs.
    pub witness: Option<InputWitness>,
}

impl TxInput {
    pub fn new(previous_output: OutPoint, amount: u64, sequence: u32) -> Self {
        Self {
            previous_output,
            sequence,
            amount,
            witness: None,
        }
    }

    pub fn is_signed(&self) -> bool {
        self.witness.is_some()
    }
}

/// A transaction output.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: String,
    pub amount: u64,
}

impl TxOutput {
    pub fn new(address: impl Into<String>, amount: u64) -> Self {
        Self {
            address: address.into(),
            amount,
        }
    }
}

// ---------------------------------------------------------------------------
// Blob
// ---------------------------------------------------------------------------

/// A serialized transaction in the wallet's native encoding (a PSBT string
/// for JSON-RPC wallets, hex JSON for the memory wallet). Opaque to the
/// exchange client; only the wallet decodes it.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransactionBlob(String);

impl TransactionBlob {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for TransactionBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Blobs can be large; keep log lines readable.
        if self.0.len() > 32 {
            let head = self.0.get(..32).unwrap_or(&self.0);
            write!(f, "TransactionBlob({}…, {} chars)", head, self.0.len())
        } else {
            write!(f, "TransactionBlob({})", self.0)
        }
    }
}

impl fmt::Display for TransactionBlob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
