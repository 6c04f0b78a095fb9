//! Transaction construction.
//!
//! [`CandidateBuilder`] describes the customer's half of a sponsored
//! transaction: the selected coins, one destination receiving their full
//! value, zero fee, every input replaceable. The wallet turns that
//! description into its native blob; [`CandidateTransaction`] pairs the blob
//! with its decoded form and is immutable once built.

use serde::{Deserialize, Serialize};

use super::types::{Coin, OutPoint, TransactionBlob, TxInput, TxOutput};
use crate::config::{FINAL_SEQUENCE, REPLACEABLE_SEQUENCE, TX_VERSION};
use crate::crypto::hash::double_sha256;
use crate::error::{ExchangeError, Result};

// ---------------------------------------------------------------------------
// PartialTransaction
// ---------------------------------------------------------------------------

/// A transaction with optional, incrementally added input witnesses.
///
/// The txid is the double-SHA-256 of [`PartialTransaction::signable_bytes`],
/// which excludes witnesses, so it is stable across signing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialTransaction {
    pub version: u32,
    pub lock_time: u32,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
}

impl PartialTransaction {
    /// Sum of input values, saturating.
    pub fn total_in(&self) -> u64 {
        self.inputs
            .iter()
            .fold(0u64, |acc, i| acc.saturating_add(i.amount))
    }

    /// Sum of output values, saturating.
    pub fn total_out(&self) -> u64 {
        self.outputs
            .iter()
            .fold(0u64, |acc, o| acc.saturating_add(o.amount))
    }

    /// Implied fee, or `None` when outputs exceed inputs.
    pub fn fee(&self) -> Option<u64> {
        self.total_in().checked_sub(self.total_out())
    }

    /// Every input signals replace-by-fee.
    pub fn is_replaceable(&self) -> bool {
        !self.inputs.is_empty() && self.inputs.iter().all(|i| i.sequence < FINAL_SEQUENCE - 1)
    }

    /// Every input carries a witness.
    pub fn is_signed(&self) -> bool {
        !self.inputs.is_empty() && self.inputs.iter().all(TxInput::is_signed)
    }

    /// Position and contents of the input spending `outpoint`.
    pub fn find_input(&self, outpoint: &OutPoint) -> Option<(usize, &TxInput)> {
        self.inputs
            .iter()
            .enumerate()
            .find(|(_, input)| &input.previous_output == outpoint)
    }

    /// Canonical bytes for txid computation.
    ///
    /// Fixed-width little-endian integers and null-terminated strings.
    /// Witnesses are excluded.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(64 + 64 * (self.inputs.len() + self.outputs.len()));
        buf.extend_from_slice(&self.version.to_le_bytes());
        buf.extend_from_slice(&self.lock_time.to_le_bytes());

        buf.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            encode_input(&mut buf, input);
        }

        buf.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            encode_output(&mut buf, output);
        }
        buf
    }

    /// `hex(double_sha256(signable_bytes))`.
    pub fn compute_txid(&self) -> String {
        hex::encode(double_sha256(&self.signable_bytes()))
    }

    /// Encode in the sandbox wallet format: hex of the JSON serialization.
    pub fn to_blob(&self) -> Result<TransactionBlob> {
        let json = serde_json::to_vec(self)
            .map_err(|e| ExchangeError::malformed(format!("serialize failed: {e}")))?;
        Ok(TransactionBlob::new(hex::encode(json)))
    }

    /// Decode a blob produced by [`PartialTransaction::to_blob`].
    pub fn from_blob(blob: &TransactionBlob) -> Result<Self> {
        let json = hex::decode(blob.as_str())
            .map_err(|e| ExchangeError::malformed(format!("blob is not hex: {e}")))?;
        serde_json::from_slice(&json)
            .map_err(|e| ExchangeError::malformed(format!("blob is not a transaction: {e}")))
    }
}

pub(crate) fn encode_input(buf: &mut Vec<u8>, input: &TxInput) {
    buf.extend_from_slice(input.previous_output.txid.as_bytes());
    buf.push(0x00);
    buf.extend_from_slice(&input.previous_output.vout.to_le_bytes());
    buf.extend_from_slice(&input.sequence.to_le_bytes());
    buf.extend_from_slice(&input.amount.to_le_bytes());
}

pub(crate) fn encode_output(buf: &mut Vec<u8>, output: &TxOutput) {
    buf.extend_from_slice(output.address.as_bytes());
    buf.push(0x00);
    buf.extend_from_slice(&output.amount.to_le_bytes());
}

// ---------------------------------------------------------------------------
// CandidateBuilder
// ---------------------------------------------------------------------------

/// Fluent builder for the customer's unsigned candidate.
///
/// ```
/// use feesponsor_protocol::transaction::{CandidateBuilder, Coin, OutPoint};
///
/// let coin = Coin {
///     outpoint: OutPoint::new("ab".repeat(32), 0),
///     address: "sbx1source".to_string(),
///     amount: 50_000_000,
///     confirmations: 6,
///     spendable: true,
/// };
/// let tx = CandidateBuilder::new()
///     .input(&coin)
///     .destination("sbx1dest")
///     .build()
///     .unwrap();
/// assert_eq!(tx.fee(), Some(0));
/// assert_eq!(tx.outputs[0].amount, 50_000_000);
/// ```
pub struct CandidateBuilder {
    version: u32,
    lock_time: u32,
    replaceable: bool,
    inputs: Vec<(OutPoint, u64)>,
    destination: Option<String>,
}

impl CandidateBuilder {
    /// Defaults: current transaction version, lock time 0, replaceable.
    pub fn new() -> Self {
        Self {
            version: TX_VERSION,
            lock_time: 0,
            replaceable: true,
            inputs: Vec::new(),
            destination: None,
        }
    }

    /// Spend a coin.
    pub fn input(mut self, coin: &Coin) -> Self {
        self.inputs.push((coin.outpoint.clone(), coin.amount));
        self
    }

    /// Spend every coin in `coins`.
    pub fn inputs<'a>(mut self, coins: impl IntoIterator<Item = &'a Coin>) -> Self {
        for coin in coins {
            self = self.input(coin);
        }
        self
    }

    /// Address receiving the full input value.
    pub fn destination(mut self, address: &str) -> Self {
        self.destination = Some(address.to_string());
        self
    }

    pub fn lock_time(mut self, lock_time: u32) -> Self {
        self.lock_time = lock_time;
        self
    }

    pub fn replaceable(mut self, replaceable: bool) -> Self {
        self.replaceable = replaceable;
        self
    }

    /// Produce the unsigned, zero-fee transaction.
    pub fn build(self) -> Result<PartialTransaction> {
        if self.inputs.is_empty() {
            return Err(ExchangeError::malformed("candidate has no inputs"));
        }
        let destination = self
            .destination
            .filter(|d| !d.trim().is_empty())
            .ok_or_else(|| ExchangeError::malformed("candidate has no destination"))?;

        let total = self
            .inputs
            .iter()
            .try_fold(0u64, |acc, (_, amount)| acc.checked_add(*amount))
            .ok_or_else(|| ExchangeError::malformed("input total overflows"))?;
        if total == 0 {
            return Err(ExchangeError::malformed("selected coins carry no value"));
        }

        let sequence = if self.replaceable {
            REPLACEABLE_SEQUENCE
        } else {
            FINAL_SEQUENCE
        };

        Ok(PartialTransaction {
            version: self.version,
            lock_time: self.lock_time,
            inputs: self
                .inputs
                .into_iter()
                .map(|(outpoint, amount)| TxInput::new(outpoint, amount, sequence))
                .collect(),
            outputs: vec![TxOutput::new(destination, total)],
        })
    }
}

impl Default for CandidateBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// CandidateTransaction
// ---------------------------------------------------------------------------

/// The customer's submitted candidate: wallet blob, its decoded form, and
/// the coins it spends. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateTransaction {
    blob: TransactionBlob,
    transaction: PartialTransaction,
    coins: Vec<Coin>,
}

impl CandidateTransaction {
    /// Pair a wallet blob with its decoded form, enforcing the candidate
    /// guard (see [`CandidateTransaction::check_guard`]).
    pub fn new(
        blob: TransactionBlob,
        transaction: PartialTransaction,
        coins: Vec<Coin>,
    ) -> Result<Self> {
        let candidate = Self {
            blob,
            transaction,
            coins,
        };
        candidate.check_guard()?;
        Ok(candidate)
    }

    /// Zero fee, at least one input, every input customer-owned,
    /// replaceable, unsigned.
    pub fn check_guard(&self) -> Result<()> {
        let tx = &self.transaction;
        if tx.inputs.is_empty() {
            return Err(ExchangeError::malformed("candidate has no inputs"));
        }
        if tx.fee() != Some(0) {
            return Err(ExchangeError::malformed(format!(
                "candidate must carry zero fee (in={}, out={})",
                tx.total_in(),
                tx.total_out()
            )));
        }
        for input in &tx.inputs {
            if !self
                .coins
                .iter()
                .any(|c| c.outpoint == input.previous_output)
            {
                return Err(ExchangeError::malformed(format!(
                    "input {} is not a customer coin",
                    input.previous_output
                )));
            }
            if input.is_signed() {
                return Err(ExchangeError::malformed(format!(
                    "input {} is already signed",
                    input.previous_output
                )));
            }
        }
        if !tx.is_replaceable() {
            return Err(ExchangeError::malformed("candidate inputs must be replaceable"));
        }
        Ok(())
    }

    pub fn blob(&self) -> &TransactionBlob {
        &self.blob
    }

    pub fn transaction(&self) -> &PartialTransaction {
        &self.transaction
    }

    pub fn coins(&self) -> &[Coin] {
        &self.coins
    }

    /// Value the customer sends, in base units.
    pub fn amount(&self) -> u64 {
        self.transaction.total_out()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
