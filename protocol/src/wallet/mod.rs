//! # Wallet Adapter
//!
//! The customer's wallet is an external collaborator: it owns the keys,
//! lists coins, encodes transactions in its native format and signs. This
//! module defines the interface consumed from it ([`WalletBackend`]) and the
//! stateless [`TransactionAdapter`] the protocol runner talks to.
//!
//! ```text
//! mod.rs     — WalletBackend trait, TransactionAdapter
//! rpc.rs     — JSON-RPC client for a node wallet (listunspent, createpsbt, ...)
//! memory.rs  — In-process wallet used by the sandbox and tests
//! ```

pub mod memory;
pub mod rpc;

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{ExchangeError, Result};
use crate::transaction::{
    CandidateBuilder, CandidateTransaction, Coin, OutPoint, PartialTransaction, SighashPolicy,
    TransactionBlob, TxInput, TxOutput, UnspentFilter,
};

pub use memory::MemoryWallet;
pub use rpc::RpcWallet;

/// Operations consumed from the customer's wallet.
#[async_trait]
pub trait WalletBackend: Send + Sync {
    /// Unspent coins matching `filter`.
    async fn list_unspent(&self, filter: &UnspentFilter) -> Result<Vec<Coin>>;

    /// Encode an unsigned transaction. Witnesses on `inputs` are ignored.
    async fn create_transaction(
        &self,
        inputs: &[TxInput],
        outputs: &[TxOutput],
        lock_time: u32,
        replaceable: bool,
    ) -> Result<TransactionBlob>;

    /// Update a transaction with wallet data and, when `sign` is set, sign
    /// every input the wallet owns under `policy`.
    async fn process_transaction(
        &self,
        blob: &TransactionBlob,
        sign: bool,
        policy: SighashPolicy,
    ) -> Result<TransactionBlob>;

    /// Decode a blob into inputs, outputs and witnesses.
    async fn decode_transaction(&self, blob: &TransactionBlob) -> Result<PartialTransaction>;
}

#[async_trait]
impl<T: WalletBackend + ?Sized> WalletBackend for Arc<T> {
    async fn list_unspent(&self, filter: &UnspentFilter) -> Result<Vec<Coin>> {
        (**self).list_unspent(filter).await
    }

    async fn create_transaction(
        &self,
        inputs: &[TxInput],
        outputs: &[TxOutput],
        lock_time: u32,
        replaceable: bool,
    ) -> Result<TransactionBlob> {
        (**self)
            .create_transaction(inputs, outputs, lock_time, replaceable)
            .await
    }

    async fn process_transaction(
        &self,
        blob: &TransactionBlob,
        sign: bool,
        policy: SighashPolicy,
    ) -> Result<TransactionBlob> {
        (**self).process_transaction(blob, sign, policy).await
    }

    async fn decode_transaction(&self, blob: &TransactionBlob) -> Result<PartialTransaction> {
        (**self).decode_transaction(blob).await
    }
}

/// Which of the eligible coins a candidate spends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoinSelection {
    /// Every eligible coin, into a single destination output.
    Sweep,
    /// Only the largest eligible coin. A one-input candidate pairs its input
    /// with its output, as `SINGLE|ANYONECANPAY` requires.
    LargestCoin,
}

// ---------------------------------------------------------------------------
// TransactionAdapter
// ---------------------------------------------------------------------------

/// Builds candidates and applies signatures through a [`WalletBackend`].
/// Holds no state of its own.
pub struct TransactionAdapter<W> {
    wallet: W,
}

impl<W: WalletBackend> TransactionAdapter<W> {
    pub fn new(wallet: W) -> Self {
        Self { wallet }
    }

    pub fn wallet(&self) -> &W {
        &self.wallet
    }

    /// Sweep every spendable coin matching `source` to `destination`:
    /// zero fee, replaceable, unsigned.
    ///
    /// Fails with [`ExchangeError::NoFundsAvailable`] when the wallet
    /// reports nothing spendable.
    pub async fn build_candidate(
        &self,
        source: Option<&str>,
        destination: &str,
    ) -> Result<CandidateTransaction> {
        self.build_candidate_with(source, destination, CoinSelection::Sweep)
            .await
    }

    /// [`build_candidate`](Self::build_candidate) with an explicit coin
    /// selection. The candidate always pays one output to `destination`.
    pub async fn build_candidate_with(
        &self,
        source: Option<&str>,
        destination: &str,
        selection: CoinSelection,
    ) -> Result<CandidateTransaction> {
        let filter = UnspentFilter::for_source(source);
        let mut coins: Vec<Coin> = self
            .wallet
            .list_unspent(&filter)
            .await?
            .into_iter()
            .filter(|c| c.spendable && c.amount > 0 && filter.matches(c))
            .collect();

        if coins.is_empty() {
            return Err(ExchangeError::NoFundsAvailable {
                filter: filter.to_string(),
            });
        }
        coins.sort_by(|a, b| a.outpoint.cmp(&b.outpoint));
        if selection == CoinSelection::LargestCoin {
            // Ties go to the lowest outpoint.
            let largest = coins
                .iter()
                .enumerate()
                .rev()
                .max_by_key(|(_, c)| c.amount)
                .map(|(i, _)| i)
                .unwrap_or_default();
            coins = vec![coins.swap_remove(largest)];
        }
        debug!(coins = coins.len(), ?selection, %filter, "selected customer coins");

        let planned = CandidateBuilder::new()
            .inputs(&coins)
            .destination(destination)
            .build()?;

        let blob = self
            .wallet
            .create_transaction(&planned.inputs, &planned.outputs, planned.lock_time, true)
            .await?;
        let decoded = self.wallet.decode_transaction(&blob).await?;

        // The wallet encodes; it must not re-plan.
        if !same_commitments(&planned, &decoded) {
            return Err(ExchangeError::malformed(
                "wallet-encoded candidate differs from the requested inputs/outputs",
            ));
        }

        let candidate = CandidateTransaction::new(blob, decoded, coins)?;
        info!(
            amount = candidate.amount(),
            inputs = candidate.transaction().inputs.len(),
            destination,
            "candidate transaction built"
        );
        Ok(candidate)
    }

    /// Every outpoint the wallet holds, confirmed or not and whatever its
    /// address. A sponsor must never add one of these as its own input.
    pub async fn owned_outpoints(&self) -> Result<Vec<OutPoint>> {
        let filter = UnspentFilter::default();
        Ok(self
            .wallet
            .list_unspent(&filter)
            .await?
            .into_iter()
            .map(|c| c.outpoint)
            .collect())
    }

    /// Sign `blob` under `policy` without altering its structure.
    ///
    /// The wallet's answer is decoded and compared input-for-input and
    /// output-for-output with the original; any structural change is a
    /// [`ExchangeError::SigningFailed`].
    pub async fn process(
        &self,
        blob: &TransactionBlob,
        policy: SighashPolicy,
    ) -> Result<TransactionBlob> {
        let before = self.wallet.decode_transaction(blob).await?;
        let signed = self.wallet.process_transaction(blob, true, policy).await?;
        let after = self.wallet.decode_transaction(&signed).await?;

        if before.signable_bytes() != after.signable_bytes() {
            return Err(ExchangeError::SigningFailed {
                step: "process".to_string(),
                reason: "wallet altered transaction structure while signing".to_string(),
            });
        }
        Ok(signed)
    }

    pub async fn decode(&self, blob: &TransactionBlob) -> Result<PartialTransaction> {
        self.wallet.decode_transaction(blob).await
    }
}

/// Same inputs (outpoint, amount) and outputs, in the same order.
/// Sequence numbers are left to the wallet's replaceability handling.
fn same_commitments(planned: &PartialTransaction, decoded: &PartialTransaction) -> bool {
    planned.inputs.len() == decoded.inputs.len()
        && planned
            .inputs
            .iter()
            .zip(&decoded.inputs)
            .all(|(a, b)| a.previous_output == b.previous_output && a.amount == b.amount)
        && planned.outputs == decoded.outputs
}
