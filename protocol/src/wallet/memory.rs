//! In-process wallet.
//!
//! Holds a single Ed25519 key and the coins paid to its address. Blobs are
//! the hex(JSON) encoding of [`PartialTransaction`]. Used by the sandbox and
//! by tests; it implements exactly the [`WalletBackend`] contract a node
//! wallet would.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

use super::WalletBackend;
use crate::config::{FINAL_SEQUENCE, REPLACEABLE_SEQUENCE, TX_VERSION};
use crate::crypto::hash::sha256;
use crate::crypto::keys::KeyPair;
use crate::error::{ExchangeError, Result};
use crate::transaction::sighash::sign_input;
use crate::transaction::{
    Coin, OutPoint, PartialTransaction, SighashPolicy, TransactionBlob, TxInput, TxOutput,
    UnspentFilter,
};

/// Confirmations assigned to coins created by [`MemoryWallet::fund`].
const FUNDED_CONFIRMATIONS: u32 = 6;

pub struct MemoryWallet {
    keypair: KeyPair,
    coins: RwLock<Vec<Coin>>,
    funding_counter: AtomicU32,
}

impl MemoryWallet {
    pub fn new(keypair: KeyPair) -> Self {
        Self {
            keypair,
            coins: RwLock::new(Vec::new()),
            funding_counter: AtomicU32::new(0),
        }
    }

    /// The wallet's receive address.
    pub fn address(&self) -> String {
        self.keypair.address()
    }

    pub fn keypair(&self) -> &KeyPair {
        &self.keypair
    }

    /// Credit a new confirmed coin of `amount` base units to this wallet.
    pub fn fund(&self, amount: u64) -> Coin {
        let n = self.funding_counter.fetch_add(1, Ordering::Relaxed);
        let mut seed = self.address().into_bytes();
        seed.extend_from_slice(&n.to_le_bytes());
        let coin = Coin {
            outpoint: OutPoint::new(hex::encode(sha256(&seed)), 0),
            address: self.address(),
            amount,
            confirmations: FUNDED_CONFIRMATIONS,
            spendable: true,
        };
        self.coins.write().push(coin.clone());
        coin
    }

    /// Track an externally created coin.
    pub fn add_coin(&self, coin: Coin) {
        self.coins.write().push(coin);
    }

    /// Drop coins spent by `tx`, as a node would after broadcast.
    pub fn mark_spent(&self, tx: &PartialTransaction) {
        self.coins.write().retain(|c| tx.find_input(&c.outpoint).is_none());
    }

    fn owns(&self, outpoint: &OutPoint) -> bool {
        self.coins.read().iter().any(|c| &c.outpoint == outpoint)
    }
}

#[async_trait]
impl WalletBackend for MemoryWallet {
    async fn list_unspent(&self, filter: &UnspentFilter) -> Result<Vec<Coin>> {
        Ok(self
            .coins
            .read()
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    async fn create_transaction(
        &self,
        inputs: &[TxInput],
        outputs: &[TxOutput],
        lock_time: u32,
        replaceable: bool,
    ) -> Result<TransactionBlob> {
        let sequence = if replaceable {
            REPLACEABLE_SEQUENCE
        } else {
            FINAL_SEQUENCE
        };
        let tx = PartialTransaction {
            version: TX_VERSION,
            lock_time,
            inputs: inputs
                .iter()
                .map(|i| TxInput::new(i.previous_output.clone(), i.amount, sequence))
                .collect(),
            outputs: outputs.to_vec(),
        };
        tx.to_blob()
    }

    async fn process_transaction(
        &self,
        blob: &TransactionBlob,
        sign: bool,
        policy: SighashPolicy,
    ) -> Result<TransactionBlob> {
        let mut tx = PartialTransaction::from_blob(blob)?;
        if !sign {
            return tx.to_blob();
        }

        let owned: Vec<usize> = tx
            .inputs
            .iter()
            .enumerate()
            .filter(|(_, i)| self.owns(&i.previous_output))
            .map(|(idx, _)| idx)
            .collect();
        if owned.is_empty() {
            return Err(ExchangeError::SigningFailed {
                step: "process_transaction".to_string(),
                reason: "wallet owns none of the inputs".to_string(),
            });
        }

        for idx in owned {
            sign_input(&mut tx, idx, &self.keypair, policy).map_err(|e| {
                ExchangeError::SigningFailed {
                    step: "process_transaction".to_string(),
                    reason: e.to_string(),
                }
            })?;
        }
        debug!(%policy, inputs = tx.inputs.len(), "memory wallet signed transaction");
        tx.to_blob()
    }

    async fn decode_transaction(&self, blob: &TransactionBlob) -> Result<PartialTransaction> {
        PartialTransaction::from_blob(blob)
    }
}
