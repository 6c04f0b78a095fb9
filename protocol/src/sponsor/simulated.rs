//! In-process fee sponsor.
//!
//! Behaves like the remote service: appends one fee-paying input and one
//! change output to whatever the customer submits, signs its own input with
//! a full commitment, and "broadcasts" by computing the txid. A
//! [`TamperMode`] makes it misbehave in one specific way so the customer's
//! defences can be exercised.

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{AccountInfo, CreditBalance, ExchangeRecord, ExchangeState, SponsorBackend};
use crate::config::REPLACEABLE_SEQUENCE;
use crate::crypto::hash::sha256;
use crate::crypto::keys::KeyPair;
use crate::error::{ExchangeError, Result};
use crate::transaction::sighash::{sign_input, verify_input};
use crate::transaction::{
    Asset, Coin, OutPoint, PartialTransaction, SighashPolicy, TransactionBlob, TxInput, TxOutput,
};

/// Value returned to the sponsor as change on every exchange.
const CHANGE_VALUE: u64 = 100_000;

/// Fee credit a new simulated account starts with.
const DEFAULT_CREDIT: u64 = 1_000_000_000;

/// Address written over the customer's destination by
/// [`TamperMode::RedirectDestination`].
pub const ATTACKER_ADDRESS: &str = "sbx1attacker";

/// How the simulated sponsor misbehaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TamperMode {
    /// Honest.
    #[default]
    None,
    /// Rewrite the customer's output address when adding the fee.
    RedirectDestination,
    /// Skim one base unit off the customer's output when adding the fee.
    AlterAmount,
    /// Strip the customer's witnesses before broadcasting.
    DropCustomerSignature,
    /// Answer honestly on submit, then serve a modified blob on every re-read.
    MutateOnRefetch,
    /// Decline every submission.
    Reject,
    /// Add the coins given to [`SimulatedSponsor::with_known_coin`] as extra
    /// fee inputs, paying their value to [`ATTACKER_ADDRESS`].
    SpendCustomerCoin,
}

#[derive(Debug, Default)]
struct Ledger {
    credit: u64,
    reserved: u64,
    interactive: Vec<ExchangeRecord>,
    non_interactive: Vec<ExchangeRecord>,
}

pub struct SimulatedSponsor {
    asset: Asset,
    fee: u64,
    keypair: KeyPair,
    account_id: String,
    tamper: TamperMode,
    known_coins: Vec<Coin>,
    ledger: Mutex<Ledger>,
}

impl SimulatedSponsor {
    /// A sponsor on `asset` charging `fee` base units per exchange.
    pub fn new(asset: Asset, fee: u64) -> Self {
        let keypair = KeyPair::generate();
        let account_id = format!("acct-{}", &keypair.public_key().to_hex()[..16]);
        Self {
            asset,
            fee,
            keypair,
            account_id,
            tamper: TamperMode::None,
            known_coins: Vec::new(),
            ledger: Mutex::new(Ledger {
                credit: DEFAULT_CREDIT,
                ..Ledger::default()
            }),
        }
    }

    pub fn with_tamper(mut self, tamper: TamperMode) -> Self {
        self.tamper = tamper;
        self
    }

    /// A coin of the customer's the sponsor learned about out of band.
    pub fn with_known_coin(mut self, coin: Coin) -> Self {
        self.known_coins.push(coin);
        self
    }

    pub fn with_credit(self, credit: u64) -> Self {
        self.ledger.lock().credit = credit;
        self
    }

    pub fn fee(&self) -> u64 {
        self.fee
    }

    /// Where the sponsor's change goes.
    pub fn address(&self) -> String {
        self.keypair.address()
    }

    fn reject(
        &self,
        asset: &Asset,
        id: &str,
        step: &str,
        reason: impl Into<String>,
    ) -> ExchangeError {
        let reason = reason.into();
        warn!(step, id, %reason, "simulated sponsor rejecting");
        ExchangeError::ExchangeRejected {
            asset: asset.to_string(),
            id: id.to_string(),
            step: step.to_string(),
            reason,
        }
    }

    fn admit(&self, asset: &Asset, step: &str) -> Result<()> {
        if self.tamper == TamperMode::Reject {
            return Err(self.reject(asset, "", step, "sponsorship declined"));
        }
        if asset != &self.asset {
            return Err(self.reject(asset, "", step, format!("unsupported asset {asset}")));
        }
        let ledger = self.ledger.lock();
        if ledger.credit.saturating_sub(ledger.reserved) < self.fee {
            return Err(self.reject(asset, "", step, "insufficient fee credit"));
        }
        Ok(())
    }

    fn decode(
        &self,
        asset: &Asset,
        id: &str,
        step: &str,
        blob: &TransactionBlob,
    ) -> Result<PartialTransaction> {
        let tx = PartialTransaction::from_blob(blob)
            .map_err(|e| self.reject(asset, id, step, e.to_string()))?;
        if tx.inputs.is_empty() || tx.outputs.is_empty() {
            return Err(self.reject(asset, id, step, "transaction has no inputs or outputs"));
        }
        Ok(tx)
    }

    /// Append the fee input and change output. Returns the fee input index.
    fn augment(&self, tx: &mut PartialTransaction, id: &str) -> usize {
        let mut seed = self.account_id.clone().into_bytes();
        seed.extend_from_slice(id.as_bytes());
        tx.inputs.push(TxInput::new(
            OutPoint::new(hex::encode(sha256(&seed)), 0),
            self.fee + CHANGE_VALUE,
            REPLACEABLE_SEQUENCE,
        ));
        tx.outputs.push(TxOutput::new(self.address(), CHANGE_VALUE));
        tx.inputs.len() - 1
    }

    fn tamper_on_augment(&self, tx: &mut PartialTransaction) {
        if self.tamper == TamperMode::SpendCustomerCoin {
            for coin in &self.known_coins {
                tx.inputs.push(TxInput::new(
                    coin.outpoint.clone(),
                    coin.amount,
                    REPLACEABLE_SEQUENCE,
                ));
                tx.outputs.push(TxOutput::new(ATTACKER_ADDRESS, coin.amount));
            }
            return;
        }
        let Some(customer_output) = tx.outputs.first_mut() else {
            return;
        };
        match self.tamper {
            TamperMode::RedirectDestination => {
                customer_output.address = ATTACKER_ADDRESS.to_string();
            }
            TamperMode::AlterAmount => {
                customer_output.amount = customer_output.amount.saturating_sub(1);
            }
            _ => {}
        }
    }

    fn tamper_on_broadcast(&self, tx: &mut PartialTransaction, sponsor_input: usize) {
        if self.tamper == TamperMode::DropCustomerSignature {
            for (idx, input) in tx.inputs.iter_mut().enumerate() {
                if idx != sponsor_input {
                    input.witness = None;
                }
            }
        }
    }

    /// Apply [`TamperMode::MutateOnRefetch`] to a stored record.
    fn serve(&self, mut record: ExchangeRecord) -> Result<ExchangeRecord> {
        if self.tamper == TamperMode::MutateOnRefetch {
            let mut tx = PartialTransaction::from_blob(&record.blob)?;
            if let Some(out) = tx.outputs.first_mut() {
                out.address = ATTACKER_ADDRESS.to_string();
            }
            record.blob = tx.to_blob()?;
        }
        Ok(record)
    }

    fn sign_and_broadcast(
        &self,
        asset: &Asset,
        id: &str,
        step: &str,
        mut tx: PartialTransaction,
        sponsor_input: usize,
    ) -> Result<(TransactionBlob, String)> {
        sign_input(&mut tx, sponsor_input, &self.keypair, SighashPolicy::All)
            .map_err(|e| self.reject(asset, id, step, e.to_string()))?;
        let txid = tx.compute_txid();
        self.tamper_on_broadcast(&mut tx, sponsor_input);
        Ok((tx.to_blob()?, txid))
    }

    /// Every input other than `skip` must carry a verifying witness.
    fn check_customer_witnesses(
        &self,
        asset: &Asset,
        id: &str,
        step: &str,
        tx: &PartialTransaction,
        skip: Option<usize>,
        required_policy: Option<SighashPolicy>,
    ) -> Result<()> {
        for idx in (0..tx.inputs.len()).filter(|i| Some(*i) != skip) {
            verify_input(tx, idx).map_err(|e| self.reject(asset, id, step, e.to_string()))?;
            if let (Some(required), Some(witness)) = (required_policy, &tx.inputs[idx].witness) {
                if witness.policy != required {
                    return Err(self.reject(
                        asset,
                        id,
                        step,
                        format!("input {idx} must be signed {required}, got {}", witness.policy),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SponsorBackend for SimulatedSponsor {
    async fn account(&self) -> Result<AccountInfo> {
        Ok(AccountInfo {
            account_id: self.account_id.clone(),
            label: Some("simulated sponsor".to_string()),
        })
    }

    async fn credit(&self, asset: &Asset) -> Result<CreditBalance> {
        if asset != &self.asset {
            return Err(self.reject(asset, "", "credit", format!("unsupported asset {asset}")));
        }
        let ledger = self.ledger.lock();
        Ok(CreditBalance {
            asset: asset.clone(),
            available: ledger.credit.saturating_sub(ledger.reserved),
            reserved: ledger.reserved,
        })
    }

    async fn create_exchange(
        &self,
        asset: &Asset,
        blob: &TransactionBlob,
    ) -> Result<ExchangeRecord> {
        const STEP: &str = "create_exchange";
        self.admit(asset, STEP)?;
        let id = Uuid::new_v4().to_string();
        let mut tx = self.decode(asset, &id, STEP, blob)?;
        if tx.fee() != Some(0) {
            return Err(self.reject(asset, &id, STEP, "candidate must carry zero fee"));
        }

        self.augment(&mut tx, &id);
        self.tamper_on_augment(&mut tx);

        let record = ExchangeRecord {
            asset: asset.clone(),
            id: id.clone(),
            state: ExchangeState::FeeAdded,
            blob: tx.to_blob()?,
            txid: None,
        };
        {
            let mut ledger = self.ledger.lock();
            ledger.reserved += self.fee;
            ledger.interactive.push(record.clone());
        }
        debug!(%id, inputs = tx.inputs.len(), outputs = tx.outputs.len(), "fee added");
        Ok(record)
    }

    async fn read_exchange(&self, asset: &Asset, id: &str) -> Result<ExchangeRecord> {
        let found = self
            .ledger
            .lock()
            .interactive
            .iter()
            .find(|r| &r.asset == asset && r.id == id)
            .cloned();
        match found {
            Some(record) => self.serve(record),
            None => Err(self.reject(asset, id, "read_exchange", "unknown exchange")),
        }
    }

    async fn update_exchange(
        &self,
        asset: &Asset,
        id: &str,
        blob: &TransactionBlob,
    ) -> Result<ExchangeRecord> {
        const STEP: &str = "update_exchange";
        let stored = self
            .ledger
            .lock()
            .interactive
            .iter()
            .find(|r| &r.asset == asset && r.id == id)
            .cloned()
            .ok_or_else(|| self.reject(asset, id, STEP, "unknown exchange"))?;
        if stored.state != ExchangeState::FeeAdded {
            return Err(self.reject(asset, id, STEP, format!("exchange is {}", stored.state)));
        }

        let ours = PartialTransaction::from_blob(&stored.blob)?;
        let signed = self.decode(asset, id, STEP, blob)?;
        if signed.signable_bytes() != ours.signable_bytes() {
            return Err(self.reject(asset, id, STEP, "transaction structure changed"));
        }
        let sponsor_input = signed.inputs.len() - 1;
        self.check_customer_witnesses(asset, id, STEP, &signed, Some(sponsor_input), None)?;

        let (blob, txid) = self.sign_and_broadcast(asset, id, STEP, signed, sponsor_input)?;
        let mut ledger = self.ledger.lock();
        ledger.reserved = ledger.reserved.saturating_sub(self.fee);
        ledger.credit = ledger.credit.saturating_sub(self.fee);
        let record = ledger
            .interactive
            .iter_mut()
            .find(|r| &r.asset == asset && r.id == id)
            .ok_or_else(|| self.reject(asset, id, STEP, "unknown exchange"))?;
        record.state = ExchangeState::Broadcast;
        record.blob = blob;
        record.txid = Some(txid.clone());
        info!(%id, %txid, "simulated broadcast");
        Ok(record.clone())
    }

    async fn list_exchanges(&self) -> Result<Vec<ExchangeRecord>> {
        Ok(self.ledger.lock().interactive.clone())
    }

    async fn create_exchange_final(
        &self,
        asset: &Asset,
        blob: &TransactionBlob,
    ) -> Result<ExchangeRecord> {
        const STEP: &str = "create_exchange_final";
        self.admit(asset, STEP)?;
        let id = Uuid::new_v4().to_string();
        let mut tx = self.decode(asset, &id, STEP, blob)?;

        let partial = Some(SighashPolicy::SingleAnyoneCanPay);
        self.check_customer_witnesses(asset, &id, STEP, &tx, None, partial)?;

        let sponsor_input = self.augment(&mut tx, &id);
        // The customer's signatures must survive the fee input and change output.
        self.check_customer_witnesses(asset, &id, STEP, &tx, Some(sponsor_input), partial)?;
        self.tamper_on_augment(&mut tx);

        let (blob, txid) = self.sign_and_broadcast(asset, &id, STEP, tx, sponsor_input)?;
        let record = ExchangeRecord {
            asset: asset.clone(),
            id: id.clone(),
            state: ExchangeState::Broadcast,
            blob,
            txid: Some(txid.clone()),
        };
        {
            let mut ledger = self.ledger.lock();
            ledger.credit = ledger.credit.saturating_sub(self.fee);
            ledger.non_interactive.push(record.clone());
        }
        info!(%id, %txid, "simulated broadcast (non-interactive)");
        Ok(record)
    }

    async fn read_exchange_final(&self, asset: &Asset, id: &str) -> Result<ExchangeRecord> {
        let found = self
            .ledger
            .lock()
            .non_interactive
            .iter()
            .find(|r| &r.asset == asset && r.id == id)
            .cloned();
        match found {
            Some(record) => self.serve(record),
            None => Err(self.reject(asset, id, "read_exchange_final", "unknown exchange")),
        }
    }

    async fn list_exchanges_final(&self) -> Result<Vec<ExchangeRecord>> {
        Ok(self.ledger.lock().non_interactive.clone())
    }
}
