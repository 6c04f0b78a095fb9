//! # Signing Orchestrator
//!
//! Chooses the signature commitment for each protocol step and asks the
//! wallet to apply it:
//!
//! | Step | Policy | Precondition |
//! |---|---|---|
//! | [`SigningStep::InteractiveFinalize`] | `ALL` | a [`Verified`] sponsor record |
//! | [`SigningStep::NonInteractivePreSign`] | `SINGLE\|ANYONECANPAY` | an unsubmitted candidate |
//!
//! After signing, the result is decoded and every customer input must carry
//! a witness under the step's policy. No other input may have gained or
//! changed a witness. Any failure is fatal to the run.

use std::fmt;
use tracing::{error, info};

use crate::error::{ExchangeError, Result};
use crate::transaction::{
    CandidateTransaction, OutPoint, PartialTransaction, SighashPolicy, TransactionBlob,
};
use crate::verifier::{CustomerCommitments, Verified};
use crate::wallet::{TransactionAdapter, WalletBackend};

/// A protocol step that produces customer signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SigningStep {
    /// Interactive round 2, after the sponsor's additions were verified.
    InteractiveFinalize,
    /// Non-interactive round 1, before the sponsor sees the transaction.
    NonInteractivePreSign,
}

impl SigningStep {
    pub fn policy(self) -> SighashPolicy {
        match self {
            Self::InteractiveFinalize => SighashPolicy::All,
            Self::NonInteractivePreSign => SighashPolicy::SingleAnyoneCanPay,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::InteractiveFinalize => "interactive_finalize",
            Self::NonInteractivePreSign => "non_interactive_presign",
        }
    }
}

impl fmt::Display for SigningStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wallet output of a signing step, blob and decoded form.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    pub blob: TransactionBlob,
    pub transaction: PartialTransaction,
}

pub struct SigningOrchestrator<'a, W> {
    adapter: &'a TransactionAdapter<W>,
}

impl<'a, W: WalletBackend> SigningOrchestrator<'a, W> {
    pub fn new(adapter: &'a TransactionAdapter<W>) -> Self {
        Self { adapter }
    }

    /// Full commitment over the verified sponsor transaction.
    pub async fn sign_full(
        &self,
        verified: &Verified,
        commitments: &CustomerCommitments,
    ) -> Result<SignedTransaction> {
        let customer: Vec<&OutPoint> = commitments
            .inputs()
            .iter()
            .map(|i| &i.previous_output)
            .collect();
        self.sign(
            SigningStep::InteractiveFinalize,
            &verified.record().blob,
            verified.transaction(),
            &customer,
        )
        .await
    }

    /// Partial, input-exclusive commitment over the candidate, so the
    /// signatures survive the sponsor's later additions.
    pub async fn sign_partial(
        &self,
        candidate: &CandidateTransaction,
    ) -> Result<SignedTransaction> {
        let customer: Vec<&OutPoint> = candidate
            .transaction()
            .inputs
            .iter()
            .map(|i| &i.previous_output)
            .collect();
        self.sign(
            SigningStep::NonInteractivePreSign,
            candidate.blob(),
            candidate.transaction(),
            &customer,
        )
        .await
    }

    async fn sign(
        &self,
        step: SigningStep,
        blob: &TransactionBlob,
        unsigned: &PartialTransaction,
        customer: &[&OutPoint],
    ) -> Result<SignedTransaction> {
        let policy = step.policy();
        let failed = |reason: String| {
            error!(%step, %policy, %reason, "signing failed");
            ExchangeError::SigningFailed {
                step: step.to_string(),
                reason,
            }
        };

        let signed = self
            .adapter
            .process(blob, policy)
            .await
            .map_err(|e| match e {
                ExchangeError::NetworkFailure { .. } => e,
                other => failed(other.to_string()),
            })?;
        let transaction = self.adapter.decode(&signed).await?;

        for outpoint in customer {
            let (_, input) = transaction
                .find_input(outpoint)
                .ok_or_else(|| failed(format!("input {outpoint} vanished while signing")))?;
            match &input.witness {
                Some(w) if w.policy == policy => {}
                Some(w) => {
                    return Err(failed(format!(
                        "input {outpoint} signed {} instead of {policy}",
                        w.policy
                    )))
                }
                None => return Err(failed(format!("wallet left input {outpoint} unsigned"))),
            }
        }

        for (idx, input) in transaction.inputs.iter().enumerate() {
            if customer.contains(&&input.previous_output) {
                continue;
            }
            let before = unsigned.inputs.get(idx).and_then(|i| i.witness.as_ref());
            if input.witness.as_ref() != before {
                return Err(failed(format!(
                    "wallet signed non-customer input {}",
                    input.previous_output
                )));
            }
        }

        info!(%step, %policy, inputs = customer.len(), "customer inputs signed");
        Ok(SignedTransaction {
            blob: signed,
            transaction,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;
    use crate::sponsor::simulated::ATTACKER_ADDRESS;
    use crate::sponsor::{ExchangeRecord, ExchangeState};
    use crate::transaction::sighash::verify_input;
    use crate::transaction::{Asset, Coin, OutPoint, TxInput, TxOutput};
    use crate::verifier::verify;
    use crate::wallet::{CoinSelection, MemoryWallet};

    async fn funded(coins: &[u64]) -> (TransactionAdapter<MemoryWallet>, CandidateTransaction) {
        let wallet = MemoryWallet::new(KeyPair::from_seed(&[4u8; 32]));
        for amount in coins {
            wallet.fund(*amount);
        }
        let adapter = TransactionAdapter::new(wallet);
        let candidate = adapter.build_candidate(None, "sbx1dest").await.unwrap();
        (adapter, candidate)
    }

    #[test]
    fn steps_map_to_fixed_policies() {
        assert_eq!(SigningStep::InteractiveFinalize.policy(), SighashPolicy::All);
        assert_eq!(
            SigningStep::NonInteractivePreSign.policy(),
            SighashPolicy::SingleAnyoneCanPay
        );
    }

    #[tokio::test]
    async fn partial_signature_survives_sponsor_additions() {
        let (adapter, candidate) = funded(&[50_000_000]).await;
        let signed = SigningOrchestrator::new(&adapter)
            .sign_partial(&candidate)
            .await
            .unwrap();

        let mut tx = signed.transaction.clone();
        tx.inputs.push(TxInput::new(OutPoint::new("bb".repeat(32), 0), 5_000, 0));
        tx.outputs.push(TxOutput::new("sbx1sponsor", 4_000));
        assert!(verify_input(&tx, 0).is_ok());
    }

    #[tokio::test]
    async fn partial_signing_multi_coin_sweep_fails() {
        // Only input 0 has a paired output under SINGLE.
        let (adapter, candidate) = funded(&[10_000, 20_000]).await;
        let err = SigningOrchestrator::new(&adapter)
            .sign_partial(&candidate)
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::SigningFailed { .. }));
    }

    #[tokio::test]
    async fn partial_signing_single_coin_from_multi_coin_wallet() {
        let (adapter, _) = funded(&[10_000, 20_000]).await;
        let candidate = adapter
            .build_candidate_with(None, "sbx1dest", CoinSelection::LargestCoin)
            .await
            .unwrap();
        let signed = SigningOrchestrator::new(&adapter)
            .sign_partial(&candidate)
            .await
            .unwrap();
        assert_eq!(signed.transaction.inputs.len(), 1);
        assert!(verify_input(&signed.transaction, 0).is_ok());
    }

    #[tokio::test]
    async fn full_signing_refuses_to_sign_other_wallet_coins() {
        let (adapter, candidate) = funded(&[50_000_000]).await;
        let pending = Coin {
            outpoint: OutPoint::new("cc".repeat(32), 1),
            address: adapter.wallet().address(),
            amount: 70_000_000,
            confirmations: 0,
            spendable: true,
        };
        adapter.wallet().add_coin(pending.clone());
        // Commitments without the wallet's other coins reserved.
        let commitments = CustomerCommitments::from_candidate(&candidate);

        let mut augmented = candidate.transaction().clone();
        augmented
            .inputs
            .push(TxInput::new(pending.outpoint.clone(), pending.amount, 0));
        augmented
            .outputs
            .push(TxOutput::new(ATTACKER_ADDRESS, pending.amount));
        let record = ExchangeRecord {
            asset: Asset::new("BTC"),
            id: "ex-1".to_string(),
            state: ExchangeState::FeeAdded,
            blob: augmented.to_blob().unwrap(),
            txid: None,
        };
        let verified = verify(&commitments, &record, record.clone(), augmented, "fetch").unwrap();

        match SigningOrchestrator::new(&adapter)
            .sign_full(&verified, &commitments)
            .await
        {
            Err(ExchangeError::SigningFailed { step, reason }) => {
                assert_eq!(step, "interactive_finalize");
                assert!(reason.contains(&pending.outpoint.to_string()));
            }
            other => panic!("expected SigningFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn full_signature_over_verified_record() {
        let (adapter, candidate) = funded(&[50_000_000]).await;
        let commitments = CustomerCommitments::from_candidate(&candidate);

        let mut augmented = candidate.transaction().clone();
        augmented
            .inputs
            .push(TxInput::new(OutPoint::new("bb".repeat(32), 0), 5_000, 0));
        augmented.outputs.push(TxOutput::new("sbx1sponsor", 4_000));
        let record = ExchangeRecord {
            asset: Asset::new("BTC"),
            id: "ex-1".to_string(),
            state: ExchangeState::FeeAdded,
            blob: augmented.to_blob().unwrap(),
            txid: None,
        };
        let verified = verify(&commitments, &record, record.clone(), augmented, "fetch").unwrap();

        let signed = SigningOrchestrator::new(&adapter)
            .sign_full(&verified, &commitments)
            .await
            .unwrap();
        let customer = &signed.transaction.inputs[0];
        assert_eq!(customer.witness.as_ref().unwrap().policy, SighashPolicy::All);
        assert!(!signed.transaction.inputs[1].is_signed());
        assert!(verify_input(&signed.transaction, 0).is_ok());
    }
}
