//! Signature commitment policies.
//!
//! A policy decides which parts of a transaction an input's signature binds
//! to, and therefore which later edits invalidate it:
//!
//! | Policy | Flag | Binds |
//! |---|---|---|
//! | [`SighashPolicy::All`] | `0x01` | every input and every output |
//! | [`SighashPolicy::SingleAnyoneCanPay`] | `0x83` | the signed input and the output at the same index |
//!
//! `SingleAnyoneCanPay` is what makes the non-interactive flow work: the
//! customer signs before the sponsor has added anything, the sponsor may
//! append its own inputs and outputs, and the customer's signature still
//! verifies because none of the appended data is in its digest. The paired
//! output is in the digest, so the sponsor cannot redirect the customer's
//! funds.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use super::builder::{encode_input, encode_output, PartialTransaction};
use super::types::InputWitness;
use crate::crypto::hash::double_sha256_array;
use crate::crypto::keys::{KeyPair, PublicKey, Signature};

/// Domain tag prefixed to every signing digest.
const SIGHASH_TAG: &[u8] = b"feesponsor/sighash/v1";

/// Signature commitment scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SighashPolicy {
    /// Full commitment.
    #[serde(rename = "ALL")]
    All,
    /// Partial, single-input exclusive commitment.
    #[serde(rename = "SINGLE|ANYONECANPAY")]
    SingleAnyoneCanPay,
}

impl SighashPolicy {
    /// Wire byte appended to signatures on UTXO ledgers.
    pub fn flag_byte(self) -> u8 {
        match self {
            Self::All => 0x01,
            Self::SingleAnyoneCanPay => 0x83,
        }
    }

    /// The `sighashtype` string wallet RPCs expect.
    pub fn wallet_flag(self) -> &'static str {
        match self {
            Self::All => "ALL",
            Self::SingleAnyoneCanPay => "SINGLE|ANYONECANPAY",
        }
    }

    /// Whether the signature binds every input and output.
    pub fn is_full(self) -> bool {
        matches!(self, Self::All)
    }
}

impl fmt::Display for SighashPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wallet_flag())
    }
}

/// Why an input witness does not verify.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WitnessError {
    #[error("input {index} does not exist (transaction has {count} inputs)")]
    InputOutOfRange { index: usize, count: usize },

    #[error("input {index} has no paired output for SINGLE|ANYONECANPAY")]
    NoPairedOutput { index: usize },

    #[error("input {index} is unsigned")]
    MissingWitness { index: usize },

    #[error("input {index} witness is malformed: {reason}")]
    MalformedWitness { index: usize, reason: String },

    #[error("input {index} signature does not verify")]
    InvalidSignature { index: usize },
}

/// The 32-byte message a signature on `tx.inputs[index]` binds under `policy`.
pub fn signing_digest(
    tx: &PartialTransaction,
    index: usize,
    policy: SighashPolicy,
) -> Result<[u8; 32], WitnessError> {
    let input = tx.inputs.get(index).ok_or(WitnessError::InputOutOfRange {
        index,
        count: tx.inputs.len(),
    })?;

    let mut buf = Vec::with_capacity(256);
    buf.extend_from_slice(SIGHASH_TAG);
    buf.push(policy.flag_byte());
    buf.extend_from_slice(&tx.version.to_le_bytes());
    buf.extend_from_slice(&tx.lock_time.to_le_bytes());

    match policy {
        SighashPolicy::All => {
            buf.extend_from_slice(&(index as u32).to_le_bytes());
            buf.extend_from_slice(&(tx.inputs.len() as u32).to_le_bytes());
            for i in &tx.inputs {
                encode_input(&mut buf, i);
            }
            buf.extend_from_slice(&(tx.outputs.len() as u32).to_le_bytes());
            for o in &tx.outputs {
                encode_output(&mut buf, o);
            }
        }
        SighashPolicy::SingleAnyoneCanPay => {
            let paired = tx
                .outputs
                .get(index)
                .ok_or(WitnessError::NoPairedOutput { index })?;
            encode_input(&mut buf, input);
            encode_output(&mut buf, paired);
        }
    }

    Ok(double_sha256_array(&buf))
}

/// Sign `tx.inputs[index]` under `policy`, replacing any existing witness.
pub fn sign_input(
    tx: &mut PartialTransaction,
    index: usize,
    keypair: &KeyPair,
    policy: SighashPolicy,
) -> Result<(), WitnessError> {
    let digest = signing_digest(tx, index, policy)?;
    let signature = keypair.sign(&digest);
    tx.inputs[index].witness = Some(InputWitness {
        policy,
        public_key: keypair.public_key().to_hex(),
        signature: signature.to_hex(),
    });
    Ok(())
}

/// Check that the witness on `tx.inputs[index]` verifies against the
/// transaction as it is now.
pub fn verify_input(tx: &PartialTransaction, index: usize) -> Result<(), WitnessError> {
    let input = tx.inputs.get(index).ok_or(WitnessError::InputOutOfRange {
        index,
        count: tx.inputs.len(),
    })?;
    let witness = input
        .witness
        .as_ref()
        .ok_or(WitnessError::MissingWitness { index })?;

    let public_key =
        PublicKey::from_hex(&witness.public_key).map_err(|e| WitnessError::MalformedWitness {
            index,
            reason: e.to_string(),
        })?;
    let signature =
        Signature::from_hex(&witness.signature).map_err(|e| WitnessError::MalformedWitness {
            index,
            reason: e.to_string(),
        })?;

    let digest = signing_digest(tx, index, witness.policy)?;
    if public_key.verify(&digest, &signature) {
        Ok(())
    } else {
        Err(WitnessError::InvalidSignature { index })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::REPLACEABLE_SEQUENCE;
    use crate::transaction::types::{OutPoint, TxInput, TxOutput};

    fn customer_tx() -> PartialTransaction {
        PartialTransaction {
            version: 2,
            lock_time: 0,
            inputs: vec![TxInput::new(
                OutPoint::new("aa".repeat(32), 0),
                50_000_000,
                REPLACEABLE_SEQUENCE,
            )],
            outputs: vec![TxOutput::new("sbx1dest", 50_000_000)],
        }
    }

    /// What a sponsor does: append a fee input and a change output.
    fn augment(tx: &mut PartialTransaction) {
        tx.inputs.push(TxInput::new(
            OutPoint::new("bb".repeat(32), 1),
            10_000,
            REPLACEABLE_SEQUENCE,
        ));
        tx.outputs.push(TxOutput::new("sbx1change", 9_000));
    }

    #[test]
    fn policy_flags() {
        assert_eq!(SighashPolicy::All.flag_byte(), 0x01);
        assert_eq!(SighashPolicy::SingleAnyoneCanPay.flag_byte(), 0x83);
        assert_eq!(SighashPolicy::SingleAnyoneCanPay.to_string(), "SINGLE|ANYONECANPAY");
        assert!(SighashPolicy::All.is_full());
        assert!(!SighashPolicy::SingleAnyoneCanPay.is_full());
        assert_eq!(
            serde_json::to_string(&SighashPolicy::SingleAnyoneCanPay).unwrap(),
            "\"SINGLE|ANYONECANPAY\""
        );
    }

    #[test]
    fn partial_commitment_survives_augmentation() {
        let kp = KeyPair::from_seed(&[1u8; 32]);
        let mut tx = customer_tx();
        sign_input(&mut tx, 0, &kp, SighashPolicy::SingleAnyoneCanPay).unwrap();
        assert!(verify_input(&tx, 0).is_ok());

        augment(&mut tx);
        assert!(verify_input(&tx, 0).is_ok());

        // Any number of further sponsor edits is still fine.
        augment(&mut tx);
        assert!(verify_input(&tx, 0).is_ok());
    }

    #[test]
    fn full_commitment_breaks_on_augmentation() {
        let kp = KeyPair::from_seed(&[1u8; 32]);
        let mut tx = customer_tx();
        sign_input(&mut tx, 0, &kp, SighashPolicy::All).unwrap();
        assert!(verify_input(&tx, 0).is_ok());

        augment(&mut tx);
        assert_eq!(
            verify_input(&tx, 0),
            Err(WitnessError::InvalidSignature { index: 0 })
        );
    }

    #[test]
    fn partial_commitment_binds_paired_output() {
        let kp = KeyPair::from_seed(&[1u8; 32]);
        let mut tx = customer_tx();
        sign_input(&mut tx, 0, &kp, SighashPolicy::SingleAnyoneCanPay).unwrap();

        let mut redirected = tx.clone();
        redirected.outputs[0].address = "sbx1thief".to_string();
        assert!(verify_input(&redirected, 0).is_err());

        let mut skimmed = tx.clone();
        skimmed.outputs[0].amount -= 1;
        assert!(verify_input(&skimmed, 0).is_err());
    }

    #[test]
    fn single_without_paired_output_fails() {
        let mut tx = customer_tx();
        tx.outputs.clear();
        assert_eq!(
            signing_digest(&tx, 0, SighashPolicy::SingleAnyoneCanPay),
            Err(WitnessError::NoPairedOutput { index: 0 })
        );
    }

    #[test]
    fn unsigned_and_out_of_range_inputs() {
        let tx = customer_tx();
        assert_eq!(
            verify_input(&tx, 0),
            Err(WitnessError::MissingWitness { index: 0 })
        );
        assert_eq!(
            verify_input(&tx, 4),
            Err(WitnessError::InputOutOfRange { index: 4, count: 1 })
        );
    }

    #[test]
    fn garbage_witness_is_malformed() {
        let mut tx = customer_tx();
        tx.inputs[0].witness = Some(InputWitness {
            policy: SighashPolicy::All,
            public_key: "xyz".to_string(),
            signature: "00".to_string(),
        });
        assert!(matches!(
            verify_input(&tx, 0),
            Err(WitnessError::MalformedWitness { index: 0, .. })
        ));
    }

    #[test]
    fn digests_differ_by_policy() {
        let tx = customer_tx();
        let all = signing_digest(&tx, 0, SighashPolicy::All).unwrap();
        let single = signing_digest(&tx, 0, SighashPolicy::SingleAnyoneCanPay).unwrap();
        assert_ne!(all, single);
    }
}
