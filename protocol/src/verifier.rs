//! # Commitment Verifier
//!
//! Runs after every sponsor response and before any further signing. Two
//! checks, both of which must pass:
//!
//! 1. [`verify_record`]: the re-fetched record is identical to the one the
//!    sponsor returned for the step (asset, id, state, blob).
//! 2. [`verify_customer_commitments`]: version, lock time and every
//!    customer input and output are present and unchanged in the sponsor's
//!    transaction. Sponsor-added inputs and outputs are allowed, unless an
//!    added input spends a coin the customer's wallet holds. Order is not
//!    significant.
//!
//! Only [`verify`] runs both, and only it produces a [`Verified`] token.
//! Full-commitment signing takes that token, so it cannot be reached
//! without a passing verification.

use tracing::{debug, warn};

use crate::error::{ExchangeError, Result};
use crate::sponsor::ExchangeRecord;
use crate::transaction::{CandidateTransaction, OutPoint, PartialTransaction, TxInput, TxOutput};

/// The parts of a transaction the customer contributed and must see
/// unchanged in every sponsor response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustomerCommitments {
    version: u32,
    lock_time: u32,
    inputs: Vec<TxInput>,
    outputs: Vec<TxOutput>,
    /// Wallet coins outside the candidate. None may appear as a sponsor input.
    reserved: Vec<OutPoint>,
}

impl CustomerCommitments {
    pub fn from_candidate(candidate: &CandidateTransaction) -> Self {
        let tx = candidate.transaction();
        Self {
            version: tx.version,
            lock_time: tx.lock_time,
            inputs: tx.inputs.clone(),
            outputs: tx.outputs.clone(),
            reserved: Vec::new(),
        }
    }

    /// Reserve every coin the customer's wallet holds. The wallet signs all
    /// inputs it owns, so a sponsor input spending one of them would be
    /// signed away with the customer's own.
    pub fn with_wallet_outpoints(mut self, owned: impl IntoIterator<Item = OutPoint>) -> Self {
        let spent: Vec<&OutPoint> = self.inputs.iter().map(|i| &i.previous_output).collect();
        self.reserved = owned.into_iter().filter(|o| !spent.contains(&o)).collect();
        self
    }

    /// Pin the customer's own witnesses from `signed`. After this, a sponsor
    /// response that drops or replaces one of them fails verification.
    pub fn with_witnesses_from(mut self, signed: &PartialTransaction) -> Self {
        for input in &mut self.inputs {
            if let Some((_, theirs)) = signed.find_input(&input.previous_output) {
                input.witness = theirs.witness.clone();
            }
        }
        self
    }

    pub fn inputs(&self) -> &[TxInput] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TxOutput] {
        &self.outputs
    }
}

/// Proof that a sponsor record passed both checks. Only [`verify`]
/// constructs one.
#[derive(Debug, Clone)]
pub struct Verified {
    record: ExchangeRecord,
    transaction: PartialTransaction,
}

impl Verified {
    pub fn record(&self) -> &ExchangeRecord {
        &self.record
    }

    /// The decoded sponsor transaction that was checked.
    pub fn transaction(&self) -> &PartialTransaction {
        &self.transaction
    }

    pub fn into_record(self) -> ExchangeRecord {
        self.record
    }
}

fn tamper(record: &ExchangeRecord, step: &str, field: String) -> ExchangeError {
    warn!(asset = %record.asset, id = %record.id, step, %field, "tamper detected");
    ExchangeError::TamperDetected {
        asset: record.asset.to_string(),
        id: record.id.clone(),
        step: step.to_string(),
        field,
    }
}

/// Deep equality over asset, id, state and blob. Reports the first field
/// that differs.
pub fn verify_record(
    expected: &ExchangeRecord,
    observed: &ExchangeRecord,
    step: &str,
) -> Result<()> {
    if expected.asset != observed.asset {
        return Err(tamper(
            expected,
            step,
            format!("asset: expected {}, observed {}", expected.asset, observed.asset),
        ));
    }
    if expected.id != observed.id {
        return Err(tamper(
            expected,
            step,
            format!("id: expected {}, observed {}", expected.id, observed.id),
        ));
    }
    if expected.state != observed.state {
        return Err(tamper(
            expected,
            step,
            format!("state: expected {}, observed {}", expected.state, observed.state),
        ));
    }
    if expected.blob != observed.blob {
        return Err(tamper(expected, step, "blob".to_string()));
    }
    Ok(())
}

/// Version and lock time are unchanged. Every customer input (outpoint,
/// sequence, amount, pinned witness) appears exactly once and unchanged in
/// `observed`; every customer output appears with at least the same
/// multiplicity. No other input spends a reserved wallet coin.
pub fn verify_customer_commitments(
    commitments: &CustomerCommitments,
    observed: &PartialTransaction,
    record: &ExchangeRecord,
    step: &str,
) -> Result<()> {
    if observed.version != commitments.version {
        return Err(tamper(
            record,
            step,
            format!("version: {} -> {}", commitments.version, observed.version),
        ));
    }
    if observed.lock_time != commitments.lock_time {
        return Err(tamper(
            record,
            step,
            format!("lock_time: {} -> {}", commitments.lock_time, observed.lock_time),
        ));
    }

    for ours in &commitments.inputs {
        let outpoint = &ours.previous_output;
        let mut matching = observed
            .inputs
            .iter()
            .filter(|i| &i.previous_output == outpoint);
        let theirs = match (matching.next(), matching.next()) {
            (Some(theirs), None) => theirs,
            (None, _) => return Err(tamper(record, step, format!("input {outpoint} missing"))),
            (Some(_), Some(_)) => {
                return Err(tamper(record, step, format!("input {outpoint} duplicated")))
            }
        };
        if theirs.amount != ours.amount {
            return Err(tamper(
                record,
                step,
                format!("input {outpoint} amount: {} -> {}", ours.amount, theirs.amount),
            ));
        }
        if theirs.sequence != ours.sequence {
            return Err(tamper(
                record,
                step,
                format!("input {outpoint} sequence: {} -> {}", ours.sequence, theirs.sequence),
            ));
        }
        if ours.witness.is_some() && theirs.witness != ours.witness {
            return Err(tamper(record, step, format!("input {outpoint} witness")));
        }
    }

    if let Some(smuggled) = observed
        .inputs
        .iter()
        .map(|i| &i.previous_output)
        .find(|o| commitments.reserved.contains(o))
    {
        return Err(tamper(
            record,
            step,
            format!("input {smuggled} spends a customer wallet coin"),
        ));
    }

    let mut available: Vec<&TxOutput> = observed.outputs.iter().collect();
    for ours in &commitments.outputs {
        match available.iter().position(|o| *o == ours) {
            Some(pos) => {
                available.swap_remove(pos);
            }
            None => {
                return Err(tamper(
                    record,
                    step,
                    format!("output {} of {} missing", ours.address, ours.amount),
                ))
            }
        }
    }

    debug!(
        id = %record.id,
        step,
        sponsor_inputs = observed.inputs.len().saturating_sub(commitments.inputs.len()),
        sponsor_outputs = available.len(),
        "customer commitments intact"
    );
    Ok(())
}

/// Run both checks against the re-fetched `observed` record, whose blob
/// decodes to `observed_tx`.
pub fn verify(
    commitments: &CustomerCommitments,
    expected: &ExchangeRecord,
    observed: ExchangeRecord,
    observed_tx: PartialTransaction,
    step: &str,
) -> Result<Verified> {
    verify_record(expected, &observed, step)?;
    verify_customer_commitments(commitments, &observed_tx, &observed, step)?;
    Ok(Verified {
        record: observed,
        transaction: observed_tx,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::REPLACEABLE_SEQUENCE;
    use crate::sponsor::ExchangeState;
    use crate::transaction::{Asset, Coin, InputWitness, OutPoint, SighashPolicy};

    fn candidate() -> CandidateTransaction {
        let coin = Coin {
            outpoint: OutPoint::new("aa".repeat(32), 0),
            address: "sbx1customer".to_string(),
            amount: 50_000_000,
            confirmations: 3,
            spendable: true,
        };
        let tx = PartialTransaction {
            version: 2,
            lock_time: 0,
            inputs: vec![TxInput::new(coin.outpoint.clone(), coin.amount, REPLACEABLE_SEQUENCE)],
            outputs: vec![TxOutput::new("sbx1dest", 50_000_000)],
        };
        CandidateTransaction::new(tx.to_blob().unwrap(), tx, vec![coin]).unwrap()
    }

    fn augmented(c: &CandidateTransaction) -> PartialTransaction {
        let mut tx = c.transaction().clone();
        let fee_input =
            TxInput::new(OutPoint::new("bb".repeat(32), 2), 101_000, REPLACEABLE_SEQUENCE);
        tx.inputs.insert(0, fee_input);
        tx.outputs.push(TxOutput::new("sbx1sponsor", 100_000));
        tx
    }

    fn record(tx: &PartialTransaction) -> ExchangeRecord {
        ExchangeRecord {
            asset: Asset::new("BTC"),
            id: "ex-1".to_string(),
            state: ExchangeState::FeeAdded,
            blob: tx.to_blob().unwrap(),
            txid: None,
        }
    }

    fn field_of(err: ExchangeError) -> String {
        match err {
            ExchangeError::TamperDetected { field, .. } => field,
            other => panic!("expected TamperDetected, got {other:?}"),
        }
    }

    #[test]
    fn honest_augmentation_passes() {
        let c = candidate();
        let tx = augmented(&c);
        let rec = record(&tx);
        let verified = verify(
            &CustomerCommitments::from_candidate(&c),
            &rec,
            rec.clone(),
            tx,
            "fetch",
        )
        .unwrap();
        assert_eq!(verified.record(), &rec);
        assert_eq!(verified.transaction().inputs.len(), 2);
    }

    #[test]
    fn record_field_changes_are_reported() {
        let c = candidate();
        let rec = record(&augmented(&c));

        let mut state = rec.clone();
        state.state = ExchangeState::Broadcast;
        assert!(field_of(verify_record(&rec, &state, "fetch").unwrap_err()).starts_with("state"));

        let mut id = rec.clone();
        id.id = "ex-2".to_string();
        assert!(field_of(verify_record(&rec, &id, "fetch").unwrap_err()).starts_with("id"));

        let mut blob = rec.clone();
        blob.blob = c.blob().clone();
        assert_eq!(field_of(verify_record(&rec, &blob, "fetch").unwrap_err()), "blob");
    }

    #[test]
    fn redirected_destination_is_tamper() {
        let c = candidate();
        let mut tx = augmented(&c);
        tx.outputs[0].address = "sbx1thief".to_string();
        let field = field_of(
            verify_customer_commitments(
                &CustomerCommitments::from_candidate(&c),
                &tx,
                &record(&tx),
                "fetch",
            )
            .unwrap_err(),
        );
        assert!(field.contains("sbx1dest"));
    }

    #[test]
    fn altered_amount_and_sequence_are_tamper() {
        let c = candidate();
        let commitments = CustomerCommitments::from_candidate(&c);

        let mut skim = augmented(&c);
        skim.outputs[0].amount -= 1;
        assert!(verify_customer_commitments(&commitments, &skim, &record(&skim), "fetch").is_err());

        let mut seq = augmented(&c);
        seq.inputs[1].sequence = 0xFFFF_FFFF;
        let err =
            verify_customer_commitments(&commitments, &seq, &record(&seq), "fetch").unwrap_err();
        assert!(field_of(err).contains("sequence"));
    }

    #[test]
    fn changed_version_or_lock_time_is_tamper() {
        let c = candidate();
        let commitments = CustomerCommitments::from_candidate(&c);

        let mut locked = augmented(&c);
        locked.lock_time = 4_000_000_000;
        let field = field_of(
            verify_customer_commitments(&commitments, &locked, &record(&locked), "fetch")
                .unwrap_err(),
        );
        assert_eq!(field, "lock_time: 0 -> 4000000000");

        let mut versioned = augmented(&c);
        versioned.version = 99;
        let field = field_of(
            verify_customer_commitments(&commitments, &versioned, &record(&versioned), "fetch")
                .unwrap_err(),
        );
        assert_eq!(field, "version: 2 -> 99");
    }

    #[test]
    fn sponsor_input_spending_a_wallet_coin_is_tamper() {
        let c = candidate();
        let pending = OutPoint::new("cc".repeat(32), 1);
        let commitments = CustomerCommitments::from_candidate(&c)
            .with_wallet_outpoints(vec![c.coins()[0].outpoint.clone(), pending.clone()]);

        let honest = augmented(&c);
        let honest_record = record(&honest);
        let result = verify_customer_commitments(&commitments, &honest, &honest_record, "fetch");
        assert!(result.is_ok());

        let mut smuggled = augmented(&c);
        smuggled
            .inputs
            .push(TxInput::new(pending.clone(), 70_000_000, REPLACEABLE_SEQUENCE));
        smuggled.outputs.push(TxOutput::new("sbx1attacker", 70_000_000));
        let field = field_of(
            verify_customer_commitments(&commitments, &smuggled, &record(&smuggled), "fetch")
                .unwrap_err(),
        );
        assert_eq!(field, format!("input {pending} spends a customer wallet coin"));
    }

    #[test]
    fn missing_or_duplicated_input_is_tamper() {
        let c = candidate();
        let commitments = CustomerCommitments::from_candidate(&c);

        let mut dropped = augmented(&c);
        dropped.inputs.remove(1);
        let field = field_of(
            verify_customer_commitments(&commitments, &dropped, &record(&dropped), "fetch")
                .unwrap_err(),
        );
        assert!(field.ends_with("missing"));

        let mut doubled = augmented(&c);
        let copy = doubled.inputs[1].clone();
        doubled.inputs.push(copy);
        let field = field_of(
            verify_customer_commitments(&commitments, &doubled, &record(&doubled), "fetch")
                .unwrap_err(),
        );
        assert!(field.ends_with("duplicated"));
    }

    #[test]
    fn pinned_witness_must_survive() {
        let c = candidate();
        let mut signed = c.transaction().clone();
        signed.inputs[0].witness = Some(InputWitness {
            policy: SighashPolicy::SingleAnyoneCanPay,
            public_key: "02aa".to_string(),
            signature: "3044ff83".to_string(),
        });
        let commitments = CustomerCommitments::from_candidate(&c).with_witnesses_from(&signed);

        let mut kept = signed.clone();
        kept.outputs.push(TxOutput::new("sbx1sponsor", 1));
        let kept_record = record(&kept);
        let result = verify_customer_commitments(&commitments, &kept, &kept_record, "fetch_final");
        assert!(result.is_ok());

        let mut stripped = kept.clone();
        stripped.inputs[0].witness = None;
        let field = field_of(
            verify_customer_commitments(&commitments, &stripped, &record(&stripped), "fetch_final")
                .unwrap_err(),
        );
        assert!(field.ends_with("witness"));
    }

    #[test]
    fn duplicate_customer_outputs_need_equal_multiplicity() {
        let coin = Coin {
            outpoint: OutPoint::new("aa".repeat(32), 0),
            address: "sbx1customer".to_string(),
            amount: 20,
            confirmations: 3,
            spendable: true,
        };
        let tx = PartialTransaction {
            version: 2,
            lock_time: 0,
            inputs: vec![TxInput::new(coin.outpoint.clone(), 20, REPLACEABLE_SEQUENCE)],
            outputs: vec![TxOutput::new("sbx1dest", 10), TxOutput::new("sbx1dest", 10)],
        };
        let c = CandidateTransaction::new(tx.to_blob().unwrap(), tx.clone(), vec![coin]).unwrap();
        let commitments = CustomerCommitments::from_candidate(&c);

        let mut merged = tx;
        merged.outputs.pop();
        let merged_record = record(&merged);
        let result = verify_customer_commitments(&commitments, &merged, &merged_record, "fetch");
        assert!(result.is_err());
    }
}
