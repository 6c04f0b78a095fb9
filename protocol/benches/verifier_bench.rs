// Verifier and commitment benchmarks.
//
// Covers signing-digest computation under both policies, witness
// verification, and the customer-subset diff at growing sponsor-augmented
// transaction sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use feesponsor_protocol::crypto::keys::KeyPair;
use feesponsor_protocol::sponsor::{ExchangeRecord, ExchangeState};
use feesponsor_protocol::transaction::sighash::{sign_input, signing_digest, verify_input};
use feesponsor_protocol::transaction::{
    Asset, CandidateTransaction, Coin, OutPoint, PartialTransaction, SighashPolicy, TxInput,
    TxOutput,
};
use feesponsor_protocol::verifier::{
    verify_customer_commitments, verify_record, CustomerCommitments,
};

const SEQUENCE: u32 = 0xFFFF_FFFD;

fn customer_tx() -> PartialTransaction {
    PartialTransaction {
        version: 2,
        lock_time: 0,
        inputs: vec![TxInput::new(OutPoint::new("aa".repeat(32), 0), 50_000_000, SEQUENCE)],
        outputs: vec![TxOutput::new("sbx1destination", 50_000_000)],
    }
}

/// Customer tx plus `extra` sponsor inputs and change outputs.
fn augmented(extra: usize) -> PartialTransaction {
    let mut tx = customer_tx();
    for n in 0..extra {
        tx.inputs.push(TxInput::new(
            OutPoint::new(format!("{n:064x}"), n as u32),
            10_000,
            SEQUENCE,
        ));
        tx.outputs.push(TxOutput::new(format!("sbx1sponsor{n}"), 9_000));
    }
    tx
}

fn candidate() -> CandidateTransaction {
    let tx = customer_tx();
    let coin = Coin {
        outpoint: tx.inputs[0].previous_output.clone(),
        address: "sbx1customer".to_string(),
        amount: tx.inputs[0].amount,
        confirmations: 6,
        spendable: true,
    };
    CandidateTransaction::new(tx.to_blob().unwrap(), tx, vec![coin]).unwrap()
}

fn record(tx: &PartialTransaction) -> ExchangeRecord {
    ExchangeRecord {
        asset: Asset::new("BTC"),
        id: "0b9c6d1e-bench".to_string(),
        state: ExchangeState::FeeAdded,
        blob: tx.to_blob().unwrap(),
        txid: None,
    }
}

fn bench_signing_digest(c: &mut Criterion) {
    let tx = augmented(8);
    c.bench_function("sighash/digest_all", |b| {
        b.iter(|| signing_digest(&tx, 0, SighashPolicy::All).unwrap());
    });
    c.bench_function("sighash/digest_single_acp", |b| {
        b.iter(|| signing_digest(&tx, 0, SighashPolicy::SingleAnyoneCanPay).unwrap());
    });
}

fn bench_verify_input(c: &mut Criterion) {
    let keypair = KeyPair::generate();
    let mut signed = customer_tx();
    sign_input(&mut signed, 0, &keypair, SighashPolicy::SingleAnyoneCanPay).unwrap();
    let mut tx = augmented(8);
    tx.inputs[0] = signed.inputs[0].clone();

    c.bench_function("sighash/verify_after_augmentation", |b| {
        b.iter(|| verify_input(&tx, 0).unwrap());
    });
}

fn bench_verify_record(c: &mut Criterion) {
    let tx = augmented(4);
    let expected = record(&tx);
    let observed = expected.clone();

    c.bench_function("verifier/record_equality", |b| {
        b.iter(|| verify_record(&expected, &observed, "fetch").unwrap());
    });
}

fn bench_customer_diff(c: &mut Criterion) {
    let mut group = c.benchmark_group("verifier/customer_diff");
    let commitments = CustomerCommitments::from_candidate(&candidate());

    for extra in [1usize, 16, 128] {
        let tx = augmented(extra);
        let rec = record(&tx);
        group.throughput(Throughput::Elements((tx.inputs.len() + tx.outputs.len()) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(extra), &tx, |b, tx| {
            b.iter(|| verify_customer_commitments(&commitments, tx, &rec, "fetch").unwrap());
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_signing_digest,
    bench_verify_input,
    bench_verify_record,
    bench_customer_diff,
);
criterion_main!(benches);
