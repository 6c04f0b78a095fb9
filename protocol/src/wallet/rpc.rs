//! # Wallet JSON-RPC Client
//!
//! Talks to a node wallet over JSON-RPC 1.0 (Bitcoin Core dialect). Only the
//! four calls the exchange needs are implemented:
//!
//! | Method | Used for |
//! |---|---|
//! | `listunspent` | coin discovery |
//! | `createpsbt` | candidate encoding |
//! | `walletprocesspsbt` | UTXO update and signing |
//! | `decodepsbt` | structural decoding for verification |
//!
//! The node answers RPC-level failures with an error object and (usually)
//! HTTP 500, so the body is parsed regardless of status. Amounts cross this
//! boundary as decimal coins and are converted to base units immediately.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use super::WalletBackend;
use crate::config::{base_units_to_coins, coins_to_base_units, Credentials, WalletConfig};
use crate::error::{ExchangeError, Result};
use crate::transaction::{
    Coin, InputWitness, OutPoint, PartialTransaction, SighashPolicy, TransactionBlob, TxInput,
    TxOutput, UnspentFilter,
};

/// Upper bound on confirmations passed to `listunspent`.
const MAX_CONFIRMATIONS: u32 = 9_999_999;

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcError>,
}

/// Error object returned by the node.
#[derive(Debug, Clone, Deserialize)]
struct RpcError {
    code: i64,
    message: String,
}

/// Why a call did not produce a result.
#[derive(Debug)]
enum CallError {
    /// Unreachable, timed out, or answered something that is not JSON-RPC.
    Transport(String),
    /// The node understood the call and refused it.
    Rpc(RpcError),
}

#[derive(Debug, Deserialize)]
struct UnspentEntry {
    txid: String,
    vout: u32,
    #[serde(default)]
    address: String,
    amount: f64,
    confirmations: u32,
    #[serde(default)]
    spendable: bool,
}

#[derive(Debug, Deserialize)]
struct ProcessedPsbt {
    psbt: String,
    #[allow(dead_code)]
    complete: bool,
}

#[derive(Debug, Deserialize)]
struct DecodedPsbt {
    tx: DecodedTx,
    #[serde(default)]
    inputs: Vec<DecodedPsbtInput>,
}

#[derive(Debug, Deserialize)]
struct DecodedTx {
    version: u32,
    locktime: u32,
    vin: Vec<DecodedVin>,
    vout: Vec<DecodedVout>,
}

#[derive(Debug, Deserialize)]
struct DecodedVin {
    txid: String,
    vout: u32,
    sequence: u32,
}

#[derive(Debug, Deserialize)]
struct DecodedVout {
    value: f64,
    #[serde(rename = "scriptPubKey")]
    script_pub_key: ScriptPubKey,
}

#[derive(Debug, Deserialize)]
struct ScriptPubKey {
    #[serde(default)]
    address: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DecodedPsbtInput {
    #[serde(default)]
    witness_utxo: Option<WitnessUtxo>,
    /// pubkey hex -> signature hex (DER plus sighash byte).
    #[serde(default)]
    partial_signatures: BTreeMap<String, String>,
    /// `[signature, pubkey]` once finalized.
    #[serde(default)]
    final_scriptwitness: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct WitnessUtxo {
    amount: f64,
}

// ---------------------------------------------------------------------------
// RpcWallet
// ---------------------------------------------------------------------------

/// [`WalletBackend`] backed by a node wallet's JSON-RPC interface.
pub struct RpcWallet {
    client: reqwest::Client,
    url: String,
    credentials: Credentials,
    next_id: AtomicU64,
}

impl RpcWallet {
    /// Validate `config` and build the HTTP client. No request is made.
    pub fn new(config: WalletConfig) -> Result<Self> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(config.rpc.timeout)
            .build()
            .map_err(|e| ExchangeError::InvalidConfig {
                reason: format!("wallet http client: {e}"),
            })?;
        Ok(Self {
            client,
            url: config.rpc_url(),
            credentials: config.rpc.credentials,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> std::result::Result<T, CallError> {
        let request = RpcRequest {
            jsonrpc: "1.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(method, id = request.id, "wallet rpc request");

        let mut builder = self.client.post(&self.url).json(&request);
        builder = match &self.credentials {
            Credentials::None => builder,
            Credentials::Basic { username, password } => {
                builder.basic_auth(username, Some(password))
            }
            Credentials::Bearer { token } => builder.bearer_auth(token),
        };

        let response = builder
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;
        let status = response.status();
        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| CallError::Transport(format!("HTTP {status}: {e}")))?;

        if let Some(err) = body.error {
            warn!(method, code = err.code, message = %err.message, "wallet rpc error");
            return Err(CallError::Rpc(err));
        }
        let result = body
            .result
            .ok_or_else(|| CallError::Transport(format!("HTTP {status}: response has no result")))?;
        serde_json::from_value(result)
            .map_err(|e| CallError::Transport(format!("unexpected {method} result: {e}")))
    }
}

fn network_failure(method: &str, reason: impl Into<String>) -> ExchangeError {
    ExchangeError::NetworkFailure {
        collaborator: "wallet".to_string(),
        step: method.to_string(),
        reason: reason.into(),
    }
}

fn to_base_units(amount: f64, what: &str) -> Result<u64> {
    coins_to_base_units(amount).ok_or_else(|| {
        ExchangeError::malformed(format!("{what} amount {amount} is not representable"))
    })
}

/// Recover the commitment policy from the sighash byte trailing a signature.
fn witness_from(public_key: &str, signature: &str) -> Result<InputWitness> {
    let bytes = hex::decode(signature)
        .map_err(|e| ExchangeError::malformed(format!("signature is not hex: {e}")))?;
    let policy = match bytes.last() {
        Some(0x01) => SighashPolicy::All,
        Some(0x83) => SighashPolicy::SingleAnyoneCanPay,
        Some(other) => {
            return Err(ExchangeError::malformed(format!(
                "unsupported sighash flag 0x{other:02x}"
            )))
        }
        None => return Err(ExchangeError::malformed("empty signature")),
    };
    Ok(InputWitness {
        policy,
        public_key: public_key.to_string(),
        signature: signature.to_string(),
    })
}

impl TryFrom<DecodedPsbt> for PartialTransaction {
    type Error = ExchangeError;

    fn try_from(decoded: DecodedPsbt) -> Result<Self> {
        if decoded.inputs.len() != decoded.tx.vin.len() {
            return Err(ExchangeError::malformed(format!(
                "psbt has {} input maps for {} inputs",
                decoded.inputs.len(),
                decoded.tx.vin.len()
            )));
        }

        let inputs = decoded
            .tx
            .vin
            .into_iter()
            .zip(decoded.inputs)
            .map(|(vin, meta)| {
                let outpoint = OutPoint::new(vin.txid, vin.vout);
                let amount = match meta.witness_utxo {
                    Some(utxo) => to_base_units(utxo.amount, "input")?,
                    None => {
                        return Err(ExchangeError::malformed(format!(
                            "input {outpoint} has no utxo information"
                        )))
                    }
                };
                let finalized = meta.final_scriptwitness.as_slice();
                let witness = match (finalized, meta.partial_signatures.iter().next()) {
                    ([signature, public_key], _) | (_, Some((public_key, signature))) => {
                        Some(witness_from(public_key, signature)?)
                    }
                    _ => None,
                };
                let mut input = TxInput::new(outpoint, amount, vin.sequence);
                input.witness = witness;
                Ok(input)
            })
            .collect::<Result<Vec<_>>>()?;

        let outputs = decoded
            .tx
            .vout
            .into_iter()
            .map(|vout| {
                let address = vout
                    .script_pub_key
                    .address
                    .ok_or_else(|| ExchangeError::malformed("output has no address"))?;
                Ok(TxOutput::new(address, to_base_units(vout.value, "output")?))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(PartialTransaction {
            version: decoded.tx.version,
            lock_time: decoded.tx.locktime,
            inputs,
            outputs,
        })
    }
}

#[async_trait]
impl WalletBackend for RpcWallet {
    async fn list_unspent(&self, filter: &UnspentFilter) -> Result<Vec<Coin>> {
        let entries: Vec<UnspentEntry> = self
            .call(
                "listunspent",
                json!([filter.min_confirmations, MAX_CONFIRMATIONS, filter.addresses]),
            )
            .await
            .map_err(|e| match e {
                CallError::Transport(reason) => network_failure("listunspent", reason),
                CallError::Rpc(err) => network_failure(
                    "listunspent",
                    format!("rpc error {}: {}", err.code, err.message),
                ),
            })?;

        entries
            .into_iter()
            .map(|e| {
                Ok(Coin {
                    amount: to_base_units(e.amount, "coin")?,
                    outpoint: OutPoint::new(e.txid, e.vout),
                    address: e.address,
                    confirmations: e.confirmations,
                    spendable: e.spendable,
                })
            })
            .collect()
    }

    async fn create_transaction(
        &self,
        inputs: &[TxInput],
        outputs: &[TxOutput],
        lock_time: u32,
        replaceable: bool,
    ) -> Result<TransactionBlob> {
        let ins: Vec<Value> = inputs
            .iter()
            .map(|i| json!({ "txid": i.previous_output.txid, "vout": i.previous_output.vout }))
            .collect();
        let outs: Vec<Value> = outputs
            .iter()
            .map(|o| {
                let mut out = serde_json::Map::new();
                out.insert(o.address.clone(), json!(base_units_to_coins(o.amount)));
                Value::Object(out)
            })
            .collect();

        let created: String = self
            .call("createpsbt", json!([ins, outs, lock_time, replaceable]))
            .await
            .map_err(|e| match e {
                CallError::Transport(reason) => network_failure("createpsbt", reason),
                CallError::Rpc(err) => ExchangeError::malformed(format!(
                    "createpsbt rejected: {} ({})",
                    err.message, err.code
                )),
            })?;

        // createpsbt leaves out UTXO data; have the wallet fill it in so the
        // blob decodes with input amounts.
        self.process_transaction(
            &TransactionBlob::new(created),
            false,
            SighashPolicy::All,
        )
        .await
    }

    async fn process_transaction(
        &self,
        blob: &TransactionBlob,
        sign: bool,
        policy: SighashPolicy,
    ) -> Result<TransactionBlob> {
        let processed: ProcessedPsbt = self
            .call(
                "walletprocesspsbt",
                json!([blob.as_str(), sign, policy.wallet_flag()]),
            )
            .await
            .map_err(|e| match e {
                CallError::Transport(reason) => network_failure("walletprocesspsbt", reason),
                CallError::Rpc(err) => ExchangeError::SigningFailed {
                    step: "walletprocesspsbt".to_string(),
                    reason: format!("{} ({})", err.message, err.code),
                },
            })?;
        Ok(TransactionBlob::new(processed.psbt))
    }

    async fn decode_transaction(&self, blob: &TransactionBlob) -> Result<PartialTransaction> {
        let decoded: DecodedPsbt = self
            .call("decodepsbt", json!([blob.as_str()]))
            .await
            .map_err(|e| match e {
                CallError::Transport(reason) => network_failure("decodepsbt", reason),
                CallError::Rpc(err) => ExchangeError::malformed(format!(
                    "decodepsbt rejected: {} ({})",
                    err.message, err.code
                )),
            })?;
        PartialTransaction::try_from(decoded)
    }
}
