//! Exchange client: one sponsor request per protocol step.
//!
//! Every returned record is checked to belong to the requested asset and id
//! and to be in the state the step requires. Nothing is cached between
//! calls; the sponsor is the source of truth and is re-queried by id.

use tracing::{debug, info};

use super::{AccountInfo, CreditBalance, ExchangeRecord, ExchangeState, SponsorBackend};
use crate::error::{ExchangeError, Result};
use crate::transaction::{Asset, CandidateTransaction, TransactionBlob};

pub struct ExchangeClient<S> {
    sponsor: S,
    asset: Asset,
}

impl<S: SponsorBackend> ExchangeClient<S> {
    pub fn new(sponsor: S, asset: Asset) -> Self {
        Self { sponsor, asset }
    }

    pub fn asset(&self) -> &Asset {
        &self.asset
    }

    pub fn sponsor(&self) -> &S {
        &self.sponsor
    }

    // -- interactive --------------------------------------------------------

    /// Hand the unsigned candidate to the sponsor. The answer must be a new
    /// exchange in `FeeAdded`.
    pub async fn submit(&self, candidate: &CandidateTransaction) -> Result<ExchangeRecord> {
        let record = self
            .sponsor
            .create_exchange(&self.asset, candidate.blob())
            .await?;
        let record = self.check(record, None, Some(ExchangeState::FeeAdded), "submit")?;
        info!(asset = %record.asset, id = %record.id, "sponsor added fee");
        Ok(record)
    }

    /// Re-read an interactive exchange.
    pub async fn fetch(&self, asset: &Asset, id: &str) -> Result<ExchangeRecord> {
        let record = self.sponsor.read_exchange(asset, id).await?;
        self.check_for(asset, record, Some(id), None, "fetch")
    }

    /// Return the customer-signed blob; the sponsor signs its own input and
    /// broadcasts. The answer must be `Broadcast`.
    pub async fn resubmit(
        &self,
        asset: &Asset,
        id: &str,
        signed: &TransactionBlob,
    ) -> Result<ExchangeRecord> {
        let record = self.sponsor.update_exchange(asset, id, signed).await?;
        let record = self.check_for(
            asset,
            record,
            Some(id),
            Some(ExchangeState::Broadcast),
            "resubmit",
        )?;
        info!(asset = %record.asset, id = %record.id, txid = ?record.txid, "exchange broadcast");
        Ok(record)
    }

    // -- non-interactive ----------------------------------------------------

    /// Submit a blob already carrying the customer's partial-commitment
    /// signatures. The sponsor augments, signs and broadcasts in one round.
    pub async fn submit_signed(&self, presigned: &TransactionBlob) -> Result<ExchangeRecord> {
        let record = self
            .sponsor
            .create_exchange_final(&self.asset, presigned)
            .await?;
        let record = self.check(record, None, Some(ExchangeState::Broadcast), "submit_signed")?;
        info!(asset = %record.asset, id = %record.id, txid = ?record.txid, "exchange broadcast");
        Ok(record)
    }

    /// Re-read a non-interactive exchange.
    pub async fn fetch_final(&self, asset: &Asset, id: &str) -> Result<ExchangeRecord> {
        let record = self.sponsor.read_exchange_final(asset, id).await?;
        self.check_for(asset, record, Some(id), None, "fetch_final")
    }

    // -- queries ------------------------------------------------------------

    pub async fn account(&self) -> Result<AccountInfo> {
        self.sponsor.account().await
    }

    pub async fn credit(&self) -> Result<CreditBalance> {
        self.sponsor.credit(&self.asset).await
    }

    pub async fn list(&self) -> Result<Vec<ExchangeRecord>> {
        self.sponsor.list_exchanges().await
    }

    pub async fn list_final(&self) -> Result<Vec<ExchangeRecord>> {
        self.sponsor.list_exchanges_final().await
    }

    // -- checks -------------------------------------------------------------

    fn check(
        &self,
        record: ExchangeRecord,
        id: Option<&str>,
        state: Option<ExchangeState>,
        step: &str,
    ) -> Result<ExchangeRecord> {
        self.check_for(&self.asset, record, id, state, step)
    }

    fn check_for(
        &self,
        asset: &Asset,
        record: ExchangeRecord,
        id: Option<&str>,
        state: Option<ExchangeState>,
        step: &str,
    ) -> Result<ExchangeRecord> {
        let reject = |reason: String| ExchangeError::ExchangeRejected {
            asset: asset.to_string(),
            id: id.unwrap_or(&record.id).to_string(),
            step: step.to_string(),
            reason,
        };

        if &record.asset != asset {
            return Err(reject(format!("sponsor answered for asset {}", record.asset)));
        }
        match id {
            Some(expected) if record.id != expected => {
                return Err(reject(format!("sponsor answered for exchange {}", record.id)));
            }
            None if record.id.is_empty() => {
                return Err(reject("sponsor assigned no exchange id".to_string()));
            }
            _ => {}
        }
        if let Some(expected) = state {
            if record.state != expected {
                return Err(reject(format!(
                    "expected state {expected}, sponsor reports {}",
                    record.state
                )));
            }
        }
        debug!(step, id = %record.id, state = %record.state, "sponsor record accepted");
        Ok(record)
    }
}
