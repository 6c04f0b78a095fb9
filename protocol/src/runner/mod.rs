//! # Protocol Runner
//!
//! Selects the flow, sequences the collaborator calls and reports the
//! terminal result. One run is one sequential chain of awaits that aborts
//! on the first error; nothing is retried.
//!
//! ```text
//! interactive:
//!   build_candidate -> submit -> fetch + verify -> sign(ALL) -> resubmit
//!     -> fetch + verify (final) -> Broadcast
//!
//! non-interactive:
//!   build_candidate -> sign(SINGLE|ANYONECANPAY) -> submit_signed + verify
//!     -> fetch_final + verify (final) -> Broadcast
//! ```
//!
//! Runs share no mutable state, so one runner can drive any number of them
//! concurrently.

pub mod mode;
pub mod state;

use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, Instrument};

use crate::error::{ExchangeError, Result};
use crate::signing::SigningOrchestrator;
use crate::sponsor::{
    AccountInfo, CreditBalance, ExchangeClient, ExchangeRecord, ExchangeState, SponsorBackend,
};
use crate::transaction::Asset;
use crate::verifier::{self, CustomerCommitments, Verified};
use crate::wallet::{CoinSelection, TransactionAdapter, WalletBackend};

pub use mode::Mode;
pub use state::{ExchangeEvent, ExchangePhase, ExchangeTracker, Flow, PhaseChange};

/// What to send where.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    /// Address receiving the full swept amount.
    pub destination: String,
    /// Restrict coin selection to this address.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl RunRequest {
    pub fn new(destination: impl Into<String>) -> Self {
        Self {
            destination: destination.into(),
            source: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.destination.trim().is_empty() {
            return Err(ExchangeError::InvalidConfig {
                reason: "destination address is empty".to_string(),
            });
        }
        Ok(())
    }
}

/// Sponsor-side state returned by a query-only run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryReport {
    pub account: AccountInfo,
    pub credit: CreditBalance,
    pub exchanges: Vec<ExchangeRecord>,
    pub final_exchanges: Vec<ExchangeRecord>,
}

/// Outcome of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub mode: Mode,
    pub asset: Asset,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exchange_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub final_state: Option<ExchangeState>,
    /// Value the customer sent, base units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
    /// Fee paid by the sponsor's inputs, base units.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub phases: Vec<PhaseChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryReport>,
}

/// Drives runs against one wallet and one sponsor.
pub struct ProtocolRunner<W, S> {
    adapter: TransactionAdapter<W>,
    client: ExchangeClient<S>,
}

impl<W: WalletBackend, S: SponsorBackend> ProtocolRunner<W, S> {
    pub fn new(wallet: W, sponsor: S, asset: Asset) -> Self {
        Self {
            adapter: TransactionAdapter::new(wallet),
            client: ExchangeClient::new(sponsor, asset),
        }
    }

    pub fn adapter(&self) -> &TransactionAdapter<W> {
        &self.adapter
    }

    pub fn client(&self) -> &ExchangeClient<S> {
        &self.client
    }

    /// Parse `mode` and run. An unrecognised selector fails with
    /// [`ExchangeError::InvalidMode`] before either collaborator is called.
    pub async fn run_str(&self, mode: &str, request: &RunRequest) -> Result<RunReport> {
        let mode: Mode = mode.parse()?;
        self.run(mode, request).await
    }

    pub async fn run(&self, mode: Mode, request: &RunRequest) -> Result<RunReport> {
        let span = info_span!("run", %mode, asset = %self.client.asset());
        async {
            let flow = match mode {
                Mode::QueryOnly => return self.query().await,
                Mode::Interactive => Flow::Interactive,
                Mode::NonInteractive => Flow::NonInteractive,
            };
            request.validate()?;

            let mut tracker = ExchangeTracker::new(flow);
            let result = match flow {
                Flow::Interactive => self.interactive(request, &mut tracker).await,
                Flow::NonInteractive => self.non_interactive(request, &mut tracker).await,
            };
            if let Err(e) = &result {
                tracker.fail(e.to_string());
                error!(
                    kind = e.kind(),
                    step = e.step().unwrap_or("-"),
                    id = tracker.exchange_id().unwrap_or("-"),
                    phases = ?tracker.phases(),
                    elapsed_ms = tracker.elapsed_ms(),
                    error = %e,
                    "run aborted"
                );
            }
            result
        }
        .instrument(span)
        .await
    }

    // -----------------------------------------------------------------------
    // Flows
    // -----------------------------------------------------------------------

    async fn interactive(
        &self,
        request: &RunRequest,
        tracker: &mut ExchangeTracker,
    ) -> Result<RunReport> {
        let asset = self.client.asset();
        let candidate = self
            .adapter
            .build_candidate(request.source.as_deref(), &request.destination)
            .await?;
        let owned = self.adapter.owned_outpoints().await?;
        let commitments =
            CustomerCommitments::from_candidate(&candidate).with_wallet_outpoints(owned);

        let submitted = self.client.submit(&candidate).await?;
        tracker.set_exchange_id(&submitted.id);
        tracker.advance(ExchangeEvent::FeeAdded)?;

        let fetched = self.client.fetch(asset, &submitted.id).await?;
        let verified = self.check(&commitments, &submitted, fetched, "fetch").await?;
        tracker.advance(ExchangeEvent::Verified)?;

        let signed = SigningOrchestrator::new(&self.adapter)
            .sign_full(&verified, &commitments)
            .await?;
        tracker.advance(ExchangeEvent::Signed)?;
        let commitments = commitments.with_witnesses_from(&signed.transaction);

        let broadcast = self
            .client
            .resubmit(asset, &submitted.id, &signed.blob)
            .await?;
        let refetched = self.client.fetch(asset, &submitted.id).await?;
        let confirmed = self
            .confirm(&commitments, &broadcast, refetched, "final_fetch")
            .await?;
        tracker.advance(ExchangeEvent::BroadcastConfirmed)?;

        Ok(self.report(Mode::Interactive, tracker, candidate.amount(), confirmed))
    }

    async fn non_interactive(
        &self,
        request: &RunRequest,
        tracker: &mut ExchangeTracker,
    ) -> Result<RunReport> {
        let asset = self.client.asset();
        // One coin, so its input pairs with the single destination output.
        let candidate = self
            .adapter
            .build_candidate_with(
                request.source.as_deref(),
                &request.destination,
                CoinSelection::LargestCoin,
            )
            .await?;

        let presigned = SigningOrchestrator::new(&self.adapter)
            .sign_partial(&candidate)
            .await?;
        tracker.advance(ExchangeEvent::PreSigned)?;
        let commitments = CustomerCommitments::from_candidate(&candidate)
            .with_witnesses_from(&presigned.transaction);

        let broadcast = self.client.submit_signed(&presigned.blob).await?;
        tracker.set_exchange_id(&broadcast.id);
        // Check the response itself before relying on the re-fetch.
        let answered = self.adapter.decode(&broadcast.blob).await?;
        verifier::verify_customer_commitments(
            &commitments,
            &answered,
            &broadcast,
            "submit_signed",
        )?;

        let refetched = self.client.fetch_final(asset, &broadcast.id).await?;
        let confirmed = self
            .confirm(&commitments, &broadcast, refetched, "final_fetch")
            .await?;
        tracker.advance(ExchangeEvent::BroadcastConfirmed)?;

        Ok(self.report(Mode::NonInteractive, tracker, candidate.amount(), confirmed))
    }

    async fn query(&self) -> Result<RunReport> {
        let account = self.client.account().await?;
        let credit = self.client.credit().await?;
        let exchanges = self.client.list().await?;
        let final_exchanges = self.client.list_final().await?;
        info!(
            account = %account.account_id,
            available = credit.available,
            exchanges = exchanges.len(),
            final_exchanges = final_exchanges.len(),
            "sponsor query complete"
        );
        Ok(RunReport {
            mode: Mode::QueryOnly,
            asset: self.client.asset().clone(),
            exchange_id: None,
            txid: None,
            final_state: None,
            amount: None,
            fee: None,
            phases: Vec::new(),
            query: Some(QueryReport {
                account,
                credit,
                exchanges,
                final_exchanges,
            }),
        })
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Decode `observed` and run both verifier checks against `expected`.
    async fn check(
        &self,
        commitments: &CustomerCommitments,
        expected: &ExchangeRecord,
        observed: ExchangeRecord,
        step: &str,
    ) -> Result<Verified> {
        let observed_tx = self.adapter.decode(&observed.blob).await?;
        verifier::verify(commitments, expected, observed, observed_tx, step)
    }

    /// Final re-fetch check: verified, `Broadcast`, and carrying a txid.
    async fn confirm(
        &self,
        commitments: &CustomerCommitments,
        broadcast: &ExchangeRecord,
        refetched: ExchangeRecord,
        step: &str,
    ) -> Result<Verified> {
        let verified = self.check(commitments, broadcast, refetched, step).await?;
        let record = verified.record();
        if record.state != ExchangeState::Broadcast || record.txid.is_none() {
            return Err(ExchangeError::ExchangeRejected {
                asset: record.asset.to_string(),
                id: record.id.clone(),
                step: step.to_string(),
                reason: format!("final record is {} without txid", record.state),
            });
        }
        info!(id = %record.id, txid = ?record.txid, "broadcast confirmed");
        Ok(verified)
    }

    fn report(
        &self,
        mode: Mode,
        tracker: &ExchangeTracker,
        amount: u64,
        confirmed: Verified,
    ) -> RunReport {
        let fee = confirmed.transaction().fee();
        let record = confirmed.into_record();
        RunReport {
            mode,
            asset: record.asset,
            exchange_id: Some(record.id),
            txid: record.txid,
            final_state: Some(record.state),
            amount: Some(amount),
            fee,
            phases: tracker.history().to_vec(),
            query: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::KeyPair;
    use crate::sponsor::{SimulatedSponsor, TamperMode};
    use crate::transaction::{Coin, OutPoint};
    use crate::wallet::MemoryWallet;
    use std::sync::Arc;

    fn runner(tamper: TamperMode) -> ProtocolRunner<Arc<MemoryWallet>, Arc<SimulatedSponsor>> {
        let wallet = Arc::new(MemoryWallet::new(KeyPair::from_seed(&[3u8; 32])));
        wallet.fund(50_000_000);
        let sponsor = Arc::new(SimulatedSponsor::new(Asset::new("BTC"), 2_000).with_tamper(tamper));
        ProtocolRunner::new(wallet, sponsor, Asset::new("BTC"))
    }

    #[tokio::test]
    async fn interactive_run_reaches_broadcast() {
        let report = runner(TamperMode::None)
            .run(Mode::Interactive, &RunRequest::new("sbx1dest"))
            .await
            .unwrap();
        assert_eq!(report.final_state, Some(ExchangeState::Broadcast));
        assert!(report.txid.is_some());
        assert_eq!(report.amount, Some(50_000_000));
        assert_eq!(report.fee, Some(2_000));
        let phases: Vec<_> = report.phases.iter().map(|c| c.phase).collect();
        assert_eq!(
            phases,
            vec![
                ExchangePhase::Created,
                ExchangePhase::FeeAdded,
                ExchangePhase::FeeAddedConfirmed,
                ExchangePhase::CustomerSigned,
                ExchangePhase::Broadcast,
            ]
        );
    }

    #[tokio::test]
    async fn non_interactive_run_reaches_broadcast() {
        let report = runner(TamperMode::None)
            .run(Mode::NonInteractive, &RunRequest::new("sbx1dest"))
            .await
            .unwrap();
        assert_eq!(report.final_state, Some(ExchangeState::Broadcast));
        let phases: Vec<_> = report.phases.iter().map(|c| c.phase).collect();
        assert_eq!(
            phases,
            vec![ExchangePhase::Created, ExchangePhase::PreSigned, ExchangePhase::Broadcast]
        );
    }

    #[tokio::test]
    async fn tamper_stops_before_signing() {
        let r = runner(TamperMode::RedirectDestination);
        let err = r
            .run(Mode::Interactive, &RunRequest::new("sbx1dest"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::TamperDetected { .. }));
        // Nothing was resubmitted.
        let listed = r.client().list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].state, ExchangeState::FeeAdded);
    }

    #[tokio::test]
    async fn sponsor_spending_another_wallet_coin_is_caught_before_signing() {
        let wallet = Arc::new(MemoryWallet::new(KeyPair::from_seed(&[3u8; 32])));
        wallet.fund(50_000_000);
        let pending = Coin {
            outpoint: OutPoint::new("cc".repeat(32), 1),
            address: wallet.address(),
            amount: 70_000_000,
            confirmations: 0,
            spendable: true,
        };
        wallet.add_coin(pending.clone());
        let sponsor = Arc::new(
            SimulatedSponsor::new(Asset::new("BTC"), 2_000)
                .with_tamper(TamperMode::SpendCustomerCoin)
                .with_known_coin(pending.clone()),
        );
        let r = ProtocolRunner::new(wallet, sponsor, Asset::new("BTC"));

        let err = r
            .run(Mode::Interactive, &RunRequest::new("sbx1dest"))
            .await
            .unwrap_err();
        match err {
            ExchangeError::TamperDetected { step, field, .. } => {
                assert_eq!(step, "fetch");
                assert!(field.contains(&pending.outpoint.to_string()));
            }
            other => panic!("expected TamperDetected, got {other:?}"),
        }
        let listed = r.client().list().await.unwrap();
        assert_eq!(listed[0].state, ExchangeState::FeeAdded);
    }

    #[tokio::test]
    async fn invalid_mode_fails_first() {
        let r = runner(TamperMode::None);
        let err = r.run_str("none", &RunRequest::new("sbx1dest")).await.unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidMode { .. }));
        assert!(r.client().list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_destination_is_config_error() {
        let err = runner(TamperMode::None)
            .run(Mode::Interactive, &RunRequest::new("  "))
            .await
            .unwrap_err();
        assert!(matches!(err, ExchangeError::InvalidConfig { .. }));
    }

    #[tokio::test]
    async fn query_reports_sponsor_state() {
        let r = runner(TamperMode::None);
        r.run(Mode::NonInteractive, &RunRequest::new("sbx1dest"))
            .await
            .unwrap();
        let report = r.run(Mode::QueryOnly, &RunRequest::new("")).await.unwrap();
        let query = report.query.unwrap();
        assert!(query.exchanges.is_empty());
        assert_eq!(query.final_exchanges.len(), 1);
        assert_eq!(query.credit.asset, Asset::new("BTC"));
    }
}
