//! # Sponsor Collaborator
//!
//! The fee sponsor is a remote service: it receives a customer's candidate,
//! appends its own fee-paying input and change output, and finally
//! broadcasts. This module defines the records it exchanges, the interface
//! consumed from it ([`SponsorBackend`]), and the [`ExchangeClient`] that
//! drives one request/response per protocol step.
//!
//! ```text
//! mod.rs        — ExchangeState, ExchangeRecord, account types, SponsorBackend
//! client.rs     — ExchangeClient (submit / fetch / resubmit / submit_signed)
//! http.rs       — REST client for a remote sponsor
//! simulated.rs  — In-process sponsor with tamper injection
//! ```

pub mod client;
pub mod http;
pub mod simulated;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::error::Result;
use crate::transaction::{Asset, TransactionBlob};

pub use client::ExchangeClient;
pub use http::HttpSponsor;
pub use simulated::{SimulatedSponsor, TamperMode};

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Lifecycle of an exchange as reported by the sponsor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangeState {
    Created,
    FeeAdded,
    CustomerSigned,
    Broadcast,
    Failed,
}

impl ExchangeState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::FeeAdded => "fee_added",
            Self::CustomerSigned => "customer_signed",
            Self::Broadcast => "broadcast",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ExchangeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A sponsored transaction as the sponsor reports it. The customer only
/// ever holds a read-only mirror, re-fetched by `id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeRecord {
    pub asset: Asset,
    /// Sponsor-assigned handle.
    pub id: String,
    pub state: ExchangeState,
    pub blob: TransactionBlob,
    /// Present only once broadcast.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
}

/// The customer's account at the sponsor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub account_id: String,
    #[serde(default)]
    pub label: Option<String>,
}

/// Fee credit the customer holds for one asset, in base units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditBalance {
    pub asset: Asset,
    pub available: u64,
    #[serde(default)]
    pub reserved: u64,
}

// ---------------------------------------------------------------------------
// SponsorBackend
// ---------------------------------------------------------------------------

/// Operations consumed from the sponsor.
///
/// The `*_final` family is the non-interactive variant: the submitted blob
/// already carries the customer's partial-commitment signatures and the
/// sponsor broadcasts in the same call.
#[async_trait]
pub trait SponsorBackend: Send + Sync {
    async fn account(&self) -> Result<AccountInfo>;
    async fn credit(&self, asset: &Asset) -> Result<CreditBalance>;

    async fn create_exchange(
        &self,
        asset: &Asset,
        blob: &TransactionBlob,
    ) -> Result<ExchangeRecord>;
    async fn read_exchange(&self, asset: &Asset, id: &str) -> Result<ExchangeRecord>;
    async fn update_exchange(
        &self,
        asset: &Asset,
        id: &str,
        blob: &TransactionBlob,
    ) -> Result<ExchangeRecord>;
    async fn list_exchanges(&self) -> Result<Vec<ExchangeRecord>>;

    async fn create_exchange_final(
        &self,
        asset: &Asset,
        blob: &TransactionBlob,
    ) -> Result<ExchangeRecord>;
    async fn read_exchange_final(&self, asset: &Asset, id: &str) -> Result<ExchangeRecord>;
    async fn list_exchanges_final(&self) -> Result<Vec<ExchangeRecord>>;
}

#[async_trait]
impl<T: SponsorBackend + ?Sized> SponsorBackend for Arc<T> {
    async fn account(&self) -> Result<AccountInfo> {
        (**self).account().await
    }

    async fn credit(&self, asset: &Asset) -> Result<CreditBalance> {
        (**self).credit(asset).await
    }

    async fn create_exchange(
        &self,
        asset: &Asset,
        blob: &TransactionBlob,
    ) -> Result<ExchangeRecord> {
        (**self).create_exchange(asset, blob).await
    }

    async fn read_exchange(&self, asset: &Asset, id: &str) -> Result<ExchangeRecord> {
        (**self).read_exchange(asset, id).await
    }

    async fn update_exchange(
        &self,
        asset: &Asset,
        id: &str,
        blob: &TransactionBlob,
    ) -> Result<ExchangeRecord> {
        (**self).update_exchange(asset, id, blob).await
    }

    async fn list_exchanges(&self) -> Result<Vec<ExchangeRecord>> {
        (**self).list_exchanges().await
    }

    async fn create_exchange_final(
        &self,
        asset: &Asset,
        blob: &TransactionBlob,
    ) -> Result<ExchangeRecord> {
        (**self).create_exchange_final(asset, blob).await
    }

    async fn read_exchange_final(&self, asset: &Asset, id: &str) -> Result<ExchangeRecord> {
        (**self).read_exchange_final(asset, id).await
    }

    async fn list_exchanges_final(&self) -> Result<Vec<ExchangeRecord>> {
        (**self).list_exchanges_final().await
    }
}
