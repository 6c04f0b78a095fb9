//! # Configuration & Constants
//!
//! Protocol constants plus the explicit configuration handed to every
//! collaborator client. There is no global: the binary builds a
//! [`ClientConfig`] from flags and environment and passes it down.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{ExchangeError, Result};
use crate::transaction::Asset;

// ---------------------------------------------------------------------------
// Protocol constants
// ---------------------------------------------------------------------------

/// Crate version, reported by the CLI.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Transaction version written into every candidate.
pub const TX_VERSION: u32 = 2;

/// Sequence number that opts an input into replace-by-fee. Anything below
/// `0xFFFF_FFFE` signals replaceability; this is the conventional value.
pub const REPLACEABLE_SEQUENCE: u32 = 0xFFFF_FFFD;

/// Sequence number of a final, non-replaceable input.
pub const FINAL_SEQUENCE: u32 = 0xFFFF_FFFF;

/// Base units per whole coin. Wallet RPCs speak whole coins as decimals;
/// everything inside this crate is integer base units.
pub const SATS_PER_COIN: u64 = 100_000_000;

/// Default per-request timeout for both collaborators.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Default wallet JSON-RPC endpoint (regtest port).
pub const DEFAULT_WALLET_ENDPOINT: &str = "http://127.0.0.1:18443";

/// Default sponsor REST endpoint.
pub const DEFAULT_SPONSOR_ENDPOINT: &str = "http://127.0.0.1:8080";

/// Default ledger identifier.
pub const DEFAULT_ASSET: &str = "BTC";

// ---------------------------------------------------------------------------
// Client configuration
// ---------------------------------------------------------------------------

/// How a client authenticates to its collaborator.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Credentials {
    /// No authentication header.
    #[default]
    None,
    /// HTTP basic auth, as used by wallet JSON-RPC.
    Basic { username: String, password: String },
    /// Bearer token, as used by the sponsor API.
    Bearer { token: String },
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Secrets stay out of logs.
        match self {
            Self::None => write!(f, "None"),
            Self::Basic { username, .. } => write!(f, "Basic({username}, ***)"),
            Self::Bearer { .. } => write!(f, "Bearer(***)"),
        }
    }
}

/// Endpoint, credentials and timeout for one collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// Base URL, e.g. `http://127.0.0.1:18443`.
    pub endpoint: String,
    pub credentials: Credentials,
    /// Per-request timeout. A timed-out call aborts the run.
    pub timeout: Duration,
}

impl EndpointConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credentials: Credentials::None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Rejects empty or scheme-less endpoints and zero timeouts.
    pub fn validate(&self, name: &str) -> Result<()> {
        let endpoint = self.endpoint.trim();
        if endpoint.is_empty() {
            return Err(ExchangeError::InvalidConfig {
                reason: format!("{name} endpoint is empty"),
            });
        }
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(ExchangeError::InvalidConfig {
                reason: format!("{name} endpoint {endpoint:?} must start with http:// or https://"),
            });
        }
        if self.timeout.is_zero() {
            return Err(ExchangeError::InvalidConfig {
                reason: format!("{name} timeout must be greater than zero"),
            });
        }
        Ok(())
    }

    /// Endpoint with any trailing slash removed, ready for path joining.
    pub fn base_url(&self) -> &str {
        self.endpoint.trim().trim_end_matches('/')
    }
}

/// Wallet collaborator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletConfig {
    pub rpc: EndpointConfig,
    /// Named wallet on multi-wallet nodes; requests go to `/wallet/<name>`.
    pub wallet_name: Option<String>,
}

impl WalletConfig {
    pub fn validate(&self) -> Result<()> {
        self.rpc.validate("wallet")
    }

    /// Full JSON-RPC URL, including the wallet path when one is named.
    pub fn rpc_url(&self) -> String {
        match &self.wallet_name {
            Some(name) => format!("{}/wallet/{}", self.rpc.base_url(), name),
            None => self.rpc.base_url().to_string(),
        }
    }
}

impl Default for WalletConfig {
    fn default() -> Self {
        Self {
            rpc: EndpointConfig::new(DEFAULT_WALLET_ENDPOINT),
            wallet_name: None,
        }
    }
}

/// Sponsor collaborator settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SponsorConfig {
    pub api: EndpointConfig,
    /// Ledger the exchanges are opened on.
    pub asset: Asset,
}

impl SponsorConfig {
    pub fn validate(&self) -> Result<()> {
        self.api.validate("sponsor")?;
        if self.asset.as_str().is_empty() {
            return Err(ExchangeError::InvalidConfig {
                reason: "asset is empty".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for SponsorConfig {
    fn default() -> Self {
        Self {
            api: EndpointConfig::new(DEFAULT_SPONSOR_ENDPOINT),
            asset: Asset::new(DEFAULT_ASSET),
        }
    }
}

/// Everything a protocol run needs to reach its two collaborators.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ClientConfig {
    pub wallet: WalletConfig,
    pub sponsor: SponsorConfig,
}

impl ClientConfig {
    pub fn validate(&self) -> Result<()> {
        self.wallet.validate()?;
        self.sponsor.validate()
    }
}

/// Convert a whole-coin decimal (as wallet RPCs report it) to base units.
///
/// Rounds to the nearest unit; RPC amounts carry at most 8 decimals so the
/// rounding only absorbs float representation error.
pub fn coins_to_base_units(amount: f64) -> Option<u64> {
    if !amount.is_finite() || amount < 0.0 {
        return None;
    }
    let units = (amount * SATS_PER_COIN as f64).round();
    if units > u64::MAX as f64 {
        return None;
    }
    Some(units as u64)
}

/// Convert base units to the whole-coin decimal wallet RPCs expect.
pub fn base_units_to_coins(units: u64) -> f64 {
    units as f64 / SATS_PER_COIN as f64
}
