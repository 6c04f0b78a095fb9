//! Error types for the fee-sponsored exchange protocol.
//!
//! Every protocol operation that can fail returns an [`ExchangeError`]. All
//! variants are terminal for the current run: nothing in this crate retries,
//! because retrying a tampered exchange could mask an attack.

use thiserror::Error;

/// Errors that can occur while building, exchanging, verifying or signing a
/// sponsored transaction.
#[derive(Debug, Error)]
pub enum ExchangeError {
    /// The wallet reported no spendable coin matching the filter.
    #[error("no funds available (filter: {filter})")]
    NoFundsAvailable {
        /// Human-readable description of the unspent filter used.
        filter: String,
    },

    /// The operator supplied an unrecognised mode selector.
    #[error("invalid mode {given:?}: expected one of query, interactive, non-interactive")]
    InvalidMode {
        /// The selector as given.
        given: String,
    },

    /// A sponsor response no longer matches what the customer committed to.
    #[error("tamper detected in {asset} exchange {id} at {step}: {field}")]
    TamperDetected {
        /// Ledger identifier of the exchange.
        asset: String,
        /// Sponsor-assigned exchange id.
        id: String,
        /// Protocol step that observed the mismatch.
        step: String,
        /// Which field (or customer input/output) differs.
        field: String,
    },

    /// Applying a signature commitment failed. No signature was produced.
    #[error("signing failed at {step}: {reason}")]
    SigningFailed {
        /// Protocol step that requested the signature.
        step: String,
        /// Why the wallet could not sign.
        reason: String,
    },

    /// The sponsor declined a submission or answered in an unexpected state.
    #[error("exchange rejected by sponsor ({asset} {id}) at {step}: {reason}")]
    ExchangeRejected {
        /// Ledger identifier of the exchange.
        asset: String,
        /// Exchange id, empty when the sponsor never assigned one.
        id: String,
        /// Protocol step that was rejected.
        step: String,
        /// The sponsor's reason, or a description of the unexpected state.
        reason: String,
    },

    /// A collaborator was unreachable, timed out, or answered garbage.
    #[error("{collaborator} unreachable at {step}: {reason}")]
    NetworkFailure {
        /// `wallet` or `sponsor`.
        collaborator: String,
        /// Protocol step in flight.
        step: String,
        /// Transport-level reason.
        reason: String,
    },

    /// The per-run state machine received an out-of-order event.
    #[error("invalid transition: in {from}, received {event}")]
    InvalidTransition {
        /// The phase the run was in.
        from: String,
        /// The event that is not allowed from that phase.
        event: String,
    },

    /// A transaction blob could not be decoded or violates the candidate guard.
    #[error("malformed transaction: {reason}")]
    MalformedTransaction {
        /// What is wrong with it.
        reason: String,
    },

    /// A configuration value is missing or out of range.
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Which value and why.
        reason: String,
    },
}

impl ExchangeError {
    /// The protocol step the failure happened in, when the variant records one.
    pub fn step(&self) -> Option<&str> {
        match self {
            Self::TamperDetected { step, .. }
            | Self::SigningFailed { step, .. }
            | Self::ExchangeRejected { step, .. }
            | Self::NetworkFailure { step, .. } => Some(step),
            _ => None,
        }
    }

    /// Short machine-readable kind, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NoFundsAvailable { .. } => "no_funds_available",
            Self::InvalidMode { .. } => "invalid_mode",
            Self::TamperDetected { .. } => "tamper_detected",
            Self::SigningFailed { .. } => "signing_failed",
            Self::ExchangeRejected { .. } => "exchange_rejected",
            Self::NetworkFailure { .. } => "network_failure",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::MalformedTransaction { .. } => "malformed_transaction",
            Self::InvalidConfig { .. } => "invalid_config",
        }
    }

    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedTransaction {
            reason: reason.into(),
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ExchangeError>;
