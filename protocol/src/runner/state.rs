//! Per-run exchange state machine.
//!
//! ```text
//! interactive:      Created -> FeeAdded -> FeeAddedConfirmed -> CustomerSigned -> Broadcast
//! non-interactive:  Created -> PreSigned -> Broadcast
//! any non-terminal: -> Failed
//! ```
//!
//! `Broadcast` is entered only once the final re-fetch has been verified.
//! `Broadcast` and `Failed` are terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Instant;

use crate::error::{ExchangeError, Result};

/// Which transition table applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Flow {
    Interactive,
    NonInteractive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExchangePhase {
    Created,
    /// Sponsor returned its augmented transaction; not yet verified.
    FeeAdded,
    /// Verifier passed on the re-fetched `FeeAdded` record.
    FeeAddedConfirmed,
    CustomerSigned,
    /// Customer inputs carry partial-commitment signatures.
    PreSigned,
    /// Terminal: broadcast and confirmed by the final re-fetch.
    Broadcast,
    /// Terminal: any verification, signing or sponsor failure.
    Failed,
}

impl ExchangePhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::FeeAdded => "fee_added",
            Self::FeeAddedConfirmed => "fee_added_confirmed",
            Self::CustomerSigned => "customer_signed",
            Self::PreSigned => "pre_signed",
            Self::Broadcast => "broadcast",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Broadcast | Self::Failed)
    }
}

impl fmt::Display for ExchangePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Something that happened during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExchangeEvent {
    FeeAdded,
    Verified,
    Signed,
    PreSigned,
    BroadcastConfirmed,
}

impl fmt::Display for ExchangeEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::FeeAdded => "fee_added",
            Self::Verified => "verified",
            Self::Signed => "signed",
            Self::PreSigned => "pre_signed",
            Self::BroadcastConfirmed => "broadcast_confirmed",
        };
        f.write_str(name)
    }
}

/// One entry of a run's phase history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseChange {
    pub phase: ExchangePhase,
    pub at: DateTime<Utc>,
}

/// Tracks one exchange through its flow.
pub struct ExchangeTracker {
    flow: Flow,
    phase: ExchangePhase,
    exchange_id: Option<String>,
    failure: Option<String>,
    history: Vec<PhaseChange>,
    started_at: Instant,
}

impl ExchangeTracker {
    pub fn new(flow: Flow) -> Self {
        Self {
            flow,
            phase: ExchangePhase::Created,
            exchange_id: None,
            failure: None,
            history: vec![PhaseChange {
                phase: ExchangePhase::Created,
                at: Utc::now(),
            }],
            started_at: Instant::now(),
        }
    }

    pub fn flow(&self) -> Flow {
        self.flow
    }

    pub fn phase(&self) -> ExchangePhase {
        self.phase
    }

    pub fn exchange_id(&self) -> Option<&str> {
        self.exchange_id.as_deref()
    }

    /// Record the sponsor-assigned id once it is known.
    pub fn set_exchange_id(&mut self, id: impl Into<String>) {
        self.exchange_id = Some(id.into());
    }

    pub fn failure(&self) -> Option<&str> {
        self.failure.as_deref()
    }

    pub fn history(&self) -> &[PhaseChange] {
        &self.history
    }

    /// Phases visited, in order.
    pub fn phases(&self) -> Vec<ExchangePhase> {
        self.history.iter().map(|c| c.phase).collect()
    }

    pub fn is_terminal(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.started_at.elapsed().as_millis() as u64
    }

    /// Apply `event`, or fail with [`ExchangeError::InvalidTransition`] if
    /// the flow's table has no such edge from the current phase.
    pub fn advance(&mut self, event: ExchangeEvent) -> Result<ExchangePhase> {
        use ExchangeEvent as E;
        use ExchangePhase as P;

        let next = match (self.flow, self.phase, event) {
            (Flow::Interactive, P::Created, E::FeeAdded) => P::FeeAdded,
            (Flow::Interactive, P::FeeAdded, E::Verified) => P::FeeAddedConfirmed,
            (Flow::Interactive, P::FeeAddedConfirmed, E::Signed) => P::CustomerSigned,
            (Flow::Interactive, P::CustomerSigned, E::BroadcastConfirmed) => P::Broadcast,
            (Flow::NonInteractive, P::Created, E::PreSigned) => P::PreSigned,
            (Flow::NonInteractive, P::PreSigned, E::BroadcastConfirmed) => P::Broadcast,
            (_, from, event) => {
                return Err(ExchangeError::InvalidTransition {
                    from: from.to_string(),
                    event: event.to_string(),
                })
            }
        };
        self.enter(next);
        Ok(next)
    }

    /// Move to `Failed`. Terminal phases are immutable.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if !self.phase.is_terminal() {
            self.failure = Some(reason.into());
            self.enter(ExchangePhase::Failed);
        }
    }

    fn enter(&mut self, phase: ExchangePhase) {
        self.phase = phase;
        self.history.push(PhaseChange {
            phase,
            at: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ExchangeEvent as E;
    use ExchangePhase as P;

    #[test]
    fn interactive_lifecycle() {
        let mut t = ExchangeTracker::new(Flow::Interactive);
        t.advance(E::FeeAdded).unwrap();
        t.advance(E::Verified).unwrap();
        t.advance(E::Signed).unwrap();
        t.advance(E::BroadcastConfirmed).unwrap();
        assert!(t.is_terminal());
        assert_eq!(
            t.phases(),
            vec![P::Created, P::FeeAdded, P::FeeAddedConfirmed, P::CustomerSigned, P::Broadcast]
        );
    }

    #[test]
    fn non_interactive_lifecycle() {
        let mut t = ExchangeTracker::new(Flow::NonInteractive);
        t.advance(E::PreSigned).unwrap();
        t.advance(E::BroadcastConfirmed).unwrap();
        assert_eq!(t.phases(), vec![P::Created, P::PreSigned, P::Broadcast]);
    }

    #[test]
    fn signing_before_verification_is_rejected() {
        let mut t = ExchangeTracker::new(Flow::Interactive);
        t.advance(E::FeeAdded).unwrap();
        match t.advance(E::Signed) {
            Err(ExchangeError::InvalidTransition { from, event }) => {
                assert_eq!(from, "fee_added");
                assert_eq!(event, "signed");
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
        assert_eq!(t.phase(), P::FeeAdded);
    }

    #[test]
    fn events_from_the_other_flow_are_rejected() {
        let mut t = ExchangeTracker::new(Flow::NonInteractive);
        assert!(t.advance(E::FeeAdded).is_err());
        let mut t = ExchangeTracker::new(Flow::Interactive);
        assert!(t.advance(E::PreSigned).is_err());
        assert!(t.advance(E::BroadcastConfirmed).is_err());
    }

    #[test]
    fn terminal_states_are_immutable() {
        let mut t = ExchangeTracker::new(Flow::NonInteractive);
        t.advance(E::PreSigned).unwrap();
        t.advance(E::BroadcastConfirmed).unwrap();
        t.fail("late failure");
        assert_eq!(t.phase(), P::Broadcast);
        assert!(t.failure().is_none());

        let mut t = ExchangeTracker::new(Flow::Interactive);
        t.fail("tamper");
        assert_eq!(t.phase(), P::Failed);
        assert!(t.advance(E::FeeAdded).is_err());
        t.fail("again");
        assert_eq!(t.failure(), Some("tamper"));
    }
}
