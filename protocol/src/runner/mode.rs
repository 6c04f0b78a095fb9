//! Operator mode selector.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ExchangeError;

/// Which flow a run executes. Resolved once, before any collaborator call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Account, credit and exchange listings only. Moves no funds.
    #[serde(rename = "query")]
    QueryOnly,
    /// Submit unsigned, verify, sign with full commitment, resubmit.
    Interactive,
    /// Pre-sign with partial commitment and submit once.
    NonInteractive,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::QueryOnly => "query",
            Self::Interactive => "interactive",
            Self::NonInteractive => "non-interactive",
        }
    }

    /// Whether the run moves funds.
    pub fn is_exchange(self) -> bool {
        !matches!(self, Self::QueryOnly)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = ExchangeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "query" => Ok(Self::QueryOnly),
            "interactive" => Ok(Self::Interactive),
            "non-interactive" | "noninteractive" => Ok(Self::NonInteractive),
            _ => Err(ExchangeError::InvalidMode {
                given: s.to_string(),
            }),
        }
    }
}
