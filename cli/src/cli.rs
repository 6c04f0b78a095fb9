//! # CLI Interface
//!
//! Command-line arguments for `feesponsor` using `clap` derive. Every
//! collaborator setting has an environment fallback so credentials never
//! need to appear on the command line.

use clap::Parser;
use std::time::Duration;

use feesponsor_protocol::config::{
    ClientConfig, Credentials, EndpointConfig, SponsorConfig, WalletConfig, DEFAULT_ASSET,
    DEFAULT_SPONSOR_ENDPOINT, DEFAULT_WALLET_ENDPOINT,
};
use feesponsor_protocol::error::Result;
use feesponsor_protocol::runner::Mode;
use feesponsor_protocol::transaction::Asset;

/// Move funds on a UTXO ledger with the network fee paid by a sponsor.
#[derive(Parser, Debug)]
#[command(name = "feesponsor", version, about)]
pub struct FeesponsorCli {
    /// Run mode: query, interactive or non-interactive.
    ///
    /// Kept as a plain string so an unknown value is reported as an
    /// invalid mode by the protocol itself.
    #[arg(long, short = 'm', env = "FEESPONSOR_MODE", default_value = "query")]
    pub mode: String,

    /// Address that receives the full swept amount.
    #[arg(long, short = 'd', env = "FEESPONSOR_DESTINATION", default_value = "")]
    pub destination: String,

    /// Only spend coins held at this address.
    #[arg(long, short = 's', env = "FEESPONSOR_SOURCE")]
    pub source: Option<String>,

    /// Ledger identifier the exchange is opened on.
    #[arg(long, env = "FEESPONSOR_ASSET", default_value = DEFAULT_ASSET)]
    pub asset: String,

    /// Wallet JSON-RPC endpoint.
    #[arg(long, env = "FEESPONSOR_WALLET_URL", default_value = DEFAULT_WALLET_ENDPOINT)]
    pub wallet_url: String,

    /// Named wallet on a multi-wallet node.
    #[arg(long, env = "FEESPONSOR_WALLET_NAME")]
    pub wallet_name: Option<String>,

    #[arg(long, env = "FEESPONSOR_WALLET_USER")]
    pub wallet_user: Option<String>,

    #[arg(long, env = "FEESPONSOR_WALLET_PASSWORD", hide_env_values = true)]
    pub wallet_password: Option<String>,

    /// Sponsor REST endpoint.
    #[arg(long, env = "FEESPONSOR_SPONSOR_URL", default_value = DEFAULT_SPONSOR_ENDPOINT)]
    pub sponsor_url: String,

    /// Bearer token for the sponsor API.
    #[arg(long, env = "FEESPONSOR_SPONSOR_TOKEN", hide_env_values = true)]
    pub sponsor_token: Option<String>,

    /// Per-request timeout for both collaborators, in seconds.
    #[arg(long, env = "FEESPONSOR_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Use the in-process wallet and sponsor instead of remote services.
    #[arg(long)]
    pub sandbox: bool,

    /// Log output format: pretty or json.
    #[arg(long, env = "FEESPONSOR_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Default log directive when `RUST_LOG` is unset.
    #[arg(long, env = "FEESPONSOR_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl FeesponsorCli {
    pub fn mode(&self) -> Result<Mode> {
        self.mode.parse()
    }

    /// Mode and validated collaborator configuration for a remote run. The
    /// mode is checked first, so a bad mode is reported as such whatever
    /// else is wrong.
    pub fn remote_settings(&self) -> Result<(Mode, ClientConfig)> {
        let mode = self.mode()?;
        let config = self.client_config();
        config.validate()?;
        Ok((mode, config))
    }

    /// Collaborator configuration from flags and environment.
    pub fn client_config(&self) -> ClientConfig {
        let timeout = Duration::from_secs(self.timeout_secs);

        let wallet_credentials = match (&self.wallet_user, &self.wallet_password) {
            (Some(username), password) => Credentials::Basic {
                username: username.clone(),
                password: password.clone().unwrap_or_default(),
            },
            (None, _) => Credentials::None,
        };
        let sponsor_credentials = match &self.sponsor_token {
            Some(token) => Credentials::Bearer {
                token: token.clone(),
            },
            None => Credentials::None,
        };

        ClientConfig {
            wallet: WalletConfig {
                rpc: EndpointConfig::new(&self.wallet_url)
                    .with_credentials(wallet_credentials)
                    .with_timeout(timeout),
                wallet_name: self.wallet_name.clone(),
            },
            sponsor: SponsorConfig {
                api: EndpointConfig::new(&self.sponsor_url)
                    .with_credentials(sponsor_credentials)
                    .with_timeout(timeout),
                asset: self.asset(),
            },
        }
    }

    pub fn asset(&self) -> Asset {
        Asset::new(self.asset.trim())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use feesponsor_protocol::error::ExchangeError;

    #[test]
    fn verify_cli_structure() {
        FeesponsorCli::command().debug_assert();
    }

    #[test]
    fn credentials_come_from_flags() {
        let cli = FeesponsorCli::parse_from([
            "feesponsor",
            "--mode",
            "interactive",
            "--destination",
            "bcrt1qdest",
            "--wallet-user",
            "alice",
            "--wallet-password",
            "hunter2",
            "--sponsor-token",
            "tok",
            "--timeout-secs",
            "5",
        ]);
        let config = cli.client_config();
        assert_eq!(
            config.wallet.rpc.credentials,
            Credentials::Basic {
                username: "alice".to_string(),
                password: "hunter2".to_string(),
            }
        );
        assert_eq!(
            config.sponsor.api.credentials,
            Credentials::Bearer {
                token: "tok".to_string()
            }
        );
        assert_eq!(config.sponsor.api.timeout, Duration::from_secs(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn bad_mode_is_reported_before_bad_endpoint() {
        let cli = FeesponsorCli::parse_from([
            "feesponsor",
            "--mode",
            "sideways",
            "--wallet-url",
            "ftp://wallet",
        ]);
        match cli.remote_settings() {
            Err(ExchangeError::InvalidMode { given }) => assert_eq!(given, "sideways"),
            other => panic!("expected InvalidMode, got {other:?}"),
        }

        let cli = FeesponsorCli::parse_from([
            "feesponsor",
            "--mode",
            "interactive",
            "--wallet-url",
            "ftp://wallet",
        ]);
        assert!(matches!(
            cli.remote_settings(),
            Err(ExchangeError::InvalidConfig { .. })
        ));
    }
}
