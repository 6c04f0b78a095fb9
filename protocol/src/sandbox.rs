//! In-process wiring of a funded [`MemoryWallet`] and a
//! [`SimulatedSponsor`] behind a [`ProtocolRunner`].
//!
//! Used by the CLI's `--sandbox` flag, the demo, the benches and the
//! end-to-end tests. Both collaborators are held in `Arc`s so callers can
//! inspect them after a run.

use std::sync::Arc;

use crate::crypto::keys::KeyPair;
use crate::runner::ProtocolRunner;
use crate::sponsor::{SimulatedSponsor, TamperMode};
use crate::transaction::Asset;
use crate::wallet::MemoryWallet;

/// Value of the coin a default sandbox wallet starts with (0.5 coin).
pub const SANDBOX_FUNDING: u64 = 50_000_000;

/// Fee the default simulated sponsor charges.
pub const SANDBOX_FEE: u64 = 2_000;

/// Where sandbox runs send funds unless told otherwise.
pub const SANDBOX_DESTINATION: &str = "sbx1destination";

pub type SandboxRunner = ProtocolRunner<Arc<MemoryWallet>, Arc<SimulatedSponsor>>;

pub struct Sandbox {
    pub wallet: Arc<MemoryWallet>,
    pub sponsor: Arc<SimulatedSponsor>,
    pub runner: SandboxRunner,
}

impl Sandbox {
    /// Honest sponsor, one funded coin.
    pub fn new(asset: Asset) -> Self {
        Self::builder(asset).build()
    }

    pub fn with_tamper(asset: Asset, tamper: TamperMode) -> Self {
        Self::builder(asset).tamper(tamper).build()
    }

    pub fn builder(asset: Asset) -> SandboxBuilder {
        SandboxBuilder {
            asset,
            coins: vec![SANDBOX_FUNDING],
            fee: SANDBOX_FEE,
            credit: None,
            tamper: TamperMode::None,
            seed: None,
        }
    }
}

pub struct SandboxBuilder {
    asset: Asset,
    coins: Vec<u64>,
    fee: u64,
    credit: Option<u64>,
    tamper: TamperMode,
    seed: Option<[u8; 32]>,
}

impl SandboxBuilder {
    /// Replace the wallet's starting coins.
    pub fn coins(mut self, coins: Vec<u64>) -> Self {
        self.coins = coins;
        self
    }

    pub fn fee(mut self, fee: u64) -> Self {
        self.fee = fee;
        self
    }

    pub fn credit(mut self, credit: u64) -> Self {
        self.credit = Some(credit);
        self
    }

    pub fn tamper(mut self, tamper: TamperMode) -> Self {
        self.tamper = tamper;
        self
    }

    /// Deterministic wallet key.
    pub fn seed(mut self, seed: [u8; 32]) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Sandbox {
        let keypair = match self.seed {
            Some(seed) => KeyPair::from_seed(&seed),
            None => KeyPair::generate(),
        };
        let wallet = Arc::new(MemoryWallet::new(keypair));
        for amount in &self.coins {
            wallet.fund(*amount);
        }

        let mut sponsor =
            SimulatedSponsor::new(self.asset.clone(), self.fee).with_tamper(self.tamper);
        if let Some(credit) = self.credit {
            sponsor = sponsor.with_credit(credit);
        }
        let sponsor = Arc::new(sponsor);

        let runner = ProtocolRunner::new(wallet.clone(), sponsor.clone(), self.asset);
        Sandbox {
            wallet,
            sponsor,
            runner,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::UnspentFilter;
    use crate::wallet::WalletBackend;

    #[tokio::test]
    async fn default_sandbox_holds_one_coin() {
        let sandbox = Sandbox::new(Asset::new("BTC"));
        let coins = sandbox
            .wallet
            .list_unspent(&UnspentFilter::for_source(None))
            .await
            .unwrap();
        assert_eq!(coins.len(), 1);
        assert_eq!(coins[0].amount, SANDBOX_FUNDING);
        assert_eq!(sandbox.sponsor.fee(), SANDBOX_FEE);
    }

    #[test]
    fn seeded_sandboxes_share_an_address() {
        let a = Sandbox::builder(Asset::new("BTC")).seed([1u8; 32]).build();
        let b = Sandbox::builder(Asset::new("BTC")).seed([1u8; 32]).build();
        assert_eq!(a.wallet.address(), b.wallet.address());
    }
}
