// Copyright (c) 2026 Feesponsor Contributors. MIT License.
// See LICENSE for details.

//! # Feesponsor
//!
//! Entry point for the `feesponsor` binary. Parses arguments, initializes
//! logging, wires the wallet and sponsor clients (or the in-process sandbox)
//! into a protocol runner, executes one run and prints its report as JSON.
//!
//! Exit status is non-zero on any failure; the error chain names the
//! failing step.

mod cli;
mod logging;

use anyhow::{Context, Result};
use clap::Parser;

use feesponsor_protocol::runner::{ProtocolRunner, RunReport, RunRequest};
use feesponsor_protocol::sandbox::{Sandbox, SANDBOX_DESTINATION};
use feesponsor_protocol::sponsor::HttpSponsor;
use feesponsor_protocol::wallet::RpcWallet;

use cli::FeesponsorCli;
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = FeesponsorCli::parse();
    logging::init_logging(&cli.log_level, LogFormat::from_str_lossy(&cli.log_format));

    tracing::info!(
        mode = %cli.mode,
        asset = %cli.asset,
        sandbox = cli.sandbox,
        version = feesponsor_protocol::config::PROTOCOL_VERSION,
        "starting feesponsor"
    );

    let report = if cli.sandbox {
        run_sandbox(&cli).await?
    } else {
        run_remote(&cli).await?
    };

    let rendered = serde_json::to_string_pretty(&report).context("failed to render run report")?;
    println!("{rendered}");
    Ok(())
}

fn request(cli: &FeesponsorCli, fallback_destination: Option<&str>) -> RunRequest {
    let destination = match (cli.destination.trim(), fallback_destination) {
        ("", Some(fallback)) => fallback,
        (given, _) => given,
    };
    let request = RunRequest::new(destination);
    match &cli.source {
        Some(source) => request.with_source(source),
        None => request,
    }
}

/// Run against the configured wallet node and sponsor service.
async fn run_remote(cli: &FeesponsorCli) -> Result<RunReport> {
    let (mode, config) = cli.remote_settings().context("invalid invocation")?;

    let wallet = RpcWallet::new(config.wallet.clone()).context("failed to build wallet client")?;
    let sponsor = HttpSponsor::new(&config.sponsor).context("failed to build sponsor client")?;
    let runner = ProtocolRunner::new(wallet, sponsor, config.sponsor.asset.clone());

    runner
        .run(mode, &request(cli, None))
        .await
        .with_context(|| format!("{mode} run failed"))
}

/// Run against an in-process wallet and simulated sponsor.
async fn run_sandbox(cli: &FeesponsorCli) -> Result<RunReport> {
    let mode = cli.mode().context("invalid invocation")?;
    let sandbox = Sandbox::new(cli.asset());
    tracing::info!(
        wallet = %sandbox.wallet.address(),
        sponsor = %sandbox.sponsor.address(),
        "sandbox collaborators ready"
    );

    sandbox
        .runner
        .run(mode, &request(cli, Some(SANDBOX_DESTINATION)))
        .await
        .with_context(|| format!("sandbox {mode} run failed"))
}
