//! Terminal walkthrough of both exchange flows against the in-process
//! wallet and sponsor, followed by a sponsor that redirects the customer's
//! funds and is caught before any signature is produced.
//!
//! Run with:
//!   cargo run -p feesponsor-protocol --example demo

use std::time::Instant;

use feesponsor_protocol::runner::{Mode, RunReport, RunRequest};
use feesponsor_protocol::sandbox::{Sandbox, SANDBOX_DESTINATION};
use feesponsor_protocol::sponsor::TamperMode;
use feesponsor_protocol::transaction::Asset;

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

const GREEN: &str = "\x1b[32m";
const RED: &str = "\x1b[31m";
const CYAN: &str = "\x1b[36m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn section(title: &str) {
    println!("\n{BOLD}{CYAN}== {title} =={RESET}");
}

fn show(report: &RunReport, elapsed_ms: u128) {
    let phases: Vec<String> = report.phases.iter().map(|c| c.phase.to_string()).collect();
    println!("  {DIM}phases{RESET}   {}", phases.join(" -> "));
    println!("  {DIM}id{RESET}       {}", report.exchange_id.as_deref().unwrap_or("-"));
    println!("  {DIM}txid{RESET}     {}", report.txid.as_deref().unwrap_or("-"));
    println!(
        "  {DIM}amount{RESET}   {} (fee {} paid by sponsor)",
        report.amount.unwrap_or_default(),
        report.fee.unwrap_or_default()
    );
    println!("  {GREEN}broadcast in {elapsed_ms} ms{RESET}");
}

async fn exchange(title: &str, mode: Mode, sandbox: &Sandbox) {
    section(title);
    let started = Instant::now();
    match sandbox
        .runner
        .run(mode, &RunRequest::new(SANDBOX_DESTINATION))
        .await
    {
        Ok(report) => show(&report, started.elapsed().as_millis()),
        Err(e) => println!("  {RED}{BOLD}aborted{RESET} [{}] {e}", e.kind()),
    }
}

#[tokio::main]
async fn main() {
    let asset = Asset::new("BTC");

    let honest = Sandbox::new(asset.clone());
    println!("{BOLD}customer wallet{RESET} {}", honest.wallet.address());
    println!("{BOLD}sponsor{RESET}         {}", honest.sponsor.address());

    exchange("interactive", Mode::Interactive, &honest).await;
    exchange(
        "non-interactive",
        Mode::NonInteractive,
        &Sandbox::new(asset.clone()),
    )
    .await;
    exchange(
        "interactive, sponsor redirects the destination",
        Mode::Interactive,
        &Sandbox::with_tamper(asset, TamperMode::RedirectDestination),
    )
    .await;
}
