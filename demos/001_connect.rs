//! Connect to the middleware and watch events.
//!
//! Demonstrates:
//! - Building a Client with default or custom ports
//! - Waiting for the socket and reading the connectivity status
//! - Querying the middleware version
//! - Observing push events (insert or remove a USB key while waiting)
//!
//! Usage:
//!   cargo run --example 001_connect
//!   cargo run --example 001_connect -- --port 4044
//!   cargo run --example 001_connect -- --no-wait
//!   cargo run --example 001_connect -- --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::Args;
use xtx_client::{Client, Result};

// ============================================================================
// Constants
// ============================================================================

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    let args = Args::parse();
    common::init_logging(args.debug);

    if let Err(e) = run(args).await {
        eprintln!("\n[ERROR] {e}");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    println!("=== 001: Connect ===\n");

    // ========================================================================
    // Build Client
    // ========================================================================

    println!("[1] Building client...");

    let mut builder = Client::builder();
    if !args.ports.is_empty() {
        builder = builder.ports(args.ports.iter().copied());
    }
    let client = builder.build()?;

    for url in client.endpoint().candidates() {
        println!("    Candidate: {url}");
    }
    println!("    ✓ Client ready\n");

    common::spawn_event_printer(client.subscribe());

    // ========================================================================
    // Connect
    // ========================================================================

    println!("[2] Connecting...");

    client.connect().await;
    client.wait_connected(CONNECT_TIMEOUT).await?;

    println!("    ✓ Status: {:?}\n", client.status());

    // ========================================================================
    // Version
    // ========================================================================

    println!("[3] Querying version...");

    let version = client.get_version().await?;
    println!("    ✓ Middleware version: {version}\n");

    println!("=== Connected; insert or remove a key to see push events ===\n");

    common::wait_for_exit(args.no_wait).await;

    // ========================================================================
    // Cleanup
    // ========================================================================

    println!("\n[Cleanup] Disconnecting...");
    client.disconnect().await;
    println!("          ✓ Done");

    Ok(())
}
