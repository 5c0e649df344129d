//! Enumerate keys, verify a PIN and sign data.
//!
//! Demonstrates:
//! - Listing hardware key holders
//! - Reading certificate fields concurrently
//! - PIN verification and retry count
//! - Signing and verifying a challenge from `gen_random`
//!
//! Usage:
//!   cargo run --example 002_login_flow -- --pin 123456
//!   cargo run --example 002_login_flow -- --pin 123456 --port 4044
//!   cargo run --example 002_login_flow -- --pin 123456 --debug

mod common;

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

use common::Args;
use xtx_client::{CertKind, Client, DeviceType, Error, Result};

// ============================================================================
// Constants
// ============================================================================

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

const CERT_FIELDS: [CertKind; 4] = [
    CertKind::SubjectCn,
    CertKind::IssuerCn,
    CertKind::NotAfter,
    CertKind::Serial,
];

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
    println!("=== 002: Login Flow ===\n");

    let pin = args
        .pin
        .clone()
        .ok_or_else(|| Error::invalid_argument("--pin is required"))?;

    let mut builder = Client::builder().call_timeout(Duration::from_secs(120));
    if !args.ports.is_empty() {
        builder = builder.ports(args.ports.iter().copied());
    }
    let client = builder.build()?;

    client.connect().await;
    client.wait_connected(CONNECT_TIMEOUT).await?;

    // ========================================================================
    // Users
    // ========================================================================

    println!("[1] Listing hardware keys...");

    let users = client.get_user_list(DeviceType::Hard).await?;
    let Some(user) = users.first() else {
        println!("    ✗ No key inserted");
        client.disconnect().await;
        return Ok(());
    };

    for user in &users {
        println!("    ✓ {} ({})", user.username, user.cert_id);
    }
    println!();

    // ========================================================================
    // Certificate
    // ========================================================================

    println!("[2] Reading certificate of {}...", user.username);

    let cert = client.get_sign_cert(&user.cert_id).await?;
    let info = client.get_cert_info(&cert, Some(&CERT_FIELDS[..])).await?;
    for (kind, value) in info.iter() {
        println!("    {:<10} {value}", kind.name());
    }
    println!("    Valid: {}\n", client.validate_cert(&cert).await?);

    // ========================================================================
    // PIN
    // ========================================================================

    println!("[3] Verifying PIN...");

    if !client.verify_user_pin(&user.cert_id, &pin).await? {
        let left = client.get_user_pin_retry_count(&user.cert_id).await?;
        println!("    ✗ Wrong PIN, {left} attempts left");
        client.disconnect().await;
        return Ok(());
    }
    println!("    ✓ PIN accepted\n");

    // ========================================================================
    // Sign
    // ========================================================================

    println!("[4] Signing a challenge...");

    let challenge = client.gen_random(None).await?;
    let signature = client.sign_data(&user.cert_id, &challenge).await?;
    let verified = client
        .verify_signed_data(&cert, &challenge, &signature)
        .await?;

    println!("    Challenge: {challenge}");
    println!("    ✓ Signature verified: {verified}\n");

    println!("=== Login flow complete ===\n");

    common::wait_for_exit(args.no_wait).await;

    client.disconnect().await;
    Ok(())
}
