//! Live location monitoring example
//!
//! Run with: cargo run --example location_monitor

use lns_rust_ble::{LnsCentral, MonitorSnapshot, Result};
use std::io::Write;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (minimal)
    tracing_subscriber::fmt().with_env_filter("warn").init();

    println!("LNS Location Monitor");
    println!("====================\n");
    println!("Looking for an LNS peripheral...\n");

    let central = LnsCentral::new().await?;
    let mut updates = central.subscribe_updates();

    central.start().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n\nExiting...");
                break;
            }
            snapshot = updates.recv() => {
                match snapshot {
                    Ok(snapshot) => display(&snapshot),
                    Err(_) => break,
                }
            }
        }
    }

    central.shutdown().await?;

    Ok(())
}

fn display(snapshot: &MonitorSnapshot) {
    // Clear screen and move cursor to top
    print!("\x1B[2J\x1B[1;1H");

    println!("=== LNS Location Monitor ===");
    println!("Status: {}\n", snapshot.status_text());

    println!("{}\n", snapshot.coordinates_text());

    println!("Log:");
    println!("----");
    for entry in snapshot.log.iter() {
        println!("  {}", entry);
    }

    println!("\nPress Ctrl+C to exit");
    let _ = std::io::stdout().flush();
}
