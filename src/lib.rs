// Allow holding locks across await points - we use parking_lot which is designed for this
#![allow(clippy::await_holding_lock)]
// Allow derivable impls for clarity
#![allow(clippy::derivable_impls)]
// Allow unusual byte groupings for UUIDs which have standard format
#![allow(clippy::unusual_byte_groupings)]

//! # lns-rust-ble
//!
//! A cross-platform Rust library for receiving position fixes from a
//! Bluetooth Low Energy peripheral exposing the standard Location and
//! Navigation Service (LNS).
//!
//! The library discovers a nearby peripheral advertising the LNS service
//! (`0x1819`), connects to the first one it sees, subscribes to the
//! Location and Speed characteristic (`0x2A67`), and decodes the
//! fixed-point latitude/longitude out of each notification. Session state
//! (connection status, latest fix, a rolling log of the 20 most recent
//! events) is published as immutable snapshots over a channel.
//!
//! This is a single-session tool by design: one peripheral, one connect
//! attempt, no reconnection or retry policy. Discovery ranking is
//! first-seen-wins.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use lns_rust_ble::{LnsCentral, Result};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let central = LnsCentral::new().await?;
//!     let mut updates = central.subscribe_updates();
//!
//!     central.start().await?;
//!
//!     while let Ok(snapshot) = updates.recv().await {
//!         println!("[{}]", snapshot.status_text());
//!         if let Some(fix) = snapshot.last_fix {
//!             println!("{}", fix);
//!         }
//!     }
//!
//!     central.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Platform Notes
//!
//! ### macOS
//! Requires Bluetooth permission. Add `NSBluetoothAlwaysUsageDescription`
//! to your Info.plist for bundled apps.
//!
//! ### Linux
//! Requires BlueZ. User may need to be in the `bluetooth` group.
//!
//! ### Windows
//! Requires Windows 10 or later with Bluetooth LE support.
//!
//! ## Feature Flags
//!
//! - `serde`: Enable serialization/deserialization for data types

// Public modules
pub mod ble;
pub mod central;
pub mod data;
pub mod error;
pub mod monitor;

// Re-exports for convenience
pub use central::LnsCentral;
pub use error::{Error, Result};
pub use monitor::{Action, LocationMonitor, MonitorEvent, MonitorSnapshot};

// Re-export commonly used types from submodules
pub use ble::connection::ConnectionState;
pub use ble::uuids::{LNS_SERVICE_UUID, LOCATION_AND_SPEED_UUID};
pub use data::{EventLog, LocationFix, LogEntry, RawCoordinate, MAX_ENTRIES, MIN_PAYLOAD_LEN};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        // Verify that key types are exported
        let _ = std::any::TypeId::of::<LnsCentral>();
        let _ = std::any::TypeId::of::<LocationMonitor>();
        let _ = std::any::TypeId::of::<Error>();
        let _ = std::any::TypeId::of::<LocationFix>();
        let _ = std::any::TypeId::of::<EventLog>();
        let _ = std::any::TypeId::of::<ConnectionState>();
    }

    #[test]
    fn test_fixed_point_scale() {
        let coord = RawCoordinate::from_degrees(0.3);
        assert_eq!(coord.raw_value(), 3_000_000);
        assert_eq!(coord.to_degrees(), 0.3);
    }
}
