//! BLE communication module.
//!
//! This module provides low-level Bluetooth Low Energy functionality
//! for discovering and subscribing to LNS peripherals.

pub mod characteristics;
pub mod connection;
pub mod scanner;
pub mod uuids;

pub use characteristics::{CharacteristicHandler, NotificationEvent};
pub use connection::{ConnectionManager, ConnectionState};
pub use scanner::{DiscoveryEvent, LnsScanner};
pub use uuids::*;
