//! Data structures for location data.
//!
//! This module contains the core data types used to represent decoded
//! position fixes and the session event log.

pub mod event_log;
pub mod location;

pub use event_log::{EventLog, LogEntry, MAX_ENTRIES};
pub use location::{LocationFix, RawCoordinate, MIN_PAYLOAD_LEN};
