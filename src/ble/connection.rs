//! BLE connection management.
//!
//! Handles the single connection to an LNS peripheral.

use btleplug::api::Peripheral as _;
use btleplug::platform::Peripheral;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info};

use crate::error::{Error, Result};

/// Connection state for the tracked peripheral.
///
/// Transitions move forward only: `Disconnected` -> `Scanning` ->
/// `Connecting` -> `Connected` (the direct-connect path skips `Scanning`).
/// `Connected` is terminal for a session; a peripheral-side disconnect is
/// logged but does not roll the state back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ConnectionState {
    /// Not connected and not yet scanning.
    #[default]
    Disconnected,
    /// Scanning for a peripheral advertising the LNS service.
    Scanning,
    /// Currently attempting to connect.
    Connecting,
    /// Connected and subscribed (or subscribing).
    Connected,
}

impl ConnectionState {
    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if the session has begun looking for a peripheral.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Disconnected)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Scanning => write!(f, "Scanning..."),
            Self::Connecting => write!(f, "Connecting..."),
            Self::Connected => write!(f, "Connected"),
        }
    }
}

/// Event for connection state changes.
#[derive(Debug, Clone)]
pub struct ConnectionEvent {
    /// The identifier of the peripheral.
    pub identifier: String,
    /// The new connection state.
    pub state: ConnectionState,
}

/// Manages the connection to an LNS peripheral.
///
/// A single connect attempt, no retry and no timeout. A failed attempt is
/// surfaced to the caller, who logs it and moves on.
pub struct ConnectionManager {
    /// The peripheral to manage.
    peripheral: Peripheral,
    /// Current connection state.
    state: Arc<RwLock<ConnectionState>>,
    /// Channel for connection events.
    event_tx: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionManager {
    /// Create a new connection manager for a peripheral.
    pub fn new(peripheral: Peripheral) -> Self {
        let (event_tx, _) = broadcast::channel(16);

        Self {
            peripheral,
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            event_tx,
        }
    }

    /// Get the current connection state.
    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Check if connected.
    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Subscribe to connection events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }

    /// Get the peripheral.
    pub fn peripheral(&self) -> &Peripheral {
        &self.peripheral
    }

    /// Attempt to connect to the peripheral.
    ///
    /// Issues exactly one connect attempt and then discovers services.
    pub async fn connect(&self) -> Result<()> {
        if self.state().is_connected() {
            debug!("Already connected");
            return Ok(());
        }

        self.set_state(ConnectionState::Connecting);

        // The system may already hold the link (direct-connect path)
        if self.peripheral.is_connected().await.unwrap_or(false) {
            info!("Peripheral already connected at BLE level");
        } else {
            self.peripheral.connect().await.map_err(|e| {
                self.set_state(ConnectionState::Disconnected);
                Error::ConnectionFailed {
                    reason: e.to_string(),
                }
            })?;
            info!("Successfully connected to LNS peripheral");
        }

        self.set_state(ConnectionState::Connected);
        Ok(())
    }

    /// Run GATT service discovery on the connected peripheral.
    pub async fn discover_services(&self) -> Result<()> {
        if !self.state().is_connected() {
            return Err(Error::NotConnected);
        }

        self.peripheral
            .discover_services()
            .await
            .map_err(Error::Bluetooth)
    }

    /// Disconnect from the peripheral. Only used during shutdown.
    pub async fn disconnect(&self) -> Result<()> {
        if !self.state().is_connected() {
            return Ok(());
        }

        match self.peripheral.disconnect().await {
            Ok(_) => {
                info!("Disconnected from LNS peripheral");
                self.set_state(ConnectionState::Disconnected);
                Ok(())
            }
            Err(e) => {
                error!("Failed to disconnect: {}", e);
                self.set_state(ConnectionState::Disconnected);
                Err(Error::Bluetooth(e))
            }
        }
    }

    /// Update the connection state and emit an event.
    fn set_state(&self, new_state: ConnectionState) {
        let old_state = {
            let mut state = self.state.write();
            let old = *state;
            *state = new_state;
            old
        };

        if old_state != new_state {
            debug!("Connection state changed: {} -> {}", old_state, new_state);

            let _ = self.event_tx.send(ConnectionEvent {
                identifier: format!("{:?}", self.peripheral.id()),
                state: new_state,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_state() {
        assert!(!ConnectionState::Disconnected.is_connected());
        assert!(ConnectionState::Connected.is_connected());
        assert!(!ConnectionState::Connecting.is_connected());

        assert!(!ConnectionState::Disconnected.is_active());
        assert!(ConnectionState::Scanning.is_active());
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Connected.is_active());
    }

    #[test]
    fn test_connection_state_display() {
        assert_eq!(format!("{}", ConnectionState::Disconnected), "Disconnected");
        assert_eq!(format!("{}", ConnectionState::Scanning), "Scanning...");
        assert_eq!(format!("{}", ConnectionState::Connecting), "Connecting...");
        assert_eq!(format!("{}", ConnectionState::Connected), "Connected");
    }

    #[test]
    fn test_connection_state_default() {
        assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
    }
}
