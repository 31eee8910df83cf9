//! Session state machine.
//!
//! All session state lives here, behind a single handler that consumes
//! tagged [`MonitorEvent`]s and returns the BLE [`Action`]s to execute.
//! Display state is never shared mutably; after every event the monitor
//! publishes an immutable [`MonitorSnapshot`] over a broadcast channel for
//! the presentation layer to consume.

use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::ble::connection::ConnectionState;
use crate::data::{EventLog, LocationFix};

/// A platform callback, reified.
///
/// One variant per delegate callback in the central/peripheral flow. The BLE
/// driver translates btleplug events into these and feeds them to the
/// monitor.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// The Bluetooth radio changed power state.
    RadioStateChanged {
        /// Whether the radio is now powered on.
        powered_on: bool,
    },
    /// A peripheral advertising the LNS service was found.
    PeripheralDiscovered {
        /// Advertised local name, if any.
        name: Option<String>,
        /// True when the peripheral was already connected system-wide
        /// before any scan started.
        already_connected: bool,
    },
    /// The connection attempt succeeded.
    Connected,
    /// The LNS service was discovered on the peripheral.
    ServiceFound,
    /// The Location and Speed characteristic was discovered.
    CharacteristicFound,
    /// A notification payload arrived.
    ValueUpdated(Vec<u8>),
}

/// A BLE side effect the driver must execute.
///
/// Returned by [`LocationMonitor::handle`] in execution order.
///
/// The driver honours one extra contract around `StartScan`: before
/// executing it, the driver checks for a system-connected LNS peripheral
/// and, on a hit, feeds `PeripheralDiscovered { already_connected: true }`
/// instead of scanning. Scanning is skipped entirely on that path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Begin scanning for LNS peripherals.
    StartScan,
    /// Stop the active scan.
    StopScan,
    /// Connect to the discovered peripheral.
    Connect,
    /// Discover the LNS service on the connected peripheral.
    DiscoverService,
    /// Locate the Location and Speed characteristic.
    DiscoverCharacteristic,
    /// Enable notifications on the characteristic.
    Subscribe,
}

/// Immutable view of the session, published after every event.
#[derive(Debug, Clone)]
pub struct MonitorSnapshot {
    /// Current connection state.
    pub status: ConnectionState,
    /// Most recently decoded fix, if any.
    pub last_fix: Option<LocationFix>,
    /// Rolling session log.
    pub log: EventLog,
}

impl MonitorSnapshot {
    /// Status line for display.
    pub fn status_text(&self) -> String {
        self.status.to_string()
    }

    /// Coordinate text for display, or a placeholder before the first fix.
    pub fn coordinates_text(&self) -> String {
        match &self.last_fix {
            Some(fix) => fix.to_string(),
            None => "Waiting...".to_string(),
        }
    }
}

/// The single explicit state-machine handler for a session.
///
/// Transitions are one-way: Disconnected -> Scanning -> Connecting ->
/// Connected (the direct-connect path skips Scanning at the driver level).
/// Events that are not meaningful in the current state are silently
/// dropped. At most one peripheral is tracked per session and exactly one
/// connect is ever issued.
pub struct LocationMonitor {
    /// Current connection state.
    status: ConnectionState,
    /// Most recently decoded fix.
    last_fix: Option<LocationFix>,
    /// Rolling session log.
    log: EventLog,
    /// Whether a connect has already been issued this session.
    connect_issued: bool,
    /// Snapshot channel to the presentation layer.
    snapshot_tx: broadcast::Sender<MonitorSnapshot>,
}

impl LocationMonitor {
    /// Create a new monitor in the Disconnected state.
    pub fn new() -> Self {
        let (snapshot_tx, _) = broadcast::channel(64);

        Self {
            status: ConnectionState::Disconnected,
            last_fix: None,
            log: EventLog::new(),
            connect_issued: false,
            snapshot_tx,
        }
    }

    /// Get the current connection state.
    pub fn status(&self) -> ConnectionState {
        self.status
    }

    /// Get the most recently decoded fix.
    pub fn last_fix(&self) -> Option<LocationFix> {
        self.last_fix
    }

    /// Subscribe to state snapshots.
    pub fn subscribe(&self) -> broadcast::Receiver<MonitorSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// Build a snapshot of the current state.
    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            status: self.status,
            last_fix: self.last_fix,
            log: self.log.clone(),
        }
    }

    /// Consume one event, returning the actions to execute in order.
    ///
    /// Publishes a snapshot after every call.
    pub fn handle(&mut self, event: MonitorEvent) -> Vec<Action> {
        let actions = match event {
            MonitorEvent::RadioStateChanged { powered_on } => self.on_radio_state(powered_on),
            MonitorEvent::PeripheralDiscovered {
                name,
                already_connected,
            } => self.on_discovered(name, already_connected),
            MonitorEvent::Connected => self.on_connected(),
            MonitorEvent::ServiceFound => self.on_service_found(),
            MonitorEvent::CharacteristicFound => self.on_characteristic_found(),
            MonitorEvent::ValueUpdated(data) => self.on_value_updated(&data),
        };

        let _ = self.snapshot_tx.send(self.snapshot());

        actions
    }

    fn on_radio_state(&mut self, powered_on: bool) -> Vec<Action> {
        if !powered_on || self.status != ConnectionState::Disconnected {
            return vec![];
        }

        self.log("Bluetooth ON.");
        self.status = ConnectionState::Scanning;
        vec![Action::StartScan]
    }

    fn on_discovered(&mut self, name: Option<String>, already_connected: bool) -> Vec<Action> {
        // First-discovered wins; anything after the first connect is ignored
        if self.status != ConnectionState::Scanning || self.connect_issued {
            debug!("Ignoring discovery in state {}", self.status);
            return vec![];
        }

        let name = name.unwrap_or_else(|| "Unknown".to_string());

        if already_connected {
            self.log(format!("Found System-Connected Device: {}", name));
        } else {
            self.log(format!("Found: {}", name));
        }

        self.status = ConnectionState::Connecting;
        self.connect_issued = true;

        if already_connected {
            // No scan was started on this path, nothing to stop
            vec![Action::Connect]
        } else {
            vec![Action::StopScan, Action::Connect]
        }
    }

    fn on_connected(&mut self) -> Vec<Action> {
        if self.status != ConnectionState::Connecting {
            return vec![];
        }

        self.status = ConnectionState::Connected;
        self.log("Connected! Subscribing...");
        vec![Action::DiscoverService]
    }

    fn on_service_found(&mut self) -> Vec<Action> {
        if self.status != ConnectionState::Connected {
            return vec![];
        }
        vec![Action::DiscoverCharacteristic]
    }

    fn on_characteristic_found(&mut self) -> Vec<Action> {
        if self.status != ConnectionState::Connected {
            return vec![];
        }
        vec![Action::Subscribe]
    }

    fn on_value_updated(&mut self, data: &[u8]) -> Vec<Action> {
        // Short payloads are dropped, last fix stays as-is
        if let Some(fix) = LocationFix::from_notification(data) {
            self.last_fix = Some(fix);
        }
        vec![]
    }

    fn log(&mut self, message: impl Into<String>) {
        let message = message.into();
        info!("{}", message);
        self.log.push(message);
    }
}

impl Default for LocationMonitor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn discovered(name: &str) -> MonitorEvent {
        MonitorEvent::PeripheralDiscovered {
            name: Some(name.to_string()),
            already_connected: false,
        }
    }

    fn payload(latitude: i32, longitude: i32) -> Vec<u8> {
        let mut data = vec![0u8; 10];
        data[2..6].copy_from_slice(&latitude.to_le_bytes());
        data[6..10].copy_from_slice(&longitude.to_le_bytes());
        data
    }

    #[test]
    fn test_radio_on_starts_scan() {
        let mut monitor = LocationMonitor::new();

        let actions = monitor.handle(MonitorEvent::RadioStateChanged { powered_on: true });
        assert_eq!(actions, vec![Action::StartScan]);
        assert_eq!(monitor.status(), ConnectionState::Scanning);
        assert_eq!(monitor.snapshot().log.latest().unwrap().message, "Bluetooth ON.");
    }

    #[test]
    fn test_radio_off_is_ignored() {
        let mut monitor = LocationMonitor::new();

        let actions = monitor.handle(MonitorEvent::RadioStateChanged { powered_on: false });
        assert!(actions.is_empty());
        assert_eq!(monitor.status(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_discovery_stops_scan_before_connecting() {
        let mut monitor = LocationMonitor::new();
        monitor.handle(MonitorEvent::RadioStateChanged { powered_on: true });

        let actions = monitor.handle(discovered("LNS-Peripheral"));
        assert_eq!(actions, vec![Action::StopScan, Action::Connect]);
        assert_eq!(monitor.status(), ConnectionState::Connecting);
        assert_eq!(
            monitor.snapshot().log.latest().unwrap().message,
            "Found: LNS-Peripheral"
        );
    }

    #[test]
    fn test_first_discovered_wins() {
        let mut monitor = LocationMonitor::new();
        monitor.handle(MonitorEvent::RadioStateChanged { powered_on: true });

        let first = monitor.handle(discovered("first"));
        let second = monitor.handle(discovered("second"));
        let third = monitor.handle(discovered("third"));

        // Exactly one connect attempt across the session
        assert_eq!(first, vec![Action::StopScan, Action::Connect]);
        assert!(second.is_empty());
        assert!(third.is_empty());
        assert_eq!(
            monitor.snapshot().log.latest().unwrap().message,
            "Found: first"
        );
    }

    #[test]
    fn test_system_connected_device_skips_scanning() {
        let mut monitor = LocationMonitor::new();
        monitor.handle(MonitorEvent::RadioStateChanged { powered_on: true });

        let actions = monitor.handle(MonitorEvent::PeripheralDiscovered {
            name: Some("Watch".to_string()),
            already_connected: true,
        });

        // Direct connect, no StopScan since no scan ran
        assert_eq!(actions, vec![Action::Connect]);
        assert_eq!(
            monitor.snapshot().log.latest().unwrap().message,
            "Found System-Connected Device: Watch"
        );
    }

    #[test]
    fn test_unnamed_peripheral_logged_as_unknown() {
        let mut monitor = LocationMonitor::new();
        monitor.handle(MonitorEvent::RadioStateChanged { powered_on: true });

        monitor.handle(MonitorEvent::PeripheralDiscovered {
            name: None,
            already_connected: false,
        });
        assert_eq!(
            monitor.snapshot().log.latest().unwrap().message,
            "Found: Unknown"
        );
    }

    #[test]
    fn test_subscription_sequence() {
        let mut monitor = LocationMonitor::new();
        monitor.handle(MonitorEvent::RadioStateChanged { powered_on: true });
        monitor.handle(discovered("LNS-Peripheral"));

        assert_eq!(
            monitor.handle(MonitorEvent::Connected),
            vec![Action::DiscoverService]
        );
        assert_eq!(monitor.status(), ConnectionState::Connected);
        assert_eq!(
            monitor.snapshot().log.latest().unwrap().message,
            "Connected! Subscribing..."
        );

        assert_eq!(
            monitor.handle(MonitorEvent::ServiceFound),
            vec![Action::DiscoverCharacteristic]
        );
        assert_eq!(
            monitor.handle(MonitorEvent::CharacteristicFound),
            vec![Action::Subscribe]
        );
    }

    #[test]
    fn test_out_of_order_events_are_dropped() {
        let mut monitor = LocationMonitor::new();

        // Nothing is meaningful before the radio powers on
        assert!(monitor.handle(discovered("early")).is_empty());
        assert!(monitor.handle(MonitorEvent::Connected).is_empty());
        assert!(monitor.handle(MonitorEvent::ServiceFound).is_empty());
        assert_eq!(monitor.status(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_value_updated_decodes_fix() {
        let mut monitor = connected_monitor();

        let actions = monitor.handle(MonitorEvent::ValueUpdated(payload(3_000_000, 0)));
        assert!(actions.is_empty());

        let fix = monitor.last_fix().unwrap();
        assert_eq!(fix.latitude_degrees(), 0.3);
        assert_eq!(fix.longitude_degrees(), 0.0);
    }

    #[test]
    fn test_short_payload_keeps_previous_fix() {
        let mut monitor = connected_monitor();
        monitor.handle(MonitorEvent::ValueUpdated(payload(3_000_000, -7_500_000)));
        let before = monitor.last_fix();

        monitor.handle(MonitorEvent::ValueUpdated(vec![0u8; 9]));
        monitor.handle(MonitorEvent::ValueUpdated(vec![]));

        assert_eq!(monitor.last_fix(), before);
    }

    #[test]
    fn test_snapshot_published_per_event() {
        let mut monitor = LocationMonitor::new();
        let mut rx = monitor.subscribe();

        monitor.handle(MonitorEvent::RadioStateChanged { powered_on: true });
        monitor.handle(discovered("LNS-Peripheral"));

        let first = rx.try_recv().unwrap();
        assert_eq!(first.status, ConnectionState::Scanning);

        let second = rx.try_recv().unwrap();
        assert_eq!(second.status, ConnectionState::Connecting);
    }

    #[test]
    fn test_snapshot_display_text() {
        let monitor = LocationMonitor::new();
        assert_eq!(monitor.snapshot().status_text(), "Disconnected");
        assert_eq!(monitor.snapshot().coordinates_text(), "Waiting...");

        let mut monitor = connected_monitor();
        monitor.handle(MonitorEvent::ValueUpdated(payload(522_008_800, -43_218_700)));
        assert_eq!(monitor.snapshot().status_text(), "Connected");
        assert_eq!(
            monitor.snapshot().coordinates_text(),
            "Lat: 52.20088\nLon: -4.32187"
        );
    }

    fn connected_monitor() -> LocationMonitor {
        let mut monitor = LocationMonitor::new();
        monitor.handle(MonitorEvent::RadioStateChanged { powered_on: true });
        monitor.handle(discovered("LNS-Peripheral"));
        monitor.handle(MonitorEvent::Connected);
        monitor.handle(MonitorEvent::ServiceFound);
        monitor.handle(MonitorEvent::CharacteristicFound);
        monitor
    }
}
