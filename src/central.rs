//! Central manager for a single LNS session.
//!
//! Owns the BLE side of the pipeline: it translates btleplug callbacks into
//! [`MonitorEvent`]s, feeds them through the [`LocationMonitor`] state
//! machine, and executes the [`Action`]s the monitor returns. At most one
//! peripheral is tracked per session.
//!
//! Errors at any step (connect, discovery, subscribe) are logged and
//! otherwise dropped: no retry, no state rollback. A peripheral-side
//! disconnect after the session reaches Connected is logged but leaves the
//! displayed state as-is.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

use crate::ble::characteristics::CharacteristicHandler;
use crate::ble::connection::ConnectionManager;
use crate::ble::scanner::{DiscoveryEvent, LnsScanner};
use crate::ble::uuids::LNS_SERVICE_UUID;
use crate::error::Result;
use crate::monitor::{Action, LocationMonitor, MonitorEvent, MonitorSnapshot};

/// Live handles for the tracked peripheral.
#[derive(Default)]
struct Session {
    /// The discovered peripheral, pending or connected.
    discovery: Option<DiscoveryEvent>,
    /// Connection manager, once a connect was issued.
    connection: Option<Arc<ConnectionManager>>,
    /// Characteristic handler, once the service was found.
    characteristics: Option<Arc<CharacteristicHandler>>,
}

/// Central manager driving one discover-connect-subscribe session.
pub struct LnsCentral {
    /// BLE scanner.
    scanner: Arc<LnsScanner>,
    /// Session state machine.
    monitor: Arc<RwLock<LocationMonitor>>,
    /// Live BLE handles for the tracked peripheral.
    session: Arc<RwLock<Session>>,
    /// Inbox feeding the driver task.
    event_tx: mpsc::UnboundedSender<MonitorEvent>,
    /// Receiver half, handed to the driver task on start.
    event_rx: RwLock<Option<mpsc::UnboundedReceiver<MonitorEvent>>>,
    /// Driver task handle.
    driver_handle: RwLock<Option<tokio::task::JoinHandle<()>>>,
    /// Running flag.
    is_running: Arc<AtomicBool>,
}

impl LnsCentral {
    /// Create a new central manager.
    ///
    /// # Errors
    ///
    /// Returns an error if Bluetooth is not available.
    pub async fn new() -> Result<Self> {
        let scanner = LnsScanner::new().await?;
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        Ok(Self {
            scanner: Arc::new(scanner),
            monitor: Arc::new(RwLock::new(LocationMonitor::new())),
            session: Arc::new(RwLock::new(Session::default())),
            event_tx,
            event_rx: RwLock::new(Some(event_rx)),
            driver_handle: RwLock::new(None),
            is_running: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Start the session.
    ///
    /// Kicks off the pipeline: radio check, system-connected lookup, scan,
    /// connect, service and characteristic discovery, subscribe. Progress
    /// is observable through [`subscribe_updates`](Self::subscribe_updates).
    pub async fn start(&self) -> Result<()> {
        if self.is_running.swap(true, Ordering::SeqCst) {
            debug!("Already started");
            return Ok(());
        }

        info!("Starting LNS session");

        let mut event_rx = match self.event_rx.write().take() {
            Some(rx) => rx,
            None => {
                self.is_running.store(false, Ordering::SeqCst);
                return Err(crate::error::Error::Internal(
                    "session already consumed; create a new LnsCentral".to_string(),
                ));
            }
        };

        let scanner = self.scanner.clone();
        let monitor = self.monitor.clone();
        let session = self.session.clone();
        let event_tx = self.event_tx.clone();
        let is_running = self.is_running.clone();

        let handle = tokio::spawn(async move {
            while is_running.load(Ordering::SeqCst) {
                let event = match event_rx.recv().await {
                    Some(event) => event,
                    None => break,
                };

                let actions = monitor.write().handle(event);

                for action in actions {
                    Self::execute(action, &scanner, &session, &event_tx).await;
                }
            }

            debug!("Driver task ended");
        });

        *self.driver_handle.write() = Some(handle);

        // The adapter exists, so the radio is up. This is the one radio
        // callback btleplug surfaces portably.
        let _ = self.event_tx.send(MonitorEvent::RadioStateChanged { powered_on: true });

        Ok(())
    }

    /// Subscribe to state snapshots.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<MonitorSnapshot> {
        self.monitor.read().subscribe()
    }

    /// Get a snapshot of the current session state.
    pub fn snapshot(&self) -> MonitorSnapshot {
        self.monitor.read().snapshot()
    }

    /// Clean shutdown of the session.
    pub async fn shutdown(&self) -> Result<()> {
        if !self.is_running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        info!("Shutting down LNS session");

        if let Some(handle) = self.driver_handle.write().take() {
            handle.abort();
        }

        if self.scanner.is_scanning() {
            self.scanner.stop_scanning().await?;
        }

        let (characteristics, connection) = {
            let mut session = self.session.write();
            (session.characteristics.take(), session.connection.take())
        };

        if let Some(characteristics) = characteristics {
            characteristics.stop_notifications().await;
            if let Err(e) = characteristics.unsubscribe().await {
                debug!("Unsubscribe during shutdown failed: {}", e);
            }
        }

        if let Some(connection) = connection {
            if let Err(e) = connection.disconnect().await {
                warn!("Error disconnecting: {}", e);
            }
        }

        Ok(())
    }

    /// Execute one BLE action on behalf of the monitor.
    ///
    /// Failures are logged and swallowed; the pipeline simply does not
    /// advance past a failed step.
    async fn execute(
        action: Action,
        scanner: &Arc<LnsScanner>,
        session: &Arc<RwLock<Session>>,
        event_tx: &mpsc::UnboundedSender<MonitorEvent>,
    ) {
        match action {
            Action::StartScan => {
                // A peripheral the system already holds a link to wins over
                // active scanning
                if let Some(discovery) = scanner.system_connected_peripheral().await {
                    let name = discovery.local_name.clone();
                    session.write().discovery = Some(discovery);
                    let _ = event_tx.send(MonitorEvent::PeripheralDiscovered {
                        name,
                        already_connected: true,
                    });
                    return;
                }

                if let Err(e) = scanner.start_scanning().await {
                    error!("Failed to start scanning: {}", e);
                    return;
                }

                // Forward the first discovery only; the monitor stops the
                // scan as soon as it sees one
                let mut rx = scanner.subscribe();
                let session = session.clone();
                let event_tx = event_tx.clone();
                tokio::spawn(async move {
                    if let Ok(discovery) = rx.recv().await {
                        let name = discovery.local_name.clone();
                        session.write().discovery = Some(discovery);
                        let _ = event_tx.send(MonitorEvent::PeripheralDiscovered {
                            name,
                            already_connected: false,
                        });
                    }
                });
            }
            Action::StopScan => {
                if let Err(e) = scanner.stop_scanning().await {
                    error!("Failed to stop scanning: {}", e);
                }
            }
            Action::Connect => {
                let peripheral = match session.read().discovery.as_ref() {
                    Some(d) => d.peripheral.clone(),
                    None => {
                        error!("Connect requested without a discovered peripheral");
                        return;
                    }
                };

                let connection = Arc::new(ConnectionManager::new(peripheral));
                session.write().connection = Some(connection.clone());

                match connection.connect().await {
                    Ok(()) => {
                        let _ = event_tx.send(MonitorEvent::Connected);
                    }
                    Err(e) => error!("Connection failed: {}", e),
                }
            }
            Action::DiscoverService => {
                let connection = match session.read().connection.clone() {
                    Some(c) => c,
                    None => return,
                };

                if let Err(e) = connection.discover_services().await {
                    error!("Service discovery failed: {}", e);
                    return;
                }

                use btleplug::api::Peripheral as _;
                let has_lns = connection
                    .peripheral()
                    .services()
                    .iter()
                    .any(|s| s.uuid == LNS_SERVICE_UUID);

                if has_lns {
                    let _ = event_tx.send(MonitorEvent::ServiceFound);
                } else {
                    error!("Peripheral does not expose the LNS service");
                }
            }
            Action::DiscoverCharacteristic => {
                let connection = match session.read().connection.clone() {
                    Some(c) => c,
                    None => return,
                };

                let characteristics =
                    Arc::new(CharacteristicHandler::new(connection.peripheral().clone()));

                match characteristics.locate_characteristic() {
                    Ok(()) => {
                        session.write().characteristics = Some(characteristics);
                        let _ = event_tx.send(MonitorEvent::CharacteristicFound);
                    }
                    Err(e) => error!("Characteristic discovery failed: {}", e),
                }
            }
            Action::Subscribe => {
                let characteristics = match session.read().characteristics.clone() {
                    Some(c) => c,
                    None => return,
                };

                if let Err(e) = characteristics.subscribe().await {
                    error!("Subscribe failed: {}", e);
                    return;
                }

                if let Err(e) = characteristics.start_notifications().await {
                    error!("Failed to start notification listener: {}", e);
                    return;
                }

                // Forward payloads into the state machine
                let mut rx = characteristics.subscribe_notifications();
                let event_tx = event_tx.clone();
                tokio::spawn(async move {
                    while let Ok(notification) = rx.recv().await {
                        if event_tx
                            .send(MonitorEvent::ValueUpdated(notification.data))
                            .is_err()
                        {
                            break;
                        }
                    }
                });
            }
        }
    }
}

impl Drop for LnsCentral {
    fn drop(&mut self) {
        self.is_running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.driver_handle.write().take() {
            handle.abort();
        }
    }
}
