//! GATT characteristic handling.
//!
//! Locates the Location and Speed characteristic inside the LNS service and
//! forwards its notifications. The LNS flow is notify-only, so there is no
//! read or write surface here.

use btleplug::api::{Characteristic, Peripheral as _};
use btleplug::platform::Peripheral;
use futures::stream::StreamExt;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, trace};

use crate::ble::uuids::{LNS_SERVICE_UUID, LOCATION_AND_SPEED_UUID};
use crate::error::{Error, Result};

/// Notification event from the Location and Speed characteristic.
#[derive(Debug, Clone)]
pub struct NotificationEvent {
    /// The raw notification payload.
    pub data: Vec<u8>,
}

/// Handler for the LNS GATT characteristics on a peripheral.
pub struct CharacteristicHandler {
    /// The peripheral to communicate with.
    peripheral: Peripheral,
    /// The Location and Speed characteristic, once located.
    location_characteristic: Arc<RwLock<Option<Characteristic>>>,
    /// Channel for notification events.
    notification_tx: broadcast::Sender<NotificationEvent>,
    /// Whether we're currently listening for notifications.
    is_listening: Arc<RwLock<bool>>,
    /// Handle to the notification listener task.
    listener_handle: Arc<RwLock<Option<tokio::task::JoinHandle<()>>>>,
}

impl CharacteristicHandler {
    /// Create a new characteristic handler for a peripheral.
    ///
    /// Note: Services must be discovered before using this handler.
    pub fn new(peripheral: Peripheral) -> Self {
        let (notification_tx, _) = broadcast::channel(256);

        Self {
            peripheral,
            location_characteristic: Arc::new(RwLock::new(None)),
            notification_tx,
            is_listening: Arc::new(RwLock::new(false)),
            listener_handle: Arc::new(RwLock::new(None)),
        }
    }

    /// Locate the Location and Speed characteristic inside the LNS service.
    ///
    /// This should be called after connecting and discovering services.
    ///
    /// # Errors
    ///
    /// Returns `ServiceNotFound` if the peripheral does not expose the LNS
    /// service, `CharacteristicNotFound` if the service lacks the Location
    /// and Speed characteristic.
    pub fn locate_characteristic(&self) -> Result<()> {
        let service = self
            .peripheral
            .services()
            .into_iter()
            .find(|s| s.uuid == LNS_SERVICE_UUID)
            .ok_or_else(|| Error::ServiceNotFound {
                uuid: LNS_SERVICE_UUID.to_string(),
            })?;

        debug!("Found LNS service: {}", service.uuid);

        let characteristic = service
            .characteristics
            .into_iter()
            .find(|c| c.uuid == LOCATION_AND_SPEED_UUID)
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: LOCATION_AND_SPEED_UUID.to_string(),
            })?;

        debug!(
            "Found Location and Speed characteristic, properties: {:?}",
            characteristic.properties
        );

        *self.location_characteristic.write() = Some(characteristic);

        Ok(())
    }

    /// Check if the Location and Speed characteristic has been located.
    pub fn has_characteristic(&self) -> bool {
        self.location_characteristic.read().is_some()
    }

    /// Enable notifications on the Location and Speed characteristic.
    pub async fn subscribe(&self) -> Result<()> {
        let characteristic = self
            .location_characteristic
            .read()
            .clone()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: LOCATION_AND_SPEED_UUID.to_string(),
            })?;

        self.peripheral
            .subscribe(&characteristic)
            .await
            .map_err(|e| {
                debug!("Failed to subscribe: {:?}", e);
                Error::Bluetooth(e)
            })?;

        debug!("Subscribed to Location and Speed notifications");

        Ok(())
    }

    /// Disable notifications on the Location and Speed characteristic.
    pub async fn unsubscribe(&self) -> Result<()> {
        let characteristic = self
            .location_characteristic
            .read()
            .clone()
            .ok_or_else(|| Error::CharacteristicNotFound {
                uuid: LOCATION_AND_SPEED_UUID.to_string(),
            })?;

        self.peripheral
            .unsubscribe(&characteristic)
            .await
            .map_err(Error::Bluetooth)?;

        debug!("Unsubscribed from Location and Speed notifications");

        Ok(())
    }

    /// Start listening for notifications.
    ///
    /// Payloads are forwarded through the channel returned by
    /// `subscribe_notifications()`.
    pub async fn start_notifications(&self) -> Result<()> {
        if *self.is_listening.read() {
            return Ok(());
        }

        *self.is_listening.write() = true;

        let peripheral = self.peripheral.clone();
        let is_listening = self.is_listening.clone();
        let notification_tx = self.notification_tx.clone();

        let handle = tokio::spawn(async move {
            let mut notifications = match peripheral.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    error!("Failed to get notifications stream: {}", e);
                    return;
                }
            };

            debug!("Notification listener entering main loop");

            while *is_listening.read() {
                tokio::select! {
                    Some(notification) = notifications.next() => {
                        if notification.uuid != LOCATION_AND_SPEED_UUID {
                            continue;
                        }

                        trace!(
                            "Notification received: {} bytes",
                            notification.value.len()
                        );

                        let _ = notification_tx.send(NotificationEvent {
                            data: notification.value,
                        });
                    }
                    _ = tokio::time::sleep(std::time::Duration::from_millis(50)) => {
                        // Check if we should stop
                        if !*is_listening.read() {
                            break;
                        }
                    }
                }
            }

            debug!("Notification listener stopped");
        });

        *self.listener_handle.write() = Some(handle);

        Ok(())
    }

    /// Stop listening for notifications.
    pub async fn stop_notifications(&self) {
        *self.is_listening.write() = false;

        if let Some(handle) = self.listener_handle.write().take() {
            let _ = handle.await;
        }
    }

    /// Get a receiver for notification events.
    pub fn subscribe_notifications(&self) -> broadcast::Receiver<NotificationEvent> {
        self.notification_tx.subscribe()
    }
}

impl Drop for CharacteristicHandler {
    fn drop(&mut self) {
        *self.is_listening.write() = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_event_clone() {
        let event = NotificationEvent {
            data: vec![1, 2, 3],
        };
        let cloned = event.clone();
        assert_eq!(event.data, cloned.data);
    }
}
