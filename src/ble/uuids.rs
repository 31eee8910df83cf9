//! BLE Service and Characteristic UUIDs.
//!
//! Contains the UUID constants used for Location and Navigation Service
//! (LNS) communication. The 16-bit assigned numbers are expanded onto the
//! standard Bluetooth base UUID.

use uuid::Uuid;

// Location and Navigation Service (Standard BLE, assigned number 0x1819)
/// Standard BLE Location and Navigation Service UUID.
pub const LNS_SERVICE_UUID: Uuid = Uuid::from_u128(0x0000_1819_0000_1000_8000_00805f9b34fb);

/// Location and Speed characteristic UUID (Notify), assigned number 0x2A67.
pub const LOCATION_AND_SPEED_UUID: Uuid = Uuid::from_u128(0x0000_2a67_0000_1000_8000_00805f9b34fb);

/// Check if a service UUID is the Location and Navigation Service.
pub fn is_lns_service(uuid: &Uuid) -> bool {
    *uuid == LNS_SERVICE_UUID
}

/// Check if a characteristic UUID is the Location and Speed characteristic.
pub fn is_location_characteristic(uuid: &Uuid) -> bool {
    *uuid == LOCATION_AND_SPEED_UUID
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uuid_format() {
        // Verify the 16-bit assigned numbers landed in the right position
        let service = LNS_SERVICE_UUID.to_string();
        assert!(service.starts_with("00001819"));

        let characteristic = LOCATION_AND_SPEED_UUID.to_string();
        assert!(characteristic.starts_with("00002a67"));
    }

    #[test]
    fn test_is_lns_service() {
        assert!(is_lns_service(&LNS_SERVICE_UUID));
        assert!(!is_lns_service(&LOCATION_AND_SPEED_UUID));
    }

    #[test]
    fn test_is_location_characteristic() {
        assert!(is_location_characteristic(&LOCATION_AND_SPEED_UUID));
        assert!(!is_location_characteristic(&LNS_SERVICE_UUID));
    }
}
