//! Location fix data structures.
//!
//! Contains types for the fixed-point coordinates carried by Location and
//! Speed notifications and the decoder for the notification payload.

/// Raw fixed-point coordinate from a Location and Speed notification.
///
/// The characteristic reports latitude and longitude as signed 32-bit
/// integers in units of 10^-7 degrees. The conversion formula is:
/// `degrees = raw_value / 10_000_000.0`
///
/// This provides roughly 1.1 cm of resolution at the equator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RawCoordinate(pub i32);

impl RawCoordinate {
    /// Fixed-point scale factor (degrees are reported in units of 10^-7).
    pub const SCALE: f64 = 10_000_000.0;

    /// Create a new RawCoordinate from a raw fixed-point value.
    pub fn new(value: i32) -> Self {
        Self(value)
    }

    /// Convert the raw value to decimal degrees.
    ///
    /// # Example
    ///
    /// ```
    /// use lns_rust_ble::data::RawCoordinate;
    ///
    /// // 3,000,000 * 10^-7 = 0.3 degrees
    /// let coord = RawCoordinate::new(3_000_000);
    /// assert_eq!(coord.to_degrees(), 0.3);
    /// ```
    pub fn to_degrees(&self) -> f64 {
        self.0 as f64 / Self::SCALE
    }

    /// Create a RawCoordinate from decimal degrees.
    pub fn from_degrees(degrees: f64) -> Self {
        Self((degrees * Self::SCALE).round() as i32)
    }

    /// Get the raw fixed-point value.
    pub fn raw_value(&self) -> i32 {
        self.0
    }
}

/// Byte length below which a notification payload cannot be decoded.
///
/// Layout: bytes [0..2) flags (ignored), [2..6) latitude, [6..10) longitude.
pub const MIN_PAYLOAD_LEN: usize = 10;

/// A decoded position fix.
///
/// Ephemeral by design: each notification produces a fresh fix that replaces
/// the previous one. No history is retained.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LocationFix {
    /// Latitude in fixed-point 10^-7 degrees.
    pub latitude: RawCoordinate,
    /// Longitude in fixed-point 10^-7 degrees.
    pub longitude: RawCoordinate,
}

impl LocationFix {
    /// Create a fix from raw fixed-point values.
    pub fn from_raw(latitude: i32, longitude: i32) -> Self {
        Self {
            latitude: RawCoordinate::new(latitude),
            longitude: RawCoordinate::new(longitude),
        }
    }

    /// Decode a fix from a Location and Speed notification payload.
    ///
    /// Bytes [0..2) carry the LN flags field and are ignored; bytes [2..6)
    /// and [6..10) are little-endian signed 32-bit latitude and longitude.
    /// Trailing bytes, if any, are ignored.
    ///
    /// # Returns
    ///
    /// `None` if the payload is shorter than [`MIN_PAYLOAD_LEN`]. Short
    /// payloads are not an error; callers drop them and keep the last fix.
    ///
    /// # Example
    ///
    /// ```
    /// use lns_rust_ble::data::LocationFix;
    ///
    /// let mut payload = [0u8; 10];
    /// payload[2..6].copy_from_slice(&3_000_000i32.to_le_bytes());
    /// let fix = LocationFix::from_notification(&payload).unwrap();
    /// assert_eq!(fix.latitude_degrees(), 0.3);
    /// assert_eq!(fix.longitude_degrees(), 0.0);
    /// ```
    pub fn from_notification(data: &[u8]) -> Option<Self> {
        if data.len() < MIN_PAYLOAD_LEN {
            return None;
        }

        let latitude = i32::from_le_bytes(data[2..6].try_into().ok()?);
        let longitude = i32::from_le_bytes(data[6..10].try_into().ok()?);

        Some(Self::from_raw(latitude, longitude))
    }

    /// Latitude in decimal degrees.
    pub fn latitude_degrees(&self) -> f64 {
        self.latitude.to_degrees()
    }

    /// Longitude in decimal degrees.
    pub fn longitude_degrees(&self) -> f64 {
        self.longitude.to_degrees()
    }
}

impl std::fmt::Display for LocationFix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Lat: {:.5}\nLon: {:.5}",
            self.latitude_degrees(),
            self.longitude_degrees()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    fn payload_with(latitude: i32, longitude: i32) -> [u8; 10] {
        let mut data = [0u8; 10];
        data[2..6].copy_from_slice(&latitude.to_le_bytes());
        data[6..10].copy_from_slice(&longitude.to_le_bytes());
        data
    }

    #[test]
    fn test_raw_coordinate_to_degrees() {
        assert_eq!(RawCoordinate::new(3_000_000).to_degrees(), 0.3);
        assert_eq!(RawCoordinate::new(0).to_degrees(), 0.0);
        assert_eq!(RawCoordinate::new(-1_234_567_890).to_degrees(), -123.456789);
        assert_eq!(RawCoordinate::new(522_008_800).to_degrees(), 52.20088);
    }

    #[test]
    fn test_raw_coordinate_from_degrees() {
        assert_eq!(RawCoordinate::from_degrees(0.3).0, 3_000_000);
        assert_eq!(RawCoordinate::from_degrees(-123.456789).0, -1_234_567_890);
        assert_eq!(RawCoordinate::from_degrees(0.0).0, 0);
    }

    #[test]
    fn test_decode_known_payload() {
        // 0x002DC6C0 = 3,000,000, little-endian C0 C6 2D 00
        let mut data = [0u8; 10];
        data[2..6].copy_from_slice(&[0xC0, 0xC6, 0x2D, 0x00]);

        let fix = LocationFix::from_notification(&data).unwrap();
        assert_eq!(fix.latitude.raw_value(), 3_000_000);
        assert_eq!(fix.latitude_degrees(), 0.3);
        assert_eq!(fix.longitude_degrees(), 0.0);
    }

    #[test]
    fn test_decode_negative_coordinates() {
        let data = payload_with(-337_812_345, 1_512_098_765);
        let fix = LocationFix::from_notification(&data).unwrap();
        assert_eq!(fix.latitude.raw_value(), -337_812_345);
        assert_eq!(fix.longitude.raw_value(), 1_512_098_765);
    }

    #[test]
    fn test_decode_ignores_flags_and_trailing_bytes() {
        let mut data = vec![0xFF, 0xFF];
        data.extend_from_slice(&522_008_800i32.to_le_bytes());
        data.extend_from_slice(&1_000_000i32.to_le_bytes());
        // Trailing speed/heading fields the decoder does not consume
        data.extend_from_slice(&[0xAB, 0xCD, 0xEF]);

        let fix = LocationFix::from_notification(&data).unwrap();
        assert_eq!(fix.latitude.raw_value(), 522_008_800);
        assert_eq!(fix.longitude.raw_value(), 1_000_000);
    }

    #[test]
    fn test_decode_short_payload() {
        assert_eq!(LocationFix::from_notification(&[]), None);
        assert_eq!(LocationFix::from_notification(&[0u8; 9]), None);
        assert!(LocationFix::from_notification(&[0u8; 10]).is_some());
    }

    #[test]
    fn test_display_format() {
        let fix = LocationFix::from_raw(522_008_800, -43_218_700);
        assert_eq!(format!("{}", fix), "Lat: 52.20088\nLon: -4.32187");
    }

    proptest! {
        #[test]
        fn short_payloads_never_decode(data in proptest::collection::vec(any::<u8>(), 0..MIN_PAYLOAD_LEN)) {
            prop_assert!(LocationFix::from_notification(&data).is_none());
        }

        #[test]
        fn decode_roundtrips_raw_values(latitude in any::<i32>(), longitude in any::<i32>()) {
            let data = payload_with(latitude, longitude);
            let fix = LocationFix::from_notification(&data).unwrap();
            prop_assert_eq!(fix.latitude.raw_value(), latitude);
            prop_assert_eq!(fix.longitude.raw_value(), longitude);
        }
    }
}
