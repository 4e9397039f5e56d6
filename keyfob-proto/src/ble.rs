//! BLE GATT Service Protocol Constants for KeyFob
//!
//! KeyFob speaks the Nordic UART Service so stock phone apps (Bluefruit
//! Connect, nRF Toolbox) can talk to it without a custom profile.

/// Advertised device name
pub const DEVICE_NAME: &str = "KeyFob";

/// UART Service UUID: 6e400001-b5a3-f393-e0a9-e50e24dcca9e
pub const SERVICE_UUID: &str = "6e400001-b5a3-f393-e0a9-e50e24dcca9e";

/// RX Characteristic UUID (client writes frames here, encryption required)
pub const RX_UUID: &str = "6e400002-b5a3-f393-e0a9-e50e24dcca9e";

/// TX Characteristic UUID (device notifies status lines here)
pub const TX_UUID: &str = "6e400003-b5a3-f393-e0a9-e50e24dcca9e";

/// Number of digits in a pairing passkey
pub const PASSKEY_DIGITS: usize = 6;
