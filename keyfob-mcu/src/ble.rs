//! BLE UART peripheral types and traits
//!
//! Protocol constants (UUIDs, device name) are in keyfob_proto::ble.
//! This module provides MCU-specific types and traits.

pub use keyfob_proto::ble::{DEVICE_NAME, PASSKEY_DIGITS, RX_UUID, SERVICE_UUID, TX_UUID};

/// Connection handle assigned by the BLE stack
pub type ConnHandle = u16;

/// Something the BLE stack reported, in arrival order
///
/// Stack callbacks may run on their own task; they only queue these, the
/// polling loop is the one place that acts on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BleEvent {
    /// A central connected
    Connected(ConnHandle),
    /// The link dropped; `reason` is the stack's HCI reason code
    Disconnected { conn: ConnHandle, reason: u32 },
    /// The security manager wants to pair and generated this passkey
    PasskeyRequest {
        conn: ConnHandle,
        passkey: [u8; PASSKEY_DIGITS],
    },
    /// Link is now encrypted and MITM-authenticated
    Secured(ConnHandle),
    /// Bytes written to the RX characteristic
    Frame { conn: ConnHandle, data: Vec<u8> },
}

/// Trait for BLE UART peripheral implementations
///
/// MCU-specific crates implement this trait using their BLE stack.
pub trait BleUart {
    /// Error type for BLE operations
    type Error: std::fmt::Debug;

    /// Start BLE advertising with the given device name
    fn start_advertising(&mut self, device_name: &str) -> Result<(), Self::Error>;

    /// Take the next pending event (non-blocking)
    fn poll_event(&mut self) -> Option<BleEvent>;

    /// Send one status line to the connected central on the TX characteristic
    fn notify(&mut self, conn: ConnHandle, line: &str) -> Result<(), Self::Error>;

    /// Drop a connection
    fn disconnect(&mut self, conn: ConnHandle) -> Result<(), Self::Error>;
}
