//! KeyFob MCU Library
//!
//! Everything in the KeyFob firmware that holds state or policy, written
//! against small hardware traits so it runs the same on the board and in
//! unit tests.
//!
//! This crate provides:
//! - [`AuthGate`]: per-connection pairing state machine
//! - [`RelayActuator`]: bounded lock/unlock pulses with a release guard
//! - [`Dispatcher`]: turns BLE events and UART frames into pulses and
//!   status notifications
//! - Traits for the BLE UART peripheral, output pins and the timer
//!
//! # Example MCU implementations
//! - ESP32: See `keyfob-esp32`

pub mod ble;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod gate;
pub mod notify;
pub mod pins;
pub mod relay;

#[cfg(test)]
mod mock;

pub use ble::{BleEvent, BleUart, ConnHandle};
pub use config::{AuthorizationCheck, Config, PairingPolicy};
pub use dispatcher::{Dispatcher, Outcome, RelayPins};
pub use error::{Error, GateError, RelayError, Result};
pub use gate::{AuthGate, Channel, GateState, Passkey, PasskeyChallenge};
pub use pins::{Indicator, OutputPin, Timer};
pub use relay::{Circuit, DriveState, RelayActuator, RelayOutput};

pub use keyfob_proto::{Action, Decoded};
