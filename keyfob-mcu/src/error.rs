//! Error types

use crate::ble::ConnHandle;
use crate::gate::GateState;
use crate::relay::Circuit;

/// Relay actuation failures
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("cannot pulse {circuit} circuit: {asserted} circuit is still asserted")]
    Busy { circuit: Circuit, asserted: Circuit },
    #[error("failed to drive {circuit} pin: {detail}")]
    Pin { circuit: Circuit, detail: String },
}

/// Pairing state machine violations
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("no channel is connected")]
    NoChannel,
    #[error("connection {active} already holds the channel")]
    ChannelBusy { active: ConnHandle },
    #[error("event for connection {got}, active channel is {active}")]
    WrongChannel { active: ConnHandle, got: ConnHandle },
    #[error("passkey must be {expected} ASCII digits")]
    InvalidPasskey { expected: usize },
    #[error("cannot {op} while {state}")]
    InvalidTransition { op: &'static str, state: GateState },
    #[error("pairing was rejected on connection {conn}")]
    PairingRejected { conn: ConnHandle },
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Relay(#[from] RelayError),
    #[error(transparent)]
    Gate(#[from] GateError),
    #[error("BLE transport error: {0}")]
    Transport(String),
    #[error("invalid config: {0}")]
    Config(String),
    #[error("invalid config JSON: {0}")]
    ConfigJson(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
