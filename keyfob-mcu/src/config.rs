//! Runtime configuration
//!
//! Defaults reproduce the stock KeyFob behavior. A JSON document may
//! override any subset of fields.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Relay pulse length
pub const DEFAULT_HOLD_MS: u32 = 300;

/// Longest pulse we are willing to hold a key fob button for
pub const MAX_HOLD_MS: u32 = 5_000;

/// How a pairing request is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairingPolicy {
    /// Accept every pairing request; the passkey comparison on the phone is
    /// the only check
    AlwaysAccept,
    /// Accept only when the confirmation hook approves the challenge
    RequirePhysicalConfirmation,
}

impl Default for PairingPolicy {
    fn default() -> Self {
        Self::AlwaysAccept
    }
}

/// Where an unauthenticated action is stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationCheck {
    /// The transport rejects unauthenticated writes before they reach the
    /// dispatcher (encrypted + MITM characteristic permissions)
    Transport,
    /// The dispatcher checks the gate itself and answers "access denied"
    Dispatcher,
}

impl Default for AuthorizationCheck {
    fn default() -> Self {
        Self::Dispatcher
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Advertised BLE name
    pub device_name: String,
    /// How long a relay stays closed per action
    pub hold_ms: u32,
    /// Frames longer than this are answered with usage and never decoded
    pub max_frame_len: usize,
    pub pairing_policy: PairingPolicy,
    pub authorization: AuthorizationCheck,
    /// Also send the pairing passkey over the UART channel being paired.
    /// The serial log always shows it.
    pub echo_passkey: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_name: keyfob_proto::ble::DEVICE_NAME.to_string(),
            hold_ms: DEFAULT_HOLD_MS,
            max_frame_len: keyfob_proto::MAX_FRAME_LEN,
            pairing_policy: PairingPolicy::default(),
            authorization: AuthorizationCheck::default(),
            echo_passkey: true,
        }
    }
}

impl Config {
    /// Parse a (possibly partial) JSON config and validate it
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let config: Config = serde_json::from_slice(data)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.hold_ms == 0 || self.hold_ms > MAX_HOLD_MS {
            return Err(Error::Config(format!(
                "hold_ms must be between 1 and {MAX_HOLD_MS}, got {}",
                self.hold_ms
            )));
        }
        if self.max_frame_len == 0 {
            return Err(Error::Config("max_frame_len must be positive".to_string()));
        }
        if self.device_name.is_empty() {
            return Err(Error::Config("device_name must not be empty".to_string()));
        }
        Ok(())
    }
}
