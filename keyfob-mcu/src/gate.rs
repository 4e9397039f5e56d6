//! Pairing gate: per-connection authentication state machine
//!
//! ```text
//! Unauthenticated --request_upgrade--> PairingInProgress --secured--> Authenticated
//!        ^                                    |
//!        +------- passkey rejected -----------+
//! ```
//!
//! A bonded central skips the passkey step and the stack reports `secured`
//! straight from Unauthenticated. A rejected channel stays Unauthenticated
//! and refuses any further pairing or `secured` until it disconnects. Every
//! new connection starts over at Unauthenticated; nothing here survives a
//! disconnect.

use log::*;

use crate::ble::{ConnHandle, PASSKEY_DIGITS};
use crate::config::PairingPolicy;
use crate::error::GateError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    Unauthenticated,
    PairingInProgress,
    Authenticated,
}

impl std::fmt::Display for GateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            GateState::Unauthenticated => "unauthenticated",
            GateState::PairingInProgress => "pairing",
            GateState::Authenticated => "authenticated",
        })
    }
}

/// Six ASCII digits produced by the security manager
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Passkey([u8; PASSKEY_DIGITS]);

impl Passkey {
    pub fn new(digits: [u8; PASSKEY_DIGITS]) -> Result<Self, GateError> {
        if !digits.iter().all(u8::is_ascii_digit) {
            return Err(GateError::InvalidPasskey {
                expected: PASSKEY_DIGITS,
            });
        }
        Ok(Self(digits))
    }

    /// From the numeric form NimBLE and SoftDevice stacks hand out
    pub fn from_number(value: u32) -> Result<Self, GateError> {
        if value > 999_999 {
            return Err(GateError::InvalidPasskey {
                expected: PASSKEY_DIGITS,
            });
        }
        let mut digits = [b'0'; PASSKEY_DIGITS];
        let mut rest = value;
        for digit in digits.iter_mut().rev() {
            *digit = b'0' + (rest % 10) as u8;
            rest /= 10;
        }
        Ok(Self(digits))
    }

    pub fn digits(&self) -> [u8; PASSKEY_DIGITS] {
        self.0
    }

    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or_default()
    }
}

impl std::fmt::Display for Passkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Keep passkeys out of Debug output that may end up in bug reports
impl std::fmt::Debug for Passkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Passkey(******)")
    }
}

/// One pairing attempt's credential
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasskeyChallenge {
    pub conn: ConnHandle,
    pub passkey: Passkey,
}

/// The connected central, as far as the gate is concerned
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Channel {
    conn: ConnHandle,
    state: GateState,
    encrypted: bool,
    rejected: bool,
    challenge: Option<PasskeyChallenge>,
}

impl Channel {
    fn new(conn: ConnHandle) -> Self {
        Self {
            conn,
            state: GateState::Unauthenticated,
            encrypted: false,
            rejected: false,
            challenge: None,
        }
    }

    pub fn conn(&self) -> ConnHandle {
        self.conn
    }

    pub fn state(&self) -> GateState {
        self.state
    }

    pub fn is_encrypted(&self) -> bool {
        self.encrypted
    }

    /// Pairing was refused on this connection
    pub fn is_rejected(&self) -> bool {
        self.rejected
    }

    pub fn challenge(&self) -> Option<&PasskeyChallenge> {
        self.challenge.as_ref()
    }
}

/// Decides pairing requests under [`PairingPolicy::RequirePhysicalConfirmation`]
pub type ConfirmHook = Box<dyn FnMut(&PasskeyChallenge) -> bool + Send>;

/// Tracks the single active channel and whether it may act
pub struct AuthGate {
    policy: PairingPolicy,
    confirm: Option<ConfirmHook>,
    channel: Option<Channel>,
}

impl AuthGate {
    pub fn new(policy: PairingPolicy) -> Self {
        Self {
            policy,
            confirm: None,
            channel: None,
        }
    }

    /// Install the hook consulted when the policy requires confirmation.
    /// Without one, such pairings are rejected.
    pub fn set_confirmation(&mut self, hook: ConfirmHook) {
        self.confirm = Some(hook);
    }

    pub fn policy(&self) -> PairingPolicy {
        self.policy
    }

    pub fn channel(&self) -> Option<&Channel> {
        self.channel.as_ref()
    }

    /// Open a fresh channel; only one may exist at a time
    pub fn connect(&mut self, conn: ConnHandle) -> Result<&Channel, GateError> {
        if let Some(active) = &self.channel {
            return Err(GateError::ChannelBusy {
                active: active.conn,
            });
        }
        info!("Channel {} opened", conn);
        Ok(self.channel.insert(Channel::new(conn)))
    }

    /// Drop the channel and everything the gate knew about it
    pub fn disconnect(&mut self, conn: ConnHandle) -> Result<Channel, GateError> {
        self.channel_mut(conn)?;
        let channel = self.channel.take().ok_or(GateError::NoChannel)?;
        info!("Channel {} closed (was {})", conn, channel.state);
        Ok(channel)
    }

    /// Security manager started pairing with this passkey
    pub fn request_upgrade(
        &mut self,
        conn: ConnHandle,
        passkey: Passkey,
    ) -> Result<&PasskeyChallenge, GateError> {
        let channel = self.channel_mut(conn)?;
        if channel.rejected {
            return Err(GateError::PairingRejected { conn });
        }
        match channel.state {
            GateState::Unauthenticated => {}
            GateState::PairingInProgress => {
                debug!("Channel {} restarted pairing, replacing challenge", conn);
            }
            state @ GateState::Authenticated => {
                return Err(GateError::InvalidTransition {
                    op: "request pairing",
                    state,
                });
            }
        }
        channel.state = GateState::PairingInProgress;
        info!("Channel {} pairing requested", conn);
        Ok(channel.challenge.insert(PasskeyChallenge { conn, passkey }))
    }

    /// Answer the pending challenge; it is consumed either way.
    /// A rejection sends the channel back to Unauthenticated for good.
    pub fn passkey_response(&mut self, conn: ConnHandle) -> Result<bool, GateError> {
        let policy = self.policy;
        let channel = self
            .channel
            .as_mut()
            .filter(|channel| channel.conn == conn);
        let Some(channel) = channel else {
            return Err(self.mismatch(conn));
        };

        let challenge = match (channel.state, channel.challenge.take()) {
            (GateState::PairingInProgress, Some(challenge)) => challenge,
            (state, _) => {
                return Err(GateError::InvalidTransition {
                    op: "answer passkey",
                    state,
                });
            }
        };

        let accepted = match policy {
            PairingPolicy::AlwaysAccept => true,
            PairingPolicy::RequirePhysicalConfirmation => match self.confirm.as_mut() {
                Some(confirm) => confirm(&challenge),
                None => {
                    warn!("Pairing needs confirmation but no confirmation hook is installed");
                    false
                }
            },
        };

        if !accepted {
            channel.state = GateState::Unauthenticated;
            channel.rejected = true;
            warn!("Channel {} pairing rejected", conn);
        }
        Ok(accepted)
    }

    /// Link is encrypted and authenticated. Returns false if the channel
    /// was already authenticated.
    pub fn secured(&mut self, conn: ConnHandle) -> Result<bool, GateError> {
        let channel = self.channel_mut(conn)?;
        if channel.rejected {
            warn!("Channel {} secured after pairing was rejected, ignoring", conn);
            return Err(GateError::PairingRejected { conn });
        }
        channel.encrypted = true;
        channel.challenge = None;
        if channel.state == GateState::Authenticated {
            return Ok(false);
        }
        if channel.state == GateState::Unauthenticated {
            info!("Channel {} secured by bonded reconnect", conn);
        }
        channel.state = GateState::Authenticated;
        info!("Channel {} authenticated", conn);
        Ok(true)
    }

    /// True iff `conn` is the active channel and it is authenticated
    pub fn is_authorized(&self, conn: ConnHandle) -> bool {
        self.channel
            .as_ref()
            .is_some_and(|channel| channel.conn == conn && channel.state == GateState::Authenticated)
    }

    fn channel_mut(&mut self, conn: ConnHandle) -> Result<&mut Channel, GateError> {
        match self.channel.as_mut() {
            Some(channel) if channel.conn == conn => Ok(channel),
            Some(channel) => Err(GateError::WrongChannel {
                active: channel.conn,
                got: conn,
            }),
            None => Err(GateError::NoChannel),
        }
    }

    fn mismatch(&self, conn: ConnHandle) -> GateError {
        match &self.channel {
            Some(channel) => GateError::WrongChannel {
                active: channel.conn,
                got: conn,
            },
            None => GateError::NoChannel,
        }
    }
}
