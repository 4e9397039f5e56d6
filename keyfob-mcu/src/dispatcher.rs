//! Session dispatcher: the polling loop's only entry point
//!
//! Owns the UART peripheral, the pairing gate, the relays and the status
//! LED. Events are handled one at a time to completion, in the order the
//! stack queued them; a relay pulse blocks the loop, so a frame that arrives
//! mid-pulse waits in the queue.

use log::*;

use keyfob_proto::{decode, Action, Decoded};

use crate::ble::{BleEvent, BleUart, ConnHandle};
use crate::config::{AuthorizationCheck, Config};
use crate::error::{Error, GateError, Result};
use crate::gate::{AuthGate, ConfirmHook, Passkey};
use crate::notify;
use crate::pins::{Indicator, OutputPin, Timer};
use crate::relay::RelayActuator;

/// The three output lines the dispatcher drives
pub struct RelayPins<P> {
    pub lock: P,
    pub unlock: P,
    pub status_led: P,
}

/// What handling one event amounted to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Nothing was pending
    Idle,
    /// Channel opened
    Connected,
    /// A second central was turned away
    Refused,
    Disconnected,
    PairingStarted,
    PairingRejected,
    Paired,
    /// Frame produced no output
    Ignored,
    /// Usage hint sent
    Help,
    Unassigned(u8),
    Denied(Action),
    Actuated(Action),
}

pub struct Dispatcher<U, P, T> {
    config: Config,
    uart: U,
    gate: AuthGate,
    relays: RelayActuator<P, T>,
    indicator: Indicator<P>,
}

impl<U, P, T> Dispatcher<U, P, T>
where
    U: BleUart,
    P: OutputPin,
    T: Timer,
{
    /// Take ownership of the peripherals; all outputs are driven low
    pub fn new(config: Config, uart: U, pins: RelayPins<P>, timer: T) -> Result<Self> {
        config.validate()?;
        let relays = RelayActuator::new(pins.lock, pins.unlock, timer, config.hold_ms)?;
        let indicator = Indicator::new(pins.status_led);
        let gate = AuthGate::new(config.pairing_policy);

        Ok(Self {
            config,
            uart,
            gate,
            relays,
            indicator,
        })
    }

    pub fn set_confirmation(&mut self, hook: ConfirmHook) {
        self.gate.set_confirmation(hook);
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn gate(&self) -> &AuthGate {
        &self.gate
    }

    pub fn relays(&self) -> &RelayActuator<P, T> {
        &self.relays
    }

    pub fn uart(&self) -> &U {
        &self.uart
    }

    pub fn is_authorized(&self, conn: ConnHandle) -> bool {
        self.gate.is_authorized(conn)
    }

    /// Begin advertising under the configured name
    pub fn start(&mut self) -> Result<()> {
        self.uart
            .start_advertising(&self.config.device_name)
            .map_err(transport_error)?;
        info!("BLE advertising as '{}'", self.config.device_name);
        Ok(())
    }

    /// One polling-loop iteration: sweep overdue relays, then handle at
    /// most one pending event
    pub fn poll(&mut self) -> Result<Outcome> {
        self.relays.release_overdue();
        match self.uart.poll_event() {
            Some(event) => self.handle_event(event),
            None => Ok(Outcome::Idle),
        }
    }

    pub fn handle_event(&mut self, event: BleEvent) -> Result<Outcome> {
        match event {
            BleEvent::Connected(conn) => self.on_connect(conn),
            BleEvent::Disconnected { conn, reason } => Ok(self.on_disconnect(conn, reason)),
            BleEvent::PasskeyRequest { conn, passkey } => {
                let passkey = Passkey::new(passkey)?;
                if self.on_passkey_request(conn, passkey)? {
                    Ok(Outcome::PairingStarted)
                } else {
                    self.uart.disconnect(conn).map_err(transport_error)?;
                    Ok(Outcome::PairingRejected)
                }
            }
            BleEvent::Secured(conn) => self.on_secured(conn),
            BleEvent::Frame { conn, data } => self.on_frame(conn, &data),
        }
    }

    pub fn on_connect(&mut self, conn: ConnHandle) -> Result<Outcome> {
        match self.gate.connect(conn) {
            Ok(_) => {
                info!("BLE Connected! (conn {})", conn);
                self.notify(conn, &notify::ready_banner());
                Ok(Outcome::Connected)
            }
            Err(GateError::ChannelBusy { active }) => {
                warn!("Refusing conn {}: conn {} holds the channel", conn, active);
                self.uart.disconnect(conn).map_err(transport_error)?;
                Ok(Outcome::Refused)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub fn on_disconnect(&mut self, conn: ConnHandle, reason: u32) -> Outcome {
        match self.gate.disconnect(conn) {
            Ok(_) => info!("BLE Disconnected (conn {}, reason 0x{:02x})", conn, reason),
            // A refused central going away
            Err(e) => debug!("Disconnect of conn {} ignored: {}", conn, e),
        }
        Outcome::Disconnected
    }

    /// Start pairing and answer the passkey request per the pairing policy
    pub fn on_passkey_request(&mut self, conn: ConnHandle, passkey: Passkey) -> Result<bool> {
        self.gate.request_upgrade(conn, passkey)?;

        info!("===========================================");
        info!("  PAIRING REQUEST");
        info!("  Enter this PIN on your phone: {}", passkey);
        info!("===========================================");

        if self.config.echo_passkey {
            self.notify(conn, &notify::pairing_pin(&passkey));
        } else {
            self.notify(conn, &notify::pairing_pin_hidden());
        }

        let accepted = self.gate.passkey_response(conn)?;
        if !accepted {
            self.notify(conn, &notify::pairing_rejected());
        }
        Ok(accepted)
    }

    pub fn on_secured(&mut self, conn: ConnHandle) -> Result<Outcome> {
        match self.gate.secured(conn) {
            Ok(true) => {
                info!("Connection secured (encrypted & authenticated)");
                self.notify(conn, &notify::paired());
                Ok(Outcome::Paired)
            }
            Ok(false) => Ok(Outcome::Paired),
            // The earlier disconnect was lost or this event raced it
            Err(GateError::PairingRejected { .. }) => {
                self.uart.disconnect(conn).map_err(transport_error)?;
                Ok(Outcome::Refused)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Decode one frame and act on it
    pub fn on_frame(&mut self, conn: ConnHandle, raw: &[u8]) -> Result<Outcome> {
        let active = self.gate.channel().map(|channel| channel.conn());
        if active != Some(conn) {
            warn!("Dropping frame from conn {} (active {:?})", conn, active);
            return Ok(Outcome::Ignored);
        }
        if self.gate.channel().is_some_and(|channel| channel.is_rejected()) {
            warn!("Dropping frame from conn {}: pairing was rejected", conn);
            return Ok(Outcome::Ignored);
        }

        // A prefix of an oversized frame is never a command
        if raw.len() > self.config.max_frame_len {
            warn!(
                "Frame of {} bytes exceeds {}, not decoded",
                raw.len(),
                self.config.max_frame_len
            );
            self.notify(conn, &notify::usage());
            return Ok(Outcome::Help);
        }
        info!("Received: {:?}", String::from_utf8_lossy(raw));

        match decode(raw) {
            Decoded::Ignored => Ok(Outcome::Ignored),
            Decoded::Help => {
                self.notify(conn, &notify::usage());
                Ok(Outcome::Help)
            }
            Decoded::Unassigned(button) => {
                info!("Button {} not assigned", button);
                self.notify(conn, &notify::not_assigned(button));
                Ok(Outcome::Unassigned(button))
            }
            Decoded::Action(action) => {
                if self.config.authorization == AuthorizationCheck::Dispatcher
                    && !self.gate.is_authorized(conn)
                {
                    warn!("Denied {} from unauthenticated conn {}", action, conn);
                    self.notify(conn, &notify::access_denied(action));
                    return Ok(Outcome::Denied(action));
                }
                self.run_action(conn, action)
            }
        }
    }

    fn run_action(&mut self, conn: ConnHandle, action: Action) -> Result<Outcome> {
        info!(">>> {}", action.as_str().to_uppercase());
        self.notify(conn, &notify::started(action));

        self.indicator.on();
        let result = self.relays.actuate(action);
        self.indicator.off();

        match result {
            Ok(()) => {
                info!(">>> {} COMPLETE", action.as_str().to_uppercase());
                self.notify(conn, &notify::finished(action));
                Ok(Outcome::Actuated(action))
            }
            Err(e) => {
                error!("{} failed: {}", action, e);
                self.notify(conn, &notify::failed(action));
                Err(e.into())
            }
        }
    }

    // Notifications are informational; a lost one never stops an action
    fn notify(&mut self, conn: ConnHandle, line: &str) {
        if let Err(e) = self.uart.notify(conn, line) {
            warn!("Notify to conn {} failed: {:?}", conn, e);
        }
    }
}

fn transport_error<E: std::fmt::Debug>(e: E) -> Error {
    Error::Transport(format!("{:?}", e))
}
