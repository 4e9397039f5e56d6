//! Status lines sent back over the UART TX characteristic
//!
//! Purely informational; clients show them to a human and never parse them.

use keyfob_proto::Action;

use crate::gate::Passkey;

pub fn ready_banner() -> String {
    "===== KEYFOB READY =====\nButton 1 = LOCK\nButton 2 = UNLOCK".to_string()
}

pub fn usage() -> String {
    "Commands: lock, unlock, 1, 2\nOr use Controller buttons 1-2".to_string()
}

pub fn not_assigned(button: u8) -> String {
    format!("Button {button} not assigned")
}

pub fn access_denied(action: Action) -> String {
    format!("Access denied: pair this device before {action}")
}

pub fn started(action: Action) -> String {
    match action {
        Action::Lock => "Locking...".to_string(),
        Action::Unlock => "Unlocking...".to_string(),
    }
}

pub fn finished(action: Action) -> String {
    match action {
        Action::Lock => "Locked!".to_string(),
        Action::Unlock => "Unlocked!".to_string(),
    }
}

pub fn failed(action: Action) -> String {
    format!("Error: {action} failed")
}

pub fn pairing_pin(passkey: &Passkey) -> String {
    format!("Pairing PIN: {passkey}")
}

pub fn pairing_pin_hidden() -> String {
    "Pairing requested: read the PIN from the device console".to_string()
}

pub fn pairing_rejected() -> String {
    "Pairing rejected".to_string()
}

pub fn paired() -> String {
    ">>> DEVICE PAIRED <<< Connection secured!".to_string()
}
