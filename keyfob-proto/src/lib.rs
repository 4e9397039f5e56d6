//! KeyFob command protocol - frame decoding
//!
//! Maps one inbound UART frame to what the device should do with it. Two
//! frame families are understood:
//!
//! - controller pad tokens `!B<n><s>` (see [`controller`]), matched only at
//!   the start of the frame and only on the press edge
//! - plain text commands `lock`, `1`, `unlock`, `2`, matched exactly and
//!   case-sensitively
//!
//! Decoding is pure; the caller decides what to notify and whether the
//! channel may act.

pub mod ble;
pub mod controller;

/// Transport receive buffer size; callers refuse longer frames
pub const MAX_FRAME_LEN: usize = 128;

/// A relay operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    Lock,
    Unlock,
}

impl Action {
    /// Action bound to a controller pad button, if any
    pub fn from_button(button: u8) -> Option<Self> {
        match button {
            1 => Some(Action::Lock),
            2 => Some(Action::Unlock),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Lock => "lock",
            Action::Unlock => "unlock",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    /// A recognized relay operation
    Action(Action),
    /// A valid controller token for a button with no action bound to it
    Unassigned(u8),
    /// Unrecognized text; the caller should answer with a usage hint
    Help,
    /// Empty frame, release edge, or unknown `!` frame; no output
    Ignored,
}

/// Classify a raw inbound frame
pub fn decode(raw: &[u8]) -> Decoded {
    let frame = raw.trim_ascii();

    if frame.is_empty() {
        return Decoded::Ignored;
    }

    if frame[0] == b'!' {
        return match controller::parse_button(frame) {
            Some(event) if event.pressed => match Action::from_button(event.button) {
                Some(action) => Decoded::Action(action),
                None => Decoded::Unassigned(event.button),
            },
            _ => Decoded::Ignored,
        };
    }

    // Case-sensitive on purpose: "Lock" falls through to the usage hint.
    match frame {
        b"lock" | b"1" => Decoded::Action(Action::Lock),
        b"unlock" | b"2" => Decoded::Action(Action::Unlock),
        _ => Decoded::Help,
    }
}
