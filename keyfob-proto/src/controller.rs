//! Bluefruit Connect "Controller" pad frames
//!
//! Each pad event is sent as `!B<n><s><crc>`: button `n` (`'1'..='8'`),
//! state `s` (`'1'` pressed, `'0'` released), then one checksum byte that is
//! the inverted sum of the preceding bytes.

/// Frames from the controller pad start with this tag
pub const BUTTON_TAG: &[u8; 2] = b"!B";

/// Length of a button token without its checksum
pub const BUTTON_TOKEN_LEN: usize = 4;

/// Highest button index the pad sends (1-4 numbers, 5-8 arrows)
pub const MAX_BUTTON: u8 = 8;

/// A decoded controller pad event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: u8,
    pub pressed: bool,
}

/// Parse a button token at the very start of `frame`.
///
/// Only the numbered buttons 1-4 are recognized. Anything after the
/// four-byte token (normally the checksum) is ignored and not validated.
pub fn parse_button(frame: &[u8]) -> Option<ButtonEvent> {
    let [b'!', b'B', n @ b'1'..=b'4', s @ (b'0' | b'1'), ..] = frame else {
        return None;
    };
    Some(ButtonEvent {
        button: n - b'0',
        pressed: *s == b'1',
    })
}

/// Build the frame the phone app sends for a pad event, checksum included
pub fn button_frame(button: u8, pressed: bool) -> Option<[u8; 5]> {
    if button == 0 || button > MAX_BUTTON {
        return None;
    }
    let mut frame = [
        b'!',
        b'B',
        b'0' + button,
        if pressed { b'1' } else { b'0' },
        0,
    ];
    frame[4] = checksum(&frame[..BUTTON_TOKEN_LEN]);
    Some(frame)
}

fn checksum(data: &[u8]) -> u8 {
    !data.iter().fold(0u8, |acc, b| acc.wrapping_add(*b))
}
