//! Output pin and timing abstraction traits
//!
//! MCU-specific crates implement these on top of their HAL.

/// A push-pull digital output
pub trait OutputPin {
    /// Error type for pin operations
    type Error: std::fmt::Debug;

    /// Drive the pin high (relay closed, LED on)
    fn set_high(&mut self) -> Result<(), Self::Error>;

    /// Drive the pin low (relay open, LED off)
    fn set_low(&mut self) -> Result<(), Self::Error>;
}

/// Monotonic millisecond clock with a blocking delay
pub trait Timer {
    /// Milliseconds since an arbitrary fixed point, never going backwards
    fn now_ms(&self) -> u64;

    /// Block the calling task for `ms` milliseconds
    fn delay_ms(&mut self, ms: u32);
}

/// Status LED shown while a relay pulse is in progress
///
/// LED failures are logged and swallowed, the indicator never blocks
/// actuation.
pub struct Indicator<P> {
    pin: P,
}

impl<P: OutputPin> Indicator<P> {
    pub fn new(mut pin: P) -> Self {
        if let Err(e) = pin.set_low() {
            log::warn!("Status LED init failed: {:?}", e);
        }
        Self { pin }
    }

    pub fn on(&mut self) {
        if let Err(e) = self.pin.set_high() {
            log::warn!("Status LED on failed: {:?}", e);
        }
    }

    pub fn off(&mut self) {
        if let Err(e) = self.pin.set_low() {
            log::warn!("Status LED off failed: {:?}", e);
        }
    }
}
