//! Board glue: GPIO outputs and the millisecond timer

use esp_idf_svc::hal::gpio::{AnyOutputPin, Output, PinDriver};
use esp_idf_svc::sys::EspError;
use keyfob_mcu::{OutputPin, Timer};
use std::time::{Duration, Instant};

/// A GPIO configured as a push-pull output, starting low
pub struct BoardPin(PinDriver<'static, AnyOutputPin, Output>);

impl BoardPin {
    pub fn new(pin: AnyOutputPin) -> Result<Self, EspError> {
        let mut driver = PinDriver::output(pin)?;
        driver.set_low()?;
        Ok(Self(driver))
    }
}

impl OutputPin for BoardPin {
    type Error = EspError;

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.set_high()
    }

    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.set_low()
    }
}

/// Milliseconds since boot; the delay blocks the calling FreeRTOS task
pub struct BoardTimer {
    boot: Instant,
}

impl BoardTimer {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
        }
    }
}

impl Timer for BoardTimer {
    fn now_ms(&self) -> u64 {
        self.boot.elapsed().as_millis() as u64
    }

    fn delay_ms(&mut self, ms: u32) {
        std::thread::sleep(Duration::from_millis(u64::from(ms)));
    }
}
