//! KeyFob firmware for ESP32
//!
//! Bridges a BLE UART service to two optocoupler outputs wired across the
//! LOCK and UNLOCK buttons of a car key fob. Writes to the UART require an
//! encrypted, MITM-authenticated link, so a phone must pair with the
//! passkey printed on the serial console before it can send commands.
//!
//! WIRING:
//!   GPIO25 --[220R]-- PC817 anode, cathode to GND, collector/emitter across LOCK
//!   GPIO26 --[220R]-- PC817 anode, cathode to GND, collector/emitter across UNLOCK
//!   GPIO2  -- status LED (built-in on most dev boards)
//!
//! PHONE APP: "Bluefruit Connect", UART or Controller pad.
//! Button 1 = LOCK, Button 2 = UNLOCK.

mod ble;
mod board;

use esp_idf_svc::hal::gpio::OutputPin as _;
use esp_idf_svc::hal::prelude::Peripherals;
use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use keyfob_mcu::{Config, Dispatcher, Outcome, OutputPin, RelayPins};
use log::*;
use std::time::Duration;

use board::{BoardPin, BoardTimer};

const NVS_NAMESPACE: &str = "keyfob";
const KEY_CONFIG: &str = "config";

// Idle sleep between polls of the BLE event queue
const POLL_INTERVAL: Duration = Duration::from_millis(10);

const STARTUP_BLINKS: u32 = 3;
const STARTUP_BLINK: Duration = Duration::from_millis(200);

fn main() -> anyhow::Result<()> {
    // Initialize ESP-IDF
    esp_idf_svc::sys::link_patches();
    esp_idf_svc::log::EspLogger::initialize_default();

    info!("===========================================");
    info!("  KEY FOB TRIGGER - BLE");
    info!("===========================================");

    let peripherals = Peripherals::take()?;

    // NimBLE keeps its bonds in the default NVS partition
    let nvs = EspDefaultNvsPartition::take()?;
    let nvs = EspNvs::new(nvs, NVS_NAMESPACE, true)?;
    let config = load_config(&nvs);
    info!(
        "Config: name='{}', hold={}ms, pairing={:?}, authorization={:?}",
        config.device_name, config.hold_ms, config.pairing_policy, config.authorization
    );

    // Relays low before the radio comes up
    let lock = BoardPin::new(peripherals.pins.gpio25.downgrade_output())?;
    let unlock = BoardPin::new(peripherals.pins.gpio26.downgrade_output())?;
    let mut status_led = BoardPin::new(peripherals.pins.gpio2.downgrade_output())?;
    info!("Relay outputs initialized (lock=GPIO25, unlock=GPIO26, led=GPIO2)");

    let uart = ble::NimbleUart::new().map_err(|e| anyhow::anyhow!("BLE init failed: {:?}", e))?;

    blink(&mut status_led, STARTUP_BLINKS);

    let pins = RelayPins {
        lock,
        unlock,
        status_led,
    };
    let mut dispatcher = Dispatcher::new(config, uart, pins, BoardTimer::new())?;
    dispatcher.start()?;

    info!("Pairing required - encryption enforced on UART");
    info!("Ready! Waiting for BLE connection...");

    loop {
        match dispatcher.poll() {
            Ok(Outcome::Idle) => std::thread::sleep(POLL_INTERVAL),
            Ok(outcome) => debug!("Handled: {:?}", outcome),
            Err(e) => error!("Event failed: {}", e),
        }
    }
}

/// Read an optional JSON config blob, falling back to defaults
fn load_config(nvs: &EspNvs<NvsDefault>) -> Config {
    let mut buf = [0u8; 512];
    match nvs.get_blob(KEY_CONFIG, &mut buf) {
        Ok(Some(data)) => match Config::from_json(data) {
            Ok(config) => {
                info!("Loaded config from NVS ({} bytes)", data.len());
                config
            }
            Err(e) => {
                warn!("Ignoring stored config: {}", e);
                Config::default()
            }
        },
        Ok(None) => Config::default(),
        Err(e) => {
            warn!("Failed to read config from NVS: {:?}", e);
            Config::default()
        }
    }
}

fn blink(led: &mut BoardPin, times: u32) {
    for _ in 0..times {
        let _ = led.set_high();
        std::thread::sleep(STARTUP_BLINK);
        let _ = led.set_low();
        std::thread::sleep(STARTUP_BLINK);
    }
}
