//! BLE Client for KeyFob devices
//!
//! Provides functions to scan for KeyFobs, open a UART link and send lock /
//! unlock commands. Pairing is left to the operating system: the first
//! write to the encrypted RX characteristic makes it prompt for the PIN the
//! device prints on its console.

use btleplug::api::{
    Central, Characteristic, Manager as _, Peripheral as _, ScanFilter, ValueNotification,
    WriteType,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::{Stream, StreamExt};
use serde::Serialize;
use std::pin::Pin;
use std::time::Duration;
use uuid::Uuid;

use keyfob_proto::ble::{DEVICE_NAME, RX_UUID, SERVICE_UUID, TX_UUID};
use keyfob_proto::controller;

/// How long to wait for status lines after a command
pub const DEFAULT_WAIT: Duration = Duration::from_secs(2);

/// A discovered BLE device
#[derive(Debug, Clone, Serialize)]
pub struct KeyfobDevice {
    pub name: String,
    pub address: String,
    pub rssi: Option<i16>,
    pub is_keyfob: bool,
}

/// Parse UUID string into uuid::Uuid
fn parse_uuid(s: &str) -> Result<Uuid, Box<dyn std::error::Error>> {
    Ok(Uuid::parse_str(s)?)
}

/// Match "KeyFob", "nimble [KeyFob]" or anything advertising the UART service
fn is_keyfob(name: &str, services: &[Uuid]) -> bool {
    let service = Uuid::parse_str(SERVICE_UUID).ok();
    name.starts_with(DEVICE_NAME)
        || name.contains(&format!("[{}", DEVICE_NAME))
        || service.is_some_and(|uuid| services.contains(&uuid))
}

/// Get the default Bluetooth adapter
pub async fn get_adapter() -> Result<Adapter, Box<dyn std::error::Error>> {
    let manager = Manager::new().await?;
    let adapters = manager.adapters().await?;
    adapters.into_iter().next().ok_or_else(|| "No Bluetooth adapter found".into())
}

/// Scan for BLE devices
///
/// Returns a list of discovered devices. KeyFobs have `is_keyfob = true`.
pub async fn scan(duration_secs: u64) -> Result<Vec<KeyfobDevice>, Box<dyn std::error::Error>> {
    let adapter = get_adapter().await?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(duration_secs)).await;

    let peripherals = adapter.peripherals().await?;
    let mut devices = Vec::new();

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_else(|| "Unknown".to_string());
            let address = peripheral.address().to_string();
            let is_keyfob = is_keyfob(&name, &props.services);

            devices.push(KeyfobDevice {
                name,
                address,
                rssi: props.rssi,
                is_keyfob,
            });
        }
    }

    adapter.stop_scan().await?;
    Ok(devices)
}

/// Find a KeyFob by name/address pattern, or find any KeyFob
pub async fn find_device(target: Option<&str>) -> Result<Peripheral, Box<dyn std::error::Error>> {
    let adapter = get_adapter().await?;

    adapter.start_scan(ScanFilter::default()).await?;
    tokio::time::sleep(Duration::from_secs(5)).await;

    let peripherals = adapter.peripherals().await?;

    for peripheral in peripherals {
        if let Some(props) = peripheral.properties().await? {
            let name = props.local_name.unwrap_or_default();
            let addr = peripheral.address().to_string();

            let matches = match target {
                Some(t) => name.contains(t) || addr.contains(t),
                None => is_keyfob(&name, &props.services),
            };

            if matches {
                adapter.stop_scan().await?;
                return Ok(peripheral);
            }
        }
    }

    adapter.stop_scan().await?;
    Err("No KeyFob device found".into())
}

/// Reassembles notification chunks into lines
///
/// A status line longer than the ATT MTU arrives split over several
/// notifications.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: String,
}

impl LineBuffer {
    /// Add a chunk, returning every line it completed
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.push_str(&String::from_utf8_lossy(chunk));

        let mut lines = Vec::new();
        while let Some(pos) = self.pending.find('\n') {
            let line: String = self.pending.drain(..=pos).collect();
            lines.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        lines
    }

    /// Whatever is left without a trailing newline
    pub fn flush(&mut self) -> Option<String> {
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }
}

type Notifications = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

/// An open UART connection to one KeyFob
pub struct Link {
    peripheral: Peripheral,
    rx: Characteristic,
    tx_uuid: Uuid,
    notifications: Notifications,
    lines: LineBuffer,
}

impl Link {
    /// Connect, discover the UART characteristics and subscribe to status lines
    pub async fn open(target: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let peripheral = find_device(target).await?;

        peripheral.connect().await?;
        peripheral.discover_services().await?;

        let characteristics = peripheral.characteristics();

        let rx_uuid = parse_uuid(RX_UUID)?;
        let tx_uuid = parse_uuid(TX_UUID)?;

        let rx = characteristics
            .iter()
            .find(|c| c.uuid == rx_uuid)
            .cloned()
            .ok_or("UART RX characteristic not found")?;

        let tx = characteristics
            .iter()
            .find(|c| c.uuid == tx_uuid)
            .cloned()
            .ok_or("UART TX characteristic not found")?;

        let notifications = peripheral.notifications().await?;
        peripheral.subscribe(&tx).await?;

        Ok(Self {
            peripheral,
            rx,
            tx_uuid,
            notifications,
            lines: LineBuffer::default(),
        })
    }

    /// Write one frame and collect the status lines that arrive within `wait`
    pub async fn send(
        &mut self,
        frame: &[u8],
        wait: Duration,
    ) -> Result<Vec<String>, Box<dyn std::error::Error>> {
        self.peripheral
            .write(&self.rx, frame, WriteType::WithResponse)
            .await?;
        Ok(self.collect(wait).await)
    }

    /// Collect status lines for `wait` without sending anything
    pub async fn listen(&mut self, wait: Duration) -> Vec<String> {
        self.collect(wait).await
    }

    async fn collect(&mut self, wait: Duration) -> Vec<String> {
        let deadline = tokio::time::Instant::now() + wait;
        let mut lines = Vec::new();

        loop {
            match tokio::time::timeout_at(deadline, self.notifications.next()).await {
                Ok(Some(notification)) if notification.uuid == self.tx_uuid => {
                    lines.extend(self.lines.push(&notification.value));
                }
                Ok(Some(_)) => continue,
                // Stream closed (disconnected) or time is up
                Ok(None) | Err(_) => break,
            }
        }

        lines.extend(self.lines.flush());
        lines
    }

    pub async fn close(self) -> Result<(), Box<dyn std::error::Error>> {
        self.peripheral.disconnect().await?;
        Ok(())
    }
}

/// Connect, send `frame`, print nothing, return the status lines
pub async fn send_once(
    target: Option<&str>,
    frame: &[u8],
    wait: Duration,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let mut link = Link::open(target).await?;
    let result = link.send(frame, wait).await;
    let _ = link.close().await;
    result
}

/// Pulse the lock relay
pub async fn lock(target: Option<&str>) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    send_once(target, b"lock", DEFAULT_WAIT).await
}

/// Pulse the unlock relay
pub async fn unlock(target: Option<&str>) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    send_once(target, b"unlock", DEFAULT_WAIT).await
}

/// Emulate a Controller pad button press (press then release)
pub async fn press(
    target: Option<&str>,
    button: u8,
) -> Result<Vec<String>, Box<dyn std::error::Error>> {
    let down = controller::button_frame(button, true).ok_or("button must be 1-8")?;
    let up = controller::button_frame(button, false).ok_or("button must be 1-8")?;

    let mut link = Link::open(target).await?;
    let result = async {
        let mut lines = link.send(&down, DEFAULT_WAIT).await?;
        lines.extend(link.send(&up, Duration::from_millis(200)).await?);
        Ok::<_, Box<dyn std::error::Error>>(lines)
    }
    .await;
    let _ = link.close().await;
    result
}
