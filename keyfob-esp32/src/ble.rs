//! NimBLE UART peripheral with pairing required on the RX characteristic
//!
//! GATT callbacks run on the NimBLE host task. They never touch the
//! dispatcher; they queue `BleEvent`s that the main loop drains in order.
//!
//! Uses UUIDs from keyfob_proto::ble.

use esp32_nimble::enums::{AuthReq, SecurityIOCap};
use esp32_nimble::utilities::mutex::Mutex as NimbleMutex;
use esp32_nimble::utilities::BleUuid;
use esp32_nimble::{
    uuid128, BLEAdvertisementData, BLECharacteristic, BLEDevice, BLEError, NimbleProperties,
};
use keyfob_mcu::{BleEvent, BleUart, ConnHandle, Passkey};
use log::*;
use rand::Rng;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;

// These must match keyfob_proto::ble::{SERVICE_UUID, RX_UUID, TX_UUID}
const SERVICE_UUID: BleUuid = uuid128!("6e400001-b5a3-f393-e0a9-e50e24dcca9e");
const RX_UUID: BleUuid = uuid128!("6e400002-b5a3-f393-e0a9-e50e24dcca9e");
const TX_UUID: BleUuid = uuid128!("6e400003-b5a3-f393-e0a9-e50e24dcca9e");

/// BLE UART service backed by NimBLE
pub struct NimbleUart {
    events: Receiver<BleEvent>,
    tx: Arc<NimbleMutex<BLECharacteristic>>,
}

impl NimbleUart {
    /// Configure security, register callbacks and create the UART service.
    /// Advertising starts with `start_advertising`.
    pub fn new() -> Result<Self, BLEError> {
        let (sender, events) = mpsc::channel::<BleEvent>();

        let ble_device = BLEDevice::take();

        // Display-only + MITM: the phone must type the passkey we print
        ble_device
            .security()
            .set_auth(AuthReq::all())
            .set_io_cap(SecurityIOCap::DisplayOnly)
            .resolve_rpa();

        let server = ble_device.get_server();
        server.advertise_on_disconnect(true);

        let connect_tx = sender.clone();
        server.on_connect(move |_server, desc| {
            let conn = desc.conn_handle();
            info!("BLE: central connected (conn {}, bonded {})", conn, desc.bonded());
            send(&connect_tx, BleEvent::Connected(conn));

            if desc.bonded() {
                return;
            }

            // Fresh passkey for every pairing attempt
            let value = rand::thread_rng().gen_range(0..1_000_000u32);
            BLEDevice::take().security().set_passkey(value);
            match Passkey::from_number(value) {
                Ok(passkey) => send(
                    &connect_tx,
                    BleEvent::PasskeyRequest {
                        conn,
                        passkey: passkey.digits(),
                    },
                ),
                Err(e) => error!("BLE: generated bad passkey: {}", e),
            }
        });

        let disconnect_tx = sender.clone();
        server.on_disconnect(move |desc, reason| {
            let reason = match reason {
                Ok(()) => 0,
                Err(e) => e.code(),
            };
            send(
                &disconnect_tx,
                BleEvent::Disconnected {
                    conn: desc.conn_handle(),
                    reason,
                },
            );
        });

        let secured_tx = sender.clone();
        server.on_authentication_complete(move |desc, result| match result {
            Ok(()) if desc.encrypted() && desc.authenticated() => {
                send(&secured_tx, BleEvent::Secured(desc.conn_handle()));
            }
            Ok(()) => warn!(
                "BLE: link encrypted without MITM authentication (conn {})",
                desc.conn_handle()
            ),
            Err(e) => warn!("BLE: pairing failed (conn {}): {:?}", desc.conn_handle(), e),
        });

        let service = server.create_service(SERVICE_UUID);

        // RX: writes only accepted over an encrypted, authenticated link
        let frame_tx = sender;
        let rx = service.lock().create_characteristic(
            RX_UUID,
            NimbleProperties::WRITE
                | NimbleProperties::WRITE_NO_RSP
                | NimbleProperties::WRITE_ENC
                | NimbleProperties::WRITE_AUTHEN,
        );
        rx.lock().on_write(move |args| {
            let conn = args.desc().conn_handle();
            send(
                &frame_tx,
                BleEvent::Frame {
                    conn,
                    data: args.recv_data().to_vec(),
                },
            );
        });

        // TX: status lines
        let tx = service.lock().create_characteristic(
            TX_UUID,
            NimbleProperties::READ | NimbleProperties::NOTIFY,
        );

        Ok(Self { events, tx })
    }
}

fn send(sender: &Sender<BleEvent>, event: BleEvent) {
    if sender.send(event).is_err() {
        error!("BLE: event queue closed");
    }
}

impl BleUart for NimbleUart {
    type Error = BLEError;

    fn start_advertising(&mut self, device_name: &str) -> Result<(), Self::Error> {
        let ble_device = BLEDevice::take();
        BLEDevice::set_device_name(device_name)?;

        let advertising = ble_device.get_advertising();
        advertising.lock().set_data(
            BLEAdvertisementData::new()
                .name(device_name)
                .add_service_uuid(SERVICE_UUID),
        )?;
        advertising.lock().start()?;
        Ok(())
    }

    fn poll_event(&mut self) -> Option<BleEvent> {
        self.events.try_recv().ok()
    }

    fn notify(&mut self, _conn: ConnHandle, line: &str) -> Result<(), Self::Error> {
        // One channel at a time, so notifying every subscriber reaches it
        let mut payload = Vec::with_capacity(line.len() + 1);
        payload.extend_from_slice(line.as_bytes());
        payload.push(b'\n');
        self.tx.lock().set_value(&payload).notify();
        Ok(())
    }

    fn disconnect(&mut self, conn: ConnHandle) -> Result<(), Self::Error> {
        BLEDevice::take().get_server().disconnect(conn)
    }
}
