//! KeyFob BLE Controller
//!
//! BLE client for finding KeyFob devices and sending them commands over the
//! UART service.
//!
//! # Example
//!
//! ```ignore
//! use keyfob_ble_controller::ble;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Scan for devices
//!     let devices = ble::scan(5).await?;
//!     for device in &devices {
//!         println!("{} ({})", device.name, device.address);
//!     }
//!
//!     // Unlock, printing the status lines the device sends back
//!     let mut link = ble::Link::open(None).await?;
//!     for line in link.send(b"unlock", Duration::from_secs(2)).await? {
//!         println!("{}", line);
//!     }
//!     link.close().await?;
//!
//!     Ok(())
//! }
//! ```

pub mod ble;
