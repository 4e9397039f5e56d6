//! KeyFob BLE tool - lock and unlock KeyFob relay controllers
//!
//! Usage:
//!   keyfob-ble scan [--duration 5] [--json]
//!   keyfob-ble lock [--device NAME]
//!   keyfob-ble unlock [--device NAME]
//!   keyfob-ble press <1-8> [--device NAME]   - emulate a Controller pad button
//!   keyfob-ble send <text> [--device NAME]   - send a raw UART frame
//!   keyfob-ble listen [--seconds 30]         - print status lines
//!
//! The first command on a new phone or laptop triggers OS pairing; the PIN
//! is printed on the KeyFob's serial console.

use clap::{Parser, Subcommand};
use keyfob_ble_controller::ble;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "keyfob-ble")]
#[command(about = "Lock and unlock KeyFob relay controllers over BLE")]
struct Cli {
    /// Device name or address to connect to (default: first KeyFob found)
    #[arg(short, long, global = true)]
    device: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Scan for KeyFob devices
    Scan {
        /// Scan duration in seconds
        #[arg(long, default_value = "5")]
        duration: u64,
        /// Print results as JSON
        #[arg(long)]
        json: bool,
        /// Show every BLE device, not only KeyFobs
        #[arg(short, long)]
        all: bool,
    },
    /// Pulse the lock relay
    Lock,
    /// Pulse the unlock relay
    Unlock,
    /// Press and release a Controller pad button
    Press {
        /// Button number (1 = lock, 2 = unlock)
        #[arg(value_parser = clap::value_parser!(u8).range(1..=8))]
        button: u8,
    },
    /// Send a raw text frame
    Send {
        text: String,
        /// Seconds to wait for status lines
        #[arg(long, default_value = "2")]
        wait: u64,
    },
    /// Connect and print status lines
    Listen {
        #[arg(long, default_value = "30")]
        seconds: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let target = cli.device.as_deref();

    match cli.command {
        Commands::Scan {
            duration,
            json,
            all,
        } => {
            scan_devices(duration, json, all).await?;
        }
        Commands::Lock => {
            println!("Locking...");
            print_lines(&ble::lock(target).await?);
        }
        Commands::Unlock => {
            println!("Unlocking...");
            print_lines(&ble::unlock(target).await?);
        }
        Commands::Press { button } => {
            println!("Pressing button {}...", button);
            print_lines(&ble::press(target, button).await?);
        }
        Commands::Send { text, wait } => {
            let lines = ble::send_once(target, text.as_bytes(), Duration::from_secs(wait)).await?;
            print_lines(&lines);
        }
        Commands::Listen { seconds } => {
            let mut link = ble::Link::open(target).await?;
            println!("Connected, listening for {} seconds...", seconds);
            print_lines(&link.listen(Duration::from_secs(seconds)).await);
            link.close().await?;
        }
    }

    Ok(())
}

async fn scan_devices(duration: u64, json: bool, all: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !json {
        println!("Scanning for KeyFob devices ({} seconds)...", duration);
    }

    let devices: Vec<_> = ble::scan(duration)
        .await?
        .into_iter()
        .filter(|device| all || device.is_keyfob)
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&devices)?);
        return Ok(());
    }

    println!("\nFound {} devices:", devices.len());
    for device in devices {
        let rssi = device
            .rssi
            .map(|r| format!("{} dBm", r))
            .unwrap_or_else(|| "N/A".to_string());
        let marker = if device.is_keyfob { " [KEYFOB]" } else { "" };
        println!("  {} ({}) RSSI: {}{}", device.name, device.address, rssi, marker);
    }

    Ok(())
}

fn print_lines(lines: &[String]) {
    if lines.is_empty() {
        eprintln!("(no response from device)");
    }
    for line in lines {
        println!("  {}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_lock_with_device() {
        let cli = Cli::try_parse_from(["keyfob-ble", "lock", "--device", "AA:BB"]).unwrap();
        assert_eq!(cli.command, Commands::Lock);
        assert_eq!(cli.device.as_deref(), Some("AA:BB"));
    }

    #[test]
    fn parse_scan_defaults() {
        let cli = Cli::try_parse_from(["keyfob-ble", "scan"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Scan {
                duration: 5,
                json: false,
                all: false
            }
        );
        assert_eq!(cli.device, None);
    }

    #[test]
    fn press_button_range() {
        let cli = Cli::try_parse_from(["keyfob-ble", "press", "2"]).unwrap();
        assert_eq!(cli.command, Commands::Press { button: 2 });
        assert!(Cli::try_parse_from(["keyfob-ble", "press", "0"]).is_err());
        assert!(Cli::try_parse_from(["keyfob-ble", "press", "9"]).is_err());
    }

    #[test]
    fn send_requires_text() {
        assert!(Cli::try_parse_from(["keyfob-ble", "send"]).is_err());
        let cli = Cli::try_parse_from(["keyfob-ble", "send", "!B31", "--wait", "5"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Send {
                text: "!B31".to_string(),
                wait: 5
            }
        );
    }
}
