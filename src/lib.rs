//! # stretchsense-rs
//!
//! Async Rust library and CLI for streaming capacitance data from
//! [StretchSense](https://www.stretchsense.com) sensors over Bluetooth Low
//! Energy and SPI.
//!
//! ## Supported hardware
//!
//! | Generation | Transport | Channels | Notes |
//! |---|---|---|---|
//! | Gen2 | BLE | 1 | single-channel sensor, fixed 0.1 pF scale |
//! | Gen3 | BLE | 10 | ten-channel board |
//! | 10TT | BLE | 10 | same wire format as Gen3 |
//! | Tako quadrant | BLE | 96 | Left/Right/Front/Back each connect independently |
//! | 16FGV1.0 | SPI | 10 | wired circuit, configurable resolution |
//!
//! The generation is detected automatically at connect time from the
//! device's primary GATT service; no configuration is required.
//!
//! ## Quick start
//!
//! ```no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use stretchsense_rs::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let registry = Arc::new(Registry::new());
//!     let client = SensorClient::new(SensorClientConfig::default());
//!     let (mut events, _handle) = client.connect(&registry).await?;
//!
//!     let mut sampler = Sampler::new();
//!     let reg = Arc::clone(&registry);
//!     sampler.start(Duration::from_millis(100), move || {
//!         println!("{}", to_csv_line(&reg.snapshot()));
//!         Ok(())
//!     });
//!
//!     while let Some(event) = events.recv().await {
//!         if let SensorEvent::Disconnected { .. } = event {
//!             break;
//!         }
//!     }
//!     sampler.stop();
//!     Ok(())
//! }
//! ```
//!
//! ## Design
//!
//! Decoded values do not stream through channels; they land in a shared
//! [`registry::Registry`], the single authoritative list of connected
//! channels.  Each connected device owns one contiguous block of channel
//! records (1, 10, or 96 of them), appended on connect and removed on
//! disconnect.  Exporters take snapshots on their own cadence, so a GUI, a
//! CSV recorder, and a script can all read the same registry without
//! touching a transport handle.
//!
//! ## Module overview
//!
//! | Module | Purpose |
//! |---|---|
//! | [`prelude`] | One-line glob import of the most commonly needed types |
//! | [`ble_client`] | BLE scanning, connecting, and notification dispatch |
//! | [`spi`] | Wired (SPI/GPIO) transport behind a small HAL boundary |
//! | [`registry`] | The lock-protected channel registry |
//! | [`sampler`] | Idle/Polling repeating-tick scheduler |
//! | [`export`] | Pure CSV rendering of registry snapshots |
//! | [`protocol`] | GATT UUIDs, the generation catalog, SPI wire helpers |
//! | [`parse`] | Low-level byte-to-pF frame decoders |
//! | [`types`] | Channel records, generations, resolutions, events |
//! | [`error`] | Error taxonomy |

pub mod ble_client;
pub mod error;
pub mod export;
pub mod parse;
pub mod protocol;
pub mod registry;
pub mod sampler;
pub mod spi;
pub mod types;

// ── Prelude ───────────────────────────────────────────────────────────────────

/// Convenience re-exports for downstream crates.
///
/// A single glob import covers the surface needed to scan, connect, and
/// read capacitance values:
///
/// ```no_run
/// use std::sync::Arc;
/// use stretchsense_rs::prelude::*;
///
/// # #[tokio::main]
/// # async fn main() -> anyhow::Result<()> {
/// let registry = Arc::new(Registry::new());
/// let client = SensorClient::new(SensorClientConfig::default());
/// for device in client.scan_all().await? {
///     let (_events, handle) = client.connect_to(device, &registry).await?;
///     println!("connected {} as {}", handle.address(), handle.generation());
/// }
/// # Ok(())
/// # }
/// ```
pub mod prelude {
    // ── Client ────────────────────────────────────────────────────────────────
    pub use crate::ble_client::{SensorClient, SensorClientConfig, SensorDevice, SensorHandle};

    // ── Core state ────────────────────────────────────────────────────────────
    pub use crate::registry::Registry;
    pub use crate::types::{Channel, Generation, Resolution, SensorEvent};

    // ── Scheduling and export ─────────────────────────────────────────────────
    pub use crate::export::{to_csv_line, values};
    pub use crate::sampler::{Sampler, SamplerState};

    // ── Wired transport ───────────────────────────────────────────────────────
    pub use crate::spi::{SpiLink, SpiLinkConfig};

    // ── Errors ────────────────────────────────────────────────────────────────
    pub use crate::error::{Error, Result};
}
