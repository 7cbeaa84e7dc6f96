//! BLE transport adapter: scanning, connecting, and notification dispatch.
//!
//! The client owns every btleplug handle; durable state lives in the shared
//! [`Registry`], keyed by address string.  Nothing outside this module ever
//! touches a live connection object, which is what keeps the core decodable
//! and testable without hardware.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{
    Central, CentralEvent, Characteristic, Manager as _, Peripheral as _, ScanFilter,
};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::StreamExt;
use log::{debug, info, warn};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::parse::{decode_multi, decode_single};
use crate::protocol;
use crate::registry::Registry;
use crate::types::{Generation, SensorEvent};

// ── SensorDevice ──────────────────────────────────────────────────────────────

/// A StretchSense circuit discovered during a BLE scan.
///
/// Returned by [`SensorClient::scan_all`]; pass to [`SensorClient::connect_to`]
/// to establish a streaming connection.
#[derive(Clone, Debug)]
pub struct SensorDevice {
    /// Advertised device name (`"StretchSense"` or `"StretchSense_Tako"`).
    pub name: String,
    /// Platform BLE identifier.
    /// • macOS / Windows — a UUID string
    /// • Linux — a Bluetooth MAC address (`AA:BB:CC:DD:EE:FF`)
    pub id: String,
    pub(crate) peripheral: Peripheral,
    /// The adapter that discovered this device, kept so the disconnect
    /// watcher can listen on the right event stream.
    pub(crate) adapter: Adapter,
}

// ── SensorClientConfig ────────────────────────────────────────────────────────

/// Configuration for [`SensorClient`].
#[derive(Debug, Clone)]
pub struct SensorClientConfig {
    /// BLE scan duration in seconds before giving up. Default: `5`.
    pub scan_timeout_secs: u64,
    /// Match devices whose advertised name starts with this string.
    ///
    /// The default `"StretchSense"` matches both single circuits and Tako
    /// quadrants (which advertise as `"StretchSense_Tako"`).
    pub name_prefix: String,
}

impl Default for SensorClientConfig {
    fn default() -> Self {
        Self {
            scan_timeout_secs: 5,
            name_prefix: protocol::DEVICE_NAME.into(),
        }
    }
}

// ── SensorClient ──────────────────────────────────────────────────────────────

/// BLE client for StretchSense circuits.
///
/// Handles scanning, connecting, GATT subscription, and notification
/// dispatch for every known hardware generation.  The generation is
/// classified at connect time from the primary service UUID (see
/// [`protocol::classify`]); the matching channel block is registered in the
/// shared [`Registry`] and every subsequent notification decodes straight
/// into it.
pub struct SensorClient {
    config: SensorClientConfig,
}

impl SensorClient {
    pub fn new(config: SensorClientConfig) -> Self {
        Self { config }
    }

    // ── Public: scan ─────────────────────────────────────────────────────────

    /// Scan for **all** nearby StretchSense circuits and return them.
    ///
    /// The scan runs for `config.scan_timeout_secs` seconds so that multiple
    /// circuits in range (e.g. four Tako quadrants) can all be discovered
    /// before the function returns.
    pub async fn scan_all(&self) -> Result<Vec<SensorDevice>> {
        let manager = Manager::new().await?;
        let adapter = manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Transport("no Bluetooth adapter found".into()))?;

        wait_powered_on(&adapter).await;

        info!(
            "scan_all: scanning for {} s …",
            self.config.scan_timeout_secs
        );
        adapter.start_scan(ScanFilter::default()).await?;
        tokio::time::sleep(Duration::from_secs(self.config.scan_timeout_secs)).await;
        adapter.stop_scan().await.ok();

        let mut found = vec![];
        for p in adapter.peripherals().await? {
            if let Ok(Some(props)) = p.properties().await {
                if let Some(name) = props.local_name {
                    if name.starts_with(&self.config.name_prefix) {
                        let id = p.id().to_string();
                        info!("scan_all: found {name}  id={id}");
                        found.push(SensorDevice {
                            name,
                            id,
                            peripheral: p,
                            adapter: adapter.clone(),
                        });
                    }
                }
            }
        }
        info!("scan_all: {} device(s) found", found.len());
        Ok(found)
    }

    // ── Public: connect ──────────────────────────────────────────────────────

    /// Scan for the first StretchSense circuit and connect to it.
    ///
    /// Equivalent to [`SensorClient::scan_all`] followed by
    /// [`SensorClient::connect_to`] on the first result.  Useful when only
    /// one circuit is expected.
    pub async fn connect(
        &self,
        registry: &Arc<Registry>,
    ) -> Result<(mpsc::Receiver<SensorEvent>, SensorHandle)> {
        let device = self
            .scan_all()
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::Transport("no StretchSense circuit in range".into()))?;
        self.connect_to(device, registry).await
    }

    /// Connect to a specific device returned by [`SensorClient::scan_all`]:
    /// classify its generation, register its channel block, enable
    /// notifications on its data characteristics, and start the decode
    /// dispatch task.
    ///
    /// Returns a lifecycle event receiver and a [`SensorHandle`] for
    /// disconnecting.  Decoded values flow into `registry`, not through the
    /// event channel.
    pub async fn connect_to(
        &self,
        device: SensorDevice,
        registry: &Arc<Registry>,
    ) -> Result<(mpsc::Receiver<SensorEvent>, SensorHandle)> {
        let SensorDevice {
            name,
            id: address,
            peripheral,
            adapter,
        } = device;

        // Hard timeout on connect(): BlueZ's Connect call can block forever
        // when the device went out of range after the scan.
        tokio::time::timeout(Duration::from_secs(10), peripheral.connect())
            .await
            .map_err(|_| Error::Transport("BLE connect() timed out after 10 s".into()))??;

        // On Linux the stack signals connection completion before the GATT
        // cache is populated; discovering too early returns an empty set.
        #[cfg(target_os = "linux")]
        tokio::time::sleep(Duration::from_millis(600)).await;

        tokio::time::timeout(Duration::from_secs(15), peripheral.discover_services())
            .await
            .map_err(|_| Error::Transport("discover_services() timed out after 15 s".into()))??;

        // ── Classify the generation from the primary service ───────────────
        let generation = match peripheral
            .services()
            .iter()
            .find_map(|s| protocol::classify(s.uuid).ok())
        {
            Some(generation) => generation,
            None => {
                peripheral.disconnect().await.ok();
                return Err(Error::UnknownDevice(format!(
                    "{name} ({address}) exposes no known StretchSense service"
                )));
            }
        };
        info!("{name} ({address}): classified as {generation}");

        // ── Register the channel block ──────────────────────────────────────
        if let Err(e) = registry.connect_device(&address, generation) {
            peripheral.disconnect().await.ok();
            return Err(e);
        }

        // ── Enable notifications on the data characteristics ────────────────
        let chars: BTreeSet<Characteristic> = peripheral.characteristics();
        let find_char = |uuid: Uuid| -> Option<Characteristic> {
            chars.iter().find(|c| c.uuid == uuid).cloned()
        };

        let mut subscribed = 0usize;
        for &data_uuid in protocol::data_characteristics(generation) {
            match find_char(data_uuid) {
                Some(c) => {
                    peripheral.subscribe(&c).await?;
                    subscribed += 1;
                }
                None => warn!("{address}: data characteristic {data_uuid} not found"),
            }
        }
        if subscribed == 0 {
            registry.disconnect_device(&address);
            peripheral.disconnect().await.ok();
            return Err(Error::Transport(format!(
                "{address}: no data characteristics to subscribe to"
            )));
        }
        debug!("{address}: {subscribed} data characteristic(s) subscribed");

        // ── Event channel ───────────────────────────────────────────────────
        let (tx, rx) = mpsc::channel::<SensorEvent>(32);
        let _ = tx
            .send(SensorEvent::Connected {
                address: address.clone(),
                generation,
            })
            .await;

        // ── Disconnect watcher ──────────────────────────────────────────────
        // CentralEvent::DeviceDisconnected fires reliably when the link
        // drops (circuit powered off, out of range), often before the
        // notification stream closes.  Whichever path runs first removes
        // the block; the other finds a no-op.
        let watcher_tx = tx.clone();
        let watcher_registry = Arc::clone(registry);
        let watcher_address = address.clone();
        let peripheral_id = peripheral.id();
        tokio::spawn(async move {
            match adapter.events().await {
                Ok(mut events) => {
                    while let Some(event) = events.next().await {
                        if let CentralEvent::DeviceDisconnected(id) = event {
                            if id == peripheral_id {
                                info!("{watcher_address}: link lost");
                                watcher_registry.disconnect_device(&watcher_address);
                                let _ = watcher_tx
                                    .send(SensorEvent::Disconnected {
                                        address: watcher_address.clone(),
                                    })
                                    .await;
                                break;
                            }
                        }
                    }
                }
                Err(e) => warn!("{watcher_address}: no adapter event stream: {e}"),
            }
        });

        // ── Notification dispatch ───────────────────────────────────────────
        let dispatch_registry = Arc::clone(registry);
        let dispatch_address = address.clone();
        let peripheral_clone = peripheral.clone();
        tokio::spawn(async move {
            let mut notifications = match peripheral_clone.notifications().await {
                Ok(n) => n,
                Err(e) => {
                    warn!("{dispatch_address}: could not get notification stream: {e}");
                    return;
                }
            };
            info!("{dispatch_address}: notification stream subscribed, waiting for data…");

            while let Some(notif) = notifications.next().await {
                dispatch_frame(
                    &dispatch_registry,
                    &dispatch_address,
                    generation,
                    notif.uuid,
                    &notif.value,
                );
            }

            info!("{dispatch_address}: notification stream ended");
            dispatch_registry.disconnect_device(&dispatch_address);
            let _ = tx
                .send(SensorEvent::Disconnected {
                    address: dispatch_address.clone(),
                })
                .await;
        });

        let handle = SensorHandle {
            peripheral,
            registry: Arc::clone(registry),
            address,
            generation,
        };
        Ok((rx, handle))
    }
}

// ── Frame dispatch ────────────────────────────────────────────────────────────

/// Decode one notification and write its values into the registry.
///
/// Decode problems are logged and dropped; the affected channels keep their
/// previous value.  This function must never panic or return, because it
/// sits in the hot notification loop.
fn dispatch_frame(
    registry: &Registry,
    address: &str,
    generation: Generation,
    characteristic: Uuid,
    frame: &[u8],
) {
    let Some(group) = protocol::group_offset(generation, characteristic) else {
        debug!("{address}: notification from unexpected characteristic {characteristic}");
        return;
    };

    if generation == Generation::Gen2 {
        match decode_single(frame) {
            Ok(value) => registry.update_value(address, 0, value),
            Err(e) => warn!("{address}: dropped frame: {e}"),
        }
        return;
    }

    // Multi-channel generations: group k covers channels 10k.., bounded by
    // the block size (a Tako quadrant's last group holds six channels).
    let base = group * 10;
    let count = (generation.channel_count() - base).min(10);
    let values = decode_multi(frame, count);
    if values.is_empty() {
        warn!("{address}: empty data frame on group {group}, keeping stale values");
        return;
    }
    if values.len() < count {
        debug!(
            "{address}: short frame on group {group} ({} of {count} channels)",
            values.len()
        );
    }
    registry.update_block(address, base, &values);
}

// ── SensorHandle ──────────────────────────────────────────────────────────────

/// A handle to an active StretchSense connection.
pub struct SensorHandle {
    peripheral: Peripheral,
    registry: Arc<Registry>,
    address: String,
    generation: Generation,
}

impl SensorHandle {
    /// Registry address of the connected device.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Classified hardware generation of the connected device.
    pub fn generation(&self) -> Generation {
        self.generation
    }

    /// Check the link at the BLE adapter level.  Useful as a watchdog when
    /// notifications are sparse.
    pub async fn is_connected(&self) -> bool {
        self.peripheral.is_connected().await.unwrap_or(false)
    }

    /// Gracefully disconnect and remove the device's channel block.
    pub async fn disconnect(&self) -> Result<()> {
        self.peripheral.disconnect().await?;
        self.registry.disconnect_device(&self.address);
        Ok(())
    }
}

// ── Adapter readiness ─────────────────────────────────────────────────────────

/// Wait for the adapter to power on before scanning.
///
/// On macOS, CBCentralManager starts in an "unknown" state after launch;
/// scanning before it reports poweredOn is a silent no-op.  Elsewhere this
/// returns immediately.
async fn wait_powered_on(adapter: &Adapter) {
    #[cfg(target_os = "macos")]
    {
        use btleplug::api::CentralState;

        let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
        loop {
            match adapter.adapter_state().await {
                Ok(CentralState::PoweredOn) => break,
                Ok(state) => {
                    if tokio::time::Instant::now() >= deadline {
                        warn!("adapter still in state {state:?} after 3 s, proceeding anyway");
                        break;
                    }
                    debug!("adapter state = {state:?}, waiting…");
                }
                Err(e) => {
                    warn!("adapter_state() error: {e}");
                    break;
                }
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
        // Let the CoreBluetooth delegate settle.
        tokio::time::sleep(Duration::from_millis(300)).await;
    }
    #[cfg(not(target_os = "macos"))]
    let _ = adapter;
}

#[cfg(test)]
mod tests {
    use super::*;

    /// The dispatch path is pure with respect to the registry, so the
    /// decode-and-update logic is testable without a BLE stack.
    #[test]
    fn gen2_notification_updates_single_channel() {
        let registry = Registry::new();
        registry.connect_device("AA", Generation::Gen2).unwrap();

        dispatch_frame(
            &registry,
            "AA",
            Generation::Gen2,
            protocol::GEN2_DATA,
            &[0x04, 0xD2],
        );
        assert_eq!(registry.snapshot()[0].value, 123.4);
    }

    #[test]
    fn gen2_bad_frame_keeps_previous_value() {
        let registry = Registry::new();
        registry.connect_device("AA", Generation::Gen2).unwrap();
        registry.update_value("AA", 0, 55.5);

        dispatch_frame(&registry, "AA", Generation::Gen2, protocol::GEN2_DATA, &[]);
        assert_eq!(registry.snapshot()[0].value, 55.5);
    }

    #[test]
    fn gen3_notification_updates_all_ten_channels() {
        let registry = Registry::new();
        registry.connect_device("BB", Generation::Gen3).unwrap();

        let mut frame = Vec::new();
        for raw in [0u16, 10, 100, 1000, 9999, 0, 0, 0, 0, 0] {
            frame.extend_from_slice(&raw.to_be_bytes());
        }
        dispatch_frame(&registry, "BB", Generation::Gen3, protocol::GEN3_DATA, &frame);

        let snapshot = registry.snapshot();
        let expected = [0.0, 1.0, 10.0, 100.0, 999.9, 0.0, 0.0, 0.0, 0.0, 0.0];
        for (channel, want) in snapshot.iter().zip(expected) {
            assert_eq!(channel.value, want);
        }
    }

    #[test]
    fn tako_group_notifications_land_at_their_base_offset() {
        let registry = Registry::new();
        registry.connect_device("CC", Generation::TakoFront).unwrap();

        let frame: Vec<u8> = (1u16..=10)
            .flat_map(|v| (v * 10).to_be_bytes())
            .collect();

        // Group 3 covers channels 30..40.
        dispatch_frame(
            &registry,
            "CC",
            Generation::TakoFront,
            protocol::TAKO_FRONT_DATA[3],
            &frame,
        );
        let snapshot = registry.snapshot();
        for (i, channel) in snapshot[30..40].iter().enumerate() {
            assert_eq!(channel.value, (i + 1) as f64);
        }
        assert!(snapshot[..30].iter().all(|c| c.value == 0.0));
        assert!(snapshot[40..].iter().all(|c| c.value == 0.0));
    }

    #[test]
    fn tako_last_group_updates_only_real_channels() {
        let registry = Registry::new();
        registry.connect_device("DD", Generation::TakoBack).unwrap();

        let frame: Vec<u8> = (1u16..=10)
            .flat_map(|v| (v * 10).to_be_bytes())
            .collect();

        // Group 9 holds channels 90..96: six values apply, four have no
        // target channel.
        dispatch_frame(
            &registry,
            "DD",
            Generation::TakoBack,
            protocol::TAKO_BACK_DATA[9],
            &frame,
        );
        let snapshot = registry.snapshot();
        for (i, channel) in snapshot[90..96].iter().enumerate() {
            assert_eq!(channel.value, (i + 1) as f64);
        }
        assert!(snapshot[..90].iter().all(|c| c.value == 0.0));
    }

    #[test]
    fn foreign_characteristic_is_ignored() {
        let registry = Registry::new();
        registry.connect_device("EE", Generation::Gen3).unwrap();

        dispatch_frame(
            &registry,
            "EE",
            Generation::Gen3,
            protocol::TAKO_LEFT_DATA[0],
            &[0x00, 0x0A],
        );
        assert!(registry.snapshot().iter().all(|c| c.value == 0.0));
    }

    #[test]
    fn short_tako_frame_leaves_tail_of_group_stale() {
        let registry = Registry::new();
        registry.connect_device("FF", Generation::TakoLeft).unwrap();

        let full: Vec<u8> = (1u16..=10).flat_map(|v| (v * 10).to_be_bytes()).collect();
        dispatch_frame(
            &registry,
            "FF",
            Generation::TakoLeft,
            protocol::TAKO_LEFT_DATA[0],
            &full,
        );

        // A truncated follow-up only refreshes the channels it carries.
        dispatch_frame(
            &registry,
            "FF",
            Generation::TakoLeft,
            protocol::TAKO_LEFT_DATA[0],
            &full[..4],
        );
        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].value, 1.0);
        assert_eq!(snapshot[1].value, 2.0);
        for (i, channel) in snapshot[2..10].iter().enumerate() {
            assert_eq!(channel.value, (i + 3) as f64);
        }
    }
}
