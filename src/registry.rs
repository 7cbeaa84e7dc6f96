//! The authoritative, lock-protected collection of connected channels.
//!
//! A [`Registry`] owns every [`Channel`] record in the process.  Transport
//! adapters write decoded values through it by `(address, channel_index)`;
//! exporters read copies out of it.  Neither side ever holds a reference
//! into the live sequence, so connect/disconnect can reshuffle blocks at any
//! time without invalidating anyone.
//!
//! One mutex covers structural mutation, value mutation, and snapshots.
//! Contention is negligible at sensor data rates (worst case ~1 kHz of
//! 10-value updates), and the single lock is what makes interleaved
//! notification callbacks and snapshot reads safe.

use std::ops::Range;
use std::sync::{Mutex, PoisonError};

use log::debug;

use crate::error::{Error, Result};
use crate::types::{Channel, Generation};

/// Ordered collection of channel blocks, one contiguous block per connected
/// device.
///
/// Insertion order is significant: exporters render channels in registry
/// order, and a device's channels always sit in one contiguous run in
/// connection order.
///
/// Shared as `Arc<Registry>` between transport adapters, samplers, and
/// exporters; all methods take `&self`.
#[derive(Debug, Default)]
pub struct Registry {
    channels: Mutex<Vec<Channel>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic while holding the lock can only leave fully-written `f64`
    // values behind, so a poisoned mutex still guards valid data.
    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Channel>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a device and append its channel block.
    ///
    /// Allocates `generation.channel_count()` fresh zero-valued channels at
    /// the end of the registry and returns their index range.  Reconnecting
    /// an address that is already active with the *same* generation first
    /// removes the old block, so at most one block per address ever exists.
    ///
    /// # Errors
    ///
    /// [`Error::InvalidState`] if the address is already registered under a
    /// different generation; the existing block is left untouched.
    pub fn connect_device(&self, address: &str, generation: Generation) -> Result<Range<usize>> {
        let mut channels = self.lock();

        if let Some(existing) = channels.iter().find(|c| c.address == address) {
            if existing.generation != generation {
                return Err(Error::InvalidState(format!(
                    "device {address} is already registered as {}, cannot reconnect as {generation}",
                    existing.generation
                )));
            }
            debug!("registry: replacing existing block for {address}");
            channels.retain(|c| c.address != address);
        }

        let base = channels.len();
        let count = generation.channel_count();
        channels.extend((0..count).map(|channel_index| Channel {
            address: address.to_owned(),
            generation,
            channel_index,
            value: 0.0,
        }));
        Ok(base..base + count)
    }

    /// Remove every channel belonging to `address` in one pass, keeping the
    /// remaining blocks contiguous.  No-op when the address is absent; a
    /// disconnect raced against a lost link must not error.
    pub fn disconnect_device(&self, address: &str) {
        self.lock().retain(|c| c.address != address);
    }

    /// Empty the registry.
    pub fn disconnect_all(&self) {
        self.lock().clear();
    }

    /// Overwrite the value of the channel matching `(address, channel_index)`.
    ///
    /// Silently does nothing when no such channel exists: devices routinely
    /// emit one last notification after their block has been removed.
    pub fn update_value(&self, address: &str, channel_index: usize, value: f64) {
        let mut channels = self.lock();
        match channels
            .iter_mut()
            .find(|c| c.address == address && c.channel_index == channel_index)
        {
            Some(channel) => channel.value = value,
            None => debug!("registry: no channel {address}/{channel_index}, dropping update"),
        }
    }

    /// Write `values` to consecutive channels of `address` starting at
    /// `first_channel`, in index order, under one lock acquisition.
    ///
    /// Values that map past the device's last channel are dropped (a Tako
    /// group-9 notification carries ten slots but only six real channels).
    /// Like [`Registry::update_value`], a missing device is a silent no-op.
    pub fn update_block(&self, address: &str, first_channel: usize, values: &[f64]) {
        let mut channels = self.lock();
        let mut written = 0usize;
        for channel in channels.iter_mut().filter(|c| c.address == address) {
            let offset = channel.channel_index.wrapping_sub(first_channel);
            if channel.channel_index >= first_channel && offset < values.len() {
                channel.value = values[offset];
                written += 1;
            }
        }
        if written == 0 && !values.is_empty() {
            debug!("registry: no channels for {address} at {first_channel}.., dropping update");
        }
    }

    /// Read-only ordered copy of every channel, taken under the lock.
    ///
    /// Exporters and GUIs work from this copy; mutating it has no effect on
    /// the registry.
    pub fn snapshot(&self) -> Vec<Channel> {
        self.lock().clone()
    }

    /// Total number of channels across all connected devices.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADDR_A: &str = "F0:AC:12:34:56:78";
    const ADDR_B: &str = "F0:AC:9A:BC:DE:F0";

    #[test]
    fn connect_allocates_full_zeroed_block() {
        let registry = Registry::new();
        for (generation, count) in [
            (Generation::Gen2, 1),
            (Generation::Gen3, 10),
            (Generation::TakoLeft, 96),
        ] {
            registry.disconnect_all();
            let range = registry.connect_device(ADDR_A, generation).unwrap();
            assert_eq!(range, 0..count);

            let snapshot = registry.snapshot();
            assert_eq!(snapshot.len(), count);
            for (i, channel) in snapshot.iter().enumerate() {
                assert_eq!(channel.address, ADDR_A);
                assert_eq!(channel.generation, generation);
                assert_eq!(channel.channel_index, i);
                assert_eq!(channel.value, 0.0);
            }
        }
    }

    #[test]
    fn blocks_append_contiguously_in_connection_order() {
        let registry = Registry::new();
        registry.connect_device(ADDR_A, Generation::Gen3).unwrap();
        let range = registry.connect_device(ADDR_B, Generation::Gen2).unwrap();
        assert_eq!(range, 10..11);
        assert_eq!(registry.len(), 11);

        let snapshot = registry.snapshot();
        assert!(snapshot[..10].iter().all(|c| c.address == ADDR_A));
        assert_eq!(snapshot[10].address, ADDR_B);
    }

    #[test]
    fn disconnect_removes_exactly_one_block() {
        let registry = Registry::new();
        registry.connect_device(ADDR_A, Generation::Gen3).unwrap();
        registry.connect_device(ADDR_B, Generation::Gen3).unwrap();

        registry.disconnect_device(ADDR_A);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 10);
        assert!(snapshot.iter().all(|c| c.address == ADDR_B));
        // Remaining block is still a complete 0..10 run.
        for (i, channel) in snapshot.iter().enumerate() {
            assert_eq!(channel.channel_index, i);
        }

        // Absent address is a no-op, not an error.
        registry.disconnect_device(ADDR_A);
        assert_eq!(registry.len(), 10);
    }

    #[test]
    fn reconnect_same_generation_replaces_block() {
        let registry = Registry::new();
        registry.connect_device(ADDR_A, Generation::Gen3).unwrap();
        registry.update_value(ADDR_A, 3, 42.5);

        registry.connect_device(ADDR_A, Generation::Gen3).unwrap();
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 10);
        // Fresh block: the old value is gone.
        assert!(snapshot.iter().all(|c| c.value == 0.0));
    }

    #[test]
    fn reconnect_conflicting_generation_is_rejected() {
        let registry = Registry::new();
        registry.connect_device(ADDR_A, Generation::Gen3).unwrap();
        registry.update_value(ADDR_A, 0, 7.7);

        let err = registry.connect_device(ADDR_A, Generation::Gen2).unwrap_err();
        assert!(matches!(err, Error::InvalidState(_)));

        // Existing block untouched.
        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 10);
        assert_eq!(snapshot[0].value, 7.7);
    }

    #[test]
    fn update_value_targets_one_channel() {
        let registry = Registry::new();
        registry.connect_device(ADDR_A, Generation::Gen3).unwrap();
        registry.update_value(ADDR_A, 4, 99.9);

        let snapshot = registry.snapshot();
        assert_eq!(snapshot[4].value, 99.9);
        assert!(snapshot
            .iter()
            .filter(|c| c.channel_index != 4)
            .all(|c| c.value == 0.0));
    }

    #[test]
    fn update_after_disconnect_is_silent() {
        let registry = Registry::new();
        registry.connect_device(ADDR_A, Generation::Gen2).unwrap();
        registry.disconnect_device(ADDR_A);
        // Late notification: must not panic or resurrect the block.
        registry.update_value(ADDR_A, 0, 1.0);
        assert!(registry.is_empty());
    }

    #[test]
    fn update_block_writes_in_index_order_and_bounds_at_block_end() {
        let registry = Registry::new();
        registry.connect_device(ADDR_A, Generation::TakoLeft).unwrap();

        // Group 9 of a Tako quadrant: ten slots, six real channels.
        let values = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0, 10.0];
        registry.update_block(ADDR_A, 90, &values);

        let snapshot = registry.snapshot();
        for (i, expected) in (90..96).zip([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]) {
            assert_eq!(snapshot[i].value, expected);
        }
        assert!(snapshot[..90].iter().all(|c| c.value == 0.0));
    }

    #[test]
    fn update_block_short_values_leave_tail_stale() {
        let registry = Registry::new();
        registry.connect_device(ADDR_A, Generation::Gen3).unwrap();
        registry.update_block(ADDR_A, 0, &[1.0; 10]);

        // Truncated frame decoded to three values: channels 3..10 stay stale.
        registry.update_block(ADDR_A, 0, &[5.0, 6.0, 7.0]);
        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].value, 5.0);
        assert_eq!(snapshot[1].value, 6.0);
        assert_eq!(snapshot[2].value, 7.0);
        assert!(snapshot[3..].iter().all(|c| c.value == 1.0));
    }

    #[test]
    fn snapshot_is_detached_from_live_state() {
        let registry = Registry::new();
        registry.connect_device(ADDR_A, Generation::Gen2).unwrap();
        let mut snapshot = registry.snapshot();
        snapshot[0].value = 123.0;
        assert_eq!(registry.snapshot()[0].value, 0.0);
    }

    #[test]
    fn disconnect_all_empties_registry() {
        let registry = Registry::new();
        registry.connect_device(ADDR_A, Generation::Gen3).unwrap();
        registry.connect_device(ADDR_B, Generation::TakoBack).unwrap();
        registry.disconnect_all();
        assert!(registry.is_empty());
    }
}
