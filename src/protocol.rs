//! GATT UUIDs, the device generation catalog, and SPI wire-format helpers.
//!
//! All BLE UUIDs belong to the StretchSense vendor namespace
//! `xxxxxxxx-7374-7265-7563-6873656e7365` (the suffix is ASCII
//! `"stretchsense"`).

use uuid::Uuid;

use crate::error::{Error, Result};
use crate::types::{Generation, Resolution};

// ── Advertised names ──────────────────────────────────────────────────────────

/// Local name advertised by single-circuit sensors (Gen2/Gen3/10TT).
///
/// Used as a scan filter; matching is by prefix, so this also covers
/// [`TAKO_DEVICE_NAME`].
pub const DEVICE_NAME: &str = "StretchSense";

/// Local name advertised by Tako array quadrants.
pub const TAKO_DEVICE_NAME: &str = "StretchSense_Tako";

// ── Services and data characteristics ─────────────────────────────────────────

/// Primary service of a Gen2 (one-channel) sensor.
pub const GEN2_SERVICE: Uuid = Uuid::from_u128(0x00001501_7374_7265_7563_6873656e7365);
/// Data characteristic of a Gen2 sensor; each notification carries the whole
/// reading as one big-endian unsigned integer.
pub const GEN2_DATA: Uuid = Uuid::from_u128(0x00001502_7374_7265_7563_6873656e7365);

/// Primary service of a Gen3 (ten-channel) board.
pub const GEN3_SERVICE: Uuid = Uuid::from_u128(0x00001701_7374_7265_7563_6873656e7365);
/// Data characteristic of a Gen3 board; ten big-endian u16 values per
/// notification.
pub const GEN3_DATA: Uuid = Uuid::from_u128(0x00001702_7374_7265_7563_6873656e7365);

/// Primary service of a 10TT circuit.
pub const TT10_SERVICE: Uuid = Uuid::from_u128(0x00601001_7374_7265_7563_6873656e7365);
/// Data characteristic of a 10TT circuit; same wire layout as [`GEN3_DATA`].
pub const TT10_DATA: Uuid = Uuid::from_u128(0x00601002_7374_7265_7563_6873656e7365);

/// Primary services of the four Tako array quadrants.
pub const TAKO_LEFT_SERVICE: Uuid = Uuid::from_u128(0x00009601_7374_7265_7563_6873656e7365);
pub const TAKO_RIGHT_SERVICE: Uuid = Uuid::from_u128(0x00009701_7374_7265_7563_6873656e7365);
pub const TAKO_FRONT_SERVICE: Uuid = Uuid::from_u128(0x00009801_7374_7265_7563_6873656e7365);
pub const TAKO_BACK_SERVICE: Uuid = Uuid::from_u128(0x00009901_7374_7265_7563_6873656e7365);

/// Data characteristics of a Tako quadrant, indexed by notification group.
///
/// A quadrant splits its 96 channels across ten characteristics; the
/// characteristic at index `k` notifies the group with base channel
/// `10 * k`.  Groups 0–8 carry ten channels each; group 9 carries the
/// remaining six (channels 90–95).
pub const TAKO_LEFT_DATA: [Uuid; 10] = [
    Uuid::from_u128(0x00009602_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009607_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009608_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009609_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009610_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009611_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009612_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009613_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009614_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009615_7374_7265_7563_6873656e7365),
];

/// See [`TAKO_LEFT_DATA`]; same layout in the `0097xx` range.
pub const TAKO_RIGHT_DATA: [Uuid; 10] = [
    Uuid::from_u128(0x00009702_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009707_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009708_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009709_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009710_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009711_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009712_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009713_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009714_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009715_7374_7265_7563_6873656e7365),
];

/// See [`TAKO_LEFT_DATA`]; same layout in the `0098xx` range.
pub const TAKO_FRONT_DATA: [Uuid; 10] = [
    Uuid::from_u128(0x00009802_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009807_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009808_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009809_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009810_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009811_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009812_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009813_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009814_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009815_7374_7265_7563_6873656e7365),
];

/// See [`TAKO_LEFT_DATA`]; same layout in the `0099xx` range.
pub const TAKO_BACK_DATA: [Uuid; 10] = [
    Uuid::from_u128(0x00009902_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009907_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009908_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009909_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009910_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009911_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009912_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009913_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009914_7374_7265_7563_6873656e7365),
    Uuid::from_u128(0x00009915_7374_7265_7563_6873656e7365),
];

// ── Generation catalog ────────────────────────────────────────────────────────

/// Every known primary service and the generation it identifies.
const SERVICES: [(Uuid, Generation); 7] = [
    (GEN2_SERVICE, Generation::Gen2),
    (GEN3_SERVICE, Generation::Gen3),
    (TT10_SERVICE, Generation::Tt10),
    (TAKO_LEFT_SERVICE, Generation::TakoLeft),
    (TAKO_RIGHT_SERVICE, Generation::TakoRight),
    (TAKO_FRONT_SERVICE, Generation::TakoFront),
    (TAKO_BACK_SERVICE, Generation::TakoBack),
];

/// Map a primary service UUID to the hardware generation it identifies.
///
/// Returns [`Error::UnknownDevice`] for anything outside the catalog; the
/// caller must not register channels for such a device.
///
/// # Example
///
/// ```
/// # use stretchsense_rs::protocol::{classify, GEN3_SERVICE};
/// # use stretchsense_rs::types::Generation;
/// let generation = classify(GEN3_SERVICE).unwrap();
/// assert_eq!(generation, Generation::Gen3);
/// assert_eq!(generation.channel_count(), 10);
/// ```
pub fn classify(service: Uuid) -> Result<Generation> {
    SERVICES
        .iter()
        .find(|(uuid, _)| *uuid == service)
        .map(|(_, generation)| *generation)
        .ok_or_else(|| {
            Error::UnknownDevice(format!(
                "service {service} does not match any StretchSense generation"
            ))
        })
}

/// Data characteristics to subscribe to for a generation, in notification
/// group order.
///
/// Single-block generations (Gen2/Gen3/10TT) have exactly one; each Tako
/// quadrant has ten.
pub fn data_characteristics(generation: Generation) -> &'static [Uuid] {
    match generation {
        Generation::Gen2 => &[GEN2_DATA],
        Generation::Gen3 => &[GEN3_DATA],
        Generation::Tt10 => &[TT10_DATA],
        Generation::TakoLeft => &TAKO_LEFT_DATA,
        Generation::TakoRight => &TAKO_RIGHT_DATA,
        Generation::TakoFront => &TAKO_FRONT_DATA,
        Generation::TakoBack => &TAKO_BACK_DATA,
    }
}

/// Notification group carried by `characteristic` for a device of
/// `generation`, or `None` if the characteristic is not one of its data
/// characteristics.  Group `k` holds channels starting at `10 * k`.
pub fn group_offset(generation: Generation, characteristic: Uuid) -> Option<usize> {
    data_characteristics(generation)
        .iter()
        .position(|&uuid| uuid == characteristic)
}

// ── SPI wire format (16FGV1.0) ────────────────────────────────────────────────

/// Registry address used by the wired ten-channel block.
pub const SPI_ADDRESS: &str = "SPI0";

/// Channels streamed by the wired circuit.
pub const SPI_CHANNELS: usize = 10;

/// Every SPI transfer is this many bytes in both directions.
pub const SPI_FRAME_LEN: usize = 22;

/// Bytes echoed by the bus at the head of a data response, discarded before
/// decoding.
pub const SPI_HEADER_LEN: usize = 2;

/// Frame tag requesting a data packet.
pub const DATA_TAG: u8 = 0x00;
/// Frame tag introducing a configuration packet.
pub const CONFIG_TAG: u8 = 0x01;

/// Output data rate codes for the configuration frame.
pub const RATE_OFF: u8 = 0x00;
pub const RATE_25HZ: u8 = 0x01;
pub const RATE_50HZ: u8 = 0x02;
pub const RATE_100HZ: u8 = 0x03;
pub const RATE_166HZ: u8 = 0x04;
pub const RATE_200HZ: u8 = 0x05;
pub const RATE_250HZ: u8 = 0x06;
pub const RATE_500HZ: u8 = 0x07;
pub const RATE_1KHZ: u8 = 0x08;

/// Interrupt (data-ready line) mode codes.
pub const INTERRUPT_DISABLED: u8 = 0x00;
pub const INTERRUPT_ENABLED: u8 = 0x01;

/// Trigger (host-paced sampling) mode codes.
pub const TRIGGER_DISABLED: u8 = 0x00;
pub const TRIGGER_ENABLED: u8 = 0x01;

/// Device-side moving-average filter depths.
pub const FILTER_0PT: u8 = 0x00;
pub const FILTER_1PT: u8 = 0x01;
pub const FILTER_3PT: u8 = 0x03;
pub const FILTER_7PT: u8 = 0x07;
pub const FILTER_15PT: u8 = 0x0F;
pub const FILTER_31PT: u8 = 0x1F;
pub const FILTER_63PT: u8 = 0x3F;
pub const FILTER_127PT: u8 = 0x7F;
pub const FILTER_255PT: u8 = 0xFF;

/// Build the 22-byte configuration frame sent once before streaming.
///
/// Layout: `[CONFIG_TAG, odr, interrupt, trigger, filter, resolution]`
/// followed by zero padding to [`SPI_FRAME_LEN`].
///
/// # Example
///
/// ```
/// # use stretchsense_rs::protocol::*;
/// # use stretchsense_rs::types::Resolution;
/// let frame = config_frame(
///     RATE_50HZ,
///     INTERRUPT_DISABLED,
///     TRIGGER_DISABLED,
///     FILTER_1PT,
///     Resolution::HundredFf,
/// );
/// assert_eq!(frame.len(), 22);
/// assert_eq!(&frame[..6], &[0x01, 0x02, 0x00, 0x00, 0x01, 0x01]);
/// assert!(frame[6..].iter().all(|&b| b == 0));
/// ```
pub fn config_frame(
    output_data_rate: u8,
    interrupt_mode: u8,
    trigger_mode: u8,
    filter_depth: u8,
    resolution: Resolution,
) -> [u8; SPI_FRAME_LEN] {
    let mut frame = [0u8; SPI_FRAME_LEN];
    frame[0] = CONFIG_TAG;
    frame[1] = output_data_rate;
    frame[2] = interrupt_mode;
    frame[3] = trigger_mode;
    frame[4] = filter_depth;
    frame[5] = resolution.mode_byte();
    frame
}

/// Build the 22-byte data request frame.  The response carries a 2-byte echo
/// header followed by ten big-endian u16 raw magnitudes.
pub fn data_request_frame() -> [u8; SPI_FRAME_LEN] {
    let mut frame = [0u8; SPI_FRAME_LEN];
    frame[0] = DATA_TAG;
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_covers_every_generation() {
        assert_eq!(classify(GEN2_SERVICE).unwrap(), Generation::Gen2);
        assert_eq!(classify(GEN3_SERVICE).unwrap(), Generation::Gen3);
        assert_eq!(classify(TT10_SERVICE).unwrap(), Generation::Tt10);
        assert_eq!(classify(TAKO_LEFT_SERVICE).unwrap(), Generation::TakoLeft);
        assert_eq!(classify(TAKO_RIGHT_SERVICE).unwrap(), Generation::TakoRight);
        assert_eq!(classify(TAKO_FRONT_SERVICE).unwrap(), Generation::TakoFront);
        assert_eq!(classify(TAKO_BACK_SERVICE).unwrap(), Generation::TakoBack);
    }

    #[test]
    fn classify_rejects_foreign_services() {
        let battery = Uuid::from_u128(0x0000180f_0000_1000_8000_00805f9b34fb);
        assert!(matches!(classify(battery), Err(Error::UnknownDevice(_))));
    }

    #[test]
    fn tako_group_offsets_follow_characteristic_order() {
        for (k, &uuid) in TAKO_FRONT_DATA.iter().enumerate() {
            assert_eq!(group_offset(Generation::TakoFront, uuid), Some(k));
        }
        // A Left characteristic is not part of the Front quadrant.
        assert_eq!(group_offset(Generation::TakoFront, TAKO_LEFT_DATA[0]), None);
    }

    #[test]
    fn single_block_generations_have_one_data_characteristic() {
        assert_eq!(data_characteristics(Generation::Gen2), &[GEN2_DATA]);
        assert_eq!(data_characteristics(Generation::Gen3), &[GEN3_DATA]);
        assert_eq!(data_characteristics(Generation::Tt10), &[TT10_DATA]);
        assert_eq!(group_offset(Generation::Gen3, GEN3_DATA), Some(0));
    }

    #[test]
    fn data_request_is_tagged_padding() {
        let frame = data_request_frame();
        assert_eq!(frame.len(), SPI_FRAME_LEN);
        assert!(frame.iter().all(|&b| b == 0x00));
    }
}
