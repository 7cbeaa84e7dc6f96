//! Binary decoders for StretchSense frame payloads.
//!
//! All public functions in this module are pure (no I/O, no allocation beyond
//! the returned collections) and are safe to call from any async or sync
//! context.
//!
//! # Decode shapes
//!
//! | Function | Source | Format |
//! |---|---|---|
//! | [`decode_single`] | Gen2 notification | whole payload, one BE uint, fixed ÷ 10 |
//! | [`decode_multi`] | Gen3/10TT/Tako notification | N × BE u16, fixed ÷ 10 |
//! | [`decode_wired`] | SPI data response (header stripped) | N × BE u16 ÷ configured scale |
//!
//! The multi-value decoders apply a uniform short-frame policy: only the
//! complete 2-byte groups present are decoded, and the caller leaves the
//! remaining channels at their previous value.  A truncated notification
//! therefore degrades to stale readings instead of an error.

use crate::error::{Error, Result};

/// Largest single-value payload we accept; real Gen2 frames are 2–4 bytes.
const MAX_SINGLE_FRAME_LEN: usize = 8;

// ── Single-value decode (Gen2) ────────────────────────────────────────────────

/// Decode a Gen2 notification: the entire payload is one big-endian unsigned
/// integer with a fixed weight of 0.1 pF per unit.
///
/// The configured wired resolution has no effect here; Gen2 hardware always
/// streams at the ÷ 10 scale.
///
/// Empty payloads and payloads longer than 8 bytes are rejected as
/// [`Error::InvalidFrame`].
///
/// # Example
///
/// ```
/// # use stretchsense_rs::parse::decode_single;
/// // 1234 encoded big-endian is [0x04, 0xD2]
/// assert_eq!(decode_single(&[0x04, 0xD2]).unwrap(), 123.4);
/// assert!(decode_single(&[]).is_err());
/// ```
pub fn decode_single(frame: &[u8]) -> Result<f64> {
    if frame.is_empty() {
        return Err(Error::InvalidFrame("empty single-channel frame".into()));
    }
    if frame.len() > MAX_SINGLE_FRAME_LEN {
        return Err(Error::InvalidFrame(format!(
            "single-channel frame of {} bytes exceeds the {MAX_SINGLE_FRAME_LEN}-byte maximum",
            frame.len()
        )));
    }
    let raw = frame.iter().fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
    Ok(raw as f64 / 10.0)
}

// ── Multi-value decode (Gen3 / 10TT / Tako groups) ────────────────────────────

/// Decode up to `channel_count` big-endian u16 values at the fixed 0.1 pF
/// scale, in channel-index order.
///
/// Returns one value per *complete* 2-byte group, at most `channel_count` of
/// them; trailing odd bytes and payload beyond `channel_count` groups are
/// ignored.  A frame shorter than `2 * channel_count` bytes yields a shorter
/// vector, never an error.
///
/// # Example
///
/// ```
/// # use stretchsense_rs::parse::decode_multi;
/// let frame = [0x00, 0x00, 0x00, 0x0A, 0x27, 0x0F];
/// assert_eq!(decode_multi(&frame, 3), vec![0.0, 1.0, 999.9]);
/// // Truncated frame: only the complete groups decode.
/// assert_eq!(decode_multi(&frame[..5], 3), vec![0.0, 1.0]);
/// ```
pub fn decode_multi(frame: &[u8], channel_count: usize) -> Vec<f64> {
    frame
        .chunks_exact(2)
        .take(channel_count)
        .map(|pair| f64::from(u16::from_be_bytes([pair[0], pair[1]])) / 10.0)
        .collect()
}

// ── Wired decode (16FGV1.0) ───────────────────────────────────────────────────

/// Decode a wired data payload (bus echo header already stripped) into pF
/// using the configured scaling factor.
///
/// For channel `c` the raw magnitude is `frame[2c] << 8 | frame[2c + 1]`;
/// dividing by `scaling_factor` (1, 10, 100, or 1000 depending on the
/// configured resolution) yields picofarads.  Short frames follow the same
/// complete-groups-only policy as [`decode_multi`].
///
/// # Example
///
/// ```
/// # use stretchsense_rs::parse::decode_wired;
/// assert_eq!(decode_wired(&[0x00, 0x0A], 10, 10.0), vec![1.0]);
/// ```
pub fn decode_wired(frame: &[u8], channel_count: usize, scaling_factor: f64) -> Vec<f64> {
    frame
        .chunks_exact(2)
        .take(channel_count)
        .map(|pair| f64::from(u16::from_be_bytes([pair[0], pair[1]])) / scaling_factor)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Encode `values` as consecutive big-endian u16, the layout used by
    /// every multi-channel generation.
    fn be16_frame(values: &[u16]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_be_bytes()).collect()
    }

    #[test]
    fn single_minimal_big_endian_round_trip() {
        assert_eq!(decode_single(&[0x00]).unwrap(), 0.0);
        assert_eq!(decode_single(&[0x7B]).unwrap(), 12.3);
        assert_eq!(decode_single(&[0x04, 0xD2]).unwrap(), 123.4);
        assert_eq!(decode_single(&[0x01, 0x00, 0x00]).unwrap(), 6553.6);
    }

    #[test]
    fn single_rejects_empty_and_oversized() {
        assert!(matches!(
            decode_single(&[]),
            Err(Error::InvalidFrame(_))
        ));
        assert!(matches!(
            decode_single(&[0u8; 9]),
            Err(Error::InvalidFrame(_))
        ));
    }

    #[test]
    fn multi_decodes_ten_channels_in_order() {
        let frame = be16_frame(&[0, 10, 100, 1000, 9999, 0, 0, 0, 0, 0]);
        assert_eq!(frame.len(), 20);
        assert_eq!(
            decode_multi(&frame, 10),
            vec![0.0, 1.0, 10.0, 100.0, 999.9, 0.0, 0.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn multi_quotients_are_floating_point() {
        let frame = be16_frame(&[1234]);
        assert_eq!(decode_multi(&frame, 1), vec![123.4]);
    }

    #[test]
    fn multi_short_frame_decodes_complete_groups_only() {
        let frame = be16_frame(&[10, 20, 30]);
        // 6 bytes for a 10-channel request: three values come back, the
        // caller keeps stale readings for channels 3..10.
        assert_eq!(decode_multi(&frame, 10), vec![1.0, 2.0, 3.0]);
        // Odd trailing byte is dropped.
        assert_eq!(decode_multi(&frame[..5], 10), vec![1.0, 2.0]);
        assert_eq!(decode_multi(&[], 10), Vec::<f64>::new());
    }

    #[test]
    fn multi_ignores_payload_beyond_channel_count() {
        let frame = be16_frame(&[10, 20, 30, 40]);
        assert_eq!(decode_multi(&frame, 2), vec![1.0, 2.0]);
    }

    #[test]
    fn wired_applies_configured_scaling_factor() {
        // Raw [0x00, 0x0A] is 10; at the 100 fF resolution (factor 10) that
        // is exactly 1 pF.
        assert_eq!(decode_wired(&[0x00, 0x0A], 10, 10.0), vec![1.0]);
        assert_eq!(decode_wired(&[0x00, 0x0A], 10, 1.0), vec![10.0]);
        assert_eq!(decode_wired(&[0x00, 0x0A], 10, 1000.0), vec![0.01]);
        // High byte is weighted by 256.
        assert_eq!(decode_wired(&[0x01, 0x00], 10, 1.0), vec![256.0]);
    }
}
