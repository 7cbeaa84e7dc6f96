//! Error taxonomy for the StretchSense host layer.
//!
//! Sensor streams are lossy by nature, so most decode problems are recovered
//! locally (log, keep the previous value) rather than surfaced here.  The
//! variants below are the failures a caller can actually act on.

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the StretchSense host layer.
#[derive(Debug, Error)]
pub enum Error {
    /// A wire identifier (GATT service UUID) did not match any known sensor
    /// generation.  No channels are registered for such a device.
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// A raw frame could not be decoded (empty or impossible length).
    ///
    /// Short-but-nonempty multi-channel frames are *not* an error; the
    /// decoders return the complete value groups present and the registry
    /// keeps stale values for the rest.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A registry structural invariant would be violated, e.g. registering
    /// the same address under two different generations.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Surfaced unchanged from the BLE or SPI transport.  Stops the polling
    /// loop for the affected device only.
    #[error("transport error: {0}")]
    Transport(String),
}

impl From<btleplug::Error> for Error {
    fn from(e: btleplug::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

#[cfg(feature = "raspberry-pi")]
impl From<rppal::spi::Error> for Error {
    fn from(e: rppal::spi::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

#[cfg(feature = "raspberry-pi")]
impl From<rppal::gpio::Error> for Error {
    fn from(e: rppal::gpio::Error) -> Self {
        Error::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_renders_variant_context() {
        let err = Error::UnknownDevice("service 0000dead-…".into());
        assert_eq!(err.to_string(), "unknown device: service 0000dead-…");

        let err = Error::InvalidFrame("empty payload".into());
        assert_eq!(err.to_string(), "invalid frame: empty payload");

        let err = Error::InvalidState("duplicate address".into());
        assert_eq!(err.to_string(), "invalid state: duplicate address");
    }
}
