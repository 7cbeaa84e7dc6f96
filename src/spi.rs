//! Wired (SPI/GPIO) transport adapter for the 16FGV1.0 ten-channel circuit.
//!
//! The bus and the two GPIO lines sit behind small HAL traits so the frame
//! logic is testable without hardware; the `raspberry-pi` feature provides
//! [`rppal`]-backed implementations in [`raspberry_pi`].
//!
//! Protocol: one 22-byte configuration frame before streaming, then 22-byte
//! data transfers.  A data response echoes 2 header bytes followed by ten
//! big-endian u16 raw magnitudes, scaled to pF by the configured resolution.
//!
//! [`rppal`]: https://docs.rs/rppal

use std::ops::Range;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::error::{Error, Result};
use crate::parse::decode_wired;
use crate::protocol::{
    self, FILTER_1PT, INTERRUPT_DISABLED, INTERRUPT_ENABLED, RATE_50HZ, SPI_ADDRESS, SPI_CHANNELS,
    SPI_HEADER_LEN, TRIGGER_DISABLED, TRIGGER_ENABLED,
};
use crate::registry::Registry;
use crate::types::{Generation, Resolution};

/// How long the circuit needs to apply a configuration frame.
const CONFIG_SETTLE: Duration = Duration::from_millis(10);

/// Sampling delay after a trigger pulse, before the result is read back.
const TRIGGER_SETTLE: Duration = Duration::from_millis(100);

/// Upper bound on busy-waiting for the data-ready line; hardware latency is
/// one output-data-rate period, so anything past this is a wedged line.
const READY_TIMEOUT: Duration = Duration::from_secs(1);

// ── HAL boundary ──────────────────────────────────────────────────────────────

/// Full-duplex SPI transfer.  Implementations own the bus handle (and chip
/// select); the rest of the crate only sees byte frames.
pub trait SpiBus: Send {
    /// Clock `tx` out and return the bytes clocked in (same length).
    fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>>;
}

/// The circuit's data-ready (interrupt) line.
pub trait DataReadyLine: Send {
    /// `true` while a finished sample is waiting to be read.
    fn is_ready(&self) -> Result<bool>;
}

/// The circuit's trigger line, used to pace sampling from the host.
pub trait TriggerLine: Send {
    /// Emit one trigger edge to start a sample.
    fn pulse(&mut self) -> Result<()>;
}

// ── Configuration ─────────────────────────────────────────────────────────────

/// Bus-side configuration, sent as one frame before streaming.
///
/// The rate/interrupt/trigger/filter fields carry the raw wire codes from
/// [`crate::protocol`] (`RATE_*`, `INTERRUPT_*`, `TRIGGER_*`, `FILTER_*`);
/// the filter depth is applied inside the device, not on the host.
#[derive(Debug, Clone, Copy)]
pub struct SpiLinkConfig {
    pub output_data_rate: u8,
    pub interrupt_mode: u8,
    pub trigger_mode: u8,
    pub filter_depth: u8,
    pub resolution: Resolution,
}

impl Default for SpiLinkConfig {
    /// 50 Hz continuous streaming, 1-point filter, 100 fF resolution.
    fn default() -> Self {
        Self {
            output_data_rate: RATE_50HZ,
            interrupt_mode: INTERRUPT_DISABLED,
            trigger_mode: TRIGGER_DISABLED,
            filter_depth: FILTER_1PT,
            resolution: Resolution::default(),
        }
    }
}

// ── Link ──────────────────────────────────────────────────────────────────────

/// A configured link to the wired circuit, feeding the fixed [`SPI_ADDRESS`]
/// ten-channel block of a shared [`Registry`].
///
/// Drive [`SpiLink::read_once`] from a [`crate::sampler::Sampler`] tick for
/// continuous acquisition.
pub struct SpiLink<B: SpiBus> {
    bus: B,
    ready: Option<Box<dyn DataReadyLine>>,
    trigger: Option<Box<dyn TriggerLine>>,
    config: SpiLinkConfig,
    scaling_factor: f64,
    registry: Arc<Registry>,
}

impl<B: SpiBus> SpiLink<B> {
    pub fn new(bus: B, config: SpiLinkConfig, registry: Arc<Registry>) -> Self {
        Self {
            bus,
            ready: None,
            trigger: None,
            config,
            scaling_factor: config.resolution.scaling_factor(),
            registry,
        }
    }

    /// Attach the data-ready line.  Required when
    /// [`SpiLinkConfig::interrupt_mode`] is [`INTERRUPT_ENABLED`].
    pub fn with_ready_line(mut self, line: Box<dyn DataReadyLine>) -> Self {
        self.ready = Some(line);
        self
    }

    /// Attach the trigger line.  Required when
    /// [`SpiLinkConfig::trigger_mode`] is [`TRIGGER_ENABLED`].
    pub fn with_trigger_line(mut self, line: Box<dyn TriggerLine>) -> Self {
        self.trigger = Some(line);
        self
    }

    /// Send the configuration frame and register the wired channel block.
    ///
    /// Returns the registry index range of the block.  Reconnecting an
    /// already-open link re-sends the configuration and resets the block.
    pub fn connect(&mut self) -> Result<Range<usize>> {
        let frame = protocol::config_frame(
            self.config.output_data_rate,
            self.config.interrupt_mode,
            self.config.trigger_mode,
            self.config.filter_depth,
            self.config.resolution,
        );
        self.bus.transfer(&frame)?;
        std::thread::sleep(CONFIG_SETTLE);

        self.scaling_factor = self.config.resolution.scaling_factor();
        let range = self.registry.connect_device(SPI_ADDRESS, Generation::Gen3)?;
        info!(
            "SPI: configured (rate=0x{:02x}, resolution factor {})",
            self.config.output_data_rate, self.scaling_factor
        );
        Ok(range)
    }

    /// Acquire one sample set and push it into the registry.
    ///
    /// In trigger mode this pulses the trigger line and waits out the
    /// sampling delay first; in interrupt mode the read is gated on the
    /// data-ready line.  Short responses decode the complete value groups
    /// present and leave the remaining channels stale; only bus/GPIO
    /// failures return an error (stopping the polling loop that drives us).
    pub fn read_once(&mut self) -> Result<()> {
        if self.config.trigger_mode == TRIGGER_ENABLED {
            match self.trigger.as_mut() {
                Some(line) => {
                    line.pulse()?;
                    std::thread::sleep(TRIGGER_SETTLE);
                }
                None => {
                    return Err(Error::InvalidState(
                        "trigger mode enabled but no trigger line attached".into(),
                    ))
                }
            }
        }

        if self.config.interrupt_mode == INTERRUPT_ENABLED {
            self.wait_ready(true)?;
        }

        let response = self.bus.transfer(&protocol::data_request_frame())?;
        if response.len() <= SPI_HEADER_LEN {
            warn!(
                "SPI: data response of {} bytes has no payload, keeping stale values",
                response.len()
            );
            return Ok(());
        }

        let values = decode_wired(&response[SPI_HEADER_LEN..], SPI_CHANNELS, self.scaling_factor);
        if values.len() < SPI_CHANNELS {
            warn!(
                "SPI: short data response ({} of {SPI_CHANNELS} channels), tail stays stale",
                values.len()
            );
        }
        self.registry.update_block(SPI_ADDRESS, 0, &values);

        if self.config.interrupt_mode == INTERRUPT_ENABLED {
            // Let the line return to idle so the next gate sees a fresh edge.
            self.wait_ready(false)?;
        }
        Ok(())
    }

    /// Busy-wait until the ready line reports `target`, bounded by
    /// [`READY_TIMEOUT`].
    fn wait_ready(&self, target: bool) -> Result<()> {
        let line = self.ready.as_ref().ok_or_else(|| {
            Error::InvalidState("interrupt mode enabled but no ready line attached".into())
        })?;
        let deadline = Instant::now() + READY_TIMEOUT;
        while line.is_ready()? != target {
            if Instant::now() >= deadline {
                return Err(Error::Transport(
                    "timed out waiting for the data-ready line".into(),
                ));
            }
            std::hint::spin_loop();
        }
        Ok(())
    }

    /// Remove the wired block from the registry.  The bus handle is released
    /// when the link is dropped.
    pub fn close(&mut self) {
        debug!("SPI: closing link");
        self.registry.disconnect_device(SPI_ADDRESS);
    }
}

// ── Raspberry Pi backend ──────────────────────────────────────────────────────

/// `rppal`-backed implementations of the HAL traits for Raspberry Pi hosts.
///
/// Wiring matches the reference board layout: SPI0 with native chip select
/// 0, bus mode 1, MSB first; data-ready on BCM 2 (active low), trigger on
/// BCM 3.
#[cfg(feature = "raspberry-pi")]
pub mod raspberry_pi {
    use rppal::gpio::{Gpio, InputPin, OutputPin};
    use rppal::spi::{Bus, Mode, SlaveSelect, Spi};

    use super::{DataReadyLine, SpiBus, TriggerLine};
    use crate::error::Result;

    /// Conservative default clock; the circuit accepts very low SPI rates.
    pub const DEFAULT_CLOCK_HZ: u32 = 100_000;

    /// BCM pin of the data-ready (interrupt) line.
    pub const READY_PIN: u8 = 2;
    /// BCM pin of the trigger line.
    pub const TRIGGER_PIN: u8 = 3;

    pub struct RpiSpiBus {
        spi: Spi,
    }

    impl RpiSpiBus {
        /// Open SPI0/CE0 in mode 1 at `clock_hz`.
        pub fn open(clock_hz: u32) -> Result<Self> {
            let spi = Spi::new(Bus::Spi0, SlaveSelect::Ss0, clock_hz, Mode::Mode1)?;
            Ok(Self { spi })
        }
    }

    impl SpiBus for RpiSpiBus {
        fn transfer(&mut self, tx: &[u8]) -> Result<Vec<u8>> {
            let mut rx = vec![0u8; tx.len()];
            self.spi.transfer(&mut rx, tx)?;
            Ok(rx)
        }
    }

    /// Data-ready line; the circuit pulls it low while a sample is waiting.
    pub struct RpiReadyLine {
        pin: InputPin,
    }

    impl RpiReadyLine {
        pub fn open() -> Result<Self> {
            let pin = Gpio::new()?.get(READY_PIN)?.into_input();
            Ok(Self { pin })
        }
    }

    impl DataReadyLine for RpiReadyLine {
        fn is_ready(&self) -> Result<bool> {
            Ok(self.pin.is_low())
        }
    }

    pub struct RpiTriggerLine {
        pin: OutputPin,
    }

    impl RpiTriggerLine {
        pub fn open() -> Result<Self> {
            let pin = Gpio::new()?.get(TRIGGER_PIN)?.into_output_low();
            Ok(Self { pin })
        }
    }

    impl TriggerLine for RpiTriggerLine {
        fn pulse(&mut self) -> Result<()> {
            self.pin.set_high();
            self.pin.set_low();
            Ok(())
        }
    }
}
