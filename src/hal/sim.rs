//! Host stand-ins for the hardware seams.
//!
//! Used by the host simulator binary and by tests that do not care about
//! electrical side effects.

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};

use super::{OutputError, RawSource, ToneOutput};

/// Relay pin that only remembers its level.
#[derive(Debug, Default)]
pub struct SimPin {
    high: bool,
}

impl SimPin {
    pub const fn new() -> Self {
        Self { high: false }
    }

    pub fn is_high(&self) -> bool {
        self.high
    }
}

impl ErrorType for SimPin {
    type Error = Infallible;
}

impl OutputPin for SimPin {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.high = false;
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.high = true;
        Ok(())
    }
}

/// Delay that returns immediately.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

impl DelayNs for NoDelay {
    fn delay_ns(&mut self, _ns: u32) {}
}

/// Analog output that tracks the sampling flag and the last direct write.
#[derive(Debug, Default)]
pub struct SimToneOutput {
    pub sampling: bool,
    pub last_direct: Option<u8>,
}

impl ToneOutput for SimToneOutput {
    fn enable_sampling(&mut self) -> Result<(), OutputError> {
        self.sampling = true;
        Ok(())
    }

    fn disable_sampling(&mut self) -> Result<(), OutputError> {
        self.sampling = false;
        Ok(())
    }

    fn write_direct(&mut self, sample: u8) -> Result<(), OutputError> {
        self.last_direct = Some(sample);
        Ok(())
    }
}

/// Analog input pinned to a fixed raw count.
#[derive(Debug, Default, Clone, Copy)]
pub struct FixedSource(pub u16);

impl RawSource for FixedSource {
    fn read_raw(&mut self) -> u16 {
        self.0
    }
}
