//! Hardware Abstraction Layer.
//!
//! Thin seams around the peripherals the control logic touches. Business
//! logic stays in core modules and talks to hardware only through:
//!
//! - [`RawSource`]: one analog input channel (cached by the slow ISR or read
//!   synchronously)
//! - [`ToneOutput`]: the analog output and its per-sample timer
//! - `embedded_hal::digital::OutputPin`: relay coils
//! - `embedded_hal::delay::DelayNs`: relay settle delay
//!
//! [`sim`] has host implementations; `esp` binds ESP-IDF peripherals.

#[cfg(target_os = "espidf")]
pub mod esp;
pub mod sim;

/// Largest count the 12-bit ADC returns.
pub const ADC_MAX: u16 = 4095;

/// ADC full-scale voltage.
pub const ADC_VREF: f32 = 3.3;

/// Convert a raw ADC count to volts.
#[inline]
pub fn raw_to_volts(raw: u16) -> f32 {
    raw as f32 * ADC_VREF / ADC_MAX as f32
}

/// Convert volts to the nearest raw ADC count, saturating at the rails.
#[inline]
pub fn volts_to_raw(volts: f32) -> u16 {
    let counts = volts / ADC_VREF * ADC_MAX as f32 + 0.5;
    if counts <= 0.0 {
        0
    } else if counts >= ADC_MAX as f32 {
        ADC_MAX
    } else {
        counts as u16
    }
}

/// A source of raw analog samples.
///
/// Must not block: either returns the latest interrupt-cached sample or does
/// one short synchronous conversion.
pub trait RawSource {
    fn read_raw(&mut self) -> u16;
}

/// Analog output driver failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputError(pub i32);

/// Analog output plus the periodic timer that feeds it.
///
/// While sampling is enabled the timer interrupt writes samples on its own;
/// [`write_direct`](ToneOutput::write_direct) is only used with sampling
/// disabled.
pub trait ToneOutput {
    fn enable_sampling(&mut self) -> Result<(), OutputError>;

    fn disable_sampling(&mut self) -> Result<(), OutputError>;

    fn write_direct(&mut self, sample: u8) -> Result<(), OutputError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volts_conversion_endpoints() {
        assert_eq!(raw_to_volts(0), 0.0);
        assert!((raw_to_volts(ADC_MAX) - ADC_VREF).abs() < 1e-6);
        assert_eq!(volts_to_raw(-1.0), 0);
        assert_eq!(volts_to_raw(5.0), ADC_MAX);
    }

    #[test]
    fn test_volts_to_raw_rounds() {
        // 1.65 V is half scale
        assert_eq!(volts_to_raw(1.65), 2048);
        assert_eq!(volts_to_raw(raw_to_volts(1234)), 1234);
    }
}
