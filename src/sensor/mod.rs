//! Analog sensor channels (MAP and TPS).
//!
//! A [`SensorChannel`] turns raw ADC counts into load percent through a
//! two-point [`Calibration`]:
//!
//! ```text
//! percent = (raw - min) / (max - min) * 100
//! ```
//!
//! Convention: 0 % is the calibrated minimum count and 100 % the maximum.
//! For MAP that means 0 % = deepest vacuum (idle) and 100 % = atmospheric or
//! higher; percent rises with manifold pressure, like TPS rises with pedal.
//!
//! Counts inside the rail window (a few counts from 0 V or from Vref) mean a
//! broken wire or shorted sensor. They are flagged as disconnected. Under the
//! clamped policy they read as the nearest calibrated extreme; the unclamped
//! policy keeps the measured count so over-range stays monotonic.

pub mod cache;

pub use cache::{CachedSample, RawSampleCache};

use crate::hal::{raw_to_volts, RawSource, ADC_MAX};

/// Counts from either rail treated as "disconnected".
pub const RAIL_MARGIN: u16 = 40;

/// True for counts a connected sensor never produces.
#[inline]
pub fn in_rail_window(raw: u16) -> bool {
    raw <= RAIL_MARGIN || raw >= ADC_MAX - RAIL_MARGIN
}

/// Default smoothing factor of the exponential filter (weight of new sample).
pub const FILTER_ALPHA: f32 = 0.2;

/// Vacuum at 0 % MAP load, inHg gauge.
pub const FULL_VACUUM_INHG: f32 = -18.0;

/// Sensor channel identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Channel {
    /// Manifold absolute pressure.
    Map = 0,
    /// Throttle position.
    Tps = 1,
}

impl Channel {
    pub const ALL: [Channel; 2] = [Channel::Map, Channel::Tps];

    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Map => "MAP",
            Channel::Tps => "TPS",
        }
    }

    /// Storage key for the calibrated minimum.
    pub fn min_key(self) -> &'static str {
        match self {
            Channel::Map => "map_min",
            Channel::Tps => "tps_min",
        }
    }

    /// Storage key for the calibrated maximum.
    pub fn max_key(self) -> &'static str {
        match self {
            Channel::Map => "map_max",
            Channel::Tps => "tps_max",
        }
    }
}

/// How [`Calibration::percent`] treats counts beyond the calibrated range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PercentPolicy {
    /// Clamp to [0, 100]. Used by the control loop.
    #[default]
    Clamped,
    /// Pass through values below 0 or above 100 (over-range detection).
    Unclamped,
}

/// Two-point calibration of one channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Calibration {
    pub min: u16,
    pub max: u16,
}

impl Calibration {
    pub const fn new(min: u16, max: u16) -> Self {
        Self { min, max }
    }

    /// Usable only if the range is not degenerate.
    #[inline]
    pub fn is_valid(&self) -> bool {
        self.max > self.min
    }

    #[inline]
    pub fn span(&self) -> u16 {
        self.max.saturating_sub(self.min)
    }

    /// Map a raw count to load percent.
    ///
    /// An invalid calibration reads as 0 %.
    pub fn percent(&self, raw: u16, policy: PercentPolicy) -> f32 {
        if !self.is_valid() {
            return 0.0;
        }
        let pct = (raw as f32 - self.min as f32) / (self.max - self.min) as f32 * 100.0;
        match policy {
            PercentPolicy::Clamped => pct.clamp(0.0, 100.0),
            PercentPolicy::Unclamped => pct,
        }
    }
}

/// Raw sample after rail-window conditioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conditioned {
    /// Count as read from the source.
    pub measured: u16,
    /// Count the clamped policy uses: `measured`, or a calibrated extreme.
    pub raw: u16,
    pub disconnected: bool,
}

impl Conditioned {
    fn percent(&self, calibration: &Calibration, policy: PercentPolicy) -> f32 {
        match policy {
            PercentPolicy::Clamped => calibration.percent(self.raw, policy),
            PercentPolicy::Unclamped => calibration.percent(self.measured, policy),
        }
    }
}

/// First-order IIR filter on percent.
#[derive(Debug, Clone, Copy)]
struct ExpFilter {
    alpha: f32,
    value: Option<f32>,
}

impl ExpFilter {
    const fn new(alpha: f32) -> Self {
        Self { alpha, value: None }
    }

    fn push(&mut self, x: f32) -> f32 {
        let next = match self.value {
            Some(prev) => self.alpha * x + (1.0 - self.alpha) * prev,
            None => x,
        };
        self.value = Some(next);
        next
    }
}

/// One analog sensor: sampling, calibration, filtering and simulation.
pub struct SensorChannel<S> {
    id: Channel,
    source: S,
    calibration: Calibration,
    filter: ExpFilter,
    last: Conditioned,
    simulated: Option<u16>,
}

impl<S: RawSource> SensorChannel<S> {
    /// Create a channel with an empty (invalid) calibration.
    pub fn new(id: Channel, source: S) -> Self {
        Self {
            id,
            source,
            calibration: Calibration::default(),
            filter: ExpFilter::new(FILTER_ALPHA),
            last: Conditioned { measured: 0, raw: 0, disconnected: false },
            simulated: None,
        }
    }

    pub fn id(&self) -> Channel {
        self.id
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn set_calibration(&mut self, calibration: Calibration) {
        self.calibration = calibration;
    }

    /// Latest raw sample, from the simulation override when one is set.
    ///
    /// Never blocks; out-of-range source values saturate at [`ADC_MAX`].
    pub fn read_raw_cached(&mut self) -> u16 {
        let raw = match self.simulated {
            Some(raw) => raw,
            None => self.source.read_raw(),
        };
        raw.min(ADC_MAX)
    }

    /// Snap rail-window counts to the nearest calibrated extreme.
    pub fn condition(&self, raw: u16) -> Conditioned {
        let snapped = if !in_rail_window(raw) {
            raw
        } else if raw <= RAIL_MARGIN {
            self.calibration.min
        } else {
            self.calibration.max
        };
        Conditioned {
            measured: raw,
            raw: snapped,
            disconnected: in_rail_window(raw),
        }
    }

    /// Percent of a given raw count under this channel's calibration.
    pub fn percent_of(&self, raw: u16, policy: PercentPolicy) -> f32 {
        self.condition(raw).percent(&self.calibration, policy)
    }

    /// Read the current sample and map it to load percent.
    pub fn read_normalized_percent(&mut self, policy: PercentPolicy) -> f32 {
        let raw = self.read_raw_cached();
        self.last = self.condition(raw);
        self.last.percent(&self.calibration, policy)
    }

    /// Read, condition and filter one sample. Call once per control cycle.
    ///
    /// Returns the filtered clamped percent.
    pub fn sample(&mut self) -> f32 {
        let pct = self.read_normalized_percent(PercentPolicy::Clamped);
        self.filter.push(pct)
    }

    /// Filtered percent from the last [`sample`](Self::sample) call.
    pub fn filtered_percent(&self) -> f32 {
        self.filter.value.unwrap_or(0.0)
    }

    /// Forget filter history (after recalibration).
    pub fn reset_filter(&mut self) {
        self.filter = ExpFilter::new(self.filter.alpha);
    }

    /// Conditioned raw count from the last read.
    pub fn last_raw(&self) -> u16 {
        self.last.raw
    }

    /// Unconditioned count from the last read, rail readings included.
    pub fn last_measured(&self) -> u16 {
        self.last.measured
    }

    /// True if the last read fell in the rail window.
    pub fn is_disconnected(&self) -> bool {
        self.last.disconnected
    }

    /// Input voltage of the last read.
    pub fn volts(&self) -> f32 {
        raw_to_volts(self.last.measured)
    }

    /// Override live sampling with a fixed raw count.
    pub fn set_simulated_raw(&mut self, raw: u16) {
        self.simulated = Some(raw.min(ADC_MAX));
    }

    /// Return to live sampling.
    pub fn clear_simulation(&mut self) {
        self.simulated = None;
    }

    pub fn is_simulated(&self) -> bool {
        self.simulated.is_some()
    }
}

/// MAP vacuum in inHg gauge from a clamped load percent.
///
/// 0 % is full vacuum (-18 inHg), 100 % is atmospheric (0 inHg).
pub fn vacuum_inhg(map_percent: f32) -> f32 {
    let norm = map_percent.clamp(0.0, 100.0) / 100.0;
    FULL_VACUUM_INHG - norm * FULL_VACUUM_INHG
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::FixedSource;

    fn channel(min: u16, max: u16, raw: u16) -> SensorChannel<FixedSource> {
        let mut ch = SensorChannel::new(Channel::Map, FixedSource(raw));
        ch.set_calibration(Calibration::new(min, max));
        ch
    }

    #[test]
    fn test_percent_endpoints() {
        let cal = Calibration::new(500, 3500);
        assert_eq!(cal.percent(500, PercentPolicy::Clamped), 0.0);
        assert_eq!(cal.percent(3500, PercentPolicy::Clamped), 100.0);
        assert_eq!(cal.percent(2000, PercentPolicy::Clamped), 50.0);
    }

    #[test]
    fn test_unclamped_policy_reports_over_range() {
        let cal = Calibration::new(500, 3500);
        assert!(cal.percent(3800, PercentPolicy::Unclamped) > 100.0);
        assert!(cal.percent(200, PercentPolicy::Unclamped) < 0.0);
        assert_eq!(cal.percent(3800, PercentPolicy::Clamped), 100.0);
    }

    #[test]
    fn test_invalid_calibration_reads_zero() {
        let cal = Calibration::new(2000, 2000);
        assert!(!cal.is_valid());
        assert_eq!(cal.percent(3000, PercentPolicy::Clamped), 0.0);
    }

    #[test]
    fn test_rail_window_snaps_to_extremes() {
        let mut low = channel(500, 3500, 3);
        assert_eq!(low.read_normalized_percent(PercentPolicy::Clamped), 0.0);
        assert!(low.is_disconnected());
        assert_eq!(low.last_raw(), 500);

        let mut high = channel(500, 3500, 4095);
        assert_eq!(high.read_normalized_percent(PercentPolicy::Clamped), 100.0);
        assert!(high.is_disconnected());
        assert_eq!(high.last_raw(), 3500);
        assert_eq!(high.last_measured(), 4095);
    }

    #[test]
    fn test_unclamped_rail_keeps_measured_count() {
        let mut high = channel(500, 3500, 4095);
        let pct = high.read_normalized_percent(PercentPolicy::Unclamped);
        assert!((pct - 119.833).abs() < 0.01, "got {}", pct);
        assert!(high.is_disconnected());

        let mut low = channel(500, 3500, 0);
        let pct = low.read_normalized_percent(PercentPolicy::Unclamped);
        assert!((pct + 16.667).abs() < 0.01, "got {}", pct);
        assert!(low.is_disconnected());
    }

    #[test]
    fn test_rail_window_edges() {
        assert!(in_rail_window(0));
        assert!(in_rail_window(RAIL_MARGIN));
        assert!(!in_rail_window(RAIL_MARGIN + 1));
        assert!(!in_rail_window(ADC_MAX - RAIL_MARGIN - 1));
        assert!(in_rail_window(ADC_MAX - RAIL_MARGIN));
    }

    #[test]
    fn test_simulation_overrides_source() {
        let mut ch = channel(500, 3500, 1000);
        ch.set_simulated_raw(3500);
        assert!(ch.is_simulated());
        assert_eq!(ch.read_raw_cached(), 3500);

        ch.clear_simulation();
        assert_eq!(ch.read_raw_cached(), 1000);
    }

    #[test]
    fn test_filter_seeds_then_smooths() {
        let mut ch = channel(0, 1000, 500);
        assert_eq!(ch.sample(), 50.0);

        ch.set_simulated_raw(1000);
        let second = ch.sample();
        // 0.2 * 100 + 0.8 * 50
        assert!((second - 60.0).abs() < 1e-4);
        assert!((ch.filtered_percent() - 60.0).abs() < 1e-4);
    }

    #[test]
    fn test_vacuum_mapping() {
        assert_eq!(vacuum_inhg(0.0), -18.0);
        assert_eq!(vacuum_inhg(100.0), 0.0);
        assert_eq!(vacuum_inhg(150.0), 0.0);
    }
}
