//! Waveform synthesizer: wavetable playback with amplitude ramp and relay
//! power sequencing.
//!
//! # Power-up order
//!
//! ```text
//! start(level):
//!   amplitude = 0, gain = 0, index = 0
//!   relay on ──▶ settle delay ──▶ enable sampling
//!                                   │
//! update() each cycle:              ▼
//!   amplitude += RAMP_STEP ──▶ gain_q8 ──▶ per-sample interrupt
//! ```
//!
//! The relay is always closed while the published gain is still zero, so the
//! amplifier never powers up into a non-silent sample.
//!
//! Amplitude is kept in integer units of `1 / LEVEL_SCALE`. A ramp of
//! `RAMP_STEP` units therefore lands exactly on its target after
//! `ceil(LEVEL_SCALE / RAMP_STEP)` updates, with no float drift.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use super::tone::{ToneChannel, GAIN_UNITY};
use super::wavetable::MIDSCALE;
use crate::actuator::Relay;
use crate::fault::{FaultCode, FaultState};
use crate::hal::{OutputError, ToneOutput};

/// Amplitude units per 1.0.
pub const LEVEL_SCALE: u16 = 10_000;

/// Amplitude change per control cycle (0.02).
pub const RAMP_STEP: u16 = 200;

/// Relay contact settle time before the first sample.
pub const RELAY_SETTLE_MS: u32 = 10;

/// Convert a level in [0, 1] to amplitude units. NaN reads as 0.
pub fn level_to_units(level: f32) -> u16 {
    if !(level > 0.0) {
        0
    } else if level >= 1.0 {
        LEVEL_SCALE
    } else {
        (level * LEVEL_SCALE as f32 + 0.5) as u16
    }
}

#[inline]
fn units_to_gain(units: u16) -> u16 {
    (units as u32 * GAIN_UNITY as u32 / LEVEL_SCALE as u32) as u16
}

pub struct WaveformSynthesizer<'a, O, P, D> {
    channel: &'a ToneChannel,
    output: O,
    relay: Relay<'a, P>,
    delay: D,
    fault: &'a FaultState,
    amplitude: u16,
    target: u16,
}

impl<'a, O, P, D> WaveformSynthesizer<'a, O, P, D>
where
    O: ToneOutput,
    P: OutputPin,
    D: DelayNs,
{
    pub fn new(
        channel: &'a ToneChannel,
        output: O,
        relay: Relay<'a, P>,
        delay: D,
        fault: &'a FaultState,
    ) -> Self {
        Self {
            channel,
            output,
            relay,
            delay,
            fault,
            amplitude: 0,
            target: 0,
        }
    }

    /// Bring the hardware to a known silent state.
    pub fn begin(&mut self) {
        self.relay.begin();
        self.silence();
    }

    /// Power up and start emitting, ramping from 0 toward `level`.
    ///
    /// If the relay does not close, sampling is never enabled. Calling this
    /// while emitting stops sampling first, then restarts from index 0.
    pub fn start(&mut self, level: f32) {
        if self.is_active() {
            self.channel.disable();
            if let Err(e) = self.output.disable_sampling() {
                self.latch(e);
            }
        }

        self.amplitude = 0;
        self.target = level_to_units(level);
        self.channel.set_gain_q8(0);
        self.channel.reset_index();

        self.relay.on();
        if !self.relay.is_on() {
            return;
        }
        self.delay.delay_ms(RELAY_SETTLE_MS);

        self.channel.enable();
        if let Err(e) = self.output.enable_sampling() {
            self.channel.disable();
            self.latch(e);
        }
    }

    /// Stop emitting, park the output at midscale and open the relay.
    pub fn stop(&mut self) {
        self.silence();
        self.relay.off();
    }

    fn silence(&mut self) {
        self.channel.disable();
        self.amplitude = 0;
        self.target = 0;
        self.channel.set_gain_q8(0);

        if let Err(e) = self.output.disable_sampling() {
            self.latch(e);
        }
        match self.output.write_direct(MIDSCALE) {
            Ok(()) => self.channel.record_direct(MIDSCALE),
            Err(e) => self.latch(e),
        }
    }

    /// Set the target amplitude in [0, 1]. Takes effect through `update()`.
    pub fn set_level(&mut self, level: f32) {
        self.target = level_to_units(level);
    }

    /// Move the amplitude one step toward the target. Once per control cycle.
    pub fn update(&mut self) {
        if !self.is_active() {
            return;
        }
        self.amplitude = if self.amplitude < self.target {
            (self.amplitude + RAMP_STEP).min(self.target)
        } else {
            self.amplitude.saturating_sub(RAMP_STEP).max(self.target)
        };
        self.channel.set_gain_q8(units_to_gain(self.amplitude));
    }

    /// True while the per-sample interrupt is emitting.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.channel.is_enabled()
    }

    pub fn amplitude(&self) -> f32 {
        self.amplitude as f32 / LEVEL_SCALE as f32
    }

    pub fn amplitude_units(&self) -> u16 {
        self.amplitude
    }

    pub fn target_level(&self) -> f32 {
        self.target as f32 / LEVEL_SCALE as f32
    }

    pub fn is_relay_on(&self) -> bool {
        self.relay.is_on()
    }

    pub fn last_sample(&self) -> u8 {
        self.channel.last_sample()
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    fn latch(&self, e: OutputError) {
        self.fault.set(FaultCode::OutputFault, e.0 as u32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::RELAY_ACOUSTIC;
    use crate::hal::sim::{NoDelay, SimPin, SimToneOutput};

    type Synth<'a> = WaveformSynthesizer<'a, SimToneOutput, SimPin, NoDelay>;

    fn synth<'a>(channel: &'a ToneChannel, fault: &'a FaultState) -> Synth<'a> {
        let relay = Relay::new(SimPin::new(), RELAY_ACOUSTIC, fault);
        let mut s = WaveformSynthesizer::new(channel, SimToneOutput::default(), relay, NoDelay, fault);
        s.begin();
        s
    }

    #[test]
    fn test_level_to_units() {
        assert_eq!(level_to_units(0.5), 5_000);
        assert_eq!(level_to_units(-1.0), 0);
        assert_eq!(level_to_units(f32::NAN), 0);
        assert_eq!(level_to_units(3.0), LEVEL_SCALE);
    }

    #[test]
    fn test_start_is_silent_until_update() {
        let channel = ToneChannel::new();
        let fault = FaultState::new();
        let mut s = synth(&channel, &fault);

        s.start(1.0);
        assert!(s.is_active());
        assert!(s.is_relay_on());
        assert_eq!(s.amplitude_units(), 0);
        assert_eq!(channel.tick(), Some(MIDSCALE));
    }

    #[test]
    fn test_ramp_down_stops_at_target() {
        let channel = ToneChannel::new();
        let fault = FaultState::new();
        let mut s = synth(&channel, &fault);

        s.start(1.0);
        for _ in 0..50 {
            s.update();
        }
        s.set_level(0.5);
        for _ in 0..100 {
            s.update();
        }
        assert_eq!(s.amplitude_units(), 5_000);
        assert_eq!(channel.gain_q8(), 128);
    }

    #[test]
    fn test_update_ignored_while_stopped() {
        let channel = ToneChannel::new();
        let fault = FaultState::new();
        let mut s = synth(&channel, &fault);

        s.set_level(1.0);
        s.update();
        assert_eq!(s.amplitude_units(), 0);
        assert_eq!(channel.gain_q8(), 0);
    }

    #[test]
    fn test_stop_parks_midscale() {
        let channel = ToneChannel::new();
        let fault = FaultState::new();
        let mut s = synth(&channel, &fault);

        s.start(1.0);
        for _ in 0..10 {
            s.update();
        }
        channel.tick();
        channel.tick();
        s.stop();

        assert!(!s.is_active());
        assert!(!s.is_relay_on());
        assert_eq!(s.output().last_direct, Some(MIDSCALE));
        assert_eq!(s.last_sample(), MIDSCALE);
        assert_eq!(channel.tick(), None);
    }
}
