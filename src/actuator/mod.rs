//! Actuator orchestration.
//!
//! [`ActuatorOrchestrator`] puts the waveform synthesizer and the secondary
//! relay behind one API. The state machine never sees it directly: it drives
//! the [`Actuators`] capability trait, so tests can hand it a recording fake.

pub mod relay;

pub use relay::{Relay, RELAY_ACOUSTIC, RELAY_SECONDARY};

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::audio::WaveformSynthesizer;
use crate::hal::ToneOutput;

/// Actuator capabilities the control logic depends on.
pub trait Actuators {
    /// Power up the tone and ramp toward `level` in [0, 1].
    fn start_acoustic(&mut self, level: f32);

    fn stop_acoustic(&mut self);

    /// New target level; no immediate output change.
    fn set_acoustic_level(&mut self, level: f32);

    fn is_acoustic_on(&self) -> bool;

    fn start_secondary(&mut self);

    fn stop_secondary(&mut self);

    fn is_secondary_on(&self) -> bool;

    /// Per-cycle housekeeping (amplitude ramp).
    fn update(&mut self);

    /// Last sample that reached the analog output.
    fn last_sample(&self) -> u8;

    /// Unconditional shutdown of everything.
    fn stop_all(&mut self) {
        self.stop_secondary();
        self.stop_acoustic();
    }
}

/// Synthesizer plus secondary relay.
pub struct ActuatorOrchestrator<'a, O, PA, PS, D> {
    synth: WaveformSynthesizer<'a, O, PA, D>,
    secondary: Relay<'a, PS>,
}

impl<'a, O, PA, PS, D> ActuatorOrchestrator<'a, O, PA, PS, D>
where
    O: ToneOutput,
    PA: OutputPin,
    PS: OutputPin,
    D: DelayNs,
{
    pub fn new(synth: WaveformSynthesizer<'a, O, PA, D>, secondary: Relay<'a, PS>) -> Self {
        Self { synth, secondary }
    }

    /// Drive both actuators to de-energized.
    pub fn begin(&mut self) {
        self.secondary.begin();
        self.synth.begin();
    }

    /// Current (ramped) acoustic amplitude.
    pub fn acoustic_level(&self) -> f32 {
        self.synth.amplitude()
    }

    pub fn synth(&self) -> &WaveformSynthesizer<'a, O, PA, D> {
        &self.synth
    }

    pub fn secondary(&self) -> &Relay<'a, PS> {
        &self.secondary
    }
}

impl<O, PA, PS, D> Actuators for ActuatorOrchestrator<'_, O, PA, PS, D>
where
    O: ToneOutput,
    PA: OutputPin,
    PS: OutputPin,
    D: DelayNs,
{
    fn start_acoustic(&mut self, level: f32) {
        self.synth.start(level);
    }

    fn stop_acoustic(&mut self) {
        self.synth.stop();
    }

    fn set_acoustic_level(&mut self, level: f32) {
        self.synth.set_level(level);
    }

    fn is_acoustic_on(&self) -> bool {
        self.synth.is_active()
    }

    fn start_secondary(&mut self) {
        self.secondary.on();
    }

    fn stop_secondary(&mut self) {
        self.secondary.off();
    }

    fn is_secondary_on(&self) -> bool {
        self.secondary.is_on()
    }

    fn update(&mut self) {
        self.synth.update();
    }

    fn last_sample(&self) -> u8 {
        self.synth.last_sample()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::ToneChannel;
    use crate::fault::FaultState;
    use crate::hal::sim::{NoDelay, SimPin, SimToneOutput};

    #[test]
    fn test_stop_all_from_everything_on() {
        let channel = ToneChannel::new();
        let fault = FaultState::new();
        let synth = WaveformSynthesizer::new(
            &channel,
            SimToneOutput::default(),
            Relay::new(SimPin::new(), RELAY_ACOUSTIC, &fault),
            NoDelay,
            &fault,
        );
        let mut act = ActuatorOrchestrator::new(synth, Relay::new(SimPin::new(), RELAY_SECONDARY, &fault));
        act.begin();

        act.start_acoustic(0.8);
        act.start_secondary();
        act.update();
        assert!(act.is_acoustic_on());
        assert!(act.is_secondary_on());
        assert!(act.acoustic_level() > 0.0);

        act.stop_all();
        assert!(!act.is_acoustic_on());
        assert!(!act.is_secondary_on());
        assert!(!act.secondary().pin().is_high());
        assert_eq!(act.acoustic_level(), 0.0);
    }
}
