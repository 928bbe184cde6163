//! Hysteretic control state machine.
//!
//! ```text
//!                 request            complete
//! UNCALIBRATED ───────────▶ CALIBRATING ─────────▶ OFF
//!      ▲                         │ degenerate/failed │ MAP ≥ wake
//!      └─────────────────────────┘                   ▼
//!                  inj on                          IDLE ◀─────────────┐
//!          ┌───────────────────────────────────────┘ ▲                │
//!          ▼                                         │ inj off        │ inj off
//!  ACOUSTIC_INJECTION ───────────────────────────────┘                │
//!          │ boost on         ▲ inj on                                │
//!          ▼                  │                                       │
//!  SECONDARY_BOOST ──────▶ DECAYING ──────────────────────────────────┘
//!            boost off
//! ```
//!
//! "on" conditions need both TPS and MAP at or above their thresholds; "off"
//! conditions fire on either channel. Every "off" threshold is strictly below
//! its "on" partner (enforced by [`ThresholdSet::validate`]), which is the
//! hysteresis band.
//!
//! DEBUG_OVERRIDE is entered and left only through [`ControlStateMachine::force_state`];
//! sensor input never moves the machine out of it.

use crate::actuator::Actuators;
use crate::log_globals::LOG_STREAM;
use crate::thresholds::ThresholdSet;
use crate::{rt_info, rt_warn};

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SystemState {
    Uncalibrated = 0,
    Off = 1,
    Idle = 2,
    AcousticInjection = 3,
    SecondaryBoost = 4,
    Decaying = 5,
    Calibrating = 6,
    DebugOverride = 7,
}

impl SystemState {
    pub const ALL: [SystemState; 8] = [
        SystemState::Uncalibrated,
        SystemState::Off,
        SystemState::Idle,
        SystemState::AcousticInjection,
        SystemState::SecondaryBoost,
        SystemState::Decaying,
        SystemState::Calibrating,
        SystemState::DebugOverride,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SystemState::Uncalibrated => "UNCALIBRATED",
            SystemState::Off => "OFF",
            SystemState::Idle => "IDLE",
            SystemState::AcousticInjection => "ACOUSTIC_INJECTION",
            SystemState::SecondaryBoost => "SECONDARY_BOOST",
            SystemState::Decaying => "DECAYING",
            SystemState::Calibrating => "CALIBRATING",
            SystemState::DebugOverride => "DEBUG_OVERRIDE",
        }
    }

    /// Parse a state name, case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|s| s.as_str().eq_ignore_ascii_case(name))
    }
}

/// End of a calibration run, reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationSignal {
    /// Both channels captured and persisted.
    Complete,
    /// Degenerate range or storage failure.
    Failed,
}

/// One cycle of input.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ControlInputs {
    /// Filtered TPS load percent.
    pub tps: f32,
    /// Filtered MAP load percent.
    pub map: f32,
    /// Edge-triggered calibration request.
    pub calibration_requested: bool,
    /// Set on the cycle a calibration run ends.
    pub calibration: Option<CalibrationSignal>,
}

/// Behaviour switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlPolicy {
    /// Keep recomputing the acoustic level in SECONDARY_BOOST.
    pub track_level_in_boost: bool,
    /// Stop the tone when leaving SECONDARY_BOOST.
    pub silence_on_decay: bool,
}

impl Default for ControlPolicy {
    fn default() -> Self {
        Self {
            track_level_in_boost: false,
            silence_on_decay: true,
        }
    }
}

/// A state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: SystemState,
    pub to: SystemState,
}

/// Rejected force call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionError {
    pub from: SystemState,
    pub to: SystemState,
}

impl TransitionError {
    pub fn code(&self) -> &'static str {
        "M01"
    }

    pub fn message(&self) -> &'static str {
        "forced transitions must enter or leave DEBUG_OVERRIDE"
    }
}

impl core::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{}: {} ({} -> {})",
            self.code(),
            self.message(),
            self.from.as_str(),
            self.to.as_str()
        )
    }
}

/// Displacement of `now` from `entry` toward 100 %, in [0, 1].
fn relative_rise(now: f32, entry: f32) -> f32 {
    let room = 100.0 - entry;
    if !(room > 0.0) {
        return 0.0;
    }
    ((now - entry) / room).clamp(0.0, 1.0)
}

pub struct ControlStateMachine {
    state: SystemState,
    policy: ControlPolicy,
    level: f32,
    entry_tps: f32,
    entry_map: f32,
    last_inputs: ControlInputs,
}

impl ControlStateMachine {
    /// Start in OFF with a valid calibration, UNCALIBRATED otherwise.
    pub fn new(has_calibration: bool, policy: ControlPolicy) -> Self {
        Self {
            state: if has_calibration {
                SystemState::Off
            } else {
                SystemState::Uncalibrated
            },
            policy,
            level: 0.0,
            entry_tps: 0.0,
            entry_map: 0.0,
            last_inputs: ControlInputs::default(),
        }
    }

    #[inline]
    pub fn state(&self) -> SystemState {
        self.state
    }

    /// Last desired acoustic level.
    #[inline]
    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn policy(&self) -> ControlPolicy {
        self.policy
    }

    /// Evaluate this cycle's transition and run its exit/entry actions.
    pub fn update<A: Actuators + ?Sized>(
        &mut self,
        inputs: &ControlInputs,
        t: &ThresholdSet,
        act: &mut A,
        now_ms: u32,
    ) -> Option<Transition> {
        self.last_inputs = *inputs;

        let inj_on = inputs.tps >= t.inj_on_tps && inputs.map >= t.inj_on_map;
        let inj_off = inputs.tps <= t.inj_off_tps || inputs.map <= t.inj_off_map;

        let next = match self.state {
            SystemState::Uncalibrated if inputs.calibration_requested => SystemState::Calibrating,
            SystemState::Calibrating => match inputs.calibration {
                Some(CalibrationSignal::Complete) => SystemState::Off,
                Some(CalibrationSignal::Failed) => SystemState::Uncalibrated,
                None => return None,
            },
            SystemState::Off if inputs.map >= t.wake_map => SystemState::Idle,
            SystemState::Idle if inj_on => SystemState::AcousticInjection,
            SystemState::AcousticInjection => {
                if inputs.tps >= t.boost_on_tps && inputs.map >= t.boost_on_map {
                    SystemState::SecondaryBoost
                } else if inj_off {
                    SystemState::Idle
                } else {
                    return None;
                }
            }
            SystemState::SecondaryBoost
                if inputs.tps < t.boost_off_tps || inputs.map < t.boost_off_map =>
            {
                SystemState::Decaying
            }
            SystemState::Decaying => {
                if inj_on {
                    SystemState::AcousticInjection
                } else if inj_off {
                    SystemState::Idle
                } else {
                    return None;
                }
            }
            _ => return None,
        };

        self.exit(next, act);
        let from = self.state;
        self.state = next;
        self.enter(act);

        rt_info!(LOG_STREAM, now_ms, "state {} -> {}", from.as_str(), next.as_str());
        Some(Transition { from, to: next })
    }

    /// Per-cycle side effects of the current state.
    pub fn handle_actions<A: Actuators + ?Sized>(&mut self, inputs: &ControlInputs, act: &mut A) {
        match self.state {
            SystemState::AcousticInjection => {
                self.level = self.desired_level(inputs);
                act.set_acoustic_level(self.level);
                act.update();
            }
            SystemState::SecondaryBoost => {
                if self.policy.track_level_in_boost {
                    self.level = self.desired_level(inputs);
                    act.set_acoustic_level(self.level);
                }
                act.update();
            }
            SystemState::Decaying => act.update(),
            _ => {}
        }
    }

    /// Manual transition into or out of DEBUG_OVERRIDE.
    ///
    /// All actuators are stopped first, then the target's entry action runs.
    pub fn force_state<A: Actuators + ?Sized>(
        &mut self,
        target: SystemState,
        act: &mut A,
        now_ms: u32,
    ) -> Result<Transition, TransitionError> {
        let from = self.state;
        if target != SystemState::DebugOverride && from != SystemState::DebugOverride {
            rt_warn!(LOG_STREAM, now_ms, "force {} -> {} rejected", from.as_str(), target.as_str());
            return Err(TransitionError { from, to: target });
        }

        act.stop_all();
        self.level = 0.0;
        self.state = target;
        self.enter(act);

        rt_info!(LOG_STREAM, now_ms, "state {} -> {} (forced)", from.as_str(), target.as_str());
        Ok(Transition { from, to: target })
    }

    /// Calibration was lost (cleared or failed to reload): stop and block.
    pub fn invalidate_calibration<A: Actuators + ?Sized>(&mut self, act: &mut A, now_ms: u32) {
        act.stop_all();
        self.level = 0.0;
        if self.state != SystemState::Uncalibrated {
            rt_warn!(LOG_STREAM, now_ms, "state {} -> UNCALIBRATED (calibration lost)", self.state.as_str());
            self.state = SystemState::Uncalibrated;
        }
    }

    /// Safety stop: all actuators off, running states fall back to OFF.
    ///
    /// Used while the system is inactive or a fault is latched, so control
    /// resumes from OFF instead of a state whose actuators were cut.
    pub fn halt<A: Actuators + ?Sized>(&mut self, act: &mut A, now_ms: u32) {
        act.stop_all();
        self.level = 0.0;
        if matches!(
            self.state,
            SystemState::Idle
                | SystemState::AcousticInjection
                | SystemState::SecondaryBoost
                | SystemState::Decaying
        ) {
            rt_info!(LOG_STREAM, now_ms, "state {} -> OFF (halt)", self.state.as_str());
            self.state = SystemState::Off;
        }
    }

    /// A valid calibration was installed outside a capture run.
    pub fn restore_calibration(&mut self, now_ms: u32) {
        if self.state == SystemState::Uncalibrated {
            rt_info!(LOG_STREAM, now_ms, "state UNCALIBRATED -> OFF (calibration restored)");
            self.state = SystemState::Off;
        }
    }

    fn desired_level(&self, inputs: &ControlInputs) -> f32 {
        let tps = relative_rise(inputs.tps, self.entry_tps);
        let map = relative_rise(inputs.map, self.entry_map);
        tps.max(map)
    }

    fn exit<A: Actuators + ?Sized>(&mut self, next: SystemState, act: &mut A) {
        match (self.state, next) {
            (SystemState::AcousticInjection, SystemState::Idle) => act.stop_acoustic(),
            (SystemState::SecondaryBoost, _) => {
                act.stop_secondary();
                if self.policy.silence_on_decay {
                    act.stop_acoustic();
                }
            }
            (SystemState::Decaying, SystemState::Idle) => act.stop_acoustic(),
            _ => {}
        }
    }

    fn enter<A: Actuators + ?Sized>(&mut self, act: &mut A) {
        match self.state {
            SystemState::AcousticInjection => {
                self.entry_tps = self.last_inputs.tps;
                self.entry_map = self.last_inputs.map;
                self.level = 0.0;
                if !act.is_acoustic_on() {
                    act.start_acoustic(self.level);
                }
            }
            SystemState::SecondaryBoost => {
                if !act.is_acoustic_on() {
                    act.start_acoustic(self.level);
                }
                act.start_secondary();
            }
            SystemState::Idle | SystemState::Off | SystemState::Uncalibrated => {
                self.level = 0.0;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeActuators {
        acoustic: bool,
        secondary: bool,
        level: f32,
        starts: u32,
        updates: u32,
    }

    impl Actuators for FakeActuators {
        fn start_acoustic(&mut self, level: f32) {
            self.acoustic = true;
            self.level = level;
            self.starts += 1;
        }
        fn stop_acoustic(&mut self) {
            self.acoustic = false;
        }
        fn set_acoustic_level(&mut self, level: f32) {
            self.level = level;
        }
        fn is_acoustic_on(&self) -> bool {
            self.acoustic
        }
        fn start_secondary(&mut self) {
            self.secondary = true;
        }
        fn stop_secondary(&mut self) {
            self.secondary = false;
        }
        fn is_secondary_on(&self) -> bool {
            self.secondary
        }
        fn update(&mut self) {
            self.updates += 1;
        }
        fn last_sample(&self) -> u8 {
            crate::audio::MIDSCALE
        }
    }

    fn inputs(tps: f32, map: f32) -> ControlInputs {
        ControlInputs { tps, map, ..Default::default() }
    }

    #[test]
    fn test_initial_state() {
        assert_eq!(ControlStateMachine::new(false, ControlPolicy::default()).state(), SystemState::Uncalibrated);
        assert_eq!(ControlStateMachine::new(true, ControlPolicy::default()).state(), SystemState::Off);
    }

    #[test]
    fn test_relative_rise() {
        assert_eq!(relative_rise(60.0, 20.0), 0.5);
        assert_eq!(relative_rise(10.0, 20.0), 0.0);
        assert_eq!(relative_rise(100.0, 100.0), 0.0);
    }

    #[test]
    fn test_level_tracks_displacement_since_entry() {
        let t = ThresholdSet::DEFAULT;
        let mut act = FakeActuators::default();
        let mut sm = ControlStateMachine::new(true, ControlPolicy::default());

        sm.update(&inputs(0.0, 50.0), &t, &mut act, 0);
        sm.update(&inputs(20.0, 50.0), &t, &mut act, 1);
        assert_eq!(sm.state(), SystemState::AcousticInjection);
        assert_eq!(act.starts, 1);

        let i = inputs(40.0, 60.0);
        sm.update(&i, &t, &mut act, 2);
        sm.handle_actions(&i, &mut act);
        // TPS: (40-20)/80 = 0.25, MAP: (60-50)/50 = 0.2
        assert_eq!(sm.level(), 0.25);
        assert_eq!(act.level, 0.25);
        assert_eq!(act.updates, 1);
    }

    #[test]
    fn test_state_names() {
        for s in SystemState::ALL {
            assert_eq!(SystemState::from_name(s.as_str()), Some(s));
        }
        assert_eq!(SystemState::from_name("idle"), Some(SystemState::Idle));
    }
}
