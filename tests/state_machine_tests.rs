//! Control state machine tests
//!
//! Runs the machine against the real orchestrator backed by simulated
//! pins and analog output, with factory-default thresholds:
//! wake 5, injection 10/40 on and 8/30 off, boost 45/75 on and 30/0 off.

use acoustic_injector::actuator::{ActuatorOrchestrator, Actuators, Relay, RELAY_ACOUSTIC, RELAY_SECONDARY};
use acoustic_injector::audio::{ToneChannel, WaveformSynthesizer};
use acoustic_injector::fault::FaultState;
use acoustic_injector::hal::sim::{NoDelay, SimPin, SimToneOutput};
use acoustic_injector::state::{
    CalibrationSignal, ControlInputs, ControlPolicy, ControlStateMachine, SystemState, Transition,
};
use acoustic_injector::thresholds::ThresholdSet;

type Act<'a> = ActuatorOrchestrator<'a, SimToneOutput, SimPin, SimPin, NoDelay>;

fn actuators<'a>(tone: &'a ToneChannel, fault: &'a FaultState) -> Act<'a> {
    let synth = WaveformSynthesizer::new(
        tone,
        SimToneOutput::default(),
        Relay::new(SimPin::new(), RELAY_ACOUSTIC, fault),
        NoDelay,
        fault,
    );
    let mut act = ActuatorOrchestrator::new(synth, Relay::new(SimPin::new(), RELAY_SECONDARY, fault));
    act.begin();
    act
}

fn inputs(tps: f32, map: f32) -> ControlInputs {
    ControlInputs { tps, map, ..Default::default() }
}

/// Feed one input and run the per-state actions, as the control loop does.
fn step(sm: &mut ControlStateMachine, act: &mut Act<'_>, tps: f32, map: f32) -> Option<Transition> {
    let i = inputs(tps, map);
    let t = sm.update(&i, &ThresholdSet::DEFAULT, act, 0);
    sm.handle_actions(&i, act);
    t
}

/// Drive a calibrated machine into ACOUSTIC_INJECTION.
fn into_injection(sm: &mut ControlStateMachine, act: &mut Act<'_>) {
    step(sm, act, 0.0, 10.0);
    assert_eq!(sm.state(), SystemState::Idle);
    step(sm, act, 15.0, 45.0);
    assert_eq!(sm.state(), SystemState::AcousticInjection);
}

#[test]
fn test_uncalibrated_ignores_load() {
    let tone = ToneChannel::new();
    let fault = FaultState::new();
    let mut act = actuators(&tone, &fault);
    let mut sm = ControlStateMachine::new(false, ControlPolicy::default());

    assert_eq!(step(&mut sm, &mut act, 90.0, 90.0), None);
    assert_eq!(sm.state(), SystemState::Uncalibrated);
    assert!(!act.is_acoustic_on());
}

#[test]
fn test_off_wakes_on_map() {
    let tone = ToneChannel::new();
    let fault = FaultState::new();
    let mut act = actuators(&tone, &fault);
    let mut sm = ControlStateMachine::new(true, ControlPolicy::default());

    assert_eq!(step(&mut sm, &mut act, 50.0, 4.0), None);
    assert_eq!(
        step(&mut sm, &mut act, 0.0, 5.0),
        Some(Transition { from: SystemState::Off, to: SystemState::Idle })
    );
}

#[test]
fn test_idle_to_injection_starts_tone() {
    let tone = ToneChannel::new();
    let fault = FaultState::new();
    let mut act = actuators(&tone, &fault);
    let mut sm = ControlStateMachine::new(true, ControlPolicy::default());

    into_injection(&mut sm, &mut act);
    assert!(act.is_acoustic_on());
    assert!(act.synth().is_relay_on());
    assert!(!act.is_secondary_on());
}

#[test]
fn test_injection_hysteresis() {
    let tone = ToneChannel::new();
    let fault = FaultState::new();
    let mut act = actuators(&tone, &fault);
    let mut sm = ControlStateMachine::new(true, ControlPolicy::default());

    step(&mut sm, &mut act, 0.0, 10.0);
    // between off (8) and on (10): IDLE holds
    step(&mut sm, &mut act, 9.0, 45.0);
    assert_eq!(sm.state(), SystemState::Idle);

    step(&mut sm, &mut act, 15.0, 45.0);
    assert_eq!(sm.state(), SystemState::AcousticInjection);

    // same in-between input: injection holds
    step(&mut sm, &mut act, 9.0, 45.0);
    assert_eq!(sm.state(), SystemState::AcousticInjection);
    step(&mut sm, &mut act, 9.0, 35.0);
    assert_eq!(sm.state(), SystemState::AcousticInjection);

    step(&mut sm, &mut act, 8.0, 45.0);
    assert_eq!(sm.state(), SystemState::Idle);
    assert!(!act.is_acoustic_on());
}

#[test]
fn test_injection_level_follows_load() {
    let tone = ToneChannel::new();
    let fault = FaultState::new();
    let mut act = actuators(&tone, &fault);
    let mut sm = ControlStateMachine::new(true, ControlPolicy::default());

    into_injection(&mut sm, &mut act);
    let before = act.acoustic_level();

    for _ in 0..10 {
        step(&mut sm, &mut act, 40.0, 60.0);
    }
    assert!(sm.level() > 0.0);
    assert!(act.acoustic_level() > before);
}

#[test]
fn test_boost_cycle() {
    let tone = ToneChannel::new();
    let fault = FaultState::new();
    let mut act = actuators(&tone, &fault);
    let mut sm = ControlStateMachine::new(true, ControlPolicy::default());

    into_injection(&mut sm, &mut act);
    step(&mut sm, &mut act, 50.0, 80.0);
    assert_eq!(sm.state(), SystemState::SecondaryBoost);
    assert!(act.is_secondary_on());
    assert!(act.is_acoustic_on());

    // above boost_off_tps: boost holds
    step(&mut sm, &mut act, 35.0, 50.0);
    assert_eq!(sm.state(), SystemState::SecondaryBoost);

    step(&mut sm, &mut act, 25.0, 50.0);
    assert_eq!(sm.state(), SystemState::Decaying);
    assert!(!act.is_secondary_on());
    assert!(!act.is_acoustic_on());

    // still above the injection off thresholds: decaying holds
    step(&mut sm, &mut act, 9.0, 50.0);
    assert_eq!(sm.state(), SystemState::Decaying);

    step(&mut sm, &mut act, 5.0, 50.0);
    assert_eq!(sm.state(), SystemState::Idle);
}

#[test]
fn test_decaying_reenters_injection() {
    let tone = ToneChannel::new();
    let fault = FaultState::new();
    let mut act = actuators(&tone, &fault);
    let mut sm = ControlStateMachine::new(true, ControlPolicy::default());

    into_injection(&mut sm, &mut act);
    step(&mut sm, &mut act, 50.0, 80.0);
    step(&mut sm, &mut act, 20.0, 50.0);
    assert_eq!(sm.state(), SystemState::Decaying);

    step(&mut sm, &mut act, 20.0, 50.0);
    assert_eq!(sm.state(), SystemState::AcousticInjection);
    assert!(act.is_acoustic_on());
}

#[test]
fn test_tone_kept_through_decay_when_not_silenced() {
    let tone = ToneChannel::new();
    let fault = FaultState::new();
    let mut act = actuators(&tone, &fault);
    let policy = ControlPolicy { track_level_in_boost: true, silence_on_decay: false };
    let mut sm = ControlStateMachine::new(true, policy);

    into_injection(&mut sm, &mut act);
    step(&mut sm, &mut act, 50.0, 80.0);
    step(&mut sm, &mut act, 60.0, 90.0);
    assert!(sm.level() > 0.0);

    step(&mut sm, &mut act, 20.0, 50.0);
    assert_eq!(sm.state(), SystemState::Decaying);
    assert!(act.is_acoustic_on());
    assert!(!act.is_secondary_on());

    step(&mut sm, &mut act, 5.0, 20.0);
    assert_eq!(sm.state(), SystemState::Idle);
    assert!(!act.is_acoustic_on());
}

#[test]
fn test_calibration_path() {
    let tone = ToneChannel::new();
    let fault = FaultState::new();
    let mut act = actuators(&tone, &fault);
    let mut sm = ControlStateMachine::new(false, ControlPolicy::default());
    let t = ThresholdSet::DEFAULT;

    let request = ControlInputs { calibration_requested: true, ..Default::default() };
    sm.update(&request, &t, &mut act, 0);
    assert_eq!(sm.state(), SystemState::Calibrating);

    // no signal: stays put whatever the load
    assert_eq!(sm.update(&inputs(90.0, 90.0), &t, &mut act, 20), None);

    let failed = ControlInputs { calibration: Some(CalibrationSignal::Failed), ..Default::default() };
    sm.update(&failed, &t, &mut act, 40);
    assert_eq!(sm.state(), SystemState::Uncalibrated);

    sm.update(&request, &t, &mut act, 60);
    let done = ControlInputs { calibration: Some(CalibrationSignal::Complete), ..Default::default() };
    sm.update(&done, &t, &mut act, 80);
    assert_eq!(sm.state(), SystemState::Off);
}

#[test]
fn test_debug_override_is_sticky() {
    let tone = ToneChannel::new();
    let fault = FaultState::new();
    let mut act = actuators(&tone, &fault);
    let mut sm = ControlStateMachine::new(true, ControlPolicy::default());

    into_injection(&mut sm, &mut act);
    let t = sm.force_state(SystemState::DebugOverride, &mut act, 0).unwrap();
    assert_eq!(t, Transition { from: SystemState::AcousticInjection, to: SystemState::DebugOverride });
    assert!(!act.is_acoustic_on());

    for (tps, map) in [(0.0, 0.0), (50.0, 80.0), (100.0, 100.0)] {
        assert_eq!(step(&mut sm, &mut act, tps, map), None);
        assert_eq!(sm.state(), SystemState::DebugOverride);
    }

    sm.force_state(SystemState::Off, &mut act, 0).unwrap();
    assert_eq!(sm.state(), SystemState::Off);
}

#[test]
fn test_force_outside_debug_rejected() {
    let tone = ToneChannel::new();
    let fault = FaultState::new();
    let mut act = actuators(&tone, &fault);
    let mut sm = ControlStateMachine::new(true, ControlPolicy::default());

    into_injection(&mut sm, &mut act);
    let err = sm.force_state(SystemState::SecondaryBoost, &mut act, 0).unwrap_err();
    assert_eq!(err.code(), "M01");
    assert_eq!(sm.state(), SystemState::AcousticInjection);
    assert!(act.is_acoustic_on());
    assert!(!act.is_secondary_on());
}

#[test]
fn test_halt_returns_to_off() {
    let tone = ToneChannel::new();
    let fault = FaultState::new();
    let mut act = actuators(&tone, &fault);
    let mut sm = ControlStateMachine::new(true, ControlPolicy::default());

    into_injection(&mut sm, &mut act);
    step(&mut sm, &mut act, 50.0, 80.0);
    sm.halt(&mut act, 0);

    assert_eq!(sm.state(), SystemState::Off);
    assert!(!act.is_acoustic_on());
    assert!(!act.is_secondary_on());
}
