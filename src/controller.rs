//! One control cycle.
//!
//! ```text
//! sample MAP/TPS ──▶ fault? ──▶ active? ──▶ calibration step ──▶ state update ──▶ actions
//!                    stop_all   stop_all
//! ```
//!
//! [`Controller::cycle`] is the whole cooperative loop body; the firmware
//! calls it every [`CONTROL_PERIOD_MS`] and the host simulator calls it per
//! input line.

use core::sync::atomic::{AtomicBool, Ordering};

use crate::actuator::Actuators;
use crate::calibration::{
    clear_calibration, load_calibration, save_calibration, CalibrationRecord, CalibrationSession,
    SessionStatus,
};
use crate::debug_override::{OverrideCommand, SensorOverride};
use crate::fault::{FaultCode, FaultSnapshot, FaultState};
use crate::hal::{volts_to_raw, RawSource};
use crate::log_globals::LOG_STREAM;
use crate::sensor::{vacuum_inhg, Calibration, Channel, SensorChannel};
use crate::state::{
    CalibrationSignal, ControlInputs, ControlPolicy, ControlStateMachine, SystemState, Transition,
    TransitionError,
};
use crate::storage::{KeyValueStore, StorageError};
use crate::thresholds::ThresholdStore;
use crate::{rt_error, rt_info, rt_warn};

/// Control loop period.
pub const CONTROL_PERIOD_MS: u32 = 20;

/// Edge-triggered calibration request shared with UI collaborators.
///
/// Any number of `request()` calls between two cycles collapse into one;
/// [`take`](Self::take) reads and clears in one step.
pub struct CalibrationRequest {
    pending: AtomicBool,
}

impl CalibrationRequest {
    pub const fn new() -> Self {
        Self { pending: AtomicBool::new(false) }
    }

    pub fn request(&self) {
        self.pending.store(true, Ordering::Release);
    }

    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }
}

impl Default for CalibrationRequest {
    fn default() -> Self {
        Self::new()
    }
}

/// Dashboard view of one sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelReading {
    pub raw: u16,
    pub volts: f32,
    pub percent: f32,
    pub disconnected: bool,
    pub simulated: bool,
}

/// Everything a UI shows.
#[derive(Debug, Clone, Copy)]
pub struct Dashboard {
    pub state: SystemState,
    pub level: f32,
    pub map: ChannelReading,
    pub tps: ChannelReading,
    pub vacuum_inhg: f32,
    pub acoustic_on: bool,
    pub secondary_on: bool,
    pub last_sample: u8,
    pub system_active: bool,
    pub fault: FaultSnapshot,
}

pub struct Controller<'a, S, A, K> {
    map: SensorChannel<S>,
    tps: SensorChannel<S>,
    actuators: A,
    calib_store: K,
    thresholds: &'a ThresholdStore,
    request: &'a CalibrationRequest,
    fault: &'a FaultState,
    machine: ControlStateMachine,
    session: Option<CalibrationSession>,
    confirm: bool,
    active: bool,
    fault_reported: bool,
}

impl<'a, S, A, K> Controller<'a, S, A, K>
where
    S: RawSource,
    A: Actuators,
    K: KeyValueStore,
{
    /// Wire the loop and load the persisted calibration.
    ///
    /// Without a valid calibration the machine starts in UNCALIBRATED.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        mut map: SensorChannel<S>,
        mut tps: SensorChannel<S>,
        actuators: A,
        calib_store: K,
        thresholds: &'a ThresholdStore,
        request: &'a CalibrationRequest,
        fault: &'a FaultState,
        policy: ControlPolicy,
    ) -> Self {
        let has_calibration = match load_calibration(&calib_store) {
            Ok(record) => {
                map.set_calibration(record.map);
                tps.set_calibration(record.tps);
                rt_info!(
                    LOG_STREAM,
                    0,
                    "calibration MAP {}..{} TPS {}..{}",
                    record.map.min,
                    record.map.max,
                    record.tps.min,
                    record.tps.max
                );
                true
            }
            Err(e) => {
                rt_warn!(LOG_STREAM, 0, "calibration not ready: {}", e);
                false
            }
        };

        Self {
            map,
            tps,
            actuators,
            calib_store,
            thresholds,
            request,
            fault,
            machine: ControlStateMachine::new(has_calibration, policy),
            session: None,
            confirm: false,
            active: true,
            fault_reported: false,
        }
    }

    /// Run one control cycle.
    pub fn cycle(&mut self, now_ms: u32) -> Option<Transition> {
        let tps = self.tps.sample();
        let map = self.map.sample();

        if self.fault.is_active() {
            self.machine.halt(&mut self.actuators, now_ms);
            if !self.fault_reported {
                let snap = self.fault.snapshot();
                rt_error!(LOG_STREAM, now_ms, "fault {} ({}), actuators stopped", snap.code.as_str(), snap.data);
                self.fault_reported = true;
            }
            return None;
        }

        if !self.active {
            self.machine.halt(&mut self.actuators, now_ms);
            return None;
        }

        let calibration = self.step_calibration(now_ms);
        let inputs = ControlInputs {
            tps,
            map,
            calibration_requested: self.request.take(),
            calibration,
        };

        let thresholds = self.thresholds.snapshot();
        let transition = self.machine.update(&inputs, &thresholds, &mut self.actuators, now_ms);
        if let Some(t) = transition {
            self.on_transition(t, now_ms);
        }

        self.machine.handle_actions(&inputs, &mut self.actuators);
        transition
    }

    fn on_transition(&mut self, t: Transition, now_ms: u32) {
        if t.to == SystemState::Calibrating {
            self.session = Some(CalibrationSession::new(now_ms));
            self.confirm = false;
            rt_info!(LOG_STREAM, now_ms, "calibration: sweep TPS, confirm when done");
        } else if t.from == SystemState::Calibrating {
            self.session = None;
        }
    }

    /// Advance an active capture; returns the end signal on its last cycle.
    fn step_calibration(&mut self, now_ms: u32) -> Option<CalibrationSignal> {
        let session = self.session.as_mut()?;
        let channel = session.channel();
        let raw = match channel {
            Channel::Map => self.map.read_raw_cached(),
            Channel::Tps => self.tps.read_raw_cached(),
        };
        let confirm = core::mem::take(&mut self.confirm);

        match session.step(now_ms, raw, confirm, &mut self.calib_store) {
            SessionStatus::Capturing { .. } => None,
            SessionStatus::ChannelCalibrated { channel, calibration } => {
                self.install(channel, calibration, now_ms);
                rt_info!(LOG_STREAM, now_ms, "calibration: sweep {}, confirm when done", session_next(channel));
                None
            }
            SessionStatus::Complete { channel, calibration } => {
                self.install(channel, calibration, now_ms);
                Some(CalibrationSignal::Complete)
            }
            SessionStatus::Degenerate { channel, min, max } => {
                rt_warn!(
                    LOG_STREAM,
                    now_ms,
                    "calibration {} degenerate: {}..{}",
                    channel.as_str(),
                    min,
                    max
                );
                Some(CalibrationSignal::Failed)
            }
            SessionStatus::Failed(e) => {
                rt_error!(LOG_STREAM, now_ms, "calibration save failed: {}", e);
                let data = match e {
                    StorageError::Io(code) => code as u32,
                    _ => 0,
                };
                self.fault.set(FaultCode::StorageFault, data);
                Some(CalibrationSignal::Failed)
            }
        }
    }

    fn install(&mut self, channel: Channel, calibration: Calibration, now_ms: u32) {
        let ch = match channel {
            Channel::Map => &mut self.map,
            Channel::Tps => &mut self.tps,
        };
        ch.set_calibration(calibration);
        ch.reset_filter();
        rt_info!(
            LOG_STREAM,
            now_ms,
            "calibration {} {}..{}",
            channel.as_str(),
            calibration.min,
            calibration.max
        );
    }

    /// End the current capture window early.
    pub fn confirm_calibration(&mut self) {
        if self.session.is_some() {
            self.confirm = true;
        }
    }

    /// Erase the persisted calibration and block actuation.
    pub fn clear_calibration(&mut self, now_ms: u32) -> Result<(), StorageError> {
        self.machine.invalidate_calibration(&mut self.actuators, now_ms);
        self.session = None;
        self.map.set_calibration(Calibration::default());
        self.tps.set_calibration(Calibration::default());
        clear_calibration(&mut self.calib_store)
    }

    /// Install and persist a fixed calibration record.
    pub fn apply_calibration(&mut self, record: &CalibrationRecord, now_ms: u32) -> Result<(), StorageError> {
        save_calibration(&mut self.calib_store, record)?;
        for channel in Channel::ALL {
            self.install(channel, record.get(channel), now_ms);
        }
        self.machine.restore_calibration(now_ms);
        Ok(())
    }

    /// Manual state change into or out of DEBUG_OVERRIDE.
    pub fn force_state(&mut self, target: SystemState, now_ms: u32) -> Result<Transition, TransitionError> {
        let t = self.machine.force_state(target, &mut self.actuators, now_ms)?;
        self.on_transition(t, now_ms);
        Ok(t)
    }

    /// Apply a parsed override line.
    ///
    /// Sensor fields always apply. Actuator fields apply only in
    /// DEBUG_OVERRIDE; returns whether they did.
    pub fn apply_override(&mut self, cmd: &OverrideCommand, now_ms: u32) -> bool {
        for (channel, field) in [(Channel::Tps, cmd.tps), (Channel::Map, cmd.map)] {
            let ch = match channel {
                Channel::Map => &mut self.map,
                Channel::Tps => &mut self.tps,
            };
            match field {
                Some(SensorOverride::Volts(v)) => ch.set_simulated_raw(volts_to_raw(v)),
                Some(SensorOverride::Raw(raw)) => ch.set_simulated_raw(raw),
                Some(SensorOverride::Release) => ch.clear_simulation(),
                None => {}
            }
        }

        if !cmd.has_actuator_fields() {
            return false;
        }
        if self.machine.state() != SystemState::DebugOverride {
            rt_warn!(LOG_STREAM, now_ms, "actuator override ignored outside DEBUG_OVERRIDE");
            return false;
        }

        match cmd.secondary {
            Some(true) => self.actuators.start_secondary(),
            Some(false) => self.actuators.stop_secondary(),
            None => {}
        }
        match cmd.tone {
            Some(level) if level > 0.0 => {
                if self.actuators.is_acoustic_on() {
                    self.actuators.set_acoustic_level(level);
                } else {
                    self.actuators.start_acoustic(level);
                }
            }
            Some(_) => self.actuators.stop_acoustic(),
            None => {}
        }
        true
    }

    /// Keep the tone ramp moving while parked in DEBUG_OVERRIDE.
    pub fn service_override(&mut self) {
        if self.machine.state() == SystemState::DebugOverride {
            self.actuators.update();
        }
    }

    /// UI on/off switch. Inactive means every cycle stops all actuators.
    pub fn set_system_active(&mut self, active: bool, now_ms: u32) {
        if self.active != active {
            rt_info!(LOG_STREAM, now_ms, "system {}", if active { "active" } else { "inactive" });
        }
        self.active = active;
        if !active {
            self.machine.halt(&mut self.actuators, now_ms);
        }
    }

    pub fn is_system_active(&self) -> bool {
        self.active
    }

    /// Clear a latched fault and resume control.
    pub fn clear_fault(&mut self, now_ms: u32) {
        if self.fault.is_active() {
            rt_info!(LOG_STREAM, now_ms, "fault cleared");
        }
        self.fault.clear();
        self.fault_reported = false;
    }

    pub fn state(&self) -> SystemState {
        self.machine.state()
    }

    pub fn level(&self) -> f32 {
        self.machine.level()
    }

    pub fn is_calibrating(&self) -> bool {
        self.session.is_some()
    }

    /// Channel the running capture is sampling.
    pub fn calibrating_channel(&self) -> Option<Channel> {
        self.session.as_ref().map(|s| s.channel())
    }

    pub fn actuators(&self) -> &A {
        &self.actuators
    }

    pub fn actuators_mut(&mut self) -> &mut A {
        &mut self.actuators
    }

    pub fn sensor(&self, channel: Channel) -> &SensorChannel<S> {
        match channel {
            Channel::Map => &self.map,
            Channel::Tps => &self.tps,
        }
    }

    pub fn thresholds(&self) -> &ThresholdStore {
        self.thresholds
    }

    pub fn calibration_store(&self) -> &K {
        &self.calib_store
    }

    fn reading(ch: &SensorChannel<S>) -> ChannelReading {
        ChannelReading {
            raw: ch.last_measured(),
            volts: ch.volts(),
            percent: ch.filtered_percent(),
            disconnected: ch.is_disconnected(),
            simulated: ch.is_simulated(),
        }
    }

    pub fn dashboard(&self) -> Dashboard {
        let map = Self::reading(&self.map);
        Dashboard {
            state: self.machine.state(),
            level: self.machine.level(),
            map,
            tps: Self::reading(&self.tps),
            vacuum_inhg: vacuum_inhg(map.percent),
            acoustic_on: self.actuators.is_acoustic_on(),
            secondary_on: self.actuators.is_secondary_on(),
            last_sample: self.actuators.last_sample(),
            system_active: self.active,
            fault: self.fault.snapshot(),
        }
    }
}

fn session_next(done: Channel) -> &'static str {
    match done {
        Channel::Tps => Channel::Map.as_str(),
        Channel::Map => Channel::Tps.as_str(),
    }
}
