//! # AcousticInjector
//!
//! Throttle/MAP driven tone injector and secondary relay controller.
//!
//! ## Architecture
//!
//! ```text
//! sensor ISR (~1 kHz) ──▶ RawSampleCache ──▶ SensorChannel ×2 ──┐
//!                                                                 ▼
//! ThresholdStore ─────────────────────────────────────▶ ControlStateMachine
//!                                                                 │ Actuators
//!                                                                 ▼
//! tone ISR (TONE_HZ × 16) ◀── ToneChannel ◀── WaveformSynthesizer + secondary Relay
//! ```
//!
//! Everything crossing an interrupt boundary is a single-writer atomic
//! scalar; nothing takes a lock. The control loop is one cooperative
//! [`Controller::cycle`] call every [`controller::CONTROL_PERIOD_MS`].
//!
//! All control logic is `no_std` and host-testable; only `hal::esp`,
//! `storage::nvs` and the UART drain bind ESP-IDF.

#![cfg_attr(not(test), no_std)]

pub mod actuator;
pub mod audio;
pub mod calibration;
pub mod controller;
pub mod debug_override;
pub mod fault;
pub mod hal;
pub mod isr;
pub mod log_globals;
pub mod logging;
pub mod sensor;
pub mod state;
pub mod storage;
pub mod thresholds;
pub mod uart_logger;

pub use actuator::{ActuatorOrchestrator, Actuators, Relay};
pub use audio::{ToneChannel, WaveformSynthesizer};
pub use calibration::{CalibrationCapture, CalibrationRecord, CalibrationSession, CaptureOutcome};
pub use controller::{CalibrationRequest, Controller, Dashboard};
pub use fault::{FaultCode, FaultState};
pub use sensor::{Calibration, Channel, PercentPolicy, SensorChannel};
pub use state::{ControlInputs, ControlPolicy, ControlStateMachine, SystemState};
pub use thresholds::{ThresholdKey, ThresholdSet, ThresholdStore};
