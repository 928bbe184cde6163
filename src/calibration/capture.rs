//! Step-driven calibration capture.
//!
//! A capture tracks the running min/max of one channel over a bounded window.
//! The control loop feeds it one sample per cycle; it finishes when the window
//! elapses or when the operator confirms early. Nothing here blocks.
//!
//! Rail-window samples (open or shorted wire) are counted as rejected and
//! never widen the range.

use super::{save_channel, CalibrationRecord};
use crate::sensor::{in_rail_window, Calibration, Channel};
use crate::storage::{KeyValueStore, StorageError};

/// Capture window per channel.
pub const CAPTURE_WINDOW_MS: u32 = 15_000;

/// Narrowest range (raw counts) accepted as a calibration.
pub const MIN_CAPTURE_SPAN: u16 = 100;

/// Result of a finished capture.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureOutcome {
    /// Observed range is wide enough.
    Calibrated(Calibration),
    /// The sensor barely moved; the range is rejected.
    Degenerate { min: u16, max: u16 },
}

/// Progress of a capture after one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureStatus {
    Running { min: u16, max: u16, remaining_ms: u32 },
    Finished(CaptureOutcome),
}

/// Running min/max over one channel's capture window.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationCapture {
    channel: Channel,
    started_ms: u32,
    window_ms: u32,
    min: u16,
    max: u16,
    samples: u32,
    rejected: u32,
    outcome: Option<CaptureOutcome>,
}

impl CalibrationCapture {
    pub fn new(channel: Channel, now_ms: u32) -> Self {
        Self::with_window(channel, now_ms, CAPTURE_WINDOW_MS)
    }

    pub fn with_window(channel: Channel, now_ms: u32, window_ms: u32) -> Self {
        Self {
            channel,
            started_ms: now_ms,
            window_ms,
            min: u16::MAX,
            max: 0,
            samples: 0,
            rejected: 0,
            outcome: None,
        }
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    /// Samples that contributed to the range.
    pub fn samples(&self) -> u32 {
        self.samples
    }

    /// Rail-window samples that were skipped.
    pub fn rejected(&self) -> u32 {
        self.rejected
    }

    /// Observed range so far; `(0, 0)` before the first accepted sample.
    pub fn range(&self) -> (u16, u16) {
        if self.samples == 0 {
            (0, 0)
        } else {
            (self.min, self.max)
        }
    }

    pub fn outcome(&self) -> Option<CaptureOutcome> {
        self.outcome
    }

    /// Feed one raw sample.
    ///
    /// The sample is counted before `confirm` or the timeout are checked.
    /// A capture that accepted no sample finishes degenerate. Once finished,
    /// further steps return the same outcome and ignore their input.
    pub fn step(&mut self, now_ms: u32, raw: u16, confirm: bool) -> CaptureStatus {
        if let Some(outcome) = self.outcome {
            return CaptureStatus::Finished(outcome);
        }

        if in_rail_window(raw) {
            self.rejected += 1;
        } else {
            self.min = self.min.min(raw);
            self.max = self.max.max(raw);
            self.samples += 1;
        }

        let elapsed = now_ms.wrapping_sub(self.started_ms);
        if confirm || elapsed >= self.window_ms {
            let outcome = self.finish();
            self.outcome = Some(outcome);
            return CaptureStatus::Finished(outcome);
        }

        let (min, max) = self.range();
        CaptureStatus::Running {
            min,
            max,
            remaining_ms: self.window_ms - elapsed,
        }
    }

    fn finish(&self) -> CaptureOutcome {
        let (min, max) = self.range();
        if max - min < MIN_CAPTURE_SPAN {
            CaptureOutcome::Degenerate { min, max }
        } else {
            CaptureOutcome::Calibrated(Calibration::new(min, max))
        }
    }
}

/// Progress of a two-channel session after one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Current channel still capturing.
    Capturing { channel: Channel, min: u16, max: u16, remaining_ms: u32 },
    /// A channel finished and was persisted; the next one has started.
    ChannelCalibrated { channel: Channel, calibration: Calibration },
    /// Last channel finished and was persisted. The session is over.
    Complete { channel: Channel, calibration: Calibration },
    /// A channel captured too narrow a range. The session is over and the
    /// channel's stored bounds are untouched.
    Degenerate { channel: Channel, min: u16, max: u16 },
    /// Persisting a finished channel failed. The session is over.
    Failed(StorageError),
}

impl SessionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Complete { .. } | SessionStatus::Degenerate { .. } | SessionStatus::Failed(_)
        )
    }
}

/// Channel order of a session.
const SESSION_ORDER: [Channel; 2] = [Channel::Tps, Channel::Map];

/// TPS capture followed by MAP capture.
///
/// Each channel's bounds are persisted as soon as that channel finishes, so
/// the caller can apply them to the live [`SensorChannel`](crate::sensor::SensorChannel)
/// right away.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationSession {
    step_idx: usize,
    capture: CalibrationCapture,
    window_ms: u32,
    record: CalibrationRecord,
    finished: Option<SessionStatus>,
}

impl CalibrationSession {
    pub fn new(now_ms: u32) -> Self {
        Self::with_window(now_ms, CAPTURE_WINDOW_MS)
    }

    pub fn with_window(now_ms: u32, window_ms: u32) -> Self {
        Self {
            step_idx: 0,
            capture: CalibrationCapture::with_window(SESSION_ORDER[0], now_ms, window_ms),
            window_ms,
            record: CalibrationRecord::default(),
            finished: None,
        }
    }

    /// Channel whose samples the next [`step`](Self::step) expects.
    pub fn channel(&self) -> Channel {
        self.capture.channel()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.is_some()
    }

    /// Bounds captured so far.
    pub fn record(&self) -> CalibrationRecord {
        self.record
    }

    /// Feed one raw sample of [`channel`](Self::channel).
    ///
    /// `confirm` ends only the current channel's window.
    pub fn step<S: KeyValueStore + ?Sized>(
        &mut self,
        now_ms: u32,
        raw: u16,
        confirm: bool,
        store: &mut S,
    ) -> SessionStatus {
        if let Some(status) = self.finished {
            return status;
        }

        let channel = self.capture.channel();
        let status = match self.capture.step(now_ms, raw, confirm) {
            CaptureStatus::Running { min, max, remaining_ms } => {
                return SessionStatus::Capturing { channel, min, max, remaining_ms };
            }
            CaptureStatus::Finished(CaptureOutcome::Degenerate { min, max }) => {
                SessionStatus::Degenerate { channel, min, max }
            }
            CaptureStatus::Finished(CaptureOutcome::Calibrated(calibration)) => {
                if let Err(e) = save_channel(store, channel, calibration) {
                    SessionStatus::Failed(e)
                } else {
                    self.record.set(channel, calibration);
                    self.step_idx += 1;
                    match SESSION_ORDER.get(self.step_idx) {
                        Some(&next) => {
                            self.capture =
                                CalibrationCapture::with_window(next, now_ms, self.window_ms);
                            return SessionStatus::ChannelCalibrated { channel, calibration };
                        }
                        None => SessionStatus::Complete { channel, calibration },
                    }
                }
            }
        };

        self.finished = Some(status);
        status
    }
}
