//! Interrupt-side tone state.
//!
//! [`ToneChannel`] is everything the per-sample interrupt touches. Every
//! field is a single atomic scalar with exactly one writer at a time:
//!
//! | field         | writer while enabled | writer while disabled |
//! |---------------|----------------------|-----------------------|
//! | `gain_q8`     | control loop         | control loop          |
//! | `index`       | interrupt            | control loop          |
//! | `last_sample` | interrupt            | control loop          |
//! | `enabled`     | control loop         | control loop          |
//!
//! No floating point here: the loop converts its amplitude to a Q8 gain
//! before publishing it.

use core::sync::atomic::{AtomicBool, AtomicU16, AtomicU8, Ordering};

use super::wavetable::{scale_sample, MIDSCALE, TABLE_SIZE, WAVETABLE};

/// Q8 unity gain.
pub const GAIN_UNITY: u16 = 256;

pub struct ToneChannel {
    gain_q8: AtomicU16,
    index: AtomicU8,
    last_sample: AtomicU8,
    enabled: AtomicBool,
}

impl ToneChannel {
    pub const fn new() -> Self {
        Self {
            gain_q8: AtomicU16::new(0),
            index: AtomicU8::new(0),
            last_sample: AtomicU8::new(MIDSCALE),
            enabled: AtomicBool::new(false),
        }
    }

    /// Produce the next sample, or `None` while disabled.
    ///
    /// Called from the per-sample timer interrupt.
    #[inline(always)]
    pub fn tick(&self) -> Option<u8> {
        if !self.enabled.load(Ordering::Acquire) {
            return None;
        }
        let i = self.index.load(Ordering::Relaxed) as usize;
        let gain = self.gain_q8.load(Ordering::Acquire);
        let sample = scale_sample(WAVETABLE[i % TABLE_SIZE], gain);

        self.last_sample.store(sample, Ordering::Release);
        self.index.store(((i + 1) % TABLE_SIZE) as u8, Ordering::Relaxed);
        Some(sample)
    }

    #[inline]
    pub fn set_gain_q8(&self, gain: u16) {
        self.gain_q8.store(gain.min(GAIN_UNITY), Ordering::Release);
    }

    #[inline]
    pub fn gain_q8(&self) -> u16 {
        self.gain_q8.load(Ordering::Acquire)
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Release);
    }

    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Release);
    }

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Rewind to table entry 0. Only while disabled.
    pub fn reset_index(&self) {
        self.index.store(0, Ordering::Relaxed);
    }

    pub fn index(&self) -> u8 {
        self.index.load(Ordering::Relaxed)
    }

    /// Record a sample written with the interrupt stopped.
    pub fn record_direct(&self, sample: u8) {
        self.last_sample.store(sample, Ordering::Release);
    }

    #[inline]
    pub fn last_sample(&self) -> u8 {
        self.last_sample.load(Ordering::Acquire)
    }
}

impl Default for ToneChannel {
    fn default() -> Self {
        Self::new()
    }
}
