//! The single interrupt-shared slot.
//!
//! Timer interrupts cannot carry context, so the state they touch lives in
//! one static. Only interrupt registration (`hal::esp`) and the firmware
//! wiring in `main` reach for [`ISR`]; everything else receives references.

use crate::audio::ToneChannel;
use crate::sensor::{Channel, RawSampleCache};

/// State shared between the timer interrupts and the control loop.
pub struct IsrSlot {
    /// Written by the ~1 kHz sensor interrupt.
    pub samples: RawSampleCache,
    /// Read by the per-sample tone interrupt.
    pub tone: ToneChannel,
}

impl IsrSlot {
    pub const fn new() -> Self {
        Self {
            samples: RawSampleCache::new(),
            tone: ToneChannel::new(),
        }
    }
}

impl Default for IsrSlot {
    fn default() -> Self {
        Self::new()
    }
}

pub static ISR: IsrSlot = IsrSlot::new();

/// Sensor interrupt body: publish one conversion per channel.
#[inline(always)]
pub fn sensor_tick(map_raw: u16, tps_raw: u16) {
    ISR.samples.store(Channel::Map, map_raw);
    ISR.samples.store(Channel::Tps, tps_raw);
}

/// Tone interrupt body: next DAC code, or `None` while stopped.
#[inline(always)]
pub fn tone_tick() -> Option<u8> {
    ISR.tone.tick()
}
