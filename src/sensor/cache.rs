//! Interrupt-refreshed raw sample cache.
//!
//! The ~1 kHz sensor timer interrupt is the only writer; the control loop is
//! the only reader. Each channel is one `AtomicU16`, so a read is never torn
//! and no lock is needed.

use core::sync::atomic::{AtomicU16, Ordering};

use super::Channel;
use crate::hal::RawSource;

/// Latest raw count per channel.
pub struct RawSampleCache {
    slots: [AtomicU16; 2],
}

impl RawSampleCache {
    pub const fn new() -> Self {
        Self {
            slots: [AtomicU16::new(0), AtomicU16::new(0)],
        }
    }

    /// Publish a fresh sample. Interrupt context only.
    #[inline]
    pub fn store(&self, channel: Channel, raw: u16) {
        self.slots[channel as usize].store(raw, Ordering::Release);
    }

    #[inline]
    pub fn load(&self, channel: Channel) -> u16 {
        self.slots[channel as usize].load(Ordering::Acquire)
    }

    /// Reader handle for one channel.
    pub fn source(&self, channel: Channel) -> CachedSample<'_> {
        CachedSample { cache: self, channel }
    }
}

impl Default for RawSampleCache {
    fn default() -> Self {
        Self::new()
    }
}

/// [`RawSource`] view of one cache slot.
#[derive(Clone, Copy)]
pub struct CachedSample<'a> {
    cache: &'a RawSampleCache,
    channel: Channel,
}

impl RawSource for CachedSample<'_> {
    #[inline]
    fn read_raw(&mut self) -> u16 {
        self.cache.load(self.channel)
    }
}
