//! Tone synthesis.
//!
//! Architecture:
//! - Wavetable: 16-entry const sine around DAC midscale
//! - ToneChannel: atomics shared with the per-sample timer interrupt,
//!   Q8 integer gain only
//! - WaveformSynthesizer: loop-side start/stop, ramp and relay sequencing
//! - 8-bit DAC @ TONE_HZ × TABLE_SIZE samples/s

pub mod synth;
pub mod tone;
pub mod wavetable;

pub use synth::{level_to_units, WaveformSynthesizer, LEVEL_SCALE, RAMP_STEP, RELAY_SETTLE_MS};
pub use tone::{ToneChannel, GAIN_UNITY};
pub use wavetable::{scale_sample, MIDSCALE, SAMPLE_RATE_HZ, TABLE_SIZE, TONE_HZ, WAVETABLE};
