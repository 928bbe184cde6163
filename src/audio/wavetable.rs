//! Single-cycle sine table for the tone output.
//!
//! 16 entries covering one full cycle over the 8-bit DAC range, centered at
//! [`MIDSCALE`]. Index 0 = 0°, 4 = 90°, 8 = 180°, 12 = 270°.

/// Number of entries in the wavetable.
pub const TABLE_SIZE: usize = 16;

/// DAC code for silence.
pub const MIDSCALE: u8 = 128;

/// Largest deviation from midscale at full amplitude.
pub const PEAK_DEVIATION: u8 = 127;

/// Tone frequency in Hz.
pub const TONE_HZ: u32 = 6370;

/// Per-sample interrupt rate: one table entry per tick.
pub const SAMPLE_RATE_HZ: u32 = TONE_HZ * TABLE_SIZE as u32;

/// Pre-computed wavetable: `MIDSCALE + PEAK_DEVIATION * sin(2π i / N)`.
pub static WAVETABLE: [u8; TABLE_SIZE] = {
    let mut table = [0u8; TABLE_SIZE];
    let mut i = 0;
    while i < TABLE_SIZE {
        let angle = (i as f64) * core::f64::consts::PI * 2.0 / (TABLE_SIZE as f64);
        let value = MIDSCALE as f64 + PEAK_DEVIATION as f64 * const_sin(angle) + 0.5;
        table[i] = value as u8;
        i += 1;
    }
    table
};

/// Const-compatible sine, Taylor series on [-π/2, π/2].
///
/// Folding into the quarter-wave range keeps the zero crossings exact, so
/// the half-cycle entry lands on midscale.
const fn const_sin(x: f64) -> f64 {
    use core::f64::consts::{FRAC_PI_2, PI};

    let mut x = x;
    while x > PI {
        x -= 2.0 * PI;
    }
    while x < -PI {
        x += 2.0 * PI;
    }
    if x > FRAC_PI_2 {
        x = PI - x;
    } else if x < -FRAC_PI_2 {
        x = -PI - x;
    }

    let x2 = x * x;
    let x3 = x2 * x;
    let x5 = x3 * x2;
    let x7 = x5 * x2;
    let x9 = x7 * x2;

    x - x3 / 6.0 + x5 / 120.0 - x7 / 5040.0 + x9 / 362880.0
}

/// Scale one table entry by a Q8 gain (256 = unity) around midscale.
///
/// Integer only; safe to call from the per-sample interrupt.
#[inline(always)]
pub fn scale_sample(entry: u8, gain_q8: u16) -> u8 {
    let dev = entry as i32 - MIDSCALE as i32;
    let out = MIDSCALE as i32 + dev * gain_q8 as i32 / 256;
    out.clamp(0, 255) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_key_points() {
        assert_eq!(WAVETABLE[0], MIDSCALE);
        assert_eq!(WAVETABLE[TABLE_SIZE / 4], 255);
        assert_eq!(WAVETABLE[TABLE_SIZE / 2], MIDSCALE);
        assert_eq!(WAVETABLE[3 * TABLE_SIZE / 4], 1);
    }

    #[test]
    fn test_table_is_antisymmetric() {
        for i in 1..TABLE_SIZE / 2 {
            let up = WAVETABLE[i] as i32 - MIDSCALE as i32;
            let down = WAVETABLE[TABLE_SIZE - i] as i32 - MIDSCALE as i32;
            assert!((up + down).abs() <= 1, "entry {}: {} vs {}", i, up, down);
        }
    }

    #[test]
    fn test_scale_sample_gain() {
        assert_eq!(scale_sample(255, 256), 255);
        assert_eq!(scale_sample(255, 0), MIDSCALE);
        assert_eq!(scale_sample(255, 128), 191);
        assert_eq!(scale_sample(1, 128), 65);
        // over-unity gain saturates
        assert_eq!(scale_sample(255, 1024), 255);
        assert_eq!(scale_sample(1, 1024), 0);
    }

    #[test]
    fn test_sample_rate() {
        assert_eq!(SAMPLE_RATE_HZ, 101_920);
    }
}
