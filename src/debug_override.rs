//! Debug override lines.
//!
//! Format: comma-separated `field:value` pairs, any order, any subset:
//!
//! ```text
//! tps:1.20,map:3.10          sensor voltages
//! tps_raw:1500,map_raw:3900  raw ADC counts
//! tps:off                    back to live sampling
//! secondary:1,tone:0.6       actuators (DEBUG_OVERRIDE only)
//! ```
//!
//! Parsing borrows the input line and never allocates.

use crate::hal::{ADC_MAX, ADC_VREF};

/// Simulation request for one sensor channel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SensorOverride {
    Volts(f32),
    Raw(u16),
    Release,
}

/// A parsed override line.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OverrideCommand {
    pub tps: Option<SensorOverride>,
    pub map: Option<SensorOverride>,
    /// Secondary relay on/off.
    pub secondary: Option<bool>,
    /// Tone level in [0, 1]; 0 stops the tone.
    pub tone: Option<f32>,
}

impl OverrideCommand {
    /// True if the line carries actuator fields.
    pub fn has_actuator_fields(&self) -> bool {
        self.secondary.is_some() || self.tone.is_some()
    }
}

/// Override parse error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideError {
    /// Blank line.
    Empty,
    /// Field name not recognised.
    UnknownField,
    /// `field` without `:value`.
    MissingValue,
    /// Value is not a number.
    InvalidNumber,
    /// Number outside the field's range.
    OutOfRange,
}

impl OverrideError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Empty => "D01",
            Self::UnknownField => "D02",
            Self::MissingValue => "D03",
            Self::InvalidNumber => "D04",
            Self::OutOfRange => "D05",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "empty override line",
            Self::UnknownField => "unknown field",
            Self::MissingValue => "missing value",
            Self::InvalidNumber => "invalid number",
            Self::OutOfRange => "value out of range",
        }
    }
}

impl core::fmt::Display for OverrideError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.code(), self.message())
    }
}

fn parse_f32(s: &str) -> Result<f32, OverrideError> {
    let v: f32 = s.parse().map_err(|_| OverrideError::InvalidNumber)?;
    if v.is_finite() {
        Ok(v)
    } else {
        Err(OverrideError::InvalidNumber)
    }
}

fn parse_volts(s: &str) -> Result<SensorOverride, OverrideError> {
    if s.eq_ignore_ascii_case("off") {
        return Ok(SensorOverride::Release);
    }
    let v = parse_f32(s)?;
    if !(0.0..=ADC_VREF).contains(&v) {
        return Err(OverrideError::OutOfRange);
    }
    Ok(SensorOverride::Volts(v))
}

fn parse_raw(s: &str) -> Result<SensorOverride, OverrideError> {
    let raw: u16 = s.parse().map_err(|_| OverrideError::InvalidNumber)?;
    if raw > ADC_MAX {
        return Err(OverrideError::OutOfRange);
    }
    Ok(SensorOverride::Raw(raw))
}

/// Parse one override line.
pub fn parse_override(line: &str) -> Result<OverrideCommand, OverrideError> {
    let line = line.trim();
    if line.is_empty() {
        return Err(OverrideError::Empty);
    }

    let mut cmd = OverrideCommand::default();
    for field in line.split(',') {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let (name, value) = field.split_once(':').ok_or(OverrideError::MissingValue)?;
        let value = value.trim();
        if value.is_empty() {
            return Err(OverrideError::MissingValue);
        }

        match name.trim() {
            "tps" => cmd.tps = Some(parse_volts(value)?),
            "map" => cmd.map = Some(parse_volts(value)?),
            "tps_raw" => cmd.tps = Some(parse_raw(value)?),
            "map_raw" => cmd.map = Some(parse_raw(value)?),
            "secondary" => {
                cmd.secondary = Some(match value {
                    "0" => false,
                    "1" => true,
                    _ => return Err(OverrideError::OutOfRange),
                })
            }
            "tone" => {
                let level = parse_f32(value)?;
                if !(0.0..=1.0).contains(&level) {
                    return Err(OverrideError::OutOfRange);
                }
                cmd.tone = Some(level);
            }
            _ => return Err(OverrideError::UnknownField),
        }
    }
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sensor_fields() {
        let cmd = parse_override("tps:1.25, map_raw:3900").unwrap();
        assert_eq!(cmd.tps, Some(SensorOverride::Volts(1.25)));
        assert_eq!(cmd.map, Some(SensorOverride::Raw(3900)));
        assert!(!cmd.has_actuator_fields());
    }

    #[test]
    fn test_release() {
        let cmd = parse_override("map:off").unwrap();
        assert_eq!(cmd.map, Some(SensorOverride::Release));
    }

    #[test]
    fn test_actuator_fields() {
        let cmd = parse_override("secondary:1,tone:0.6").unwrap();
        assert_eq!(cmd.secondary, Some(true));
        assert_eq!(cmd.tone, Some(0.6));
        assert!(cmd.has_actuator_fields());
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_override("   "), Err(OverrideError::Empty));
        assert_eq!(parse_override("rpm:3000"), Err(OverrideError::UnknownField));
        assert_eq!(parse_override("tps"), Err(OverrideError::MissingValue));
        assert_eq!(parse_override("tps:"), Err(OverrideError::MissingValue));
        assert_eq!(parse_override("tps:abc"), Err(OverrideError::InvalidNumber));
        assert_eq!(parse_override("tps:5.0"), Err(OverrideError::OutOfRange));
        assert_eq!(parse_override("map_raw:5000"), Err(OverrideError::OutOfRange));
        assert_eq!(parse_override("secondary:2"), Err(OverrideError::OutOfRange));
        assert_eq!(parse_override("tone:1.5"), Err(OverrideError::OutOfRange));
    }
}
