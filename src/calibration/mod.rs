//! Persisted two-point calibration for MAP and TPS.
//!
//! The record is four `u16` keys in the `calib` namespace: `map_min`,
//! `map_max`, `tps_min`, `tps_max`. It is usable only if all four keys are
//! present and both ranges are non-degenerate; anything else is "not ready"
//! and keeps the controller in UNCALIBRATED.

pub mod capture;

pub use capture::{
    CalibrationCapture, CalibrationSession, CaptureOutcome, CaptureStatus, SessionStatus,
    CAPTURE_WINDOW_MS, MIN_CAPTURE_SPAN,
};

use crate::sensor::{Calibration, Channel};
use crate::storage::{KeyValueStore, StorageError};

/// All four storage keys, in the order they are checked.
pub const CALIBRATION_KEYS: [&str; 4] = ["map_min", "map_max", "tps_min", "tps_max"];

/// Calibration load/save error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationError {
    /// A key was never written.
    MissingKey(&'static str),
    /// Stored range has max <= min.
    Degenerate(Channel),
    /// Storage backend failed.
    Storage(StorageError),
}

impl CalibrationError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingKey(_) => "C01",
            Self::Degenerate(_) => "C02",
            Self::Storage(_) => "C03",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingKey(_) => "calibration key missing",
            Self::Degenerate(_) => "calibration range degenerate",
            Self::Storage(_) => "calibration storage error",
        }
    }
}

impl core::fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::MissingKey(key) => write!(f, "{}: {} ({})", self.code(), self.message(), key),
            Self::Degenerate(ch) => write!(f, "{}: {} ({})", self.code(), self.message(), ch.as_str()),
            Self::Storage(e) => write!(f, "{}: {} ({})", self.code(), self.message(), e),
        }
    }
}

impl From<StorageError> for CalibrationError {
    fn from(e: StorageError) -> Self {
        CalibrationError::Storage(e)
    }
}

/// Both channel calibrations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationRecord {
    pub map: Calibration,
    pub tps: Calibration,
}

/// Fixed record for bench work without a car: TPS 0.5–2.25 V, MAP 3.05–3.26 V.
pub const BENCH_CALIBRATION: CalibrationRecord = CalibrationRecord {
    map: Calibration::new(3784, 4045),
    tps: Calibration::new(620, 2792),
};

impl CalibrationRecord {
    pub fn get(&self, channel: Channel) -> Calibration {
        match channel {
            Channel::Map => self.map,
            Channel::Tps => self.tps,
        }
    }

    pub fn set(&mut self, channel: Channel, calibration: Calibration) {
        match channel {
            Channel::Map => self.map = calibration,
            Channel::Tps => self.tps = calibration,
        }
    }

    /// Check both ranges.
    pub fn validate(&self) -> Result<(), CalibrationError> {
        for channel in Channel::ALL {
            if !self.get(channel).is_valid() {
                return Err(CalibrationError::Degenerate(channel));
            }
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }
}

/// Load and validate the persisted record.
pub fn load_calibration<S: KeyValueStore + ?Sized>(
    store: &S,
) -> Result<CalibrationRecord, CalibrationError> {
    for key in CALIBRATION_KEYS {
        if !store.contains(key)? {
            return Err(CalibrationError::MissingKey(key));
        }
    }

    let mut record = CalibrationRecord::default();
    for channel in Channel::ALL {
        let min = store
            .get_u16(channel.min_key())?
            .ok_or(CalibrationError::MissingKey(channel.min_key()))?;
        let max = store
            .get_u16(channel.max_key())?
            .ok_or(CalibrationError::MissingKey(channel.max_key()))?;
        record.set(channel, Calibration::new(min, max));
    }

    record.validate()?;
    Ok(record)
}

/// Persist both bounds of one channel.
pub fn save_channel<S: KeyValueStore + ?Sized>(
    store: &mut S,
    channel: Channel,
    calibration: Calibration,
) -> Result<(), StorageError> {
    store.set_u16(channel.min_key(), calibration.min)?;
    store.set_u16(channel.max_key(), calibration.max)
}

/// Persist the full record.
pub fn save_calibration<S: KeyValueStore + ?Sized>(
    store: &mut S,
    record: &CalibrationRecord,
) -> Result<(), StorageError> {
    for channel in Channel::ALL {
        save_channel(store, channel, record.get(channel))?;
    }
    Ok(())
}

/// Erase all four keys.
pub fn clear_calibration<S: KeyValueStore + ?Sized>(store: &mut S) -> Result<(), StorageError> {
    for key in CALIBRATION_KEYS {
        store.remove(key)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn stored(map: (u16, u16), tps: (u16, u16)) -> MemoryStore {
        let mut store = MemoryStore::new();
        store.set_u16("map_min", map.0).unwrap();
        store.set_u16("map_max", map.1).unwrap();
        store.set_u16("tps_min", tps.0).unwrap();
        store.set_u16("tps_max", tps.1).unwrap();
        store
    }

    #[test]
    fn test_load_valid_record() {
        let store = stored((500, 3500), (300, 3800));
        let record = load_calibration(&store).unwrap();
        assert_eq!(record.map, Calibration::new(500, 3500));
        assert_eq!(record.tps, Calibration::new(300, 3800));
    }

    #[test]
    fn test_load_missing_key() {
        let mut store = stored((500, 3500), (300, 3800));
        store.remove("tps_max").unwrap();
        assert_eq!(
            load_calibration(&store),
            Err(CalibrationError::MissingKey("tps_max"))
        );
    }

    #[test]
    fn test_load_empty_store_reports_first_key() {
        let store = MemoryStore::new();
        assert_eq!(
            load_calibration(&store),
            Err(CalibrationError::MissingKey("map_min"))
        );
    }

    #[test]
    fn test_load_degenerate_range() {
        let store = stored((500, 3500), (3800, 3800));
        assert_eq!(
            load_calibration(&store),
            Err(CalibrationError::Degenerate(Channel::Tps))
        );

        let store = stored((3500, 500), (300, 3800));
        assert_eq!(
            load_calibration(&store),
            Err(CalibrationError::Degenerate(Channel::Map))
        );
    }

    #[test]
    fn test_save_then_clear() {
        let mut store = MemoryStore::new();
        let record = CalibrationRecord {
            map: Calibration::new(500, 3500),
            tps: Calibration::new(300, 3800),
        };
        save_calibration(&mut store, &record).unwrap();
        assert_eq!(load_calibration(&store).unwrap(), record);

        clear_calibration(&mut store).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn test_bench_record_is_valid() {
        assert!(BENCH_CALIBRATION.is_valid());
    }

    #[test]
    fn test_error_display() {
        let e = CalibrationError::Degenerate(Channel::Map);
        assert_eq!(e.to_string(), "C02: calibration range degenerate (MAP)");
    }
}
