//! Runtime-tunable transition thresholds.
//!
//! Every state-machine boundary is a named percentage held in an
//! [`AtomicU32`] as raw `f32` bits, so the control loop reads the whole set
//! lock-free each cycle while the UI side writes single values between
//! cycles.
//!
//! # Persistence
//!
//! Stored in the `thresholds` namespace, one `f32` per key plus a
//! `schema_ver` stamp:
//!
//! - **v1** (current): the nine keys of [`ThresholdKey`].
//!
//! A missing stamp is a fresh install and keeps the defaults.

use core::cmp::Ordering as CmpOrdering;
use core::sync::atomic::{AtomicU32, Ordering};

use crate::storage::{KeyValueStore, StorageError};

/// Current schema version of the persisted thresholds.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

const VERSION_KEY: &str = "schema_ver";

/// Threshold identity. Names double as storage keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ThresholdKey {
    WakeMap = 0,
    InjOnTps = 1,
    InjOnMap = 2,
    InjOffTps = 3,
    InjOffMap = 4,
    BoostOnTps = 5,
    BoostOnMap = 6,
    BoostOffTps = 7,
    BoostOffMap = 8,
}

/// Number of thresholds.
pub const THRESHOLD_COUNT: usize = 9;

impl ThresholdKey {
    pub const ALL: [ThresholdKey; THRESHOLD_COUNT] = [
        ThresholdKey::WakeMap,
        ThresholdKey::InjOnTps,
        ThresholdKey::InjOnMap,
        ThresholdKey::InjOffTps,
        ThresholdKey::InjOffMap,
        ThresholdKey::BoostOnTps,
        ThresholdKey::BoostOnMap,
        ThresholdKey::BoostOffTps,
        ThresholdKey::BoostOffMap,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ThresholdKey::WakeMap => "wake_map",
            ThresholdKey::InjOnTps => "inj_on_tps",
            ThresholdKey::InjOnMap => "inj_on_map",
            ThresholdKey::InjOffTps => "inj_off_tps",
            ThresholdKey::InjOffMap => "inj_off_map",
            ThresholdKey::BoostOnTps => "boost_on_tps",
            ThresholdKey::BoostOnMap => "boost_on_map",
            ThresholdKey::BoostOffTps => "boost_off_tps",
            ThresholdKey::BoostOffMap => "boost_off_map",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|k| k.as_str() == name)
    }

    /// The "on" key an "off" key must stay below, if any.
    pub fn hysteresis_partner(self) -> Option<(ThresholdKey, ThresholdKey)> {
        use ThresholdKey::*;
        match self {
            InjOnTps | InjOffTps => Some((InjOnTps, InjOffTps)),
            InjOnMap | InjOffMap => Some((InjOnMap, InjOffMap)),
            BoostOnTps | BoostOffTps => Some((BoostOnTps, BoostOffTps)),
            BoostOnMap | BoostOffMap => Some((BoostOnMap, BoostOffMap)),
            WakeMap => None,
        }
    }
}

/// Threshold error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdError {
    /// Name does not match any threshold.
    UnknownKey,
    /// Value not a finite percentage in [0, 100].
    OutOfRange(ThresholdKey),
    /// "off" value not strictly below its "on" value.
    Inverted { on: ThresholdKey, off: ThresholdKey },
    /// Stored schema is newer than this firmware.
    TooNew { stored_version: u32 },
    /// Storage backend failed.
    Storage(StorageError),
}

impl ThresholdError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownKey => "T01",
            Self::OutOfRange(_) => "T02",
            Self::Inverted { .. } => "T03",
            Self::TooNew { .. } => "T04",
            Self::Storage(_) => "T05",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::UnknownKey => "unknown threshold",
            Self::OutOfRange(_) => "value out of range 0-100",
            Self::Inverted { .. } => "off threshold must be below on threshold",
            Self::TooNew { .. } => "stored thresholds newer than firmware",
            Self::Storage(_) => "threshold storage error",
        }
    }
}

impl core::fmt::Display for ThresholdError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::OutOfRange(key) => {
                write!(f, "{}: {} ({})", self.code(), self.message(), key.as_str())
            }
            Self::Inverted { on, off } => write!(
                f,
                "{}: {} ({} >= {})",
                self.code(),
                self.message(),
                off.as_str(),
                on.as_str()
            ),
            Self::TooNew { stored_version } => {
                write!(f, "{}: {} (v{})", self.code(), self.message(), stored_version)
            }
            Self::Storage(e) => write!(f, "{}: {} ({})", self.code(), self.message(), e),
            Self::UnknownKey => write!(f, "{}: {}", self.code(), self.message()),
        }
    }
}

impl From<StorageError> for ThresholdError {
    fn from(e: StorageError) -> Self {
        ThresholdError::Storage(e)
    }
}

/// Plain copy of all thresholds, in load percent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ThresholdSet {
    pub wake_map: f32,
    pub inj_on_tps: f32,
    pub inj_on_map: f32,
    pub inj_off_tps: f32,
    pub inj_off_map: f32,
    pub boost_on_tps: f32,
    pub boost_on_map: f32,
    pub boost_off_tps: f32,
    pub boost_off_map: f32,
}

impl ThresholdSet {
    /// Factory defaults.
    pub const DEFAULT: ThresholdSet = ThresholdSet {
        wake_map: 5.0,
        inj_on_tps: 10.0,
        inj_on_map: 40.0,
        inj_off_tps: 8.0,
        inj_off_map: 30.0,
        boost_on_tps: 45.0,
        boost_on_map: 75.0,
        boost_off_tps: 30.0,
        boost_off_map: 0.0,
    };

    pub fn get(&self, key: ThresholdKey) -> f32 {
        match key {
            ThresholdKey::WakeMap => self.wake_map,
            ThresholdKey::InjOnTps => self.inj_on_tps,
            ThresholdKey::InjOnMap => self.inj_on_map,
            ThresholdKey::InjOffTps => self.inj_off_tps,
            ThresholdKey::InjOffMap => self.inj_off_map,
            ThresholdKey::BoostOnTps => self.boost_on_tps,
            ThresholdKey::BoostOnMap => self.boost_on_map,
            ThresholdKey::BoostOffTps => self.boost_off_tps,
            ThresholdKey::BoostOffMap => self.boost_off_map,
        }
    }

    pub fn set(&mut self, key: ThresholdKey, value: f32) {
        let slot = match key {
            ThresholdKey::WakeMap => &mut self.wake_map,
            ThresholdKey::InjOnTps => &mut self.inj_on_tps,
            ThresholdKey::InjOnMap => &mut self.inj_on_map,
            ThresholdKey::InjOffTps => &mut self.inj_off_tps,
            ThresholdKey::InjOffMap => &mut self.inj_off_map,
            ThresholdKey::BoostOnTps => &mut self.boost_on_tps,
            ThresholdKey::BoostOnMap => &mut self.boost_on_map,
            ThresholdKey::BoostOffTps => &mut self.boost_off_tps,
            ThresholdKey::BoostOffMap => &mut self.boost_off_map,
        };
        *slot = value;
    }

    /// Range and hysteresis check of the whole set.
    pub fn validate(&self) -> Result<(), ThresholdError> {
        for key in ThresholdKey::ALL {
            let v = self.get(key);
            if !v.is_finite() || !(0.0..=100.0).contains(&v) {
                return Err(ThresholdError::OutOfRange(key));
            }
        }
        for key in [
            ThresholdKey::InjOffTps,
            ThresholdKey::InjOffMap,
            ThresholdKey::BoostOffTps,
            ThresholdKey::BoostOffMap,
        ] {
            if let Some((on, off)) = key.hysteresis_partner() {
                if self.get(off) >= self.get(on) {
                    return Err(ThresholdError::Inverted { on, off });
                }
            }
        }
        Ok(())
    }
}

impl Default for ThresholdSet {
    fn default() -> Self {
        Self::DEFAULT
    }
}

// Compile-time validation: factory "off" values sit below their "on" values
const _: () = assert!(ThresholdSet::DEFAULT.inj_off_tps < ThresholdSet::DEFAULT.inj_on_tps);
const _: () = assert!(ThresholdSet::DEFAULT.inj_off_map < ThresholdSet::DEFAULT.inj_on_map);
const _: () = assert!(ThresholdSet::DEFAULT.boost_off_tps < ThresholdSet::DEFAULT.boost_on_tps);
const _: () = assert!(ThresholdSet::DEFAULT.boost_off_map < ThresholdSet::DEFAULT.boost_on_map);

/// Result of [`ThresholdStore::load`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing stored yet; defaults kept.
    FreshInstall,
    /// Stored set loaded.
    UpToDate,
}

/// Lock-free threshold registry.
pub struct ThresholdStore {
    values: [AtomicU32; THRESHOLD_COUNT],
}

impl ThresholdStore {
    /// Store holding the factory defaults.
    pub const fn new() -> Self {
        let d = ThresholdSet::DEFAULT;
        Self {
            values: [
                AtomicU32::new(d.wake_map.to_bits()),
                AtomicU32::new(d.inj_on_tps.to_bits()),
                AtomicU32::new(d.inj_on_map.to_bits()),
                AtomicU32::new(d.inj_off_tps.to_bits()),
                AtomicU32::new(d.inj_off_map.to_bits()),
                AtomicU32::new(d.boost_on_tps.to_bits()),
                AtomicU32::new(d.boost_on_map.to_bits()),
                AtomicU32::new(d.boost_off_tps.to_bits()),
                AtomicU32::new(d.boost_off_map.to_bits()),
            ],
        }
    }

    #[inline]
    pub fn get(&self, key: ThresholdKey) -> f32 {
        f32::from_bits(self.values[key as usize].load(Ordering::Relaxed))
    }

    pub fn get_by_name(&self, name: &str) -> Result<f32, ThresholdError> {
        let key = ThresholdKey::from_name(name).ok_or(ThresholdError::UnknownKey)?;
        Ok(self.get(key))
    }

    /// Read every threshold. Called once per control cycle.
    pub fn snapshot(&self) -> ThresholdSet {
        let mut set = ThresholdSet::DEFAULT;
        for key in ThresholdKey::ALL {
            set.set(key, self.get(key));
        }
        set
    }

    /// Set one threshold if the resulting set stays valid.
    pub fn set(&self, key: ThresholdKey, value: f32) -> Result<(), ThresholdError> {
        let mut candidate = self.snapshot();
        candidate.set(key, value);
        candidate.validate()?;
        self.values[key as usize].store(value.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn set_by_name(&self, name: &str, value: f32) -> Result<ThresholdKey, ThresholdError> {
        let key = ThresholdKey::from_name(name).ok_or(ThresholdError::UnknownKey)?;
        self.set(key, value)?;
        Ok(key)
    }

    /// Replace the whole set if valid.
    pub fn apply(&self, set: &ThresholdSet) -> Result<(), ThresholdError> {
        set.validate()?;
        for key in ThresholdKey::ALL {
            self.values[key as usize].store(set.get(key).to_bits(), Ordering::Relaxed);
        }
        Ok(())
    }

    /// Restore factory defaults in memory.
    pub fn reset(&self) {
        for key in ThresholdKey::ALL {
            self.values[key as usize]
                .store(ThresholdSet::DEFAULT.get(key).to_bits(), Ordering::Relaxed);
        }
    }

    /// Load persisted thresholds.
    ///
    /// Missing individual keys keep their current value. An invalid stored
    /// set is rejected as a whole and leaves memory untouched.
    pub fn load<S: KeyValueStore + ?Sized>(&self, store: &S) -> Result<LoadOutcome, ThresholdError> {
        let stored_version = store.get_u32(VERSION_KEY)?.unwrap_or(0);

        match stored_version.cmp(&CURRENT_SCHEMA_VERSION) {
            CmpOrdering::Equal => {
                let mut set = self.snapshot();
                for key in ThresholdKey::ALL {
                    if let Some(v) = store.get_f32(key.as_str())? {
                        set.set(key, v);
                    }
                }
                self.apply(&set)?;
                Ok(LoadOutcome::UpToDate)
            }
            CmpOrdering::Less => Ok(LoadOutcome::FreshInstall),
            CmpOrdering::Greater => Err(ThresholdError::TooNew { stored_version }),
        }
    }

    /// Persist the current set with the version stamp.
    pub fn save<S: KeyValueStore + ?Sized>(&self, store: &mut S) -> Result<(), ThresholdError> {
        store.set_u32(VERSION_KEY, CURRENT_SCHEMA_VERSION)?;
        for key in ThresholdKey::ALL {
            store.set_f32(key.as_str(), self.get(key))?;
        }
        Ok(())
    }

    /// Restore defaults and persist them.
    pub fn reset_and_save<S: KeyValueStore + ?Sized>(&self, store: &mut S) -> Result<(), ThresholdError> {
        self.reset();
        self.save(store)
    }
}

impl Default for ThresholdStore {
    fn default() -> Self {
        Self::new()
    }
}
