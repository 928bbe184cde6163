//! NVS-backed key-value store (ESP-IDF only).
//!
//! One [`NvsStore`] per namespace: calibration lives in `calib`, thresholds
//! in `thresholds`.

use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs, NvsDefault};
use esp_idf_svc::sys::EspError;

use super::{KeyValueStore, StorageError};

/// NVS namespace for the four calibration bounds.
pub const CALIBRATION_NAMESPACE: &str = "calib";

/// NVS namespace for threshold parameters.
pub const THRESHOLD_NAMESPACE: &str = "thresholds";

impl From<EspError> for StorageError {
    fn from(e: EspError) -> Self {
        StorageError::Io(e.code())
    }
}

/// Store bound to one NVS namespace, opened read-write.
pub struct NvsStore {
    nvs: EspNvs<NvsDefault>,
}

impl NvsStore {
    pub fn open(partition: EspDefaultNvsPartition, namespace: &str) -> Result<Self, StorageError> {
        let nvs = EspNvs::new(partition, namespace, true)?;
        Ok(Self { nvs })
    }
}

impl KeyValueStore for NvsStore {
    fn contains(&self, key: &str) -> Result<bool, StorageError> {
        Ok(self.nvs.contains(key)?)
    }

    fn get_u16(&self, key: &str) -> Result<Option<u16>, StorageError> {
        Ok(self.nvs.get_u16(key)?)
    }

    fn set_u16(&mut self, key: &str, value: u16) -> Result<(), StorageError> {
        Ok(self.nvs.set_u16(key, value)?)
    }

    fn get_u32(&self, key: &str) -> Result<Option<u32>, StorageError> {
        Ok(self.nvs.get_u32(key)?)
    }

    fn set_u32(&mut self, key: &str, value: u32) -> Result<(), StorageError> {
        Ok(self.nvs.set_u32(key, value)?)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        self.nvs.remove(key)?;
        Ok(())
    }
}
