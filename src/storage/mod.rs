//! Persistent key-value storage.
//!
//! Calibration and thresholds only need a tiny get/put surface over named
//! scalars. [`KeyValueStore`] is that surface; [`MemoryStore`] backs it in
//! RAM for tests and the host simulator, and `nvs::NvsStore` backs it with
//! an ESP-IDF NVS namespace on target.
//!
//! Floats are stored as their IEEE-754 bit pattern in a `u32` slot.

pub mod memory;
#[cfg(target_os = "espidf")]
pub mod nvs;

pub use memory::MemoryStore;

/// Maximum key length accepted by NVS.
pub const MAX_KEY_LEN: usize = 15;

/// Storage error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Key longer than [`MAX_KEY_LEN`].
    KeyTooLong,
    /// No room left for a new key.
    Full,
    /// Key exists but holds a different type.
    TypeMismatch,
    /// Backend I/O error (raw ESP-IDF error code on target).
    Io(i32),
}

impl StorageError {
    /// Get error code string
    pub fn code(&self) -> &'static str {
        match self {
            Self::KeyTooLong => "S01",
            Self::Full => "S02",
            Self::TypeMismatch => "S03",
            Self::Io(_) => "S04",
        }
    }

    /// Get error message
    pub fn message(&self) -> &'static str {
        match self {
            Self::KeyTooLong => "key too long",
            Self::Full => "store full",
            Self::TypeMismatch => "type mismatch",
            Self::Io(_) => "storage I/O error",
        }
    }
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Io(code) => write!(f, "{}: {} ({})", self.code(), self.message(), code),
            _ => write!(f, "{}: {}", self.code(), self.message()),
        }
    }
}

/// Get/put store of named scalars inside one namespace.
pub trait KeyValueStore {
    fn contains(&self, key: &str) -> Result<bool, StorageError>;

    fn get_u16(&self, key: &str) -> Result<Option<u16>, StorageError>;

    fn set_u16(&mut self, key: &str, value: u16) -> Result<(), StorageError>;

    fn get_u32(&self, key: &str) -> Result<Option<u32>, StorageError>;

    fn set_u32(&mut self, key: &str, value: u32) -> Result<(), StorageError>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;

    fn get_f32(&self, key: &str) -> Result<Option<f32>, StorageError> {
        Ok(self.get_u32(key)?.map(f32::from_bits))
    }

    fn set_f32(&mut self, key: &str, value: f32) -> Result<(), StorageError> {
        self.set_u32(key, value.to_bits())
    }
}

impl<S: KeyValueStore + ?Sized> KeyValueStore for &mut S {
    fn contains(&self, key: &str) -> Result<bool, StorageError> {
        (**self).contains(key)
    }

    fn get_u16(&self, key: &str) -> Result<Option<u16>, StorageError> {
        (**self).get_u16(key)
    }

    fn set_u16(&mut self, key: &str, value: u16) -> Result<(), StorageError> {
        (**self).set_u16(key, value)
    }

    fn get_u32(&self, key: &str) -> Result<Option<u32>, StorageError> {
        (**self).get_u32(key)
    }

    fn set_u32(&mut self, key: &str, value: u32) -> Result<(), StorageError> {
        (**self).set_u32(key, value)
    }

    fn remove(&mut self, key: &str) -> Result<(), StorageError> {
        (**self).remove(key)
    }
}
