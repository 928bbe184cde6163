//! Fault latch for hardware and storage failures.
//!
//! A relay that did not switch or an output that did not take a sample
//! leaves the system in an unknown electrical state. Drivers never propagate
//! these errors into the control logic; they latch a fault here, and the
//! control loop shuts every actuator down while a fault is active.
//!
//! All fields are atomics so the latch can be set from any context.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};

/// Fault codes indicating why the actuators were shut down.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum FaultCode {
    /// No fault (normal operation).
    None = 0,

    /// A relay GPIO write failed. `data` carries the relay id.
    RelayFault = 1,

    /// The analog output or its sample timer rejected a command.
    OutputFault = 2,

    /// Persistent storage read/write failed.
    StorageFault = 3,
}

impl FaultCode {
    /// Convert from raw u8 value.
    pub fn from_u8(value: u8) -> Self {
        match value {
            1 => FaultCode::RelayFault,
            2 => FaultCode::OutputFault,
            3 => FaultCode::StorageFault,
            _ => FaultCode::None,
        }
    }

    /// Short name for logs and dashboards.
    pub fn as_str(self) -> &'static str {
        match self {
            FaultCode::None => "none",
            FaultCode::RelayFault => "relay",
            FaultCode::OutputFault => "output",
            FaultCode::StorageFault => "storage",
        }
    }
}

/// Thread-safe fault state.
///
/// ```ignore
/// static FAULT: FaultState = FaultState::new();
///
/// // In a driver:
/// if pin.set_high().is_err() {
///     FAULT.set(FaultCode::RelayFault, relay_id);
/// }
///
/// // In the control loop:
/// if FAULT.is_active() {
///     actuators.stop_all();
/// }
/// ```
pub struct FaultState {
    /// True if fault is active.
    active: AtomicBool,

    /// Fault code (reason for fault).
    code: AtomicU8,

    /// Additional data (relay id, error code).
    data: AtomicU32,

    /// Total fault count since boot (never cleared).
    count: AtomicU32,
}

impl FaultState {
    /// Create new fault state (no fault).
    pub const fn new() -> Self {
        Self {
            active: AtomicBool::new(false),
            code: AtomicU8::new(0),
            data: AtomicU32::new(0),
            count: AtomicU32::new(0),
        }
    }

    /// Latch a fault with the given code and data.
    #[inline]
    pub fn set(&self, code: FaultCode, data: u32) {
        self.code.store(code as u8, Ordering::Release);
        self.data.store(data, Ordering::Release);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.active.store(true, Ordering::Release);
    }

    /// Check if fault is currently active.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Get fault code (only meaningful if `is_active()` is true).
    #[inline]
    pub fn code(&self) -> FaultCode {
        FaultCode::from_u8(self.code.load(Ordering::Acquire))
    }

    /// Get fault data (meaning depends on fault code).
    #[inline]
    pub fn data(&self) -> u32 {
        self.data.load(Ordering::Acquire)
    }

    /// Get total fault count since boot.
    #[inline]
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::Relaxed)
    }

    /// Clear fault state (after recovery).
    ///
    /// The counter is kept for diagnostics.
    #[inline]
    pub fn clear(&self) {
        self.active.store(false, Ordering::Release);
    }

    /// Get a snapshot of the current fault state.
    #[inline]
    pub fn snapshot(&self) -> FaultSnapshot {
        FaultSnapshot {
            active: self.is_active(),
            code: self.code(),
            data: self.data(),
            count: self.count(),
        }
    }
}

impl Default for FaultState {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of fault state at a point in time.
#[derive(Clone, Copy, Debug)]
pub struct FaultSnapshot {
    pub active: bool,
    pub code: FaultCode,
    pub data: u32,
    pub count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_latch_and_clear() {
        let fault = FaultState::new();

        assert!(!fault.is_active());
        assert_eq!(fault.code(), FaultCode::None);

        fault.set(FaultCode::RelayFault, 2);

        assert!(fault.is_active());
        assert_eq!(fault.code(), FaultCode::RelayFault);
        assert_eq!(fault.data(), 2);

        fault.clear();

        assert!(!fault.is_active());
        assert_eq!(fault.count(), 1);
    }

    #[test]
    fn test_fault_count_accumulates() {
        let fault = FaultState::new();

        fault.set(FaultCode::OutputFault, 0);
        fault.clear();
        fault.set(FaultCode::StorageFault, 7);

        let snap = fault.snapshot();
        assert!(snap.active);
        assert_eq!(snap.code, FaultCode::StorageFault);
        assert_eq!(snap.count, 2);
    }

    #[test]
    fn test_fault_code_roundtrip_unknown() {
        assert_eq!(FaultCode::from_u8(99), FaultCode::None);
        assert_eq!(FaultCode::from_u8(1).as_str(), "relay");
    }
}
