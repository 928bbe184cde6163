//! On/off relay with idempotent switching.

use embedded_hal::digital::OutputPin;

use crate::fault::{FaultCode, FaultState};

/// Relay powering the acoustic amplifier.
pub const RELAY_ACOUSTIC: u8 = 0;

/// Relay driving the secondary actuator.
pub const RELAY_SECONDARY: u8 = 1;

/// A relay coil behind one GPIO.
///
/// Redundant `on()`/`off()` calls do not touch the pin. A failed pin write
/// latches [`FaultCode::RelayFault`] with the relay id; the tracked state
/// only changes when the write succeeded.
pub struct Relay<'a, P> {
    pin: P,
    id: u8,
    on: bool,
    fault: &'a FaultState,
}

impl<'a, P: OutputPin> Relay<'a, P> {
    pub fn new(pin: P, id: u8, fault: &'a FaultState) -> Self {
        Self { pin, id, on: false, fault }
    }

    /// Drive the coil low regardless of the tracked state.
    pub fn begin(&mut self) {
        if self.pin.set_low().is_ok() {
            self.on = false;
        } else {
            self.fault.set(FaultCode::RelayFault, self.id as u32);
        }
    }

    pub fn on(&mut self) {
        if self.on {
            return;
        }
        if self.pin.set_high().is_ok() {
            self.on = true;
        } else {
            self.fault.set(FaultCode::RelayFault, self.id as u32);
        }
    }

    pub fn off(&mut self) {
        if !self.on {
            return;
        }
        if self.pin.set_low().is_ok() {
            self.on = false;
        } else {
            self.fault.set(FaultCode::RelayFault, self.id as u32);
        }
    }

    #[inline]
    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn pin(&self) -> &P {
        &self.pin
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::sim::SimPin;

    #[derive(Debug)]
    struct BrokenPin;

    impl embedded_hal::digital::ErrorType for BrokenPin {
        type Error = embedded_hal::digital::ErrorKind;
    }

    impl OutputPin for BrokenPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            Err(embedded_hal::digital::ErrorKind::Other)
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            Err(embedded_hal::digital::ErrorKind::Other)
        }
    }

    #[test]
    fn test_on_off_idempotent() {
        let fault = FaultState::new();
        let mut relay = Relay::new(SimPin::new(), RELAY_SECONDARY, &fault);
        relay.on();
        relay.on();
        assert!(relay.is_on());
        assert!(relay.pin().is_high());
        relay.off();
        relay.off();
        assert!(!relay.is_on());
        assert!(!relay.pin().is_high());
        assert!(!fault.is_active());
    }

    #[test]
    fn test_failed_write_latches_fault() {
        let fault = FaultState::new();
        let mut relay = Relay::new(BrokenPin, RELAY_ACOUSTIC, &fault);
        relay.on();
        assert!(!relay.is_on());
        assert!(fault.is_active());
        assert_eq!(fault.code(), FaultCode::RelayFault);
        assert_eq!(fault.data(), RELAY_ACOUSTIC as u32);
    }
}
