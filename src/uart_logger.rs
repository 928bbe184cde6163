//! UART log output.
//!
//! Drains [`LOG_STREAM`](crate::log_globals::LOG_STREAM) at the end of each
//! control cycle and writes the lines to UART0 (the USB bridge on most
//! ESP32 dev boards).
//!
//! ```text
//! ESP32 GPIO1 (TX) ──────▶ USB-UART RX
//!                           └─▶ PC Serial Monitor
//! ```

use crate::logging::{BufWriter, LogEntry};

#[cfg(target_os = "espidf")]
use crate::log_globals::LOG_STREAM;

#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::gpio;
#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::peripheral::Peripheral;
#[cfg(target_os = "espidf")]
use esp_idf_svc::hal::uart::{self, UartTxDriver};

/// UART configuration for logging.
pub struct UartLoggerConfig {
    pub baud_rate: u32,
}

impl Default for UartLoggerConfig {
    fn default() -> Self {
        Self { baud_rate: 115200 }
    }
}

/// Most entries written per drain call, so one cycle never stalls on logs.
pub const MAX_LINES_PER_DRAIN: usize = 8;

/// Format log entry as `[timestamp_ms] LEVEL: message\n`.
pub fn format_log_entry(entry: &LogEntry, buf: &mut [u8]) -> usize {
    use core::fmt::Write;

    let mut writer = BufWriter { buf, pos: 0 };
    let _ = write!(
        writer,
        "[{:10}] {}: {}\n",
        entry.timestamp_ms,
        entry.level.as_str(),
        entry.text()
    );
    writer.pos
}

/// Format the dropped-messages notice.
pub fn format_dropped(dropped: u32, buf: &mut [u8]) -> usize {
    use core::fmt::Write;

    let mut writer = BufWriter { buf, pos: 0 };
    let _ = write!(writer, "[WARN] log dropped: {}\n", dropped);
    writer.pos
}

/// Initialize UART0 TX-only for logging output.
#[cfg(target_os = "espidf")]
pub fn init_uart_logger<'d>(
    uart: impl Peripheral<P = uart::UART0> + 'd,
    tx_pin: impl Peripheral<P = impl gpio::OutputPin> + 'd,
    config: &UartLoggerConfig,
) -> Result<UartTxDriver<'d>, esp_idf_svc::sys::EspError> {
    let uart_config =
        uart::config::Config::default().baudrate(esp_idf_svc::hal::units::Hertz(config.baud_rate));

    UartTxDriver::new(
        uart,
        tx_pin,
        Option::<gpio::AnyIOPin>::None, // CTS
        Option::<gpio::AnyIOPin>::None, // RTS
        &uart_config,
    )
}

/// Write pending entries to UART. Called once per control cycle.
#[cfg(target_os = "espidf")]
pub fn drain_to_uart(uart: &mut UartTxDriver<'_>) {
    let mut format_buf = [0u8; 160];

    for _ in 0..MAX_LINES_PER_DRAIN {
        let Some(entry) = LOG_STREAM.drain() else {
            break;
        };
        let len = format_log_entry(&entry, &mut format_buf);
        let _ = uart.write(&format_buf[..len]);
    }

    let dropped = LOG_STREAM.dropped();
    if dropped > 0 && LOG_STREAM.pending() == 0 {
        let len = format_dropped(dropped, &mut format_buf);
        let _ = uart.write(&format_buf[..len]);
        LOG_STREAM.reset_dropped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, MAX_MSG_LEN};

    fn entry(timestamp_ms: u32, level: LogLevel, text: &[u8]) -> LogEntry {
        let mut msg = [0u8; MAX_MSG_LEN];
        msg[..text.len()].copy_from_slice(text);
        LogEntry {
            timestamp_ms,
            level,
            len: text.len() as u8,
            msg,
        }
    }

    #[test]
    fn test_format_log_entry() {
        let e = entry(1234567, LogLevel::Info, b"state OFF -> IDLE");
        let mut buf = [0u8; 160];
        let len = format_log_entry(&e, &mut buf);

        let formatted = core::str::from_utf8(&buf[..len]).unwrap();
        assert_eq!(formatted, "[   1234567] INFO: state OFF -> IDLE\n");
    }

    #[test]
    fn test_format_uses_len_only() {
        let mut e = entry(999, LogLevel::Error, b"TEST12345X");
        e.len = 5;
        let mut buf = [0u8; 160];
        let len = format_log_entry(&e, &mut buf);

        let formatted = core::str::from_utf8(&buf[..len]).unwrap();
        assert!(formatted.contains("ERROR"));
        assert!(formatted.contains("TEST1"));
        assert!(!formatted.contains('X'));
    }

    #[test]
    fn test_format_dropped() {
        let mut buf = [0u8; 64];
        let len = format_dropped(3, &mut buf);
        assert_eq!(&buf[..len], b"[WARN] log dropped: 3\n");
    }
}
