//! Global log stream and fault latch.
//!
//! The control loop is the only regular producer on [`LOG_STREAM`]; the UART
//! drain at the end of each cycle is the only consumer.

use crate::fault::FaultState;
use crate::logging::LogStream;

/// System log stream.
pub static LOG_STREAM: LogStream = LogStream::new();

/// Hardware/storage fault latch checked by the control loop every cycle.
pub static FAULT: FaultState = FaultState::new();
