//! Serial port driver for console output and logging.
//!
//! COM1 through the 16550 UART. [`SerialLogger`] routes the `log` facade
//! here, one `[LEVEL] message` line per record.

use core::fmt;
use core::fmt::Write;
use spin::Mutex;
use uart_16550::SerialPort;

use crate::config::{DEBUG_ENABLED, DEBUG_SERIAL_PORT};

/// Global serial port (COM1).
pub static SERIAL1: Mutex<Option<SerialPort>> = Mutex::new(None);

/// Initialize COM1.
pub fn init() {
    let mut port = unsafe { SerialPort::new(DEBUG_SERIAL_PORT) };
    port.init();
    *SERIAL1.lock() = Some(port);
}

/// Write raw bytes to COM1.
pub fn write_bytes(bytes: &[u8]) {
    if let Some(ref mut serial) = *SERIAL1.lock() {
        for &byte in bytes {
            serial.send(byte);
        }
    }
}

/// Serial writer for formatting.
pub struct SerialWriter;

impl fmt::Write for SerialWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        write_bytes(s.as_bytes());
        Ok(())
    }
}

/// Print macro for serial output.
#[macro_export]
macro_rules! serial_print {
    ($($arg:tt)*) => {
        $crate::serial::_print(format_args!($($arg)*));
    };
}

/// Println macro for serial output.
#[macro_export]
macro_rules! serial_println {
    () => ($crate::serial_print!("\n"));
    ($($arg:tt)*) => {
        $crate::serial_print!("{}\n", format_args!($($arg)*));
    };
}

/// Internal print function.
#[doc(hidden)]
pub fn _print(args: fmt::Arguments) {
    // Kernel paths run with interrupts disabled, so the lock cannot be
    // re-entered from a trap.
    let _ = SerialWriter.write_fmt(args);
}

/// `log` backend writing to COM1.
pub struct SerialLogger;

static LOGGER: SerialLogger = SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &log::Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &log::Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let prefix = match record.level() {
            log::Level::Trace => "[TRACE]",
            log::Level::Debug => "[DEBUG]",
            log::Level::Info => "[INFO ]",
            log::Level::Warn => "[WARN ]",
            log::Level::Error => "[ERROR]",
        };
        serial_println!("{} {}", prefix, record.args());
    }

    fn flush(&self) {}
}

/// Install [`SerialLogger`] as the global logger.
///
/// Debug level in debug builds, info in release; trace with
/// `trace-syscalls`.
pub fn init_logger() {
    let level = if cfg!(feature = "trace-syscalls") {
        log::LevelFilter::Trace
    } else if DEBUG_ENABLED {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}
