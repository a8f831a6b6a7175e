/*
 * Kernel Logging System
 *
 * Backend for the `log` facade. The kernel core has no serial port of
 * its own, so the logger writes finished lines through a sink function
 * the embedder supplies (serial console on hardware, stderr in the
 * host test build).
 */

use log::{Level, LevelFilter, Metadata, Record};
use spin::Mutex;

/// Destination for finished log lines.
pub type LogSink = fn(&str);

struct CoreLogger {
    sink: Mutex<Option<LogSink>>,
}

impl log::Log for CoreLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Some(sink) = *self.sink.lock() {
            let line = alloc::format!("[{}] {}", record.level(), record.args());
            sink(&line);
        }
    }

    fn flush(&self) {}
}

static LOGGER: CoreLogger = CoreLogger {
    sink: Mutex::new(None),
};

/// Install the logger with the given sink. Safe to call more than
/// once; later calls just swap the sink.
pub fn init(sink: LogSink) {
    *LOGGER.sink.lock() = Some(sink);

    // set_logger fails when a logger is already installed, which is
    // exactly the re-init case; the sink swap above still applies.
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(LevelFilter::Info);
    }
}
