use chrono::Local;
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError};

const ANSI_RESET: &str = "\x1b[0m";
const DIM_COLOR: &str = "\x1b[2m";
const YELLOW_COLOR: &str = "\x1b[38;5;226m";
const RED_COLOR: &str = "\x1b[38;5;196m";

/// Timestamped stdout logger for the transfer binaries.
pub struct PrtpLogger;

static LOGGER: PrtpLogger = PrtpLogger;

impl PrtpLogger {
    /// Installs the logger as the global `log` backend.
    pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
        log::set_logger(&LOGGER)?;
        log::set_max_level(level);
        Ok(())
    }
}

impl Log for PrtpLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let now = Local::now();
        let color = match record.level() {
            Level::Error => RED_COLOR,
            Level::Warn => YELLOW_COLOR,
            Level::Info => ANSI_RESET,
            Level::Debug | Level::Trace => DIM_COLOR,
        };
        println!(
            "{}[{} {:5}] {}{}",
            color,
            now.format("%H:%M:%S%.3f"),
            record.level(),
            record.args(),
            ANSI_RESET
        );
    }

    fn flush(&self) {}
}
