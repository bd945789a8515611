// SPDX-License-Identifier: Apache-2.0

//! Forwards `log` records from the library to `defmt`, so library and firmware messages share
//! one RTT stream.

use defmt::Display2Format;
use log::{Level, LevelFilter, Metadata, Record};

/// `log` backend printing through `defmt`
pub struct Logger {
    level: Level,
}

static LOGGER: Logger = Logger {
    level: Level::Debug,
};

/// Install the bridge. Call once, before interrupts are enabled.
pub fn init() {
    // SAFETY: called from the entry point before any interrupt can log
    unsafe { log::set_logger_racy(&LOGGER) }
        .map(|()| log::set_max_level(LevelFilter::Debug))
        .unwrap_or_else(|_| defmt::warn!("logger already installed"));
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let args = Display2Format(record.args());
        match record.level() {
            Level::Error => defmt::error!("{}", args),
            Level::Warn => defmt::warn!("{}", args),
            Level::Info => defmt::info!("{}", args),
            Level::Debug => defmt::debug!("{}", args),
            Level::Trace => defmt::trace!("{}", args),
        }
    }

    fn flush(&self) {}
}
