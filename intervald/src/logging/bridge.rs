// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::sync::Arc;

use log::{Log, Metadata, Record, SetLoggerError};

use super::{LoggingService, Severity};

/// Routes records of the `log` macros into the logging service. The record
/// target becomes the logger name.
pub struct LogBridge {
    service: Arc<LoggingService>,
}

impl LogBridge {
    pub fn new(service: Arc<LoggingService>) -> Self {
        Self { service }
    }
}

impl Log for LogBridge {
    fn enabled(&self, metadata: &Metadata) -> bool {
        self.service.enabled(Severity::from(metadata.level()))
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        self.service.log_as(
            record.target(),
            Severity::from(record.level()),
            &record.args().to_string(),
        );
    }

    fn flush(&self) {
        self.service.flush();
    }
}

/// Installs the bridge as the process-wide `log` logger. Fails if any logger
/// has been installed before.
pub fn install_log_bridge(service: Arc<LoggingService>) -> Result<(), SetLoggerError> {
    let max_level = service
        .threshold()
        .map(Severity::to_level_filter)
        .unwrap_or(log::LevelFilter::Off);
    log::set_boxed_logger(Box::new(LogBridge::new(service)))?;
    log::set_max_level(max_level);
    Ok(())
}
