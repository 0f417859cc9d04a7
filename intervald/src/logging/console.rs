// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::io::{self, Write};

use env_logger::Target;
use log::{LevelFilter, Log};

use super::record::LogRecord;
use super::{Severity, Sink};

/// Console output. Lines are formatted by the service; env_logger only does the
/// buffered, one-write-per-record output to stderr (or a pipe).
pub struct ConsoleSink {
    threshold: Severity,
    inner: env_logger::Logger,
}

impl ConsoleSink {
    pub fn stderr(threshold: Severity) -> Self {
        Self::with_target(threshold, Target::Stderr)
    }

    pub fn with_target(threshold: Severity, target: Target) -> Self {
        let inner = env_logger::Builder::new()
            .target(target)
            .filter_level(LevelFilter::Trace)
            .format(|buf, record| writeln!(buf, "{}", record.args()))
            .build();
        Self { threshold, inner }
    }
}

impl std::fmt::Debug for ConsoleSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleSink")
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl Sink for ConsoleSink {
    fn threshold(&self) -> Severity {
        self.threshold
    }

    fn write_record(&self, record: &LogRecord, line: &str) -> io::Result<()> {
        self.inner.log(
            &log::Record::builder()
                .args(format_args!("{}", line))
                .level(record.level.to_log_level())
                .target(&record.logger)
                .build(),
        );
        Ok(())
    }

    fn flush(&self) -> io::Result<()> {
        self.inner.flush();
        Ok(())
    }
}
