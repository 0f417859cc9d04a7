// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

//! # Logging service
//!
//! One `LoggingService` per process (provisioned through the singleton
//! provider) fans each record out to its sinks:
//!
//! ```text
//!         debug/info/warning/error/critical
//!                        |
//!              +---------v----------+
//!              |   LoggingService   |  threshold, shared line format
//!              +----+----------+----+
//!                   |          |
//!         +---------v---+  +---v---------+
//!         | RotatingFile|  |   Console   |  own threshold, own lock
//!         +-------------+  +-------------+
//! ```
//!
//! Sink failures never reach the caller. They are counted and the record is
//! dropped for that sink only.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;

use clap::ValueEnum;
use serde::Serialize;

pub mod bridge;
pub mod console;
pub mod record;
pub mod rotating_file;

pub use bridge::{install_log_bridge, LogBridge};
pub use console::ConsoleSink;
pub use record::LogRecord;
pub use rotating_file::RotatingFileSink;

pub const DEFAULT_LOGGER_NAME: &str = "intervald";
pub const DEFAULT_LOG_FILE: &str = "error.log";
pub const DEFAULT_MAX_BYTES: u64 = 10_000_000;
pub const DEFAULT_BACKUP_COUNT: usize = 5;

#[derive(
    Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, ValueEnum, Default, Serialize,
)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Debug,
    #[default]
    Info,
    #[value(alias = "warn")]
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
            Severity::Critical => "CRITICAL",
        }
    }

    /// `log` has no critical level, it collapses into error.
    pub fn to_log_level(self) -> log::Level {
        match self {
            Severity::Debug => log::Level::Debug,
            Severity::Info => log::Level::Info,
            Severity::Warning => log::Level::Warn,
            Severity::Error | Severity::Critical => log::Level::Error,
        }
    }

    pub fn to_level_filter(self) -> log::LevelFilter {
        self.to_log_level().to_level_filter()
    }
}

impl From<log::Level> for Severity {
    fn from(level: log::Level) -> Self {
        match level {
            log::Level::Error => Severity::Error,
            log::Level::Warn => Severity::Warning,
            log::Level::Info => Severity::Info,
            log::Level::Debug | log::Level::Trace => Severity::Debug,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The logging capability handed to the scheduler and to jobs.
pub trait LogFacility: Send + Sync {
    fn log(&self, level: Severity, message: &str);

    fn debug(&self, message: &str) {
        self.log(Severity::Debug, message)
    }

    fn info(&self, message: &str) {
        self.log(Severity::Info, message)
    }

    fn warning(&self, message: &str) {
        self.log(Severity::Warning, message)
    }

    fn error(&self, message: &str) {
        self.log(Severity::Error, message)
    }

    fn critical(&self, message: &str) {
        self.log(Severity::Critical, message)
    }
}

pub trait Sink: Send + Sync {
    /// Records below this level are not handed to the sink.
    fn threshold(&self) -> Severity;

    /// Writes one already formatted line. Implementations serialise their own writes.
    fn write_record(&self, record: &LogRecord, line: &str) -> io::Result<()>;

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub logger_name: String,
    pub threshold: Severity,
    pub file_path: PathBuf,
    pub max_bytes: u64,
    pub backup_count: usize,
    pub console: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            logger_name: DEFAULT_LOGGER_NAME.to_string(),
            threshold: Severity::Info,
            file_path: PathBuf::from(DEFAULT_LOG_FILE),
            max_bytes: DEFAULT_MAX_BYTES,
            backup_count: DEFAULT_BACKUP_COUNT,
            console: true,
        }
    }
}

struct SinkSet {
    threshold: Severity,
    sinks: Vec<Box<dyn Sink>>,
}

pub struct LoggingService {
    name: String,
    // set once; every call before that is a no-op
    sink_set: OnceLock<SinkSet>,
    dropped_writes: AtomicU64,
}

impl LoggingService {
    /// An unconfigured service. Logging on it does nothing until sinks are attached.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sink_set: OnceLock::new(),
            dropped_writes: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &LoggingConfig) -> io::Result<Self> {
        let service = Self::new(config.logger_name.clone());
        service.configure(config)?;
        Ok(service)
    }

    /// Opens the rotating file and (optionally) the console sink, both at the
    /// configured threshold. A second call leaves the first configuration in place.
    pub fn configure(&self, config: &LoggingConfig) -> io::Result<()> {
        if self.is_configured() {
            return Ok(());
        }
        let mut sinks: Vec<Box<dyn Sink>> = Vec::with_capacity(2);
        sinks.push(Box::new(RotatingFileSink::open(
            &config.file_path,
            config.max_bytes,
            config.backup_count,
            config.threshold,
        )?));
        if config.console {
            sinks.push(Box::new(ConsoleSink::stderr(config.threshold)));
        }
        self.attach_sinks(config.threshold, sinks);
        Ok(())
    }

    /// Returns false if the service already had sinks; the given ones are dropped then.
    pub fn attach_sinks(&self, threshold: Severity, sinks: Vec<Box<dyn Sink>>) -> bool {
        self.sink_set.set(SinkSet { threshold, sinks }).is_ok()
    }

    pub fn is_configured(&self) -> bool {
        self.sink_set.get().is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn threshold(&self) -> Option<Severity> {
        self.sink_set.get().map(|set| set.threshold)
    }

    pub fn enabled(&self, level: Severity) -> bool {
        match self.sink_set.get() {
            Some(set) => level >= set.threshold,
            None => false,
        }
    }

    /// Number of sink writes that failed and were dropped.
    pub fn dropped_writes(&self) -> u64 {
        self.dropped_writes.load(Ordering::Relaxed)
    }

    /// Logs under an explicit logger name (used by the `log` bridge).
    pub fn log_as(&self, logger: &str, level: Severity, message: &str) {
        let Some(set) = self.sink_set.get() else {
            return;
        };
        if level < set.threshold {
            return;
        }

        let record = LogRecord::capture(level, logger, message);
        let line = record.format_line();
        for sink in set.sinks.iter() {
            if level < sink.threshold() {
                continue;
            }
            if sink.write_record(&record, &line).is_err() {
                self.dropped_writes.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn flush(&self) {
        if let Some(set) = self.sink_set.get() {
            for sink in set.sinks.iter() {
                if sink.flush().is_err() {
                    self.dropped_writes.fetch_add(1, Ordering::Relaxed);
                }
            }
        }
    }
}

impl LogFacility for LoggingService {
    fn log(&self, level: Severity, message: &str) {
        self.log_as(&self.name, level, message)
    }
}

impl std::fmt::Debug for LoggingService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingService")
            .field("name", &self.name)
            .field("threshold", &self.threshold())
            .field("dropped_writes", &self.dropped_writes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use std::fs;
    use std::sync::{Arc, Mutex};
    use std::thread;
    use tempfile::TempDir;

    struct FailingSink;

    impl Sink for FailingSink {
        fn threshold(&self) -> Severity {
            Severity::Debug
        }

        fn write_record(&self, _record: &LogRecord, _line: &str) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "disk full"))
        }
    }

    #[derive(Default)]
    struct MemorySink {
        threshold: Severity,
        lines: Mutex<Vec<String>>,
    }

    impl Sink for Arc<MemorySink> {
        fn threshold(&self) -> Severity {
            self.threshold
        }

        fn write_record(&self, _record: &LogRecord, line: &str) -> io::Result<()> {
            self.lines.lock().unwrap().push(line.to_string());
            Ok(())
        }
    }

    fn file_config(temp: &TempDir) -> LoggingConfig {
        LoggingConfig {
            file_path: temp.path().join("error.log"),
            console: false,
            ..LoggingConfig::default()
        }
    }

    #[test]
    fn test_unconfigured_service_is_a_noop() {
        let service = LoggingService::new("app");
        service.info("nobody listens");
        service.critical("still nobody");
        assert!(!service.is_configured());
        assert!(!service.enabled(Severity::Critical));
        assert_eq!(service.dropped_writes(), 0);
    }

    #[test]
    fn test_threshold_filters_debug() {
        let temp = TempDir::new().unwrap();
        let service = LoggingService::from_config(&file_config(&temp)).unwrap();

        service.debug("hidden");
        service.info("shown");
        service.warning("warned");
        service.error("failed");
        service.critical("fatal");

        let content = fs::read_to_string(temp.path().join("error.log")).unwrap();
        let levels: Vec<&str> = content
            .lines()
            .map(|line| line.split(' ').nth(2).unwrap())
            .collect();
        assert_eq!(levels, vec!["INFO", "WARNING", "ERROR", "CRITICAL"]);
        assert!(!content.contains("hidden"));
    }

    #[test]
    fn test_file_line_format() {
        let temp = TempDir::new().unwrap();
        let service = LoggingService::from_config(&file_config(&temp)).unwrap();

        thread::Builder::new()
            .name("worker-7".into())
            .spawn({
                let service = Arc::new(service);
                move || service.info("Application created.")
            })
            .unwrap()
            .join()
            .unwrap();

        let content = fs::read_to_string(temp.path().join("error.log")).unwrap();
        let re = Regex::new(
            r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2},\d{3} INFO intervald worker-7 : Application created\.\n$",
        )
        .unwrap();
        assert!(re.is_match(&content), "unexpected content: {content}");
    }

    #[test]
    fn test_second_configure_keeps_first() {
        let temp = TempDir::new().unwrap();
        let service = LoggingService::from_config(&file_config(&temp)).unwrap();

        let other = LoggingConfig {
            file_path: temp.path().join("other.log"),
            console: false,
            ..LoggingConfig::default()
        };
        service.configure(&other).unwrap();
        service.info("first sink only");

        assert!(!temp.path().join("other.log").exists());
        assert!(fs::read_to_string(temp.path().join("error.log"))
            .unwrap()
            .contains("first sink only"));
    }

    #[test]
    fn test_failing_sink_does_not_block_others() {
        let memory = Arc::new(MemorySink::default());
        let service = LoggingService::new("app");
        assert!(service.attach_sinks(
            Severity::Info,
            vec![Box::new(FailingSink), Box::new(memory.clone())],
        ));

        service.error("still delivered");

        assert_eq!(service.dropped_writes(), 1);
        let lines = memory.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains(" ERROR app "));
        assert!(lines[0].ends_with(" : still delivered"));
    }

    #[test]
    fn test_sink_threshold_is_respected() {
        let info = Arc::new(MemorySink::default());
        let errors = Arc::new(MemorySink {
            threshold: Severity::Error,
            ..MemorySink::default()
        });
        let service = LoggingService::new("app");
        service.attach_sinks(
            Severity::Debug,
            vec![Box::new(info.clone()), Box::new(errors.clone())],
        );

        service.info("routine");
        service.critical("alarm");

        assert_eq!(info.lines.lock().unwrap().len(), 2);
        let errors = errors.lines.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("CRITICAL app"));
    }

    #[test]
    fn test_concurrent_logging_keeps_records_whole() {
        let temp = TempDir::new().unwrap();
        let service = Arc::new(LoggingService::from_config(&file_config(&temp)).unwrap());

        let handles: Vec<_> = (0..8)
            .map(|n| {
                let service = service.clone();
                thread::Builder::new()
                    .name(format!("writer-{n}"))
                    .spawn(move || {
                        for i in 0..50 {
                            service.info(&format!("message {i} from writer {n}"));
                        }
                    })
                    .unwrap()
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let content = fs::read_to_string(temp.path().join("error.log")).unwrap();
        let re = Regex::new(r"^\S+ \S+ INFO intervald writer-(\d) : message \d+ from writer (\d)$")
            .unwrap();
        let mut count = 0;
        for line in content.lines() {
            let caps = re.captures(line).unwrap_or_else(|| panic!("broken line {line}"));
            assert_eq!(&caps[1], &caps[2]);
            count += 1;
        }
        assert_eq!(count, 400);
    }
}
