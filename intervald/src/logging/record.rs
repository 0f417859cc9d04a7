// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::OffsetDateTime;

use super::Severity;

// 2026-10-17 08:15:02,117
const TIMESTAMP_FORMAT: &[BorrowedFormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second],[subsecond digits:3]");

/// One log call, captured on the calling thread.
#[derive(Debug, Clone)]
pub struct LogRecord {
    pub timestamp: OffsetDateTime,
    pub level: Severity,
    pub logger: String,
    pub thread: String,
    pub message: String,
}

impl LogRecord {
    pub fn capture(level: Severity, logger: &str, message: &str) -> Self {
        Self {
            timestamp: OffsetDateTime::now_utc(),
            level,
            logger: logger.to_string(),
            thread: current_thread_name(),
            message: message.to_string(),
        }
    }

    /// `<timestamp> <LEVEL> <logger-name> <thread-name> : <message>`, shared by all sinks.
    pub fn format_line(&self) -> String {
        let timestamp = self
            .timestamp
            .format(TIMESTAMP_FORMAT)
            .unwrap_or_else(|_| self.timestamp.unix_timestamp().to_string());
        format!(
            "{} {} {} {} : {}",
            timestamp,
            self.level.as_str(),
            self.logger,
            self.thread,
            self.message
        )
    }
}

/// Name of the calling thread; unnamed threads are identified by their kernel tid.
pub fn current_thread_name() -> String {
    let current = std::thread::current();
    match current.name() {
        Some(name) => name.to_string(),
        None => format!("thread-{}", nix::unistd::gettid()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use regex::Regex;
    use time::macros::datetime;

    #[test]
    fn test_format_line() {
        let record = LogRecord {
            timestamp: datetime!(2026-10-17 08:15:02.117 UTC),
            level: Severity::Warning,
            logger: "intervald".into(),
            thread: "intervald-scheduler".into(),
            message: "Run of job \"x\" skipped".into(),
        };
        assert_eq!(
            record.format_line(),
            "2026-10-17 08:15:02,117 WARNING intervald intervald-scheduler : Run of job \"x\" skipped"
        );
    }

    #[test]
    fn test_capture_uses_thread_name() {
        let line = std::thread::Builder::new()
            .name("capture-test".into())
            .spawn(|| LogRecord::capture(Severity::Info, "app", "hello").format_line())
            .unwrap()
            .join()
            .unwrap();
        let re =
            Regex::new(r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2},\d{3} INFO app capture-test : hello$")
                .unwrap();
        assert!(re.is_match(&line), "unexpected line: {line}");
    }
}
