// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::{
    fs,
    path::Path,
    sync::OnceLock,
    thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// One parsed line of the daemon's log file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct LogLine {
    pub timestamp: String,

    pub level: String,

    pub logger: String,

    pub thread: String,

    pub message: String,
}

fn line_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2},\d{3}) (DEBUG|INFO|WARNING|ERROR|CRITICAL) (\S+) (\S+) : (.*)$",
        )
        .unwrap()
    })
}

pub fn parse_line(line: &str) -> Option<LogLine> {
    let caps = line_pattern().captures(line)?;
    Some(LogLine {
        timestamp: caps[1].to_string(),
        level: caps[2].to_string(),
        logger: caps[3].to_string(),
        thread: caps[4].to_string(),
        message: caps[5].to_string(),
    })
}

/// Parses every line of the file; fails on the first line that does not match the format.
pub fn read_log(path: &Path) -> anyhow::Result<Vec<LogLine>> {
    let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    text.lines()
        .map(|line| parse_line(line).ok_or_else(|| anyhow!("malformed log line: {line:?}")))
        .collect()
}

/// Polls the file until a line with `message` shows up.
pub fn wait_for_message(path: &Path, message: &str, timeout: Duration) -> anyhow::Result<LogLine> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Ok(lines) = read_log(path) {
            if let Some(line) = lines.into_iter().find(|l| l.message == message) {
                return Ok(line);
            }
        }
        if Instant::now() >= deadline {
            return Err(anyhow!(
                "{message:?} did not appear in {} within {timeout:?}",
                path.display()
            ));
        }
        thread::sleep(Duration::from_millis(20));
    }
}
