// SPDX-License-Identifier: MIT
//
// Author: Johannes Leupolz <dev@leupolz.eu>

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::record::LogRecord;
use super::{Severity, Sink};

/// Size-bounded log file. Once the active file would reach `max_bytes`, it is
/// renamed to `<path>.1` (older backups shift up to `<path>.<backup_count>`,
/// anything beyond is dropped) and writing continues in a fresh file.
#[derive(Debug)]
pub struct RotatingFileSink {
    path: PathBuf,
    max_bytes: u64,
    backup_count: usize,
    threshold: Severity,
    active: Mutex<ActiveFile>,
}

#[derive(Debug)]
struct ActiveFile {
    // None after a failed rotation, reopened on the next write
    file: Option<File>,
    size: u64,
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

impl RotatingFileSink {
    pub fn open(
        path: impl Into<PathBuf>,
        max_bytes: u64,
        backup_count: usize,
        threshold: Severity,
    ) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path,
            max_bytes,
            backup_count,
            threshold,
            active: Mutex::new(ActiveFile {
                file: Some(file),
                size,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<path>.<index>`, e.g. `error.log.2`
    pub fn backup_path(&self, index: usize) -> PathBuf {
        let mut name = self.path.as_os_str().to_owned();
        name.push(format!(".{index}"));
        PathBuf::from(name)
    }

    fn should_rotate(&self, active: &ActiveFile, incoming: u64) -> bool {
        self.max_bytes > 0 && active.size > 0 && active.size + incoming >= self.max_bytes
    }

    fn rotate(&self, active: &mut ActiveFile) -> io::Result<()> {
        // close before renaming
        active.file = None;

        if self.backup_count == 0 {
            let file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
            active.file = Some(file);
            active.size = 0;
            return Ok(());
        }

        for index in (1..self.backup_count).rev() {
            let source = self.backup_path(index);
            if source.exists() {
                // rename replaces an existing destination, which drops the oldest backup
                fs::rename(&source, self.backup_path(index + 1))?;
            }
        }
        if self.path.exists() {
            fs::rename(&self.path, self.backup_path(1))?;
        }

        active.file = Some(open_append(&self.path)?);
        active.size = 0;
        Ok(())
    }

    /// Appends one line. Rotation and the write happen under the same lock, so a
    /// line ends up either in the old or in the new file, never split.
    pub fn write_line(&self, line: &str) -> io::Result<()> {
        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        let incoming = buf.len() as u64;

        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if self.should_rotate(&active, incoming) {
            self.rotate(&mut active)?;
        }

        if active.file.is_none() {
            let file = open_append(&self.path)?;
            active.size = file.metadata()?.len();
            active.file = Some(file);
        }

        if let Some(file) = active.file.as_mut() {
            file.write_all(buf.as_bytes())?;
        }
        active.size += incoming;
        Ok(())
    }
}

impl Sink for RotatingFileSink {
    fn threshold(&self) -> Severity {
        self.threshold
    }

    fn write_record(&self, _record: &LogRecord, line: &str) -> io::Result<()> {
        self.write_line(line)
    }

    fn flush(&self) -> io::Result<()> {
        let mut active = self
            .active
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match active.file.as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;
    use tempfile::TempDir;

    fn line_of(len: usize, fill: char) -> String {
        std::iter::repeat(fill).take(len).collect()
    }

    #[test]
    fn test_appends_to_existing_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("error.log");
        fs::write(&path, "existing\n").unwrap();

        let sink = RotatingFileSink::open(&path, 1_000, 2, Severity::Info).unwrap();
        sink.write_line("appended").unwrap();

        assert_eq!(fs::read_to_string(&path).unwrap(), "existing\nappended\n");
        assert!(!sink.backup_path(1).exists());
    }

    #[test]
    fn test_rotates_when_size_exceeded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("error.log");
        let sink = RotatingFileSink::open(&path, 100, 3, Severity::Info).unwrap();

        // 60 + 1 bytes each, the second line does not fit anymore
        sink.write_line(&line_of(60, 'a')).unwrap();
        sink.write_line(&line_of(60, 'b')).unwrap();

        let backup = fs::read_to_string(sink.backup_path(1)).unwrap();
        let active = fs::read_to_string(&path).unwrap();
        assert_eq!(backup, format!("{}\n", line_of(60, 'a')));
        assert_eq!(active, format!("{}\n", line_of(60, 'b')));
    }

    #[test]
    fn test_backup_chain_is_bounded() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("error.log");
        let sink = RotatingFileSink::open(&path, 50, 2, Severity::Info).unwrap();

        // every line forces a rotation of the previous one
        for fill in ['a', 'b', 'c', 'd', 'e'] {
            sink.write_line(&line_of(40, fill)).unwrap();
        }

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("{}\n", line_of(40, 'e'))
        );
        assert_eq!(
            fs::read_to_string(sink.backup_path(1)).unwrap(),
            format!("{}\n", line_of(40, 'd'))
        );
        assert_eq!(
            fs::read_to_string(sink.backup_path(2)).unwrap(),
            format!("{}\n", line_of(40, 'c'))
        );
        assert!(!sink.backup_path(3).exists());

        let files = fs::read_dir(temp.path()).unwrap().count();
        assert_eq!(files, 3);
    }

    #[test]
    fn test_zero_backups_truncates() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("error.log");
        let sink = RotatingFileSink::open(&path, 50, 0, Severity::Info).unwrap();

        sink.write_line(&line_of(40, 'a')).unwrap();
        sink.write_line(&line_of(40, 'b')).unwrap();

        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            format!("{}\n", line_of(40, 'b'))
        );
        assert!(!sink.backup_path(1).exists());
    }

    #[test]
    fn test_oversized_line_goes_to_empty_file() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("error.log");
        let sink = RotatingFileSink::open(&path, 10, 1, Severity::Info).unwrap();

        sink.write_line(&line_of(30, 'x')).unwrap();

        assert!(!sink.backup_path(1).exists());
        assert_eq!(fs::read_to_string(&path).unwrap().len(), 31);
    }

    #[test]
    fn test_concurrent_writers_never_split_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("error.log");
        let sink = Arc::new(RotatingFileSink::open(&path, 2_000, 50, Severity::Info).unwrap());

        let handles: Vec<_> = ['a', 'b', 'c', 'd']
            .into_iter()
            .map(|fill| {
                let sink = sink.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        sink.write_line(&line_of(63, fill)).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut lines = 0;
        for entry in fs::read_dir(temp.path()).unwrap() {
            let content = fs::read_to_string(entry.unwrap().path()).unwrap();
            for line in content.lines() {
                assert_eq!(line.len(), 63);
                let first = line.chars().next().unwrap();
                assert!(line.chars().all(|c| c == first), "interleaved line {line}");
                lines += 1;
            }
        }
        assert_eq!(lines, 400);
    }
}
