//! Append-only text log of received packets.
//!
//! One line per entry: `YYYYMMDDHHMMSS <text>`, timestamps in UTC.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use chrono::{DateTime, Utc};

use crate::types::{CoreError, Result};

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

#[derive(Debug, Default)]
pub struct PacketLog {
    file: Option<File>,
}

impl PacketLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open `path` for appending, creating it and its parent directories.
    pub fn append(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        self.file = Some(file);
        Ok(())
    }

    pub fn write_entry(&mut self, timestamp: DateTime<Utc>, text: &str) -> Result<()> {
        let file = self.file.as_mut().ok_or(CoreError::LogNotOpen)?;
        writeln!(file, "{} {}", timestamp.format(TIMESTAMP_FORMAT), text)?;
        Ok(())
    }

    /// [`write_entry`](Self::write_entry) stamped with the current time.
    pub fn write_now(&mut self, text: &str) -> Result<()> {
        self.write_entry(Utc::now(), text)
    }

    pub fn is_ready(&self) -> bool {
        self.file.is_some()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, h, m, s).unwrap()
    }

    #[test]
    fn test_write_before_append_fails() {
        let mut log = PacketLog::new();
        assert!(!log.is_ready());
        let err = log.write_entry(at(0, 0, 0), "x").unwrap_err();
        assert!(matches!(err, CoreError::LogNotOpen));
    }

    #[test]
    fn test_entries_are_appended() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("ais.txt");

        let mut log = PacketLog::new();
        log.append(&path).unwrap();
        log.write_entry(at(12, 30, 5), "244660000 1").unwrap();
        log.write_entry(at(12, 30, 6), "244660000 3").unwrap();

        // Re-opening keeps earlier lines.
        let mut again = PacketLog::new();
        again.append(&path).unwrap();
        again.write_entry(at(13, 0, 0), "done").unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(
            text,
            "20240309123005 244660000 1\n20240309123006 244660000 3\n20240309130000 done\n"
        );
    }
}
