//! Append-only error log with size-based rotation.
//!
//! Every write is one `[YYYY-MM-DD HH:MM:SS] message` line. Rotation is only
//! checked when the gate initializes, never per write.
use crate::core::Result;
use chrono::Local;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

const LINE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";
const ROTATION_TIMESTAMP: &str = "%Y%m%d_%H%M%S";

#[derive(Debug)]
pub struct LogSink {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl LogSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates the log directory if it does not exist. Failures are ignored.
    pub fn ensure_dir(&self) {
        if let Some(dir) = self.path.parent() {
            if !dir.is_dir() {
                if let Err(e) = fs::create_dir_all(dir) {
                    debug!("Could not create log directory {:?}: {}", dir, e);
                }
            }
        }
    }

    /// Renames the log to `<file>.<timestamp>.bak` when it is larger than
    /// `max_size` bytes, leaving the next write to create a fresh file.
    ///
    /// Returns the backup path when a rotation happened.
    pub fn rotate_if_oversized(&self, max_size: u64) -> std::io::Result<Option<PathBuf>> {
        let size = match fs::metadata(&self.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e),
        };
        if size <= max_size {
            return Ok(None);
        }

        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let backup = self.backup_path(&Local::now().format(ROTATION_TIMESTAMP).to_string());
        fs::rename(&self.path, &backup)?;
        debug!("Rotated log {:?} ({} bytes) to {:?}", self.path, size, backup);
        Ok(Some(backup))
    }

    fn backup_path(&self, stamp: &str) -> PathBuf {
        let mut name = self.path.as_os_str().to_os_string();
        name.push(format!(".{}.bak", stamp));
        PathBuf::from(name)
    }

    /// Appends one timestamped line.
    pub fn try_write(&self, message: &str) -> Result<()> {
        self.ensure_dir();
        let line = format_line(&Local::now().format(LINE_TIMESTAMP).to_string(), message);

        let _guard = self.write_lock.lock().unwrap_or_else(|p| p.into_inner());
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Appends one timestamped line; a failing sink never reaches the caller.
    pub fn write(&self, message: &str) {
        if let Err(e) = self.try_write(message) {
            debug!("Dropped log line for {:?}: {}", self.path, e);
        }
    }
}

fn format_line(timestamp: &str, message: &str) -> String {
    format!("[{}] {}\n", timestamp, message)
}
