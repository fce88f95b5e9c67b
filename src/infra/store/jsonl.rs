//! File-backed reservation store using JSON lines.
//!
//! One reservation per line. Stores rewrite a temporary sibling file and
//! rename it over the original.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use super::ReservationStore;
use crate::core::{Reservation, SchedulerError};

/// Reservations persisted in a `.jsonl` file.
#[derive(Debug, Clone)]
pub struct JsonlStore {
    path: PathBuf,
}

impl JsonlStore {
    /// Store at `path`; parent directories are created on demand.
    ///
    /// # Errors
    ///
    /// Parent directory cannot be created.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, SchedulerError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// File path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl ReservationStore for JsonlStore {
    fn load(&mut self) -> Result<Vec<Reservation>, SchedulerError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let file = OpenOptions::new().read(true).open(&self.path)?;
        let mut out = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let reservation: Reservation = serde_json::from_str(&line).map_err(|e| {
                SchedulerError::Backend(format!(
                    "{}:{}: {e}",
                    self.path.display(),
                    index + 1
                ))
            })?;
            out.push(reservation);
        }
        tracing::debug!(path = %self.path.display(), count = out.len(), "reservations loaded");
        Ok(out)
    }

    fn store(&mut self, reservations: &[Reservation]) -> Result<(), SchedulerError> {
        let tmp = self.tmp_path();
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for reservation in reservations {
                let line = serde_json::to_string(reservation)?;
                writeln!(writer, "{line}")?;
            }
            writer.flush()?;
        }
        std::fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), count = reservations.len(), "reservations stored");
        Ok(())
    }
}
