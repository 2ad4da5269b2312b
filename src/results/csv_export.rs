//! CSV export of a [`ResultSet`].
//!
//! Writes to a temporary file next to the destination and renames it into
//! place on success, so a reader never sees a half-written table. A failed
//! export leaves the destination untouched.

use std::io::BufWriter;
use std::path::{Path, PathBuf};

use csv::Writer;
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::CensusError;
use crate::results::ResultSet;

/// CSV writer backed by a temp file that is persisted on `finish()` and
/// deleted if dropped first.
struct AtomicCsvWriter {
    writer: Writer<BufWriter<NamedTempFile>>,
    final_path: PathBuf,
}

impl AtomicCsvWriter {
    fn new(final_path: &Path) -> Result<Self, CensusError> {
        let parent_dir = match final_path.parent() {
            Some(p) if p.as_os_str().is_empty() => Path::new("."),
            Some(p) => p,
            None => {
                return Err(CensusError::Configuration(format!(
                    "Cannot determine parent directory for: {}",
                    final_path.display()
                )))
            }
        };

        let temp_file = NamedTempFile::new_in(parent_dir)
            .map_err(|e| CensusError::Internal(format!("Failed to create temporary file: {}", e)))?;

        Ok(Self {
            writer: Writer::from_writer(BufWriter::new(temp_file)),
            final_path: final_path.to_path_buf(),
        })
    }

    fn write_record(&mut self, record: &[String]) -> Result<(), CensusError> {
        self.writer
            .write_record(record)
            .map_err(|e| CensusError::Internal(format!("Failed to write CSV record: {}", e)))
    }

    fn finish(self) -> Result<PathBuf, CensusError> {
        let buf_writer = self.writer.into_inner().map_err(|e| {
            CensusError::Internal(format!("Failed to flush CSV writer: {}", e.error()))
        })?;

        let named_temp = buf_writer
            .into_inner()
            .map_err(|e| CensusError::Internal(format!("Failed to flush buffer: {}", e.error())))?;

        named_temp.persist(&self.final_path).map_err(|e| {
            CensusError::Internal(format!(
                "Failed to persist file to {}: {}",
                self.final_path.display(),
                e.error
            ))
        })?;

        Ok(self.final_path)
    }
}

impl ResultSet {
    /// Writes the table as CSV (header row, then data rows) to `path`,
    /// replacing any existing file.
    ///
    /// # Errors
    ///
    /// - `CensusError::Configuration` if `path` has no parent directory
    /// - `CensusError::Internal` for I/O failures
    pub fn write_csv(&self, path: impl AsRef<Path>) -> Result<PathBuf, CensusError> {
        let mut writer = AtomicCsvWriter::new(path.as_ref())?;

        writer.write_record(self.columns())?;
        for row in self.rows() {
            writer.write_record(row)?;
        }

        let written = writer.finish()?;
        info!(
            "[EXPORT] Wrote {} rows x {} columns to {:?}",
            self.len(),
            self.columns().len(),
            written
        );
        Ok(written)
    }
}
