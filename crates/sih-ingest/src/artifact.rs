//! Columnar artifact persistence.

use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::Local;
use polars::io::parquet::write::BatchedWriter;
use polars::prelude::{DataFrame, ParquetCompression, ParquetReader, ParquetWriter, SerReader};
use tracing::info;

use crate::error::{IngestError, Result};

/// Writes `df` to `path` as parquet, creating parent directories.
///
/// The file is written under a temporary name and renamed into place.
pub fn write_parquet(df: &mut DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| IngestError::io(parent, e))?;
    }
    let staging = path.with_extension("parquet.partial");
    let file = File::create(&staging).map_err(|e| IngestError::io(&staging, e))?;
    ParquetWriter::new(file)
        .with_compression(ParquetCompression::Snappy)
        .finish(df)
        .map_err(|e| IngestError::Write {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    std::fs::rename(&staging, path).map_err(|e| IngestError::io(path, e))?;
    Ok(())
}

/// Streams frames into one parquet artifact, a row group per batch.
///
/// Nothing touches `path` until [`ArtifactWriter::finish`]; batches go to a
/// staging file that is renamed into place at the end.
pub struct ArtifactWriter {
    path: PathBuf,
    staging: PathBuf,
    backup: bool,
    writer: Option<BatchedWriter<File>>,
    rows: usize,
}

impl ArtifactWriter {
    pub fn new(path: &Path, backup: bool) -> Self {
        Self {
            path: path.to_path_buf(),
            staging: path.with_extension("parquet.partial"),
            backup,
            writer: None,
            rows: 0,
        }
    }

    /// Rows written so far.
    pub fn rows(&self) -> usize {
        self.rows
    }

    fn write_error(&self, error: impl ToString) -> IngestError {
        IngestError::Write {
            path: self.path.clone(),
            message: error.to_string(),
        }
    }

    /// Appends `df`. The first batch fixes the artifact schema.
    pub fn write_batch(&mut self, df: &DataFrame) -> Result<()> {
        if self.writer.is_none() {
            if let Some(parent) = self.path.parent() {
                std::fs::create_dir_all(parent).map_err(|e| IngestError::io(parent, e))?;
            }
            let file = File::create(&self.staging).map_err(|e| IngestError::io(&self.staging, e))?;
            let writer = ParquetWriter::new(file)
                .with_compression(ParquetCompression::Snappy)
                .batched(df.schema())
                .map_err(|e| self.write_error(e))?;
            self.writer = Some(writer);
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.write_batch(df).map_err(|e| IngestError::Write {
                path: self.path.clone(),
                message: e.to_string(),
            })?;
        }
        self.rows += df.height();
        Ok(())
    }

    /// Closes the staging file and moves it over `path`, backing up the
    /// previous artifact when requested. Returns the backup path.
    pub fn finish(mut self) -> Result<Option<PathBuf>> {
        let Some(mut writer) = self.writer.take() else {
            return Err(self.write_error("no batches were written"));
        };
        writer.finish().map_err(|e| self.write_error(e))?;
        drop(writer);
        let backup_path = if self.backup {
            backup_existing(&self.path)?
        } else {
            None
        };
        std::fs::rename(&self.staging, &self.path).map_err(|e| IngestError::io(&self.path, e))?;
        info!(path = %self.path.display(), rows = self.rows, "wrote artifact");
        Ok(backup_path)
    }
}

pub fn read_parquet(path: &Path) -> Result<DataFrame> {
    if !path.is_file() {
        return Err(IngestError::ArtifactNotFound {
            path: path.to_path_buf(),
        });
    }
    let file = File::open(path).map_err(|e| IngestError::io(path, e))?;
    ParquetReader::new(file)
        .finish()
        .map_err(|e| IngestError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
}

/// Renames an existing artifact to `<stem>.backup_<YYYYmmdd_HHMMSS>.<ext>`.
///
/// Returns the backup path, or `None` when there was nothing to back up.
pub fn backup_existing(path: &Path) -> Result<Option<PathBuf>> {
    if !path.exists() {
        return Ok(None);
    }
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let stamp = Local::now().format("%Y%m%d_%H%M%S");
    let name = match path.extension() {
        Some(ext) => format!("{stem}.backup_{stamp}.{}", ext.to_string_lossy()),
        None => format!("{stem}.backup_{stamp}"),
    };
    let backup = path.with_file_name(name);
    std::fs::rename(path, &backup).map_err(|e| IngestError::io(path, e))?;
    info!(from = %path.display(), to = %backup.display(), "backed up existing artifact");
    Ok(Some(backup))
}

/// Writes `df` to `path`, first backing up any existing file when requested.
pub fn replace_artifact(df: &mut DataFrame, path: &Path, backup: bool) -> Result<Option<PathBuf>> {
    let backup_path = if backup {
        backup_existing(path)?
    } else {
        None
    };
    write_parquet(df, path)?;
    Ok(backup_path)
}

/// Takes a stale artifact out of `path` so later stages cannot read it.
///
/// The file is renamed aside when `backup` is set and deleted otherwise.
pub fn retire_artifact(path: &Path, backup: bool) -> Result<Option<PathBuf>> {
    if backup {
        return backup_existing(path);
    }
    if path.exists() {
        std::fs::remove_file(path).map_err(|e| IngestError::io(path, e))?;
        info!(path = %path.display(), "removed stale artifact");
    }
    Ok(None)
}
