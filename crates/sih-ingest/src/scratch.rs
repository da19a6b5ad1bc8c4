//! Per-run scratch area for intermediate chunk artifacts.

use std::path::{Path, PathBuf};

use polars::prelude::DataFrame;
use tempfile::TempDir;
use tracing::debug;

use crate::artifact::{read_parquet, write_parquet};
use crate::error::{IngestError, Result};

/// Temporary directory removed when dropped, on success or failure alike.
#[derive(Debug)]
pub struct ScratchArea {
    dir: TempDir,
}

impl ScratchArea {
    /// Creates a fresh directory under `parent`, or the OS temp dir.
    pub fn new(parent: Option<&Path>) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("sih-chunks-");
        let dir = match parent {
            Some(parent) => {
                std::fs::create_dir_all(parent).map_err(|e| IngestError::io(parent, e))?;
                builder.tempdir_in(parent)
            }
            None => builder.tempdir(),
        }
        .map_err(|e| IngestError::io(parent.unwrap_or(Path::new(".")), e))?;
        debug!(path = %dir.path().display(), "created scratch area");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, name: &str) -> PathBuf {
        self.dir.path().join(format!("{name}.parquet"))
    }

    pub fn write(&self, name: &str, df: &mut DataFrame) -> Result<PathBuf> {
        let path = self.file(name);
        write_parquet(df, &path)?;
        Ok(path)
    }

    /// Reads a chunk artifact and deletes it.
    pub fn take(&self, path: &Path) -> Result<DataFrame> {
        let df = read_parquet(path)?;
        std::fs::remove_file(path).map_err(|e| IngestError::io(path, e))?;
        Ok(df)
    }
}
