//! Bounded chunk reading over one or more files.
//!
//! Files are scanned lazily and sliced, so at most `chunk_size` rows of a
//! file are materialized at a time.

use std::path::{Path, PathBuf};

use polars::prelude::{
    DataFrame, IdxSize, LazyCsvReader, LazyFileListReader, LazyFrame, PlPath, ScanArgsParquet,
};
use tracing::{debug, warn};

use crate::discovery::InputFormat;
use crate::error::{IngestError, Result};
use crate::unify::conform_to_columns;

/// Totals reported once the reader is exhausted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadSummary {
    pub files_read: usize,
    pub rows_read: usize,
    pub chunks: usize,
    /// Input files that could not be opened and were skipped.
    pub skipped: Vec<PathBuf>,
}

/// Iterator over bounded row chunks of a file sequence.
pub struct ChunkReader {
    files: Vec<PathBuf>,
    chunk_size: usize,
    conform: Option<Vec<&'static str>>,
    skip_unreadable: bool,
    file_idx: usize,
    offset: usize,
    current: Option<LazyFrame>,
    summary: ReadSummary,
}

impl ChunkReader {
    /// Raw input reader: every chunk is conformed to `columns` as text, and
    /// unreadable files are skipped with a warning.
    pub fn raw(files: Vec<PathBuf>, columns: &[&'static str], chunk_size: usize) -> Self {
        Self {
            conform: Some(columns.to_vec()),
            skip_unreadable: true,
            ..Self::new(files, chunk_size)
        }
    }

    /// Typed reader over a single artifact; any read failure is an error.
    pub fn artifact(path: &Path, chunk_size: usize) -> Self {
        Self::new(vec![path.to_path_buf()], chunk_size)
    }

    fn new(files: Vec<PathBuf>, chunk_size: usize) -> Self {
        Self {
            files,
            chunk_size: chunk_size.max(1),
            conform: None,
            skip_unreadable: false,
            file_idx: 0,
            offset: 0,
            current: None,
            summary: ReadSummary::default(),
        }
    }

    pub fn summary(&self) -> &ReadSummary {
        &self.summary
    }

    pub fn into_summary(self) -> ReadSummary {
        self.summary
    }

    fn advance_file(&mut self) {
        self.file_idx += 1;
        self.offset = 0;
        self.current = None;
    }

    /// Records an unreadable file; returns the error when skipping is off.
    fn unreadable(&mut self, path: PathBuf, message: String) -> Option<IngestError> {
        if self.skip_unreadable {
            warn!(path = %path.display(), error = %message, "skipping unreadable input file");
            self.summary.skipped.push(path);
            self.advance_file();
            None
        } else {
            Some(IngestError::Read { path, message })
        }
    }

    fn next_chunk(&mut self) -> Option<Result<DataFrame>> {
        loop {
            let path = self.files.get(self.file_idx)?.clone();
            if self.current.is_none() {
                match scan(&path) {
                    Ok(lf) => self.current = Some(lf),
                    Err(message) => match self.unreadable(path, message) {
                        Some(error) => return Some(Err(error)),
                        None => continue,
                    },
                }
            }
            let lf = self.current.clone()?;
            let collected = lf
                .slice(self.offset as i64, self.chunk_size as IdxSize)
                .collect();
            let chunk = match collected {
                Ok(df) => df,
                Err(err) if self.offset == 0 => match self.unreadable(path, err.to_string()) {
                    Some(error) => return Some(Err(error)),
                    None => continue,
                },
                Err(err) => {
                    return Some(Err(IngestError::Read {
                        path,
                        message: err.to_string(),
                    }));
                }
            };
            if self.offset == 0 {
                self.summary.files_read += 1;
            }
            let height = chunk.height();
            if height == 0 {
                self.advance_file();
                continue;
            }
            debug!(path = %path.display(), offset = self.offset, rows = height, "read chunk");
            self.offset += height;
            if height < self.chunk_size {
                self.advance_file();
            }
            self.summary.rows_read += height;
            self.summary.chunks += 1;
            let chunk = match &self.conform {
                Some(columns) => conform_to_columns(&chunk, columns).map(|(df, backfilled)| {
                    if !backfilled.is_empty() && self.offset == height {
                        debug!(path = %path.display(), columns = ?backfilled, "backfilled missing columns");
                    }
                    df
                }),
                None => Ok(chunk),
            };
            return Some(chunk);
        }
    }
}

impl Iterator for ChunkReader {
    type Item = Result<DataFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_chunk()
    }
}

fn scan(path: &Path) -> std::result::Result<LazyFrame, String> {
    let path_str = path.to_string_lossy();
    let pl_path = PlPath::new(&path_str);
    match InputFormat::from_path(path) {
        Some(InputFormat::Parquet) => {
            LazyFrame::scan_parquet(pl_path, ScanArgsParquet::default()).map_err(|e| e.to_string())
        }
        Some(InputFormat::Csv) => LazyCsvReader::new(pl_path)
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .finish()
            .map_err(|e| e.to_string()),
        None => Err("unsupported file extension".to_string()),
    }
}
