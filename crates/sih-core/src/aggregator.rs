//! Key aggregator.
//!
//! Two strategies share the same merge operators:
//!
//! - `single-pass` folds every normalized chunk into one in-memory state.
//! - `chunked` folds each chunk into its own partial state, spills it to the
//!   scratch area, then merges spilled states `merge_fan_in` at a time until
//!   one remains.
//!
//! Row ordinals are global positions among normalized rows, so both
//! strategies resolve "first seen" and tie-breaks identically.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use polars::prelude::DataFrame;
use sih_ingest::{ChunkReader, IngestError, ScratchArea, list_input_files};
use sih_model::{AggregateOptions, AggregationStrategy};
use sih_transform::{FieldNormalizer, merge_fallbacks};
use tracing::{debug, info, info_span};

use crate::error::AggregateError;
use crate::merge::{Layout, MergePolicy, PartialAggregate, verify_unique_keys};

type Result<T> = std::result::Result<T, AggregateError>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregateReport {
    pub strategy: AggregationStrategy,
    pub files_read: usize,
    pub rows_read: usize,
    pub rows_normalized: usize,
    pub dropped_keys: usize,
    pub output_rows: usize,
    pub chunks: usize,
    pub merge_rounds: usize,
    pub skipped_files: Vec<PathBuf>,
    /// Coercion fallbacks per column, summed over all chunks.
    pub fallbacks: BTreeMap<String, usize>,
}

#[derive(Debug)]
pub struct Aggregated {
    pub frame: DataFrame,
    pub report: AggregateReport,
}

pub struct KeyAggregator {
    normalizer: FieldNormalizer,
    policy: MergePolicy,
    options: AggregateOptions,
}

/// Chunk-level bookkeeping shared by both strategies.
#[derive(Default)]
struct Progress {
    layout: Option<Layout>,
    next_ord: u64,
}

impl KeyAggregator {
    pub fn new(normalizer: FieldNormalizer, policy: MergePolicy, options: AggregateOptions) -> Self {
        Self {
            normalizer,
            policy,
            options,
        }
    }

    /// Reads every input file under `input_dir`, conformed to `columns`.
    pub fn aggregate_dir(&self, input_dir: &Path, columns: &[&'static str]) -> Result<Aggregated> {
        let files = list_input_files(input_dir)?;
        if files.is_empty() {
            return Err(IngestError::MissingInput {
                path: input_dir.to_path_buf(),
            }
            .into());
        }
        let mut reader = ChunkReader::raw(files, columns, self.options.chunk_size);
        let mut aggregated = self.aggregate_chunks(&mut reader)?;
        let summary = reader.into_summary();
        if summary.files_read == 0 {
            return Err(IngestError::MissingInput {
                path: input_dir.to_path_buf(),
            }
            .into());
        }
        aggregated.report.files_read = summary.files_read;
        aggregated.report.skipped_files = summary.skipped;
        Ok(aggregated)
    }

    /// Aggregates a stream of raw chunks.
    pub fn aggregate_chunks<I>(&self, chunks: I) -> Result<Aggregated>
    where
        I: IntoIterator<Item = sih_ingest::Result<DataFrame>>,
    {
        let span = info_span!("aggregate", strategy = %self.options.strategy);
        let _guard = span.enter();
        let started = Instant::now();
        let mut report = AggregateReport {
            strategy: self.options.strategy,
            ..AggregateReport::default()
        };

        let frame = match self.options.strategy {
            AggregationStrategy::SinglePass => self.single_pass(chunks, &mut report)?,
            AggregationStrategy::Chunked => self.chunked(chunks, &mut report)?,
        };
        verify_unique_keys(&frame, &self.policy.key)?;
        report.output_rows = frame.height();
        info!(
            rows_read = report.rows_read,
            output_rows = report.output_rows,
            chunks = report.chunks,
            merge_rounds = report.merge_rounds,
            duration_ms = started.elapsed().as_millis() as u64,
            "aggregation complete"
        );
        Ok(Aggregated { frame, report })
    }

    /// Normalizes one raw chunk and returns it with its first ordinal.
    fn normalize_chunk(
        &self,
        raw: &DataFrame,
        progress: &mut Progress,
        report: &mut AggregateReport,
    ) -> Result<(DataFrame, u64)> {
        let batch = self.normalizer.normalize(raw)?;
        report.chunks += 1;
        report.rows_read += batch.rows_in;
        report.dropped_keys += batch.dropped_keys;
        report.rows_normalized += batch.frame.height();
        merge_fallbacks(&mut report.fallbacks, &batch.fallbacks);
        if progress.layout.is_none() {
            progress.layout = Some(Layout::new(&batch.frame, &self.policy)?);
        }
        let first_ord = progress.next_ord;
        progress.next_ord += batch.frame.height() as u64;
        debug!(
            chunk = report.chunks,
            rows = batch.frame.height(),
            first_ord,
            "normalized chunk for aggregation"
        );
        Ok((batch.frame, first_ord))
    }

    fn single_pass<I>(&self, chunks: I, report: &mut AggregateReport) -> Result<DataFrame>
    where
        I: IntoIterator<Item = sih_ingest::Result<DataFrame>>,
    {
        let mut progress = Progress::default();
        let mut state: Option<PartialAggregate> = None;
        for chunk in chunks {
            let (frame, first_ord) = self.normalize_chunk(&chunk?, &mut progress, report)?;
            let Some(layout) = &progress.layout else {
                continue;
            };
            let state = state.get_or_insert_with(|| PartialAggregate::new(layout.clone()));
            state.fold_frame(&frame, first_ord)?;
        }
        let state = state.ok_or(AggregateError::NoInput)?;
        state.finalize(&self.policy)
    }

    fn chunked<I>(&self, chunks: I, report: &mut AggregateReport) -> Result<DataFrame>
    where
        I: IntoIterator<Item = sih_ingest::Result<DataFrame>>,
    {
        let scratch = ScratchArea::new(self.options.scratch_dir.as_deref())?;
        let mut progress = Progress::default();
        let mut pending: Vec<PathBuf> = Vec::new();
        for chunk in chunks {
            let (frame, first_ord) = self.normalize_chunk(&chunk?, &mut progress, report)?;
            let Some(layout) = &progress.layout else {
                continue;
            };
            let mut partial = PartialAggregate::new(layout.clone());
            partial.fold_frame(&frame, first_ord)?;
            let mut spilled = partial.to_frame()?;
            let name = format!("chunk_{:05}", pending.len());
            pending.push(scratch.write(&name, &mut spilled)?);
        }
        let layout = progress.layout.ok_or(AggregateError::NoInput)?;

        let fan_in = self.options.merge_fan_in.max(2);
        let mut round = 0;
        while pending.len() > 1 {
            round += 1;
            let mut next = Vec::with_capacity(pending.len().div_ceil(fan_in));
            for (group_idx, group) in pending.chunks(fan_in).enumerate() {
                let mut merged = self.restore(&scratch, &group[0], &layout)?;
                for path in &group[1..] {
                    merged.merge(self.restore(&scratch, path, &layout)?);
                }
                let mut spilled = merged.to_frame()?;
                let name = format!("round{round:02}_{group_idx:05}");
                next.push(scratch.write(&name, &mut spilled)?);
            }
            debug!(round, inputs = pending.len(), outputs = next.len(), "merge round");
            pending = next;
        }
        report.merge_rounds = round;

        let last = pending.pop().ok_or(AggregateError::NoInput)?;
        let state = self.restore(&scratch, &last, &layout)?;
        state.finalize(&self.policy)
    }

    fn restore(&self, scratch: &ScratchArea, path: &Path, layout: &Layout) -> Result<PartialAggregate> {
        let frame = scratch.take(path)?;
        PartialAggregate::from_frame(&frame, layout)
    }
}
