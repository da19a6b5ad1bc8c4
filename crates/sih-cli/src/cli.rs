//! CLI argument definitions.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use colorchoice_clap::Color;
use sih_cli::config::ConfigOverrides;
use sih_model::AggregationStrategy;

#[derive(Parser)]
#[command(
    name = "sih",
    version,
    about = "SIH hospital admission ETL - normalize, aggregate, project and load AIH records",
    long_about = "Transforms reduced AIH admission files into normalized relations.\n\n\
                  Duplicate submissions of one admission are contracted into a single\n\
                  canonical record before the relations are projected and loaded into\n\
                  PostgreSQL with COPY."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Adjust log verbosity (-v for info, -vv for debug, -q for errors only).
    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    /// Control ANSI color output (auto, always, never).
    #[command(flatten)]
    pub color: Color,

    /// Explicit log level (overrides -v/-q flags).
    #[arg(long = "log-level", value_enum, global = true)]
    pub log_level: Option<LogLevelArg>,

    /// Log output format (pretty for human, json for machine parsing).
    #[arg(
        long = "log-format",
        value_enum,
        default_value = "pretty",
        global = true
    )]
    pub log_format: LogFormatArg,

    /// Write logs to a file instead of stderr.
    #[arg(long = "log-file", value_name = "PATH", global = true)]
    pub log_file: Option<PathBuf>,

    /// Pipeline configuration file (TOML).
    #[arg(long = "config", value_name = "PATH", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Normalize the input files and write the normalized artifact.
    Normalize(StageArgs),

    /// Normalize and contract duplicate admissions into the aggregated artifact.
    Aggregate(AggregateArgs),

    /// Split the aggregated artifact into one artifact per relation.
    Project(StageArgs),

    /// Create tables and load every relation artifact.
    Load(LoadArgs),

    /// Aggregate, project and load in sequence.
    Run(RunArgs),

    /// Print the relations in dependency order with their DDL.
    Schema(StageArgs),
}

#[derive(Args, Clone, Default)]
pub struct StageArgs {
    /// Directory of raw admission files.
    #[arg(long = "input-dir", value_name = "DIR")]
    pub input_dir: Option<PathBuf>,

    /// Directory for normalized and aggregated artifacts.
    #[arg(long = "interim-dir", value_name = "DIR")]
    pub interim_dir: Option<PathBuf>,

    /// Directory for relation artifacts.
    #[arg(long = "processed-dir", value_name = "DIR")]
    pub processed_dir: Option<PathBuf>,

    /// Directory of reference relation artifacts.
    #[arg(long = "reference-dir", value_name = "DIR")]
    pub reference_dir: Option<PathBuf>,

    /// Normalization rule set (TOML) replacing the built-in one.
    #[arg(long = "rule-set", value_name = "PATH")]
    pub rule_set: Option<PathBuf>,

    /// Relation registry (TOML) replacing the built-in catalog.
    #[arg(long = "registry", value_name = "PATH")]
    pub registry: Option<PathBuf>,

    /// Rows per input chunk.
    #[arg(long = "chunk-size", value_name = "ROWS")]
    pub chunk_size: Option<usize>,

    /// Overwrite existing artifacts instead of renaming them aside.
    #[arg(long = "no-backup")]
    pub no_backup: bool,
}

#[derive(Args, Clone, Default)]
pub struct AggregateOptionArgs {
    /// Aggregation strategy.
    #[arg(long = "strategy", value_enum)]
    pub strategy: Option<StrategyArg>,

    /// Chunk results merged per group in each merge round.
    #[arg(long = "merge-fan-in", value_name = "N")]
    pub merge_fan_in: Option<usize>,

    /// Parent directory for the scratch area.
    #[arg(long = "scratch-dir", value_name = "DIR")]
    pub scratch_dir: Option<PathBuf>,
}

#[derive(Args, Clone, Default)]
pub struct LoadOptionArgs {
    /// Connection URL (overrides DATABASE_URL and the config file).
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Load into an in-memory store that enforces the same constraints.
    #[arg(long = "dry-run")]
    pub dry_run: bool,
}

#[derive(Args)]
pub struct AggregateArgs {
    #[command(flatten)]
    pub stage: StageArgs,

    #[command(flatten)]
    pub aggregate: AggregateOptionArgs,
}

#[derive(Args)]
pub struct LoadArgs {
    #[command(flatten)]
    pub stage: StageArgs,

    #[command(flatten)]
    pub load: LoadOptionArgs,
}

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub stage: StageArgs,

    #[command(flatten)]
    pub aggregate: AggregateOptionArgs,

    #[command(flatten)]
    pub load: LoadOptionArgs,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum StrategyArg {
    SinglePass,
    Chunked,
}

impl From<StrategyArg> for AggregationStrategy {
    fn from(value: StrategyArg) -> Self {
        match value {
            StrategyArg::SinglePass => Self::SinglePass,
            StrategyArg::Chunked => Self::Chunked,
        }
    }
}

/// CLI log level choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// CLI log format choices.
#[derive(Clone, Copy, ValueEnum)]
pub enum LogFormatArg {
    Pretty,
    Compact,
    Json,
}

/// Collects the overrides given with a subcommand.
pub fn overrides(
    stage: &StageArgs,
    aggregate: Option<&AggregateOptionArgs>,
    load: Option<&LoadOptionArgs>,
) -> ConfigOverrides {
    let aggregate = aggregate.cloned().unwrap_or_default();
    ConfigOverrides {
        input_dir: stage.input_dir.clone(),
        interim_dir: stage.interim_dir.clone(),
        processed_dir: stage.processed_dir.clone(),
        reference_dir: stage.reference_dir.clone(),
        scratch_dir: aggregate.scratch_dir,
        chunk_size: stage.chunk_size,
        merge_fan_in: aggregate.merge_fan_in,
        strategy: aggregate.strategy.map(Into::into),
        no_backup: stage.no_backup,
        rule_set: stage.rule_set.clone(),
        registry: stage.registry.clone(),
        database_url: load.and_then(|l| l.database_url.clone()),
    }
}
