//! SIH admission ETL command-line driver.

use std::future::Future;
use std::io::{self, IsTerminal};

use anyhow::{Context, Result};
use clap::{ColorChoice, Parser};
use sih_cli::config::{ConfigOverrides, PipelineConfig};
use sih_cli::logging::{LogConfig, LogFormat, init_logging};
use sih_cli::pipeline;
use tracing::level_filters::LevelFilter;

mod cli;
mod commands;
mod summary;

use crate::cli::{Cli, Command, LogFormatArg, LogLevelArg, overrides};
use crate::commands::run_schema;

fn main() {
    let cli = Cli::parse();
    cli.color.write_global();
    let log_config = log_config_from_cli(&cli);
    if let Err(error) = init_logging(&log_config) {
        eprintln!("error: failed to initialize logging: {error}");
        std::process::exit(1);
    }
    let exit_code = match execute(&cli) {
        Ok(()) => 0,
        Err(error) => {
            eprintln!("error: {error:#}");
            1
        }
    };
    std::process::exit(exit_code);
}

fn execute(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Normalize(args) => {
            let config = resolve_config(cli, &overrides(args, None, None))?;
            summary::print_normalize(&pipeline::normalize(&config)?);
        }
        Command::Aggregate(args) => {
            let config = resolve_config(cli, &overrides(&args.stage, Some(&args.aggregate), None))?;
            summary::print_aggregate(&pipeline::aggregate(&config)?);
        }
        Command::Project(args) => {
            let config = resolve_config(cli, &overrides(args, None, None))?;
            summary::print_projection(&pipeline::project(&config)?);
        }
        Command::Load(args) => {
            let config = resolve_config(cli, &overrides(&args.stage, None, Some(&args.load)))?;
            let report = block_on(pipeline::load(&config, args.load.dry_run))??;
            summary::print_load(&report);
        }
        Command::Run(args) => {
            let config = resolve_config(
                cli,
                &overrides(&args.stage, Some(&args.aggregate), Some(&args.load)),
            )?;
            let report = block_on(pipeline::run(&config, args.load.dry_run))??;
            summary::print_run(&report);
        }
        Command::Schema(args) => {
            let config = resolve_config(cli, &overrides(args, None, None))?;
            run_schema(&config)?;
        }
    }
    Ok(())
}

fn resolve_config(cli: &Cli, overrides: &ConfigOverrides) -> Result<PipelineConfig> {
    let database_url = std::env::var("DATABASE_URL").ok();
    Ok(PipelineConfig::resolve(
        cli.config.as_deref(),
        database_url,
        overrides,
    )?)
}

fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("start async runtime")?;
    Ok(runtime.block_on(future))
}

/// Build logging configuration from CLI flags with consistent precedence.
fn log_config_from_cli(cli: &Cli) -> LogConfig {
    let mut config = LogConfig {
        level_filter: cli.verbosity.tracing_level_filter(),
        ..LogConfig::default()
    };
    config.use_env_filter = !(cli.verbosity.is_present() || cli.log_level.is_some());
    if let Some(level) = cli.log_level {
        config.level_filter = match level {
            LogLevelArg::Error => LevelFilter::ERROR,
            LogLevelArg::Warn => LevelFilter::WARN,
            LogLevelArg::Info => LevelFilter::INFO,
            LogLevelArg::Debug => LevelFilter::DEBUG,
            LogLevelArg::Trace => LevelFilter::TRACE,
        };
    }
    config.format = match cli.log_format {
        LogFormatArg::Pretty => LogFormat::Pretty,
        LogFormatArg::Compact => LogFormat::Compact,
        LogFormatArg::Json => LogFormat::Json,
    };
    config.log_file = cli.log_file.clone();
    config.with_ansi = match cli.color.color {
        ColorChoice::Always => true,
        ColorChoice::Never => false,
        ColorChoice::Auto => cli.log_file.is_none() && io::stderr().is_terminal(),
    };
    config
}
