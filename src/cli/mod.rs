//! Command-line interface implementation
//!
//! This module provides the CLI entry point and dispatches to submodules
//! for specific command implementations.

mod inspect;
mod ledger;
mod run;

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::config::{load_config, merge_cli_overrides, BotConfig, CliOverrides};
use crate::schedule::ScheduleMode;

pub use ledger::LedgerAction;

/// Exit codes
pub(crate) const EXIT_SUCCESS: u8 = 0;
pub(crate) const EXIT_ERROR: u8 = 1;
pub(crate) const EXIT_INVALID_ARGS: u8 = 2;

/// Notpixel - multi-account repaint bot
#[derive(Parser)]
#[command(name = "notpx")]
#[command(about = "Notpixel - keep a reference image painted on the shared canvas across many accounts")]
#[command(version)]
pub struct Cli {
    /// Path to notpixel.toml (default: discovered from the working directory)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "notpixel=trace" (default: RUST_LOG, then info)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run repaint cycles over every account
    Run {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,

        /// Maximum number of accounts in flight
        #[arg(long, value_parser = clap::value_parser!(u16).range(1..))]
        concurrency: Option<u16>,

        /// Scheduling mode
        #[arg(long, value_enum)]
        mode: Option<ScheduleMode>,

        /// Only log in, claim and report status; do not paint
        #[arg(long)]
        no_repaint: bool,

        /// Reference image (overrides config)
        #[arg(long)]
        image: Option<PathBuf>,
    },

    /// Quantize a reference image against the palette and print color usage
    Analyze {
        /// Image to analyze (default: files.image from config)
        image: Option<PathBuf>,

        /// Palette file (default: files.palette from config)
        #[arg(long)]
        palette: Option<PathBuf>,
    },

    /// Print the paint plan for a template position without painting
    Plan {
        /// Template origin column
        #[arg(long)]
        x: u32,

        /// Template origin row
        #[arg(long)]
        y: u32,

        /// Template edge length in cells
        #[arg(long)]
        size: u32,

        /// Reference image (default: files.image from config)
        #[arg(long)]
        image: Option<PathBuf>,

        /// Canvas row stride (default: repaint.row_stride from config)
        #[arg(long)]
        stride: Option<u64>,

        /// Number of instructions to print
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Inspect or clear the repaint ledger
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
}

/// Load the configuration, printing the error on failure.
fn load(path: Option<&Path>, overrides: &CliOverrides) -> Result<BotConfig, ExitCode> {
    match load_config(path) {
        Ok(mut config) => {
            merge_cli_overrides(&mut config, overrides);
            Ok(config)
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            Err(ExitCode::from(EXIT_ERROR))
        }
    }
}

/// Single-threaded runtime: account workers interleave only at await points.
fn runtime() -> Result<tokio::runtime::Runtime, ExitCode> {
    tokio::runtime::Builder::new_current_thread().enable_all().build().map_err(|e| {
        eprintln!("Error: Failed to create async runtime: {}", e);
        ExitCode::from(EXIT_ERROR)
    })
}

/// Main CLI entry point
pub fn run() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = crate::logging::init(cli.log_level.as_deref()) {
        eprintln!("Error: invalid --log-level: {}", e);
        return ExitCode::from(EXIT_INVALID_ARGS);
    }

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Run { once, concurrency, mode, no_repaint, image } => {
            let overrides = CliOverrides {
                concurrency: concurrency.map(usize::from),
                mode,
                repaint: no_repaint.then_some(false),
                image,
            };
            match load(config_path, &overrides) {
                Ok(config) => run::run_bot(config, once),
                Err(code) => code,
            }
        }
        Commands::Analyze { image, palette } => match load(config_path, &CliOverrides::default()) {
            Ok(config) => inspect::run_analyze(&config, image.as_deref(), palette.as_deref()),
            Err(code) => code,
        },
        Commands::Plan { x, y, size, image, stride, limit } => {
            let overrides = CliOverrides { image, ..Default::default() };
            match load(config_path, &overrides) {
                Ok(config) => inspect::run_plan(&config, x, y, size, stride, limit),
                Err(code) => code,
            }
        }
        Commands::Ledger { action } => match load(config_path, &CliOverrides::default()) {
            Ok(config) => ledger::run_ledger(&config, action),
            Err(code) => code,
        },
    }
}
