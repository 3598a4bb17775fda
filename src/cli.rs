//! Command-Line Interface related code.
//!
//! This module handles the parsing of CLI arguments using the [`clap`][1] crate.
//! It defines the availables runtime options and subcommands.
//!
//! [1]: https://crates.io/crates/clap

use crate::{
    consts,
    drivers::Statistic,
    options::BenchOption,
    strategy::{ExecutionStrategy, SecondaryPolicy},
};

use clap::{Parser, Subcommand, ValueEnum};

use std::path::PathBuf;

/// Strategy selection benchmark for probability-distribution kernels.
///
/// Times alternative ways of invoking an exponential distribution on an accelerator (object vs.
/// static dispatch, distribution object in private, global or local memory) and reports the
/// fastest one.
#[derive(Clone, Debug, Parser)]
pub struct CliArgs {
    /// Number of timed trials per strategy, the first one being a discarded warm-up.
    #[arg(
        short,
        long,
        value_name = "TRIALS",
        default_value_t = consts::TRIALS_PER_STRATEGY,
        value_parser = clap::value_parser!(u16).range(1..u16::MAX.into()),
    )]
    pub trials: u16,

    /// Benchmark option to run.
    #[command(subcommand)]
    pub option: OptionCmd,

    /// Number of parameters (`n`), ignored when `--rates` is given.
    #[arg(short = 'n', long, default_value_t = 1 << 20)]
    pub count: usize,

    /// Secondary count (`n1`).
    #[arg(long = "n1", value_name = "N1", default_value_t = 0)]
    pub secondary_count: usize,

    /// Explicit distribution rates, instead of random ones.
    #[arg(short, long, num_args = 1..)]
    pub rates: Option<Vec<f64>>,

    /// How strategies consume the secondary count.
    #[arg(long, value_enum, default_value_t = SecondaryPolicy::Iterations)]
    pub secondary_policy: SecondaryPolicy,

    /// Statistic used to aggregate the trials of a strategy.
    #[arg(long, value_enum, default_value_t = Statistic::Minimum)]
    pub statistic: Statistic,

    /// Device runtime to benchmark on.
    #[arg(short, long, value_enum, default_value_t = Backend::Host)]
    pub backend: Backend,

    /// OpenCL platform index.
    #[arg(long, default_value_t = 0)]
    pub platform: usize,

    /// OpenCL device index within the platform.
    #[arg(long, default_value_t = 0)]
    pub device: usize,

    /// Output file, defaults to `stdout` if unspecified.
    #[arg(short, long)]
    pub output_file: Option<PathBuf>,

    /// Seed for the random number generators (RNG).
    #[arg(short, long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Increase logging verbosity (`-v` for debug, `-vv` for trace). `RUST_LOG` takes precedence.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// List of available benchmark options.
#[derive(Clone, Debug, PartialEq, Subcommand)]
pub enum OptionCmd {
    /// Object dispatch vs. static dispatch.
    Option1,
    /// Distribution object in global memory vs. local memory.
    Option2,
    /// All four execution strategies.
    Option3,
    /// Any subset of the execution strategies.
    Evaluate {
        /// Strategies to compare.
        #[arg(
            short = 'S',
            long = "strategy",
            value_enum,
            num_args = 1..,
            default_values_t = ExecutionStrategy::ALL,
        )]
        strategies: Vec<ExecutionStrategy>,
    },
}

impl OptionCmd {
    /// Named option behind the subcommand, if any.
    pub fn bench_option(&self) -> Option<BenchOption> {
        match self {
            Self::Option1 => Some(BenchOption::Option1),
            Self::Option2 => Some(BenchOption::Option2),
            Self::Option3 => Some(BenchOption::Option3),
            Self::Evaluate { .. } => None,
        }
    }
}

/// Device runtimes selectable from the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Backend {
    /// CPU emulation of the device.
    Host,
    /// OpenCL device (requires the `opencl` feature).
    Opencl,
}
