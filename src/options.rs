//! Named benchmark entry points.
//!
//! Each option compares a fixed set of strategies on the rates of an [`OptionData`] record and
//! reduces the outcome to a status code: `0` when a verdict was reached, otherwise the non-zero
//! code of the failure that prevented it (see [`crate::error::BenchError::status_code`]).
//!
//! - [`option1`] compares the call styles: object dispatch against static dispatch;
//! - [`option2`] compares where the distribution object lives: global against local memory;
//! - [`option3`] compares all four strategies.

use crate::{
    consts::TRIALS_PER_STRATEGY,
    drivers::{BenchmarkDriver, DriverConfig, Evaluation},
    error::Result,
    params::{OptionData, ParameterSet},
    runtime::DeviceRuntime,
    strategy::ExecutionStrategy,
};

use tracing::info;

use std::fmt;

/// Named strategy comparisons.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BenchOption {
    Option1,
    Option2,
    Option3,
}

impl BenchOption {
    /// Strategies compared by the option.
    pub fn strategies(self) -> &'static [ExecutionStrategy] {
        use ExecutionStrategy::*;
        match self {
            Self::Option1 => &[ObjectDispatch, StaticDispatch],
            Self::Option2 => &[GlobalMemoryScratch, LocalMemoryScratch],
            Self::Option3 => &ExecutionStrategy::ALL,
        }
    }
}

impl fmt::Display for BenchOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Option1 => write!(f, "option1 (call style)"),
            Self::Option2 => write!(f, "option2 (scratch location)"),
            Self::Option3 => write!(f, "option3 (all strategies)"),
        }
    }
}

/// Runs `option` with the given driver settings, keeping the full evaluation.
///
/// The strategy subset of `config` is replaced by the option's own.
pub fn run_option<R: DeviceRuntime>(
    option: BenchOption,
    runtime: &R,
    params: &ParameterSet,
    config: DriverConfig,
    trials_per_strategy: u16,
) -> Result<Evaluation> {
    let config = DriverConfig {
        strategies: option.strategies().to_vec(),
        ..config
    };
    info!(
        %option,
        n = params.count(),
        n1 = params.secondary_count(),
        trials_per_strategy,
        "running benchmark option"
    );
    BenchmarkDriver::new(runtime, config).evaluate(params, trials_per_strategy)
}

/// Status code of a finished (or aborted) option.
pub fn status_code(outcome: &Result<Evaluation>) -> i32 {
    match outcome {
        Ok(evaluation) => evaluation.status_code(),
        Err(error) => error.status_code(),
    }
}

fn run_default<R: DeviceRuntime>(option: BenchOption, runtime: &R, data: &OptionData) -> i32 {
    let outcome = ParameterSet::try_from(data).and_then(|params| {
        run_option(
            option,
            runtime,
            &params,
            DriverConfig::default(),
            TRIALS_PER_STRATEGY,
        )
    });
    status_code(&outcome)
}

/// Object dispatch against static dispatch.
pub fn option1<R: DeviceRuntime>(runtime: &R, data: &OptionData) -> i32 {
    run_default(BenchOption::Option1, runtime, data)
}

/// Distribution object in global memory against local memory.
pub fn option2<R: DeviceRuntime>(runtime: &R, data: &OptionData) -> i32 {
    run_default(BenchOption::Option2, runtime, data)
}

/// All four strategies.
pub fn option3<R: DeviceRuntime>(runtime: &R, data: &OptionData) -> i32 {
    run_default(BenchOption::Option3, runtime, data)
}
