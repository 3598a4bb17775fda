//! Benchmark drivers.
//!
//! This module turns repeated timed runs into a verdict on which execution strategy is the
//! fastest for a given parameter set.
//!
//! # High-level approach
//! ## 1. Trials
//! Each strategy is run `trials_per_strategy` times in a row, on the same parameter set and the
//! same device session (see [`runner::KernelRunner`]). Trials never overlap: a trial's buffers are
//! released before the next one starts.
//!
//! ## 2. Warm-up
//! When more than one trial is run, the first one is discarded: it absorbs the one-time costs of
//! kernel compilation and driver-side caching.
//!
//! ## 3. Aggregation
//! The successful trials left are reduced to a single figure, the minimum by default (the best
//! achievable time of the strategy, free from scheduling jitter), or the median. A strategy
//! without any successful kept trial is marked unavailable.
//!
//! ## 4. Verdict
//! The winner is the available strategy with the lowest aggregate. Ties go to the strategy
//! declared first in [`ExecutionStrategy`].

pub mod runner;

use crate::{
    consts::DEFAULT_SEED,
    error::{BenchError, Result, STATUS_SUCCESS},
    params::ParameterSet,
    runtime::DeviceRuntime,
    strategy::{ExecutionStrategy, SecondaryPolicies},
};
use runner::{KernelRunner, TimingResult};

use statistical::median;
use tracing::{info, warn};

use std::fmt;

/// Statistic used to reduce the kept trials of a strategy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum Statistic {
    #[default]
    Minimum,
    Median,
}

/// Aggregated time of a strategy.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Aggregate {
    /// Aggregated elapsed time, in nanoseconds.
    Measured(f64),
    /// No successful trial to aggregate.
    Unavailable,
}

impl Aggregate {
    pub fn nanos(&self) -> Option<f64> {
        match self {
            Self::Measured(ns) => Some(*ns),
            Self::Unavailable => None,
        }
    }
}

impl fmt::Display for Aggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Measured(ns) => write!(f, "{ns:.0} ns"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Driver settings.
#[derive(Clone, Debug, PartialEq)]
pub struct DriverConfig {
    pub statistic: Statistic,
    /// Strategies to evaluate. Evaluated in declaration order whatever the order given here.
    pub strategies: Vec<ExecutionStrategy>,
    /// Seed of the uniform streams/variates, shared by every trial.
    pub seed: u64,
    pub policies: SecondaryPolicies,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            statistic: Statistic::default(),
            strategies: ExecutionStrategy::ALL.to_vec(),
            seed: DEFAULT_SEED,
            policies: SecondaryPolicies::default(),
        }
    }
}

/// All trials of one strategy and their aggregate.
#[derive(Clone, Debug, PartialEq)]
pub struct StrategyOutcome {
    pub strategy: ExecutionStrategy,
    pub trials: Vec<TimingResult>,
    pub aggregate: Aggregate,
}

impl StrategyOutcome {
    /// Trials left once the warm-up trial is discarded.
    pub fn kept_trials(&self) -> &[TimingResult] {
        kept_trials(&self.trials)
    }

    /// Elapsed times of the successful kept trials, in nanoseconds.
    pub fn kept_times(&self) -> Vec<f64> {
        kept_times(&self.trials)
    }

    pub fn is_available(&self) -> bool {
        self.aggregate != Aggregate::Unavailable
    }

    /// First failure among the trials.
    pub fn first_failure(&self) -> Option<&BenchError> {
        self.trials.iter().find_map(|t| t.error.as_ref())
    }
}

/// Result of a benchmark run.
#[derive(Clone, Debug, PartialEq)]
pub struct Evaluation {
    /// Outcomes in declaration order of the strategies.
    pub outcomes: Vec<StrategyOutcome>,
    pub verdict: Option<ExecutionStrategy>,
}

impl Evaluation {
    pub fn outcome(&self, strategy: ExecutionStrategy) -> Option<&StrategyOutcome> {
        self.outcomes.iter().find(|o| o.strategy == strategy)
    }

    pub fn aggregate(&self, strategy: ExecutionStrategy) -> Option<Aggregate> {
        self.outcome(strategy).map(|o| o.aggregate)
    }

    /// `0` when a verdict was reached, else the status of the first recorded failure.
    ///
    /// An evaluation without verdict nor failure has measured nothing, and is reported as
    /// invalid parameters.
    pub fn status_code(&self) -> i32 {
        if self.verdict.is_some() {
            return STATUS_SUCCESS;
        }
        match self.outcomes.iter().find_map(StrategyOutcome::first_failure) {
            Some(error) => error.status_code(),
            None => BenchError::InvalidParameters(String::new()).status_code(),
        }
    }
}

fn kept_trials(trials: &[TimingResult]) -> &[TimingResult] {
    match trials {
        [_warm_up, rest @ ..] if !rest.is_empty() => rest,
        _ => trials,
    }
}

fn kept_times(trials: &[TimingResult]) -> Vec<f64> {
    kept_trials(trials)
        .iter()
        .filter_map(TimingResult::elapsed)
        .map(|ns| ns as f64)
        .collect()
}

/// Reduces `trials` to a single figure, discarding the first trial when there are several.
pub fn aggregate(trials: &[TimingResult], statistic: Statistic) -> Aggregate {
    let times = kept_times(trials);
    if times.is_empty() {
        return Aggregate::Unavailable;
    }
    match statistic {
        Statistic::Minimum => {
            Aggregate::Measured(times.iter().copied().fold(f64::INFINITY, f64::min))
        }
        Statistic::Median => Aggregate::Measured(median(&times)),
    }
}

/// Picks the strategy with the lowest measured aggregate, ties going to the strategy declared
/// first.
pub fn select_verdict<I>(aggregates: I) -> Option<ExecutionStrategy>
where
    I: IntoIterator<Item = (ExecutionStrategy, Aggregate)>,
{
    aggregates
        .into_iter()
        .filter_map(|(strategy, aggregate)| aggregate.nanos().map(|ns| (strategy, ns)))
        .min_by(|(sa, a), (sb, b)| a.total_cmp(b).then(sa.cmp(sb)))
        .map(|(strategy, _)| strategy)
}

/// Orchestrates the trials of every configured strategy on one device session.
pub struct BenchmarkDriver<'r, R: DeviceRuntime> {
    runtime: &'r R,
    config: DriverConfig,
}

impl<'r, R: DeviceRuntime> BenchmarkDriver<'r, R> {
    pub fn new(runtime: &'r R, config: DriverConfig) -> Self {
        Self { runtime, config }
    }

    /// Runs `trials_per_strategy` trials of every configured strategy over `params`.
    ///
    /// Fails only if the session is unusable or no trial is requested; failed trials are
    /// recorded in the returned [`Evaluation`].
    pub fn evaluate(&self, params: &ParameterSet, trials_per_strategy: u16) -> Result<Evaluation> {
        if trials_per_strategy == 0 {
            return Err(BenchError::InvalidParameters(
                "at least one trial per strategy is required".to_string(),
            ));
        }
        if !ExecutionStrategy::ALL
            .iter()
            .any(|s| self.config.strategies.contains(s))
        {
            return Err(BenchError::InvalidParameters(
                "no strategy to evaluate".to_string(),
            ));
        }
        self.runtime.validate()?;

        let runner = KernelRunner::new(self.runtime, self.config.policies, self.config.seed);
        let outcomes: Vec<_> = ExecutionStrategy::ALL
            .into_iter()
            .filter(|s| self.config.strategies.contains(s))
            .map(|strategy| {
                let trials: Vec<_> = (0..trials_per_strategy)
                    .map(|_| runner.run(strategy, params))
                    .collect();
                let aggregate = aggregate(&trials, self.config.statistic);
                match aggregate {
                    Aggregate::Measured(ns) => info!(
                        %strategy,
                        statistic = ?self.config.statistic,
                        ns,
                        "strategy aggregated"
                    ),
                    Aggregate::Unavailable => warn!(%strategy, "strategy unavailable"),
                }
                StrategyOutcome {
                    strategy,
                    trials,
                    aggregate,
                }
            })
            .collect();

        let verdict = select_verdict(outcomes.iter().map(|o| (o.strategy, o.aggregate)));
        match verdict {
            Some(winner) => info!(%winner, "verdict"),
            None => warn!("no strategy could be measured"),
        }

        Ok(Evaluation { outcomes, verdict })
    }
}
