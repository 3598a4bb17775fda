//! Performance report related structures and functions.
//!
//! This module defines the data structures needed to generate performance reports out of the
//! recorded trials of an evaluation.

use crate::{
    drivers::{runner::ClockSource, Aggregate, Evaluation, StrategyOutcome},
    error::{BenchError, Result},
    params::ParameterSet,
    strategy::ExecutionStrategy,
};

use statistical::{mean, median, standard_deviation};

use std::{fmt, io::Write};

/// Timing statistics of the kept trials of a strategy, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq)]
struct TimeStats {
    min_time: f64,
    median_time: f64,
    max_time: f64,
    avg_time: f64,
    stddev_time: f64,
}

impl TimeStats {
    fn new(durations_ns: &mut [f64]) -> Option<Self> {
        if durations_ns.is_empty() {
            return None;
        }
        durations_ns.iter_mut().for_each(|d| *d /= 1e6);
        durations_ns.sort_by(f64::total_cmp);

        let avg_time = mean(durations_ns);
        let stddev_time = if durations_ns.len() > 1 {
            standard_deviation(durations_ns, Some(avg_time))
        } else {
            0.0
        };

        Some(Self {
            min_time: durations_ns[0],
            median_time: median(durations_ns),
            max_time: durations_ns[durations_ns.len() - 1],
            avg_time,
            stddev_time,
        })
    }
}

/// Performance information and statistics of one strategy.
pub struct PerfReport {
    /// Benchmarked strategy.
    strategy: ExecutionStrategy,
    /// Number of parameters.
    count: usize,
    /// Secondary count.
    secondary_count: usize,
    /// Number of trials, warm-up included.
    trials: usize,
    /// Number of successful kept trials.
    successes: usize,
    /// Clock of the last successful trial.
    clock: Option<ClockSource>,
    stats: Option<TimeStats>,
    /// Aggregate used for the verdict.
    aggregate: Aggregate,
    /// Samples drawn per second at the aggregate time.
    throughput: Option<f64>,
    /// Whether this strategy won.
    winner: bool,
}

impl PerfReport {
    pub fn print_csv_header(output: &mut dyn Write) -> std::io::Result<()> {
        writeln!(
            output,
            "strategy,n,n1,trials,successes,clock,min_runtime,median_runtime,max_runtime,avg_runtime,stddev,aggregate_ns,samples/s,winner"
        )
    }

    /// Creates a `PerfReport` from the outcome of a strategy.
    pub fn new(outcome: &StrategyOutcome, params: &ParameterSet, winner: bool) -> Self {
        let mut durations = outcome.kept_times();
        let successes = durations.len();
        let samples = (params.count() * params.effective_secondary_count()) as f64;

        Self {
            strategy: outcome.strategy,
            count: params.count(),
            secondary_count: params.secondary_count(),
            trials: outcome.trials.len(),
            successes,
            clock: outcome.trials.iter().rev().find_map(|t| t.clock),
            stats: TimeStats::new(&mut durations),
            aggregate: outcome.aggregate,
            throughput: outcome
                .aggregate
                .nanos()
                .filter(|&ns| ns > 0.0)
                .map(|ns| samples * 1e9 / ns),
            winner,
        }
    }

    /// One report per evaluated strategy.
    pub fn from_evaluation(evaluation: &Evaluation, params: &ParameterSet) -> Vec<Self> {
        evaluation
            .outcomes
            .iter()
            .map(|o| Self::new(o, params, evaluation.verdict == Some(o.strategy)))
            .collect()
    }
}

/// Writes the CSV header and one row per evaluated strategy to `output`.
pub fn write_csv(
    output: &mut dyn Write,
    evaluation: &Evaluation,
    params: &ParameterSet,
) -> Result<()> {
    let report = |e: std::io::Error| BenchError::Report(e.to_string());
    PerfReport::print_csv_header(output).map_err(report)?;
    for row in PerfReport::from_evaluation(evaluation, params) {
        writeln!(output, "{row}").map_err(report)?;
    }
    output.flush().map_err(report)
}

fn opt<T: fmt::Display>(value: Option<T>) -> String {
    value.map_or_else(|| "NA".to_string(), |v| v.to_string())
}

impl fmt::Display for PerfReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{},{},{},{},{},{},",
            self.strategy,
            self.count,
            self.secondary_count,
            self.trials,
            self.successes,
            opt(self.clock),
        )?;
        match self.stats {
            Some(s) => write!(
                f,
                "{:18.15},{:18.15},{:18.15},{:18.15},{},",
                s.min_time, s.median_time, s.max_time, s.avg_time, s.stddev_time
            )?,
            None => write!(f, "NA,NA,NA,NA,NA,")?,
        }
        write!(
            f,
            "{},{},{}",
            opt(self.aggregate.nanos()),
            opt(self.throughput),
            self.winner,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::runner::TimingResult;

    fn outcome(trials: Vec<TimingResult>, aggregate: Aggregate) -> StrategyOutcome {
        StrategyOutcome {
            strategy: ExecutionStrategy::StaticDispatch,
            trials,
            aggregate,
        }
    }

    #[test]
    fn report_of_a_measured_strategy() {
        let trials = [4_000_000, 1_000_000, 3_000_000]
            .into_iter()
            .map(|ns| {
                TimingResult::measured(ExecutionStrategy::StaticDispatch, ns, ClockSource::Device)
            })
            .collect();
        let params = ParameterSet::new(vec![1.0; 10], 0).unwrap();
        let report = PerfReport::new(&outcome(trials, Aggregate::Measured(1e6)), &params, true);

        assert_eq!(report.successes, 2);
        let stats = report.stats.unwrap();
        assert_eq!(stats.min_time, 1.0);
        assert_eq!(stats.max_time, 3.0);
        assert_eq!(stats.median_time, 2.0);
        assert_eq!(report.throughput, Some(10_000.0));

        let line = report.to_string();
        assert!(line.starts_with("static dispatch,10,0,3,2,device,"));
        assert!(line.ends_with(",true"));
    }

    #[test]
    fn report_of_an_unavailable_strategy() {
        let trials = vec![TimingResult::failure(
            ExecutionStrategy::StaticDispatch,
            BenchError::Sync("lost".to_string()),
        )];
        let params = ParameterSet::new(vec![1.0], 0).unwrap();
        let report = PerfReport::new(&outcome(trials, Aggregate::Unavailable), &params, false);
        assert_eq!(
            report.to_string(),
            "static dispatch,1,0,1,0,NA,NA,NA,NA,NA,NA,NA,NA,false"
        );
    }

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
            Err(std::io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn evaluation() -> Evaluation {
        let trials = vec![TimingResult::measured(
            ExecutionStrategy::StaticDispatch,
            5,
            ClockSource::Host,
        )];
        Evaluation {
            outcomes: vec![outcome(trials, Aggregate::Measured(5.0))],
            verdict: Some(ExecutionStrategy::StaticDispatch),
        }
    }

    #[test]
    fn csv_has_a_row_per_strategy() {
        let params = ParameterSet::new(vec![1.0], 0).unwrap();
        let mut csv = Vec::new();
        write_csv(&mut csv, &evaluation(), &params).unwrap();
        let csv = String::from_utf8(csv).unwrap();
        assert_eq!(csv.lines().count(), 2);
        assert!(csv.lines().nth(1).unwrap().ends_with(",true"));
    }

    #[test]
    fn unwritable_output_is_a_report_failure() {
        let params = ParameterSet::new(vec![1.0], 0).unwrap();
        let err = write_csv(&mut BrokenPipe, &evaluation(), &params).unwrap_err();
        assert!(matches!(err, BenchError::Report(_)));
        assert_eq!(err.status_code(), 8);
    }

    #[test]
    fn header_and_rows_have_the_same_arity() {
        let mut header = Vec::new();
        PerfReport::print_csv_header(&mut header).unwrap();
        let header = String::from_utf8(header).unwrap();
        assert_eq!(header.trim_end().split(',').count(), 14);
    }
}
