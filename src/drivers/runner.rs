//! Kernel runner.
//!
//! This module implements one timed run of a strategy: stage the buffers, build the strategy's
//! kernel, launch it, wait for its completion and release everything before returning.
//!
//! Only the interval between the enqueue and the completion of the launch is measured. Buffer
//! staging and kernel builds happen before the start marker; the output read-back happens after
//! the completion marker.

use crate::{
    buffer::DeviceBuffer,
    consts::{INVALID_ELAPSED, WORK_GROUP_SIZE},
    error::{BenchError, Result, STATUS_SUCCESS},
    params::ParameterSet,
    runtime::{BufferKind, DeviceRuntime, Geometry, Launch, ScratchArg},
    strategy::{ExecutionStrategy, ScratchSpace, SecondaryPolicies, SecondaryPolicy},
    utils::{rand_variates, round_up},
};

use tracing::{debug, warn};

use std::{fmt, time::Instant};

/// Clock an elapsed time was measured with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockSource {
    /// Start/end timestamps of the launch event.
    Device,
    /// Host wall clock around the enqueue and the blocking wait.
    Host,
}

impl fmt::Display for ClockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device => write!(f, "device"),
            Self::Host => write!(f, "host"),
        }
    }
}

/// Outcome of a single timed run.
#[derive(Clone, Debug, PartialEq)]
pub struct TimingResult {
    pub strategy: ExecutionStrategy,
    pub status_code: i32,
    /// Nanoseconds from enqueue to completion, or [`INVALID_ELAPSED`] on failure.
    pub elapsed_ns: i64,
    /// Clock used for `elapsed_ns`; `None` on failure.
    pub clock: Option<ClockSource>,
    /// Sum of the values written by the kernel; `None` on failure.
    pub checksum: Option<f64>,
    pub error: Option<BenchError>,
}

impl TimingResult {
    fn success(strategy: ExecutionStrategy, measurement: Measurement) -> Self {
        Self {
            strategy,
            status_code: STATUS_SUCCESS,
            elapsed_ns: i64::try_from(measurement.elapsed_ns).unwrap_or(i64::MAX),
            clock: Some(measurement.clock),
            checksum: Some(measurement.checksum),
            error: None,
        }
    }

    /// Failed run of `strategy`.
    pub fn failure(strategy: ExecutionStrategy, error: BenchError) -> Self {
        Self {
            strategy,
            status_code: error.status_code(),
            elapsed_ns: INVALID_ELAPSED,
            clock: None,
            checksum: None,
            error: Some(error),
        }
    }

    /// Successful run of `strategy` that took `elapsed_ns`, as measured by `clock`.
    #[cfg(test)]
    pub(crate) fn measured(strategy: ExecutionStrategy, elapsed_ns: u64, clock: ClockSource) -> Self {
        Self::success(
            strategy,
            Measurement {
                elapsed_ns,
                clock,
                checksum: 0.0,
            },
        )
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_SUCCESS
    }

    /// Elapsed nanoseconds, only for successful runs.
    pub fn elapsed(&self) -> Option<u64> {
        if self.is_success() {
            u64::try_from(self.elapsed_ns).ok()
        } else {
            None
        }
    }
}

struct Measurement {
    elapsed_ns: u64,
    clock: ClockSource,
    checksum: f64,
}

/// Work-item geometry of `strategy` for `count` parameters and `draws` variates per parameter.
pub fn launch_geometry(
    scratch: ScratchSpace,
    policy: SecondaryPolicy,
    count: usize,
    draws: usize,
) -> Geometry {
    let grouped = scratch == ScratchSpace::Local;
    match policy {
        SecondaryPolicy::Iterations if grouped => Geometry::Linear {
            global: round_up(count, WORK_GROUP_SIZE),
            local: Some(WORK_GROUP_SIZE),
        },
        SecondaryPolicy::Iterations => Geometry::Linear {
            global: count,
            local: None,
        },
        SecondaryPolicy::VariateBuffer if grouped => Geometry::Planar {
            global: [round_up(count, WORK_GROUP_SIZE), draws],
            local: Some([WORK_GROUP_SIZE, 1]),
        },
        SecondaryPolicy::VariateBuffer => Geometry::Planar {
            global: [count, draws],
            local: None,
        },
    }
}

/// Runs strategies against a device session, one timed launch at a time.
pub struct KernelRunner<'r, R: DeviceRuntime> {
    runtime: &'r R,
    policies: SecondaryPolicies,
    seed: u64,
}

impl<'r, R: DeviceRuntime> KernelRunner<'r, R> {
    pub fn new(runtime: &'r R, policies: SecondaryPolicies, seed: u64) -> Self {
        Self {
            runtime,
            policies,
            seed,
        }
    }

    /// Runs `strategy` once over `params`.
    ///
    /// Never fails: errors are folded into the returned [`TimingResult`]. Every buffer staged
    /// for the run is released before this returns.
    pub fn run(&self, strategy: ExecutionStrategy, params: &ParameterSet) -> TimingResult {
        match self.try_run(strategy, params) {
            Ok(measurement) => {
                debug!(
                    %strategy,
                    elapsed_ns = measurement.elapsed_ns,
                    clock = %measurement.clock,
                    checksum = measurement.checksum,
                    "run completed"
                );
                TimingResult::success(strategy, measurement)
            }
            Err(error) => {
                warn!(%strategy, status = error.status_code(), %error, "run failed");
                TimingResult::failure(strategy, error)
            }
        }
    }

    fn try_run(&self, strategy: ExecutionStrategy, params: &ParameterSet) -> Result<Measurement> {
        let rt = self.runtime;
        let recipe = strategy.recipe();
        let policy = self.policies.get(strategy);
        let count = params.count();
        let draws = params.effective_secondary_count();
        let geometry = launch_geometry(recipe.scratch, policy, count, draws);
        let out_len = match policy {
            SecondaryPolicy::Iterations => count,
            SecondaryPolicy::VariateBuffer => count * draws,
        };

        // 1. Stage buffers
        let d_params = DeviceBuffer::stage(rt, BufferKind::Parameters, params.values())?;
        let d_variates = match policy {
            SecondaryPolicy::Iterations => None,
            SecondaryPolicy::VariateBuffer => Some(DeviceBuffer::stage(
                rt,
                BufferKind::Variates,
                &rand_variates(draws, Some(self.seed)),
            )?),
        };
        let d_scratch = match recipe.scratch {
            ScratchSpace::Global => Some(DeviceBuffer::allocate(rt, BufferKind::Scratch, out_len)?),
            ScratchSpace::Private | ScratchSpace::Local => None,
        };
        let d_out = DeviceBuffer::allocate(rt, BufferKind::Output, out_len)?;

        // 2. Build the strategy's kernel variant
        let program = rt.build(recipe.kernel, policy)?;

        let launch = Launch {
            kernel: recipe.kernel,
            geometry,
            count,
            draws,
            seed: self.seed,
            params: d_params.raw(),
            variates: d_variates.as_ref().map(DeviceBuffer::raw),
            scratch: match (recipe.scratch, &d_scratch) {
                (ScratchSpace::Global, Some(scratch)) => ScratchArg::Global(scratch.raw()),
                (ScratchSpace::Local, _) => ScratchArg::Local {
                    len: WORK_GROUP_SIZE,
                },
                _ => ScratchArg::Private,
            },
            output: d_out.raw(),
        };
        debug!(
            %strategy,
            kernel = recipe.kernel.name(),
            ?policy,
            work_items = geometry.work_items(),
            "launching"
        );

        // 3. Enqueue and block until completion
        let start = Instant::now();
        let event = rt.launch(&program, &launch)?;
        let device_ns = rt.wait(event)?;
        let wall = start.elapsed();

        let (elapsed_ns, clock) = match device_ns {
            Some(ns) => (ns, ClockSource::Device),
            None => (
                u64::try_from(wall.as_nanos()).unwrap_or(u64::MAX),
                ClockSource::Host,
            ),
        };

        // 4. Read back the results, outside of the timed interval
        let mut h_out = vec![0.0; out_len];
        d_out.read(&mut h_out)?;
        let checksum: f64 = h_out.iter().sum();

        // 5. Release, in reverse staging order
        d_out.release();
        if let Some(scratch) = d_scratch {
            scratch.release();
        }
        if let Some(variates) = d_variates {
            variates.release();
        }
        d_params.release();

        Ok(Measurement {
            elapsed_ns,
            clock,
            checksum,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        kernels::device::{CL_SAMPLE_GLOBAL_SCRATCH, CL_SAMPLE_LOCAL_SCRATCH, CL_SAMPLE_STATIC},
        runtime::host::{FaultPlan, HostRuntime},
    };

    fn params(count: usize, n1: usize) -> ParameterSet {
        ParameterSet::random(count, n1, Some(3)).unwrap()
    }

    #[test]
    fn every_strategy_succeeds_with_a_single_parameter() {
        let rt = HostRuntime::new();
        let runner = KernelRunner::new(&rt, SecondaryPolicies::default(), 1);
        let params = ParameterSet::new(vec![1.0], 0).unwrap();
        for strategy in ExecutionStrategy::ALL {
            let result = runner.run(strategy, &params);
            assert!(result.is_success(), "{strategy}: {:?}", result.error);
            assert!(result.elapsed_ns >= 0);
            assert_eq!(result.clock, Some(ClockSource::Device));
            assert!(rt.ledger().is_balanced());
        }
    }

    #[test]
    fn strategies_do_the_same_work() {
        for policy in [SecondaryPolicy::Iterations, SecondaryPolicy::VariateBuffer] {
            let rt = HostRuntime::new();
            let runner = KernelRunner::new(&rt, SecondaryPolicies::uniform(policy), 9);
            let params = params(130, 3);
            let checksums: Vec<_> = ExecutionStrategy::ALL
                .iter()
                .map(|&s| runner.run(s, &params).checksum.unwrap())
                .collect();
            assert!(checksums.iter().all(|&c| c == checksums[0]), "{checksums:?}");
        }
    }

    #[test]
    fn host_clock_is_used_without_device_timestamps() {
        let rt = HostRuntime::new().without_profiling();
        let runner = KernelRunner::new(&rt, SecondaryPolicies::default(), 1);
        let result = runner.run(ExecutionStrategy::StaticDispatch, &params(16, 2));
        assert!(result.is_success());
        assert_eq!(result.clock, Some(ClockSource::Host));
    }

    #[test]
    fn each_failure_kind_is_reported_and_buffers_released() {
        let cases = [
            (
                FaultPlan::new().fail_allocation(BufferKind::Output),
                ExecutionStrategy::ObjectDispatch,
                1,
            ),
            (
                FaultPlan::new().fail_transfer(BufferKind::Output),
                ExecutionStrategy::ObjectDispatch,
                2,
            ),
            (
                FaultPlan::new().fail_build(&CL_SAMPLE_STATIC),
                ExecutionStrategy::StaticDispatch,
                3,
            ),
            (
                FaultPlan::new().fail_launch(&CL_SAMPLE_LOCAL_SCRATCH),
                ExecutionStrategy::LocalMemoryScratch,
                4,
            ),
            (
                FaultPlan::new().fail_sync(&CL_SAMPLE_GLOBAL_SCRATCH),
                ExecutionStrategy::GlobalMemoryScratch,
                5,
            ),
        ];

        for (faults, strategy, status) in cases {
            let rt = HostRuntime::with_faults(faults);
            let runner = KernelRunner::new(
                &rt,
                SecondaryPolicies::uniform(SecondaryPolicy::VariateBuffer),
                1,
            );
            let result = runner.run(strategy, &params(8, 2));
            assert_eq!(result.status_code, status, "{strategy}");
            assert_eq!(result.elapsed_ns, INVALID_ELAPSED);
            assert_eq!(result.elapsed(), None);
            assert!(result.checksum.is_none());
            assert!(rt.ledger().is_balanced(), "{strategy}: {:?}", rt.ledger());
            assert_eq!(rt.live_buffers(), 0);
        }
    }

    #[test]
    fn consecutive_runs_are_independent() {
        let rt = HostRuntime::new();
        let runner = KernelRunner::new(&rt, SecondaryPolicies::default(), 5);
        let params = params(64, 1);
        let first = runner.run(ExecutionStrategy::GlobalMemoryScratch, &params);
        let after_first = rt.ledger();
        let second = runner.run(ExecutionStrategy::GlobalMemoryScratch, &params);
        assert_eq!(first.checksum, second.checksum);
        assert!(after_first.is_balanced());
        assert!(rt.ledger().is_balanced());
        assert_eq!(rt.ledger().allocations, 2 * after_first.allocations);
    }

    #[test]
    fn local_scratch_rounds_the_global_size_up() {
        let geometry = launch_geometry(
            ScratchSpace::Local,
            SecondaryPolicy::VariateBuffer,
            WORK_GROUP_SIZE + 1,
            3,
        );
        assert_eq!(
            geometry,
            Geometry::Planar {
                global: [2 * WORK_GROUP_SIZE, 3],
                local: Some([WORK_GROUP_SIZE, 1]),
            }
        );
        assert_eq!(
            launch_geometry(ScratchSpace::Private, SecondaryPolicy::Iterations, 7, 3),
            Geometry::Linear {
                global: 7,
                local: None
            }
        );
    }
}
