use probdist_perf::{
    drivers::{Aggregate, BenchmarkDriver, DriverConfig},
    drivers::runner::KernelRunner,
    options::{option1, option2, option3},
    params::{OptionData, ParameterSet},
    runtime::{
        host::{FaultPlan, HostRuntime},
        BufferKind,
    },
    strategy::{ExecutionStrategy, SecondaryPolicies, SecondaryPolicy},
};

#[test]
fn single_parameter_all_strategies_succeed() {
    let rt = HostRuntime::new();
    let params = ParameterSet::try_from(&OptionData {
        n: 1,
        n1: 0,
        lambda_arr: vec![1.0],
    })
    .unwrap();

    let evaluation = BenchmarkDriver::new(&rt, DriverConfig::default())
        .evaluate(&params, 3)
        .unwrap();

    assert_eq!(evaluation.outcomes.len(), 4);
    for outcome in &evaluation.outcomes {
        match outcome.aggregate {
            Aggregate::Measured(ns) => assert!(ns >= 0.0, "{}", outcome.strategy),
            Aggregate::Unavailable => panic!("{} unavailable", outcome.strategy),
        }
    }
    let winner = evaluation.verdict.expect("a verdict");
    assert!(ExecutionStrategy::ALL.contains(&winner));
    assert!(rt.ledger().is_balanced());
}

#[test]
fn failing_global_scratch_allocation_only_disables_that_strategy() {
    let rt = HostRuntime::with_faults(FaultPlan::new().fail_allocation(BufferKind::Scratch));
    let params = ParameterSet::random(256, 4, Some(42)).unwrap();

    let evaluation = BenchmarkDriver::new(&rt, DriverConfig::default())
        .evaluate(&params, 3)
        .unwrap();

    assert_eq!(
        evaluation.aggregate(ExecutionStrategy::GlobalMemoryScratch),
        Some(Aggregate::Unavailable)
    );
    for strategy in [
        ExecutionStrategy::ObjectDispatch,
        ExecutionStrategy::StaticDispatch,
        ExecutionStrategy::LocalMemoryScratch,
    ] {
        assert!(evaluation.outcome(strategy).unwrap().is_available());
    }
    let winner = evaluation.verdict.expect("a verdict");
    assert_ne!(winner, ExecutionStrategy::GlobalMemoryScratch);

    let failures = &evaluation
        .outcome(ExecutionStrategy::GlobalMemoryScratch)
        .unwrap()
        .trials;
    assert!(failures.iter().all(|t| t.status_code == 1 && t.elapsed_ns < 0));
    assert!(rt.ledger().is_balanced());
}

#[test]
fn success_and_failure_are_mutually_exclusive() {
    let faulty = HostRuntime::with_faults(FaultPlan::new().fail_transfer(BufferKind::Variates));
    let healthy = HostRuntime::new();
    let policies = SecondaryPolicies::default()
        .with(ExecutionStrategy::StaticDispatch, SecondaryPolicy::VariateBuffer)
        .with(ExecutionStrategy::LocalMemoryScratch, SecondaryPolicy::VariateBuffer);

    for rt in [&faulty, &healthy] {
        let runner = KernelRunner::new(rt, policies, 7);
        for count in [1, 63, 64, 65, 300] {
            for n1 in [0, 1, 5] {
                let params = ParameterSet::random(count, n1, Some(count as u64)).unwrap();
                for strategy in ExecutionStrategy::ALL {
                    let before = rt.ledger();
                    let result = runner.run(strategy, &params);
                    if result.is_success() {
                        assert!(result.elapsed_ns >= 0);
                        assert!(result.error.is_none());
                    } else {
                        assert!(result.elapsed_ns < 0);
                        assert!(result.elapsed().is_none());
                        assert!(result.error.is_some());
                    }
                    let after = rt.ledger();
                    assert_eq!(
                        after.allocations - before.allocations,
                        after.releases - before.releases,
                        "{strategy} leaked with n = {count}, n1 = {n1}"
                    );
                    assert_eq!(after.outstanding_bytes(), 0);
                }
            }
        }
    }
}

#[test]
fn variate_transfer_failure_only_hits_variate_buffer_strategies() {
    let rt = HostRuntime::with_faults(FaultPlan::new().fail_transfer(BufferKind::Variates));
    let config = DriverConfig {
        policies: SecondaryPolicies::default()
            .with(ExecutionStrategy::ObjectDispatch, SecondaryPolicy::VariateBuffer),
        ..DriverConfig::default()
    };
    let params = ParameterSet::random(32, 3, None).unwrap();
    let evaluation = BenchmarkDriver::new(&rt, config).evaluate(&params, 2).unwrap();

    assert_eq!(
        evaluation.aggregate(ExecutionStrategy::ObjectDispatch),
        Some(Aggregate::Unavailable)
    );
    assert_ne!(evaluation.verdict, Some(ExecutionStrategy::ObjectDispatch));
    assert!(evaluation.verdict.is_some());
}

#[test]
fn named_entry_points_report_distinct_failures() {
    let data = OptionData {
        n: 8,
        n1: 2,
        lambda_arr: vec![1.5; 8],
    };

    assert_eq!(option1(&HostRuntime::new(), &data), 0);

    let no_scratch = HostRuntime::with_faults(
        FaultPlan::new()
            .fail_allocation(BufferKind::Scratch)
            .fail_launch(&probdist_perf::kernels::device::CL_SAMPLE_LOCAL_SCRATCH),
    );
    // Global scratch fails first, so its kind is the one reported.
    assert_eq!(option2(&no_scratch, &data), 1);
    assert_eq!(option3(&no_scratch, &data), 0);

    let offline = HostRuntime::with_faults(FaultPlan::new().unavailable());
    assert_eq!(option3(&offline, &data), 6);
}
