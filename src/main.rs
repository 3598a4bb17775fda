use probdist_perf::{
    cli::{Backend, CliArgs, OptionCmd},
    consts::DEFAULT_SEED,
    drivers::{BenchmarkDriver, DriverConfig, Evaluation},
    error::{BenchError, Result},
    options::{self, BenchOption},
    params::ParameterSet,
    perf_report,
    runtime::{host::HostRuntime, DeviceRuntime},
    strategy::SecondaryPolicies,
};

use clap::Parser;
use tracing::error;

use std::{
    fs::OpenOptions,
    io::{stdout, Write},
    process::ExitCode,
};

fn setup_logging(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run_on<R: DeviceRuntime>(
    runtime: &R,
    args: &CliArgs,
    params: &ParameterSet,
) -> Result<Evaluation> {
    let config = DriverConfig {
        statistic: args.statistic,
        seed: args.seed.unwrap_or(DEFAULT_SEED),
        policies: SecondaryPolicies::uniform(args.secondary_policy),
        ..DriverConfig::default()
    };
    match args.option {
        OptionCmd::Evaluate { ref strategies } => {
            let config = DriverConfig {
                strategies: strategies.clone(),
                ..config
            };
            BenchmarkDriver::new(runtime, config).evaluate(params, args.trials)
        }
        ref cmd => {
            let option = cmd.bench_option().unwrap_or(BenchOption::Option3);
            options::run_option(option, runtime, params, config, args.trials)
        }
    }
}

#[cfg(feature = "opencl")]
fn run_opencl(args: &CliArgs, params: &ParameterSet) -> Result<Evaluation> {
    let session =
        probdist_perf::runtime::opencl::ClSession::from_indices(args.platform, args.device)?;
    run_on(&session, args, params)
}

#[cfg(not(feature = "opencl"))]
fn run_opencl(_args: &CliArgs, _params: &ParameterSet) -> Result<Evaluation> {
    Err(BenchError::DeviceUnavailable(
        "built without the `opencl` feature".to_string(),
    ))
}

fn write_reports(
    args: &CliArgs,
    evaluation: &Evaluation,
    params: &ParameterSet,
) -> Result<()> {
    let mut output: Box<dyn Write> = match args.output_file {
        Some(ref name) => Box::new(
            OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(name)
                .map_err(|e| BenchError::Report(format!("{}: {e}", name.display())))?,
        ),
        None => Box::new(stdout()),
    };
    perf_report::write_csv(&mut output, evaluation, params)
}

fn main() -> ExitCode {
    let args = CliArgs::parse();
    setup_logging(args.verbose);

    let params = match args.rates {
        Some(ref rates) => ParameterSet::new(rates.clone(), args.secondary_count),
        None => ParameterSet::random(args.count, args.secondary_count, args.seed),
    };

    let outcome = params.and_then(|params| {
        eprintln!(
            "Parameters: n = {}, n1 = {}",
            params.count(),
            params.secondary_count()
        );
        let evaluation = match args.backend {
            Backend::Host => run_on(&HostRuntime::new(), &args, &params),
            Backend::Opencl => run_opencl(&args, &params),
        }?;
        if let Some(winner) = evaluation.verdict {
            eprintln!("Fastest strategy: {winner}");
        }
        write_reports(&args, &evaluation, &params)?;
        Ok(evaluation)
    });

    let status = options::status_code(&outcome);
    match &outcome {
        Ok(Evaluation { verdict: None, .. }) => {
            eprintln!("No strategy could be measured (status {status})")
        }
        Ok(_) => {}
        Err(e) => error!(%e, status, "benchmark aborted"),
    }
    ExitCode::from(u8::try_from(status).unwrap_or(u8::MAX))
}
