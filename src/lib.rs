//! probdist-perf - strategy selection for probability-distribution kernels
//!
//! # About
//! probdist-perf times alternative ways of invoking a probability distribution on a compute
//! accelerator, and tells which one is the fastest for a given parameter set. It compares four
//! execution strategies:
//! - object dispatch: the distribution object is built in private memory and sampled through its
//!   method;
//! - static dispatch: the distribution's static quantile function is called directly;
//! - global memory scratch: the distribution object lives in global memory;
//! - local memory scratch: the distribution object lives in local memory.
//!
//! The benchmarked distribution is an exponential distribution, parameterized by its rate.
//!
//! # Quickstart
//! ## Build
//! The host-emulation backend is always available. Benchmarking an OpenCL device requires an
//! [OpenCL 1.2+][1] library and the `opencl` feature:
//! ```sh
//! cargo build --release --features opencl
//! ```
//!
//! ## Example run
//! To compare all four strategies on the first OpenCL device, with 2^20 random rates and 16
//! draws per rate:
//! ```sh
//! cargo run --release --features opencl -- --backend opencl -n 1048576 --n1 16 option3
//! ```
//!
//! ## Library usage
//! ```
//! use probdist_perf::{options::option3, params::OptionData, runtime::host::HostRuntime};
//!
//! let runtime = HostRuntime::new();
//! let data = OptionData { n: 1, n1: 0, lambda_arr: vec![1.0] };
//! assert_eq!(option3(&runtime, &data), 0);
//! ```
//!
//! [1]: https://www.khronos.org/opencl/

pub mod buffer;
pub mod cli;
pub mod consts;
pub mod drivers;
pub mod error;
pub mod kernels;
pub mod options;
pub mod params;
pub mod perf_report;
pub mod runtime;
pub mod strategy;
pub mod utils;
