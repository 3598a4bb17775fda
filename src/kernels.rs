//! Kernel implementations.
//!
//! This modules contains the device kernel descriptors and their host counterparts, which the
//! host-emulation runtime executes in place of a device.

pub mod device {
    //! Device kernel descriptors.

    /// Represents a device kernel.
    ///
    /// Kernels are written in OpenCL C and imported as raw text. All strategies share one source
    /// file and differ by entry point; the secondary-count layout is selected at build time with
    /// the `VARIATE_BUFFER` definition.
    #[derive(Debug)]
    pub struct DeviceKernel {
        kernel_name: &'static str,
        kernel_source: &'static str,
    }

    impl DeviceKernel {
        /// Creates a `DeviceKernel` from a kernel name (actual name of the kernel function in the
        /// source code) and a kernel source code (generally a file's contents).
        pub const fn new(kernel_name: &'static str, kernel_source: &'static str) -> Self {
            Self {
                kernel_name,
                kernel_source,
            }
        }

        /// Returns the function name of the given kernel.
        pub fn name(&self) -> &'static str {
            self.kernel_name
        }

        /// Returns the source code for the given kernel.
        pub fn source(&self) -> &'static str {
            self.kernel_source
        }
    }

    /// Source code shared by the exponential sampling kernels.
    pub const CL_EXPONENTIAL_SOURCE: &str = include_str!("../kernels/opencl/exponential.cl");

    /// Exponential sampling through a distribution object in private memory.
    pub static CL_SAMPLE_WITH_OBJECT: DeviceKernel =
        DeviceKernel::new("sample_with_object", CL_EXPONENTIAL_SOURCE);

    /// Exponential sampling through the static quantile function.
    pub static CL_SAMPLE_STATIC: DeviceKernel =
        DeviceKernel::new("sample_static", CL_EXPONENTIAL_SOURCE);

    /// Exponential sampling through a distribution object in global memory.
    pub static CL_SAMPLE_GLOBAL_SCRATCH: DeviceKernel =
        DeviceKernel::new("sample_global_scratch", CL_EXPONENTIAL_SOURCE);

    /// Exponential sampling through a distribution object in local memory.
    pub static CL_SAMPLE_LOCAL_SCRATCH: DeviceKernel =
        DeviceKernel::new("sample_local_scratch", CL_EXPONENTIAL_SOURCE);
}

pub mod host {
    //! Host implementations of the device kernels.
    //!
    //! Each function mirrors the OpenCL entry point of the same name: same per-work-item uniform
    //! stream, same placement of the distribution object. Work-items run in parallel with
    //! [`rayon`][1].
    //!
    //! [1]: https://crates.io/crates/rayon

    use crate::consts::STREAM_STRIDE;

    use rayon::prelude::*;

    /// Source of the uniform variates consumed by a launch.
    #[derive(Clone, Copy, Debug)]
    pub enum Draws<'a> {
        /// Every work-item draws `count` variates from its own stream and writes their sum.
        Stream { count: usize, seed: u64 },
        /// Work-item `(i, j)` samples with `variates[j]`.
        Variates(&'a [f64]),
    }

    impl Draws<'_> {
        /// Number of output values per parameter.
        pub fn row_len(&self) -> usize {
            match self {
                Self::Stream { .. } => 1,
                Self::Variates(v) => v.len(),
            }
        }
    }

    pub fn splitmix64(state: &mut u64) -> u64 {
        *state = state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = *state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Next uniform variate of a stream, in the open interval `(0, 1)`.
    pub fn next_u01(state: &mut u64) -> f64 {
        ((splitmix64(state) >> 11) as f64 + 0.5) * (1.0 / (1_u64 << 53) as f64)
    }

    /// Initial state of the stream of work-item `gid`.
    pub fn stream_seed(seed: u64, gid: usize) -> u64 {
        seed ^ (gid as u64).wrapping_add(1).wrapping_mul(STREAM_STRIDE)
    }

    /// Exponential distribution object.
    #[derive(Clone, Copy, Debug)]
    pub struct Exponential {
        lambda: f64,
    }

    impl Exponential {
        pub fn new(lambda: f64) -> Self {
            Self { lambda }
        }

        pub fn sample(&self, u: f64) -> f64 {
            exponential_quantile(self.lambda, u)
        }
    }

    pub fn exponential_quantile(lambda: f64, u: f64) -> f64 {
        -(-u).ln_1p() / lambda
    }

    fn fill_row(row: &mut [f64], gid: usize, draws: Draws<'_>, sample: impl Fn(f64) -> f64) {
        match draws {
            Draws::Stream { count, seed } => {
                let mut stream = stream_seed(seed, gid);
                let mut acc = 0.0;
                for _ in 0..count {
                    acc += sample(next_u01(&mut stream));
                }
                row[0] = acc;
            }
            Draws::Variates(variates) => row
                .iter_mut()
                .zip(variates)
                .for_each(|(out, &u)| *out = sample(u)),
        }
    }

    /// Host counterpart of `sample_with_object`.
    pub fn sample_with_object(lambdas: &[f64], draws: Draws<'_>, out: &mut [f64]) {
        out.par_chunks_mut(draws.row_len())
            .zip(lambdas.par_iter())
            .enumerate()
            .for_each(|(gid, (row, &lambda))| {
                let dist = Exponential::new(lambda);
                fill_row(row, gid, draws, |u| dist.sample(u));
            });
    }

    /// Host counterpart of `sample_static`.
    pub fn sample_static(lambdas: &[f64], draws: Draws<'_>, out: &mut [f64]) {
        out.par_chunks_mut(draws.row_len())
            .zip(lambdas.par_iter())
            .enumerate()
            .for_each(|(gid, (row, &lambda))| {
                fill_row(row, gid, draws, |u| exponential_quantile(lambda, u));
            });
    }

    /// Host counterpart of `sample_global_scratch`.
    ///
    /// `scratch` holds one object slot per work-item, in the same layout as `out`.
    pub fn sample_global_scratch(
        lambdas: &[f64],
        draws: Draws<'_>,
        scratch: &mut [f64],
        out: &mut [f64],
    ) {
        let row_len = draws.row_len();
        out.par_chunks_mut(row_len)
            .zip(scratch.par_chunks_mut(row_len))
            .zip(lambdas.par_iter())
            .enumerate()
            .for_each(|(gid, ((row, slots), &lambda))| match draws {
                Draws::Stream { .. } => {
                    slots[0] = lambda;
                    let slot = &slots[0];
                    fill_row(row, gid, draws, |u| Exponential::new(*slot).sample(u));
                }
                Draws::Variates(variates) => {
                    for ((out, slot), &u) in row.iter_mut().zip(slots.iter_mut()).zip(variates) {
                        *slot = lambda;
                        *out = Exponential::new(*slot).sample(u);
                    }
                }
            });
    }

    /// Host counterpart of `sample_local_scratch`.
    ///
    /// Work-items are grouped by `group_size`; each group owns a private copy of the local
    /// memory region.
    pub fn sample_local_scratch(
        lambdas: &[f64],
        draws: Draws<'_>,
        group_size: usize,
        out: &mut [f64],
    ) {
        let row_len = draws.row_len();
        out.par_chunks_mut(group_size * row_len)
            .zip(lambdas.par_chunks(group_size))
            .enumerate()
            .for_each(|(group, (rows, group_lambdas))| {
                let mut local = vec![0.0; group_size];
                for (lid, (row, &lambda)) in
                    rows.chunks_mut(row_len).zip(group_lambdas).enumerate()
                {
                    local[lid] = lambda;
                    let slot = local[lid];
                    fill_row(row, group * group_size + lid, draws, |u| {
                        Exponential::new(slot).sample(u)
                    });
                }
            });
    }

}
