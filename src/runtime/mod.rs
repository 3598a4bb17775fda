//! Device runtimes.
//!
//! The harness never talks to an accelerator API directly: it goes through the [`DeviceRuntime`]
//! trait, implemented by a session wrapping an already established context/device/queue triple.
//! Two implementations are provided:
//! - [`host::HostRuntime`] emulates a device on the CPU (always available, used by the tests);
//! - [`opencl::ClSession`] wraps OpenCL handles through the [`ocl`][1] crate (requires the
//!   `opencl` feature).
//!
//! [1]: https://crates.io/crates/ocl

pub mod host;
#[cfg(feature = "opencl")]
pub mod opencl;

use crate::{error::Result, kernels::device::DeviceKernel, strategy::SecondaryPolicy};

use std::fmt;

/// Direction of the data held by a device buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    HostToDevice,
    DeviceToHost,
    ScratchOnly,
}

/// Role of a device buffer in a kernel launch. All buffers hold `f64` elements.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferKind {
    /// Distribution parameters.
    Parameters,
    /// Host-generated uniform variates.
    Variates,
    /// Per-work-item distribution objects in global memory.
    Scratch,
    /// Kernel results.
    Output,
}

impl BufferKind {
    pub fn direction(self) -> Direction {
        match self {
            Self::Parameters | Self::Variates => Direction::HostToDevice,
            Self::Scratch => Direction::ScratchOnly,
            Self::Output => Direction::DeviceToHost,
        }
    }
}

impl fmt::Display for BufferKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Parameters => write!(f, "parameters"),
            Self::Variates => write!(f, "variates"),
            Self::Scratch => write!(f, "scratch"),
            Self::Output => write!(f, "output"),
        }
    }
}

/// Work-item geometry of a launch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Geometry {
    Linear {
        global: usize,
        local: Option<usize>,
    },
    Planar {
        global: [usize; 2],
        local: Option<[usize; 2]>,
    },
}

impl Geometry {
    /// Total number of work-items launched.
    pub fn work_items(&self) -> usize {
        match self {
            Self::Linear { global, .. } => *global,
            Self::Planar { global, .. } => global[0] * global[1],
        }
    }
}

/// Where the kernel finds its per-work-item distribution objects.
#[derive(Debug)]
pub enum ScratchArg<'a, B> {
    Private,
    /// Local memory region of `len` elements per work-group.
    Local { len: usize },
    Global(&'a B),
}

/// Arguments of a kernel launch, in the order of the kernel signature.
#[derive(Debug)]
pub struct Launch<'a, B> {
    pub kernel: &'static DeviceKernel,
    pub geometry: Geometry,
    /// Number of parameters (`n`).
    pub count: usize,
    /// Variates consumed per parameter.
    pub draws: usize,
    pub seed: u64,
    pub params: &'a B,
    pub variates: Option<&'a B>,
    pub scratch: ScratchArg<'a, B>,
    pub output: &'a B,
}

/// Device runtime primitives consumed by the harness.
///
/// Buffers are owned values: [`DeviceRuntime::free`] consumes them, so a region cannot be freed
/// twice. Callers go through [`crate::buffer::DeviceBuffer`], which frees on drop.
pub trait DeviceRuntime {
    type Buffer;
    type Program;
    type Event;

    /// Checks that the session can accept work.
    fn validate(&self) -> Result<()>;

    /// Reserves `len` elements of device memory.
    fn allocate(&self, kind: BufferKind, len: usize) -> Result<Self::Buffer>;

    /// Blocking host to device copy.
    fn write(&self, buffer: &mut Self::Buffer, data: &[f64]) -> Result<()>;

    /// Blocking device to host copy.
    fn read(&self, buffer: &Self::Buffer, data: &mut [f64]) -> Result<()>;

    fn free(&self, buffer: Self::Buffer);

    /// Builds `kernel` for the given secondary layout and looks up its entry point.
    fn build(&self, kernel: &'static DeviceKernel, layout: SecondaryPolicy)
        -> Result<Self::Program>;

    /// Enqueues a launch; returns without waiting for its completion.
    fn launch(&self, program: &Self::Program, launch: &Launch<'_, Self::Buffer>)
        -> Result<Self::Event>;

    /// Blocks until the launch completes. Returns the device-side duration in nanoseconds when
    /// the session records event timestamps.
    fn wait(&self, event: Self::Event) -> Result<Option<u64>>;
}
