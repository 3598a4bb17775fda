//! Host emulation of a device.
//!
//! [`HostRuntime`] executes the kernels with their host counterparts (see
//! [`crate::kernels::host`]) and keeps "device" memory in host vectors. It records every
//! allocation and release in a [`Ledger`], and can be told to fail any step of the pipeline
//! through a [`FaultPlan`], which makes the failure paths of the harness observable without an
//! accelerator.

use super::{BufferKind, DeviceRuntime, Geometry, Launch, ScratchArg};
use crate::{
    error::{BenchError, Result},
    kernels::{
        device::{
            DeviceKernel, CL_SAMPLE_GLOBAL_SCRATCH, CL_SAMPLE_LOCAL_SCRATCH, CL_SAMPLE_STATIC,
            CL_SAMPLE_WITH_OBJECT,
        },
        host::{self, Draws},
    },
    strategy::SecondaryPolicy,
};

use tracing::trace;

use std::{cell::RefCell, collections::HashMap, mem::size_of, time::Instant};

/// Failures to inject into a [`HostRuntime`].
#[derive(Clone, Debug, Default)]
pub struct FaultPlan {
    unavailable: bool,
    allocation: Vec<BufferKind>,
    transfer: Vec<BufferKind>,
    build: Vec<&'static str>,
    launch: Vec<&'static str>,
    sync: Vec<&'static str>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session validation fails.
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Allocations of `kind` buffers fail.
    pub fn fail_allocation(mut self, kind: BufferKind) -> Self {
        self.allocation.push(kind);
        self
    }

    /// Copies to or from `kind` buffers fail.
    pub fn fail_transfer(mut self, kind: BufferKind) -> Self {
        self.transfer.push(kind);
        self
    }

    pub fn fail_build(mut self, kernel: &DeviceKernel) -> Self {
        self.build.push(kernel.name());
        self
    }

    pub fn fail_launch(mut self, kernel: &DeviceKernel) -> Self {
        self.launch.push(kernel.name());
        self
    }

    /// Waiting on launches of `kernel` fails.
    pub fn fail_sync(mut self, kernel: &DeviceKernel) -> Self {
        self.sync.push(kernel.name());
        self
    }
}

/// Device memory accounting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Ledger {
    pub allocations: usize,
    pub releases: usize,
    pub bytes_allocated: usize,
    pub bytes_released: usize,
}

impl Ledger {
    /// Bytes allocated and not yet released.
    pub fn outstanding_bytes(&self) -> usize {
        self.bytes_allocated - self.bytes_released
    }

    /// Whether every allocation has been released.
    pub fn is_balanced(&self) -> bool {
        self.allocations == self.releases && self.outstanding_bytes() == 0
    }
}

/// Handle to an emulated device region.
#[derive(Debug)]
pub struct HostBuffer {
    id: u64,
    kind: BufferKind,
    len: usize,
}

/// Built program: a resolved entry point.
#[derive(Debug)]
pub struct HostProgram {
    entry: &'static str,
    layout: SecondaryPolicy,
}

/// Completed launch.
#[derive(Debug)]
pub struct HostEvent {
    kernel: &'static str,
    device_ns: u64,
}

#[derive(Debug, Default)]
struct Memory {
    next_id: u64,
    regions: HashMap<u64, Vec<f64>>,
    ledger: Ledger,
}

/// CPU-backed device runtime.
#[derive(Debug)]
pub struct HostRuntime {
    profiling: bool,
    faults: FaultPlan,
    memory: RefCell<Memory>,
}

impl Default for HostRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRuntime {
    /// Creates a runtime that reports emulated device timestamps.
    pub fn new() -> Self {
        Self {
            profiling: true,
            faults: FaultPlan::default(),
            memory: RefCell::new(Memory::default()),
        }
    }

    pub fn with_faults(faults: FaultPlan) -> Self {
        Self {
            faults,
            ..Self::new()
        }
    }

    /// Stops reporting device timestamps, so that callers fall back to the host clock.
    pub fn without_profiling(mut self) -> Self {
        self.profiling = false;
        self
    }

    pub fn ledger(&self) -> Ledger {
        self.memory.borrow().ledger
    }

    /// Number of regions currently allocated.
    pub fn live_buffers(&self) -> usize {
        self.memory.borrow().regions.len()
    }

    fn snapshot(&self, buffer: &HostBuffer, kernel: &'static str) -> Result<Vec<f64>> {
        self.memory
            .borrow()
            .regions
            .get(&buffer.id)
            .cloned()
            .ok_or_else(|| BenchError::Launch {
                kernel,
                reason: format!("unknown {} buffer #{}", buffer.kind, buffer.id),
            })
    }

    fn take(&self, buffer: &HostBuffer, kernel: &'static str) -> Result<Vec<f64>> {
        self.memory
            .borrow_mut()
            .regions
            .get_mut(&buffer.id)
            .map(std::mem::take)
            .ok_or_else(|| BenchError::Launch {
                kernel,
                reason: format!("unknown {} buffer #{}", buffer.kind, buffer.id),
            })
    }

    fn put_back(&self, buffer: &HostBuffer, data: Vec<f64>) {
        if let Some(region) = self.memory.borrow_mut().regions.get_mut(&buffer.id) {
            *region = data;
        }
    }
}

/// Checks a launch against the OpenCL rules the emulation relies on.
fn check_geometry(launch: &Launch<'_, HostBuffer>, layout: SecondaryPolicy) -> Result<usize> {
    let fail = |reason: String| BenchError::Launch {
        kernel: launch.kernel.name(),
        reason,
    };

    let (rows, local) = match (launch.geometry, layout) {
        (Geometry::Linear { global, local }, SecondaryPolicy::Iterations) => (global, local),
        (Geometry::Planar { global, local }, SecondaryPolicy::VariateBuffer) => {
            if global[1] != launch.draws {
                return Err(fail(format!(
                    "second dimension {} does not match {} variates",
                    global[1], launch.draws
                )));
            }
            (global[0], local.map(|l| l[0]))
        }
        (geometry, layout) => {
            return Err(fail(format!(
                "geometry {geometry:?} does not match the {layout:?} layout"
            )))
        }
    };

    if launch.geometry.work_items() == 0 || rows < launch.count {
        return Err(fail(format!(
            "{rows} work-items cannot cover {} parameters",
            launch.count
        )));
    }
    match local {
        Some(0) => Err(fail("empty work-group".to_string())),
        Some(l) if rows % l != 0 => Err(fail(format!(
            "work-group size {l} does not divide global size {rows}"
        ))),
        Some(l) => Ok(l),
        None => Ok(rows),
    }
}

impl DeviceRuntime for HostRuntime {
    type Buffer = HostBuffer;
    type Program = HostProgram;
    type Event = HostEvent;

    fn validate(&self) -> Result<()> {
        if self.faults.unavailable {
            return Err(BenchError::DeviceUnavailable(
                "host runtime is offline".to_string(),
            ));
        }
        Ok(())
    }

    fn allocate(&self, kind: BufferKind, len: usize) -> Result<HostBuffer> {
        let bytes = len * size_of::<f64>();
        if self.faults.allocation.contains(&kind) {
            return Err(BenchError::Allocation {
                bytes,
                reason: format!("injected fault on {kind} buffers"),
            });
        }
        if len == 0 {
            return Err(BenchError::Allocation {
                bytes,
                reason: "zero-sized buffer".to_string(),
            });
        }

        let mut memory = self.memory.borrow_mut();
        let id = memory.next_id;
        memory.next_id += 1;
        memory.regions.insert(id, vec![0.0; len]);
        memory.ledger.allocations += 1;
        memory.ledger.bytes_allocated += bytes;
        trace!(id, %kind, bytes, "allocated host region");

        Ok(HostBuffer { id, kind, len })
    }

    fn write(&self, buffer: &mut HostBuffer, data: &[f64]) -> Result<()> {
        let bytes = size_of::<f64>() * data.len();
        if self.faults.transfer.contains(&buffer.kind) {
            return Err(BenchError::Transfer {
                bytes,
                reason: format!("injected fault on {} buffers", buffer.kind),
            });
        }
        if data.len() != buffer.len {
            return Err(BenchError::Transfer {
                bytes,
                reason: format!("buffer holds {} elements", buffer.len),
            });
        }

        let mut memory = self.memory.borrow_mut();
        let region = memory
            .regions
            .get_mut(&buffer.id)
            .ok_or_else(|| BenchError::Transfer {
                bytes,
                reason: format!("unknown buffer #{}", buffer.id),
            })?;
        region.copy_from_slice(data);
        Ok(())
    }

    fn read(&self, buffer: &HostBuffer, data: &mut [f64]) -> Result<()> {
        let bytes = size_of::<f64>() * data.len();
        if self.faults.transfer.contains(&buffer.kind) {
            return Err(BenchError::Transfer {
                bytes,
                reason: format!("injected fault on {} buffers", buffer.kind),
            });
        }
        if data.len() != buffer.len {
            return Err(BenchError::Transfer {
                bytes,
                reason: format!("buffer holds {} elements", buffer.len),
            });
        }

        let memory = self.memory.borrow();
        let region = memory
            .regions
            .get(&buffer.id)
            .ok_or_else(|| BenchError::Transfer {
                bytes,
                reason: format!("unknown buffer #{}", buffer.id),
            })?;
        data.copy_from_slice(region);
        Ok(())
    }

    fn free(&self, buffer: HostBuffer) {
        let mut memory = self.memory.borrow_mut();
        if memory.regions.remove(&buffer.id).is_some() {
            memory.ledger.releases += 1;
            memory.ledger.bytes_released += buffer.len * size_of::<f64>();
            trace!(id = buffer.id, kind = %buffer.kind, "released host region");
        }
    }

    fn build(&self, kernel: &'static DeviceKernel, layout: SecondaryPolicy) -> Result<HostProgram> {
        if self.faults.build.contains(&kernel.name()) {
            return Err(BenchError::Build {
                kernel: kernel.name(),
                reason: "injected fault".to_string(),
            });
        }

        let known = [
            &CL_SAMPLE_WITH_OBJECT,
            &CL_SAMPLE_STATIC,
            &CL_SAMPLE_GLOBAL_SCRATCH,
            &CL_SAMPLE_LOCAL_SCRATCH,
        ];
        if !known.iter().any(|k| k.name() == kernel.name()) {
            return Err(BenchError::Build {
                kernel: kernel.name(),
                reason: "no such entry point".to_string(),
            });
        }

        Ok(HostProgram {
            entry: kernel.name(),
            layout,
        })
    }

    fn launch(&self, program: &HostProgram, launch: &Launch<'_, HostBuffer>) -> Result<HostEvent> {
        let kernel = launch.kernel.name();
        if self.faults.launch.contains(&kernel) {
            return Err(BenchError::Launch {
                kernel,
                reason: "injected fault".to_string(),
            });
        }
        if program.entry != kernel {
            return Err(BenchError::Launch {
                kernel,
                reason: format!("program was built for `{}`", program.entry),
            });
        }
        let group_size = check_geometry(launch, program.layout)?;

        let lambdas = self.snapshot(launch.params, kernel)?;
        let variates = match (program.layout, launch.variates) {
            (SecondaryPolicy::Iterations, _) => None,
            (SecondaryPolicy::VariateBuffer, Some(buffer)) => Some(self.snapshot(buffer, kernel)?),
            (SecondaryPolicy::VariateBuffer, None) => {
                return Err(BenchError::Launch {
                    kernel,
                    reason: "missing variates buffer".to_string(),
                })
            }
        };
        let draws = match &variates {
            Some(v) => Draws::Variates(v),
            None => Draws::Stream {
                count: launch.draws,
                seed: launch.seed,
            },
        };
        if lambdas.len() != launch.count {
            return Err(BenchError::Launch {
                kernel,
                reason: format!(
                    "parameters buffer holds {} values, expected {}",
                    lambdas.len(),
                    launch.count
                ),
            });
        }
        if launch.output.len != launch.count * draws.row_len() {
            return Err(BenchError::Launch {
                kernel,
                reason: format!("output buffer holds {} values", launch.output.len),
            });
        }

        let mut out = self.take(launch.output, kernel)?;
        let start = Instant::now();
        let outcome = match (&launch.scratch, kernel) {
            (ScratchArg::Private, "sample_with_object") => {
                host::sample_with_object(&lambdas, draws, &mut out);
                Ok(())
            }
            (ScratchArg::Private, "sample_static") => {
                host::sample_static(&lambdas, draws, &mut out);
                Ok(())
            }
            (ScratchArg::Global(buffer), "sample_global_scratch") if buffer.len == out.len() => {
                self.take(buffer, kernel).map(|mut scratch| {
                    host::sample_global_scratch(&lambdas, draws, &mut scratch, &mut out);
                    self.put_back(buffer, scratch);
                })
            }
            (ScratchArg::Local { len }, "sample_local_scratch") if *len >= group_size => {
                host::sample_local_scratch(&lambdas, draws, group_size, &mut out);
                Ok(())
            }
            (scratch, _) => Err(BenchError::Launch {
                kernel,
                reason: format!("invalid scratch argument {scratch:?}"),
            }),
        };
        let device_ns = start.elapsed().as_nanos() as u64;
        self.put_back(launch.output, out);
        outcome?;

        Ok(HostEvent { kernel, device_ns })
    }

    fn wait(&self, event: HostEvent) -> Result<Option<u64>> {
        if self.faults.sync.contains(&event.kernel) {
            return Err(BenchError::Sync(format!(
                "injected fault while waiting on `{}`",
                event.kernel
            )));
        }
        Ok(self.profiling.then_some(event.device_ns))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocations_are_accounted() {
        let rt = HostRuntime::new();
        let a = rt.allocate(BufferKind::Parameters, 4).unwrap();
        let b = rt.allocate(BufferKind::Output, 2).unwrap();
        assert_eq!(rt.ledger().outstanding_bytes(), 6 * size_of::<f64>());
        assert_eq!(rt.live_buffers(), 2);

        rt.free(a);
        rt.free(b);
        assert!(rt.ledger().is_balanced());
        assert_eq!(rt.live_buffers(), 0);
    }

    #[test]
    fn zero_sized_allocation_is_rejected() {
        let rt = HostRuntime::new();
        let err = rt.allocate(BufferKind::Variates, 0).unwrap_err();
        assert_eq!(err.status_code(), 1);
        assert_eq!(rt.ledger(), Ledger::default());
    }

    #[test]
    fn write_then_read_returns_the_data() {
        let rt = HostRuntime::new();
        let mut buffer = rt.allocate(BufferKind::Parameters, 3).unwrap();
        rt.write(&mut buffer, &[1.0, 2.0, 3.0]).unwrap();
        let mut back = [0.0; 3];
        rt.read(&buffer, &mut back).unwrap();
        assert_eq!(back, [1.0, 2.0, 3.0]);
        assert!(rt.write(&mut buffer, &[1.0]).is_err());
        rt.free(buffer);
    }

    #[test]
    fn injected_faults_map_to_their_kind() {
        let rt = HostRuntime::with_faults(
            FaultPlan::new()
                .fail_allocation(BufferKind::Scratch)
                .fail_transfer(BufferKind::Variates)
                .fail_build(&CL_SAMPLE_STATIC),
        );
        assert_eq!(
            rt.allocate(BufferKind::Scratch, 1).unwrap_err().status_code(),
            1
        );
        let mut variates = rt.allocate(BufferKind::Variates, 1).unwrap();
        assert_eq!(rt.write(&mut variates, &[0.5]).unwrap_err().status_code(), 2);
        rt.free(variates);
        assert_eq!(
            rt.build(&CL_SAMPLE_STATIC, SecondaryPolicy::Iterations)
                .unwrap_err()
                .status_code(),
            3
        );
        assert!(rt
            .build(&CL_SAMPLE_WITH_OBJECT, SecondaryPolicy::Iterations)
            .is_ok());
    }

    #[test]
    fn offline_runtime_fails_validation() {
        let rt = HostRuntime::with_faults(FaultPlan::new().unavailable());
        assert_eq!(rt.validate().unwrap_err().status_code(), 6);
        assert!(HostRuntime::new().validate().is_ok());
    }

    #[test]
    fn launch_rejects_mismatched_geometry() {
        let rt = HostRuntime::new();
        let mut params = rt.allocate(BufferKind::Parameters, 4).unwrap();
        rt.write(&mut params, &[1.0; 4]).unwrap();
        let output = rt.allocate(BufferKind::Output, 4).unwrap();
        let program = rt
            .build(&CL_SAMPLE_LOCAL_SCRATCH, SecondaryPolicy::Iterations)
            .unwrap();
        let launch = Launch {
            kernel: &CL_SAMPLE_LOCAL_SCRATCH,
            geometry: Geometry::Linear {
                global: 6,
                local: Some(4),
            },
            count: 4,
            draws: 1,
            seed: 0,
            params: &params,
            variates: None,
            scratch: ScratchArg::Local { len: 4 },
            output: &output,
        };
        assert_eq!(rt.launch(&program, &launch).unwrap_err().status_code(), 4);

        rt.free(params);
        rt.free(output);
    }

    #[test]
    fn wait_reports_timestamps_only_when_profiling() {
        let event = || HostEvent {
            kernel: "sample_static",
            device_ns: 42,
        };
        assert_eq!(HostRuntime::new().wait(event()).unwrap(), Some(42));
        assert_eq!(
            HostRuntime::new().without_profiling().wait(event()).unwrap(),
            None
        );
    }
}
