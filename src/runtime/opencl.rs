//! OpenCL device runtime.
//!
//! [`ClSession`] wraps a context/device/queue triple established by the caller. Kernels are built
//! from source for every run; timings come from the launch event's profiling counters when the
//! queue was created with `PROFILING_ENABLE`.

use super::{BufferKind, DeviceRuntime, Geometry, Launch, ScratchArg};
use crate::{
    error::{BenchError, Result},
    kernels::device::DeviceKernel,
    strategy::SecondaryPolicy,
};

use ocl::{
    enums::{
        CommandQueueInfo, CommandQueueInfoResult, DeviceInfo, DeviceInfoResult, ProfilingInfo,
        ProfilingInfoResult, ProgramInfo, ProgramInfoResult,
    },
    flags::{CommandQueueProperties, MemFlags},
    Buffer, Context, Device, Event, Kernel, Platform, Program, Queue,
};
use tracing::debug;

use std::mem::size_of;

/// Capability handle over an OpenCL context, device and command queue.
pub struct ClSession {
    context: Context,
    device: Device,
    queue: Queue,
    profiling: bool,
}

/// Built OpenCL program and the entry point it was checked for.
pub struct ClProgram {
    program: Program,
    entry: &'static str,
}

impl ClSession {
    /// Wraps externally created handles.
    pub fn new(context: Context, device: Device, queue: Queue) -> Self {
        let profiling = matches!(
            queue.info(CommandQueueInfo::Properties),
            Ok(CommandQueueInfoResult::Properties(props))
                if props.contains(CommandQueueProperties::PROFILING_ENABLE)
        );
        Self {
            context,
            device,
            queue,
            profiling,
        }
    }

    /// Creates a session on the `device`-th device of the `platform`-th platform, with a
    /// profiling-enabled queue.
    pub fn from_indices(platform: usize, device: usize) -> Result<Self> {
        let unavailable = |e: ocl::Error| BenchError::DeviceUnavailable(e.to_string());

        let platform = Platform::list().into_iter().nth(platform).ok_or_else(|| {
            BenchError::DeviceUnavailable(format!("no OpenCL platform #{platform}"))
        })?;
        let device = Device::list_all(platform)
            .map_err(unavailable)?
            .into_iter()
            .nth(device)
            .ok_or_else(|| BenchError::DeviceUnavailable(format!("no OpenCL device #{device}")))?;
        let context = Context::builder()
            .platform(platform)
            .devices(device)
            .build()
            .map_err(unavailable)?;
        let queue = Queue::new(
            &context,
            device,
            Some(CommandQueueProperties::PROFILING_ENABLE),
        )
        .map_err(unavailable)?;

        debug!(device = %device.name().unwrap_or_default(), "created OpenCL session");
        Ok(Self::new(context, device, queue))
    }
}

impl DeviceRuntime for ClSession {
    type Buffer = Buffer<f64>;
    type Program = ClProgram;
    type Event = Event;

    fn validate(&self) -> Result<()> {
        if self.queue.device() != self.device {
            return Err(BenchError::DeviceUnavailable(
                "command queue does not belong to the session's device".to_string(),
            ));
        }
        match self.device.info(DeviceInfo::Available) {
            Ok(DeviceInfoResult::Available(true)) => Ok(()),
            Ok(_) => Err(BenchError::DeviceUnavailable(
                "device reports itself unavailable".to_string(),
            )),
            Err(e) => Err(BenchError::DeviceUnavailable(e.to_string())),
        }
    }

    fn allocate(&self, kind: BufferKind, len: usize) -> Result<Buffer<f64>> {
        let flags = match kind {
            BufferKind::Parameters | BufferKind::Variates => MemFlags::new().read_only(),
            BufferKind::Scratch => MemFlags::new().read_write(),
            BufferKind::Output => MemFlags::new().write_only(),
        };
        Buffer::<f64>::builder()
            .queue(self.queue.clone())
            .flags(flags)
            .len(len)
            .build()
            .map_err(|e| BenchError::Allocation {
                bytes: len * size_of::<f64>(),
                reason: e.to_string(),
            })
    }

    fn write(&self, buffer: &mut Buffer<f64>, data: &[f64]) -> Result<()> {
        buffer
            .write(data)
            .enq()
            .map_err(|e| BenchError::Transfer {
                bytes: size_of::<f64>() * data.len(),
                reason: e.to_string(),
            })
    }

    fn read(&self, buffer: &Buffer<f64>, data: &mut [f64]) -> Result<()> {
        let bytes = size_of::<f64>() * data.len();
        buffer
            .read(data)
            .enq()
            .map_err(|e| BenchError::Transfer {
                bytes,
                reason: e.to_string(),
            })
    }

    fn free(&self, buffer: Buffer<f64>) {
        drop(buffer);
    }

    fn build(&self, kernel: &'static DeviceKernel, layout: SecondaryPolicy) -> Result<ClProgram> {
        let fail = |reason: String| BenchError::Build {
            kernel: kernel.name(),
            reason,
        };

        let program = Program::builder()
            .src(kernel.source())
            .devices(self.device)
            .cmplr_def(
                "VARIATE_BUFFER",
                (layout == SecondaryPolicy::VariateBuffer) as i32,
            )
            .build(&self.context)
            .map_err(|e| fail(e.to_string()))?;

        match program.info(ProgramInfo::KernelNames) {
            Ok(ProgramInfoResult::KernelNames(names))
                if names.split(';').any(|name| name.trim() == kernel.name()) =>
            {
                Ok(ClProgram {
                    program,
                    entry: kernel.name(),
                })
            }
            Ok(_) => Err(fail("no such entry point".to_string())),
            Err(e) => Err(fail(e.to_string())),
        }
    }

    fn launch(&self, program: &ClProgram, launch: &Launch<'_, Buffer<f64>>) -> Result<Event> {
        let fail = |reason: String| BenchError::Launch {
            kernel: launch.kernel.name(),
            reason,
        };
        if program.entry != launch.kernel.name() {
            return Err(fail(format!("program was built for `{}`", program.entry)));
        }

        let mut builder = Kernel::builder();
        builder
            .program(&program.program)
            .name(launch.kernel.name())
            .queue(self.queue.clone());
        match launch.geometry {
            Geometry::Linear { global, local } => {
                builder.global_work_size(global);
                if let Some(local) = local {
                    builder.local_work_size(local);
                }
            }
            Geometry::Planar { global, local } => {
                builder.global_work_size((global[0], global[1]));
                if let Some(local) = local {
                    builder.local_work_size((local[0], local[1]));
                }
            }
        }

        let count = u32::try_from(launch.count).map_err(|_| {
            fail(format!("{} parameters exceed the kernel index range", launch.count))
        })?;
        let draws = u32::try_from(launch.draws).map_err(|_| {
            fail(format!("{} draws exceed the kernel index range", launch.draws))
        })?;

        builder
            .arg(count)
            .arg(draws)
            .arg(launch.seed)
            .arg(launch.params);
        if let Some(variates) = launch.variates {
            builder.arg(variates);
        }
        match launch.scratch {
            ScratchArg::Private => {}
            ScratchArg::Local { len } => {
                builder.arg_local::<f64>(len);
            }
            ScratchArg::Global(scratch) => {
                builder.arg(scratch);
            }
        }
        builder.arg(launch.output);

        let kernel = builder.build().map_err(|e| fail(e.to_string()))?;

        let mut event = Event::empty();
        unsafe {
            kernel
                .cmd()
                .enew(&mut event)
                .enq()
                .map_err(|e| fail(e.to_string()))?;
        }
        Ok(event)
    }

    fn wait(&self, event: Event) -> Result<Option<u64>> {
        event
            .wait_for()
            .map_err(|e| BenchError::Sync(e.to_string()))?;
        if !self.profiling {
            return Ok(None);
        }

        match (
            event.profiling_info(ProfilingInfo::Start),
            event.profiling_info(ProfilingInfo::End),
        ) {
            (Ok(ProfilingInfoResult::Start(start)), Ok(ProfilingInfoResult::End(end))) => {
                Ok(Some(end.saturating_sub(start)))
            }
            _ => {
                debug!("event timestamps unavailable, falling back to host clock");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        kernels::device::CL_EXPONENTIAL_SOURCE, params::ParameterSet,
        strategy::ExecutionStrategy,
    };

    fn session() -> Option<ClSession> {
        match ClSession::from_indices(0, 0) {
            Ok(session) => Some(session),
            Err(e) => {
                eprintln!("skipping: {e}");
                None
            }
        }
    }

    #[test]
    fn every_strategy_builds_for_both_layouts() {
        let Some(session) = session() else { return };
        session.validate().unwrap();
        for strategy in ExecutionStrategy::ALL {
            let kernel = strategy.recipe().kernel;
            assert_eq!(kernel.source(), CL_EXPONENTIAL_SOURCE);
            for layout in [SecondaryPolicy::Iterations, SecondaryPolicy::VariateBuffer] {
                let program = session.build(kernel, layout).unwrap();
                assert_eq!(program.entry, kernel.name());
            }
        }
    }

    #[test]
    fn strategies_agree_on_device() {
        let Some(session) = session() else { return };
        let runner = crate::drivers::runner::KernelRunner::new(
            &session,
            crate::strategy::SecondaryPolicies::default(),
            5,
        );
        let params = ParameterSet::random(100, 2, Some(5)).unwrap();
        let checksums: Vec<_> = ExecutionStrategy::ALL
            .iter()
            .map(|&s| runner.run(s, &params).checksum.unwrap())
            .collect();
        for c in &checksums {
            assert!((c - checksums[0]).abs() <= 1e-9 * checksums[0].abs());
        }
    }
}
