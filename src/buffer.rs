//! Scoped device buffers.
//!
//! A [`DeviceBuffer`] owns one device region for the duration of a single kernel run. The region
//! is freed exactly once: either explicitly with [`DeviceBuffer::release`], or when the handle is
//! dropped on an early-return path.

use crate::{
    error::Result,
    runtime::{BufferKind, DeviceRuntime, Direction},
};

use tracing::trace;

use std::mem::size_of;

/// Device-resident region bound to the runtime that allocated it.
pub struct DeviceBuffer<'r, R: DeviceRuntime> {
    runtime: &'r R,
    // `None` only once the region has been handed back to the runtime.
    raw: Option<R::Buffer>,
    kind: BufferKind,
    len: usize,
}

impl<'r, R: DeviceRuntime> DeviceBuffer<'r, R> {
    /// Reserves `len` elements without initializing them.
    pub fn allocate(runtime: &'r R, kind: BufferKind, len: usize) -> Result<Self> {
        let raw = runtime.allocate(kind, len)?;
        trace!(%kind, len, "device buffer allocated");
        Ok(Self {
            runtime,
            raw: Some(raw),
            kind,
            len,
        })
    }

    /// Allocates a region sized to `host` and copies `host` into it.
    ///
    /// If the copy fails the region is freed before returning.
    pub fn stage(runtime: &'r R, kind: BufferKind, host: &[f64]) -> Result<Self> {
        let mut buffer = Self::allocate(runtime, kind, host.len())?;
        if let Some(raw) = buffer.raw.as_mut() {
            runtime.write(raw, host)?;
        }
        Ok(buffer)
    }

    /// Copies the region back into `host`.
    ///
    /// Must only be called once the launches using this buffer have completed.
    pub fn read(&self, host: &mut [f64]) -> Result<()> {
        self.runtime.read(self.raw(), host)
    }

    /// Runtime handle of the region, to pass as a kernel argument.
    pub fn raw(&self) -> &R::Buffer {
        self.raw
            .as_ref()
            .expect("device buffer is only emptied by `release` or `drop`")
    }

    pub fn direction(&self) -> Direction {
        self.kind.direction()
    }

    pub fn size_bytes(&self) -> usize {
        self.len * size_of::<f64>()
    }

    /// Frees the region.
    pub fn release(mut self) {
        self.free();
    }

    fn free(&mut self) {
        if let Some(raw) = self.raw.take() {
            trace!(kind = %self.kind, bytes = self.size_bytes(), "device buffer released");
            self.runtime.free(raw);
        }
    }
}

impl<R: DeviceRuntime> Drop for DeviceBuffer<'_, R> {
    fn drop(&mut self) {
        self.free();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::host::{FaultPlan, HostRuntime};

    #[test]
    fn release_frees_exactly_once() {
        let rt = HostRuntime::new();
        let buffer = DeviceBuffer::stage(&rt, BufferKind::Parameters, &[1.0, 2.0]).unwrap();
        assert_eq!(buffer.size_bytes(), 16);
        assert_eq!(buffer.direction(), Direction::HostToDevice);
        buffer.release();

        let ledger = rt.ledger();
        assert_eq!(ledger.allocations, 1);
        assert_eq!(ledger.releases, 1);
        assert!(ledger.is_balanced());
    }

    #[test]
    fn drop_frees_on_early_return() {
        let rt = HostRuntime::new();
        let run = || -> Result<()> {
            let _scratch = DeviceBuffer::allocate(&rt, BufferKind::Scratch, 8)?;
            Err(crate::error::BenchError::Sync("boom".to_string()))
        };
        assert!(run().is_err());
        assert!(rt.ledger().is_balanced());
        assert_eq!(rt.live_buffers(), 0);
    }

    #[test]
    fn failed_transfer_still_frees_the_region() {
        let rt = HostRuntime::with_faults(FaultPlan::new().fail_transfer(BufferKind::Parameters));
        let err = DeviceBuffer::stage(&rt, BufferKind::Parameters, &[1.0])
            .err()
            .unwrap();
        assert_eq!(err.status_code(), 2);
        assert_eq!(rt.ledger().allocations, 1);
        assert!(rt.ledger().is_balanced());
    }

    #[test]
    fn staged_data_reads_back() {
        let rt = HostRuntime::new();
        let buffer = DeviceBuffer::stage(&rt, BufferKind::Output, &[4.0, 5.0]).unwrap();
        let mut host = [0.0; 2];
        buffer.read(&mut host).unwrap();
        assert_eq!(host, [4.0, 5.0]);
    }
}
