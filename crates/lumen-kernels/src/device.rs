//! Device handles: device selection, execution context and command queue.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

use lumen_core::{DType, Layout, LumenError, Result};

use crate::buffer::DeviceBuffer;
use crate::config::{BackendPreference, RuntimeConfig};
use crate::dispatch::{ElementwiseOp, GemmDims, GemmKernel};
use crate::host::{self, HostBuffer, HostDevice};
use crate::library::KernelLibrary;
use crate::opencl::{self, blas, ffi, program, ClBuffer, ClContext, ClQueue};

/// Backend a device belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendKind {
    Host,
    OpenCl,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Host => write!(f, "host"),
            BackendKind::OpenCl => write!(f, "opencl"),
        }
    }
}

/// Which physical (or virtual) device a handle is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceId {
    pub backend: BackendKind,
    pub index: usize,
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.backend, self.index)
    }
}

/// Identity of one live `DeviceHandle`. Unique for the life of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandleId(u64);

impl HandleId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        HandleId(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub vendor: String,
    pub is_gpu: bool,
}

/// Commands submitted to a queue since it was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Host ↔ device copies.
    pub transfers: u64,
    pub fills: u64,
    /// GEMM, dot and element-wise launches.
    pub kernel_launches: u64,
}

enum Backend {
    Host,
    // Field order is drop order: queue before context.
    OpenCl { queue: ClQueue, context: ClContext },
}

/// In-order execution queue of a handle.
///
/// Every submission blocks until the device reports completion.
pub struct Queue {
    backend: Backend,
    stats: Cell<QueueStats>,
}

fn foreign_buffer() -> LumenError {
    LumenError::RuntimeUnavailable("buffer was allocated by a different backend".to_string())
}

impl Queue {
    fn new(backend: Backend) -> Self {
        Self {
            backend,
            stats: Cell::new(QueueStats::default()),
        }
    }

    pub fn stats(&self) -> QueueStats {
        self.stats.get()
    }

    fn bump(&self, f: impl FnOnce(&mut QueueStats)) {
        let mut stats = self.stats.get();
        f(&mut stats);
        self.stats.set(stats);
    }

    pub(crate) fn alloc(&self, bytes: usize) -> Result<DeviceBuffer> {
        match &self.backend {
            Backend::Host => Ok(DeviceBuffer::Host(HostBuffer::alloc(bytes)?)),
            Backend::OpenCl { queue, .. } => Ok(DeviceBuffer::OpenCl(ClBuffer::alloc(queue, bytes)?)),
        }
    }

    pub(crate) fn write(&self, buffer: &DeviceBuffer, src: &[u8]) -> Result<()> {
        tracing::trace!(bytes = src.len(), "host -> device");
        match (&self.backend, buffer) {
            (Backend::Host, DeviceBuffer::Host(buf)) => buf.write(src),
            (Backend::OpenCl { queue, .. }, DeviceBuffer::OpenCl(buf)) => buf.write(queue, src)?,
            _ => return Err(foreign_buffer()),
        }
        self.bump(|s| s.transfers += 1);
        Ok(())
    }

    pub(crate) fn read(&self, buffer: &DeviceBuffer, dst: &mut [u8]) -> Result<()> {
        tracing::trace!(bytes = dst.len(), "device -> host");
        match (&self.backend, buffer) {
            (Backend::Host, DeviceBuffer::Host(buf)) => buf.read(dst),
            (Backend::OpenCl { queue, .. }, DeviceBuffer::OpenCl(buf)) => buf.read(queue, dst)?,
            _ => return Err(foreign_buffer()),
        }
        self.bump(|s| s.transfers += 1);
        Ok(())
    }

    pub(crate) fn fill(&self, buffer: &DeviceBuffer, pattern: &[u8]) -> Result<()> {
        tracing::trace!(bytes = buffer.bytes(), pattern = pattern.len(), "fill");
        match (&self.backend, buffer) {
            (Backend::Host, DeviceBuffer::Host(buf)) => buf.fill(pattern),
            (Backend::OpenCl { queue, .. }, DeviceBuffer::OpenCl(buf)) => buf.fill(queue, pattern)?,
            _ => return Err(foreign_buffer()),
        }
        self.bump(|s| s.fills += 1);
        Ok(())
    }

    pub(crate) fn gemm(
        &self,
        kernel: GemmKernel,
        order: Layout,
        dims: &GemmDims,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        c: &DeviceBuffer,
    ) -> Result<()> {
        tracing::trace!(kernel = kernel.name(), %order, ?dims, "gemm");
        match (&self.backend, a, b, c) {
            (Backend::Host, DeviceBuffer::Host(a), DeviceBuffer::Host(b), DeviceBuffer::Host(c)) => {
                host::kernels::gemm(kernel.dtype(), order, dims, a, b, c)
            }
            (
                Backend::OpenCl { queue, .. },
                DeviceBuffer::OpenCl(a),
                DeviceBuffer::OpenCl(b),
                DeviceBuffer::OpenCl(c),
            ) => blas::gemm(queue, kernel, order, dims, a, b, c)?,
            _ => return Err(foreign_buffer()),
        }
        self.bump(|s| s.kernel_launches += 1);
        Ok(())
    }

    pub(crate) fn dot(
        &self,
        dtype: DType,
        n: usize,
        x: &DeviceBuffer,
        y: &DeviceBuffer,
        out: &mut [u8],
    ) -> Result<()> {
        tracing::trace!(%dtype, n, "dot");
        match (&self.backend, x, y) {
            (Backend::Host, DeviceBuffer::Host(x), DeviceBuffer::Host(y)) => {
                host::kernels::dot(dtype, n, x, y, out)
            }
            (Backend::OpenCl { queue, .. }, DeviceBuffer::OpenCl(x), DeviceBuffer::OpenCl(y)) => {
                blas::dot(queue, dtype, n, x, y, out)?
            }
            _ => return Err(foreign_buffer()),
        }
        self.bump(|s| s.kernel_launches += 1);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn elementwise(
        &self,
        dtype: DType,
        op: ElementwiseOp,
        n: usize,
        a: &DeviceBuffer,
        b: &DeviceBuffer,
        c: &DeviceBuffer,
    ) -> Result<()> {
        tracing::trace!(%dtype, kernel = op.kernel_name(), n, "element-wise");
        match (&self.backend, a, b, c) {
            (Backend::Host, DeviceBuffer::Host(a), DeviceBuffer::Host(b), DeviceBuffer::Host(c)) => {
                host::kernels::elementwise(dtype, op, n, a, b, c)
            }
            (
                Backend::OpenCl { queue, .. },
                DeviceBuffer::OpenCl(a),
                DeviceBuffer::OpenCl(b),
                DeviceBuffer::OpenCl(c),
            ) => program::run_elementwise(queue, dtype, op, a, b, c, n)?,
            _ => return Err(foreign_buffer()),
        }
        self.bump(|s| s.kernel_launches += 1);
        Ok(())
    }

    /// Wait for every submitted command. Host queues are always idle.
    pub fn finish(&self) -> Result<()> {
        match &self.backend {
            Backend::Host => Ok(()),
            Backend::OpenCl { queue, .. } => queue.finish(),
        }
    }
}

/// A bound device with its context and single in-order queue.
///
/// `Send` but not `Sync`: a handle may move between threads but cannot be
/// used from two threads at once. Wrap it in a `Mutex` to share it.
pub struct DeviceHandle {
    // Released before the library guard below.
    queue: Queue,
    info: DeviceInfo,
    id: HandleId,
    _library: KernelLibrary,
    _not_sync: PhantomData<Cell<()>>,
}

impl DeviceHandle {
    /// Bind device `index` using the environment configuration.
    pub fn initialize(index: usize) -> Result<Self> {
        let mut cfg = RuntimeConfig::from_env();
        cfg.device_index = Some(index);
        Self::with_config(&cfg)
    }

    /// Default-device lookup: the first GPU, else device 0.
    pub fn default_device() -> Result<Self> {
        let mut cfg = RuntimeConfig::from_env();
        cfg.device_index = None;
        Self::with_config(&cfg)
    }

    /// Virtual device `index` of the host backend.
    pub fn host(index: usize) -> Result<Self> {
        let env = RuntimeConfig::from_env();
        Self::with_config(&RuntimeConfig {
            backend: BackendPreference::Host,
            device_index: Some(index),
            ..env
        })
    }

    /// OpenCL device `index`.
    pub fn opencl(index: usize) -> Result<Self> {
        let env = RuntimeConfig::from_env();
        Self::with_config(&RuntimeConfig {
            backend: BackendPreference::OpenCl,
            device_index: Some(index),
            ..env
        })
    }

    pub fn with_config(cfg: &RuntimeConfig) -> Result<Self> {
        let handle = match resolve_backend(cfg) {
            BackendKind::Host => Self::create_host(cfg)?,
            BackendKind::OpenCl => Self::create_opencl(cfg)?,
        };
        tracing::info!(
            handle = %handle.id,
            device = %handle.info.id,
            name = %handle.info.name,
            "device handle created"
        );
        Ok(handle)
    }

    fn create_host(cfg: &RuntimeConfig) -> Result<Self> {
        let index = cfg.device_index.unwrap_or(0);
        if index >= cfg.host_devices {
            return Err(LumenError::DeviceNotFound {
                index,
                available: cfg.host_devices,
            });
        }
        let library = KernelLibrary::acquire(BackendKind::Host)?;
        let device = HostDevice::new(index);
        let info = DeviceInfo {
            id: DeviceId { backend: BackendKind::Host, index },
            name: device.name,
            vendor: "lumen".to_string(),
            is_gpu: false,
        };
        Ok(Self::assemble(Queue::new(Backend::Host), info, library))
    }

    fn create_opencl(cfg: &RuntimeConfig) -> Result<Self> {
        let api = ffi::opencl_api(cfg.opencl_library.as_deref())?;
        ffi::clblas_api(cfg.clblas_library.as_deref())?;
        let devices = opencl::enumerate_devices(api)?;
        let available = devices.len();
        let index = match cfg.device_index {
            Some(i) => i,
            None => opencl::context::default_device_index(&devices)
                .ok_or(LumenError::DeviceNotFound { index: 0, available })?,
        };
        let device = devices
            .into_iter()
            .nth(index)
            .ok_or(LumenError::DeviceNotFound { index, available })?;
        let info = DeviceInfo {
            id: DeviceId { backend: BackendKind::OpenCl, index },
            name: device.name.clone(),
            vendor: device.vendor.clone(),
            is_gpu: device.is_gpu,
        };
        let library = KernelLibrary::acquire(BackendKind::OpenCl)?;
        let context = ClContext::new(api, device)?;
        let queue = ClQueue::new(api, &context)?;
        Ok(Self::assemble(Queue::new(Backend::OpenCl { queue, context }), info, library))
    }

    fn assemble(queue: Queue, info: DeviceInfo, library: KernelLibrary) -> Self {
        Self {
            queue,
            info,
            id: HandleId::next(),
            _library: library,
            _not_sync: PhantomData,
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn device(&self) -> DeviceId {
        self.info.id
    }

    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    pub fn backend(&self) -> BackendKind {
        self.info.id.backend
    }

    pub fn queue(&self) -> &Queue {
        &self.queue
    }

    /// OpenCL context, `None` on the host backend.
    pub fn context(&self) -> Option<&ClContext> {
        match &self.queue.backend {
            Backend::Host => None,
            Backend::OpenCl { context, .. } => Some(context),
        }
    }

    /// Block until all work on this handle's queue has completed.
    pub fn finish(&self) -> Result<()> {
        self.queue.finish()
    }

    /// `DeviceMismatch` unless `owner` is this handle.
    pub(crate) fn check_owner(&self, owner: HandleId) -> Result<()> {
        if owner == self.id {
            Ok(())
        } else {
            Err(LumenError::DeviceMismatch {
                expected: self.id.get(),
                found: owner.get(),
            })
        }
    }
}

impl fmt::Debug for DeviceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceHandle")
            .field("id", &self.id)
            .field("device", &self.info.id)
            .field("name", &self.info.name)
            .finish()
    }
}

fn opencl_loadable(cfg: &RuntimeConfig) -> bool {
    let Ok(api) = ffi::opencl_api(cfg.opencl_library.as_deref()) else {
        return false;
    };
    if ffi::clblas_api(cfg.clblas_library.as_deref()).is_err() {
        return false;
    }
    opencl::enumerate_devices(api).map(|d| !d.is_empty()).unwrap_or(false)
}

fn resolve_backend(cfg: &RuntimeConfig) -> BackendKind {
    match cfg.backend {
        BackendPreference::Host => BackendKind::Host,
        BackendPreference::OpenCl => BackendKind::OpenCl,
        BackendPreference::Auto => {
            if opencl_loadable(cfg) {
                BackendKind::OpenCl
            } else {
                tracing::debug!("no usable OpenCL runtime, using host device");
                BackendKind::Host
            }
        }
    }
}

/// Devices visible under `cfg`'s backend preference.
pub fn devices(cfg: &RuntimeConfig) -> Result<Vec<DeviceInfo>> {
    match resolve_backend(cfg) {
        BackendKind::Host => Ok((0..cfg.host_devices)
            .map(|index| DeviceInfo {
                id: DeviceId { backend: BackendKind::Host, index },
                name: HostDevice::new(index).name,
                vendor: "lumen".to_string(),
                is_gpu: false,
            })
            .collect()),
        BackendKind::OpenCl => {
            let api = ffi::opencl_api(cfg.opencl_library.as_deref())?;
            Ok(opencl::enumerate_devices(api)?
                .into_iter()
                .enumerate()
                .map(|(index, d)| DeviceInfo {
                    id: DeviceId { backend: BackendKind::OpenCl, index },
                    name: d.name,
                    vendor: d.vendor,
                    is_gpu: d.is_gpu,
                })
                .collect())
        }
    }
}

/// Number of devices under the environment configuration.
pub fn device_count() -> usize {
    devices(&RuntimeConfig::from_env()).map(|d| d.len()).unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send<T: Send>() {}

    #[test]
    fn test_handle_is_send() {
        assert_send::<DeviceHandle>();
    }

    #[test]
    fn test_host_handles_are_distinct() {
        let cfg = RuntimeConfig::host(2);
        let a = DeviceHandle::with_config(&cfg).unwrap();
        let b = DeviceHandle::with_config(&cfg).unwrap();
        assert_eq!(a.device(), b.device());
        assert_ne!(a.id(), b.id());
        assert!(a.check_owner(a.id()).is_ok());
        assert!(matches!(
            a.check_owner(b.id()),
            Err(LumenError::DeviceMismatch { .. })
        ));
        assert!(a.context().is_none());
        assert!(a.finish().is_ok());
    }

    #[test]
    fn test_host_device_not_found() {
        let cfg = RuntimeConfig {
            device_index: Some(3),
            ..RuntimeConfig::host(2)
        };
        match DeviceHandle::with_config(&cfg) {
            Err(LumenError::DeviceNotFound { index, available }) => {
                assert_eq!((index, available), (3, 2));
            }
            other => panic!("expected DeviceNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_host_device_listing() {
        let infos = devices(&RuntimeConfig::host(3)).unwrap();
        assert_eq!(infos.len(), 3);
        assert_eq!(infos[2].id, DeviceId { backend: BackendKind::Host, index: 2 });
        assert_eq!(infos[0].name, "lumen host device 0");
    }

    #[test]
    fn test_host_handle_reports_listed_device() {
        let cfg = RuntimeConfig {
            device_index: Some(1),
            ..RuntimeConfig::host(2)
        };
        let handle = DeviceHandle::with_config(&cfg).unwrap();
        let listed = &devices(&cfg).unwrap()[1];
        assert_eq!(handle.info().id, listed.id);
        assert_eq!(handle.info().name, listed.name);
        assert_eq!(handle.backend(), BackendKind::Host);
    }

    #[test]
    fn test_device_count_follows_environment_listing() {
        let listed = devices(&RuntimeConfig::from_env()).map(|d| d.len()).unwrap_or(0);
        assert_eq!(device_count(), listed);
    }

    #[test]
    fn test_queue_counts_submissions() {
        let handle = DeviceHandle::with_config(&RuntimeConfig::host(1)).unwrap();
        let queue = handle.queue();
        let buf = queue.alloc(16).unwrap();
        queue.write(&buf, &[1u8; 16]).unwrap();
        queue.fill(&buf, &[0u8; 4]).unwrap();
        let mut out = [9u8; 16];
        queue.read(&buf, &mut out).unwrap();
        assert_eq!(out, [0u8; 16]);
        assert_eq!(
            queue.stats(),
            QueueStats { transfers: 2, fills: 1, kernel_launches: 0 }
        );
    }
}
