use lumen_core::DType;

use crate::device::HandleId;
use crate::host::HostBuffer;
use crate::opencl::ClBuffer;

/// Untyped device allocation of either backend.
pub enum DeviceBuffer {
    Host(HostBuffer),
    OpenCl(ClBuffer),
}

impl DeviceBuffer {
    pub fn bytes(&self) -> usize {
        match self {
            DeviceBuffer::Host(b) => b.bytes(),
            DeviceBuffer::OpenCl(b) => b.bytes(),
        }
    }
}

/// Borrowed, untyped view of device-resident data, tagged with the handle
/// that owns it. This is what the dispatcher consumes.
#[derive(Clone, Copy)]
pub struct RawView<'a> {
    pub(crate) buffer: &'a DeviceBuffer,
    pub(crate) len: usize,
    pub(crate) dtype: DType,
    pub(crate) owner: HandleId,
}

impl RawView<'_> {
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn owner(&self) -> HandleId {
        self.owner
    }
}
