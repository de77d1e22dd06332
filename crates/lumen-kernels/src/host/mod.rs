//! In-process device.
//!
//! Executes every kernel on the calling thread against `Vec`-backed buffers,
//! with the same queue, ownership and error semantics as the OpenCL backend.
//! Used when no accelerator runtime is installed and throughout the tests.

pub mod kernels;
pub mod memory;

pub use memory::HostBuffer;

/// One virtual host device.
#[derive(Debug, Clone)]
pub struct HostDevice {
    pub index: usize,
    pub name: String,
}

impl HostDevice {
    pub fn new(index: usize) -> Self {
        Self {
            index,
            name: format!("lumen host device {index}"),
        }
    }
}
