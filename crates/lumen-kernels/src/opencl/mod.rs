//! OpenCL + clBLAS backend.
//!
//! Both libraries are loaded at runtime via `libloading`; nothing here needs
//! an SDK at build time. When the libraries are missing every entry point
//! reports `LumenError::RuntimeUnavailable`.

pub mod blas;
pub mod context;
pub mod ffi;
pub mod memory;
pub mod program;

pub use context::{enumerate_devices, ClContext, ClDevice, ClQueue};
pub use memory::ClBuffer;
