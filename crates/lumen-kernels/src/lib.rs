//! # lumen-kernels
//!
//! Device handles, device-resident containers and kernel dispatch.
//!
//! Backends:
//! - `opencl`: OpenCL runtime + clBLAS, both loaded at runtime
//! - `host`: in-process device used when no accelerator runtime is present
//!
//! The public operations live in [`ops`] and accept any mix of host and
//! device operands.

pub mod buffer;
pub mod config;
pub mod device;
pub mod dispatch;
pub mod host;
pub mod library;
pub mod matrix;
pub mod opencl;
pub mod ops;
pub mod storage;
pub mod vector;

pub use buffer::{DeviceBuffer, RawView};
pub use config::{BackendPreference, RuntimeConfig};
pub use device::{device_count, devices, BackendKind, DeviceHandle, DeviceId, DeviceInfo, HandleId, Queue, QueueStats};
pub use dispatch::{ElementwiseOp, GemmDims, GemmKernel, GemmPlan};
pub use library::KernelLibrary;
pub use matrix::DeviceMatrix;
pub use ops::{
    element_add, element_add_into, element_add_on_device, element_div, element_div_into,
    element_div_on_device, element_mul, element_mul_into, element_mul_on_device, element_sub,
    element_sub_into, element_sub_on_device, inner_product, outer_product, outer_product_into,
    outer_product_on_device, product, product_into, product_mv, product_mv_into,
    product_mv_on_device, product_on_device, product_vm, product_vm_into, product_vm_on_device,
    Operand, Staged,
};
pub use storage::DeviceStorage;
pub use vector::DeviceVector;
