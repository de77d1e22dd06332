//! # lumen
//!
//! Dense linear algebra on accelerator devices.
//!
//! Matrix and vector products, inner and outer products and element-wise
//! arithmetic run on the device bound to a [`DeviceHandle`], on operands
//! that live either in host memory or already on that device.
//!
//! ```no_run
//! use lumen::{DeviceHandle, Matrix};
//!
//! # fn main() -> lumen::Result<()> {
//! let handle = DeviceHandle::default_device()?;
//! let a: Matrix<f32> = Matrix::from_elem(100, 100, 1.0);
//! let b: Matrix<f32> = Matrix::from_elem(100, 100, 2.0);
//! let c = lumen::product(&a, &b, &handle)?;
//! assert_eq!(c[(0, 0)], 200.0);
//! # Ok(())
//! # }
//! ```

pub use lumen_core::{
    ops as reference, ColumnMajor, Complex32, Complex64, DType, Element, Layout, LumenError, Matrix,
    Result, RowMajor, StorageOrder, Vector,
};
pub use lumen_kernels::*;
