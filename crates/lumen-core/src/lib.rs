//! # lumen-core
//!
//! Host-side vocabulary for the lumen linear algebra stack.
//!
//! Provides:
//! - The closed set of element types (f32, f64, Complex32, Complex64)
//! - Row-major and column-major layout tags with BLAS leading-dimension rules
//! - Host-resident dense `Matrix` and `Vector` containers
//! - Host reference arithmetic used to validate device results
//! - The shared `LumenError` type

pub mod dtype;
pub mod layout;
pub mod matrix;
pub mod vector;
pub mod ops;
pub mod error;

pub use dtype::{DType, Element};
pub use error::LumenError;
pub use layout::{ColumnMajor, Layout, RowMajor, StorageOrder};
pub use matrix::Matrix;
pub use vector::Vector;

pub use num_complex::{Complex32, Complex64};

pub type Result<T> = std::result::Result<T, LumenError>;
