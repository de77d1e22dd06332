use std::fmt;
use std::ops::{Add, Div, Mul, Sub};

use num_complex::{Complex32, Complex64};
use serde::{Deserialize, Serialize};

/// Element types supported by lumen containers and kernels.
///
/// The set is closed: every kernel entry point exists for exactly these four.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    /// 32-bit IEEE 754 single-precision float
    F32,
    /// 64-bit IEEE 754 double-precision float
    F64,
    /// Complex number with f32 real and imaginary parts
    C32,
    /// Complex number with f64 real and imaginary parts
    C64,
}

impl DType {
    /// All supported dtypes, in kernel-table order.
    pub const ALL: [DType; 4] = [DType::F32, DType::F64, DType::C32, DType::C64];

    /// Size in bytes of a single element.
    pub fn element_size(&self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F64 => 8,
            DType::C32 => 8,
            DType::C64 => 16,
        }
    }

    /// Number of bytes needed to store `n` elements of this dtype, or `None`
    /// if it does not fit in `usize`.
    pub fn storage_bytes(&self, n: usize) -> Option<usize> {
        self.element_size().checked_mul(n)
    }

    /// Whether this dtype is complex-valued.
    pub fn is_complex(&self) -> bool {
        matches!(self, DType::C32 | DType::C64)
    }

    /// Whether elements use double precision.
    pub fn is_double(&self) -> bool {
        matches!(self, DType::F64 | DType::C64)
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DType::F32 => write!(f, "f32"),
            DType::F64 => write!(f, "f64"),
            DType::C32 => write!(f, "c32"),
            DType::C64 => write!(f, "c64"),
        }
    }
}

mod sealed {
    pub trait Sealed {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
    impl Sealed for num_complex::Complex32 {}
    impl Sealed for num_complex::Complex64 {}
}

/// A scalar type that can live in a device buffer.
///
/// Sealed: implemented for `f32`, `f64`, `Complex32` and `Complex64` only.
pub trait Element:
    sealed::Sealed
    + bytemuck::Pod
    + PartialEq
    + fmt::Debug
    + Send
    + Sync
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + 'static
{
    const DTYPE: DType;

    fn zero() -> Self;

    fn one() -> Self;

    /// Convert a real value (imaginary part zero for complex types).
    fn from_f64(value: f64) -> Self;

    /// Absolute distance `|self - other|` in f64, used for tolerance checks.
    fn distance(self, other: Self) -> f64;
}

impl Element for f32 {
    const DTYPE: DType = DType::F32;

    fn zero() -> Self {
        0.0
    }

    fn one() -> Self {
        1.0
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }

    fn distance(self, other: Self) -> f64 {
        (self - other).abs() as f64
    }
}

impl Element for f64 {
    const DTYPE: DType = DType::F64;

    fn zero() -> Self {
        0.0
    }

    fn one() -> Self {
        1.0
    }

    fn from_f64(value: f64) -> Self {
        value
    }

    fn distance(self, other: Self) -> f64 {
        (self - other).abs()
    }
}

impl Element for Complex32 {
    const DTYPE: DType = DType::C32;

    fn zero() -> Self {
        Complex32::new(0.0, 0.0)
    }

    fn one() -> Self {
        Complex32::new(1.0, 0.0)
    }

    fn from_f64(value: f64) -> Self {
        Complex32::new(value as f32, 0.0)
    }

    fn distance(self, other: Self) -> f64 {
        (self - other).norm() as f64
    }
}

impl Element for Complex64 {
    const DTYPE: DType = DType::C64;

    fn zero() -> Self {
        Complex64::new(0.0, 0.0)
    }

    fn one() -> Self {
        Complex64::new(1.0, 0.0)
    }

    fn from_f64(value: f64) -> Self {
        Complex64::new(value, 0.0)
    }

    fn distance(self, other: Self) -> f64 {
        (self - other).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_sizes_match_rust_types() {
        assert_eq!(DType::F32.element_size(), std::mem::size_of::<f32>());
        assert_eq!(DType::F64.element_size(), std::mem::size_of::<f64>());
        assert_eq!(DType::C32.element_size(), std::mem::size_of::<Complex32>());
        assert_eq!(DType::C64.element_size(), std::mem::size_of::<Complex64>());
    }

    #[test]
    fn test_dtype_constants() {
        assert_eq!(<f32 as Element>::DTYPE, DType::F32);
        assert_eq!(<f64 as Element>::DTYPE, DType::F64);
        assert_eq!(<Complex32 as Element>::DTYPE, DType::C32);
        assert_eq!(<Complex64 as Element>::DTYPE, DType::C64);
    }

    #[test]
    fn test_properties() {
        assert!(DType::C32.is_complex());
        assert!(!DType::F64.is_complex());
        assert!(DType::C64.is_double());
        assert!(!DType::F32.is_double());
        assert_eq!(DType::C64.storage_bytes(3), Some(48));
        assert_eq!(DType::F64.storage_bytes(usize::MAX / 4), None);
    }

    #[test]
    fn test_complex_identity_values() {
        assert_eq!(Complex64::one() * Complex64::new(2.0, -3.0), Complex64::new(2.0, -3.0));
        assert_eq!(Complex32::zero() + Complex32::from_f64(4.0), Complex32::new(4.0, 0.0));
    }

    #[test]
    fn test_display_and_serde() {
        assert_eq!(DType::C32.to_string(), "c32");
        let json = serde_json::to_string(&DType::F64).unwrap();
        assert_eq!(json, "\"f64\"");
        let back: DType = serde_json::from_str("\"c64\"").unwrap();
        assert_eq!(back, DType::C64);
    }
}
