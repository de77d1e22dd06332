//! Kernels of the in-process device.
//!
//! Same contracts as the clBLAS routines they stand in for: GEMM honours
//! storage order and leading dimensions and accumulates into `C`.

use lumen_core::{Complex32, Complex64, DType, Element, Layout};

use super::memory::HostBuffer;
use crate::dispatch::{ElementwiseOp, GemmDims};

macro_rules! with_element {
    ($dtype:expr, $t:ident => $body:expr) => {
        match $dtype {
            DType::F32 => {
                type $t = f32;
                $body
            }
            DType::F64 => {
                type $t = f64;
                $body
            }
            DType::C32 => {
                type $t = Complex32;
                $body
            }
            DType::C64 => {
                type $t = Complex64;
                $body
            }
        }
    };
}

#[inline]
fn at(order: Layout, i: usize, j: usize, ld: usize) -> usize {
    match order {
        Layout::RowMajor => i * ld + j,
        Layout::ColumnMajor => i + j * ld,
    }
}

fn gemm_typed<T: Element>(order: Layout, d: &GemmDims, a: &[T], b: &[T], c: &mut [T]) {
    for i in 0..d.m {
        for j in 0..d.n {
            let mut acc = T::zero();
            for p in 0..d.k {
                acc = acc + a[at(order, i, p, d.lda)] * b[at(order, p, j, d.ldb)];
            }
            let idx = at(order, i, j, d.ldc);
            c[idx] = acc + c[idx];
        }
    }
}

/// `C ← A·B + C`.
pub fn gemm(dtype: DType, order: Layout, dims: &GemmDims, a: &HostBuffer, b: &HostBuffer, c: &HostBuffer) {
    let a_len = a.bytes() / dtype.element_size();
    let b_len = b.bytes() / dtype.element_size();
    let c_len = c.bytes() / dtype.element_size();
    with_element!(dtype, T => {
        let a = a.typed::<T>(a_len);
        let b = b.typed::<T>(b_len);
        let mut c = c.typed_mut::<T>(c_len);
        gemm_typed::<T>(order, dims, &a, &b, &mut c);
    })
}

/// Unconjugated `Σ xᵢ·yᵢ` over `n` elements, written to `out` as raw bytes.
pub fn dot(dtype: DType, n: usize, x: &HostBuffer, y: &HostBuffer, out: &mut [u8]) {
    with_element!(dtype, T => {
        let x = x.typed::<T>(n);
        let y = y.typed::<T>(n);
        let sum = x.iter().zip(y.iter()).fold(T::zero(), |acc, (&a, &b)| acc + a * b);
        out.copy_from_slice(bytemuck::bytes_of(&sum));
    })
}

/// `c[i] = a[i] op b[i]` for `i < n`.
pub fn elementwise(dtype: DType, op: ElementwiseOp, n: usize, a: &HostBuffer, b: &HostBuffer, c: &HostBuffer) {
    with_element!(dtype, T => {
        let a = a.typed::<T>(n);
        let b = b.typed::<T>(n);
        let mut c = c.typed_mut::<T>(n);
        for ((out, &x), &y) in c.iter_mut().zip(a.iter()).zip(b.iter()) {
            *out = match op {
                ElementwiseOp::Add => x + y,
                ElementwiseOp::Sub => x - y,
                ElementwiseOp::Mul => x * y,
                ElementwiseOp::Div => x / y,
            };
        }
    })
}
