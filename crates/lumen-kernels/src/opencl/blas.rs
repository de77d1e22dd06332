//! clBLAS GEMM and dot-product launches.

use std::ptr;

use lumen_core::error::size_overflow;
use lumen_core::{DType, Layout, Result};

use super::context::ClQueue;
use super::ffi::{
    self, check_kernel, ClDouble2, ClEvent, ClFloat2, ClMem, FnClblasGemm, CLBLAS_COLUMN_MAJOR,
    CLBLAS_NO_TRANS, CLBLAS_ROW_MAJOR,
};
use super::memory::{wait_and_release, ClBuffer};
use crate::dispatch::{GemmDims, GemmKernel};

fn clblas_order(layout: Layout) -> u32 {
    match layout {
        Layout::RowMajor => CLBLAS_ROW_MAJOR,
        Layout::ColumnMajor => CLBLAS_COLUMN_MAJOR,
    }
}

#[allow(clippy::too_many_arguments)]
unsafe fn launch_gemm<S: Copy>(
    f: FnClblasGemm<S>,
    queue: &ClQueue,
    order: Layout,
    dims: &GemmDims,
    one: S,
    a: ClMem,
    b: ClMem,
    c: ClMem,
) -> (i32, ClEvent) {
    let mut raw_queue = queue.raw();
    let mut event: ClEvent = ptr::null_mut();
    let status = f(
        clblas_order(order),
        CLBLAS_NO_TRANS,
        CLBLAS_NO_TRANS,
        dims.m,
        dims.n,
        dims.k,
        one,
        a,
        0,
        dims.lda,
        b,
        0,
        dims.ldb,
        one,
        c,
        0,
        dims.ldc,
        1,
        &mut raw_queue,
        0,
        ptr::null(),
        &mut event,
    );
    (status, event)
}

/// `C ← A·B + C` with no transposes, blocking until the kernel completes.
pub fn gemm(
    queue: &ClQueue,
    kernel: GemmKernel,
    order: Layout,
    dims: &GemmDims,
    a: &ClBuffer,
    b: &ClBuffer,
    c: &ClBuffer,
) -> Result<()> {
    let blas = ffi::loaded_clblas()?;
    let (a, b, c) = (a.raw(), b.raw(), c.raw());
    let (status, event) = unsafe {
        match kernel {
            GemmKernel::Sgemm => launch_gemm(blas.sgemm, queue, order, dims, 1.0f32, a, b, c),
            GemmKernel::Dgemm => launch_gemm(blas.dgemm, queue, order, dims, 1.0f64, a, b, c),
            GemmKernel::Cgemm => {
                launch_gemm(blas.cgemm, queue, order, dims, ClFloat2 { s: [1.0, 0.0] }, a, b, c)
            }
            GemmKernel::Zgemm => {
                launch_gemm(blas.zgemm, queue, order, dims, ClDouble2 { s: [1.0, 0.0] }, a, b, c)
            }
        }
    };
    check_kernel(status, kernel.name())?;
    wait_and_release(event, kernel.name())
}

/// Name of the clBLAS routine computing the unconjugated dot product for `dtype`.
pub fn dot_kernel_name(dtype: DType) -> &'static str {
    match dtype {
        DType::F32 => "clblasSdot",
        DType::F64 => "clblasDdot",
        DType::C32 => "clblasCdotu",
        DType::C64 => "clblasZdotu",
    }
}

/// `Σ xᵢ·yᵢ` over the first `n` elements, read back into `out`.
///
/// `out` must be exactly one element wide.
pub fn dot(queue: &ClQueue, dtype: DType, n: usize, x: &ClBuffer, y: &ClBuffer, out: &mut [u8]) -> Result<()> {
    let blas = ffi::loaded_clblas()?;
    let f = match dtype {
        DType::F32 => blas.sdot,
        DType::F64 => blas.ddot,
        DType::C32 => blas.cdotu,
        DType::C64 => blas.zdotu,
    };
    let name = dot_kernel_name(dtype);
    let result = ClBuffer::alloc(queue, dtype.element_size())?;
    let scratch = ClBuffer::alloc(queue, dtype.storage_bytes(n).ok_or_else(size_overflow)?)?;

    let mut raw_queue = queue.raw();
    let mut event: ClEvent = ptr::null_mut();
    let status = unsafe {
        f(
            n,
            result.raw(),
            0,
            x.raw(),
            0,
            1,
            y.raw(),
            0,
            1,
            scratch.raw(),
            1,
            &mut raw_queue,
            0,
            ptr::null(),
            &mut event,
        )
    };
    check_kernel(status, name)?;
    wait_and_release(event, name)?;
    result.read(queue, out)
}
