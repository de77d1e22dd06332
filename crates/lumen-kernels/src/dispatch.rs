//! Kernel dispatcher.
//!
//! Maps (element type, layout, operation) to one kernel entry point and runs
//! it on the handle's queue, blocking until it completes. Operands arrive as
//! untyped [`RawView`]s whose shapes the caller has already validated; this
//! layer re-checks ownership and extents before anything is launched.
//!
//! Every product shape (matrix-matrix, matrix-vector, vector-matrix, outer)
//! goes through the same GEMM call with `M`, `N` or `K` set to 1 where a
//! vector stands in for a matrix.

use std::collections::HashMap;
use std::sync::OnceLock;

use lumen_core::error::{invalid_dimensions, size_overflow};
use lumen_core::{DType, Element, Layout, Result};

use crate::buffer::RawView;
use crate::device::DeviceHandle;
use crate::storage::DeviceStorage;

/// Binary element-wise operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementwiseOp {
    Add = 0,
    Sub = 1,
    Mul = 2,
    Div = 3,
}

impl ElementwiseOp {
    pub const ALL: [ElementwiseOp; 4] = [
        ElementwiseOp::Add,
        ElementwiseOp::Sub,
        ElementwiseOp::Mul,
        ElementwiseOp::Div,
    ];

    pub fn kernel_name(&self) -> &'static str {
        match self {
            ElementwiseOp::Add => "lumen_add",
            ElementwiseOp::Sub => "lumen_sub",
            ElementwiseOp::Mul => "lumen_mul",
            ElementwiseOp::Div => "lumen_div",
        }
    }
}

/// The four GEMM entry points of the BLAS library.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GemmKernel {
    Sgemm,
    Dgemm,
    Cgemm,
    Zgemm,
}

impl GemmKernel {
    pub fn for_dtype(dtype: DType) -> Self {
        match dtype {
            DType::F32 => GemmKernel::Sgemm,
            DType::F64 => GemmKernel::Dgemm,
            DType::C32 => GemmKernel::Cgemm,
            DType::C64 => GemmKernel::Zgemm,
        }
    }

    pub fn dtype(&self) -> DType {
        match self {
            GemmKernel::Sgemm => DType::F32,
            GemmKernel::Dgemm => DType::F64,
            GemmKernel::Cgemm => DType::C32,
            GemmKernel::Zgemm => DType::C64,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GemmKernel::Sgemm => "clblasSgemm",
            GemmKernel::Dgemm => "clblasDgemm",
            GemmKernel::Cgemm => "clblasCgemm",
            GemmKernel::Zgemm => "clblasZgemm",
        }
    }
}

/// Kernel and order flag for one (dtype, layout) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmPlan {
    pub kernel: GemmKernel,
    pub order: Layout,
}

/// GEMM extents and leading dimensions, in BLAS terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GemmDims {
    pub m: usize,
    pub n: usize,
    pub k: usize,
    pub lda: usize,
    pub ldb: usize,
    pub ldc: usize,
}

impl GemmDims {
    /// `[M, K] · [K, N] → [M, N]` with every operand stored in `layout`.
    pub fn new(layout: Layout, m: usize, n: usize, k: usize) -> Self {
        Self {
            m,
            n,
            k,
            lda: layout.leading_dimension(m, k),
            ldb: layout.leading_dimension(k, n),
            ldc: layout.leading_dimension(m, n),
        }
    }
}

static GEMM_PLANS: OnceLock<HashMap<(DType, Layout), GemmPlan>> = OnceLock::new();

fn gemm_plans() -> &'static HashMap<(DType, Layout), GemmPlan> {
    GEMM_PLANS.get_or_init(|| {
        let mut plans = HashMap::new();
        for dtype in DType::ALL {
            for order in Layout::ALL {
                plans.insert(
                    (dtype, order),
                    GemmPlan {
                        kernel: GemmKernel::for_dtype(dtype),
                        order,
                    },
                );
            }
        }
        plans
    })
}

/// Plan for a product of `dtype` matrices stored in `layout`.
pub fn gemm_plan(dtype: DType, layout: Layout) -> Result<GemmPlan> {
    gemm_plans()
        .get(&(dtype, layout))
        .copied()
        .ok_or_else(|| invalid_dimensions("gemm", format!("no kernel for {dtype} {layout}")))
}

fn check_view(handle: &DeviceHandle, view: &RawView<'_>, dtype: DType, len: usize, op: &'static str) -> Result<()> {
    handle.check_owner(view.owner())?;
    if view.dtype() != dtype || view.len() != len {
        return Err(invalid_dimensions(
            op,
            format!("operand holds {} {} elements, expected {len} {dtype}", view.len(), view.dtype()),
        ));
    }
    Ok(())
}

/// `C = A·B` for `[M, K] · [K, N]`, into fresh storage.
///
/// The result is zero-filled and the kernel accumulates into it with unit
/// `alpha` and `beta`. `M = 0` or `N = 0` launches nothing; `K = 0` leaves
/// the zero fill as the result.
pub(crate) fn gemm<'d, T: Element>(
    handle: &'d DeviceHandle,
    layout: Layout,
    a: RawView<'_>,
    b: RawView<'_>,
    m: usize,
    n: usize,
    k: usize,
) -> Result<DeviceStorage<'d, T>> {
    check_view(handle, &a, T::DTYPE, m.saturating_mul(k), "product")?;
    check_view(handle, &b, T::DTYPE, k.saturating_mul(n), "product")?;

    let c = DeviceStorage::alloc(handle, m.checked_mul(n).ok_or_else(size_overflow)?)?;
    if m == 0 || n == 0 {
        return Ok(c);
    }
    c.fill(T::zero())?;
    if k == 0 {
        return Ok(c);
    }

    let plan = gemm_plan(T::DTYPE, layout)?;
    let dims = GemmDims::new(plan.order, m, n, k);
    handle
        .queue()
        .gemm(plan.kernel, plan.order, &dims, a.buffer, b.buffer, c.buffer())?;
    Ok(c)
}

/// `c[i] = a[i] op b[i]` over `n` elements, into fresh storage.
pub(crate) fn elementwise<'d, T: Element>(
    handle: &'d DeviceHandle,
    op: ElementwiseOp,
    a: RawView<'_>,
    b: RawView<'_>,
    n: usize,
) -> Result<DeviceStorage<'d, T>> {
    let name = op.kernel_name();
    check_view(handle, &a, T::DTYPE, n, name)?;
    check_view(handle, &b, T::DTYPE, n, name)?;
    let c = DeviceStorage::alloc(handle, n)?;
    if n == 0 {
        return Ok(c);
    }
    handle
        .queue()
        .elementwise(T::DTYPE, op, n, a.buffer, b.buffer, c.buffer())?;
    Ok(c)
}

/// `seed + Σ xᵢ·yᵢ` over `n` elements. Complex types are not conjugated.
pub(crate) fn dot<T: Element>(handle: &DeviceHandle, x: RawView<'_>, y: RawView<'_>, n: usize, seed: T) -> Result<T> {
    check_view(handle, &x, T::DTYPE, n, "inner_product")?;
    check_view(handle, &y, T::DTYPE, n, "inner_product")?;
    if n == 0 {
        return Ok(seed);
    }
    let mut sum = T::zero();
    handle
        .queue()
        .dot(T::DTYPE, n, x.buffer, y.buffer, bytemuck::bytes_of_mut(&mut sum))?;
    Ok(seed + sum)
}
