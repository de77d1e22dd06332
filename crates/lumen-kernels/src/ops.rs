//! Host-transparent operations.
//!
//! Every operation accepts any mix of host-resident (`Matrix`, `Vector`) and
//! device-resident (`DeviceMatrix`, `DeviceVector`) operands. Host operands
//! are uploaded to the handle's device for the duration of the call; device
//! operands are used in place after checking they belong to the handle.
//!
//! Three call shapes exist per operation:
//! - `op(a, b, handle)` returns a new host-resident result,
//! - `op_into(a, b, &mut out, handle)` overwrites a host container, resizing it,
//! - `op_on_device(a, b, &mut out, handle)` leaves the result on the device.
//!
//! Shapes are validated before anything is staged, and a result container is
//! only written once the whole call has succeeded.

use lumen_core::error::invalid_dimensions;
use lumen_core::{Element, Matrix, Result, StorageOrder, Vector};

use crate::buffer::RawView;
use crate::device::DeviceHandle;
use crate::dispatch::{self, ElementwiseOp};
use crate::matrix::DeviceMatrix;
use crate::storage::DeviceStorage;
use crate::vector::DeviceVector;

/// An operand staged on a handle's device.
pub enum Staged<'a, T: Element> {
    /// Already resident on the target device.
    Resident(RawView<'a>),
    /// Uploaded from the host for this call; freed when dropped.
    Uploaded(DeviceStorage<'a, T>),
}

impl<T: Element> Staged<'_, T> {
    pub fn view(&self) -> RawView<'_> {
        match self {
            Staged::Resident(view) => *view,
            Staged::Uploaded(storage) => storage.view(),
        }
    }

    pub fn is_resident(&self) -> bool {
        matches!(self, Staged::Resident(_))
    }
}

mod sealed {
    pub trait Sealed {}
}

/// Device-resident result container of an operation.
pub trait DeviceResult<'d, T: Element>: sealed::Sealed {
    fn handle(&self) -> &'d DeviceHandle;

    #[doc(hidden)]
    fn replace(&mut self, rows: usize, cols: usize, storage: DeviceStorage<'d, T>);
}

/// Anything that can take part in an operation: a host or device matrix or
/// vector. Vectors report their shape as `(len, 1)`.
pub trait Operand: sealed::Sealed {
    type Elem: Element;

    /// Host container of the same kind (and layout).
    type Host;

    /// Device container of the same kind (and layout).
    type Device<'d>: DeviceResult<'d, Self::Elem>;

    fn dims(&self) -> (usize, usize);

    /// Make this operand available on `handle`'s device.
    fn stage<'a>(&'a self, handle: &'a DeviceHandle) -> Result<Staged<'a, Self::Elem>>;

    #[doc(hidden)]
    fn host_from(rows: usize, cols: usize, data: Vec<Self::Elem>) -> Result<Self::Host>;
}

impl<T: Element, L: StorageOrder> sealed::Sealed for Matrix<T, L> {}
impl<T: Element, L: StorageOrder> sealed::Sealed for DeviceMatrix<'_, T, L> {}
impl<T: Element> sealed::Sealed for Vector<T> {}
impl<T: Element> sealed::Sealed for DeviceVector<'_, T> {}

impl<'d, T: Element, L: StorageOrder> DeviceResult<'d, T> for DeviceMatrix<'d, T, L> {
    fn handle(&self) -> &'d DeviceHandle {
        DeviceMatrix::handle(self)
    }

    fn replace(&mut self, rows: usize, cols: usize, storage: DeviceStorage<'d, T>) {
        DeviceMatrix::replace(self, rows, cols, storage)
    }
}

impl<'d, T: Element> DeviceResult<'d, T> for DeviceVector<'d, T> {
    fn handle(&self) -> &'d DeviceHandle {
        DeviceVector::handle(self)
    }

    fn replace(&mut self, _rows: usize, _cols: usize, storage: DeviceStorage<'d, T>) {
        DeviceVector::replace(self, storage)
    }
}

impl<T: Element, L: StorageOrder> Operand for Matrix<T, L> {
    type Elem = T;
    type Host = Matrix<T, L>;
    type Device<'d> = DeviceMatrix<'d, T, L>;

    fn dims(&self) -> (usize, usize) {
        self.shape()
    }

    fn stage<'a>(&'a self, handle: &'a DeviceHandle) -> Result<Staged<'a, T>> {
        tracing::debug!(rows = self.rows(), cols = self.cols(), "staging host matrix");
        Ok(Staged::Uploaded(DeviceStorage::from_slice(handle, self.as_slice())?))
    }

    fn host_from(rows: usize, cols: usize, data: Vec<T>) -> Result<Matrix<T, L>> {
        Matrix::from_vec(rows, cols, data)
    }
}

impl<T: Element, L: StorageOrder> Operand for DeviceMatrix<'_, T, L> {
    type Elem = T;
    type Host = Matrix<T, L>;
    type Device<'d> = DeviceMatrix<'d, T, L>;

    fn dims(&self) -> (usize, usize) {
        self.shape()
    }

    fn stage<'a>(&'a self, handle: &'a DeviceHandle) -> Result<Staged<'a, T>> {
        handle.check_owner(self.owner())?;
        Ok(Staged::Resident(self.view()))
    }

    fn host_from(rows: usize, cols: usize, data: Vec<T>) -> Result<Matrix<T, L>> {
        Matrix::from_vec(rows, cols, data)
    }
}

impl<T: Element> Operand for Vector<T> {
    type Elem = T;
    type Host = Vector<T>;
    type Device<'d> = DeviceVector<'d, T>;

    fn dims(&self) -> (usize, usize) {
        (self.len(), 1)
    }

    fn stage<'a>(&'a self, handle: &'a DeviceHandle) -> Result<Staged<'a, T>> {
        tracing::debug!(len = self.len(), "staging host vector");
        Ok(Staged::Uploaded(DeviceStorage::from_slice(handle, self.as_slice())?))
    }

    fn host_from(_rows: usize, _cols: usize, data: Vec<T>) -> Result<Vector<T>> {
        Ok(Vector::from_vec(data))
    }
}

impl<T: Element> Operand for DeviceVector<'_, T> {
    type Elem = T;
    type Host = Vector<T>;
    type Device<'d> = DeviceVector<'d, T>;

    fn dims(&self) -> (usize, usize) {
        (self.len(), 1)
    }

    fn stage<'a>(&'a self, handle: &'a DeviceHandle) -> Result<Staged<'a, T>> {
        handle.check_owner(self.owner())?;
        Ok(Staged::Resident(self.view()))
    }

    fn host_from(_rows: usize, _cols: usize, data: Vec<T>) -> Result<Vector<T>> {
        Ok(Vector::from_vec(data))
    }
}

// ---------------------------------------------------------------------------
// Generic staging wrapper
// ---------------------------------------------------------------------------

/// Result shape plus the raw fresh storage a kernel wrote into.
struct Computed<'d, T: Element> {
    rows: usize,
    cols: usize,
    storage: DeviceStorage<'d, T>,
}

impl<'d, T: Element> Computed<'d, T> {
    fn into_host<H>(self, build: fn(usize, usize, Vec<T>) -> Result<H>) -> Result<H> {
        let data = self.storage.to_vec()?;
        build(self.rows, self.cols, data)
    }

    fn into_device<D: DeviceResult<'d, T>>(self, out: &mut D) {
        out.replace(self.rows, self.cols, self.storage);
    }
}

/// Stage both operands, then run `kernel` on their views.
fn with_staged<A, B, T, R>(
    a: &A,
    b: &B,
    handle: &DeviceHandle,
    kernel: impl FnOnce(RawView<'_>, RawView<'_>) -> Result<R>,
) -> Result<R>
where
    T: Element,
    A: Operand<Elem = T>,
    B: Operand<Elem = T>,
{
    let sa = a.stage(handle)?;
    let sb = b.stage(handle)?;
    if sa.is_resident() != sb.is_resident() {
        tracing::debug!(a_resident = sa.is_resident(), b_resident = sb.is_resident(), "mixed residency");
    }
    kernel(sa.view(), sb.view())
}

/// Validate `out`'s handle against the call's handle before any work.
fn device_target<'d, T: Element, D: DeviceResult<'d, T>>(
    out: &D,
    handle: &DeviceHandle,
) -> Result<&'d DeviceHandle> {
    let target = out.handle();
    handle.check_owner(target.id())?;
    Ok(target)
}

// ---------------------------------------------------------------------------
// Products
// ---------------------------------------------------------------------------

fn check_product(op: &'static str, (m, k): (usize, usize), (k2, n): (usize, usize)) -> Result<(usize, usize, usize)> {
    if k != k2 {
        return Err(invalid_dimensions(op, format!("[{m}x{k}] · [{k2}x{n}]")));
    }
    Ok((m, n, k))
}

fn product_impl<'d, A, B, T, L>(a: &A, b: &B, handle: &'d DeviceHandle) -> Result<Computed<'d, T>>
where
    T: Element,
    L: StorageOrder,
    A: Operand<Elem = T, Host = Matrix<T, L>>,
    B: Operand<Elem = T, Host = Matrix<T, L>>,
{
    let (m, n, k) = check_product("product", a.dims(), b.dims())?;
    let storage = with_staged(a, b, handle, |va, vb| dispatch::gemm::<T>(handle, L::LAYOUT, va, vb, m, n, k))?;
    Ok(Computed { rows: m, cols: n, storage })
}

/// Matrix product `A · B`.
pub fn product<A, B, T, L>(a: &A, b: &B, handle: &DeviceHandle) -> Result<Matrix<T, L>>
where
    T: Element,
    L: StorageOrder,
    A: Operand<Elem = T, Host = Matrix<T, L>>,
    B: Operand<Elem = T, Host = Matrix<T, L>>,
{
    product_impl(a, b, handle)?.into_host(Matrix::from_vec)
}

pub fn product_into<A, B, T, L>(a: &A, b: &B, out: &mut Matrix<T, L>, handle: &DeviceHandle) -> Result<()>
where
    T: Element,
    L: StorageOrder,
    A: Operand<Elem = T, Host = Matrix<T, L>>,
    B: Operand<Elem = T, Host = Matrix<T, L>>,
{
    *out = product(a, b, handle)?;
    Ok(())
}

pub fn product_on_device<'d, A, B, T, L>(
    a: &A,
    b: &B,
    out: &mut DeviceMatrix<'d, T, L>,
    handle: &DeviceHandle,
) -> Result<()>
where
    T: Element,
    L: StorageOrder,
    A: Operand<Elem = T, Host = Matrix<T, L>>,
    B: Operand<Elem = T, Host = Matrix<T, L>>,
{
    let target = device_target(&*out, handle)?;
    product_impl(a, b, target)?.into_device(out);
    Ok(())
}

fn product_mv_impl<'d, A, X, T, L>(a: &A, x: &X, handle: &'d DeviceHandle) -> Result<Computed<'d, T>>
where
    T: Element,
    L: StorageOrder,
    A: Operand<Elem = T, Host = Matrix<T, L>>,
    X: Operand<Elem = T, Host = Vector<T>>,
{
    let (m, n, k) = check_product("product_mv", a.dims(), x.dims())?;
    let storage = with_staged(a, x, handle, |va, vx| dispatch::gemm::<T>(handle, L::LAYOUT, va, vx, m, n, k))?;
    Ok(Computed { rows: m, cols: n, storage })
}

/// Matrix-vector product `A · x`.
pub fn product_mv<A, X, T, L>(a: &A, x: &X, handle: &DeviceHandle) -> Result<Vector<T>>
where
    T: Element,
    L: StorageOrder,
    A: Operand<Elem = T, Host = Matrix<T, L>>,
    X: Operand<Elem = T, Host = Vector<T>>,
{
    product_mv_impl(a, x, handle)?.into_host(X::host_from)
}

pub fn product_mv_into<A, X, T, L>(a: &A, x: &X, out: &mut Vector<T>, handle: &DeviceHandle) -> Result<()>
where
    T: Element,
    L: StorageOrder,
    A: Operand<Elem = T, Host = Matrix<T, L>>,
    X: Operand<Elem = T, Host = Vector<T>>,
{
    *out = product_mv(a, x, handle)?;
    Ok(())
}

pub fn product_mv_on_device<'d, A, X, T, L>(
    a: &A,
    x: &X,
    out: &mut DeviceVector<'d, T>,
    handle: &DeviceHandle,
) -> Result<()>
where
    T: Element,
    L: StorageOrder,
    A: Operand<Elem = T, Host = Matrix<T, L>>,
    X: Operand<Elem = T, Host = Vector<T>>,
{
    let target = device_target(&*out, handle)?;
    product_mv_impl(a, x, target)?.into_device(out);
    Ok(())
}

fn product_vm_impl<'d, X, A, T, L>(x: &X, a: &A, handle: &'d DeviceHandle) -> Result<Computed<'d, T>>
where
    T: Element,
    L: StorageOrder,
    X: Operand<Elem = T, Host = Vector<T>>,
    A: Operand<Elem = T, Host = Matrix<T, L>>,
{
    let (len, _) = x.dims();
    let (m, n, k) = check_product("product_vm", (1, len), a.dims())?;
    let storage = with_staged(x, a, handle, |vx, va| dispatch::gemm::<T>(handle, L::LAYOUT, vx, va, m, n, k))?;
    Ok(Computed { rows: n, cols: 1, storage })
}

/// Vector-matrix product `xᵀ · A`.
pub fn product_vm<X, A, T, L>(x: &X, a: &A, handle: &DeviceHandle) -> Result<Vector<T>>
where
    T: Element,
    L: StorageOrder,
    X: Operand<Elem = T, Host = Vector<T>>,
    A: Operand<Elem = T, Host = Matrix<T, L>>,
{
    product_vm_impl(x, a, handle)?.into_host(X::host_from)
}

pub fn product_vm_into<X, A, T, L>(x: &X, a: &A, out: &mut Vector<T>, handle: &DeviceHandle) -> Result<()>
where
    T: Element,
    L: StorageOrder,
    X: Operand<Elem = T, Host = Vector<T>>,
    A: Operand<Elem = T, Host = Matrix<T, L>>,
{
    *out = product_vm(x, a, handle)?;
    Ok(())
}

pub fn product_vm_on_device<'d, X, A, T, L>(
    x: &X,
    a: &A,
    out: &mut DeviceVector<'d, T>,
    handle: &DeviceHandle,
) -> Result<()>
where
    T: Element,
    L: StorageOrder,
    X: Operand<Elem = T, Host = Vector<T>>,
    A: Operand<Elem = T, Host = Matrix<T, L>>,
{
    let target = device_target(&*out, handle)?;
    product_vm_impl(x, a, target)?.into_device(out);
    Ok(())
}

fn outer_impl<'d, X, Y, T, L>(x: &X, y: &Y, handle: &'d DeviceHandle) -> Result<Computed<'d, T>>
where
    T: Element,
    L: StorageOrder,
    X: Operand<Elem = T, Host = Vector<T>>,
    Y: Operand<Elem = T, Host = Vector<T>>,
{
    let ((m, _), (n, _)) = (x.dims(), y.dims());
    let storage = with_staged(x, y, handle, |vx, vy| dispatch::gemm::<T>(handle, L::LAYOUT, vx, vy, m, n, 1))?;
    Ok(Computed { rows: m, cols: n, storage })
}

/// Outer product `x · yᵀ`, stored in layout `L`.
pub fn outer_product<X, Y, T, L>(x: &X, y: &Y, handle: &DeviceHandle) -> Result<Matrix<T, L>>
where
    T: Element,
    L: StorageOrder,
    X: Operand<Elem = T, Host = Vector<T>>,
    Y: Operand<Elem = T, Host = Vector<T>>,
{
    outer_impl::<X, Y, T, L>(x, y, handle)?.into_host(Matrix::from_vec)
}

pub fn outer_product_into<X, Y, T, L>(x: &X, y: &Y, out: &mut Matrix<T, L>, handle: &DeviceHandle) -> Result<()>
where
    T: Element,
    L: StorageOrder,
    X: Operand<Elem = T, Host = Vector<T>>,
    Y: Operand<Elem = T, Host = Vector<T>>,
{
    *out = outer_product(x, y, handle)?;
    Ok(())
}

pub fn outer_product_on_device<'d, X, Y, T, L>(
    x: &X,
    y: &Y,
    out: &mut DeviceMatrix<'d, T, L>,
    handle: &DeviceHandle,
) -> Result<()>
where
    T: Element,
    L: StorageOrder,
    X: Operand<Elem = T, Host = Vector<T>>,
    Y: Operand<Elem = T, Host = Vector<T>>,
{
    let target = device_target(&*out, handle)?;
    outer_impl::<X, Y, T, L>(x, y, target)?.into_device(out);
    Ok(())
}

/// Inner product `seed + Σ xᵢ·yᵢ` (unconjugated for complex types).
pub fn inner_product<X, Y, T>(x: &X, y: &Y, seed: T, handle: &DeviceHandle) -> Result<T>
where
    T: Element,
    X: Operand<Elem = T, Host = Vector<T>>,
    Y: Operand<Elem = T, Host = Vector<T>>,
{
    let ((n, _), (n2, _)) = (x.dims(), y.dims());
    if n != n2 {
        return Err(invalid_dimensions("inner_product", format!("lengths {n} and {n2}")));
    }
    with_staged(x, y, handle, |vx, vy| dispatch::dot(handle, vx, vy, n, seed))
}

// ---------------------------------------------------------------------------
// Element-wise
// ---------------------------------------------------------------------------

fn elementwise_impl<'d, A, B>(
    op: ElementwiseOp,
    a: &A,
    b: &B,
    handle: &'d DeviceHandle,
) -> Result<Computed<'d, A::Elem>>
where
    A: Operand,
    B: Operand<Elem = A::Elem, Host = A::Host>,
{
    let (rows, cols) = a.dims();
    if b.dims() != (rows, cols) {
        return Err(invalid_dimensions(
            op.kernel_name(),
            format!("shapes {:?} and {:?} differ", (rows, cols), b.dims()),
        ));
    }
    let storage = with_staged(a, b, handle, |va, vb| {
        dispatch::elementwise::<A::Elem>(handle, op, va, vb, rows * cols)
    })?;
    Ok(Computed { rows, cols, storage })
}

fn elementwise_host<A, B>(op: ElementwiseOp, a: &A, b: &B, handle: &DeviceHandle) -> Result<A::Host>
where
    A: Operand,
    B: Operand<Elem = A::Elem, Host = A::Host>,
{
    elementwise_impl(op, a, b, handle)?.into_host(A::host_from)
}

fn elementwise_device<'d, A, B>(
    op: ElementwiseOp,
    a: &A,
    b: &B,
    out: &mut A::Device<'d>,
    handle: &DeviceHandle,
) -> Result<()>
where
    A: Operand,
    B: Operand<Elem = A::Elem, Host = A::Host>,
{
    let target = device_target(&*out, handle)?;
    elementwise_impl(op, a, b, target)?.into_device(out);
    Ok(())
}

macro_rules! elementwise_ops {
    ($($op:ident: $name:ident, $into:ident, $on_device:ident, $doc:literal;)*) => {$(
        #[doc = $doc]
        pub fn $name<A, B>(a: &A, b: &B, handle: &DeviceHandle) -> Result<A::Host>
        where
            A: Operand,
            B: Operand<Elem = A::Elem, Host = A::Host>,
        {
            elementwise_host(ElementwiseOp::$op, a, b, handle)
        }

        pub fn $into<A, B>(a: &A, b: &B, out: &mut A::Host, handle: &DeviceHandle) -> Result<()>
        where
            A: Operand,
            B: Operand<Elem = A::Elem, Host = A::Host>,
        {
            *out = elementwise_host(ElementwiseOp::$op, a, b, handle)?;
            Ok(())
        }

        pub fn $on_device<'d, A, B>(a: &A, b: &B, out: &mut A::Device<'d>, handle: &DeviceHandle) -> Result<()>
        where
            A: Operand,
            B: Operand<Elem = A::Elem, Host = A::Host>,
        {
            elementwise_device(ElementwiseOp::$op, a, b, out, handle)
        }
    )*};
}

elementwise_ops! {
    Add: element_add, element_add_into, element_add_on_device, "Element-wise `a + b`.";
    Sub: element_sub, element_sub_into, element_sub_on_device, "Element-wise `a - b`.";
    Mul: element_mul, element_mul_into, element_mul_on_device, "Element-wise `a * b`.";
    Div: element_div, element_div_into, element_div_on_device, "Element-wise `a / b`.";
}
