//! Device-resident dense matrix.

use std::fmt;
use std::marker::PhantomData;

use lumen_core::error::size_overflow;
use lumen_core::{Element, Layout, LumenError, Matrix, Result, RowMajor, StorageOrder};

use crate::buffer::RawView;
use crate::device::{DeviceHandle, HandleId};
use crate::storage::DeviceStorage;

/// A `rows × cols` matrix of `T` in the memory of one device, stored in
/// layout `L`.
///
/// Borrows its handle, so it cannot outlive it. Every method blocks until
/// the device has finished the work it submitted.
pub struct DeviceMatrix<'d, T: Element, L: StorageOrder = RowMajor> {
    rows: usize,
    cols: usize,
    storage: DeviceStorage<'d, T>,
    _layout: PhantomData<L>,
}

impl<'d, T: Element, L: StorageOrder> DeviceMatrix<'d, T, L> {
    /// Allocate `rows × cols` elements. Contents are unspecified until
    /// written or filled.
    pub fn new(rows: usize, cols: usize, handle: &'d DeviceHandle) -> Result<Self> {
        let len = L::LAYOUT.storage_size(rows, cols).ok_or_else(size_overflow)?;
        Ok(Self::from_storage(rows, cols, DeviceStorage::alloc(handle, len)?))
    }

    /// Allocate and fill every element with `value`.
    pub fn from_elem(rows: usize, cols: usize, value: T, handle: &'d DeviceHandle) -> Result<Self> {
        let len = L::LAYOUT.storage_size(rows, cols).ok_or_else(size_overflow)?;
        Ok(Self::from_storage(rows, cols, DeviceStorage::filled(handle, len, value)?))
    }

    pub fn zeros(rows: usize, cols: usize, handle: &'d DeviceHandle) -> Result<Self> {
        Self::from_elem(rows, cols, T::zero(), handle)
    }

    /// Allocate a matrix shaped like `host` and copy its contents over.
    pub fn from_host(host: &Matrix<T, L>, handle: &'d DeviceHandle) -> Result<Self> {
        Ok(Self::from_storage(
            host.rows(),
            host.cols(),
            DeviceStorage::from_slice(handle, host.as_slice())?,
        ))
    }

    pub(crate) fn from_storage(rows: usize, cols: usize, storage: DeviceStorage<'d, T>) -> Self {
        debug_assert_eq!(storage.len(), rows * cols);
        Self {
            rows,
            cols,
            storage,
            _layout: PhantomData,
        }
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn layout(&self) -> Layout {
        L::LAYOUT
    }

    pub fn handle(&self) -> &'d DeviceHandle {
        self.storage.handle()
    }

    pub fn owner(&self) -> HandleId {
        self.storage.handle().id()
    }

    /// Reallocate as `rows × cols`. Prior contents are discarded.
    pub fn resize(&mut self, rows: usize, cols: usize) -> Result<()> {
        let len = L::LAYOUT.storage_size(rows, cols).ok_or_else(size_overflow)?;
        let storage = DeviceStorage::alloc(self.handle(), len)?;
        self.storage = storage;
        self.rows = rows;
        self.cols = cols;
        Ok(())
    }

    pub fn fill(&mut self, value: T) -> Result<()> {
        self.storage.fill(value)
    }

    /// Blocking copy of `host` into this matrix.
    ///
    /// `handle` must be the one this matrix is bound to, and `host` must have
    /// exactly this matrix's shape; the source is never resized.
    pub fn copy_from_host(&mut self, host: &Matrix<T, L>, handle: &DeviceHandle) -> Result<()> {
        handle.check_owner(self.owner())?;
        if host.shape() != self.shape() {
            return Err(LumenError::ShapeMismatch {
                expected: self.shape(),
                found: host.shape(),
            });
        }
        self.storage.write(host.as_slice())
    }

    /// Blocking copy of this matrix into `host`, which is resized to match.
    ///
    /// `host` is left untouched if the copy fails.
    pub fn copy_to_host(&self, host: &mut Matrix<T, L>, handle: &DeviceHandle) -> Result<()> {
        handle.check_owner(self.owner())?;
        *host = self.to_host()?;
        Ok(())
    }

    pub fn to_host(&self) -> Result<Matrix<T, L>> {
        Matrix::from_vec(self.rows, self.cols, self.storage.to_vec()?)
    }

    pub(crate) fn view(&self) -> RawView<'_> {
        self.storage.view()
    }

    pub(crate) fn replace(&mut self, rows: usize, cols: usize, storage: DeviceStorage<'d, T>) {
        debug_assert_eq!(storage.len(), rows * cols);
        self.rows = rows;
        self.cols = cols;
        self.storage = storage;
    }
}

impl<T: Element, L: StorageOrder> fmt::Debug for DeviceMatrix<'_, T, L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceMatrix")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .field("dtype", &T::DTYPE)
            .field("layout", &L::LAYOUT)
            .field("owner", &self.owner())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use lumen_core::ColumnMajor;

    fn handle() -> DeviceHandle {
        DeviceHandle::with_config(&RuntimeConfig::host(1)).unwrap()
    }

    #[test]
    fn test_round_trip_column_major() {
        let h = handle();
        let host: Matrix<f64, ColumnMajor> = Matrix::from_fn(3, 2, |i, j| (i * 10 + j) as f64);
        let dev = DeviceMatrix::from_host(&host, &h).unwrap();
        assert_eq!(dev.shape(), (3, 2));
        assert_eq!(dev.layout(), Layout::ColumnMajor);
        assert_eq!(dev.to_host().unwrap(), host);
    }

    #[test]
    fn test_fill_and_resize() {
        let h = handle();
        let mut dev: DeviceMatrix<f32> = DeviceMatrix::from_elem(2, 2, 7.0, &h).unwrap();
        assert_eq!(dev.to_host().unwrap().as_slice(), &[7.0; 4]);
        dev.resize(3, 1).unwrap();
        assert_eq!(dev.shape(), (3, 1));
        assert_eq!(dev.len(), 3);
        dev.fill(1.0).unwrap();
        assert_eq!(dev.to_host().unwrap().as_slice(), &[1.0; 3]);
    }

    #[test]
    fn test_resize_same_shape_is_idempotent() {
        let h = handle();
        let mut dev: DeviceMatrix<f64, ColumnMajor> = DeviceMatrix::from_elem(3, 2, 9.0, &h).unwrap();
        dev.resize(3, 2).unwrap();
        dev.resize(3, 2).unwrap();
        assert_eq!(dev.shape(), (3, 2));
        assert_eq!(dev.len(), 6);

        dev.fill(-1.0).unwrap();
        assert!(dev.to_host().unwrap().as_slice().iter().all(|&x| x == -1.0));

        let host: Matrix<f64, ColumnMajor> = Matrix::from_fn(3, 2, |i, j| (i + 10 * j) as f64);
        dev.copy_from_host(&host, &h).unwrap();
        assert_eq!(dev.len(), 6);
        assert_eq!(dev.to_host().unwrap(), host);
    }

    #[test]
    fn test_overflowing_shape_is_allocation_failure() {
        let h = handle();
        let err = DeviceMatrix::<f32>::new(usize::MAX / 2 + 1, 2, &h).unwrap_err();
        assert!(matches!(err, LumenError::AllocationFailed { bytes: usize::MAX, .. }));

        let mut dev: DeviceMatrix<f32> = DeviceMatrix::from_elem(2, 2, 3.0, &h).unwrap();
        assert!(matches!(
            dev.resize(usize::MAX, 2),
            Err(LumenError::AllocationFailed { .. })
        ));
        // a failed resize keeps the old allocation
        assert_eq!(dev.shape(), (2, 2));
        assert_eq!(dev.to_host().unwrap().as_slice(), &[3.0; 4]);
    }

    #[test]
    fn test_copy_to_host_resizes_destination() {
        let h = handle();
        let dev: DeviceMatrix<f64> = DeviceMatrix::from_elem(2, 3, 4.0, &h).unwrap();
        let mut host: Matrix<f64> = Matrix::zeros(1, 1);
        dev.copy_to_host(&mut host, &h).unwrap();
        assert_eq!(host.shape(), (2, 3));
        assert!(host.as_slice().iter().all(|&x| x == 4.0));
    }

    #[test]
    fn test_copy_from_host_checks_shape_and_handle() {
        let h = handle();
        let other = handle();
        let mut dev: DeviceMatrix<f32> = DeviceMatrix::zeros(2, 2, &h).unwrap();
        let wrong: Matrix<f32> = Matrix::zeros(2, 3);
        assert!(matches!(
            dev.copy_from_host(&wrong, &h),
            Err(LumenError::ShapeMismatch { expected: (2, 2), found: (2, 3) })
        ));
        let right: Matrix<f32> = Matrix::from_elem(2, 2, 3.0);
        assert!(matches!(
            dev.copy_from_host(&right, &other),
            Err(LumenError::DeviceMismatch { .. })
        ));
        dev.copy_from_host(&right, &h).unwrap();
        assert_eq!(dev.to_host().unwrap(), right);
    }
}
