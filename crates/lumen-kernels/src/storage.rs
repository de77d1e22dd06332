//! Typed device allocation shared by `DeviceMatrix` and `DeviceVector`.

use std::marker::PhantomData;

use lumen_core::error::size_overflow;
use lumen_core::{Element, Result};

use crate::buffer::{DeviceBuffer, RawView};
use crate::device::DeviceHandle;

/// `len` elements of `T` in device memory, bound to one handle.
///
/// The allocation is always exactly `len * size_of::<T>()` bytes.
pub struct DeviceStorage<'d, T: Element> {
    handle: &'d DeviceHandle,
    buffer: DeviceBuffer,
    len: usize,
    _elem: PhantomData<T>,
}

impl<'d, T: Element> DeviceStorage<'d, T> {
    /// Allocate without initializing. Contents are unspecified.
    ///
    /// A byte size that overflows `usize` fails with `AllocationFailed`
    /// before the device is asked for memory.
    pub(crate) fn alloc(handle: &'d DeviceHandle, len: usize) -> Result<Self> {
        let bytes = T::DTYPE.storage_bytes(len).ok_or_else(size_overflow)?;
        let buffer = handle.queue().alloc(bytes)?;
        Ok(Self {
            handle,
            buffer,
            len,
            _elem: PhantomData,
        })
    }

    pub(crate) fn filled(handle: &'d DeviceHandle, len: usize, value: T) -> Result<Self> {
        let storage = Self::alloc(handle, len)?;
        storage.fill(value)?;
        Ok(storage)
    }

    pub(crate) fn from_slice(handle: &'d DeviceHandle, data: &[T]) -> Result<Self> {
        let storage = Self::alloc(handle, data.len())?;
        storage.write(data)?;
        Ok(storage)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn handle(&self) -> &'d DeviceHandle {
        self.handle
    }

    /// Blocking copy of `data` (exactly `len` elements) to the device.
    pub(crate) fn write(&self, data: &[T]) -> Result<()> {
        debug_assert_eq!(data.len(), self.len);
        if self.len == 0 {
            return Ok(());
        }
        self.handle.queue().write(&self.buffer, bytemuck::cast_slice(data))
    }

    /// Blocking copy of the whole allocation into `out`.
    pub(crate) fn read(&self, out: &mut [T]) -> Result<()> {
        debug_assert_eq!(out.len(), self.len);
        if self.len == 0 {
            return Ok(());
        }
        self.handle.queue().read(&self.buffer, bytemuck::cast_slice_mut(out))
    }

    pub(crate) fn to_vec(&self) -> Result<Vec<T>> {
        let mut out = vec![T::zero(); self.len];
        self.read(&mut out)?;
        Ok(out)
    }

    pub(crate) fn fill(&self, value: T) -> Result<()> {
        if self.len == 0 {
            return Ok(());
        }
        self.handle.queue().fill(&self.buffer, bytemuck::bytes_of(&value))
    }

    pub(crate) fn buffer(&self) -> &DeviceBuffer {
        &self.buffer
    }

    pub(crate) fn view(&self) -> RawView<'_> {
        RawView {
            buffer: &self.buffer,
            len: self.len,
            dtype: T::DTYPE,
            owner: self.handle.id(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;
    use lumen_core::Complex64;

    #[test]
    fn test_write_then_read() {
        let handle = DeviceHandle::with_config(&RuntimeConfig::host(1)).unwrap();
        let data = [1.5f64, -2.0, 3.25];
        let storage = DeviceStorage::from_slice(&handle, &data).unwrap();
        assert_eq!(storage.len(), 3);
        assert_eq!(storage.buffer().bytes(), 24);
        assert_eq!(storage.to_vec().unwrap(), data);
    }

    #[test]
    fn test_fill_complex() {
        let handle = DeviceHandle::with_config(&RuntimeConfig::host(1)).unwrap();
        let z = Complex64::new(0.5, 2.0);
        let storage = DeviceStorage::filled(&handle, 4, z).unwrap();
        assert_eq!(storage.to_vec().unwrap(), vec![z; 4]);
    }

    #[test]
    fn test_empty_storage_touches_nothing() {
        let handle = DeviceHandle::with_config(&RuntimeConfig::host(1)).unwrap();
        let storage = DeviceStorage::<f32>::filled(&handle, 0, 1.0).unwrap();
        assert!(storage.to_vec().unwrap().is_empty());
        assert_eq!(handle.queue().stats().fills, 0);
        assert_eq!(handle.queue().stats().transfers, 0);
    }
}
