use std::fmt;

use lumen_core::{Element, LumenError, Result, Vector};

use crate::buffer::RawView;
use crate::device::{DeviceHandle, HandleId};
use crate::storage::DeviceStorage;

/// Device-resident dense vector, bound to one handle.
pub struct DeviceVector<'d, T: Element> {
    storage: DeviceStorage<'d, T>,
}

impl<'d, T: Element> DeviceVector<'d, T> {
    /// Allocate `len` elements with unspecified contents.
    pub fn new(len: usize, handle: &'d DeviceHandle) -> Result<Self> {
        Ok(Self { storage: DeviceStorage::alloc(handle, len)? })
    }

    pub fn from_elem(len: usize, value: T, handle: &'d DeviceHandle) -> Result<Self> {
        Ok(Self { storage: DeviceStorage::filled(handle, len, value)? })
    }

    pub fn zeros(len: usize, handle: &'d DeviceHandle) -> Result<Self> {
        Self::from_elem(len, T::zero(), handle)
    }

    pub fn from_host(host: &Vector<T>, handle: &'d DeviceHandle) -> Result<Self> {
        Ok(Self { storage: DeviceStorage::from_slice(handle, host.as_slice())? })
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    pub fn handle(&self) -> &'d DeviceHandle {
        self.storage.handle()
    }

    pub fn owner(&self) -> HandleId {
        self.storage.handle().id()
    }

    /// Reallocate with `len` elements. Prior contents are discarded.
    pub fn resize(&mut self, len: usize) -> Result<()> {
        self.storage = DeviceStorage::alloc(self.handle(), len)?;
        Ok(())
    }

    pub fn fill(&mut self, value: T) -> Result<()> {
        self.storage.fill(value)
    }

    /// Blocking copy of `host` (same length) into this vector.
    pub fn copy_from_host(&mut self, host: &Vector<T>, handle: &DeviceHandle) -> Result<()> {
        handle.check_owner(self.owner())?;
        if host.len() != self.len() {
            return Err(LumenError::ShapeMismatch {
                expected: (self.len(), 1),
                found: (host.len(), 1),
            });
        }
        self.storage.write(host.as_slice())
    }

    /// Blocking copy into `host`, resized to match; untouched on failure.
    pub fn copy_to_host(&self, host: &mut Vector<T>, handle: &DeviceHandle) -> Result<()> {
        handle.check_owner(self.owner())?;
        *host = self.to_host()?;
        Ok(())
    }

    pub fn to_host(&self) -> Result<Vector<T>> {
        Ok(Vector::from_vec(self.storage.to_vec()?))
    }

    pub(crate) fn view(&self) -> RawView<'_> {
        self.storage.view()
    }

    pub(crate) fn replace(&mut self, storage: DeviceStorage<'d, T>) {
        self.storage = storage;
    }
}

impl<T: Element> fmt::Debug for DeviceVector<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceVector")
            .field("len", &self.len())
            .field("dtype", &T::DTYPE)
            .field("owner", &self.owner())
            .finish()
    }
}
