use std::cell::{Ref, RefCell, RefMut};

use bytemuck::Pod;

use lumen_core::error::HOST_ALLOC_STATUS;
use lumen_core::{LumenError, Result};

/// Buffer of the in-process device.
///
/// Backed by `u64` words so every element type is correctly aligned when the
/// bytes are reinterpreted.
pub struct HostBuffer {
    words: RefCell<Vec<u64>>,
    bytes: usize,
}

impl HostBuffer {
    /// Zeroed buffer of `bytes` bytes. Fails with `AllocationFailed` when
    /// the allocator cannot provide it.
    pub fn alloc(bytes: usize) -> Result<Self> {
        let len = bytes.div_ceil(8);
        let mut words = Vec::new();
        words.try_reserve_exact(len).map_err(|_| LumenError::AllocationFailed {
            bytes,
            code: HOST_ALLOC_STATUS,
        })?;
        words.resize(len, 0u64);
        Ok(Self {
            words: RefCell::new(words),
            bytes,
        })
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn write(&self, src: &[u8]) {
        let mut words = self.words.borrow_mut();
        let dst: &mut [u8] = bytemuck::cast_slice_mut(words.as_mut_slice());
        dst[..src.len()].copy_from_slice(src);
    }

    pub fn read(&self, dst: &mut [u8]) {
        let words = self.words.borrow();
        let src: &[u8] = bytemuck::cast_slice(words.as_slice());
        dst.copy_from_slice(&src[..dst.len()]);
    }

    pub fn fill(&self, pattern: &[u8]) {
        if pattern.is_empty() {
            return;
        }
        let mut words = self.words.borrow_mut();
        let dst: &mut [u8] = bytemuck::cast_slice_mut(words.as_mut_slice());
        for chunk in dst[..self.bytes].chunks_mut(pattern.len()) {
            chunk.copy_from_slice(&pattern[..chunk.len()]);
        }
    }

    /// First `len` elements viewed as `T`.
    pub fn typed<T: Pod>(&self, len: usize) -> Ref<'_, [T]> {
        Ref::map(self.words.borrow(), |words| {
            let bytes: &[u8] = bytemuck::cast_slice(words.as_slice());
            bytemuck::cast_slice(&bytes[..len * std::mem::size_of::<T>()])
        })
    }

    pub fn typed_mut<T: Pod>(&self, len: usize) -> RefMut<'_, [T]> {
        RefMut::map(self.words.borrow_mut(), |words| {
            let bytes: &mut [u8] = bytemuck::cast_slice_mut(words.as_mut_slice());
            bytemuck::cast_slice_mut(&mut bytes[..len * std::mem::size_of::<T>()])
        })
    }
}
