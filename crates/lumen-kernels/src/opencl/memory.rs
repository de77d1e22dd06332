//! OpenCL buffer objects and blocking transfers.

use std::ffi::c_void;
use std::ptr;

use lumen_core::{LumenError, Result};

use super::context::ClQueue;
use super::ffi::{self, check_cl, ClEvent, ClMem, CL_MEM_READ_WRITE, CL_SUCCESS, CL_TRUE};

/// Owned `cl_mem`. Zero-byte buffers hold no runtime object.
pub struct ClBuffer {
    mem: ClMem,
    bytes: usize,
}

unsafe impl Send for ClBuffer {}

impl ClBuffer {
    pub fn alloc(queue: &ClQueue, bytes: usize) -> Result<Self> {
        if bytes == 0 {
            return Ok(Self { mem: ptr::null_mut(), bytes: 0 });
        }
        let api = ffi::loaded_opencl()?;
        let mut err = CL_SUCCESS;
        let mem = unsafe {
            (api.create_buffer)(queue.context(), CL_MEM_READ_WRITE, bytes, ptr::null_mut(), &mut err)
        };
        if err != CL_SUCCESS || mem.is_null() {
            return Err(LumenError::AllocationFailed { bytes, code: err });
        }
        Ok(Self { mem, bytes })
    }

    pub(crate) fn raw(&self) -> ClMem {
        self.mem
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    /// Blocking host → device copy of `src` into the start of the buffer.
    pub fn write(&self, queue: &ClQueue, src: &[u8]) -> Result<()> {
        debug_assert!(src.len() <= self.bytes);
        if src.is_empty() {
            return Ok(());
        }
        let api = ffi::loaded_opencl()?;
        check_cl(
            unsafe {
                (api.enqueue_write_buffer)(
                    queue.raw(),
                    self.mem,
                    CL_TRUE,
                    0,
                    src.len(),
                    src.as_ptr() as *const c_void,
                    0,
                    ptr::null(),
                    ptr::null_mut(),
                )
            },
            "clEnqueueWriteBuffer",
        )
    }

    /// Blocking device → host copy of the start of the buffer into `dst`.
    pub fn read(&self, queue: &ClQueue, dst: &mut [u8]) -> Result<()> {
        debug_assert!(dst.len() <= self.bytes);
        if dst.is_empty() {
            return Ok(());
        }
        let api = ffi::loaded_opencl()?;
        check_cl(
            unsafe {
                (api.enqueue_read_buffer)(
                    queue.raw(),
                    self.mem,
                    CL_TRUE,
                    0,
                    dst.len(),
                    dst.as_mut_ptr() as *mut c_void,
                    0,
                    ptr::null(),
                    ptr::null_mut(),
                )
            },
            "clEnqueueReadBuffer",
        )
    }

    /// Repeat `pattern` over the whole buffer and wait for completion.
    pub fn fill(&self, queue: &ClQueue, pattern: &[u8]) -> Result<()> {
        if self.bytes == 0 {
            return Ok(());
        }
        let api = ffi::loaded_opencl()?;
        let mut event: ClEvent = ptr::null_mut();
        check_cl(
            unsafe {
                (api.enqueue_fill_buffer)(
                    queue.raw(),
                    self.mem,
                    pattern.as_ptr() as *const c_void,
                    pattern.len(),
                    0,
                    self.bytes,
                    0,
                    ptr::null(),
                    &mut event,
                )
            },
            "clEnqueueFillBuffer",
        )?;
        wait_and_release(event, "clWaitForEvents")
    }
}

impl Drop for ClBuffer {
    fn drop(&mut self) {
        if self.mem.is_null() {
            return;
        }
        if let Ok(api) = ffi::loaded_opencl() {
            unsafe { (api.release_mem_object)(self.mem) };
        }
    }
}

/// Block on `event`, then release it.
pub(crate) fn wait_and_release(event: ClEvent, call: &'static str) -> Result<()> {
    if event.is_null() {
        return Ok(());
    }
    let api = ffi::loaded_opencl()?;
    let code = unsafe { (api.wait_for_events)(1, &event) };
    unsafe { (api.release_event)(event) };
    check_cl(code, call)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_event_is_noop() {
        assert!(wait_and_release(ptr::null_mut(), "clWaitForEvents").is_ok());
    }
}
