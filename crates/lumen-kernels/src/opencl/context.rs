//! OpenCL device enumeration, context and command queue.
//!
//! Devices are numbered by flattening every platform's device list in the
//! order the ICD loader reports them.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::ptr;

use lumen_core::{DType, LumenError, Result};

use super::ffi::{
    self, check_cl, ClCommandQueue, ClContext as RawContext, ClDeviceId, ClPlatformId, ClUint,
    OpenClApi, CL_DEVICE_NAME, CL_DEVICE_NOT_FOUND, CL_DEVICE_TYPE, CL_DEVICE_TYPE_ALL,
    CL_DEVICE_TYPE_GPU, CL_DEVICE_VENDOR, CL_SUCCESS,
};
use super::program::ElementwiseProgram;

/// One OpenCL device as reported by the runtime.
#[derive(Debug, Clone)]
pub struct ClDevice {
    pub(crate) id: ClDeviceId,
    pub name: String,
    pub vendor: String,
    pub is_gpu: bool,
}

// Device ids are plain runtime handles, valid for the whole process.
unsafe impl Send for ClDevice {}

fn device_info_string(api: &OpenClApi, device: ClDeviceId, param: ClUint) -> Result<String> {
    let mut size = 0usize;
    check_cl(
        unsafe { (api.get_device_info)(device, param, 0, ptr::null_mut(), &mut size) },
        "clGetDeviceInfo",
    )?;
    let mut buf = vec![0u8; size];
    check_cl(
        unsafe {
            (api.get_device_info)(device, param, size, buf.as_mut_ptr() as *mut c_void, ptr::null_mut())
        },
        "clGetDeviceInfo",
    )?;
    while buf.last() == Some(&0) {
        buf.pop();
    }
    Ok(String::from_utf8_lossy(&buf).trim().to_string())
}

fn device_type(api: &OpenClApi, device: ClDeviceId) -> Result<u64> {
    let mut ty = 0u64;
    check_cl(
        unsafe {
            (api.get_device_info)(
                device,
                CL_DEVICE_TYPE,
                std::mem::size_of::<u64>(),
                &mut ty as *mut u64 as *mut c_void,
                ptr::null_mut(),
            )
        },
        "clGetDeviceInfo",
    )?;
    Ok(ty)
}

/// Every device of every platform, in index order.
pub fn enumerate_devices(api: &OpenClApi) -> Result<Vec<ClDevice>> {
    let mut n_platforms: ClUint = 0;
    let code = unsafe { (api.get_platform_ids)(0, ptr::null_mut(), &mut n_platforms) };
    // No ICD installed: report an empty system rather than an error.
    if code != CL_SUCCESS || n_platforms == 0 {
        return Ok(Vec::new());
    }
    let mut platforms: Vec<ClPlatformId> = vec![ptr::null_mut(); n_platforms as usize];
    check_cl(
        unsafe { (api.get_platform_ids)(n_platforms, platforms.as_mut_ptr(), ptr::null_mut()) },
        "clGetPlatformIDs",
    )?;

    let mut devices = Vec::new();
    for platform in platforms {
        let mut n_devices: ClUint = 0;
        let code = unsafe {
            (api.get_device_ids)(platform, CL_DEVICE_TYPE_ALL, 0, ptr::null_mut(), &mut n_devices)
        };
        if code == CL_DEVICE_NOT_FOUND || n_devices == 0 {
            continue;
        }
        check_cl(code, "clGetDeviceIDs")?;
        let mut ids: Vec<ClDeviceId> = vec![ptr::null_mut(); n_devices as usize];
        check_cl(
            unsafe {
                (api.get_device_ids)(platform, CL_DEVICE_TYPE_ALL, n_devices, ids.as_mut_ptr(), ptr::null_mut())
            },
            "clGetDeviceIDs",
        )?;
        for id in ids {
            devices.push(ClDevice {
                id,
                name: device_info_string(api, id, CL_DEVICE_NAME)?,
                vendor: device_info_string(api, id, CL_DEVICE_VENDOR)?,
                is_gpu: device_type(api, id)? & CL_DEVICE_TYPE_GPU != 0,
            });
        }
    }
    Ok(devices)
}

/// Index used by default-device lookup: the first GPU, else device 0.
pub fn default_device_index(devices: &[ClDevice]) -> Option<usize> {
    if devices.is_empty() {
        return None;
    }
    Some(devices.iter().position(|d| d.is_gpu).unwrap_or(0))
}

/// Owned OpenCL context bound to a single device.
pub struct ClContext {
    raw: RawContext,
    device: ClDevice,
}

unsafe impl Send for ClContext {}

impl ClContext {
    pub fn new(api: &OpenClApi, device: ClDevice) -> Result<Self> {
        let mut err = CL_SUCCESS;
        let raw = unsafe {
            (api.create_context)(ptr::null(), 1, &device.id, ptr::null(), ptr::null_mut(), &mut err)
        };
        check_cl(err, "clCreateContext")?;
        if raw.is_null() {
            return Err(LumenError::Runtime { call: "clCreateContext", code: err });
        }
        Ok(Self { raw, device })
    }

    pub(crate) fn raw(&self) -> RawContext {
        self.raw
    }

    pub fn device(&self) -> &ClDevice {
        &self.device
    }
}

impl Drop for ClContext {
    fn drop(&mut self) {
        if let Ok(api) = ffi::loaded_opencl() {
            unsafe { (api.release_context)(self.raw) };
        }
    }
}

/// In-order command queue on one context/device pair.
///
/// Also owns the element-wise programs built for this queue, keyed by dtype.
pub struct ClQueue {
    raw: ClCommandQueue,
    context: RawContext,
    device: ClDeviceId,
    programs: RefCell<HashMap<DType, ElementwiseProgram>>,
}

unsafe impl Send for ClQueue {}

impl ClQueue {
    pub fn new(api: &OpenClApi, context: &ClContext) -> Result<Self> {
        let mut err = CL_SUCCESS;
        let raw = unsafe { (api.create_command_queue)(context.raw(), context.device.id, 0, &mut err) };
        check_cl(err, "clCreateCommandQueue")?;
        if raw.is_null() {
            return Err(LumenError::Runtime { call: "clCreateCommandQueue", code: err });
        }
        Ok(Self {
            raw,
            context: context.raw(),
            device: context.device.id,
            programs: RefCell::new(HashMap::new()),
        })
    }

    pub(crate) fn raw(&self) -> ClCommandQueue {
        self.raw
    }

    pub(crate) fn context(&self) -> RawContext {
        self.context
    }

    pub(crate) fn device(&self) -> ClDeviceId {
        self.device
    }

    pub(crate) fn programs(&self) -> &RefCell<HashMap<DType, ElementwiseProgram>> {
        &self.programs
    }

    /// Block until every command submitted to this queue has completed.
    pub fn finish(&self) -> Result<()> {
        let api = ffi::loaded_opencl()?;
        check_cl(unsafe { (api.finish)(self.raw) }, "clFinish")
    }
}

impl Drop for ClQueue {
    fn drop(&mut self) {
        self.programs.get_mut().clear();
        if let Ok(api) = ffi::loaded_opencl() {
            unsafe {
                (api.finish)(self.raw);
                (api.release_command_queue)(self.raw);
            }
        }
    }
}
