//! Runtime-loaded OpenCL and clBLAS function pointers via dlopen.
//!
//! No build-time SDK dependency: any ICD loader that provides `libOpenCL`
//! and any clBLAS build that provides `libclBLAS` will do.

use std::ffi::{c_char, c_void, OsString};
use std::path::Path;
use std::sync::OnceLock;

use libloading::Library;
use lumen_core::{LumenError, Result};

// ---------------------------------------------------------------------------
// OpenCL scalar and handle types
// ---------------------------------------------------------------------------

pub type ClInt = i32;
pub type ClUint = u32;
pub type ClBool = u32;
pub type ClBitfield = u64;

pub type ClPlatformId = *mut c_void;
pub type ClDeviceId = *mut c_void;
pub type ClContext = *mut c_void;
pub type ClCommandQueue = *mut c_void;
pub type ClMem = *mut c_void;
pub type ClProgram = *mut c_void;
pub type ClKernel = *mut c_void;
pub type ClEvent = *mut c_void;

pub const CL_SUCCESS: ClInt = 0;
pub const CL_DEVICE_NOT_FOUND: ClInt = -1;
pub const CL_BUILD_PROGRAM_FAILURE: ClInt = -11;
pub const CL_TRUE: ClBool = 1;

pub const CL_DEVICE_TYPE_GPU: ClBitfield = 1 << 2;
pub const CL_DEVICE_TYPE_ALL: ClBitfield = 0xFFFF_FFFF;

pub const CL_DEVICE_TYPE: ClUint = 0x1000;
pub const CL_DEVICE_NAME: ClUint = 0x102B;
pub const CL_DEVICE_VENDOR: ClUint = 0x102C;
pub const CL_PROGRAM_BUILD_LOG: ClUint = 0x1183;

pub const CL_MEM_READ_WRITE: ClBitfield = 1 << 0;

/// `cl_float2` / clBLAS `FloatComplex`.
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClFloat2 {
    pub s: [f32; 2],
}

/// `cl_double2` / clBLAS `DoubleComplex`.
#[repr(C, align(16))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClDouble2 {
    pub s: [f64; 2],
}

// ---------------------------------------------------------------------------
// clBLAS enums
// ---------------------------------------------------------------------------

pub type ClblasStatus = i32;
pub const CLBLAS_SUCCESS: ClblasStatus = 0;

pub type ClblasOrder = u32;
pub const CLBLAS_ROW_MAJOR: ClblasOrder = 0;
pub const CLBLAS_COLUMN_MAJOR: ClblasOrder = 1;

pub type ClblasTranspose = u32;
pub const CLBLAS_NO_TRANS: ClblasTranspose = 0;

// ---------------------------------------------------------------------------
// OpenCL runtime function signatures
// ---------------------------------------------------------------------------

pub type FnGetPlatformIds = unsafe extern "C" fn(ClUint, *mut ClPlatformId, *mut ClUint) -> ClInt;
pub type FnGetDeviceIds =
    unsafe extern "C" fn(ClPlatformId, ClBitfield, ClUint, *mut ClDeviceId, *mut ClUint) -> ClInt;
pub type FnGetDeviceInfo =
    unsafe extern "C" fn(ClDeviceId, ClUint, usize, *mut c_void, *mut usize) -> ClInt;
pub type FnCreateContext = unsafe extern "C" fn(
    *const isize,
    ClUint,
    *const ClDeviceId,
    *const c_void, // notify callback (unused)
    *mut c_void,
    *mut ClInt,
) -> ClContext;
pub type FnReleaseContext = unsafe extern "C" fn(ClContext) -> ClInt;
pub type FnCreateCommandQueue =
    unsafe extern "C" fn(ClContext, ClDeviceId, ClBitfield, *mut ClInt) -> ClCommandQueue;
pub type FnReleaseCommandQueue = unsafe extern "C" fn(ClCommandQueue) -> ClInt;
pub type FnCreateBuffer =
    unsafe extern "C" fn(ClContext, ClBitfield, usize, *mut c_void, *mut ClInt) -> ClMem;
pub type FnReleaseMemObject = unsafe extern "C" fn(ClMem) -> ClInt;
pub type FnEnqueueWriteBuffer = unsafe extern "C" fn(
    ClCommandQueue,
    ClMem,
    ClBool,
    usize, // offset
    usize, // size
    *const c_void,
    ClUint,
    *const ClEvent,
    *mut ClEvent,
) -> ClInt;
pub type FnEnqueueReadBuffer = unsafe extern "C" fn(
    ClCommandQueue,
    ClMem,
    ClBool,
    usize,
    usize,
    *mut c_void,
    ClUint,
    *const ClEvent,
    *mut ClEvent,
) -> ClInt;
pub type FnEnqueueFillBuffer = unsafe extern "C" fn(
    ClCommandQueue,
    ClMem,
    *const c_void, // pattern
    usize,         // pattern size
    usize,         // offset
    usize,         // size
    ClUint,
    *const ClEvent,
    *mut ClEvent,
) -> ClInt;
pub type FnFinish = unsafe extern "C" fn(ClCommandQueue) -> ClInt;
pub type FnWaitForEvents = unsafe extern "C" fn(ClUint, *const ClEvent) -> ClInt;
pub type FnReleaseEvent = unsafe extern "C" fn(ClEvent) -> ClInt;
pub type FnCreateProgramWithSource = unsafe extern "C" fn(
    ClContext,
    ClUint,
    *const *const c_char,
    *const usize,
    *mut ClInt,
) -> ClProgram;
pub type FnBuildProgram = unsafe extern "C" fn(
    ClProgram,
    ClUint,
    *const ClDeviceId,
    *const c_char,
    *const c_void,
    *mut c_void,
) -> ClInt;
pub type FnGetProgramBuildInfo =
    unsafe extern "C" fn(ClProgram, ClDeviceId, ClUint, usize, *mut c_void, *mut usize) -> ClInt;
pub type FnReleaseProgram = unsafe extern "C" fn(ClProgram) -> ClInt;
pub type FnCreateKernel = unsafe extern "C" fn(ClProgram, *const c_char, *mut ClInt) -> ClKernel;
pub type FnSetKernelArg = unsafe extern "C" fn(ClKernel, ClUint, usize, *const c_void) -> ClInt;
pub type FnEnqueueNdRangeKernel = unsafe extern "C" fn(
    ClCommandQueue,
    ClKernel,
    ClUint,        // work dim
    *const usize,  // global offset
    *const usize,  // global size
    *const usize,  // local size
    ClUint,
    *const ClEvent,
    *mut ClEvent,
) -> ClInt;
pub type FnReleaseKernel = unsafe extern "C" fn(ClKernel) -> ClInt;

// ---------------------------------------------------------------------------
// clBLAS function signatures
// ---------------------------------------------------------------------------

pub type FnClblasSetup = unsafe extern "C" fn() -> ClblasStatus;
pub type FnClblasTeardown = unsafe extern "C" fn();

/// Signature shared by the four `clblas?gemm` entry points, generic over the
/// scalar type passed by value for alpha and beta.
pub type FnClblasGemm<S> = unsafe extern "C" fn(
    ClblasOrder,
    ClblasTranspose,
    ClblasTranspose,
    usize, // M
    usize, // N
    usize, // K
    S,     // alpha
    ClMem,
    usize, // offA
    usize, // lda
    ClMem,
    usize, // offB
    usize, // ldb
    S,     // beta
    ClMem,
    usize, // offC
    usize, // ldc
    ClUint,
    *mut ClCommandQueue,
    ClUint,
    *const ClEvent,
    *mut ClEvent,
) -> ClblasStatus;

/// Signature shared by `clblasSdot`, `clblasDdot`, `clblasCdotu`, `clblasZdotu`.
pub type FnClblasDot = unsafe extern "C" fn(
    usize, // N
    ClMem, // dot product result
    usize, // offDP
    ClMem, // X
    usize, // offx
    i32,   // incx
    ClMem, // Y
    usize, // offy
    i32,   // incy
    ClMem, // scratch
    ClUint,
    *mut ClCommandQueue,
    ClUint,
    *const ClEvent,
    *mut ClEvent,
) -> ClblasStatus;

// ---------------------------------------------------------------------------
// Loaded API structs
// ---------------------------------------------------------------------------

pub struct OpenClApi {
    _lib: Library,
    pub get_platform_ids: FnGetPlatformIds,
    pub get_device_ids: FnGetDeviceIds,
    pub get_device_info: FnGetDeviceInfo,
    pub create_context: FnCreateContext,
    pub release_context: FnReleaseContext,
    pub create_command_queue: FnCreateCommandQueue,
    pub release_command_queue: FnReleaseCommandQueue,
    pub create_buffer: FnCreateBuffer,
    pub release_mem_object: FnReleaseMemObject,
    pub enqueue_write_buffer: FnEnqueueWriteBuffer,
    pub enqueue_read_buffer: FnEnqueueReadBuffer,
    pub enqueue_fill_buffer: FnEnqueueFillBuffer,
    pub finish: FnFinish,
    pub wait_for_events: FnWaitForEvents,
    pub release_event: FnReleaseEvent,
    pub create_program_with_source: FnCreateProgramWithSource,
    pub build_program: FnBuildProgram,
    pub get_program_build_info: FnGetProgramBuildInfo,
    pub release_program: FnReleaseProgram,
    pub create_kernel: FnCreateKernel,
    pub set_kernel_arg: FnSetKernelArg,
    pub enqueue_nd_range_kernel: FnEnqueueNdRangeKernel,
    pub release_kernel: FnReleaseKernel,
}

pub struct ClblasApi {
    _lib: Library,
    pub setup: FnClblasSetup,
    pub teardown: FnClblasTeardown,
    pub sgemm: FnClblasGemm<f32>,
    pub dgemm: FnClblasGemm<f64>,
    pub cgemm: FnClblasGemm<ClFloat2>,
    pub zgemm: FnClblasGemm<ClDouble2>,
    pub sdot: FnClblasDot,
    pub ddot: FnClblasDot,
    pub cdotu: FnClblasDot,
    pub zdotu: FnClblasDot,
}

// Safety: the loaded function pointers are process-global; the OpenCL runtime
// and clBLAS are internally synchronized.
unsafe impl Send for OpenClApi {}
unsafe impl Sync for OpenClApi {}
unsafe impl Send for ClblasApi {}
unsafe impl Sync for ClblasApi {}

// ---------------------------------------------------------------------------
// Library loading
// ---------------------------------------------------------------------------

#[cfg(target_os = "windows")]
const OPENCL_CANDIDATES: &[&str] = &["OpenCL.dll"];
#[cfg(target_os = "macos")]
const OPENCL_CANDIDATES: &[&str] = &["/System/Library/Frameworks/OpenCL.framework/OpenCL"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const OPENCL_CANDIDATES: &[&str] = &["libOpenCL.so.1", "libOpenCL.so"];

#[cfg(target_os = "windows")]
const CLBLAS_CANDIDATES: &[&str] = &["clBLAS.dll"];
#[cfg(target_os = "macos")]
const CLBLAS_CANDIDATES: &[&str] = &["libclBLAS.dylib"];
#[cfg(not(any(target_os = "windows", target_os = "macos")))]
const CLBLAS_CANDIDATES: &[&str] = &["libclBLAS.so.2", "libclBLAS.so"];

static OPENCL_API: OnceLock<std::result::Result<OpenClApi, String>> = OnceLock::new();
static CLBLAS_API: OnceLock<std::result::Result<ClblasApi, String>> = OnceLock::new();

fn open_library(explicit: Option<&Path>, candidates: &[&str]) -> std::result::Result<Library, String> {
    let names: Vec<OsString> = match explicit {
        Some(path) => vec![path.as_os_str().to_owned()],
        None => candidates.iter().map(OsString::from).collect(),
    };
    let mut last_err = String::from("no candidates");
    for name in &names {
        match unsafe { Library::new(name) } {
            Ok(lib) => return Ok(lib),
            Err(e) => last_err = format!("{}: {}", name.to_string_lossy(), e),
        }
    }
    Err(last_err)
}

macro_rules! sym {
    ($lib:expr, $name:literal, $ty:ty) => {{
        let symbol: libloading::Symbol<$ty> = $lib
            .get(concat!($name, "\0").as_bytes())
            .map_err(|e| format!("{}: {}", $name, e))?;
        *symbol
    }};
}

impl OpenClApi {
    fn try_load(path: Option<&Path>) -> std::result::Result<Self, String> {
        let lib = open_library(path, OPENCL_CANDIDATES)?;
        unsafe {
            Ok(OpenClApi {
                get_platform_ids: sym!(lib, "clGetPlatformIDs", FnGetPlatformIds),
                get_device_ids: sym!(lib, "clGetDeviceIDs", FnGetDeviceIds),
                get_device_info: sym!(lib, "clGetDeviceInfo", FnGetDeviceInfo),
                create_context: sym!(lib, "clCreateContext", FnCreateContext),
                release_context: sym!(lib, "clReleaseContext", FnReleaseContext),
                create_command_queue: sym!(lib, "clCreateCommandQueue", FnCreateCommandQueue),
                release_command_queue: sym!(lib, "clReleaseCommandQueue", FnReleaseCommandQueue),
                create_buffer: sym!(lib, "clCreateBuffer", FnCreateBuffer),
                release_mem_object: sym!(lib, "clReleaseMemObject", FnReleaseMemObject),
                enqueue_write_buffer: sym!(lib, "clEnqueueWriteBuffer", FnEnqueueWriteBuffer),
                enqueue_read_buffer: sym!(lib, "clEnqueueReadBuffer", FnEnqueueReadBuffer),
                enqueue_fill_buffer: sym!(lib, "clEnqueueFillBuffer", FnEnqueueFillBuffer),
                finish: sym!(lib, "clFinish", FnFinish),
                wait_for_events: sym!(lib, "clWaitForEvents", FnWaitForEvents),
                release_event: sym!(lib, "clReleaseEvent", FnReleaseEvent),
                create_program_with_source: sym!(lib, "clCreateProgramWithSource", FnCreateProgramWithSource),
                build_program: sym!(lib, "clBuildProgram", FnBuildProgram),
                get_program_build_info: sym!(lib, "clGetProgramBuildInfo", FnGetProgramBuildInfo),
                release_program: sym!(lib, "clReleaseProgram", FnReleaseProgram),
                create_kernel: sym!(lib, "clCreateKernel", FnCreateKernel),
                set_kernel_arg: sym!(lib, "clSetKernelArg", FnSetKernelArg),
                enqueue_nd_range_kernel: sym!(lib, "clEnqueueNDRangeKernel", FnEnqueueNdRangeKernel),
                release_kernel: sym!(lib, "clReleaseKernel", FnReleaseKernel),
                _lib: lib,
            })
        }
    }
}

impl ClblasApi {
    fn try_load(path: Option<&Path>) -> std::result::Result<Self, String> {
        let lib = open_library(path, CLBLAS_CANDIDATES)?;
        unsafe {
            Ok(ClblasApi {
                setup: sym!(lib, "clblasSetup", FnClblasSetup),
                teardown: sym!(lib, "clblasTeardown", FnClblasTeardown),
                sgemm: sym!(lib, "clblasSgemm", FnClblasGemm<f32>),
                dgemm: sym!(lib, "clblasDgemm", FnClblasGemm<f64>),
                cgemm: sym!(lib, "clblasCgemm", FnClblasGemm<ClFloat2>),
                zgemm: sym!(lib, "clblasZgemm", FnClblasGemm<ClDouble2>),
                sdot: sym!(lib, "clblasSdot", FnClblasDot),
                ddot: sym!(lib, "clblasDdot", FnClblasDot),
                cdotu: sym!(lib, "clblasCdotu", FnClblasDot),
                zdotu: sym!(lib, "clblasZdotu", FnClblasDot),
                _lib: lib,
            })
        }
    }
}

/// Get the runtime-loaded OpenCL API.
///
/// The first call decides which library is used for the whole process;
/// `path` is only consulted then.
pub fn opencl_api(path: Option<&Path>) -> Result<&'static OpenClApi> {
    OPENCL_API
        .get_or_init(|| OpenClApi::try_load(path))
        .as_ref()
        .map_err(|e| LumenError::RuntimeUnavailable(format!("OpenCL: {e}")))
}

/// Get the runtime-loaded clBLAS API. Same first-call rule as [`opencl_api`].
pub fn clblas_api(path: Option<&Path>) -> Result<&'static ClblasApi> {
    CLBLAS_API
        .get_or_init(|| ClblasApi::try_load(path))
        .as_ref()
        .map_err(|e| LumenError::RuntimeUnavailable(format!("clBLAS: {e}")))
}

/// The already-loaded OpenCL API, for code that runs after a handle exists.
pub(crate) fn loaded_opencl() -> Result<&'static OpenClApi> {
    opencl_api(None)
}

/// The already-loaded clBLAS API.
pub(crate) fn loaded_clblas() -> Result<&'static ClblasApi> {
    clblas_api(None)
}

// ---------------------------------------------------------------------------
// Error checking helpers
// ---------------------------------------------------------------------------

/// Check an OpenCL runtime return code.
pub fn check_cl(code: ClInt, call: &'static str) -> Result<()> {
    if code == CL_SUCCESS {
        Ok(())
    } else {
        Err(LumenError::Runtime { call, code })
    }
}

/// Check a status returned by a kernel enqueue (OpenCL or clBLAS).
pub fn check_kernel(code: i32, kernel: &'static str) -> Result<()> {
    if code == CL_SUCCESS {
        Ok(())
    } else {
        Err(LumenError::KernelLaunchFailed { kernel, code })
    }
}
