//! Element-wise OpenCL C kernels, compiled at runtime.
//!
//! One program per dtype holds the four kernels `lumen_add`, `lumen_sub`,
//! `lumen_mul` and `lumen_div`. Programs are built on first use and cached on
//! the queue that built them.

use std::ffi::{c_char, c_void, CString};
use std::ptr;

use lumen_core::{DType, LumenError, Result};

use super::context::ClQueue;
use super::ffi::{
    self, check_cl, check_kernel, ClEvent, ClKernel, ClProgram, CL_PROGRAM_BUILD_LOG, CL_SUCCESS,
};
use super::memory::{wait_and_release, ClBuffer};
use crate::dispatch::ElementwiseOp;

const FP64_PRAGMA: &str = "#pragma OPENCL EXTENSION cl_khr_fp64 : enable\n";

struct KernelTypes {
    elem: &'static str,
    real: &'static str,
    complex: bool,
}

fn kernel_types(dtype: DType) -> KernelTypes {
    match dtype {
        DType::F32 => KernelTypes { elem: "float", real: "float", complex: false },
        DType::F64 => KernelTypes { elem: "double", real: "double", complex: false },
        DType::C32 => KernelTypes { elem: "float2", real: "float", complex: true },
        DType::C64 => KernelTypes { elem: "double2", real: "double", complex: true },
    }
}

/// OpenCL C source of the element-wise program for `dtype`.
pub fn elementwise_source(dtype: DType) -> String {
    let KernelTypes { elem, real, complex } = kernel_types(dtype);
    let mut src = String::new();
    if dtype.is_double() {
        src.push_str(FP64_PRAGMA);
    }
    src.push_str(&format!("typedef {elem} elem_t;\ntypedef {real} real_t;\n"));

    let (mul, div) = if complex {
        src.push_str(
            r#"
inline elem_t lumen_cmul(elem_t a, elem_t b) {
    return (elem_t)(a.x * b.x - a.y * b.y, a.x * b.y + a.y * b.x);
}

inline elem_t lumen_cdiv(elem_t a, elem_t b) {
    real_t d = b.x * b.x + b.y * b.y;
    return (elem_t)((a.x * b.x + a.y * b.y) / d, (a.y * b.x - a.x * b.y) / d);
}
"#,
        );
        ("lumen_cmul(a[i], b[i])", "lumen_cdiv(a[i], b[i])")
    } else {
        ("a[i] * b[i]", "a[i] / b[i]")
    };

    for (op, expr) in [
        (ElementwiseOp::Add, "a[i] + b[i]"),
        (ElementwiseOp::Sub, "a[i] - b[i]"),
        (ElementwiseOp::Mul, mul),
        (ElementwiseOp::Div, div),
    ] {
        src.push_str(&format!(
            r#"
__kernel void {name}(__global const elem_t* a, __global const elem_t* b, __global elem_t* c, const ulong n) {{
    size_t i = get_global_id(0);
    if (i < n) {{
        c[i] = {expr};
    }}
}}
"#,
            name = op.kernel_name()
        ));
    }
    src
}

/// A built program and its four kernels, in `ElementwiseOp` order.
pub struct ElementwiseProgram {
    program: ClProgram,
    kernels: [ClKernel; 4],
}

unsafe impl Send for ElementwiseProgram {}

impl ElementwiseProgram {
    pub fn build(queue: &ClQueue, dtype: DType) -> Result<Self> {
        let api = ffi::loaded_opencl()?;
        let name = format!("lumen_elementwise_{dtype}");
        let source = CString::new(elementwise_source(dtype)).map_err(|_| LumenError::ProgramBuild {
            program: name.clone(),
            log: "source contains null byte".to_string(),
        })?;

        let mut err = CL_SUCCESS;
        let src_ptr = source.as_ptr();
        let program = unsafe {
            (api.create_program_with_source)(queue.context(), 1, &src_ptr, ptr::null(), &mut err)
        };
        check_cl(err, "clCreateProgramWithSource")?;

        let device = queue.device();
        let code = unsafe {
            (api.build_program)(program, 1, &device, ptr::null(), ptr::null(), ptr::null_mut())
        };
        if code != CL_SUCCESS {
            let log = build_log(program, queue);
            unsafe { (api.release_program)(program) };
            return Err(LumenError::ProgramBuild { program: name, log });
        }

        let mut kernels: [ClKernel; 4] = [ptr::null_mut(); 4];
        for op in ElementwiseOp::ALL {
            let c_name = CString::new(op.kernel_name()).map_err(|_| LumenError::ProgramBuild {
                program: name.clone(),
                log: "kernel name contains null byte".to_string(),
            })?;
            let mut err = CL_SUCCESS;
            let kernel = unsafe { (api.create_kernel)(program, c_name.as_ptr(), &mut err) };
            if err != CL_SUCCESS {
                // Partially built: releases what exists so far.
                drop(Self { program, kernels });
                return Err(LumenError::Runtime { call: "clCreateKernel", code: err });
            }
            kernels[op as usize] = kernel;
        }
        tracing::debug!(program = %name, "built element-wise program");
        Ok(Self { program, kernels })
    }

    /// Compute `c[i] = a[i] op b[i]` for `i < n` and wait for completion.
    pub fn launch(
        &self,
        queue: &ClQueue,
        op: ElementwiseOp,
        a: &ClBuffer,
        b: &ClBuffer,
        c: &ClBuffer,
        n: usize,
    ) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let api = ffi::loaded_opencl()?;
        let kernel = self.kernels[op as usize];
        let name = op.kernel_name();
        let (a_mem, b_mem, c_mem) = (a.raw(), b.raw(), c.raw());
        let n_arg = n as u64;
        unsafe {
            check_kernel((api.set_kernel_arg)(kernel, 0, std::mem::size_of_val(&a_mem), &a_mem as *const _ as *const c_void), name)?;
            check_kernel((api.set_kernel_arg)(kernel, 1, std::mem::size_of_val(&b_mem), &b_mem as *const _ as *const c_void), name)?;
            check_kernel((api.set_kernel_arg)(kernel, 2, std::mem::size_of_val(&c_mem), &c_mem as *const _ as *const c_void), name)?;
            check_kernel((api.set_kernel_arg)(kernel, 3, std::mem::size_of::<u64>(), &n_arg as *const u64 as *const c_void), name)?;
        }
        let global = n;
        let mut event: ClEvent = ptr::null_mut();
        check_kernel(
            unsafe {
                (api.enqueue_nd_range_kernel)(
                    queue.raw(),
                    kernel,
                    1,
                    ptr::null(),
                    &global,
                    ptr::null(),
                    0,
                    ptr::null(),
                    &mut event,
                )
            },
            name,
        )?;
        wait_and_release(event, name)
    }
}

fn build_log(program: ClProgram, queue: &ClQueue) -> String {
    let Ok(api) = ffi::loaded_opencl() else {
        return String::new();
    };
    let mut size = 0usize;
    let code = unsafe {
        (api.get_program_build_info)(program, queue.device(), CL_PROGRAM_BUILD_LOG, 0, ptr::null_mut(), &mut size)
    };
    if code != CL_SUCCESS || size == 0 {
        return String::new();
    }
    let mut buf = vec![0u8; size];
    unsafe {
        (api.get_program_build_info)(
            program,
            queue.device(),
            CL_PROGRAM_BUILD_LOG,
            size,
            buf.as_mut_ptr() as *mut c_char as *mut c_void,
            ptr::null_mut(),
        )
    };
    String::from_utf8_lossy(&buf).trim_end_matches('\0').to_string()
}

impl Drop for ElementwiseProgram {
    fn drop(&mut self) {
        let Ok(api) = ffi::loaded_opencl() else {
            return;
        };
        for &kernel in &self.kernels {
            if !kernel.is_null() {
                unsafe { (api.release_kernel)(kernel) };
            }
        }
        unsafe { (api.release_program)(self.program) };
    }
}

/// Run `op` with the queue's cached program for `dtype`, building it first if needed.
pub fn run_elementwise(
    queue: &ClQueue,
    dtype: DType,
    op: ElementwiseOp,
    a: &ClBuffer,
    b: &ClBuffer,
    c: &ClBuffer,
    n: usize,
) -> Result<()> {
    let mut programs = queue.programs().borrow_mut();
    if !programs.contains_key(&dtype) {
        let program = ElementwiseProgram::build(queue, dtype)?;
        programs.insert(dtype, program);
    }
    match programs.get(&dtype) {
        Some(program) => program.launch(queue, op, a, b, c, n),
        None => Err(LumenError::RuntimeUnavailable(format!("element-wise program for {dtype}"))),
    }
}
