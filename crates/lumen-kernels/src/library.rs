//! Process-wide kernel library setup, reference-counted per backend.
//!
//! The first live guard for a backend runs its setup; dropping the last one
//! runs teardown. Setup and teardown can therefore repeat any number of times
//! over the life of the process.

use std::collections::HashMap;
use std::sync::OnceLock;

use parking_lot::Mutex;

use lumen_core::{LumenError, Result};

use crate::device::BackendKind;
use crate::opencl::ffi::{self, CLBLAS_SUCCESS};

static REFCOUNTS: OnceLock<Mutex<HashMap<BackendKind, usize>>> = OnceLock::new();

fn refcounts() -> &'static Mutex<HashMap<BackendKind, usize>> {
    REFCOUNTS.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Guard keeping the kernel library of one backend initialized.
#[derive(Debug)]
pub struct KernelLibrary {
    backend: BackendKind,
}

impl KernelLibrary {
    /// Acquire a guard, running library setup if no other guard is alive.
    ///
    /// For OpenCL, clBLAS must already have been loaded with
    /// [`ffi::clblas_api`].
    pub fn acquire(backend: BackendKind) -> Result<Self> {
        let mut counts = refcounts().lock();
        let count = counts.entry(backend).or_insert(0);
        if *count == 0 {
            setup(backend)?;
            tracing::info!(%backend, "kernel library set up");
        }
        *count += 1;
        Ok(Self { backend })
    }

    /// Number of live guards for `backend`.
    pub fn refcount(backend: BackendKind) -> usize {
        refcounts().lock().get(&backend).copied().unwrap_or(0)
    }

    pub fn backend(&self) -> BackendKind {
        self.backend
    }
}

impl Drop for KernelLibrary {
    fn drop(&mut self) {
        let mut counts = refcounts().lock();
        let Some(count) = counts.get_mut(&self.backend) else {
            return;
        };
        *count = count.saturating_sub(1);
        if *count == 0 {
            teardown(self.backend);
            tracing::info!(backend = %self.backend, "kernel library torn down");
        }
    }
}

fn setup(backend: BackendKind) -> Result<()> {
    match backend {
        BackendKind::Host => Ok(()),
        BackendKind::OpenCl => {
            let blas = ffi::loaded_clblas()?;
            let status = unsafe { (blas.setup)() };
            if status == CLBLAS_SUCCESS {
                Ok(())
            } else {
                Err(LumenError::Runtime { call: "clblasSetup", code: status })
            }
        }
    }
}

fn teardown(backend: BackendKind) {
    if backend == BackendKind::OpenCl {
        if let Ok(blas) = ffi::loaded_clblas() {
            unsafe { (blas.teardown)() };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Exact counts are checked in tests/library.rs, which runs alone.
    #[test]
    fn test_live_guard_is_counted() {
        let guard = KernelLibrary::acquire(BackendKind::Host).unwrap();
        assert!(KernelLibrary::refcount(BackendKind::Host) >= 1);
        assert_eq!(guard.backend(), BackendKind::Host);
    }
}
