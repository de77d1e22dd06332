//! Runtime configuration for device selection and library loading.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which backend device handles are created on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendPreference {
    /// OpenCL if a runtime with at least one device and clBLAS loads, else the host device.
    #[default]
    Auto,
    /// Always the in-process host device.
    Host,
    /// Always OpenCL; fails with `RuntimeUnavailable` if it cannot be loaded.
    OpenCl,
}

impl BackendPreference {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Some(Self::Auto),
            "host" | "cpu" => Some(Self::Host),
            "opencl" | "cl" => Some(Self::OpenCl),
            _ => None,
        }
    }
}

/// Configuration consulted when a [`DeviceHandle`](crate::DeviceHandle) is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Backend selection policy.
    pub backend: BackendPreference,

    /// Device index; `None` means default-device lookup.
    pub device_index: Option<usize>,

    /// Number of virtual devices the host backend exposes.
    pub host_devices: usize,

    /// Explicit path to the OpenCL ICD loader.
    pub opencl_library: Option<PathBuf>,

    /// Explicit path to clBLAS.
    pub clblas_library: Option<PathBuf>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            backend: BackendPreference::Auto,
            device_index: None,
            host_devices: 1,
            opencl_library: None,
            clblas_library: None,
        }
    }
}

impl RuntimeConfig {
    /// Host backend with `devices` virtual devices.
    pub fn host(devices: usize) -> Self {
        Self {
            backend: BackendPreference::Host,
            host_devices: devices,
            ..Self::default()
        }
    }

    /// Defaults overridden by `LUMEN_*` environment variables.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = lookup("LUMEN_BACKEND") {
            match BackendPreference::parse(&v) {
                Some(b) => cfg.backend = b,
                None => tracing::warn!(value = %v, "ignoring unknown LUMEN_BACKEND"),
            }
        }
        if let Some(v) = lookup("LUMEN_DEVICE") {
            match v.trim().parse() {
                Ok(i) => cfg.device_index = Some(i),
                Err(_) => tracing::warn!(value = %v, "ignoring invalid LUMEN_DEVICE"),
            }
        }
        if let Some(v) = lookup("LUMEN_HOST_DEVICES") {
            match v.trim().parse() {
                Ok(n) => cfg.host_devices = n,
                Err(_) => tracing::warn!(value = %v, "ignoring invalid LUMEN_HOST_DEVICES"),
            }
        }
        cfg.opencl_library = lookup("LUMEN_OPENCL_LIB").map(PathBuf::from);
        cfg.clblas_library = lookup("LUMEN_CLBLAS_LIB").map(PathBuf::from);
        cfg
    }
}
