//! Compute devices and the device specification consumed by the optimizer.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{GraphError, GraphResult};
use crate::layer::Layer;

/// Target compute device a layer can be assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Compute {
    /// Portable reference CPU implementation.
    CpuRef,
    /// Vectorized CPU implementation.
    CpuAcc,
    /// GPU compute backend.
    GpuAcc,
}

impl fmt::Display for Compute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Compute::CpuRef => write!(f, "CpuRef"),
            Compute::CpuAcc => write!(f, "CpuAcc"),
            Compute::GpuAcc => write!(f, "GpuAcc"),
        }
    }
}

/// Target-hardware configuration guiding device assignment: one default
/// device plus optional per-layer overrides keyed by layer name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub default_device: Compute,
    #[serde(default)]
    pub overrides: HashMap<String, Compute>,
}

impl DeviceSpec {
    pub fn new(default_device: Compute) -> Self {
        Self {
            default_device,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, layer_name: impl Into<String>, device: Compute) -> Self {
        self.overrides.insert(layer_name.into(), device);
        self
    }

    /// The device this spec asks for, before support-driven fallback.
    pub fn requested_device(&self, layer: &Layer) -> Compute {
        layer
            .name()
            .and_then(|name| self.overrides.get(name).copied())
            .unwrap_or(self.default_device)
    }

    pub fn from_json_str(src: &str) -> GraphResult<Self> {
        serde_json::from_str(src)
            .map_err(|err| GraphError::invalid_argument(format!("device spec: {err}")))
    }

    pub fn to_json_string(&self) -> GraphResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|err| GraphError::invalid_argument(format!("device spec: {err}")))
    }
}
