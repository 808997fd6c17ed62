//! Backend-facing contract: devices, workload factories, and the registry
//! the optimizer resolves factories from.

mod device;
mod factory;
mod registry;

pub use device::{Compute, DeviceSpec};
pub use factory::{TensorHandle, Workload, WorkloadFactory};
pub use registry::BackendRegistry;
