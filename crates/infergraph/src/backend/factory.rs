//! Backend collaborator contract: tensor handles, workloads, and the
//! per-device workload factory.
//!
//! The core never computes anything itself; it asks the factory bound to a
//! layer's assigned device for storage and for an executable unit. Backends
//! are free to alias or pool buffers internally as long as every consumed
//! slot has valid storage once allocation returns.

use std::any::Any;
use std::sync::Arc;

use crate::backend::Compute;
use crate::error::GraphResult;
use crate::graph::Graph;
use crate::layer::Layer;
use crate::tensor::TensorDescriptor;

/// Backing storage bound to an output slot, shared by all consumers.
///
/// `read_f32`/`write_f32` give the host a portable window into the buffer;
/// inter-device copies go through them, so handles from different backends
/// never need to know about each other's layout.
pub trait TensorHandle: Send + Sync {
    fn descriptor(&self) -> &TensorDescriptor;

    fn read_f32(&self) -> GraphResult<Vec<f32>>;

    fn write_f32(&self, data: &[f32]) -> GraphResult<()>;

    /// Downcast hook for backends that recognize their own handle type.
    fn as_any(&self) -> &dyn Any;
}

/// Concrete executable unit produced from a layer, bound to its resolved
/// shapes, parameters, and tensor handles.
pub trait Workload: Send {
    fn execute(&self) -> GraphResult<()>;
}

/// Per-device factory that turns layers into workloads and descriptors into
/// storage.
pub trait WorkloadFactory: Send + Sync {
    /// The device this factory produces workloads for.
    fn compute(&self) -> Compute;

    /// Whether this backend can execute the layer with the given resolved
    /// input descriptors. Consulted during device assignment; a `false` here
    /// steers the optimizer toward a fallback device.
    fn supports(&self, layer: &Layer, inputs: &[TensorDescriptor]) -> bool;

    fn create_tensor_handle(
        &self,
        descriptor: &TensorDescriptor,
    ) -> GraphResult<Arc<dyn TensorHandle>>;

    /// Produces the executable unit for a layer whose handles are already
    /// allocated. Reports `Unsupported` rather than silently skipping
    /// variants the backend cannot serve.
    fn create_workload(&self, layer: &Layer, graph: &Graph) -> GraphResult<Box<dyn Workload>>;
}
