//! Reference CPU backend: portable, naive kernels for every layer variant.
//!
//! This backend is the correctness baseline and the universal fallback
//! device. It supports the full variant set at `Float32` and trades speed for
//! obviousness; accelerated backends override the hot paths and lean on this
//! one for everything else.

pub mod kernels;
mod workloads;

use std::any::Any;
use std::sync::{Arc, RwLock};

use infergraph::{
    BackendRegistry, Compute, DataType, GraphError, GraphResult, Graph, Layer, TensorDescriptor,
    TensorHandle, Workload, WorkloadFactory,
};

use workloads::RefWorkload;

/// Host-memory tensor storage: a descriptor plus a lock-guarded `f32` buffer.
///
/// Shared by the producing slot and every consumer; execution contexts that
/// need isolation allocate their own handle set.
pub struct CpuTensorHandle {
    descriptor: TensorDescriptor,
    data: RwLock<Vec<f32>>,
}

impl CpuTensorHandle {
    pub fn new(descriptor: &TensorDescriptor) -> GraphResult<Self> {
        if descriptor.data_type() != DataType::Float32 {
            return Err(GraphError::allocation(format!(
                "cpu tensor handles store Float32, got {}",
                descriptor.data_type()
            )));
        }
        Ok(Self {
            data: RwLock::new(vec![0.0; descriptor.num_elements()]),
            descriptor: descriptor.clone(),
        })
    }
}

impl TensorHandle for CpuTensorHandle {
    fn descriptor(&self) -> &TensorDescriptor {
        &self.descriptor
    }

    fn read_f32(&self) -> GraphResult<Vec<f32>> {
        Ok(self.data.read().expect("cpu tensor poisoned").clone())
    }

    fn write_f32(&self, data: &[f32]) -> GraphResult<()> {
        let mut guard = self.data.write().expect("cpu tensor poisoned");
        if data.len() != guard.len() {
            return Err(GraphError::invalid_argument(format!(
                "write of {} elements into a buffer of {}",
                data.len(),
                guard.len()
            )));
        }
        guard.copy_from_slice(data);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Workload factory for the [`Compute::CpuRef`] device.
#[derive(Debug, Default, Clone, Copy)]
pub struct RefWorkloadFactory;

impl RefWorkloadFactory {
    pub fn new() -> Self {
        Self
    }
}

impl WorkloadFactory for RefWorkloadFactory {
    fn compute(&self) -> Compute {
        Compute::CpuRef
    }

    fn supports(&self, layer: &Layer, inputs: &[TensorDescriptor]) -> bool {
        let inputs_ok = inputs
            .iter()
            .all(|descriptor| descriptor.data_type() == DataType::Float32);
        let outputs_ok = (0..layer.num_output_slots()).all(|index| {
            layer
                .output_descriptor(index)
                .map(|descriptor| descriptor.data_type() == DataType::Float32)
                .unwrap_or(true)
        });
        inputs_ok && outputs_ok
    }

    fn create_tensor_handle(
        &self,
        descriptor: &TensorDescriptor,
    ) -> GraphResult<Arc<dyn TensorHandle>> {
        Ok(Arc::new(CpuTensorHandle::new(descriptor)?))
    }

    fn create_workload(&self, layer: &Layer, graph: &Graph) -> GraphResult<Box<dyn Workload>> {
        let inputs = graph.input_handles(layer)?;
        let outputs = graph.output_handles(layer)?;
        Ok(Box::new(RefWorkload::new(
            layer.kind().clone(),
            inputs,
            outputs,
        )))
    }
}

/// Registers the reference CPU factory with an explicit registry.
pub fn register_ref_backend(registry: &mut BackendRegistry) {
    registry.register(Arc::new(RefWorkloadFactory::new()));
}
