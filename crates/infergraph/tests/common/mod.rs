//! Shared test backend: plain host buffers, no-op workloads, and a
//! configurable support table.

use std::any::Any;
use std::sync::{Arc, RwLock};

use infergraph::{
    Compute, Graph, GraphResult, Layer, TensorDescriptor, TensorHandle, Workload, WorkloadFactory,
};

pub struct TestHandle {
    descriptor: TensorDescriptor,
    data: RwLock<Vec<f32>>,
}

impl TensorHandle for TestHandle {
    fn descriptor(&self) -> &TensorDescriptor {
        &self.descriptor
    }

    fn read_f32(&self) -> GraphResult<Vec<f32>> {
        Ok(self.data.read().expect("test tensor poisoned").clone())
    }

    fn write_f32(&self, data: &[f32]) -> GraphResult<()> {
        let mut guard = self.data.write().expect("test tensor poisoned");
        guard.clear();
        guard.extend_from_slice(data);
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

pub struct NoopWorkload;

impl Workload for NoopWorkload {
    fn execute(&self) -> GraphResult<()> {
        Ok(())
    }
}

/// Factory that allocates for any descriptor and claims support for every
/// variant except the listed rejections.
pub struct TestFactory {
    device: Compute,
    rejects: Vec<&'static str>,
}

impl TestFactory {
    pub fn new(device: Compute) -> Self {
        Self {
            device,
            rejects: Vec::new(),
        }
    }

    #[allow(dead_code)]
    pub fn rejecting(device: Compute, rejects: &[&'static str]) -> Self {
        Self {
            device,
            rejects: rejects.to_vec(),
        }
    }
}

impl WorkloadFactory for TestFactory {
    fn compute(&self) -> Compute {
        self.device
    }

    fn supports(&self, layer: &Layer, _inputs: &[TensorDescriptor]) -> bool {
        !self.rejects.contains(&layer.kind().variant_name())
    }

    fn create_tensor_handle(
        &self,
        descriptor: &TensorDescriptor,
    ) -> GraphResult<Arc<dyn TensorHandle>> {
        Ok(Arc::new(TestHandle {
            descriptor: descriptor.clone(),
            data: RwLock::new(vec![0.0; descriptor.num_elements()]),
        }))
    }

    fn create_workload(&self, layer: &Layer, graph: &Graph) -> GraphResult<Box<dyn Workload>> {
        // Real factories read the bound handles at creation; keep that
        // contract visible in tests.
        let _ = graph.input_handles(layer)?;
        let _ = graph.output_handles(layer)?;
        Ok(Box::new(NoopWorkload))
    }
}
