//! Vectorized CPU backend backed by `faer` matrix kernels.
//!
//! Serves the [`Compute::CpuAcc`] device. Fully connected layers run through
//! faer's matmul; the cheap elementwise variants are handled inline. Every
//! other variant reports unsupported so the optimizer places it on the
//! fallback device and splices the inter-device copies.

use std::sync::Arc;

use faer::linalg::matmul::matmul;
use faer::mat::{MatMut, MatRef};
use faer::{Accum, Par};

use infergraph::{
    BackendRegistry, Compute, DataType, Graph, GraphResult, Layer, LayerKind, TensorDescriptor,
    TensorHandle, Workload, WorkloadFactory,
};
use infergraph_backend_ref_cpu::{kernels, CpuTensorHandle};

fn faer_parallelism() -> Par {
    let par = faer::get_global_parallelism();
    if par.degree() == 1 {
        Par::Seq
    } else {
        par
    }
}

/// Workload factory for the [`Compute::CpuAcc`] device.
#[derive(Debug, Default, Clone, Copy)]
pub struct AccWorkloadFactory;

impl AccWorkloadFactory {
    pub fn new() -> Self {
        Self
    }
}

impl WorkloadFactory for AccWorkloadFactory {
    fn compute(&self) -> Compute {
        Compute::CpuAcc
    }

    fn supports(&self, layer: &Layer, inputs: &[TensorDescriptor]) -> bool {
        let float_only = inputs
            .iter()
            .all(|descriptor| descriptor.data_type() == DataType::Float32)
            && (0..layer.num_output_slots()).all(|index| {
                layer
                    .output_descriptor(index)
                    .map(|descriptor| descriptor.data_type() == DataType::Float32)
                    .unwrap_or(true)
            });
        if !float_only {
            return false;
        }
        matches!(
            layer.kind(),
            LayerKind::Input { .. }
                | LayerKind::Output { .. }
                | LayerKind::MemCopy
                | LayerKind::Addition
                | LayerKind::Multiplication
                | LayerKind::Activation { .. }
                | LayerKind::FullyConnected { .. }
        )
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
        Ok(Box::new(AccWorkload {
            kind: layer.kind().clone(),
            inputs,
            outputs,
        }))
    }
}

struct AccWorkload {
    kind: LayerKind,
    inputs: Vec<Arc<dyn TensorHandle>>,
    outputs: Vec<Arc<dyn TensorHandle>>,
}

impl Workload for AccWorkload {
    fn execute(&self) -> GraphResult<()> {
        match &self.kind {
            LayerKind::Input { .. } | LayerKind::Output { .. } => Ok(()),
            LayerKind::MemCopy => {
                let data = self.inputs[0].read_f32()?;
                self.outputs[0].write_f32(&data)
            }
            LayerKind::Addition => {
                let lhs = self.inputs[0].read_f32()?;
                let rhs = self.inputs[1].read_f32()?;
                self.outputs[0].write_f32(&kernels::add(&lhs, &rhs))
            }
            LayerKind::Multiplication => {
                let lhs = self.inputs[0].read_f32()?;
                let rhs = self.inputs[1].read_f32()?;
                self.outputs[0].write_f32(&kernels::mul(&lhs, &rhs))
            }
            LayerKind::Activation { desc } => {
                let input = self.inputs[0].read_f32()?;
                self.outputs[0].write_f32(&kernels::activation(&input, desc))
            }
            LayerKind::FullyConnected { weights, bias } => {
                let input = self.inputs[0].read_f32()?;
                let dims = self.inputs[0].descriptor().shape().dims().to_vec();
                let batch = dims[0];
                let input_size: usize = dims[1..].iter().product();
                let output_size = weights.shape().dims()[0];
                let output = fully_connected_faer(
                    &input,
                    batch,
                    input_size,
                    weights.data(),
                    output_size,
                    bias.as_ref().map(|bias| bias.data()),
                );
                self.outputs[0].write_f32(&output)
            }
            // Device assignment never routes other variants here.
            other => Err(infergraph::GraphError::invalid_argument(format!(
                "faer backend cannot execute {}",
                other.variant_name()
            ))),
        }
    }
}

/// `C = A * W^T` via faer, with `A` row-major `[batch, k]` and `W` row-major
/// `[m, k]`. Computes `C^T = W * A^T` into a column-major `(m x batch)`
/// buffer, whose layout matches row-major `[batch, m]` for `C`.
fn fully_connected_faer(
    input: &[f32],
    batch: usize,
    input_size: usize,
    weights: &[f32],
    output_size: usize,
    bias: Option<&[f32]>,
) -> Vec<f32> {
    let lhs = MatRef::from_row_major_slice(input, batch, input_size);
    let weight = MatRef::from_row_major_slice(weights, output_size, input_size);
    let mut output = vec![0.0f32; batch * output_size];
    let mut out_view = MatMut::from_column_major_slice_mut(&mut output, output_size, batch);
    matmul(
        &mut out_view,
        Accum::Replace,
        weight,
        lhs.transpose(),
        1.0f32,
        faer_parallelism(),
    );
    if let Some(bias) = bias {
        for row in output.chunks_mut(output_size) {
            for (value, &b) in row.iter_mut().zip(bias) {
                *value += b;
            }
        }
    }
    output
}

/// Registers the vectorized CPU factory with an explicit registry.
pub fn register_acc_backend(registry: &mut BackendRegistry) {
    registry.register(Arc::new(AccWorkloadFactory::new()));
}
