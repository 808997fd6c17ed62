//! Workload dispatch: one executable unit per layer, bound to its handles.

use std::sync::Arc;

use infergraph::{GraphResult, LayerKind, TensorHandle, Workload};

use crate::kernels;

/// Reference workload: the layer's variant payload plus the tensor handles it
/// reads and writes. Handles are captured at creation, so execution needs no
/// graph access.
pub struct RefWorkload {
    kind: LayerKind,
    inputs: Vec<Arc<dyn TensorHandle>>,
    outputs: Vec<Arc<dyn TensorHandle>>,
}

impl RefWorkload {
    pub(crate) fn new(
        kind: LayerKind,
        inputs: Vec<Arc<dyn TensorHandle>>,
        outputs: Vec<Arc<dyn TensorHandle>>,
    ) -> Self {
        Self {
            kind,
            inputs,
            outputs,
        }
    }

    fn input_dims(&self, index: usize) -> Vec<usize> {
        self.inputs[index].descriptor().shape().dims().to_vec()
    }

    fn output_dims(&self, index: usize) -> Vec<usize> {
        self.outputs[index].descriptor().shape().dims().to_vec()
    }
}

impl Workload for RefWorkload {
    fn execute(&self) -> GraphResult<()> {
        match &self.kind {
            // I/O binding writes into the input handle and reads from the
            // slot feeding the output layer; nothing to compute here.
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
            LayerKind::Softmax { desc } => {
                let input = self.inputs[0].read_f32()?;
                let dims = self.input_dims(0);
                let inner = dims.last().copied().unwrap_or(1);
                self.outputs[0].write_f32(&kernels::softmax(&input, inner, desc.beta))
            }
            LayerKind::Normalization { desc } => {
                let input = self.inputs[0].read_f32()?;
                let dims = self.input_dims(0);
                self.outputs[0].write_f32(&kernels::local_response_norm(&input, &dims, desc))
            }
            LayerKind::BatchNormalization {
                desc,
                mean,
                variance,
                beta,
                gamma,
            } => {
                let input = self.inputs[0].read_f32()?;
                let dims = self.input_dims(0);
                self.outputs[0].write_f32(&kernels::batch_norm(
                    &input,
                    &dims,
                    mean.data(),
                    variance.data(),
                    beta.data(),
                    gamma.data(),
                    desc.eps,
                ))
            }
            LayerKind::FullyConnected { weights, bias } => {
                let input = self.inputs[0].read_f32()?;
                let dims = self.input_dims(0);
                let batch = dims[0];
                let input_size: usize = dims[1..].iter().product();
                let output_size = weights.shape().dims()[0];
                self.outputs[0].write_f32(&kernels::fully_connected(
                    &input,
                    batch,
                    input_size,
                    weights.data(),
                    output_size,
                    bias.as_ref().map(|bias| bias.data()),
                ))
            }
            LayerKind::Convolution2d {
                desc,
                weights,
                bias,
            } => {
                let input = self.inputs[0].read_f32()?;
                let in_dims = self.input_dims(0);
                let out_dims = self.output_dims(0);
                self.outputs[0].write_f32(&kernels::conv2d(
                    &input,
                    &in_dims,
                    weights.data(),
                    weights.shape().dims(),
                    bias.as_ref().map(|bias| bias.data()),
                    desc,
                    &out_dims,
                ))
            }
            LayerKind::Pooling2d { desc } => {
                let input = self.inputs[0].read_f32()?;
                let in_dims = self.input_dims(0);
                let out_dims = self.output_dims(0);
                self.outputs[0].write_f32(&kernels::pooling2d(&input, &in_dims, desc, &out_dims))
            }
            LayerKind::Splitter { views } => {
                let input = self.inputs[0].read_f32()?;
                let in_dims = self.input_dims(0);
                let zero = vec![0usize; in_dims.len()];
                for view in 0..views.num_views() {
                    let out_dims = self.output_dims(view);
                    let mut output = vec![0.0; out_dims.iter().product()];
                    kernels::copy_region(
                        &input,
                        &in_dims,
                        views.origin(view),
                        &mut output,
                        &out_dims,
                        &zero,
                        &out_dims,
                    );
                    self.outputs[view].write_f32(&output)?;
                }
                Ok(())
            }
            LayerKind::Merger { origins } => {
                let out_dims = self.output_dims(0);
                let zero = vec![0usize; out_dims.len()];
                let mut output = vec![0.0; out_dims.iter().product()];
                for view in 0..origins.num_views() {
                    let input = self.inputs[view].read_f32()?;
                    let in_dims = self.input_dims(view);
                    kernels::copy_region(
                        &input,
                        &in_dims,
                        &zero,
                        &mut output,
                        &out_dims,
                        origins.origin(view),
                        &in_dims,
                    );
                }
                self.outputs[0].write_f32(&output)
            }
        }
    }
}
