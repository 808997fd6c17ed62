//! Public construction API: a thin factory over layer creation and graph
//! insertion.
//!
//! One `add_*` method per variant; each returns a [`LayerHandle`] the caller
//! wires slots through. Weight and bias tensors are validated here, at the
//! construction boundary; shape inference and optimization never run in this
//! module.

use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::layer::{
    ActivationDescriptor, BatchNormalizationDescriptor, Convolution2dDescriptor, InputSlotRef,
    Layer, LayerGuid, LayerKind, NormalizationDescriptor, OriginsDescriptor, OutputSlotRef,
    Pooling2dDescriptor, SoftmaxDescriptor, ViewsDescriptor,
};
use crate::tensor::ConstTensor;
use crate::tensor::TensorDescriptor;

/// Opaque handle to a layer created by the builder.
///
/// The handle stays valid across optimization: rewrite passes preserve guids
/// for layers they keep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayerHandle {
    guid: LayerGuid,
}

impl LayerHandle {
    pub fn guid(&self) -> LayerGuid {
        self.guid
    }

    pub fn input(&self, index: usize) -> InputSlotRef {
        InputSlotRef {
            layer: self.guid,
            index,
        }
    }

    pub fn output(&self, index: usize) -> OutputSlotRef {
        OutputSlotRef {
            layer: self.guid,
            index,
        }
    }
}

/// Builder for inference graphs.
#[derive(Debug, Clone, Default)]
pub struct Network {
    graph: Graph,
}

impl Network {
    pub fn new() -> Self {
        Self {
            graph: Graph::new(),
        }
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn num_layers(&self) -> usize {
        self.graph.num_layers()
    }

    fn insert(&mut self, kind: LayerKind, name: Option<&str>) -> LayerHandle {
        let guid = self.graph.add_layer(Layer::new(kind, name));
        LayerHandle { guid }
    }

    pub fn add_input(&mut self, binding_id: u32, name: Option<&str>) -> LayerHandle {
        self.insert(LayerKind::Input { binding_id }, name)
    }

    pub fn add_output(&mut self, binding_id: u32, name: Option<&str>) -> LayerHandle {
        self.insert(LayerKind::Output { binding_id }, name)
    }

    pub fn add_activation(
        &mut self,
        desc: ActivationDescriptor,
        name: Option<&str>,
    ) -> LayerHandle {
        self.insert(LayerKind::Activation { desc }, name)
    }

    pub fn add_normalization(
        &mut self,
        desc: NormalizationDescriptor,
        name: Option<&str>,
    ) -> LayerHandle {
        self.insert(LayerKind::Normalization { desc }, name)
    }

    pub fn add_softmax(&mut self, desc: SoftmaxDescriptor, name: Option<&str>) -> LayerHandle {
        self.insert(LayerKind::Softmax { desc }, name)
    }

    pub fn add_pooling2d(&mut self, desc: Pooling2dDescriptor, name: Option<&str>) -> LayerHandle {
        self.insert(LayerKind::Pooling2d { desc }, name)
    }

    pub fn add_addition(&mut self, name: Option<&str>) -> LayerHandle {
        self.insert(LayerKind::Addition, name)
    }

    pub fn add_multiplication(&mut self, name: Option<&str>) -> LayerHandle {
        self.insert(LayerKind::Multiplication, name)
    }

    pub fn add_splitter(&mut self, views: ViewsDescriptor, name: Option<&str>) -> LayerHandle {
        self.insert(LayerKind::Splitter { views }, name)
    }

    pub fn add_merger(&mut self, origins: OriginsDescriptor, name: Option<&str>) -> LayerHandle {
        self.insert(LayerKind::Merger { origins }, name)
    }

    pub fn add_convolution2d(
        &mut self,
        desc: Convolution2dDescriptor,
        weights: ConstTensor,
        bias: Option<ConstTensor>,
        name: Option<&str>,
    ) -> GraphResult<LayerHandle> {
        if weights.shape().rank() != 4 {
            return Err(GraphError::invalid_argument(format!(
                "convolution weights must be [M,C,Hk,Wk], got {}",
                weights.shape()
            )));
        }
        validate_bias(bias.as_ref(), weights.shape().dims()[0])?;
        Ok(self.insert(
            LayerKind::Convolution2d {
                desc,
                weights,
                bias,
            },
            name,
        ))
    }

    pub fn add_fully_connected(
        &mut self,
        weights: ConstTensor,
        bias: Option<ConstTensor>,
        name: Option<&str>,
    ) -> GraphResult<LayerHandle> {
        if weights.shape().rank() != 2 {
            return Err(GraphError::invalid_argument(format!(
                "fully connected weights must be [outputs, inputs], got {}",
                weights.shape()
            )));
        }
        validate_bias(bias.as_ref(), weights.shape().dims()[0])?;
        Ok(self.insert(LayerKind::FullyConnected { weights, bias }, name))
    }

    pub fn add_batch_normalization(
        &mut self,
        desc: BatchNormalizationDescriptor,
        mean: ConstTensor,
        variance: ConstTensor,
        beta: ConstTensor,
        gamma: ConstTensor,
        name: Option<&str>,
    ) -> GraphResult<LayerHandle> {
        let channels = mean.shape().dims().to_vec();
        for (stat_name, stat) in [
            ("variance", &variance),
            ("beta", &beta),
            ("gamma", &gamma),
        ] {
            if stat.shape().rank() != 1 || stat.shape().dims() != channels {
                return Err(GraphError::invalid_argument(format!(
                    "batch normalization {stat_name} shape {} does not match mean shape {}",
                    stat.shape(),
                    mean.shape()
                )));
            }
        }
        if mean.shape().rank() != 1 {
            return Err(GraphError::invalid_argument(format!(
                "batch normalization statistics must be 1-D, got {}",
                mean.shape()
            )));
        }
        Ok(self.insert(
            LayerKind::BatchNormalization {
                desc,
                mean,
                variance,
                beta,
                gamma,
            },
            name,
        ))
    }

    /// Wires a producer slot into a consumer slot; see [`Graph::connect`].
    pub fn connect(&mut self, from: OutputSlotRef, to: InputSlotRef) -> GraphResult<()> {
        self.graph.connect(from, to)
    }

    pub fn disconnect(&mut self, from: OutputSlotRef, to: InputSlotRef) -> GraphResult<()> {
        self.graph.disconnect(from, to)
    }

    pub fn set_tensor_descriptor(
        &mut self,
        slot: OutputSlotRef,
        descriptor: TensorDescriptor,
    ) -> GraphResult<()> {
        self.graph.set_tensor_descriptor(slot, descriptor)
    }
}

fn validate_bias(bias: Option<&ConstTensor>, outputs: usize) -> GraphResult<()> {
    if let Some(bias) = bias {
        if bias.shape().dims() != [outputs] {
            return Err(GraphError::invalid_argument(format!(
                "bias shape {} does not match {outputs} outputs",
                bias.shape()
            )));
        }
    }
    Ok(())
}
