//! Closed set of layer variants and their shape-inference rules.
//!
//! Each variant carries its parameter descriptor (and constant tensors where
//! the operation needs them). Shape inference is the single source of truth
//! for connection legality: there is no separate type-checking pass.

use crate::layer::descriptors::{
    ActivationDescriptor, BatchNormalizationDescriptor, Convolution2dDescriptor,
    NormalizationDescriptor, OriginsDescriptor, Pooling2dDescriptor, SoftmaxDescriptor,
    ViewsDescriptor,
};
use crate::tensor::{ConstTensor, Shape, TensorDescriptor};

/// One operation variant plus its immutable parameters.
#[derive(Debug, Clone)]
pub enum LayerKind {
    Input {
        binding_id: u32,
    },
    Output {
        binding_id: u32,
    },
    Convolution2d {
        desc: Convolution2dDescriptor,
        weights: ConstTensor,
        bias: Option<ConstTensor>,
    },
    FullyConnected {
        weights: ConstTensor,
        bias: Option<ConstTensor>,
    },
    Pooling2d {
        desc: Pooling2dDescriptor,
    },
    Activation {
        desc: ActivationDescriptor,
    },
    Normalization {
        desc: NormalizationDescriptor,
    },
    Softmax {
        desc: SoftmaxDescriptor,
    },
    BatchNormalization {
        desc: BatchNormalizationDescriptor,
        mean: ConstTensor,
        variance: ConstTensor,
        beta: ConstTensor,
        gamma: ConstTensor,
    },
    Addition,
    Multiplication,
    Splitter {
        views: ViewsDescriptor,
    },
    Merger {
        origins: OriginsDescriptor,
    },
    /// Inter-device transition inserted by the optimizer; never built by callers.
    MemCopy,
}

impl LayerKind {
    pub fn variant_name(&self) -> &'static str {
        match self {
            LayerKind::Input { .. } => "Input",
            LayerKind::Output { .. } => "Output",
            LayerKind::Convolution2d { .. } => "Convolution2d",
            LayerKind::FullyConnected { .. } => "FullyConnected",
            LayerKind::Pooling2d { .. } => "Pooling2d",
            LayerKind::Activation { .. } => "Activation",
            LayerKind::Normalization { .. } => "Normalization",
            LayerKind::Softmax { .. } => "Softmax",
            LayerKind::BatchNormalization { .. } => "BatchNormalization",
            LayerKind::Addition => "Addition",
            LayerKind::Multiplication => "Multiplication",
            LayerKind::Splitter { .. } => "Splitter",
            LayerKind::Merger { .. } => "Merger",
            LayerKind::MemCopy => "MemCopy",
        }
    }

    pub fn num_input_slots(&self) -> usize {
        match self {
            LayerKind::Input { .. } => 0,
            LayerKind::Addition | LayerKind::Multiplication => 2,
            LayerKind::Merger { origins } => origins.num_views(),
            _ => 1,
        }
    }

    pub fn num_output_slots(&self) -> usize {
        match self {
            LayerKind::Output { .. } => 0,
            LayerKind::Splitter { views } => views.num_views(),
            _ => 1,
        }
    }

    /// Computes the output descriptors from the connected input descriptors.
    ///
    /// `Input` never reaches this path: its descriptor is supplied by the
    /// caller, not derived (see [`crate::layer::Layer::infer_output_shapes`]).
    pub(crate) fn infer(&self, inputs: &[TensorDescriptor]) -> Result<Vec<TensorDescriptor>, String> {
        expect_inputs(inputs, self.num_input_slots())?;
        match self {
            LayerKind::Input { .. } => {
                Err("input layers take their descriptor from the caller".to_string())
            }
            LayerKind::Output { .. } => Ok(Vec::new()),
            LayerKind::Activation { .. }
            | LayerKind::Normalization { .. }
            | LayerKind::Softmax { .. }
            | LayerKind::MemCopy => Ok(vec![inputs[0].clone()]),
            LayerKind::BatchNormalization {
                mean,
                variance,
                beta,
                gamma,
                ..
            } => infer_batch_normalization(&inputs[0], mean, variance, beta, gamma),
            LayerKind::Addition | LayerKind::Multiplication => infer_elementwise(inputs),
            LayerKind::FullyConnected { weights, bias } => {
                infer_fully_connected(&inputs[0], weights, bias.as_ref())
            }
            LayerKind::Convolution2d {
                desc,
                weights,
                bias,
            } => infer_convolution2d(&inputs[0], desc, weights, bias.as_ref()),
            LayerKind::Pooling2d { desc } => infer_pooling2d(&inputs[0], desc),
            LayerKind::Splitter { views } => infer_splitter(&inputs[0], views),
            LayerKind::Merger { origins } => infer_merger(inputs, origins),
        }
    }
}

fn expect_inputs(inputs: &[TensorDescriptor], expected: usize) -> Result<(), String> {
    if inputs.len() != expected {
        return Err(format!(
            "expected {expected} input descriptors, got {}",
            inputs.len()
        ));
    }
    Ok(())
}

fn infer_elementwise(inputs: &[TensorDescriptor]) -> Result<Vec<TensorDescriptor>, String> {
    let (lhs, rhs) = (&inputs[0], &inputs[1]);
    if lhs.data_type() != rhs.data_type() {
        return Err(format!(
            "elementwise inputs disagree on data type ({} vs {})",
            lhs.data_type(),
            rhs.data_type()
        ));
    }
    if lhs.shape() != rhs.shape() {
        return Err(format!(
            "elementwise inputs disagree on shape ({} vs {})",
            lhs.shape(),
            rhs.shape()
        ));
    }
    Ok(vec![lhs.clone()])
}

fn infer_batch_normalization(
    input: &TensorDescriptor,
    mean: &ConstTensor,
    variance: &ConstTensor,
    beta: &ConstTensor,
    gamma: &ConstTensor,
) -> Result<Vec<TensorDescriptor>, String> {
    let channels = input
        .shape()
        .dim(1)
        .ok_or_else(|| format!("batch normalization needs NC.. input, got {}", input.shape()))?;
    for (name, stat) in [
        ("mean", mean),
        ("variance", variance),
        ("beta", beta),
        ("gamma", gamma),
    ] {
        if stat.shape().dims() != [channels] {
            return Err(format!(
                "{name} has shape {} but the input carries {channels} channels",
                stat.shape()
            ));
        }
    }
    Ok(vec![input.clone()])
}

fn infer_fully_connected(
    input: &TensorDescriptor,
    weights: &ConstTensor,
    bias: Option<&ConstTensor>,
) -> Result<Vec<TensorDescriptor>, String> {
    if input.shape().rank() < 2 {
        return Err(format!(
            "fully connected needs a batched input, got {}",
            input.shape()
        ));
    }
    let batch = input.shape().dims()[0];
    let input_size: usize = input.shape().dims()[1..].iter().product();
    let weight_dims = weights.shape().dims();
    let [output_size, weight_input_size] = weight_dims else {
        return Err(format!(
            "fully connected weights must be [outputs, inputs], got {}",
            weights.shape()
        ));
    };
    if *weight_input_size != input_size {
        return Err(format!(
            "input provides {input_size} features but weights expect {weight_input_size}"
        ));
    }
    if let Some(bias) = bias {
        if bias.shape().dims() != [*output_size] {
            return Err(format!(
                "bias shape {} does not match {output_size} outputs",
                bias.shape()
            ));
        }
    }
    Ok(vec![TensorDescriptor::new(
        vec![batch, *output_size],
        input.data_type(),
    )])
}

fn windowed_extent(
    input: usize,
    window: usize,
    pad_front: usize,
    pad_back: usize,
    stride: usize,
) -> Result<usize, String> {
    if stride == 0 {
        return Err("stride must be positive".to_string());
    }
    let padded = input + pad_front + pad_back;
    if padded < window {
        return Err(format!(
            "window of {window} does not fit the padded extent {padded}"
        ));
    }
    Ok((padded - window) / stride + 1)
}

fn infer_convolution2d(
    input: &TensorDescriptor,
    desc: &Convolution2dDescriptor,
    weights: &ConstTensor,
    bias: Option<&ConstTensor>,
) -> Result<Vec<TensorDescriptor>, String> {
    let [batch, channels, height, width] = input.shape().dims() else {
        return Err(format!(
            "convolution needs NCHW input, got {}",
            input.shape()
        ));
    };
    let [out_channels, weight_channels, kernel_h, kernel_w] = weights.shape().dims() else {
        return Err(format!(
            "convolution weights must be [M,C,Hk,Wk], got {}",
            weights.shape()
        ));
    };
    if weight_channels != channels {
        return Err(format!(
            "input carries {channels} channels but weights expect {weight_channels}"
        ));
    }
    if let Some(bias) = bias {
        if bias.shape().dims() != [*out_channels] {
            return Err(format!(
                "bias shape {} does not match {out_channels} output channels",
                bias.shape()
            ));
        }
    }
    let out_h = windowed_extent(*height, *kernel_h, desc.pad_top, desc.pad_bottom, desc.stride_y)?;
    let out_w = windowed_extent(*width, *kernel_w, desc.pad_left, desc.pad_right, desc.stride_x)?;
    Ok(vec![TensorDescriptor::new(
        vec![*batch, *out_channels, out_h, out_w],
        input.data_type(),
    )])
}

fn infer_pooling2d(
    input: &TensorDescriptor,
    desc: &Pooling2dDescriptor,
) -> Result<Vec<TensorDescriptor>, String> {
    let [batch, channels, height, width] = input.shape().dims() else {
        return Err(format!("pooling needs NCHW input, got {}", input.shape()));
    };
    let out_h = windowed_extent(
        *height,
        desc.pool_height,
        desc.pad_top,
        desc.pad_bottom,
        desc.stride_y,
    )?;
    let out_w = windowed_extent(
        *width,
        desc.pool_width,
        desc.pad_left,
        desc.pad_right,
        desc.stride_x,
    )?;
    Ok(vec![TensorDescriptor::new(
        vec![*batch, *channels, out_h, out_w],
        input.data_type(),
    )])
}

fn infer_splitter(
    input: &TensorDescriptor,
    views: &ViewsDescriptor,
) -> Result<Vec<TensorDescriptor>, String> {
    if views.rank() != input.shape().rank() {
        return Err(format!(
            "views are rank {} but the input is {}",
            views.rank(),
            input.shape()
        ));
    }
    let mut outputs = Vec::with_capacity(views.num_views());
    for view in 0..views.num_views() {
        let origin = views.origin(view);
        let size = views.size(view);
        for (axis, dim) in input.shape().dims().iter().enumerate() {
            if origin[axis] + size[axis] > *dim {
                return Err(format!(
                    "view {view} exceeds the input extent on axis {axis} \
                     ({} + {} > {dim})",
                    origin[axis], size[axis]
                ));
            }
        }
        outputs.push(TensorDescriptor::new(
            Shape::from_slice(size),
            input.data_type(),
        ));
    }
    Ok(outputs)
}

/// Views must tile the concatenation axis exactly and match everywhere else;
/// a mismatch on any other axis is an error, never a broadcast.
fn infer_merger(
    inputs: &[TensorDescriptor],
    origins: &OriginsDescriptor,
) -> Result<Vec<TensorDescriptor>, String> {
    let axis = origins.concat_axis();
    let first = &inputs[0];
    if origins.rank() != first.shape().rank() {
        return Err(format!(
            "origins are rank {} but input 0 is {}",
            origins.rank(),
            first.shape()
        ));
    }
    let mut along_axis = 0usize;
    for (view, input) in inputs.iter().enumerate() {
        if input.data_type() != first.data_type() {
            return Err(format!(
                "input {view} data type {} disagrees with input 0 ({})",
                input.data_type(),
                first.data_type()
            ));
        }
        if input.shape().rank() != first.shape().rank() {
            return Err(format!(
                "input {view} is rank {} but input 0 is rank {}",
                input.shape().rank(),
                first.shape().rank()
            ));
        }
        for (dim_axis, (&dim, &first_dim)) in input
            .shape()
            .dims()
            .iter()
            .zip(first.shape().dims())
            .enumerate()
        {
            if dim_axis != axis && dim != first_dim {
                return Err(format!(
                    "input {view} has extent {dim} on axis {dim_axis}, expected {first_dim}"
                ));
            }
        }
        let origin = origins.origin(view);
        if origin[axis] != along_axis {
            return Err(format!(
                "input {view} starts at {} on the concatenation axis, expected {along_axis}",
                origin[axis]
            ));
        }
        along_axis += input.shape().dims()[axis];
    }
    let mut out_dims = first.shape().dims().to_vec();
    out_dims[axis] = along_axis;
    Ok(vec![TensorDescriptor::new(out_dims, first.data_type())])
}
