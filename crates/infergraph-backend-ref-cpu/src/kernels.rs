//! Naive portable kernels.
//!
//! Straight-line loops over host slices; shapes are already validated by the
//! optimizer's inference pass, so kernels only carry the arithmetic.

use infergraph::{
    ActivationDescriptor, ActivationFunction, Convolution2dDescriptor, NormalizationDescriptor,
    Pooling2dDescriptor, PoolingAlgorithm,
};

pub fn add(lhs: &[f32], rhs: &[f32]) -> Vec<f32> {
    lhs.iter().zip(rhs).map(|(a, b)| a + b).collect()
}

pub fn mul(lhs: &[f32], rhs: &[f32]) -> Vec<f32> {
    lhs.iter().zip(rhs).map(|(a, b)| a * b).collect()
}

pub fn activation(input: &[f32], desc: &ActivationDescriptor) -> Vec<f32> {
    let apply = |x: f32| -> f32 {
        match desc.function {
            ActivationFunction::ReLu => x.max(0.0),
            ActivationFunction::BoundedReLu => x.max(0.0).min(desc.alpha),
            ActivationFunction::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            ActivationFunction::TanH => x.tanh(),
            ActivationFunction::Linear => desc.alpha * x + desc.beta,
        }
    };
    input.iter().copied().map(apply).collect()
}

/// Softmax over the innermost axis, numerically stabilized by the row max.
pub fn softmax(input: &[f32], inner: usize, beta: f32) -> Vec<f32> {
    let mut output = vec![0.0; input.len()];
    for (row, out_row) in input.chunks(inner).zip(output.chunks_mut(inner)) {
        let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        let mut sum = 0.0;
        for (out, &x) in out_row.iter_mut().zip(row) {
            *out = (beta * (x - max)).exp();
            sum += *out;
        }
        for out in out_row.iter_mut() {
            *out /= sum;
        }
    }
    output
}

/// `output[n][m] = sum_k input[n][k] * weights[m][k] + bias[m]`
pub fn fully_connected(
    input: &[f32],
    batch: usize,
    input_size: usize,
    weights: &[f32],
    output_size: usize,
    bias: Option<&[f32]>,
) -> Vec<f32> {
    let mut output = vec![0.0; batch * output_size];
    for n in 0..batch {
        for m in 0..output_size {
            let mut acc = bias.map(|bias| bias[m]).unwrap_or(0.0);
            for k in 0..input_size {
                acc += input[n * input_size + k] * weights[m * input_size + k];
            }
            output[n * output_size + m] = acc;
        }
    }
    output
}

/// Direct NCHW convolution with implicit zero padding.
pub fn conv2d(
    input: &[f32],
    in_dims: &[usize],
    weights: &[f32],
    weight_dims: &[usize],
    bias: Option<&[f32]>,
    desc: &Convolution2dDescriptor,
    out_dims: &[usize],
) -> Vec<f32> {
    let (channels, in_h, in_w) = (in_dims[1], in_dims[2], in_dims[3]);
    let (out_channels, kernel_h, kernel_w) = (weight_dims[0], weight_dims[2], weight_dims[3]);
    let (batch, out_h, out_w) = (out_dims[0], out_dims[2], out_dims[3]);

    let mut output = vec![0.0; batch * out_channels * out_h * out_w];
    let mut write = 0;
    for n in 0..batch {
        for m in 0..out_channels {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let mut acc = bias.map(|bias| bias[m]).unwrap_or(0.0);
                    for c in 0..channels {
                        for kh in 0..kernel_h {
                            let ih = (oh * desc.stride_y + kh) as isize - desc.pad_top as isize;
                            if ih < 0 || ih as usize >= in_h {
                                continue;
                            }
                            for kw in 0..kernel_w {
                                let iw =
                                    (ow * desc.stride_x + kw) as isize - desc.pad_left as isize;
                                if iw < 0 || iw as usize >= in_w {
                                    continue;
                                }
                                let in_index = ((n * channels + c) * in_h + ih as usize) * in_w
                                    + iw as usize;
                                let w_index =
                                    ((m * channels + c) * kernel_h + kh) * kernel_w + kw;
                                acc += input[in_index] * weights[w_index];
                            }
                        }
                    }
                    output[write] = acc;
                    write += 1;
                }
            }
        }
    }
    output
}

/// NCHW pooling; average pooling divides by the count of in-bounds taps.
pub fn pooling2d(
    input: &[f32],
    in_dims: &[usize],
    desc: &Pooling2dDescriptor,
    out_dims: &[usize],
) -> Vec<f32> {
    let (in_h, in_w) = (in_dims[2], in_dims[3]);
    let (batch, channels, out_h, out_w) = (out_dims[0], out_dims[1], out_dims[2], out_dims[3]);

    let mut output = vec![0.0; batch * channels * out_h * out_w];
    let mut write = 0;
    for n in 0..batch {
        for c in 0..channels {
            for oh in 0..out_h {
                for ow in 0..out_w {
                    let mut acc = match desc.pool_type {
                        PoolingAlgorithm::Max => f32::NEG_INFINITY,
                        PoolingAlgorithm::Average => 0.0,
                    };
                    let mut taps = 0usize;
                    for kh in 0..desc.pool_height {
                        let ih = (oh * desc.stride_y + kh) as isize - desc.pad_top as isize;
                        if ih < 0 || ih as usize >= in_h {
                            continue;
                        }
                        for kw in 0..desc.pool_width {
                            let iw = (ow * desc.stride_x + kw) as isize - desc.pad_left as isize;
                            if iw < 0 || iw as usize >= in_w {
                                continue;
                            }
                            let value =
                                input[((n * channels + c) * in_h + ih as usize) * in_w + iw as usize];
                            match desc.pool_type {
                                PoolingAlgorithm::Max => acc = acc.max(value),
                                PoolingAlgorithm::Average => acc += value,
                            }
                            taps += 1;
                        }
                    }
                    output[write] = match desc.pool_type {
                        PoolingAlgorithm::Max => acc,
                        PoolingAlgorithm::Average => acc / taps.max(1) as f32,
                    };
                    write += 1;
                }
            }
        }
    }
    output
}

/// Per-channel affine normalization with precomputed statistics.
pub fn batch_norm(
    input: &[f32],
    dims: &[usize],
    mean: &[f32],
    variance: &[f32],
    beta: &[f32],
    gamma: &[f32],
    eps: f32,
) -> Vec<f32> {
    let channels = dims[1];
    let inner: usize = dims[2..].iter().product();
    input
        .iter()
        .enumerate()
        .map(|(index, &x)| {
            let c = (index / inner) % channels;
            gamma[c] * (x - mean[c]) / (variance[c] + eps).sqrt() + beta[c]
        })
        .collect()
}

/// Local response normalization across channels, NCHW.
pub fn local_response_norm(
    input: &[f32],
    dims: &[usize],
    desc: &NormalizationDescriptor,
) -> Vec<f32> {
    let (batch, channels) = (dims[0], dims[1]);
    let inner: usize = dims[2..].iter().product();
    let half = desc.norm_size / 2;

    let mut output = vec![0.0; input.len()];
    for n in 0..batch {
        for c in 0..channels {
            for i in 0..inner {
                let mut sum_sq = 0.0;
                let lo = c.saturating_sub(half);
                let hi = (c + half).min(channels - 1);
                for cc in lo..=hi {
                    let value = input[(n * channels + cc) * inner + i];
                    sum_sq += value * value;
                }
                let index = (n * channels + c) * inner + i;
                let scale = desc.k + desc.alpha * sum_sq / desc.norm_size as f32;
                output[index] = input[index] / scale.powf(desc.beta);
            }
        }
    }
    output
}

fn strides(dims: &[usize]) -> Vec<usize> {
    let mut strides = vec![1; dims.len()];
    for axis in (0..dims.len().saturating_sub(1)).rev() {
        strides[axis] = strides[axis + 1] * dims[axis + 1];
    }
    strides
}

/// Copies an n-dimensional region between two dense buffers.
pub fn copy_region(
    src: &[f32],
    src_dims: &[usize],
    src_origin: &[usize],
    dst: &mut [f32],
    dst_dims: &[usize],
    dst_origin: &[usize],
    region: &[usize],
) {
    let rank = region.len();
    let src_strides = strides(src_dims);
    let dst_strides = strides(dst_dims);
    let total: usize = region.iter().product();
    let mut coords = vec![0usize; rank];
    for _ in 0..total {
        let mut src_index = 0;
        let mut dst_index = 0;
        for axis in 0..rank {
            src_index += (src_origin[axis] + coords[axis]) * src_strides[axis];
            dst_index += (dst_origin[axis] + coords[axis]) * dst_strides[axis];
        }
        dst[dst_index] = src[src_index];
        for axis in (0..rank).rev() {
            coords[axis] += 1;
            if coords[axis] < region[axis] {
                break;
            }
            coords[axis] = 0;
        }
    }
}
