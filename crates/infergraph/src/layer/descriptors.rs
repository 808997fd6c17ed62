//! Per-variant parameter descriptors.
//!
//! A descriptor is fixed at layer construction; only connectivity and derived
//! shapes change afterwards. Splitter/Merger descriptors additionally decide
//! the owning layer's slot counts.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{GraphError, GraphResult};

/// Window geometry for 2d convolution, NCHW layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Convolution2dDescriptor {
    pub stride_x: usize,
    pub stride_y: usize,
    pub pad_left: usize,
    pub pad_right: usize,
    pub pad_top: usize,
    pub pad_bottom: usize,
}

impl Default for Convolution2dDescriptor {
    fn default() -> Self {
        Self {
            stride_x: 1,
            stride_y: 1,
            pad_left: 0,
            pad_right: 0,
            pad_top: 0,
            pad_bottom: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PoolingAlgorithm {
    Max,
    Average,
}

/// Window geometry for 2d pooling, NCHW layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pooling2dDescriptor {
    pub pool_type: PoolingAlgorithm,
    pub pool_width: usize,
    pub pool_height: usize,
    pub stride_x: usize,
    pub stride_y: usize,
    pub pad_left: usize,
    pub pad_right: usize,
    pub pad_top: usize,
    pub pad_bottom: usize,
}

impl Default for Pooling2dDescriptor {
    fn default() -> Self {
        Self {
            pool_type: PoolingAlgorithm::Max,
            pool_width: 2,
            pool_height: 2,
            stride_x: 2,
            stride_y: 2,
            pad_left: 0,
            pad_right: 0,
            pad_top: 0,
            pad_bottom: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationFunction {
    ReLu,
    BoundedReLu,
    Sigmoid,
    TanH,
    Linear,
}

/// Activation function selector plus the function-specific `alpha`/`beta`
/// parameters (upper bound for BoundedReLu, scale/offset for Linear).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivationDescriptor {
    pub function: ActivationFunction,
    pub alpha: f32,
    pub beta: f32,
}

impl Default for ActivationDescriptor {
    fn default() -> Self {
        Self {
            function: ActivationFunction::ReLu,
            alpha: 0.0,
            beta: 0.0,
        }
    }
}

/// Local response normalization across channels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationDescriptor {
    pub norm_size: usize,
    pub alpha: f32,
    pub beta: f32,
    pub k: f32,
}

impl Default for NormalizationDescriptor {
    fn default() -> Self {
        Self {
            norm_size: 5,
            alpha: 1e-4,
            beta: 0.75,
            k: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoftmaxDescriptor {
    pub beta: f32,
}

impl Default for SoftmaxDescriptor {
    fn default() -> Self {
        Self { beta: 1.0 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchNormalizationDescriptor {
    pub eps: f32,
}

impl Default for BatchNormalizationDescriptor {
    fn default() -> Self {
        Self { eps: 1e-5 }
    }
}

type Coords = SmallVec<[usize; 4]>;

/// Per-view windows a Splitter carves out of its input tensor.
///
/// Each view is an `(origin, size)` pair of the input's rank; the layer gets
/// one output slot per view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewsDescriptor {
    origins: Vec<Coords>,
    sizes: Vec<Coords>,
}

impl ViewsDescriptor {
    pub fn new(views: Vec<(Vec<usize>, Vec<usize>)>) -> GraphResult<Self> {
        if views.is_empty() {
            return Err(GraphError::invalid_argument(
                "views descriptor needs at least one view",
            ));
        }
        let rank = views[0].0.len();
        let mut origins = Vec::with_capacity(views.len());
        let mut sizes = Vec::with_capacity(views.len());
        for (index, (origin, size)) in views.into_iter().enumerate() {
            if origin.len() != rank || size.len() != rank {
                return Err(GraphError::invalid_argument(format!(
                    "view {index} does not match the first view's rank {rank}"
                )));
            }
            if size.iter().any(|&dim| dim == 0) {
                return Err(GraphError::invalid_argument(format!(
                    "view {index} has a zero-sized extent"
                )));
            }
            origins.push(Coords::from_vec(origin));
            sizes.push(Coords::from_vec(size));
        }
        Ok(Self { origins, sizes })
    }

    pub fn num_views(&self) -> usize {
        self.origins.len()
    }

    pub fn rank(&self) -> usize {
        self.origins[0].len()
    }

    pub fn origin(&self, view: usize) -> &[usize] {
        &self.origins[view]
    }

    pub fn size(&self, view: usize) -> &[usize] {
        &self.sizes[view]
    }
}

/// Placement of each Merger input inside the concatenated output.
///
/// Views tile the output along `concat_axis`: every origin is zero on the
/// remaining axes and views are contiguous along the axis, in slot order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginsDescriptor {
    concat_axis: usize,
    origins: Vec<Coords>,
}

impl OriginsDescriptor {
    pub fn new(concat_axis: usize, origins: Vec<Vec<usize>>) -> GraphResult<Self> {
        if origins.is_empty() {
            return Err(GraphError::invalid_argument(
                "origins descriptor needs at least one view",
            ));
        }
        let rank = origins[0].len();
        if concat_axis >= rank {
            return Err(GraphError::invalid_argument(format!(
                "concatenation axis {concat_axis} is out of range for rank {rank}"
            )));
        }
        let mut converted = Vec::with_capacity(origins.len());
        for (index, origin) in origins.into_iter().enumerate() {
            if origin.len() != rank {
                return Err(GraphError::invalid_argument(format!(
                    "origin {index} does not match the first origin's rank {rank}"
                )));
            }
            if origin
                .iter()
                .enumerate()
                .any(|(axis, &value)| axis != concat_axis && value != 0)
            {
                return Err(GraphError::invalid_argument(format!(
                    "origin {index} is offset on a non-concatenation axis"
                )));
            }
            converted.push(Coords::from_vec(origin));
        }
        Ok(Self {
            concat_axis,
            origins: converted,
        })
    }

    pub fn num_views(&self) -> usize {
        self.origins.len()
    }

    pub fn rank(&self) -> usize {
        self.origins[0].len()
    }

    pub fn concat_axis(&self) -> usize {
        self.concat_axis
    }

    pub fn origin(&self, view: usize) -> &[usize] {
        &self.origins[view]
    }
}
