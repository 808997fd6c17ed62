//! Tensor metadata attached to graph connections.
//!
//! Descriptors are plain metadata: an ordered shape plus an element type.
//! They are produced lazily during shape propagation and immutable once a
//! slot carries one. Constant tensors couple a descriptor with an immutable
//! host payload and are validated when handed to the network builder.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::error::{GraphError, GraphResult};

/// Enumerates scalar element types supported on graph connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Float32,
    Signed32,
}

impl DataType {
    /// Returns the storage size of one element in bytes.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DataType::Float32 | DataType::Signed32 => 4,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Float32 => write!(f, "Float32"),
            DataType::Signed32 => write!(f, "Signed32"),
        }
    }
}

/// Logical tensor shape as an ordered list of dimension extents.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Shape(SmallVec<[usize; 4]>);

impl Shape {
    pub fn from_slice(dims: &[usize]) -> Self {
        Self(dims.iter().copied().collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn dim(&self, axis: usize) -> Option<usize> {
        self.0.get(axis).copied()
    }

    /// Total element count; the empty shape counts as a single scalar element.
    pub fn num_elements(&self) -> usize {
        self.0.iter().product()
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Self(SmallVec::from_vec(dims))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, dim) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "]")
    }
}

/// Immutable shape/datatype metadata carried by an output slot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorDescriptor {
    shape: Shape,
    data_type: DataType,
}

impl TensorDescriptor {
    pub fn new(shape: impl Into<Shape>, data_type: DataType) -> Self {
        Self {
            shape: shape.into(),
            data_type,
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    pub fn num_elements(&self) -> usize {
        self.shape.num_elements()
    }

    /// Rejects descriptors with no dimensions or a zero-sized dimension.
    pub(crate) fn ensure_well_formed(&self) -> GraphResult<()> {
        if self.shape.rank() == 0 {
            return Err(GraphError::invalid_argument(
                "tensor descriptor must have at least one dimension",
            ));
        }
        if self.shape.dims().iter().any(|&dim| dim == 0) {
            return Err(GraphError::invalid_argument(format!(
                "tensor descriptor {} contains a zero-sized dimension",
                self.shape
            )));
        }
        Ok(())
    }
}

impl fmt::Display for TensorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.shape, self.data_type)
    }
}

/// Immutable constant tensor (weights, bias, statistics) owned by a layer.
///
/// The payload is reference counted so cloning a layer during graph rewrites
/// never duplicates weight data.
#[derive(Debug, Clone)]
pub struct ConstTensor {
    descriptor: TensorDescriptor,
    data: Arc<[f32]>,
}

impl ConstTensor {
    /// Validates the descriptor/payload pairing up front; malformed constants
    /// are an `InvalidArgument` at construction, not a later shape failure.
    pub fn new(descriptor: TensorDescriptor, data: Vec<f32>) -> GraphResult<Self> {
        descriptor.ensure_well_formed()?;
        if descriptor.data_type() != DataType::Float32 {
            return Err(GraphError::invalid_argument(format!(
                "constant tensors carry Float32 data, got {}",
                descriptor.data_type()
            )));
        }
        if data.len() != descriptor.num_elements() {
            return Err(GraphError::invalid_argument(format!(
                "constant tensor payload has {} elements but shape {} needs {}",
                data.len(),
                descriptor.shape(),
                descriptor.num_elements()
            )));
        }
        Ok(Self {
            descriptor,
            data: Arc::from(data),
        })
    }

    pub fn descriptor(&self) -> &TensorDescriptor {
        &self.descriptor
    }

    pub fn shape(&self) -> &Shape {
        self.descriptor.shape()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shape_display_is_bracketed_and_comma_separated() {
        assert_eq!(Shape::from_slice(&[4]).to_string(), "[4]");
        assert_eq!(Shape::from_slice(&[3, 5]).to_string(), "[3,5]");
    }

    #[test]
    fn const_tensor_rejects_payload_size_mismatch() {
        let descriptor = TensorDescriptor::new(vec![2, 2], DataType::Float32);
        let err = ConstTensor::new(descriptor, vec![0.0; 3]).unwrap_err();
        assert!(matches!(err, GraphError::InvalidArgument { .. }));
    }

    #[test]
    fn const_tensor_rejects_zero_dimension() {
        let descriptor = TensorDescriptor::new(vec![2, 0], DataType::Float32);
        assert!(ConstTensor::new(descriptor, Vec::new()).is_err());
    }
}
