//! Error taxonomy surfaced by graph construction and optimization.
//!
//! Every failure is detected eagerly at the phase boundary where it first
//! becomes knowable: argument checks at network-builder time, connectivity,
//! shape, device, and allocation failures at optimize time. Errors carry the
//! offending layer's identity so callers can locate the fault in their model;
//! none are recovered or retried internally.

use thiserror::Error;

use crate::backend::Compute;

/// Convenience alias for results returned by graph and backend routines.
pub type GraphResult<T> = Result<T, GraphError>;

/// Failure surfaced by graph construction, optimization, or dispatch.
#[derive(Debug, Clone, Error)]
pub enum GraphError {
    #[error("connectivity error at {layer}: {message}")]
    Connectivity { layer: String, message: String },

    #[error("shape error at {layer}: {message}")]
    Shape { layer: String, message: String },

    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    #[error("unsupported operation at {layer} on {device}: {message}")]
    Unsupported {
        layer: String,
        device: Compute,
        message: String,
    },

    #[error("allocation failure: {message}")]
    Allocation { message: String },
}

impl GraphError {
    pub fn connectivity(layer: impl Into<String>, message: impl Into<String>) -> Self {
        GraphError::Connectivity {
            layer: layer.into(),
            message: message.into(),
        }
    }

    pub fn shape(layer: impl Into<String>, message: impl Into<String>) -> Self {
        GraphError::Shape {
            layer: layer.into(),
            message: message.into(),
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        GraphError::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn unsupported(
        layer: impl Into<String>,
        device: Compute,
        message: impl Into<String>,
    ) -> Self {
        GraphError::Unsupported {
            layer: layer.into(),
            device,
            message: message.into(),
        }
    }

    pub fn allocation(message: impl Into<String>) -> Self {
        GraphError::Allocation {
            message: message.into(),
        }
    }
}
