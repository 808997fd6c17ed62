//! Inference graph compiler for heterogeneous edge hardware.
//!
//! A caller describes a model as a directed graph of typed layers, wires the
//! layers' slots, and asks the optimizer to bind the graph to a target device
//! specification. The result is an executable form in which every layer is
//! placed on a concrete backend, every output slot carries allocated storage,
//! and every layer can produce a backend-specific workload.
//!
//! ## Architecture
//!
//! ```text
//! Network (builder)
//!      |
//!      | add_* / connect
//!      v
//! Graph of Layers (slot-level wiring, guid arena)
//!      |
//!      | optimize(network, device_spec, registry)
//!      v
//! Pass pipeline (validate -> shapes -> devices -> handles)
//!      |
//!      v
//! OptimizedNetwork ----- create_workloads ----> backend Workloads
//! ```
//!
//! Backends plug in through [`backend::WorkloadFactory`]; the in-tree
//! reference CPU and vectorized CPU factories live in their own crates.

pub mod backend;
mod dot;
pub mod error;
pub mod graph;
pub mod layer;
pub mod network;
pub mod optimizer;
pub mod tensor;
pub mod trace;

pub use backend::{BackendRegistry, Compute, DeviceSpec, TensorHandle, Workload, WorkloadFactory};
pub use error::{GraphError, GraphResult};
pub use graph::Graph;
pub use layer::{
    ActivationDescriptor, ActivationFunction, BatchNormalizationDescriptor,
    Convolution2dDescriptor, InputSlotRef, Layer, LayerGuid, LayerKind, LayerPhase,
    NormalizationDescriptor, OriginsDescriptor, OutputSlotRef, Pooling2dDescriptor,
    PoolingAlgorithm, SoftmaxDescriptor, ViewsDescriptor,
};
pub use network::{LayerHandle, Network};
pub use optimizer::{optimize, OptimizedNetwork};
pub use tensor::{ConstTensor, DataType, Shape, TensorDescriptor};
