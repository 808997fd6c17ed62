//! Layers and their connection slots.
//!
//! A layer is one operation node: a stable guid, an optional name, a variant
//! descriptor, and fixed input/output slot vectors. Slots reference their
//! peers by `(guid, slot index)` handles into the owning graph's arena rather
//! than by pointer, so optimizer rewrites can replace layers without leaving
//! dangling references.

mod descriptors;
mod kind;

pub use descriptors::{
    ActivationDescriptor, ActivationFunction, BatchNormalizationDescriptor,
    Convolution2dDescriptor, NormalizationDescriptor, OriginsDescriptor, Pooling2dDescriptor,
    PoolingAlgorithm, SoftmaxDescriptor, ViewsDescriptor,
};
pub use kind::LayerKind;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::backend::{Compute, TensorHandle};
use crate::error::{GraphError, GraphResult};
use crate::tensor::TensorDescriptor;

/// Stable process-unique layer identity, assigned at construction and never
/// reused or mutated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerGuid(u64);

impl fmt::Display for LayerGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static GUID_COUNTER: AtomicU64 = AtomicU64::new(1);

fn next_layer_guid() -> LayerGuid {
    LayerGuid(GUID_COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Progress of a layer through the optimization pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LayerPhase {
    Unshaped,
    Shaped,
    HandleBound,
    WorkloadBound,
}

/// Handle to an output slot: owning layer guid plus slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutputSlotRef {
    pub layer: LayerGuid,
    pub index: usize,
}

/// Handle to an input slot: owning layer guid plus slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InputSlotRef {
    pub layer: LayerGuid,
    pub index: usize,
}

/// Consumer-side connection endpoint; accepts at most one incoming connection.
///
/// Holds only a back-reference, never ownership: the producing slot belongs to
/// its own layer.
#[derive(Debug, Clone, Default)]
pub struct InputSlot {
    source: Option<OutputSlotRef>,
}

impl InputSlot {
    pub fn connection(&self) -> Option<OutputSlotRef> {
        self.source
    }

    pub(crate) fn set_source(&mut self, source: Option<OutputSlotRef>) {
        self.source = source;
    }
}

/// Producer-side connection endpoint with ordered fan-out.
#[derive(Clone, Default)]
pub struct OutputSlot {
    descriptor: Option<TensorDescriptor>,
    connections: Vec<InputSlotRef>,
    handle: Option<Arc<dyn TensorHandle>>,
}

impl OutputSlot {
    pub fn descriptor(&self) -> Option<&TensorDescriptor> {
        self.descriptor.as_ref()
    }

    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    /// Fan-out in connection order (the order of `connect` calls).
    pub fn connection(&self, index: usize) -> Option<InputSlotRef> {
        self.connections.get(index).copied()
    }

    pub fn connections(&self) -> &[InputSlotRef] {
        &self.connections
    }

    pub fn handle(&self) -> Option<&Arc<dyn TensorHandle>> {
        self.handle.as_ref()
    }

    pub(crate) fn set_descriptor(&mut self, descriptor: TensorDescriptor) {
        self.descriptor = Some(descriptor);
    }

    pub(crate) fn push_connection(&mut self, target: InputSlotRef) {
        self.connections.push(target);
    }

    pub(crate) fn remove_connection(&mut self, target: InputSlotRef) {
        self.connections.retain(|existing| *existing != target);
    }

    pub(crate) fn set_handle(&mut self, handle: Arc<dyn TensorHandle>) {
        self.handle = Some(handle);
    }
}

impl fmt::Debug for OutputSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputSlot")
            .field("descriptor", &self.descriptor)
            .field("connections", &self.connections)
            .field("handle", &self.handle.is_some())
            .finish()
    }
}

/// One operation node in the graph.
#[derive(Debug, Clone)]
pub struct Layer {
    guid: LayerGuid,
    name: Option<String>,
    kind: LayerKind,
    inputs: Vec<InputSlot>,
    outputs: Vec<OutputSlot>,
    device: Option<Compute>,
    phase: LayerPhase,
}

impl Layer {
    pub(crate) fn new(kind: LayerKind, name: Option<&str>) -> Self {
        let inputs = vec![InputSlot::default(); kind.num_input_slots()];
        let outputs = vec![OutputSlot::default(); kind.num_output_slots()];
        Self {
            guid: next_layer_guid(),
            name: name.map(str::to_owned),
            kind,
            inputs,
            outputs,
            device: None,
            phase: LayerPhase::Unshaped,
        }
    }

    pub fn guid(&self) -> LayerGuid {
        self.guid
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn kind(&self) -> &LayerKind {
        &self.kind
    }

    pub fn num_input_slots(&self) -> usize {
        self.inputs.len()
    }

    pub fn num_output_slots(&self) -> usize {
        self.outputs.len()
    }

    pub fn input_slot(&self, index: usize) -> Option<&InputSlot> {
        self.inputs.get(index)
    }

    pub fn output_slot(&self, index: usize) -> Option<&OutputSlot> {
        self.outputs.get(index)
    }

    pub fn output_descriptor(&self, index: usize) -> Option<&TensorDescriptor> {
        self.outputs.get(index).and_then(OutputSlot::descriptor)
    }

    pub fn output_handle(&self, index: usize) -> Option<&Arc<dyn TensorHandle>> {
        self.outputs.get(index).and_then(OutputSlot::handle)
    }

    pub fn device(&self) -> Option<Compute> {
        self.device
    }

    pub fn phase(&self) -> LayerPhase {
        self.phase
    }

    /// Human-readable identity used in error reporting and diagnostics.
    pub fn ident(&self) -> String {
        match &self.name {
            Some(name) => format!("{} \"{name}\" (guid {})", self.kind.variant_name(), self.guid),
            None => format!("{} (guid {})", self.kind.variant_name(), self.guid),
        }
    }

    /// Runs the variant's shape-inference rule over the connected input
    /// descriptors. Input layers instead require their descriptor to have
    /// been set by the caller before optimization.
    pub fn infer_output_shapes(
        &self,
        inputs: &[TensorDescriptor],
    ) -> GraphResult<Vec<TensorDescriptor>> {
        if matches!(self.kind, LayerKind::Input { .. }) {
            return match self.output_descriptor(0) {
                Some(descriptor) => Ok(vec![descriptor.clone()]),
                None => Err(GraphError::shape(
                    self.ident(),
                    "input tensor descriptor was never set",
                )),
            };
        }
        self.kind
            .infer(inputs)
            .map_err(|message| GraphError::shape(self.ident(), message))
    }

    /// Structurally identical copy: same variant, descriptor, and name, but a
    /// fresh guid, no connections, and no derived state. Used when the
    /// optimizer substitutes layers during rewrites.
    pub fn clone_layer(&self) -> Layer {
        Layer::new(self.kind.clone(), self.name.as_deref())
    }

    pub(crate) fn input_mut(&mut self, index: usize) -> Option<&mut InputSlot> {
        self.inputs.get_mut(index)
    }

    pub(crate) fn output_mut(&mut self, index: usize) -> Option<&mut OutputSlot> {
        self.outputs.get_mut(index)
    }

    pub(crate) fn set_device(&mut self, device: Compute) {
        self.device = Some(device);
    }

    pub(crate) fn set_phase(&mut self, phase: LayerPhase) {
        self.phase = phase;
    }
}
