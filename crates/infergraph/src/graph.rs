//! Graph arena owning all layers and the connection topology.
//!
//! Layers live in a vector in insertion order with a guid index on the side.
//! Slots reference their peers by `(guid, index)` handles, so the arena can
//! splice layers in and out during optimization without invalidating handles
//! already issued to the caller. Traversal is a deterministic Kahn ordering:
//! every layer appears after all of its producers, ties broken by insertion
//! order so diagnostics and optimization passes are reproducible.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use crate::backend::TensorHandle;
use crate::error::{GraphError, GraphResult};
use crate::layer::{InputSlotRef, Layer, LayerGuid, OutputSlotRef};
use crate::tensor::TensorDescriptor;

#[derive(Debug, Clone, Default)]
pub struct Graph {
    layers: Vec<Layer>,
    index: HashMap<LayerGuid, usize>,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_layer(&mut self, layer: Layer) -> LayerGuid {
        let guid = layer.guid();
        self.index.insert(guid, self.layers.len());
        self.layers.push(layer);
        guid
    }

    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    /// Layers in insertion order.
    pub fn layers(&self) -> impl Iterator<Item = &Layer> {
        self.layers.iter()
    }

    pub fn layer(&self, guid: LayerGuid) -> Option<&Layer> {
        self.index.get(&guid).map(|&position| &self.layers[position])
    }

    pub(crate) fn layer_mut(&mut self, guid: LayerGuid) -> Option<&mut Layer> {
        let position = *self.index.get(&guid)?;
        Some(&mut self.layers[position])
    }

    /// Lookup by name; a linear scan, not a hot path.
    pub fn layer_by_name(&self, name: &str) -> Option<&Layer> {
        self.layers.iter().find(|layer| layer.name() == Some(name))
    }

    fn require_layer(&self, guid: LayerGuid) -> GraphResult<&Layer> {
        self.layer(guid).ok_or_else(|| {
            GraphError::connectivity(format!("guid {guid}"), "layer is not part of this graph")
        })
    }

    /// Wires a producer slot into a consumer slot.
    ///
    /// Fails if either slot index does not exist on its layer or if the input
    /// slot already has a connection; the existing wiring is left untouched.
    pub fn connect(&mut self, from: OutputSlotRef, to: InputSlotRef) -> GraphResult<()> {
        let producer = self.require_layer(from.layer)?;
        if from.index >= producer.num_output_slots() {
            return Err(GraphError::connectivity(
                producer.ident(),
                format!("output slot {} does not exist", from.index),
            ));
        }
        let consumer = self.require_layer(to.layer)?;
        if to.index >= consumer.num_input_slots() {
            return Err(GraphError::connectivity(
                consumer.ident(),
                format!("input slot {} does not exist", to.index),
            ));
        }
        if let Some(existing) = consumer.input_slot(to.index).and_then(|slot| slot.connection()) {
            return Err(GraphError::connectivity(
                consumer.ident(),
                format!(
                    "input slot {} is already fed by guid {}",
                    to.index, existing.layer
                ),
            ));
        }

        let producer = self
            .layer_mut(from.layer)
            .expect("producer checked above")
            .output_mut(from.index)
            .expect("output slot checked above");
        producer.push_connection(to);
        let consumer = self
            .layer_mut(to.layer)
            .expect("consumer checked above")
            .input_mut(to.index)
            .expect("input slot checked above");
        consumer.set_source(Some(from));
        Ok(())
    }

    /// Reverses a `connect` call; both endpoints must currently be wired to
    /// each other.
    pub fn disconnect(&mut self, from: OutputSlotRef, to: InputSlotRef) -> GraphResult<()> {
        let consumer = self.require_layer(to.layer)?;
        let connected = consumer
            .input_slot(to.index)
            .and_then(|slot| slot.connection())
            == Some(from);
        if !connected {
            return Err(GraphError::connectivity(
                consumer.ident(),
                format!("input slot {} is not fed by guid {}", to.index, from.layer),
            ));
        }
        self.require_layer(from.layer)?;

        self.layer_mut(from.layer)
            .expect("producer checked above")
            .output_mut(from.index)
            .expect("slot bounds verified by the existing connection")
            .remove_connection(to);
        self.layer_mut(to.layer)
            .expect("consumer checked above")
            .input_mut(to.index)
            .expect("slot bounds verified by the existing connection")
            .set_source(None);
        Ok(())
    }

    /// Sets the descriptor on an output slot (required for Input layers,
    /// which have nothing upstream to derive a shape from).
    pub fn set_tensor_descriptor(
        &mut self,
        slot: OutputSlotRef,
        descriptor: TensorDescriptor,
    ) -> GraphResult<()> {
        descriptor.ensure_well_formed()?;
        let layer = self.require_layer(slot.layer)?;
        if slot.index >= layer.num_output_slots() {
            return Err(GraphError::connectivity(
                layer.ident(),
                format!("output slot {} does not exist", slot.index),
            ));
        }
        self.layer_mut(slot.layer)
            .expect("layer checked above")
            .output_mut(slot.index)
            .expect("slot checked above")
            .set_descriptor(descriptor);
        Ok(())
    }

    pub fn num_connections(&self, slot: OutputSlotRef) -> usize {
        self.layer(slot.layer)
            .and_then(|layer| layer.output_slot(slot.index))
            .map(|output| output.num_connections())
            .unwrap_or(0)
    }

    pub fn connection(&self, slot: OutputSlotRef, index: usize) -> Option<InputSlotRef> {
        self.layer(slot.layer)?
            .output_slot(slot.index)?
            .connection(index)
    }

    pub fn connection_source(&self, slot: InputSlotRef) -> Option<OutputSlotRef> {
        self.layer(slot.layer)?.input_slot(slot.index)?.connection()
    }

    /// Deterministic dependency ordering over all layers.
    ///
    /// Unconnected input slots simply contribute no edge here; missing
    /// connections are a separate validation concern so that construction-time
    /// tooling can still order partial graphs.
    pub fn topological_order(&self) -> GraphResult<Vec<LayerGuid>> {
        let mut indegree: Vec<usize> = vec![0; self.layers.len()];
        for (position, layer) in self.layers.iter().enumerate() {
            for index in 0..layer.num_input_slots() {
                let source = layer.input_slot(index).and_then(|slot| slot.connection());
                if source.is_some_and(|source| self.index.contains_key(&source.layer)) {
                    indegree[position] += 1;
                }
            }
        }

        let mut ready: BTreeSet<usize> = indegree
            .iter()
            .enumerate()
            .filter(|(_, &degree)| degree == 0)
            .map(|(position, _)| position)
            .collect();
        let mut order = Vec::with_capacity(self.layers.len());
        while let Some(position) = ready.pop_first() {
            let layer = &self.layers[position];
            order.push(layer.guid());
            for slot in 0..layer.num_output_slots() {
                let output = layer.output_slot(slot).expect("slot index in range");
                for consumer in output.connections() {
                    let consumer_position = self.index[&consumer.layer];
                    indegree[consumer_position] -= 1;
                    if indegree[consumer_position] == 0 {
                        ready.insert(consumer_position);
                    }
                }
            }
        }

        if order.len() != self.layers.len() {
            let stuck = self
                .layers
                .iter()
                .find(|layer| !order.contains(&layer.guid()))
                .expect("at least one layer is part of the cycle");
            return Err(GraphError::connectivity(
                stuck.ident(),
                "the graph contains a cycle",
            ));
        }
        Ok(order)
    }

    /// Resolved descriptors of every connected input, in slot order.
    pub fn input_descriptors(&self, layer: &Layer) -> GraphResult<Vec<TensorDescriptor>> {
        let mut descriptors = Vec::with_capacity(layer.num_input_slots());
        for index in 0..layer.num_input_slots() {
            let source = layer
                .input_slot(index)
                .and_then(|slot| slot.connection())
                .ok_or_else(|| {
                    GraphError::connectivity(
                        layer.ident(),
                        format!("input slot {index} is unconnected"),
                    )
                })?;
            let producer = self.require_layer(source.layer)?;
            let descriptor = producer.output_descriptor(source.index).ok_or_else(|| {
                GraphError::shape(
                    producer.ident(),
                    format!("output slot {} has no descriptor yet", source.index),
                )
            })?;
            descriptors.push(descriptor.clone());
        }
        Ok(descriptors)
    }

    /// Tensor handles of every connected input, in slot order; allocation must
    /// have run for all producers.
    pub fn input_handles(&self, layer: &Layer) -> GraphResult<Vec<Arc<dyn TensorHandle>>> {
        let mut handles = Vec::with_capacity(layer.num_input_slots());
        for index in 0..layer.num_input_slots() {
            let source = layer
                .input_slot(index)
                .and_then(|slot| slot.connection())
                .ok_or_else(|| {
                    GraphError::connectivity(
                        layer.ident(),
                        format!("input slot {index} is unconnected"),
                    )
                })?;
            let producer = self.require_layer(source.layer)?;
            let handle = producer.output_handle(source.index).ok_or_else(|| {
                GraphError::allocation(format!(
                    "{}: output slot {} has no tensor handle",
                    producer.ident(),
                    source.index
                ))
            })?;
            handles.push(Arc::clone(handle));
        }
        Ok(handles)
    }

    /// Tensor handles of every output slot, in slot order.
    pub fn output_handles(&self, layer: &Layer) -> GraphResult<Vec<Arc<dyn TensorHandle>>> {
        let mut handles = Vec::with_capacity(layer.num_output_slots());
        for index in 0..layer.num_output_slots() {
            let handle = layer.output_handle(index).ok_or_else(|| {
                GraphError::allocation(format!(
                    "{}: output slot {index} has no tensor handle",
                    layer.ident()
                ))
            })?;
            handles.push(Arc::clone(handle));
        }
        Ok(handles)
    }
}
