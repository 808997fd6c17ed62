//! The four optimization passes, run in order as hard gates.

use std::sync::Arc;

use crate::backend::{BackendRegistry, Compute, DeviceSpec, TensorHandle, WorkloadFactory};
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::layer::{InputSlotRef, Layer, LayerGuid, LayerKind, LayerPhase, OutputSlotRef};

pub(crate) struct OptimizeContext<'a> {
    pub device_spec: &'a DeviceSpec,
    pub registry: &'a BackendRegistry,
    /// Dependency order, established by validation and refreshed after
    /// rewrites.
    pub order: Vec<LayerGuid>,
    /// Factories actually bound to at least one layer, captured so the
    /// optimized network keeps them alive without the registry.
    pub used_factories: Vec<(Compute, Arc<dyn WorkloadFactory>)>,
}

impl OptimizeContext<'_> {
    fn record_factory(&mut self, device: Compute, factory: Arc<dyn WorkloadFactory>) {
        if !self.used_factories.iter().any(|(used, _)| *used == device) {
            self.used_factories.push((device, factory));
        }
    }

    fn bound_factory(&self, device: Compute) -> Option<Arc<dyn WorkloadFactory>> {
        self.used_factories
            .iter()
            .find(|(used, _)| *used == device)
            .map(|(_, factory)| Arc::clone(factory))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct PassStats {
    pub rewrites: usize,
}

pub(crate) trait GraphPass {
    fn name(&self) -> &'static str;
    fn run(&self, graph: &mut Graph, cx: &mut OptimizeContext<'_>) -> GraphResult<PassStats>;
}

/// Every input slot on every layer must be connected and the graph acyclic.
pub(crate) struct ValidateConnectivityPass;

impl GraphPass for ValidateConnectivityPass {
    fn name(&self) -> &'static str {
        "validate-connectivity"
    }

    fn run(&self, graph: &mut Graph, cx: &mut OptimizeContext<'_>) -> GraphResult<PassStats> {
        for layer in graph.layers() {
            for index in 0..layer.num_input_slots() {
                let connected = layer
                    .input_slot(index)
                    .and_then(|slot| slot.connection())
                    .is_some();
                if !connected {
                    return Err(GraphError::connectivity(
                        layer.ident(),
                        format!("input slot {index} is unconnected"),
                    ));
                }
            }
        }
        cx.order = graph.topological_order()?;
        Ok(PassStats::default())
    }
}

/// Runs each layer's shape-inference rule in dependency order and assigns
/// the derived descriptors. Failures are model-definition errors carrying the
/// layer identity.
pub(crate) struct ShapeInferencePass;

impl GraphPass for ShapeInferencePass {
    fn name(&self) -> &'static str {
        "shape-inference"
    }

    fn run(&self, graph: &mut Graph, cx: &mut OptimizeContext<'_>) -> GraphResult<PassStats> {
        for guid in cx.order.clone() {
            let (descriptors, slots) = {
                let layer = graph.layer(guid).expect("layer from dependency order");
                let inputs = graph.input_descriptors(layer)?;
                (layer.infer_output_shapes(&inputs)?, layer.num_output_slots())
            };
            debug_assert_eq!(descriptors.len(), slots);
            let layer = graph.layer_mut(guid).expect("layer from dependency order");
            for (index, descriptor) in descriptors.into_iter().enumerate() {
                layer
                    .output_mut(index)
                    .expect("inference yields one descriptor per slot")
                    .set_descriptor(descriptor);
            }
            layer.set_phase(LayerPhase::Shaped);
        }
        Ok(PassStats::default())
    }
}

/// Assigns every layer a device with backend support, then splices `MemCopy`
/// transition layers onto connections that cross devices.
pub(crate) struct DeviceAssignmentPass;

impl DeviceAssignmentPass {
    fn choose_device(
        &self,
        layer: &Layer,
        inputs: &[crate::tensor::TensorDescriptor],
        cx: &OptimizeContext<'_>,
    ) -> GraphResult<(Compute, Arc<dyn WorkloadFactory>)> {
        let requested = cx.device_spec.requested_device(layer);
        let mut candidates = vec![requested];
        for fallback in [cx.device_spec.default_device, Compute::CpuRef] {
            if !candidates.contains(&fallback) {
                candidates.push(fallback);
            }
        }
        for device in candidates {
            if let Some(factory) = cx.registry.factory(device) {
                if factory.supports(layer, inputs) {
                    return Ok((device, factory));
                }
            }
        }
        Err(GraphError::unsupported(
            layer.ident(),
            requested,
            "no registered backend supports this layer and no fallback applies",
        ))
    }
}

impl GraphPass for DeviceAssignmentPass {
    fn name(&self) -> &'static str {
        "device-assignment"
    }

    fn run(&self, graph: &mut Graph, cx: &mut OptimizeContext<'_>) -> GraphResult<PassStats> {
        for guid in cx.order.clone() {
            let (device, factory) = {
                let layer = graph.layer(guid).expect("layer from dependency order");
                let inputs = graph.input_descriptors(layer)?;
                self.choose_device(layer, &inputs, cx)?
            };
            cx.record_factory(device, factory);
            graph
                .layer_mut(guid)
                .expect("layer from dependency order")
                .set_device(device);
        }

        // Splice a MemCopy wherever a connection crosses devices. The copy
        // runs on the consumer's device.
        let mut rewrites = 0;
        for guid in cx.order.clone() {
            let crossings = device_crossings(graph, guid);
            for (from, to, consumer_device) in crossings {
                splice_memcopy(graph, from, to, consumer_device)?;
                rewrites += 1;
            }
        }
        if rewrites > 0 {
            cx.order = graph.topological_order()?;
        }
        Ok(PassStats { rewrites })
    }
}

fn device_crossings(
    graph: &Graph,
    guid: LayerGuid,
) -> Vec<(OutputSlotRef, InputSlotRef, Compute)> {
    let mut crossings = Vec::new();
    let Some(layer) = graph.layer(guid) else {
        return crossings;
    };
    let Some(producer_device) = layer.device() else {
        return crossings;
    };
    for index in 0..layer.num_output_slots() {
        let slot = layer.output_slot(index).expect("slot index in range");
        for connection in slot.connections() {
            let consumer_device = graph
                .layer(connection.layer)
                .and_then(|consumer| consumer.device());
            if let Some(consumer_device) = consumer_device {
                if consumer_device != producer_device {
                    crossings.push((
                        OutputSlotRef {
                            layer: guid,
                            index,
                        },
                        *connection,
                        consumer_device,
                    ));
                }
            }
        }
    }
    crossings
}

fn splice_memcopy(
    graph: &mut Graph,
    from: OutputSlotRef,
    to: InputSlotRef,
    device: Compute,
) -> GraphResult<()> {
    let descriptor = graph
        .layer(from.layer)
        .and_then(|layer| layer.output_descriptor(from.index))
        .cloned()
        .ok_or_else(|| {
            GraphError::shape(
                format!("guid {}", from.layer),
                "cannot splice a transition onto an unshaped connection",
            )
        })?;

    let mut copy = Layer::new(LayerKind::MemCopy, None);
    copy.set_device(device);
    copy.set_phase(LayerPhase::Shaped);
    let copy_guid = graph.add_layer(copy);

    graph.disconnect(from, to)?;
    graph.connect(
        from,
        InputSlotRef {
            layer: copy_guid,
            index: 0,
        },
    )?;
    graph.set_tensor_descriptor(
        OutputSlotRef {
            layer: copy_guid,
            index: 0,
        },
        descriptor,
    )?;
    graph.connect(
        OutputSlotRef {
            layer: copy_guid,
            index: 0,
        },
        to,
    )?;
    Ok(())
}

/// Requests backing storage for every output slot from the factory bound to
/// the owning layer's device.
pub(crate) struct TensorHandleAllocationPass;

impl GraphPass for TensorHandleAllocationPass {
    fn name(&self) -> &'static str {
        "tensor-handle-allocation"
    }

    fn run(&self, graph: &mut Graph, cx: &mut OptimizeContext<'_>) -> GraphResult<PassStats> {
        for guid in cx.order.clone() {
            let handles: Vec<(usize, Arc<dyn TensorHandle>)> = {
                let layer = graph.layer(guid).expect("layer from dependency order");
                let device = layer.device().ok_or_else(|| {
                    GraphError::allocation(format!(
                        "{}: no device assigned before allocation",
                        layer.ident()
                    ))
                })?;
                let factory = cx.bound_factory(device).ok_or_else(|| {
                    GraphError::allocation(format!(
                        "{}: no factory bound for {device}",
                        layer.ident()
                    ))
                })?;
                let mut handles = Vec::with_capacity(layer.num_output_slots());
                for index in 0..layer.num_output_slots() {
                    let descriptor = layer.output_descriptor(index).ok_or_else(|| {
                        GraphError::shape(
                            layer.ident(),
                            format!("output slot {index} has no descriptor before allocation"),
                        )
                    })?;
                    handles.push((index, factory.create_tensor_handle(descriptor)?));
                }
                handles
            };
            let layer = graph.layer_mut(guid).expect("layer from dependency order");
            for (index, handle) in handles {
                layer
                    .output_mut(index)
                    .expect("slot index in range")
                    .set_handle(handle);
            }
            layer.set_phase(LayerPhase::HandleBound);
        }
        Ok(PassStats::default())
    }
}
