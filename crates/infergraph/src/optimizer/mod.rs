//! Optimization pipeline: validation, shape propagation, device assignment,
//! and tensor-handle allocation.
//!
//! `optimize` consumes the caller's network read-only: it copies the graph
//! (guids preserved, so handles issued by the builder keep addressing the
//! same layers) and drives every layer through
//! `Unshaped → Shaped → HandleBound` in dependency order. Each pass is a hard
//! gate on the next; a failure surfaces the offending layer and leaves no
//! partially optimized network behind.

mod passes;

use std::io::{self, Write};
use std::sync::Arc;

use crate::backend::{BackendRegistry, Compute, DeviceSpec, TensorHandle, Workload, WorkloadFactory};
use crate::dot;
use crate::error::{GraphError, GraphResult};
use crate::graph::Graph;
use crate::layer::{LayerGuid, LayerKind, LayerPhase};
use crate::network::Network;
use crate::trace::{self, PassEvent};

use passes::{
    DeviceAssignmentPass, GraphPass, OptimizeContext, ShapeInferencePass,
    TensorHandleAllocationPass, ValidateConnectivityPass,
};

/// Validates, shapes, places, and allocates a network for the given device
/// specification.
///
/// Optimizing the same network with the same spec twice yields structurally
/// equivalent results: identical topology, shapes, and device assignment
/// (guids of spliced transition layers may differ).
pub fn optimize(
    network: &Network,
    device_spec: &DeviceSpec,
    registry: &BackendRegistry,
) -> GraphResult<OptimizedNetwork> {
    let mut graph = network.graph().clone();
    let mut cx = OptimizeContext {
        device_spec,
        registry,
        order: Vec::new(),
        used_factories: Vec::new(),
    };

    let pipeline: [&dyn GraphPass; 4] = [
        &ValidateConnectivityPass,
        &ShapeInferencePass,
        &DeviceAssignmentPass,
        &TensorHandleAllocationPass,
    ];
    for pass in pipeline {
        let stats = pass.run(&mut graph, &mut cx)?;
        trace::emit(PassEvent {
            pass: pass.name(),
            layers: graph.num_layers(),
            rewrites: stats.rewrites,
        });
    }

    Ok(OptimizedNetwork {
        graph,
        order: cx.order,
        factories: cx.used_factories,
    })
}

/// The post-optimization graph: every layer bound to a device, every output
/// slot backed by a tensor handle, ready to produce workloads on demand.
///
/// Topology and bindings are immutable from here on; only buffer contents
/// change during execution.
pub struct OptimizedNetwork {
    graph: Graph,
    order: Vec<LayerGuid>,
    factories: Vec<(Compute, Arc<dyn WorkloadFactory>)>,
}

impl std::fmt::Debug for OptimizedNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizedNetwork")
            .field("graph", &self.graph)
            .field("order", &self.order)
            .field(
                "factories",
                &self.factories.iter().map(|(c, _)| *c).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl OptimizedNetwork {
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Final dependency order the workloads execute in.
    pub fn dependency_order(&self) -> &[LayerGuid] {
        &self.order
    }

    fn factory(&self, device: Compute) -> Option<Arc<dyn WorkloadFactory>> {
        self.factories
            .iter()
            .find(|(bound, _)| *bound == device)
            .map(|(_, factory)| Arc::clone(factory))
    }

    /// Asks every layer's factory for its workload, in dependency order.
    ///
    /// The first unsupported variant/shape combination fails the whole call;
    /// device assignment already steered layers away from unsupported
    /// backends, so a failure here means the factory reneged on `supports`.
    pub fn create_workloads(&mut self) -> GraphResult<Vec<Box<dyn Workload>>> {
        let mut workloads = Vec::with_capacity(self.order.len());
        for guid in self.order.clone() {
            let workload = {
                let layer = self.graph.layer(guid).expect("layer from dependency order");
                let device = layer.device().expect("device bound during optimization");
                let factory = self.factory(device).ok_or_else(|| {
                    GraphError::unsupported(
                        layer.ident(),
                        device,
                        "no factory bound for the layer's device",
                    )
                })?;
                factory.create_workload(layer, &self.graph)?
            };
            self.graph
                .layer_mut(guid)
                .expect("layer from dependency order")
                .set_phase(LayerPhase::WorkloadBound);
            workloads.push(workload);
        }
        Ok(workloads)
    }

    /// Storage bound to the Input layer registered under `binding_id`.
    pub fn input_handle(&self, binding_id: u32) -> Option<Arc<dyn TensorHandle>> {
        self.graph.layers().find_map(|layer| match layer.kind() {
            LayerKind::Input { binding_id: id } if *id == binding_id => {
                layer.output_handle(0).cloned()
            }
            _ => None,
        })
    }

    /// Storage feeding the Output layer registered under `binding_id`.
    pub fn output_handle(&self, binding_id: u32) -> Option<Arc<dyn TensorHandle>> {
        let output = self.graph.layers().find(|layer| {
            matches!(layer.kind(), LayerKind::Output { binding_id: id } if *id == binding_id)
        })?;
        let source = output.input_slot(0)?.connection()?;
        self.graph.layer(source.layer)?.output_handle(source.index).cloned()
    }

    /// Writes the deterministic dot rendering described in the crate docs.
    pub fn serialize_to_dot<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        dot::serialize_graph(&self.graph, &self.order, writer)
    }
}
