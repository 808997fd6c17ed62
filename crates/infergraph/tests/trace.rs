//! Pass-event instrumentation emitted during optimization.

mod common;

use std::sync::{Arc, Mutex};

use infergraph::trace::{clear_sink, install_sink, PassEvent, TraceSink};
use infergraph::{
    optimize, BackendRegistry, Compute, DataType, DeviceSpec, Network, SoftmaxDescriptor,
    TensorDescriptor,
};

use common::TestFactory;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<PassEvent>>,
}

impl TraceSink for Recorder {
    fn record(&self, event: &PassEvent) {
        self.events
            .lock()
            .expect("recorder poisoned")
            .push(event.clone());
    }
}

#[test]
fn every_pass_emits_one_event_in_pipeline_order() {
    let mut net = Network::new();
    let input = net.add_input(0, None);
    let softmax = net.add_softmax(SoftmaxDescriptor::default(), None);
    let output = net.add_output(0, None);
    net.connect(input.output(0), softmax.input(0)).expect("wire");
    net.connect(softmax.output(0), output.input(0)).expect("wire");
    net.set_tensor_descriptor(
        input.output(0),
        TensorDescriptor::new(vec![1, 4], DataType::Float32),
    )
    .expect("input descriptor");

    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(TestFactory::new(Compute::CpuRef)));

    let recorder = Arc::new(Recorder::default());
    install_sink(recorder.clone());
    let result = optimize(&net, &DeviceSpec::new(Compute::CpuRef), &registry);
    clear_sink();
    result.expect("optimizes");

    let events = recorder.events.lock().expect("recorder poisoned");
    let passes: Vec<&str> = events.iter().map(|event| event.pass).collect();
    assert_eq!(
        passes,
        vec![
            "validate-connectivity",
            "shape-inference",
            "device-assignment",
            "tensor-handle-allocation",
        ]
    );
    assert!(events.iter().all(|event| event.layers == 3));
    assert!(events.iter().all(|event| event.rewrites == 0));
}
