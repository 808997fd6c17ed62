//! Vectorized backend tests: matmul parity against the reference kernels and
//! fallback placement for unsupported variants.

use std::sync::Arc;

use infergraph::{
    optimize, BackendRegistry, Compute, ConstTensor, DataType, DeviceSpec, LayerKind, Network,
    OptimizedNetwork, SoftmaxDescriptor, TensorDescriptor,
};
use infergraph_backend_faer::{register_acc_backend, AccWorkloadFactory};
use infergraph_backend_ref_cpu::{register_ref_backend, RefWorkloadFactory};

fn float_desc(dims: &[usize]) -> TensorDescriptor {
    TensorDescriptor::new(dims.to_vec(), DataType::Float32)
}

fn fc_net(weights: Vec<f32>, bias: Option<Vec<f32>>) -> Network {
    let mut net = Network::new();
    let input = net.add_input(0, Some("in"));
    let fc = net
        .add_fully_connected(
            ConstTensor::new(float_desc(&[2, 3]), weights).expect("weights"),
            bias.map(|bias| ConstTensor::new(float_desc(&[2]), bias).expect("bias")),
            Some("fc"),
        )
        .expect("weights are well-formed");
    let output = net.add_output(0, Some("out"));
    net.connect(input.output(0), fc.input(0)).expect("wire");
    net.connect(fc.output(0), output.input(0)).expect("wire");
    net.set_tensor_descriptor(input.output(0), float_desc(&[2, 3]))
        .expect("input descriptor");
    net
}

fn run(optimized: &mut OptimizedNetwork, input: &[f32]) -> Vec<f32> {
    optimized
        .input_handle(0)
        .expect("input binding 0")
        .write_f32(input)
        .expect("input upload");
    for workload in optimized.create_workloads().expect("workloads resolve") {
        workload.execute().expect("workload executes");
    }
    optimized
        .output_handle(0)
        .expect("output binding 0")
        .read_f32()
        .expect("output readback")
}

fn assert_close(actual: &[f32], expected: &[f32]) {
    assert_eq!(actual.len(), expected.len());
    for (index, (a, e)) in actual.iter().zip(expected).enumerate() {
        assert!(
            (a - e).abs() < 1e-4,
            "element {index}: got {a}, expected {e}"
        );
    }
}

#[test]
fn faer_fully_connected_matches_the_reference_backend() {
    let weights = vec![1.0, -2.0, 3.0, 0.5, 0.25, -1.0];
    let bias = vec![0.1, -0.2];
    let input = [1.0, 2.0, 3.0, -1.0, 0.5, 2.0];

    let net = fc_net(weights.clone(), Some(bias.clone()));

    let mut acc_registry = BackendRegistry::new();
    acc_registry.register(Arc::new(AccWorkloadFactory::new()));
    let mut on_acc = optimize(&net, &DeviceSpec::new(Compute::CpuAcc), &acc_registry)
        .expect("acc supports the whole chain");
    let acc_result = run(&mut on_acc, &input);

    let mut ref_registry = BackendRegistry::new();
    ref_registry.register(Arc::new(RefWorkloadFactory::new()));
    let mut on_ref = optimize(&net, &DeviceSpec::new(Compute::CpuRef), &ref_registry)
        .expect("ref supports the whole chain");
    let ref_result = run(&mut on_ref, &input);

    assert_close(&acc_result, &ref_result);
    // Spot-check one element against the closed form.
    let expected_first = 1.0 * 1.0 + 2.0 * -2.0 + 3.0 * 3.0 + 0.1;
    assert!((acc_result[0] - expected_first).abs() < 1e-4);
}

#[test]
fn softmax_falls_back_to_the_reference_device_with_transitions() {
    let mut net = Network::new();
    let input = net.add_input(0, Some("in"));
    let fc = net
        .add_fully_connected(
            ConstTensor::new(float_desc(&[2, 3]), vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0])
                .expect("weights"),
            None,
            Some("fc"),
        )
        .expect("weights are well-formed");
    let softmax = net.add_softmax(SoftmaxDescriptor { beta: 1.0 }, Some("sm"));
    let output = net.add_output(0, Some("out"));
    net.connect(input.output(0), fc.input(0)).expect("wire");
    net.connect(fc.output(0), softmax.input(0)).expect("wire");
    net.connect(softmax.output(0), output.input(0)).expect("wire");
    net.set_tensor_descriptor(input.output(0), float_desc(&[1, 3]))
        .expect("input descriptor");

    let mut registry = BackendRegistry::new();
    register_ref_backend(&mut registry);
    register_acc_backend(&mut registry);

    let mut optimized = optimize(&net, &DeviceSpec::new(Compute::CpuAcc), &registry)
        .expect("fallback covers the softmax");

    assert_eq!(
        optimized
            .graph()
            .layer_by_name("fc")
            .expect("fc layer")
            .device(),
        Some(Compute::CpuAcc)
    );
    assert_eq!(
        optimized
            .graph()
            .layer_by_name("sm")
            .expect("softmax layer")
            .device(),
        Some(Compute::CpuRef)
    );
    let copies = optimized
        .graph()
        .layers()
        .filter(|layer| matches!(layer.kind(), LayerKind::MemCopy))
        .count();
    assert_eq!(copies, 2);

    let result = run(&mut optimized, &[2.0, 1.0, 5.0]);
    // fc projects onto the first two features, then softmax normalizes.
    let (a, b) = (2.0f32, 1.0f32);
    let sum = a.exp() + b.exp();
    assert_close(&result, &[a.exp() / sum, b.exp() / sum]);
}
