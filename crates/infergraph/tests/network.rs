//! Construction-API tests: guid stability, wiring invariants, and the
//! byte-exact dot rendering.

mod common;

use std::sync::Arc;

use infergraph::{
    optimize, ActivationDescriptor, BackendRegistry, BatchNormalizationDescriptor, Compute,
    ConstTensor, Convolution2dDescriptor, DataType, DeviceSpec, Graph, GraphError, LayerHandle,
    Network, NormalizationDescriptor, OriginsDescriptor, Pooling2dDescriptor, SoftmaxDescriptor,
    TensorDescriptor, ViewsDescriptor,
};

use common::TestFactory;

fn float_desc(dims: &[usize]) -> TensorDescriptor {
    TensorDescriptor::new(dims.to_vec(), DataType::Float32)
}

fn const_tensor(dims: &[usize]) -> ConstTensor {
    let elements: usize = dims.iter().product();
    ConstTensor::new(float_desc(dims), vec![0.0; elements]).expect("well-formed constant")
}

#[test]
fn layer_guids_are_distinct() {
    let mut net = Network::new();
    let input = net.add_input(0, None).guid();
    let add = net.add_addition(None).guid();
    let output = net.add_output(0, None).guid();

    assert_ne!(input, add);
    assert_ne!(add, output);
    assert_ne!(input, output);
}

#[test]
fn layer_names_are_optional() {
    let mut net = Network::new();
    net.add_input(0, None);
    net.add_addition(None);
    net.add_activation(ActivationDescriptor::default(), None);
    net.add_output(0, None);
    assert_eq!(net.num_layers(), 4);
}

#[test]
fn serialize_to_dot_matches_golden_output() {
    let mut net = Network::new();
    let input = net.add_input(0, None);
    let add = net.add_addition(None);
    let output = net.add_output(0, None);

    net.connect(input.output(0), add.input(0)).expect("wire");
    net.connect(input.output(0), add.input(1)).expect("wire");
    net.connect(add.output(0), output.input(0)).expect("wire");
    net.set_tensor_descriptor(input.output(0), float_desc(&[4]))
        .expect("input descriptor");

    let mut registry = BackendRegistry::new();
    registry.register(Arc::new(TestFactory::new(Compute::CpuAcc)));
    let optimized = optimize(&net, &DeviceSpec::new(Compute::CpuAcc), &registry)
        .expect("single-device graph optimizes");

    let mut rendered = Vec::new();
    optimized
        .serialize_to_dot(&mut rendered)
        .expect("writing to a vec");
    let rendered = String::from_utf8(rendered).expect("dot output is utf-8");

    let expected = format!(
        "digraph Optimized {{\n\
         \x20   node [shape=\"record\"];\n\
         \x20   edge [fontsize=8 fontcolor=\"blue\" fontname=\"arial-bold\"];\n\
         \x20   {input} [label=\"{{Input}}\"];\n\
         \x20   {add} [label=\"{{Addition}}\"];\n\
         \x20   {output} [label=\"{{Output}}\"];\n\
         \x20   {input} -> {add} [label=< [4] >];\n\
         \x20   {input} -> {add} [label=< [4] >];\n\
         \x20   {add} -> {output} [label=< [4] >];\n\
         }}\n",
        input = input.guid(),
        add = add.guid(),
        output = output.guid()
    );
    assert_eq!(rendered, expected);
}

#[test]
fn empty_network_optimizes_trivially() {
    let net = Network::new();
    assert_eq!(net.num_layers(), 0);

    let registry = BackendRegistry::new();
    let mut optimized =
        optimize(&net, &DeviceSpec::new(Compute::CpuRef), &registry).expect("nothing to validate");
    assert_eq!(optimized.graph().num_layers(), 0);
    assert!(optimized.create_workloads().expect("no workloads").is_empty());
}

#[test]
fn connecting_an_occupied_input_slot_fails_and_preserves_the_original() {
    let mut net = Network::new();
    let first = net.add_input(0, None);
    let second = net.add_input(1, None);
    let output = net.add_output(0, None);

    net.connect(first.output(0), output.input(0)).expect("wire");
    let err = net.connect(second.output(0), output.input(0)).unwrap_err();
    assert!(matches!(err, GraphError::Connectivity { .. }));

    let graph = net.graph();
    assert_eq!(
        graph.connection_source(output.input(0)),
        Some(first.output(0))
    );
    assert_eq!(graph.num_connections(first.output(0)), 1);
    assert_eq!(graph.num_connections(second.output(0)), 0);
}

#[test]
fn connecting_a_missing_slot_index_fails() {
    let mut net = Network::new();
    let input = net.add_input(0, None);
    let output = net.add_output(0, None);

    let err = net.connect(input.output(1), output.input(0)).unwrap_err();
    assert!(matches!(err, GraphError::Connectivity { .. }));
    let err = net.connect(input.output(0), output.input(3)).unwrap_err();
    assert!(matches!(err, GraphError::Connectivity { .. }));
}

#[test]
fn disconnect_reverses_both_endpoints() {
    let mut net = Network::new();
    let input = net.add_input(0, None);
    let output = net.add_output(0, None);

    net.connect(input.output(0), output.input(0)).expect("wire");
    net.disconnect(input.output(0), output.input(0))
        .expect("unwire");

    let graph = net.graph();
    assert_eq!(graph.connection_source(output.input(0)), None);
    assert_eq!(graph.num_connections(input.output(0)), 0);

    // The slot is free again.
    net.connect(input.output(0), output.input(0))
        .expect("rewire after disconnect");
}

fn all_input_slots_connected(graph: &Graph, handle: &LayerHandle) -> bool {
    let layer = graph.layer(handle.guid()).expect("layer exists");
    (0..layer.num_input_slots()).all(|i| graph.connection_source(handle.input(i)).is_some())
}

fn check_one_output_to_one_input(graph: &Graph, src: &LayerHandle, dst: &LayerHandle) {
    assert_eq!(graph.num_connections(src.output(0)), 1);
    assert_eq!(graph.connection(src.output(0), 0), Some(dst.input(0)));
    assert_eq!(graph.connection_source(dst.input(0)), Some(src.output(0)));
}

fn check_one_output_to_two_inputs(graph: &Graph, src: &LayerHandle, dst: &LayerHandle) {
    assert_eq!(graph.num_connections(src.output(0)), 2);
    for i in 0..2 {
        assert_eq!(graph.connection(src.output(0), i), Some(dst.input(i)));
        assert_eq!(graph.connection_source(dst.input(i)), Some(src.output(0)));
    }
}

#[test]
fn network_modification_wires_a_full_chain() {
    let mut net = Network::new();

    let input = net.add_input(0, Some("input layer"));
    let conv = net
        .add_convolution2d(
            Convolution2dDescriptor::default(),
            const_tensor(&[10, 1, 1, 1]),
            None,
            Some("conv layer"),
        )
        .expect("conv weights are well-formed");
    net.connect(input.output(0), conv.input(0)).expect("wire");

    let fully_connected = net
        .add_fully_connected(const_tensor(&[10, 10]), None, Some("fully connected"))
        .expect("fc weights are well-formed");
    net.connect(conv.output(0), fully_connected.input(0))
        .expect("wire");

    let pooling = net.add_pooling2d(Pooling2dDescriptor::default(), Some("pooling2d"));
    net.connect(fully_connected.output(0), pooling.input(0))
        .expect("wire");

    let activation = net.add_activation(ActivationDescriptor::default(), Some("activation"));
    net.connect(pooling.output(0), activation.input(0))
        .expect("wire");

    let normalization =
        net.add_normalization(NormalizationDescriptor::default(), Some("normalization"));
    net.connect(activation.output(0), normalization.input(0))
        .expect("wire");

    let softmax = net.add_softmax(SoftmaxDescriptor::default(), Some("softmax"));
    net.connect(normalization.output(0), softmax.input(0))
        .expect("wire");

    let stat = || const_tensor(&[1]);
    let batch_norm = net
        .add_batch_normalization(
            BatchNormalizationDescriptor::default(),
            stat(),
            stat(),
            stat(),
            stat(),
            Some("batch norm"),
        )
        .expect("statistics are well-formed");
    net.connect(softmax.output(0), batch_norm.input(0))
        .expect("wire");

    let addition = net.add_addition(Some("addition"));
    net.connect(batch_norm.output(0), addition.input(0))
        .expect("wire");
    net.connect(batch_norm.output(0), addition.input(1))
        .expect("wire");

    let multiplication = net.add_multiplication(Some("multiplication"));
    net.connect(addition.output(0), multiplication.input(0))
        .expect("wire");
    net.connect(addition.output(0), multiplication.input(1))
        .expect("wire");

    let output = net.add_output(0, Some("output layer"));
    net.connect(multiplication.output(0), output.input(0))
        .expect("wire");

    assert_eq!(net.num_layers(), 11);

    let graph = net.graph();
    for name in [
        "input layer",
        "conv layer",
        "fully connected",
        "pooling2d",
        "activation",
        "normalization",
        "softmax",
        "batch norm",
        "addition",
        "multiplication",
        "output layer",
    ] {
        assert!(graph.layer_by_name(name).is_some(), "missing layer {name}");
    }

    for handle in [
        &conv,
        &fully_connected,
        &pooling,
        &activation,
        &normalization,
        &softmax,
        &batch_norm,
        &addition,
        &multiplication,
        &output,
    ] {
        assert!(all_input_slots_connected(graph, handle));
    }

    check_one_output_to_one_input(graph, &input, &conv);
    check_one_output_to_one_input(graph, &conv, &fully_connected);
    check_one_output_to_one_input(graph, &fully_connected, &pooling);
    check_one_output_to_one_input(graph, &pooling, &activation);
    check_one_output_to_one_input(graph, &activation, &normalization);
    check_one_output_to_one_input(graph, &normalization, &softmax);
    check_one_output_to_one_input(graph, &softmax, &batch_norm);
    check_one_output_to_two_inputs(graph, &batch_norm, &addition);
    check_one_output_to_two_inputs(graph, &addition, &multiplication);
    check_one_output_to_one_input(graph, &multiplication, &output);
}

#[test]
fn splitter_and_merger_expose_view_slots() {
    let mut net = Network::new();

    let input = net.add_input(0, Some("input layer"));
    let views = ViewsDescriptor::new(vec![
        (vec![0, 0], vec![1, 4]),
        (vec![1, 0], vec![1, 4]),
    ])
    .expect("views are well-formed");
    let splitter = net.add_splitter(views, Some("splitter layer"));
    net.connect(input.output(0), splitter.input(0)).expect("wire");

    let softmax_1 = net.add_softmax(SoftmaxDescriptor::default(), Some("softmax_1"));
    net.connect(splitter.output(0), softmax_1.input(0))
        .expect("wire");
    let softmax_2 = net.add_softmax(SoftmaxDescriptor::default(), Some("softmax_2"));
    net.connect(splitter.output(1), softmax_2.input(0))
        .expect("wire");

    let origins = OriginsDescriptor::new(0, vec![vec![0, 0], vec![1, 0]])
        .expect("origins are well-formed");
    let merger = net.add_merger(origins, Some("merger layer"));
    net.connect(softmax_1.output(0), merger.input(0))
        .expect("wire");
    net.connect(softmax_2.output(0), merger.input(1))
        .expect("wire");

    let output = net.add_output(0, Some("output layer"));
    net.connect(merger.output(0), output.input(0)).expect("wire");

    let graph = net.graph();
    let splitter_layer = graph.layer(splitter.guid()).expect("layer exists");
    assert_eq!(splitter_layer.num_output_slots(), 2);
    assert_eq!(
        graph.connection(splitter.output(0), 0),
        Some(softmax_1.input(0))
    );
    assert_eq!(
        graph.connection_source(softmax_1.input(0)),
        Some(splitter.output(0))
    );
    assert_eq!(
        graph.connection(splitter.output(1), 0),
        Some(softmax_2.input(0))
    );
    assert_eq!(
        graph.connection_source(softmax_2.input(0)),
        Some(splitter.output(1))
    );

    let merger_layer = graph.layer(merger.guid()).expect("layer exists");
    assert_eq!(merger_layer.num_input_slots(), 2);
    assert_eq!(
        graph.connection(softmax_1.output(0), 0),
        Some(merger.input(0))
    );
    assert_eq!(
        graph.connection(softmax_2.output(0), 0),
        Some(merger.input(1))
    );
}

#[test]
fn splitter_branches_can_rejoin_through_addition() {
    let mut net = Network::new();

    let input = net.add_input(0, Some("input layer"));
    let views = ViewsDescriptor::new(vec![
        (vec![0, 0], vec![1, 4]),
        (vec![1, 0], vec![1, 4]),
    ])
    .expect("views are well-formed");
    let splitter = net.add_splitter(views, Some("splitter layer"));
    net.connect(input.output(0), splitter.input(0)).expect("wire");

    let softmax_1 = net.add_softmax(SoftmaxDescriptor::default(), Some("softmax_1"));
    net.connect(splitter.output(0), softmax_1.input(0))
        .expect("wire");
    let softmax_2 = net.add_softmax(SoftmaxDescriptor::default(), Some("softmax_2"));
    net.connect(splitter.output(1), softmax_2.input(0))
        .expect("wire");

    let addition = net.add_addition(Some("add layer"));
    net.connect(softmax_1.output(0), addition.input(0))
        .expect("wire");
    net.connect(softmax_2.output(0), addition.input(1))
        .expect("wire");

    let output = net.add_output(0, Some("output layer"));
    net.connect(addition.output(0), output.input(0)).expect("wire");

    assert_eq!(net.num_layers(), 6);
    assert!(all_input_slots_connected(net.graph(), &addition));
    assert!(all_input_slots_connected(net.graph(), &output));
}

#[test]
fn cloned_layers_get_a_fresh_guid_and_no_wiring() {
    let mut net = Network::new();
    let input = net.add_input(0, None);
    let softmax = net.add_softmax(SoftmaxDescriptor::default(), Some("sm"));
    net.connect(input.output(0), softmax.input(0)).expect("wire");

    let original = net.graph().layer(softmax.guid()).expect("layer exists");
    let clone = original.clone_layer();

    assert_ne!(clone.guid(), original.guid());
    assert_eq!(clone.name(), Some("sm"));
    assert_eq!(clone.kind().variant_name(), "Softmax");
    assert_eq!(clone.num_input_slots(), 1);
    assert!(
        clone
            .input_slot(0)
            .expect("slot exists")
            .connection()
            .is_none(),
        "connections are never copied"
    );
}

#[test]
fn builder_rejects_malformed_weights() {
    let mut net = Network::new();

    let err = net
        .add_fully_connected(const_tensor(&[10, 1, 1, 1]), None, None)
        .unwrap_err();
    assert!(matches!(err, GraphError::InvalidArgument { .. }));

    let err = net
        .add_convolution2d(
            Convolution2dDescriptor::default(),
            const_tensor(&[10, 1, 1, 1]),
            Some(const_tensor(&[3])),
            None,
        )
        .unwrap_err();
    assert!(matches!(err, GraphError::InvalidArgument { .. }));

    let bad_payload = ConstTensor::new(float_desc(&[2, 2]), vec![0.0; 3]);
    assert!(matches!(
        bad_payload.unwrap_err(),
        GraphError::InvalidArgument { .. }
    ));
}
