//! Dot-graph rendering for diagnostics.
//!
//! Deterministic, read-only text form of an optimized graph: one node per
//! layer labeled with its variant name, one edge per fan-out pair labeled
//! with the producing slot's shape, nodes first and then edges, both in
//! dependency order. The format is byte-stable and covered by golden tests.

use std::io::{self, Write};

use crate::graph::Graph;
use crate::layer::LayerGuid;

pub(crate) fn serialize_graph<W: Write>(
    graph: &Graph,
    order: &[LayerGuid],
    writer: &mut W,
) -> io::Result<()> {
    writeln!(writer, "digraph Optimized {{")?;
    writeln!(writer, "    node [shape=\"record\"];")?;
    writeln!(
        writer,
        "    edge [fontsize=8 fontcolor=\"blue\" fontname=\"arial-bold\"];"
    )?;
    for guid in order {
        let Some(layer) = graph.layer(*guid) else {
            continue;
        };
        writeln!(
            writer,
            "    {guid} [label=\"{{{}}}\"];",
            layer.kind().variant_name()
        )?;
    }
    for guid in order {
        let Some(layer) = graph.layer(*guid) else {
            continue;
        };
        for index in 0..layer.num_output_slots() {
            let slot = layer.output_slot(index).expect("slot index in range");
            let label = match slot.descriptor() {
                Some(descriptor) => descriptor.shape().to_string(),
                None => "?".to_string(),
            };
            for connection in slot.connections() {
                writeln!(
                    writer,
                    "    {guid} -> {} [label=< {label} >];",
                    connection.layer
                )?;
            }
        }
    }
    writeln!(writer, "}}")
}
