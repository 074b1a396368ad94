//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use nifty_components::array::{self, DynArray};
use nifty_components::pipeline::{InputSlot, NodeRunner, NodeType, OutputSlot};
use nifty_components::{ConfigValue, Result};

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Build `node_type` with `params` and run it once with `n_outputs` buffer
/// outputs. Returns the decoded outputs; slots the node left empty are
/// `None`.
pub fn run_node(
    node_type: NodeType,
    params: Vec<(&str, ConfigValue)>,
    inputs: &[InputSlot],
    n_outputs: usize,
) -> Result<Vec<Option<DynArray>>> {
    let outputs: Vec<OutputSlot> = (0..n_outputs)
        .map(|i| OutputSlot::buffer(format!("out{}", i)))
        .collect();
    run_with_outputs(node_type, params, inputs, &outputs)
}

pub fn run_with_outputs(
    node_type: NodeType,
    params: Vec<(&str, ConfigValue)>,
    inputs: &[InputSlot],
    outputs: &[OutputSlot],
) -> Result<Vec<Option<DynArray>>> {
    let node = node_type.build(params)?;
    let produced = NodeRunner::new(node).run(inputs, outputs)?;
    produced
        .into_iter()
        .map(|bytes| bytes.map(|b| array::decode(&b)).transpose())
        .collect()
}
