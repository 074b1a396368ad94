//! Integration tests for reading measurement sets through the MSRead node

mod common;

use common::builders::{channel_freq, data_value, MsBuilder};
use common::{assert_float_eq, run_node, run_with_outputs};
use nifty_components::array::DynArray;
use nifty_components::error::ErrorKind;
use nifty_components::pipeline::{InputSlot, NodeType, OutputSlot};
use nifty_components::ConfigValue;
use num_complex::Complex64;
use tempfile::TempDir;

const UVW: usize = 0;
const FREQ: usize = 1;
const VIS: usize = 2;
const WEIGHT_SPECTRUM: usize = 3;
const FLAG: usize = 4;
const WEIGHT: usize = 5;

fn read(ms: &std::path::Path, params: Vec<(&str, ConfigValue)>) -> Vec<Option<DynArray>> {
    run_node(NodeType::MsRead, params, &[InputSlot::store("ms", ms)], 6).unwrap()
}

fn output(outputs: &[Option<DynArray>], slot: usize) -> &DynArray {
    outputs[slot].as_ref().expect("output not produced")
}

#[test]
fn test_reads_every_column() {
    let dir = TempDir::new().unwrap();
    let ms = MsBuilder::new(100).build(dir.path(), "obs.ms");

    let out = read(&ms, vec![]);
    assert_eq!(output(&out, UVW).shape(), &[100, 3]);
    assert_eq!(output(&out, FREQ).shape(), &[4]);
    assert_eq!(output(&out, VIS).shape(), &[100, 4, 2]);
    assert_eq!(output(&out, WEIGHT_SPECTRUM).shape(), &[100, 4, 2]);
    assert_eq!(output(&out, FLAG).shape(), &[100, 4, 2]);
    assert_eq!(output(&out, WEIGHT).shape(), &[100, 2]);

    let freq = output(&out, FREQ).as_float64().unwrap();
    assert_float_eq(freq[[2]], channel_freq(2), 1e-6);

    let vis = output(&out, VIS).as_complex128().unwrap();
    assert_eq!(vis[[42, 3, 1]], data_value(42, 3, 1));
    assert!(output(&out, FLAG).as_bool().is_some());
}

#[test]
fn test_row_windows() {
    let dir = TempDir::new().unwrap();
    let ms = MsBuilder::new(100).build(dir.path(), "obs.ms");

    let out = read(
        &ms,
        vec![("row_start", ConfigValue::Int(10)), ("row_end", ConfigValue::Int(-1))],
    );
    assert_eq!(output(&out, UVW).shape(), &[90, 3]);
    let uvw = output(&out, UVW).as_float64().unwrap();
    assert_float_eq(uvw[[0, 0]], 10.0, 1e-12);

    let out = read(
        &ms,
        vec![("row_start", ConfigValue::Int(0)), ("row_end", ConfigValue::Int(20))],
    );
    assert_eq!(output(&out, VIS).shape(), &[20, 4, 2]);
    // Frequencies are not windowed by rows.
    assert_eq!(output(&out, FREQ).shape(), &[4]);
}

#[test]
fn test_row_window_past_end() {
    let dir = TempDir::new().unwrap();
    let ms = MsBuilder::new(100).build(dir.path(), "obs.ms");

    let err = run_node(
        NodeType::MsRead,
        vec![("row_start", ConfigValue::Int(90)), ("row_end", ConfigValue::Int(30))],
        &[InputSlot::store("ms", &ms)],
        6,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Range);
}

#[test]
fn test_flagged_samples_read_as_zero() {
    let dir = TempDir::new().unwrap();
    let ms = MsBuilder::new(10).flag(5, 1, 0).build(dir.path(), "obs.ms");

    let out = read(&ms, vec![]);
    let vis = output(&out, VIS).as_complex128().unwrap();
    assert_eq!(vis[[5, 1, 0]], Complex64::new(0.0, 0.0));
    assert_eq!(vis[[5, 1, 1]], data_value(5, 1, 1));

    let weights = output(&out, WEIGHT_SPECTRUM).as_float64().unwrap();
    assert_eq!(weights[[5, 1, 0]], 0.0);
    assert_eq!(weights[[5, 1, 1]], 2.0);

    let flag = output(&out, FLAG).as_bool().unwrap();
    assert!(flag[[5, 1, 0]]);
    assert!(!flag[[5, 1, 1]]);
}

#[test]
fn test_autocorrelations_zero_vis_only() {
    let dir = TempDir::new().unwrap();
    let ms = MsBuilder::new(10).autocorrelation(7).build(dir.path(), "obs.ms");

    let out = read(&ms, vec![]);
    let vis = output(&out, VIS).as_complex128().unwrap();
    assert!(vis
        .index_axis(ndarray::Axis(0), 7)
        .iter()
        .all(|v| *v == Complex64::new(0.0, 0.0)));
    assert_eq!(vis[[6, 0, 0]], data_value(6, 0, 0));

    let weights = output(&out, WEIGHT_SPECTRUM).as_float64().unwrap();
    assert_eq!(weights[[7, 0, 1]], 2.0);
}

#[test]
fn test_polarization_window() {
    let dir = TempDir::new().unwrap();
    let ms = MsBuilder::new(10).build(dir.path(), "obs.ms");

    let out = read(
        &ms,
        vec![("pol_start", ConfigValue::Int(1)), ("pol_end", ConfigValue::Int(2))],
    );
    // The single remaining polarization axis is squeezed away.
    assert_eq!(output(&out, VIS).shape(), &[10, 4]);
    assert_eq!(output(&out, FLAG).shape(), &[10, 4]);
    let vis = output(&out, VIS).as_complex128().unwrap();
    assert_eq!(vis[[3, 2]], data_value(3, 2, 1));

    // WEIGHT is per row and polarization but is not windowed.
    assert_eq!(output(&out, WEIGHT).shape(), &[10, 2]);
}

#[test]
fn test_negative_pol_end_drops_trailing_polarizations() {
    let dir = TempDir::new().unwrap();
    let ms = MsBuilder::new(4).pols(4).build(dir.path(), "obs.ms");

    let out = read(&ms, vec![("pol_end", ConfigValue::Int(-1))]);
    assert_eq!(output(&out, VIS).shape(), &[4, 4, 3]);
    assert_eq!(output(&out, WEIGHT_SPECTRUM).shape(), &[4, 4, 3]);
    assert_eq!(output(&out, FLAG).shape(), &[4, 4, 3]);
    let vis = output(&out, VIS).as_complex128().unwrap();
    assert_eq!(vis[[2, 1, 2]], data_value(2, 1, 2));

    let out = read(
        &ms,
        vec![("pol_start", ConfigValue::Int(-3)), ("pol_end", ConfigValue::Int(-1))],
    );
    assert_eq!(output(&out, VIS).shape(), &[4, 4, 2]);
    let vis = output(&out, VIS).as_complex128().unwrap();
    assert_eq!(vis[[0, 3, 0]], data_value(0, 3, 1));
}

#[test]
fn test_pol_window_beyond_axis() {
    let dir = TempDir::new().unwrap();
    let ms = MsBuilder::new(4).pols(2).build(dir.path(), "obs.ms");

    let err = run_node(
        NodeType::MsRead,
        vec![("pol_end", ConfigValue::Int(-3))],
        &[InputSlot::store("ms", &ms)],
        6,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Column);
}

#[test]
fn test_single_channel_frequency_is_scalar() {
    let dir = TempDir::new().unwrap();
    let ms = MsBuilder::new(5).chans(1).build(dir.path(), "obs.ms");

    let out = read(&ms, vec![]);
    assert_eq!(output(&out, FREQ).ndim(), 0);
    assert_eq!(output(&out, VIS).shape(), &[5, 2]);
}

#[test]
fn test_only_bound_outputs_are_read() {
    let dir = TempDir::new().unwrap();
    let ms = MsBuilder::new(10).build(dir.path(), "obs.ms");

    let outputs = vec![OutputSlot::buffer("uvw"), OutputSlot::buffer("freq")];
    let out = run_with_outputs(
        NodeType::MsRead,
        vec![],
        &[InputSlot::store("ms", &ms)],
        &outputs,
    )
    .unwrap();
    assert_eq!(out.len(), 2);
    assert_eq!(output(&out, UVW).shape(), &[10, 3]);
    assert_eq!(output(&out, FREQ).shape(), &[4]);
}

#[test]
fn test_missing_store() {
    let dir = TempDir::new().unwrap();
    let err = run_node(
        NodeType::MsRead,
        vec![],
        &[InputSlot::store("ms", dir.path().join("absent.ms"))],
        6,
    )
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StoreNotFound);
}

#[cfg(not(feature = "casacore"))]
#[test]
fn test_casacore_table_needs_feature() {
    let dir = TempDir::new().unwrap();
    let ms = dir.path().join("real.ms");
    std::fs::create_dir(&ms).unwrap();
    std::fs::write(ms.join("table.dat"), b"").unwrap();

    let err = run_node(NodeType::MsRead, vec![], &[InputSlot::store("ms", &ms)], 6).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Store);
}

#[test]
fn test_no_input_bound() {
    let err = run_node(NodeType::MsRead, vec![], &[], 6).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InputCount);
}
