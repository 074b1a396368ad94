//! Node abstraction for the component boundary.
//!
//! Two-layer design:
//! - **`NodePlugin` trait** — for user-defined components.
//! - **`BuiltinNode` enum** — for all built-in components, dispatched by
//!   match rather than through a vtable.
//!
//! `AnyNode` wraps either variant so the runner can handle both uniformly.

use crate::array::{self, DynArray};
use crate::config::ConfigValue;
use crate::error::{NiftyError, Result};
use crate::pipeline::nodes::{
    DegridderNode, GridderNode, ImagePlotNode, MsCopyUpdateNode, MsReadNode, MsUpdateNode,
    RoundTripNode,
};
use crate::pipeline::payload::{InputSlot, OutputSlot, OutputTarget};
use crate::pipeline::port::PortDescriptor;
use crate::store::TableStore;
use std::path::{Path, PathBuf};

/// Context passed to a node for one invocation.
///
/// Array outputs are staged here and only handed to the host by the runner
/// once `run` has returned `Ok`.
pub struct NodeContext<'a> {
    inputs: &'a [InputSlot],
    outputs: &'a [OutputSlot],
    store: &'a dyn TableStore,
    staged: Vec<Option<Vec<u8>>>,
}

impl<'a> NodeContext<'a> {
    pub fn new(inputs: &'a [InputSlot], outputs: &'a [OutputSlot], store: &'a dyn TableStore) -> Self {
        Self {
            inputs,
            outputs,
            store,
            staged: vec![None; outputs.len()],
        }
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Fail with `InputCount` unless at least `required` inputs are bound.
    pub fn require_inputs(&self, node: &str, required: usize) -> Result<()> {
        if self.inputs.len() < required {
            return Err(NiftyError::InputCount {
                node: node.to_string(),
                bound: self.inputs.len(),
                required,
            });
        }
        Ok(())
    }

    pub fn input(&self, index: usize) -> Result<&InputSlot> {
        self.inputs.get(index).ok_or_else(|| {
            NiftyError::Config(format!(
                "input slot {} is not bound ({} bound)",
                index,
                self.inputs.len()
            ))
        })
    }

    /// Decode input `index` as an array.
    pub fn input_array(&self, index: usize) -> Result<DynArray> {
        self.input(index)?.decode()
    }

    /// Store location bound to input `index`.
    pub fn input_store(&self, index: usize) -> Result<&Path> {
        self.input(index)?.payload.store_path()
    }

    pub fn store(&self) -> &dyn TableStore {
        self.store
    }

    /// Whether output slot `index` is bound to anything.
    pub fn output_bound(&self, index: usize) -> bool {
        index < self.outputs.len()
    }

    /// Paths of every output slot bound to a store, in slot order.
    pub fn output_store_paths(&self) -> Vec<PathBuf> {
        self.outputs
            .iter()
            .filter_map(|slot| match &slot.target {
                OutputTarget::Store(path) => Some(path.clone()),
                OutputTarget::Buffer => None,
            })
            .collect()
    }

    /// Stage `array` for buffer output `index`. Unbound slots are skipped.
    pub fn emit(&mut self, index: usize, array: &DynArray) -> Result<()> {
        self.emit_bytes(index, array::encode(array))
    }

    /// Stage raw bytes for buffer output `index`. Unbound slots are skipped.
    pub fn emit_bytes(&mut self, index: usize, bytes: Vec<u8>) -> Result<()> {
        let Some(slot) = self.outputs.get(index) else {
            return Ok(());
        };
        if let OutputTarget::Store(path) = &slot.target {
            return Err(NiftyError::Store(format!(
                "output '{}' is bound to store {}, not a buffer",
                slot.name,
                path.display()
            )));
        }
        self.staged[index] = Some(bytes);
        Ok(())
    }

    /// Staged buffers, one entry per output slot.
    pub fn into_staged(self) -> Vec<Option<Vec<u8>>> {
        self.staged
    }
}

/// Trait for pluggable/user-defined nodes.
pub trait NodePlugin: Send {
    /// Human-readable name of this node.
    fn name(&self) -> &str;

    /// Port descriptors for this node.
    fn ports(&self) -> &[PortDescriptor];

    /// Process one invocation.
    fn run(&mut self, ctx: &mut NodeContext) -> Result<()>;

    /// Called when the host rebinds a config value after construction.
    fn on_config_change(&mut self, key: &str, _value: &ConfigValue) -> Result<()> {
        Err(NiftyError::Config(format!(
            "{} has no reconfigurable parameter '{}'",
            self.name(),
            key
        )))
    }
}

/// Enum dispatch for built-in nodes.
pub enum BuiltinNode {
    MsRead(MsReadNode),
    MsCopyUpdate(MsCopyUpdateNode),
    MsUpdate(MsUpdateNode),
    Gridder(GridderNode),
    Degridder(DegridderNode),
    RoundTrip(RoundTripNode),
    ImagePlot(ImagePlotNode),
}

impl BuiltinNode {
    pub fn name(&self) -> &str {
        match self {
            BuiltinNode::MsRead(n) => n.name(),
            BuiltinNode::MsCopyUpdate(n) => n.name(),
            BuiltinNode::MsUpdate(n) => n.name(),
            BuiltinNode::Gridder(n) => n.name(),
            BuiltinNode::Degridder(n) => n.name(),
            BuiltinNode::RoundTrip(n) => n.name(),
            BuiltinNode::ImagePlot(n) => n.name(),
        }
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        match self {
            BuiltinNode::MsRead(n) => n.ports(),
            BuiltinNode::MsCopyUpdate(n) => n.ports(),
            BuiltinNode::MsUpdate(n) => n.ports(),
            BuiltinNode::Gridder(n) => n.ports(),
            BuiltinNode::Degridder(n) => n.ports(),
            BuiltinNode::RoundTrip(n) => n.ports(),
            BuiltinNode::ImagePlot(n) => n.ports(),
        }
    }

    pub fn run(&mut self, ctx: &mut NodeContext) -> Result<()> {
        match self {
            BuiltinNode::MsRead(n) => n.run(ctx),
            BuiltinNode::MsCopyUpdate(n) => n.run(ctx),
            BuiltinNode::MsUpdate(n) => n.run(ctx),
            BuiltinNode::Gridder(n) => n.run(ctx),
            BuiltinNode::Degridder(n) => n.run(ctx),
            BuiltinNode::RoundTrip(n) => n.run(ctx),
            BuiltinNode::ImagePlot(n) => n.run(ctx),
        }
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) -> Result<()> {
        match self {
            BuiltinNode::MsRead(n) => n.on_config_change(key, value),
            BuiltinNode::MsCopyUpdate(n) => n.on_config_change(key, value),
            BuiltinNode::MsUpdate(n) => n.on_config_change(key, value),
            BuiltinNode::Gridder(n) => n.on_config_change(key, value),
            BuiltinNode::Degridder(n) => n.on_config_change(key, value),
            BuiltinNode::RoundTrip(n) => n.on_config_change(key, value),
            BuiltinNode::ImagePlot(n) => n.on_config_change(key, value),
        }
    }
}

/// Wrapper that holds either a built-in node (enum dispatch) or a plugin (trait object).
pub enum AnyNode {
    Builtin(BuiltinNode),
    Plugin(Box<dyn NodePlugin>),
}

impl AnyNode {
    pub fn name(&self) -> &str {
        match self {
            AnyNode::Builtin(n) => n.name(),
            AnyNode::Plugin(n) => n.name(),
        }
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        match self {
            AnyNode::Builtin(n) => n.ports(),
            AnyNode::Plugin(n) => n.ports(),
        }
    }

    pub fn run(&mut self, ctx: &mut NodeContext) -> Result<()> {
        match self {
            AnyNode::Builtin(n) => n.run(ctx),
            AnyNode::Plugin(n) => n.run(ctx),
        }
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) -> Result<()> {
        match self {
            AnyNode::Builtin(n) => n.on_config_change(key, value),
            AnyNode::Plugin(n) => n.on_config_change(key, value),
        }
    }
}

impl From<BuiltinNode> for AnyNode {
    fn from(node: BuiltinNode) -> Self {
        AnyNode::Builtin(node)
    }
}
