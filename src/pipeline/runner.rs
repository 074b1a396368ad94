//! Single-invocation runner.
//!
//! The host hands a node its bound slots, the runner calls `run` once and
//! returns the staged buffers. Buffers are only released when the node
//! succeeds, so a failed invocation never exposes partial outputs.

use crate::config::{ConfigValue, InputSpec, NodeSpec, OutputSpec};
use crate::error::{NiftyError, Result, ResultExt};
use crate::pipeline::node::{AnyNode, NodeContext};
use crate::pipeline::node_type::NodeType;
use crate::pipeline::payload::{InputSlot, OutputSlot};
use crate::store::{AutoTableStore, TableStore};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Runs a node against bound slots.
pub struct NodeRunner {
    node: AnyNode,
    store: Box<dyn TableStore>,
}

impl NodeRunner {
    /// Runner whose store picks the backend from each table's format.
    pub fn new(node: impl Into<AnyNode>) -> Self {
        Self::with_store(node, Box::new(AutoTableStore::new()))
    }

    pub fn with_store(node: impl Into<AnyNode>, store: Box<dyn TableStore>) -> Self {
        Self {
            node: node.into(),
            store,
        }
    }

    /// Build the node named by `spec.component` with `spec.params`.
    ///
    /// Accelerator-flavoured names (`Cuda...`) select the parallel kernel
    /// when no kernel is given explicitly.
    pub fn from_spec(spec: &NodeSpec) -> Result<Self> {
        let node_type: NodeType = spec.component.parse()?;
        let mut params = spec.params.clone();
        let has_kernel_param = node_type.specs().iter().any(|s| s.name == "kernel");
        if has_kernel_param
            && NodeType::prefers_parallel_kernel(&spec.component)
            && !params.contains_key("kernel")
        {
            debug!(component = %spec.component, "Selecting parallel kernel");
            params.insert("kernel".to_string(), ConfigValue::String("parallel".to_string()));
        }
        let node = node_type
            .build(params)
            .with_context(|| format!("building {}", spec.component))?;
        Ok(Self::new(node))
    }

    pub fn node(&self) -> &AnyNode {
        &self.node
    }

    /// Forward a config change to the node.
    pub fn set_param(&mut self, key: &str, value: &ConfigValue) -> Result<()> {
        self.node.on_config_change(key, value)
    }

    /// Run once. Returns one entry per output slot: the staged bytes for
    /// buffer outputs the node produced, `None` otherwise.
    pub fn run(&mut self, inputs: &[InputSlot], outputs: &[OutputSlot]) -> Result<Vec<Option<Vec<u8>>>> {
        let name = self.node.name().to_string();
        debug!(node = %name, inputs = inputs.len(), outputs = outputs.len(), "Running node");
        let started = Instant::now();

        let mut ctx = NodeContext::new(inputs, outputs, self.store.as_ref());
        if let Err(e) = self.node.run(&mut ctx) {
            warn!(node = %name, kind = ?e.kind(), "Node failed: {}", e);
            return Err(e);
        }
        let staged = ctx.into_staged();

        info!(
            node = %name,
            produced = staged.iter().filter(|s| s.is_some()).count(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Node finished"
        );
        Ok(staged)
    }
}

/// Bind an input slot from its spec. File inputs are read eagerly.
pub fn input_slot(spec: &InputSpec) -> Result<InputSlot> {
    match (&spec.file, &spec.store) {
        (Some(file), None) => {
            let bytes = std::fs::read(file)
                .map_err(NiftyError::from)
                .with_context(|| format!("reading input '{}' from {}", spec.name, file.display()))?;
            Ok(InputSlot::bytes(&spec.name, bytes))
        }
        (None, Some(store)) => Ok(InputSlot::store(&spec.name, store)),
        _ => Err(NiftyError::Config(format!(
            "input '{}' needs exactly one of 'file' or 'store'",
            spec.name
        ))),
    }
}

/// Bind an output slot from its spec. File outputs become buffers the
/// caller writes after a successful run.
pub fn output_slot(spec: &OutputSpec) -> Result<OutputSlot> {
    match (&spec.file, &spec.store) {
        (Some(_), None) => Ok(OutputSlot::buffer(&spec.name)),
        (None, Some(store)) => Ok(OutputSlot::store(&spec.name, store)),
        _ => Err(NiftyError::Config(format!(
            "output '{}' needs exactly one of 'file' or 'store'",
            spec.name
        ))),
    }
}
