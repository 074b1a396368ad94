//! Component boundary between the host scheduler and the numeric code.
//!
//! Each component is a node invoked once per run with a set of bound input
//! slots (encoded arrays or store locations) and output slots (buffers or
//! stores). The host builds nodes by name and binds their configuration
//! before the first call.
//!
//! # Architecture
//!
//! ```text
//! [MSRead] ──► uvw, freq, vis, weight_spectrum ──► [MS2Dirty] ──► [ImagePlot]
//!                                             ├──► [NiftyRoundTrip]
//! [MS2Dirty] ──► image ──► [Dirty2MS] ──► vis ──► [MSCopyUpdate]
//! ```
//!
//! # Design
//!
//! - **Enum dispatch** — `BuiltinNode` enum for all built-in nodes.
//! - **Staged outputs** — nodes stage buffers in `NodeContext`, the runner
//!   releases them only on success.
//! - **Store outputs** — written in place by the node and not rolled back.

pub mod node;
pub mod node_type;
pub mod nodes;
pub mod payload;
pub mod port;
pub mod runner;

pub use node::{AnyNode, BuiltinNode, NodeContext, NodePlugin};
pub use node_type::NodeType;
pub use payload::{InputSlot, OutputSlot, OutputTarget, Payload};
pub use port::{PortDescriptor, PortDirection, PortKind};
pub use runner::{input_slot, output_slot, NodeRunner};
