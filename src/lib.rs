//! # nifty-components: radio interferometry imaging components
//!
//! Components for a dataflow scheduler that move visibility data between
//! measurement sets and gridding kernels. Each component is a node the host
//! invokes once with encoded arrays or store locations bound to its slots.
//!
//! ## Architecture
//!
//! - **Array**: typed n-dimensional arrays and the `.npy` payload codec
//! - **Store**: tabular measurement set access (casacore or NPY tables,
//!   column extraction, updates)
//! - **Kernel**: visibility gridding and degridding behind the `Kernel` trait
//! - **Pipeline**: node types, slot binding and the single-invocation runner
//!
//! ## Example
//!
//! ```ignore
//! use nifty_components::{
//!     config::ConfigValue,
//!     pipeline::{InputSlot, NodeRunner, NodeType, OutputSlot},
//! };
//!
//! let node = NodeType::Ms2Dirty.build([("npix_x", ConfigValue::Int(128))])?;
//! let mut runner = NodeRunner::new(node);
//! let outputs = runner.run(&inputs, &[OutputSlot::buffer("image")])?;
//! ```

pub mod array;
pub mod config;
pub mod error;
pub mod kernel;
pub mod pipeline;
pub mod store;

// Re-export commonly used types
pub use array::{DynArray, ElementType};
pub use config::{ConfigValue, NodeSpec, ParamSet};
pub use error::{NiftyError, Result};
pub use kernel::{Kernel, KernelKind};
pub use pipeline::{NodeRunner, NodeType};
pub use store::{AutoTableStore, NpyTableStore, TableStore};
