//! Slot payloads exchanged with the host.
//!
//! An input slot carries either an encoded array ([`Payload::Bytes`]) or
//! the location of a persistent store ([`Payload::Store`]). An output slot
//! is either a byte buffer the runner fills on success or a store path a
//! node writes to directly.

use crate::array::{self, DynArray};
use crate::error::{NiftyError, Result, ResultExt};
use std::path::{Path, PathBuf};

/// Contents of one input slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// An array in the array codec format.
    Bytes(Vec<u8>),
    /// Path of a tabular store.
    Store(PathBuf),
}

impl Payload {
    pub fn from_array(array: &DynArray) -> Self {
        Payload::Bytes(array::encode(array))
    }

    /// Decode the slot as an array.
    pub fn array(&self) -> Result<DynArray> {
        match self {
            Payload::Bytes(bytes) => array::decode(bytes),
            Payload::Store(path) => Err(NiftyError::codec(format!(
                "expected an array payload, got store {}",
                path.display()
            ))),
        }
    }

    /// The store location held by the slot.
    pub fn store_path(&self) -> Result<&Path> {
        match self {
            Payload::Store(path) => Ok(path),
            Payload::Bytes(bytes) => Err(NiftyError::Store(format!(
                "expected a store location, got {} bytes of data",
                bytes.len()
            ))),
        }
    }
}

/// A bound input slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputSlot {
    pub name: String,
    pub payload: Payload,
}

impl InputSlot {
    pub fn bytes(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            payload: Payload::Bytes(bytes),
        }
    }

    pub fn array(name: impl Into<String>, array: &DynArray) -> Self {
        Self {
            name: name.into(),
            payload: Payload::from_array(array),
        }
    }

    pub fn store(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            payload: Payload::Store(path.into()),
        }
    }

    pub(crate) fn decode(&self) -> Result<DynArray> {
        self.payload
            .array()
            .with_context(|| format!("input '{}'", self.name))
    }
}

/// Where an output slot goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// A byte buffer returned by the runner.
    Buffer,
    /// A store the node writes in place.
    Store(PathBuf),
}

/// A bound output slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSlot {
    pub name: String,
    pub target: OutputTarget,
}

impl OutputSlot {
    pub fn buffer(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target: OutputTarget::Buffer,
        }
    }

    pub fn store(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            target: OutputTarget::Store(path.into()),
        }
    }
}
