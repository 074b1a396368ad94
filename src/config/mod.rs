//! Configuration for nifty-components
//!
//! The host binds a typed configuration record to every node before its first
//! call. Rather than reflecting attributes at runtime, each component
//! enumerates its options in a static [`ParamSpec`] table (name, kind,
//! default, mutability). [`ParamSet::bind`] validates supplied values against
//! that table, and the per-component structs in [`params`] are built from the
//! validated set.
//!
//! # Node specs
//!
//! A [`NodeSpec`] describes a single node invocation for the `nifty-node`
//! binary. It is read from TOML (or JSON, by extension):
//!
//! ```toml
//! component = "MS2Dirty"
//!
//! [params]
//! npix_x = 128
//! npix_y = 128
//! kernel = "parallel"
//!
//! [[inputs]]
//! name = "uvw"
//! file = "uvw.npy"
//!
//! [[outputs]]
//! name = "image"
//! file = "image.npy"
//! ```

pub mod params;

pub use params::*;

use crate::error::{NiftyError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Default image side length in pixels
pub const DEFAULT_NPIX: i64 = 64;

/// Kernel accuracy used by the forward and inverse orchestrators.
pub const FORWARD_EPSILON: f64 = 1e-6;

/// Kernel accuracy used by the combined forward+inverse orchestrator.
///
/// Deliberately distinct from [`FORWARD_EPSILON`]; neither value is derived
/// from the other.
pub const ROUND_TRIP_EPSILON: f64 = 1e-10;

/// Configuration values that can be bound to nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl ConfigValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ConfigValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConfigValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Floats accept integer literals, so `pixsize_x = 1` binds as `1.0`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            ConfigValue::Float(v) => Some(*v),
            ConfigValue::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ConfigValue::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn kind(&self) -> ParamKind {
        match self {
            ConfigValue::Bool(_) => ParamKind::Bool,
            ConfigValue::Int(_) => ParamKind::Int,
            ConfigValue::Float(_) => ParamKind::Float,
            ConfigValue::String(_) => ParamKind::String,
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigValue::Bool(v) => write!(f, "{}", v),
            ConfigValue::Int(v) => write!(f, "{}", v),
            ConfigValue::Float(v) => write!(f, "{}", v),
            ConfigValue::String(v) => write!(f, "\"{}\"", v),
        }
    }
}

/// Declared type of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Bool,
    Int,
    Float,
    String,
}

impl ParamKind {
    fn accepts(self, value: &ConfigValue) -> bool {
        match self {
            ParamKind::Float => value.as_float().is_some(),
            other => value.kind() == other,
        }
    }
}

/// Default of a parameter. `Unset` parameters have no value until bound,
/// which components read as "derive it".
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamDefault {
    Unset,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(&'static str),
}

impl ParamDefault {
    fn to_value(self) -> Option<ConfigValue> {
        match self {
            ParamDefault::Unset => None,
            ParamDefault::Bool(v) => Some(ConfigValue::Bool(v)),
            ParamDefault::Int(v) => Some(ConfigValue::Int(v)),
            ParamDefault::Float(v) => Some(ConfigValue::Float(v)),
            ParamDefault::Str(v) => Some(ConfigValue::String(v.to_string())),
        }
    }
}

/// Static description of one configuration option.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
    pub default: ParamDefault,
    /// Whether the host may rebind the value after construction.
    pub mutable: bool,
    pub description: &'static str,
}

impl ParamSpec {
    pub const fn new(
        name: &'static str,
        kind: ParamKind,
        default: ParamDefault,
        description: &'static str,
    ) -> Self {
        Self {
            name,
            kind,
            default,
            mutable: true,
            description,
        }
    }

    /// Mark the option as fixed once the node is constructed.
    pub const fn fixed(mut self) -> Self {
        self.mutable = false;
        self
    }
}

/// A configuration record validated against a [`ParamSpec`] table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamSet {
    values: BTreeMap<String, ConfigValue>,
}

impl ParamSet {
    /// Validate `supplied` against `specs` and fill in declared defaults.
    ///
    /// Unknown names and type mismatches are rejected.
    pub fn bind<I, K>(specs: &[ParamSpec], supplied: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, ConfigValue)>,
        K: Into<String>,
    {
        let mut values = BTreeMap::new();
        for spec in specs {
            if let Some(default) = spec.default.to_value() {
                values.insert(spec.name.to_string(), default);
            }
        }
        let mut set = Self { values };
        for (name, value) in supplied {
            set.set_unchecked(specs, name.into(), value)?;
        }
        Ok(set)
    }

    /// Rebind one option after construction. Fixed options are rejected.
    pub fn update(&mut self, specs: &[ParamSpec], name: &str, value: ConfigValue) -> Result<()> {
        let spec = find_spec(specs, name)?;
        if !spec.mutable {
            return Err(NiftyError::Config(format!(
                "parameter '{}' cannot be changed after construction",
                name
            )));
        }
        self.set_unchecked(specs, name.to_string(), value)
    }

    fn set_unchecked(&mut self, specs: &[ParamSpec], name: String, value: ConfigValue) -> Result<()> {
        let spec = find_spec(specs, &name)?;
        if !spec.kind.accepts(&value) {
            return Err(NiftyError::Config(format!(
                "parameter '{}' expects {:?} but got {}",
                name, spec.kind, value
            )));
        }
        let value = match (spec.kind, value) {
            (ParamKind::Float, ConfigValue::Int(v)) => ConfigValue::Float(v as f64),
            (_, v) => v,
        };
        self.values.insert(name, value);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ConfigValue> {
        self.values.get(name)
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        self.get(name).and_then(ConfigValue::as_bool)
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(ConfigValue::as_int)
    }

    pub fn float(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(ConfigValue::as_float)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(ConfigValue::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConfigValue)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }
}

fn find_spec<'a>(specs: &'a [ParamSpec], name: &str) -> Result<&'a ParamSpec> {
    specs
        .iter()
        .find(|s| s.name == name)
        .ok_or_else(|| NiftyError::Config(format!("unknown parameter '{}'", name)))
}

// ==================== Node Spec ====================

/// One input slot of a node invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputSpec {
    pub name: String,
    /// Encoded array payload on disk.
    #[serde(default)]
    pub file: Option<PathBuf>,
    /// Path reference to a table store.
    #[serde(default)]
    pub store: Option<PathBuf>,
}

/// One output slot of a node invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputSpec {
    pub name: String,
    #[serde(default)]
    pub file: Option<PathBuf>,
    #[serde(default)]
    pub store: Option<PathBuf>,
}

/// A single node invocation: which component, how it is configured, and
/// where its slots live.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeSpec {
    pub component: String,
    #[serde(default)]
    pub params: BTreeMap<String, ConfigValue>,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub outputs: Vec<OutputSpec>,
}

impl NodeSpec {
    /// Load a node spec from disk. `.json` files are parsed as JSON,
    /// everything else as TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            NiftyError::Config(format!("Failed to read node spec {:?}: {}", path, e))
        })?;
        let is_json = path.extension().is_some_and(|ext| ext == "json");
        if is_json {
            Ok(serde_json::from_str(&content)?)
        } else {
            Self::from_toml(&content)
        }
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}
