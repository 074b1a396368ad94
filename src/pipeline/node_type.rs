//! Node type enumeration for dynamic node creation.
//!
//! A host names a component by string; [`NodeType`] resolves that name,
//! exposes the component's parameter table and builds the node.

use crate::config::{
    ConfigValue, DegridderParams, GridderParams, ImagePlotParams, MsCopyUpdateParams,
    MsReadParams, ParamSet, ParamSpec, RoundTripParams,
};
use crate::error::{NiftyError, Result};
use crate::pipeline::node::BuiltinNode;
use crate::pipeline::nodes::{
    DegridderNode, GridderNode, ImagePlotNode, MsCopyUpdateNode, MsReadNode, MsUpdateNode,
    RoundTripNode,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Types of nodes that can be instantiated by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    // Store nodes
    /// Extracts measurement set columns to arrays.
    #[serde(rename = "MSRead", alias = "MSReadApp")]
    MsRead,
    /// Copies a measurement set and overwrites its visibilities.
    #[serde(rename = "MSCopyUpdate", alias = "MSCopyUpdateApp")]
    MsCopyUpdate,
    /// Overwrites the visibilities of a measurement set in place.
    #[serde(rename = "MSUpdate", alias = "MSUpdateApp")]
    MsUpdate,

    // Transform nodes
    /// Grids visibilities into a dirty image.
    #[serde(rename = "MS2Dirty", alias = "MS2DirtyApp", alias = "CudaMS2DirtyApp")]
    Ms2Dirty,
    /// Degrids a dirty image into visibilities.
    #[serde(rename = "Dirty2MS", alias = "Dirty2MSApp", alias = "CudaDirty2MSApp")]
    Dirty2Ms,
    /// Grids then degrids one polarization.
    #[serde(alias = "CudaNiftyApp")]
    NiftyRoundTrip,

    // Sink nodes
    /// Renders an image.
    #[serde(alias = "ImagePlotApp")]
    ImagePlot,
}

impl NodeType {
    /// Get the display name for this node type.
    pub fn display_name(&self) -> &'static str {
        match self {
            NodeType::MsRead => "MSRead",
            NodeType::MsCopyUpdate => "MSCopyUpdate",
            NodeType::MsUpdate => "MSUpdate",
            NodeType::Ms2Dirty => "MS2Dirty",
            NodeType::Dirty2Ms => "Dirty2MS",
            NodeType::NiftyRoundTrip => "NiftyRoundTrip",
            NodeType::ImagePlot => "ImagePlot",
        }
    }

    /// Get all available node types.
    pub fn all() -> &'static [NodeType] {
        &[
            NodeType::MsRead,
            NodeType::MsCopyUpdate,
            NodeType::MsUpdate,
            NodeType::Ms2Dirty,
            NodeType::Dirty2Ms,
            NodeType::NiftyRoundTrip,
            NodeType::ImagePlot,
        ]
    }

    /// Check if this node type reads or writes a store.
    pub fn is_store(&self) -> bool {
        matches!(
            self,
            NodeType::MsRead | NodeType::MsCopyUpdate | NodeType::MsUpdate
        )
    }

    /// Check if this node type runs a numeric kernel.
    pub fn is_transform(&self) -> bool {
        matches!(
            self,
            NodeType::Ms2Dirty | NodeType::Dirty2Ms | NodeType::NiftyRoundTrip
        )
    }

    /// Parameter table of this node type.
    pub fn specs(&self) -> &'static [ParamSpec] {
        match self {
            NodeType::MsRead => MsReadParams::SPECS,
            NodeType::MsCopyUpdate => MsCopyUpdateParams::SPECS,
            NodeType::MsUpdate => &[],
            NodeType::Ms2Dirty => GridderParams::SPECS,
            NodeType::Dirty2Ms => DegridderParams::SPECS,
            NodeType::NiftyRoundTrip => RoundTripParams::SPECS,
            NodeType::ImagePlot => ImagePlotParams::SPECS,
        }
    }

    /// Validate `params` against this type's table and construct the node.
    pub fn build<I, K>(&self, params: I) -> Result<BuiltinNode>
    where
        I: IntoIterator<Item = (K, ConfigValue)>,
        K: Into<String>,
    {
        let params = ParamSet::bind(self.specs(), params)?;
        Ok(match self {
            NodeType::MsRead => BuiltinNode::MsRead(MsReadNode::new(params)?),
            NodeType::MsCopyUpdate => BuiltinNode::MsCopyUpdate(MsCopyUpdateNode::new(params)?),
            NodeType::MsUpdate => BuiltinNode::MsUpdate(MsUpdateNode::new()),
            NodeType::Ms2Dirty => BuiltinNode::Gridder(GridderNode::new(params)?),
            NodeType::Dirty2Ms => BuiltinNode::Degridder(DegridderNode::new(params)?),
            NodeType::NiftyRoundTrip => BuiltinNode::RoundTrip(RoundTripNode::new(params)?),
            NodeType::ImagePlot => BuiltinNode::ImagePlot(ImagePlotNode::new(params)?),
        })
    }

    /// Get a detailed description of what this node does.
    pub fn description(&self) -> &'static str {
        match self {
            NodeType::MsRead =>
                "Reads UVW, frequencies, visibilities, weight spectrum,\n\
                 flags and weights from a measurement set.\n\
                 Flagged and autocorrelation samples read as zero.",

            NodeType::MsCopyUpdate =>
                "Copies a measurement set to every output.\n\
                 Overwrites DATA in each copy from the array inputs.",

            NodeType::MsUpdate =>
                "Overwrites DATA of a measurement set in place.",

            NodeType::Ms2Dirty =>
                "Grids visibilities into a dirty image.\n\
                 Inputs: uvw, freq, vis, weight_spectrum.",

            NodeType::Dirty2Ms =>
                "Degrids a dirty image into visibilities.\n\
                 Inputs: uvw, freq, image, weight_spectrum.",

            NodeType::NiftyRoundTrip =>
                "Grids one polarization, then degrids the image back.\n\
                 Emits the image and the updated visibilities.",

            NodeType::ImagePlot =>
                "Renders an image to a grayscale raster.",
        }
    }

    /// Whether `name` is one of the accelerator-flavoured component names,
    /// which select the parallel kernel unless told otherwise.
    pub fn prefers_parallel_kernel(name: &str) -> bool {
        name.rsplit('.').next().unwrap_or(name).starts_with("Cuda")
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for NodeType {
    type Err = NiftyError;

    fn from_str(s: &str) -> Result<Self> {
        let name = s.rsplit('.').next().unwrap_or(s);
        let node_type = match name {
            "MSRead" | "MSReadApp" | "MsRead" => NodeType::MsRead,
            "MSCopyUpdate" | "MSCopyUpdateApp" | "MsCopyUpdate" => NodeType::MsCopyUpdate,
            "MSUpdate" | "MSUpdateApp" | "MsUpdateApp" | "MsUpdate" => NodeType::MsUpdate,
            "MS2Dirty" | "MS2DirtyApp" | "CudaMS2DirtyApp" => NodeType::Ms2Dirty,
            "Dirty2MS" | "Dirty2MSApp" | "CudaDirty2MSApp" => NodeType::Dirty2Ms,
            "NiftyRoundTrip" | "CudaNiftyApp" => NodeType::NiftyRoundTrip,
            "ImagePlot" | "ImagePlotApp" => NodeType::ImagePlot,
            other => {
                return Err(NiftyError::Config(format!("unknown component '{}'", other)));
            }
        };
        Ok(node_type)
    }
}
