//! DegridderNode — dirty image to visibilities ("Dirty2MS").

use super::{layout, rebind};
use crate::config::{ConfigValue, DegridderParams, ParamSet};
use crate::error::Result;
use crate::kernel::Kernel;
use crate::pipeline::node::NodeContext;
use crate::pipeline::port::{PortDescriptor, PortKind};
use tracing::{debug, info};

const NAME: &str = "Dirty2MS";

pub const REQUIRED_INPUTS: usize = 4;

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("uvw", PortKind::Array),
    PortDescriptor::input("freq", PortKind::Array),
    PortDescriptor::input("image", PortKind::Array),
    PortDescriptor::input("weight_spectrum", PortKind::Array),
    PortDescriptor::output("vis", PortKind::Array),
];

/// Degrids an image into visibilities shaped like the weight spectrum.
/// Unset pixel sizes come from the image dimensions.
pub struct DegridderNode {
    params: ParamSet,
    config: DegridderParams,
    kernel: Box<dyn Kernel>,
}

impl DegridderNode {
    pub fn new(params: ParamSet) -> Result<Self> {
        let config = DegridderParams::from_params(&params)?;
        let kernel = config.kernel.build();
        Ok(Self {
            params,
            config,
            kernel,
        })
    }

    /// Build with an explicit kernel instead of the configured one.
    pub fn with_kernel(params: ParamSet, kernel: Box<dyn Kernel>) -> Result<Self> {
        let config = DegridderParams::from_params(&params)?;
        Ok(Self {
            params,
            config,
            kernel,
        })
    }

    pub fn name(&self) -> &str {
        NAME
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    pub fn config(&self) -> &DegridderParams {
        &self.config
    }

    pub fn run(&mut self, ctx: &mut NodeContext) -> Result<()> {
        ctx.require_inputs(NAME, REQUIRED_INPUTS)?;

        let uvw = layout::uvw(ctx.input_array(0)?)?;
        let freq = layout::frequencies(ctx.input_array(1)?)?;
        let image = layout::image(ctx.input_array(2)?)?;
        let weights = layout::weights(ctx.input_array(3)?)?;
        let geometry = self.config.geometry(image.dim())?;

        debug!(
            rows = uvw.nrows(),
            chans = freq.len(),
            image = ?image.dim(),
            pixsize_x = geometry.pixsize_x,
            pixsize_y = geometry.pixsize_y,
            do_wstacking = geometry.do_wstacking,
            kernel = %self.config.kernel,
            "Degridding"
        );
        let vis = self.kernel.degrid(&uvw, &freq, &image, &weights, &geometry)?;
        info!(shape = ?vis.dim(), "Degridded visibilities");

        ctx.emit(0, &vis.into())
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) -> Result<()> {
        let (params, config) = rebind(
            &self.params,
            DegridderParams::SPECS,
            key,
            value,
            DegridderParams::from_params,
        )?;
        self.params = params;
        self.config = config;
        Ok(())
    }
}
