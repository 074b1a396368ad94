//! GridderNode — visibilities to dirty image ("MS2Dirty").

use super::{layout, rebind};
use crate::config::{ConfigValue, GridderParams, ParamSet};
use crate::error::Result;
use crate::kernel::Kernel;
use crate::pipeline::node::NodeContext;
use crate::pipeline::port::{PortDescriptor, PortKind};
use tracing::{debug, info};

const NAME: &str = "MS2Dirty";

/// Inputs required before anything is read.
pub const REQUIRED_INPUTS: usize = 4;

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("uvw", PortKind::Array),
    PortDescriptor::input("freq", PortKind::Array),
    PortDescriptor::input("vis", PortKind::Array),
    PortDescriptor::input("weight_spectrum", PortKind::Array),
    PortDescriptor::output("image", PortKind::Array),
];

/// Grids `(uvw, freq, vis, weight_spectrum)` into an `(npix_x, npix_y)`
/// dirty image.
pub struct GridderNode {
    params: ParamSet,
    config: GridderParams,
    kernel: Box<dyn Kernel>,
}

impl GridderNode {
    pub fn new(params: ParamSet) -> Result<Self> {
        let config = GridderParams::from_params(&params)?;
        let kernel = config.kernel.build();
        Ok(Self {
            params,
            config,
            kernel,
        })
    }

    /// Build with an explicit kernel instead of the configured one.
    pub fn with_kernel(params: ParamSet, kernel: Box<dyn Kernel>) -> Result<Self> {
        let config = GridderParams::from_params(&params)?;
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

    pub fn config(&self) -> &GridderParams {
        &self.config
    }

    pub fn run(&mut self, ctx: &mut NodeContext) -> Result<()> {
        ctx.require_inputs(NAME, REQUIRED_INPUTS)?;

        let uvw = layout::uvw(ctx.input_array(0)?)?;
        let freq = layout::frequencies(ctx.input_array(1)?)?;
        let vis = layout::visibilities(ctx.input_array(2)?)?;
        let weights = layout::weights(ctx.input_array(3)?)?;
        let geometry = self.config.forward_geometry();

        debug!(
            rows = uvw.nrows(),
            chans = freq.len(),
            npix_x = geometry.npix_x,
            npix_y = geometry.npix_y,
            pixsize_x = geometry.pixsize_x,
            pixsize_y = geometry.pixsize_y,
            do_wstacking = geometry.do_wstacking,
            kernel = %self.config.kernel,
            "Gridding"
        );
        let image = self.kernel.grid(&uvw, &freq, &vis, &weights, &geometry)?;
        info!(shape = ?image.dim(), "Gridded dirty image");

        ctx.emit(0, &image.into())
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) -> Result<()> {
        let (params, config) = rebind(
            &self.params,
            GridderParams::SPECS,
            key,
            value,
            GridderParams::from_params,
        )?;
        self.params = params;
        self.config = config;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FORWARD_EPSILON;
    use crate::kernel::MockKernel;
    use crate::array::DynArray;
    use crate::pipeline::payload::{InputSlot, OutputSlot};
    use crate::store::NpyTableStore;
    use ndarray::{array, Array2};
    use num_complex::Complex64;

    fn inputs() -> Vec<InputSlot> {
        vec![
            InputSlot::array("uvw", &DynArray::from(array![[1.0, 2.0, 3.0]])),
            InputSlot::array("freq", &DynArray::from(array![1.0e8])),
            InputSlot::array("vis", &DynArray::from(array![[Complex64::new(1.0, 0.0)]])),
            InputSlot::array("weight_spectrum", &DynArray::from(array![[1.0]])),
        ]
    }

    #[test]
    fn test_default_geometry_reaches_kernel() {
        let mut kernel = MockKernel::new();
        kernel
            .expect_grid()
            .withf(|_, _, _, _, g| {
                g.npix_x == 64
                    && g.npix_y == 64
                    && g.pixsize_x == 1.0 / 64.0
                    && g.pixsize_y == 1.0 / 64.0
                    && g.epsilon == FORWARD_EPSILON
                    && g.do_wstacking
            })
            .times(1)
            .returning(|_, _, _, _, g| Ok(Array2::zeros((g.npix_x, g.npix_y))));

        let params = ParamSet::bind(GridderParams::SPECS, Vec::<(String, ConfigValue)>::new()).unwrap();
        let mut node = GridderNode::with_kernel(params, Box::new(kernel)).unwrap();

        let inputs = inputs();
        let outputs = vec![OutputSlot::buffer("image")];
        let store = NpyTableStore::new();
        let mut ctx = NodeContext::new(&inputs, &outputs, &store);
        node.run(&mut ctx).unwrap();

        let staged = ctx.into_staged();
        let image = crate::array::decode(staged[0].as_ref().unwrap()).unwrap();
        assert_eq!(image.shape(), &[64, 64]);
    }

    #[test]
    fn test_too_few_inputs_never_calls_kernel() {
        let mut kernel = MockKernel::new();
        kernel.expect_grid().never();

        let params = ParamSet::bind(GridderParams::SPECS, Vec::<(String, ConfigValue)>::new()).unwrap();
        let mut node = GridderNode::with_kernel(params, Box::new(kernel)).unwrap();

        let inputs = inputs()[..2].to_vec();
        let outputs = vec![OutputSlot::buffer("image")];
        let store = NpyTableStore::new();
        let mut ctx = NodeContext::new(&inputs, &outputs, &store);
        let err = node.run(&mut ctx).unwrap_err();
        assert_eq!(
            err.to_string(),
            "MS2Dirty has 2 input slots but requires at least 4"
        );
        assert!(ctx.into_staged()[0].is_none());
    }

    #[test]
    fn test_config_change() {
        let params = ParamSet::bind(GridderParams::SPECS, Vec::<(String, ConfigValue)>::new()).unwrap();
        let mut node = GridderNode::new(params).unwrap();
        node.on_config_change("npix_x", &ConfigValue::Int(128)).unwrap();
        assert_eq!(node.config().npix_x, 128);

        assert!(node.on_config_change("npix_y", &ConfigValue::Int(0)).is_err());
        assert_eq!(node.config().npix_y, 64);
    }
}
