//! RoundTripNode — grid one polarization, then degrid it back
//! ("NiftyRoundTrip").

use super::{layout, rebind};
use crate::array::DynArray;
use crate::config::{ConfigValue, ParamSet, RoundTripParams};
use crate::error::{NiftyError, Result};
use crate::kernel::Kernel;
use crate::pipeline::node::NodeContext;
use crate::pipeline::port::{PortDescriptor, PortKind};
use ndarray::Axis;
use tracing::{debug, info};

const NAME: &str = "NiftyRoundTrip";

pub const REQUIRED_INPUTS: usize = 4;

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("uvw", PortKind::Array),
    PortDescriptor::input("freq", PortKind::Array),
    PortDescriptor::input("vis", PortKind::Array),
    PortDescriptor::input("weight_spectrum", PortKind::Array),
    PortDescriptor::output("image", PortKind::Array),
    PortDescriptor::output("vis", PortKind::Array),
];

/// Grids the selected polarization of `vis` into a dirty image, degrids
/// that image, and writes the result back into the same polarization of a
/// copy of `vis`. Emits the image and the merged visibilities; neither is
/// committed unless both are produced.
pub struct RoundTripNode {
    params: ParamSet,
    config: RoundTripParams,
    kernel: Box<dyn Kernel>,
}

impl RoundTripNode {
    pub fn new(params: ParamSet) -> Result<Self> {
        let config = RoundTripParams::from_params(&params)?;
        let kernel = config.grid.kernel.build();
        Ok(Self {
            params,
            config,
            kernel,
        })
    }

    /// Build with an explicit kernel instead of the configured one.
    pub fn with_kernel(params: ParamSet, kernel: Box<dyn Kernel>) -> Result<Self> {
        let config = RoundTripParams::from_params(&params)?;
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

    pub fn config(&self) -> &RoundTripParams {
        &self.config
    }

    pub fn run(&mut self, ctx: &mut NodeContext) -> Result<()> {
        ctx.require_inputs(NAME, REQUIRED_INPUTS)?;

        let uvw = layout::uvw(ctx.input_array(0)?)?;
        let freq = layout::frequencies(ctx.input_array(1)?)?;
        let vis_in = ctx.input_array(2)?;
        let input_shape = vis_in.shape().to_vec();
        let mut vis = layout::visibility_cube(vis_in)?;

        let pol = self.config.polarization;
        let n_pols = vis.len_of(Axis(2));
        if pol >= n_pols {
            return Err(NiftyError::Config(format!(
                "polarization {} is outside vis with {} polarizations",
                pol, n_pols
            )));
        }
        let weights = layout::weight_plane(ctx.input_array(3)?, pol)?;
        let plane = vis.index_axis(Axis(2), pol).to_owned();

        let grid_geometry = self.config.grid_geometry();
        debug!(
            rows = uvw.nrows(),
            chans = freq.len(),
            pol,
            n_pols,
            npix_x = grid_geometry.npix_x,
            npix_y = grid_geometry.npix_y,
            kernel = %self.config.grid.kernel,
            "Round trip"
        );
        let image = self
            .kernel
            .grid(&uvw, &freq, &plane, &weights, &grid_geometry)?;
        let degridded = self.kernel.degrid(
            &uvw,
            &freq,
            &image,
            &weights,
            &self.config.degrid_geometry(),
        )?;
        if degridded.dim() != plane.dim() {
            return Err(NiftyError::Kernel(format!(
                "degridded shape {:?} does not match polarization plane {:?}",
                degridded.dim(),
                plane.dim()
            )));
        }
        vis.index_axis_mut(Axis(2), pol).assign(&degridded);
        let merged = DynArray::from(vis).reshape(&input_shape)?;
        info!(image = ?image.dim(), vis = ?input_shape, "Round trip complete");

        ctx.emit(0, &image.into())?;
        ctx.emit(1, &merged)
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) -> Result<()> {
        let (params, config) = rebind(
            &self.params,
            RoundTripParams::SPECS,
            key,
            value,
            RoundTripParams::from_params,
        )?;
        self.params = params;
        self.config = config;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ROUND_TRIP_EPSILON;
    use crate::kernel::MockKernel;
    use crate::pipeline::payload::{InputSlot, OutputSlot};
    use crate::store::NpyTableStore;
    use ndarray::{array, Array2, Array3};
    use num_complex::Complex64;

    fn slots(vis: DynArray) -> Vec<InputSlot> {
        vec![
            InputSlot::array("uvw", &DynArray::from(array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0]])),
            InputSlot::array("freq", &DynArray::from(array![1.0e8, 2.0e8])),
            InputSlot::array("vis", &vis),
            InputSlot::array("weight_spectrum", &DynArray::from(Array2::<f64>::ones((2, 2)))),
        ]
    }

    fn node(polarization: i64, kernel: MockKernel) -> RoundTripNode {
        let params = ParamSet::bind(
            RoundTripParams::SPECS,
            [("polarization", ConfigValue::Int(polarization))],
        )
        .unwrap();
        RoundTripNode::with_kernel(params, Box::new(kernel)).unwrap()
    }

    #[test]
    fn test_merges_selected_polarization() {
        let mut kernel = MockKernel::new();
        kernel
            .expect_grid()
            .withf(|_, _, vis, _, g| {
                g.epsilon == ROUND_TRIP_EPSILON && vis[[1, 1]] == Complex64::new(11.0, 1.0)
            })
            .times(1)
            .returning(|_, _, _, _, g| Ok(Array2::zeros((g.npix_x, g.npix_y))));
        kernel
            .expect_degrid()
            .withf(|_, _, _, _, g| g.epsilon == ROUND_TRIP_EPSILON)
            .times(1)
            .returning(|_, _, _, w, _| Ok(w.mapv(|_| Complex64::new(-1.0, 0.0))));

        let vis = Array3::from_shape_fn((2, 2, 4), |(r, c, p)| {
            Complex64::new((r * 10 + c) as f64, p as f64)
        });
        let inputs = slots(DynArray::from(vis));
        let outputs = vec![OutputSlot::buffer("image"), OutputSlot::buffer("vis")];
        let store = NpyTableStore::new();
        let mut ctx = NodeContext::new(&inputs, &outputs, &store);
        node(1, kernel).run(&mut ctx).unwrap();

        let staged = ctx.into_staged();
        let merged = crate::array::decode(staged[1].as_ref().unwrap()).unwrap();
        assert_eq!(merged.shape(), &[2, 2, 4]);
        let merged = merged.as_complex128().unwrap();
        assert_eq!(merged[[0, 1, 1]], Complex64::new(-1.0, 0.0));
        assert_eq!(merged[[1, 0, 2]], Complex64::new(10.0, 2.0));
    }

    #[test]
    fn test_polarization_out_of_range_emits_nothing() {
        let mut kernel = MockKernel::new();
        kernel.expect_grid().never();
        kernel.expect_degrid().never();

        let inputs = slots(DynArray::from(Array3::<Complex64>::zeros((2, 2, 2))));
        let outputs = vec![OutputSlot::buffer("image"), OutputSlot::buffer("vis")];
        let store = NpyTableStore::new();
        let mut ctx = NodeContext::new(&inputs, &outputs, &store);
        let err = node(2, kernel).run(&mut ctx).unwrap_err();
        assert!(matches!(err, NiftyError::Config(_)));
        assert!(ctx.into_staged().iter().all(Option::is_none));
    }

    #[test]
    fn test_two_dimensional_vis_is_one_polarization() {
        let mut kernel = MockKernel::new();
        kernel
            .expect_grid()
            .returning(|_, _, _, _, g| Ok(Array2::zeros((g.npix_x, g.npix_y))));
        kernel
            .expect_degrid()
            .returning(|_, _, _, w, _| Ok(Array2::zeros(w.dim())));

        let inputs = slots(DynArray::from(Array2::from_elem((2, 2), Complex64::new(3.0, 0.0))));
        let outputs = vec![OutputSlot::buffer("image"), OutputSlot::buffer("vis")];
        let store = NpyTableStore::new();
        let mut ctx = NodeContext::new(&inputs, &outputs, &store);
        node(0, kernel).run(&mut ctx).unwrap();

        let merged = crate::array::decode(ctx.into_staged()[1].as_ref().unwrap()).unwrap();
        assert_eq!(merged.shape(), &[2, 2]);
    }
}
