//! ImagePlotNode — image to raster ("ImagePlot").

use super::{layout, rebind};
use crate::config::{ConfigValue, ImagePlotParams, ParamSet};
use crate::error::{NiftyError, Result};
use crate::pipeline::node::NodeContext;
use crate::pipeline::port::{PortDescriptor, PortKind};
use ndarray::ArrayView2;
use std::io::Write;
use tracing::debug;

const NAME: &str = "ImagePlot";

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("image", PortKind::Array),
    PortDescriptor::output("png", PortKind::Raster),
];

/// Renders a 2-D image to encoded raster bytes.
pub trait RasterSink: Send {
    /// Short format name, e.g. `"pgm"`.
    fn format(&self) -> &str;

    /// Encode `image` with row `i` of the array as raster row `i`.
    fn render(&self, image: ArrayView2<f64>, title: &str) -> Result<Vec<u8>>;
}

/// Binary portable graymap, 8 bits per pixel, scaled from the image's
/// finite minimum (black) to maximum (white). The title is stored as a
/// header comment.
#[derive(Debug, Default, Clone, Copy)]
pub struct PgmSink;

impl RasterSink for PgmSink {
    fn format(&self) -> &str {
        "pgm"
    }

    fn render(&self, image: ArrayView2<f64>, title: &str) -> Result<Vec<u8>> {
        let (height, width) = image.dim();
        let (min, max) = image
            .iter()
            .filter(|v| v.is_finite())
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            });
        let span = max - min;

        let mut out = Vec::with_capacity(width * height + 64);
        let title: String = title.chars().filter(|c| *c != '\n' && *c != '\r').collect();
        write!(out, "P5\n# {}\n{} {}\n255\n", title, width, height)
            .map_err(|e| NiftyError::Store(format!("raster header: {}", e)))?;
        out.extend(image.iter().map(|&v| {
            if !v.is_finite() || !(span > 0.0) {
                0
            } else {
                (((v - min) / span) * 255.0).round() as u8
            }
        }));
        Ok(out)
    }
}

/// Renders input 0 through a [`RasterSink`] into output 0.
pub struct ImagePlotNode {
    params: ParamSet,
    config: ImagePlotParams,
    sink: Box<dyn RasterSink>,
}

impl ImagePlotNode {
    pub fn new(params: ParamSet) -> Result<Self> {
        Self::with_sink(params, Box::new(PgmSink))
    }

    pub fn with_sink(params: ParamSet, sink: Box<dyn RasterSink>) -> Result<Self> {
        let config = ImagePlotParams::from_params(&params)?;
        Ok(Self {
            params,
            config,
            sink,
        })
    }

    pub fn name(&self) -> &str {
        NAME
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    pub fn run(&mut self, ctx: &mut NodeContext) -> Result<()> {
        ctx.require_inputs(NAME, 1)?;
        let image = layout::image(ctx.input_array(0)?)?;
        let bytes = self.sink.render(image.view(), &self.config.title)?;
        debug!(
            format = self.sink.format(),
            shape = ?image.dim(),
            bytes = bytes.len(),
            "Rendered image"
        );
        ctx.emit_bytes(0, bytes)
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) -> Result<()> {
        let (params, config) = rebind(
            &self.params,
            ImagePlotParams::SPECS,
            key,
            value,
            ImagePlotParams::from_params,
        )?;
        self.params = params;
        self.config = config;
        Ok(())
    }
}
