//! Built-in component implementations.

pub mod degridder;
pub mod gridder;
pub mod image_plot;
mod layout;
pub mod ms_read;
pub mod ms_update;
pub mod round_trip;

pub use degridder::DegridderNode;
pub use gridder::GridderNode;
pub use image_plot::{ImagePlotNode, PgmSink, RasterSink};
pub use ms_read::MsReadNode;
pub use ms_update::{MsCopyUpdateNode, MsUpdateNode};
pub use round_trip::RoundTripNode;

use crate::config::{ConfigValue, ParamSet, ParamSpec};
use crate::error::Result;

/// Apply a config change to a copy of `params` and rebuild the typed
/// parameters from it. Nothing is committed if either step fails.
fn rebind<P>(
    params: &ParamSet,
    specs: &[ParamSpec],
    key: &str,
    value: &ConfigValue,
    build: impl FnOnce(&ParamSet) -> Result<P>,
) -> Result<(ParamSet, P)> {
    let mut updated = params.clone();
    updated.update(specs, key, value.clone())?;
    let typed = build(&updated)?;
    Ok((updated, typed))
}
