//! Typed per-component parameters.
//!
//! Each struct exposes its `SPECS` table and a `from_params` constructor that
//! turns a bound [`ParamSet`] into validated values.

use super::{
    ParamDefault, ParamKind, ParamSet, ParamSpec, DEFAULT_NPIX, FORWARD_EPSILON,
    ROUND_TRIP_EPSILON,
};
use crate::error::{NiftyError, Result};
use crate::kernel::{DegridGeometry, GridGeometry, KernelKind};

const KERNEL_SPEC: ParamSpec = ParamSpec::new(
    "kernel",
    ParamKind::String,
    ParamDefault::Str("cpu"),
    "Kernel implementation: \"cpu\" or \"parallel\"",
)
.fixed();

const PIXSIZE_X_SPEC: ParamSpec = ParamSpec::new(
    "pixsize_x",
    ParamKind::Float,
    ParamDefault::Unset,
    "Pixel size along x in direction cosines; derived from the image size when unset",
);

const PIXSIZE_Y_SPEC: ParamSpec = ParamSpec::new(
    "pixsize_y",
    ParamKind::Float,
    ParamDefault::Unset,
    "Pixel size along y in direction cosines; derived from the image size when unset",
);

const NPIX_X_SPEC: ParamSpec = ParamSpec::new(
    "npix_x",
    ParamKind::Int,
    ParamDefault::Int(DEFAULT_NPIX),
    "Image width in pixels",
);

const NPIX_Y_SPEC: ParamSpec = ParamSpec::new(
    "npix_y",
    ParamKind::Int,
    ParamDefault::Int(DEFAULT_NPIX),
    "Image height in pixels",
);

fn kernel_kind(params: &ParamSet) -> Result<KernelKind> {
    params.string("kernel").unwrap_or("cpu").parse()
}

fn positive_count(params: &ParamSet, name: &str, default: i64) -> Result<usize> {
    let value = params.int(name).unwrap_or(default);
    if value < 1 {
        return Err(NiftyError::Config(format!(
            "'{}' must be at least 1, got {}",
            name, value
        )));
    }
    usize::try_from(value).map_err(|_| NiftyError::Config(format!("'{}' is too large", name)))
}

fn non_negative(params: &ParamSet, name: &str) -> Result<u64> {
    let value = params.int(name).unwrap_or(0);
    u64::try_from(value)
        .map_err(|_| NiftyError::Config(format!("'{}' must not be negative, got {}", name, value)))
}

/// Optional count where unset or `-1` means "to the end".
fn open_count(params: &ParamSet, name: &str) -> Result<Option<u64>> {
    match params.int(name) {
        None | Some(-1) => Ok(None),
        Some(v) => u64::try_from(v).map(Some).map_err(|_| {
            NiftyError::Config(format!("'{}' must be -1 or non-negative, got {}", name, v))
        }),
    }
}

fn pixsize(params: &ParamSet, name: &str) -> Result<Option<f64>> {
    match params.float(name) {
        None => Ok(None),
        Some(v) if v.is_finite() && v > 0.0 => Ok(Some(v)),
        Some(v) => Err(NiftyError::Config(format!(
            "'{}' must be finite and positive, got {}",
            name, v
        ))),
    }
}

/// Pixel size falling back to one over the pixel count.
fn resolve_pixsize(explicit: Option<f64>, npix: usize) -> f64 {
    explicit.unwrap_or(1.0 / npix as f64)
}

// ==================== Forward ====================

/// Parameters of the forward (visibility to image) transform.
#[derive(Debug, Clone, PartialEq)]
pub struct GridderParams {
    pub npix_x: usize,
    pub npix_y: usize,
    pub do_wstacking: bool,
    pub pixsize_x: Option<f64>,
    pub pixsize_y: Option<f64>,
    pub kernel: KernelKind,
}

impl GridderParams {
    pub const SPECS: &'static [ParamSpec] = &[
        NPIX_X_SPEC,
        NPIX_Y_SPEC,
        ParamSpec::new(
            "do_wstacking",
            ParamKind::Bool,
            ParamDefault::Bool(true),
            "Apply the w-term correction",
        ),
        PIXSIZE_X_SPEC,
        PIXSIZE_Y_SPEC,
        KERNEL_SPEC,
    ];

    pub fn from_params(params: &ParamSet) -> Result<Self> {
        Ok(Self {
            npix_x: positive_count(params, "npix_x", DEFAULT_NPIX)?,
            npix_y: positive_count(params, "npix_y", DEFAULT_NPIX)?,
            do_wstacking: params.bool("do_wstacking").unwrap_or(true),
            pixsize_x: pixsize(params, "pixsize_x")?,
            pixsize_y: pixsize(params, "pixsize_y")?,
            kernel: kernel_kind(params)?,
        })
    }

    /// Kernel geometry with unset pixel sizes derived from `npix`.
    pub fn geometry(&self, epsilon: f64) -> GridGeometry {
        GridGeometry {
            npix_x: self.npix_x,
            npix_y: self.npix_y,
            pixsize_x: resolve_pixsize(self.pixsize_x, self.npix_x),
            pixsize_y: resolve_pixsize(self.pixsize_y, self.npix_y),
            epsilon,
            do_wstacking: self.do_wstacking,
        }
    }

    pub fn forward_geometry(&self) -> GridGeometry {
        self.geometry(FORWARD_EPSILON)
    }
}

// ==================== Inverse ====================

/// Parameters of the inverse (image to visibility) transform.
#[derive(Debug, Clone, PartialEq)]
pub struct DegridderParams {
    pub pixsize_x: Option<f64>,
    pub pixsize_y: Option<f64>,
    pub do_wstacking: bool,
    pub kernel: KernelKind,
}

impl DegridderParams {
    pub const SPECS: &'static [ParamSpec] = &[
        PIXSIZE_X_SPEC,
        PIXSIZE_Y_SPEC,
        ParamSpec::new(
            "do_wstacking",
            ParamKind::Bool,
            ParamDefault::Bool(false),
            "Apply the w-term correction",
        ),
        KERNEL_SPEC,
    ];

    pub fn from_params(params: &ParamSet) -> Result<Self> {
        Ok(Self {
            pixsize_x: pixsize(params, "pixsize_x")?,
            pixsize_y: pixsize(params, "pixsize_y")?,
            do_wstacking: params.bool("do_wstacking").unwrap_or(false),
            kernel: kernel_kind(params)?,
        })
    }

    /// Kernel geometry with unset pixel sizes derived from the image shape.
    pub fn geometry(&self, image_shape: (usize, usize)) -> Result<DegridGeometry> {
        let (nx, ny) = image_shape;
        if nx == 0 || ny == 0 {
            return Err(NiftyError::Kernel(format!(
                "image must have at least one pixel, got {}x{}",
                nx, ny
            )));
        }
        Ok(DegridGeometry {
            pixsize_x: resolve_pixsize(self.pixsize_x, nx),
            pixsize_y: resolve_pixsize(self.pixsize_y, ny),
            epsilon: FORWARD_EPSILON,
            do_wstacking: self.do_wstacking,
        })
    }
}

// ==================== Round trip ====================

/// Parameters of the combined grid/degrid node.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundTripParams {
    pub grid: GridderParams,
    pub polarization: usize,
}

impl RoundTripParams {
    pub const SPECS: &'static [ParamSpec] = &[
        NPIX_X_SPEC,
        NPIX_Y_SPEC,
        ParamSpec::new(
            "do_wstacking",
            ParamKind::Bool,
            ParamDefault::Bool(false),
            "Apply the w-term correction in both directions",
        ),
        PIXSIZE_X_SPEC,
        PIXSIZE_Y_SPEC,
        KERNEL_SPEC,
        ParamSpec::new(
            "polarization",
            ParamKind::Int,
            ParamDefault::Int(0),
            "Polarization plane to transform",
        ),
    ];

    pub fn from_params(params: &ParamSet) -> Result<Self> {
        let polarization = non_negative(params, "polarization")?;
        Ok(Self {
            grid: GridderParams::from_params(params)?,
            polarization: usize::try_from(polarization)
                .map_err(|_| NiftyError::Config("'polarization' is too large".to_string()))?,
        })
    }

    pub fn grid_geometry(&self) -> GridGeometry {
        self.grid.geometry(ROUND_TRIP_EPSILON)
    }

    /// Degridding uses the pixel sizes the image was gridded with.
    pub fn degrid_geometry(&self) -> DegridGeometry {
        let g = self.grid_geometry();
        DegridGeometry {
            pixsize_x: g.pixsize_x,
            pixsize_y: g.pixsize_y,
            epsilon: g.epsilon,
            do_wstacking: g.do_wstacking,
        }
    }
}

// ==================== Measurement set ====================

/// Row and polarization window of an `MSRead` node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsReadParams {
    pub row_start: u64,
    /// Number of rows to read; `None` reads to the end.
    pub row_count: Option<u64>,
    /// Polarization slice bounds; negative values count from the end.
    pub pol_start: i64,
    pub pol_end: Option<i64>,
}

impl MsReadParams {
    pub const SPECS: &'static [ParamSpec] = &[
        ParamSpec::new("row_start", ParamKind::Int, ParamDefault::Int(0), "First row to read"),
        ParamSpec::new(
            "row_end",
            ParamKind::Int,
            ParamDefault::Unset,
            "Number of rows to read; -1 or unset reads to the end",
        ),
        ParamSpec::new(
            "pol_start",
            ParamKind::Int,
            ParamDefault::Int(0),
            "First polarization to keep; negative counts from the end",
        ),
        ParamSpec::new(
            "pol_end",
            ParamKind::Int,
            ParamDefault::Unset,
            "One past the last polarization to keep; negative counts from the end, unset keeps the rest",
        ),
    ];

    pub fn from_params(params: &ParamSet) -> Result<Self> {
        let pol_start = params.int("pol_start").unwrap_or(0);
        let pol_end = params.int("pol_end");
        // Mixed-sign bounds can only be ordered once the axis length is known.
        if let Some(end) = pol_end {
            if (pol_start >= 0) == (end >= 0) && end < pol_start {
                return Err(NiftyError::Config(format!(
                    "pol_end ({}) is before pol_start ({})",
                    end, pol_start
                )));
            }
        }
        Ok(Self {
            row_start: non_negative(params, "row_start")?,
            row_count: open_count(params, "row_end")?,
            pol_start,
            pol_end,
        })
    }
}

/// Target rows of an `MSCopyUpdate` node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsCopyUpdateParams {
    pub start_row: u64,
    /// Defaults to the payload's leading dimension.
    pub num_rows: Option<u64>,
}

impl MsCopyUpdateParams {
    pub const SPECS: &'static [ParamSpec] = &[
        ParamSpec::new(
            "start_row",
            ParamKind::Int,
            ParamDefault::Int(0),
            "First row to overwrite",
        ),
        ParamSpec::new(
            "num_rows",
            ParamKind::Int,
            ParamDefault::Unset,
            "Number of rows to overwrite; defaults to the payload rows",
        ),
    ];

    pub fn from_params(params: &ParamSet) -> Result<Self> {
        Ok(Self {
            start_row: non_negative(params, "start_row")?,
            num_rows: open_count(params, "num_rows")?,
        })
    }
}

/// Rendering options of an `ImagePlot` node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImagePlotParams {
    pub title: String,
}

impl ImagePlotParams {
    pub const SPECS: &'static [ParamSpec] = &[ParamSpec::new(
        "title",
        ParamKind::String,
        ParamDefault::Str("image"),
        "Plot title",
    )];

    pub fn from_params(params: &ParamSet) -> Result<Self> {
        Ok(Self {
            title: params.string("title").unwrap_or("image").to_string(),
        })
    }
}
