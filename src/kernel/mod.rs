//! Numeric transform kernels.
//!
//! The orchestrators never do numerical work themselves. They hand
//! normalized arrays to a [`Kernel`], which is a pure function pair:
//!
//! - `grid`: `(uvw, freq, vis, weights, geometry) -> image`
//! - `degrid`: `(uvw, freq, image, weights, geometry) -> vis`
//!
//! Two implementations share one interface and one set of semantics and are
//! selected at configuration time through [`KernelKind`]:
//!
//! - [`DirectKernel`] (`"cpu"`) evaluates the direct Fourier sum on the
//!   calling thread.
//! - [`ParallelKernel`] (`"parallel"`) evaluates the same sum across the
//!   rayon thread pool.
//!
//! # Conventions
//!
//! Pixel `(ix, iy)` sits at `l = (ix - npix_x / 2) * pixsize_x`,
//! `m = (iy - npix_y / 2) * pixsize_y` with `n = sqrt(1 - l² - m²)`. A
//! sample at row `r`, channel `c` has phase
//! `2π · freq[c] / c0 · (u·l + v·m + w·(n - 1))`; the `w` term only applies
//! with w-stacking, which also divides the image plane by `n`. `degrid` is
//! the exact adjoint of `grid`.

mod direct;
mod parallel;

pub use direct::DirectKernel;
pub use parallel::ParallelKernel;

use crate::error::{NiftyError, Result};
use ndarray::{Array1, Array2, ArrayView2};
use num_complex::Complex64;
use std::f64::consts::TAU;
use std::fmt;
use std::str::FromStr;

/// Speed of light in vacuum \[m/s\].
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Geometry of a gridding call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridGeometry {
    pub npix_x: usize,
    pub npix_y: usize,
    pub pixsize_x: f64,
    pub pixsize_y: f64,
    pub epsilon: f64,
    pub do_wstacking: bool,
}

/// Geometry of a degridding call. The image size comes from the image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DegridGeometry {
    pub pixsize_x: f64,
    pub pixsize_y: f64,
    pub epsilon: f64,
    pub do_wstacking: bool,
}

/// A gridding/degridding implementation.
#[cfg_attr(test, mockall::automock)]
pub trait Kernel: Send + Sync {
    /// Visibilities `(rows, chans)` to a dirty image `(npix_x, npix_y)`.
    fn grid(
        &self,
        uvw: &Array2<f64>,
        freq: &Array1<f64>,
        vis: &Array2<Complex64>,
        weights: &Array2<f64>,
        geometry: &GridGeometry,
    ) -> Result<Array2<f64>>;

    /// Dirty image to visibilities shaped like `weights`.
    fn degrid(
        &self,
        uvw: &Array2<f64>,
        freq: &Array1<f64>,
        image: &Array2<f64>,
        weights: &Array2<f64>,
        geometry: &DegridGeometry,
    ) -> Result<Array2<Complex64>>;
}

/// Which kernel implementation a node uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KernelKind {
    #[default]
    Cpu,
    Parallel,
}

impl KernelKind {
    pub fn name(self) -> &'static str {
        match self {
            KernelKind::Cpu => "cpu",
            KernelKind::Parallel => "parallel",
        }
    }

    /// Instantiate the selected kernel.
    pub fn build(self) -> Box<dyn Kernel> {
        match self {
            KernelKind::Cpu => Box::new(DirectKernel::new()),
            KernelKind::Parallel => Box::new(ParallelKernel::new()),
        }
    }
}

impl fmt::Display for KernelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for KernelKind {
    type Err = NiftyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" | "direct" => Ok(KernelKind::Cpu),
            "parallel" | "gpu" | "cuda" | "accelerator" => Ok(KernelKind::Parallel),
            other => Err(NiftyError::Config(format!("unknown kernel '{}'", other))),
        }
    }
}

// ==================== Shared evaluation ====================

/// Position of one image pixel on the sky.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PixelCoord {
    l: f64,
    m: f64,
    /// `n - 1`, computed without cancellation.
    nm1: f64,
    /// Image-plane scale (`1 / n` with w-stacking, else 1).
    scale: f64,
}

impl PixelCoord {
    fn new(ix: usize, iy: usize, npix_x: usize, npix_y: usize, pixsize_x: f64, pixsize_y: f64, do_wstacking: bool) -> Self {
        let l = (ix as f64 - (npix_x / 2) as f64) * pixsize_x;
        let m = (iy as f64 - (npix_y / 2) as f64) * pixsize_y;
        if do_wstacking {
            let r2 = l * l + m * m;
            let root = (1.0 - r2).sqrt();
            Self {
                l,
                m,
                nm1: -r2 / (root + 1.0),
                scale: 1.0 / root,
            }
        } else {
            Self {
                l,
                m,
                nm1: 0.0,
                scale: 1.0,
            }
        }
    }

    #[inline]
    fn phase(&self, uvw: &[f64; 3], wavenumber: f64) -> f64 {
        TAU * wavenumber * (uvw[0] * self.l + uvw[1] * self.m + uvw[2] * self.nm1)
    }
}

/// Validated, kernel-ready view of a gridding call.
pub(crate) struct GridProblem<'a> {
    uvw: Vec<[f64; 3]>,
    wavenumbers: Vec<f64>,
    vis: ArrayView2<'a, Complex64>,
    weights: ArrayView2<'a, f64>,
    geometry: GridGeometry,
}

impl<'a> GridProblem<'a> {
    pub(crate) fn new(
        uvw: &Array2<f64>,
        freq: &Array1<f64>,
        vis: &'a Array2<Complex64>,
        weights: &'a Array2<f64>,
        geometry: &GridGeometry,
    ) -> Result<Self> {
        check_epsilon(geometry.epsilon)?;
        check_pixsize(geometry.pixsize_x, geometry.pixsize_y)?;
        if geometry.npix_x == 0 || geometry.npix_y == 0 {
            return Err(NiftyError::Kernel(format!(
                "image must have at least one pixel, got {}x{}",
                geometry.npix_x, geometry.npix_y
            )));
        }
        check_sample_shapes(uvw, freq, vis.dim(), "vis")?;
        if weights.dim() != vis.dim() {
            return Err(NiftyError::Kernel(format!(
                "weights shape {:?} does not match vis shape {:?}",
                weights.dim(),
                vis.dim()
            )));
        }
        if geometry.do_wstacking {
            check_inside_unit_circle(geometry.npix_x, geometry.npix_y, geometry.pixsize_x, geometry.pixsize_y)?;
        }
        Ok(Self {
            uvw: uvw_rows(uvw),
            wavenumbers: wavenumbers(freq),
            vis: vis.view(),
            weights: weights.view(),
            geometry: *geometry,
        })
    }

    pub(crate) fn shape(&self) -> (usize, usize) {
        (self.geometry.npix_x, self.geometry.npix_y)
    }

    /// Dirty image value at pixel `(ix, iy)`.
    pub(crate) fn pixel(&self, ix: usize, iy: usize) -> f64 {
        let g = &self.geometry;
        let coord = PixelCoord::new(ix, iy, g.npix_x, g.npix_y, g.pixsize_x, g.pixsize_y, g.do_wstacking);
        let mut sum = 0.0;
        for (row, uvw) in self.uvw.iter().enumerate() {
            for (chan, &k) in self.wavenumbers.iter().enumerate() {
                let weight = self.weights[[row, chan]];
                if weight == 0.0 {
                    continue;
                }
                let v = self.vis[[row, chan]];
                let (sin, cos) = coord.phase(uvw, k).sin_cos();
                sum += weight * (v.re * cos - v.im * sin);
            }
        }
        sum * coord.scale
    }
}

/// Validated, kernel-ready view of a degridding call.
pub(crate) struct DegridProblem {
    uvw: Vec<[f64; 3]>,
    wavenumbers: Vec<f64>,
    /// Non-zero pixels with their image-plane value already scaled.
    pixels: Vec<(PixelCoord, f64)>,
    shape: (usize, usize),
}

impl DegridProblem {
    pub(crate) fn new(
        uvw: &Array2<f64>,
        freq: &Array1<f64>,
        image: &Array2<f64>,
        weights: &Array2<f64>,
        geometry: &DegridGeometry,
    ) -> Result<Self> {
        check_epsilon(geometry.epsilon)?;
        check_pixsize(geometry.pixsize_x, geometry.pixsize_y)?;
        check_sample_shapes(uvw, freq, weights.dim(), "weights")?;
        let (npix_x, npix_y) = image.dim();
        if npix_x == 0 || npix_y == 0 {
            return Err(NiftyError::Kernel(format!(
                "image must have at least one pixel, got {}x{}",
                npix_x, npix_y
            )));
        }
        if geometry.do_wstacking {
            check_inside_unit_circle(npix_x, npix_y, geometry.pixsize_x, geometry.pixsize_y)?;
        }
        let pixels = image
            .indexed_iter()
            .filter(|(_, &value)| value != 0.0)
            .map(|((ix, iy), &value)| {
                let coord = PixelCoord::new(
                    ix,
                    iy,
                    npix_x,
                    npix_y,
                    geometry.pixsize_x,
                    geometry.pixsize_y,
                    geometry.do_wstacking,
                );
                (coord, value * coord.scale)
            })
            .collect();
        Ok(Self {
            uvw: uvw_rows(uvw),
            wavenumbers: wavenumbers(freq),
            pixels,
            shape: weights.dim(),
        })
    }

    pub(crate) fn shape(&self) -> (usize, usize) {
        self.shape
    }

    /// Visibility at `(row, chan)` before weighting.
    pub(crate) fn sample(&self, row: usize, chan: usize) -> Complex64 {
        let uvw = &self.uvw[row];
        let k = self.wavenumbers[chan];
        let mut sum = Complex64::new(0.0, 0.0);
        for (coord, value) in &self.pixels {
            let (sin, cos) = coord.phase(uvw, k).sin_cos();
            sum += Complex64::new(value * cos, -value * sin);
        }
        sum
    }
}

fn uvw_rows(uvw: &Array2<f64>) -> Vec<[f64; 3]> {
    uvw.outer_iter().map(|r| [r[0], r[1], r[2]]).collect()
}

fn wavenumbers(freq: &Array1<f64>) -> Vec<f64> {
    freq.iter().map(|f| f / SPEED_OF_LIGHT).collect()
}

fn check_epsilon(epsilon: f64) -> Result<()> {
    if !(epsilon > 0.0 && epsilon < 1.0) {
        return Err(NiftyError::Kernel(format!(
            "epsilon must lie in (0, 1), got {}",
            epsilon
        )));
    }
    Ok(())
}

fn check_pixsize(x: f64, y: f64) -> Result<()> {
    if !(x.is_finite() && x > 0.0 && y.is_finite() && y > 0.0) {
        return Err(NiftyError::Kernel(format!(
            "pixel sizes must be finite and positive, got ({}, {})",
            x, y
        )));
    }
    Ok(())
}

fn check_sample_shapes(
    uvw: &Array2<f64>,
    freq: &Array1<f64>,
    (rows, chans): (usize, usize),
    what: &str,
) -> Result<()> {
    if uvw.ncols() != 3 {
        return Err(NiftyError::Kernel(format!(
            "uvw must have shape (rows, 3), got {:?}",
            uvw.dim()
        )));
    }
    if uvw.nrows() != rows {
        return Err(NiftyError::Kernel(format!(
            "uvw has {} rows but {} has {}",
            uvw.nrows(),
            what,
            rows
        )));
    }
    if freq.len() != chans {
        return Err(NiftyError::Kernel(format!(
            "freq has {} channels but {} has {}",
            freq.len(),
            what,
            chans
        )));
    }
    Ok(())
}

/// With w-stacking every pixel must lie strictly inside the unit circle.
fn check_inside_unit_circle(npix_x: usize, npix_y: usize, pixsize_x: f64, pixsize_y: f64) -> Result<()> {
    let corner = |npix: usize, pixsize: f64| {
        let half = (npix / 2) as f64;
        let far = (npix - 1) as f64 - half;
        half.max(far) * pixsize
    };
    let l = corner(npix_x, pixsize_x);
    let m = corner(npix_y, pixsize_y);
    if l * l + m * m >= 1.0 {
        return Err(NiftyError::Kernel(format!(
            "field of view ({} x {}) extends beyond the unit circle",
            l, m
        )));
    }
    Ok(())
}
