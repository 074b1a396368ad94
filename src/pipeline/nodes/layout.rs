//! Normalizing decoded payloads into the layouts kernels expect.
//!
//! Upstream extraction squeezes unit axes, so a single-channel visibility
//! arrives as `(rows,)` and a single frequency as a 0-d array. These helpers
//! restore the `(rows, chans)` / `(chans,)` layout. Shape problems are
//! reported as kernel errors.

use crate::array::DynArray;
use crate::error::{NiftyError, Result};
use ndarray::{Array1, Array2, Array3, ArrayD, Axis, Ix1, Ix2};
use num_complex::Complex64;

fn shape_error(what: &str, shape: &[usize], expected: &str) -> NiftyError {
    NiftyError::Kernel(format!("{} has shape {:?}, expected {}", what, shape, expected))
}

fn standard<T: Clone>(a: ArrayD<T>) -> ArrayD<T> {
    if a.is_standard_layout() {
        a
    } else {
        a.as_standard_layout().into_owned()
    }
}

/// `(rows, chans)`, accepting `(rows,)` as a single channel.
fn matrix<T: Clone>(a: ArrayD<T>, what: &str) -> Result<Array2<T>> {
    let shape = a.shape().to_vec();
    match shape.len() {
        1 => standard(a)
            .into_shape_with_order((shape[0], 1))
            .map_err(|_| shape_error(what, &shape, "(rows, chans)")),
        2 => a
            .into_dimensionality::<Ix2>()
            .map_err(|_| shape_error(what, &shape, "(rows, chans)")),
        _ => Err(shape_error(what, &shape, "(rows, chans)")),
    }
}

/// `(rows, 3)` baseline coordinates; a single `(3,)` row is accepted.
pub(crate) fn uvw(array: DynArray) -> Result<Array2<f64>> {
    let a = array.into_float64();
    let shape = a.shape().to_vec();
    match shape.as_slice() {
        [3] => standard(a)
            .into_shape_with_order((1, 3))
            .map_err(|_| shape_error("uvw", &shape, "(rows, 3)")),
        [_, 3] => a
            .into_dimensionality::<Ix2>()
            .map_err(|_| shape_error("uvw", &shape, "(rows, 3)")),
        _ => Err(shape_error("uvw", &shape, "(rows, 3)")),
    }
}

/// Channel frequencies; a scalar is one channel.
pub(crate) fn frequencies(array: DynArray) -> Result<Array1<f64>> {
    let a = array.into_float64();
    let shape = a.shape().to_vec();
    match shape.len() {
        0 => Ok(Array1::from_iter(a.iter().copied())),
        1 => a
            .into_dimensionality::<Ix1>()
            .map_err(|_| shape_error("freq", &shape, "(chans,)")),
        _ => Err(shape_error("freq", &shape, "(chans,)")),
    }
}

pub(crate) fn visibilities(array: DynArray) -> Result<Array2<Complex64>> {
    matrix(array.into_complex128(), "vis")
}

pub(crate) fn weights(array: DynArray) -> Result<Array2<f64>> {
    matrix(array.into_float64(), "weight_spectrum")
}

/// A 2-D image.
pub(crate) fn image(array: DynArray) -> Result<Array2<f64>> {
    let a = array.into_float64();
    let shape = a.shape().to_vec();
    a.into_dimensionality::<Ix2>()
        .map_err(|_| shape_error("image", &shape, "(npix_x, npix_y)"))
}

/// `(rows, chans, pols)`; `(rows, chans)` and `(rows,)` carry one
/// polarization (and one channel).
pub(crate) fn visibility_cube(array: DynArray) -> Result<Array3<Complex64>> {
    let a = array.into_complex128();
    let shape = a.shape().to_vec();
    let target = match shape.as_slice() {
        [rows] => (*rows, 1, 1),
        [rows, chans] => (*rows, *chans, 1),
        [rows, chans, pols] => (*rows, *chans, *pols),
        _ => return Err(shape_error("vis", &shape, "(rows, chans, pols)")),
    };
    standard(a)
        .into_shape_with_order(target)
        .map_err(|_| shape_error("vis", &shape, "(rows, chans, pols)"))
}

/// Weights for polarization `pol`: a `(rows, chans, pols)` spectrum is
/// sliced, anything smaller applies to every polarization.
pub(crate) fn weight_plane(array: DynArray, pol: usize) -> Result<Array2<f64>> {
    let a = array.into_float64();
    if a.ndim() == 3 {
        let shape = a.shape().to_vec();
        if pol >= shape[2] {
            return Err(NiftyError::Config(format!(
                "polarization {} is outside weight_spectrum with {} polarizations",
                pol, shape[2]
            )));
        }
        return a
            .index_axis(Axis(2), pol)
            .to_owned()
            .into_dimensionality::<Ix2>()
            .map_err(|_| shape_error("weight_spectrum", &shape, "(rows, chans, pols)"));
    }
    matrix(a, "weight_spectrum")
}
