//! Single-threaded direct Fourier kernel.

use super::{DegridGeometry, DegridProblem, GridGeometry, GridProblem, Kernel};
use crate::error::Result;
use ndarray::{Array1, Array2, Zip};
use num_complex::Complex64;

/// Evaluates the transform sums on the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct DirectKernel;

impl DirectKernel {
    pub fn new() -> Self {
        Self
    }
}

impl Kernel for DirectKernel {
    fn grid(
        &self,
        uvw: &Array2<f64>,
        freq: &Array1<f64>,
        vis: &Array2<Complex64>,
        weights: &Array2<f64>,
        geometry: &GridGeometry,
    ) -> Result<Array2<f64>> {
        let problem = GridProblem::new(uvw, freq, vis, weights, geometry)?;
        let mut image = Array2::zeros(problem.shape());
        Zip::indexed(&mut image).for_each(|(ix, iy), px| *px = problem.pixel(ix, iy));
        Ok(image)
    }

    fn degrid(
        &self,
        uvw: &Array2<f64>,
        freq: &Array1<f64>,
        image: &Array2<f64>,
        weights: &Array2<f64>,
        geometry: &DegridGeometry,
    ) -> Result<Array2<Complex64>> {
        let problem = DegridProblem::new(uvw, freq, image, weights, geometry)?;
        let mut vis = Array2::zeros(problem.shape());
        Zip::indexed(&mut vis)
            .and(weights)
            .for_each(|(row, chan), v, &w| *v = problem.sample(row, chan) * w);
        Ok(vis)
    }
}
