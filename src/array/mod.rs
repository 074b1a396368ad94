//! Typed, dynamically-shaped arrays exchanged between nodes.
//!
//! [`DynArray`] is the one currency every port speaks: the codec produces it
//! from a byte payload, the store extractor produces it from a column, and
//! the orchestrators unwrap it into the concrete `ndarray` layout a kernel
//! expects.
//!
//! # Element types
//!
//! | [`ElementType`] | Rust type | NPY descriptor |
//! |---|---|---|
//! | `Float64` | `f64` | `<f8` |
//! | `Complex128` | `Complex64` | `<c16` |
//! | `Int64` | `i64` | `<i8` |
//! | `Bool` | `bool` | `\|b1` |

pub mod codec;

pub use codec::{decode, encode};

use crate::error::{NiftyError, Result};
use ndarray::{Array, ArrayD, Axis, Dimension, IxDyn, Slice};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Element type of a [`DynArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElementType {
    Float64,
    Complex128,
    Int64,
    Bool,
}

impl ElementType {
    /// Size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            ElementType::Float64 | ElementType::Int64 => 8,
            ElementType::Complex128 => 16,
            ElementType::Bool => 1,
        }
    }

    /// Canonical lowercase name, matching the NumPy dtype name.
    pub fn name(self) -> &'static str {
        match self {
            ElementType::Float64 => "float64",
            ElementType::Complex128 => "complex128",
            ElementType::Int64 => "int64",
            ElementType::Bool => "bool",
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ElementType {
    type Err = NiftyError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "float64" | "f8" | "double" => Ok(ElementType::Float64),
            "complex128" | "c16" | "dcomplex" => Ok(ElementType::Complex128),
            "int64" | "i8" => Ok(ElementType::Int64),
            "bool" | "b1" => Ok(ElementType::Bool),
            other => Err(NiftyError::Config(format!("unknown element type '{}'", other))),
        }
    }
}

/// A dynamically-shaped array of one of the supported element types.
#[derive(Debug, Clone, PartialEq)]
pub enum DynArray {
    Float64(ArrayD<f64>),
    Complex128(ArrayD<Complex64>),
    Int64(ArrayD<i64>),
    Bool(ArrayD<bool>),
}

/// Apply the same expression to whichever concrete array is held.
macro_rules! each_array {
    ($value:expr, $a:ident => $body:expr) => {
        match $value {
            DynArray::Float64($a) => $body,
            DynArray::Complex128($a) => $body,
            DynArray::Int64($a) => $body,
            DynArray::Bool($a) => $body,
        }
    };
}

/// Same as [`each_array!`] but rewraps the result in the same variant.
macro_rules! map_array {
    ($value:expr, $a:ident => $body:expr) => {
        match $value {
            DynArray::Float64($a) => DynArray::Float64($body),
            DynArray::Complex128($a) => DynArray::Complex128($body),
            DynArray::Int64($a) => DynArray::Int64($body),
            DynArray::Bool($a) => DynArray::Bool($body),
        }
    };
}

impl DynArray {
    /// An all-zero (or all-false) array of the given type and shape.
    pub fn zeros(element_type: ElementType, shape: &[usize]) -> Self {
        let dim = IxDyn(shape);
        match element_type {
            ElementType::Float64 => DynArray::Float64(ArrayD::zeros(dim)),
            ElementType::Complex128 => DynArray::Complex128(ArrayD::zeros(dim)),
            ElementType::Int64 => DynArray::Int64(ArrayD::zeros(dim)),
            ElementType::Bool => DynArray::Bool(ArrayD::from_elem(dim, false)),
        }
    }

    pub fn element_type(&self) -> ElementType {
        match self {
            DynArray::Float64(_) => ElementType::Float64,
            DynArray::Complex128(_) => ElementType::Complex128,
            DynArray::Int64(_) => ElementType::Int64,
            DynArray::Bool(_) => ElementType::Bool,
        }
    }

    pub fn shape(&self) -> &[usize] {
        each_array!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Total number of elements.
    pub fn len(&self) -> usize {
        each_array!(self, a => a.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Length of the leading (row) axis, or `None` for a 0-d array.
    pub fn n_rows(&self) -> Option<usize> {
        self.shape().first().copied()
    }

    /// Restrict `axis` to `[start, end)`. The caller validates the bounds.
    pub fn slice_axis(self, axis: usize, start: usize, end: usize) -> Self {
        let slice = Slice::from(start..end);
        map_array!(self, a => a.slice_axis(Axis(axis), slice).to_owned())
    }

    /// Drop every axis of length 1, as NumPy's `squeeze()` does.
    pub fn squeeze(self) -> Self {
        map_array!(self, a => squeeze_array(a))
    }

    /// Compare element bit patterns, so NaN payloads compare equal to
    /// themselves.
    pub fn bit_eq(&self, other: &DynArray) -> bool {
        if self.shape() != other.shape() {
            return false;
        }
        match (self, other) {
            (DynArray::Float64(a), DynArray::Float64(b)) => {
                a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits())
            }
            (DynArray::Complex128(a), DynArray::Complex128(b)) => a
                .iter()
                .zip(b.iter())
                .all(|(x, y)| x.re.to_bits() == y.re.to_bits() && x.im.to_bits() == y.im.to_bits()),
            (DynArray::Int64(a), DynArray::Int64(b)) => a == b,
            (DynArray::Bool(a), DynArray::Bool(b)) => a == b,
            _ => false,
        }
    }

    /// Convert to `to` with NumPy `astype` semantics: complex to real keeps
    /// the real part, bools become 0/1, non-zero becomes `true`, floats
    /// truncate toward zero (saturating) when cast to integers.
    pub fn cast(self, to: ElementType) -> Self {
        if self.element_type() == to {
            return self;
        }
        match (self, to) {
            (DynArray::Float64(a), ElementType::Complex128) => {
                DynArray::Complex128(a.mapv(|v| Complex64::new(v, 0.0)))
            }
            (DynArray::Float64(a), ElementType::Int64) => DynArray::Int64(a.mapv(|v| v as i64)),
            (DynArray::Float64(a), ElementType::Bool) => DynArray::Bool(a.mapv(|v| v != 0.0)),

            (DynArray::Complex128(a), ElementType::Float64) => DynArray::Float64(a.mapv(|v| v.re)),
            (DynArray::Complex128(a), ElementType::Int64) => {
                DynArray::Int64(a.mapv(|v| v.re as i64))
            }
            (DynArray::Complex128(a), ElementType::Bool) => {
                DynArray::Bool(a.mapv(|v| v.re != 0.0 || v.im != 0.0))
            }

            (DynArray::Int64(a), ElementType::Float64) => DynArray::Float64(a.mapv(|v| v as f64)),
            (DynArray::Int64(a), ElementType::Complex128) => {
                DynArray::Complex128(a.mapv(|v| Complex64::new(v as f64, 0.0)))
            }
            (DynArray::Int64(a), ElementType::Bool) => DynArray::Bool(a.mapv(|v| v != 0)),

            (DynArray::Bool(a), ElementType::Float64) => {
                DynArray::Float64(a.mapv(|v| if v { 1.0 } else { 0.0 }))
            }
            (DynArray::Bool(a), ElementType::Complex128) => DynArray::Complex128(
                a.mapv(|v| Complex64::new(if v { 1.0 } else { 0.0 }, 0.0)),
            ),
            (DynArray::Bool(a), ElementType::Int64) => DynArray::Int64(a.mapv(i64::from)),

            (same, _) => same,
        }
    }

    /// Reshape to `shape`, keeping row-major element order.
    pub fn reshape(self, shape: &[usize]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != self.len() {
            return Err(NiftyError::codec(format!(
                "cannot reshape array of {} elements to {:?}",
                self.len(),
                shape
            )));
        }
        Ok(map_array!(self, a => reshape_array(a, shape)?))
    }

    pub fn as_float64(&self) -> Option<&ArrayD<f64>> {
        match self {
            DynArray::Float64(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_complex128(&self) -> Option<&ArrayD<Complex64>> {
        match self {
            DynArray::Complex128(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<&ArrayD<bool>> {
        match self {
            DynArray::Bool(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_int64(&self) -> Option<&ArrayD<i64>> {
        match self {
            DynArray::Int64(a) => Some(a),
            _ => None,
        }
    }

    /// Cast to `f64` and take the array out.
    pub fn into_float64(self) -> ArrayD<f64> {
        match self {
            DynArray::Float64(a) => a,
            DynArray::Complex128(a) => a.mapv(|v| v.re),
            DynArray::Int64(a) => a.mapv(|v| v as f64),
            DynArray::Bool(a) => a.mapv(|v| if v { 1.0 } else { 0.0 }),
        }
    }

    /// Cast to `Complex64` and take the array out.
    pub fn into_complex128(self) -> ArrayD<Complex64> {
        match self {
            DynArray::Complex128(a) => a,
            other => other.into_float64().mapv(|v| Complex64::new(v, 0.0)),
        }
    }

    /// Overwrite rows `[start, start + rows.n_rows())` with `rows`, which
    /// must have the same element type and trailing shape.
    pub fn assign_rows(&mut self, start: usize, rows: &DynArray) -> Result<()> {
        if self.ndim() == 0 || rows.shape().get(1..) != self.shape().get(1..) {
            return Err(NiftyError::Store(format!(
                "cannot assign rows of shape {:?} into {:?}",
                rows.shape(),
                self.shape()
            )));
        }
        let end = start + rows.shape()[0];
        if end > self.shape()[0] {
            return Err(NiftyError::Store(format!(
                "rows {}..{} exceed {} stored rows",
                start,
                end,
                self.shape()[0]
            )));
        }
        let slice = Slice::from(start..end);
        match (self, rows) {
            (DynArray::Float64(a), DynArray::Float64(b)) => {
                a.slice_axis_mut(Axis(0), slice).assign(b)
            }
            (DynArray::Complex128(a), DynArray::Complex128(b)) => {
                a.slice_axis_mut(Axis(0), slice).assign(b)
            }
            (DynArray::Int64(a), DynArray::Int64(b)) => a.slice_axis_mut(Axis(0), slice).assign(b),
            (DynArray::Bool(a), DynArray::Bool(b)) => a.slice_axis_mut(Axis(0), slice).assign(b),
            (a, b) => {
                return Err(NiftyError::Store(format!(
                    "cannot assign {} rows into a {} array",
                    b.element_type(),
                    a.element_type()
                )))
            }
        }
        Ok(())
    }

    /// Replace every element whose `mask` entry is true with zero (or
    /// false). `mask` must broadcast to this array's shape.
    pub fn zero_where(self, mask: &ArrayD<bool>) -> Result<Self> {
        let shape = self.shape().to_vec();
        let mask = mask.broadcast(IxDyn(&shape)).ok_or_else(|| {
            NiftyError::Store(format!(
                "mask of shape {:?} does not broadcast to {:?}",
                mask.shape(),
                shape
            ))
        })?;
        Ok(match self {
            DynArray::Float64(mut a) => {
                a.zip_mut_with(&mask, |v, &m| if m { *v = 0.0 });
                DynArray::Float64(a)
            }
            DynArray::Complex128(mut a) => {
                a.zip_mut_with(&mask, |v, &m| if m { *v = Complex64::new(0.0, 0.0) });
                DynArray::Complex128(a)
            }
            DynArray::Int64(mut a) => {
                a.zip_mut_with(&mask, |v, &m| if m { *v = 0 });
                DynArray::Int64(a)
            }
            DynArray::Bool(mut a) => {
                a.zip_mut_with(&mask, |v, &m| if m { *v = false });
                DynArray::Bool(a)
            }
        })
    }
}

fn squeeze_array<T>(mut a: ArrayD<T>) -> ArrayD<T> {
    for axis in (0..a.ndim()).rev() {
        if a.len_of(Axis(axis)) == 1 {
            a = a.index_axis_move(Axis(axis), 0);
        }
    }
    a
}

fn reshape_array<T: Clone>(a: ArrayD<T>, shape: &[usize]) -> Result<ArrayD<T>> {
    let values: Vec<T> = a.iter().cloned().collect();
    ArrayD::from_shape_vec(IxDyn(shape), values)
        .map_err(|e| NiftyError::codec(format!("reshape to {:?} failed: {}", shape, e)))
}

macro_rules! impl_from_array {
    ($elem:ty, $variant:ident) => {
        impl<D: Dimension> From<Array<$elem, D>> for DynArray {
            fn from(array: Array<$elem, D>) -> Self {
                DynArray::$variant(array.into_dyn())
            }
        }
    };
}

impl_from_array!(f64, Float64);
impl_from_array!(Complex64, Complex128);
impl_from_array!(i64, Int64);
impl_from_array!(bool, Bool);

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2, Array3};

    #[test]
    fn test_squeeze_drops_all_unit_axes() {
        let a = DynArray::from(Array3::<f64>::zeros((5, 1, 1)));
        assert_eq!(a.squeeze().shape(), &[5]);

        let b = DynArray::from(Array3::<f64>::zeros((1, 4, 1)));
        assert_eq!(b.squeeze().shape(), &[4]);
    }

    #[test]
    fn test_squeeze_after_slice_is_strided() {
        let a = Array3::from_shape_fn((3, 2, 4), |(r, c, p)| (r * 100 + c * 10 + p) as f64);
        let sliced = DynArray::from(a).slice_axis(2, 1, 2).squeeze();
        assert_eq!(sliced.shape(), &[3, 2]);
        let values = sliced.as_float64().unwrap();
        assert_eq!(values[[2, 1]], 211.0);
    }

    #[test]
    fn test_cast_semantics() {
        let c = DynArray::from(array![Complex64::new(1.5, -2.0), Complex64::new(0.0, 0.0)]);
        let f = c.clone().cast(ElementType::Float64);
        assert_eq!(f.as_float64().unwrap().as_slice().unwrap(), &[1.5, 0.0]);

        let b = c.cast(ElementType::Bool);
        assert_eq!(b.as_bool().unwrap().as_slice().unwrap(), &[true, false]);

        let i = DynArray::from(array![-2.7, 3.9, f64::NAN]).cast(ElementType::Int64);
        assert_eq!(i.as_int64().unwrap().as_slice().unwrap(), &[-2, 3, 0]);
    }

    #[test]
    fn test_bit_eq_nan() {
        let a = DynArray::from(array![f64::NAN, 1.0]);
        assert_ne!(a, a.clone());
        assert!(a.bit_eq(&a.clone()));
    }

    #[test]
    fn test_reshape() {
        let a = DynArray::from(array![1.0, 2.0, 3.0, 4.0]);
        let r = a.clone().reshape(&[4, 1]).unwrap();
        assert_eq!(r.shape(), &[4, 1]);
        let err = a.reshape(&[3]).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Codec);
    }

    #[test]
    fn test_element_type_parse() {
        assert_eq!("complex128".parse::<ElementType>().unwrap(), ElementType::Complex128);
        assert_eq!("f8".parse::<ElementType>().unwrap(), ElementType::Float64);
        assert!("float32".parse::<ElementType>().is_err());
    }

    #[test]
    fn test_assign_rows() {
        let mut a = DynArray::from(Array2::<f64>::zeros((4, 2)));
        a.assign_rows(1, &DynArray::from(array![[1.0, 2.0], [3.0, 4.0]])).unwrap();
        let values = a.as_float64().unwrap();
        assert_eq!(values[[2, 1]], 4.0);
        assert_eq!(values[[3, 0]], 0.0);

        assert!(a.assign_rows(3, &DynArray::from(array![[1.0, 2.0], [3.0, 4.0]])).is_err());
        assert!(a.assign_rows(0, &DynArray::from(array![[true, false]])).is_err());
        assert!(a.assign_rows(0, &DynArray::from(array![[1.0, 2.0, 3.0]])).is_err());
    }

    #[test]
    fn test_zero_where_broadcasts_row_mask() {
        let data = DynArray::from(Array3::from_elem((3, 2, 2), Complex64::new(1.0, 1.0)));
        let mask = array![[[false]], [[true]], [[false]]].into_dyn();
        let masked = data.zero_where(&mask).unwrap();
        let values = masked.as_complex128().unwrap();
        assert_eq!(values[[1, 1, 0]], Complex64::new(0.0, 0.0));
        assert_eq!(values[[2, 0, 1]], Complex64::new(1.0, 1.0));
    }
}
