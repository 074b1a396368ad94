//! casacore table backend.
//!
//! Opens measurement sets through `rubbl_casatables`. casacore hands array
//! cells over in row-major `(chans, pols)` order, which is already the
//! crate's cell layout, so a read of `n` rows is the concatenation of `n`
//! flattened cells. Narrow on-disk types (`Int`, `Float`, `Complex`) are
//! widened on read and narrowed again on write.
//!
//! Subtables live in directories inside the main table, as casacore lays out
//! a measurement set.

use super::{copy_dir_recursive, ColumnDesc, OpenMode, TableHandle, TableStore, CASA_TABLE_MARKER};
use crate::array::{DynArray, ElementType};
use crate::error::{NiftyError, Result};
use ndarray::{ArrayD, IxDyn};
use num_complex::Complex64;
use rubbl_casatables::{CasaDataType, CasaScalarData, GlueDataType, Table, TableOpenMode};
use rubbl_core::ndarray::Array2 as CellArray2;
use rubbl_core::Complex;
use std::cell::RefCell;
use std::fmt::{Debug, Display};
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

fn store_error<E: Display>(what: &str, path: &Path) -> impl FnOnce(E) -> NiftyError {
    let context = format!("{} {}", what, path.display());
    move |e| NiftyError::Store(format!("{}: {}", context, e))
}

fn column_error<E: Display>(column: &str) -> impl FnOnce(E) -> NiftyError + '_ {
    move |e| NiftyError::column(column, e.to_string())
}

/// Store backend over casacore tables.
#[derive(Debug, Default, Clone, Copy)]
pub struct CasaTableStore;

impl CasaTableStore {
    pub fn new() -> Self {
        Self
    }
}

impl TableStore for CasaTableStore {
    fn name(&self) -> &str {
        "casacore"
    }

    fn exists(&self, path: &Path) -> bool {
        path.join(CASA_TABLE_MARKER).is_file()
    }

    fn open(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn TableHandle>> {
        if !self.exists(path) {
            return Err(NiftyError::StoreNotFound {
                path: path.to_path_buf(),
            });
        }
        let casa_mode = match mode {
            OpenMode::ReadOnly => TableOpenMode::Read,
            OpenMode::ReadWrite => TableOpenMode::ReadWrite,
        };
        let mut table = Table::open(path, casa_mode).map_err(store_error("cannot open", path))?;
        let n_rows = table.n_rows();
        let columns = table
            .column_names()
            .map_err(store_error("cannot list columns of", path))?;
        debug!(path = %path.display(), ?mode, rows = n_rows, "Opened casacore table");
        Ok(Box::new(CasaTableHandle {
            path: path.to_path_buf(),
            mode,
            n_rows,
            columns,
            table: RefCell::new(table),
        }))
    }

    /// A closed casacore table is self-contained in its directory, so a
    /// deep copy is a copy of the tree.
    fn duplicate(&self, src: &Path, dst: &Path) -> Result<()> {
        if !self.exists(src) {
            return Err(NiftyError::StoreNotFound {
                path: src.to_path_buf(),
            });
        }
        if dst.exists() {
            return Err(NiftyError::Store(format!(
                "cannot duplicate to {}: destination exists",
                dst.display()
            )));
        }
        // Opening takes casacore's lock, so a table another process is
        // writing is refused rather than copied half-written.
        drop(Table::open(src, TableOpenMode::Read).map_err(store_error("cannot open", src))?);
        copy_dir_recursive(src, dst)?;
        debug!(src = %src.display(), dst = %dst.display(), "Duplicated casacore table");
        Ok(())
    }
}

/// On-disk element types this backend can move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Native {
    Bool,
    Int32,
    Int64,
    Float32,
    Float64,
    Complex64,
    Complex128,
}

impl Native {
    fn from_glue(data_type: GlueDataType) -> Option<Self> {
        match data_type {
            GlueDataType::TpBool => Some(Native::Bool),
            GlueDataType::TpInt => Some(Native::Int32),
            GlueDataType::TpInt64 => Some(Native::Int64),
            GlueDataType::TpFloat => Some(Native::Float32),
            GlueDataType::TpDouble => Some(Native::Float64),
            GlueDataType::TpComplex => Some(Native::Complex64),
            GlueDataType::TpDComplex => Some(Native::Complex128),
            _ => None,
        }
    }

    fn element_type(self) -> ElementType {
        match self {
            Native::Bool => ElementType::Bool,
            Native::Int32 | Native::Int64 => ElementType::Int64,
            Native::Float32 | Native::Float64 => ElementType::Float64,
            Native::Complex64 | Native::Complex128 => ElementType::Complex128,
        }
    }
}

/// Run `$body` with `$t` bound to the Rust type of a [`Native`].
macro_rules! with_native {
    ($native:expr, $t:ident => $body:expr) => {
        match $native {
            Native::Bool => {
                type $t = bool;
                $body
            }
            Native::Int32 => {
                type $t = i32;
                $body
            }
            Native::Int64 => {
                type $t = i64;
                $body
            }
            Native::Float32 => {
                type $t = f32;
                $body
            }
            Native::Float64 => {
                type $t = f64;
                $body
            }
            Native::Complex64 => {
                type $t = Complex<f32>;
                $body
            }
            Native::Complex128 => {
                type $t = Complex<f64>;
                $body
            }
        }
    };
}

/// A casacore scalar type and the crate element type it widens to.
trait CellValue: CasaScalarData + CasaDataType + Copy + Default + Debug + 'static {
    type Elem: Clone;

    fn widen(self) -> Self::Elem;

    fn narrow(value: &Self::Elem) -> Self;

    fn wrap(values: ArrayD<Self::Elem>) -> DynArray;

    /// Elements of `data` in row-major order, if it holds `Self::Elem`.
    fn elements(data: &DynArray) -> Option<Vec<Self::Elem>>;
}

macro_rules! impl_cell_value {
    ($native:ty, $elem:ty, $getter:ident, |$w:ident| $widen:expr, |$n:ident| $narrow:expr) => {
        impl CellValue for $native {
            type Elem = $elem;

            fn widen(self) -> $elem {
                let $w = self;
                $widen
            }

            fn narrow($n: &$elem) -> Self {
                $narrow
            }

            fn wrap(values: ArrayD<$elem>) -> DynArray {
                values.into()
            }

            fn elements(data: &DynArray) -> Option<Vec<$elem>> {
                data.$getter().map(|a| a.iter().cloned().collect())
            }
        }
    };
}

impl_cell_value!(bool, bool, as_bool, |v| v, |v| *v);
impl_cell_value!(i32, i64, as_int64, |v| i64::from(v), |v| *v as i32);
impl_cell_value!(i64, i64, as_int64, |v| v, |v| *v);
impl_cell_value!(f32, f64, as_float64, |v| f64::from(v), |v| *v as f32);
impl_cell_value!(f64, f64, as_float64, |v| v, |v| *v);
impl_cell_value!(
    Complex<f32>,
    Complex64,
    as_complex128,
    |v| Complex64::new(f64::from(v.re), f64::from(v.im)),
    |v| Complex::new(v.re as f32, v.im as f32)
);
impl_cell_value!(
    Complex<f64>,
    Complex64,
    as_complex128,
    |v| Complex64::new(v.re, v.im),
    |v| Complex::new(v.re, v.im)
);

struct CasaTableHandle {
    path: PathBuf,
    mode: OpenMode,
    n_rows: u64,
    columns: Vec<String>,
    table: RefCell<Table>,
}

impl CasaTableHandle {
    /// On-disk type and cell shape of `name`.
    ///
    /// Cell shapes come from the first row, which also covers columns whose
    /// shape is not fixed in the table description. A 2-D read is tried
    /// before falling back to a flat cell.
    fn layout(&self, name: &str) -> Result<(Native, Vec<usize>)> {
        if !self.columns.iter().any(|c| c == name) {
            return Err(NiftyError::column(name, "no such column"));
        }
        let mut table = self.table.borrow_mut();
        let desc = table.get_col_desc(name).map_err(column_error(name))?;
        let native = Native::from_glue(desc.data_type()).ok_or_else(|| {
            NiftyError::column(
                name,
                format!("unsupported casacore type {:?}", desc.data_type()),
            )
        })?;
        if desc.is_scalar() || self.n_rows == 0 {
            return Ok((native, Vec::new()));
        }
        let shape = with_native!(native, T => cell_shape::<T>(&mut table, name)?);
        Ok((native, shape))
    }
}

fn cell_shape<T: CellValue>(table: &mut Table, name: &str) -> Result<Vec<usize>>
where
    CellArray2<T>: CasaDataType,
{
    if let Ok(cell) = table.get_cell::<CellArray2<T>>(name, 0) {
        return Ok(cell.shape().to_vec());
    }
    let flat: Vec<T> = table.get_cell_as_vec(name, 0).map_err(column_error(name))?;
    Ok(vec![flat.len()])
}

fn read_cells<T: CellValue>(
    table: &mut Table,
    name: &str,
    cell_shape: &[usize],
    rows: Range<u64>,
) -> Result<DynArray> {
    let cell_len: usize = cell_shape.iter().product();
    let n = (rows.end - rows.start) as usize;
    let mut values = Vec::with_capacity(n * cell_len);

    if cell_shape.is_empty() {
        let column: Vec<T> = table.get_col_as_vec(name).map_err(column_error(name))?;
        values.extend(
            column[rows.start as usize..rows.end as usize]
                .iter()
                .map(|v| v.widen()),
        );
    } else {
        for row in rows {
            let cell: Vec<T> = table.get_cell_as_vec(name, row).map_err(column_error(name))?;
            if cell.len() != cell_len {
                return Err(NiftyError::column(
                    name,
                    format!(
                        "row {} holds {} values, expected cells of shape {:?}",
                        row,
                        cell.len(),
                        cell_shape
                    ),
                ));
            }
            values.extend(cell.into_iter().map(|v| v.widen()));
        }
    }

    let mut shape = Vec::with_capacity(cell_shape.len() + 1);
    shape.push(n);
    shape.extend_from_slice(cell_shape);
    let values = ArrayD::from_shape_vec(IxDyn(&shape), values).map_err(column_error(name))?;
    Ok(T::wrap(values))
}

fn write_cells<T: CellValue>(
    table: &mut Table,
    name: &str,
    cell_shape: &[usize],
    start: u64,
    data: &DynArray,
) -> Result<()>
where
    Vec<T>: CasaDataType,
    CellArray2<T>: CasaDataType,
{
    let values = T::elements(data).ok_or_else(|| {
        NiftyError::column(name, format!("cannot write {} data", data.element_type()))
    })?;
    let cell_len: usize = cell_shape.iter().product::<usize>().max(1);

    for (offset, chunk) in values.chunks(cell_len).enumerate() {
        let row = start + offset as u64;
        let cell: Vec<T> = chunk.iter().map(T::narrow).collect();
        let written = match *cell_shape {
            [] => table.put_cell(name, row, &cell[0]),
            [_] => table.put_cell(name, row, &cell),
            [chans, pols] => {
                let cell = CellArray2::from_shape_vec((chans, pols), cell)
                    .map_err(column_error(name))?;
                table.put_cell(name, row, &cell)
            }
            _ => {
                return Err(NiftyError::column(
                    name,
                    format!("cannot write cells of rank {}", cell_shape.len()),
                ))
            }
        };
        written.map_err(column_error(name))?;
    }
    Ok(())
}

impl TableHandle for CasaTableHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }

    fn n_rows(&self) -> u64 {
        self.n_rows
    }

    fn column_names(&self) -> Vec<String> {
        self.columns.clone()
    }

    fn column_desc(&self, name: &str) -> Result<ColumnDesc> {
        let (native, cell_shape) = self.layout(name)?;
        Ok(ColumnDesc::new(name, native.element_type(), &cell_shape))
    }

    fn read_rows(&self, name: &str, rows: Range<u64>) -> Result<DynArray> {
        let (native, cell_shape) = self.layout(name)?;
        if rows.start > rows.end || rows.end > self.n_rows {
            return Err(NiftyError::Range {
                start: rows.start,
                end: rows.end,
                n_rows: self.n_rows,
            });
        }
        let mut table = self.table.borrow_mut();
        with_native!(native, T => read_cells::<T>(&mut table, name, &cell_shape, rows))
    }

    fn write_rows(&mut self, name: &str, start: u64, data: &DynArray) -> Result<()> {
        if self.mode == OpenMode::ReadOnly {
            return Err(NiftyError::Store(format!(
                "table {} is open read-only",
                self.path.display()
            )));
        }
        let (native, cell_shape) = self.layout(name)?;
        if data.ndim() == 0 || data.shape()[1..] != cell_shape[..] {
            return Err(NiftyError::column(
                name,
                format!(
                    "cannot write array of shape {:?} into cells of shape {:?}",
                    data.shape(),
                    cell_shape
                ),
            ));
        }
        if data.element_type() != native.element_type() {
            return Err(NiftyError::column(
                name,
                format!(
                    "cannot write {} data into a {} column",
                    data.element_type(),
                    native.element_type()
                ),
            ));
        }
        let end = start + data.shape()[0] as u64;
        if end > self.n_rows {
            return Err(NiftyError::Range {
                start,
                end,
                n_rows: self.n_rows,
            });
        }
        let table = self.table.get_mut();
        with_native!(native, T => write_cells::<T>(table, name, &cell_shape, start, data))?;
        debug!(path = %self.path.display(), column = name, start, end, "Wrote rows");
        Ok(())
    }

    /// Measurement-set subtables sit in a directory named after their
    /// keyword.
    fn linked_table(&self, keyword: &str) -> Result<PathBuf> {
        let subtable = self.path.join(keyword);
        if subtable.join(CASA_TABLE_MARKER).is_file() {
            Ok(subtable)
        } else {
            Err(NiftyError::column(keyword, "no such table keyword"))
        }
    }
}

impl Drop for CasaTableHandle {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "Closed casacore table");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rubbl_casatables::{TableCreateMode, TableDesc, TableDescCreateMode};
    use tempfile::TempDir;

    /// Three rows of UVW, two-channel two-pol single precision DATA and
    /// ANTENNA1, with a SPECTRAL_WINDOW subtable.
    fn sample_ms(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("sample.ms");

        let mut desc = TableDesc::new("", TableDescCreateMode::TDM_SCRATCH).unwrap();
        desc.add_array_column(GlueDataType::TpDouble, "UVW", None, Some(&[3]), false, false)
            .unwrap();
        desc.add_array_column(GlueDataType::TpComplex, "DATA", None, Some(&[2, 2]), false, false)
            .unwrap();
        desc.add_scalar_column(GlueDataType::TpInt, "ANTENNA1", None, false, false)
            .unwrap();
        let mut table = Table::new(path.clone(), desc, 3, TableCreateMode::New).unwrap();
        for row in 0..3u64 {
            let r = row as f32;
            table
                .put_cell("UVW", row, &vec![row as f64, 0.0, 1.0])
                .unwrap();
            table.put_cell("ANTENNA1", row, &(row as i32)).unwrap();
            let data = CellArray2::from_shape_fn((2, 2), |(c, p)| {
                Complex::new(r * 10.0 + (c * 2 + p) as f32, -r)
            });
            table.put_cell("DATA", row, &data).unwrap();
        }

        let mut spw_desc = TableDesc::new("", TableDescCreateMode::TDM_SCRATCH).unwrap();
        spw_desc
            .add_array_column(GlueDataType::TpDouble, "CHAN_FREQ", None, Some(&[2]), false, false)
            .unwrap();
        let mut spw = Table::new(path.join("SPECTRAL_WINDOW"), spw_desc, 1, TableCreateMode::New)
            .unwrap();
        spw.put_cell("CHAN_FREQ", 0, &vec![1.0e8, 1.1e8]).unwrap();
        table.put_table_keyword("SPECTRAL_WINDOW", spw).unwrap();
        path
    }

    #[test]
    fn test_open_and_describe() {
        let dir = TempDir::new().unwrap();
        let path = sample_ms(&dir);
        let store = CasaTableStore::new();
        assert!(store.exists(&path));

        let table = store.open(&path, OpenMode::ReadOnly).unwrap();
        assert_eq!(table.n_rows(), 3);
        assert!(table.column_names().contains(&"DATA".to_string()));

        let data = table.column_desc("DATA").unwrap();
        assert_eq!(data.element_type, ElementType::Complex128);
        assert_eq!(data.cell_shape, vec![2, 2]);
        let ant = table.column_desc("ANTENNA1").unwrap();
        assert_eq!(ant.element_type, ElementType::Int64);
        assert!(ant.cell_shape.is_empty());
        assert!(matches!(table.column_desc("FLUX"), Err(NiftyError::Column { .. })));
    }

    #[test]
    fn test_read_rows_widens_cells() {
        let dir = TempDir::new().unwrap();
        let path = sample_ms(&dir);
        let table = CasaTableStore::new().open(&path, OpenMode::ReadOnly).unwrap();

        let data = table.read_rows("DATA", 1..3).unwrap();
        let data = data.as_complex128().unwrap();
        assert_eq!(data.shape(), &[2, 2, 2]);
        assert_eq!(data[[1, 1, 0]], Complex64::new(22.0, -2.0));

        let uvw = table.read_rows("UVW", 0..3).unwrap();
        assert_eq!(uvw.as_float64().unwrap()[[2, 0]], 2.0);

        let ant = table.read_rows("ANTENNA1", 1..3).unwrap();
        assert_eq!(ant.as_int64().unwrap().as_slice().unwrap(), &[1, 2]);

        assert!(matches!(
            table.read_rows("UVW", 2..4),
            Err(NiftyError::Range { n_rows: 3, .. })
        ));
    }

    #[test]
    fn test_write_rows_round_trips_through_casacore() {
        let dir = TempDir::new().unwrap();
        let path = sample_ms(&dir);
        let store = CasaTableStore::new();
        {
            let mut table = store.open(&path, OpenMode::ReadWrite).unwrap();
            let rows = DynArray::from(array![[
                [Complex64::new(1.5, 0.5), Complex64::new(2.0, 0.0)],
                [Complex64::new(0.0, -1.0), Complex64::new(4.0, 4.0)]
            ]]);
            table.write_rows("DATA", 2, &rows).unwrap();
            table
                .write_rows("ANTENNA1", 0, &DynArray::from(array![7i64]))
                .unwrap();
            assert!(matches!(
                table.write_rows("DATA", 3, &rows),
                Err(NiftyError::Range { .. })
            ));
        }
        let table = store.open(&path, OpenMode::ReadOnly).unwrap();
        let data = table.read_rows("DATA", 2..3).unwrap();
        assert_eq!(data.as_complex128().unwrap()[[0, 1, 1]], Complex64::new(4.0, 4.0));
        let ant = table.read_rows("ANTENNA1", 0..1).unwrap();
        assert_eq!(ant.as_int64().unwrap()[[0]], 7);
    }

    #[test]
    fn test_read_only_refuses_writes() {
        let dir = TempDir::new().unwrap();
        let path = sample_ms(&dir);
        let mut table = CasaTableStore::new().open(&path, OpenMode::ReadOnly).unwrap();
        let err = table
            .write_rows("ANTENNA1", 0, &DynArray::from(array![1i64]))
            .unwrap_err();
        assert!(matches!(err, NiftyError::Store(_)));
    }

    #[test]
    fn test_spectral_window_subtable() {
        let dir = TempDir::new().unwrap();
        let path = sample_ms(&dir);
        let store = CasaTableStore::new();
        let table = store.open(&path, OpenMode::ReadOnly).unwrap();
        let spw = store
            .open(&table.linked_table("SPECTRAL_WINDOW").unwrap(), OpenMode::ReadOnly)
            .unwrap();
        let freq = spw.read_rows("CHAN_FREQ", 0..1).unwrap();
        assert_eq!(freq.as_float64().unwrap()[[0, 1]], 1.1e8);
        assert!(table.linked_table("ANTENNA").is_err());
    }

    #[test]
    fn test_duplicate_is_independent() {
        let dir = TempDir::new().unwrap();
        let path = sample_ms(&dir);
        let copy = dir.path().join("copy.ms");
        let store = CasaTableStore::new();
        store.duplicate(&path, &copy).unwrap();
        assert!(store.exists(&copy.join("SPECTRAL_WINDOW")));
        assert!(store.duplicate(&path, &copy).is_err());

        {
            let mut table = store.open(&copy, OpenMode::ReadWrite).unwrap();
            table
                .write_rows("ANTENNA1", 1, &DynArray::from(array![9i64]))
                .unwrap();
        }
        let original = store.open(&path, OpenMode::ReadOnly).unwrap();
        assert_eq!(original.read_rows("ANTENNA1", 1..2).unwrap().as_int64().unwrap()[[0]], 1);
    }
}
