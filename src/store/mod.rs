//! Tabular store backend.
//!
//! Measurement sets are path-addressed tables with named columns, a row
//! count and keyword links to subordinate tables. Nodes never talk to a
//! concrete format: they go through [`TableStore`] to open a
//! [`TableHandle`], read or write row ranges, and drop the handle. Handles
//! are never cached across calls.
//!
//! Two backends ship: `CasaTableStore` reads and writes casacore measurement
//! sets (behind the `casacore` feature), and [`NpyTableStore`] keeps tables
//! as directories of NPY files. [`AutoTableStore`] picks between them from
//! what is on disk. [`extract`] and [`update`] build the column-level
//! operations nodes use on top of the traits.

mod auto;
#[cfg(feature = "casacore")]
mod casa;
pub mod extract;
mod npydir;
pub mod update;

pub use auto::AutoTableStore;
#[cfg(feature = "casacore")]
pub use casa::CasaTableStore;
pub use extract::{extract_column, AxisRange, ColumnRequest, ExtractMode, RowWindow, TableRef};
pub use npydir::{NpyTableStore, TableBuilder};
pub use update::{duplicate_and_update, update_column, update_columns, ColumnUpdate};

use crate::array::{DynArray, ElementType};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::ops::Range;
use std::path::{Path, PathBuf};

/// File present in every casacore table directory.
pub(crate) const CASA_TABLE_MARKER: &str = "table.dat";

/// Access mode of an opened table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    ReadWrite,
}

/// Declared type and per-row cell shape of a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDesc {
    pub name: String,
    pub element_type: ElementType,
    /// Shape of one cell; empty for scalar columns.
    #[serde(default)]
    pub cell_shape: Vec<usize>,
}

impl ColumnDesc {
    pub fn new(name: impl Into<String>, element_type: ElementType, cell_shape: &[usize]) -> Self {
        Self {
            name: name.into(),
            element_type,
            cell_shape: cell_shape.to_vec(),
        }
    }

    /// Full array shape for `n_rows` rows of this column.
    pub fn shape_for(&self, n_rows: usize) -> Vec<usize> {
        let mut shape = Vec::with_capacity(self.cell_shape.len() + 1);
        shape.push(n_rows);
        shape.extend_from_slice(&self.cell_shape);
        shape
    }
}

/// A path-addressed table format.
pub trait TableStore: Send + Sync {
    /// Short backend name for logging.
    fn name(&self) -> &str;

    /// Whether `path` holds a table of this format.
    fn exists(&self, path: &Path) -> bool;

    /// Open the table at `path`. A missing table is `StoreNotFound`.
    fn open(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn TableHandle>>;

    /// Copy the whole table at `src`, subtables included, to `dst`. Fails
    /// if `dst` already exists.
    fn duplicate(&self, src: &Path, dst: &Path) -> Result<()>;
}

/// An open table. Dropping the handle closes it.
pub trait TableHandle {
    fn path(&self) -> &Path;

    fn mode(&self) -> OpenMode;

    fn n_rows(&self) -> u64;

    fn column_names(&self) -> Vec<String>;

    /// Descriptor of `name`, or a `Column` error if it does not exist.
    fn column_desc(&self, name: &str) -> Result<ColumnDesc>;

    /// Read `rows` of column `name` as `(rows.len(), cell_shape...)`.
    fn read_rows(&self, name: &str, rows: Range<u64>) -> Result<DynArray>;

    /// Overwrite rows starting at `start` with `data`, whose element type
    /// must already match the column.
    fn write_rows(&mut self, name: &str, start: u64, data: &DynArray) -> Result<()>;

    /// Location of the subordinate table named by keyword `keyword`.
    fn linked_table(&self, keyword: &str) -> Result<PathBuf>;
}

/// Copy a table directory tree. Both backends keep a table, subtables
/// included, under one directory.
pub(crate) fn copy_dir_recursive(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
