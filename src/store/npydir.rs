//! Directory-of-NPY table backend.
//!
//! A table is a directory holding a `table.json` descriptor and one
//! `<COLUMN>.npy` file per column, each storing the whole column as
//! `(n_rows, cell_shape...)`. Subordinate tables are nested directories
//! named by a keyword in the descriptor.
//!
//! ```text
//! vis.ms/
//!   table.json
//!   UVW.npy
//!   DATA.npy
//!   SPECTRAL_WINDOW/
//!     table.json
//!     CHAN_FREQ.npy
//! ```

use super::{copy_dir_recursive, ColumnDesc, OpenMode, TableHandle, TableStore};
use crate::array::{self, DynArray};
use crate::error::{NiftyError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::debug;

pub(crate) const DESCRIPTOR_FILE: &str = "table.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableDescriptor {
    n_rows: u64,
    columns: Vec<ColumnDesc>,
    /// Keyword to subtable directory, relative to the table.
    #[serde(default)]
    keywords: BTreeMap<String, String>,
}

impl TableDescriptor {
    fn load(dir: &Path) -> Result<Self> {
        let content = fs::read_to_string(dir.join(DESCRIPTOR_FILE))?;
        serde_json::from_str(&content).map_err(|e| {
            NiftyError::Store(format!(
                "corrupt table descriptor in {}: {}",
                dir.display(),
                e
            ))
        })
    }

    fn save(&self, dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        write_atomic(&dir.join(DESCRIPTOR_FILE), content.as_bytes())
    }

    fn column(&self, name: &str) -> Result<&ColumnDesc> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| NiftyError::column(name, "no such column"))
    }
}

/// Store backend keeping each table as a directory of NPY column files.
#[derive(Debug, Default, Clone, Copy)]
pub struct NpyTableStore;

impl NpyTableStore {
    pub fn new() -> Self {
        Self
    }

    /// Write a new table (and its subtables) at `path`, which must not
    /// exist yet.
    pub fn create(&self, path: &Path, table: TableBuilder) -> Result<()> {
        if path.exists() {
            return Err(NiftyError::Store(format!(
                "cannot create table: {} already exists",
                path.display()
            )));
        }
        fs::create_dir_all(path)?;

        let mut descriptor = TableDescriptor {
            n_rows: table.n_rows,
            columns: Vec::with_capacity(table.columns.len()),
            keywords: BTreeMap::new(),
        };
        for (name, data) in table.columns {
            if data.n_rows() != Some(table.n_rows as usize) {
                return Err(NiftyError::column(
                    name,
                    format!(
                        "shape {:?} does not have {} leading rows",
                        data.shape(),
                        table.n_rows
                    ),
                ));
            }
            write_atomic(&column_path(path, &name), &array::encode(&data))?;
            descriptor.columns.push(ColumnDesc::new(name, data.element_type(), &data.shape()[1..]));
        }
        for (keyword, subtable) in table.subtables {
            self.create(&path.join(&keyword), subtable)
                .with_context(|| format!("creating subtable {}", keyword))?;
            descriptor.keywords.insert(keyword.clone(), keyword);
        }
        // The descriptor goes last: a table without one does not exist.
        descriptor.save(path)?;
        debug!(path = %path.display(), rows = descriptor.n_rows, "Created table");
        Ok(())
    }
}

impl TableStore for NpyTableStore {
    fn name(&self) -> &str {
        "npydir"
    }

    fn exists(&self, path: &Path) -> bool {
        path.join(DESCRIPTOR_FILE).is_file()
    }

    fn open(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn TableHandle>> {
        if !self.exists(path) {
            return Err(NiftyError::StoreNotFound {
                path: path.to_path_buf(),
            });
        }
        let descriptor = TableDescriptor::load(path)?;
        debug!(path = %path.display(), ?mode, rows = descriptor.n_rows, "Opened table");
        Ok(Box::new(NpyTableHandle {
            path: path.to_path_buf(),
            mode,
            descriptor,
        }))
    }

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
        copy_dir_recursive(src, dst)?;
        debug!(src = %src.display(), dst = %dst.display(), "Duplicated table");
        Ok(())
    }
}

struct NpyTableHandle {
    path: PathBuf,
    mode: OpenMode,
    descriptor: TableDescriptor,
}

impl NpyTableHandle {
    /// Load a whole column and check it against the descriptor.
    fn load_column(&self, desc: &ColumnDesc) -> Result<DynArray> {
        let file = column_path(&self.path, &desc.name);
        let bytes = fs::read(&file).map_err(|e| {
            NiftyError::Store(format!("cannot read column file {}: {}", file.display(), e))
        })?;
        let data = array::decode(&bytes).with_context(|| format!("column {}", desc.name))?;
        let expected = desc.shape_for(self.descriptor.n_rows as usize);
        if data.shape() != expected.as_slice() || data.element_type() != desc.element_type {
            return Err(NiftyError::Store(format!(
                "column file {} holds {} {:?}, descriptor declares {} {:?}",
                file.display(),
                data.element_type(),
                data.shape(),
                desc.element_type,
                expected
            )));
        }
        Ok(data)
    }
}

impl TableHandle for NpyTableHandle {
    fn path(&self) -> &Path {
        &self.path
    }

    fn mode(&self) -> OpenMode {
        self.mode
    }

    fn n_rows(&self) -> u64 {
        self.descriptor.n_rows
    }

    fn column_names(&self) -> Vec<String> {
        self.descriptor.columns.iter().map(|c| c.name.clone()).collect()
    }

    fn column_desc(&self, name: &str) -> Result<ColumnDesc> {
        self.descriptor.column(name).cloned()
    }

    fn read_rows(&self, name: &str, rows: Range<u64>) -> Result<DynArray> {
        let desc = self.descriptor.column(name)?;
        if rows.start > rows.end || rows.end > self.descriptor.n_rows {
            return Err(NiftyError::Range {
                start: rows.start,
                end: rows.end,
                n_rows: self.descriptor.n_rows,
            });
        }
        let data = self.load_column(desc)?;
        Ok(data.slice_axis(0, rows.start as usize, rows.end as usize))
    }

    fn write_rows(&mut self, name: &str, start: u64, data: &DynArray) -> Result<()> {
        if self.mode == OpenMode::ReadOnly {
            return Err(NiftyError::Store(format!(
                "table {} is open read-only",
                self.path.display()
            )));
        }
        let desc = self.descriptor.column(name)?;
        if data.ndim() == 0 || data.shape()[1..] != desc.cell_shape[..] {
            return Err(NiftyError::column(
                name,
                format!(
                    "cannot write array of shape {:?} into cells of shape {:?}",
                    data.shape(),
                    desc.cell_shape
                ),
            ));
        }
        if data.element_type() != desc.element_type {
            return Err(NiftyError::column(
                name,
                format!(
                    "cannot write {} data into a {} column",
                    data.element_type(),
                    desc.element_type
                ),
            ));
        }
        let end = start + data.shape()[0] as u64;
        if end > self.descriptor.n_rows {
            return Err(NiftyError::Range {
                start,
                end,
                n_rows: self.descriptor.n_rows,
            });
        }
        let mut column = self.load_column(desc)?;
        column.assign_rows(start as usize, data)?;
        write_atomic(&column_path(&self.path, name), &array::encode(&column))?;
        debug!(path = %self.path.display(), column = name, start, end, "Wrote rows");
        Ok(())
    }

    fn linked_table(&self, keyword: &str) -> Result<PathBuf> {
        self.descriptor
            .keywords
            .get(keyword)
            .map(|rel| self.path.join(rel))
            .ok_or_else(|| NiftyError::column(keyword, "no such table keyword"))
    }
}

impl Drop for NpyTableHandle {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "Closed table");
    }
}

/// Columns and subtables of a table to be written by
/// [`NpyTableStore::create`].
#[derive(Debug, Clone)]
pub struct TableBuilder {
    n_rows: u64,
    columns: Vec<(String, DynArray)>,
    subtables: Vec<(String, TableBuilder)>,
}

impl TableBuilder {
    pub fn new(n_rows: u64) -> Self {
        Self {
            n_rows,
            columns: Vec::new(),
            subtables: Vec::new(),
        }
    }

    /// Add a column; `data` holds every row.
    pub fn column(mut self, name: impl Into<String>, data: impl Into<DynArray>) -> Self {
        self.columns.push((name.into(), data.into()));
        self
    }

    /// Add a subordinate table linked under `keyword`.
    pub fn subtable(mut self, keyword: impl Into<String>, table: TableBuilder) -> Self {
        self.subtables.push((keyword.into(), table));
        self
    }
}

fn column_path(dir: &Path, column: &str) -> PathBuf {
    dir.join(format!("{}.npy", column))
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array::ElementType;
    use ndarray::{array, Array1, Array2};
    use tempfile::TempDir;

    fn sample_table(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("sample.ms");
        let table = TableBuilder::new(4)
            .column("TIME", Array1::from_vec(vec![0.0, 1.0, 2.0, 3.0]))
            .column("UVW", Array2::<f64>::from_shape_fn((4, 3), |(r, c)| (r * 3 + c) as f64))
            .subtable(
                "SPECTRAL_WINDOW",
                TableBuilder::new(1).column("CHAN_FREQ", array![[1.0e8, 1.1e8]]),
            );
        NpyTableStore::new().create(&path, table).unwrap();
        path
    }

    #[test]
    fn test_create_and_read() {
        let dir = TempDir::new().unwrap();
        let path = sample_table(&dir);
        let store = NpyTableStore::new();
        assert!(store.exists(&path));

        let table = store.open(&path, OpenMode::ReadOnly).unwrap();
        assert_eq!(table.n_rows(), 4);
        assert_eq!(table.column_names(), vec!["TIME", "UVW"]);
        let desc = table.column_desc("UVW").unwrap();
        assert_eq!(desc.element_type, ElementType::Float64);
        assert_eq!(desc.cell_shape, vec![3]);

        let rows = table.read_rows("UVW", 1..3).unwrap();
        assert_eq!(rows.shape(), &[2, 3]);
        assert_eq!(rows.as_float64().unwrap()[[1, 2]], 8.0);
    }

    #[test]
    fn test_linked_table() {
        let dir = TempDir::new().unwrap();
        let path = sample_table(&dir);
        let store = NpyTableStore::new();
        let table = store.open(&path, OpenMode::ReadOnly).unwrap();
        let spw = table.linked_table("SPECTRAL_WINDOW").unwrap();
        let spw = store.open(&spw, OpenMode::ReadOnly).unwrap();
        assert_eq!(spw.column_desc("CHAN_FREQ").unwrap().cell_shape, vec![2]);
        assert!(table.linked_table("ANTENNA").is_err());
    }

    #[test]
    fn test_missing_table() {
        let dir = TempDir::new().unwrap();
        let err = NpyTableStore::new()
            .open(&dir.path().join("nope.ms"), OpenMode::ReadOnly)
            .err()
            .unwrap();
        assert!(matches!(err, NiftyError::StoreNotFound { .. }));
    }

    #[test]
    fn test_read_range_checks() {
        let dir = TempDir::new().unwrap();
        let path = sample_table(&dir);
        let table = NpyTableStore::new().open(&path, OpenMode::ReadOnly).unwrap();
        assert!(matches!(
            table.read_rows("TIME", 2..5),
            Err(NiftyError::Range { n_rows: 4, .. })
        ));
        assert!(matches!(table.read_rows("FLUX", 0..1), Err(NiftyError::Column { .. })));
        assert_eq!(table.read_rows("TIME", 4..4).unwrap().shape(), &[0]);
    }

    #[test]
    fn test_write_rows() {
        let dir = TempDir::new().unwrap();
        let path = sample_table(&dir);
        let store = NpyTableStore::new();
        {
            let mut table = store.open(&path, OpenMode::ReadWrite).unwrap();
            table
                .write_rows("TIME", 2, &DynArray::from(array![20.0, 30.0]))
                .unwrap();
            assert!(matches!(
                table.write_rows("TIME", 3, &DynArray::from(array![1.0, 2.0])),
                Err(NiftyError::Range { .. })
            ));
            assert!(matches!(
                table.write_rows("UVW", 0, &DynArray::from(array![[1.0, 2.0]])),
                Err(NiftyError::Column { .. })
            ));
        }
        let table = store.open(&path, OpenMode::ReadOnly).unwrap();
        let time = table.read_rows("TIME", 0..4).unwrap();
        assert_eq!(time.as_float64().unwrap().as_slice().unwrap(), &[0.0, 1.0, 20.0, 30.0]);
    }

    #[test]
    fn test_read_only_refuses_writes() {
        let dir = TempDir::new().unwrap();
        let path = sample_table(&dir);
        let mut table = NpyTableStore::new().open(&path, OpenMode::ReadOnly).unwrap();
        let err = table
            .write_rows("TIME", 0, &DynArray::from(array![5.0]))
            .unwrap_err();
        assert!(matches!(err, NiftyError::Store(_)));
    }

    #[test]
    fn test_duplicate() {
        let dir = TempDir::new().unwrap();
        let path = sample_table(&dir);
        let copy = dir.path().join("copy.ms");
        let store = NpyTableStore::new();
        store.duplicate(&path, &copy).unwrap();
        assert!(store.exists(&copy));
        assert!(store.exists(&copy.join("SPECTRAL_WINDOW")));
        assert!(store.duplicate(&path, &copy).is_err());
    }
}
