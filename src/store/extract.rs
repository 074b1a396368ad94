//! Column extraction.
//!
//! [`extract_column`] reads one column of a table (or of a linked
//! subordinate table) over a row window, optionally zeroes masked samples,
//! slices trailing axes, squeezes unit axes and casts to the requested
//! element type. Every call opens its own read-only handle and drops it
//! before returning, on success or failure.

use super::{OpenMode, TableHandle, TableStore};
use crate::array::{DynArray, ElementType};
use crate::error::{NiftyError, Result, ResultExt};
use ndarray::{ArrayD, IxDyn};
use std::ops::Range;
use std::path::Path;
use tracing::debug;

/// Companion column holding per-sample flags.
pub const FLAG_COLUMN: &str = "FLAG";
pub const ANTENNA1_COLUMN: &str = "ANTENNA1";
pub const ANTENNA2_COLUMN: &str = "ANTENNA2";

/// Which table a column lives in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableRef {
    Main,
    /// A subordinate table whose location is a keyword of the main table.
    Linked(String),
}

/// How samples are filtered on the way out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractMode {
    /// The stored values.
    #[default]
    Raw,
    /// Zero wherever `FLAG` is true.
    MaskedByFlag,
    /// Zero wherever `FLAG` is true or the row correlates an antenna with
    /// itself.
    MaskedByFlagOrAutocorrelation,
}

/// Rows `[start, start + count)`; `count: None` reads to the last row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RowWindow {
    pub start: u64,
    pub count: Option<u64>,
}

impl RowWindow {
    pub fn new(start: u64, count: Option<u64>) -> Self {
        Self { start, count }
    }

    pub fn all() -> Self {
        Self::default()
    }

    /// Concrete row range for a table with `n_rows` rows.
    pub fn resolve(&self, n_rows: u64) -> Result<Range<u64>> {
        let end = match self.count {
            Some(count) => self.start.saturating_add(count),
            None => n_rows.max(self.start),
        };
        if self.start > n_rows || end > n_rows {
            return Err(NiftyError::Range {
                start: self.start,
                end,
                n_rows,
            });
        }
        Ok(self.start..end)
    }
}

/// Half-open range along one trailing axis; `end: None` means the axis end.
///
/// Negative bounds count back from the axis end, so `new(0, Some(-1))`
/// drops the last element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AxisRange {
    pub start: i64,
    pub end: Option<i64>,
}

impl AxisRange {
    pub fn new(start: i64, end: Option<i64>) -> Self {
        Self { start, end }
    }

    pub fn full() -> Self {
        Self::default()
    }

    fn resolve(&self, len: usize) -> Option<Range<usize>> {
        let index = |bound: i64| -> Option<usize> {
            let len = i64::try_from(len).ok()?;
            let bound = if bound < 0 { len + bound } else { bound };
            (0..=len).contains(&bound).then(|| bound as usize)
        };
        let start = index(self.start)?;
        let end = match self.end {
            Some(end) => index(end)?,
            None => len,
        };
        (start <= end).then_some(start..end)
    }
}

/// Everything needed to pull one column out of a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRequest {
    pub table: TableRef,
    pub column: String,
    pub mode: ExtractMode,
    pub element_type: ElementType,
    pub rows: RowWindow,
    /// One entry per axis after the row axis; missing entries keep the
    /// whole axis.
    pub trailing: Vec<AxisRange>,
}

impl ColumnRequest {
    /// Raw read of every row of a main-table column.
    pub fn new(column: impl Into<String>, element_type: ElementType) -> Self {
        Self {
            table: TableRef::Main,
            column: column.into(),
            mode: ExtractMode::Raw,
            element_type,
            rows: RowWindow::all(),
            trailing: Vec::new(),
        }
    }

    pub fn linked(mut self, keyword: impl Into<String>) -> Self {
        self.table = TableRef::Linked(keyword.into());
        self
    }

    pub fn mode(mut self, mode: ExtractMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn rows(mut self, rows: RowWindow) -> Self {
        self.rows = rows;
        self
    }

    pub fn trailing(mut self, trailing: Vec<AxisRange>) -> Self {
        self.trailing = trailing;
        self
    }
}

/// Read a column as described by `request` from the table at `path`.
pub fn extract_column(
    store: &dyn TableStore,
    path: &Path,
    request: &ColumnRequest,
) -> Result<DynArray> {
    let table = open_target(store, path, &request.table)?;
    let rows = request.rows.resolve(table.n_rows())?;
    let data = table
        .read_rows(&request.column, rows.clone())
        .with_context(|| format!("reading {}", request.column))?;

    let data = match request.mode {
        ExtractMode::Raw => data,
        ExtractMode::MaskedByFlag | ExtractMode::MaskedByFlagOrAutocorrelation => {
            let mask = sample_mask(table.as_ref(), &request.column, rows.clone(), data.shape(), request.mode)?;
            data.zero_where(&mask)?
        }
    };
    drop(table);

    let mut data = data;
    for (i, range) in request.trailing.iter().enumerate() {
        let axis = i + 1;
        let len = *data.shape().get(axis).ok_or_else(|| {
            NiftyError::column(
                &request.column,
                format!("no axis {} to slice in shape {:?}", axis, data.shape()),
            )
        })?;
        let bounds = range.resolve(len).ok_or_else(|| {
            NiftyError::column(
                &request.column,
                format!(
                    "slice {}..{:?} is outside axis {} of length {}",
                    range.start, range.end, axis, len
                ),
            )
        })?;
        data = data.slice_axis(axis, bounds.start, bounds.end);
    }

    let data = data.squeeze().cast(request.element_type);
    debug!(
        column = %request.column,
        rows = ?rows,
        mode = ?request.mode,
        shape = ?data.shape(),
        "Extracted column"
    );
    Ok(data)
}

fn open_target(store: &dyn TableStore, path: &Path, target: &TableRef) -> Result<Box<dyn TableHandle>> {
    let main = store.open(path, OpenMode::ReadOnly)?;
    match target {
        TableRef::Main => Ok(main),
        TableRef::Linked(keyword) => {
            let linked = main.linked_table(keyword)?;
            drop(main);
            store.open(&linked, OpenMode::ReadOnly)
        }
    }
}

/// Build a boolean mask shaped like the data: `FLAG` broadcast over the
/// cell, plus autocorrelation rows when requested.
fn sample_mask(
    table: &dyn TableHandle,
    column: &str,
    rows: Range<u64>,
    shape: &[usize],
    mode: ExtractMode,
) -> Result<ArrayD<bool>> {
    let flag = table
        .read_rows(FLAG_COLUMN, rows.clone())
        .context("reading flags")?
        .cast(ElementType::Bool);
    let mut mask = broadcast_flags(column, flag, shape)?;

    if mode == ExtractMode::MaskedByFlagOrAutocorrelation {
        let ant1 = table.read_rows(ANTENNA1_COLUMN, rows.clone())?.cast(ElementType::Int64);
        let ant2 = table.read_rows(ANTENNA2_COLUMN, rows)?.cast(ElementType::Int64);
        let (Some(ant1), Some(ant2)) = (ant1.as_int64(), ant2.as_int64()) else {
            return Err(NiftyError::column(ANTENNA1_COLUMN, "antenna columns are not integer"));
        };
        if ant1.shape() != [shape[0]] || ant2.shape() != [shape[0]] {
            return Err(NiftyError::column(ANTENNA1_COLUMN, "antenna columns must be scalar per row"));
        }
        for (row, (a1, a2)) in ant1.iter().zip(ant2.iter()).enumerate() {
            if a1 == a2 {
                mask.index_axis_mut(ndarray::Axis(0), row).fill(true);
            }
        }
    }
    Ok(mask)
}

fn broadcast_flags(column: &str, flag: DynArray, shape: &[usize]) -> Result<ArrayD<bool>> {
    let flag = match flag {
        DynArray::Bool(f) => f,
        _ => return Err(NiftyError::column(FLAG_COLUMN, "flag column is not boolean")),
    };
    if flag.shape() == shape {
        return Ok(flag);
    }
    // One flag per row applies to the whole cell.
    if flag.shape() == &shape[..1] {
        let mut per_row = vec![1; shape.len()];
        per_row[0] = shape[0];
        let flag = flag
            .into_shape_with_order(IxDyn(&per_row))
            .map_err(|e| NiftyError::column(FLAG_COLUMN, e.to_string()))?;
        return flag
            .broadcast(IxDyn(shape))
            .map(|b| b.to_owned())
            .ok_or_else(|| NiftyError::column(FLAG_COLUMN, "flag broadcast failed"));
    }
    Err(NiftyError::column(
        column,
        format!(
            "flag shape {:?} does not broadcast against data shape {:?}",
            flag.shape(),
            shape
        ),
    ))
}
