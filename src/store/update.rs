//! Column updates, optionally preceded by duplicating the source store.
//!
//! Updates are broadcast to every destination in order and are not
//! transactional: if destination `k` fails, destinations before `k` keep
//! their copy and their new rows.

use super::{OpenMode, TableStore};
use crate::array::DynArray;
use crate::error::{NiftyError, Result, ResultExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// New contents for a run of rows of one column.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnUpdate {
    pub column: String,
    /// Row-major `(rows, cell...)` values.
    pub data: DynArray,
    pub start_row: u64,
    /// Rows to write; defaults to the leading dimension of `data`.
    pub num_rows: Option<u64>,
}

impl ColumnUpdate {
    pub fn new(column: impl Into<String>, data: DynArray) -> Self {
        Self {
            column: column.into(),
            data,
            start_row: 0,
            num_rows: None,
        }
    }

    pub fn at(mut self, start_row: u64, num_rows: Option<u64>) -> Self {
        self.start_row = start_row;
        self.num_rows = num_rows;
        self
    }
}

/// Write one update into the table at `path`.
///
/// The payload must hold `num_rows` rows (by default its leading axis) of
/// the column's cells. Shapes that match up to unit axes are accepted, so a
/// squeezed extract can be written back even when the row axis itself was
/// squeezed away. Values are cast to the column's type.
pub fn update_column(store: &dyn TableStore, path: &Path, update: &ColumnUpdate) -> Result<()> {
    let mut table = store.open(path, OpenMode::ReadWrite)?;
    let desc = table.column_desc(&update.column)?;

    let payload_rows = update.data.n_rows().ok_or_else(|| {
        NiftyError::column(&update.column, "cannot write a 0-dimensional array")
    })? as u64;
    let count = update.num_rows.unwrap_or(payload_rows);
    let end = update.start_row.saturating_add(count);
    if end > table.n_rows() {
        return Err(NiftyError::Range {
            start: update.start_row,
            end,
            n_rows: table.n_rows(),
        });
    }

    let target_shape = desc.shape_for(count as usize);
    let data = if update.data.shape() == target_shape.as_slice() {
        update.data.clone()
    } else if without_unit_axes(update.data.shape()) == without_unit_axes(&target_shape) {
        update
            .data
            .clone()
            .reshape(&target_shape)
            .map_err(|e| NiftyError::column(&update.column, e.to_string()))?
    } else if payload_rows != count {
        return Err(NiftyError::column(
            &update.column,
            format!("payload has {} rows but {} were requested", payload_rows, count),
        ));
    } else {
        return Err(NiftyError::column(
            &update.column,
            format!(
                "payload shape {:?} is incompatible with cell shape {:?}",
                update.data.shape(),
                desc.cell_shape
            ),
        ));
    };

    table.write_rows(&update.column, update.start_row, &data.cast(desc.element_type))?;
    debug!(
        path = %path.display(),
        column = %update.column,
        start = update.start_row,
        rows = count,
        "Updated column"
    );
    Ok(())
}

/// Apply `updates` in order to the table at `path`.
pub fn update_columns(store: &dyn TableStore, path: &Path, updates: &[ColumnUpdate]) -> Result<()> {
    for update in updates {
        update_column(store, path, update)
            .with_context(|| format!("updating {} in {}", update.column, path.display()))?;
    }
    Ok(())
}

/// Duplicate `source` to every destination, then apply `updates` to each
/// copy. Stops at the first failure.
pub fn duplicate_and_update(
    store: &dyn TableStore,
    source: &Path,
    destinations: &[PathBuf],
    updates: &[ColumnUpdate],
) -> Result<()> {
    for (done, dst) in destinations.iter().enumerate() {
        let result = store
            .duplicate(source, dst)
            .and_then(|()| update_columns(store, dst, updates));
        if let Err(e) = result {
            if done > 0 {
                warn!(
                    failed = %dst.display(),
                    completed = done,
                    total = destinations.len(),
                    "Broadcast update failed; earlier destinations keep their changes"
                );
            }
            return Err(e);
        }
    }
    info!(
        source = %source.display(),
        destinations = destinations.len(),
        updates = updates.len(),
        "Duplicated and updated store"
    );
    Ok(())
}

fn without_unit_axes(shape: &[usize]) -> Vec<usize> {
    shape.iter().copied().filter(|&n| n != 1).collect()
}
