//! Backend selection by on-disk format.
//!
//! A casacore table directory carries `table.dat`; an NPY table carries
//! `table.json`. Anything else is handed to the NPY backend, which reports
//! it as missing.

use super::npydir::DESCRIPTOR_FILE;
use super::{NpyTableStore, OpenMode, TableHandle, TableStore, CASA_TABLE_MARKER};
use crate::error::Result;
use std::path::Path;
use tracing::trace;

#[cfg(feature = "casacore")]
use super::CasaTableStore;
#[cfg(not(feature = "casacore"))]
use crate::error::NiftyError;

/// Store that routes each path to the backend owning its format.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoTableStore {
    npy: NpyTableStore,
    #[cfg(feature = "casacore")]
    casa: CasaTableStore,
}

impl AutoTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend for the table at `path`.
    pub fn backend_for(&self, path: &Path) -> Result<&dyn TableStore> {
        if path.join(CASA_TABLE_MARKER).is_file() {
            return self.casa(path);
        }
        trace!(path = %path.display(), "Using npydir backend");
        Ok(&self.npy)
    }

    #[cfg(feature = "casacore")]
    fn casa(&self, path: &Path) -> Result<&dyn TableStore> {
        trace!(path = %path.display(), "Using casacore backend");
        Ok(&self.casa)
    }

    #[cfg(not(feature = "casacore"))]
    fn casa(&self, path: &Path) -> Result<&dyn TableStore> {
        Err(NiftyError::Store(format!(
            "{} is a casacore table; rebuild with the `casacore` feature to open it",
            path.display()
        )))
    }
}

impl TableStore for AutoTableStore {
    fn name(&self) -> &str {
        "auto"
    }

    fn exists(&self, path: &Path) -> bool {
        path.join(DESCRIPTOR_FILE).is_file() || path.join(CASA_TABLE_MARKER).is_file()
    }

    fn open(&self, path: &Path, mode: OpenMode) -> Result<Box<dyn TableHandle>> {
        self.backend_for(path)?.open(path, mode)
    }

    fn duplicate(&self, src: &Path, dst: &Path) -> Result<()> {
        self.backend_for(src)?.duplicate(src, dst)
    }
}
