//! Measurement set writers ("MSCopyUpdate", "MSUpdate").
//!
//! Input 0 names the store; inputs `1..` are arrays written in order to the
//! columns of [`UPDATE_COLUMNS`].

use super::rebind;
use crate::config::{ConfigValue, MsCopyUpdateParams, ParamSet};
use crate::error::{NiftyError, Result};
use crate::pipeline::node::NodeContext;
use crate::pipeline::port::{PortDescriptor, PortKind};
use crate::store::{duplicate_and_update, update_columns, ColumnUpdate};
use tracing::info;

/// Destination column of each array input, by position after the store.
pub const UPDATE_COLUMNS: &[&str] = &["DATA"];

/// Pair array inputs `1..` with their destination columns.
fn collect_updates(
    ctx: &NodeContext,
    start_row: u64,
    num_rows: Option<u64>,
) -> Result<Vec<ColumnUpdate>> {
    (1..ctx.input_count())
        .map(|index| -> Result<ColumnUpdate> {
            let column = UPDATE_COLUMNS.get(index - 1).ok_or_else(|| {
                NiftyError::Config(format!(
                    "input {} has no destination column (only {} supported)",
                    index,
                    UPDATE_COLUMNS.len()
                ))
            })?;
            Ok(ColumnUpdate::new(*column, ctx.input_array(index)?).at(start_row, num_rows))
        })
        .collect()
}

static COPY_UPDATE_PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("ms", PortKind::Store),
    PortDescriptor::input("vis", PortKind::Array),
    PortDescriptor::output("ms", PortKind::Store),
];

/// Duplicates the input store to every output store, then overwrites rows
/// of each copy.
pub struct MsCopyUpdateNode {
    params: ParamSet,
    config: MsCopyUpdateParams,
}

impl MsCopyUpdateNode {
    const NAME: &'static str = "MSCopyUpdate";

    pub fn new(params: ParamSet) -> Result<Self> {
        let config = MsCopyUpdateParams::from_params(&params)?;
        Ok(Self { params, config })
    }

    pub fn name(&self) -> &str {
        Self::NAME
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        COPY_UPDATE_PORTS
    }

    pub fn config(&self) -> &MsCopyUpdateParams {
        &self.config
    }

    pub fn run(&mut self, ctx: &mut NodeContext) -> Result<()> {
        ctx.require_inputs(Self::NAME, 1)?;
        let source = ctx.input_store(0)?.to_path_buf();
        let updates = collect_updates(ctx, self.config.start_row, self.config.num_rows)?;
        let destinations = ctx.output_store_paths();

        duplicate_and_update(ctx.store(), &source, &destinations, &updates)?;
        info!(
            source = %source.display(),
            copies = destinations.len(),
            columns = updates.len(),
            "Copied and updated measurement set"
        );
        Ok(())
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) -> Result<()> {
        let (params, config) = rebind(
            &self.params,
            MsCopyUpdateParams::SPECS,
            key,
            value,
            MsCopyUpdateParams::from_params,
        )?;
        self.params = params;
        self.config = config;
        Ok(())
    }
}

static UPDATE_PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("ms", PortKind::Store),
    PortDescriptor::input("vis", PortKind::Array),
];

/// Overwrites columns of the input store in place, from row 0.
#[derive(Debug, Default)]
pub struct MsUpdateNode;

impl MsUpdateNode {
    const NAME: &'static str = "MSUpdate";

    pub fn new() -> Self {
        Self
    }

    pub fn name(&self) -> &str {
        Self::NAME
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        UPDATE_PORTS
    }

    pub fn run(&mut self, ctx: &mut NodeContext) -> Result<()> {
        ctx.require_inputs(Self::NAME, 1)?;
        let ms = ctx.input_store(0)?.to_path_buf();
        let updates = collect_updates(ctx, 0, None)?;
        update_columns(ctx.store(), &ms, &updates)?;
        info!(ms = %ms.display(), columns = updates.len(), "Updated measurement set");
        Ok(())
    }

    pub fn on_config_change(&mut self, key: &str, _value: &ConfigValue) -> Result<()> {
        Err(NiftyError::Config(format!(
            "{} has no parameter '{}'",
            Self::NAME,
            key
        )))
    }
}
