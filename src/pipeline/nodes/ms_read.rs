//! MsReadNode — measurement set columns to arrays ("MSRead").

use super::rebind;
use crate::array::ElementType;
use crate::config::{ConfigValue, MsReadParams, ParamSet};
use crate::error::{Result, ResultExt};
use crate::pipeline::node::NodeContext;
use crate::pipeline::port::{PortDescriptor, PortKind};
use crate::store::{extract_column, AxisRange, ColumnRequest, ExtractMode, RowWindow};
use tracing::{debug, info};

const NAME: &str = "MSRead";

/// Keyword of the main table naming the spectral window subtable.
pub const SPECTRAL_WINDOW: &str = "SPECTRAL_WINDOW";

static PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("ms", PortKind::Store),
    PortDescriptor::output("uvw", PortKind::Array),
    PortDescriptor::output("freq", PortKind::Array),
    PortDescriptor::output("vis", PortKind::Array),
    PortDescriptor::output("weight_spectrum", PortKind::Array),
    PortDescriptor::output("flag", PortKind::Array),
    PortDescriptor::output("weight", PortKind::Array),
];

/// Reads the standard visibility columns of a measurement set over a row
/// and polarization window. Output slot `i` receives the `i`-th column of
/// [`MsReadNode::requests`]; unbound slots are not read.
pub struct MsReadNode {
    params: ParamSet,
    config: MsReadParams,
}

impl MsReadNode {
    pub fn new(params: ParamSet) -> Result<Self> {
        let config = MsReadParams::from_params(&params)?;
        Ok(Self { params, config })
    }

    pub fn name(&self) -> &str {
        NAME
    }

    pub fn ports(&self) -> &[PortDescriptor] {
        PORTS
    }

    pub fn config(&self) -> &MsReadParams {
        &self.config
    }

    /// Column requests in output slot order.
    pub fn requests(&self) -> Vec<ColumnRequest> {
        let rows = RowWindow::new(self.config.row_start, self.config.row_count);
        // (rows, chans, pols): keep every channel, window the polarizations.
        let cell = vec![
            AxisRange::full(),
            AxisRange::new(self.config.pol_start, self.config.pol_end),
        ];
        vec![
            ColumnRequest::new("UVW", ElementType::Float64).rows(rows),
            ColumnRequest::new("CHAN_FREQ", ElementType::Float64).linked(SPECTRAL_WINDOW),
            ColumnRequest::new("DATA", ElementType::Complex128)
                .mode(ExtractMode::MaskedByFlagOrAutocorrelation)
                .rows(rows)
                .trailing(cell.clone()),
            ColumnRequest::new("WEIGHT_SPECTRUM", ElementType::Float64)
                .mode(ExtractMode::MaskedByFlag)
                .rows(rows)
                .trailing(cell.clone()),
            ColumnRequest::new("FLAG", ElementType::Bool)
                .rows(rows)
                .trailing(cell),
            ColumnRequest::new("WEIGHT", ElementType::Float64).rows(rows),
        ]
    }

    pub fn run(&mut self, ctx: &mut NodeContext) -> Result<()> {
        ctx.require_inputs(NAME, 1)?;
        let ms = ctx.input_store(0)?.to_path_buf();
        debug!(ms = %ms.display(), config = ?self.config, "Reading measurement set");

        let mut emitted = 0;
        for (slot, request) in self.requests().iter().enumerate() {
            if !ctx.output_bound(slot) {
                continue;
            }
            let data = extract_column(ctx.store(), &ms, request)
                .with_context(|| format!("{} output '{}'", NAME, PORTS[slot + 1].name))?;
            ctx.emit(slot, &data)?;
            emitted += 1;
        }
        info!(ms = %ms.display(), outputs = emitted, "Read measurement set");
        Ok(())
    }

    pub fn on_config_change(&mut self, key: &str, value: &ConfigValue) -> Result<()> {
        let (params, config) = rebind(
            &self.params,
            MsReadParams::SPECS,
            key,
            value,
            MsReadParams::from_params,
        )?;
        self.params = params;
        self.config = config;
        Ok(())
    }
}
