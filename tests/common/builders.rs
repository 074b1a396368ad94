//! Test data builders for synthetic measurement sets

use ndarray::{Array1, Array2, Array3};
use nifty_components::store::{NpyTableStore, TableBuilder};
use num_complex::Complex64;
use std::path::{Path, PathBuf};

/// Value stored in `DATA` at `(row, chan, pol)`.
pub fn data_value(row: usize, chan: usize, pol: usize) -> Complex64 {
    Complex64::new(row as f64 + 1.0, (chan * 10 + pol) as f64)
}

/// Frequency of channel `chan` in the spectral window.
pub fn channel_freq(chan: usize) -> f64 {
    1.0e8 + chan as f64 * 1.0e6
}

/// Builder for a measurement set with predictable contents.
///
/// Every row correlates antenna `row % 4` with antenna `row % 4 + 1`
/// unless it is listed as an autocorrelation.
pub struct MsBuilder {
    rows: usize,
    chans: usize,
    pols: usize,
    flagged: Vec<(usize, usize, usize)>,
    autocorrelations: Vec<usize>,
}

impl MsBuilder {
    pub fn new(rows: usize) -> Self {
        Self {
            rows,
            chans: 4,
            pols: 2,
            flagged: Vec::new(),
            autocorrelations: Vec::new(),
        }
    }

    pub fn chans(mut self, chans: usize) -> Self {
        self.chans = chans;
        self
    }

    pub fn pols(mut self, pols: usize) -> Self {
        self.pols = pols;
        self
    }

    pub fn flag(mut self, row: usize, chan: usize, pol: usize) -> Self {
        self.flagged.push((row, chan, pol));
        self
    }

    pub fn autocorrelation(mut self, row: usize) -> Self {
        self.autocorrelations.push(row);
        self
    }

    /// Write the table under `dir` as `name` and return its path.
    pub fn build(self, dir: &Path, name: &str) -> PathBuf {
        let (rows, chans, pols) = (self.rows, self.chans, self.pols);
        let uvw = Array2::from_shape_fn((rows, 3), |(r, k)| match k {
            0 => r as f64,
            1 => 2.0 * r as f64,
            _ => 0.5,
        });
        let data = Array3::from_shape_fn((rows, chans, pols), |(r, c, p)| data_value(r, c, p));
        let mut flag = Array3::from_elem((rows, chans, pols), false);
        for &(r, c, p) in &self.flagged {
            flag[[r, c, p]] = true;
        }
        let weight_spectrum = Array3::from_shape_fn((rows, chans, pols), |(_, _, p)| p as f64 + 1.0);
        let weight = Array2::from_elem((rows, pols), 1.0);
        let ant1 = Array1::from_shape_fn(rows, |r| (r % 4) as i64);
        let ant2 = Array1::from_shape_fn(rows, |r| {
            if self.autocorrelations.contains(&r) {
                (r % 4) as i64
            } else {
                (r % 4 + 1) as i64
            }
        });
        let chan_freq = Array2::from_shape_fn((1, chans), |(_, c)| channel_freq(c));

        let table = TableBuilder::new(rows as u64)
            .column("UVW", uvw)
            .column("DATA", data)
            .column("FLAG", flag)
            .column("WEIGHT_SPECTRUM", weight_spectrum)
            .column("WEIGHT", weight)
            .column("ANTENNA1", ant1)
            .column("ANTENNA2", ant2)
            .subtable(
                "SPECTRAL_WINDOW",
                TableBuilder::new(1).column("CHAN_FREQ", chan_freq),
            );

        let path = dir.join(name);
        NpyTableStore::new()
            .create(&path, table)
            .expect("failed to create test measurement set");
        path
    }
}
