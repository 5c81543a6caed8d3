// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Preparing raw star catalogues for a fit: detector identifiers, super-pixel
//! cells, magnitudes from fluxes, star flats and the exposure quality cut.
//!
//! Every function here adds columns to (or filters) an [`ObservationTable`];
//! none of them know anything about the fit itself.

use std::collections::{HashMap, HashSet};

use log::{debug, info};
use ndarray::Array2;
use thiserror::Error;

use crate::{
    constants::{CHANNEL_NUM_PIX_X, CHANNEL_NUM_PIX_Y, NUM_CCDS, NUM_QUADRANTS},
    model::CellGrid,
    store::{Column, DataError, Key, ObservationTable},
};

/// 2.5 / ln(10); propagates a relative flux error into magnitudes.
const FLUX_ERR_TO_MAG_ERR: f64 = 1.085_736_204_758_129_6;

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error(transparent)]
    Data(#[from] DataError),

    #[error("Star flat of CCD {ccdid} quadrant {qid} has shape {got:?}, but {expected:?} is required")]
    StarFlatShape {
        ccdid: i64,
        qid: i64,
        got: (usize, usize),
        expected: (usize, usize),
    },

    #[error("There is no CCD {ccdid} quadrant {qid}")]
    NoSuchQuadrant { ccdid: i64, qid: i64 },
}

/// Split a readout-channel id (0 to 63) into its CCD id (1 to 16) and
/// quadrant id (1 to 4).
pub fn ccdid_qid_from_rcid(rcid: i64) -> (i64, i64) {
    let qid = rcid % 4 + 1;
    let ccdid = (rcid - (qid - 1)) / 4 + 1;
    (ccdid, qid)
}

/// The quadrant-resolution exposure id.
pub fn pid_from_expid(expid: i64, ccdid: i64, qid: i64) -> i64 {
    expid * 100 + (ccdid - 1) * 4 + (qid - 1)
}

/// Read an integer from a key column; string keys are an error.
fn int_at(column: &Column, name: &str, row: usize) -> Result<Option<i64>, DataError> {
    match column.key(row) {
        None => Ok(None),
        Some(Key::Int(i)) => Ok(Some(i)),
        Some(Key::Str(s)) => Err(DataError::NotAnInteger {
            column: name.to_string(),
            row,
            value: s,
        }),
    }
}

fn int_column(table: &ObservationTable, name: &str) -> Result<Vec<Option<i64>>, DataError> {
    let column = table.key_column(name)?;
    (0..table.num_rows())
        .map(|row| int_at(column, name, row))
        .collect()
}

/// Add `ccdid` and `qid` columns derived from the `rcid_column`.
pub fn add_ccdid_qid(table: &mut ObservationTable, rcid_column: &str) -> Result<(), DataError> {
    let (ccdids, qids): (Vec<_>, Vec<_>) = int_column(table, rcid_column)?
        .into_iter()
        .map(|rcid| match rcid.map(ccdid_qid_from_rcid) {
            Some((c, q)) => (Some(c), Some(q)),
            None => (None, None),
        })
        .unzip();
    table.add_column("ccdid", Column::Int(ccdids))?;
    table.add_column("qid", Column::Int(qids))
}

/// Add a `pid` column. `ccdid` and `qid` are derived from `rcid` first if
/// they're not already there.
pub fn add_pid(
    table: &mut ObservationTable,
    expid_column: &str,
    rcid_column: &str,
) -> Result<(), DataError> {
    if !(table.has_column("ccdid") && table.has_column("qid")) {
        add_ccdid_qid(table, rcid_column)?;
    }
    let expids = int_column(table, expid_column)?;
    let ccdids = int_column(table, "ccdid")?;
    let qids = int_column(table, "qid")?;
    let pids = expids
        .into_iter()
        .zip(ccdids)
        .zip(qids)
        .map(|((e, c), q)| Some(pid_from_expid(e?, c?, q?)))
        .collect();
    table.add_column("pid", Column::Int(pids))
}

/// Add a column of super-pixel cell ids. Positions outside the channel get a
/// null cell.
pub fn add_cell_column(
    table: &mut ObservationTable,
    grid: CellGrid,
    x_column: &str,
    y_column: &str,
    rcid_column: &str,
    name: &str,
) -> Result<(), DataError> {
    let x = table.floats(x_column)?;
    let y = table.floats(y_column)?;
    let rcids = int_column(table, rcid_column)?;
    let cells: Vec<Option<i64>> = x
        .iter()
        .zip(y.iter())
        .zip(rcids)
        .map(|((&x, &y), rcid)| grid.cell_id(x, y, rcid?))
        .collect();
    let num_outside = cells.iter().filter(|c| c.is_none()).count();
    if num_outside > 0 {
        debug!("{num_outside} positions have no {grid} super-pixel cell");
    }
    table.add_column(name, Column::Int(cells))
}

/// A flat-field correction, in magnitudes, for a position on a detector
/// quadrant.
pub trait StarFlat {
    fn correction(&self, ccdid: i64, qid: i64, x: f64, y: f64) -> Option<f64>;
}

/// One correction image per (CCD, quadrant), indexed `[x, y]`.
#[derive(Debug, Clone, Default)]
pub struct StarFlatImages {
    images: HashMap<(i64, i64), Array2<f32>>,
}

impl StarFlatImages {
    pub fn new() -> StarFlatImages {
        StarFlatImages::default()
    }

    pub fn insert(&mut self, ccdid: i64, qid: i64, image: Array2<f32>) -> Result<(), PreprocessError> {
        if !(1..=NUM_CCDS).contains(&ccdid) || !(1..=NUM_QUADRANTS).contains(&qid) {
            return Err(PreprocessError::NoSuchQuadrant { ccdid, qid });
        }
        let expected = (CHANNEL_NUM_PIX_X as usize, CHANNEL_NUM_PIX_Y as usize);
        if image.dim() != expected {
            return Err(PreprocessError::StarFlatShape {
                ccdid,
                qid,
                got: image.dim(),
                expected,
            });
        }
        self.images.insert((ccdid, qid), image);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl StarFlat for StarFlatImages {
    /// The value at the nearest pixel. No interpolation.
    fn correction(&self, ccdid: i64, qid: i64, x: f64, y: f64) -> Option<f64> {
        let image = self.images.get(&(ccdid, qid))?;
        let (x, y) = (x.round(), y.round());
        if !(x >= 0.0 && y >= 0.0) {
            return None;
        }
        image.get([x as usize, y as usize]).map(|&v| f64::from(v))
    }
}

/// Names of the columns used by [`add_magnitudes`].
#[derive(Debug, Clone)]
pub struct MagnitudeColumns<'a> {
    pub flux: &'a str,
    pub flux_err: &'a str,
    pub mag: &'a str,
    pub mag_err: &'a str,
}

/// Where a [`StarFlat`] finds its pixel positions and quadrants.
#[derive(Debug, Clone)]
pub struct StarFlatColumns<'a> {
    pub x: &'a str,
    pub y: &'a str,
    pub rcid: &'a str,
}

/// Convert fluxes into magnitudes and magnitude uncertainties. Non-positive
/// or missing fluxes give nulls. With a star flat, its correction is
/// subtracted from the magnitude; positions without a correction give nulls.
pub fn add_magnitudes(
    table: &mut ObservationTable,
    columns: &MagnitudeColumns,
    star_flat: Option<(&dyn StarFlat, &StarFlatColumns)>,
) -> Result<(), DataError> {
    let flux = table.floats(columns.flux)?.into_owned();
    let flux_err = table.floats(columns.flux_err)?.into_owned();

    let mut mags: Vec<f64> = flux
        .iter()
        .map(|&f| if f > 0.0 { -2.5 * f.log10() } else { f64::NAN })
        .collect();
    let errs: Vec<f64> = flux
        .iter()
        .zip(&flux_err)
        .map(|(&f, &e)| {
            if f > 0.0 {
                FLUX_ERR_TO_MAG_ERR * e / f
            } else {
                f64::NAN
            }
        })
        .collect();

    if let Some((star_flat, sf_columns)) = star_flat {
        let x = table.floats(sf_columns.x)?;
        let y = table.floats(sf_columns.y)?;
        let rcids = int_column(table, sf_columns.rcid)?;
        for (i, mag) in mags.iter_mut().enumerate() {
            let correction = rcids[i].and_then(|rcid| {
                let (ccdid, qid) = ccdid_qid_from_rcid(rcid);
                star_flat.correction(ccdid, qid, x[i], y[i])
            });
            *mag -= correction.unwrap_or(f64::NAN);
        }
    }

    let num_null = mags.iter().filter(|m| m.is_nan()).count();
    if num_null > 0 {
        debug!("{num_null} observations have no magnitude");
    }
    table.add_column(columns.mag, Column::Float(mags))?;
    table.add_column(columns.mag_err, Column::Float(errs))
}

/// Metadata pids in `[LONG_PID_MIN, LONG_PID_MAX)` have 12 digits.
const LONG_PID_MIN: i64 = 100_000_000_000;
const LONG_PID_MAX: i64 = 1_000_000_000_000;

/// Keep only the rows whose `pid_column` is a quadrant with `infobits == 0`
/// in the exposure `metadata`. When the largest metadata pid has 12 digits,
/// every metadata pid carries two extra trailing digits, which are dropped.
pub fn remove_infobits(
    table: &ObservationTable,
    pid_column: &str,
    metadata: &ObservationTable,
    metadata_pid_column: &str,
) -> Result<ObservationTable, DataError> {
    let meta_pids = int_column(metadata, metadata_pid_column)?;
    let infobits = int_column(metadata, "infobits")?;
    let long_pids = meta_pids
        .iter()
        .flatten()
        .max()
        .map(|&p| (LONG_PID_MIN..LONG_PID_MAX).contains(&p))
        .unwrap_or(false);

    let good: HashSet<i64> = meta_pids
        .into_iter()
        .zip(infobits)
        .filter_map(|(pid, bits)| match (pid, bits) {
            (Some(pid), Some(0)) => Some(if long_pids { pid / 100 } else { pid }),
            _ => None,
        })
        .collect();

    let pids = int_column(table, pid_column)?;
    let mask: Vec<bool> = pids
        .iter()
        .map(|p| p.map(|p| good.contains(&p)).unwrap_or(false))
        .collect();
    let kept = table.retain_mask(&mask);
    if !table.is_empty() {
        info!(
            "Keeping {} observations with infobits == 0 ({:.1}%)",
            kept.num_rows(),
            kept.num_rows() as f64 / table.num_rows() as f64 * 100.0
        );
    }
    Ok(kept)
}
