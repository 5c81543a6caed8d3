// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

/*!
Useful constants.

All real-valued constants *must* be double precision; magnitudes and their
uncertainties are handled as `f64` throughout.
 */

/// The number of pixels along the x axis of a single detector channel
/// (readout quadrant).
pub const CHANNEL_NUM_PIX_X: u32 = 3072;

/// The number of pixels along the y axis of a single detector channel
/// (readout quadrant).
pub const CHANNEL_NUM_PIX_Y: u32 = 3080;

/// The number of CCDs in the focal plane, numbered from 1.
pub const NUM_CCDS: i64 = 16;

/// The number of readout quadrants per CCD, numbered from 1.
pub const NUM_QUADRANTS: i64 = 4;

/// The default super-pixel bin width along x \[pixels\]. Divides
/// [`CHANNEL_NUM_PIX_X`] into 8 cells.
pub const DEFAULT_CELL_BIN_WIDTH_X: u32 = 48 * 4 * 2;

/// The default super-pixel bin width along y \[pixels\]. Divides
/// [`CHANNEL_NUM_PIX_Y`] into 7 cells.
pub const DEFAULT_CELL_BIN_WIDTH_Y: u32 = 40 * 11;

/// Stars observed fewer times than this are dropped before indexing.
pub const DEFAULT_MIN_OBSERVATIONS: usize = 3;

/// The default relative pivot tolerance of the Cholesky factorisation. A pivot
/// smaller than this multiple of the matching diagonal element of the normal
/// matrix is treated as zero.
pub const DEFAULT_PIVOT_TOLERANCE: f64 = 1e-10;

/// The default LSQR tolerance on the relative residual (`atol`).
pub const DEFAULT_LSQR_ATOL: f64 = 1e-12;

/// The default LSQR tolerance on the relative residual (`btol`).
pub const DEFAULT_LSQR_BTOL: f64 = 1e-12;

/// The default maximum number of LSQR iterations.
pub const DEFAULT_LSQR_MAX_ITERATIONS: usize = 10_000;

/// Default observation column names.
pub const DEFAULT_STAR_COLUMN: &str = "star_key";
pub const DEFAULT_EXPOSURE_COLUMN: &str = "exposure_key";
pub const DEFAULT_CHANNEL_COLUMN: &str = "channel_key";
pub const DEFAULT_CELL_COLUMN: &str = "cell_key";
pub const DEFAULT_MAG_COLUMN: &str = "mag";
pub const DEFAULT_MAG_ERR_COLUMN: &str = "mag_err";
pub const DEFAULT_AIRMASS_COLUMN: &str = "airmass";

/// The name of the residual column appended to solved tables.
pub const RESIDUAL_COLUMN: &str = "residual";

/// The name of the pull (residual / uncertainty) column appended to solved
/// tables.
pub const PULL_COLUMN: &str = "pull";

/// Default names of the raw catalogue columns used during preprocessing.
pub const DEFAULT_PID_COLUMN: &str = "pid";
pub const DEFAULT_EXPID_COLUMN: &str = "expid";
pub const DEFAULT_RCID_COLUMN: &str = "rcid";
pub const DEFAULT_X_COLUMN: &str = "x";
pub const DEFAULT_Y_COLUMN: &str = "y";
