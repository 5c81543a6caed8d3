// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use serde::{Deserialize, Serialize};

use super::ConfigError;
use crate::constants::{
    CHANNEL_NUM_PIX_X, CHANNEL_NUM_PIX_Y, DEFAULT_CELL_BIN_WIDTH_X, DEFAULT_CELL_BIN_WIDTH_Y,
};

/// A regular grid of focal-plane super-pixel cells. Every detector channel is
/// split into `(3072 / bin_width_x) × (3080 / bin_width_y)` cells, and cells
/// are numbered consecutively across channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawCellGrid", into = "RawCellGrid")]
pub struct CellGrid {
    bin_width_x: u32,
    bin_width_y: u32,
}

#[derive(Serialize, Deserialize)]
struct RawCellGrid {
    bin_width_x: u32,
    bin_width_y: u32,
}

impl TryFrom<RawCellGrid> for CellGrid {
    type Error = ConfigError;

    fn try_from(raw: RawCellGrid) -> Result<Self, Self::Error> {
        CellGrid::new(raw.bin_width_x, raw.bin_width_y)
    }
}

impl From<CellGrid> for RawCellGrid {
    fn from(grid: CellGrid) -> Self {
        RawCellGrid {
            bin_width_x: grid.bin_width_x,
            bin_width_y: grid.bin_width_y,
        }
    }
}

impl Default for CellGrid {
    fn default() -> Self {
        CellGrid {
            bin_width_x: DEFAULT_CELL_BIN_WIDTH_X,
            bin_width_y: DEFAULT_CELL_BIN_WIDTH_Y,
        }
    }
}

impl CellGrid {
    /// Both bin widths must divide the channel dimensions exactly.
    pub fn new(bin_width_x: u32, bin_width_y: u32) -> Result<CellGrid, ConfigError> {
        for (axis, width, num_pixels) in [
            ('x', bin_width_x, CHANNEL_NUM_PIX_X),
            ('y', bin_width_y, CHANNEL_NUM_PIX_Y),
        ] {
            if width == 0 || num_pixels % width != 0 {
                return Err(ConfigError::BinSizeNotDivisor {
                    axis,
                    width,
                    num_pixels,
                });
            }
        }
        Ok(CellGrid {
            bin_width_x,
            bin_width_y,
        })
    }

    pub fn bin_width_x(&self) -> u32 {
        self.bin_width_x
    }

    pub fn bin_width_y(&self) -> u32 {
        self.bin_width_y
    }

    pub fn num_cells_x(&self) -> u32 {
        CHANNEL_NUM_PIX_X / self.bin_width_x
    }

    pub fn num_cells_y(&self) -> u32 {
        CHANNEL_NUM_PIX_Y / self.bin_width_y
    }

    pub fn cells_per_channel(&self) -> u32 {
        self.num_cells_x() * self.num_cells_y()
    }

    /// The cell containing pixel `(x, y)` of channel `rcid`. Positions
    /// outside the channel (or not finite) have no cell.
    pub fn cell_id(&self, x: f64, y: f64, rcid: i64) -> Option<i64> {
        if !(x.is_finite() && y.is_finite()) || rcid < 0 {
            return None;
        }
        if x < 0.0 || y < 0.0 || x >= CHANNEL_NUM_PIX_X as f64 || y >= CHANNEL_NUM_PIX_Y as f64 {
            return None;
        }
        let x_bin = (x / self.bin_width_x as f64).floor() as i64;
        let y_bin = (y / self.bin_width_y as f64).floor() as i64;
        let num_y = i64::from(self.num_cells_y());
        Some(x_bin * num_y + y_bin + rcid * i64::from(self.cells_per_channel()))
    }
}

impl std::fmt::Display for CellGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.bin_width_x, self.bin_width_y)
    }
}
