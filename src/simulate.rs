// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Synthetic surveys with known zero points, channel offsets and extinction.
//!
//! A sample of stars is drawn once (magnitudes fall off exponentially from a
//! limiting magnitude), then every exposure observes a random subset of them
//! through its own zero point. The true values are written alongside the
//! observations so a fit can be checked against them. Exposure 0 and
//! channel 0 have no offset, which makes them natural references.

use log::{debug, info};
use rand::{rngs::StdRng, seq::index::sample, Rng, SeedableRng};
use rand_distr::{Distribution, Exp, Normal, Uniform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    constants::{
        DEFAULT_AIRMASS_COLUMN, DEFAULT_CHANNEL_COLUMN, DEFAULT_EXPOSURE_COLUMN,
        DEFAULT_MAG_COLUMN, DEFAULT_MAG_ERR_COLUMN, DEFAULT_STAR_COLUMN,
    },
    store::{Column, ObservationTable},
};

/// Simulated uncertainties are never smaller than this.
const MIN_MAG_ERR: f64 = 1e-3;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("Invalid simulation parameter: {0}")]
    InvalidParameter(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    pub num_stars: usize,
    pub num_exposures: usize,
    pub min_stars_per_exposure: usize,
    pub max_stars_per_exposure: usize,

    /// The faintest magnitude in the star sample.
    pub mag_limit: f64,
    /// The mean of the exponential fall-off of star magnitudes.
    pub mag_scale: f64,

    pub mag_err_mean: f64,
    pub mag_err_sigma: f64,

    /// Zero-point offsets are uniform in `[-zp_range, zp_range]`.
    pub zp_range: f64,

    /// When non-zero, every observation lands on one of this many channels,
    /// each with an offset uniform in `[-channel_off_range, channel_off_range]`.
    pub num_channels: usize,
    pub channel_off_range: f64,

    /// When given, every exposure gets an airmass uniform in `[1, 2]` and
    /// magnitudes are dimmed by `extinction × airmass`.
    pub extinction: Option<f64>,

    /// Without noise the simulated magnitudes are exactly the model.
    pub noise: bool,

    pub seed: u64,
}

impl Default for SimulationParams {
    fn default() -> Self {
        SimulationParams {
            num_stars: 2000,
            num_exposures: 50,
            min_stars_per_exposure: 40,
            max_stars_per_exposure: 500,
            mag_limit: 22.0,
            mag_scale: 3.0,
            mag_err_mean: 0.05,
            mag_err_sigma: 0.005,
            zp_range: 0.1,
            num_channels: 0,
            channel_off_range: 0.05,
            extinction: None,
            noise: true,
            seed: 0,
        }
    }
}

fn invalid<E: std::fmt::Display>(e: E) -> SimulationError {
    SimulationError::InvalidParameter(e.to_string())
}

impl SimulationParams {
    fn validate(&self) -> Result<(), SimulationError> {
        if self.num_stars == 0 || self.num_exposures == 0 {
            return Err(invalid("there must be at least one star and one exposure"));
        }
        if self.min_stars_per_exposure == 0
            || self.min_stars_per_exposure > self.max_stars_per_exposure
        {
            return Err(invalid(format!(
                "stars per exposure must be a non-empty range, got {}..={}",
                self.min_stars_per_exposure, self.max_stars_per_exposure
            )));
        }
        if self.min_stars_per_exposure > self.num_stars {
            return Err(invalid(format!(
                "can't observe {} of only {} stars",
                self.min_stars_per_exposure, self.num_stars
            )));
        }
        if !(self.zp_range >= 0.0 && self.channel_off_range >= 0.0) {
            return Err(invalid("offset ranges must be non-negative"));
        }
        Ok(())
    }

    /// Draw the survey.
    pub fn simulate(&self) -> Result<ObservationTable, SimulationError> {
        self.validate()?;
        let mut rng = StdRng::seed_from_u64(self.seed);

        let fall_off = Exp::new(1.0 / self.mag_scale).map_err(invalid)?;
        let err_dist = Normal::new(self.mag_err_mean, self.mag_err_sigma).map_err(invalid)?;
        let star_mags: Vec<f64> = (0..self.num_stars)
            .map(|_| self.mag_limit - fall_off.sample(&mut rng))
            .collect();
        let star_errs: Vec<f64> = (0..self.num_stars)
            .map(|_| err_dist.sample(&mut rng).max(MIN_MAG_ERR))
            .collect();

        let offset = |range: f64, rng: &mut StdRng| {
            if range > 0.0 {
                rng.gen_range(-range..=range)
            } else {
                0.0
            }
        };
        let mut zps = vec![0.0];
        zps.extend((1..self.num_exposures).map(|_| offset(self.zp_range, &mut rng)));
        let channel_offs: Vec<f64> = (0..self.num_channels)
            .map(|c| if c == 0 { 0.0 } else { offset(self.channel_off_range, &mut rng) })
            .collect();
        let airmasses: Option<Vec<f64>> = self.extinction.map(|_| {
            let airmass = Uniform::new_inclusive(1.0, 2.0);
            (0..self.num_exposures)
                .map(|_| airmass.sample(&mut rng))
                .collect()
        });

        let max_stars = self.max_stars_per_exposure.min(self.num_stars);
        let mut star = vec![];
        let mut exposure = vec![];
        let mut channel = vec![];
        let mut airmass = vec![];
        let mut mag = vec![];
        let mut mag_err = vec![];
        let mut true_mag = vec![];
        let mut true_zp = vec![];
        let mut true_channel_off = vec![];

        for (e, &zp) in zps.iter().enumerate() {
            let num_observed = rng.gen_range(self.min_stars_per_exposure..=max_stars);
            let mut stars = sample(&mut rng, self.num_stars, num_observed).into_vec();
            stars.sort_unstable();
            debug!("Exposure {e} observes {num_observed} stars, zero point {zp:.4}");

            for s in stars {
                let mut model = star_mags[s] + zp;
                if self.num_channels > 0 {
                    let c = rng.gen_range(0..self.num_channels);
                    channel.push(c as i64);
                    true_channel_off.push(channel_offs[c]);
                    model += channel_offs[c];
                }
                if let (Some(k), Some(x)) = (self.extinction, &airmasses) {
                    airmass.push(x[e]);
                    model += k * x[e];
                }

                let err = star_errs[s];
                if self.noise {
                    let scatter = Normal::new(model, err).map_err(invalid)?;
                    let reported = Normal::new(err, err / 10.0).map_err(invalid)?;
                    mag.push(scatter.sample(&mut rng));
                    mag_err.push(reported.sample(&mut rng).max(MIN_MAG_ERR));
                } else {
                    mag.push(model);
                    mag_err.push(err);
                }
                star.push(s as i64);
                exposure.push(e as i64);
                true_mag.push(star_mags[s]);
                true_zp.push(zp);
            }
        }

        let mut columns = vec![
            (DEFAULT_STAR_COLUMN, Column::from(star)),
            (DEFAULT_EXPOSURE_COLUMN, Column::from(exposure)),
        ];
        if self.num_channels > 0 {
            columns.push((DEFAULT_CHANNEL_COLUMN, Column::from(channel)));
        }
        if self.extinction.is_some() {
            columns.push((DEFAULT_AIRMASS_COLUMN, Column::from(airmass)));
        }
        columns.push((DEFAULT_MAG_COLUMN, Column::from(mag)));
        columns.push((DEFAULT_MAG_ERR_COLUMN, Column::from(mag_err)));
        columns.push(("true_mag", Column::from(true_mag)));
        columns.push(("true_zp", Column::from(true_zp)));
        if self.num_channels > 0 {
            columns.push(("true_channel_off", Column::from(true_channel_off)));
        }

        let table = ObservationTable::from_columns(columns).map_err(invalid)?;
        info!(
            "Simulated {} observations of {} stars on {} exposures",
            table.num_rows(),
            self.num_stars,
            self.num_exposures
        );
        Ok(table)
    }
}
