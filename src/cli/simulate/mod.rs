// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use clap::Parser;
use log::{debug, info, trace};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::common::{display_warnings, InfoPrinter, Warn, ARG_FILE_HELP};
use crate::{params::SimulateParams, simulate::SimulationParams, UbercalError};

lazy_static::lazy_static! {
    static ref DEFAULTS: SimulationParams = SimulationParams::default();

    static ref NUM_STARS_HELP: String =
        format!("The number of stars in the sample. Default: {}", DEFAULTS.num_stars);

    static ref NUM_EXPOSURES_HELP: String =
        format!("The number of exposures. Default: {}", DEFAULTS.num_exposures);

    static ref STARS_PER_EXPOSURE_HELP: String =
        format!("The smallest and largest number of stars observed by an exposure. Default: {} {}",
                DEFAULTS.min_stars_per_exposure, DEFAULTS.max_stars_per_exposure);

    static ref MAG_LIMIT_HELP: String =
        format!("The faintest magnitude of the star sample. Default: {}", DEFAULTS.mag_limit);

    static ref ZP_RANGE_HELP: String =
        format!("Zero points are drawn uniformly from [-range, range]. Default: {}", DEFAULTS.zp_range);

    static ref CHANNEL_OFF_RANGE_HELP: String =
        format!("Channel offsets are drawn uniformly from [-range, range]. Default: {}", DEFAULTS.channel_off_range);
}

#[derive(Parser, Debug, Clone, Default, Serialize, Deserialize)]
pub(super) struct SimulateArgs {
    #[clap(name = "ARGUMENTS_FILE", help = ARG_FILE_HELP.as_str(), parse(from_os_str))]
    pub(super) args_file: Option<PathBuf>,

    /// Path to the simulated observation table (CSV).
    #[clap(short, long, parse(from_os_str), help_heading = "OUTPUT FILES")]
    pub(super) output: Option<PathBuf>,

    #[clap(long, help = NUM_STARS_HELP.as_str(), help_heading = "SURVEY")]
    pub(super) num_stars: Option<usize>,

    #[clap(long, help = NUM_EXPOSURES_HELP.as_str(), help_heading = "SURVEY")]
    pub(super) num_exposures: Option<usize>,

    #[clap(long, number_of_values = 2, value_names = &["MIN", "MAX"], help = STARS_PER_EXPOSURE_HELP.as_str(), help_heading = "SURVEY")]
    pub(super) stars_per_exposure: Option<Vec<usize>>,

    #[clap(long, help = MAG_LIMIT_HELP.as_str(), help_heading = "SURVEY")]
    pub(super) mag_limit: Option<f64>,

    #[clap(long, help = ZP_RANGE_HELP.as_str(), help_heading = "SURVEY")]
    pub(super) zp_range: Option<f64>,

    /// Spread the observations over this many detector channels.
    #[clap(long, help_heading = "SURVEY")]
    pub(super) num_channels: Option<usize>,

    #[clap(long, help = CHANNEL_OFF_RANGE_HELP.as_str(), help_heading = "SURVEY")]
    pub(super) channel_off_range: Option<f64>,

    /// Give every exposure an airmass and dim its magnitudes by this
    /// extinction coefficient times the airmass.
    #[clap(long, help_heading = "SURVEY")]
    pub(super) extinction: Option<f64>,

    /// Write the model magnitudes without any noise.
    #[clap(long, help_heading = "SURVEY")]
    #[serde(default)]
    pub(super) no_noise: bool,

    /// The random seed. Default: 0
    #[clap(long, help_heading = "SURVEY")]
    pub(super) seed: Option<u64>,
}

impl SimulateArgs {
    /// Consolidate the command-line arguments with those of the argument file,
    /// preferring the command line.
    pub(super) fn merge(self) -> Result<SimulateArgs, UbercalError> {
        debug!("Merging command-line arguments with the argument file");

        let cli_args = self;

        if let Some(arg_file) = cli_args.args_file {
            let SimulateArgs {
                args_file: _,
                output,
                num_stars,
                num_exposures,
                stars_per_exposure,
                mag_limit,
                zp_range,
                num_channels,
                channel_off_range,
                extinction,
                no_noise,
                seed,
            } = unpack_arg_file!(arg_file);

            Ok(SimulateArgs {
                args_file: None,
                output: cli_args.output.or(output),
                num_stars: cli_args.num_stars.or(num_stars),
                num_exposures: cli_args.num_exposures.or(num_exposures),
                stars_per_exposure: cli_args.stars_per_exposure.or(stars_per_exposure),
                mag_limit: cli_args.mag_limit.or(mag_limit),
                zp_range: cli_args.zp_range.or(zp_range),
                num_channels: cli_args.num_channels.or(num_channels),
                channel_off_range: cli_args.channel_off_range.or(channel_off_range),
                extinction: cli_args.extinction.or(extinction),
                no_noise: cli_args.no_noise || no_noise,
                seed: cli_args.seed.or(seed),
            })
        } else {
            Ok(cli_args)
        }
    }

    pub(super) fn parse(self) -> Result<SimulateParams, UbercalError> {
        debug!("{:#?}", self);

        let Self {
            args_file: _,
            output,
            num_stars,
            num_exposures,
            stars_per_exposure,
            mag_limit,
            zp_range,
            num_channels,
            channel_off_range,
            extinction,
            no_noise,
            seed,
        } = self;

        let output = output.ok_or(SimulateArgsError::NoOutput)?;
        let defaults = SimulationParams::default();
        let (min_stars_per_exposure, max_stars_per_exposure) = match stars_per_exposure.as_deref()
        {
            Some(&[min, max]) => (min, max),
            Some(values) => return Err(SimulateArgsError::StarsPerExposure(values.len()).into()),
            None => (
                defaults.min_stars_per_exposure,
                defaults.max_stars_per_exposure,
            ),
        };
        if channel_off_range.is_some() && num_channels.unwrap_or(0) == 0 {
            "A channel offset range was given without any channels; ignoring".warn();
        }

        let simulation = SimulationParams {
            num_stars: num_stars.unwrap_or(defaults.num_stars),
            num_exposures: num_exposures.unwrap_or(defaults.num_exposures),
            min_stars_per_exposure,
            max_stars_per_exposure,
            mag_limit: mag_limit.unwrap_or(defaults.mag_limit),
            zp_range: zp_range.unwrap_or(defaults.zp_range),
            num_channels: num_channels.unwrap_or(defaults.num_channels),
            channel_off_range: channel_off_range.unwrap_or(defaults.channel_off_range),
            extinction,
            noise: !no_noise,
            seed: seed.unwrap_or(defaults.seed),
            ..defaults
        };

        let mut printer = InfoPrinter::new("Simulating a survey".into());
        printer.push_block(vec![
            format!(
                "{} stars brighter than {} mag",
                simulation.num_stars, simulation.mag_limit
            )
            .into(),
            format!(
                "{} exposures of {} to {} stars each",
                simulation.num_exposures,
                simulation.min_stars_per_exposure,
                simulation.max_stars_per_exposure
            )
            .into(),
        ]);
        let mut block = vec![format!("zero points within ±{}", simulation.zp_range).into()];
        if simulation.num_channels > 0 {
            block.push(
                format!(
                    "{} channels with offsets within ±{}",
                    simulation.num_channels, simulation.channel_off_range
                )
                .into(),
            );
        }
        if let Some(k) = simulation.extinction {
            block.push(format!("extinction coefficient {k}").into());
        }
        block.push(
            if simulation.noise {
                format!("noisy, seed {}", simulation.seed)
            } else {
                "noiseless".to_string()
            }
            .into(),
        );
        printer.push_block(block);
        printer.push_line(format!("Writing to {}", output.display()).into());
        printer.display();

        display_warnings();

        Ok(SimulateParams { output, simulation })
    }

    pub(super) fn run(self, dry_run: bool) -> Result<(), UbercalError> {
        debug!("Converting arguments into parameters");
        trace!("{:#?}", self);
        let params = self.parse()?;

        if dry_run {
            info!("Dry run -- exiting now.");
            return Ok(());
        }

        params.run()?;
        Ok(())
    }
}

#[derive(Error, Debug)]
pub(super) enum SimulateArgsError {
    #[error("No output file was specified")]
    NoOutput,

    #[error("Two numbers of stars per exposure (min and max) are required, but {0} were given")]
    StarsPerExposure(usize),
}
