// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use log::info;
use thiserror::Error;

use crate::{
    misc::expensive_op,
    simulate::{SimulationError, SimulationParams},
    store::{write_csv, WriteTableError},
};

#[derive(Debug)]
pub(crate) struct SimulateParams {
    pub(crate) output: PathBuf,
    pub(crate) simulation: SimulationParams,
}

impl SimulateParams {
    pub(crate) fn run(&self) -> Result<(), SimulateParamsError> {
        let table = expensive_op(|| self.simulation.simulate(), "Still simulating")?;
        write_csv(&table, &self.output)?;
        info!(
            "Wrote {} simulated observations to {}",
            table.num_rows(),
            self.output.display()
        );
        Ok(())
    }
}

#[derive(Error, Debug)]
pub(crate) enum SimulateParamsError {
    #[error(transparent)]
    Simulation(#[from] SimulationError),

    #[error(transparent)]
    Write(#[from] WriteTableError),
}
