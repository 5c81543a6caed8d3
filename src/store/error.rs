// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

use thiserror::Error;

use super::ColumnType;

/// Problems with the contents of an observation table.
#[derive(Error, Debug)]
pub enum DataError {
    #[error("Required column '{name}' is not in the observation table")]
    MissingColumn { name: String },

    #[error("Column '{name}' has {got} values, but the table has {expected} rows")]
    ColumnLength {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("Column '{name}' holds {column_type} values and cannot be used as a grouping key")]
    NotAKeyColumn {
        name: String,
        column_type: ColumnType,
    },

    #[error("Column '{name}' holds {column_type} values, but real values are required")]
    NotARealColumn {
        name: String,
        column_type: ColumnType,
    },

    #[error("Column '{column}' is null on row {row}; drop null rows before fitting")]
    Null { column: String, row: usize },

    #[error("Uncertainty column '{column}' must be strictly positive, but row {row} has {value}")]
    NonPositiveError {
        column: String,
        row: usize,
        value: f64,
    },

    #[error("Column '{column}' has a non-integer value '{value}' on row {row}")]
    NotAnInteger {
        column: String,
        row: usize,
        value: String,
    },
}

/// Errors when reading an observation table from disk.
#[derive(Error, Debug)]
pub enum ReadTableError {
    #[error("Observation file '{}' does not exist", .0.display())]
    FileDoesntExist(PathBuf),

    #[error("Observation file '{}' has no columns", .0.display())]
    NoColumns(PathBuf),

    #[error("Observation file '{file}' has a duplicate column '{column}'")]
    DuplicateColumn { file: PathBuf, column: String },

    #[error("Error when reading '{}': {source}", file.display())]
    Csv {
        file: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Data(#[from] DataError),

    #[error(transparent)]
    IO(#[from] std::io::Error),
}

/// Errors when writing an observation table to disk.
#[derive(Error, Debug)]
pub enum WriteTableError {
    #[error("Error when writing '{}': {source}", file.display())]
    Csv {
        file: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    IO(#[from] std::io::Error),
}
