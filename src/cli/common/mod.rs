// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Things shared by the `ubercal` subcommands: argument files and the
//! reporting printers.

mod printers;

pub(crate) use printers::InfoPrinter;
pub(crate) use printers::{display_warnings, Warn};

use std::{fs::File, io::Read, path::Path, str::FromStr};

use itertools::Itertools;
use log::debug;
use serde::de::DeserializeOwned;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use super::UbercalError;

lazy_static::lazy_static! {
    pub(super) static ref ARG_FILE_TYPES_COMMA_SEPARATED: String = ArgFileTypes::iter().join(", ");

    pub(super) static ref ARG_FILE_HELP: String =
        format!("All arguments may be specified in a file. Any CLI arguments override arguments set in the file. Supported formats: {}", *ARG_FILE_TYPES_COMMA_SEPARATED);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumIter, EnumString)]
pub(super) enum ArgFileTypes {
    #[strum(serialize = "toml")]
    Toml,
    #[strum(serialize = "json")]
    Json,
}

impl ArgFileTypes {
    /// The file type implied by the extension of `path`, case-insensitively.
    pub(super) fn from_path(path: &Path) -> Option<ArgFileTypes> {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .and_then(|e| ArgFileTypes::from_str(&e).ok())
    }
}

/// Deserialise the toml or json file at `path`; `what` describes the file's
/// contents in error messages.
pub(super) fn read_serialised_file<T: DeserializeOwned>(
    path: &Path,
    what: &str,
) -> Result<T, UbercalError> {
    let file_type = ArgFileTypes::from_path(path).ok_or_else(|| {
        UbercalError::ArgFile(format!(
            "{what} '{}' doesn't have a recognised file extension! Valid extensions are: {}",
            path.display(),
            *ARG_FILE_TYPES_COMMA_SEPARATED
        ))
    })?;

    let mut contents = String::new();
    File::open(path)?.read_to_string(&mut contents)?;
    match file_type {
        ArgFileTypes::Toml => {
            debug!("Parsing toml file...");
            toml::from_str(&contents).map_err(|err| {
                UbercalError::ArgFile(format!(
                    "Couldn't decode toml structure from {}:\n{err}",
                    path.display()
                ))
            })
        }
        ArgFileTypes::Json => {
            debug!("Parsing json file...");
            serde_json::from_str(&contents).map_err(|err| {
                UbercalError::ArgFile(format!(
                    "Couldn't decode json structure from {}:\n{err}",
                    path.display()
                ))
            })
        }
    }
}

macro_rules! unpack_arg_file {
    ($arg_file:expr) => {{
        debug!("Attempting to parse argument file {}", $arg_file.display());
        crate::cli::common::read_serialised_file(&$arg_file, "Argument file")?
    }};
}
