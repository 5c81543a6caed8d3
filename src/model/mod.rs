// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The parameter model: which families of unknowns take part in a fit, which
//! observation columns group and weight them, how their gauge is fixed and
//! whether they are replicated across time slices.

mod error;
mod grid;
#[cfg(test)]
mod tests;

pub use error::ConfigError;
pub use grid::CellGrid;

use itertools::Itertools;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};

use crate::{
    constants::{
        DEFAULT_AIRMASS_COLUMN, DEFAULT_CELL_COLUMN, DEFAULT_CHANNEL_COLUMN,
        DEFAULT_EXPOSURE_COLUMN, DEFAULT_MAG_COLUMN, DEFAULT_MAG_ERR_COLUMN,
        DEFAULT_MIN_OBSERVATIONS, DEFAULT_STAR_COLUMN,
    },
    gauge::GaugeFix,
    index::FitIndex,
    store::Key,
};

/// A family of unknowns. The declaration order is the canonical order of the
/// families' column blocks in the design matrix.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Display,
    EnumIter,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum FamilyKind {
    /// One magnitude per star.
    StarMag,

    /// One zero point per exposure.
    Zp,

    /// One additive offset per detector channel.
    ChannelOff,

    /// One additive offset per focal-plane super-pixel cell.
    CellOff,

    /// The atmospheric extinction coefficient, multiplied by airmass.
    KExt,
}

impl FamilyKind {
    /// Parse a family name, case-insensitively.
    pub fn parse_name(s: &str) -> Result<FamilyKind, ConfigError> {
        s.trim()
            .to_lowercase()
            .parse()
            .map_err(|_| ConfigError::UnknownFamily(s.to_string(), FamilyKind::names()))
    }

    /// All family names, comma separated.
    pub fn names() -> String {
        FamilyKind::iter().join(", ")
    }

    /// The observation column that groups this family unless told otherwise.
    /// `None` is a single global parameter.
    pub fn default_input_column(self) -> Option<&'static str> {
        match self {
            FamilyKind::StarMag => Some(DEFAULT_STAR_COLUMN),
            FamilyKind::Zp => Some(DEFAULT_EXPOSURE_COLUMN),
            FamilyKind::ChannelOff => Some(DEFAULT_CHANNEL_COLUMN),
            FamilyKind::CellOff => Some(DEFAULT_CELL_COLUMN),
            FamilyKind::KExt => None,
        }
    }

    pub fn default_weight_column(self) -> Option<&'static str> {
        match self {
            FamilyKind::KExt => Some(DEFAULT_AIRMASS_COLUMN),
            _ => None,
        }
    }

    /// The name of the per-row dense id column of this family.
    pub fn id_column(self) -> String {
        format!("u_{self}")
    }

    /// The name of the per-row solved value column of this family.
    pub fn value_column(self) -> String {
        format!("value_{self}")
    }
}

/// How the gauge of a family is fixed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum References {
    /// Nothing is pinned.
    #[default]
    None,

    /// The unknowns of these keys are pinned to zero. If the family is sliced
    /// in time, the keys are pinned in every slice, or only in `slices` when
    /// that is given.
    Keys {
        keys: Vec<Key>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        slices: Option<Vec<Key>>,
    },

    /// One reference per independent group. Rows are grouped by `column` (and
    /// by time slice, if the family is sliced), and within each group the
    /// unknown with the smallest dense id is pinned to zero.
    PerGroup { column: String },
}

impl References {
    pub fn keys<I: IntoIterator<Item = Key>>(keys: I) -> References {
        References::Keys {
            keys: keys.into_iter().collect(),
            slices: None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, References::None)
    }
}

/// Everything the engine needs to know about one family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FamilyDescriptor {
    pub kind: FamilyKind,

    /// The observation column supplying the grouping key. `None` means a
    /// single global parameter.
    #[serde(default)]
    pub input_column: Option<String>,

    /// The observation column whose value multiplies this family's unknown.
    /// `None` means 1.
    #[serde(default)]
    pub weight_column: Option<String>,

    #[serde(default)]
    pub references: References,

    /// A column splitting this family into independent copies, one per
    /// distinct key.
    #[serde(default)]
    pub time_slice_column: Option<String>,
}

impl FamilyDescriptor {
    /// A descriptor with the default input and weight columns of `kind` and
    /// no references.
    pub fn new(kind: FamilyKind) -> FamilyDescriptor {
        FamilyDescriptor {
            kind,
            input_column: kind.default_input_column().map(|s| s.to_string()),
            weight_column: kind.default_weight_column().map(|s| s.to_string()),
            references: References::None,
            time_slice_column: None,
        }
    }

    pub fn input_column(mut self, column: Option<&str>) -> Self {
        self.input_column = column.map(|s| s.to_string());
        self
    }

    pub fn weight_column(mut self, column: Option<&str>) -> Self {
        self.weight_column = column.map(|s| s.to_string());
        self
    }

    pub fn references(mut self, references: References) -> Self {
        self.references = references;
        self
    }

    pub fn reference_key<K: Into<Key>>(self, key: K) -> Self {
        self.references(References::keys([key.into()]))
    }

    pub fn time_slice_column(mut self, column: &str) -> Self {
        self.time_slice_column = Some(column.to_string());
        self
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let kind = self.kind;
        match (&self.references, kind) {
            (References::None, _) => (),
            (_, FamilyKind::StarMag) => return Err(ConfigError::ReferenceNotAllowed(kind)),
            (References::Keys { keys, .. }, FamilyKind::Zp) if keys.len() > 1 => {
                return Err(ConfigError::TooManyReferences {
                    family: kind,
                    num: keys.len(),
                })
            }
            (References::Keys { slices: Some(_), .. }, _) if self.time_slice_column.is_none() => {
                return Err(ConfigError::SlicesWithoutTimeDependence(kind))
            }
            _ => (),
        }

        match (&self.weight_column, kind) {
            (None, FamilyKind::KExt) => return Err(ConfigError::MissingWeight(kind)),
            (Some(w), _)
                if Some(w) == self.input_column.as_ref()
                    || Some(w) == self.time_slice_column.as_ref() =>
            {
                return Err(ConfigError::ContradictoryWeight {
                    family: kind,
                    column: w.clone(),
                })
            }
            _ => (),
        }

        if let Some(slice) = &self.time_slice_column {
            if Some(slice) == self.input_column.as_ref() {
                return Err(ConfigError::IncompatibleTimeSlice {
                    family: kind,
                    column: slice.clone(),
                });
            }
        }
        Ok(())
    }
}

/// The block of design-matrix columns occupied by one family.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FamilyLayout {
    pub family: FamilyKind,
    pub column_offset: usize,
    pub size: usize,
    pub reference_count: usize,
}

fn default_min_observations() -> usize {
    DEFAULT_MIN_OBSERVATIONS
}

fn default_magnitude_column() -> String {
    DEFAULT_MAG_COLUMN.to_string()
}

fn default_error_column() -> String {
    DEFAULT_MAG_ERR_COLUMN.to_string()
}

/// A validated description of a fit. Families are kept in canonical order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FitModel {
    families: Vec<FamilyDescriptor>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    cell_grid: Option<CellGrid>,

    #[serde(default = "default_min_observations")]
    min_observations: usize,

    /// The observed magnitudes (the target vector).
    #[serde(default = "default_magnitude_column")]
    magnitude_column: String,

    /// The 1σ uncertainties of the magnitudes.
    #[serde(default = "default_error_column")]
    error_column: String,
}

impl FitModel {
    /// Validate a choice of families. STAR_MAG must be active, and each family
    /// may appear at most once.
    pub fn configure(families: Vec<FamilyDescriptor>) -> Result<FitModel, ConfigError> {
        let mut model = FitModel {
            families,
            cell_grid: None,
            min_observations: DEFAULT_MIN_OBSERVATIONS,
            magnitude_column: default_magnitude_column(),
            error_column: default_error_column(),
        };
        model.families.sort_by_key(|f| f.kind);
        model.validate()?;
        debug!(
            "Configured a fit model with families: {}",
            model.family_kinds().iter().join(", ")
        );
        Ok(model)
    }

    /// Check the model. Models read from files are only checked here.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let kinds: Vec<FamilyKind> = self.families.iter().map(|f| f.kind).sorted().collect();
        if let Some(w) = kinds.windows(2).find(|w| w[0] == w[1]) {
            return Err(ConfigError::DuplicateFamily(w[0]));
        }
        if self.family(FamilyKind::StarMag).is_none() {
            return Err(ConfigError::MissingRequiredFamily(FamilyKind::StarMag));
        }
        if self.min_observations == 0 {
            return Err(ConfigError::ZeroMinObservations);
        }
        for family in &self.families {
            family.validate()?;
        }

        if self.family(FamilyKind::Zp).is_none() {
            warn!("No zero-point family in the fit model; magnitudes are not tied to exposures");
        }
        for family in &self.families {
            if family.references.is_none()
                && family.input_column.is_some()
                && family.kind != FamilyKind::StarMag
            {
                warn!(
                    "Family '{}' has no references; the normal matrix will likely be singular",
                    family.kind
                );
            }
        }
        Ok(())
    }

    /// Make a family independent per distinct key of `slice_column`.
    pub fn add_time_dependence(
        &mut self,
        kind: FamilyKind,
        slice_column: &str,
    ) -> Result<(), ConfigError> {
        let family = self
            .families
            .iter_mut()
            .find(|f| f.kind == kind)
            .ok_or(ConfigError::FamilyNotActive(kind))?;
        let previous = family.time_slice_column.replace(slice_column.to_string());
        if let Err(e) = family.validate() {
            family.time_slice_column = previous;
            return Err(e);
        }
        Ok(())
    }

    pub fn with_cell_grid(mut self, grid: CellGrid) -> FitModel {
        self.cell_grid = Some(grid);
        self
    }

    pub fn with_min_observations(mut self, min_observations: usize) -> Result<FitModel, ConfigError> {
        if min_observations == 0 {
            return Err(ConfigError::ZeroMinObservations);
        }
        self.min_observations = min_observations;
        Ok(self)
    }

    pub fn with_magnitude_columns(mut self, magnitude: &str, error: &str) -> FitModel {
        self.magnitude_column = magnitude.to_string();
        self.error_column = error.to_string();
        self
    }

    pub fn magnitude_column(&self) -> &str {
        &self.magnitude_column
    }

    pub fn error_column(&self) -> &str {
        &self.error_column
    }

    pub fn families(&self) -> &[FamilyDescriptor] {
        &self.families
    }

    /// The active families, in canonical order. Models built with
    /// [`FitModel::configure`] are already sorted; deserialised ones are
    /// sorted here.
    pub fn sorted_families(&self) -> Vec<&FamilyDescriptor> {
        self.families.iter().sorted_by_key(|f| f.kind).collect()
    }

    pub fn family(&self, kind: FamilyKind) -> Option<&FamilyDescriptor> {
        self.families.iter().find(|f| f.kind == kind)
    }

    pub fn is_active(&self, kind: FamilyKind) -> bool {
        self.family(kind).is_some()
    }

    pub fn family_kinds(&self) -> Vec<FamilyKind> {
        self.sorted_families().into_iter().map(|f| f.kind).collect()
    }

    pub fn cell_grid(&self) -> Option<CellGrid> {
        self.cell_grid
    }

    pub fn min_observations(&self) -> usize {
        self.min_observations
    }

    /// Columns that must be present in the observation table for this model.
    pub fn required_columns(&self) -> Vec<&str> {
        let mut columns = vec![self.magnitude_column.as_str(), self.error_column.as_str()];
        for f in &self.families {
            columns.extend(f.input_column.as_deref());
            columns.extend(f.weight_column.as_deref());
            columns.extend(f.time_slice_column.as_deref());
            if let References::PerGroup { column } = &f.references {
                columns.push(column.as_str());
            }
        }
        columns.into_iter().unique().collect()
    }

    /// A short string describing the active families, suitable for output
    /// file names, e.g. `_star_mag_night_zp_cell_off_384x440`.
    pub fn save_string(&self) -> String {
        let mut s = String::new();
        for f in self.sorted_families() {
            s.push('_');
            if let Some(slice) = &f.time_slice_column {
                s.push_str(slice);
                s.push('_');
            }
            s.push_str(&f.kind.to_string());
            if f.kind == FamilyKind::CellOff {
                s.push_str(&format!("_{}", self.cell_grid.unwrap_or_default()));
            }
        }
        s
    }

    /// The column block of every family after indexing and gauge fixing.
    pub fn summary(&self, index: &FitIndex, gauge: &GaugeFix) -> Vec<FamilyLayout> {
        index
            .families()
            .iter()
            .zip(index.offsets())
            .map(|(f, &offset)| FamilyLayout {
                family: f.kind(),
                column_offset: offset,
                size: f.size(),
                reference_count: gauge.num_references(f.kind()),
            })
            .collect()
    }
}
