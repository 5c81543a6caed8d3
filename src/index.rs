// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Dense, deterministic re-indexing of external keys into contiguous column
//! indices.
//!
//! Distinct keys are numbered in order of first appearance in the
//! observations, so two runs on the same table give the same ids. A family
//! sliced in time first composes its base id with the slice id as
//! `base + slice × base_size`, then numbers the observed composites in
//! ascending order. When every (key, slice) combination is observed the
//! composite id is used as is.

use std::{collections::HashMap, fmt};

use log::{debug, trace};
use thiserror::Error;

use crate::{
    model::{FamilyDescriptor, FamilyKind, FitModel},
    store::{Column, DataError, Key, ObservationTable},
};

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("No observations are left after requiring at least {min_obs} observations per star (column '{column}')")]
    NoObservationsLeft { min_obs: usize, column: String },

    #[error("Family '{0}' has more unknowns than can be indexed")]
    TooManyParameters(FamilyKind),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// The external identity of one unknown: the key of its grouping column (none
/// for global families) and, for time-sliced families, the key of its slice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParameterKey {
    pub base: Option<Key>,
    pub slice: Option<Key>,
}

impl fmt::Display for ParameterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.base, &self.slice) {
            (Some(b), Some(s)) => write!(f, "{b}@{s}"),
            (Some(b), None) => write!(f, "{b}"),
            (None, Some(s)) => write!(f, "global@{s}"),
            (None, None) => write!(f, "global"),
        }
    }
}

/// Number the distinct keys of a column in order of first appearance.
/// Returns the per-row ids and the key of every id. Nulls are an error.
pub fn dense_ids(column: &Column, name: &str) -> Result<(Vec<u32>, Vec<Key>), DataError> {
    if !column.is_key_type() {
        return Err(DataError::NotAKeyColumn {
            name: name.to_string(),
            column_type: column.column_type(),
        });
    }
    let mut lookup: HashMap<Key, u32> = HashMap::new();
    let mut keys = vec![];
    let mut ids = Vec::with_capacity(column.len());
    for row in 0..column.len() {
        let key = column.key(row).ok_or_else(|| DataError::Null {
            column: name.to_string(),
            row,
        })?;
        let id = *lookup.entry(key).or_insert_with_key(|k| {
            keys.push(k.clone());
            (keys.len() - 1) as u32
        });
        ids.push(id);
    }
    Ok((ids, keys))
}

/// Drop every star with fewer than `min_obs` observations. The input table is
/// untouched.
pub fn filter_min_observations(
    table: &ObservationTable,
    star_column: &str,
    min_obs: usize,
) -> Result<ObservationTable, IndexError> {
    let (ids, keys) = dense_ids(table.key_column(star_column)?, star_column)?;
    let mut counts = vec![0_usize; keys.len()];
    for &id in &ids {
        counts[id as usize] += 1;
    }
    let mask: Vec<bool> = ids.iter().map(|&id| counts[id as usize] >= min_obs).collect();
    let filtered = table.retain_mask(&mask);
    debug!(
        "Minimum of {min_obs} observations per star: kept {} of {} stars ({} of {} rows)",
        counts.iter().filter(|&&c| c >= min_obs).count(),
        keys.len(),
        filtered.num_rows(),
        table.num_rows()
    );
    if filtered.is_empty() {
        return Err(IndexError::NoObservationsLeft {
            min_obs,
            column: star_column.to_string(),
        });
    }
    Ok(filtered)
}

/// The dense ids of a single family.
#[derive(Debug, Clone, PartialEq)]
pub struct FamilyIndex {
    kind: FamilyKind,
    /// One id per observation row.
    ids: Vec<u32>,
    /// One key per id.
    keys: Vec<ParameterKey>,
    base_size: usize,
    num_slices: usize,
}

impl FamilyIndex {
    pub fn build(
        table: &ObservationTable,
        family: &FamilyDescriptor,
    ) -> Result<FamilyIndex, IndexError> {
        let num_rows = table.num_rows();
        let (base_ids, base_keys) = match &family.input_column {
            Some(c) => {
                let (ids, keys) = dense_ids(table.key_column(c)?, c)?;
                (ids, keys.into_iter().map(Some).collect())
            }
            None => (vec![0; num_rows], vec![None]),
        };

        let Some(slice_column) = &family.time_slice_column else {
            return Ok(FamilyIndex {
                kind: family.kind,
                ids: base_ids,
                base_size: base_keys.len(),
                keys: base_keys
                    .into_iter()
                    .map(|base| ParameterKey { base, slice: None })
                    .collect(),
                num_slices: 1,
            });
        };

        let (slice_ids, slice_keys) = dense_ids(table.key_column(slice_column)?, slice_column)?;
        let base_size = base_keys.len() as u64;
        let composite: Vec<u64> = base_ids
            .iter()
            .zip(&slice_ids)
            .map(|(&b, &s)| u64::from(b) + u64::from(s) * base_size)
            .collect();
        let mut observed = composite.clone();
        observed.sort_unstable();
        observed.dedup();
        if observed.len() > u32::MAX as usize {
            return Err(IndexError::TooManyParameters(family.kind));
        }
        let lookup: HashMap<u64, u32> = observed
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as u32))
            .collect();
        let ids = composite.iter().map(|c| lookup[c]).collect();
        let keys = observed
            .iter()
            .map(|&c| ParameterKey {
                base: base_keys[(c % base_size) as usize].clone(),
                slice: Some(slice_keys[(c / base_size) as usize].clone()),
            })
            .collect();
        trace!(
            "Family '{}' sliced by '{slice_column}': {} base keys × {} slices, {} observed",
            family.kind,
            base_size,
            slice_keys.len(),
            observed.len()
        );

        Ok(FamilyIndex {
            kind: family.kind,
            ids,
            keys,
            base_size: base_size as usize,
            num_slices: slice_keys.len(),
        })
    }

    pub fn kind(&self) -> FamilyKind {
        self.kind
    }

    pub fn ids(&self) -> &[u32] {
        &self.ids
    }

    pub fn keys(&self) -> &[ParameterKey] {
        &self.keys
    }

    /// The number of unknowns in this family.
    pub fn size(&self) -> usize {
        self.keys.len()
    }

    /// The number of distinct keys of the grouping column.
    pub fn base_size(&self) -> usize {
        self.base_size
    }

    pub fn num_slices(&self) -> usize {
        self.num_slices
    }

    pub fn is_sliced(&self) -> bool {
        self.keys.first().map(|k| k.slice.is_some()).unwrap_or(false)
    }

    pub fn to_column(&self) -> Column {
        Column::Int(self.ids.iter().map(|&id| Some(i64::from(id))).collect())
    }
}

/// The dense ids of every active family and the layout of their column
/// blocks. Blocks follow the canonical family order.
#[derive(Debug, Clone, PartialEq)]
pub struct FitIndex {
    families: Vec<FamilyIndex>,
    offsets: Vec<usize>,
    num_columns: usize,
}

impl FitIndex {
    pub fn build(table: &ObservationTable, model: &FitModel) -> Result<FitIndex, IndexError> {
        let mut families = vec![];
        let mut offsets = vec![];
        let mut num_columns = 0;
        for family in model.sorted_families() {
            let index = FamilyIndex::build(table, family)?;
            debug!(
                "Family '{}': {} unknowns at column offset {num_columns}",
                family.kind,
                index.size()
            );
            offsets.push(num_columns);
            num_columns += index.size();
            families.push(index);
        }
        Ok(FitIndex {
            families,
            offsets,
            num_columns,
        })
    }

    pub fn families(&self) -> &[FamilyIndex] {
        &self.families
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    /// The total number of unknowns before gauge fixing.
    pub fn num_columns(&self) -> usize {
        self.num_columns
    }

    pub fn family(&self, kind: FamilyKind) -> Option<(&FamilyIndex, usize)> {
        self.families
            .iter()
            .zip(&self.offsets)
            .find(|(f, _)| f.kind == kind)
            .map(|(f, &o)| (f, o))
    }

    /// Find the family and key of a full (pre-gauge) column.
    pub fn locate(&self, column: usize) -> Option<(FamilyKind, &ParameterKey)> {
        self.families
            .iter()
            .zip(&self.offsets)
            .find(|(f, &o)| column >= o && column < o + f.size())
            .map(|(f, &o)| (f.kind, &f.keys[column - o]))
    }

    /// The `u_<family>` columns.
    pub fn to_columns(&self) -> Vec<(String, Column)> {
        self.families
            .iter()
            .map(|f| (f.kind.id_column(), f.to_column()))
            .collect()
    }
}
