// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Gauge fixing: removal of reference columns from the design matrix.
//!
//! Without references the problem is degenerate, e.g. adding a constant to
//! every star magnitude and subtracting it from every zero point changes
//! nothing. Pinning one unknown per degeneracy to zero removes it.

use std::collections::{BTreeMap, BTreeSet};

use log::debug;
use thiserror::Error;

use crate::{
    design::DesignMatrix,
    index::{FamilyIndex, FitIndex},
    model::{ConfigError, FamilyDescriptor, FamilyKind, FitModel, References},
    store::{DataError, Key, ObservationTable},
};

#[derive(Error, Debug)]
pub enum GaugeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// The reference columns of every family, and the map from full columns to
/// the columns of the gauge-fixed matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct GaugeFix {
    /// The dense ids pinned to zero, per family in canonical order.
    references: Vec<(FamilyKind, Vec<u32>)>,
    /// `None` for a reference column.
    column_map: Vec<Option<usize>>,
    /// The full column of each reduced column.
    free_columns: Vec<usize>,
}

impl GaugeFix {
    pub fn build(
        table: &ObservationTable,
        model: &FitModel,
        index: &FitIndex,
    ) -> Result<GaugeFix, GaugeError> {
        let mut references = vec![];
        let mut column_map = Vec::with_capacity(index.num_columns());
        let mut free_columns = Vec::with_capacity(index.num_columns());

        for (descriptor, (family, &offset)) in model
            .sorted_families()
            .into_iter()
            .zip(index.families().iter().zip(index.offsets()))
        {
            debug_assert_eq!(descriptor.kind, family.kind());
            debug_assert_eq!(offset, column_map.len());
            let ids = reference_ids(table, descriptor, family)?;
            if !ids.is_empty() {
                debug!(
                    "Family '{}': pinning {} of {} unknowns",
                    family.kind(),
                    ids.len(),
                    family.size()
                );
            }
            for id in 0..family.size() {
                // Dense ids fit in a u32.
                if ids.contains(&(id as u32)) {
                    column_map.push(None);
                } else {
                    column_map.push(Some(free_columns.len()));
                    free_columns.push(offset + id);
                }
            }
            references.push((family.kind(), ids.into_iter().collect()));
        }

        Ok(GaugeFix {
            references,
            column_map,
            free_columns,
        })
    }

    /// Drop the reference columns from `a` and renumber the rest.
    pub fn apply(&self, a: &DesignMatrix) -> DesignMatrix {
        assert_eq!(a.num_cols(), self.column_map.len());
        let mut rows = Vec::with_capacity(a.nnz());
        let mut cols = Vec::with_capacity(a.nnz());
        let mut vals = Vec::with_capacity(a.nnz());
        for (r, c, v) in a.triplets() {
            if let Some(reduced) = self.column_map[c] {
                rows.push(r);
                cols.push(reduced);
                vals.push(v);
            }
        }
        DesignMatrix::from_parts(a.num_rows(), self.num_free(), rows, cols, vals)
    }

    /// Scatter a solution of the gauge-fixed problem back into a full
    /// parameter vector; references are zero.
    pub fn expand(&self, reduced: &[f64]) -> Vec<f64> {
        assert_eq!(reduced.len(), self.num_free());
        self.column_map
            .iter()
            .map(|c| c.map(|c| reduced[c]).unwrap_or(0.0))
            .collect()
    }

    pub fn reference_ids(&self, kind: FamilyKind) -> &[u32] {
        self.references
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, ids)| ids.as_slice())
            .unwrap_or(&[])
    }

    pub fn num_references(&self, kind: FamilyKind) -> usize {
        self.reference_ids(kind).len()
    }

    pub fn total_references(&self) -> usize {
        self.column_map.iter().filter(|c| c.is_none()).count()
    }

    pub fn is_reference(&self, kind: FamilyKind, id: u32) -> bool {
        self.reference_ids(kind).binary_search(&id).is_ok()
    }

    pub fn column_map(&self) -> &[Option<usize>] {
        &self.column_map
    }

    /// The number of unknowns left after gauge fixing.
    pub fn num_free(&self) -> usize {
        self.free_columns.len()
    }

    /// The full column of a reduced column.
    pub fn full_column(&self, reduced: usize) -> Option<usize> {
        self.free_columns.get(reduced).copied()
    }
}

fn reference_ids(
    table: &ObservationTable,
    descriptor: &FamilyDescriptor,
    family: &FamilyIndex,
) -> Result<BTreeSet<u32>, GaugeError> {
    let kind = family.kind();
    let mut ids = BTreeSet::new();
    match &descriptor.references {
        References::None => (),

        References::Keys { keys, slices } => {
            let observed_slices: BTreeSet<&Key> =
                family.keys().iter().filter_map(|k| k.slice.as_ref()).collect();
            if let Some(slices) = slices {
                for slice in slices {
                    if !observed_slices.iter().any(|s| s.matches(slice)) {
                        return Err(ConfigError::UnknownReferenceSlice {
                            family: kind,
                            slice: slice.clone(),
                        }
                        .into());
                    }
                }
            }

            for key in keys {
                let mut found = false;
                for (id, pk) in family.keys().iter().enumerate() {
                    if !pk.base.as_ref().map_or(false, |base| base.matches(key)) {
                        continue;
                    }
                    let in_slice = match (slices, &pk.slice) {
                        (Some(slices), Some(s)) => slices.iter().any(|slice| slice.matches(s)),
                        _ => true,
                    };
                    if in_slice {
                        ids.insert(id as u32);
                        found = true;
                    }
                }
                if !found {
                    return Err(ConfigError::UnknownReference {
                        family: kind,
                        key: key.clone(),
                    }
                    .into());
                }
            }
        }

        References::PerGroup { column } => {
            let groups = table.key_column(column)?;
            let mut smallest: BTreeMap<(Key, Option<&Key>), u32> = BTreeMap::new();
            for (row, &id) in family.ids().iter().enumerate() {
                let group = groups.key(row).ok_or_else(|| DataError::Null {
                    column: column.clone(),
                    row,
                })?;
                let slice = family.keys()[id as usize].slice.as_ref();
                smallest
                    .entry((group, slice))
                    .and_modify(|s| *s = (*s).min(id))
                    .or_insert(id);
            }
            ids.extend(smallest.into_values());
        }
    }
    Ok(ids)
}
