// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! The observation store: an in-memory, column-oriented table of photometric
//! measurements (one row per measurement of one star on one detector
//! channel).
//!
//! Tables are treated as values. Filtering produces a new table, so an input
//! table handed to the fitting engine is never modified; derived columns are
//! written either onto a table the caller owns or onto the solution view.

mod column;
mod error;
mod io;

pub use column::{Column, ColumnType, Key};
pub use error::{DataError, ReadTableError, WriteTableError};
pub use io::{read_csv, read_csv_from_reader, write_csv, write_csv_to_writer};

use std::{borrow::Cow, collections::HashMap};

use indexmap::IndexMap;
use log::trace;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObservationTable {
    num_rows: usize,
    columns: IndexMap<String, Column>,
}

/// A borrowed view of a single row, handed to filter predicates.
#[derive(Clone, Copy)]
pub struct Row<'a> {
    table: &'a ObservationTable,
    index: usize,
}

impl Row<'_> {
    pub fn index(&self) -> usize {
        self.index
    }

    /// The real value of `column` on this row. Missing columns, nulls and
    /// string columns yield `None`.
    pub fn float(&self, column: &str) -> Option<f64> {
        self.table
            .columns
            .get(column)
            .and_then(|c| c.float(self.index))
    }

    /// The key of `column` on this row. Missing columns, nulls and real
    /// columns yield `None`.
    pub fn key(&self, column: &str) -> Option<Key> {
        self.table
            .columns
            .get(column)
            .and_then(|c| c.key(self.index))
    }

    pub fn is_null(&self, column: &str) -> bool {
        self.table
            .columns
            .get(column)
            .map(|c| c.is_null(self.index))
            .unwrap_or(true)
    }
}

impl ObservationTable {
    pub fn new() -> ObservationTable {
        ObservationTable::default()
    }

    /// Build a table from named columns. All columns must be the same length.
    pub fn from_columns<S, I>(columns: I) -> Result<ObservationTable, DataError>
    where
        S: Into<String>,
        I: IntoIterator<Item = (S, Column)>,
    {
        let mut table = ObservationTable::new();
        for (name, column) in columns {
            table.add_column(name, column)?;
        }
        Ok(table)
    }

    pub fn num_rows(&self) -> usize {
        self.num_rows
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows == 0
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(|s| s.as_str())
    }

    pub fn columns(&self) -> impl Iterator<Item = (&str, &Column)> {
        self.columns.iter().map(|(n, c)| (n.as_str(), c))
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains_key(name)
    }

    pub fn column(&self, name: &str) -> Result<&Column, DataError> {
        self.columns
            .get(name)
            .ok_or_else(|| DataError::MissingColumn {
                name: name.to_string(),
            })
    }

    /// Get a column that must hold keys (integers or strings).
    pub fn key_column(&self, name: &str) -> Result<&Column, DataError> {
        let column = self.column(name)?;
        if column.is_key_type() {
            Ok(column)
        } else {
            Err(DataError::NotAKeyColumn {
                name: name.to_string(),
                column_type: column.column_type(),
            })
        }
    }

    /// Get a column's values as reals. Integer columns are promoted; nulls
    /// are NaN.
    pub fn floats(&self, name: &str) -> Result<Cow<'_, [f64]>, DataError> {
        let column = self.column(name)?;
        column.as_floats().ok_or_else(|| DataError::NotARealColumn {
            name: name.to_string(),
            column_type: column.column_type(),
        })
    }

    /// Assign a column. An existing column with the same name is replaced.
    /// The first column added to an empty table sets the number of rows.
    pub fn add_column<S: Into<String>>(&mut self, name: S, column: Column) -> Result<(), DataError> {
        let name = name.into();
        if self.columns.is_empty() {
            self.num_rows = column.len();
        } else if column.len() != self.num_rows {
            return Err(DataError::ColumnLength {
                name,
                expected: self.num_rows,
                got: column.len(),
            });
        }
        trace!("Assigning {} column '{name}'", column.column_type());
        self.columns.insert(name, column);
        Ok(())
    }

    /// Derive a new key column by mapping every key of `from` through
    /// `mapping`. Keys absent from the mapping produce nulls.
    pub fn derive_from(
        &mut self,
        name: &str,
        from: &str,
        mapping: &HashMap<Key, Key>,
    ) -> Result<(), DataError> {
        let source = self.key_column(from)?;
        let keys = (0..self.num_rows)
            .map(|i| source.key(i).and_then(|k| mapping.get(&k).cloned()))
            .collect();
        self.add_column(name, Column::from_keys(keys))
    }

    /// Derive a new column by joining `key_column` of this table against
    /// `other_key_column` of `other` and copying `value_column` of `other`.
    /// Only the first occurrence of each key in `other` is used. Keys that
    /// don't appear in `other` produce nulls.
    pub fn map_from_table(
        &mut self,
        key_column: &str,
        other: &ObservationTable,
        other_key_column: &str,
        value_column: &str,
        name: &str,
    ) -> Result<(), DataError> {
        let other_keys = other.key_column(other_key_column)?;
        let other_values = other.column(value_column)?;
        let mut first_occurrence: HashMap<Key, usize> = HashMap::new();
        for i in 0..other.num_rows {
            if let Some(k) = other_keys.key(i) {
                first_occurrence.entry(k).or_insert(i);
            }
        }

        let keys = self.key_column(key_column)?;
        let rows: Vec<Option<usize>> = (0..self.num_rows)
            .map(|i| keys.key(i).and_then(|k| first_occurrence.get(&k).copied()))
            .collect();
        let column = other_values.take_optional(&rows);
        self.add_column(name, column)
    }

    /// Return a new table containing only the rows for which `predicate` is
    /// true. Calls can be chained.
    pub fn filter<P>(&self, predicate: P) -> ObservationTable
    where
        P: Fn(Row<'_>) -> bool,
    {
        let rows: Vec<usize> = (0..self.num_rows)
            .filter(|&index| predicate(Row { table: self, index }))
            .collect();
        self.take_rows(&rows)
    }

    /// Return a new table containing only the rows with a `true` mask entry.
    pub fn retain_mask(&self, mask: &[bool]) -> ObservationTable {
        assert_eq!(mask.len(), self.num_rows);
        let rows: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter_map(|(i, &keep)| keep.then_some(i))
            .collect();
        self.take_rows(&rows)
    }

    /// Return a new table without any row that has a null in one of the
    /// `required` columns.
    pub fn drop_nulls(&self, required: &[&str]) -> Result<ObservationTable, DataError> {
        let columns = required
            .iter()
            .map(|name| self.column(name))
            .collect::<Result<Vec<_>, _>>()?;
        let mask: Vec<bool> = (0..self.num_rows)
            .map(|i| columns.iter().all(|c| !c.is_null(i)))
            .collect();
        Ok(self.retain_mask(&mask))
    }

    /// Return a new table without any row that has a null in any column.
    pub fn drop_all_nulls(&self) -> ObservationTable {
        let mask: Vec<bool> = (0..self.num_rows)
            .map(|i| self.columns.values().all(|c| !c.is_null(i)))
            .collect();
        self.retain_mask(&mask)
    }

    /// Return a copy of this table with extra columns appended.
    pub fn with_columns<I>(&self, extra: I) -> Result<ObservationTable, DataError>
    where
        I: IntoIterator<Item = (String, Column)>,
    {
        let mut table = self.clone();
        for (name, column) in extra {
            table.add_column(name, column)?;
        }
        Ok(table)
    }

    pub(crate) fn take_rows(&self, rows: &[usize]) -> ObservationTable {
        ObservationTable {
            num_rows: rows.len(),
            columns: self
                .columns
                .iter()
                .map(|(n, c)| (n.clone(), c.take(rows)))
                .collect(),
        }
    }
}
