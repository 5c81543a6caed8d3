// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Typed columns and opaque keys.

use std::{borrow::Cow, fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use strum_macros::Display;

/// An opaque external identifier, e.g. a Gaia source id, an exposure id or a
/// detector channel id. Integers are preferred; anything that isn't written
/// as a plain integer (including "007") is kept as a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    Int(i64),
    Str(String),
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(i) => write!(f, "{i}"),
            Key::Str(s) => write!(f, "{s}"),
        }
    }
}

impl FromStr for Key {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Ok(match plain_int(s) {
            Some(i) => Key::Int(i),
            None => Key::Str(s.to_string()),
        })
    }
}

impl Key {
    /// Whether two keys name the same thing. An integer key matches a string
    /// key with the same decimal text, so a key given as text matches a key
    /// column of either type.
    pub fn matches(&self, other: &Key) -> bool {
        match (self, other) {
            (Key::Int(i), Key::Str(s)) | (Key::Str(s), Key::Int(i)) => *s == i.to_string(),
            _ => self == other,
        }
    }
}

/// Parse `s` as an integer only if writing the integer back gives `s`, so
/// that "01", "+1" and "-0" stay text.
pub(crate) fn plain_int(s: &str) -> Option<i64> {
    s.parse::<i64>().ok().filter(|i| i.to_string() == s)
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl From<i32> for Key {
    fn from(i: i32) -> Self {
        Key::Int(i64::from(i))
    }
}

impl From<u32> for Key {
    fn from(i: u32) -> Self {
        Key::Int(i64::from(i))
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::Str(s)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::Str(s.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ColumnType {
    #[strum(serialize = "integer")]
    Int,
    #[strum(serialize = "real")]
    Float,
    #[strum(serialize = "string")]
    Str,
}

/// A single typed column of the observation table. Integer and string columns
/// use `None` for nulls; real columns use NaN.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    Int(Vec<Option<i64>>),
    Float(Vec<f64>),
    Str(Vec<Option<String>>),
}

impl Column {
    pub fn len(&self) -> usize {
        match self {
            Column::Int(v) => v.len(),
            Column::Float(v) => v.len(),
            Column::Str(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_type(&self) -> ColumnType {
        match self {
            Column::Int(_) => ColumnType::Int,
            Column::Float(_) => ColumnType::Float,
            Column::Str(_) => ColumnType::Str,
        }
    }

    /// Can this column be used to group rows (i.e. does it hold keys)?
    pub fn is_key_type(&self) -> bool {
        !matches!(self, Column::Float(_))
    }

    pub fn is_null(&self, row: usize) -> bool {
        match self {
            Column::Int(v) => v[row].is_none(),
            Column::Float(v) => v[row].is_nan(),
            Column::Str(v) => v[row].is_none(),
        }
    }

    pub fn num_nulls(&self) -> usize {
        (0..self.len()).filter(|&i| self.is_null(i)).count()
    }

    /// The key at `row`. Real columns never yield keys.
    pub fn key(&self, row: usize) -> Option<Key> {
        match self {
            Column::Int(v) => v[row].map(Key::Int),
            Column::Float(_) => None,
            Column::Str(v) => v[row].as_ref().map(|s| Key::Str(s.clone())),
        }
    }

    /// The real value at `row`. Integers are promoted; strings are never real.
    pub fn float(&self, row: usize) -> Option<f64> {
        match self {
            Column::Int(v) => v[row].map(|i| i as f64),
            Column::Float(v) => Some(v[row]).filter(|f| !f.is_nan()),
            Column::Str(_) => None,
        }
    }

    /// All values as reals, with nulls as NaN. Only borrows when the column is
    /// already real.
    pub fn as_floats(&self) -> Option<Cow<'_, [f64]>> {
        match self {
            Column::Float(v) => Some(Cow::Borrowed(v)),
            Column::Int(v) => Some(Cow::Owned(
                v.iter()
                    .map(|i| i.map(|i| i as f64).unwrap_or(f64::NAN))
                    .collect(),
            )),
            Column::Str(_) => None,
        }
    }

    /// Gather the given rows into a new column.
    pub(crate) fn take(&self, rows: &[usize]) -> Column {
        match self {
            Column::Int(v) => Column::Int(rows.iter().map(|&i| v[i]).collect()),
            Column::Float(v) => Column::Float(rows.iter().map(|&i| v[i]).collect()),
            Column::Str(v) => Column::Str(rows.iter().map(|&i| v[i].clone()).collect()),
        }
    }

    /// Gather the given rows into a new column; `None` produces a null.
    pub(crate) fn take_optional(&self, rows: &[Option<usize>]) -> Column {
        match self {
            Column::Int(v) => Column::Int(rows.iter().map(|i| i.and_then(|i| v[i])).collect()),
            Column::Float(v) => Column::Float(
                rows.iter()
                    .map(|i| i.map(|i| v[i]).unwrap_or(f64::NAN))
                    .collect(),
            ),
            Column::Str(v) => {
                Column::Str(rows.iter().map(|i| i.and_then(|i| v[i].clone())).collect())
            }
        }
    }

    /// Build a key column from optional keys. The column is integer if every
    /// non-null key is an integer, otherwise string.
    pub fn from_keys(keys: Vec<Option<Key>>) -> Column {
        if keys.iter().flatten().all(|k| matches!(k, Key::Int(_))) {
            Column::Int(
                keys.into_iter()
                    .map(|k| match k {
                        Some(Key::Int(i)) => Some(i),
                        _ => None,
                    })
                    .collect(),
            )
        } else {
            Column::Str(keys.into_iter().map(|k| k.map(|k| k.to_string())).collect())
        }
    }

    /// A rendering of the value at `row` for text output. Nulls are empty.
    pub(crate) fn render(&self, row: usize) -> String {
        match self {
            Column::Int(v) => v[row].map(|i| i.to_string()).unwrap_or_default(),
            Column::Float(v) => {
                if v[row].is_nan() {
                    String::new()
                } else {
                    v[row].to_string()
                }
            }
            Column::Str(v) => v[row].clone().unwrap_or_default(),
        }
    }
}

impl From<Vec<i64>> for Column {
    fn from(v: Vec<i64>) -> Self {
        Column::Int(v.into_iter().map(Some).collect())
    }
}

impl From<Vec<u32>> for Column {
    fn from(v: Vec<u32>) -> Self {
        Column::Int(v.into_iter().map(|i| Some(i64::from(i))).collect())
    }
}

impl From<Vec<f64>> for Column {
    fn from(v: Vec<f64>) -> Self {
        Column::Float(v)
    }
}

impl From<Vec<&str>> for Column {
    fn from(v: Vec<&str>) -> Self {
        Column::Str(v.into_iter().map(|s| Some(s.to_string())).collect())
    }
}
