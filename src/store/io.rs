// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Reading and writing observation tables as CSV.
//!
//! Column types are inferred: a column is integer if every non-empty cell is
//! a plainly written `i64`, real if every non-empty cell parses as an `f64`
//! and none is a zero-padded integer, and string otherwise. Empty cells are
//! nulls.

use std::{
    collections::HashSet,
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
};

use log::debug;

use super::{column::plain_int, Column, ObservationTable, ReadTableError, WriteTableError};

pub fn read_csv<P: AsRef<Path>>(path: P) -> Result<ObservationTable, ReadTableError> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(ReadTableError::FileDoesntExist(path.to_path_buf()));
    }
    let file = BufReader::new(File::open(path)?);
    let table = read_csv_inner(file, path)?;
    debug!(
        "Read {} rows and {} columns from {}",
        table.num_rows(),
        table.num_columns(),
        path.display()
    );
    Ok(table)
}

/// Read a table from anything readable. Useful for tests and pipes.
pub fn read_csv_from_reader<R: Read>(reader: R) -> Result<ObservationTable, ReadTableError> {
    read_csv_inner(reader, Path::new("<reader>"))
}

fn read_csv_inner<R: Read>(reader: R, file: &Path) -> Result<ObservationTable, ReadTableError> {
    let csv_err = |source| ReadTableError::Csv {
        file: file.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .comment(Some(b'#'))
        .from_reader(reader);
    let headers: Vec<String> = reader
        .headers()
        .map_err(csv_err)?
        .iter()
        .map(|h| h.to_string())
        .collect();
    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(ReadTableError::NoColumns(file.to_path_buf()));
    }
    let mut seen = HashSet::new();
    for h in &headers {
        if !seen.insert(h.as_str()) {
            return Err(ReadTableError::DuplicateColumn {
                file: file.to_path_buf(),
                column: h.clone(),
            });
        }
    }

    let mut raw: Vec<Vec<String>> = vec![vec![]; headers.len()];
    for record in reader.records() {
        let record = record.map_err(csv_err)?;
        for (cells, cell) in raw.iter_mut().zip(record.iter()) {
            cells.push(cell.to_string());
        }
    }

    let mut table = ObservationTable::new();
    for (name, cells) in headers.into_iter().zip(raw) {
        table.add_column(name, infer_column(cells))?;
    }
    Ok(table)
}

fn infer_column(cells: Vec<String>) -> Column {
    let non_empty = || cells.iter().filter(|c| !c.is_empty());
    // Ids with leading zeros are text; "01" and "1" are different keys.
    let padded_int = |c: &String| plain_int(c).is_none() && c.parse::<i64>().is_ok();
    if non_empty().all(|c| plain_int(c).is_some()) {
        Column::Int(cells.iter().map(|c| plain_int(c)).collect())
    } else if !non_empty().any(padded_int) && non_empty().all(|c| c.parse::<f64>().is_ok()) {
        Column::Float(
            cells
                .iter()
                .map(|c| c.parse().unwrap_or(f64::NAN))
                .collect(),
        )
    } else {
        Column::Str(
            cells
                .into_iter()
                .map(|c| if c.is_empty() { None } else { Some(c) })
                .collect(),
        )
    }
}

pub fn write_csv<P: AsRef<Path>>(table: &ObservationTable, path: P) -> Result<(), WriteTableError> {
    let path = path.as_ref();
    let file = BufWriter::new(File::create(path)?);
    write_csv_inner(table, file, path)?;
    debug!("Wrote {} rows to {}", table.num_rows(), path.display());
    Ok(())
}

pub fn write_csv_to_writer<W: Write>(
    table: &ObservationTable,
    writer: W,
) -> Result<(), WriteTableError> {
    write_csv_inner(table, writer, Path::new("<writer>"))
}

fn write_csv_inner<W: Write>(
    table: &ObservationTable,
    writer: W,
    file: &Path,
) -> Result<(), WriteTableError> {
    let csv_err = |source| WriteTableError::Csv {
        file: PathBuf::from(file),
        source,
    };

    let mut writer = csv::Writer::from_writer(writer);
    writer
        .write_record(table.column_names())
        .map_err(csv_err)?;
    let columns: Vec<&Column> = table.columns().map(|(_, c)| c).collect();
    for row in 0..table.num_rows() {
        writer
            .write_record(columns.iter().map(|c| c.render(row)))
            .map_err(csv_err)?;
    }
    writer.flush()?;
    Ok(())
}
