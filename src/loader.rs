use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use crate::error::{RegressionError, Result};
use crate::Matrix;

/// A numeric table read from CSV, with its header names.
#[derive(Clone, Debug)]
pub struct LoadedTable {
    pub columns: Vec<String>,
    pub table: Matrix,
}

pub fn load_csv(path: &Path) -> Result<LoadedTable> {
    let file = File::open(path)?;
    let loaded = parse_csv(file)?;
    log::info!(
        "loaded {} rows x {} columns from {}",
        loaded.table.nrows(),
        loaded.table.ncols(),
        path.display()
    );
    Ok(loaded)
}

/// Parses comma separated numbers under a header row. Blank lines are skipped.
pub fn parse_csv<R: Read>(reader: R) -> Result<LoadedTable> {
    let mut lines = BufReader::new(reader).lines();

    let header = match lines.next() {
        Some(line) => line?,
        None => return Err(RegressionError::EmptyInput("csv has no header row".to_string())),
    };
    let columns: Vec<String> = header.split(',').map(|name| name.trim().to_string()).collect();

    let mut values = Vec::new();
    let mut n_rows = 0;
    for (index, line) in lines.enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let line_number = index + 2;

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() != columns.len() {
            return Err(RegressionError::Parse(format!(
                "line {}: expected {} fields, found {}",
                line_number,
                columns.len(),
                fields.len()
            )));
        }

        for field in fields {
            let value = field.trim().parse::<f64>().map_err(|_| {
                RegressionError::Parse(format!(
                    "line {}: '{}' is not a number",
                    line_number,
                    field.trim()
                ))
            })?;
            values.push(value);
        }
        n_rows += 1;
    }

    if n_rows == 0 {
        return Err(RegressionError::EmptyInput("csv has no data rows".to_string()));
    }

    let table = Matrix::from_shape_vec((n_rows, columns.len()), values)
        .map_err(|e| RegressionError::Parse(e.to_string()))?;

    Ok(LoadedTable { columns, table })
}
