//! Plain-text matrix and value-list files.
//!
//! Layout (row-major):
//!
//! ```text
//! m=2
//! n=3
//! 0.1,0.2,0.3
//! 0.4,0.5,0.6
//! ```
//!
//! The `m=`/`n=` header is optional. With a header the values may be laid
//! out freely; without one every non-empty line is a row. Values are
//! separated by commas and/or whitespace; `#` starts a comment line.

use crate::error::{Error, Result};
use csv::{ReaderBuilder, StringRecord, Trim, WriterBuilder};
use ndarray::Array2;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// Read a matrix file
pub fn read_matrix<P: AsRef<Path>>(path: P) -> Result<Array2<f64>> {
    let file = File::open(path.as_ref())?;
    parse_matrix(BufReader::new(file), &path.as_ref().display().to_string())
}

/// Write a matrix file with an explicit `m=`/`n=` header
pub fn write_matrix<P: AsRef<Path>>(path: P, matrix: &Array2<f64>) -> Result<()> {
    let file = File::create(path.as_ref())?;
    write_matrix_to(BufWriter::new(file), matrix)
}

pub(crate) fn write_matrix_to<W: Write>(mut writer: W, matrix: &Array2<f64>) -> Result<()> {
    writeln!(writer, "m={}", matrix.nrows())?;
    writeln!(writer, "n={}", matrix.ncols())?;
    let mut wtr = WriterBuilder::new().has_headers(false).from_writer(writer);
    for row in matrix.rows() {
        wtr.serialize(row.to_vec())?;
    }
    wtr.flush()?;
    Ok(())
}

fn csv_reader<R: Read>(input: R) -> csv::Reader<R> {
    ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_reader(input)
}

/// Values of one record; fields may hold several whitespace-separated values
fn tokens(record: &StringRecord) -> impl Iterator<Item = &str> {
    record.iter().flat_map(str::split_whitespace)
}

fn line_of(record: &StringRecord) -> usize {
    record.position().map_or(0, |p| p.line() as usize)
}

pub(crate) fn parse_matrix<R: Read>(input: R, source_name: &str) -> Result<Array2<f64>> {
    let parse_err = |line: usize, message: String| Error::Parse {
        source_name: source_name.to_string(),
        line,
        message,
    };

    let mut m: Option<usize> = None;
    let mut n: Option<usize> = None;
    let mut rows: Vec<Vec<f64>> = Vec::new();

    for record in csv_reader(input).records() {
        let record = record?;
        let line_no = line_of(&record);
        if record.len() == 1
            && let Some((key, value)) = record[0].split_once('=')
        {
            let count = value
                .trim()
                .parse::<usize>()
                .map_err(|_| parse_err(line_no, format!("bad header value '{}'", value.trim())))?;
            match key.trim().to_ascii_lowercase().as_str() {
                "m" => m = Some(count),
                "n" => n = Some(count),
                other => return Err(parse_err(line_no, format!("unknown header '{}'", other))),
            }
            continue;
        }
        let row = tokens(&record)
            .map(|t| {
                t.parse::<f64>()
                    .map_err(|_| parse_err(line_no, format!("bad number '{}'", t)))
            })
            .collect::<Result<Vec<f64>>>()?;
        if !row.is_empty() {
            rows.push(row);
        }
    }

    let values: Vec<f64>;
    let shape = match (m, n) {
        (Some(m), Some(n)) => {
            values = rows.into_iter().flatten().collect();
            if values.len() != m * n {
                return Err(parse_err(
                    0,
                    format!("header declares {}x{} but found {} values", m, n, values.len()),
                ));
            }
            (m, n)
        }
        _ => {
            let cols = rows.first().map(Vec::len).unwrap_or(0);
            if let Some(bad) = rows.iter().position(|r| r.len() != cols) {
                return Err(parse_err(
                    0,
                    format!("row {} has {} values, expected {}", bad + 1, rows[bad].len(), cols),
                ));
            }
            let shape = (rows.len(), cols);
            values = rows.into_iter().flatten().collect();
            shape
        }
    };

    Array2::from_shape_vec(shape, values).map_err(|e| Error::Other(e.to_string()))
}

/// Read a list of numbers (one or more per line).
///
/// Malformed entries are skipped with a warning instead of failing the read.
pub fn read_value_list<P: AsRef<Path>>(path: P) -> Result<Vec<f64>> {
    let file = File::open(path.as_ref())?;
    parse_value_list(BufReader::new(file), &path.as_ref().display().to_string())
}

pub(crate) fn parse_value_list<R: Read>(input: R, source_name: &str) -> Result<Vec<f64>> {
    let mut values = Vec::new();
    for record in csv_reader(input).records() {
        let record = record?;
        for token in tokens(&record) {
            match token.parse::<f64>() {
                Ok(v) => values.push(v),
                Err(_) => tracing::warn!(
                    source = source_name,
                    line = line_of(&record),
                    token,
                    "skipping malformed value"
                ),
            }
        }
    }
    Ok(values)
}
