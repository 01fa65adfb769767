//! Loading the prompt dataset from delimited text or a spreadsheet.

use std::path::{Path, PathBuf};

use calamine::{open_workbook_auto, Data, Reader};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::PromptRecord;
use crate::table::Table;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("unsupported dataset format {extension:?} for {path:?}; expected csv, tsv or a spreadsheet")]
    UnsupportedFormat { path: PathBuf, extension: String },
    #[error("read dataset {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parse delimited dataset {path:?}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
    #[error("open spreadsheet {path:?}: {source}")]
    Spreadsheet {
        path: PathBuf,
        #[source]
        source: calamine::Error,
    },
    #[error("spreadsheet {0:?} has no worksheets")]
    NoWorksheet(PathBuf),
    #[error("dataset has no column named {0:?}")]
    MissingColumn(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Delimited(u8),
    Spreadsheet,
}

fn detect_format(path: &Path) -> Result<Format, DatasetError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "csv" => Ok(Format::Delimited(b',')),
        "tsv" | "tab" => Ok(Format::Delimited(b'\t')),
        "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(Format::Spreadsheet),
        _ => Err(DatasetError::UnsupportedFormat { path: path.to_path_buf(), extension }),
    }
}

/// Read the dataset at `path` and drop columns with no values at all.
pub fn load_dataset(path: &Path) -> Result<Table, DatasetError> {
    let mut table = match detect_format(path)? {
        Format::Delimited(delimiter) => read_delimited(path, delimiter)?,
        Format::Spreadsheet => read_spreadsheet(path)?,
    };
    let dropped = table.drop_empty_columns();
    if !dropped.is_empty() {
        debug!(?dropped, "dropped empty dataset columns");
    }
    info!(path = %path.display(), rows = table.len(), columns = table.columns().len(), "dataset loaded");
    Ok(table)
}

/// Read a comma-separated file without dropping any columns.
pub fn read_csv(path: &Path) -> Result<Table, DatasetError> {
    read_delimited(path, b',')
}

fn read_delimited(path: &Path, delimiter: u8) -> Result<Table, DatasetError> {
    let bytes = std::fs::read(path).map_err(|source| DatasetError::Io { path: path.to_path_buf(), source })?;
    // Strips a UTF-8/UTF-16 BOM when present.
    let (text, encoding, had_errors) = encoding_rs::UTF_8.decode(&bytes);
    if had_errors {
        warn!(path = %path.display(), encoding = encoding.name(), "dataset contains malformed bytes; replaced");
    }
    parse_delimited(&text, delimiter).map_err(|source| DatasetError::Csv { path: path.to_path_buf(), source })
}

fn parse_delimited(text: &str, delimiter: u8) -> Result<Table, csv::Error> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(text.as_bytes());
    let columns = reader.headers()?.iter().map(str::to_string).collect();
    let mut table = Table::new(columns);
    for record in reader.records() {
        let record = record?;
        table.push_row(record.iter().map(non_empty).collect());
    }
    Ok(table)
}

fn read_spreadsheet(path: &Path) -> Result<Table, DatasetError> {
    let spreadsheet_err = |source| DatasetError::Spreadsheet { path: path.to_path_buf(), source };
    let mut workbook = open_workbook_auto(path).map_err(spreadsheet_err)?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| DatasetError::NoWorksheet(path.to_path_buf()))?
        .map_err(spreadsheet_err)?;

    let mut rows = range.rows();
    let Some(header) = rows.next() else {
        return Ok(Table::default());
    };
    let columns = header
        .iter()
        .enumerate()
        .map(|(i, c)| cell_text(c).unwrap_or_else(|| format!("Unnamed: {i}")))
        .collect();
    let mut table = Table::new(columns);
    for row in rows {
        table.push_row(row.iter().map(cell_text).collect());
    }
    Ok(table)
}

fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty => None,
        Data::String(s) => non_empty(s),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) => Some(f.to_string()),
        Data::Bool(b) => Some(b.to_string()),
        other => non_empty(&other.to_string()),
    }
}

fn non_empty(s: &str) -> Option<String> {
    (!s.is_empty()).then(|| s.to_string())
}

/// One prompt record per dataset row.
pub fn prompt_records(
    table: &Table,
    user_column: &str,
    system_column: Option<&str>,
) -> Result<Vec<PromptRecord>, DatasetError> {
    let users = table
        .column_values(user_column)
        .ok_or_else(|| DatasetError::MissingColumn(user_column.to_string()))?;
    let systems: Vec<Option<String>> = match system_column {
        Some(col) => table
            .column_values(col)
            .ok_or_else(|| DatasetError::MissingColumn(col.to_string()))?
            .map(|v| v.map(str::to_string))
            .collect(),
        None => vec![None; table.len()],
    };
    Ok(users
        .zip(systems)
        .map(|(user, system_prompt)| PromptRecord {
            user_prompt: user.unwrap_or_default().to_string(),
            system_prompt,
        })
        .collect())
}
