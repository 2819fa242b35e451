//! Tabular file decoding: delimited text through `csv`, workbooks through
//! `calamine`. Output is a header list plus one [`SourceRow`] per non-blank
//! data row.

use std::{
    collections::HashSet,
    io::Cursor,
    path::Path,
};

use anyhow::{Context, Result, anyhow, bail};
use calamine::{Data, Reader, open_workbook_auto_from_rs};
use log::{debug, info};

use crate::{
    data::{CellValue, SourceRow},
    io_utils,
    normalize::spreadsheet_serial_to_datetime,
    store::SourceFile,
};

const WORKBOOK_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
    /// Worksheet to read; the first one when unset.
    pub sheet: Option<String>,
    pub delimiter: Option<u8>,
    pub encoding: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedSheet {
    pub file_name: String,
    pub sheet_name: Option<String>,
    pub columns: Vec<String>,
    pub rows: Vec<SourceRow>,
    pub content_hash: String,
}

impl DecodedSheet {
    pub fn source_file(&self) -> SourceFile {
        SourceFile {
            file_name: self.file_name.clone(),
            sheet_name: self.sheet_name.clone(),
            file_hash: Some(self.content_hash.clone()),
        }
    }
}

pub fn is_workbook(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| {
            WORKBOOK_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
}

fn display_name(path: &Path) -> String {
    if io_utils::is_dash(path) {
        return "stdin".to_string();
    }
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

pub fn decode_file(path: &Path, options: &DecodeOptions) -> Result<DecodedSheet> {
    let bytes = io_utils::read_input_bytes(path)?;
    let content_hash = io_utils::content_hash(&bytes);
    let (sheet_name, columns, rows) = if is_workbook(path) {
        let (name, columns, rows) = decode_workbook(bytes, options.sheet.as_deref())
            .with_context(|| format!("Reading workbook {path:?}"))?;
        (Some(name), columns, rows)
    } else {
        let (columns, rows) = decode_delimited(path, &bytes, options)
            .with_context(|| format!("Reading delimited file {path:?}"))?;
        (None, columns, rows)
    };
    if rows.is_empty() {
        bail!("{path:?} has no data rows");
    }
    info!(
        "Decoded {} row(s) and {} column(s) from {path:?}",
        rows.len(),
        columns.len()
    );
    Ok(DecodedSheet {
        file_name: display_name(path),
        sheet_name,
        columns,
        rows,
        content_hash,
    })
}

/// Worksheet names of a workbook, in workbook order.
pub fn list_sheets(path: &Path) -> Result<Vec<String>> {
    let bytes = io_utils::read_input_bytes(path)?;
    let workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .with_context(|| format!("Opening workbook {path:?}"))?;
    Ok(workbook.sheet_names())
}

/// Trimmed header labels with blanks dropped (`None`) and repeats suffixed
/// `_1`, `_2`, ...
pub fn unique_headers<I, S>(raw: I) -> Vec<Option<String>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    raw.into_iter()
        .map(|label| {
            let label = label.as_ref().trim();
            if label.is_empty() {
                return None;
            }
            let mut candidate = label.to_string();
            let mut suffix = 1;
            while !seen.insert(candidate.clone()) {
                candidate = format!("{label}_{suffix}");
                suffix += 1;
            }
            Some(candidate)
        })
        .collect()
}

fn labelled_columns(headers: &[Option<String>]) -> Vec<String> {
    headers.iter().flatten().cloned().collect()
}

fn build_row<I>(row_number: usize, headers: &[Option<String>], cells: I) -> SourceRow
where
    I: IntoIterator<Item = CellValue>,
{
    let mut row = SourceRow::new(row_number);
    for (header, cell) in headers.iter().zip(cells) {
        if let Some(label) = header {
            row.insert(label.clone(), cell);
        }
    }
    row
}

fn decode_delimited(
    path: &Path,
    bytes: &[u8],
    options: &DecodeOptions,
) -> Result<(Vec<String>, Vec<SourceRow>)> {
    let encoding = io_utils::resolve_encoding(options.encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(path, options.delimiter, bytes);
    debug!(
        "Delimited input: delimiter '{}', encoding {}",
        delimiter as char,
        encoding.name()
    );
    let mut reader = io_utils::open_csv_reader(bytes, delimiter);
    let headers = unique_headers(io_utils::reader_headers(&mut reader, encoding)?);
    let columns = labelled_columns(&headers);
    if columns.is_empty() {
        bail!("Header row has no column labels");
    }

    let mut rows = Vec::new();
    for (index, record) in reader.byte_records().enumerate() {
        let record = record.with_context(|| format!("Reading row {}", index + 2))?;
        let fields = io_utils::decode_record(&record, encoding)
            .with_context(|| format!("Decoding row {}", index + 2))?;
        let row = build_row(index + 2, &headers, fields.into_iter().map(CellValue::Text));
        if !row.is_blank() {
            rows.push(row);
        }
    }
    Ok((columns, rows))
}

fn workbook_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::text(s.clone()),
        Data::Int(n) => CellValue::Number(*n as f64),
        Data::Float(f) => CellValue::Number(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => spreadsheet_serial_to_datetime(dt.as_f64())
            .map(CellValue::DateTime)
            .unwrap_or(CellValue::Number(dt.as_f64())),
    }
}

fn decode_workbook(
    bytes: Vec<u8>,
    sheet: Option<&str>,
) -> Result<(String, Vec<String>, Vec<SourceRow>)> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))?;
    let names = workbook.sheet_names();
    let name = match sheet {
        Some(wanted) => names
            .iter()
            .find(|name| name.as_str() == wanted)
            .cloned()
            .ok_or_else(|| anyhow!("Sheet '{wanted}' not found; available: {}", names.join(", ")))?,
        None => names
            .first()
            .cloned()
            .ok_or_else(|| anyhow!("Workbook has no sheets"))?,
    };
    let range = workbook.worksheet_range(&name)?;
    let first_row = range.start().map(|(row, _)| row as usize).unwrap_or(0);
    let mut sheet_rows = range.rows();
    let header_cells = sheet_rows
        .next()
        .ok_or_else(|| anyhow!("Sheet '{name}' is empty"))?;
    let headers = unique_headers(header_cells.iter().map(|cell| workbook_cell(cell).as_display()));
    let columns = labelled_columns(&headers);
    if columns.is_empty() {
        bail!("Sheet '{name}' has no column labels");
    }

    // 1-based sheet numbering, header included
    let header_number = first_row + 1;
    let rows = sheet_rows
        .enumerate()
        .map(|(index, cells)| {
            build_row(
                header_number + index + 1,
                &headers,
                cells.iter().map(workbook_cell),
            )
        })
        .filter(|row| !row.is_blank())
        .collect();
    Ok((name, columns, rows))
}
