//! I/O helpers for delimited input: delimiter and encoding resolution, reader
//! construction and per-field decoding.
//!
//! Inputs are read fully into memory so the same bytes can be hashed for the
//! batch record and then parsed. The `-` path reads standard input.

use std::{
    fs::File,
    io::{self, BufReader, Read},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use sha2::{Digest, Sha256};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';
pub const SEMICOLON_DELIMITER: u8 = b';';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

/// Explicit delimiter, else `.tsv` → tab, else a sniff of the header line:
/// spreadsheet exports in pt-BR locales separate with `;`.
pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>, sample: &[u8]) -> u8 {
    if let Some(delimiter) = provided {
        return delimiter;
    }
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => sniff_delimiter(sample),
    }
}

fn sniff_delimiter(sample: &[u8]) -> u8 {
    let header = sample.split(|b| *b == b'\n').next().unwrap_or_default();
    let count = |needle: u8| header.iter().filter(|b| **b == needle).count();
    if count(SEMICOLON_DELIMITER) > count(DEFAULT_CSV_DELIMITER) {
        SEMICOLON_DELIMITER
    } else if count(DEFAULT_TSV_DELIMITER) > count(DEFAULT_CSV_DELIMITER) {
        DEFAULT_TSV_DELIMITER
    } else {
        DEFAULT_CSV_DELIMITER
    }
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn read_input_bytes(path: &Path) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    if is_dash(path) {
        io::stdin()
            .lock()
            .read_to_end(&mut bytes)
            .context("Reading standard input")?;
    } else {
        BufReader::new(File::open(path).with_context(|| format!("Opening input file {path:?}"))?)
            .read_to_end(&mut bytes)
            .with_context(|| format!("Reading input file {path:?}"))?;
    }
    Ok(bytes)
}

/// Lowercase hex SHA-256.
pub fn content_hash(bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(anyhow!(
            "Failed to decode text with encoding {}",
            encoding.name()
        ))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

pub fn reader_headers<R>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>>
where
    R: Read,
{
    let headers = reader.byte_headers()?.clone();
    decode_record(&headers, encoding)
}
