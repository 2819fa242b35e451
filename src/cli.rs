use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::{
    aliases::{LeadSource, LeadStatus},
    fields::LeadField,
    record::ImportMode,
};

pub const DEFAULT_STORE_DIR: &str = ".lead-import";

#[derive(Debug, Parser)]
#[command(author, version, about = "Import spreadsheet leads into a CRM store", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List the worksheets of a workbook
    Sheets(SheetsArgs),
    /// Show how the columns of a file map onto lead fields
    Map(MapArgs),
    /// Transform a file and show the resulting leads without writing them
    Preview(PreviewArgs),
    /// Import a file as a new batch and print the report as JSON
    Import(ImportArgs),
    /// Remove every lead created by a batch
    Undo(UndoArgs),
    /// List import batches of an organization
    Batches(StoreArgs),
    /// List saved mapping profiles of an organization
    Profiles(StoreArgs),
}

#[derive(Debug, Args)]
pub struct SheetsArgs {
    /// Workbook file (.xlsx, .xlsm, .xlsb, .xls, .ods)
    #[arg(short, long)]
    pub input: PathBuf,
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Input spreadsheet (.csv, .tsv, .xlsx, .xlsm, .xlsb, .xls, .ods; `-` for stdin)
    #[arg(short, long)]
    pub input: PathBuf,
    /// Worksheet to read from a workbook (first sheet when omitted)
    #[arg(long)]
    pub sheet: Option<String>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of a delimited input (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct MappingArgs {
    /// Saved mapping profile to start from
    #[arg(long)]
    pub profile: Option<String>,
    /// Explicit binding such as `title=Nome do Cliente` (repeatable)
    #[arg(long = "map", value_parser = parse_field_binding, action = clap::ArgAction::Append)]
    pub bindings: Vec<(LeadField, String)>,
    /// Custom field binding such as `cnpj=CNPJ` (repeatable)
    #[arg(long = "custom", value_parser = parse_custom_binding, action = clap::ArgAction::Append)]
    pub custom: Vec<(String, String)>,
}

#[derive(Debug, Args)]
pub struct StoreArgs {
    /// Directory holding the lead store
    #[arg(long, default_value = DEFAULT_STORE_DIR)]
    pub store: PathBuf,
    /// Organization the leads belong to
    #[arg(long)]
    pub org: String,
}

#[derive(Debug, Args)]
pub struct DefaultsArgs {
    /// Status for rows without one (defaults to novo_lead)
    #[arg(long = "default-status")]
    pub default_status: Option<LeadStatus>,
    /// Source for rows without a recognised one (defaults to manual)
    #[arg(long = "default-source")]
    pub default_source: Option<LeadSource>,
    /// YAML file with import settings
    #[arg(long)]
    pub config: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct MapArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub mapping: MappingArgs,
    /// Directory holding the lead store (needed for --profile / --save-profile)
    #[arg(long, default_value = DEFAULT_STORE_DIR)]
    pub store: PathBuf,
    /// Organization owning the profiles
    #[arg(long)]
    pub org: Option<String>,
    /// Save the resulting mapping under this profile name
    #[arg(long = "save-profile")]
    pub save_profile: Option<String>,
}

#[derive(Debug, Args)]
pub struct PreviewArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub mapping: MappingArgs,
    #[command(flatten)]
    pub defaults: DefaultsArgs,
    /// Directory holding the lead store (needed for --profile)
    #[arg(long, default_value = DEFAULT_STORE_DIR)]
    pub store: PathBuf,
    /// Organization owning the profiles
    #[arg(long)]
    pub org: Option<String>,
    /// Number of leads to display
    #[arg(long, default_value_t = 10)]
    pub rows: usize,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    #[command(flatten)]
    pub mapping: MappingArgs,
    #[command(flatten)]
    pub defaults: DefaultsArgs,
    #[command(flatten)]
    pub target: StoreArgs,
    /// `full` writes every mapped field, `basic_only` only contact fields
    #[arg(long, default_value = "full")]
    pub mode: ImportMode,
    /// Save the mapping used under this profile name
    #[arg(long = "save-profile")]
    pub save_profile: Option<String>,
    /// Rows per insert call
    #[arg(long = "chunk-size")]
    pub chunk_size: Option<usize>,
    /// Insert calls allowed in flight at once
    #[arg(long)]
    pub concurrency: Option<usize>,
    /// Largest sheet accepted
    #[arg(long = "max-rows")]
    pub max_rows: Option<usize>,
}

#[derive(Debug, Args)]
pub struct UndoArgs {
    #[command(flatten)]
    pub target: StoreArgs,
    /// Batch id printed by `import`
    #[arg(long)]
    pub batch: uuid::Uuid,
    /// YAML file with import settings
    #[arg(long)]
    pub config: Option<PathBuf>,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

fn split_binding(value: &str) -> Result<(&str, &str), String> {
    let (key, column) = value
        .split_once('=')
        .ok_or_else(|| format!("Expected `field=Column`, got '{value}'"))?;
    let (key, column) = (key.trim(), column.trim());
    if key.is_empty() || column.is_empty() {
        return Err(format!("Binding '{value}' needs both a field and a column"));
    }
    Ok((key, column))
}

pub fn parse_field_binding(value: &str) -> Result<(LeadField, String), String> {
    let (field, column) = split_binding(value)?;
    Ok((field.parse()?, column.to_string()))
}

pub fn parse_custom_binding(value: &str) -> Result<(String, String), String> {
    let (name, column) = split_binding(value)?;
    Ok((name.to_string(), column.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delimiter_aliases() {
        assert_eq!(parse_delimiter("semicolon").unwrap(), b';');
        assert_eq!(parse_delimiter("tab").unwrap(), b'\t');
        assert!(parse_delimiter("::").is_err());
    }

    #[test]
    fn field_bindings_allow_spaces_in_columns() {
        let (field, column) = parse_field_binding("title = Nome do Cliente").unwrap();
        assert_eq!(field, LeadField::Title);
        assert_eq!(column, "Nome do Cliente");
        assert!(parse_field_binding("nickname=Apelido").is_err());
        assert!(parse_field_binding("title").is_err());
    }
}
