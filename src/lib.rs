pub mod aliases;
pub mod cli;
pub mod config;
pub mod data;
pub mod decode;
pub mod fields;
pub mod file_store;
pub mod importer;
pub mod io_utils;
pub mod mapping;
pub mod normalize;
pub mod profiles;
pub mod record;
pub mod store;
pub mod table;
pub mod transform;
pub mod undo;
pub mod wizard;

use std::{collections::HashSet, env, path::Path, sync::OnceLock};

use anyhow::{Context, Result, anyhow, bail};
use clap::Parser;
use itertools::Itertools;
use log::{LevelFilter, debug, info};

use crate::{
    cli::{Cli, Commands},
    config::ImportConfig,
    decode::{DecodeOptions, DecodedSheet},
    fields::LeadField,
    file_store::FileStore,
    importer::{BatchImporter, CommitOptions},
    mapping::ColumnMapping,
    profiles::MappingStore,
    store::{LeadStore, MappingProfile},
    transform::TransformDefaults,
    undo::UndoEngine,
    wizard::ImportWizard,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("lead_import", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Sheets(args) => handle_sheets(&args),
        Commands::Map(args) => handle_map(&args),
        Commands::Preview(args) => handle_preview(&args),
        Commands::Import(args) => handle_import(&args),
        Commands::Undo(args) => handle_undo(&args),
        Commands::Batches(args) => handle_batches(&args),
        Commands::Profiles(args) => handle_profiles(&args),
    }
}

fn handle_sheets(args: &cli::SheetsArgs) -> Result<()> {
    let names = decode::list_sheets(&args.input)?;
    for name in names {
        println!("{name}");
    }
    Ok(())
}

fn decode_source(args: &cli::SourceArgs) -> Result<DecodedSheet> {
    let options = DecodeOptions {
        sheet: args.sheet.clone(),
        delimiter: args.delimiter,
        encoding: args.input_encoding.clone(),
    };
    info!(
        "Reading '{}'{}",
        args.input.display(),
        args.delimiter
            .map(|d| format!(" with delimiter '{}'", printable_delimiter(d)))
            .unwrap_or_default()
    );
    decode::decode_file(&args.input, &options)
        .with_context(|| format!("Decoding {:?}", args.input))
}

fn open_store(dir: &Path) -> Result<FileStore> {
    FileStore::open(dir).with_context(|| format!("Opening lead store {dir:?}"))
}

fn find_profile(store: &FileStore, org: Option<&str>, name: &str) -> Result<MappingProfile> {
    let org = org.ok_or_else(|| anyhow!("--org is required to use a mapping profile"))?;
    MappingStore::new(store)
        .find(org, name)?
        .ok_or_else(|| anyhow!("No mapping profile named '{name}' for organization '{org}'"))
}

/// Profile (if any) restricted to the sheet, gaps auto-matched, then the
/// explicit `--map` / `--custom` bindings on top.
fn apply_bindings(
    base: ColumnMapping,
    sheet: &DecodedSheet,
    args: &cli::MappingArgs,
) -> Result<ColumnMapping> {
    let columns = sheet.columns.iter().map(String::as_str).collect::<HashSet<_>>();
    let mut mapping = mapping::auto_match(&base, &sheet.columns);
    for (field, column) in &args.bindings {
        if !columns.contains(column.as_str()) {
            bail!("Column '{column}' for {field} is not in the sheet");
        }
        mapping.bind(*field, column.as_str());
    }
    for (name, column) in &args.custom {
        if !columns.contains(column.as_str()) {
            bail!("Column '{column}' for custom field '{name}' is not in the sheet");
        }
        mapping.bind_custom(name.as_str(), column.as_str())?;
    }
    Ok(mapping)
}

fn resolve_mapping(
    sheet: &DecodedSheet,
    args: &cli::MappingArgs,
    store_dir: &Path,
    org: Option<&str>,
) -> Result<ColumnMapping> {
    let base = match &args.profile {
        Some(name) => {
            let store = open_store(store_dir)?;
            let profile = find_profile(&store, org, name)?;
            MappingStore::apply(&profile, &sheet.columns)
        }
        None => ColumnMapping::new(),
    };
    apply_bindings(base, sheet, args)
}

fn resolve_config(args: &cli::DefaultsArgs) -> Result<ImportConfig> {
    let mut config = ImportConfig::load_or_default(args.config.as_deref())?;
    if let Some(status) = &args.default_status {
        config.default_status = status.clone();
    }
    if let Some(source) = args.default_source {
        config.default_source = source;
    }
    Ok(config)
}

fn handle_map(args: &cli::MapArgs) -> Result<()> {
    let sheet = decode_source(&args.source)?;
    let mapping = resolve_mapping(&sheet, &args.mapping, &args.store, args.org.as_deref())?;

    let headers = vec!["field".to_string(), "column".to_string()];
    let mut rows = mapping
        .fields()
        .map(|(field, column)| vec![field.to_string(), column.to_string()])
        .collect::<Vec<_>>();
    rows.extend(mapping.custom_fields().map(|(name, column)| {
        vec![format!("{}{name}", mapping::CUSTOM_FIELD_PREFIX), column.to_string()]
    }));
    table::print_table(&headers, &rows);

    let used = mapping.bound_columns();
    let unmapped = sheet
        .columns
        .iter()
        .filter(|column| !used.contains(column.as_str()))
        .collect::<Vec<_>>();
    if !unmapped.is_empty() {
        println!();
        println!("Unmapped columns: {}", unmapped.iter().join(", "));
        println!("Their non-blank cells are imported as custom fields.");
    }
    if !mapping.is_bound(LeadField::Title) {
        println!("Warning: no column is mapped to title; import would be refused");
    }

    if let Some(name) = &args.save_profile {
        let org = args
            .org
            .as_deref()
            .ok_or_else(|| anyhow!("--org is required with --save-profile"))?;
        let store = open_store(&args.store)?;
        let profile = MappingStore::new(&store).save(name, org, &mapping)?;
        info!("Mapping saved as profile '{}' ({})", profile.name, profile.id);
    }
    Ok(())
}

fn handle_preview(args: &cli::PreviewArgs) -> Result<()> {
    let sheet = decode_source(&args.source)?;
    let mapping = resolve_mapping(&sheet, &args.mapping, &args.store, args.org.as_deref())?;
    let config = resolve_config(&args.defaults)?;
    let defaults = TransformDefaults {
        status: config.default_status,
        source: config.default_source,
        organization_id: args.org.clone(),
    };
    let outcome = transform::transform_rows(&sheet.rows, &mapping, &defaults);

    let headers = ["row", "title", "status", "source", "email", "phone", "value"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = outcome
        .records
        .iter()
        .take(args.rows)
        .map(|row| {
            let record = &row.record;
            vec![
                row.row_number.to_string(),
                record.title.clone(),
                record.status.to_string(),
                record.source.to_string(),
                record.email.clone().unwrap_or_default(),
                record.phone.clone().unwrap_or_default(),
                record.value.map(|v| v.to_string()).unwrap_or_default(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    println!();
    println!(
        "{} lead(s) ready, {} row(s) skipped for missing title",
        outcome.records.len(),
        outcome.skipped_rows.len()
    );
    Ok(())
}

fn handle_import(args: &cli::ImportArgs) -> Result<()> {
    let config = resolve_config(&args.defaults)?;
    let defaults = config.commit_options();
    let options = CommitOptions {
        chunk_size: args.chunk_size.unwrap_or(defaults.chunk_size),
        max_concurrency: args.concurrency.unwrap_or(defaults.max_concurrency),
        max_rows: args.max_rows.unwrap_or(defaults.max_rows),
    };
    let org = args.target.org.as_str();
    let store = open_store(&args.target.store)?;
    let profiles = MappingStore::new(&store);
    let profile = args
        .mapping
        .profile
        .as_deref()
        .map(|name| find_profile(&store, Some(org), name))
        .transpose()?;

    let sheet = decode_source(&args.source)?;
    let mut wizard = ImportWizard::new();
    wizard.load_sheet(sheet)?;
    if let Some(profile) = &profile {
        wizard.use_profile(profile)?;
    }
    wizard.advance()?;
    let mapping = {
        let sheet = wizard
            .sheet()
            .ok_or_else(|| anyhow!("No sheet loaded"))?
            .clone();
        let base = wizard.mapping().clone();
        apply_bindings(base, &sheet, &args.mapping)?
    };
    *wizard.mapping_mut()? = mapping;
    wizard
        .advance()
        .context("Map a column to title with --map title=<column>")?;
    wizard.set_organization(org)?;
    wizard.set_defaults(config.default_status, config.default_source, args.mode)?;
    wizard.advance()?;
    if let Some(outcome) = wizard.preview() {
        debug!(
            "Preview: {} lead(s), {} skipped",
            outcome.records.len(),
            outcome.skipped_rows.len()
        );
    }

    let importer = BatchImporter::new(&store, options);
    let report = wizard.commit(&importer)?;

    if let Some(profile) = &profile {
        profiles.record_use(profile.id)?;
    }
    if let Some(name) = &args.save_profile {
        profiles.save(name, org, wizard.mapping())?;
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Serializing import report")?
    );
    Ok(())
}

fn handle_undo(args: &cli::UndoArgs) -> Result<()> {
    let config = ImportConfig::load_or_default(args.config.as_deref())?;
    let store = open_store(&args.target.store)?;
    let report = UndoEngine::new(&store)
        .with_chunk_size(config.undo_chunk_size)
        .undo(args.batch, &args.target.org)?;
    println!(
        "{}",
        serde_json::to_string_pretty(&report).context("Serializing undo report")?
    );
    Ok(())
}

fn handle_batches(args: &cli::StoreArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let batches = store.list_batches(&args.org)?;
    let headers = [
        "batch", "created", "file", "mode", "rows", "imported", "skipped", "errors", "undone",
    ]
    .iter()
    .map(|h| h.to_string())
    .collect::<Vec<_>>();
    let rows = batches
        .iter()
        .map(|batch| {
            vec![
                batch.id.to_string(),
                batch.created_at.format("%Y-%m-%d %H:%M").to_string(),
                batch.source.file_name.clone(),
                batch.mode.to_string(),
                batch.row_count.to_string(),
                batch.imported.to_string(),
                batch.skipped.to_string(),
                batch.error_count.to_string(),
                if batch.is_undone() { "yes" } else { "no" }.to_string(),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    Ok(())
}

fn handle_profiles(args: &cli::StoreArgs) -> Result<()> {
    let store = open_store(&args.store)?;
    let profiles = MappingStore::new(&store).list(&args.org)?;
    let headers = ["name", "fields", "uses", "last used"]
        .iter()
        .map(|h| h.to_string())
        .collect::<Vec<_>>();
    let rows = profiles
        .iter()
        .map(|profile| {
            vec![
                profile.name.clone(),
                profile.mapping.fields().count().to_string(),
                profile.usage_count.to_string(),
                profile
                    .last_used_at
                    .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "never".to_string()),
            ]
        })
        .collect::<Vec<_>>();
    table::print_table(&headers, &rows);
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        b'\n' => "\\n".to_string(),
        other => (other as char).to_string(),
    }
}
