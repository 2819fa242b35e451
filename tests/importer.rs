mod common;

use common::{FaultyStore, ORG, TEN_LEADS_CSV, TestWorkspace, rows_with_titles};
use lead_import::{
    aliases::{LeadSource, LeadStatus},
    decode::{self, DecodeOptions},
    fields::LeadField,
    file_store::FileStore,
    importer::{BatchImporter, CommitOptions, ImportError, ImportRequest},
    mapping::{self, ColumnMapping},
    record::ImportMode,
    store::{LeadStore, RowStatus, SourceFile},
    transform::{self, EMAIL_RAW_KEY, TransformDefaults, TransformOutcome},
    undo::UndoEngine,
};
use rust_decimal::Decimal;

fn title_mapping() -> ColumnMapping {
    let mut mapping = ColumnMapping::new();
    mapping.bind(LeadField::Title, "Nome");
    mapping
}

fn outcome_for(titles: &[&str]) -> TransformOutcome {
    transform::transform_rows(
        &rows_with_titles(titles),
        &title_mapping(),
        &TransformDefaults::default(),
    )
}

fn request(mode: ImportMode, outcome: TransformOutcome) -> ImportRequest {
    ImportRequest {
        organization_id: ORG.to_string(),
        source: SourceFile {
            file_name: "leads.csv".to_string(),
            ..SourceFile::default()
        },
        mode,
        mapping: title_mapping(),
        outcome,
    }
}

#[test]
fn ten_rows_with_two_blank_titles_import_eight_and_undo_eight() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("leads.csv", TEN_LEADS_CSV);
    let sheet = decode::decode_file(&path, &DecodeOptions::default()).expect("decode");
    assert_eq!(sheet.rows.len(), 10);

    let mapping = mapping::auto_match(&ColumnMapping::new(), &sheet.columns);
    assert_eq!(mapping.column_for(LeadField::Title), Some("Nome"));
    assert_eq!(mapping.column_for(LeadField::Status), Some("Etapa"));
    assert_eq!(mapping.column_for(LeadField::Source), Some("Origem"));

    let defaults = TransformDefaults {
        organization_id: Some(ORG.to_string()),
        ..TransformDefaults::default()
    };
    let outcome = transform::transform_rows(&sheet.rows, &mapping, &defaults);
    assert_eq!(outcome.skipped_rows, vec![4, 8]);

    let store = FileStore::open(&workspace.store_dir()).expect("open store");
    let importer = BatchImporter::new(&store, CommitOptions::default());
    let report = importer
        .commit(ImportRequest {
            organization_id: ORG.to_string(),
            source: sheet.source_file(),
            mode: ImportMode::Full,
            mapping,
            outcome,
        })
        .expect("import");
    assert_eq!(
        (report.imported, report.skipped, report.error_count),
        (8, 2, 0)
    );

    let leads = store.leads(ORG).expect("leads");
    let ana = &leads
        .iter()
        .find(|lead| lead.record.title == "Ana Souza")
        .expect("Ana imported")
        .record;
    assert_eq!(ana.status, LeadStatus::FechadoGanho);
    assert!(ana.closed_won_at.is_some());
    assert_eq!(ana.email.as_deref(), Some("ana@example.com"));
    assert_eq!(ana.phone.as_deref(), Some("(11)91234-5678"));
    assert_eq!(ana.value, Some(Decimal::new(123456, 2)));
    assert_eq!(ana.source, LeadSource::MetaAds);

    let diego = &leads
        .iter()
        .find(|lead| lead.record.title == "Diego Reis")
        .expect("Diego imported")
        .record;
    assert_eq!(diego.status, LeadStatus::Custom("Em análise".to_string()));
    assert!(diego.value.is_none());

    let gabi = &leads
        .iter()
        .find(|lead| lead.record.title == "Gabi Rocha")
        .expect("Gabi imported")
        .record;
    assert!(gabi.email.is_none());
    assert_eq!(
        gabi.custom_fields.get(EMAIL_RAW_KEY).map(String::as_str),
        Some("gabi")
    );

    let batch = store
        .find_batch(report.batch_id, ORG)
        .expect("find")
        .expect("batch exists");
    assert_eq!(batch.row_count, 10);
    assert_eq!(batch.source.file_name, "leads.csv");
    assert!(batch.completed_at.is_some());

    let undo = UndoEngine::new(&store).undo(report.batch_id, ORG).expect("undo");
    assert_eq!(undo.deleted_count, 8);
    assert!(store.leads(ORG).expect("leads").is_empty());

    let batch = store
        .find_batch(report.batch_id, ORG)
        .expect("find")
        .expect("batch kept as audit trail");
    assert_eq!((batch.imported, batch.skipped), (0, 10));
    assert!(batch.is_undone());
    let audits = store.row_audits(report.batch_id).expect("audits");
    assert_eq!(audits.len(), 10);
    assert_eq!(
        audits
            .iter()
            .filter(|audit| audit.status == RowStatus::Undone)
            .count(),
        8
    );
}

#[test]
fn constraint_violation_fails_one_row_without_aborting() {
    let store = FileStore::in_memory();
    let long_title = "x".repeat(300);
    let titles = ["A", "B", long_title.as_str(), "D", "E"];
    let importer = BatchImporter::new(&store, CommitOptions::default());
    let report = importer
        .commit(request(ImportMode::Full, outcome_for(&titles)))
        .expect("import");
    assert_eq!(
        (report.imported, report.skipped, report.error_count),
        (4, 0, 1)
    );
    let audits = store.row_audits(report.batch_id).expect("audits");
    let failed = audits
        .iter()
        .find(|audit| audit.status == RowStatus::Failed)
        .expect("failed row audited");
    assert_eq!(failed.row_number, 4);
    assert!(failed.messages[0].contains("255"));
}

#[test]
fn chunk_level_constraint_error_retries_rows_individually() {
    let store = FaultyStore::poisoned("C");
    let importer = BatchImporter::new(
        &store,
        CommitOptions {
            chunk_size: 5,
            ..CommitOptions::default()
        },
    );
    let report = importer
        .commit(request(
            ImportMode::Full,
            outcome_for(&["A", "B", "C", "D", "E"]),
        ))
        .expect("import");
    assert_eq!(
        (report.imported, report.skipped, report.error_count),
        (4, 0, 1)
    );
    // one chunk attempt plus five single-row retries
    assert_eq!(store.insert_calls(), 6);
}

#[test]
fn systemic_failure_stops_dispatch_and_reports_batch() {
    let store = FaultyStore::outage_after(2);
    let importer = BatchImporter::new(
        &store,
        CommitOptions {
            chunk_size: 2,
            max_concurrency: 1,
            ..CommitOptions::default()
        },
    );
    let titles = (0..10).map(|i| format!("Lead {i}")).collect::<Vec<_>>();
    let titles = titles.iter().map(String::as_str).collect::<Vec<_>>();
    let err = importer
        .commit(request(ImportMode::Full, outcome_for(&titles)))
        .expect_err("outage must abort");
    let (batch_id, imported) = match err {
        ImportError::Systemic {
            batch_id, imported, ..
        } => (batch_id, imported),
        other => panic!("expected systemic error, got {other:?}"),
    };
    assert_eq!(imported, 4);
    assert_eq!(store.insert_calls(), 3);
    assert_eq!(store.inner.leads(common::ORG).expect("leads").len(), 4);

    let undo = UndoEngine::new(&store).undo(batch_id, ORG).expect("undo");
    assert_eq!(undo.deleted_count, 4);
}

#[test]
fn basic_only_mode_drops_rich_fields() {
    let workspace = TestWorkspace::new();
    let path = workspace.write("leads.csv", TEN_LEADS_CSV);
    let sheet = decode::decode_file(&path, &DecodeOptions::default()).expect("decode");
    let mapping = mapping::auto_match(&ColumnMapping::new(), &sheet.columns);
    let outcome = transform::transform_rows(&sheet.rows, &mapping, &TransformDefaults::default());

    let store = FileStore::in_memory();
    let importer = BatchImporter::new(&store, CommitOptions::default());
    let report = importer
        .commit(ImportRequest {
            organization_id: ORG.to_string(),
            source: sheet.source_file(),
            mode: ImportMode::BasicOnly,
            mapping,
            outcome,
        })
        .expect("import");
    assert_eq!(report.imported, 8);

    for lead in store.leads(ORG).expect("leads") {
        assert!(lead.record.value.is_none());
        assert!(lead.record.closed_won_at.is_none());
        assert!(lead.record.custom_fields.is_empty());
        assert_eq!(lead.record.organization_id.as_deref(), Some(ORG));
    }
}

#[test]
fn concurrent_workers_import_every_row_once() {
    let store = FileStore::in_memory();
    let titles = (0..237).map(|i| format!("Lead {i}")).collect::<Vec<_>>();
    let titles = titles.iter().map(String::as_str).collect::<Vec<_>>();
    let importer = BatchImporter::new(
        &store,
        CommitOptions {
            chunk_size: 10,
            max_concurrency: 8,
            ..CommitOptions::default()
        },
    );
    let report = importer
        .commit(request(ImportMode::Full, outcome_for(&titles)))
        .expect("import");
    assert_eq!(report.imported, 237);
    let mut seen = store
        .leads(ORG)
        .expect("leads")
        .into_iter()
        .map(|lead| lead.record.title)
        .collect::<Vec<_>>();
    seen.sort();
    seen.dedup();
    assert_eq!(seen.len(), 237);
}
