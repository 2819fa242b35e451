mod common;

use common::{ORG, TEN_LEADS_CSV, TestWorkspace};
use lead_import::{
    aliases::{LeadSource, LeadStatus},
    decode::{self, DecodeOptions},
    fields::LeadField,
    file_store::FileStore,
    importer::{BatchImporter, CommitOptions},
    profiles::MappingStore,
    record::ImportMode,
    wizard::{ImportWizard, WizardError, WizardStep},
};

fn loaded_wizard(workspace: &TestWorkspace) -> ImportWizard {
    let path = workspace.write("leads.csv", TEN_LEADS_CSV);
    let sheet = decode::decode_file(&path, &DecodeOptions::default()).expect("decode");
    let mut wizard = ImportWizard::new();
    wizard.load_sheet(sheet).expect("load");
    wizard
}

#[test]
fn full_walk_commits_once() {
    let workspace = TestWorkspace::new();
    let mut wizard = loaded_wizard(&workspace);
    assert_eq!(wizard.mapping().column_for(LeadField::Title), Some("Nome"));

    assert_eq!(wizard.advance().expect("to mapping"), WizardStep::MapColumns);
    assert_eq!(wizard.advance().expect("to details"), WizardStep::SourceDetails);
    assert!(matches!(
        wizard.advance(),
        Err(WizardError::NotReady {
            step: WizardStep::SourceDetails,
            ..
        })
    ));
    wizard.set_organization(ORG).expect("org");
    wizard
        .set_defaults(LeadStatus::Qualificacao, LeadSource::Site, ImportMode::Full)
        .expect("defaults");
    assert_eq!(wizard.advance().expect("to preview"), WizardStep::Preview);
    let preview = wizard.preview().expect("preview computed");
    assert_eq!(preview.records.len(), 8);
    assert_eq!(preview.skipped_rows.len(), 2);

    let store = FileStore::in_memory();
    let importer = BatchImporter::new(&store, CommitOptions::default());
    let report = wizard.commit(&importer).expect("commit");
    assert_eq!(report.imported, 8);
    assert_eq!(wizard.step(), WizardStep::Committed);
    assert!(matches!(
        wizard.commit(&importer),
        Err(WizardError::AlreadyCommitted)
    ));
    assert!(matches!(wizard.back(), Err(WizardError::AlreadyCommitted)));
}

#[test]
fn back_from_preview_discards_it() {
    let workspace = TestWorkspace::new();
    let mut wizard = loaded_wizard(&workspace);
    wizard.advance().unwrap();
    wizard.advance().unwrap();
    wizard.set_organization(ORG).unwrap();
    wizard.advance().unwrap();
    assert!(wizard.preview().is_some());
    assert_eq!(wizard.back().unwrap(), WizardStep::SourceDetails);
    assert!(wizard.preview().is_none());
    assert_eq!(wizard.back().unwrap(), WizardStep::MapColumns);
    wizard.mapping_mut().unwrap().unbind(LeadField::Title);
    assert!(!wizard.is_ready());
}

#[test]
fn saved_profile_replaces_auto_match() {
    let workspace = TestWorkspace::new();
    let store = FileStore::in_memory();
    let mut mapping = lead_import::mapping::ColumnMapping::new();
    mapping.bind(LeadField::Title, "E-mail");
    mapping.bind(LeadField::DueDate, "Vencimento");
    let profile = MappingStore::new(&store)
        .save("odd", ORG, &mapping)
        .expect("save");

    let mut wizard = loaded_wizard(&workspace);
    wizard.use_profile(&profile).expect("use profile");
    assert_eq!(wizard.mapping().column_for(LeadField::Title), Some("E-mail"));
    assert!(!wizard.mapping().is_bound(LeadField::DueDate));
    assert!(!wizard.mapping().is_bound(LeadField::Phone));
}

#[test]
fn setters_are_refused_outside_their_step() {
    let workspace = TestWorkspace::new();
    let mut wizard = loaded_wizard(&workspace);
    assert!(matches!(
        wizard.set_organization(ORG),
        Err(WizardError::WrongStep(WizardStep::SelectFile))
    ));
    assert!(wizard.mapping_mut().is_err());
}
