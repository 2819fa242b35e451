//! Headless import stepper.
//!
//! `SelectFile → MapColumns → SourceDetails → Preview → Committed`. Each
//! forward move is guarded by the readiness of the current step; `commit` is
//! accepted once.

use std::fmt;

use log::{debug, info};
use thiserror::Error;

use crate::{
    aliases::{LeadSource, LeadStatus},
    decode::DecodedSheet,
    importer::{BatchImporter, ImportError, ImportReport, ImportRequest},
    mapping::{self, ColumnMapping},
    profiles::MappingStore,
    record::ImportMode,
    store::MappingProfile,
    transform::{self, TransformDefaults, TransformOutcome},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    SelectFile,
    MapColumns,
    SourceDetails,
    Preview,
    Committed,
}

impl fmt::Display for WizardStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            WizardStep::SelectFile => "select file",
            WizardStep::MapColumns => "map columns",
            WizardStep::SourceDetails => "source details",
            WizardStep::Preview => "preview",
            WizardStep::Committed => "committed",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum WizardError {
    #[error("Cannot leave '{step}': {reason}")]
    NotReady { step: WizardStep, reason: &'static str },
    #[error("Not allowed during '{0}'")]
    WrongStep(WizardStep),
    #[error("This import was already committed")]
    AlreadyCommitted,
    #[error("The selected sheet has no rows")]
    EmptySheet,
    #[error(transparent)]
    Import(#[from] ImportError),
}

#[derive(Debug, Clone)]
pub struct ImportWizard {
    step: WizardStep,
    sheet: Option<DecodedSheet>,
    mapping: ColumnMapping,
    default_status: LeadStatus,
    default_source: LeadSource,
    organization_id: Option<String>,
    mode: ImportMode,
    preview: Option<TransformOutcome>,
    report: Option<ImportReport>,
}

impl Default for ImportWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl ImportWizard {
    pub fn new() -> Self {
        Self {
            step: WizardStep::SelectFile,
            sheet: None,
            mapping: ColumnMapping::new(),
            default_status: LeadStatus::default(),
            default_source: LeadSource::default(),
            organization_id: None,
            mode: ImportMode::default(),
            preview: None,
            report: None,
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn sheet(&self) -> Option<&DecodedSheet> {
        self.sheet.as_ref()
    }

    pub fn mapping(&self) -> &ColumnMapping {
        &self.mapping
    }

    pub fn preview(&self) -> Option<&TransformOutcome> {
        self.preview.as_ref()
    }

    pub fn report(&self) -> Option<&ImportReport> {
        self.report.as_ref()
    }

    fn require(&self, allowed: &[WizardStep]) -> Result<(), WizardError> {
        if self.step == WizardStep::Committed {
            return Err(WizardError::AlreadyCommitted);
        }
        if allowed.contains(&self.step) {
            Ok(())
        } else {
            Err(WizardError::WrongStep(self.step))
        }
    }

    /// Loads a sheet and seeds the mapping from its headers.
    pub fn load_sheet(&mut self, sheet: DecodedSheet) -> Result<(), WizardError> {
        self.require(&[WizardStep::SelectFile])?;
        if sheet.rows.is_empty() {
            return Err(WizardError::EmptySheet);
        }
        self.mapping = mapping::auto_match(&ColumnMapping::new(), &sheet.columns);
        debug!(
            "Auto-matched {} field(s) for '{}'",
            self.mapping.fields().count(),
            sheet.file_name
        );
        self.sheet = Some(sheet);
        Ok(())
    }

    /// Replaces the mapping with a saved profile restricted to the sheet's
    /// columns.
    pub fn use_profile(&mut self, profile: &MappingProfile) -> Result<(), WizardError> {
        self.require(&[WizardStep::SelectFile, WizardStep::MapColumns])?;
        let columns = self
            .sheet
            .as_ref()
            .map(|sheet| sheet.columns.as_slice())
            .unwrap_or_default();
        self.mapping = MappingStore::apply(profile, columns);
        Ok(())
    }

    pub fn mapping_mut(&mut self) -> Result<&mut ColumnMapping, WizardError> {
        self.require(&[WizardStep::MapColumns])?;
        Ok(&mut self.mapping)
    }

    pub fn set_organization(&mut self, organization_id: impl Into<String>) -> Result<(), WizardError> {
        self.require(&[WizardStep::SourceDetails])?;
        let organization_id = organization_id.into();
        self.organization_id = (!organization_id.trim().is_empty()).then_some(organization_id);
        Ok(())
    }

    pub fn set_defaults(
        &mut self,
        status: LeadStatus,
        source: LeadSource,
        mode: ImportMode,
    ) -> Result<(), WizardError> {
        self.require(&[WizardStep::SourceDetails])?;
        self.default_status = status;
        self.default_source = source;
        self.mode = mode;
        Ok(())
    }

    /// Whether [`Self::advance`] (or `commit` in preview) would be accepted.
    pub fn is_ready(&self) -> bool {
        self.blocker().is_none()
    }

    fn blocker(&self) -> Option<&'static str> {
        match self.step {
            WizardStep::SelectFile => match &self.sheet {
                Some(sheet) if !sheet.rows.is_empty() => None,
                _ => Some("no sheet with rows is loaded"),
            },
            WizardStep::MapColumns => {
                let columns = self
                    .sheet
                    .as_ref()
                    .map(|sheet| sheet.columns.as_slice())
                    .unwrap_or_default();
                (!self.mapping.has_title_in(columns)).then_some("title is not mapped to a column")
            }
            WizardStep::SourceDetails => self
                .organization_id
                .is_none()
                .then_some("organization is not set"),
            WizardStep::Preview => match &self.preview {
                Some(outcome) if !outcome.records.is_empty() => None,
                _ => Some("no row has a title"),
            },
            WizardStep::Committed => Some("import already committed"),
        }
    }

    pub fn advance(&mut self) -> Result<WizardStep, WizardError> {
        self.require(&[
            WizardStep::SelectFile,
            WizardStep::MapColumns,
            WizardStep::SourceDetails,
        ])?;
        if let Some(reason) = self.blocker() {
            return Err(WizardError::NotReady {
                step: self.step,
                reason,
            });
        }
        self.step = match self.step {
            WizardStep::SelectFile => WizardStep::MapColumns,
            WizardStep::MapColumns => WizardStep::SourceDetails,
            _ => {
                self.preview = Some(self.run_preview());
                WizardStep::Preview
            }
        };
        debug!("Wizard moved to '{}'", self.step);
        Ok(self.step)
    }

    pub fn back(&mut self) -> Result<WizardStep, WizardError> {
        self.step = match self.step {
            WizardStep::MapColumns => WizardStep::SelectFile,
            WizardStep::SourceDetails => WizardStep::MapColumns,
            WizardStep::Preview => {
                self.preview = None;
                WizardStep::SourceDetails
            }
            WizardStep::Committed => return Err(WizardError::AlreadyCommitted),
            WizardStep::SelectFile => return Err(WizardError::WrongStep(self.step)),
        };
        Ok(self.step)
    }

    fn run_preview(&self) -> TransformOutcome {
        let defaults = TransformDefaults {
            status: self.default_status.clone(),
            source: self.default_source,
            organization_id: self.organization_id.clone(),
        };
        match &self.sheet {
            Some(sheet) => transform::transform_rows(&sheet.rows, &self.mapping, &defaults),
            None => TransformOutcome::default(),
        }
    }

    /// Commits the previewed rows. Once a batch exists, even a partially
    /// written one, the wizard is closed.
    pub fn commit(&mut self, importer: &BatchImporter<'_>) -> Result<ImportReport, WizardError> {
        self.require(&[WizardStep::Preview])?;
        if let Some(reason) = self.blocker() {
            return Err(WizardError::NotReady {
                step: self.step,
                reason,
            });
        }
        let (Some(sheet), Some(outcome), Some(organization_id)) =
            (&self.sheet, &self.preview, &self.organization_id)
        else {
            return Err(WizardError::WrongStep(self.step));
        };
        let request = ImportRequest {
            organization_id: organization_id.clone(),
            source: sheet.source_file(),
            mode: self.mode,
            mapping: self.mapping.clone(),
            outcome: outcome.clone(),
        };
        match importer.commit(request) {
            Ok(report) => {
                info!("Wizard committed batch {}", report.batch_id);
                self.step = WizardStep::Committed;
                self.report = Some(report);
                Ok(report)
            }
            Err(err) => {
                if err.batch_id().is_some() {
                    self.step = WizardStep::Committed;
                }
                Err(err.into())
            }
        }
    }
}
