//! Persistence boundary: the traits the engine writes through and the
//! records it persists.

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{mapping::ColumnMapping, record::{CanonicalLeadRecord, ImportMode}};

#[derive(Debug, Error)]
pub enum StoreError {
    /// Violation scoped to the offending rows (length limit, foreign key).
    #[error("Constraint violated: {0}")]
    Constraint(String),
    #[error("Not authorized: {0}")]
    Unauthorized(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Store document is corrupt: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Failures that would hit every later write too.
    pub fn is_systemic(&self) -> bool {
        !matches!(self, StoreError::Constraint(_))
    }
}

/// Where a batch's rows came from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    /// SHA-256 of the raw file, lowercase hex.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: Uuid,
    pub organization_id: String,
    pub created_at: NaiveDateTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub undone_at: Option<NaiveDateTime>,
    #[serde(flatten)]
    pub source: SourceFile,
    pub mode: ImportMode,
    pub mapping: ColumnMapping,
    pub row_count: usize,
    pub imported: usize,
    pub skipped: usize,
    pub error_count: usize,
}

impl ImportBatch {
    pub fn is_undone(&self) -> bool {
        self.undone_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowStatus {
    Imported,
    Skipped,
    Failed,
    Undone,
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RowStatus::Imported => "imported",
            RowStatus::Skipped => "skipped",
            RowStatus::Failed => "failed",
            RowStatus::Undone => "undone",
        };
        f.write_str(label)
    }
}

/// Outcome of one source row within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowAudit {
    pub row_number: usize,
    pub status: RowStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lead_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowError {
    /// Index into the slice passed to `insert_many`.
    pub index: usize,
    pub message: String,
}

/// Result of a multi-row insert. `inserted_ids` lines up with the accepted
/// input rows in order, skipping those listed in `row_errors`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InsertOutcome {
    pub inserted_ids: Vec<Uuid>,
    pub row_errors: Vec<RowError>,
}

/// Counters written when a batch finishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchTotals {
    pub imported: usize,
    pub skipped: usize,
    pub error_count: usize,
}

/// Lead persistence. Implementations are shared across importer workers.
pub trait LeadStore: Send + Sync {
    fn create_batch(&self, batch: &ImportBatch) -> Result<(), StoreError>;

    /// Inserts `records` tagged with `batch_id`. Row-scoped rejections come
    /// back in [`InsertOutcome::row_errors`]; an `Err` means nothing from this
    /// call was written.
    fn insert_many(
        &self,
        records: &[CanonicalLeadRecord],
        batch_id: Uuid,
        organization_id: &str,
    ) -> Result<InsertOutcome, StoreError>;

    fn record_rows(&self, batch_id: Uuid, rows: &[RowAudit]) -> Result<(), StoreError>;

    fn finish_batch(
        &self,
        batch_id: Uuid,
        totals: BatchTotals,
        completed_at: NaiveDateTime,
    ) -> Result<(), StoreError>;

    fn find_batch(
        &self,
        batch_id: Uuid,
        organization_id: &str,
    ) -> Result<Option<ImportBatch>, StoreError>;

    /// Newest first.
    fn list_batches(&self, organization_id: &str) -> Result<Vec<ImportBatch>, StoreError>;

    /// Deletes at most `limit` leads tagged with `batch_id`, returning how
    /// many went.
    fn delete_by_batch(
        &self,
        batch_id: Uuid,
        organization_id: &str,
        limit: usize,
    ) -> Result<usize, StoreError>;

    /// Adjusts counters after `deleted` leads were removed and flips row
    /// audits to undone.
    fn mark_undone(
        &self,
        batch_id: Uuid,
        deleted: usize,
        undone_at: NaiveDateTime,
    ) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingProfile {
    pub id: Uuid,
    pub organization_id: String,
    pub name: String,
    pub mapping: ColumnMapping,
    pub usage_count: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

pub trait MappingRepository: Send + Sync {
    /// Upserts by `(organization_id, name)`, keeping id and usage on update.
    fn save_mapping(&self, profile: MappingProfile) -> Result<MappingProfile, StoreError>;

    fn list_mappings(&self, organization_id: &str) -> Result<Vec<MappingProfile>, StoreError>;

    /// Bumps usage; `Ok(None)` when the id is unknown.
    fn touch_mapping(
        &self,
        id: Uuid,
        used_at: NaiveDateTime,
    ) -> Result<Option<MappingProfile>, StoreError>;
}
