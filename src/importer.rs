//! Chunked, bounded-concurrency commit of transformed rows as one batch.

use std::{
    collections::HashMap,
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    thread,
};

use chrono::{NaiveDateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{
    aliases::LeadStatus,
    mapping::ColumnMapping,
    record::{CanonicalLeadRecord, ImportMode},
    store::{BatchTotals, ImportBatch, LeadStore, RowAudit, RowStatus, SourceFile, StoreError},
    transform::TransformOutcome,
};

pub const DEFAULT_CHUNK_SIZE: usize = 50;
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;
pub const DEFAULT_MAX_ROWS: usize = 5000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitOptions {
    pub chunk_size: usize,
    pub max_concurrency: usize,
    pub max_rows: usize,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            max_rows: DEFAULT_MAX_ROWS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub organization_id: String,
    pub source: SourceFile,
    pub mode: ImportMode,
    pub mapping: ColumnMapping,
    pub outcome: TransformOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub batch_id: Uuid,
    pub imported: usize,
    pub skipped: usize,
    pub error_count: usize,
}

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("An organization id is required to import")]
    MissingOrganization,
    #[error("No row has a title; nothing to import")]
    NoValidRows,
    #[error("Sheet has {rows} rows; at most {limit} can be imported at once")]
    TooManyRows { rows: usize, limit: usize },
    #[error("Could not register the import batch: {0}")]
    Register(#[source] StoreError),
    #[error("Import of batch {batch_id} stopped after {imported} leads: {source}")]
    Systemic {
        batch_id: Uuid,
        imported: usize,
        #[source]
        source: StoreError,
    },
}

impl ImportError {
    /// Batch holding already committed leads, if any were written.
    pub fn batch_id(&self) -> Option<Uuid> {
        match self {
            ImportError::Systemic { batch_id, .. } => Some(*batch_id),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct ChunkResult {
    audits: Vec<RowAudit>,
    imported: usize,
    failed: usize,
    fatal: Option<StoreError>,
}

impl ChunkResult {
    fn push(&mut self, row_number: usize, lead_id: Option<Uuid>, message: Option<String>) {
        let status = if lead_id.is_some() {
            self.imported += 1;
            RowStatus::Imported
        } else {
            self.failed += 1;
            RowStatus::Failed
        };
        self.audits.push(RowAudit {
            row_number,
            status,
            lead_id,
            messages: message.into_iter().collect(),
        });
    }
}

pub struct BatchImporter<'a> {
    store: &'a dyn LeadStore,
    options: CommitOptions,
}

impl<'a> BatchImporter<'a> {
    pub fn new(store: &'a dyn LeadStore, options: CommitOptions) -> Self {
        Self { store, options }
    }

    /// Validates, registers and writes one batch. Row-scoped failures are
    /// counted; a systemic failure stops further chunks and is returned with
    /// the batch id so the caller can undo what was committed.
    pub fn commit(&self, request: ImportRequest) -> Result<ImportReport, ImportError> {
        let ImportRequest {
            organization_id,
            source,
            mode,
            mapping,
            outcome,
        } = request;
        if organization_id.trim().is_empty() {
            return Err(ImportError::MissingOrganization);
        }
        if outcome.records.is_empty() {
            return Err(ImportError::NoValidRows);
        }
        let total_rows = outcome.total_rows();
        if total_rows > self.options.max_rows {
            return Err(ImportError::TooManyRows {
                rows: total_rows,
                limit: self.options.max_rows,
            });
        }

        let created_at = Utc::now().naive_utc();
        let batch = ImportBatch {
            id: Uuid::new_v4(),
            organization_id: organization_id.clone(),
            created_at,
            completed_at: None,
            undone_at: None,
            source,
            mode,
            mapping,
            row_count: total_rows,
            imported: 0,
            skipped: 0,
            error_count: 0,
        };
        self.store
            .create_batch(&batch)
            .map_err(ImportError::Register)?;
        info!(
            "Importing {} row(s) into batch {} ({} mode)",
            outcome.records.len(),
            batch.id,
            mode
        );

        let (row_numbers, records): (Vec<usize>, Vec<CanonicalLeadRecord>) = outcome
            .records
            .into_iter()
            .map(|row| {
                let record = prepare(row.record, mode, &organization_id, created_at);
                (row.row_number, record)
            })
            .unzip();

        let results = self.dispatch(&row_numbers, &records, batch.id, &organization_id);

        let mut audits = Vec::with_capacity(total_rows);
        let mut totals = BatchTotals {
            skipped: outcome.skipped_rows.len(),
            ..BatchTotals::default()
        };
        let mut fatal = None;
        for result in results {
            totals.imported += result.imported;
            totals.error_count += result.failed;
            audits.extend(result.audits);
            if fatal.is_none() {
                fatal = result.fatal;
            }
        }
        audits.extend(outcome.skipped_rows.iter().map(|&row_number| RowAudit {
            row_number,
            status: RowStatus::Skipped,
            lead_id: None,
            messages: vec!["missing title".to_string()],
        }));
        audits.sort_by_key(|audit| audit.row_number);

        if let Some(source) = fatal {
            error!(
                "Batch {} aborted after {} lead(s): {source}",
                batch.id, totals.imported
            );
            // best effort: the store may be the thing that failed
            if let Err(err) = self.finalize(batch.id, &audits, totals) {
                warn!("Could not record audit for batch {}: {err}", batch.id);
            }
            return Err(ImportError::Systemic {
                batch_id: batch.id,
                imported: totals.imported,
                source,
            });
        }

        self.finalize(batch.id, &audits, totals)
            .map_err(|source| ImportError::Systemic {
                batch_id: batch.id,
                imported: totals.imported,
                source,
            })?;
        info!(
            "Batch {}: {} imported, {} skipped, {} failed",
            batch.id, totals.imported, totals.skipped, totals.error_count
        );
        Ok(ImportReport {
            batch_id: batch.id,
            imported: totals.imported,
            skipped: totals.skipped,
            error_count: totals.error_count,
        })
    }

    fn finalize(
        &self,
        batch_id: Uuid,
        audits: &[RowAudit],
        totals: BatchTotals,
    ) -> Result<(), StoreError> {
        self.store.record_rows(batch_id, audits)?;
        self.store
            .finish_batch(batch_id, totals, Utc::now().naive_utc())
    }

    fn dispatch(
        &self,
        row_numbers: &[usize],
        records: &[CanonicalLeadRecord],
        batch_id: Uuid,
        organization_id: &str,
    ) -> Vec<ChunkResult> {
        let chunk_size = self.options.chunk_size.max(1);
        let chunk_count = records.len().div_ceil(chunk_size);
        let workers = self.options.max_concurrency.clamp(1, chunk_count.max(1));
        let cursor = AtomicUsize::new(0);
        let abort = AtomicBool::new(false);
        let results = Mutex::new(Vec::with_capacity(chunk_count));
        debug!("Dispatching {chunk_count} chunk(s) of up to {chunk_size} across {workers} worker(s)");

        thread::scope(|scope| {
            for _ in 0..workers {
                scope.spawn(|| {
                    while !abort.load(Ordering::Acquire) {
                        let index = cursor.fetch_add(1, Ordering::AcqRel);
                        if index >= chunk_count {
                            break;
                        }
                        let start = index * chunk_size;
                        let end = (start + chunk_size).min(records.len());
                        let result = self.write_chunk(
                            &row_numbers[start..end],
                            &records[start..end],
                            batch_id,
                            organization_id,
                        );
                        if result.fatal.is_some() {
                            abort.store(true, Ordering::Release);
                        }
                        if let Ok(mut guard) = results.lock() {
                            guard.push(result);
                        }
                    }
                });
            }
        });

        results.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_chunk(
        &self,
        row_numbers: &[usize],
        records: &[CanonicalLeadRecord],
        batch_id: Uuid,
        organization_id: &str,
    ) -> ChunkResult {
        let mut result = ChunkResult::default();
        match self.store.insert_many(records, batch_id, organization_id) {
            Ok(outcome) => {
                let errors = outcome
                    .row_errors
                    .into_iter()
                    .map(|e| (e.index, e.message))
                    .collect::<HashMap<_, _>>();
                let mut ids = outcome.inserted_ids.into_iter();
                for (index, &row_number) in row_numbers.iter().enumerate() {
                    match errors.get(&index) {
                        Some(message) => {
                            warn!("Row {row_number} rejected: {message}");
                            result.push(row_number, None, Some(message.clone()));
                        }
                        None => result.push(row_number, ids.next(), None),
                    }
                }
                debug!(
                    "Chunk starting at row {:?}: {} inserted, {} rejected",
                    row_numbers.first(),
                    result.imported,
                    result.failed
                );
            }
            Err(err) if err.is_systemic() => result.fatal = Some(err),
            Err(err) => {
                warn!("Chunk rejected ({err}); retrying its rows one at a time");
                self.retry_rows(row_numbers, records, batch_id, organization_id, &mut result);
            }
        }
        result
    }

    fn retry_rows(
        &self,
        row_numbers: &[usize],
        records: &[CanonicalLeadRecord],
        batch_id: Uuid,
        organization_id: &str,
        result: &mut ChunkResult,
    ) {
        for (&row_number, record) in row_numbers.iter().zip(records) {
            match self
                .store
                .insert_many(std::slice::from_ref(record), batch_id, organization_id)
            {
                Ok(mut outcome) => match outcome.inserted_ids.pop() {
                    Some(id) => result.push(row_number, Some(id), None),
                    None => {
                        let message = outcome
                            .row_errors
                            .pop()
                            .map(|e| e.message)
                            .unwrap_or_else(|| "row was not inserted".to_string());
                        warn!("Row {row_number} rejected: {message}");
                        result.push(row_number, None, Some(message));
                    }
                },
                Err(err) if err.is_systemic() => {
                    result.fatal = Some(err);
                    return;
                }
                Err(err) => {
                    warn!("Row {row_number} rejected: {err}");
                    result.push(row_number, None, Some(err.to_string()));
                }
            }
        }
    }
}

/// Applies the write mode and the batch-level stamps to one record.
fn prepare(
    record: CanonicalLeadRecord,
    mode: ImportMode,
    organization_id: &str,
    created_at: NaiveDateTime,
) -> CanonicalLeadRecord {
    let mut record = record.project(mode);
    record.organization_id = Some(organization_id.to_string());
    if mode == ImportMode::Full
        && record.status == LeadStatus::FechadoGanho
        && record.closed_won_at.is_none()
    {
        record.closed_won_at = Some(created_at);
    }
    record
}
