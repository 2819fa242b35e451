//! JSON-document store backing the command-line front end.
//!
//! The whole store is one `store.json` in the store directory. Every mutation
//! works on a copy of the document, writes it to a temp file, renames it over
//! the previous one and only then swaps the in-memory state, so a failed
//! write leaves both disk and memory untouched.

use std::{
    fs::{self, File},
    io::{BufReader, Write},
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use chrono::{NaiveDateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    record::CanonicalLeadRecord,
    store::{
        BatchTotals, ImportBatch, InsertOutcome, LeadStore, MappingProfile, MappingRepository,
        RowAudit, RowError, RowStatus, StoreError,
    },
};

pub const STORE_FILE_NAME: &str = "store.json";
pub const MAX_TITLE_CHARS: usize = 255;

/// A persisted lead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredLead {
    pub id: Uuid,
    pub batch_id: Uuid,
    pub organization_id: String,
    pub created_at: NaiveDateTime,
    pub record: CanonicalLeadRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct BatchEntry {
    batch: ImportBatch,
    #[serde(default)]
    rows: Vec<RowAudit>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct StoreDocument {
    #[serde(default)]
    batches: Vec<BatchEntry>,
    #[serde(default)]
    leads: Vec<StoredLead>,
    #[serde(default)]
    mappings: Vec<MappingProfile>,
}

impl StoreDocument {
    fn batch_mut(&mut self, batch_id: Uuid) -> Result<&mut BatchEntry, StoreError> {
        self.batches
            .iter_mut()
            .find(|entry| entry.batch.id == batch_id)
            .ok_or_else(|| StoreError::Constraint(format!("Unknown batch {batch_id}")))
    }
}

#[derive(Debug)]
pub struct FileStore {
    path: Option<PathBuf>,
    state: Mutex<StoreDocument>,
}

fn require_org(organization_id: &str) -> Result<(), StoreError> {
    if organization_id.trim().is_empty() {
        return Err(StoreError::Unauthorized(
            "organization id is required".to_string(),
        ));
    }
    Ok(())
}

impl FileStore {
    /// Opens (or starts) the store kept in `dir`.
    pub fn open(dir: &Path) -> Result<Self, StoreError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(STORE_FILE_NAME);
        let document = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            serde_json::from_reader(reader)?
        } else {
            StoreDocument::default()
        };
        debug!("Opened store {path:?}");
        Ok(Self {
            path: Some(path),
            state: Mutex::new(document),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            state: Mutex::new(StoreDocument::default()),
        }
    }

    /// Leads currently held for an organization, in insertion order.
    pub fn leads(&self, organization_id: &str) -> Result<Vec<StoredLead>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .leads
            .iter()
            .filter(|lead| lead.organization_id == organization_id)
            .cloned()
            .collect())
    }

    pub fn row_audits(&self, batch_id: Uuid) -> Result<Vec<RowAudit>, StoreError> {
        let state = self.lock()?;
        Ok(state
            .batches
            .iter()
            .find(|entry| entry.batch.id == batch_id)
            .map(|entry| entry.rows.clone())
            .unwrap_or_default())
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreDocument>, StoreError> {
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("store lock poisoned".to_string()))
    }

    fn write<T>(
        &self,
        mutate: impl FnOnce(&mut StoreDocument) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let mut guard = self.lock()?;
        let mut next = guard.clone();
        let out = mutate(&mut next)?;
        self.persist(&next)?;
        *guard = next;
        Ok(out)
    }

    fn persist(&self, document: &StoreDocument) -> Result<(), StoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let bytes = serde_json::to_vec_pretty(document)?;
        let temp_path = path.with_extension("json.tmp");
        let mut file = File::create(&temp_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        fs::rename(&temp_path, path)?;
        Ok(())
    }
}

impl LeadStore for FileStore {
    fn create_batch(&self, batch: &ImportBatch) -> Result<(), StoreError> {
        require_org(&batch.organization_id)?;
        self.write(|doc| {
            if doc.batches.iter().any(|entry| entry.batch.id == batch.id) {
                return Err(StoreError::Constraint(format!(
                    "Batch {} already exists",
                    batch.id
                )));
            }
            doc.batches.push(BatchEntry {
                batch: batch.clone(),
                rows: Vec::new(),
            });
            Ok(())
        })
    }

    fn insert_many(
        &self,
        records: &[CanonicalLeadRecord],
        batch_id: Uuid,
        organization_id: &str,
    ) -> Result<InsertOutcome, StoreError> {
        require_org(organization_id)?;
        let now = Utc::now().naive_utc();
        self.write(|doc| {
            let entry = doc.batch_mut(batch_id)?;
            if entry.batch.organization_id != organization_id {
                return Err(StoreError::Unauthorized(format!(
                    "batch {batch_id} belongs to another organization"
                )));
            }
            let mut outcome = InsertOutcome::default();
            for (index, record) in records.iter().enumerate() {
                if let Some(message) = violation(record, organization_id) {
                    outcome.row_errors.push(RowError { index, message });
                    continue;
                }
                let id = Uuid::new_v4();
                doc.leads.push(StoredLead {
                    id,
                    batch_id,
                    organization_id: organization_id.to_string(),
                    created_at: now,
                    record: record.clone(),
                });
                outcome.inserted_ids.push(id);
            }
            Ok(outcome)
        })
    }

    fn record_rows(&self, batch_id: Uuid, rows: &[RowAudit]) -> Result<(), StoreError> {
        self.write(|doc| {
            doc.batch_mut(batch_id)?.rows.extend_from_slice(rows);
            Ok(())
        })
    }

    fn finish_batch(
        &self,
        batch_id: Uuid,
        totals: BatchTotals,
        completed_at: NaiveDateTime,
    ) -> Result<(), StoreError> {
        self.write(|doc| {
            let batch = &mut doc.batch_mut(batch_id)?.batch;
            batch.imported = totals.imported;
            batch.skipped = totals.skipped;
            batch.error_count = totals.error_count;
            batch.completed_at = Some(completed_at);
            Ok(())
        })
    }

    fn find_batch(
        &self,
        batch_id: Uuid,
        organization_id: &str,
    ) -> Result<Option<ImportBatch>, StoreError> {
        require_org(organization_id)?;
        let state = self.lock()?;
        Ok(state
            .batches
            .iter()
            .map(|entry| &entry.batch)
            .find(|batch| batch.id == batch_id && batch.organization_id == organization_id)
            .cloned())
    }

    fn list_batches(&self, organization_id: &str) -> Result<Vec<ImportBatch>, StoreError> {
        require_org(organization_id)?;
        let state = self.lock()?;
        let mut batches = state
            .batches
            .iter()
            .map(|entry| &entry.batch)
            .filter(|batch| batch.organization_id == organization_id)
            .cloned()
            .collect::<Vec<_>>();
        batches.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(batches)
    }

    fn delete_by_batch(
        &self,
        batch_id: Uuid,
        organization_id: &str,
        limit: usize,
    ) -> Result<usize, StoreError> {
        require_org(organization_id)?;
        self.write(|doc| {
            let mut removed = 0;
            doc.leads.retain(|lead| {
                let hit = removed < limit
                    && lead.batch_id == batch_id
                    && lead.organization_id == organization_id;
                if hit {
                    removed += 1;
                }
                !hit
            });
            Ok(removed)
        })
    }

    fn mark_undone(
        &self,
        batch_id: Uuid,
        deleted: usize,
        undone_at: NaiveDateTime,
    ) -> Result<(), StoreError> {
        self.write(|doc| {
            let entry = doc.batch_mut(batch_id)?;
            entry.batch.imported = entry.batch.imported.saturating_sub(deleted);
            entry.batch.skipped += deleted;
            entry.batch.undone_at.get_or_insert(undone_at);
            for row in entry
                .rows
                .iter_mut()
                .filter(|row| row.status == RowStatus::Imported)
            {
                row.status = RowStatus::Undone;
            }
            Ok(())
        })
    }
}

fn violation(record: &CanonicalLeadRecord, organization_id: &str) -> Option<String> {
    let title_chars = record.title.chars().count();
    if record.title.trim().is_empty() {
        return Some("title is required".to_string());
    }
    if title_chars > MAX_TITLE_CHARS {
        return Some(format!(
            "title has {title_chars} characters (limit {MAX_TITLE_CHARS})"
        ));
    }
    match record.organization_id.as_deref() {
        Some(org) if org != organization_id => {
            Some(format!("record organization '{org}' does not match batch"))
        }
        _ => None,
    }
}

impl MappingRepository for FileStore {
    fn save_mapping(&self, profile: MappingProfile) -> Result<MappingProfile, StoreError> {
        require_org(&profile.organization_id)?;
        self.write(|doc| {
            let existing = doc.mappings.iter_mut().find(|p| {
                p.organization_id == profile.organization_id && p.name == profile.name
            });
            match existing {
                Some(stored) => {
                    stored.mapping = profile.mapping;
                    Ok(stored.clone())
                }
                None => {
                    doc.mappings.push(profile.clone());
                    Ok(profile)
                }
            }
        })
    }

    fn list_mappings(&self, organization_id: &str) -> Result<Vec<MappingProfile>, StoreError> {
        require_org(organization_id)?;
        let state = self.lock()?;
        Ok(state
            .mappings
            .iter()
            .filter(|p| p.organization_id == organization_id)
            .cloned()
            .collect())
    }

    fn touch_mapping(
        &self,
        id: Uuid,
        used_at: NaiveDateTime,
    ) -> Result<Option<MappingProfile>, StoreError> {
        self.write(|doc| {
            Ok(doc.mappings.iter_mut().find(|p| p.id == id).map(|p| {
                p.usage_count += 1;
                p.last_used_at = Some(used_at);
                p.clone()
            }))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aliases::{LeadSource, LeadStatus},
        mapping::ColumnMapping,
        record::ImportMode,
        store::SourceFile,
    };
    use tempfile::tempdir;

    fn batch(org: &str) -> ImportBatch {
        ImportBatch {
            id: Uuid::new_v4(),
            organization_id: org.to_string(),
            created_at: Utc::now().naive_utc(),
            completed_at: None,
            undone_at: None,
            source: SourceFile::default(),
            mode: ImportMode::Full,
            mapping: ColumnMapping::new(),
            row_count: 0,
            imported: 0,
            skipped: 0,
            error_count: 0,
        }
    }

    fn lead(title: &str) -> CanonicalLeadRecord {
        CanonicalLeadRecord::new(title, LeadStatus::NovoLead, LeadSource::Manual)
    }

    #[test]
    fn insert_rejects_long_titles_per_row() {
        let store = FileStore::in_memory();
        let batch = batch("org");
        store.create_batch(&batch).unwrap();
        let records = vec![lead("ok"), lead(&"x".repeat(256)), lead("also ok")];
        let outcome = store.insert_many(&records, batch.id, "org").unwrap();
        assert_eq!(outcome.inserted_ids.len(), 2);
        assert_eq!(outcome.row_errors.len(), 1);
        assert_eq!(outcome.row_errors[0].index, 1);
    }

    #[test]
    fn empty_organization_is_unauthorized() {
        let store = FileStore::in_memory();
        let err = store.insert_many(&[lead("a")], Uuid::new_v4(), " ").unwrap_err();
        assert!(matches!(err, StoreError::Unauthorized(_)));
        assert!(err.is_systemic());
    }

    #[test]
    fn delete_by_batch_honours_limit() {
        let store = FileStore::in_memory();
        let batch = batch("org");
        store.create_batch(&batch).unwrap();
        let records = (0..5).map(|i| lead(&format!("L{i}"))).collect::<Vec<_>>();
        store.insert_many(&records, batch.id, "org").unwrap();
        assert_eq!(store.delete_by_batch(batch.id, "org", 3).unwrap(), 3);
        assert_eq!(store.delete_by_batch(batch.id, "other", 3).unwrap(), 0);
        assert_eq!(store.delete_by_batch(batch.id, "org", 3).unwrap(), 2);
        assert!(store.leads("org").unwrap().is_empty());
    }

    #[test]
    fn reopened_store_sees_persisted_batch() {
        let dir = tempdir().unwrap();
        let batch = batch("org");
        {
            let store = FileStore::open(dir.path()).unwrap();
            store.create_batch(&batch).unwrap();
            store.insert_many(&[lead("Ana")], batch.id, "org").unwrap();
        }
        let store = FileStore::open(dir.path()).unwrap();
        assert_eq!(store.find_batch(batch.id, "org").unwrap().unwrap().id, batch.id);
        assert!(store.find_batch(batch.id, "intruder").unwrap().is_none());
        assert_eq!(store.leads("org").unwrap().len(), 1);
        assert!(!dir.path().join("store.json.tmp").exists());
    }
}
