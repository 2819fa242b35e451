#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::NaiveDateTime;
use lead_import::{
    data::SourceRow,
    file_store::FileStore,
    record::CanonicalLeadRecord,
    store::{BatchTotals, ImportBatch, InsertOutcome, LeadStore, RowAudit, StoreError},
};
use tempfile::{TempDir, tempdir};
use uuid::Uuid;

pub const ORG: &str = "org-acme";

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    /// Directory used as the lead store by CLI tests.
    pub fn store_dir(&self) -> PathBuf {
        self.temp_dir.path().join("store")
    }
}

/// Ten leads, rows 4 and 8 without a title.
pub const TEN_LEADS_CSV: &str = "\
Nome;E-mail;Telefone;Etapa;Valor;Origem
Ana Souza;ANA@EXAMPLE.COM;(11) 91234-5678;Ganho;1.234,56;Meta
Bruno Lima;bruno@example.com;11 99876 5432;Proposta;900;Google
;sem-titulo@example.com;;Novo;10;Site
Carla Dias;carla@example.com;;Negociação;2500,00;WhatsApp
Diego Reis;diego@example.com;;Em análise;abc;Indicação
Elisa Melo;elisa@example.com;;Perdido;0;Evento
   ;;;;;Manual
Fábio Nunes;fabio@example.com;;Follow-up;15;Telefone
Gabi Rocha;gabi;;Qualificação;300;Email
Hugo Alves;hugo@example.com;;Aguardando;42;Site
";

pub fn rows_with_titles(titles: &[&str]) -> Vec<SourceRow> {
    titles
        .iter()
        .enumerate()
        .map(|(i, title)| SourceRow::from_pairs(i + 2, [("Nome", *title)]))
        .collect()
}

/// Wraps a [`FileStore`] and injects failures into `insert_many`.
pub struct FaultyStore {
    pub inner: FileStore,
    calls: AtomicUsize,
    /// Calls after this many succeed fail with an outage.
    outage_after: Option<usize>,
    /// Records with this title fail with a constraint error when inserted in
    /// a chunk; alone they are reported as a row error.
    poison_title: Option<String>,
}

impl FaultyStore {
    pub fn outage_after(calls: usize) -> Self {
        Self {
            inner: FileStore::in_memory(),
            calls: AtomicUsize::new(0),
            outage_after: Some(calls),
            poison_title: None,
        }
    }

    pub fn poisoned(title: &str) -> Self {
        Self {
            inner: FileStore::in_memory(),
            calls: AtomicUsize::new(0),
            outage_after: None,
            poison_title: Some(title.to_string()),
        }
    }

    pub fn insert_calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl LeadStore for FaultyStore {
    fn create_batch(&self, batch: &ImportBatch) -> Result<(), StoreError> {
        self.inner.create_batch(batch)
    }

    fn insert_many(
        &self,
        records: &[CanonicalLeadRecord],
        batch_id: Uuid,
        organization_id: &str,
    ) -> Result<InsertOutcome, StoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.outage_after.is_some_and(|limit| call >= limit) {
            return Err(StoreError::Unavailable("connection reset".to_string()));
        }
        if let Some(poison) = &self.poison_title {
            let poisoned = records.iter().any(|r| &r.title == poison);
            if poisoned && records.len() > 1 {
                return Err(StoreError::Constraint("check constraint failed".to_string()));
            }
            if poisoned {
                return Ok(InsertOutcome {
                    inserted_ids: Vec::new(),
                    row_errors: vec![lead_import::store::RowError {
                        index: 0,
                        message: "check constraint failed".to_string(),
                    }],
                });
            }
        }
        self.inner.insert_many(records, batch_id, organization_id)
    }

    fn record_rows(&self, batch_id: Uuid, rows: &[RowAudit]) -> Result<(), StoreError> {
        self.inner.record_rows(batch_id, rows)
    }

    fn finish_batch(
        &self,
        batch_id: Uuid,
        totals: BatchTotals,
        completed_at: NaiveDateTime,
    ) -> Result<(), StoreError> {
        self.inner.finish_batch(batch_id, totals, completed_at)
    }

    fn find_batch(
        &self,
        batch_id: Uuid,
        organization_id: &str,
    ) -> Result<Option<ImportBatch>, StoreError> {
        self.inner.find_batch(batch_id, organization_id)
    }

    fn list_batches(&self, organization_id: &str) -> Result<Vec<ImportBatch>, StoreError> {
        self.inner.list_batches(organization_id)
    }

    fn delete_by_batch(
        &self,
        batch_id: Uuid,
        organization_id: &str,
        limit: usize,
    ) -> Result<usize, StoreError> {
        self.inner.delete_by_batch(batch_id, organization_id, limit)
    }

    fn mark_undone(
        &self,
        batch_id: Uuid,
        deleted: usize,
        undone_at: NaiveDateTime,
    ) -> Result<(), StoreError> {
        self.inner.mark_undone(batch_id, deleted, undone_at)
    }
}
