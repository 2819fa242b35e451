//! Batch-scoped removal of imported leads.

use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::store::{LeadStore, StoreError};

pub const DEFAULT_DELETE_CHUNK: usize = 500;

#[derive(Debug, Error)]
pub enum UndoError {
    #[error("No import batch {0} in this organization")]
    UnknownBatch(Uuid),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UndoReport {
    pub batch_id: Uuid,
    pub deleted_count: usize,
}

pub struct UndoEngine<'a> {
    store: &'a dyn LeadStore,
    chunk_size: usize,
}

impl<'a> UndoEngine<'a> {
    pub fn new(store: &'a dyn LeadStore) -> Self {
        Self {
            store,
            chunk_size: DEFAULT_DELETE_CHUNK,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Removes every lead tagged with `batch_id`. Running it again on the same
    /// batch deletes nothing and succeeds.
    pub fn undo(&self, batch_id: Uuid, organization_id: &str) -> Result<UndoReport, UndoError> {
        if self.store.find_batch(batch_id, organization_id)?.is_none() {
            return Err(UndoError::UnknownBatch(batch_id));
        }
        let mut deleted_count = 0;
        loop {
            let deleted = self
                .store
                .delete_by_batch(batch_id, organization_id, self.chunk_size)?;
            deleted_count += deleted;
            debug!("Batch {batch_id}: deleted {deleted} lead(s) in this pass");
            if deleted < self.chunk_size {
                break;
            }
        }
        self.store
            .mark_undone(batch_id, deleted_count, Utc::now().naive_utc())?;
        info!("Undid batch {batch_id}: {deleted_count} lead(s) removed");
        Ok(UndoReport {
            batch_id,
            deleted_count,
        })
    }
}
