//! In-memory draft store (tests and embedders that persist elsewhere).

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use super::{sort_drafts, Draft, DraftStore, DraftStoreError, DraftStoreResult};

#[derive(Debug, Default)]
pub struct MemoryDraftStore {
    drafts: Mutex<HashMap<Uuid, Draft>>,
}

impl MemoryDraftStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.drafts.lock().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn poisoned() -> DraftStoreError {
        DraftStoreError::Io(std::io::Error::other("draft store lock poisoned"))
    }
}

impl DraftStore for MemoryDraftStore {
    fn put(&self, draft: &Draft) -> DraftStoreResult<()> {
        let mut drafts = self.drafts.lock().map_err(|_| Self::poisoned())?;
        if drafts.contains_key(&draft.id) {
            return Err(DraftStoreError::AlreadyExists { id: draft.id });
        }
        drafts.insert(draft.id, draft.clone());
        Ok(())
    }

    fn get(&self, id: Uuid) -> DraftStoreResult<Draft> {
        let drafts = self.drafts.lock().map_err(|_| Self::poisoned())?;
        drafts
            .get(&id)
            .cloned()
            .ok_or(DraftStoreError::NotFound { id })
    }

    fn list(&self) -> DraftStoreResult<Vec<Draft>> {
        let drafts = self.drafts.lock().map_err(|_| Self::poisoned())?;
        let mut all: Vec<Draft> = drafts.values().cloned().collect();
        sort_drafts(&mut all);
        Ok(all)
    }
}
