use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use uuid::Uuid;

use super::{sort_drafts, Draft, DraftStore, DraftStoreError, DraftStoreResult};

/// Filesystem-backed draft store: one pretty-printed JSON file per draft.
///
/// Layout: `<root>/<uuid>.json`
pub struct FsDraftStore {
    root: PathBuf,
}

impl FsDraftStore {
    /// Create a store rooted at `root`, creating the directory if needed.
    pub fn new(root: impl AsRef<Path>) -> DraftStoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn draft_path(&self, id: Uuid) -> PathBuf {
        self.root.join(format!("{id}.json"))
    }
}

impl DraftStore for FsDraftStore {
    fn put(&self, draft: &Draft) -> DraftStoreResult<()> {
        let path = self.draft_path(draft.id);
        let bytes = serde_json::to_vec_pretty(draft)?;

        // Write to a temp file in the same directory, then link it into place
        // without clobbering, so readers never observe a partial record.
        let mut tmp = NamedTempFile::new_in(&self.root)?;
        tmp.write_all(&bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist_noclobber(&path).map_err(|e| {
            if e.error.kind() == std::io::ErrorKind::AlreadyExists {
                DraftStoreError::AlreadyExists { id: draft.id }
            } else {
                DraftStoreError::Io(e.error)
            }
        })?;
        Ok(())
    }

    fn get(&self, id: Uuid) -> DraftStoreResult<Draft> {
        let bytes = fs::read(self.draft_path(id)).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                DraftStoreError::NotFound { id }
            } else {
                DraftStoreError::Io(e)
            }
        })?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    fn list(&self) -> DraftStoreResult<Vec<Draft>> {
        let mut drafts = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let path = entry?.path();
            let is_record = path.extension().and_then(|e| e.to_str()) == Some("json")
                && path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .is_some_and(|s| Uuid::parse_str(s).is_ok());
            if !is_record {
                continue;
            }
            let bytes = fs::read(&path)?;
            drafts.push(serde_json::from_slice(&bytes)?);
        }
        sort_drafts(&mut drafts);
        Ok(drafts)
    }
}
