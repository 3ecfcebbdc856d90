//! Draft records and the write-once draft store contract.
//!
//! A [`Draft`] is a proposed, unapplied mutation of a role awaiting human
//! review. Stores only ever add records: there is no update or delete, and no
//! code path in this crate writes a draft back into a registry source.

pub mod fs;
pub mod memory;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::role::Role;

pub use fs::FsDraftStore;
pub use memory::MemoryDraftStore;

/// Metadata recorded alongside a proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftMeta {
    pub created_at: DateTime<Utc>,
    /// Digest of the registry snapshot the proposal was derived from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_digest: Option<String>,
}

/// A proposed role mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Draft {
    pub id: Uuid,
    /// Name of the registry role the proposal was derived from.
    pub original: String,
    pub proposal: Role,
    pub meta: DraftMeta,
}

/// Errors from draft store operations.
#[derive(Debug, Error)]
pub enum DraftStoreError {
    #[error("draft {id} already exists")]
    AlreadyExists { id: Uuid },

    #[error("draft not found: {id}")]
    NotFound { id: Uuid },

    #[error("draft store io error")]
    Io(#[from] std::io::Error),

    #[error("draft serialization error")]
    Serialization(#[from] serde_json::Error),
}

pub type DraftStoreResult<T> = std::result::Result<T, DraftStoreError>;

/// Append-only collection of independently addressable drafts.
pub trait DraftStore: Send + Sync {
    /// Persist a new draft. Fails with `AlreadyExists` rather than overwrite.
    fn put(&self, draft: &Draft) -> DraftStoreResult<()>;

    /// Read a single draft by id.
    fn get(&self, id: Uuid) -> DraftStoreResult<Draft>;

    /// All drafts, ordered by `(created_at, id)`.
    fn list(&self) -> DraftStoreResult<Vec<Draft>>;
}

pub(crate) fn sort_drafts(drafts: &mut [Draft]) {
    drafts.sort_by(|a, b| {
        a.meta
            .created_at
            .cmp(&b.meta.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::role::Priority;

    #[test]
    fn test_draft_json_shape() {
        let draft = Draft {
            id: Uuid::parse_str("11111111-1111-4111-8111-111111111111").unwrap(),
            original: "reviewer".to_string(),
            proposal: Role::new(
                "reviewer",
                "Reviews code",
                vec![],
                Priority::new(6).unwrap(),
                "1.0.0-mut1760000000",
            ),
            meta: DraftMeta {
                created_at: DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
                    .unwrap()
                    .with_timezone(&Utc),
                registry_digest: None,
            },
        };
        let json = serde_json::to_value(&draft).unwrap();
        assert_eq!(json["original"], "reviewer");
        assert_eq!(json["proposal"]["scoring_profile"]["priority"], 6);
        assert_eq!(json["meta"]["created_at"], "2026-01-01T00:00:00Z");
        assert!(json["meta"].get("registry_digest").is_none());
    }
}
