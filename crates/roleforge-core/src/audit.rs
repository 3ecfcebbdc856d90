//! Audit records and the sink contract used by callers that keep an audit trail.
//!
//! The core operations never write audit records themselves; binaries build an
//! [`AuditRecord`] from an outcome and hand it to whichever [`AuditSink`] they
//! were configured with.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::drafts::Draft;
use crate::negotiator::{Decision, Opinion};
use crate::selector::Selection;

/// A single auditable outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditRecord {
    Selection {
        at: DateTime<Utc>,
        task: String,
        registry_digest: String,
        candidates: Vec<Selection>,
    },
    Arbitration {
        at: DateTime<Utc>,
        threshold: f64,
        opinions: Vec<Opinion>,
        decision: Decision,
    },
    DraftProposed {
        at: DateTime<Utc>,
        draft_id: Uuid,
        original: String,
        proposed_priority: u8,
        proposed_version: String,
    },
}

impl AuditRecord {
    pub fn draft_proposed(draft: &Draft) -> Self {
        AuditRecord::DraftProposed {
            at: draft.meta.created_at,
            draft_id: draft.id,
            original: draft.original.clone(),
            proposed_priority: draft.proposal.priority().get(),
            proposed_version: draft.proposal.version.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    #[error("audit io error")]
    Io(#[from] std::io::Error),

    #[error("audit serialization error")]
    Serialization(#[from] serde_json::Error),

    #[error("audit sink lock poisoned")]
    Poisoned,
}

pub type AuditResult<T> = std::result::Result<T, AuditError>;

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> AuditResult<()>;
}

/// Appends one JSON object per line to a file.
pub struct JsonlAuditSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonlAuditSink {
    /// Open `path` for appending, creating it (and parent dirs) if needed.
    pub fn open(path: impl AsRef<Path>) -> AuditResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AuditSink for JsonlAuditSink {
    fn record(&self, record: &AuditRecord) -> AuditResult<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        let mut file = self.file.lock().map_err(|_| AuditError::Poisoned)?;
        file.write_all(&line)?;
        file.flush()?;
        Ok(())
    }
}

/// Forwards records to `tracing` at `info!` level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) -> AuditResult<()> {
        let json = serde_json::to_string(record)?;
        tracing::info!(event = "audit.record", record = %json);
        Ok(())
    }
}
