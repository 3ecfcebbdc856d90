//! Structured observability hooks for selection, arbitration and evolution.
//!
//! Every event carries an `event` field so log pipelines can filter on it.
//! Events are emitted at `info!` level except write failures (`warn!`).

use std::error::Error;
use std::path::Path;

use tracing::{info, warn};
use uuid::Uuid;

use crate::negotiator::Decision;

/// RAII guard that enters an evolution-cycle span for its lifetime.
///
/// ```ignore
/// let _span = EvolutionSpan::enter("cycle-7");
/// // drafts written here are tagged with cycle = "cycle-7"
/// ```
pub struct EvolutionSpan {
    _span: tracing::span::EnteredSpan,
}

impl EvolutionSpan {
    pub fn enter(cycle: &str) -> Self {
        let span = tracing::info_span!("roleforge.evolve", cycle = %cycle);
        Self {
            _span: span.entered(),
        }
    }
}

/// Emit event: a registry snapshot was loaded.
pub fn emit_registry_loaded(path: &Path, role_count: usize, digest: &str) {
    info!(
        event = "registry.loaded",
        path = %path.display(),
        role_count = role_count,
        digest = %digest,
    );
}

/// Emit event: a selection finished with `top_role` ranked first.
pub fn emit_selection(top_role: &str, confidence: f64, candidates: usize) {
    info!(
        event = "selection.completed",
        top_role = %top_role,
        confidence = confidence,
        candidates = candidates,
    );
}

/// Emit event: arbitration produced `decision` from `opinion_count` opinions.
pub fn emit_decision(decision: &Decision, opinion_count: usize) {
    match decision {
        Decision::Escalate { votes } => info!(
            event = "arbitration.escalated",
            candidates = votes.len(),
            opinions = opinion_count,
        ),
        other => info!(
            event = "arbitration.decided",
            outcome = other.outcome(),
            role = other.role().unwrap_or_default(),
            opinions = opinion_count,
        ),
    }
}

/// Emit event: a draft record was persisted.
pub fn emit_draft_written(id: Uuid, original: &str) {
    info!(event = "draft.written", draft_id = %id, original = %original);
}

/// Emit event: persisting a draft failed (warning level).
pub fn emit_draft_write_failed(id: Uuid, original: &str, error: &dyn Error) {
    warn!(
        event = "draft.write_failed",
        draft_id = %id,
        original = %original,
        error = %error_chain(error),
    );
}

/// `error` followed by each of its sources, joined with `": "`.
pub fn error_chain(error: &dyn Error) -> String {
    let mut out = error.to_string();
    let mut cause = error.source();
    while let Some(e) = cause {
        out.push_str(": ");
        out.push_str(&e.to_string());
        cause = e.source();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn emitters_do_not_panic_without_subscriber() {
        emit_registry_loaded(Path::new("roles.yaml"), 3, "abc");
        emit_selection("reviewer", 0.6, 3);
        emit_decision(
            &Decision::Accept {
                role: "a".into(),
                confidence: 0.9,
            },
            1,
        );
        emit_decision(
            &Decision::Escalate {
                votes: BTreeMap::new(),
            },
            2,
        );
        emit_draft_written(Uuid::new_v4(), "a");
        let err = std::io::Error::other("disk full");
        emit_draft_write_failed(Uuid::new_v4(), "a", &err);
    }

    #[test]
    fn error_chain_lists_each_cause_once() {
        let err = crate::drafts::DraftStoreError::Io(std::io::Error::other("disk full"));
        assert_eq!(error_chain(&err), "draft store io error: disk full");
    }

    #[test]
    fn evolution_span_can_be_entered_and_dropped() {
        let span = EvolutionSpan::enter("cycle-1");
        drop(span);
    }
}
