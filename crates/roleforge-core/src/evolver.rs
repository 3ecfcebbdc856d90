//! Mutation proposals for the role catalog.
//!
//! The [`Evolver`] samples roles from a registry snapshot, perturbs their
//! scoring priority and records each result as a standalone [`Draft`] in a
//! [`DraftStore`]. It only ever reads the registry; promoting a draft into the
//! registry source is a separate, human-approved process outside this crate.

use std::num::NonZeroUsize;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::debug;
use uuid::Uuid;

use crate::drafts::{Draft, DraftMeta, DraftStore, DraftStoreError};
use crate::registry::Registry;

/// Errors produced by [`Evolver::propose_mutations`].
#[derive(Debug, thiserror::Error)]
pub enum EvolveError {
    #[error("registry has no roles to mutate")]
    EmptyRegistry,

    /// Drafts in `written` were persisted before the failure and stay valid.
    #[error("failed to persist draft {failed} after writing {} draft(s)", .written.len())]
    MutationWrite {
        written: Vec<Uuid>,
        failed: Uuid,
        #[source]
        source: DraftStoreError,
    },
}

impl EvolveError {
    /// Ids of drafts that were persisted before the error; empty when none were.
    pub fn written(&self) -> &[Uuid] {
        match self {
            EvolveError::MutationWrite { written, .. } => written,
            EvolveError::EmptyRegistry => &[],
        }
    }
}

pub type EvolveResult<T> = std::result::Result<T, EvolveError>;

/// Version suffix marking a mutated proposal.
pub fn mutation_tag(now: DateTime<Utc>) -> String {
    format!("mut{}", now.timestamp())
}

/// Draft generator bound to a draft store.
#[derive(Clone)]
pub struct Evolver {
    store: Arc<dyn DraftStore>,
}

impl Evolver {
    pub fn new(store: Arc<dyn DraftStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn DraftStore> {
        &self.store
    }

    /// Propose `n` mutations stamped with the current time.
    pub fn propose_mutations<R: Rng + ?Sized>(
        &self,
        registry: &Registry,
        n: NonZeroUsize,
        rng: &mut R,
    ) -> EvolveResult<Vec<Draft>> {
        self.propose_mutations_at(registry, n, rng, Utc::now())
    }

    /// Propose `n` mutations stamped with `now`.
    ///
    /// Roles are drawn uniformly with replacement, so one role may be drafted
    /// several times in a single call. Each draft is persisted on its own; on
    /// a write failure the drafts already written are reported and kept.
    pub fn propose_mutations_at<R: Rng + ?Sized>(
        &self,
        registry: &Registry,
        n: NonZeroUsize,
        rng: &mut R,
        now: DateTime<Utc>,
    ) -> EvolveResult<Vec<Draft>> {
        let names = registry.names();
        let tag = mutation_tag(now);
        let mut drafts: Vec<Draft> = Vec::with_capacity(n.get());

        for _ in 0..n.get() {
            let name = names.choose(rng).ok_or(EvolveError::EmptyRegistry)?;
            let Some(role) = registry.get(name) else {
                return Err(EvolveError::EmptyRegistry);
            };

            let delta: i8 = rng.gen_range(-1..=1);
            let mut proposal = role.clone();
            proposal.scoring_profile.priority = role.priority().nudged(delta);
            proposal.version = format!("{}-{}", role.version, tag);

            let draft = Draft {
                id: Uuid::new_v4(),
                original: role.name.clone(),
                proposal,
                meta: DraftMeta {
                    created_at: now,
                    registry_digest: Some(registry.digest().to_string()),
                },
            };

            if let Err(source) = self.store.put(&draft) {
                crate::obs::emit_draft_write_failed(draft.id, &draft.original, &source);
                return Err(EvolveError::MutationWrite {
                    written: drafts.iter().map(|d| d.id).collect(),
                    failed: draft.id,
                    source,
                });
            }
            debug!(
                original = %draft.original,
                priority_from = role.priority().get(),
                priority_to = draft.proposal.priority().get(),
                "mutation proposed"
            );
            crate::obs::emit_draft_written(draft.id, &draft.original);
            drafts.push(draft);
        }

        Ok(drafts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drafts::{DraftStoreResult, MemoryDraftStore};
    use crate::role::{Priority, Role};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn registry(priorities: &[(&str, i64)]) -> Registry {
        Registry::from_roles(priorities.iter().map(|(name, p)| {
            Role::new(*name, "does things", vec![], Priority::new(*p).unwrap(), "1.0.0")
        }))
        .unwrap()
    }

    fn n(v: usize) -> NonZeroUsize {
        NonZeroUsize::new(v).unwrap()
    }

    /// Accepts `limit` drafts, then fails every write.
    struct FlakyStore {
        inner: MemoryDraftStore,
        limit: usize,
        seen: AtomicUsize,
    }

    impl DraftStore for FlakyStore {
        fn put(&self, draft: &Draft) -> DraftStoreResult<()> {
            if self.seen.fetch_add(1, Ordering::SeqCst) >= self.limit {
                return Err(DraftStoreError::Io(std::io::Error::other("disk full")));
            }
            self.inner.put(draft)
        }

        fn get(&self, id: Uuid) -> DraftStoreResult<Draft> {
            self.inner.get(id)
        }

        fn list(&self) -> DraftStoreResult<Vec<Draft>> {
            self.inner.list()
        }
    }

    #[test]
    fn test_proposes_exactly_n_distinct_drafts() {
        let store = Arc::new(MemoryDraftStore::new());
        let evolver = Evolver::new(store.clone());
        let reg = registry(&[("a", 5), ("b", 6)]);
        let mut rng = StdRng::seed_from_u64(7);

        let drafts = evolver.propose_mutations(&reg, n(12), &mut rng).unwrap();
        assert_eq!(drafts.len(), 12);
        let ids: std::collections::HashSet<Uuid> = drafts.iter().map(|d| d.id).collect();
        assert_eq!(ids.len(), 12);
        assert_eq!(store.len(), 12);
    }

    #[test]
    fn test_priority_stays_within_bounds() {
        let store = Arc::new(MemoryDraftStore::new());
        let evolver = Evolver::new(store);
        let reg = registry(&[("top", 10), ("bottom", 1)]);
        let mut rng = StdRng::seed_from_u64(42);

        for d in evolver.propose_mutations(&reg, n(200), &mut rng).unwrap() {
            let p = d.proposal.priority().get();
            match d.original.as_str() {
                "top" => assert!((9..=10).contains(&p)),
                "bottom" => assert!((1..=2).contains(&p)),
                other => panic!("unexpected role {other}"),
            }
        }
    }

    #[test]
    fn test_same_seed_reproduces_mutation_sequence() {
        let reg = registry(&[("a", 5), ("b", 5), ("c", 5)]);
        let now = Utc::now();
        let run = |seed| {
            let evolver = Evolver::new(Arc::new(MemoryDraftStore::new()));
            let mut rng = StdRng::seed_from_u64(seed);
            evolver
                .propose_mutations_at(&reg, n(20), &mut rng, now)
                .unwrap()
                .into_iter()
                .map(|d| (d.original, d.proposal))
                .collect::<Vec<_>>()
        };
        assert_eq!(run(99), run(99));
    }

    #[test]
    fn test_version_carries_mutation_tag() {
        let reg = registry(&[("a", 5)]);
        let evolver = Evolver::new(Arc::new(MemoryDraftStore::new()));
        let now = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut rng = StdRng::seed_from_u64(1);
        let drafts = evolver
            .propose_mutations_at(&reg, n(1), &mut rng, now)
            .unwrap();
        assert_eq!(
            drafts[0].proposal.version,
            format!("1.0.0-mut{}", now.timestamp())
        );
        assert_eq!(drafts[0].meta.created_at, now);
        assert_eq!(
            drafts[0].meta.registry_digest.as_deref(),
            Some(reg.digest())
        );
    }

    #[test]
    fn test_empty_registry_error_has_no_written_drafts() {
        assert!(EvolveError::EmptyRegistry.written().is_empty());
    }

    #[test]
    fn test_write_failure_reports_already_written_drafts() {
        let store = Arc::new(FlakyStore {
            inner: MemoryDraftStore::new(),
            limit: 2,
            seen: AtomicUsize::new(0),
        });
        let evolver = Evolver::new(store.clone());
        let reg = registry(&[("a", 5)]);
        let mut rng = StdRng::seed_from_u64(3);

        let err = evolver.propose_mutations(&reg, n(5), &mut rng).unwrap_err();
        let message = err.to_string();
        match err {
            EvolveError::MutationWrite {
                written, failed, ..
            } => {
                assert_eq!(written.len(), 2);
                assert!(!written.contains(&failed));
                assert_eq!(
                    message,
                    format!("failed to persist draft {failed} after writing 2 draft(s)")
                );
                for id in &written {
                    assert!(store.inner.get(*id).is_ok());
                }
                let rebuilt = EvolveError::MutationWrite {
                    written: written.clone(),
                    failed,
                    source: DraftStoreError::NotFound { id: failed },
                };
                assert_eq!(rebuilt.written(), written.as_slice());
            }
            other => panic!("expected MutationWrite, got {other:?}"),
        }
    }
}
