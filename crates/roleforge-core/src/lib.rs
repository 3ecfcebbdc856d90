//! RoleForge Core Library
//!
//! Assigns a best-fit role to a task, reconciles disagreeing opinions into a
//! single decision, and proposes human-gated mutations of the role catalog.
//!
//! # Module layout
//!
//! - [`role`]: `Role`, `ScoringProfile`, `Priority`
//! - [`registry`]: `Registry` snapshots, `RegistryLoadError`
//! - [`selector`]: `Selector`, `Selection`, logistic calibration
//! - [`negotiator`]: `Negotiator`, `Opinion`, `Decision`, `ArbitrationError`
//! - [`drafts`]: `Draft`, `DraftStore`, `FsDraftStore`, `MemoryDraftStore`
//! - [`evolver`]: `Evolver`, `EvolveError`
//! - [`audit`]: `AuditRecord`, `AuditSink`, `JsonlAuditSink`
//! - [`config`]: `ForgeConfig`

pub mod audit;
pub mod config;
pub mod drafts;
pub mod evolver;
pub mod negotiator;
pub mod obs;
pub mod registry;
pub mod role;
pub mod selector;
pub mod telemetry;

pub use audit::{AuditError, AuditRecord, AuditSink, JsonlAuditSink, TracingAuditSink};
pub use config::{ConfigError, ForgeConfig};
pub use drafts::{
    Draft, DraftMeta, DraftStore, DraftStoreError, FsDraftStore, MemoryDraftStore,
};
pub use evolver::{mutation_tag, EvolveError, Evolver};
pub use negotiator::{
    arbitrate, ArbitrationError, Decision, Negotiator, Opinion, DEFAULT_THRESHOLD,
};
pub use obs::EvolutionSpan;
pub use registry::{Registry, RegistryLoadError, SourceFormat};
pub use role::{Priority, PriorityOutOfRange, Role, ScoringProfile};
pub use selector::{calibrate, tokenize, Selection, Selector};
pub use telemetry::init_tracing;
