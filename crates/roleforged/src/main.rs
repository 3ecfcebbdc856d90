//! RoleForge evolution daemon.
//!
//! Every interval the daemon reloads the role registry, proposes a batch of
//! mutated drafts and writes them to the draft store for human review. A
//! failed cycle is logged and retried on the next tick; nothing is retried
//! within a cycle.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn, Level};

use roleforge_core::{EvolutionSpan, EvolveError, Evolver, ForgeConfig, FsDraftStore, Registry};

#[derive(Parser)]
#[command(name = "roleforged")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scheduled RoleForge draft generation", long_about = None)]
struct Args {
    /// Registry source file (overrides ROLEFORGE_REGISTRY)
    #[arg(long)]
    registry: Option<PathBuf>,

    /// Draft store directory (overrides ROLEFORGE_DRAFTS_DIR)
    #[arg(long)]
    drafts_dir: Option<PathBuf>,

    /// Seconds between cycles (overrides ROLEFORGE_INTERVAL_SECS)
    #[arg(long)]
    interval_secs: Option<u64>,

    /// Drafts per cycle (overrides ROLEFORGE_MUTATIONS)
    #[arg(short = 'n', long)]
    mutations: Option<NonZeroUsize>,

    /// RNG seed (overrides ROLEFORGE_SEED)
    #[arg(long)]
    seed: Option<u64>,

    /// Run a single cycle and exit
    #[arg(long)]
    once: bool,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json_logs: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn into_config(self, mut config: ForgeConfig) -> Result<ForgeConfig> {
        if let Some(p) = self.registry {
            config.registry_path = p;
        }
        if let Some(d) = self.drafts_dir {
            config.drafts_dir = d;
        }
        if let Some(i) = self.interval_secs {
            config.evolve_interval_secs = i;
        }
        if let Some(n) = self.mutations {
            config.mutations_per_cycle = n.get();
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        config.validate()?;
        Ok(config)
    }
}

/// One evolution cycle against a freshly loaded registry snapshot.
fn run_cycle(
    config: &ForgeConfig,
    evolver: &Evolver,
    rng: &mut StdRng,
    cycle: u64,
) -> Result<usize> {
    let _span = EvolutionSpan::enter(&format!("cycle-{cycle}"));

    let registry = Registry::load(&config.registry_path).with_context(|| {
        format!(
            "Failed to load role registry {}",
            config.registry_path.display()
        )
    })?;
    let count =
        NonZeroUsize::new(config.mutations_per_cycle).context("mutations per cycle must be positive")?;

    let drafts = match evolver.propose_mutations(&registry, count, rng) {
        Ok(drafts) => drafts,
        Err(err) => {
            let written = written_ids(&err);
            return Err(err)
                .with_context(|| format!("Drafts persisted before the failure: [{written}]"));
        }
    };
    info!(
        event = "evolve.cycle_completed",
        drafts = drafts.len(),
        registry_digest = %registry.digest(),
    );
    Ok(drafts.len())
}

fn written_ids(err: &EvolveError) -> String {
    err.written()
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Log a failed cycle, listing drafts that were persisted before it failed.
fn log_cycle_failure(cycle: u64, e: &anyhow::Error) {
    let written = e
        .downcast_ref::<EvolveError>()
        .map(written_ids)
        .unwrap_or_default();
    warn!(
        event = "evolve.cycle_failed",
        cycle = cycle,
        written = %written,
        error = %format!("{e:#}"),
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    roleforge_core::init_tracing(args.json_logs, level);

    let once = args.once;
    let config = args.into_config(ForgeConfig::from_env()?)?;

    let store = FsDraftStore::new(&config.drafts_dir).with_context(|| {
        format!("Failed to open draft store {}", config.drafts_dir.display())
    })?;
    let evolver = Evolver::new(Arc::new(store));
    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    info!(
        registry = %config.registry_path.display(),
        drafts_dir = %config.drafts_dir.display(),
        interval_secs = config.evolve_interval_secs,
        "roleforged started"
    );

    if once {
        run_cycle(&config, &evolver, &mut rng, 1)?;
        return Ok(());
    }

    let mut ticker = tokio::time::interval(Duration::from_secs(config.evolve_interval_secs));
    let mut cycle: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                cycle += 1;
                if let Err(e) = run_cycle(&config, &evolver, &mut rng, cycle) {
                    log_cycle_failure(cycle, &e);
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!(cycles = cycle, "roleforged shutting down");
                break;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use roleforge_core::drafts::DraftStoreResult;
    use roleforge_core::{Draft, DraftStore, DraftStoreError, MemoryDraftStore};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    /// Accepts `accept` drafts, then every write fails.
    struct FullDiskStore {
        inner: MemoryDraftStore,
        accept: usize,
        puts: AtomicUsize,
    }

    impl DraftStore for FullDiskStore {
        fn put(&self, draft: &Draft) -> DraftStoreResult<()> {
            if self.puts.fetch_add(1, Ordering::SeqCst) >= self.accept {
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

    const ROLES: &str = "roles:\n  coder:\n    purpose: Implements the plan\n    scoring_profile:\n      priority: 7\n";

    fn config_in(dir: &std::path::Path) -> ForgeConfig {
        ForgeConfig {
            registry_path: dir.join("roles.yaml"),
            drafts_dir: dir.join("drafts"),
            mutations_per_cycle: 4,
            ..ForgeConfig::default()
        }
    }

    #[test]
    fn cycle_writes_configured_number_of_drafts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        std::fs::write(&config.registry_path, ROLES).unwrap();

        let store = Arc::new(FsDraftStore::new(&config.drafts_dir).unwrap());
        let evolver = Evolver::new(store.clone());
        let mut rng = StdRng::seed_from_u64(5);

        assert_eq!(run_cycle(&config, &evolver, &mut rng, 1).unwrap(), 4);
        assert_eq!(run_cycle(&config, &evolver, &mut rng, 2).unwrap(), 4);
        assert_eq!(store.list().unwrap().len(), 8);
    }

    #[test]
    fn cycle_with_missing_registry_fails_without_drafts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        let store = Arc::new(FsDraftStore::new(&config.drafts_dir).unwrap());
        let evolver = Evolver::new(store.clone());
        let mut rng = StdRng::seed_from_u64(5);

        let err = run_cycle(&config, &evolver, &mut rng, 1).unwrap_err();
        assert!(format!("{err:#}").contains("registry source not found"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn partially_failed_cycle_names_persisted_drafts() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        std::fs::write(&config.registry_path, ROLES).unwrap();
        let store = Arc::new(FullDiskStore {
            inner: MemoryDraftStore::new(),
            accept: 2,
            puts: AtomicUsize::new(0),
        });
        let evolver = Evolver::new(store.clone());
        let mut rng = StdRng::seed_from_u64(5);

        let err = run_cycle(&config, &evolver, &mut rng, 1).unwrap_err();
        let persisted = store.inner.list().unwrap();
        assert_eq!(persisted.len(), 2);

        let evolve_err = err.downcast_ref::<EvolveError>().unwrap();
        assert_eq!(evolve_err.written().len(), 2);
        let message = format!("{err:#}");
        for d in &persisted {
            assert!(evolve_err.written().contains(&d.id));
            assert!(message.contains(&d.id.to_string()), "{message}");
        }
        log_cycle_failure(1, &err);
    }

    #[test]
    fn args_override_config() {
        let args = Args::try_parse_from(["roleforged", "--interval-secs", "60", "-n", "2", "--once"])
            .unwrap();
        assert!(args.once);
        let config = args.into_config(ForgeConfig::default()).unwrap();
        assert_eq!(config.evolve_interval_secs, 60);
        assert_eq!(config.mutations_per_cycle, 2);
    }

    #[test]
    fn zero_interval_is_rejected() {
        let args = Args::try_parse_from(["roleforged", "--interval-secs", "0"]).unwrap();
        assert!(args.into_config(ForgeConfig::default()).is_err());
    }
}
