//! RoleForge CLI
//!
//! The `roleforge` command exposes role selection, opinion arbitration and
//! draft generation over a registry file.
//!
//! ## Commands
//!
//! - `roles`: List the roles in the registry
//! - `select`: Rank roles for a task description
//! - `arbitrate`: Reduce a JSON opinion set to a decision
//! - `negotiate`: Select, then arbitrate the resulting opinions
//! - `evolve`: Propose mutated role drafts for human review
//! - `drafts`: Inspect the draft store (read-only)

use std::io::Read;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{info, Level};
use uuid::Uuid;

use roleforge_core::obs::error_chain;
use roleforge_core::{
    AuditRecord, AuditSink, Decision, Draft, DraftStore, EvolveError, Evolver, ForgeConfig,
    FsDraftStore, JsonlAuditSink, Negotiator, Opinion, Registry, Selection, Selector,
    TracingAuditSink,
};

#[derive(Parser)]
#[command(name = "roleforge")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Role selection, arbitration and human-gated role evolution", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    /// Registry source file (overrides ROLEFORGE_REGISTRY)
    #[arg(long, global = true)]
    registry: Option<PathBuf>,

    /// Draft store directory (overrides ROLEFORGE_DRAFTS_DIR)
    #[arg(long, global = true)]
    drafts_dir: Option<PathBuf>,

    /// Append audit records as JSON lines to this file (default: log them)
    #[arg(long, global = true)]
    audit_log: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List roles in the registry
    Roles {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Rank roles for a task description
    Select {
        /// Free-text task description
        task: String,

        /// Number of candidates to return
        #[arg(short = 'k', long)]
        top_k: Option<NonZeroUsize>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Arbitrate a JSON array of opinions
    Arbitrate {
        /// File containing `[{"role", "confidence", "actor"}, ...]` (`-` for stdin)
        #[arg(short, long)]
        opinions: PathBuf,

        /// Acceptance threshold in (0, 1]
        #[arg(short, long)]
        threshold: Option<f64>,
    },

    /// Select roles for a task and arbitrate the resulting opinions
    Negotiate {
        /// Free-text task description
        task: String,

        /// Number of candidates turned into opinions
        #[arg(short = 'k', long)]
        top_k: Option<NonZeroUsize>,

        /// Acceptance threshold in (0, 1]
        #[arg(short, long)]
        threshold: Option<f64>,

        /// Actor name recorded on the generated opinions
        #[arg(long, default_value = "roleforge-selector")]
        actor: String,
    },

    /// Propose mutated drafts of registry roles
    Evolve {
        /// Number of drafts to propose
        #[arg(short, long)]
        count: Option<NonZeroUsize>,

        /// RNG seed for reproducible proposals (overrides ROLEFORGE_SEED)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Inspect drafts awaiting review
    Drafts {
        #[command(subcommand)]
        action: DraftsAction,
    },
}

#[derive(Subcommand)]
enum DraftsAction {
    /// List drafts, oldest first
    List,
    /// Print a single draft as JSON
    Show {
        /// Draft id
        id: Uuid,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    roleforge_core::init_tracing(cli.json_logs, level);

    let config = resolve_config(
        &cli,
        ForgeConfig::from_env().context("Invalid ROLEFORGE_* environment")?,
    )?;

    let audit: Box<dyn AuditSink> = match &cli.audit_log {
        Some(path) => Box::new(
            JsonlAuditSink::open(path)
                .with_context(|| format!("Failed to open audit log {}", path.display()))?,
        ),
        None => Box::new(TracingAuditSink),
    };
    let audit = audit.as_ref();

    match cli.command {
        Commands::Roles { json } => cmd_roles(&config, json),
        Commands::Select { task, json, .. } => cmd_select(&config, &task, json, audit),
        Commands::Arbitrate { opinions, .. } => cmd_arbitrate(&config, &opinions, audit),
        Commands::Negotiate { task, actor, .. } => cmd_negotiate(&config, &task, &actor, audit),
        Commands::Evolve { .. } => cmd_evolve(&config, audit),
        Commands::Drafts { action } => match action {
            DraftsAction::List => cmd_drafts_list(&config),
            DraftsAction::Show { id } => cmd_drafts_show(&config, id),
        },
    }
}

/// Overlay command-line flags on `config` and re-validate the result.
fn resolve_config(cli: &Cli, mut config: ForgeConfig) -> Result<ForgeConfig> {
    if let Some(path) = &cli.registry {
        config.registry_path = path.clone();
    }
    if let Some(dir) = &cli.drafts_dir {
        config.drafts_dir = dir.clone();
    }

    let (top_k, threshold) = match &cli.command {
        Commands::Select { top_k, .. } => (*top_k, None),
        Commands::Arbitrate { threshold, .. } => (None, *threshold),
        Commands::Negotiate {
            top_k, threshold, ..
        } => (*top_k, *threshold),
        Commands::Evolve { count, seed } => {
            if let Some(c) = count {
                config.mutations_per_cycle = c.get();
            }
            if seed.is_some() {
                config.seed = *seed;
            }
            (None, None)
        }
        Commands::Roles { .. } | Commands::Drafts { .. } => (None, None),
    };
    if let Some(k) = top_k {
        config.top_k = k.get();
    }
    if let Some(t) = threshold {
        config.threshold = t;
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn load_registry(config: &ForgeConfig) -> Result<Registry> {
    Registry::load(&config.registry_path).with_context(|| {
        format!(
            "Failed to load role registry {}",
            config.registry_path.display()
        )
    })
}

fn top_k(config: &ForgeConfig) -> Result<NonZeroUsize> {
    NonZeroUsize::new(config.top_k).context("top-k must be positive")
}

fn record(audit: &dyn AuditSink, rec: AuditRecord) {
    if let Err(e) = audit.record(&rec) {
        tracing::warn!(event = "audit.write_failed", error = %error_chain(&e));
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}

/// List registry roles
fn cmd_roles(config: &ForgeConfig, json: bool) -> Result<()> {
    let registry = load_registry(config)?;
    if json {
        let roles: Vec<_> = registry.roles().collect();
        return print_json(&roles);
    }

    println!("Registry: {}", config.registry_path.display());
    println!("Digest:   {}", &registry.digest()[..12.min(registry.digest().len())]);
    println!();
    println!("{:<24} {:>8} {:<16} PURPOSE", "NAME", "PRIORITY", "VERSION");
    for role in registry.roles() {
        println!(
            "{:<24} {:>8} {:<16} {}",
            role.name,
            role.priority(),
            role.version,
            truncate(&role.purpose, 60)
        );
    }
    Ok(())
}

/// Rank roles for a task
fn cmd_select(
    config: &ForgeConfig,
    task: &str,
    json: bool,
    audit: &dyn AuditSink,
) -> Result<()> {
    let registry = load_registry(config)?;
    let selections = Selector::new().select(task, &registry, top_k(config)?);

    record(
        audit,
        AuditRecord::Selection {
            at: Utc::now(),
            task: task.to_string(),
            registry_digest: registry.digest().to_string(),
            candidates: selections.clone(),
        },
    );

    if json {
        return print_json(&selections);
    }
    print_selections(&selections);
    Ok(())
}

fn print_selections(selections: &[Selection]) {
    println!("{:<4} {:<24} {:>10} {:>8}  EXPLANATION", "#", "ROLE", "CONFIDENCE", "RAW");
    for (i, s) in selections.iter().enumerate() {
        println!(
            "{:<4} {:<24} {:>10.4} {:>8.3}  {}",
            i + 1,
            s.role,
            s.confidence,
            s.raw_score,
            s.explanation
        );
    }
}

fn read_opinions(path: &Path) -> Result<Vec<Opinion>> {
    let content = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read opinions from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read opinions from {}", path.display()))?
    };
    serde_json::from_str(&content).context("Opinions must be a JSON array of {role, confidence, actor}")
}

fn decide(
    config: &ForgeConfig,
    opinions: Vec<Opinion>,
    audit: &dyn AuditSink,
) -> Result<Decision> {
    let negotiator = Negotiator::new(config.threshold)?;
    let decision = negotiator.arbitrate(&opinions)?;
    record(
        audit,
        AuditRecord::Arbitration {
            at: Utc::now(),
            threshold: negotiator.threshold(),
            opinions,
            decision: decision.clone(),
        },
    );
    Ok(decision)
}

/// Arbitrate opinions from a file or stdin
fn cmd_arbitrate(config: &ForgeConfig, path: &Path, audit: &dyn AuditSink) -> Result<()> {
    let opinions = read_opinions(path)?;
    let decision = decide(config, opinions, audit)?;
    print_json(&decision)
}

/// Select, then arbitrate the selector's own opinions
fn cmd_negotiate(
    config: &ForgeConfig,
    task: &str,
    actor: &str,
    audit: &dyn AuditSink,
) -> Result<()> {
    let registry = load_registry(config)?;
    let opinions = Selector::new().opinions(task, &registry, top_k(config)?, actor);
    let decision = decide(config, opinions, audit)?;

    match &decision {
        Decision::Accept { role, confidence } => {
            println!("accept: {role} (confidence {confidence:.4})")
        }
        Decision::Voted { role, weight } => println!("voted: {role} (weight {weight:.4})"),
        Decision::Escalate { votes } => {
            println!("escalate: no role reached threshold {}", config.threshold);
            for (role, weight) in votes {
                println!("  {role:<24} {weight:.4}");
            }
        }
    }
    Ok(())
}

/// Propose drafts for human review
fn cmd_evolve(config: &ForgeConfig, audit: &dyn AuditSink) -> Result<()> {
    let registry = load_registry(config)?;
    let store = FsDraftStore::new(&config.drafts_dir).with_context(|| {
        format!("Failed to open draft store {}", config.drafts_dir.display())
    })?;
    let evolver = Evolver::new(Arc::new(store));
    let count =
        NonZeroUsize::new(config.mutations_per_cycle).context("draft count must be positive")?;

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let drafts = propose_and_record(&evolver, &registry, count, &mut rng, audit)?;
    info!(
        drafts = drafts.len(),
        dir = %config.drafts_dir.display(),
        "drafts written; promotion into the registry requires human review"
    );
    Ok(())
}

/// Propose drafts and report every one that reached the store, including
/// those written before a mid-batch failure.
fn propose_and_record(
    evolver: &Evolver,
    registry: &Registry,
    count: NonZeroUsize,
    rng: &mut StdRng,
    audit: &dyn AuditSink,
) -> Result<Vec<Draft>> {
    let err = match evolver.propose_mutations(registry, count, rng) {
        Ok(drafts) => {
            for d in &drafts {
                report_draft(registry, d, audit);
            }
            return Ok(drafts);
        }
        Err(err) => err,
    };

    for id in err.written() {
        match evolver.store().get(*id) {
            Ok(d) => report_draft(registry, &d, audit),
            Err(e) => {
                println!("{id}  (persisted, could not be re-read)");
                tracing::warn!(event = "draft.reload_failed", draft_id = %id, error = %error_chain(&e));
            }
        }
    }
    let written = join_ids(&err);
    Err(err).with_context(|| format!("Drafts persisted before the failure: [{written}]"))
}

fn join_ids(err: &EvolveError) -> String {
    err.written()
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn report_draft(registry: &Registry, d: &Draft, audit: &dyn AuditSink) {
    record(audit, AuditRecord::draft_proposed(d));
    let from = registry
        .get(&d.original)
        .map(|r| r.priority().get())
        .unwrap_or_default();
    println!(
        "{}  {:<24} priority {} -> {}  version {}",
        d.id,
        d.original,
        from,
        d.proposal.priority(),
        d.proposal.version
    );
}

fn open_store(config: &ForgeConfig) -> Result<FsDraftStore> {
    if !config.drafts_dir.is_dir() {
        bail!("draft store {} does not exist", config.drafts_dir.display());
    }
    FsDraftStore::new(&config.drafts_dir)
        .with_context(|| format!("Failed to open draft store {}", config.drafts_dir.display()))
}

/// List stored drafts
fn cmd_drafts_list(config: &ForgeConfig) -> Result<()> {
    let drafts = open_store(config)?.list()?;
    if drafts.is_empty() {
        println!("No drafts in {}", config.drafts_dir.display());
        return Ok(());
    }
    for d in drafts {
        println!(
            "{}  {}  {:<24} priority {}  version {}",
            d.id,
            d.meta.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            d.original,
            d.proposal.priority(),
            d.proposal.version
        );
    }
    Ok(())
}

/// Show one draft
fn cmd_drafts_show(config: &ForgeConfig, id: Uuid) -> Result<()> {
    let draft = open_store(config)?.get(id)?;
    print_json(&draft)
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{cut}...")
    }
}
