//! Tracing setup shared by `roleforge` and `roleforged`.
//!
//! Log lines always go to stderr: `roleforge` prints tables and JSON on
//! stdout and those must stay parseable.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer, Registry};

/// Filter directives read before `RUST_LOG`.
pub const ENV_LOG: &str = "ROLEFORGE_LOG";

/// Filter from `ROLEFORGE_LOG`, then `RUST_LOG`, then `level`.
fn log_filter(level: Level) -> EnvFilter {
    EnvFilter::try_from_env(ENV_LOG)
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}

fn stderr_layer(json: bool) -> Box<dyn Layer<Registry> + Send + Sync> {
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    if json {
        layer.json().boxed()
    } else {
        layer.boxed()
    }
}

/// Install the process-wide subscriber. Later calls are no-ops.
pub fn init_tracing(json: bool, level: Level) {
    tracing_subscriber::registry()
        .with(stderr_layer(json))
        .with(log_filter(level))
        .try_init()
        .ok();
}
