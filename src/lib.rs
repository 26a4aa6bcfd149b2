pub mod config;
pub mod models;
pub mod db;
pub mod pipeline;
pub mod lifecycle;
pub mod review; // Review queue for low-confidence and failed extractions
pub mod comparison;
pub mod events;
pub mod engine;

pub use engine::{EngineError, QuoteEngine, QuoteEngineBuilder, SubmissionAck, SubmissionRequest};

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber. Honors `RUST_LOG`, otherwise
/// falls back to [`config::default_log_filter`]. Safe to call more than once.
pub fn init_tracing() {
    let result = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();

    if result.is_ok() {
        tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);
    }
}
