// Logging setup for the worker process

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "migrate_workflow=info,migrate_worker=info";

/// Log filter from `RUST_LOG`, or `LOG_LEVEL` applied to this workspace's crates
fn log_filter() -> Option<String> {
    std::env::var("RUST_LOG").ok().or_else(|| {
        std::env::var("LOG_LEVEL")
            .ok()
            .map(|level| format!("migrate_workflow={level},migrate_worker={level}"))
    })
}

/// Install the console subscriber
pub fn init_tracing() {
    let filter = log_filter()
        .as_deref()
        .and_then(|f| EnvFilter::try_new(f).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_filter(filter),
        )
        .init();
}
