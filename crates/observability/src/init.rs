// crates/observability/src/init.rs
//! Process-wide tracing/error-reporting setup, grounded on
//! `claude-view-server::main`'s startup sequence: an `EnvFilter` subscriber
//! defaulting to `warn` (overridable via `RUST_LOG`), plus an optional
//! Sentry guard wired through `sentry-tracing` so panics and `tracing::error!`
//! spans both reach the same destination.

use tracing_subscriber::EnvFilter;

/// Must be held for the process lifetime — dropping it flushes and
/// deactivates the Sentry client.
pub struct ObservabilityGuard {
    _sentry: Option<sentry::ClientInitGuard>,
}

pub struct ObservabilityConfig {
    pub sentry_dsn: Option<String>,
    pub service_name: &'static str,
    pub environment: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            sentry_dsn: std::env::var("SENTRY_DSN").ok(),
            service_name: "scoutline",
            environment: std::env::var("SCOUTLINE_ENV").unwrap_or_else(|_| "development".to_string()),
        }
    }
}

/// Installs the global tracing subscriber and (if `sentry_dsn` is set) a
/// Sentry client. Call once at process startup, before spawning any tasks.
pub fn init(config: ObservabilityConfig) -> ObservabilityGuard {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let sentry_layer = config.sentry_dsn.as_deref().map(|_| sentry_tracing::layer());

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .compact()
        .finish();

    use tracing_subscriber::layer::SubscriberExt;
    let subscriber = subscriber.with(sentry_layer);

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("global tracing subscriber already set");
    }

    let sentry_guard = config.sentry_dsn.map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(config.environment.clone().into()),
                ..Default::default()
            },
        ))
    });

    tracing::info!(service = config.service_name, environment = %config.environment, "observability initialized");

    ObservabilityGuard { _sentry: sentry_guard }
}
