use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tower_http::cors::{Any, CorsLayer};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use signup_wizard::config::WizardConfig;
use signup_wizard::store::{Database, LibSqlBackend};
use signup_wizard::wizard::{
    CachedLookup, RegionLookup, SimulatedSubmission, StaticRegionLookup, SuccessRedirect,
    WizardStore, wizard_routes,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Config warnings are printed before the global subscriber exists
    let config = tracing::subscriber::with_default(
        fmt().with_target(false).finish(),
        WizardConfig::from_env,
    );

    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard = init_tracing(config.log_dir.as_deref())?;

    eprintln!("📝 Signup Wizard v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/wizard/state", config.port);
    eprintln!("   WS:  ws://0.0.0.0:{}/ws/wizard", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );
    eprintln!("   Database: {}", config.db_path.display());

    // ── Wizard ───────────────────────────────────────────────────────────
    let endpoint = Arc::new(SimulatedSubmission::new(config.submit_delay));
    let store = WizardStore::restore(Arc::clone(&db), endpoint).await;

    let lookup: Arc<dyn RegionLookup> = Arc::new(CachedLookup::new(
        StaticRegionLookup::new(config.country_latency, config.state_latency),
        config.lookup_ttl,
    ));
    let redirect = Arc::new(SuccessRedirect::new(config.success_redirect));

    // A restart on the success screen still returns home after the countdown
    if store.snapshot().await.is_completed {
        redirect.arm(Arc::clone(&store)).await;
    }

    // ── HTTP server ──────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(vec![
            axum::http::Method::GET,
            axum::http::Method::POST,
            axum::http::Method::OPTIONS,
        ])
        .allow_headers(vec![axum::http::header::CONTENT_TYPE]);
    let app = wizard_routes(store, lookup, redirect).layer(cors);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.port))?;
    tracing::info!(port = config.port, "Wizard server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Wizard server stopped");
    Ok(())
}

/// Console logging, plus a daily-rotated file when `log_dir` is set.
fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let (subscriber, guard) = build_subscriber(filter, log_dir)?;
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;
    Ok(guard)
}

fn build_subscriber(
    filter: EnvFilter,
    log_dir: Option<&Path>,
) -> anyhow::Result<(impl tracing::Subscriber + Send + Sync + 'static, Option<WorkerGuard>)> {
    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "signup-wizard.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer);
    Ok((subscriber, guard))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_dir_adds_a_file_next_to_the_console() {
        let dir = tempfile::tempdir().unwrap();
        let (subscriber, guard) =
            build_subscriber(EnvFilter::new("info"), Some(dir.path())).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("wizard log line");
        });
        // Dropping the guard flushes the background writer.
        drop(guard);

        let written: String = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| std::fs::read_to_string(entry.unwrap().path()).unwrap())
            .collect();
        assert!(written.contains("wizard log line"));
    }

    #[test]
    fn no_log_dir_means_no_writer_guard() {
        let (_subscriber, guard) = build_subscriber(EnvFilter::new("info"), None).unwrap();
        assert!(guard.is_none());
    }
}
