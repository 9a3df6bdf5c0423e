//! dialagent server binary

use tracing_subscriber::EnvFilter;

use dialagent_config::{load_settings, ObservabilityConfig};
use dialagent_server::{build_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    let env = std::env::var("DIALAGENT_ENV").ok();
    let settings = load_settings(env.as_deref())?;

    init_tracing(&settings.observability);

    tracing::info!(
        streaming = settings.engine.streaming_enabled,
        max_sessions = settings.engine.max_sessions,
        "starting dialagent"
    );

    let state = AppState::new(settings.clone());
    state.registry.start_cleanup_task(std::time::Duration::from_secs(
        settings.engine.cleanup_interval_secs,
    ));

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, build_router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    state.registry.shutdown();
    tracing::info!("shutdown complete");
    Ok(())
}

fn init_tracing(observability: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "dialagent_server={l},dialagent_engine={l},dialagent_llm={l},dialagent_telephony={l},tower_http=info",
            l = observability.log_level
        ))
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if observability.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
}
