use std::{net::SocketAddr, sync::Arc};

use lobster_trap::{
    api,
    config::AppConfig,
    db::{sqlite::SqliteTrapStore, TrapStore},
    lifecycle::{self, Shutdown},
    retention::Sweeper,
    views::Views,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "lobster_trap=info,tower_http=info".into()),
        )
        .init();

    let config = AppConfig::from_env().map_err(|err| anyhow::anyhow!("{err}"))?;
    let store: Arc<dyn TrapStore> = Arc::new(SqliteTrapStore::connect(&config.database_url).await?);
    tracing::info!(database_url = %config.database_url, "store opened");

    let shutdown = Shutdown::new();
    let sweeper = Sweeper::new(store.clone(), config.retention, config.sweep_interval);
    let sweeper_task = tokio::spawn(sweeper.run(shutdown.subscribe()));

    let app = api::router(api::AppState {
        store,
        views: Arc::new(Views::new()?),
        trust_proxy: config.trust_proxy,
        max_body_size_bytes: config.max_body_size_bytes,
        static_dir: config.static_dir.clone(),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "🦞 lobster trap listening");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(lifecycle::shutdown_signal())
    .await?;

    shutdown.trigger();
    sweeper_task.await?;
    tracing::info!("shutdown complete");

    Ok(())
}
