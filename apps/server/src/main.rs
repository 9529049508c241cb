use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use server::{
    AppState,
    config::{Config, LedgerBackend},
    create_router,
};
use stock::{Aggregator, LikeLedger, MemoryLedger, PriceClient, RedisLedger};
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;
    info!(?config, "starting stock price checker");

    let (ledger, redis): (Arc<dyn LikeLedger>, Option<RedisLedger>) = match config.ledger {
        LedgerBackend::Redis => {
            let redis = RedisLedger::from_env().await?;
            info!("connected to redis ledger");
            let ledger: Arc<dyn LikeLedger> = Arc::new(redis.clone());
            (ledger, Some(redis))
        }
        LedgerBackend::Memory => {
            info!("using in-memory ledger, likes are lost on restart");
            let ledger: Arc<dyn LikeLedger> = Arc::new(MemoryLedger::new());
            (ledger, None)
        }
    };

    let price_client = Arc::new(PriceClient::from_env()?);

    let app = create_router(AppState {
        aggregator: Aggregator::new(price_client, ledger),
        trust_proxy: config.trust_proxy,
        version: config.version.clone(),
    });

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some(redis) = redis
        && let Err(e) = redis.quit().await
    {
        error!(error = ?e, "redis quit failed");
    }

    info!("Shutdown complete.");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::{
            select,
            signal::unix::{SignalKind, signal},
        };
        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to install SIGINT handler");
        select! {
            _ = sigterm.recv() => {},
            _ = sigint.recv()  => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
