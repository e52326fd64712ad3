use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use mesa_api::{app, AppState};
use mesa_core::clock::{Clock, SystemClock};
use mesa_core::store::Store;
use mesa_pay::{HttpMercadoPagoGateway, PaymentGateway, UnconfiguredGateway};
use mesa_store::PgStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const RETRY_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mesa_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = mesa_store::app_config::Config::load()?;
    tracing::info!("starting mesa API on port {}", config.server.port);

    let store = PgStore::connect(&config.database.url).await?;
    store.migrate().await?;
    let store: Arc<dyn Store> = Arc::new(store);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let gateway: Arc<dyn PaymentGateway> = match config.mercadopago.access_token.clone() {
        Some(token) => Arc::new(HttpMercadoPagoGateway::new(
            token,
            config.mercadopago.base_url.clone(),
        )),
        None => Arc::new(UnconfiguredGateway),
    };

    let state = AppState::build(
        store,
        gateway,
        clock,
        config.mercadopago.webhook_secret.clone(),
    );

    // Background redelivery of notifications that never reached a listener.
    let bus = state.bus.clone();
    let retry_limit = config.notifications.retry_limit;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(RETRY_INTERVAL);
        loop {
            ticker.tick().await;
            match bus.retry_pending(retry_limit).await {
                Ok(0) => {}
                Ok(attempted) => tracing::info!(attempted, "retried undelivered notifications"),
                Err(err) => tracing::warn!("notification retry pass failed: {err}"),
            }
        }
    });

    let app = app(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
