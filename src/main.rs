use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wechat_checkout::{
    client::{PaymentGateway, WeChatPayClient},
    config::Config,
    handlers::{AppState, CheckoutSettings, HealthState},
    routes::create_router,
    services::{InMemoryTransactionStore, RedisTransactionStore, TransactionStore},
};

/// WeChat Pay QR orders are payable for two hours.
const ORDER_LIFETIME: Duration = Duration::from_secs(2 * 60 * 60);

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;

    tracing::info!("Starting wechat-checkout v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {:?}", config.environment);

    // Initialize services
    let store: Arc<dyn TransactionStore> = match &config.redis_url {
        Some(url) => Arc::new(RedisTransactionStore::connect(url, "checkout").await?),
        None => {
            tracing::warn!("REDIS_URL not set, transactions are kept in memory only");
            Arc::new(InMemoryTransactionStore::new())
        }
    };

    let gateway: Arc<dyn PaymentGateway> = Arc::new(
        WeChatPayClient::new(
            config.wechatpay.clone(),
            config.gateway_url.clone(),
            config.gateway_timeout,
        )?
        .with_server_ip(config.server_ip.clone()),
    );

    // Build application state
    let app_state = AppState::new(
        gateway,
        store.clone(),
        CheckoutSettings {
            notify_url: config.notify_url(),
            process_page_url: config.process_page_url.clone(),
            order_lifetime: ORDER_LIFETIME,
        },
    );

    let health_state = HealthState {
        store,
        started_at: Instant::now(),
    };

    let app = create_router(app_state, health_state);

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Server listening on http://{}", addr);
    tracing::info!("Notify callback: {}", config.notify_url());

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for ctrl+c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down gracefully...");
}
