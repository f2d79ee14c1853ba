use ticket_booking::adapter::driven::{
    ApprovalRatePolicy, InMemoryInventoryCache, InMemoryNotificationBus, MySqlBookingLedger,
    MySqlInventoryStore, RedisInventoryCache, TracingLogger,
};
use ticket_booking::adapter::driver::{create_router, AppState, SalesMetrics};
use ticket_booking::adapter::{BookingConfig, DatabaseConfig, DatabaseMigration};
use ticket_booking::application::service::{
    BookingLifecycleService, ConfirmationWorker, EventCatalogService, ReservationCoordinator,
    StaleReservationSweeper,
};
use ticket_booking::domain::port::{
    BookingLedger, ConfirmationPolicy, InventoryCache, InventoryStore, Logger, NotificationBus,
};

use sqlx::mysql::MySqlPoolOptions;
use std::sync::Arc;
use tokio::sync::watch;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // .envファイルから環境変数を読み込む
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let db_config = DatabaseConfig::from_env()?;
    let booking_config = BookingConfig::from_env()?;
    tracing::info!(
        host = %db_config.host,
        port = db_config.port,
        "Loaded database configuration"
    );

    // 接続プールを作成
    let pool = MySqlPoolOptions::new()
        .max_connections(db_config.max_connections)
        .connect(&db_config.connection_string())
        .await?;

    DatabaseMigration::new(pool.clone()).run().await?;

    let logger: Arc<dyn Logger> = Arc::new(TracingLogger::new());
    let store: Arc<dyn InventoryStore> = Arc::new(MySqlInventoryStore::new(
        pool.clone(),
        db_config.lock_wait_timeout(),
    ));
    let ledger: Arc<dyn BookingLedger> = Arc::new(MySqlBookingLedger::new(pool.clone()));
    let cache = build_cache(&booking_config).await;

    let (bus, notifications_rx) =
        InMemoryNotificationBus::new(booking_config.notification_queue_capacity);
    let notifications: Arc<dyn NotificationBus> = Arc::new(bus);
    let policy: Arc<dyn ConfirmationPolicy> =
        Arc::new(ApprovalRatePolicy::new(booking_config.payment_approval_rate));

    let coordinator = Arc::new(ReservationCoordinator::new(
        store.clone(),
        cache.clone(),
        logger.clone(),
    ));
    let bookings = Arc::new(BookingLifecycleService::new(
        store.clone(),
        ledger.clone(),
        cache.clone(),
        notifications,
        coordinator.clone(),
        logger.clone(),
        booking_config.booking_settings(),
    ));
    let catalog = Arc::new(EventCatalogService::new(
        store,
        ledger.clone(),
        cache,
        coordinator,
        logger.clone(),
    ));

    // 確定ワーカーを起動
    let (worker_shutdown, worker_shutdown_rx) = watch::channel(false);
    let worker = Arc::new(ConfirmationWorker::new(
        bookings.clone(),
        policy,
        logger.clone(),
    ));
    let worker_task = tokio::spawn(worker.run(notifications_rx, worker_shutdown_rx));

    // 期限切れ予約のスイーパーを起動
    let sweeper = Arc::new(StaleReservationSweeper::new(
        bookings.clone(),
        ledger,
        logger,
        booking_config.auto_cancel_window(),
        booking_config.sweeper_interval(),
    ));
    let sweeper_handle = sweeper.start();

    let metrics = Arc::new(SalesMetrics::new(catalog.clone()));

    let app = create_router()
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(AppState {
            bookings,
            catalog,
            metrics,
        });

    let listener = tokio::net::TcpListener::bind(booking_config.http_bind).await?;
    tracing::info!(addr = %booking_config.http_bind, "REST API server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down background tasks");
    sweeper_handle.stop().await;
    let _ = worker_shutdown.send(true);
    if let Err(e) = worker_task.await {
        tracing::error!(error = %e, "Confirmation worker terminated abnormally");
    }
    pool.close().await;

    Ok(())
}

/// キャッシュを構築する
/// Redisに接続できない場合もストアが正なので、プロセス内キャッシュで起動を続ける
async fn build_cache(config: &BookingConfig) -> Arc<dyn InventoryCache> {
    let Some(redis_url) = config.redis_url.as_deref() else {
        tracing::info!("REDIS_URL is not set, using in-process cache");
        return Arc::new(InMemoryInventoryCache::new());
    };

    match RedisInventoryCache::new(redis_url).await {
        Ok(cache) => {
            tracing::info!("Connected to Redis cache");
            Arc::new(cache)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Redis is unavailable, using in-process cache");
            Arc::new(InMemoryInventoryCache::new())
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
