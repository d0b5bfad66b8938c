use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use common::{
    cache::{RedisConfig, RedisPool},
    database::{DatabaseConfig, init_pool},
};
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use dispatch::{
    clock::SystemClock,
    config::{DispatchConfig, StoreKind},
    retention::start_retention,
    routes,
    service::DispatchService,
    state::AppState,
    store::{DispatchStore, InMemoryStore, PgStore},
    throttle::ScanThrottle,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting dispatch service");

    let config = DispatchConfig::from_env()?;

    let store: Arc<dyn DispatchStore> = match config.store {
        StoreKind::Postgres => {
            let db_config = DatabaseConfig::from_env()?;
            let pool = init_pool(&db_config).await?;

            // Check database connectivity
            if common::database::health_check(&pool).await? {
                info!("Database connection successful");
            } else {
                anyhow::bail!("Failed to connect to database");
            }

            let store = PgStore::new(pool);
            store.migrate().await?;
            info!("Database migrations applied");
            Arc::new(store)
        }
        StoreKind::Memory => {
            warn!("Using the in-memory store; state is lost on restart and not shared");
            Arc::new(InMemoryStore::new())
        }
    };

    let throttle = match RedisConfig::from_env() {
        Some(redis_config) => {
            let pool = RedisPool::new(&redis_config).await?;
            ScanThrottle::redis(config.throttle_config(), pool)
        }
        None => ScanThrottle::local(config.throttle_config()),
    };

    let service = DispatchService::new(store, Arc::new(SystemClock), config.service_settings());

    // Keep the scheduler alive for the lifetime of the server
    let _retention = match config.retention_schedule.as_deref() {
        Some(schedule) if !schedule.trim().is_empty() => Some(
            start_retention(service.clone(), schedule.trim(), config.retention_hours).await?,
        ),
        _ => None,
    };

    if config.admin_token().is_none() {
        info!("DISPATCH_ADMIN_TOKEN not set, direct enqueue disabled");
    }

    let app_state = AppState::new(service, throttle)
        .with_public_base_url(config.base_url()?)
        .with_conceal_reuse(config.conceal_reuse)
        .with_trust_forwarded(config.trust_forwarded)
        .with_admin_token(config.admin_token());

    info!("Dispatch service initialized successfully");

    // Start the web server
    let app = routes::create_router(app_state);

    let listener = TcpListener::bind(&config.bind_address).await?;
    info!("Dispatch service listening on {}", config.bind_address);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
