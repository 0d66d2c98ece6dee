use std::sync::Arc;
use std::time::Duration;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use carenote_api::{
    config::Config,
    db::{self, postgres::PgStore},
    routes,
    services::{
        images::ImageStorage,
        notifications::{FcmTransport, NotificationService},
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    if config.fcm_api_key.is_none() {
        info!("FCM not configured, push notifications disabled");
    }
    let transport = Arc::new(FcmTransport::new(pool.clone(), config.fcm_api_key.clone()));
    let notifications = Arc::new(NotificationService::new(
        transport,
        Duration::from_secs(config.push_timeout_secs),
        config.push_max_attempts,
    ));

    let images = Arc::new(ImageStorage::new(
        &config.media_dir,
        config.media_base_url.clone(),
    ));

    let state = AppState {
        db: pool.clone(),
        store: Arc::new(PgStore::new(pool)),
        config: config.clone(),
        notifications,
        images,
    };

    let app = routes::router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("carenote API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
