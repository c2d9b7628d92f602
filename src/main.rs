// src/main.rs

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use skillswap::config::{Config, StorageBackend};
use skillswap::models::user::{NewUser, Role, normalize_email};
use skillswap::routes;
use skillswap::state::AppState;
use skillswap::store::{MemoryStore, PgStore, Store};
use skillswap::utils::hash::hash_password;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DB_CONNECT_RETRIES: u32 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration from environment (.env included)
    let config = Config::from_env()?;

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let store: Arc<dyn Store> = match config.storage {
        StorageBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL must be set")?;
            let pool = connect_with_retry(database_url).await?;

            // Run Migrations Automatically
            tracing::info!("Running migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Migrations applied successfully.");

            Arc::new(PgStore::new(pool))
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on shutdown.");
            Arc::new(MemoryStore::new())
        }
    };

    // Seed Admin User
    if let Err(e) = seed_admin_user(store.as_ref(), &config).await {
        tracing::error!("Failed to seed admin user: {:?}", e);
    }

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = AppState::new(store, config);

    // Create the Axum application router
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on {}", addr);

    // Peer addresses feed the audit log when no proxy header is present.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

async fn connect_with_retry(database_url: &str) -> Result<PgPool, sqlx::Error> {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await
        {
            Ok(pool) => {
                tracing::info!("Database connected...");
                return Ok(pool);
            }
            Err(e) => {
                retry_count += 1;
                if retry_count > DB_CONNECT_RETRIES {
                    tracing::error!(
                        "Failed to connect to database after {} retries",
                        DB_CONNECT_RETRIES
                    );
                    return Err(e);
                }
                tracing::warn!(
                    "Database not ready, retrying in 2s... (Attempt {})",
                    retry_count
                );
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}

async fn seed_admin_user(
    store: &dyn Store,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let (Some(email), Some(password)) = (&config.admin_email, &config.admin_password) else {
        return Ok(());
    };

    let email = normalize_email(email);
    if store.find_user_by_email(&email).await?.is_some() {
        return Ok(());
    }

    tracing::info!("Seeding admin user: {}", email);
    let admin = store
        .create_user(NewUser {
            name: config
                .admin_name
                .clone()
                .unwrap_or_else(|| "Admin".to_string()),
            email,
            password_hash: hash_password(password)?,
            location: None,
            skills_offered: vec![],
            skills_wanted: vec![],
            availability: vec![],
            is_public: false,
            role: Role::Admin,
        })
        .await?;
    tracing::info!("Admin user {} created successfully.", admin.id);

    Ok(())
}
