// src/config.rs

use std::env;
use std::str::FromStr;

use dotenvy::dotenv;

/// Maximum length of a single skill name.
pub const MAX_SKILL_LENGTH: u64 = 50;

/// Maximum length of a swap request or feedback message.
pub const MAX_MESSAGE_LENGTH: u64 = 500;

pub const DEFAULT_PAGE_SIZE: i64 = 10;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Default token lifetime: 7 days.
const DEFAULT_JWT_EXPIRATION: u64 = 7 * 24 * 60 * 60;

/// Which persistence backend the server runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(StorageBackend::Postgres),
            "memory" => Ok(StorageBackend::Memory),
            other => Err(format!("unknown STORAGE backend '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub storage: StorageBackend,
    pub database_url: Option<String>,
    pub jwt_secret: String,
    /// Token lifetime in seconds.
    pub jwt_expiration: u64,
    pub rust_log: String,
    pub bind_addr: String,
    pub cors_origins: Vec<String>,
    pub admin_email: Option<String>,
    pub admin_password: Option<String>,
    pub admin_name: Option<String>,
}

#[derive(Debug)]
pub struct ConfigError(pub String);

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "configuration error: {}", self.0)
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok();

        let storage = env::var("STORAGE")
            .unwrap_or_else(|_| "postgres".to_string())
            .parse::<StorageBackend>()
            .map_err(ConfigError)?;

        let database_url = env::var("DATABASE_URL").ok();
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError("DATABASE_URL must be set".to_string()));
        }

        let jwt_secret = env::var("JWT_SECRET")
            .map_err(|_| ConfigError("JWT_SECRET must be set".to_string()))?;

        let jwt_expiration = match env::var("JWT_EXPIRATION") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|_| ConfigError("JWT_EXPIRATION must be a number of seconds".to_string()))?,
            Err(_) => DEFAULT_JWT_EXPIRATION,
        };

        let rust_log = env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string());

        let cors_origins = env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:3000".to_string())
            .split(',')
            .map(|origin| origin.trim().to_string())
            .filter(|origin| !origin.is_empty())
            .collect();

        Ok(Self {
            storage,
            database_url,
            jwt_secret,
            jwt_expiration,
            rust_log,
            bind_addr,
            cors_origins,
            admin_email: env::var("ADMIN_EMAIL").ok(),
            admin_password: env::var("ADMIN_PASSWORD").ok(),
            admin_name: env::var("ADMIN_NAME").ok(),
        })
    }
}
