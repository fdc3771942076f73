use anyhow::Result;

// ============================================================================
// Configuration Constants
// ============================================================================

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_ACCESS_TOKEN_TTL_HOURS: i64 = 24;
const DEFAULT_JWT_ISSUER: &str = "parley-server";

// Per-conversation broadcast buffer. A subscriber that falls further behind
// than this loses the overflowed events and is told how many it skipped.
const DEFAULT_BROADCAST_CAPACITY: usize = 256;

/// Maximum accepted message content length (characters, after trimming)
pub const MAX_MESSAGE_CONTENT_CHARS: usize = 32 * 1024;

// ============================================================================
// Configuration Structures
// ============================================================================

/// Database connection pool configuration
#[derive(Clone, Debug)]
pub struct DbConfig {
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Timeout for acquiring a connection from the pool (seconds)
    pub acquire_timeout_secs: u64,
    /// Timeout for idle connections before they are closed (seconds)
    pub idle_timeout_secs: u64,
}

/// Realtime hub configuration
#[derive(Clone, Debug)]
pub struct HubConfig {
    /// Buffered events per conversation broadcast group
    pub broadcast_capacity: usize,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_issuer: String,
    pub access_token_ttl_hours: i64,
    pub host: String,
    pub port: u16,
    pub rust_log: String,
    pub db: DbConfig,
    pub hub: HubConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")?,
            jwt_secret: {
                let secret = std::env::var("JWT_SECRET")?;
                if secret.trim().len() < 32 {
                    anyhow::bail!("JWT_SECRET must be at least 32 characters");
                }
                secret
            },
            jwt_issuer: std::env::var("JWT_ISSUER")
                .unwrap_or_else(|_| DEFAULT_JWT_ISSUER.to_string()),
            access_token_ttl_hours: std::env::var("ACCESS_TOKEN_TTL_HOURS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_HOURS),
            host: std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            db: DbConfig {
                max_connections: std::env::var("DB_MAX_CONNECTIONS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(5),
                acquire_timeout_secs: std::env::var("DB_ACQUIRE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(30),
                idle_timeout_secs: std::env::var("DB_IDLE_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(600),
            },
            hub: HubConfig {
                broadcast_capacity: std::env::var("HUB_BROADCAST_CAPACITY")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_BROADCAST_CAPACITY),
            },
        })
    }

    /// Minimal configuration for test suites (no environment required)
    pub fn for_tests() -> Self {
        Self {
            database_url: String::new(),
            jwt_secret: "a1b2c3d4e5f6g7h8i9j0k1l2m3n4o5p6q7r8s9t0".to_string(),
            jwt_issuer: "parley-test".to_string(),
            access_token_ttl_hours: 1,
            host: "127.0.0.1".to_string(),
            port: 0,
            rust_log: "info".to_string(),
            db: DbConfig {
                max_connections: 5,
                acquire_timeout_secs: 5,
                idle_timeout_secs: 60,
            },
            hub: HubConfig {
                broadcast_capacity: 16,
            },
        }
    }
}
