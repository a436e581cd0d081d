//! Command-line and environment configuration.

use std::time::Duration;

use clap::{Parser, ValueEnum};

/// Which `ConnectionStore` backend to run with
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StorageBackend {
    /// プロセス内の HashMap（再起動で消える）
    Memory,
    /// Redis 上の JSON ドキュメント
    Redis,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "notificator-server")]
#[command(about = "Real-time push relay with a two-phase register/bind handshake", long_about = None)]
pub struct Config {
    /// Host address to bind the server to
    #[arg(short = 'H', long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port number to bind the server to
    #[arg(short = 'p', long, env = "PORT", default_value = "3000")]
    pub port: u16,

    /// Connection store backend
    #[arg(long, env = "NOTIFICATOR_STORAGE", value_enum, default_value = "memory")]
    pub storage: StorageBackend,

    /// Shared secret expected in the X-AUTH-TOKEN header of control requests
    #[arg(long, env = "AUTH_TOKEN", hide_env_values = true)]
    pub auth_token: String,

    /// Allowed CORS origin (`*` for any)
    #[arg(long, env = "CORS_ORIGIN", default_value = "*")]
    pub cors_origin: String,

    /// Redis connection URL
    #[arg(long, env = "REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Prefix of every Redis key written by the relay
    #[arg(long, env = "REDIS_KEY_PREFIX", default_value = "notificator")]
    pub redis_key_prefix: String,

    /// Timeout of a single Redis round trip in milliseconds
    #[arg(long, env = "REDIS_TIMEOUT_MS", default_value = "2000")]
    pub redis_timeout_ms: u64,

    /// Default log level (RUST_LOG takes precedence)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

impl Config {
    pub fn redis_timeout(&self) -> Duration {
        Duration::from_millis(self.redis_timeout_ms)
    }
}
