//! Real-time push relay server.
//!
//! Run with:
//! ```not_rust
//! AUTH_TOKEN=secret cargo run --bin notificator-server
//! cargo run --bin notificator-server -- --auth-token secret --storage redis
//! ```

use std::sync::Arc;

use clap::Parser;
use notificator_server::{
    config::{Config, StorageBackend},
    domain::ConnectionStore,
    infrastructure::store::{InMemoryConnectionStore, RedisConnectionStore},
    ui::{Server, ServerConfig},
    usecase::{ConnectionRegistry, PushService},
};
use notificator_shared::{logger::setup_logger, time::SystemClock};

#[tokio::main]
async fn main() {
    let config = Config::parse();

    // Initialize tracing
    setup_logger(
        "notificator_server",
        env!("CARGO_BIN_NAME"),
        &config.log_level,
    );

    // Initialize dependencies in order:
    // 1. ConnectionStore
    // 2. ConnectionRegistry
    // 3. PushService
    // 4. Server

    // 1. Create ConnectionStore
    let store: Arc<dyn ConnectionStore> = match config.storage {
        StorageBackend::Memory => {
            tracing::info!("Using in-memory connection store");
            Arc::new(InMemoryConnectionStore::new())
        }
        StorageBackend::Redis => {
            match RedisConnectionStore::connect(
                &config.redis_url,
                &config.redis_key_prefix,
                config.redis_timeout(),
            )
            .await
            {
                Ok(store) => Arc::new(store),
                Err(e) => {
                    tracing::error!("Failed to connect to redis: {}", e);
                    std::process::exit(1);
                }
            }
        }
    };

    // 2. Create ConnectionRegistry
    let registry = Arc::new(ConnectionRegistry::new(store, Arc::new(SystemClock)));

    // 3. Create PushService
    let push_service = Arc::new(PushService::new(registry));

    // 4. Create and run the server
    let server = Server::new(
        push_service,
        ServerConfig {
            auth_token: config.auth_token.clone(),
            cors_origin: config.cors_origin.clone(),
        },
    );
    if let Err(e) = server.run(config.host, config.port).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
