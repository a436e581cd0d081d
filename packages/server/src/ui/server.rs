//! Server execution logic.

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::usecase::PushService;

use super::{
    auth::require_auth_token,
    handler::{
        associate_socket, info, list_connections, ping, purge_pending, push_message,
        register_user, remove_slot, websocket_handler,
    },
    signal::shutdown_signal,
    state::AppState,
};

/// Settings of the HTTP surface
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// 制御 API の共有シークレット
    pub auth_token: String,
    /// 許可する CORS オリジン（`*` はすべて）
    pub cors_origin: String,
}

/// Push relay server
///
/// # Example
///
/// ```ignore
/// let server = Server::new(push_service, config);
/// server.run("127.0.0.1".to_string(), 3000).await?;
/// ```
pub struct Server {
    push_service: Arc<PushService>,
    config: ServerConfig,
}

impl Server {
    pub fn new(push_service: Arc<PushService>, config: ServerConfig) -> Self {
        Self {
            push_service,
            config,
        }
    }

    /// Build the router with every route and layer
    ///
    /// 制御ルートだけが `X-AUTH-TOKEN` を要求する。ステータスと `/ws` は公開。
    pub fn router(&self) -> Router {
        let app_state = Arc::new(AppState {
            push_service: self.push_service.clone(),
            auth_token: self.config.auth_token.clone(),
        });

        let control = Router::new()
            .route("/api/{user_id}/register", put(register_user))
            .route("/api/{user_id}/push", post(push_message))
            .route("/api/{user_id}/connections", get(list_connections))
            .route("/api/{user_id}/connections/{slot_id}", delete(remove_slot))
            .route("/api/admin/purge-pending", post(purge_pending))
            .route("/users/{user_id}/sockets", post(associate_socket))
            .route_layer(middleware::from_fn_with_state(
                app_state.clone(),
                require_auth_token,
            ));

        let public = Router::new()
            // WebSocket エンドポイント
            .route("/ws", get(websocket_handler))
            // HTTP エンドポイント
            .route("/api/status/ping", get(ping))
            .route("/api/status/info", get(info));

        control
            .merge(public)
            .with_state(app_state)
            .layer(build_cors_layer(&self.config.cors_origin))
            .layer(TraceLayer::new_for_http())
    }

    /// Run the push relay server
    ///
    /// # Errors
    ///
    /// Returns an error if the server fails to bind to the specified address or
    /// if there's an error during server execution.
    pub async fn run(self, host: String, port: u16) -> Result<(), Box<dyn std::error::Error>> {
        let app = self.router();

        // Bind the server to the host and port
        let bind_addr = format!("{}:{}", host, port);
        let listener = TcpListener::bind(&bind_addr).await?;

        tracing::info!("Push relay listening on {}", listener.local_addr()?);
        tracing::info!("Connect to: ws://{}/ws", bind_addr);
        tracing::info!("Press Ctrl+C to shutdown gracefully");

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        tracing::info!("Server shutdown complete");

        Ok(())
    }
}

/// CORS: `*` なら任意のオリジン、それ以外は指定のオリジンだけを許可する
fn build_cors_layer(origin: &str) -> CorsLayer {
    let mut layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers(Any);

    if origin == "*" {
        layer = layer.allow_origin(Any);
    } else {
        match origin.parse::<HeaderValue>() {
            Ok(value) => layer = layer.allow_origin(value),
            Err(e) => tracing::warn!("Ignoring invalid CORS origin '{}': {}", origin, e),
        }
    }

    layer
}

