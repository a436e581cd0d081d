//! トランスポート層の送信ハンドル実装
//!
//! - `websocket`: WebSocket（axum）を使った実装

pub mod websocket;

pub use websocket::{PusherChannel, WebSocketHandle};
