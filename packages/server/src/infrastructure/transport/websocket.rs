//! WebSocket を使った TransportHandle 実装
//!
//! ## 責務
//!
//! - 1 本の WebSocket 接続に対応する `UnboundedSender` を保持
//! - push メッセージを JSON にシリアライズして送信キューに積む
//!
//! ## 設計ノート
//!
//! WebSocket の生成は UI 層（`src/ui/handler/websocket.rs`）で行われます。
//! この実装は生成された `UnboundedSender` を受け取り、メッセージ送信に使用します。
//! 実際のソケットへの書き込みは UI 層の pusher loop が行います。

use serde::Serialize;
use tokio::sync::mpsc;

use crate::{
    domain::{ConnectionId, PushMessage, TransportError, TransportHandle},
    infrastructure::dto::websocket::{MessageType, PushEventMessage},
};

/// クライアントへの送信チャンネル
pub type PusherChannel = mpsc::UnboundedSender<String>;

/// WebSocket 接続 1 本分の送信ハンドル
pub struct WebSocketHandle {
    connection_id: ConnectionId,
    sender: PusherChannel,
}

impl WebSocketHandle {
    pub fn new(connection_id: ConnectionId, sender: PusherChannel) -> Self {
        Self {
            connection_id,
            sender,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.connection_id
    }

    /// 任意のイベントを JSON にして送信キューに積む
    pub fn send_event<T: Serialize>(&self, event: &T) -> Result<(), TransportError> {
        let json =
            serde_json::to_string(event).map_err(|e| TransportError::Encode(e.to_string()))?;
        self.sender
            .send(json)
            .map_err(|_| TransportError::ChannelClosed(self.connection_id.to_string()))
    }
}

impl TransportHandle for WebSocketHandle {
    fn connection_id(&self) -> ConnectionId {
        self.connection_id.clone()
    }

    fn send(&self, message: &PushMessage) -> Result<(), TransportError> {
        let event = PushEventMessage {
            r#type: MessageType::Message,
            message: message.as_value().clone(),
        };
        self.send_event(&event)?;
        tracing::debug!("Queued push message for connection '{}'", self.connection_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{Value, json};

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - WebSocketHandle::send が push イベントの JSON をキューに積むこと
    // - 受信側が閉じた後の送信が ChannelClosed になること
    // ========================================

    fn create_test_handle() -> (WebSocketHandle, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = WebSocketHandle::new(ConnectionId::new("c1".to_string()).unwrap(), tx);
        (handle, rx)
    }

    #[tokio::test]
    async fn test_send_wraps_message_event() {
        // テスト項目: push メッセージが {"type":"message","message":...} として送信される
        // given (前提条件):
        let (handle, mut rx) = create_test_handle();
        let message = PushMessage::new(json!({"title": "hello"})).unwrap();

        // when (操作):
        let result = handle.send(&message);

        // then (期待する結果):
        assert!(result.is_ok());
        let received: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert_eq!(
            received,
            json!({"type": "message", "message": {"title": "hello"}})
        );
    }

    #[tokio::test]
    async fn test_send_after_receiver_dropped_fails() {
        // テスト項目: 受信側が閉じた接続への送信は ChannelClosed エラーになる
        // given (前提条件):
        let (handle, rx) = create_test_handle();
        drop(rx);

        // when (操作):
        let result = handle.send(&PushMessage::new(json!("hello")).unwrap());

        // then (期待する結果):
        assert_eq!(result, Err(TransportError::ChannelClosed("c1".to_string())));
    }

    #[test]
    fn test_connection_id_is_stable() {
        // テスト項目: connection_id は生成時の値を返し続ける
        let (handle, _rx) = create_test_handle();

        assert_eq!(handle.connection_id().as_str(), "c1");
        assert_eq!(handle.connection_id(), handle.connection_id());
    }
}
