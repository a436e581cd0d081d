//! TransportHandle trait 定義
//!
//! ライブなトランスポート接続に対する送信ケイパビリティです。所有権はトランスポート層
//! にあり、レジストリは `Arc` で参照するだけです。切断イベントの時点で
//! レジストリ側の参照はすべて破棄されます。

use super::{
    error::TransportError,
    value_object::{ConnectionId, PushMessage},
};

/// ライブな接続への送信インターフェース
///
/// 送信は非ブロッキングであること（キューに積むだけ）。1 つのハンドルの失敗が
/// 他のハンドルへの配信を妨げてはいけません。
#[cfg_attr(test, mockall::automock)]
pub trait TransportHandle: Send + Sync {
    /// この接続に固有の id
    fn connection_id(&self) -> ConnectionId;

    /// メッセージを送信キューに積む
    fn send(&self, message: &PushMessage) -> Result<(), TransportError>;
}
