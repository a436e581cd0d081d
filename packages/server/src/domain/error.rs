//! Domain error types.

use std::time::Duration;

use thiserror::Error;

/// Value Object の生成時エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueObjectError {
    /// 空文字列（または空白のみ）
    #[error("{0} must not be empty")]
    Empty(&'static str),

    /// 最大長の超過
    #[error("{field} must be at most {max} bytes (got {actual})")]
    TooLong {
        field: &'static str,
        max: usize,
        actual: usize,
    },

    /// push するメッセージが null または空文字列
    #[error("message must not be null or empty")]
    EmptyMessage,
}

/// ConnectionStore の往復（round trip）失敗
///
/// ストア内部ではリトライしません。呼び出し元が再試行するかを決めます。
#[derive(Debug, Error)]
pub enum StorageError {
    /// バックエンドがエラーを返した（接続断、スクリプト失敗など）
    #[error("storage backend error: {0}")]
    Backend(String),

    /// タイムアウト
    #[error("storage call timed out after {0:?}")]
    Timeout(Duration),

    /// 保存されているレコードを解釈できない
    #[error("corrupt connection record for user '{user}': {reason}")]
    CorruptRecord { user: String, reason: String },
}

impl StorageError {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Backend(_) | StorageError::Timeout(_))
    }
}

/// TransportHandle への送信エラー
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// 接続の送信チャンネルが既に閉じている
    #[error("connection '{0}' is closed")]
    ChannelClosed(String),

    /// メッセージのシリアライズに失敗
    #[error("failed to encode message: {0}")]
    Encode(String),
}
