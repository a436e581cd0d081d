//! Value Objects
//!
//! 識別子はすべて不透明な文字列です。生成時に空文字列と過大な長さを拒否します。

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use super::error::ValueObjectError;

/// 識別子の最大長（バイト）
pub const MAX_ID_LENGTH: usize = 256;

fn validate_id(field: &'static str, value: &str) -> Result<(), ValueObjectError> {
    if value.trim().is_empty() {
        return Err(ValueObjectError::Empty(field));
    }
    if value.len() > MAX_ID_LENGTH {
        return Err(ValueObjectError::TooLong {
            field,
            max: MAX_ID_LENGTH,
            actual: value.len(),
        });
    }
    Ok(())
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Validate and wrap the raw identifier.
            pub fn new(value: String) -> Result<Self, ValueObjectError> {
                validate_id($field, &value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Log-safe form: the first four characters followed by `***`.
            pub fn masked(&self) -> String {
                let head: String = self.0.chars().take(4).collect();
                format!("{}***", head)
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValueObjectError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = ValueObjectError;

            fn try_from(value: &str) -> Result<Self, Self::Error> {
                Self::new(value.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// アプリケーション側のユーザー識別子
    UserId,
    "userId"
);

string_id!(
    /// 登録意図（pending slot）と将来のトランスポート接続を対応付けるトークン
    SlotId,
    "connectionId"
);

string_id!(
    /// トランスポート接続ごとに一意な識別子
    ConnectionId,
    "socketId"
);

impl ConnectionId {
    /// Allocate a fresh random connection id (UUID v4).
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl SlotId {
    /// A slot keyed by the connection it will be bound to, used when the
    /// control plane associates an already-open socket with a user.
    pub fn for_connection(connection_id: &ConnectionId) -> Self {
        Self(connection_id.as_str().to_string())
    }
}

/// Unix timestamp (UTC, milliseconds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    pub fn new(millis: i64) -> Self {
        Self(millis)
    }

    pub fn value(&self) -> i64 {
        self.0
    }
}

/// push されるメッセージ本体（任意の JSON 値）
///
/// `null` と空文字列は「メッセージなし」として拒否します。
#[derive(Debug, Clone, PartialEq)]
pub struct PushMessage(Value);

impl PushMessage {
    pub fn new(value: Value) -> Result<Self, ValueObjectError> {
        match &value {
            Value::Null => Err(ValueObjectError::EmptyMessage),
            Value::String(s) if s.is_empty() => Err(ValueObjectError::EmptyMessage),
            _ => Ok(Self(value)),
        }
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl TryFrom<Value> for PushMessage {
    type Error = ValueObjectError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
