//! Redis ConnectionStore 実装
//!
//! ユーザーごとに 1 つの JSON ドキュメントを `{prefix}:users:{userId}` に保存します。
//!
//! ```json
//! {
//!   "_id": "alice",
//!   "connections": [
//!     { "id": "slot-1", "body": null, "registeredDate": "2024-05-01T10:00:00.000Z" },
//!     { "id": "slot-2", "body": "3f0c…", "registeredDate": "…", "savedDate": "…" }
//!   ]
//! }
//! ```
//!
//! `body` は Pending の間 `null`、Bound になると結び付いた接続 id です。
//! 変更系の操作はすべて Lua スクリプト 1 回（`EVALSHA`/`EVAL`）で行い、サーバー側で
//! アトミックに実行されます。複数のサーバーインスタンスが同じ Redis を共有しても
//! Pending → Bound の遷移は 1 回だけです。
//!
//! 各呼び出しはタイムアウト付きで、失敗は `StorageError` として返します（リトライなし）。

use std::{future::Future, time::Duration};

use async_trait::async_trait;
use redis::{RedisResult, Script, aio::ConnectionManager};
use serde::Deserialize;

use notificator_shared::time::{rfc3339_to_timestamp, timestamp_to_rfc3339};

use crate::domain::{
    ConnectionId, ConnectionSlot, ConnectionStore, SlotCreation, SlotId, SlotState, StorageError,
    Timestamp, UserId,
};

/// Lua script: append a pending slot unless one with the same id exists.
///
/// KEYS[1] = user document key
/// ARGV[1] = user id
/// ARGV[2] = slot id
/// ARGV[3] = registeredDate (RFC 3339)
///
/// Returns:
///   1 = created
///   0 = already pending (unchanged)
///  -1 = already bound (unchanged)
const CREATE_PENDING_SCRIPT: &str = r#"
    local raw = redis.call('GET', KEYS[1])
    local doc
    if raw then
        doc = cjson.decode(raw)
    else
        doc = { _id = ARGV[1], connections = {} }
    end

    for _, entry in ipairs(doc.connections) do
        if entry.id == ARGV[2] then
            if entry.body == nil or entry.body == cjson.null then
                return 0
            end
            return -1
        end
    end

    table.insert(doc.connections, {
        id = ARGV[2],
        body = cjson.null,
        registeredDate = ARGV[3]
    })
    redis.call('SET', KEYS[1], cjson.encode(doc))
    return 1
"#;

/// Lua script: conditional Pending -> Bound transition.
///
/// KEYS[1] = user document key
/// ARGV[1] = slot id
/// ARGV[2] = connection id
/// ARGV[3] = savedDate (RFC 3339)
///
/// Returns 1 when bound, 0 when the slot is missing or already bound.
const TRY_BIND_SCRIPT: &str = r#"
    local raw = redis.call('GET', KEYS[1])
    if not raw then
        return 0
    end

    local doc = cjson.decode(raw)
    for _, entry in ipairs(doc.connections) do
        if entry.id == ARGV[1] then
            if entry.body ~= nil and entry.body ~= cjson.null then
                return 0
            end
            entry.body = ARGV[2]
            entry.savedDate = ARGV[3]
            redis.call('SET', KEYS[1], cjson.encode(doc))
            return 1
        end
    end
    return 0
"#;

/// Lua script: remove a slot regardless of state; deletes the document once empty.
///
/// KEYS[1] = user document key
/// ARGV[1] = slot id
///
/// Returns the number of removed entries.
const REMOVE_SCRIPT: &str = r#"
    local raw = redis.call('GET', KEYS[1])
    if not raw then
        return 0
    end

    local doc = cjson.decode(raw)
    local kept = {}
    local removed = 0
    for _, entry in ipairs(doc.connections) do
        if entry.id == ARGV[1] then
            removed = removed + 1
        else
            table.insert(kept, entry)
        end
    end

    if removed == 0 then
        return 0
    end
    if #kept == 0 then
        redis.call('DEL', KEYS[1])
    else
        doc.connections = kept
        redis.call('SET', KEYS[1], cjson.encode(doc))
    end
    return removed
"#;

/// Lua script: drop pending slots registered before a cutoff.
///
/// KEYS[1] = user document key
/// ARGV[1] = cutoff (RFC 3339, same format as registeredDate)
///
/// Returns the number of removed entries.
const PURGE_PENDING_SCRIPT: &str = r#"
    local raw = redis.call('GET', KEYS[1])
    if not raw then
        return 0
    end

    local doc = cjson.decode(raw)
    local kept = {}
    local removed = 0
    for _, entry in ipairs(doc.connections) do
        local pending = entry.body == nil or entry.body == cjson.null
        if pending and type(entry.registeredDate) == 'string' and entry.registeredDate < ARGV[1] then
            removed = removed + 1
        else
            table.insert(kept, entry)
        end
    end

    if removed == 0 then
        return 0
    end
    if #kept == 0 then
        redis.call('DEL', KEYS[1])
    else
        doc.connections = kept
        redis.call('SET', KEYS[1], cjson.encode(doc))
    end
    return removed
"#;

/// SCAN の 1 回あたりの件数ヒント
const SCAN_BATCH: usize = 100;

/// Redis に保存されたユーザードキュメント
#[derive(Debug, Deserialize)]
struct UserDocument {
    #[serde(default)]
    connections: Vec<SlotEntry>,
}

/// ドキュメント内の slot エントリ
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SlotEntry {
    id: String,
    #[serde(default)]
    body: Option<String>,
    #[serde(default)]
    registered_date: Option<String>,
    #[serde(default)]
    saved_date: Option<String>,
}

/// Redis を使った永続 ConnectionStore 実装
pub struct RedisConnectionStore {
    connection: ConnectionManager,
    key_prefix: String,
    timeout: Duration,
    create_script: Script,
    bind_script: Script,
    remove_script: Script,
    purge_script: Script,
}

impl RedisConnectionStore {
    /// Connect to Redis and prepare the slot scripts.
    pub async fn connect(
        redis_url: &str,
        key_prefix: &str,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| StorageError::Backend(format!("invalid redis url: {e}")))?;
        let connection = run_with_timeout(timeout, client.get_connection_manager()).await?;

        tracing::info!(
            "Using redis storage (prefix '{}', timeout {:?})",
            key_prefix,
            timeout
        );

        Ok(Self::with_connection(connection, key_prefix, timeout))
    }

    /// Wrap an existing connection manager.
    pub fn with_connection(
        connection: ConnectionManager,
        key_prefix: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            connection,
            key_prefix: key_prefix.to_string(),
            timeout,
            create_script: Script::new(CREATE_PENDING_SCRIPT),
            bind_script: Script::new(TRY_BIND_SCRIPT),
            remove_script: Script::new(REMOVE_SCRIPT),
            purge_script: Script::new(PURGE_PENDING_SCRIPT),
        }
    }

    fn user_key(&self, user: &UserId) -> String {
        user_key(&self.key_prefix, user)
    }
}

/// ユーザードキュメントのキー
pub fn user_key(prefix: &str, user: &UserId) -> String {
    format!("{}:users:{}", prefix, user.as_str())
}

async fn run_with_timeout<F, T>(timeout: Duration, future: F) -> Result<T, StorageError>
where
    F: Future<Output = RedisResult<T>>,
{
    match tokio::time::timeout(timeout, future).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(StorageError::Backend(e.to_string())),
        Err(_) => Err(StorageError::Timeout(timeout)),
    }
}

fn format_date(user: &UserId, timestamp: Timestamp) -> Result<String, StorageError> {
    timestamp_to_rfc3339(timestamp.value()).ok_or_else(|| StorageError::CorruptRecord {
        user: user.to_string(),
        reason: format!("timestamp {} is out of range", timestamp.value()),
    })
}

/// Decode a stored user document into slots (insertion order).
fn parse_document(user: &UserId, raw: &str) -> Result<Vec<ConnectionSlot>, StorageError> {
    let corrupt = |reason: String| StorageError::CorruptRecord {
        user: user.to_string(),
        reason,
    };

    let document: UserDocument =
        serde_json::from_str(raw).map_err(|e| corrupt(e.to_string()))?;

    document
        .connections
        .into_iter()
        .map(|entry| {
            let slot_id = SlotId::new(entry.id).map_err(|e| corrupt(e.to_string()))?;
            let created_at = Timestamp::new(
                entry
                    .registered_date
                    .as_deref()
                    .and_then(rfc3339_to_timestamp)
                    .unwrap_or_default(),
            );
            let state = match entry.body {
                None => SlotState::Pending,
                Some(body) => SlotState::Bound {
                    connection_id: ConnectionId::new(body).map_err(|e| corrupt(e.to_string()))?,
                    bound_at: entry
                        .saved_date
                        .as_deref()
                        .and_then(rfc3339_to_timestamp)
                        .map(Timestamp::new)
                        .unwrap_or(created_at),
                },
            };
            Ok(ConnectionSlot {
                slot_id,
                state,
                created_at,
            })
        })
        .collect()
}

#[async_trait]
impl ConnectionStore for RedisConnectionStore {
    async fn create_pending_slot(
        &self,
        user: &UserId,
        slot_id: &SlotId,
        created_at: Timestamp,
    ) -> Result<SlotCreation, StorageError> {
        let mut conn = self.connection.clone();
        let registered_date = format_date(user, created_at)?;

        let result: i64 = run_with_timeout(
            self.timeout,
            self.create_script
                .key(self.user_key(user))
                .arg(user.as_str())
                .arg(slot_id.as_str())
                .arg(registered_date)
                .invoke_async(&mut conn),
        )
        .await?;

        match result {
            1 => {
                tracing::debug!("[Redis] Slot '{}' added to user '{}'", slot_id, user);
                Ok(SlotCreation::Created)
            }
            0 => Ok(SlotCreation::AlreadyPending),
            -1 => Ok(SlotCreation::AlreadyBound),
            other => Err(StorageError::Backend(format!(
                "unexpected create script result: {other}"
            ))),
        }
    }

    async fn try_bind(
        &self,
        user: &UserId,
        slot_id: &SlotId,
        connection_id: &ConnectionId,
        bound_at: Timestamp,
    ) -> Result<bool, StorageError> {
        let mut conn = self.connection.clone();
        let saved_date = format_date(user, bound_at)?;

        let result: i64 = run_with_timeout(
            self.timeout,
            self.bind_script
                .key(self.user_key(user))
                .arg(slot_id.as_str())
                .arg(connection_id.as_str())
                .arg(saved_date)
                .invoke_async(&mut conn),
        )
        .await?;

        if result == 1 {
            tracing::debug!(
                "[Redis] Connection '{}' saved to slot '{}' of user '{}'",
                connection_id,
                slot_id,
                user
            );
        }
        Ok(result == 1)
    }

    async fn remove_slot(&self, user: &UserId, slot_id: &SlotId) -> Result<(), StorageError> {
        let mut conn = self.connection.clone();

        let removed: i64 = run_with_timeout(
            self.timeout,
            self.remove_script
                .key(self.user_key(user))
                .arg(slot_id.as_str())
                .invoke_async(&mut conn),
        )
        .await?;

        if removed > 0 {
            tracing::debug!("[Redis] Slot '{}' removed from user '{}'", slot_id, user);
        }
        Ok(())
    }

    async fn list_bound_handles(&self, user: &UserId) -> Result<Vec<ConnectionId>, StorageError> {
        let slots = self.list_slots(user).await?;
        Ok(slots
            .into_iter()
            .filter_map(|slot| match slot.state {
                SlotState::Bound { connection_id, .. } => Some(connection_id),
                SlotState::Pending => None,
            })
            .collect())
    }

    async fn list_slots(&self, user: &UserId) -> Result<Vec<ConnectionSlot>, StorageError> {
        let mut conn = self.connection.clone();

        let raw: Option<String> = run_with_timeout(
            self.timeout,
            redis::cmd("GET")
                .arg(self.user_key(user))
                .query_async(&mut conn),
        )
        .await?;

        match raw {
            Some(raw) => parse_document(user, &raw),
            None => Ok(Vec::new()),
        }
    }

    async fn purge_pending_before(&self, cutoff: Timestamp) -> Result<usize, StorageError> {
        let mut conn = self.connection.clone();
        let cutoff = timestamp_to_rfc3339(cutoff.value()).ok_or_else(|| {
            StorageError::Backend(format!("cutoff {} is out of range", cutoff.value()))
        })?;
        let pattern = format!("{}:users:*", self.key_prefix);

        let mut cursor: u64 = 0;
        let mut removed: usize = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = run_with_timeout(
                self.timeout,
                redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(&pattern)
                    .arg("COUNT")
                    .arg(SCAN_BATCH)
                    .query_async(&mut conn),
            )
            .await?;

            for key in keys {
                let purged: i64 = run_with_timeout(
                    self.timeout,
                    self.purge_script
                        .key(&key)
                        .arg(&cutoff)
                        .invoke_async(&mut conn),
                )
                .await?;
                removed += usize::try_from(purged).unwrap_or_default();
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        tracing::info!(
            "[Redis] Purged {} pending slot(s) registered before {}",
            removed,
            cutoff
        );
        Ok(removed)
    }
}
