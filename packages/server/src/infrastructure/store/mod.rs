//! ConnectionStore の実装
//!
//! - `inmemory`: プロセス内の揮発ストア（ユーザーごとの Mutex で直列化）
//! - `redis`: Redis 上の永続ストア（Lua スクリプトで条件付き更新）

pub mod inmemory;
pub mod redis;

pub use inmemory::InMemoryConnectionStore;
pub use redis::RedisConnectionStore;
