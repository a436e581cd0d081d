//! InMemory ConnectionStore 実装
//!
//! ユーザーごとのバケット（`SlotSet`）をそれぞれ専用の `Mutex` で保護します。
//! 外側のマップのロックはバケットの取得・追加・削除の間だけ保持し、
//! slot の変更はバケットのロックの下で行うため、直列化はユーザー単位になります。
//!
//! ロック順序は常に「外側のマップ → バケット」です。

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::domain::{
    ConnectionId, ConnectionSlot, ConnectionStore, SlotCreation, SlotId, SlotSet, StorageError,
    Timestamp, UserId,
};

type Bucket = Arc<Mutex<SlotSet>>;

/// インメモリ ConnectionStore 実装
#[derive(Default)]
pub struct InMemoryConnectionStore {
    buckets: Mutex<HashMap<UserId, Bucket>>,
}

impl InMemoryConnectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    async fn bucket(&self, user: &UserId) -> Option<Bucket> {
        self.buckets.lock().await.get(user).cloned()
    }

    async fn bucket_or_insert(&self, user: &UserId) -> Bucket {
        self.buckets
            .lock()
            .await
            .entry(user.clone())
            .or_default()
            .clone()
    }

    /// 空になったバケットをマップから外す
    ///
    /// 他のタスクがバケットの `Arc` を持っている間（strong count > 2）は外さない。
    /// `Arc` の複製は外側のロック下でしか行われないので、この判定は競合しない。
    async fn prune(&self, user: &UserId, bucket: &Bucket) {
        let mut buckets = self.buckets.lock().await;
        let is_empty = bucket.lock().await.is_empty();
        if !is_empty || Arc::strong_count(bucket) > 2 {
            return;
        }
        if buckets
            .get(user)
            .is_some_and(|current| Arc::ptr_eq(current, bucket))
        {
            buckets.remove(user);
            tracing::debug!("Pruned empty slot bucket for user '{}'", user);
        }
    }

    /// 登録ユーザー数（テスト・診断用）
    pub async fn user_count(&self) -> usize {
        self.buckets.lock().await.len()
    }
}

#[async_trait]
impl ConnectionStore for InMemoryConnectionStore {
    async fn create_pending_slot(
        &self,
        user: &UserId,
        slot_id: &SlotId,
        created_at: Timestamp,
    ) -> Result<SlotCreation, StorageError> {
        let bucket = self.bucket_or_insert(user).await;
        let result = bucket.lock().await.insert_pending(slot_id.clone(), created_at);
        Ok(result)
    }

    async fn try_bind(
        &self,
        user: &UserId,
        slot_id: &SlotId,
        connection_id: &ConnectionId,
        bound_at: Timestamp,
    ) -> Result<bool, StorageError> {
        let Some(bucket) = self.bucket(user).await else {
            return Ok(false);
        };
        let bound = bucket
            .lock()
            .await
            .try_bind(slot_id, connection_id.clone(), bound_at);
        Ok(bound)
    }

    async fn remove_slot(&self, user: &UserId, slot_id: &SlotId) -> Result<(), StorageError> {
        let Some(bucket) = self.bucket(user).await else {
            return Ok(());
        };
        let removed = bucket.lock().await.remove(slot_id);
        if removed {
            self.prune(user, &bucket).await;
        }
        Ok(())
    }

    async fn list_bound_handles(&self, user: &UserId) -> Result<Vec<ConnectionId>, StorageError> {
        match self.bucket(user).await {
            Some(bucket) => Ok(bucket.lock().await.bound_connections()),
            None => Ok(Vec::new()),
        }
    }

    async fn list_slots(&self, user: &UserId) -> Result<Vec<ConnectionSlot>, StorageError> {
        match self.bucket(user).await {
            Some(bucket) => Ok(bucket.lock().await.slots().to_vec()),
            None => Ok(Vec::new()),
        }
    }

    async fn purge_pending_before(&self, cutoff: Timestamp) -> Result<usize, StorageError> {
        let snapshot: Vec<(UserId, Bucket)> = self
            .buckets
            .lock()
            .await
            .iter()
            .map(|(user, bucket)| (user.clone(), bucket.clone()))
            .collect();

        let mut removed = 0;
        for (user, bucket) in snapshot {
            let purged = bucket.lock().await.purge_pending_before(cutoff);
            if purged > 0 {
                removed += purged;
                self.prune(&user, &bucket).await;
            }
        }
        Ok(removed)
    }
}
