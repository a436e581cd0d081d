//! ConnectionRegistry: 2 段階登録ハンドシェイク
//!
//! クライアントが論理的な身元を名乗る（register）ことと、トランスポート接続が
//! 確立する（bind）ことの間の競合を取り除きます。
//!
//! 1. `register_intent(user, slot)`: Pending slot を作る（bind より前に必ず呼ぶ）
//! 2. `bind_transport(user, slot, handle)`: Pending slot にライブな接続を結び付ける
//! 3. `unbind_by_handle(connection_id)`: 切断時、接続から slot を逆引きして削除
//!
//! slot 自体は `ConnectionStore` に、ライブなハンドルはプロセスローカルの
//! ハンドルディレクトリ（`ConnectionId` → ハンドル + 結び付いた slot）に保持します。
//! ディレクトリのロックはマップ更新の間だけ保持し、ストアの I/O 中は保持しません。

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;

use notificator_shared::time::Clock;

use crate::domain::{
    ConnectionId, ConnectionSlot, ConnectionStore, SlotCreation, SlotId, Timestamp,
    TransportHandle, UserId,
};

use super::error::RegistryError;

/// ハンドルディレクトリのエントリ
struct HandleEntry {
    handle: Arc<dyn TransportHandle>,
    /// この接続を通じて Bound になった slot
    bindings: Vec<(UserId, SlotId)>,
}

/// ユーザーとライブな接続の対応表
pub struct ConnectionRegistry {
    store: Arc<dyn ConnectionStore>,
    clock: Arc<dyn Clock>,
    handles: Mutex<HashMap<ConnectionId, HandleEntry>>,
}

impl ConnectionRegistry {
    pub fn new(store: Arc<dyn ConnectionStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            handles: Mutex::new(HashMap::new()),
        }
    }

    fn now(&self) -> Timestamp {
        Timestamp::new(self.clock.now_millis())
    }

    /// 登録意図を記録して Pending slot を作る
    ///
    /// 同じ id の Pending slot が既にあれば何もしない。Bound な slot と衝突した場合は
    /// `RegistryError::SlotAlreadyBound` を返す。
    pub async fn register_intent(&self, user: &UserId, slot_id: &SlotId) -> Result<(), RegistryError> {
        match self
            .store
            .create_pending_slot(user, slot_id, self.now())
            .await?
        {
            SlotCreation::Created => {
                tracing::info!(
                    "Registered connection {} for user '{}'",
                    slot_id.masked(),
                    user
                );
                Ok(())
            }
            SlotCreation::AlreadyPending => {
                tracing::debug!(
                    "Connection {} for user '{}' is already pending",
                    slot_id.masked(),
                    user
                );
                Ok(())
            }
            SlotCreation::AlreadyBound => Err(RegistryError::SlotAlreadyBound {
                user: user.to_string(),
                slot_id: slot_id.to_string(),
            }),
        }
    }

    /// Pending slot にハンドルを結び付ける
    ///
    /// `false` は対応する Pending slot が無い（未登録または既に Bound）ことを示し、
    /// 呼び出し元が登録からやり直すか諦めるかを決める。
    pub async fn bind_transport(
        &self,
        user: &UserId,
        slot_id: &SlotId,
        handle: Arc<dyn TransportHandle>,
    ) -> Result<bool, RegistryError> {
        self.bind(user, slot_id, handle, false).await
    }

    /// `bind_transport` と同じだが、ハンドルが `track_handle` 済みであることを要求する
    ///
    /// bind の途中で接続が切れていた場合は作った Bound slot を消して `false` を返す。
    pub async fn bind_tracked(
        &self,
        user: &UserId,
        slot_id: &SlotId,
        handle: Arc<dyn TransportHandle>,
    ) -> Result<bool, RegistryError> {
        self.bind(user, slot_id, handle, true).await
    }

    async fn bind(
        &self,
        user: &UserId,
        slot_id: &SlotId,
        handle: Arc<dyn TransportHandle>,
        require_tracked: bool,
    ) -> Result<bool, RegistryError> {
        let connection_id = handle.connection_id();

        let bound = self
            .store
            .try_bind(user, slot_id, &connection_id, self.now())
            .await?;
        if !bound {
            tracing::info!(
                "Not found pending connection {} for user '{}'",
                slot_id.masked(),
                user
            );
            return Ok(false);
        }

        let recorded = {
            let mut handles = self.handles.lock().await;
            if let Some(entry) = handles.get_mut(&connection_id) {
                entry.bindings.push((user.clone(), slot_id.clone()));
                true
            } else if require_tracked {
                false
            } else {
                handles.insert(
                    connection_id.clone(),
                    HandleEntry {
                        handle,
                        bindings: vec![(user.clone(), slot_id.clone())],
                    },
                );
                true
            }
        };

        if !recorded {
            tracing::warn!(
                "Connection '{}' closed while binding {} for user '{}', rolling back",
                connection_id,
                slot_id.masked(),
                user
            );
            self.store.remove_slot(user, slot_id).await?;
            return Ok(false);
        }

        tracing::info!(
            "Bound socket '{}' to connection {} of user '{}'",
            connection_id,
            slot_id.masked(),
            user
        );
        Ok(true)
    }

    /// 接続から slot を逆引きしてすべて削除する。未知の接続は何もしない
    ///
    /// 削除に失敗した slot があっても残りの削除は続け、最初のエラーを返す。
    pub async fn unbind_by_handle(&self, connection_id: &ConnectionId) -> Result<(), RegistryError> {
        let entry = self.handles.lock().await.remove(connection_id);
        let Some(entry) = entry else {
            tracing::debug!("Unbind for unknown connection '{}' ignored", connection_id);
            return Ok(());
        };

        let mut first_error = None;
        for (user, slot_id) in entry.bindings {
            match self.store.remove_slot(&user, &slot_id).await {
                Ok(()) => tracing::info!(
                    "Removed socket '{}' for user '{}' and connection {}",
                    connection_id,
                    user,
                    slot_id.masked()
                ),
                Err(e) => {
                    tracing::warn!(
                        "Failed to remove connection {} of user '{}': {}",
                        slot_id.masked(),
                        user,
                        e
                    );
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    /// ユーザーに結び付いたライブなハンドル（登録順）
    ///
    /// 別プロセスが保持している接続はここからは届かないので除外する。
    pub async fn list_live_handles(
        &self,
        user: &UserId,
    ) -> Result<Vec<Arc<dyn TransportHandle>>, RegistryError> {
        let connection_ids = self.store.list_bound_handles(user).await?;
        let handles = self.handles.lock().await;

        Ok(connection_ids
            .iter()
            .filter_map(|id| match handles.get(id) {
                Some(entry) => Some(entry.handle.clone()),
                None => {
                    tracing::debug!(
                        "Connection '{}' of user '{}' is not held by this process",
                        id,
                        user
                    );
                    None
                }
            })
            .collect())
    }

    /// 接続直後のハンドルを記録する（まだどの slot にも結び付いていない）
    pub async fn track_handle(&self, handle: Arc<dyn TransportHandle>) {
        let connection_id = handle.connection_id();
        self.handles
            .lock()
            .await
            .entry(connection_id)
            .or_insert_with(|| HandleEntry {
                handle,
                bindings: Vec::new(),
            });
    }

    /// このプロセスが保持しているライブなハンドルを id で探す
    pub async fn find_handle(&self, connection_id: &ConnectionId) -> Option<Arc<dyn TransportHandle>> {
        self.handles
            .lock()
            .await
            .get(connection_id)
            .map(|entry| entry.handle.clone())
    }

    /// このプロセスが保持しているライブな接続数
    pub async fn live_connection_count(&self) -> usize {
        self.handles.lock().await.len()
    }

    pub async fn list_slots(&self, user: &UserId) -> Result<Vec<ConnectionSlot>, RegistryError> {
        Ok(self.store.list_slots(user).await?)
    }

    /// 管理用の slot 削除（冪等）。接続自体はライブなまま残る
    ///
    /// ディレクトリの対応を先に外してからストアを消す。ストアの削除までの間に
    /// 同じ slot が bind し直されても、切断時の後始末に使う対応は失われない。
    pub async fn remove_slot(&self, user: &UserId, slot_id: &SlotId) -> Result<(), RegistryError> {
        {
            let mut handles = self.handles.lock().await;
            for entry in handles.values_mut() {
                entry.bindings.retain(|(bound_user, bound_slot)| {
                    !(bound_user == user && bound_slot == slot_id)
                });
            }
        }

        self.store.remove_slot(user, slot_id).await?;
        Ok(())
    }

    /// `older_than` より長く Pending のままの slot を削除する
    pub async fn purge_pending(&self, older_than: Duration) -> Result<usize, RegistryError> {
        let age = i64::try_from(older_than.as_millis()).unwrap_or(i64::MAX);
        let cutoff = Timestamp::new(self.now().value().saturating_sub(age));

        let removed = self.store.purge_pending_before(cutoff).await?;
        tracing::info!(
            "Purged {} pending connection(s) older than {:?}",
            removed,
            older_than
        );
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        domain::{StorageError, handle::MockTransportHandle, store::MockConnectionStore},
        infrastructure::store::InMemoryConnectionStore,
    };
    use notificator_shared::time::FixedClock;
    use std::sync::{OnceLock, Weak};

    // ========================================
    // テスト作業記録
    // ========================================
    // 【何をテストするか】
    // - register → bind → list の基本フロー
    // - bind の 2 回目が false になり、ハンドルが置き換わらないこと
    // - unbind の冪等性、未知の接続の無視
    // - 複数デバイス（複数 slot）の扱い
    // - ストアのエラーが呼び出し元にそのまま返ること
    //
    // 【なぜこのテストが必要か】
    // - 登録 API と接続イベントの競合を解消するのがこのコンポーネントの責務
    // ========================================

    fn user(id: &str) -> UserId {
        UserId::new(id.to_string()).unwrap()
    }

    fn slot(id: &str) -> SlotId {
        SlotId::new(id.to_string()).unwrap()
    }

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::new(id.to_string()).unwrap()
    }

    fn create_test_registry() -> ConnectionRegistry {
        ConnectionRegistry::new(
            Arc::new(InMemoryConnectionStore::new()),
            Arc::new(FixedClock::new(1_700_000_000_000)),
        )
    }

    fn create_test_handle(id: &str) -> Arc<dyn TransportHandle> {
        let mut handle = MockTransportHandle::new();
        handle.expect_connection_id().return_const(conn(id));
        Arc::new(handle)
    }

    fn ids(handles: &[Arc<dyn TransportHandle>]) -> Vec<ConnectionId> {
        handles.iter().map(|h| h.connection_id()).collect()
    }

    #[tokio::test]
    async fn test_register_then_bind_lists_handle() {
        // テスト項目: register → bind でライブなハンドルが 1 つ返る
        // given (前提条件):
        let registry = create_test_registry();
        let alice = user("alice");
        registry.register_intent(&alice, &slot("s1")).await.unwrap();

        // when (操作):
        let bound = registry
            .bind_transport(&alice, &slot("s1"), create_test_handle("h1"))
            .await
            .unwrap();

        // then (期待する結果):
        assert!(bound);
        let handles = registry.list_live_handles(&alice).await.unwrap();
        assert_eq!(ids(&handles), vec![conn("h1")]);
    }

    #[tokio::test]
    async fn test_bind_without_register_fails() {
        // テスト項目: 登録前の bind は false で、ハンドルも記録されない
        let registry = create_test_registry();

        let bound = registry
            .bind_transport(&user("alice"), &slot("s1"), create_test_handle("h1"))
            .await
            .unwrap();

        assert!(!bound);
        assert_eq!(registry.live_connection_count().await, 0);
    }

    #[tokio::test]
    async fn test_second_bind_returns_false_and_keeps_first_handle() {
        // テスト項目: 同じ slot への 2 回目の bind は false で、最初のハンドルが残る
        // given (前提条件):
        let registry = create_test_registry();
        let alice = user("alice");
        registry.register_intent(&alice, &slot("s1")).await.unwrap();
        registry
            .bind_transport(&alice, &slot("s1"), create_test_handle("h1"))
            .await
            .unwrap();

        // when (操作):
        let second = registry
            .bind_transport(&alice, &slot("s1"), create_test_handle("h2"))
            .await
            .unwrap();

        // then (期待する結果):
        assert!(!second);
        let handles = registry.list_live_handles(&alice).await.unwrap();
        assert_eq!(ids(&handles), vec![conn("h1")]);
    }

    #[tokio::test]
    async fn test_register_over_bound_slot_is_conflict() {
        // テスト項目: Bound な slot の再登録は SlotAlreadyBound になり、状態は変わらない
        let registry = create_test_registry();
        let alice = user("alice");
        registry.register_intent(&alice, &slot("s1")).await.unwrap();
        registry
            .bind_transport(&alice, &slot("s1"), create_test_handle("h1"))
            .await
            .unwrap();

        let result = registry.register_intent(&alice, &slot("s1")).await;

        assert!(matches!(
            result,
            Err(RegistryError::SlotAlreadyBound { .. })
        ));
        assert_eq!(registry.list_live_handles(&alice).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unbind_removes_handle_and_is_idempotent() {
        // テスト項目: unbind でハンドルが消え、2 回目の unbind は何もしない
        // given (前提条件):
        let registry = create_test_registry();
        let alice = user("alice");
        registry.register_intent(&alice, &slot("s1")).await.unwrap();
        registry
            .bind_transport(&alice, &slot("s1"), create_test_handle("h1"))
            .await
            .unwrap();

        // when (操作):
        let first = registry.unbind_by_handle(&conn("h1")).await;
        let second = registry.unbind_by_handle(&conn("h1")).await;

        // then (期待する結果):
        assert!(first.is_ok());
        assert!(second.is_ok());
        assert!(registry.list_live_handles(&alice).await.unwrap().is_empty());
        assert!(registry.list_slots(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unbind_unknown_handle_is_noop() {
        // テスト項目: 未知の接続の unbind はエラーにならない
        let registry = create_test_registry();

        assert!(registry.unbind_by_handle(&conn("ghost")).await.is_ok());
    }

    #[tokio::test]
    async fn test_multi_device_lists_both_handles() {
        // テスト項目: 同じユーザーの 2 つの slot がそれぞれ bind されると両方が返る
        // given (前提条件):
        let registry = create_test_registry();
        let alice = user("alice");
        registry.register_intent(&alice, &slot("phone")).await.unwrap();
        registry.register_intent(&alice, &slot("laptop")).await.unwrap();

        // when (操作):
        registry
            .bind_transport(&alice, &slot("phone"), create_test_handle("h-phone"))
            .await
            .unwrap();
        registry
            .bind_transport(&alice, &slot("laptop"), create_test_handle("h-laptop"))
            .await
            .unwrap();

        // then (期待する結果):
        let handles = registry.list_live_handles(&alice).await.unwrap();
        assert_eq!(ids(&handles), vec![conn("h-phone"), conn("h-laptop")]);
    }

    #[tokio::test]
    async fn test_one_handle_bound_to_two_slots_unbinds_both() {
        // テスト項目: 1 つの接続が 2 つの slot に結び付いていても切断で両方消える
        let registry = create_test_registry();
        let alice = user("alice");
        let bob = user("bob");
        let handle = create_test_handle("shared");
        registry.register_intent(&alice, &slot("s1")).await.unwrap();
        registry.register_intent(&bob, &slot("s2")).await.unwrap();
        registry
            .bind_transport(&alice, &slot("s1"), handle.clone())
            .await
            .unwrap();
        registry
            .bind_transport(&bob, &slot("s2"), handle)
            .await
            .unwrap();

        registry.unbind_by_handle(&conn("shared")).await.unwrap();

        assert!(registry.list_slots(&alice).await.unwrap().is_empty());
        assert!(registry.list_slots(&bob).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bind_tracked_requires_live_handle() {
        // テスト項目: 追跡されていないハンドルでの bind_tracked は巻き戻されて false になる
        // given (前提条件):
        let registry = create_test_registry();
        let alice = user("alice");
        registry.register_intent(&alice, &slot("s1")).await.unwrap();

        // when (操作):
        let bound = registry
            .bind_tracked(&alice, &slot("s1"), create_test_handle("gone"))
            .await
            .unwrap();

        // then (期待する結果): slot は削除されている
        assert!(!bound);
        assert!(registry.list_slots(&alice).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_track_and_find_handle() {
        // テスト項目: 接続直後に記録したハンドルを id で引ける
        let registry = create_test_registry();
        registry.track_handle(create_test_handle("h1")).await;

        let found = registry.find_handle(&conn("h1")).await;

        assert_eq!(found.map(|h| h.connection_id()), Some(conn("h1")));
        assert!(registry.find_handle(&conn("h2")).await.is_none());
    }

    #[tokio::test]
    async fn test_admin_remove_slot_keeps_connection_alive() {
        // テスト項目: 管理用の slot 削除後も接続は残り、切断時の unbind はエラーにならない
        let registry = create_test_registry();
        let alice = user("alice");
        registry.register_intent(&alice, &slot("s1")).await.unwrap();
        registry
            .bind_transport(&alice, &slot("s1"), create_test_handle("h1"))
            .await
            .unwrap();

        registry.remove_slot(&alice, &slot("s1")).await.unwrap();

        assert!(registry.list_live_handles(&alice).await.unwrap().is_empty());
        assert!(registry.find_handle(&conn("h1")).await.is_some());
        assert!(registry.unbind_by_handle(&conn("h1")).await.is_ok());
    }

    /// 最初の `remove_slot` の直後に、同じ slot を別の接続で登録・bind し直すストア
    ///
    /// 管理用の削除と再 bind が交互に進む状況を再現する。
    struct RebindDuringRemoveStore {
        inner: InMemoryConnectionStore,
        registry: OnceLock<Weak<ConnectionRegistry>>,
        rebind: Mutex<Option<(UserId, SlotId, Arc<dyn TransportHandle>)>>,
    }

    #[async_trait::async_trait]
    impl ConnectionStore for RebindDuringRemoveStore {
        async fn create_pending_slot(
            &self,
            user: &UserId,
            slot_id: &SlotId,
            created_at: Timestamp,
        ) -> Result<SlotCreation, StorageError> {
            self.inner.create_pending_slot(user, slot_id, created_at).await
        }

        async fn try_bind(
            &self,
            user: &UserId,
            slot_id: &SlotId,
            connection_id: &ConnectionId,
            bound_at: Timestamp,
        ) -> Result<bool, StorageError> {
            self.inner
                .try_bind(user, slot_id, connection_id, bound_at)
                .await
        }

        async fn remove_slot(&self, user: &UserId, slot_id: &SlotId) -> Result<(), StorageError> {
            self.inner.remove_slot(user, slot_id).await?;

            let rebind = self.rebind.lock().await.take();
            if let Some((user, slot_id, handle)) = rebind {
                let registry = self
                    .registry
                    .get()
                    .and_then(Weak::upgrade)
                    .expect("registry is attached");
                registry.register_intent(&user, &slot_id).await.unwrap();
                assert!(registry.bind_tracked(&user, &slot_id, handle).await.unwrap());
            }
            Ok(())
        }

        async fn list_bound_handles(
            &self,
            user: &UserId,
        ) -> Result<Vec<ConnectionId>, StorageError> {
            self.inner.list_bound_handles(user).await
        }

        async fn list_slots(&self, user: &UserId) -> Result<Vec<ConnectionSlot>, StorageError> {
            self.inner.list_slots(user).await
        }

        async fn purge_pending_before(&self, cutoff: Timestamp) -> Result<usize, StorageError> {
            self.inner.purge_pending_before(cutoff).await
        }
    }

    #[tokio::test]
    async fn test_admin_remove_slot_keeps_binding_made_meanwhile() {
        // テスト項目: 管理用の削除中に同じ slot へ bind し直した接続は、切断時に slot を片付けられる
        // given (前提条件): h1 が s1 に bind 済み。削除の途中で h2 が s1 に bind し直す
        let alice = user("alice");
        let h2 = create_test_handle("h2");
        let store = Arc::new(RebindDuringRemoveStore {
            inner: InMemoryConnectionStore::new(),
            registry: OnceLock::new(),
            rebind: Mutex::new(Some((alice.clone(), slot("s1"), h2.clone()))),
        });
        let registry = Arc::new(ConnectionRegistry::new(
            store.clone(),
            Arc::new(FixedClock::new(1_000)),
        ));
        store
            .registry
            .set(Arc::downgrade(&registry))
            .unwrap_or_else(|_| panic!("registry attached twice"));
        registry.register_intent(&alice, &slot("s1")).await.unwrap();
        registry
            .bind_transport(&alice, &slot("s1"), create_test_handle("h1"))
            .await
            .unwrap();
        registry.track_handle(h2).await;

        // when (操作):
        registry.remove_slot(&alice, &slot("s1")).await.unwrap();
        let rebound = registry.list_live_handles(&alice).await.unwrap();
        registry.unbind_by_handle(&conn("h2")).await.unwrap();

        // then (期待する結果): Bound のまま取り残された slot が無く、再登録できる
        assert_eq!(ids(&rebound), vec![conn("h2")]);
        assert!(registry.list_slots(&alice).await.unwrap().is_empty());
        assert!(registry.register_intent(&alice, &slot("s1")).await.is_ok());
    }

    #[tokio::test]
    async fn test_purge_pending_uses_clock_cutoff() {
        // テスト項目: 現在時刻から older_than を引いた時刻より前の Pending slot が削除される
        // given (前提条件):
        let store = Arc::new(InMemoryConnectionStore::new());
        let alice = user("alice");
        store
            .create_pending_slot(&alice, &slot("old"), Timestamp::new(1_000))
            .await
            .unwrap();
        store
            .create_pending_slot(&alice, &slot("fresh"), Timestamp::new(55_000))
            .await
            .unwrap();
        let registry = ConnectionRegistry::new(store, Arc::new(FixedClock::new(60_000)));

        // when (操作): 30 秒より古いものを削除
        let removed = registry
            .purge_pending(Duration::from_secs(30))
            .await
            .unwrap();

        // then (期待する結果):
        assert_eq!(removed, 1);
        let slots = registry.list_slots(&alice).await.unwrap();
        assert_eq!(slots.len(), 1);
        assert_eq!(slots[0].slot_id, slot("fresh"));
    }

    #[tokio::test]
    async fn test_storage_error_is_returned_not_retried() {
        // テスト項目: ストアの失敗は 1 回だけ呼ばれ、そのまま呼び出し元へ返る
        // given (前提条件):
        let mut store = MockConnectionStore::new();
        store
            .expect_create_pending_slot()
            .times(1)
            .returning(|_, _, _| Err(StorageError::Backend("connection refused".to_string())));
        let registry =
            ConnectionRegistry::new(Arc::new(store), Arc::new(FixedClock::new(1_000)));

        // when (操作):
        let result = registry.register_intent(&user("alice"), &slot("s1")).await;

        // then (期待する結果):
        match result {
            Err(RegistryError::Storage(e)) => assert!(e.is_retryable()),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_unbind_continues_after_storage_error() {
        // テスト項目: unbind 中に 1 つの削除が失敗しても残りの削除は行われ、エラーが返る
        // given (前提条件):
        let mut store = MockConnectionStore::new();
        store.expect_try_bind().returning(|_, _, _, _| Ok(true));
        store
            .expect_remove_slot()
            .withf(|_, slot_id| slot_id.as_str() == "s1")
            .times(1)
            .returning(|_, _| Err(StorageError::Timeout(Duration::from_secs(1))));
        store
            .expect_remove_slot()
            .withf(|_, slot_id| slot_id.as_str() == "s2")
            .times(1)
            .returning(|_, _| Ok(()));
        let registry =
            ConnectionRegistry::new(Arc::new(store), Arc::new(FixedClock::new(1_000)));
        let handle = create_test_handle("h1");
        let alice = user("alice");
        registry
            .bind_transport(&alice, &slot("s1"), handle.clone())
            .await
            .unwrap();
        registry
            .bind_transport(&alice, &slot("s2"), handle)
            .await
            .unwrap();

        // when (操作):
        let result = registry.unbind_by_handle(&conn("h1")).await;

        // then (期待する結果):
        assert!(matches!(
            result,
            Err(RegistryError::Storage(StorageError::Timeout(_)))
        ));
        assert_eq!(registry.live_connection_count().await, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_binds_exactly_one_succeeds() {
        // テスト項目: 同じ Pending slot への同時 bind はちょうど 1 つだけ成功する
        // given (前提条件):
        let registry = Arc::new(create_test_registry());
        let alice = user("alice");
        registry.register_intent(&alice, &slot("s1")).await.unwrap();

        // when (操作):
        let first = {
            let registry = registry.clone();
            let alice = alice.clone();
            tokio::spawn(async move {
                registry
                    .bind_transport(&alice, &slot("s1"), create_test_handle("h1"))
                    .await
                    .unwrap()
            })
        };
        let second = {
            let registry = registry.clone();
            let alice = alice.clone();
            tokio::spawn(async move {
                registry
                    .bind_transport(&alice, &slot("s1"), create_test_handle("h2"))
                    .await
                    .unwrap()
            })
        };
        let results = [first.await.unwrap(), second.await.unwrap()];

        // then (期待する結果):
        assert_eq!(results.iter().filter(|bound| **bound).count(), 1);
        assert_eq!(registry.list_live_handles(&alice).await.unwrap().len(), 1);
    }
}
