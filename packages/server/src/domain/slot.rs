//! ConnectionSlot ドメインモデル
//!
//! 1 つの slot は「ユーザーの登録意図」と「1 本の物理接続」を対応付けます。
//!
//! ```text
//! Pending --bind(success)--> Bound --disconnect--> (removed)
//! ```
//!
//! `SlotSet` はユーザー 1 人分の slot 集合に対する純粋な操作をまとめたもので、
//! インメモリのバックエンドはこれをそのままバケットとして使います。

use super::value_object::{ConnectionId, SlotId, Timestamp};

/// Slot の状態
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotState {
    /// 登録済み、まだ接続が結び付いていない
    Pending,
    /// 接続が結び付いた。結び付いた接続は slot が削除されるまで変わらない
    Bound {
        connection_id: ConnectionId,
        bound_at: Timestamp,
    },
}

/// 登録レコード
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSlot {
    pub slot_id: SlotId,
    pub state: SlotState,
    pub created_at: Timestamp,
}

impl ConnectionSlot {
    /// 新しい Pending slot を作成
    pub fn pending(slot_id: SlotId, created_at: Timestamp) -> Self {
        Self {
            slot_id,
            state: SlotState::Pending,
            created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.state, SlotState::Pending)
    }

    /// 結び付いている接続（Bound の場合のみ）
    pub fn bound_connection(&self) -> Option<&ConnectionId> {
        match &self.state {
            SlotState::Pending => None,
            SlotState::Bound { connection_id, .. } => Some(connection_id),
        }
    }

    pub fn bound_at(&self) -> Option<Timestamp> {
        match &self.state {
            SlotState::Pending => None,
            SlotState::Bound { bound_at, .. } => Some(*bound_at),
        }
    }

    /// Pending → Bound の遷移。Bound の slot には何もせず `false` を返す
    fn bind(&mut self, connection_id: ConnectionId, bound_at: Timestamp) -> bool {
        if !self.is_pending() {
            return false;
        }
        self.state = SlotState::Bound {
            connection_id,
            bound_at,
        };
        true
    }
}

/// Outcome of a pending-slot registration.
///
/// A duplicate `slot_id` never replaces the existing slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotCreation {
    /// 新しい Pending slot を追加した
    Created,
    /// 同じ id の Pending slot が既にある（冪等）
    AlreadyPending,
    /// 同じ id の slot が既に Bound（競合）
    AlreadyBound,
}

/// ユーザー 1 人分の slot 集合（挿入順を保持）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotSet {
    slots: Vec<ConnectionSlot>,
}

impl SlotSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn slots(&self) -> &[ConnectionSlot] {
        &self.slots
    }

    fn find_mut(&mut self, slot_id: &SlotId) -> Option<&mut ConnectionSlot> {
        self.slots.iter_mut().find(|slot| &slot.slot_id == slot_id)
    }

    /// Pending slot を追加する。同じ id の slot があれば既存の slot を残す
    pub fn insert_pending(&mut self, slot_id: SlotId, created_at: Timestamp) -> SlotCreation {
        if let Some(existing) = self.slots.iter().find(|slot| slot.slot_id == slot_id) {
            return if existing.is_pending() {
                SlotCreation::AlreadyPending
            } else {
                SlotCreation::AlreadyBound
            };
        }
        self.slots.push(ConnectionSlot::pending(slot_id, created_at));
        SlotCreation::Created
    }

    /// Pending slot に接続を結び付ける。slot が存在しないか既に Bound なら `false`
    pub fn try_bind(
        &mut self,
        slot_id: &SlotId,
        connection_id: ConnectionId,
        bound_at: Timestamp,
    ) -> bool {
        match self.find_mut(slot_id) {
            Some(slot) => slot.bind(connection_id, bound_at),
            None => false,
        }
    }

    /// slot を状態に関係なく削除する。削除したかどうかを返す
    pub fn remove(&mut self, slot_id: &SlotId) -> bool {
        let before = self.slots.len();
        self.slots.retain(|slot| &slot.slot_id != slot_id);
        self.slots.len() != before
    }

    /// Bound な slot の接続 id（挿入順）
    pub fn bound_connections(&self) -> Vec<ConnectionId> {
        self.slots
            .iter()
            .filter_map(|slot| slot.bound_connection().cloned())
            .collect()
    }

    /// `cutoff` より前に作成された Pending slot を削除し、削除数を返す
    pub fn purge_pending_before(&mut self, cutoff: Timestamp) -> usize {
        let before = self.slots.len();
        self.slots
            .retain(|slot| !(slot.is_pending() && slot.created_at < cutoff));
        before - self.slots.len()
    }
}
