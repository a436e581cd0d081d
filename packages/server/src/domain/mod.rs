//! Domain layer: value objects, the slot model and the ports the rest of the
//! server depends on.
//!
//! ドメイン層はインフラ層に依存しません。`ConnectionStore` と
//! `TransportHandle` はドメイン層が定義し、Infrastructure 層が実装します（依存性の逆転）。

pub mod error;
pub mod handle;
pub mod slot;
pub mod store;
pub mod value_object;

pub use error::{StorageError, TransportError, ValueObjectError};
pub use handle::TransportHandle;
pub use slot::{ConnectionSlot, SlotCreation, SlotSet, SlotState};
pub use store::ConnectionStore;
pub use value_object::{ConnectionId, PushMessage, SlotId, Timestamp, UserId};
