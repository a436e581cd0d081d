//! UseCase 層
//!
//! - `registry`: 2 段階登録（register → bind）と slot のライフサイクル
//! - `push_service`: 制御プレーンとトランスポートに公開する操作、ファンアウト

pub mod error;
pub mod push_service;
pub mod registry;

pub use error::RegistryError;
pub use push_service::{PushReport, PushService};
pub use registry::ConnectionRegistry;
