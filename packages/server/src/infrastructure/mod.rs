//! Infrastructure layer: concrete `ConnectionStore` backends, the WebSocket
//! transport handle and wire DTOs.

pub mod dto;
pub mod store;
pub mod transport;
