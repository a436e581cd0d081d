//! Control HTTP API and WebSocket transport.

mod auth;
mod error;
mod handler;
mod server;
mod signal;
pub mod state;

pub use server::{Server, ServerConfig};
