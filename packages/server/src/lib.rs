//! Real-time push relay library.
//!
//! Binds users to their live WebSocket connections through a two-phase
//! register/bind handshake and fans pushed messages out to every bound device.

// layers
pub mod domain;
pub mod infrastructure;
pub mod ui;
pub mod usecase;

pub mod config;
