//! Shared utilities for Notificator packages.

pub mod logger;
pub mod time;
