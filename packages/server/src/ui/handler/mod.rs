//! Request handlers.

mod http;
mod websocket;

pub use http::{
    associate_socket, info, list_connections, ping, purge_pending, push_message, register_user,
    remove_slot,
};
pub use websocket::websocket_handler;
