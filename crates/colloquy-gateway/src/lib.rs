//! Realtime side of the chat: live WebSocket connections, the registry that
//! tracks them, and the fan-out from the cluster bus to their sockets.

pub mod connection;
pub mod dispatcher;
pub mod fanout;

pub use dispatcher::Dispatcher;
