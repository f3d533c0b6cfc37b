//! Duplex channel between the sandbox and the remote agent backend
//!
//! The backend drives execution by sending `execute_code`, `write_file`
//! and `install_packages` messages; the sandbox answers with acks, results
//! and created-file reports. The transport is a trait seam so the handler
//! can be exercised over in-process channels in tests and over WebSocket
//! in production.

pub mod handler;
pub mod transport;

pub use handler::ChannelHandler;
pub use transport::{ws_connect, ChannelReceiver, ChannelSender};
