//! Shared types for the runbox sandbox: the data model, the duplex channel
//! wire messages, and the error taxonomy.

pub mod error;
pub mod messages;
pub mod types;

pub use error::{Result, SandboxError};
pub use messages::ChannelMessage;
pub use types::{
    CodeBlock, ExecutionId, ExecutionResult, ExecutionStatus, FileInfo, PendingExecution,
};
