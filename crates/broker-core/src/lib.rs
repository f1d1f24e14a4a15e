//! Shared data model for the tool-group broker: namespaced group ids, tool
//! groups and their endpoints, call requests and normalized call results.

pub mod call;
pub mod config;
pub mod group;

pub use call::{Arguments, ContentBlock, FailureKind, Payload, PayloadError, ToolCallRequest, ToolCallResult};
pub use config::{Config, ServerConfig, TransportConfig};
pub use group::{Endpoint, InvalidId, RemoteTransport, ToolGroup, ToolGroupId, TransportKind};
