use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const NAMESPACE_SEPARATOR: &str = "::";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid tool group id '{id}': {reason}")]
pub struct InvalidId {
    pub id: String,
    pub reason: &'static str,
}

/// Namespaced identifier of a tool group, e.g. `mcp::docling`.
///
/// Exactly one `::` separates a non-empty category from a non-empty name.
/// Slashes are rejected because agent runtimes split `group/tool` on them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ToolGroupId(String);

impl ToolGroupId {
    pub fn parse(raw: impl Into<String>) -> Result<Self, InvalidId> {
        let id = raw.into();
        let invalid = |reason| InvalidId {
            id: id.clone(),
            reason,
        };

        if id.contains('/') {
            return Err(invalid("must not contain '/'"));
        }
        if id.chars().any(char::is_whitespace) {
            return Err(invalid("must not contain whitespace"));
        }

        let mut parts = id.split(NAMESPACE_SEPARATOR);
        let (category, name) = match (parts.next(), parts.next(), parts.next()) {
            (Some(category), Some(name), None) => (category, name),
            _ => return Err(invalid("expected exactly one '::' separator")),
        };
        if category.is_empty() || name.is_empty() {
            return Err(invalid("category and name must be non-empty"));
        }

        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn category(&self) -> &str {
        self.0
            .split_once(NAMESPACE_SEPARATOR)
            .map(|(category, _)| category)
            .unwrap_or_default()
    }

    pub fn name(&self) -> &str {
        self.0
            .split_once(NAMESPACE_SEPARATOR)
            .map(|(_, name)| name)
            .unwrap_or_default()
    }
}

impl fmt::Display for ToolGroupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ToolGroupId {
    type Err = InvalidId;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ToolGroupId {
    type Error = InvalidId;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(value)
    }
}

impl From<ToolGroupId> for String {
    fn from(id: ToolGroupId) -> Self {
        id.0
    }
}

/// How a tool group is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    Local,
    StreamingEvent,
    RequestResponse,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransportKind::Local => "local",
            TransportKind::StreamingEvent => "streaming_event",
            TransportKind::RequestResponse => "request_response",
        };
        f.write_str(name)
    }
}

/// Remote transport flavours. `Local` is not representable here, so a group
/// with an endpoint can never claim to be built-in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteTransport {
    StreamingEvent,
    RequestResponse,
}

impl From<RemoteTransport> for TransportKind {
    fn from(remote: RemoteTransport) -> Self {
        match remote {
            RemoteTransport::StreamingEvent => TransportKind::StreamingEvent,
            RemoteTransport::RequestResponse => TransportKind::RequestResponse,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub uri: String,
    pub transport: RemoteTransport,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl Endpoint {
    pub fn streaming_event(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            transport: RemoteTransport::StreamingEvent,
            headers: BTreeMap::new(),
        }
    }

    pub fn request_response(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            transport: RemoteTransport::RequestResponse,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_bearer_token(self, token: &str) -> Self {
        self.with_header("Authorization", format!("Bearer {token}"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolGroup {
    #[serde(rename = "identifier")]
    pub id: ToolGroupId,
    pub provider_id: String,
    #[serde(rename = "mcp_endpoint", default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<Endpoint>,
    #[serde(rename = "args", default, skip_serializing_if = "Option::is_none")]
    pub static_args: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ToolGroup {
    /// A group served in-process by the handler registered under `provider_id`.
    pub fn builtin(id: ToolGroupId, provider_id: impl Into<String>) -> Self {
        Self {
            id,
            provider_id: provider_id.into(),
            endpoint: None,
            static_args: None,
        }
    }

    pub fn remote(id: ToolGroupId, provider_id: impl Into<String>, endpoint: Endpoint) -> Self {
        Self {
            id,
            provider_id: provider_id.into(),
            endpoint: Some(endpoint),
            static_args: None,
        }
    }

    pub fn with_static_args(mut self, args: serde_json::Map<String, serde_json::Value>) -> Self {
        self.static_args = Some(args);
        self
    }

    pub fn transport_kind(&self) -> TransportKind {
        self.endpoint
            .as_ref()
            .map(|endpoint| endpoint.transport.into())
            .unwrap_or(TransportKind::Local)
    }
}
