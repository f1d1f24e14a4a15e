use crate::group::ToolGroupId;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fmt;
use uuid::Uuid;

pub type Arguments = Map<String, Value>;

/// A single tool invocation. Fields are fixed at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    call_id: Uuid,
    tool_group_id: ToolGroupId,
    tool_name: String,
    #[serde(default)]
    arguments: Arguments,
}

impl ToolCallRequest {
    pub fn new(tool_group_id: ToolGroupId, tool_name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            call_id: Uuid::new_v4(),
            tool_group_id,
            tool_name: tool_name.into(),
            arguments,
        }
    }

    pub fn call_id(&self) -> Uuid {
        self.call_id
    }

    pub fn tool_group_id(&self) -> &ToolGroupId {
        &self.tool_group_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn arguments(&self) -> &Arguments {
        &self.arguments
    }
}

/// One block of a provider's `content` array.
#[derive(Debug, Clone, PartialEq)]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        mime_type: String,
    },
    Audio {
        data: String,
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
    ResourceLink {
        uri: String,
        name: String,
        mime_type: Option<String>,
    },
    /// A block type not modelled here, kept verbatim.
    Other(Value),
}

const KNOWN_BLOCK_TYPES: [&str; 5] = ["text", "image", "audio", "resource", "resource_link"];

/// Wire shape of the modelled block types: `type` tag, camelCase fields.
#[derive(Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
enum WireBlock {
    Text {
        text: String,
    },
    Image {
        data: String,
        mime_type: String,
    },
    Audio {
        data: String,
        mime_type: String,
    },
    Resource {
        resource: Value,
    },
    ResourceLink {
        uri: String,
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        mime_type: Option<String>,
    },
}

impl From<WireBlock> for ContentBlock {
    fn from(block: WireBlock) -> Self {
        match block {
            WireBlock::Text { text } => ContentBlock::Text { text },
            WireBlock::Image { data, mime_type } => ContentBlock::Image { data, mime_type },
            WireBlock::Audio { data, mime_type } => ContentBlock::Audio { data, mime_type },
            WireBlock::Resource { resource } => ContentBlock::Resource { resource },
            WireBlock::ResourceLink {
                uri,
                name,
                mime_type,
            } => ContentBlock::ResourceLink {
                uri,
                name,
                mime_type,
            },
        }
    }
}

impl ContentBlock {
    fn to_wire(&self) -> Result<WireBlock, &Value> {
        Ok(match self {
            ContentBlock::Text { text } => WireBlock::Text { text: text.clone() },
            ContentBlock::Image { data, mime_type } => WireBlock::Image {
                data: data.clone(),
                mime_type: mime_type.clone(),
            },
            ContentBlock::Audio { data, mime_type } => WireBlock::Audio {
                data: data.clone(),
                mime_type: mime_type.clone(),
            },
            ContentBlock::Resource { resource } => WireBlock::Resource {
                resource: resource.clone(),
            },
            ContentBlock::ResourceLink {
                uri,
                name,
                mime_type,
            } => WireBlock::ResourceLink {
                uri: uri.clone(),
                name: name.clone(),
                mime_type: mime_type.clone(),
            },
            ContentBlock::Other(raw) => return Err(raw),
        })
    }
}

impl Serialize for ContentBlock {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.to_wire() {
            Ok(block) => block.serialize(serializer),
            Err(raw) => raw.serialize(serializer),
        }
    }
}

impl<'de> Deserialize<'de> for ContentBlock {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let block_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| de::Error::missing_field("type"))?;

        if !KNOWN_BLOCK_TYPES.contains(&block_type) {
            return Ok(ContentBlock::Other(value));
        }
        WireBlock::deserialize(value)
            .map(ContentBlock::from)
            .map_err(de::Error::custom)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Content { content: Vec<ContentBlock> },
    Object(Map<String, Value>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PayloadError(pub String);

impl fmt::Display for PayloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "undecodable payload: {}", self.0)
    }
}

impl std::error::Error for PayloadError {}

impl Payload {
    pub fn object(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Payload::Object(map)),
            _ => None,
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Payload::Content {
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    /// Decodes a provider result. An object carrying a `content` array is
    /// treated as content blocks; every other object is kept as a mapping.
    pub fn from_value(value: Value) -> Result<Self, PayloadError> {
        let map = match value {
            Value::Object(map) => map,
            other => {
                return Err(PayloadError(format!(
                    "expected a JSON object, got {}",
                    json_type_name(&other)
                )))
            }
        };

        match map.get("content") {
            Some(Value::Array(blocks)) => {
                let content = blocks
                    .iter()
                    .cloned()
                    .map(serde_json::from_value)
                    .collect::<Result<Vec<ContentBlock>, _>>()
                    .map_err(|e| PayloadError(format!("invalid content block: {e}")))?;
                Ok(Payload::Content { content })
            }
            _ => Ok(Payload::Object(map)),
        }
    }

    /// Text blocks joined by newlines, if there are any.
    pub fn text_content(&self) -> Option<String> {
        let Payload::Content { content } = self else {
            return None;
        };
        let texts: Vec<&str> = content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        (!texts.is_empty()).then(|| texts.join("\n"))
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureKind {
    DuplicateId,
    NotFound,
    ProviderNotFound,
    TransportError,
    Timeout,
    ProtocolError,
    UnknownToolGroup,
    ToolFailed,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolCallResult {
    Success { payload: Payload },
    Failure { kind: FailureKind, message: String },
}

impl ToolCallResult {
    pub fn success(payload: Payload) -> Self {
        ToolCallResult::Success { payload }
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        ToolCallResult::Failure {
            kind,
            message: message.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ToolCallResult::Success { .. })
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            ToolCallResult::Success { .. } => None,
            ToolCallResult::Failure { kind, .. } => Some(*kind),
        }
    }

    pub fn payload(&self) -> Option<&Payload> {
        match self {
            ToolCallResult::Success { payload } => Some(payload),
            ToolCallResult::Failure { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn should_decode_plain_object_payload() {
        let payload = Payload::from_value(json!({"result": 5})).unwrap();
        assert_eq!(payload, Payload::object(json!({"result": 5})).unwrap());
    }

    #[test]
    fn should_decode_content_blocks() {
        let payload = Payload::from_value(json!({
            "content": [
                {"type": "text", "text": "document-key: abc"},
                {"type": "image", "data": "aGk=", "mimeType": "image/png"},
                {"type": "audio", "data": "UklGRg==", "mimeType": "audio/wav"},
                {"type": "resource_link", "uri": "file:///tmp/out.md", "name": "out.md"}
            ]
        }))
        .unwrap();

        match payload {
            Payload::Content { content } => {
                assert_eq!(
                    content,
                    vec![
                        ContentBlock::Text {
                            text: "document-key: abc".to_string()
                        },
                        ContentBlock::Image {
                            data: "aGk=".to_string(),
                            mime_type: "image/png".to_string()
                        },
                        ContentBlock::Audio {
                            data: "UklGRg==".to_string(),
                            mime_type: "audio/wav".to_string()
                        },
                        ContentBlock::ResourceLink {
                            uri: "file:///tmp/out.md".to_string(),
                            name: "out.md".to_string(),
                            mime_type: None
                        },
                    ]
                );
            }
            other => panic!("expected content blocks, got {other:?}"),
        }
    }

    #[test]
    fn should_serialize_blocks_in_wire_shape() {
        let payload = Payload::Content {
            content: vec![ContentBlock::Image {
                data: "aGk=".to_string(),
                mime_type: "image/png".to_string(),
            }],
        };

        assert_eq!(
            payload.to_value(),
            json!({"content": [{"type": "image", "data": "aGk=", "mimeType": "image/png"}]})
        );
    }

    #[test]
    fn should_keep_unmodelled_block_types_verbatim() {
        let raw = json!({"type": "video", "uri": "file:///tmp/clip.mp4"});
        let payload = Payload::from_value(json!({"content": [raw.clone()]})).unwrap();

        assert_eq!(
            payload,
            Payload::Content {
                content: vec![ContentBlock::Other(raw.clone())]
            }
        );
        assert_eq!(payload.to_value(), json!({"content": [raw]}));
    }

    #[test]
    fn should_join_text_blocks() {
        let payload = Payload::from_value(json!({
            "content": [
                {"type": "text", "text": "first"},
                {"type": "image", "data": "aGk=", "mimeType": "image/png"},
                {"type": "text", "text": "second"}
            ]
        }))
        .unwrap();

        assert_eq!(payload.text_content().as_deref(), Some("first\nsecond"));
        assert_eq!(Payload::object(json!({"a": 1})).unwrap().text_content(), None);
    }

    #[test]
    fn should_reject_non_object_payload() {
        let err = Payload::from_value(json!("just a string")).unwrap_err();
        assert!(err.to_string().contains("string"));
    }

    #[test]
    fn should_reject_malformed_content_blocks() {
        assert!(Payload::from_value(json!({"content": [{"type": "image", "data": "aGk="}]})).is_err());
        assert!(Payload::from_value(json!({"content": [{"text": "untyped"}]})).is_err());
    }

    #[test]
    fn should_serialize_result_with_status_tag() {
        let ok = ToolCallResult::success(Payload::object(json!({"result": 5})).unwrap());
        assert_eq!(
            serde_json::to_value(&ok).unwrap(),
            json!({"status": "success", "payload": {"result": 5}})
        );

        let failed = ToolCallResult::failure(FailureKind::Timeout, "no terminal event");
        assert_eq!(
            serde_json::to_value(&failed).unwrap(),
            json!({"status": "failure", "kind": "Timeout", "message": "no terminal event"})
        );
        assert_eq!(failed.failure_kind(), Some(FailureKind::Timeout));
    }

    #[test]
    fn should_assign_unique_call_ids() {
        let id = ToolGroupId::parse("tools::math").unwrap();
        let first = ToolCallRequest::new(id.clone(), "add", Arguments::new());
        let second = ToolCallRequest::new(id, "add", Arguments::new());
        assert_ne!(first.call_id(), second.call_id());
    }
}
