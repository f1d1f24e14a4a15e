use crate::errors::ApiError;
use broker_core::{Arguments, ToolCallRequest, ToolGroupId};
use serde::{Deserialize, Serialize};
use tooling::ToolSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeRequest {
    pub tool_group_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub arguments: Arguments,
}

impl InvokeRequest {
    /// Validates the group id and stamps a fresh call id.
    pub fn into_call(self) -> Result<ToolCallRequest, ApiError> {
        let id = ToolGroupId::parse(self.tool_group_id)
            .map_err(|e| ApiError::ValidationError(e.to_string()))?;
        if self.tool_name.trim().is_empty() {
            return Err(ApiError::ValidationError(
                "tool_name must not be empty".to_string(),
            ));
        }
        Ok(ToolCallRequest::new(id, self.tool_name, self.arguments))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub provider_id: String,
    pub tools: Vec<ToolSpec>,
}
