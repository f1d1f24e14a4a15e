use anyhow::Result;
use async_trait::async_trait;
use broker_core::{Arguments, Payload};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolInput {
    pub name: String,
    pub arguments: Arguments,
}

impl ToolInput {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arguments: Arguments::new(),
        }
    }

    pub fn with_arguments(mut self, arguments: Arguments) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn with_argument<T: Serialize>(mut self, key: &str, value: T) -> Result<Self> {
        let json_value = serde_json::to_value(value)?;
        self.arguments.insert(key.to_string(), json_value);
        Ok(self)
    }

    pub fn get_argument<T>(&self, key: &str) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let value = self
            .arguments
            .get(key)
            .ok_or_else(|| anyhow::anyhow!("Argument '{}' not found", key))?;

        let result: T = serde_json::from_value(value.clone())?;
        Ok(result)
    }
}

/// Name, description and JSON-schema parameters of one callable tool.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolError {
    pub tool_name: String,
    pub message: String,
}

impl ToolError {
    pub fn new(tool_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool_name: tool_name.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ToolError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Tool '{}' error: {}", self.tool_name, self.message)
    }
}

impl std::error::Error for ToolError {}

/// A statically linked provider backing one or more built-in tool groups.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn provider_id(&self) -> &str;
    fn tools(&self) -> Vec<ToolSpec>;

    async fn call(&self, input: ToolInput) -> Result<Payload, ToolError>;

    fn validate_input(&self, input: &ToolInput) -> Result<(), ToolError> {
        if !self.tools().iter().any(|tool| tool.name == input.name) {
            return Err(ToolError::new(
                input.name.clone(),
                format!(
                    "Provider '{}' has no tool named '{}'",
                    self.provider_id(),
                    input.name
                ),
            ));
        }
        Ok(())
    }
}
