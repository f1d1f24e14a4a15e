use crate::tool::{ToolHandler, ToolSpec};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;

pub type SharedHandler = Arc<dyn ToolHandler>;

/// Statically linked providers, keyed by provider id.
pub struct HandlerRegistry {
    handlers: HashMap<String, SharedHandler>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Registry preloaded with every provider shipped in this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.handlers.insert(
            crate::math::PROVIDER_ID.to_string(),
            Arc::new(crate::math::MathTools),
        );
        registry
    }

    pub fn register(&mut self, handler: SharedHandler) -> Result<()> {
        let provider_id = handler.provider_id().to_string();

        if self.handlers.contains_key(&provider_id) {
            anyhow::bail!("Provider '{}' is already registered", provider_id);
        }

        self.handlers.insert(provider_id, handler);
        Ok(())
    }

    pub fn get(&self, provider_id: &str) -> Option<SharedHandler> {
        self.handlers.get(provider_id).cloned()
    }

    pub fn provider_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.handlers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn schemas(&self, provider_id: &str) -> Option<Vec<ToolSpec>> {
        self.handlers.get(provider_id).map(|handler| handler.tools())
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("providers", &self.provider_ids())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::MathTools;

    #[test]
    fn should_create_empty_registry() {
        let registry = HandlerRegistry::new();
        assert!(registry.provider_ids().is_empty());
        assert!(registry.get("math").is_none());
    }

    #[test]
    fn should_preload_builtin_providers() {
        let registry = HandlerRegistry::with_builtins();
        assert_eq!(registry.provider_ids(), vec!["math".to_string()]);

        let tools = registry.schemas("math").unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"add"));
        assert!(tools.iter().all(|t| t.parameters.is_object()));
    }

    #[test]
    fn should_fail_to_register_duplicate_provider() {
        let mut registry = HandlerRegistry::with_builtins();
        let result = registry.register(Arc::new(MathTools));

        assert!(result.is_err());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("already registered"));
    }

    #[test]
    fn should_return_none_for_unknown_provider_schemas() {
        let registry = HandlerRegistry::new();
        assert!(registry.schemas("docling").is_none());
    }
}
