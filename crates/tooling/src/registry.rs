use broker_core::{FailureKind, ToolCallResult, ToolGroup, ToolGroupId};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    #[error("tool group '{0}' is already registered")]
    DuplicateId(ToolGroupId),

    #[error("tool group '{0}' is not registered")]
    NotFound(ToolGroupId),
}

impl RegistryError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RegistryError::DuplicateId(_) => FailureKind::DuplicateId,
            RegistryError::NotFound(_) => FailureKind::NotFound,
        }
    }
}

impl From<RegistryError> for ToolCallResult {
    fn from(error: RegistryError) -> Self {
        ToolCallResult::failure(error.kind(), error.to_string())
    }
}

#[derive(Debug, Default)]
struct Entries {
    by_id: HashMap<ToolGroupId, Arc<ToolGroup>>,
    order: Vec<ToolGroupId>,
}

/// Owned set of known tool groups.
///
/// Readers share the lock; register and unregister take it exclusively and
/// swap whole `Arc<ToolGroup>` entries, so a lookup racing a writer sees
/// either the old or the new state.
#[derive(Debug, Default)]
pub struct ToolGroupRegistry {
    entries: RwLock<Entries>,
}

impl ToolGroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, group: ToolGroup) -> Result<(), RegistryError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        if entries.by_id.contains_key(&group.id) {
            debug!(tool_group = %group.id, "rejecting duplicate registration");
            return Err(RegistryError::DuplicateId(group.id));
        }

        info!(
            tool_group = %group.id,
            provider = %group.provider_id,
            transport = %group.transport_kind(),
            "registered tool group"
        );
        entries.order.push(group.id.clone());
        entries.by_id.insert(group.id.clone(), Arc::new(group));
        Ok(())
    }

    pub fn unregister(&self, id: &ToolGroupId) -> Result<ToolGroup, RegistryError> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let removed = entries
            .by_id
            .remove(id)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))?;
        entries.order.retain(|registered| registered != id);

        info!(tool_group = %id, "unregistered tool group");
        Ok(Arc::unwrap_or_clone(removed))
    }

    pub fn lookup(&self, id: &ToolGroupId) -> Result<ToolGroup, RegistryError> {
        self.get(id)
            .map(Arc::unwrap_or_clone)
            .ok_or_else(|| RegistryError::NotFound(id.clone()))
    }

    /// Shared handle to the registered entry, without cloning the group.
    pub fn get(&self, id: &ToolGroupId) -> Option<Arc<ToolGroup>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.by_id.get(id).cloned()
    }

    /// Snapshot of all groups in registration order.
    pub fn list(&self) -> ToolGroups {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let groups = entries
            .order
            .iter()
            .filter_map(|id| entries.by_id.get(id).cloned())
            .collect();
        ToolGroups { groups }
    }

    pub fn contains(&self, id: &ToolGroupId) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.by_id.contains_key(id)
    }

    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Point-in-time view returned by [`ToolGroupRegistry::list`]. Iteration is
/// lazy and can be restarted any number of times.
#[derive(Debug, Clone)]
pub struct ToolGroups {
    groups: Arc<[Arc<ToolGroup>]>,
}

impl ToolGroups {
    pub fn iter(&self) -> GroupIter<'_> {
        self.groups
            .iter()
            .map(deref_group as fn(&Arc<ToolGroup>) -> &ToolGroup)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn to_vec(&self) -> Vec<ToolGroup> {
        self.iter().cloned().collect()
    }
}

pub type GroupIter<'a> =
    std::iter::Map<std::slice::Iter<'a, Arc<ToolGroup>>, fn(&Arc<ToolGroup>) -> &ToolGroup>;

fn deref_group(group: &Arc<ToolGroup>) -> &ToolGroup {
    group
}

impl<'a> IntoIterator for &'a ToolGroups {
    type Item = &'a ToolGroup;
    type IntoIter = GroupIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use broker_core::Endpoint;
    use serde_json::json;
    use std::thread;

    fn id(raw: &str) -> ToolGroupId {
        ToolGroupId::parse(raw).unwrap()
    }

    fn docling() -> ToolGroup {
        ToolGroup::remote(
            id("mcp::docling"),
            "model-context-protocol",
            Endpoint::streaming_event("http://host.containers.internal:8000/sse"),
        )
    }

    #[test]
    fn should_fold_registry_errors_into_failed_results() {
        let registry = ToolGroupRegistry::new();
        registry.register(docling()).unwrap();

        let duplicate: ToolCallResult = registry.register(docling()).unwrap_err().into();
        assert_eq!(duplicate.failure_kind(), Some(FailureKind::DuplicateId));

        let missing: ToolCallResult = registry.unregister(&id("mcp::other")).unwrap_err().into();
        assert_eq!(missing.failure_kind(), Some(FailureKind::NotFound));
        assert_eq!(
            missing,
            ToolCallResult::failure(FailureKind::NotFound, "tool group 'mcp::other' is not registered")
        );
    }

    #[test]
    fn should_create_empty_registry() {
        let registry = ToolGroupRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.list().is_empty());
    }

    #[test]
    fn should_return_registered_group_unchanged() {
        let registry = ToolGroupRegistry::new();
        let group = docling().with_static_args(json!({"lang": "en"}).as_object().unwrap().clone());

        registry.register(group.clone()).unwrap();

        assert_eq!(registry.lookup(&group.id).unwrap(), group);
        assert!(registry.contains(&group.id));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn should_fail_duplicate_registration_and_keep_existing_entry() {
        let registry = ToolGroupRegistry::new();
        let original = docling();
        registry.register(original.clone()).unwrap();

        let replacement = ToolGroup::builtin(id("mcp::docling"), "math");
        let result = registry.register(replacement);

        assert_eq!(result, Err(RegistryError::DuplicateId(id("mcp::docling"))));
        assert_eq!(registry.lookup(&original.id).unwrap(), original);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn should_fail_lookup_for_unregistered_id() {
        let registry = ToolGroupRegistry::new();
        let result = registry.lookup(&id("tools::missing"));
        assert_eq!(result, Err(RegistryError::NotFound(id("tools::missing"))));
    }

    #[test]
    fn should_unregister_group() {
        let registry = ToolGroupRegistry::new();
        registry.register(docling()).unwrap();

        let removed = registry.unregister(&id("mcp::docling")).unwrap();

        assert_eq!(removed, docling());
        assert!(registry.is_empty());
        assert!(matches!(
            registry.lookup(&id("mcp::docling")),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn should_fail_to_unregister_unknown_group() {
        let registry = ToolGroupRegistry::new();
        assert_eq!(
            registry.unregister(&id("tools::math")),
            Err(RegistryError::NotFound(id("tools::math")))
        );
    }

    #[test]
    fn should_list_in_registration_order_and_restart_iteration() {
        let registry = ToolGroupRegistry::new();
        for raw in ["tools::zeta", "tools::alpha", "mcp::docling", "tools::mid"] {
            registry.register(ToolGroup::builtin(id(raw), "math")).unwrap();
        }
        registry.unregister(&id("tools::alpha")).unwrap();
        registry.register(ToolGroup::builtin(id("tools::alpha"), "math")).unwrap();

        let listing = registry.list();
        let first: Vec<&str> = listing.iter().map(|g| g.id.as_str()).collect();
        let second: Vec<&str> = (&listing).into_iter().map(|g| g.id.as_str()).collect();

        assert_eq!(
            first,
            vec!["tools::zeta", "mcp::docling", "tools::mid", "tools::alpha"]
        );
        assert_eq!(first, second);
    }

    #[test]
    fn should_keep_snapshot_stable_after_later_mutation() {
        let registry = ToolGroupRegistry::new();
        registry.register(docling()).unwrap();

        let listing = registry.list();
        registry.unregister(&id("mcp::docling")).unwrap();

        assert_eq!(listing.len(), 1);
        assert!(registry.list().is_empty());
    }

    #[test]
    fn should_never_observe_torn_groups_under_concurrent_writes() {
        let registry = Arc::new(ToolGroupRegistry::new());
        let ids: Vec<ToolGroupId> = (0..8).map(|n| id(&format!("load::group{n}"))).collect();

        // Every field of a group is derived from its id, so a torn entry
        // would show up as a mismatch.
        let make = |group_id: &ToolGroupId| {
            ToolGroup::remote(
                group_id.clone(),
                format!("provider-{}", group_id.name()),
                Endpoint::request_response(format!("http://localhost/{}", group_id.name())),
            )
            .with_static_args(
                json!({"owner": group_id.as_str()})
                    .as_object()
                    .unwrap()
                    .clone(),
            )
        };

        let writers: Vec<_> = (0..2)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let ids = ids.clone();
                thread::spawn(move || {
                    for round in 0..500 {
                        let group_id = &ids[round % ids.len()];
                        let _ = registry.register(make(group_id));
                        if round % 3 == 0 {
                            let _ = registry.unregister(group_id);
                        }
                    }
                })
            })
            .collect();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let ids = ids.clone();
                thread::spawn(move || {
                    for round in 0..2_000 {
                        let group_id = &ids[round % ids.len()];
                        if let Ok(group) = registry.lookup(group_id) {
                            assert_eq!(group, make(group_id));
                        }
                        for group in registry.list().iter() {
                            assert_eq!(group, &make(&group.id));
                        }
                    }
                })
            })
            .collect();

        for handle in writers.into_iter().chain(readers) {
            handle.join().unwrap();
        }
    }
}
