//! Component and endpoint registries.
//!
//! The component registry is append-only for the life of a session:
//! status transitions mutate entries in place, nothing ever deletes one.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use synapse_types::component::{ComponentState, ComponentStatus, ServiceEndpoint};

/// Thread-safe registry of component status records.
#[derive(Debug, Clone, Default)]
pub struct ComponentRegistry {
    components: Arc<RwLock<HashMap<String, ComponentStatus>>>,
}

impl ComponentRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a component record.
    pub fn register(&self, status: ComponentStatus) {
        let mut components = self.components.write().unwrap_or_else(|e| e.into_inner());
        components.insert(status.id.clone(), status);
    }

    /// Whether a component is registered.
    pub fn contains(&self, id: &str) -> bool {
        let components = self.components.read().unwrap_or_else(|e| e.into_inner());
        components.contains_key(id)
    }

    /// Snapshot of a component.
    pub fn get(&self, id: &str) -> Option<ComponentStatus> {
        let components = self.components.read().unwrap_or_else(|e| e.into_inner());
        components.get(id).cloned()
    }

    /// Snapshot of every component.
    pub fn all(&self) -> Vec<ComponentStatus> {
        let components = self.components.read().unwrap_or_else(|e| e.into_inner());
        components.values().cloned().collect()
    }

    /// Update a component's state, leaving the rest of the record intact.
    pub fn mark_state(&self, id: &str, state: ComponentState) {
        let mut components = self.components.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = components.get_mut(id) {
            entry.state = state;
        }
    }

    /// Refresh a component's heartbeat timestamp to now.
    pub fn touch_heartbeat(&self, id: &str) {
        let mut components = self.components.write().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = components.get_mut(id) {
            entry.last_heartbeat = Utc::now();
        }
    }

    /// Number of components currently online.
    pub fn online_count(&self) -> usize {
        let components = self.components.read().unwrap_or_else(|e| e.into_inner());
        components
            .values()
            .filter(|c| c.state == ComponentState::Online)
            .count()
    }

    /// Total registered components (any state).
    pub fn total_count(&self) -> usize {
        let components = self.components.read().unwrap_or_else(|e| e.into_inner());
        components.len()
    }
}

/// Thread-safe registry of static endpoint descriptors.
#[derive(Debug, Clone, Default)]
pub struct EndpointRegistry {
    endpoints: Arc<RwLock<HashMap<String, ServiceEndpoint>>>,
}

impl EndpointRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace an endpoint descriptor.
    pub fn register(&self, endpoint: ServiceEndpoint) {
        let mut endpoints = self.endpoints.write().unwrap_or_else(|e| e.into_inner());
        endpoints.insert(endpoint.component_id.clone(), endpoint);
    }

    /// Snapshot of one endpoint.
    pub fn get(&self, component_id: &str) -> Option<ServiceEndpoint> {
        let endpoints = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
        endpoints.get(component_id).cloned()
    }

    /// Snapshot of every registered endpoint.
    pub fn all(&self) -> Vec<ServiceEndpoint> {
        let endpoints = self.endpoints.read().unwrap_or_else(|e| e.into_inner());
        endpoints.values().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status(id: &str, state: ComponentState) -> ComponentStatus {
        ComponentStatus::new(id, id, state)
    }

    #[test]
    fn test_register_and_get() {
        let registry = ComponentRegistry::new();
        registry.register(status("wallet", ComponentState::Online));
        let got = registry.get("wallet").unwrap();
        assert_eq!(got.state, ComponentState::Online);
    }

    #[test]
    fn test_mark_offline_keeps_record() {
        let registry = ComponentRegistry::new();
        let mut record = status("wallet", ComponentState::Online);
        record.capabilities = vec!["balance".to_string()];
        registry.register(record);

        registry.mark_state("wallet", ComponentState::Offline);
        let got = registry.get("wallet").unwrap();
        assert_eq!(got.state, ComponentState::Offline);
        // The rest of the record survives the transition.
        assert_eq!(got.capabilities, vec!["balance".to_string()]);
        assert_eq!(registry.total_count(), 1);
    }

    #[test]
    fn test_online_count() {
        let registry = ComponentRegistry::new();
        registry.register(status("a", ComponentState::Online));
        registry.register(status("b", ComponentState::Offline));
        registry.register(status("c", ComponentState::Connecting));
        assert_eq!(registry.online_count(), 1);
        assert_eq!(registry.total_count(), 3);
    }

    #[test]
    fn test_touch_heartbeat() {
        let registry = ComponentRegistry::new();
        registry.register(status("a", ComponentState::Online).with_zeroed_heartbeat());
        assert_eq!(registry.get("a").unwrap().last_heartbeat.timestamp(), 0);
        registry.touch_heartbeat("a");
        assert!(registry.get("a").unwrap().last_heartbeat.timestamp() > 0);
    }
}
