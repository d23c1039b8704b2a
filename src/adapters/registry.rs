//! Registry of capable adapters.
//!
//! Availability is a capability, not a type discriminator (§9 Design
//! Notes): the registry holds a set of adapters and the council simply
//! skips whichever ones report themselves unavailable.

use dashmap::DashMap;
use std::sync::Arc;

use crate::adapters::ILLMAdapter;
use crate::domain::CouncilMember;

/// Thread-safe registry mapping council members to their adapters.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: DashMap<CouncilMember, Arc<dyn ILLMAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self {
            adapters: DashMap::new(),
        }
    }

    pub fn register(&self, adapter: Arc<dyn ILLMAdapter>) {
        self.adapters.insert(adapter.member(), adapter);
    }

    pub fn get(&self, member: CouncilMember) -> Option<Arc<dyn ILLMAdapter>> {
        self.adapters.get(&member).map(|e| e.value().clone())
    }

    /// Adapters for the requested members that are both registered and
    /// currently available, in stable member order.
    pub fn available(&self, members: &[CouncilMember]) -> Vec<Arc<dyn ILLMAdapter>> {
        let mut sorted = members.to_vec();
        sorted.sort();
        sorted
            .into_iter()
            .filter_map(|m| self.get(m))
            .filter(|a| a.is_available())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::{ClientConfig, HttpModelAdapter};

    #[test]
    fn unregistered_member_yields_no_adapter() {
        let registry = AdapterRegistry::new();
        assert!(registry.get(CouncilMember::Tyr).is_none());
    }

    #[test]
    fn available_filters_out_unconfigured_adapters() {
        let registry = AdapterRegistry::new();
        registry.register(Arc::new(HttpModelAdapter::new(
            CouncilMember::Kvasir,
            "model-a",
            ClientConfig::new(None),
        )));
        let available = registry.available(&[CouncilMember::Kvasir, CouncilMember::Tyr]);
        assert!(available.is_empty());
    }
}
