//! Capability registry: the catalog of invokable operations.
//!
//! Registration is per provider and atomic: either every capability in the
//! bundle is stored or none is. Listing operations return point-in-time
//! snapshots, never live views, so callers can iterate while other
//! connections mutate the catalog.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::core::audit::{AuditEvent, AuditEventType, AuditSink};
use crate::core::capability::{CapabilityDescriptor, CapabilityManifest, ProviderDescriptor};
use crate::errors::HostlinkError;

struct ProviderEntry {
    descriptor: ProviderDescriptor,
    capability_ids: Vec<String>,
}

#[derive(Default)]
struct RegistryState {
    capabilities: HashMap<String, Arc<CapabilityDescriptor>>,
    providers: HashMap<String, ProviderEntry>,
}

/// Thread-safe catalog of providers and their capabilities.
pub struct CapabilityRegistry {
    state: RwLock<RegistryState>,
    audit: Arc<dyn AuditSink>,
}

impl CapabilityRegistry {
    pub fn new(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            audit,
        }
    }

    /// Register a provider and all of its capabilities atomically.
    ///
    /// Fails with `DuplicateCapability` if any id is already registered;
    /// the registry is left unchanged in that case.
    pub fn register(
        &self,
        provider: ProviderDescriptor,
        capabilities: Vec<CapabilityDescriptor>,
    ) -> Result<(), HostlinkError> {
        self.register_with(provider, capabilities, false)
    }

    /// Like [`register`](Self::register), but with explicit control over
    /// whether existing ids may be replaced.
    pub fn register_with(
        &self,
        provider: ProviderDescriptor,
        capabilities: Vec<CapabilityDescriptor>,
        overwrite: bool,
    ) -> Result<(), HostlinkError> {
        let capability_count = capabilities.len();
        let provider_id = provider.id.clone();

        // Ids must be unique within the bundle itself, regardless of
        // overwrite mode.
        let mut seen = std::collections::HashSet::with_capacity(capability_count);
        for capability in &capabilities {
            if !seen.insert(capability.id.as_str()) {
                return Err(HostlinkError::DuplicateCapability(capability.id.clone()));
            }
        }

        {
            let mut state = self.state.write();

            if !overwrite {
                for capability in &capabilities {
                    if state.capabilities.contains_key(&capability.id) {
                        return Err(HostlinkError::DuplicateCapability(capability.id.clone()));
                    }
                }
                if state.providers.contains_key(&provider_id) {
                    return Err(HostlinkError::DuplicateProvider(provider_id));
                }
            }

            let mut capability_ids = Vec::with_capacity(capability_count);
            for mut capability in capabilities {
                capability.provider_id = provider_id.clone();
                capability_ids.push(capability.id.clone());
                state
                    .capabilities
                    .insert(capability.id.clone(), Arc::new(capability));
            }
            state.providers.insert(
                provider_id.clone(),
                ProviderEntry {
                    descriptor: provider,
                    capability_ids,
                },
            );
        }

        tracing::info!(provider_id = %provider_id, capability_count, "provider registered");
        self.audit.record(AuditEvent::provider(
            AuditEventType::ProviderRegistered,
            &provider_id,
            capability_count,
        ));
        Ok(())
    }

    /// Remove a provider and all of its capabilities atomically.
    /// A no-op for unknown provider ids.
    pub fn unregister(&self, provider_id: &str) {
        let removed = {
            let mut state = self.state.write();
            match state.providers.remove(provider_id) {
                Some(entry) => {
                    for id in &entry.capability_ids {
                        state.capabilities.remove(id);
                    }
                    Some(entry.capability_ids.len())
                }
                None => None,
            }
        };

        if let Some(capability_count) = removed {
            tracing::info!(provider_id, capability_count, "provider unregistered");
            self.audit.record(AuditEvent::provider(
                AuditEventType::ProviderUnregistered,
                provider_id,
                capability_count,
            ));
        }
    }

    /// Resolve a capability by id.
    pub fn lookup(&self, capability_id: &str) -> Result<Arc<CapabilityDescriptor>, HostlinkError> {
        self.state
            .read()
            .capabilities
            .get(capability_id)
            .cloned()
            .ok_or_else(|| HostlinkError::CapabilityNotFound(capability_id.to_string()))
    }

    /// Snapshot of all capability manifests.
    pub fn list_capabilities(&self) -> Vec<CapabilityManifest> {
        self.state
            .read()
            .capabilities
            .values()
            .map(|c| c.manifest())
            .collect()
    }

    /// Snapshot of all capability descriptors (handlers included).
    pub fn list_descriptors(&self) -> Vec<Arc<CapabilityDescriptor>> {
        self.state.read().capabilities.values().cloned().collect()
    }

    /// Snapshot of all provider descriptors.
    pub fn list_providers(&self) -> Vec<ProviderDescriptor> {
        self.state
            .read()
            .providers
            .values()
            .map(|e| e.descriptor.clone())
            .collect()
    }

    /// Number of registered capabilities.
    pub fn len(&self) -> usize {
        self.state.read().capabilities.len()
    }

    /// Whether the registry holds no capabilities.
    pub fn is_empty(&self) -> bool {
        self.state.read().capabilities.is_empty()
    }
}
