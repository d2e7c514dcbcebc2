//! Resource kinds understood by the controller.
//!
//! The registry is assembled once at startup and shared read-only afterwards.

use std::collections::HashMap;
use std::fmt;

pub const CONNECTOR_API_VERSION: &str = "kafkaconnect.kcsync.io/v1alpha1";
pub const PROVIDER_API_VERSION: &str = "kcsync.io/v1alpha1";
pub const CORE_API_VERSION: &str = "v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Connector,
    ProviderConfig,
    Secret,
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResourceKind::Connector => "Connector",
            ResourceKind::ProviderConfig => "ProviderConfig",
            ResourceKind::Secret => "Secret",
        };
        f.write_str(s)
    }
}

/// Maps `(apiVersion, kind)` to a [`ResourceKind`].
#[derive(Debug, Clone)]
pub struct Registry {
    kinds: HashMap<(String, String), ResourceKind>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::builder()
            .register(CONNECTOR_API_VERSION, "Connector", ResourceKind::Connector)
            .register(
                PROVIDER_API_VERSION,
                "ProviderConfig",
                ResourceKind::ProviderConfig,
            )
            .register(CORE_API_VERSION, "Secret", ResourceKind::Secret)
            .build()
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    pub fn lookup(&self, api_version: &str, kind: &str) -> Option<ResourceKind> {
        self.kinds
            .get(&(api_version.to_string(), kind.to_string()))
            .copied()
    }

    /// Registered `apiVersion/kind` pairs, sorted.
    pub fn registered(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .kinds
            .keys()
            .map(|(version, kind)| format!("{}/{}", version, kind))
            .collect();
        all.sort();
        all
    }
}

#[derive(Debug, Default)]
pub struct RegistryBuilder {
    kinds: HashMap<(String, String), ResourceKind>,
}

impl RegistryBuilder {
    pub fn register(mut self, api_version: &str, kind: &str, resource: ResourceKind) -> Self {
        self.kinds
            .insert((api_version.to_string(), kind.to_string()), resource);
        self
    }

    pub fn build(self) -> Registry {
        Registry { kinds: self.kinds }
    }
}
