//! Fault CRD discovery registry
//!
//! The fault objects an experiment drives are Chaos Mesh custom resources
//! whose served version depends on the installed Chaos Mesh release. The
//! registry resolves their `ApiResource`s once at startup and is handed to
//! the controller context explicitly.

use dashmap::DashMap;
use kube::discovery::{ApiResource, Discovery};
use kube::Client;
use tracing::{info, warn};

use crate::kube_utils::{build_api_resource, find_discovered_resource};

/// Third-party fault CRDs the chaos controller writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrdKind {
    /// PodChaos (chaos-mesh.org)
    PodChaos,
    /// NetworkChaos (chaos-mesh.org)
    NetworkChaos,
}

/// All CrdKind variants for iteration.
const ALL_CRD_KINDS: &[CrdKind] = &[CrdKind::PodChaos, CrdKind::NetworkChaos];

impl CrdKind {
    /// API group for discovery lookup.
    pub fn group(&self) -> &'static str {
        match self {
            Self::PodChaos | Self::NetworkChaos => "chaos-mesh.org",
        }
    }

    /// Kubernetes Kind string for discovery lookup.
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::PodChaos => "PodChaos",
            Self::NetworkChaos => "NetworkChaos",
        }
    }

    /// API version used when discovery fails entirely.
    pub fn hardcoded_api_version(&self) -> &'static str {
        match self {
            Self::PodChaos | Self::NetworkChaos => "chaos-mesh.org/v1alpha1",
        }
    }
}

/// Cache of discovered fault CRD API versions.
///
/// Created once at startup and shared via `Arc<CrdRegistry>`.
pub struct CrdRegistry {
    client: Client,
    entries: DashMap<CrdKind, ApiResource>,
}

impl CrdRegistry {
    /// Run API discovery once and populate all known fault CRDs.
    ///
    /// When discovery itself fails, every kind falls back to its hardcoded
    /// version so the controller can still start.
    pub async fn discover(client: Client) -> Self {
        let entries = DashMap::new();

        match Discovery::new(client.clone()).run().await {
            Ok(discovery) => {
                for kind in ALL_CRD_KINDS {
                    if let Some(ar) =
                        find_discovered_resource(&discovery, kind.group(), kind.kind_str())
                    {
                        entries.insert(*kind, ar);
                    }
                }
                info!(
                    discovered = entries.len(),
                    total = ALL_CRD_KINDS.len(),
                    "fault CRD registry populated via API discovery"
                );
            }
            Err(e) => {
                warn!(error = %e, "API discovery failed, falling back to hardcoded fault CRD versions");
                for kind in ALL_CRD_KINDS {
                    entries.insert(
                        *kind,
                        build_api_resource(kind.hardcoded_api_version(), kind.kind_str()),
                    );
                }
            }
        }

        Self { client, entries }
    }

    /// Get a fault CRD, running lazy re-discovery if it was missing at startup.
    ///
    /// Returns `None` only if the CRD is still not installed after re-discovery.
    pub async fn resolve(&self, kind: CrdKind) -> Option<ApiResource> {
        if let Some(ar) = self.entries.get(&kind) {
            return Some(ar.clone());
        }

        info!(
            kind = kind.kind_str(),
            group = kind.group(),
            "fault CRD missing at startup, attempting lazy discovery"
        );

        self.rediscover().await;
        self.entries.get(&kind).map(|r| r.clone())
    }

    /// Re-run discovery and insert newly-installed CRDs; existing entries stay.
    async fn rediscover(&self) {
        let discovery = match Discovery::new(self.client.clone()).run().await {
            Ok(d) => d,
            Err(e) => {
                warn!(error = %e, "fault CRD re-discovery failed");
                return;
            }
        };

        let mut newly_found = 0u32;
        for kind in ALL_CRD_KINDS {
            if self.entries.contains_key(kind) {
                continue;
            }
            if let Some(ar) = find_discovered_resource(&discovery, kind.group(), kind.kind_str()) {
                self.entries.insert(*kind, ar);
                newly_found += 1;
            }
        }

        if newly_found > 0 {
            info!(newly_found, "fault CRD re-discovery found new CRDs");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crd_kind_group_and_kind_are_consistent() {
        for kind in ALL_CRD_KINDS {
            assert!(!kind.kind_str().is_empty(), "{:?} has empty kind", kind);
            assert!(
                kind.hardcoded_api_version().starts_with(kind.group()),
                "{:?}: api_version '{}' doesn't start with group '{}'",
                kind,
                kind.hardcoded_api_version(),
                kind.group()
            );
        }
    }

    #[test]
    fn hardcoded_resources_use_uncountable_plurals() {
        let ar = build_api_resource(
            CrdKind::PodChaos.hardcoded_api_version(),
            CrdKind::PodChaos.kind_str(),
        );
        assert_eq!(ar.plural, "podchaos");
        assert_eq!(ar.api_version, "chaos-mesh.org/v1alpha1");
    }

    #[test]
    fn all_crd_kinds_is_exhaustive() {
        assert_eq!(ALL_CRD_KINDS.len(), 2);
    }
}
