//! Pool resolution
//!
//! A pool is a named group of camera units sharing one detection target and
//! confidence threshold. Pools partition the set of known devices.

use std::collections::BTreeSet;

use espcam_core::DeviceId;
use serde::Serialize;

use crate::{Error, Result};

/// Roboflow endpoint a pool's images are sent to
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum UpstreamTarget {
    /// Serverless workflow within a workspace
    Workflow { workspace: String, workflow_id: String },
    /// Hosted model, addressed as `<project>/<version>`
    Model { model_id: String },
}

/// Static configuration of one pool
#[derive(Debug, Clone, Serialize)]
pub struct PoolConfig {
    pub name: String,
    pub member_device_ids: BTreeSet<DeviceId>,
    pub upstream: UpstreamTarget,
    pub target_label: String,
    pub confidence_threshold: f64,
    #[serde(skip_serializing)]
    pub api_key: String,
}

impl PoolConfig {
    pub fn contains(&self, device: &DeviceId) -> bool {
        self.member_device_ids.contains(device)
    }
}

/// Maps device identifiers to their pool
#[derive(Debug, Clone)]
pub struct PoolResolver {
    pools: Vec<PoolConfig>,
}

impl PoolResolver {
    pub fn new(pools: Vec<PoolConfig>) -> Self {
        Self { pools }
    }

    /// Find the pool a device belongs to. First match wins.
    pub fn resolve(&self, device: &DeviceId) -> Result<&PoolConfig> {
        self.pools
            .iter()
            .find(|pool| pool.contains(device))
            .ok_or_else(|| Error::UnknownDevice(device.clone()))
    }

    pub fn pools(&self) -> &[PoolConfig] {
        &self.pools
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn pool(name: &str, ids: &[&str], label: &str, threshold: f64) -> PoolConfig {
        PoolConfig {
            name: name.to_string(),
            member_device_ids: ids.iter().map(|id| DeviceId::new(id)).collect(),
            upstream: UpstreamTarget::Workflow {
                workspace: "my-workspace".to_string(),
                workflow_id: format!("{}-workflow", name),
            },
            target_label: label.to_string(),
            confidence_threshold: threshold,
            api_key: "test-key".to_string(),
        }
    }

    pub(crate) fn lobster_pools() -> PoolResolver {
        PoolResolver::new(vec![
            pool(
                "anakan",
                &["esp_1", "esp_2", "esp_3", "esp_4"],
                "panulirus ornatus - juvenile",
                0.6,
            ),
            pool("induk", &["esp_5", "esp_6"], "panulirus ornatus - female", 0.5),
        ])
    }

    #[test]
    fn test_resolve_known_device() {
        let resolver = lobster_pools();
        let pool = resolver.resolve(&DeviceId::new("esp_5")).unwrap();
        assert_eq!(pool.name, "induk");
    }

    #[test]
    fn test_resolve_is_case_insensitive() {
        let resolver = lobster_pools();
        let pool = resolver.resolve(&DeviceId::new("ESP_2")).unwrap();
        assert_eq!(pool.name, "anakan");
    }

    #[test]
    fn test_resolve_unknown_device() {
        let resolver = lobster_pools();
        let err = resolver.resolve(&DeviceId::new("esp_99")).unwrap_err();
        assert!(matches!(err, Error::UnknownDevice(id) if id.as_str() == "esp_99"));
    }

    #[test]
    fn test_first_matching_pool_wins() {
        let resolver = PoolResolver::new(vec![
            pool("first", &["esp_1"], "a", 0.5),
            pool("second", &["esp_1"], "b", 0.5),
        ]);
        assert_eq!(resolver.resolve(&DeviceId::new("esp_1")).unwrap().name, "first");
    }

    #[test]
    fn test_api_key_not_serialized() {
        let json = serde_json::to_value(pool("anakan", &["esp_1"], "a", 0.5)).unwrap();
        assert!(json.get("api_key").is_none());
        assert_eq!(json["upstream"]["mode"], "workflow");
    }
}
