//! Configuration for the Detection Gateway
//!
//! Everything is read from the environment once at startup. Missing or
//! invalid required settings abort startup.

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;

use espcam_core::{DeviceId, EspcamError, Result, ServiceConfig};
use serde::Deserialize;
use validator::Validate;

use crate::pool::{PoolConfig, UpstreamTarget};

/// Detection Gateway configuration
#[derive(Debug, Clone)]
pub struct DetectionConfig {
    /// Bind address, service name and logging settings
    pub service: ServiceConfig,
    pub roboflow: RoboflowConfig,
    /// Remote repository; archive, backup and restore are off without it
    pub github: Option<GitHubConfig>,
    /// Local results snapshot
    pub results_file: PathBuf,
    /// Directory for spooled upload images
    pub spool_dir: PathBuf,
    pub pools: Vec<PoolConfig>,
}

#[derive(Debug, Clone)]
pub struct RoboflowConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub model_api_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    pub api_url: String,
    pub token: String,
    /// `owner/name`
    pub repo: String,
    pub branch: Option<String>,
    pub image_folder: String,
    pub results_path: String,
    pub archive_images: bool,
    pub remote_backup: bool,
    pub timeout_secs: u64,
}

/// Upstream call style of a pool
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamMode {
    #[default]
    Workflow,
    Model,
}

/// Pool entry as written in `POOLS_CONFIG` / `POOLS_FILE`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PoolSpec {
    #[validate(length(min = 1))]
    pub name: String,
    #[validate(length(min = 1))]
    pub esp_ids: Vec<String>,
    #[serde(default)]
    pub mode: UpstreamMode,
    #[serde(default)]
    pub workspace: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub model_id: Option<String>,
    #[validate(length(min = 1))]
    pub target_label: String,
    #[validate(range(min = 0.0, max = 1.0))]
    pub confidence_threshold: f64,
    /// Environment variable holding this pool's API key
    #[serde(default)]
    pub api_key_env: Option<String>,
}

impl DetectionConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let var_or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let roboflow = RoboflowConfig {
            api_key: var("ROBOFLOW_API_KEY"),
            api_url: var_or("ROBOFLOW_API_URL", "https://serverless.roboflow.com"),
            model_api_url: var_or("ROBOFLOW_MODEL_API_URL", "https://detect.roboflow.com"),
            timeout_secs: parse_var(&var, "INFERENCE_TIMEOUT_SECS", 15)?,
        };

        let github = match var("GITHUB_TOKEN") {
            Some(token) => Some(GitHubConfig {
                api_url: var_or("GITHUB_API_URL", "https://api.github.com"),
                token,
                repo: var("GITHUB_REPO").ok_or_else(|| {
                    EspcamError::Config(
                        "GITHUB_REPO is required when GITHUB_TOKEN is set".to_string(),
                    )
                })?,
                branch: var("GITHUB_BRANCH"),
                image_folder: var_or("GITHUB_IMAGE_FOLDER", "images")
                    .trim_matches('/')
                    .to_string(),
                results_path: var_or("GITHUB_RESULTS_PATH", "esp_results.json"),
                archive_images: parse_var(&var, "ARCHIVE_IMAGES", true)?,
                remote_backup: parse_var(&var, "REMOTE_BACKUP", true)?,
                timeout_secs: parse_var(&var, "GITHUB_TIMEOUT_SECS", 15)?,
            }),
            None => None,
        };

        let pools_json = match (var("POOLS_CONFIG"), var("POOLS_FILE")) {
            (Some(inline), _) => inline,
            (None, Some(path)) => std::fs::read_to_string(&path).map_err(|e| {
                EspcamError::Config(format!("Cannot read POOLS_FILE {}: {}", path, e))
            })?,
            (None, None) => {
                return Err(EspcamError::Config(
                    "POOLS_CONFIG or POOLS_FILE must be set".to_string(),
                ))
            }
        };
        let specs: Vec<PoolSpec> = serde_json::from_str(&pools_json)
            .map_err(|e| EspcamError::Config(format!("Invalid pool configuration: {}", e)))?;
        let pools = build_pools(specs, roboflow.api_key.as_deref(), &var)?;

        Ok(Self {
            service: ServiceConfig::from_lookup("detection-gateway", &var)?,
            roboflow,
            github,
            results_file: PathBuf::from(var_or("RESULTS_FILE", "esp_results.json")),
            spool_dir: var("SPOOL_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(std::env::temp_dir),
            pools,
        })
    }
}

fn parse_var<F, T>(var: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match var(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| EspcamError::Config(format!("Invalid {}: {}", key, e))),
        None => Ok(default),
    }
}

/// Validate pool entries and resolve their API keys.
pub fn build_pools<F>(
    specs: Vec<PoolSpec>,
    default_api_key: Option<&str>,
    var: &F,
) -> Result<Vec<PoolConfig>>
where
    F: Fn(&str) -> Option<String>,
{
    if specs.is_empty() {
        return Err(EspcamError::Config("At least one pool must be configured".to_string()));
    }

    let mut names = BTreeSet::new();
    let mut owners: HashMap<DeviceId, String> = HashMap::new();
    let mut pools = Vec::with_capacity(specs.len());

    for spec in specs {
        spec.validate()
            .map_err(|e| EspcamError::Config(format!("Pool {:?}: {}", spec.name, e)))?;

        if !names.insert(spec.name.clone()) {
            return Err(EspcamError::Config(format!("Duplicate pool name {:?}", spec.name)));
        }

        let member_device_ids: BTreeSet<DeviceId> =
            spec.esp_ids.iter().map(DeviceId::new).collect();
        for device in &member_device_ids {
            if let Some(owner) = owners.insert(device.clone(), spec.name.clone()) {
                return Err(EspcamError::Config(format!(
                    "Device {} is assigned to both {:?} and {:?}",
                    device, owner, spec.name
                )));
            }
        }

        let upstream = match spec.mode {
            UpstreamMode::Workflow => UpstreamTarget::Workflow {
                workspace: require(spec.workspace.as_ref(), &spec.name, "workspace")?,
                workflow_id: require(spec.workflow_id.as_ref(), &spec.name, "workflow_id")?,
            },
            UpstreamMode::Model => UpstreamTarget::Model {
                model_id: require(spec.model_id.as_ref(), &spec.name, "model_id")?,
            },
        };

        let api_key = match &spec.api_key_env {
            Some(env_key) => var(env_key).ok_or_else(|| {
                EspcamError::Config(format!(
                    "Pool {:?} expects its API key in {}",
                    spec.name, env_key
                ))
            })?,
            None => default_api_key
                .map(str::to_string)
                .ok_or_else(|| EspcamError::Config("ROBOFLOW_API_KEY is required".to_string()))?,
        };

        pools.push(PoolConfig {
            name: spec.name,
            member_device_ids,
            upstream,
            target_label: spec.target_label,
            confidence_threshold: spec.confidence_threshold,
            api_key,
        });
    }

    Ok(pools)
}

fn require(value: Option<&String>, pool: &str, field: &str) -> Result<String> {
    value
        .filter(|v| !v.trim().is_empty())
        .cloned()
        .ok_or_else(|| EspcamError::Config(format!("Pool {:?} is missing {}", pool, field)))
}

#[cfg(test)]
mod tests {
    use super::*;

    const POOLS: &str = r#"[
        {
            "name": "anakan",
            "esp_ids": ["ESP_1", "esp_2"],
            "workspace": "my-workspace",
            "workflow_id": "detect-count-and-visualize",
            "target_label": "panulirus ornatus - juvenile",
            "confidence_threshold": 0.6
        },
        {
            "name": "induk",
            "esp_ids": ["esp_3"],
            "mode": "model",
            "model_id": "lobster/3",
            "target_label": "panulirus ornatus - female",
            "confidence_threshold": 0.5,
            "api_key_env": "ROBOFLOW_API_KEY_INDUK"
        }
    ]"#;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_loads_pools_and_defaults() {
        let config = DetectionConfig::from_lookup(lookup(&[
            ("ROBOFLOW_API_KEY", "global"),
            ("ROBOFLOW_API_KEY_INDUK", "induk-key"),
            ("POOLS_CONFIG", POOLS),
        ]))
        .unwrap();

        assert_eq!(config.pools.len(), 2);
        assert!(config.github.is_none());
        assert_eq!(config.results_file, PathBuf::from("esp_results.json"));
        assert_eq!(config.roboflow.timeout_secs, 15);
        assert_eq!(config.service.http_bind, "0.0.0.0:5000");
        assert_eq!(config.service.service_name, "detection-gateway");

        let anakan = &config.pools[0];
        assert!(anakan.contains(&DeviceId::new("esp_1")));
        assert_eq!(anakan.api_key, "global");

        let induk = &config.pools[1];
        assert_eq!(induk.api_key, "induk-key");
        assert_eq!(
            induk.upstream,
            UpstreamTarget::Model {
                model_id: "lobster/3".to_string()
            }
        );
    }

    #[test]
    fn test_pools_are_required() {
        let err = DetectionConfig::from_lookup(lookup(&[("ROBOFLOW_API_KEY", "k")])).unwrap_err();
        assert!(matches!(err, EspcamError::Config(_)));
    }

    #[test]
    fn test_api_key_is_required() {
        let pools = r#"[{"name": "a", "esp_ids": ["esp_1"], "workspace": "w", "workflow_id": "f",
                         "target_label": "x", "confidence_threshold": 0.5}]"#;
        let err = DetectionConfig::from_lookup(lookup(&[("POOLS_CONFIG", pools)])).unwrap_err();
        assert!(err.to_string().contains("ROBOFLOW_API_KEY"));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let pools = r#"[{"name": "a", "esp_ids": ["esp_1"], "workspace": "w", "workflow_id": "f",
                         "target_label": "x", "confidence_threshold": 1.5}]"#;
        let err = DetectionConfig::from_lookup(lookup(&[
            ("ROBOFLOW_API_KEY", "k"),
            ("POOLS_CONFIG", pools),
        ]))
        .unwrap_err();
        assert!(matches!(err, EspcamError::Config(_)));
    }

    #[test]
    fn test_overlapping_pools_rejected() {
        let pools = r#"[
            {"name": "a", "esp_ids": ["esp_1"], "workspace": "w", "workflow_id": "f",
             "target_label": "x", "confidence_threshold": 0.5},
            {"name": "b", "esp_ids": ["ESP_1"], "workspace": "w", "workflow_id": "f",
             "target_label": "x", "confidence_threshold": 0.5}
        ]"#;
        let err = DetectionConfig::from_lookup(lookup(&[
            ("ROBOFLOW_API_KEY", "k"),
            ("POOLS_CONFIG", pools),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("esp_1"));
    }

    #[test]
    fn test_workflow_pool_needs_workflow_id() {
        let pools = r#"[{"name": "a", "esp_ids": ["esp_1"], "workspace": "w",
                         "target_label": "x", "confidence_threshold": 0.5}]"#;
        let err = DetectionConfig::from_lookup(lookup(&[
            ("ROBOFLOW_API_KEY", "k"),
            ("POOLS_CONFIG", pools),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("workflow_id"));
    }

    #[test]
    fn test_github_requires_repo() {
        let err = DetectionConfig::from_lookup(lookup(&[
            ("ROBOFLOW_API_KEY", "k"),
            ("ROBOFLOW_API_KEY_INDUK", "k2"),
            ("POOLS_CONFIG", POOLS),
            ("GITHUB_TOKEN", "ghp_x"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("GITHUB_REPO"));
    }

    #[test]
    fn test_github_settings() {
        let config = DetectionConfig::from_lookup(lookup(&[
            ("ROBOFLOW_API_KEY", "k"),
            ("ROBOFLOW_API_KEY_INDUK", "k2"),
            ("POOLS_CONFIG", POOLS),
            ("GITHUB_TOKEN", "ghp_x"),
            ("GITHUB_REPO", "owner/esp32-cam"),
            ("GITHUB_IMAGE_FOLDER", "/captures/"),
            ("REMOTE_BACKUP", "false"),
        ]))
        .unwrap();

        let github = config.github.unwrap();
        assert_eq!(github.image_folder, "captures");
        assert!(!github.remote_backup);
        assert!(github.archive_images);
    }

    #[test]
    fn test_invalid_number_rejected() {
        let err = DetectionConfig::from_lookup(lookup(&[
            ("ROBOFLOW_API_KEY", "k"),
            ("ROBOFLOW_API_KEY_INDUK", "k2"),
            ("POOLS_CONFIG", POOLS),
            ("INFERENCE_TIMEOUT_SECS", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("INFERENCE_TIMEOUT_SECS"));
    }
}
