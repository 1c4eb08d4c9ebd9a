//! Detection Gateway
//!
//! Receives JPEG uploads from ESP32-CAM units and:
//! - Resolves the device's pool (target label + confidence threshold)
//! - Runs Roboflow object detection on the image
//! - Keeps the latest matched count per device, persisted locally
//! - Archives images and backs up the counts to a GitHub repository

mod config;
mod content_store;
mod detection;
mod error;
mod handlers;
mod inference;
mod metrics;
mod pool;
mod routes;
mod store;
mod upload;


use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use espcam_core::{
    DependencyStatus, EspcamError, EspcamService, HealthStatus, MicroserviceRuntime,
    ReadinessStatus,
};
use espcam_telemetry::TelemetryConfig;
use tracing::info;

pub use config::DetectionConfig;
pub use error::{Error, Result};

use content_store::GitHubContentStore;
use inference::{InferenceBackend, RoboflowClient};
use metrics::UploadMetrics;
use pool::PoolResolver;
use store::ResultsStore;
use upload::RemoteSync;

const SERVICE_ID: &str = "detection-gateway";

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub pools: Arc<PoolResolver>,
    pub store: Arc<ResultsStore>,
    pub inference: Arc<dyn InferenceBackend>,
    pub remote: Option<RemoteSync>,
    pub metrics: Arc<UploadMetrics>,
    pub spool_dir: Arc<PathBuf>,
    pub start_time: Instant,
}

impl AppState {
    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            service_id: SERVICE_ID.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    pub fn readiness(&self) -> ReadinessStatus {
        let results_dir = match self.store.path().parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.is_dir(),
            _ => true,
        };
        let spool_dir = self.spool_dir.is_dir();

        let mut dependencies = vec![
            DependencyStatus {
                name: "results_file".to_string(),
                available: results_dir,
                latency_ms: None,
            },
            DependencyStatus {
                name: "spool_dir".to_string(),
                available: spool_dir,
                latency_ms: None,
            },
        ];
        if self.remote.is_some() {
            dependencies.push(DependencyStatus {
                name: "github".to_string(),
                available: true,
                latency_ms: None,
            });
        }

        ReadinessStatus {
            ready: results_dir && spool_dir && !self.pools.is_empty(),
            dependencies,
        }
    }
}

#[tokio::main]
async fn main() -> espcam_core::Result<()> {
    let config = DetectionConfig::from_env()?;

    let telemetry = TelemetryConfig::new(
        &config.service.service_name,
        &config.service.log_level,
        config.service.json_logs,
    );
    espcam_telemetry::init_tracing(&telemetry)
        .map_err(|e| EspcamError::Internal(e.to_string()))?;

    info!("Starting Detection Gateway");
    let service = Arc::new(DetectionGatewayService::new(config).await?);
    MicroserviceRuntime::run(service).await
}

/// Detection Gateway service
pub struct DetectionGatewayService {
    config: DetectionConfig,
    state: AppState,
}

impl DetectionGatewayService {
    pub async fn new(config: DetectionConfig) -> espcam_core::Result<Self> {
        let inference = RoboflowClient::new(&config.roboflow)
            .map_err(|e| EspcamError::Config(format!("Roboflow client: {}", e)))?;

        let remote = match &config.github {
            Some(github) => {
                let store = GitHubContentStore::new(github)
                    .map_err(|e| EspcamError::Config(format!("GitHub client: {}", e)))?;
                Some(RemoteSync::new(Arc::new(store), github))
            }
            None => {
                info!("GITHUB_TOKEN not set, remote archive and backup disabled");
                None
            }
        };

        std::fs::create_dir_all(&config.spool_dir)
            .map_err(|e| EspcamError::Config(format!("Cannot create SPOOL_DIR: {}", e)))?;

        let fallback = remote
            .as_ref()
            .map(|r| (r.store.as_ref(), r.results_path.as_str()));
        let store = ResultsStore::load(config.results_file.clone(), fallback).await;

        info!(
            pools = config.pools.len(),
            devices = config.pools.iter().map(|p| p.member_device_ids.len()).sum::<usize>(),
            "Pools configured"
        );

        let state = AppState {
            pools: Arc::new(PoolResolver::new(config.pools.clone())),
            store: Arc::new(store),
            inference: Arc::new(inference),
            remote,
            metrics: Arc::new(UploadMetrics::new()),
            spool_dir: Arc::new(config.spool_dir.clone()),
            start_time: Instant::now(),
        };

        Ok(Self { config, state })
    }
}

#[async_trait::async_trait]
impl EspcamService for DetectionGatewayService {
    fn service_id(&self) -> &'static str {
        SERVICE_ID
    }

    async fn health(&self) -> HealthStatus {
        self.state.health()
    }

    async fn ready(&self) -> ReadinessStatus {
        self.state.readiness()
    }

    async fn shutdown(&self) -> espcam_core::Result<()> {
        info!(
            devices = self.state.store.snapshot().len(),
            "Shutting down Detection Gateway"
        );
        Ok(())
    }

    async fn start(&self) -> espcam_core::Result<()> {
        let bind = &self.config.service.http_bind;
        info!(http = %bind, "Starting Detection Gateway");

        let app = routes::create_router(self.state.clone());

        let listener = tokio::net::TcpListener::bind(bind.as_str()).await?;
        info!("Detection Gateway listening on {}", bind);
        axum::serve(listener, app).await?;

        Ok(())
    }
}
