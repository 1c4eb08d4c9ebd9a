//! Upload orchestration
//!
//! receive bytes → resolve pool → inference → filter → update store →
//! archive/backup (best effort) → respond.
//!
//! Only an empty body, an unknown device, a failed spool write or a failed
//! inference call end the request early. Archive and backup failures are
//! logged and counted but never change the response.

use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use espcam_core::{now_secs, DeviceId};
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::GitHubConfig;
use crate::content_store::{ContentStore, ContentStoreError};
use crate::detection::{filter, parse_detections, DetectedObject};
use crate::store::Snapshot;
use crate::{AppState, Error, Result};

/// Uploaded image written to the spool directory for the inference call.
///
/// The file is removed when the value is dropped or discarded, on every path.
pub struct SpooledImage {
    file: NamedTempFile,
    filename: String,
}

impl SpooledImage {
    pub fn create(dir: &Path, device: &DeviceId, bytes: &[u8]) -> std::io::Result<Self> {
        let filename = format!("{}_{}.jpg", device, now_secs());
        let mut file = tempfile::Builder::new()
            .prefix(&format!("{}_", device))
            .suffix(".jpg")
            .tempfile_in(dir)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(Self { file, filename })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// Name used for the archived copy, `<esp_id>_<unix_secs>.jpg`
    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn discard(self) {
        let path = self.file.path().to_path_buf();
        match self.file.close() {
            Ok(()) => debug!(path = %path.display(), "Spooled image removed"),
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove spooled image"),
        }
    }
}

/// Remote repository settings used after a successful upload
#[derive(Clone)]
pub struct RemoteSync {
    pub store: Arc<dyn ContentStore>,
    pub image_folder: String,
    pub results_path: String,
    pub archive_images: bool,
    pub remote_backup: bool,
}

impl RemoteSync {
    pub fn new(store: Arc<dyn ContentStore>, config: &GitHubConfig) -> Self {
        Self {
            store,
            image_folder: config.image_folder.clone(),
            results_path: config.results_path.clone(),
            archive_images: config.archive_images,
            remote_backup: config.remote_backup,
        }
    }

    pub fn image_path(&self, device: &DeviceId, filename: &str) -> String {
        if self.image_folder.is_empty() {
            format!("{}/{}", device, filename)
        } else {
            format!("{}/{}/{}", self.image_folder, device, filename)
        }
    }

    async fn archive_image(
        &self,
        device: &DeviceId,
        filename: &str,
        bytes: &[u8],
    ) -> std::result::Result<(), ContentStoreError> {
        let path = self.image_path(device, filename);
        let message = format!("upload from {} ({})", device, filename);
        self.store.put(&path, bytes, &message, None).await
    }
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub status: &'static str,
    pub esp_id: DeviceId,
    pub pool: String,
    pub filename: String,
    pub detected_this_esp: u64,
    pub total_detected_pool: u64,
    pub total_detected_all_esp: u64,
    pub per_pool: BTreeMap<String, u64>,
    pub per_esp: Snapshot,
    pub objects: Vec<DetectedObject>,
}

pub async fn process_upload(
    state: &AppState,
    device: DeviceId,
    body: Bytes,
) -> Result<UploadResponse> {
    state.metrics.uploads.inc();

    if body.is_empty() {
        state.metrics.rejected.inc();
        return Err(Error::InvalidInput);
    }

    let pool = match state.pools.resolve(&device) {
        Ok(pool) => pool,
        Err(e) => {
            state.metrics.rejected.inc();
            warn!(esp_id = %device, "Upload from unregistered device");
            return Err(e);
        }
    };

    info!(esp_id = %device, pool = %pool.name, bytes = body.len(), "Upload received");

    let spooled =
        SpooledImage::create(&state.spool_dir, &device, &body).map_err(Error::ImageSpool)?;
    let filename = spooled.filename().to_string();

    let started = Instant::now();
    let inference = state.inference.infer(pool, spooled.path()).await;
    state
        .metrics
        .inference_latency_ms
        .record(started.elapsed().as_secs_f64() * 1000.0);
    spooled.discard();

    let result = inference.map_err(|e| {
        state.metrics.inference_failures.inc();
        Error::from(e)
    })?;

    let detections = parse_detections(&result);
    let matched = filter(&detections, &pool.target_label, pool.confidence_threshold);
    let count = matched.len() as u64;
    state.metrics.detections.add(count);

    debug!(
        esp_id = %device,
        predictions = detections.len(),
        matched = count,
        target = %pool.target_label,
        "Inference filtered"
    );

    let store = state.store.clone();
    let (store_device, pool_name) = (device.clone(), pool.name.clone());
    tokio::task::spawn_blocking(move || store.update(&store_device, &pool_name, count))
        .await
        .map_err(|e| Error::Internal(e.to_string()))?;

    let summary = state.store.summarize(&state.pools);

    if let Some(remote) = &state.remote {
        sync_remote(state, remote, &device, &filename, &body).await;
    }

    info!(esp_id = %device, pool = %pool.name, detected = count, "Upload processed");

    Ok(UploadResponse {
        status: "ok",
        esp_id: device,
        pool: pool.name.clone(),
        filename,
        detected_this_esp: count,
        total_detected_pool: summary.per_pool.get(&pool.name).copied().unwrap_or(0),
        total_detected_all_esp: summary.total_all_esp,
        per_pool: summary.per_pool,
        per_esp: summary.per_esp,
        objects: matched.iter().map(DetectedObject::from).collect(),
    })
}

/// Archive the image and back up the results file. Failures are logged and
/// counted only.
async fn sync_remote(
    state: &AppState,
    remote: &RemoteSync,
    device: &DeviceId,
    filename: &str,
    bytes: &[u8],
) {
    let archive = async {
        if remote.archive_images {
            Some(remote.archive_image(device, filename, bytes).await)
        } else {
            None
        }
    };
    let backup = async {
        if remote.remote_backup {
            Some(state.store.backup_to(remote.store.as_ref(), &remote.results_path).await)
        } else {
            None
        }
    };

    let (archived, backed_up) = tokio::join!(archive, backup);

    match archived {
        Some(Ok(())) => debug!(esp_id = %device, filename = %filename, "Image archived"),
        Some(Err(e)) => {
            state.metrics.archive_failures.inc();
            warn!(esp_id = %device, filename = %filename, error = %e, "Image archive failed");
        }
        None => {}
    }

    match backed_up {
        Some(Ok(())) => debug!(path = %remote.results_path, "Results backed up"),
        Some(Err(e)) => {
            state.metrics.backup_failures.inc();
            warn!(path = %remote.results_path, error = %e, "Results backup failed");
        }
        None => {}
    }
}
