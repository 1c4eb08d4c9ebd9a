//! Remote content store
//!
//! Files kept in a GitHub repository through the contents API. Reads return
//! the blob `sha`; writes pass it back so an overwrite only succeeds against
//! the revision that was read.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::GitHubConfig;

#[derive(Debug, Error)]
pub enum ContentStoreError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Write conflict on {0}")]
    Conflict(String),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),
}

/// A file read from the remote store
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteContent {
    pub content: Vec<u8>,
    pub sha: Option<String>,
}

/// Key/value blob store with optimistic concurrency
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Read a file, `None` when it does not exist.
    async fn get(&self, path: &str) -> Result<Option<RemoteContent>, ContentStoreError>;

    /// Create or overwrite a file. `sha` must be the revision last read when
    /// the file already exists.
    async fn put(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        sha: Option<&str>,
    ) -> Result<(), ContentStoreError>;
}

/// GitHub contents API client
pub struct GitHubContentStore {
    client: Client,
    api_url: String,
    repo: String,
    branch: Option<String>,
    token: String,
}

#[derive(Deserialize)]
struct ContentsResponse {
    #[serde(default)]
    content: String,
    sha: Option<String>,
}

#[derive(Serialize)]
struct PutContentsRequest<'a> {
    message: &'a str,
    content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    sha: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    branch: Option<&'a str>,
}

impl GitHubContentStore {
    pub fn new(config: &GitHubConfig) -> Result<Self, ContentStoreError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(concat!("espcam-detection-gateway/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            repo: config.repo.clone(),
            branch: config.branch.clone(),
            token: config.token.clone(),
        })
    }

    fn contents_url(&self, path: &str) -> String {
        format!(
            "{}/repos/{}/contents/{}",
            self.api_url,
            self.repo,
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, self.contents_url(path))
            .header("Authorization", format!("token {}", self.token))
            .header("Accept", "application/vnd.github.v3+json")
    }
}

/// Decode the base64 payload of a contents response. GitHub wraps it at 60
/// columns.
pub fn decode_content(encoded: &str) -> Result<Vec<u8>, ContentStoreError> {
    let compact: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|e| ContentStoreError::Decode(e.to_string()))
}

#[async_trait]
impl ContentStore for GitHubContentStore {
    async fn get(&self, path: &str) -> Result<Option<RemoteContent>, ContentStoreError> {
        let mut request = self.request(reqwest::Method::GET, path);
        if let Some(branch) = &self.branch {
            request = request.query(&[("ref", branch.as_str())]);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            debug!(path = %path, "Remote file not found");
            return Ok(None);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ContentStoreError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let contents: ContentsResponse = response.json().await?;
        Ok(Some(RemoteContent {
            content: decode_content(&contents.content)?,
            sha: contents.sha,
        }))
    }

    async fn put(
        &self,
        path: &str,
        content: &[u8],
        message: &str,
        sha: Option<&str>,
    ) -> Result<(), ContentStoreError> {
        let request = PutContentsRequest {
            message,
            content: STANDARD.encode(content),
            sha,
            branch: self.branch.as_deref(),
        };

        let response = self
            .request(reqwest::Method::PUT, path)
            .json(&request)
            .send()
            .await?;
        let status = response.status();

        match status {
            s if s.is_success() => {
                debug!(path = %path, status = s.as_u16(), "Remote file written");
                Ok(())
            }
            // stale or missing sha
            StatusCode::CONFLICT | StatusCode::UNPROCESSABLE_ENTITY => {
                Err(ContentStoreError::Conflict(path.to_string()))
            }
            _ => {
                let body = response.text().await.unwrap_or_default();
                Err(ContentStoreError::Api {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory store that versions files with a counter-based sha
    #[derive(Default)]
    pub(crate) struct MemoryContentStore {
        pub files: Mutex<HashMap<String, (Vec<u8>, String)>>,
        pub revisions: AtomicUsize,
        pub fail_writes: bool,
        pub fail_reads: bool,
        /// Number of upcoming writes rejected as if another writer got there first
        pub conflicts: AtomicUsize,
        pub puts: AtomicUsize,
    }

    impl MemoryContentStore {
        pub(crate) fn with_file(path: &str, content: &[u8]) -> Self {
            let store = Self::default();
            store
                .files
                .lock()
                .insert(path.to_string(), (content.to_vec(), "rev-0".to_string()));
            store
        }

        pub(crate) fn content(&self, path: &str) -> Option<Vec<u8>> {
            self.files.lock().get(path).map(|(c, _)| c.clone())
        }
    }

    #[async_trait]
    impl ContentStore for MemoryContentStore {
        async fn get(&self, path: &str) -> Result<Option<RemoteContent>, ContentStoreError> {
            if self.fail_reads {
                return Err(ContentStoreError::Api {
                    status: 500,
                    body: "unavailable".to_string(),
                });
            }
            Ok(self.files.lock().get(path).map(|(content, sha)| RemoteContent {
                content: content.clone(),
                sha: Some(sha.clone()),
            }))
        }

        async fn put(
            &self,
            path: &str,
            content: &[u8],
            _message: &str,
            sha: Option<&str>,
        ) -> Result<(), ContentStoreError> {
            self.puts.fetch_add(1, Ordering::SeqCst);
            if self.fail_writes {
                return Err(ContentStoreError::Api {
                    status: 500,
                    body: "unavailable".to_string(),
                });
            }
            let pending = self.conflicts.load(Ordering::SeqCst);
            if pending > 0 {
                self.conflicts.store(pending - 1, Ordering::SeqCst);
                return Err(ContentStoreError::Conflict(path.to_string()));
            }
            let mut files = self.files.lock();
            let current = files.get(path).map(|(_, s)| s.as_str());
            if current != sha {
                return Err(ContentStoreError::Conflict(path.to_string()));
            }
            let rev = self.revisions.fetch_add(1, Ordering::SeqCst) + 1;
            files.insert(path.to_string(), (content.to_vec(), format!("rev-{}", rev)));
            Ok(())
        }
    }

    #[test]
    fn test_decode_content_ignores_line_breaks() {
        let encoded = "eyJlc3Bf\nMSI6IDN9\n";
        assert_eq!(decode_content(encoded).unwrap(), br#"{"esp_1": 3}"#.to_vec());
    }

    #[test]
    fn test_decode_content_rejects_garbage() {
        assert!(matches!(decode_content("***"), Err(ContentStoreError::Decode(_))));
    }

    #[test]
    fn test_put_request_omits_missing_sha() {
        let request = PutContentsRequest {
            message: "upload",
            content: "aGk=".to_string(),
            sha: None,
            branch: None,
        };
        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("sha").is_none());
        assert!(json.get("branch").is_none());
    }

    #[test]
    fn test_contents_url() {
        let store = GitHubContentStore::new(&GitHubConfig {
            api_url: "https://api.github.com/".to_string(),
            token: "t".to_string(),
            repo: "owner/esp32-cam".to_string(),
            branch: None,
            image_folder: "images".to_string(),
            results_path: "esp_results.json".to_string(),
            archive_images: true,
            remote_backup: true,
            timeout_secs: 15,
        })
        .unwrap();
        assert_eq!(
            store.contents_url("/images/esp_1/a.jpg"),
            "https://api.github.com/repos/owner/esp32-cam/contents/images/esp_1/a.jpg"
        );
    }

    #[tokio::test]
    async fn test_memory_store_enforces_sha() {
        let store = MemoryContentStore::with_file("f.json", b"{}");
        assert!(matches!(
            store.put("f.json", b"x", "m", None).await,
            Err(ContentStoreError::Conflict(_))
        ));
        store.put("f.json", b"x", "m", Some("rev-0")).await.unwrap();
        assert_eq!(store.content("f.json").unwrap(), b"x".to_vec());
    }
}
