//! Configuration shared by every service

use crate::error::{EspcamError, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub service_name: String,
    pub http_bind: String,
    pub log_level: String,
    pub json_logs: bool,
}

impl ServiceConfig {
    /// Build from an arbitrary variable lookup. `HTTP_BIND` wins over `PORT`,
    /// which is bound on all interfaces.
    pub fn from_lookup<F>(default_name: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let http_bind = match lookup("HTTP_BIND") {
            Some(bind) => bind,
            None => {
                let port: u16 = lookup("PORT")
                    .unwrap_or_else(|| "5000".to_string())
                    .trim()
                    .parse()
                    .map_err(|e| EspcamError::Config(format!("Invalid PORT: {}", e)))?;
                format!("0.0.0.0:{}", port)
            }
        };

        Ok(Self {
            service_name: lookup("SERVICE_NAME").unwrap_or_else(|| default_name.to_string()),
            http_bind,
            log_level: lookup("RUST_LOG").unwrap_or_else(|| "info".to_string()),
            json_logs: lookup("JSON_LOGS")
                .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1"))
                .unwrap_or(true),
        })
    }
}
