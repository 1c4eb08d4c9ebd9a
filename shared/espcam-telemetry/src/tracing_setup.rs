//! Tracing Setup

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{TelemetryConfig, TelemetryError};

/// Install the global subscriber: `log_level` as an `EnvFilter` directive,
/// JSON lines or plain text depending on `json_logs`.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = EnvFilter::try_new(&config.log_level).map_err(|e| {
        TelemetryError::TracingInit(format!("invalid log filter {:?}: {}", config.log_level, e))
    })?;

    let json = config
        .json_logs
        .then(|| fmt::layer().json().with_target(true));
    let plain = (!config.json_logs).then(|| fmt::layer().with_target(true));

    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(plain)
        .try_init()
        .map_err(|e| TelemetryError::TracingInit(e.to_string()))?;

    tracing::info!(
        service = %config.service_name,
        filter = %config.log_level,
        json = config.json_logs,
        "Logging ready"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_rejected_before_install() {
        let config = TelemetryConfig::new("svc", "gateway=notalevel", false);
        assert!(matches!(
            init_tracing(&config),
            Err(TelemetryError::TracingInit(msg)) if msg.contains("invalid log filter")
        ));
    }
}
