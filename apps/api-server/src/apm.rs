//! APM export for New Relic.
//!
//! New Relic ingests OpenTelemetry natively, so when the binary is built with
//! the `apm` feature and `ENABLE_NEW_RELIC` is true, every tracing span (the
//! per-request `http_request` span in particular) is exported over OTLP/HTTP
//! with the license key as the `api-key` header, optionally through
//! `NEW_RELIC_PROXY_URL`.
//!
//! Without the feature the layer is always absent; an enabled toggle only
//! produces a warning at startup.

use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::Layer;

use crate::config::ApmConfig;

/// Outcome of APM setup, logged once tracing is initialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApmStatus {
    Disabled,
    Enabled,
    Failed(String),
    NotCompiled,
}

pub fn log_status(status: &ApmStatus) {
    match status {
        ApmStatus::Disabled => tracing::info!("New Relic DISABLED"),
        ApmStatus::Enabled => tracing::info!("New Relic ENABLED"),
        ApmStatus::Failed(e) => tracing::error!(err = %e, "enabling New Relic failed"),
        ApmStatus::NotCompiled => tracing::warn!(
            "ENABLE_NEW_RELIC is set but this binary was built without the `apm` feature"
        ),
    }
}

/// Build the export layer for the subscriber stack, if APM is on.
#[cfg(feature = "apm")]
pub fn layer<S>(cfg: &ApmConfig) -> (Option<impl Layer<S>>, ApmStatus)
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    if !cfg.enabled {
        return (None, ApmStatus::Disabled);
    }
    match otlp::build_tracer(cfg) {
        Ok(tracer) => (
            Some(tracing_opentelemetry::layer().with_tracer(tracer)),
            ApmStatus::Enabled,
        ),
        Err(e) => (None, ApmStatus::Failed(e)),
    }
}

#[cfg(not(feature = "apm"))]
pub fn layer<S>(cfg: &ApmConfig) -> (Option<impl Layer<S>>, ApmStatus)
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let status = if cfg.enabled {
        ApmStatus::NotCompiled
    } else {
        ApmStatus::Disabled
    };
    (None::<tracing_subscriber::layer::Identity>, status)
}

/// Flush pending spans.
#[cfg(feature = "apm")]
pub fn shutdown() {
    opentelemetry::global::shutdown_tracer_provider();
}

/// No-op shutdown when APM is not compiled in
#[cfg(not(feature = "apm"))]
pub fn shutdown() {}

#[cfg(feature = "apm")]
mod otlp {
    use std::collections::HashMap;

    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry::KeyValue;
    use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};
    use opentelemetry_sdk::trace::{Tracer, TracerProvider};
    use opentelemetry_sdk::Resource;

    use crate::config::ApmConfig;

    pub(super) fn build_tracer(cfg: &ApmConfig) -> Result<Tracer, String> {
        let license_key = cfg
            .license_key
            .as_deref()
            .ok_or_else(|| "NEW_RELIC_LICENSE_KEY is not set".to_string())?;

        let mut client = reqwest::Client::builder();
        if let Some(proxy) = &cfg.proxy_url {
            let proxy = reqwest::Proxy::all(proxy.as_str())
                .map_err(|e| format!("invalid proxy: {e}"))?;
            client = client.proxy(proxy);
        }
        let client = client
            .build()
            .map_err(|e| format!("http client: {e}"))?;

        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_http()
            .with_http_client(client)
            .with_endpoint(cfg.endpoint.clone())
            .with_headers(HashMap::from([(
                "api-key".to_string(),
                license_key.to_string(),
            )]))
            .build()
            .map_err(|e| format!("otlp exporter: {e}"))?;

        let resource = Resource::new(vec![KeyValue::new("service.name", cfg.app_name.clone())]);
        let provider = TracerProvider::builder()
            .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
            .with_resource(resource)
            .build();
        let tracer = provider.tracer("api-server");

        // Keep the provider alive for the process lifetime; dropping it stops export.
        let _ = opentelemetry::global::set_tracer_provider(provider);
        Ok(tracer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::Registry;

    fn apm(enabled: bool) -> ApmConfig {
        ApmConfig {
            enabled,
            toggle_error: None,
            license_key: None,
            proxy_url: None,
            proxy_error: None,
            app_name: "user-api".into(),
            endpoint: "http://127.0.0.1:4318/v1/traces".into(),
        }
    }

    #[test]
    fn disabled_toggle_builds_no_layer() {
        let (layer, status) = layer::<Registry>(&apm(false));
        assert!(layer.is_none());
        assert_eq!(status, ApmStatus::Disabled);
    }

    #[cfg(not(feature = "apm"))]
    #[test]
    fn enabled_toggle_without_feature_is_reported() {
        let (layer, status) = layer::<Registry>(&apm(true));
        assert!(layer.is_none());
        assert_eq!(status, ApmStatus::NotCompiled);
    }

    #[cfg(feature = "apm")]
    #[test]
    fn enabled_toggle_without_license_key_fails() {
        let (layer, status) = layer::<Registry>(&apm(true));
        assert!(layer.is_none());
        assert!(matches!(status, ApmStatus::Failed(_)));
    }
}
