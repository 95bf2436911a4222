//! Process telemetry for the streaming server.
//!
//! Logs go to stdout through a `tracing` fmt layer filtered by `--log-filter`.
//! Metrics are recorded with the `metrics` macros and rendered by the
//! Prometheus handle behind `GET /metrics`. Spans can additionally be
//! exported to stdout through OpenTelemetry for local latency debugging of
//! the engine path.
//!
//! Metric names used across the crate:
//!
//! | name | kind |
//! |---|---|
//! | `beach_surf_sessions_active` | gauge |
//! | `beach_surf_frames_generated_total` | counter |
//! | `beach_surf_generation_ms` | histogram |
//! | `beach_surf_inputs_superseded_total` | counter |
//! | `beach_surf_resets_total{reason}` | counter |
//! | `beach_surf_decode_failures_total{reason}` | counter |
//! | `beach_surf_seed_fetch_failures_total` | counter |
//! | `beach_surf_warmup_ms` | histogram |

use anyhow::{Context, Result};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use opentelemetry::trace::TracerProvider;
use opentelemetry::KeyValue;
use opentelemetry_sdk::resource::Resource;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const SERVICE_NAME: &str = "beach-surf";

/// Owns the installed recorder and the optional span exporter. Dropping it
/// flushes pending spans, so `main` keeps it alive until shutdown.
pub struct Telemetry {
    metrics: PrometheusHandle,
    spans: Option<SdkTracerProvider>,
}

impl Telemetry {
    pub fn init(log_filter: &str, otel_stdout: bool) -> Result<Self> {
        let metrics = PrometheusBuilder::new()
            .install_recorder()
            .context("failed to install Prometheus metrics recorder")?;

        let filter = EnvFilter::try_new(log_filter)
            .with_context(|| format!("invalid log filter: {log_filter}"))?;
        let spans = otel_stdout.then(stdout_span_provider);
        let otel_layer = spans.as_ref().map(|provider| {
            tracing_opentelemetry::layer().with_tracer(provider.tracer(SERVICE_NAME))
        });

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(otel_layer)
            .try_init()
            .context("failed to initialise tracing subscriber")?;

        if let Some(provider) = &spans {
            opentelemetry::global::set_tracer_provider(provider.clone());
            info!(service = SERVICE_NAME, "span export to stdout enabled");
        }
        Ok(Self { metrics, spans })
    }

    pub fn metrics_handle(&self) -> PrometheusHandle {
        self.metrics.clone()
    }
}

impl Drop for Telemetry {
    fn drop(&mut self) {
        let Some(provider) = self.spans.take() else {
            return;
        };
        if let Err(err) = provider.shutdown() {
            warn!(error = %err, "span exporter did not shut down cleanly");
        }
    }
}

fn stdout_span_provider() -> SdkTracerProvider {
    SdkTracerProvider::builder()
        .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
        .with_sampler(Sampler::AlwaysOn)
        .with_resource(
            Resource::builder()
                .with_attributes(vec![KeyValue::new("service.name", SERVICE_NAME)])
                .build(),
        )
        .build()
}
