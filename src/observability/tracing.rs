//! Distributed tracing support.
//!
//! # Responsibilities
//! - Resolve the configured sampler (Always, Never, Probability)
//! - Optionally build an exporter shipping span batches to Jaeger
//! - Hand out a tracing context for request handlers
//! - Flush buffered spans exactly once on shutdown
//!
//! # Design Decisions
//! - The context is passed to handlers explicitly; no global tracer provider
//! - Unrecognized sampler types sample nothing
//! - Spans reach Jaeger over OTLP/HTTP, its native OTLP receiver
//! - Export failures are logged by the SDK and never reach request handling

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;

use base64::prelude::{Engine as _, BASE64_STANDARD};
use opentelemetry::trace::{Tracer, TracerProvider as _};
use opentelemetry::KeyValue;
use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::trace::{
    BatchConfigBuilder, BatchSpanProcessor, Sampler, SdkTracer, SdkTracerProvider, Span,
};
use opentelemetry_sdk::Resource;
use thiserror::Error;
use url::Url;

use crate::config::{JaegerConfig, TracingConfig};

/// Instrumentation scope name of the proxy's spans.
const TRACER_NAME: &str = "trickster";

/// Error type for tracing bootstrap.
#[derive(Debug, Error)]
pub enum TracingError {
    #[error("invalid jaeger endpoint '{endpoint}': {source}")]
    Endpoint {
        endpoint: String,
        #[source]
        source: url::ParseError,
    },

    #[error("failed to build span exporter: {0}")]
    Exporter(#[from] opentelemetry_otlp::ExporterBuildError),
}

/// Resolved sampling policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplerPolicy {
    Always,
    Never,
    Probability(f64),
}

impl SamplerPolicy {
    /// Resolve `sampler_type`; unrecognized values behave like `Never`.
    pub fn from_config(sampler_type: &str, fraction: f64) -> Self {
        match sampler_type {
            "Always" => SamplerPolicy::Always,
            "Probability" => SamplerPolicy::Probability(fraction),
            "Never" => SamplerPolicy::Never,
            other => {
                tracing::warn!(sampler_type = other, "Unrecognized sampler type, sampling nothing");
                SamplerPolicy::Never
            }
        }
    }

    fn sampler(self) -> Sampler {
        match self {
            SamplerPolicy::Always => Sampler::AlwaysOn,
            SamplerPolicy::Never => Sampler::AlwaysOff,
            SamplerPolicy::Probability(fraction) => Sampler::TraceIdRatioBased(fraction),
        }
    }
}

/// Where sampled spans go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExporterKind {
    Jaeger,
    None,
}

impl ExporterKind {
    pub fn from_config(exporter: &str) -> Self {
        match exporter {
            "Jaeger" => ExporterKind::Jaeger,
            "None" | "" => ExporterKind::None,
            other => {
                tracing::warn!(exporter = other, "Unrecognized trace exporter, spans will not be exported");
                ExporterKind::None
            }
        }
    }
}

/// Tracing state shared with request handlers.
#[derive(Clone)]
pub struct TracingContext {
    tracer: SdkTracer,
    policy: SamplerPolicy,
    exporter: ExporterKind,
}

impl fmt::Debug for TracingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracingContext")
            .field("policy", &self.policy)
            .field("exporter", &self.exporter)
            .finish()
    }
}

impl TracingContext {
    pub fn policy(&self) -> SamplerPolicy {
        self.policy
    }

    pub fn exporter(&self) -> ExporterKind {
        self.exporter
    }

    /// Start a span; sampling follows the installed policy.
    pub fn start_span(&self, name: impl Into<Cow<'static, str>>) -> Span {
        self.tracer.start(name)
    }
}

/// Flushes and closes the exporter. Runs at most once, on drop at the latest.
pub struct TracingShutdown {
    provider: Option<SdkTracerProvider>,
}

impl TracingShutdown {
    /// Flush buffered spans and close the exporter. No-op without an exporter
    /// or when already called.
    pub fn shutdown(&mut self) {
        let Some(provider) = self.provider.take() else {
            return;
        };
        if let Err(e) = provider.force_flush() {
            tracing::warn!(detail = %e, "Failed to flush spans");
        }
        if let Err(e) = provider.shutdown() {
            tracing::warn!(detail = %e, "Failed to shut down span exporter");
        }
        tracing::info!("Tracing exporter flushed");
    }

    pub fn has_exporter(&self) -> bool {
        self.provider.is_some()
    }
}

impl Drop for TracingShutdown {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Output of a successful bootstrap.
pub struct TracingBootstrap {
    pub context: TracingContext,
    pub shutdown: TracingShutdown,
}

/// Resolve the sampling policy and, when configured, the export pipeline.
pub fn bootstrap(config: &TracingConfig) -> Result<TracingBootstrap, TracingError> {
    let policy = SamplerPolicy::from_config(&config.sampler_type, config.sampler_fraction);
    let exporter = ExporterKind::from_config(&config.exporter);

    let builder = SdkTracerProvider::builder().with_sampler(policy.sampler());
    let (provider, exporting) = match exporter {
        ExporterKind::Jaeger => {
            let processor = jaeger_processor(&config.jaeger)?;
            let provider = builder
                .with_resource(jaeger_resource(&config.jaeger))
                .with_span_processor(processor)
                .build();
            (provider, true)
        }
        ExporterKind::None => (builder.build(), false),
    };

    tracing::info!(sampler = ?policy, exporter = ?exporter, "Tracing initialized");

    Ok(TracingBootstrap {
        context: TracingContext {
            tracer: provider.tracer(TRACER_NAME),
            policy,
            exporter,
        },
        shutdown: TracingShutdown {
            provider: exporting.then_some(provider),
        },
    })
}

/// Collector URL when set, otherwise the OTLP path on the agent address.
pub fn jaeger_endpoint(config: &JaegerConfig) -> Result<Url, TracingError> {
    let endpoint = if config.collector_endpoint.is_empty() {
        format!("http://{}/v1/traces", config.agent_endpoint)
    } else {
        config.collector_endpoint.clone()
    };
    Url::parse(&endpoint).map_err(|source| TracingError::Endpoint { endpoint, source })
}

fn jaeger_processor(config: &JaegerConfig) -> Result<BatchSpanProcessor, TracingError> {
    let endpoint = jaeger_endpoint(config)?;

    let mut headers = HashMap::new();
    if !config.username.is_empty() {
        let credentials = format!("{}:{}", config.username, config.password);
        headers.insert(
            "Authorization".to_string(),
            format!("Basic {}", BASE64_STANDARD.encode(credentials)),
        );
    }

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_http()
        .with_endpoint(endpoint.as_str())
        .with_headers(headers)
        .build()?;

    let mut batch = BatchConfigBuilder::default();
    if config.buffer_max_count > 0 {
        batch = batch.with_max_queue_size(config.buffer_max_count);
    }

    tracing::info!(endpoint = %endpoint, process = %config.process, "Jaeger exporter configured");
    Ok(BatchSpanProcessor::builder(exporter)
        .with_batch_config(batch.build())
        .build())
}

fn jaeger_resource(config: &JaegerConfig) -> Resource {
    Resource::builder()
        .with_service_name(config.process.clone())
        .with_attributes(
            config
                .tags
                .iter()
                .map(|(key, value)| KeyValue::new(key.clone(), value.clone())),
        )
        .build()
}
