use anyhow::{Context, Error, Result};
use once_cell::sync::OnceCell;
use opentelemetry::{KeyValue, global, trace::TracerProvider};
use opentelemetry_sdk::{
    Resource,
    trace::{RandomIdGenerator, Sampler, SdkTracer, SdkTracerProvider},
};
use tracing::info;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

static TRACING_INIT: OnceCell<()> = OnceCell::new();

/// 終了時に未送信のスパンをフラッシュするためのガード。
///
/// OTLPエクスポーターが有効な場合のみプロバイダーを保持する。
#[derive(Debug, Default)]
#[must_use = "dropping the guard immediately shuts down span export"]
pub struct TelemetryGuard {
    provider: Option<SdkTracerProvider>,
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if let Some(provider) = self.provider.take() {
            if let Err(error) = provider.shutdown() {
                eprintln!("failed to shut down tracer provider: {error}");
            }
        }
    }
}

/// Tracing サブスクライバを一度だけ初期化する。
///
/// `RUST_LOG_FORMAT=json`（デフォルト）の場合はJSON形式、それ以外は人間向けの形式で出力します。
/// `OTEL_EXPORTER_OTLP_ENDPOINT` が設定されている場合、OTLPエクスポーターでスパンも送信します。
/// エクスポーターの初期化に失敗した場合はログ出力のみで続行します。
///
/// # Errors
/// サブスクライバの初期化に失敗した場合はエラーを返す。
pub fn init(service_name: &'static str) -> Result<TelemetryGuard> {
    let mut guard = TelemetryGuard::default();

    TRACING_INIT.get_or_try_init(|| {
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let fmt_layer = fmt_layer();

        let otel_endpoint = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok();
        let tracer = otel_endpoint
            .as_deref()
            .map(|endpoint| init_tracer(service_name, endpoint));

        match tracer {
            Some(Ok((tracer, provider))) => {
                tracing_subscriber::registry()
                    .with(fmt_layer)
                    .with(env_filter)
                    .with(tracing_opentelemetry::layer().with_tracer(tracer))
                    .try_init()
                    .map_err(|e| Error::msg(e.to_string()))?;
                guard.provider = Some(provider);
                info!(
                    otel_enabled = true,
                    endpoint = otel_endpoint.as_deref().unwrap_or_default(),
                    "tracing initialized with OpenTelemetry"
                );
            }
            Some(Err(e)) => {
                tracing_subscriber::registry()
                    .with(fmt_layer)
                    .with(env_filter)
                    .try_init()
                    .map_err(|e| Error::msg(e.to_string()))?;
                info!(
                    otel_enabled = false,
                    error = %e,
                    "tracing initialized without OpenTelemetry (init failed)"
                );
            }
            None => {
                tracing_subscriber::registry()
                    .with(fmt_layer)
                    .with(env_filter)
                    .try_init()
                    .map_err(|e| Error::msg(e.to_string()))?;
            }
        }

        Ok::<(), Error>(())
    })?;

    Ok(guard)
}

fn fmt_layer() -> Box<dyn Layer<Registry> + Send + Sync> {
    let use_json = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(true);

    if use_json {
        fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_target(false)
            .boxed()
    } else {
        fmt::layer().with_target(false).boxed()
    }
}

/// OTLPエクスポーター経由でOpenTelemetryトレーサーを初期化する。
///
/// サンプリング比率は `OTEL_SAMPLING_RATIO` 環境変数で制御（デフォルト1.0 = 全トレース）。
fn init_tracer(service_name: &'static str, endpoint: &str) -> Result<(SdkTracer, SdkTracerProvider)> {
    use opentelemetry_otlp::WithExportConfig;

    let sampling_ratio = std::env::var("OTEL_SAMPLING_RATIO")
        .ok()
        .and_then(|s| s.parse::<f64>().ok())
        .unwrap_or(1.0);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()
        .context("failed to build OTLP span exporter")?;

    let resource = Resource::builder()
        .with_attributes([
            KeyValue::new("service.name", service_name),
            KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
        ])
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(Sampler::TraceIdRatioBased(sampling_ratio))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    let tracer = provider.tracer(service_name);
    global::set_tracer_provider(provider.clone());

    Ok((tracer, provider))
}
