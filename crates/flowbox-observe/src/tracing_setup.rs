//! Tracing subscriber initialization with human or JSON log lines and
//! optional OpenTelemetry span export.
//!
//! # Usage
//!
//! ```no_run
//! use flowbox_types::config::LogFormat;
//!
//! // Human-readable logs at info level unless RUST_LOG says otherwise
//! flowbox_observe::tracing_setup::init_tracing(LogFormat::Pretty, "info", false).unwrap();
//! ```

use std::sync::OnceLock;

use flowbox_types::config::LogFormat;
use opentelemetry::trace::TracerProvider as _;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Stores the OTel tracer provider so it can be shut down cleanly on exit.
static TRACER_PROVIDER: OnceLock<SdkTracerProvider> = OnceLock::new();

/// Build the level filter: `RUST_LOG` wins, otherwise `default_directive`.
pub fn build_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Initialize the global tracing subscriber.
///
/// - `format` picks the `fmt` layer flavor: pretty lines or one JSON object
///   per event.
/// - `default_directive` applies when `RUST_LOG` is unset (e.g. `"warn"`,
///   `"flowbox_core=debug"`).
/// - `enable_otel` additionally bridges spans to OpenTelemetry using a stdout
///   exporter.
///
/// # Errors
///
/// Returns an error if the global subscriber has already been set.
pub fn init_tracing(
    format: LogFormat,
    default_directive: &str,
    enable_otel: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let fmt_layer = match format {
        LogFormat::Pretty => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Json => tracing_subscriber::fmt::layer()
            .json()
            .with_current_span(true)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let otel_layer = if enable_otel {
        let provider = SdkTracerProvider::builder()
            .with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
            .build();
        let tracer = provider.tracer("flowbox");

        let _ = TRACER_PROVIDER.set(provider.clone());
        opentelemetry::global::set_tracer_provider(provider);

        Some(tracing_opentelemetry::layer().with_tracer(tracer))
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(build_filter(default_directive))
        .with(fmt_layer)
        .with(otel_layer)
        .try_init()?;

    Ok(())
}

/// Flush pending spans and shut down the OpenTelemetry tracer provider.
///
/// No-op when OTel was not enabled.
pub fn shutdown_tracing() {
    if let Some(provider) = TRACER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            eprintln!("Warning: OTel tracer provider shutdown error: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_falls_back_to_default_directive() {
        // Whatever RUST_LOG holds, building a filter must not fail
        let filter = build_filter("flowbox_core=debug,warn");
        assert!(!filter.to_string().is_empty());
    }

    #[test]
    fn init_twice_reports_error() {
        let _ = init_tracing(LogFormat::Json, "warn", false);
        // Only one global subscriber per process
        assert!(init_tracing(LogFormat::Pretty, "warn", false).is_err());
    }

    #[test]
    fn shutdown_without_otel_is_noop() {
        shutdown_tracing();
    }
}
