//! Ambient logging/tracing stack (`SPEC_FULL.md` §B.1): process-wide
//! subscriber installation, separate from `ext_proc::span`'s per-request
//! span lifecycle. Grounded on the teacher crate's own `telemetry` module
//! shape — an `EnvFilter`-driven `tracing-subscriber` registry, switchable
//! between a human-readable compact formatter and structured JSON, with an
//! optional OpenTelemetry OTLP tracer provider installed as the process's
//! global exporter when an endpoint is configured. This module is what
//! `agentgateway-app`'s `main.rs` calls once at startup; nothing in the
//! request path depends on it directly.

use std::time::Duration;

use opentelemetry_otlp::SpanExporter;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::util::SubscriberInitExt;

/// Output formatter selection. Matches the teacher's `LOG_FORMAT=json|text`
/// environment switch rather than inventing a new one.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LogFormat {
	#[default]
	Text,
	Json,
}

impl LogFormat {
	pub fn from_env() -> Self {
		match std::env::var("LOG_FORMAT").as_deref() {
			Ok("json") => LogFormat::Json,
			_ => LogFormat::Text,
		}
	}
}

/// Process-wide telemetry configuration read by `agentgateway-app` from CLI
/// flags or environment variables (reading them is the binary's job, per
/// spec.md §1's "out of scope" list; this struct is just the validated
/// shape [`init`] consumes).
#[derive(Clone, Debug, Default)]
pub struct TelemetryConfig {
	pub log_format: LogFormat,
	/// OTLP gRPC collector endpoint. `None` keeps spans local-only (no
	/// exporter installed), matching spec.md §1's framing of tracing-span
	/// *construction* as out of scope — this crate only specifies the span
	/// interface named in §6, not a mandatory export path.
	pub otlp_endpoint: Option<String>,
}

/// Handle the caller must keep alive for the process lifetime and shut down
/// on graceful exit (dropping the tracer provider without calling
/// `shutdown()` can drop in-flight spans).
pub struct TelemetryGuard {
	tracer_provider: Option<SdkTracerProvider>,
}

impl TelemetryGuard {
	pub fn shutdown(self) {
		if let Some(provider) = self.tracer_provider {
			let _ = provider.shutdown();
		}
	}
}

/// Install the global `tracing` subscriber — an `EnvFilter` layer (default
/// `info`, overridable via `RUST_LOG`) plus a formatting layer chosen by
/// [`LogFormat`] — and, when `otlp_endpoint` is set, build and install an
/// OTLP-exporting `SdkTracerProvider` as the process's global OpenTelemetry
/// tracer provider. Callers invoke this exactly once, at binary startup;
/// like the teacher's own `tracing_subscriber::registry().try_init()` call
/// site, a second call returns an error rather than panicking.
pub fn init(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	match config.log_format {
		LogFormat::Json => tracing_subscriber::fmt()
			.json()
			.with_target(true)
			.with_env_filter(filter)
			.finish()
			.try_init()?,
		LogFormat::Text => tracing_subscriber::fmt()
			.with_target(false)
			.with_env_filter(filter)
			.finish()
			.try_init()?,
	}

	let tracer_provider = match &config.otlp_endpoint {
		Some(endpoint) => {
			let provider = build_tracer_provider(endpoint)?;
			opentelemetry::global::set_tracer_provider(provider.clone());
			Some(provider)
		},
		None => None,
	};

	Ok(TelemetryGuard { tracer_provider })
}

fn build_tracer_provider(endpoint: &str) -> anyhow::Result<SdkTracerProvider> {
	let exporter = SpanExporter::builder()
		.with_tonic()
		.with_endpoint(endpoint)
		.with_timeout(Duration::from_secs(5))
		.build()?;
	Ok(SdkTracerProvider::builder().with_batch_exporter(exporter).build())
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn log_format_reads_env_var() {
		// SAFETY: test-only, single-threaded access to this process's env var.
		unsafe { std::env::set_var("LOG_FORMAT", "json") };
		assert_eq!(LogFormat::from_env(), LogFormat::Json);
		unsafe { std::env::remove_var("LOG_FORMAT") };
		assert_eq!(LogFormat::from_env(), LogFormat::Text);
	}
}
