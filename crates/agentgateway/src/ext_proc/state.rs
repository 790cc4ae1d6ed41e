//! `RequestState` (spec.md §3): per-request state split across the router
//! and upstream processor instances handling the same logical request,
//! handed off between them by the internal request id (`registry.rs`).

use std::sync::Arc;

use bytes::Bytes;
use tracing::Span;

use crate::config::Backend;
use crate::translate::Translator;
use crate::translate::types::{ParsedRequest, Usage};

/// Created in the router processor's request-headers phase, destroyed when
/// both streams close. Shared (via `Arc<Mutex<_>>`) between the router
/// processor that owns it and any upstream processor bound to it across
/// retries.
#[derive(Default)]
pub struct RequestState {
	/// Model string as first seen in the request body; immutable after the
	/// request-body phase.
	pub original_model: Option<String>,
	/// Effective model header; may be overridden per-backend.
	pub request_model: Option<String>,
	/// Model string reported by the upstream response; set once during
	/// response translation.
	pub response_model: Option<String>,
	/// Raw request bytes, possibly after one rewrite to force
	/// `stream_options.include_usage=true`.
	pub original_request_body_raw: Option<Bytes>,
	/// The endpoint spec's parsed view of the (possibly rewritten) body,
	/// recorded alongside the raw bytes so the upstream processor's
	/// request-headers phase doesn't need to re-parse.
	pub parsed: Option<ParsedRequest>,
	/// Set when the raw body was rewritten, or on retry.
	pub force_body_mutation: bool,
	/// Whether the request is streaming (derived from the body).
	pub stream: bool,
	/// Tracing span covering the logical request.
	pub span: Option<Span>,
	/// Number of upstream processor activations; >1 means a retry.
	pub upstream_filter_count: u32,
	/// Chosen protocol translator; set once a backend is bound.
	pub translator: Option<Arc<dyn Translator>>,
	/// Name of the bound backend, set at `SetBackend` time.
	pub backend_name: Option<String>,
	/// Backend this request is bound to, set at `SetBackend` time. Kept
	/// alongside `backend_name` so the upstream processor doesn't need a
	/// second config lookup once bound.
	pub backend: Option<Arc<Backend>>,
	/// Cumulative token usage for the request.
	pub costs: Usage,
	/// `true` once a failure has been recorded for this request, so retries
	/// across fresh upstream-processor instances still only count once
	/// (spec.md §4.5, "the metrics layer records failure exactly once").
	pub failure_recorded: bool,
	/// Observed end-point spec path, stamped by the router so the upstream
	/// processor can reconstruct endpoint selection even if the host
	/// rewrote `:path` (spec.md §6, `x-ai-eg-original-path`).
	pub original_path: Option<String>,
	/// Streaming chunk timing for `token_latency_ttft`/`token_latency_itl`
	/// (spec.md §4.6). `request_sent_at` is stamped when the upstream
	/// processor binds a backend (the request is about to go out);
	/// `first_chunk_at`/`last_chunk_at` are stamped as response chunks
	/// arrive.
	pub request_sent_at: Option<std::time::Instant>,
	pub first_chunk_at: Option<std::time::Instant>,
	pub last_chunk_at: Option<std::time::Instant>,
}

impl RequestState {
	pub fn new() -> Self {
		Self::default()
	}

	/// Mark the request's failure exactly once; returns `true` the first
	/// time it's called for this state so a caller can gate the metrics
	/// increment on it (spec.md's "Failure recorded once" testable
	/// property).
	pub fn record_failure_once(&mut self) -> bool {
		if self.failure_recorded {
			return false;
		}
		self.failure_recorded = true;
		true
	}

	pub fn is_retry(&self) -> bool {
		self.upstream_filter_count > 1
	}
}
