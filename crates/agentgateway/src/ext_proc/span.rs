//! Tracing integration surface (spec.md §4, "Tracing integration surface"
//! row in the System Overview table): starting, annotating, and ending the
//! per-request span named in `RequestState.span`. Grounded on the
//! `tracing`-based span lifecycle pattern used throughout the teacher repo
//! (`tracing::info_span!` entered per request, fields recorded as they
//! become known).

use tracing::Span;

/// Start the logical request span in the router processor's request-body
/// phase (spec.md §3, `RequestState.span`: "started in router phase, ended
/// on final response chunk or error"). `route` is the advertised path;
/// `model`/`backend` are not yet known at this point and are recorded later
/// via [`record_backend`].
pub fn start_request_span(request_id: &str, route: &str) -> Span {
	tracing::info_span!(
		"ai_gateway_request",
		request_id = %request_id,
		route = %route,
		model = tracing::field::Empty,
		backend = tracing::field::Empty,
		error = tracing::field::Empty,
	)
}

/// Record the model/backend once a backend is bound (`SetBackend`, spec.md
/// §4.2).
pub fn record_backend(span: &Span, model: &str, backend: &str) {
	span.record("model", model);
	span.record("backend", backend);
}

/// End the span with an error code/body recorded (spec.md §4.2's
/// `ProcessResponseBody`: "optionally end the span with the error
/// code+body"). `tracing::Span` has no explicit "close" verb beyond
/// dropping it — recording the terminal fields here and letting the caller
/// drop its last reference is the span's end, matching how the teacher
/// repo never calls an explicit `.close()`.
pub fn end_with_error(span: &Span, status: u16, body: &[u8]) {
	let preview = String::from_utf8_lossy(&body[..body.len().min(256)]);
	span.record("error", format!("status={status} body={preview}").as_str());
}
