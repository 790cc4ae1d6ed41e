//! Router-filter processor (spec.md §4.2): the first of the two processor
//! invocations per request, run before the host proxy has picked a
//! backend. Parses the body, starts the request's tracing span, and stamps
//! the reserved routing headers so the host re-runs route selection.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use super::state::RequestState;
use super::{ProcessorError, proto, set_header};
use crate::endpoints::{self, EndpointSpec};

pub struct RouterProcessor {
	pub internal_req_id: String,
	pub state: Arc<Mutex<RequestState>>,
	path: String,
	endpoint: Option<Arc<dyn EndpointSpec>>,
	/// Bumped once per upstream processor bound via `SetBackend`; mirrors
	/// `RequestState.upstream_filter_count`, kept here too since spec.md §4.2
	/// frames it as something the *router* processor tracks across retries.
	bound_upstream_count: std::sync::atomic::AtomicU32,
}

impl RouterProcessor {
	pub fn new(internal_req_id: String, path: String) -> Self {
		let endpoint = endpoints::registry()
			.into_iter()
			.find(|(p, _)| *p == endpoints::strip_query(&path))
			.map(|(_, spec)| spec);
		Self {
			internal_req_id,
			state: Arc::new(Mutex::new(RequestState::new())),
			path,
			endpoint,
			bound_upstream_count: std::sync::atomic::AtomicU32::new(0),
		}
	}

	pub fn path(&self) -> &str {
		&self.path
	}

	pub fn has_route(&self) -> bool {
		self.endpoint.is_some()
	}

	/// `ProcessRequestHeaders`: trivial pass-through, spec.md §4.2 — only
	/// records that the phase occurred.
	pub async fn process_request_headers(&self) -> proto::ProcessingResponse {
		proto::ProcessingResponse {
			response: Some(proto::processing_response::Response::RequestHeaders(
				proto::HeadersResponse {
					response: Some(proto::CommonResponse::default()),
				},
			)),
			dynamic_metadata: None,
		}
	}

	/// `ProcessRequestBody`: parse the body, start the span, stamp routing
	/// headers, and (for OpenAI chat-completions streaming with costs
	/// configured) rewrite the body to force `include_usage`.
	pub async fn process_request_body(
		&self,
		body: &[u8],
		costs_configured: bool,
	) -> Result<proto::ProcessingResponse, ProcessorError> {
		let spec = self
			.endpoint
			.as_ref()
			.ok_or_else(|| ProcessorError::UnsupportedRoute(self.path.clone()))?;
		let outcome = spec.parse_body(body, costs_configured)?;

		let span = super::span::start_request_span(&self.internal_req_id, &self.path);
		{
			let mut st = self.state.lock().await;
			st.original_model = Some(outcome.original_model.clone());
			st.request_model = Some(outcome.original_model.clone());
			st.stream = outcome.stream;
			st.force_body_mutation = outcome.rewritten_raw.is_some();
			st.original_request_body_raw =
				Some(outcome.rewritten_raw.clone().unwrap_or_else(|| Bytes::copy_from_slice(body)));
			st.parsed = Some(outcome.parsed);
			st.span = Some(span);
			st.original_path = Some(self.path.clone());
		}

		let header_mutation = proto::HeaderMutation {
			set_headers: vec![
				set_header(super::HEADER_MODEL, outcome.original_model.as_bytes()),
				set_header(super::HEADER_ORIGINAL_PATH, self.path.as_bytes()),
				set_header(super::HEADER_INTERNAL_REQ_ID, self.internal_req_id.as_bytes()),
			],
			remove_headers: vec![],
		};

		let mut common = proto::CommonResponse {
			status: proto::common_response::ResponseStatus::Continue as i32,
			header_mutation: Some(header_mutation),
			clear_route_cache: true,
			..Default::default()
		};
		if let Some(rewritten) = outcome.rewritten_raw {
			common.body_mutation = Some(proto::BodyMutation {
				mutation: Some(proto::body_mutation::Mutation::Body(rewritten.to_vec())),
			});
		}

		Ok(proto::ProcessingResponse {
			response: Some(proto::processing_response::Response::RequestBody(proto::BodyResponse {
				response: Some(common),
			})),
			dynamic_metadata: None,
		})
	}

	/// `ProcessResponseHeaders`/`ProcessResponseBody`: spec.md §4.2 says
	/// these "delegate to the linked upstream processor if present, else
	/// pass through." In this implementation the upstream processor owns
	/// response handling directly on its own stream (they're two separate
	/// bidirectional streams, not one shared one), so the router's own
	/// response phases are always a bare pass-through; nothing observes a
	/// response on the router stream in practice.
	pub fn process_response_headers(&self) -> proto::ProcessingResponse {
		proto::ProcessingResponse {
			response: Some(proto::processing_response::Response::ResponseHeaders(
				proto::HeadersResponse {
					response: Some(proto::CommonResponse::default()),
				},
			)),
			dynamic_metadata: None,
		}
	}

	pub fn process_response_body(&self) -> proto::ProcessingResponse {
		proto::ProcessingResponse {
			response: Some(proto::processing_response::Response::ResponseBody(proto::BodyResponse {
				response: Some(proto::CommonResponse::default()),
			})),
			dynamic_metadata: None,
		}
	}

	/// Bumped by `UpstreamProcessor::set_backend`; a count above 1 is the
	/// signal the retry happened at all, even though `RequestState.
	/// upstream_filter_count` is the value translators actually read.
	pub fn note_upstream_bound(&self) -> u32 {
		self.bound_upstream_count.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1
	}
}
