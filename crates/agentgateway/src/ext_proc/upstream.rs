//! Upstream-filter processor (spec.md §4.2): the hot path. Bound to a
//! backend at `SetBackend` time, it owns the entire request transform (one
//! shot, `CONTINUE_AND_REPLACE`) and the streaming response decode.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::Mutex;

use super::compression::GzipStream;
use super::state::RequestState;
use super::{ProcessorError, proto, set_header};
use crate::config::ConfigHandle;
use crate::translate::{ResponseState, Translator};

pub struct UpstreamProcessor {
	pub internal_req_id: String,
	state: Arc<Mutex<RequestState>>,
	config: ConfigHandle,
	response_state: Mutex<ResponseState>,
	/// `true` once `ProcessResponseHeaders` has switched this response to
	/// streamed mode (spec.md §4.2: "if the request was streaming and the
	/// upstream returned status 200, switch the upstream body mode to
	/// streamed").
	streaming_response: std::sync::atomic::AtomicBool,
	/// Set from `ProcessResponseHeaders` when the upstream response carries
	/// `content-encoding: gzip`; holds the decoder's in-flight state across
	/// the (possibly many) `ProcessResponseBody` chunks of this response.
	gzip: Mutex<Option<GzipStream>>,
}

impl UpstreamProcessor {
	pub fn new(internal_req_id: String, state: Arc<Mutex<RequestState>>, config: ConfigHandle) -> Self {
		Self {
			internal_req_id,
			state,
			config,
			response_state: Mutex::new(ResponseState::default()),
			streaming_response: std::sync::atomic::AtomicBool::new(false),
			gzip: Mutex::new(None),
		}
	}

	/// `SetBackend`: locate the backend by name, install the translator chosen
	/// by the endpoint spec's `GetTranslator`, and bump the router's
	/// upstream-filter count.
	pub async fn set_backend(
		&self,
		backend_name: &str,
		router: &super::router::RouterProcessor,
	) -> Result<(), ProcessorError> {
		let runtime = self.config.current();
		let backend = runtime
			.get_backend(backend_name)
			.ok_or_else(|| ProcessorError::Internal(format!("unknown backend {backend_name}")))?
			.clone();

		router.note_upstream_bound();

		let mut st = self.state.lock().await;
		st.upstream_filter_count += 1;
		let model_override = backend.model_name_override.as_deref();
		if st.parsed.is_none() {
			return Err(ProcessorError::Internal("SetBackend before request body parsed".into()));
		}
		let path = st
			.original_path
			.clone()
			.ok_or_else(|| ProcessorError::Internal("SetBackend before request body parsed".into()))?;
		let spec = crate::endpoints::registry()
			.into_iter()
			.find(|(p, _)| *p == path)
			.map(|(_, spec)| spec)
			.ok_or_else(|| ProcessorError::UnsupportedRoute(path.clone()))?;
		let translator = spec.get_translator(&backend.schema, model_override)?;

		if let Some(model) = model_override {
			st.request_model = Some(model.to_string());
		}
		if let Some(span) = &st.span {
			super::span::record_backend(
				span,
				st.request_model.as_deref().unwrap_or_default(),
				backend_name,
			);
		}
		st.translator = Some(translator);
		st.backend_name = Some(backend_name.to_string());
		st.backend = Some(Arc::new(backend));
		st.request_sent_at = Some(std::time::Instant::now());
		Ok(())
	}

	/// `ProcessRequestHeaders`: the entire request transform, spec.md §4.2
	/// steps 1-9.
	pub async fn process_request_headers(&self) -> Result<proto::ProcessingResponse, ProcessorError> {
		let (translator, backend, raw, parsed, force, is_retry, original_path) = {
			let st = self.state.lock().await;
			let translator = st
				.translator
				.clone()
				.ok_or_else(|| ProcessorError::Internal("ProcessRequestHeaders before SetBackend".into()))?;
			let backend = st
				.backend
				.clone()
				.ok_or_else(|| ProcessorError::Internal("ProcessRequestHeaders before SetBackend".into()))?;
			let raw = st
				.original_request_body_raw
				.clone()
				.ok_or_else(|| ProcessorError::Internal("missing request body".into()))?;
			let parsed = st
				.parsed
				.clone()
				.ok_or_else(|| ProcessorError::Internal("missing parsed request".into()))?;
			// step 2: force on retry or when the router already rewrote the body.
			let force = st.is_retry() || st.force_body_mutation;
			let is_retry = st.is_retry();
			let original_path = st.original_path.clone().unwrap_or_default();
			(translator, backend, raw, parsed, force, is_retry, original_path)
		};

		self.response_state.lock().await.request_model = parsed.model.clone();

		// step 3
		let (mut header_set, new_body) = translator.request_body(&raw, &parsed, force)?;
		// step 4: route-level header mutator, retry-aware.
		header_set = backend.header_mutation.apply(header_set, is_retry);
		// step 5: route-level body mutator; falls back to the mutator's own
		// output only when the translator left the body untouched.
		let body_for_mutation = new_body.as_deref().unwrap_or(&raw);
		let mutated_body = backend.body_mutation.apply(body_for_mutation);
		let final_body = mutated_body.map(Bytes::from).or(new_body);

		// step 6/7: auth handler sees post-translation headers and the final body.
		let mut http_headers = http::HeaderMap::new();
		for mutation in &header_set.set {
			if let (Ok(name), Ok(value)) = (
				http::HeaderName::from_bytes(mutation.key.as_bytes()),
				http::HeaderValue::from_bytes(&mutation.raw_value),
			) {
				http_headers.insert(name, value);
			}
		}
		// step 6/7: the signer needs the path this request is actually going out
		// on, not the inbound one — `header_set.path` only when the translator
		// rewrote it (Bedrock/Vertex/Azure targets), the original path otherwise.
		let outgoing_path = header_set.path.as_deref().unwrap_or(&original_path);
		let auth_headers = backend
			.auth
			.apply(outgoing_path, &http_headers, final_body.as_deref().unwrap_or_default())
			.await?;
		for (name, value) in auth_headers.iter() {
			header_set = header_set.set(name.as_str(), value.as_bytes().to_vec());
		}

		let mut set_headers: Vec<proto::HeaderValueOption> = header_set
			.set
			.iter()
			.map(|m| set_header(&m.key, &m.raw_value))
			.collect();
		if let Some(path) = &header_set.path {
			set_headers.push(set_header(":path", path.as_bytes()));
		}

		// step 8: dynamic metadata carrying content-length, since CONTINUE_AND_REPLACE
		// clears it unconditionally on the host side.
		let dynamic_metadata = final_body.as_ref().map(|body| {
			let mut fields = std::collections::BTreeMap::new();
			fields.insert(
				"content_length".to_string(),
				serde_json::from_value(serde_json::json!(body.len() as f64)).expect("usize converts to a Value"),
			);
			prost_wkt_types::Struct { fields }
		});

		let common = proto::CommonResponse {
			status: proto::common_response::ResponseStatus::ContinueAndReplace as i32,
			header_mutation: Some(proto::HeaderMutation {
				set_headers,
				remove_headers: header_set.remove.clone(),
			}),
			body_mutation: final_body.map(|b| proto::BodyMutation {
				mutation: Some(crate::ext_proc::proto::body_mutation::Mutation::Body(b.to_vec())),
			}),
			clear_route_cache: false,
			..Default::default()
		};

		Ok(proto::ProcessingResponse {
			response: Some(proto::processing_response::Response::RequestHeaders(proto::HeadersResponse {
				response: Some(common),
			})),
			dynamic_metadata,
		})
	}

	/// `ProcessRequestBody` must never be invoked on the upstream stream; the
	/// body was already fully replaced during the header phase.
	pub fn process_request_body(&self) -> Result<proto::ProcessingResponse, ProcessorError> {
		Err(ProcessorError::Protocol(
			"ProcessRequestBody invoked on upstream processor".into(),
		))
	}

	/// `ProcessResponseHeaders`: run the translator's header hook; switch to
	/// streamed body mode for a 200 streaming response.
	pub async fn process_response_headers(
		&self,
		status: u16,
		headers: &[(String, String)],
	) -> proto::ProcessingResponse {
		let stream = self.state.lock().await.stream;
		if stream && status == 200 {
			self.streaming_response.store(true, std::sync::atomic::Ordering::SeqCst);
		}
		{
			let mut response_state = self.response_state.lock().await;
			for (key, value) in headers {
				response_state.response_headers.insert(key.to_ascii_lowercase(), value.clone());
			}
		}

		// spec.md §4.2 step "decompress if needed (gzip)": sniff once, up
		// front, since the decoder needs to persist across every subsequent
		// ProcessResponseBody chunk of this same response.
		let is_gzip = headers
			.iter()
			.any(|(k, v)| k.eq_ignore_ascii_case("content-encoding") && super::compression::is_gzip(v));
		let header_mutation = if is_gzip {
			*self.gzip.lock().await = Some(GzipStream::new());
			Some(proto::HeaderMutation {
				set_headers: Vec::new(),
				remove_headers: vec!["content-encoding".to_string()],
			})
		} else {
			None
		};

		proto::ProcessingResponse {
			response: Some(proto::processing_response::Response::ResponseHeaders(
				proto::HeadersResponse {
					response: Some(proto::CommonResponse {
						header_mutation,
						..Default::default()
					}),
				},
			)),
			dynamic_metadata: None,
		}
	}

	/// `ProcessResponseBody`: error path vs success decode, cumulative cost
	/// tracking, and (on end-of-stream) dynamic metadata + span closure.
	pub async fn process_response_body(
		&self,
		chunk: &[u8],
		end_of_stream: bool,
		status: u16,
	) -> Result<proto::ProcessingResponse, ProcessorError> {
		let translator = {
			let st = self.state.lock().await;
			st.translator
				.clone()
				.ok_or_else(|| ProcessorError::Internal("ProcessResponseBody before SetBackend".into()))?
		};

		// spec.md §4.2 "decompress if needed (gzip)" / §3 "each response-body
		// chunk is decompressed, translated": run before either the error path
		// or the translator, since both consume the same plaintext bytes.
		let decompressed;
		let chunk = {
			let mut gzip = self.gzip.lock().await;
			match gzip.as_mut() {
				Some(stream) => {
					decompressed = stream
						.feed(chunk, end_of_stream)
						.await
						.map_err(|e| ProcessorError::Protocol(format!("gzip decompression failed: {e}")))?;
					decompressed.as_slice()
				},
				None => chunk,
			}
		};

		if !(200..300).contains(&status) {
			let mut st = self.state.lock().await;
			let body = translator.response_error(status, chunk);
			if let Some(span) = &st.span {
				super::span::end_with_error(span, status, &body);
			}
			crate::metrics::record_failure(&mut st, status);
			return Ok(proto::ProcessingResponse {
				response: Some(proto::processing_response::Response::ResponseBody(proto::BodyResponse {
					response: Some(proto::CommonResponse {
						status: proto::common_response::ResponseStatus::ContinueAndReplace as i32,
						body_mutation: Some(proto::BodyMutation {
							mutation: Some(proto::body_mutation::Mutation::Body(body.to_vec())),
						}),
						..Default::default()
					}),
				})),
				dynamic_metadata: None,
			});
		}

		if chunk.len() > 0 {
			let mut st = self.state.lock().await;
			let now = std::time::Instant::now();
			if st.first_chunk_at.is_none() {
				st.first_chunk_at = Some(now);
			}
			st.last_chunk_at = Some(now);
		}

		let mut response_state = self.response_state.lock().await;
		let (new_body, usage, response_model) =
			translator.response_body(chunk, end_of_stream, &mut response_state)?;
		drop(response_state);

		let mut st = self.state.lock().await;
		st.costs.merge_cumulative(usage);
		if response_model.is_some() {
			st.response_model = response_model;
		}
		let costs = st.costs;

		let mut dynamic_metadata = None;
		if end_of_stream {
			dynamic_metadata = Some(crate::metrics::build_dynamic_metadata(&self.config.current(), &st, costs));
			if let Some(span) = st.span.take() {
				drop(span);
			}
		}

		let common = proto::CommonResponse {
			status: if new_body.is_some() {
				proto::common_response::ResponseStatus::ContinueAndReplace as i32
			} else {
				proto::common_response::ResponseStatus::Continue as i32
			},
			body_mutation: new_body.map(|b| proto::BodyMutation {
				mutation: Some(proto::body_mutation::Mutation::Body(b.to_vec())),
			}),
			..Default::default()
		};

		Ok(proto::ProcessingResponse {
			response: Some(proto::processing_response::Response::ResponseBody(proto::BodyResponse {
				response: Some(common),
			})),
			dynamic_metadata,
		})
	}
}
