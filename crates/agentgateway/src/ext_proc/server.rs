//! `envoy.service.ext_proc.v3.ExternalProcessor` and `grpc.health.v1.Health`
//! server implementations (spec.md §4.1, §6).
//!
//! The teacher's `protos` workspace member carries `tonic-build`/`protox`
//! codegen that produces the usual `FooServer<T: Foo>` wrapper plus the
//! `Service<http::Request<Body>>` impl that dispatches by URI path into
//! `tonic::server::Grpc`. That codegen path isn't available here (see
//! `proto.rs`), so this module reproduces the same shape by hand, directly
//! on the concrete service types below rather than through the generic
//! `Foo`/`FooServer<T>` indirection `tonic-build` emits — this crate only
//! ever has one implementation of each service, so the indirection buys
//! nothing.
//!
//! Two [`ExtProcService`] instances are constructed in `agentgateway-app`'s
//! `main.rs`, one per filter level (spec.md §4.1: "each stream represents
//! one HTTP request ... at one of two filter levels"), sharing a single
//! [`RouterRegistry`] and [`ConfigHandle`].

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio_stream::StreamExt;
use tonic::body::Body;
use tonic::server::{Grpc, NamedService, StreamingService, UnaryService};
use tonic_prost::ProstCodec;

use super::registry::RouterRegistry;
use super::router::RouterProcessor;
use super::upstream::UpstreamProcessor;
use super::{HEADER_INTERNAL_REQ_ID, ProcessorError, proto};
use crate::config::ConfigHandle;

const PROCESS_PATH: &str = "/envoy.service.ext_proc.v3.ExternalProcessor/Process";
const ATTRIBUTE_FILTER_NAME: &str = "envoy.filters.http.ext_proc";
const ATTRIBUTE_CLUSTER_NAME: &str = "xds.cluster_name";

pub type ProcessStream = Pin<Box<dyn Stream<Item = Result<proto::ProcessingResponse, tonic::Status>> + Send + 'static>>;

#[derive(Clone, Copy)]
enum Level {
	/// Runs before the host has picked a backend; resolves a route from
	/// `:path` and mints the internal request id.
	Router,
	/// Runs once a backend cluster is chosen; resolves the sibling router
	/// processor from the internal id header and does the request transform.
	Upstream,
}

#[derive(Clone)]
pub struct ExtProcService {
	level: Level,
	registry: RouterRegistry,
	config: ConfigHandle,
}

impl ExtProcService {
	/// Bind this instance to the router-filter deployment of the ext_proc
	/// listener (spec.md §4.1 dispatch step 2).
	pub fn router(registry: RouterRegistry, config: ConfigHandle) -> Self {
		Self {
			level: Level::Router,
			registry,
			config,
		}
	}

	/// Bind this instance to the upstream-filter deployment.
	pub fn upstream(registry: RouterRegistry, config: ConfigHandle) -> Self {
		Self {
			level: Level::Upstream,
			registry,
			config,
		}
	}

	fn process(&self, stream: tonic::Streaming<proto::ProcessingRequest>) -> ProcessStream {
		match self.level {
			Level::Router => Box::pin(process_router(self.registry.clone(), self.config.clone(), stream)),
			Level::Upstream => Box::pin(process_upstream(self.registry.clone(), self.config.clone(), stream)),
		}
	}
}

impl NamedService for ExtProcService {
	const NAME: &'static str = "envoy.service.ext_proc.v3.ExternalProcessor";
}

struct ProcessSvc(ExtProcService);

impl StreamingService<proto::ProcessingRequest> for ProcessSvc {
	type Response = proto::ProcessingResponse;
	type ResponseStream = ProcessStream;
	type Future = Pin<Box<dyn std::future::Future<Output = Result<tonic::Response<Self::ResponseStream>, tonic::Status>> + Send + 'static>>;

	fn call(&mut self, request: tonic::Request<tonic::Streaming<proto::ProcessingRequest>>) -> Self::Future {
		let svc = self.0.clone();
		Box::pin(async move {
			let stream = svc.process(request.into_inner());
			Ok(tonic::Response::new(stream))
		})
	}
}

impl tower::Service<http::Request<Body>> for ExtProcService {
	type Response = http::Response<Body>;
	type Error = std::convert::Infallible;
	type Future = Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

	fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, req: http::Request<Body>) -> Self::Future {
		if req.uri().path() != PROCESS_PATH {
			return Box::pin(std::future::ready(Ok(unimplemented_response())));
		}
		let svc = self.clone();
		Box::pin(async move {
			let codec = ProstCodec::default();
			let mut grpc = Grpc::new(codec);
			Ok(grpc.streaming(ProcessSvc(svc), req).await)
		})
	}
}

fn unimplemented_response() -> http::Response<Body> {
	http::Response::builder()
		.status(http::StatusCode::OK)
		.header("content-type", "application/grpc")
		.header("grpc-status", "12")
		.header("grpc-message", "unknown method")
		.body(Body::default())
		.expect("valid response")
}

fn to_status(error: ProcessorError) -> tonic::Status {
	// spec.md §4.1: "any processor error terminates the stream with an
	// Unknown status."
	tonic::Status::unknown(error.to_string())
}

fn header_value(headers: &Option<proto::HeaderMap>, name: &str) -> Option<String> {
	let headers = headers.as_ref()?;
	headers.headers.iter().find(|h| h.key.eq_ignore_ascii_case(name)).map(|h| {
		if h.raw_value.is_empty() {
			h.value.clone()
		} else {
			String::from_utf8_lossy(&h.raw_value).to_string()
		}
	})
}

fn attribute_str(attributes: &HashMap<String, prost_wkt_types::Struct>, filter: &str, key: &str) -> Option<String> {
	let value = attributes.get(filter)?.fields.get(key)?;
	serde_json::to_value(value).ok()?.as_str().map(str::to_string)
}

fn all_headers(headers: &Option<proto::HeaderMap>) -> Vec<(String, String)> {
	let Some(headers) = headers.as_ref() else {
		return Vec::new();
	};
	headers
		.headers
		.iter()
		.map(|h| {
			let value = if h.raw_value.is_empty() {
				h.value.clone()
			} else {
				String::from_utf8_lossy(&h.raw_value).to_string()
			};
			(h.key.clone(), value)
		})
		.collect()
}

fn immediate_not_found(path: &str) -> proto::ProcessingResponse {
	proto::ProcessingResponse {
		response: Some(proto::processing_response::Response::ImmediateResponse(proto::ImmediateResponse {
			status: Some(proto::HttpStatus { code: 404 }),
			headers: None,
			body: format!("no route registered for {path}").into_bytes(),
			grpc_status: None,
			details: String::new(),
		})),
		dynamic_metadata: None,
	}
}

/// spec.md §4.1 dispatch step 1: "If it is not request-headers ... install
/// a no-op pass-through processor and continue." Mirrors the phase of
/// whatever arrived with a trivial `CommonResponse`.
fn passthrough_response_for(req: &proto::ProcessingRequest) -> proto::ProcessingResponse {
	use proto::processing_request::Request as Req;
	use proto::processing_response::Response as Resp;
	let response = match &req.request {
		Some(Req::ResponseHeaders(_)) => Resp::ResponseHeaders(proto::HeadersResponse {
			response: Some(proto::CommonResponse::default()),
		}),
		Some(Req::RequestBody(_)) => Resp::RequestBody(proto::BodyResponse {
			response: Some(proto::CommonResponse::default()),
		}),
		Some(Req::ResponseBody(_)) => Resp::ResponseBody(proto::BodyResponse {
			response: Some(proto::CommonResponse::default()),
		}),
		Some(Req::RequestHeaders(_)) | None => Resp::RequestHeaders(proto::HeadersResponse {
			response: Some(proto::CommonResponse::default()),
		}),
	};
	proto::ProcessingResponse {
		response: Some(response),
		dynamic_metadata: None,
	}
}

/// spec.md §4.1 "Debug logging": build the redacted view of whatever header
/// and body mutation a response carries and emit it as a `tracing` event.
/// Never touches the response actually handed back to the host.
fn log_debug_response(resp: &proto::ProcessingResponse, redact_body: bool) {
	use proto::processing_response::Response as Resp;
	let common = match &resp.response {
		Some(Resp::RequestHeaders(h)) | Some(Resp::ResponseHeaders(h)) => h.response.as_ref(),
		Some(Resp::RequestBody(b)) | Some(Resp::ResponseBody(b)) => b.response.as_ref(),
		_ => None,
	};
	let Some(common) = common else { return };
	let mut headers = http::HeaderMap::new();
	if let Some(mutation) = &common.header_mutation {
		for option in &mutation.set_headers {
			if let Some(header) = &option.header
				&& let (Ok(name), Ok(value)) = (
					http::HeaderName::from_bytes(header.key.as_bytes()),
					http::HeaderValue::from_bytes(&header.raw_value),
				) {
				headers.insert(name, value);
			}
		}
	}
	let body = common.body_mutation.as_ref().and_then(|m| match &m.mutation {
		Some(proto::body_mutation::Mutation::Body(b)) => Some(bytes::Bytes::copy_from_slice(b)),
		_ => None,
	});
	let view = crate::redact::redact_headers_and_body(&headers, body.as_ref(), redact_body);
	tracing::debug!(?view, "ext_proc outbound response");
}

fn maybe_log(resp: proto::ProcessingResponse, debug_logging: bool, redact_body: bool) -> proto::ProcessingResponse {
	if debug_logging {
		log_debug_response(&resp, redact_body);
	}
	resp
}

fn process_router(
	registry: RouterRegistry,
	config: ConfigHandle,
	mut stream: tonic::Streaming<proto::ProcessingRequest>,
) -> impl Stream<Item = Result<proto::ProcessingResponse, tonic::Status>> {
	async_stream::stream! {
		let Some(first) = stream.next().await else { return };
		let first = match first {
			Ok(m) => m,
			Err(error) => {
				yield Err(error);
				return;
			},
		};
		let Some(proto::processing_request::Request::RequestHeaders(headers)) = &first.request else {
			yield Ok(passthrough_response_for(&first));
			while let Some(next) = stream.next().await {
				match next {
					Ok(next) => yield Ok(passthrough_response_for(&next)),
					Err(error) => {
						yield Err(error);
						break;
					},
				}
			}
			return;
		};

		let path = header_value(&headers.headers, ":path").unwrap_or_default();
		let debug_logging = config.current().debug_logging;
		let redact_body = config.current().debug_redact_body;
		let x_request_id = header_value(&headers.headers, "x-request-id").unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
		let internal_req_id = format!("{x_request_id}-{}", uuid::Uuid::new_v4());

		let processor = Arc::new(RouterProcessor::new(internal_req_id.clone(), path.clone()));
		if !processor.has_route() {
			yield Ok(immediate_not_found(&path));
			return;
		}
		registry.insert(internal_req_id.clone(), processor.clone());

		yield Ok(maybe_log(processor.process_request_headers().await, debug_logging, redact_body));

		while let Some(next) = stream.next().await {
			let next = match next {
				Ok(next) => next,
				Err(error) => {
					yield Err(error);
					break;
				},
			};
			match next.request {
				Some(proto::processing_request::Request::RequestBody(body)) => {
					let costs_configured = !config.current().request_costs.is_empty();
					match processor.process_request_body(&body.body, costs_configured).await {
						Ok(resp) => yield Ok(maybe_log(resp, debug_logging, redact_body)),
						Err(error) => {
							yield Err(to_status(error));
							break;
						},
					}
				},
				Some(proto::processing_request::Request::ResponseHeaders(_)) => {
					yield Ok(maybe_log(processor.process_response_headers(), debug_logging, redact_body));
				},
				Some(proto::processing_request::Request::ResponseBody(body)) => {
					let end_of_stream = body.end_of_stream;
					yield Ok(maybe_log(processor.process_response_body(), debug_logging, redact_body));
					if end_of_stream {
						break;
					}
				},
				None => {},
			}
		}
		registry.remove(&internal_req_id);
	}
}

fn process_upstream(
	registry: RouterRegistry,
	config: ConfigHandle,
	mut stream: tonic::Streaming<proto::ProcessingRequest>,
) -> impl Stream<Item = Result<proto::ProcessingResponse, tonic::Status>> {
	async_stream::stream! {
		let Some(first) = stream.next().await else { return };
		let first = match first {
			Ok(m) => m,
			Err(error) => {
				yield Err(error);
				return;
			},
		};
		let Some(proto::processing_request::Request::RequestHeaders(headers)) = &first.request else {
			yield Ok(passthrough_response_for(&first));
			while let Some(next) = stream.next().await {
				match next {
					Ok(next) => yield Ok(passthrough_response_for(&next)),
					Err(error) => {
						yield Err(error);
						break;
					},
				}
			}
			return;
		};

		let debug_logging = config.current().debug_logging;
		let redact_body = config.current().debug_redact_body;
		let Some(internal_req_id) = header_value(&headers.headers, HEADER_INTERNAL_REQ_ID) else {
			// spec.md §4.1: "Missing internal-id header on an upstream stream
			// is a fatal Internal error."
			yield Err(tonic::Status::internal("missing internal request id header"));
			return;
		};
		let Some(router) = registry.get(&internal_req_id) else {
			yield Err(tonic::Status::internal("router processor not found for internal id"));
			return;
		};
		let Some(backend_name) = attribute_str(&first.attributes, ATTRIBUTE_FILTER_NAME, ATTRIBUTE_CLUSTER_NAME) else {
			yield Err(tonic::Status::internal("missing destination cluster attribute"));
			return;
		};

		let upstream = Arc::new(UpstreamProcessor::new(internal_req_id, router.state.clone(), config.clone()));
		if let Err(error) = upstream.set_backend(&backend_name, &router).await {
			yield Err(to_status(error));
			return;
		}
		match upstream.process_request_headers().await {
			Ok(resp) => yield Ok(maybe_log(resp, debug_logging, redact_body)),
			Err(error) => {
				yield Err(to_status(error));
				return;
			},
		}

		let mut response_status: u16 = 200;
		while let Some(next) = stream.next().await {
			let next = match next {
				Ok(next) => next,
				Err(error) => {
					yield Err(error);
					break;
				},
			};
			match next.request {
				Some(proto::processing_request::Request::RequestBody(_)) => {
					// spec.md §4.2: "must never be called on the upstream
					// stream"; treated as a bug, same as the in-memory
					// processor method.
					if let Err(error) = upstream.process_request_body() {
						yield Err(to_status(error));
						break;
					}
				},
				Some(proto::processing_request::Request::ResponseHeaders(headers)) => {
					response_status = header_value(&headers.headers, ":status")
						.and_then(|s| s.parse().ok())
						.unwrap_or(200);
					let header_pairs = all_headers(&headers.headers);
					yield Ok(maybe_log(upstream.process_response_headers(response_status, &header_pairs).await, debug_logging, redact_body));
				},
				Some(proto::processing_request::Request::ResponseBody(body)) => {
					let end_of_stream = body.end_of_stream;
					match upstream.process_response_body(&body.body, end_of_stream, response_status).await {
						Ok(resp) => {
							yield Ok(maybe_log(resp, debug_logging, redact_body));
							if end_of_stream {
								break;
							}
						},
						Err(error) => {
							yield Err(to_status(error));
							break;
						},
					}
				},
				None => {},
			}
		}
	}
}

/// `grpc.health.v1.Health`: `Check`/`List` report each registered service's
/// status from a fixed table handed in at construction; `Watch` is
/// unimplemented (spec.md §6).
#[derive(Clone)]
pub struct HealthService {
	statuses: Arc<HashMap<String, proto::health::health_check_response::ServingStatus>>,
}

impl HealthService {
	pub fn new(statuses: HashMap<String, proto::health::health_check_response::ServingStatus>) -> Self {
		Self {
			statuses: Arc::new(statuses),
		}
	}
}

impl NamedService for HealthService {
	const NAME: &'static str = "grpc.health.v1.Health";
}

struct CheckSvc(Arc<HashMap<String, proto::health::health_check_response::ServingStatus>>);

impl UnaryService<proto::health::HealthCheckRequest> for CheckSvc {
	type Response = proto::health::HealthCheckResponse;
	type Future = Pin<Box<dyn std::future::Future<Output = Result<tonic::Response<Self::Response>, tonic::Status>> + Send + 'static>>;

	fn call(&mut self, request: tonic::Request<proto::health::HealthCheckRequest>) -> Self::Future {
		let statuses = self.0.clone();
		Box::pin(async move {
			use proto::health::health_check_response::ServingStatus;
			let service = request.into_inner().service;
			let status = if service.is_empty() {
				if statuses.values().all(|s| *s == ServingStatus::Serving) {
					ServingStatus::Serving
				} else {
					ServingStatus::NotServing
				}
			} else {
				match statuses.get(&service) {
					Some(status) => *status,
					None => return Err(tonic::Status::not_found("unknown service")),
				}
			};
			Ok(tonic::Response::new(proto::health::HealthCheckResponse { status: status as i32 }))
		})
	}
}

struct ListSvc(Arc<HashMap<String, proto::health::health_check_response::ServingStatus>>);

impl UnaryService<proto::health::HealthListRequest> for ListSvc {
	type Response = proto::health::HealthListResponse;
	type Future = Pin<Box<dyn std::future::Future<Output = Result<tonic::Response<Self::Response>, tonic::Status>> + Send + 'static>>;

	fn call(&mut self, _request: tonic::Request<proto::health::HealthListRequest>) -> Self::Future {
		let statuses = self.0.clone();
		Box::pin(async move {
			let statuses = statuses
				.iter()
				.map(|(name, status)| (name.clone(), proto::health::HealthCheckResponse { status: *status as i32 }))
				.collect();
			Ok(tonic::Response::new(proto::health::HealthListResponse { statuses }))
		})
	}
}

impl tower::Service<http::Request<Body>> for HealthService {
	type Response = http::Response<Body>;
	type Error = std::convert::Infallible;
	type Future = Pin<Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send + 'static>>;

	fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
		Poll::Ready(Ok(()))
	}

	fn call(&mut self, req: http::Request<Body>) -> Self::Future {
		let statuses = self.statuses.clone();
		match req.uri().path() {
			"/grpc.health.v1.Health/Check" => Box::pin(async move {
				let mut grpc = Grpc::new(ProstCodec::default());
				Ok(grpc.unary(CheckSvc(statuses), req).await)
			}),
			"/grpc.health.v1.Health/List" => Box::pin(async move {
				let mut grpc = Grpc::new(ProstCodec::default());
				Ok(grpc.unary(ListSvc(statuses), req).await)
			}),
			"/grpc.health.v1.Health/Watch" => Box::pin(std::future::ready(Ok(watch_unimplemented_response()))),
			_ => Box::pin(std::future::ready(Ok(unimplemented_response()))),
		}
	}
}

fn watch_unimplemented_response() -> http::Response<Body> {
	http::Response::builder()
		.status(http::StatusCode::OK)
		.header("content-type", "application/grpc")
		.header("grpc-status", "12")
		.header("grpc-message", "watch is not supported")
		.body(Body::default())
		.expect("valid response")
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn header_value_prefers_raw_value_over_deprecated_value() {
		let headers = Some(proto::HeaderMap {
			headers: vec![proto::HeaderValue {
				key: ":path".to_string(),
				value: String::new(),
				raw_value: b"/v1/chat/completions".to_vec(),
			}],
		});
		assert_eq!(header_value(&headers, ":path").as_deref(), Some("/v1/chat/completions"));
	}

	#[test]
	fn header_value_is_case_insensitive() {
		let headers = Some(proto::HeaderMap {
			headers: vec![proto::HeaderValue {
				key: "X-Request-Id".to_string(),
				value: "abc".to_string(),
				raw_value: vec![],
			}],
		});
		assert_eq!(header_value(&headers, "x-request-id").as_deref(), Some("abc"));
	}

	#[test]
	fn attribute_str_reads_the_configured_filter_and_key() {
		let mut fields = std::collections::BTreeMap::new();
		fields.insert(
			ATTRIBUTE_CLUSTER_NAME.to_string(),
			serde_json::from_value(serde_json::json!("openai-backend")).unwrap(),
		);
		let mut attributes = HashMap::new();
		attributes.insert(ATTRIBUTE_FILTER_NAME.to_string(), prost_wkt_types::Struct { fields });
		assert_eq!(
			attribute_str(&attributes, ATTRIBUTE_FILTER_NAME, ATTRIBUTE_CLUSTER_NAME),
			Some("openai-backend".to_string())
		);
		assert_eq!(attribute_str(&attributes, "other-filter", ATTRIBUTE_CLUSTER_NAME), None);
	}

	#[tokio::test]
	async fn check_reports_not_found_for_unknown_service() {
		let mut statuses = HashMap::new();
		statuses.insert("known".to_string(), proto::health::health_check_response::ServingStatus::Serving);
		let mut svc = CheckSvc(Arc::new(statuses));
		let req = tonic::Request::new(proto::health::HealthCheckRequest {
			service: "unknown".to_string(),
		});
		assert!(svc.call(req).await.is_err());
	}

	#[tokio::test]
	async fn check_reports_serving_for_known_service() {
		let mut statuses = HashMap::new();
		statuses.insert("known".to_string(), proto::health::health_check_response::ServingStatus::Serving);
		let mut svc = CheckSvc(Arc::new(statuses));
		let req = tonic::Request::new(proto::health::HealthCheckRequest {
			service: "known".to_string(),
		});
		let resp = svc.call(req).await.unwrap();
		assert_eq!(
			resp.into_inner().status,
			proto::health::health_check_response::ServingStatus::Serving as i32
		);
	}
}
