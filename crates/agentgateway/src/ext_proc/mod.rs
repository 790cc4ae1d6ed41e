//! External-processor pipeline (spec.md §4.1/§4.2): a bidirectional
//! streaming RPC that intercepts HTTP request/response headers and bodies
//! phase-by-phase. Two cooperating processor roles share this module —
//! the router processor (`router.rs`), which parses the body and picks a
//! route, and the upstream processor (`upstream.rs`), which translates and
//! authenticates for the chosen backend — correlated across two separate
//! streams by the internal request id in `registry.rs`.

mod compression;
pub mod proto;
mod registry;
mod router;
mod server;
mod span;
mod state;
mod upstream;

pub use registry::RouterRegistry;
pub use router::RouterProcessor;
pub use server::{ExtProcService, HealthService};
pub use state::RequestState;
pub use upstream::UpstreamProcessor;

/// Reserved headers (spec.md §6), all lower-case.
pub const HEADER_MODEL: &str = "x-ai-eg-model";
pub const HEADER_ORIGINAL_PATH: &str = "x-ai-eg-original-path";
pub const HEADER_INTERNAL_REQ_ID: &str = "x-ai-eg-internal-req-id";
pub const HEADER_MCP_BACKEND: &str = "x-ai-eg-mcp-backend";
pub const HEADER_MCP_ROUTE: &str = "x-ai-eg-mcp-route";

/// Error taxonomy kinds from spec.md §7, scoped to the ext_proc pipeline
/// (translator/auth/MCP subsystems have their own `*Error` enums; this one
/// is what a processor's phase methods return, and what `server.rs` maps to
/// a terminal gRPC status per spec.md §4.1's failure semantics).
#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
	#[error("malformed request: {0}")]
	MalformedRequest(String),
	#[error("unsupported route: {0}")]
	UnsupportedRoute(String),
	#[error("translation failed: {0}")]
	Translation(String),
	#[error("auth failed: {0}")]
	Auth(String),
	#[error("upstream error {status}")]
	Upstream { status: u16, body: bytes::Bytes },
	#[error("protocol error: {0}")]
	Protocol(String),
	#[error("internal error: {0}")]
	Internal(String),
}

impl From<crate::translate::TranslateError> for ProcessorError {
	fn from(e: crate::translate::TranslateError) -> Self {
		use crate::translate::TranslateError as T;
		match e {
			T::MalformedRequest(m) => ProcessorError::MalformedRequest(m),
			T::UnsupportedRoute { backend } => ProcessorError::UnsupportedRoute(backend),
			T::Translation(m) => ProcessorError::Translation(m),
			T::Protocol(m) => ProcessorError::Protocol(m),
		}
	}
}

impl From<crate::auth::AuthError> for ProcessorError {
	fn from(e: crate::auth::AuthError) -> Self {
		ProcessorError::Auth(e.to_string())
	}
}

/// Build a `HeaderValueOption` with `OverwriteIfExistsOrAdd`, the default
/// mutation kind this pipeline uses for every header it sets (route
/// selection headers, translated auth headers).
pub(crate) fn set_header(key: &str, value: impl AsRef<[u8]>) -> proto::HeaderValueOption {
	proto::HeaderValueOption {
		header: Some(proto::HeaderValue {
			key: key.to_string(),
			value: String::new(),
			raw_value: value.as_ref().to_vec(),
		}),
		append_action: proto::header_value_option::HeaderAppendAction::OverwriteIfExistsOrAdd as i32,
		keep_empty_value: Some(true),
	}
}
