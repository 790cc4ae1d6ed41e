//! MCP proxy (spec.md §4.7): one HTTP handler, bound to a route's backend
//! list, that fans a client's MCP session out across every backend on
//! `initialize`, routes subsequent calls to the backend that owns the
//! requested tool, and multiplexes a notification stream back to the
//! client. Grounded on the teacher's `mcp/` subsystem (`session.rs`,
//! `rbac.rs`, `streamablehttp.rs`) but considerably narrower: no legacy SSE
//! transport, no stdio/OpenAPI backend kinds, and no server-side session
//! store — every piece of per-session state the proxy needs travels inside
//! the encrypted composite session id, so there is nothing to persist
//! (spec.md §6: "Persisted state: none; all state is in-memory").

pub mod config;
pub mod handler;
pub mod rbac;
pub mod session;
pub mod sse;

use thiserror::Error;

pub use config::McpConfig;

#[derive(Debug, Error)]
pub enum McpError {
	#[error("method not allowed")]
	MethodNotAllowed,
	#[error("unknown mcp route")]
	UnknownRoute,
	#[error("missing mcp-session-id header")]
	SessionIdRequired,
	#[error("invalid or expired mcp-session-id")]
	UnknownSession,
	#[error("invalid accept header")]
	InvalidAccept,
	#[error("invalid content-type header")]
	InvalidContentType,
	#[error("failed to deserialize request body: {0}")]
	Deserialize(#[from] serde_json::Error),
	#[error("every backend rejected session initialization")]
	AllBackendsFailed,
	#[error("unknown tool: {0}")]
	UnknownTool(String),
	#[error("backend {0} unavailable for this session")]
	BackendUnavailable(String),
	#[error("authorization denied")]
	Authorization { www_authenticate: String },
	#[error("invalid backend address: {0}")]
	InvalidBackendAddress(String),
	#[error("backend request failed: {0}")]
	Backend(String),
	#[error("session id encryption error")]
	Crypto,
	#[error("malformed session id")]
	MalformedSessionId,
}

impl McpError {
	pub fn status(&self) -> http::StatusCode {
		use http::StatusCode;
		match self {
			McpError::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
			McpError::UnknownRoute => StatusCode::NOT_FOUND,
			McpError::SessionIdRequired | McpError::UnknownSession | McpError::MalformedSessionId => {
				StatusCode::BAD_REQUEST
			},
			McpError::InvalidAccept | McpError::InvalidContentType => StatusCode::NOT_ACCEPTABLE,
			McpError::Deserialize(_) => StatusCode::BAD_REQUEST,
			McpError::AllBackendsFailed => StatusCode::BAD_GATEWAY,
			McpError::UnknownTool(_) => StatusCode::NOT_FOUND,
			McpError::BackendUnavailable(_) => StatusCode::BAD_GATEWAY,
			McpError::Authorization { .. } => StatusCode::UNAUTHORIZED,
			McpError::InvalidBackendAddress(_) => StatusCode::INTERNAL_SERVER_ERROR,
			McpError::Backend(_) => StatusCode::BAD_GATEWAY,
			McpError::Crypto | McpError::MalformedSessionId => StatusCode::INTERNAL_SERVER_ERROR,
		}
	}

	pub fn into_response(self) -> http::Response<bytes::Bytes> {
		let status = self.status();
		let www_authenticate = if let McpError::Authorization { www_authenticate } = &self {
			Some(www_authenticate.clone())
		} else {
			None
		};
		let body = serde_json::json!({"error": self.to_string()}).to_string();
		let mut builder = http::Response::builder().status(status).header(http::header::CONTENT_TYPE, "application/json");
		if let Some(header) = www_authenticate {
			builder = builder.header(http::header::WWW_AUTHENTICATE, header);
		}
		builder.body(bytes::Bytes::from(body)).expect("valid response")
	}
}
