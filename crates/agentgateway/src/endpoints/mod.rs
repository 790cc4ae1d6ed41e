//! Endpoint specs (spec.md §4.3): one per advertised path, each responsible
//! for parsing its request dialect's body, selecting the translator for a
//! chosen backend schema, and (optionally) producing a redacted clone for
//! debug logging. Grounded on the dispatch-by-path shape of the teacher's
//! `llm/mod.rs` (`AIProvider`/`RouteType` keyed by advertised path), adapted
//! from a multi-provider load-balancer selection to the one-spec-per-path
//! registry spec.md describes.

mod messages;
mod models;
mod openai_family;
mod rerank;

pub use messages::MessagesSpec;
pub use models::ModelsSpec;
pub use openai_family::OpenAiFamilySpec;
pub use rerank::RerankSpec;

use std::sync::Arc;

use bytes::Bytes;

use crate::config::BackendSchema;
use crate::translate::{SourceDialect, TranslateError, Translator, get_translator, types::ParsedRequest};

/// What `ParseBody` hands back, per spec.md §4.3: the model as first seen
/// (immutable once recorded, per `RequestState.original-model`), the parsed
/// request, whether it's streaming, and — only when the router had to
/// rewrite the raw body (`include_usage` enforcement) — the replacement
/// bytes.
pub struct ParseOutcome {
	pub original_model: String,
	pub parsed: ParsedRequest,
	pub stream: bool,
	pub rewritten_raw: Option<Bytes>,
}

/// One endpoint spec per advertised path (spec.md §4.3's list:
/// `/v1/chat/completions`, `/v1/completions`, `/v1/embeddings`,
/// `/v1/images/generations`, `/v1/responses`, `/v1/messages`, `/v2/rerank`,
/// `/v1/audio/speech`, `/v1/models`; the MCP handler is a separate,
/// non-translating HTTP surface — see `crate::mcp`).
pub trait EndpointSpec: Send + Sync {
	fn parse_body(&self, raw: &[u8], costs_configured: bool) -> Result<ParseOutcome, TranslateError>;

	fn get_translator(
		&self,
		backend: &BackendSchema,
		model_override: Option<&str>,
	) -> Result<Arc<dyn Translator>, TranslateError>;

	/// Placeholder-substituted clone for debug logging only (spec.md §4.3);
	/// never used on the actual request that reaches the backend. Default: no
	/// redaction needed (the endpoint carries no secret-shaped fields).
	fn redact_sensitive_info_from_request(&self, parsed: &ParsedRequest) -> ParsedRequest {
		parsed.clone()
	}
}

/// Strip the query string before path lookup (spec.md §4.1 step 2: "no
/// prefix matching"). Route selection elsewhere in the pipeline still sees
/// the full string with query, per spec.md's boundary behavior list.
pub fn strip_query(path: &str) -> &str {
	path.split('?').next().unwrap_or(path)
}

/// Build the registry of advertised endpoints. Backed by a plain `Vec` keyed
/// by exact path match rather than a `HashMap`: the set is small, fixed at
/// startup, and a linear scan over ~9 entries costs nothing next to an
/// upstream HTTP round trip.
pub fn registry() -> Vec<(&'static str, Arc<dyn EndpointSpec>)> {
	vec![
		(
			"/v1/chat/completions",
			Arc::new(OpenAiFamilySpec::chat_completions()) as Arc<dyn EndpointSpec>,
		),
		("/v1/completions", Arc::new(OpenAiFamilySpec::completions())),
		("/v1/embeddings", Arc::new(OpenAiFamilySpec::embeddings())),
		("/v1/images/generations", Arc::new(OpenAiFamilySpec::images())),
		("/v1/responses", Arc::new(OpenAiFamilySpec::responses())),
		("/v1/audio/speech", Arc::new(OpenAiFamilySpec::audio_speech())),
		("/v1/messages", Arc::new(MessagesSpec)),
		("/v2/rerank", Arc::new(RerankSpec)),
		("/v1/models", Arc::new(ModelsSpec)),
	]
}

/// Resolve a translator for a source/backend pair shared by every
/// OpenAI-family and Anthropic/Cohere endpoint: the matrix in spec.md §4.4
/// is keyed by (source dialect, backend dialect), not by advertised path, so
/// every endpoint in the same dialect family reuses the same dispatch.
pub(crate) fn resolve_translator(
	source: SourceDialect,
	backend: &BackendSchema,
	model_override: Option<&str>,
) -> Result<Arc<dyn Translator>, TranslateError> {
	get_translator(source, backend, model_override)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strip_query_drops_query_string_only() {
		assert_eq!(strip_query("/v1/chat/completions?foo=bar"), "/v1/chat/completions");
		assert_eq!(strip_query("/v1/chat/completions"), "/v1/chat/completions");
	}
}
