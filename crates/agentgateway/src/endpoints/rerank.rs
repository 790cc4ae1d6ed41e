//! `/v2/rerank`, the Cohere Rerank endpoint (spec.md §4.3). Unary-only: the
//! Cohere dialect has no streaming mode, so `ParsedRequest::stream` is
//! always `false` for this spec regardless of any client-supplied field.

use std::sync::Arc;

use super::{EndpointSpec, ParseOutcome};
use crate::config::BackendSchema;
use crate::translate::{SourceDialect, TranslateError, Translator, types::ParsedRequest};

pub struct RerankSpec;

impl EndpointSpec for RerankSpec {
	fn parse_body(&self, raw: &[u8], _costs_configured: bool) -> Result<ParseOutcome, TranslateError> {
		let parsed = ParsedRequest::cohere_rerank(raw)?;
		Ok(ParseOutcome {
			original_model: parsed.model.clone(),
			stream: false,
			parsed,
			rewritten_raw: None,
		})
	}

	fn get_translator(
		&self,
		backend: &BackendSchema,
		model_override: Option<&str>,
	) -> Result<Arc<dyn Translator>, TranslateError> {
		super::resolve_translator(SourceDialect::Cohere, backend, model_override).map_err(|e| match e {
			TranslateError::UnsupportedRoute { backend } => TranslateError::UnsupportedRoute {
				backend: format!("{backend} (endpoint=/v2/rerank)"),
			},
			other => other,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_rerank_request() {
		let spec = RerankSpec;
		let raw = br#"{"model":"rerank-english-v3.0","query":"q","documents":["a","b"]}"#;
		let outcome = spec.parse_body(raw, false).unwrap();
		assert_eq!(outcome.original_model, "rerank-english-v3.0");
		assert!(!outcome.stream);
	}
}
