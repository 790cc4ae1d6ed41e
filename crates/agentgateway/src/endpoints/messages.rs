//! `/v1/messages`, the Anthropic-native Messages endpoint (spec.md §4.3).
//! Rejects an empty `model` field per the endpoint-level invariant; no
//! `include_usage`-style body rewrite applies to this dialect.

use std::sync::Arc;

use super::{EndpointSpec, ParseOutcome};
use crate::config::BackendSchema;
use crate::translate::{SourceDialect, TranslateError, Translator, types::ParsedRequest};

pub struct MessagesSpec;

impl EndpointSpec for MessagesSpec {
	fn parse_body(&self, raw: &[u8], _costs_configured: bool) -> Result<ParseOutcome, TranslateError> {
		let parsed = ParsedRequest::anthropic_messages(raw)?;
		Ok(ParseOutcome {
			original_model: parsed.model.clone(),
			stream: parsed.stream,
			parsed,
			rewritten_raw: None,
		})
	}

	fn get_translator(
		&self,
		backend: &BackendSchema,
		model_override: Option<&str>,
	) -> Result<Arc<dyn Translator>, TranslateError> {
		super::resolve_translator(SourceDialect::Anthropic, backend, model_override).map_err(|e| match e {
			TranslateError::UnsupportedRoute { backend } => TranslateError::UnsupportedRoute {
				backend: format!("{backend} (endpoint=/v1/messages)"),
			},
			other => other,
		})
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rejects_empty_model() {
		let spec = MessagesSpec;
		let raw = br#"{"model":"","max_tokens":10,"messages":[]}"#;
		let err = spec.parse_body(raw, false).unwrap_err();
		assert!(matches!(err, TranslateError::MalformedRequest(msg) if msg.contains("model field is required")));
	}

	#[test]
	fn parses_valid_request() {
		let spec = MessagesSpec;
		let raw = br#"{"model":"claude-3-haiku","max_tokens":10,"messages":[],"stream":true}"#;
		let outcome = spec.parse_body(raw, false).unwrap();
		assert_eq!(outcome.original_model, "claude-3-haiku");
		assert!(outcome.stream);
	}
}
