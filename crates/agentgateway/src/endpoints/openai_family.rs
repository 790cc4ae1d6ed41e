//! The OpenAI-dialect endpoint family: chat/completions, legacy
//! completions, embeddings, image generation, responses, and audio speech
//! all parse the same way (a JSON object with a `model` field and an
//! optional `stream` flag) and share the same translator matrix keyed by
//! `SourceDialect::OpenAiChat` (spec.md §4.4's table names the pairs once,
//! not once per advertised path). What differs per endpoint is only the
//! `include_usage` enforcement, which spec.md §4.3 scopes specifically to
//! chat/completions.

use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;

use super::{EndpointSpec, ParseOutcome};
use crate::config::BackendSchema;
use crate::translate::{SourceDialect, TranslateError, Translator, types::ParsedRequest};

pub struct OpenAiFamilySpec {
	path: &'static str,
	/// Only chat/completions streaming requests get `stream_options.
	/// include_usage` force-enabled (spec.md §4.3's endpoint-level
	/// invariant).
	enforce_include_usage: bool,
}

impl OpenAiFamilySpec {
	pub fn chat_completions() -> Self {
		Self {
			path: "/v1/chat/completions",
			enforce_include_usage: true,
		}
	}
	pub fn completions() -> Self {
		Self {
			path: "/v1/completions",
			enforce_include_usage: false,
		}
	}
	pub fn embeddings() -> Self {
		Self {
			path: "/v1/embeddings",
			enforce_include_usage: false,
		}
	}
	pub fn images() -> Self {
		Self {
			path: "/v1/images/generations",
			enforce_include_usage: false,
		}
	}
	pub fn responses() -> Self {
		Self {
			path: "/v1/responses",
			enforce_include_usage: false,
		}
	}
	pub fn audio_speech() -> Self {
		Self {
			path: "/v1/audio/speech",
			enforce_include_usage: false,
		}
	}
}

impl EndpointSpec for OpenAiFamilySpec {
	fn parse_body(&self, raw: &[u8], costs_configured: bool) -> Result<ParseOutcome, TranslateError> {
		let parsed = ParsedRequest::openai_chat(raw)?;
		let original_model = parsed.model.clone();

		if self.enforce_include_usage && parsed.stream && costs_configured {
			let (rewritten, parsed) = force_include_usage(raw, parsed)?;
			return Ok(ParseOutcome {
				original_model,
				stream: parsed.stream,
				parsed,
				rewritten_raw: Some(rewritten),
			});
		}

		Ok(ParseOutcome {
			original_model,
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
		super::resolve_translator(SourceDialect::OpenAiChat, backend, model_override).map_err(|e| match e {
			TranslateError::UnsupportedRoute { backend } => TranslateError::UnsupportedRoute {
				backend: format!("{backend} (endpoint={})", self.path),
			},
			other => other,
		})
	}
}

/// Ensure `stream_options.include_usage == true` whether or not the client
/// supplied `stream_options` at all (spec.md §4.3, testable property
/// "Include-usage enforcement", scenario 2). Always reparses into a fresh
/// `ParsedRequest` so `force-body-mutation` downstream sees a body that
/// matches what's now recorded.
fn force_include_usage(
	raw: &[u8],
	parsed: ParsedRequest,
) -> Result<(Bytes, ParsedRequest), TranslateError> {
	let mut value = parsed.value;
	let stream_options = value
		.as_object_mut()
		.ok_or_else(|| TranslateError::MalformedRequest("request body is not a JSON object".into()))?
		.entry("stream_options")
		.or_insert_with(|| Value::Object(Default::default()));
	if let Some(map) = stream_options.as_object_mut() {
		map.insert("include_usage".to_string(), Value::Bool(true));
	} else {
		*stream_options = serde_json::json!({ "include_usage": true });
	}
	let rewritten = serde_json::to_vec(&value).map_err(|e| TranslateError::MalformedRequest(e.to_string()))?;
	let parsed = ParsedRequest::openai_chat(&rewritten)?;
	let _ = raw;
	Ok((Bytes::from(rewritten), parsed))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn forces_include_usage_when_absent() {
		let spec = OpenAiFamilySpec::chat_completions();
		let raw = br#"{"model":"something","messages":[],"stream":true}"#;
		let outcome = spec.parse_body(raw, true).unwrap();
		let rewritten = outcome.rewritten_raw.expect("body must be rewritten");
		let value: Value = serde_json::from_slice(&rewritten).unwrap();
		assert_eq!(value["stream_options"]["include_usage"], Value::Bool(true));
	}

	#[test]
	fn leaves_non_streaming_request_untouched() {
		let spec = OpenAiFamilySpec::chat_completions();
		let raw = br#"{"model":"something","messages":[]}"#;
		let outcome = spec.parse_body(raw, true).unwrap();
		assert!(outcome.rewritten_raw.is_none());
	}

	#[test]
	fn leaves_streaming_untouched_without_cost_rules() {
		let spec = OpenAiFamilySpec::chat_completions();
		let raw = br#"{"model":"something","messages":[],"stream":true}"#;
		let outcome = spec.parse_body(raw, false).unwrap();
		assert!(outcome.rewritten_raw.is_none());
	}

	#[test]
	fn other_endpoints_never_enforce_include_usage() {
		let spec = OpenAiFamilySpec::completions();
		let raw = br#"{"model":"something","prompt":"hi","stream":true}"#;
		let outcome = spec.parse_body(raw, true).unwrap();
		assert!(outcome.rewritten_raw.is_none());
	}
}
