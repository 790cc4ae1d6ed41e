//! Anthropic -> GCP Anthropic (Vertex-hosted Claude): rewrite target path to
//! `:rawPredict`/`:streamRawPredict`, inject `anthropic_version:
//! vertex-2023-10-16`, strip `model` (spec.md §4.4 translator table, row 8).
//! Response-side is a plain Anthropic SSE/unary passthrough — unlike
//! Bedrock, Vertex does not wrap the stream in AWS event-stream framing.

use bytes::Bytes;
use serde_json::Value;

use super::anthropic_anthropic::anthropic_usage;
use super::headers::HeaderSet;
use super::sse::SseReader;
use super::types::{ParsedRequest, Usage};
use super::{ResponseState, TranslateError, Translator};

pub struct AnthropicGcpAnthropic {
	project_path_prefix: String,
}

impl AnthropicGcpAnthropic {
	pub fn new(project_path_prefix: String) -> Self {
		Self { project_path_prefix }
	}
}

#[async_trait::async_trait]
impl Translator for AnthropicGcpAnthropic {
	fn request_body(
		&self,
		_raw: &[u8],
		parsed: &ParsedRequest,
		_force: bool,
	) -> Result<(HeaderSet, Option<Bytes>), TranslateError> {
		let action = if parsed.stream { "streamRawPredict" } else { "rawPredict" };
		let path = format!(
			"{}/models/{}:{action}",
			self.project_path_prefix.trim_end_matches('/'),
			parsed.model
		);
		let headers = HeaderSet::default().with_path(path);

		let mut body = parsed.value.clone();
		if let Some(map) = body.as_object_mut() {
			map.remove("model");
			map.insert(
				"anthropic_version".to_string(),
				Value::String("vertex-2023-10-16".to_string()),
			);
		}
		let body = serde_json::to_vec(&body).map_err(|e| TranslateError::Translation(e.to_string()))?;
		Ok((headers, Some(Bytes::from(body))))
	}

	fn response_body(
		&self,
		chunk: &[u8],
		end_of_stream: bool,
		state: &mut ResponseState,
	) -> Result<(Option<Bytes>, Usage, Option<String>), TranslateError> {
		if let Ok(value) = serde_json::from_slice::<Value>(chunk) {
			if value.get("type").and_then(Value::as_str) == Some("message") {
				state.cumulative.merge_cumulative(anthropic_usage(&value));
				if let Some(model) = value.get("model").and_then(Value::as_str) {
					state.response_model = Some(model.to_string());
				}
				return Ok((
					Some(Bytes::copy_from_slice(chunk)),
					state.cumulative,
					state.response_model.clone(),
				));
			}
		}

		let events = SseReader::feed(&mut state.buffer, chunk);
		let mut out = Vec::new();
		for event in &events {
			if let Ok(value) = serde_json::from_str::<Value>(&event.data) {
				match value.get("type").and_then(Value::as_str) {
					Some("message_start") => {
						if let Some(model) = value.get("message").and_then(|m| m.get("model")).and_then(Value::as_str) {
							state.response_model = Some(model.to_string());
						}
						if let Some(message) = value.get("message") {
							state.cumulative.merge_cumulative(anthropic_usage(message));
						}
					},
					Some("message_delta") => {
						state.cumulative.merge_cumulative(anthropic_usage(&value));
					},
					_ => {},
				}
			}
			out.extend_from_slice(&super::sse::format_event(event));
		}
		let _ = end_of_stream;
		Ok((Some(Bytes::from(out)), state.cumulative, state.response_model.clone()))
	}

	fn response_error(&self, status: u16, body: &[u8]) -> Bytes {
		super::anthropic_error_envelope(status, body)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn rewrites_path_and_version() {
		let translator = AnthropicGcpAnthropic::new("/v1/projects/p/locations/l/publishers/anthropic".to_string());
		let parsed = ParsedRequest {
			model: "claude-3-haiku@20240307".to_string(),
			stream: false,
			value: serde_json::json!({"model": "claude-3-haiku@20240307", "max_tokens": 10, "messages": []}),
		};
		let (headers, body) = translator.request_body(b"", &parsed, false).unwrap();
		assert_eq!(
			headers.path.as_deref(),
			Some("/v1/projects/p/locations/l/publishers/anthropic/models/claude-3-haiku@20240307:rawPredict")
		);
		let value: Value = serde_json::from_slice(&body.unwrap()).unwrap();
		assert!(value.get("model").is_none());
		assert_eq!(value["anthropic_version"], Value::String("vertex-2023-10-16".into()));
	}
}
