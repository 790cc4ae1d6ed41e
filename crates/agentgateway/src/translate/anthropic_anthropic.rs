//! Anthropic -> Anthropic direct: passthrough (spec.md §4.4 translator
//! table, row 6). Request and response bodies are forwarded unchanged;
//! usage is read off the Messages response/SSE shape so the cumulative
//! `Usage` the upstream processor tracks stays populated even on a
//! passthrough backend.

use bytes::Bytes;
use serde_json::Value;

use super::headers::HeaderSet;
use super::sse::SseReader;
use super::types::{ParsedRequest, Usage};
use super::{ResponseState, TranslateError, Translator};

pub struct AnthropicAnthropic;

impl AnthropicAnthropic {
	pub fn new() -> Self {
		Self
	}
}

impl Default for AnthropicAnthropic {
	fn default() -> Self {
		Self::new()
	}
}

/// Shared by every Anthropic-dialect-response translator: Messages usage is
/// reported as `{input_tokens, output_tokens, cache_read_input_tokens,
/// cache_creation_input_tokens}`, never a `total`.
pub(super) fn anthropic_usage(value: &Value) -> Usage {
	let usage = value.get("usage").cloned().unwrap_or_default();
	let input = usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
	let output = usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32;
	Usage {
		input,
		cached_input: usage.get("cache_read_input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
		cache_creation_input: usage.get("cache_creation_input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
		output,
		total: input + output,
	}
}

#[async_trait::async_trait]
impl Translator for AnthropicAnthropic {
	fn request_body(
		&self,
		raw: &[u8],
		_parsed: &ParsedRequest,
		force: bool,
	) -> Result<(HeaderSet, Option<Bytes>), TranslateError> {
		let body = force.then(|| Bytes::copy_from_slice(raw));
		Ok((HeaderSet::default(), body))
	}

	fn response_body(
		&self,
		chunk: &[u8],
		end_of_stream: bool,
		state: &mut ResponseState,
	) -> Result<(Option<Bytes>, Usage, Option<String>), TranslateError> {
		// Unary Messages response: single JSON document, forwarded verbatim.
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

		// Streaming: forward each SSE event as-is, only peeking at it to keep
		// cumulative usage and the observed response model up to date.
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
	fn passthrough_unary_response_tracks_usage() {
		let translator = AnthropicAnthropic::new();
		let mut state = ResponseState::default();
		let body = br#"{"type":"message","model":"claude-3-haiku","usage":{"input_tokens":10,"output_tokens":5}}"#;
		let (out, usage, model) = translator.response_body(body, true, &mut state).unwrap();
		assert_eq!(out.unwrap().as_ref(), body);
		assert_eq!(usage.input, 10);
		assert_eq!(usage.output, 5);
		assert_eq!(usage.total, 15);
		assert_eq!(model.as_deref(), Some("claude-3-haiku"));
	}
}
