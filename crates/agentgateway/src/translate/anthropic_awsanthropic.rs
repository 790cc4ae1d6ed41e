//! Anthropic -> AWS Anthropic (Bedrock-hosted Claude): rewrite target path
//! to `/model/<id>/invoke[-with-response-stream]`, inject
//! `anthropic_version: bedrock-2023-05-31`, strip the top-level `model`
//! field (spec.md §4.4 translator table, row 7; scenario 3). Response-side
//! unwraps AWS event-stream frames whose `bytes` field base64-decodes to an
//! Anthropic SSE event, which is re-emitted to the client verbatim.

use bytes::{Bytes, BytesMut};
use serde_json::Value;

use super::anthropic_anthropic::anthropic_usage;
use super::headers::HeaderSet;
use super::types::{ParsedRequest, Usage};
use super::{ResponseState, TranslateError, Translator};

pub struct AnthropicAwsAnthropic;

impl AnthropicAwsAnthropic {
	pub fn new() -> Self {
		Self
	}
}

impl Default for AnthropicAwsAnthropic {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl Translator for AnthropicAwsAnthropic {
	fn request_body(
		&self,
		_raw: &[u8],
		parsed: &ParsedRequest,
		_force: bool,
	) -> Result<(HeaderSet, Option<Bytes>), TranslateError> {
		let action = if parsed.stream { "invoke-with-response-stream" } else { "invoke" };
		let path = format!("/model/{}/{action}", parsed.model);
		let headers = HeaderSet::default().with_path(path);

		let mut body = parsed.value.clone();
		if let Some(map) = body.as_object_mut() {
			map.remove("model");
			map.insert(
				"anthropic_version".to_string(),
				Value::String("bedrock-2023-05-31".to_string()),
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
		// Unary `invoke`: one complete Messages JSON document, no event-stream
		// framing at all.
		if !state.buffer.is_empty() || looks_like_event_stream_frame(chunk) {
			// fall through to event-stream decoding below
		} else if let Ok(value) = serde_json::from_slice::<Value>(chunk) {
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

		let mut buf = BytesMut::from(&state.buffer[..]);
		let events = super::aws_event_stream::feed(&mut buf, chunk)?;
		state.buffer = buf.to_vec();

		let mut out = Vec::new();
		for event in events {
			// Each AWS event-stream frame's decoded payload *is* one Anthropic
			// SSE event's JSON body (no further `event:`/`data:` framing inside
			// it); re-wrap it as SSE for the client.
			if let Ok(value) = serde_json::from_slice::<Value>(&event.payload) {
				let kind = value.get("type").and_then(Value::as_str).unwrap_or("message").to_string();
				match kind.as_str() {
					"message_start" => {
						if let Some(model) = value.get("message").and_then(|m| m.get("model")).and_then(Value::as_str) {
							state.response_model = Some(model.to_string());
						}
						if let Some(message) = value.get("message") {
							state.cumulative.merge_cumulative(anthropic_usage(message));
						}
					},
					"message_delta" => {
						state.cumulative.merge_cumulative(anthropic_usage(&value));
					},
					_ => {},
				}
				let sse_event = super::sse::SseEvent {
					event: Some(kind),
					data: String::from_utf8_lossy(&event.payload).to_string(),
					id: None,
				};
				out.extend_from_slice(&super::sse::format_event(&sse_event));
			}
		}
		let _ = end_of_stream;
		Ok((Some(Bytes::from(out)), state.cumulative, state.response_model.clone()))
	}

	fn response_error(&self, status: u16, body: &[u8]) -> Bytes {
		super::anthropic_error_envelope(status, body)
	}
}

/// AWS event-stream frames begin with a 4-byte big-endian total-length
/// prefix; a JSON document never starts with `{` *and* those same bytes, so
/// this is enough of a heuristic to route the first chunk of a response
/// correctly without buffering ahead.
fn looks_like_event_stream_frame(chunk: &[u8]) -> bool {
	chunk.first() != Some(&b'{')
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn strips_model_and_injects_anthropic_version() {
		let translator = AnthropicAwsAnthropic::new();
		let parsed = ParsedRequest {
			model: "anthropic.claude-3-haiku-20240307-v1:0".to_string(),
			stream: true,
			value: serde_json::json!({
				"model": "anthropic.claude-3-haiku-20240307-v1:0",
				"max_tokens": 150,
				"messages": [{"role": "user", "content": "hi"}],
				"stream": true,
			}),
		};
		let (headers, body) = translator.request_body(b"", &parsed, false).unwrap();
		assert_eq!(
			headers.path.as_deref(),
			Some("/model/anthropic.claude-3-haiku-20240307-v1:0/invoke-with-response-stream")
		);
		let value: Value = serde_json::from_slice(&body.unwrap()).unwrap();
		assert!(value.get("model").is_none());
		assert_eq!(value["anthropic_version"], Value::String("bedrock-2023-05-31".into()));
	}
}
