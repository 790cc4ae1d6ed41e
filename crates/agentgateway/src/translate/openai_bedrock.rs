//! OpenAI -> AWS Bedrock Converse: request conversion to the Converse
//! schema, response conversion from Converse (or Converse-stream, AWS
//! event-stream framed) back to OpenAI `chat.completion[.chunk]` shape.
//! Grounded on the teacher's `llm/bedrock.rs` path-selection
//! (`get_path_for_route`) and `llm/types/bedrock.rs` Converse types, which
//! this reimplements over `serde_json::Value` rather than the teacher's
//! fully-typed `ContentBlock` enum, since only a handful of fields need to
//! round-trip through this translator rather than every Converse feature
//! the teacher's client-facing provider exposes.

use bytes::Bytes;
use serde_json::{Value, json};

use super::headers::HeaderSet;
use super::types::{ParsedRequest, Usage};
use super::{ResponseState, TranslateError, Translator};

pub struct OpenAiBedrock;

impl OpenAiBedrock {
	pub fn new() -> Self {
		Self
	}
}

impl Default for OpenAiBedrock {
	fn default() -> Self {
		Self::new()
	}
}

fn converse_request(parsed: &ParsedRequest) -> Value {
	let messages = parsed.value.get("messages").and_then(Value::as_array).cloned().unwrap_or_default();
	let mut system = Vec::new();
	let mut converse_messages = Vec::new();
	for message in messages {
		let role = message.get("role").and_then(Value::as_str).unwrap_or("user");
		let content = message.get("content").and_then(Value::as_str).unwrap_or_default();
		if role == "system" {
			system.push(json!({ "text": content }));
			continue;
		}
		let role = if role == "assistant" { "assistant" } else { "user" };
		converse_messages.push(json!({
			"role": role,
			"content": [{ "text": content }],
		}));
	}
	json!({
		"messages": converse_messages,
		"system": system,
		"inferenceConfig": {},
	})
}

fn converse_to_openai(model: &str, request_id: Option<&str>, value: &Value) -> Value {
	let content = value
		.get("output")
		.and_then(|o| o.get("message"))
		.and_then(|m| m.get("content"))
		.and_then(Value::as_array)
		.cloned()
		.unwrap_or_default();
	let role = value
		.get("output")
		.and_then(|o| o.get("message"))
		.and_then(|m| m.get("role"))
		.and_then(Value::as_str)
		.unwrap_or("assistant");
	let text: String = content
		.iter()
		.filter_map(|block| block.get("text").and_then(Value::as_str))
		.collect::<Vec<_>>()
		.join("");

	let usage = value.get("usage").cloned().unwrap_or_default();
	json!({
		"id": request_id.unwrap_or_default(),
		"object": "chat.completion",
		"model": model,
		"choices": [{
			"index": 0,
			"message": { "role": role, "content": text },
			"finish_reason": "stop",
		}],
		"usage": {
			"prompt_tokens": usage.get("inputTokens").cloned().unwrap_or(json!(0)),
			"completion_tokens": usage.get("outputTokens").cloned().unwrap_or(json!(0)),
			"total_tokens": usage.get("totalTokens").cloned().unwrap_or(json!(0)),
		},
	})
}

fn parse_usage(value: &Value) -> Usage {
	let usage = value.get("usage").cloned().unwrap_or_default();
	Usage {
		input: usage.get("inputTokens").and_then(Value::as_u64).unwrap_or(0) as u32,
		cached_input: 0,
		cache_creation_input: 0,
		output: usage.get("outputTokens").and_then(Value::as_u64).unwrap_or(0) as u32,
		total: usage.get("totalTokens").and_then(Value::as_u64).unwrap_or(0) as u32,
	}
}

#[async_trait::async_trait]
impl Translator for OpenAiBedrock {
	fn request_body(
		&self,
		_raw: &[u8],
		parsed: &ParsedRequest,
		_force: bool,
	) -> Result<(HeaderSet, Option<Bytes>), TranslateError> {
		let path = if parsed.stream {
			format!("/model/{}/converse-stream", parsed.model)
		} else {
			format!("/model/{}/converse", parsed.model)
		};
		let headers = HeaderSet::default().with_path(path);
		let body = converse_request(parsed);
		let body = serde_json::to_vec(&body)
			.map_err(|e| TranslateError::Translation(e.to_string()))?;
		Ok((headers, Some(Bytes::from(body))))
	}

	fn response_body(
		&self,
		chunk: &[u8],
		end_of_stream: bool,
		state: &mut ResponseState,
	) -> Result<(Option<Bytes>, Usage, Option<String>), TranslateError> {
		// Unary Converse response: one complete JSON document.
		if let Ok(value) = serde_json::from_slice::<Value>(chunk) {
			if value.get("output").is_some() {
				let request_id = state.response_headers.get("x-amzn-requestid").cloned();
				state.cumulative.merge_cumulative(parse_usage(&value));
				let model = value
					.get("modelId")
					.and_then(Value::as_str)
					.map(str::to_string)
					.unwrap_or_else(|| state.request_model.clone());
				let out = converse_to_openai(&model, request_id.as_deref(), &value);
				return Ok((
					Some(Bytes::from(serde_json::to_vec(&out).unwrap_or_default())),
					state.cumulative,
					Some(model),
				));
			}
		}

		// Converse-stream response: AWS event-stream framed chunks, re-emitted
		// as OpenAI SSE chunk objects.
		let mut buf = bytes::BytesMut::from(&state.buffer[..]);
		let events = super::aws_event_stream::feed(&mut buf, chunk)?;
		state.buffer = buf.to_vec();

		let mut out = Vec::new();
		for event in events {
			if let Ok(payload) = serde_json::from_slice::<Value>(&event.payload) {
				if let Some(usage) = payload.get("usage") {
					state.cumulative.merge_cumulative(parse_usage(&json!({ "usage": usage })));
				}
				if let Some(delta) = payload.get("delta").and_then(|d| d.get("text")).and_then(Value::as_str) {
					let chunk_obj = json!({
						"object": "chat.completion.chunk",
						"choices": [{ "index": 0, "delta": { "content": delta } }],
					});
					out.extend_from_slice(format!("data: {}\n\n", chunk_obj).as_bytes());
				}
			}
		}
		if end_of_stream {
			out.extend_from_slice(b"data: [DONE]\n\n");
		}
		Ok((Some(Bytes::from(out)), state.cumulative, state.response_model.clone()))
	}

	fn response_error(&self, status: u16, body: &[u8]) -> Bytes {
		super::openai_error_envelope(status, body)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::translate::ResponseState;

	/// spec.md §8 scenario 1: OpenAI -> AWS Bedrock, non-streaming.
	#[test]
	fn converse_request_splits_system_messages() {
		let parsed = ParsedRequest {
			model: "something".to_string(),
			stream: false,
			value: json!({
				"model": "something",
				"messages": [{ "role": "system", "content": "You are a chatbot." }],
			}),
		};
		let body = converse_request(&parsed);
		assert_eq!(
			body,
			json!({
				"inferenceConfig": {},
				"messages": [],
				"system": [{ "text": "You are a chatbot." }],
			})
		);
	}

	#[test]
	fn request_body_targets_converse_path_for_unary_requests() {
		let translator = OpenAiBedrock::new();
		let parsed = ParsedRequest {
			model: "something".to_string(),
			stream: false,
			value: json!({ "model": "something", "messages": [] }),
		};
		let (headers, _) = translator.request_body(b"{}", &parsed, false).unwrap();
		assert_eq!(headers.path.as_deref(), Some("/model/something/converse"));
	}

	#[test]
	fn request_body_targets_converse_stream_path_for_streaming_requests() {
		let translator = OpenAiBedrock::new();
		let parsed = ParsedRequest {
			model: "something".to_string(),
			stream: true,
			value: json!({ "model": "something", "stream": true, "messages": [] }),
		};
		let (headers, _) = translator.request_body(b"{}", &parsed, false).unwrap();
		assert_eq!(headers.path.as_deref(), Some("/model/something/converse-stream"));
	}

	#[test]
	fn unary_response_uses_amzn_request_id_and_original_model() {
		let translator = OpenAiBedrock::new();
		let mut state = ResponseState {
			request_model: "something".to_string(),
			..Default::default()
		};
		state
			.response_headers
			.insert("x-amzn-requestid".to_string(), "2bc5b090-abcd".to_string());
		let upstream = json!({
			"output": {
				"message": {
					"role": "assistant",
					"content": [{ "text": "response" }, { "text": "from" }, { "text": "assistant" }],
				}
			},
			"usage": { "inputTokens": 10, "outputTokens": 20, "totalTokens": 30 },
		});
		let raw = serde_json::to_vec(&upstream).unwrap();
		let (body, usage, model) = translator.response_body(&raw, true, &mut state).unwrap();
		let body: Value = serde_json::from_slice(&body.unwrap()).unwrap();
		assert_eq!(body["id"], "2bc5b090-abcd");
		assert_eq!(body["model"], "something");
		assert_eq!(body["object"], "chat.completion");
		assert_eq!(body["choices"][0]["message"]["content"], "responsefromassistant");
		assert_eq!(body["choices"][0]["message"]["role"], "assistant");
		assert_eq!(body["usage"]["prompt_tokens"], 10);
		assert_eq!(body["usage"]["completion_tokens"], 20);
		assert_eq!(body["usage"]["total_tokens"], 30);
		assert_eq!(usage.input, 10);
		assert_eq!(usage.output, 20);
		assert_eq!(model.as_deref(), Some("something"));
	}
}
