//! OpenAI -> GCP Anthropic (Vertex-hosted Claude): convert to Anthropic
//! Messages schema plus `anthropic_version: vertex-2023-10-16`, path
//! `:rawPredict`/`:streamRawPredict`. Response-side reuses the Anthropic SSE
//! decoding shared with `anthropic_anthropic`, then flattens to OpenAI
//! chunks.

use bytes::Bytes;
use serde_json::{Value, json};

use super::headers::HeaderSet;
use super::sse::SseReader;
use super::types::{ParsedRequest, Usage};
use super::{ResponseState, TranslateError, Translator};

pub struct OpenAiGcpAnthropic {
	project_path_prefix: String,
}

impl OpenAiGcpAnthropic {
	pub fn new(project_path_prefix: String) -> Self {
		Self { project_path_prefix }
	}
}

fn messages_request(parsed: &ParsedRequest) -> Value {
	let messages = parsed.value.get("messages").and_then(Value::as_array).cloned().unwrap_or_default();
	let mut system = None;
	let mut out_messages = Vec::new();
	for message in messages {
		let role = message.get("role").and_then(Value::as_str).unwrap_or("user");
		let content = message.get("content").and_then(Value::as_str).unwrap_or_default();
		if role == "system" {
			system = Some(Value::String(content.to_string()));
			continue;
		}
		out_messages.push(json!({ "role": role, "content": content }));
	}
	let mut body = json!({
		"anthropic_version": "vertex-2023-10-16",
		"messages": out_messages,
		"max_tokens": parsed.value.get("max_tokens").cloned().unwrap_or(json!(1024)),
	});
	if let Some(system) = system {
		body["system"] = system;
	}
	body
}

fn anthropic_usage(value: &Value) -> Usage {
	let usage = value.get("usage").cloned().unwrap_or_default();
	Usage {
		input: usage.get("input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
		cached_input: usage.get("cache_read_input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
		cache_creation_input: usage.get("cache_creation_input_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
		output: usage.get("output_tokens").and_then(Value::as_u64).unwrap_or(0) as u32,
		total: 0,
	}
}

fn anthropic_text(value: &Value) -> String {
	value
		.get("content")
		.and_then(Value::as_array)
		.map(|blocks| {
			blocks
				.iter()
				.filter_map(|b| b.get("text").and_then(Value::as_str))
				.collect::<Vec<_>>()
				.join("")
		})
		.unwrap_or_default()
}

#[async_trait::async_trait]
impl Translator for OpenAiGcpAnthropic {
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
		let body = messages_request(parsed);
		let body =
			serde_json::to_vec(&body).map_err(|e| TranslateError::Translation(e.to_string()))?;
		Ok((headers, Some(Bytes::from(body))))
	}

	fn response_body(
		&self,
		chunk: &[u8],
		end_of_stream: bool,
		state: &mut ResponseState,
	) -> Result<(Option<Bytes>, Usage, Option<String>), TranslateError> {
		if let Ok(value) = serde_json::from_slice::<Value>(chunk) {
			if value.get("content").is_some() {
				state.cumulative.merge_cumulative(anthropic_usage(&value));
				state.cumulative.total = state.cumulative.input + state.cumulative.output;
				let out = json!({
					"object": "chat.completion",
					"choices": [{
						"index": 0,
						"message": { "role": "assistant", "content": anthropic_text(&value) },
						"finish_reason": "stop",
					}],
					"usage": {
						"prompt_tokens": state.cumulative.input,
						"completion_tokens": state.cumulative.output,
						"total_tokens": state.cumulative.total,
					},
				});
				return Ok((
					Some(Bytes::from(serde_json::to_vec(&out).unwrap_or_default())),
					state.cumulative,
					state.response_model.clone(),
				));
			}
		}

		let events = SseReader::feed(&mut state.buffer, chunk);
		let mut out = Vec::new();
		for event in events {
			let Ok(value) = serde_json::from_str::<Value>(&event.data) else {
				continue;
			};
			match value.get("type").and_then(Value::as_str) {
				Some("message_delta") => {
					state.cumulative.merge_cumulative(anthropic_usage(&value));
					state.cumulative.total = state.cumulative.input + state.cumulative.output;
				},
				Some("content_block_delta") => {
					if let Some(text) = value.get("delta").and_then(|d| d.get("text")).and_then(Value::as_str) {
						let chunk_obj = json!({
							"object": "chat.completion.chunk",
							"choices": [{ "index": 0, "delta": { "content": text } }],
						});
						out.extend_from_slice(format!("data: {chunk_obj}\n\n").as_bytes());
					}
				},
				_ => {},
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
