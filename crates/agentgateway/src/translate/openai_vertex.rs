//! OpenAI -> GCP Vertex AI (Gemini): request conversion to the
//! `generateContent`/`streamGenerateContent` schema, response conversion
//! from Gemini `candidates`/`usageMetadata` back to OpenAI shape. Grounded
//! on the path-building convention in the teacher's `llm/vertex.rs`
//! (`projects/.../models/<model>:generateContent`).

use bytes::Bytes;
use serde_json::{Value, json};

use super::headers::HeaderSet;
use super::sse::SseReader;
use super::types::{ParsedRequest, Usage};
use super::{ResponseState, TranslateError, Translator};

pub struct OpenAiVertex {
	project_path_prefix: String,
}

impl OpenAiVertex {
	pub fn new(project_path_prefix: String) -> Self {
		Self { project_path_prefix }
	}
}

fn gemini_request(parsed: &ParsedRequest) -> Value {
	let messages = parsed.value.get("messages").and_then(Value::as_array).cloned().unwrap_or_default();
	let mut system_instruction = None;
	let mut contents = Vec::new();
	for message in messages {
		let role = message.get("role").and_then(Value::as_str).unwrap_or("user");
		let text = message.get("content").and_then(Value::as_str).unwrap_or_default();
		if role == "system" {
			system_instruction = Some(json!({ "parts": [{ "text": text }] }));
			continue;
		}
		let role = if role == "assistant" { "model" } else { "user" };
		contents.push(json!({ "role": role, "parts": [{ "text": text }] }));
	}
	let mut body = json!({ "contents": contents });
	if let Some(system) = system_instruction {
		body["systemInstruction"] = system;
	}
	body
}

fn gemini_candidate_text(value: &Value) -> String {
	value
		.get("candidates")
		.and_then(Value::as_array)
		.and_then(|c| c.first())
		.and_then(|c| c.get("content"))
		.and_then(|c| c.get("parts"))
		.and_then(Value::as_array)
		.map(|parts| {
			parts
				.iter()
				.filter_map(|p| p.get("text").and_then(Value::as_str))
				.collect::<Vec<_>>()
				.join("")
		})
		.unwrap_or_default()
}

fn gemini_usage(value: &Value) -> Usage {
	let usage = value.get("usageMetadata").cloned().unwrap_or_default();
	Usage {
		input: usage.get("promptTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
		cached_input: usage.get("cachedContentTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
		cache_creation_input: 0,
		output: usage.get("candidatesTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
		total: usage.get("totalTokenCount").and_then(Value::as_u64).unwrap_or(0) as u32,
	}
}

#[async_trait::async_trait]
impl Translator for OpenAiVertex {
	fn request_body(
		&self,
		_raw: &[u8],
		parsed: &ParsedRequest,
		_force: bool,
	) -> Result<(HeaderSet, Option<Bytes>), TranslateError> {
		let action = if parsed.stream {
			"streamGenerateContent?alt=sse"
		} else {
			"generateContent"
		};
		let path = format!(
			"{}/models/{}:{action}",
			self.project_path_prefix.trim_end_matches('/'),
			parsed.model
		);
		let headers = HeaderSet::default().with_path(path);
		let body = gemini_request(parsed);
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
			if value.get("candidates").is_some() {
				state.cumulative.merge_cumulative(gemini_usage(&value));
				let out = json!({
					"object": "chat.completion",
					"choices": [{
						"index": 0,
						"message": { "role": "assistant", "content": gemini_candidate_text(&value) },
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

		// Streaming (`alt=sse`): Gemini sends each candidate as its own SSE
		// `data:` event.
		let events = SseReader::feed(&mut state.buffer, chunk);
		let mut out = Vec::new();
		for event in events {
			if event.data == "[DONE]" {
				continue;
			}
			if let Ok(value) = serde_json::from_str::<Value>(&event.data) {
				state.cumulative.merge_cumulative(gemini_usage(&value));
				let delta = gemini_candidate_text(&value);
				let chunk_obj = json!({
					"object": "chat.completion.chunk",
					"choices": [{ "index": 0, "delta": { "content": delta } }],
				});
				out.extend_from_slice(format!("data: {chunk_obj}\n\n").as_bytes());
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
