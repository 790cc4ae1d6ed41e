//! OpenAI -> OpenAI-compatible passthrough: path prefix only, body and
//! response untouched (spec.md §4.4 translator table, row 1).

use bytes::Bytes;

use super::headers::HeaderSet;
use super::types::{ParsedRequest, Usage};
use super::{ResponseState, TranslateError, Translator};

pub struct OpenAiOpenAi {
	prefix: Option<String>,
}

impl OpenAiOpenAi {
	pub fn new(prefix: Option<String>) -> Self {
		Self { prefix }
	}
}

#[async_trait::async_trait]
impl Translator for OpenAiOpenAi {
	fn request_body(
		&self,
		raw: &[u8],
		_parsed: &ParsedRequest,
		force: bool,
	) -> Result<(HeaderSet, Option<Bytes>), TranslateError> {
		let mut headers = HeaderSet::default();
		if let Some(prefix) = &self.prefix {
			headers = headers.with_path(format!("{}/v1/chat/completions", prefix.trim_end_matches('/')));
		}
		let body = force.then(|| Bytes::copy_from_slice(raw));
		Ok((headers, body))
	}

	fn response_body(
		&self,
		chunk: &[u8],
		_end_of_stream: bool,
		state: &mut ResponseState,
	) -> Result<(Option<Bytes>, Usage, Option<String>), TranslateError> {
		if let Ok(value) = serde_json::from_slice::<serde_json::Value>(chunk) {
			if let Some(usage) = value.get("usage") {
				state.cumulative = parse_openai_usage(usage);
			}
			if let Some(model) = value.get("model").and_then(serde_json::Value::as_str) {
				state.response_model = Some(model.to_string());
			}
		}
		Ok((
			Some(Bytes::copy_from_slice(chunk)),
			state.cumulative,
			state.response_model.clone(),
		))
	}

	fn response_error(&self, status: u16, body: &[u8]) -> Bytes {
		super::openai_error_envelope(status, body)
	}
}

pub(super) fn parse_openai_usage(usage: &serde_json::Value) -> Usage {
	Usage {
		input: usage.get("prompt_tokens").and_then(serde_json::Value::as_u64).unwrap_or(0) as u32,
		cached_input: usage
			.get("prompt_tokens_details")
			.and_then(|d| d.get("cached_tokens"))
			.and_then(serde_json::Value::as_u64)
			.unwrap_or(0) as u32,
		cache_creation_input: 0,
		output: usage.get("completion_tokens").and_then(serde_json::Value::as_u64).unwrap_or(0) as u32,
		total: usage.get("total_tokens").and_then(serde_json::Value::as_u64).unwrap_or(0) as u32,
	}
}
