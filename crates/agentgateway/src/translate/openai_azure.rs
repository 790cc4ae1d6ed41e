//! OpenAI -> Azure OpenAI: path rewrite only, body passthrough (spec.md
//! §4.4 translator table, row 2).

use bytes::Bytes;

use super::headers::HeaderSet;
use super::openai_openai::parse_openai_usage;
use super::types::{ParsedRequest, Usage};
use super::{ResponseState, TranslateError, Translator};

pub struct OpenAiAzure {
	api_version: String,
}

impl OpenAiAzure {
	pub fn new(api_version: String) -> Self {
		Self { api_version }
	}
}

#[async_trait::async_trait]
impl Translator for OpenAiAzure {
	fn request_body(
		&self,
		raw: &[u8],
		parsed: &ParsedRequest,
		force: bool,
	) -> Result<(HeaderSet, Option<Bytes>), TranslateError> {
		let path = format!(
			"/openai/deployments/{}/chat/completions?api-version={}",
			parsed.model, self.api_version
		);
		let headers = HeaderSet::default().with_path(path);
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
