//! Cohere -> Cohere direct: passthrough (spec.md §4.4 translator table,
//! row 9). Rerank requests are unary-only — `/v2/rerank` has no streaming
//! mode — so there is no SSE/event-stream decoding here at all, just body
//! forwarding and a trivial usage readout if the backend reports one.

use bytes::Bytes;
use serde_json::Value;

use super::headers::HeaderSet;
use super::types::{ParsedRequest, Usage};
use super::{ResponseState, TranslateError, Translator};

pub struct CohereCohere;

impl CohereCohere {
	pub fn new() -> Self {
		Self
	}
}

impl Default for CohereCohere {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl Translator for CohereCohere {
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
		_end_of_stream: bool,
		state: &mut ResponseState,
	) -> Result<(Option<Bytes>, Usage, Option<String>), TranslateError> {
		if let Ok(value) = serde_json::from_slice::<Value>(chunk) {
			if let Some(units) = value
				.get("meta")
				.and_then(|m| m.get("billed_units"))
				.and_then(|b| b.get("search_units"))
				.and_then(Value::as_u64)
			{
				state.cumulative.total = state.cumulative.total.max(units as u32);
			}
		}
		Ok((
			Some(Bytes::copy_from_slice(chunk)),
			state.cumulative,
			state.response_model.clone(),
		))
	}

	fn response_error(&self, status: u16, body: &[u8]) -> Bytes {
		let message = String::from_utf8_lossy(body).to_string();
		let envelope = serde_json::json!({ "message": message });
		Bytes::from(serde_json::to_vec(&envelope).unwrap_or_default())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn passes_body_through_unchanged() {
		let translator = CohereCohere::new();
		let mut state = ResponseState::default();
		let body = br#"{"results":[{"index":0,"relevance_score":0.9}]}"#;
		let (out, _, _) = translator.response_body(body, true, &mut state).unwrap();
		assert_eq!(out.unwrap().as_ref(), body);
	}
}
