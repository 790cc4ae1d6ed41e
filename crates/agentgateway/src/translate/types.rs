//! Source-dialect-agnostic request/response shapes the endpoint specs parse
//! into before translator dispatch. Grounded on the shape of the teacher's
//! `llm/types/mod.rs` `RequestType`/`ResponseType`, narrowed to the fields
//! every translator in the matrix actually needs.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// What `ParseBody` hands back (spec.md §4.3): the model as first seen, the
/// parsed dialect-specific value, and whether the client asked to stream.
#[derive(Clone, Debug)]
pub struct ParsedRequest {
	pub model: String,
	pub stream: bool,
	pub value: Value,
}

impl ParsedRequest {
	pub fn openai_chat(raw: &[u8]) -> Result<Self, super::TranslateError> {
		let value: Value = serde_json::from_slice(raw)
			.map_err(|e| super::TranslateError::MalformedRequest(e.to_string()))?;
		let model = value
			.get("model")
			.and_then(Value::as_str)
			.ok_or_else(|| super::TranslateError::MalformedRequest("missing model field".into()))?
			.to_string();
		let stream = value.get("stream").and_then(Value::as_bool).unwrap_or(false);
		Ok(ParsedRequest { model, stream, value })
	}

	pub fn anthropic_messages(raw: &[u8]) -> Result<Self, super::TranslateError> {
		let value: Value = serde_json::from_slice(raw)
			.map_err(|e| super::TranslateError::MalformedRequest(e.to_string()))?;
		let model = value
			.get("model")
			.and_then(Value::as_str)
			.filter(|m| !m.is_empty())
			.ok_or_else(|| super::TranslateError::MalformedRequest("model field is required".into()))?
			.to_string();
		let stream = value.get("stream").and_then(Value::as_bool).unwrap_or(false);
		Ok(ParsedRequest { model, stream, value })
	}

	pub fn cohere_rerank(raw: &[u8]) -> Result<Self, super::TranslateError> {
		let value: Value = serde_json::from_slice(raw)
			.map_err(|e| super::TranslateError::MalformedRequest(e.to_string()))?;
		let model = value
			.get("model")
			.and_then(Value::as_str)
			.unwrap_or_default()
			.to_string();
		Ok(ParsedRequest {
			model,
			stream: false,
			value,
		})
	}
}

/// Cumulative token usage (spec.md §3 `RequestState.costs`). Each field is
/// "set-once-observed" at the call site: a translator only ever moves these
/// forward, never back, per the usage-monotonicity testable property.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Usage {
	pub input: u32,
	pub cached_input: u32,
	pub cache_creation_input: u32,
	pub output: u32,
	pub total: u32,
}

impl Usage {
	/// Merge in a newly observed cumulative snapshot, keeping the larger value
	/// per field so an out-of-order duplicate chunk can't regress totals.
	pub fn merge_cumulative(&mut self, other: Usage) {
		self.input = self.input.max(other.input);
		self.cached_input = self.cached_input.max(other.cached_input);
		self.cache_creation_input = self.cache_creation_input.max(other.cache_creation_input);
		self.output = self.output.max(other.output);
		self.total = self.total.max(other.total);
	}
}
